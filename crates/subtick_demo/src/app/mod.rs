mod bootstrap;
mod loop_runner;
mod render;
mod toy_host;

pub(crate) use bootstrap::build_app;
pub(crate) use loop_runner::run;
