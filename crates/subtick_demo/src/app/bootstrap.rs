use subtick::{Settings, SETTINGS_ENV_VAR};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::loop_runner::DemoConfig;

const START_DUAL_ENV_VAR: &str = "SUBTICK_DEMO_DUAL";

pub(crate) struct AppWiring {
    pub(crate) config: DemoConfig,
    pub(crate) settings: Settings,
}

pub(crate) fn build_app() -> AppWiring {
    init_tracing();
    info!("=== Subtick Demo Startup ===");

    let settings = match Settings::load_from_env() {
        Ok(settings) => settings,
        Err(err) => {
            warn!(
                env_var = SETTINGS_ENV_VAR,
                error = %err,
                "settings unavailable; falling back to defaults"
            );
            Settings::default()
        }
    };
    info!(
        soft_toggle = settings.soft_toggle,
        late_cutoff = settings.late_cutoff,
        actual_delta = settings.actual_delta,
        right_click = settings.right_click_p2_jump,
        "settings_loaded"
    );

    let config = DemoConfig {
        start_dual: parse_flag(std::env::var(START_DUAL_ENV_VAR).ok().as_deref()),
        ..DemoConfig::default()
    };

    AppWiring { config, settings }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn parse_flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(str::trim).map(str::to_ascii_lowercase).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}
