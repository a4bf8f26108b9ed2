//! Sub-tick input timing for fixed-step simulations.
//!
//! Inputs are stamped on the input thread the moment they arrive, queued, and
//! replayed on the simulation thread at the fraction of the tick where they
//! happened by splitting each tick into smaller physics steps.

pub mod capture;
pub mod clock;
pub mod config;
pub mod frame;
pub mod input;
mod metrics;
pub mod pipeline;
pub mod queue;
pub mod scheduler;
mod sync;
pub mod toggle;

pub use capture::{
    CaptureError, CaptureOutcome, InputCapture, KeyBindings, KeyCode, KeybindSource, MouseButton,
    RawEvent, RawSource, SharedKeyBindings, StaticKeybinds, TouchPhase, TouchTimestampBridge,
};
pub use clock::{probe_clock, Clock, ClockError, ManualClock, MonotonicClock, Timestamp};
pub use config::{
    resolve_settings_path, ChannelObserver, ConfigError, SettingChange, Settings,
    SettingsObserver, SettingsStore, SETTINGS_ENV_VAR,
};
pub use frame::{
    FramePhase, FrameState, FrameStateManager, FrameStatus, HostSimulation, LevelState,
    MovementMode, PlayerGate, PlayerMotion, TickOutcome, Vec2,
};
pub use input::{GameAction, Input, InputState, Player, PlayerButton};
pub use metrics::{MetricsHandle, PipelineMetricsSnapshot, DEFAULT_METRICS_INTERVAL};
pub use pipeline::{Capability, Pipeline, PipelineError, TickInput, TickReport};
pub use queue::InputQueue;
pub use scheduler::{partition, step_count, Step};
pub use toggle::{PatchError, PatchPoint, PatchResolver, SoftToggle, ToggleController};
