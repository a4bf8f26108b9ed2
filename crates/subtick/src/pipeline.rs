use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::capture::{CaptureError, InputCapture, KeyBindings, KeybindSource, SharedKeyBindings};
use crate::clock::{probe_clock, Clock, ClockError, MonotonicClock};
use crate::config::{ChannelObserver, SettingChange, Settings, SettingsStore};
use crate::frame::{FrameState, FrameStateManager, FrameStatus, HostSimulation, TickOutcome};
use crate::input::{Input, Player};
use crate::metrics::MetricsHandle;
use crate::queue::InputQueue;
use crate::scheduler::NOMINAL_FRAME_RATE;
use crate::toggle::{PatchResolver, SoftToggle, ToggleController};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("clock is unsuitable for sub-tick timing: {0}")]
    Clock(#[from] ClockError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Supported,
    /// The host keeps running natively for the whole session.
    Unsupported(PipelineError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickInput {
    pub host_delta: f32,
    pub timewarp: f32,
    /// Measured wall time since the previous tick.
    pub actual_delta_seconds: f32,
}

impl TickInput {
    pub fn fixed(host_delta: f32) -> Self {
        Self {
            host_delta,
            timewarp: 1.0,
            actual_delta_seconds: host_delta,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub delta: f32,
    pub time_factor: f32,
    pub outcome: TickOutcome,
}

/// Everything the simulation thread needs, wired together.
///
/// Settings may change on any thread; they reach the frame state through a
/// channel drained at the start of every frame. Right-click binding changes
/// go straight to the shared keybinding table since capture reads it.
pub struct Pipeline {
    clock: Arc<dyn Clock>,
    queue: InputQueue,
    keybinds: SharedKeyBindings,
    frames: FrameStateManager,
    toggle: ToggleController,
    settings: SettingsStore,
    changes: Receiver<SettingChange>,
    soft_toggle_requested: bool,
    capability: Capability,
}

impl Pipeline {
    /// Uses the process-wide monotonic clock, disabling the pipeline if the
    /// clock fails its probe.
    pub fn new(settings: SettingsStore) -> Self {
        let clock = MonotonicClock::new();
        let probe = probe_clock(&clock);
        let mut pipeline = Self::with_clock(settings, Arc::new(clock));
        match probe {
            Ok(resolution) => info!(resolution_ns = resolution.as_nanos() as u64, "clock_probed"),
            Err(error) => pipeline.disable_with(error.into()),
        }
        pipeline
    }

    pub fn with_clock(settings: SettingsStore, clock: Arc<dyn Clock>) -> Self {
        let current = settings.current();
        let queue = InputQueue::new();
        let keybinds = SharedKeyBindings::new(KeyBindings::default());
        keybinds.set_right_click_p2_jump(current.right_click_p2_jump);

        let soft_toggle = SoftToggle::new(current.soft_toggle);
        let mut frames = FrameStateManager::new(clock.clone(), queue.clone(), soft_toggle.clone());
        frames.set_late_cutoff(current.late_cutoff);
        frames.set_actual_delta(current.actual_delta);

        let (sender, changes) = mpsc::channel();
        settings.subscribe(Arc::new(ChannelObserver::new(sender)));
        let shared_binds = keybinds.clone();
        settings.subscribe(Arc::new(move |change: SettingChange| {
            if let SettingChange::RightClickP2Jump(enabled) = change {
                shared_binds.set_right_click_p2_jump(enabled);
            }
        }));

        let mut pipeline = Self {
            clock,
            queue,
            keybinds,
            frames,
            toggle: ToggleController::new(soft_toggle),
            settings,
            changes,
            soft_toggle_requested: current.soft_toggle,
            capability: Capability::Supported,
        };
        pipeline.sync_enabled();
        pipeline.frames.log_settings();
        pipeline
    }

    /// Installs the host patch kept applied while the pipeline is enabled.
    pub fn with_patch(mut self, resolver: Box<dyn PatchResolver>) -> Self {
        let soft_toggle = self.toggle.soft_toggle().clone();
        self.toggle = ToggleController::new(soft_toggle).with_patch(resolver);
        self.sync_enabled();
        self
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    pub fn is_enabled(&self) -> bool {
        self.toggle.is_enabled()
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn keybinds(&self) -> &SharedKeyBindings {
        &self.keybinds
    }

    pub fn frame_state(&self) -> &FrameState {
        self.frames.state()
    }

    pub fn metrics(&self) -> MetricsHandle {
        self.frames.metrics()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Capture front end for the input thread.
    pub fn capture(&self) -> Result<InputCapture, PipelineError> {
        if let Capability::Unsupported(reason) = &self.capability {
            return Err(reason.clone());
        }
        Ok(InputCapture::new(
            self.clock.clone(),
            self.queue.clone(),
            self.keybinds.clone(),
        ))
    }

    /// Permanently falls back to native ticks.
    pub fn disable_with(&mut self, reason: PipelineError) {
        warn!(error = %reason, "pipeline_unsupported");
        self.capability = Capability::Unsupported(reason);
        self.sync_enabled();
        self.queue.clear();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.settings.set(SettingChange::SoftToggle(!enabled));
        self.apply_setting_changes();
    }

    /// Text the host shows once a run ends, if any.
    pub fn indicator_label(&self) -> Option<&'static str> {
        let mut settings: Settings = self.settings.current();
        settings.soft_toggle = !self.toggle.is_enabled();
        settings.indicator_label()
    }

    pub fn level_started(&mut self, source: &dyn KeybindSource) {
        let right_click = self.settings.current().right_click_p2_jump;
        self.keybinds.rebuild(source, right_click);
        self.frames.restart();
        info!(enabled = self.toggle.is_enabled(), "level_started");
    }

    pub fn begin_frame(&mut self, status: FrameStatus) {
        self.apply_setting_changes();
        self.frames.begin_frame(status);
    }

    pub fn modified_delta(
        &mut self,
        host_delta: f32,
        timewarp: f32,
        actual_delta_seconds: f32,
        status: FrameStatus,
    ) -> f32 {
        self.frames
            .modified_delta(host_delta, timewarp, actual_delta_seconds, status)
    }

    pub fn step_players(&mut self, host: &mut dyn HostSimulation, time_factor: f32) -> TickOutcome {
        self.frames.step_players(host, time_factor)
    }

    pub fn rotation_hook(&mut self, host: &mut dyn HostSimulation, player: Player, time_factor: f32) {
        self.frames.rotation_hook(host, player, time_factor);
    }

    pub fn allows_button(&self) -> bool {
        self.frames.allows_button()
    }

    pub fn handle_button(&mut self, host: &mut dyn HostSimulation, input: &Input) -> bool {
        self.frames.handle_button(host, input)
    }

    /// One whole host tick: [`Pipeline::begin_frame`] then
    /// [`Pipeline::advance_tick`].
    pub fn run_tick(&mut self, host: &mut dyn HostSimulation, tick: TickInput) -> TickReport {
        self.begin_frame(host.status());
        self.advance_tick(host, tick)
    }

    /// The rest of a tick once [`Pipeline::begin_frame`] has run. Hosts that
    /// route their own button events through [`Pipeline::handle_button`]
    /// do so between the two, so a settings change made since the last tick
    /// already decides whether those buttons pass. After stepping, each
    /// active player gets the host's end-of-tick rotation and collision pass
    /// over the full tick.
    pub fn advance_tick(&mut self, host: &mut dyn HostSimulation, tick: TickInput) -> TickReport {
        let status = host.status();
        let delta = self.frames.modified_delta(
            tick.host_delta,
            tick.timewarp,
            tick.actual_delta_seconds,
            status,
        );
        let time_factor = delta * NOMINAL_FRAME_RATE as f32;

        let outcome = self.frames.step_players(host, time_factor);
        match outcome {
            TickOutcome::Native => host.native_update(time_factor),
            TickOutcome::Stepped { .. } => {
                let players: &[Player] = if host.is_dual() {
                    &Player::ALL
                } else {
                    &[Player::One]
                };
                for &player in players {
                    self.frames.rotation_hook(host, player, time_factor);
                    host.check_collisions(player, time_factor);
                }
            }
        }

        TickReport {
            delta,
            time_factor,
            outcome,
        }
    }

    fn apply_setting_changes(&mut self) {
        let mut applied = false;
        while let Ok(change) = self.changes.try_recv() {
            applied = true;
            match change {
                SettingChange::SoftToggle(soft_toggle) => {
                    self.soft_toggle_requested = soft_toggle;
                    self.sync_enabled();
                }
                SettingChange::LateCutoff(late_cutoff) => self.frames.set_late_cutoff(late_cutoff),
                SettingChange::ActualDelta(actual_delta) => {
                    self.frames.set_actual_delta(actual_delta)
                }
                SettingChange::RightClickP2Jump(_) => {}
            }
        }
        if applied {
            self.frames.log_settings();
        }
    }

    fn sync_enabled(&mut self) {
        let unsupported = matches!(self.capability, Capability::Unsupported(_));
        self.toggle
            .set_enabled(!(self.soft_toggle_requested || unsupported));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::capture::{CaptureOutcome, MouseButton, RawEvent, StaticKeybinds};
    use crate::clock::{ManualClock, Timestamp};
    use crate::frame::{PlayerMotion, Vec2};
    use crate::input::GameAction;
    use crate::toggle::{PatchError, PatchPoint};

    const FRAME: Timestamp = 16_666_667;
    const DT: f32 = 1.0 / 60.0;
    const KEY_UP: u32 = 0x26;

    #[derive(Debug, Default)]
    struct CountingHost {
        dual: bool,
        native_updates: Vec<f32>,
        advances: usize,
        collision_passes: Vec<(Player, f32)>,
        buttons: Vec<Input>,
        last_positions: usize,
    }

    impl HostSimulation for CountingHost {
        fn status(&self) -> FrameStatus {
            FrameStatus::playing()
        }

        fn is_dual(&self) -> bool {
            self.dual
        }

        fn is_platformer(&self) -> bool {
            false
        }

        fn player_motion(&self, _player: Player) -> PlayerMotion {
            PlayerMotion {
                on_ground: true,
                ..PlayerMotion::default()
            }
        }

        fn position(&self, _player: Player) -> Vec2 {
            Vec2::default()
        }

        fn set_last_position(&mut self, _player: Player, _position: Vec2) {
            self.last_positions += 1;
        }

        fn advance_player(&mut self, _player: Player, _time_factor: f32) {
            self.advances += 1;
        }

        fn check_collisions(&mut self, player: Player, time_factor: f32) {
            self.collision_passes.push((player, time_factor));
        }

        fn update_rotation(&mut self, _player: Player, _time_factor: f32) {}

        fn reset_collision_cache(&mut self, _player: Player) {}

        fn deliver_button(&mut self, input: &Input) {
            self.buttons.push(*input);
        }

        fn native_update(&mut self, time_factor: f32) {
            self.native_updates.push(time_factor);
        }
    }

    #[derive(Debug, Default)]
    struct PatchCalls {
        applies: u32,
        reverts: u32,
    }

    struct CountingPatch(Arc<Mutex<PatchCalls>>);

    impl PatchPoint for CountingPatch {
        fn apply(&mut self) -> Result<(), PatchError> {
            self.0.lock().expect("patch calls").applies += 1;
            Ok(())
        }

        fn revert(&mut self) -> Result<(), PatchError> {
            self.0.lock().expect("patch calls").reverts += 1;
            Ok(())
        }
    }

    struct CountingResolver(Arc<Mutex<PatchCalls>>);

    impl PatchResolver for CountingResolver {
        fn resolve(&mut self) -> Result<Box<dyn PatchPoint>, PatchError> {
            Ok(Box::new(CountingPatch(self.0.clone())))
        }
    }

    fn pipeline(settings: Settings) -> (Pipeline, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let mut pipeline = Pipeline::with_clock(SettingsStore::new(settings), clock.clone());
        pipeline.level_started(&StaticKeybinds::new().with(GameAction::P1Jump, &[KEY_UP]));
        (pipeline, clock)
    }

    #[test]
    fn first_tick_runs_natively_with_nominal_time_factor() {
        let (mut pipeline, _clock) = pipeline(Settings::default());
        let mut host = CountingHost::default();

        let report = pipeline.run_tick(&mut host, TickInput::fixed(DT));

        assert_eq!(report.outcome, TickOutcome::Native);
        assert!((report.time_factor - 1.0).abs() < 1e-6);
        assert_eq!(host.native_updates.len(), 1);
        assert_eq!(host.advances, 0);
    }

    #[test]
    fn captured_input_reaches_the_host_mid_tick() {
        let (mut pipeline, clock) = pipeline(Settings::default());
        let mut capture = pipeline.capture().expect("capture available");
        let mut host = CountingHost::default();
        pipeline.run_tick(&mut host, TickInput::fixed(DT));

        clock.advance(FRAME / 2);
        assert!(matches!(
            capture.handle(RawEvent::key(KEY_UP, true)),
            CaptureOutcome::Queued(_)
        ));
        clock.advance(FRAME - FRAME / 2);
        let report = pipeline.run_tick(&mut host, TickInput::fixed(DT));

        assert_eq!(
            report.outcome,
            TickOutcome::Stepped {
                steps: 5,
                inputs_delivered: 1
            }
        );
        assert_eq!(host.buttons.len(), 1);
        assert_eq!(host.buttons[0].player, Player::One);
        assert_eq!(host.collision_passes.last(), Some(&(Player::One, report.time_factor)));
        assert_eq!(host.last_positions, 1);
    }

    #[test]
    fn dual_mode_gets_an_end_of_tick_pass_for_both_players() {
        let (mut pipeline, clock) = pipeline(Settings::default());
        let mut host = CountingHost {
            dual: true,
            ..CountingHost::default()
        };
        pipeline.run_tick(&mut host, TickInput::fixed(DT));
        clock.advance(FRAME);
        pipeline.run_tick(&mut host, TickInput::fixed(DT));

        assert_eq!(host.last_positions, 2);
        let tail: Vec<Player> = host
            .collision_passes
            .iter()
            .rev()
            .take(2)
            .map(|(player, _)| *player)
            .collect();
        assert_eq!(tail, vec![Player::Two, Player::One]);
    }

    #[test]
    fn unsupported_capability_keeps_every_tick_native() {
        let (mut pipeline, clock) = pipeline(Settings::default());
        pipeline.disable_with(CaptureError::new("no keyboard").into());
        let mut host = CountingHost::default();

        assert!(pipeline.capture().is_err());
        for _ in 0..3 {
            clock.advance(FRAME);
            let report = pipeline.run_tick(&mut host, TickInput::fixed(DT));
            assert_eq!(report.outcome, TickOutcome::Native);
        }
        assert!(!pipeline.is_enabled());
        assert!(matches!(pipeline.capability(), Capability::Unsupported(_)));
        assert_eq!(pipeline.indicator_label(), None);

        // Settings cannot re-enable an unsupported pipeline.
        pipeline.set_enabled(true);
        assert!(!pipeline.is_enabled());
    }

    #[test]
    fn settings_changed_elsewhere_apply_at_the_next_frame() {
        let (mut pipeline, _clock) = pipeline(Settings::default());
        let store = pipeline.settings().clone();

        std::thread::spawn(move || {
            store.set(SettingChange::LateCutoff(true));
            store.set(SettingChange::ActualDelta(true));
        })
        .join()
        .expect("settings thread");
        assert!(!pipeline.frame_state().late_cutoff());

        pipeline.begin_frame(FrameStatus::playing());
        assert!(pipeline.frame_state().late_cutoff());
        assert!(pipeline.frame_state().actual_delta());
        assert_eq!(pipeline.indicator_label(), Some("CBF+PB"));
    }

    #[test]
    fn right_click_setting_updates_capture_immediately() {
        let (pipeline, _clock) = pipeline(Settings::default());
        let mut capture = pipeline.capture().expect("capture available");

        assert_eq!(
            capture.handle(RawEvent::mouse(MouseButton::Right, true)),
            CaptureOutcome::Unbound
        );
        pipeline
            .settings()
            .set(SettingChange::RightClickP2Jump(true));
        assert!(matches!(
            capture.handle(RawEvent::mouse(MouseButton::Right, true)),
            CaptureOutcome::Queued(Input {
                player: Player::Two,
                ..
            })
        ));
    }

    #[test]
    fn patch_is_applied_while_enabled_and_reverted_while_disabled() {
        let calls = Arc::new(Mutex::new(PatchCalls::default()));
        let (pipeline, _clock) = pipeline(Settings::default());
        let mut pipeline = pipeline.with_patch(Box::new(CountingResolver(calls.clone())));
        assert_eq!(calls.lock().expect("patch calls").applies, 1);

        pipeline.set_enabled(false);
        pipeline.set_enabled(false);
        pipeline.begin_frame(FrameStatus::playing());

        assert!(!pipeline.is_enabled());
        {
            let calls = calls.lock().expect("patch calls");
            assert_eq!(calls.applies, 1);
            assert_eq!(calls.reverts, 1);
        }

        pipeline.set_enabled(true);
        assert!(pipeline.is_enabled());
        assert_eq!(calls.lock().expect("patch calls").applies, 2);
    }

    #[test]
    fn level_start_forces_a_skip_tick() {
        let (mut pipeline, clock) = pipeline(Settings::default());
        let mut host = CountingHost::default();
        pipeline.run_tick(&mut host, TickInput::fixed(DT));
        clock.advance(FRAME);
        assert!(matches!(
            pipeline.run_tick(&mut host, TickInput::fixed(DT)).outcome,
            TickOutcome::Stepped { .. }
        ));

        pipeline.level_started(&StaticKeybinds::new());
        clock.advance(FRAME);
        assert_eq!(
            pipeline.run_tick(&mut host, TickInput::fixed(DT)).outcome,
            TickOutcome::Native
        );
    }
}
