use std::env;
use std::io;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use pixels::Error as PixelsError;
use subtick::{
    CaptureOutcome, Clock, GameAction, HostSimulation, Input, InputCapture, InputState,
    MouseButton, Pipeline, RawEvent, SettingChange, Settings, SettingsStore, SharedKeyBindings,
    StaticKeybinds, TickInput,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, Event, KeyEvent, MouseButton as WinitMouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode as PhysicalKeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use super::bootstrap::AppWiring;
use super::render::{FrameView, Renderer, SharedView};
use super::toy_host::ToyLevel;

pub(crate) const SLOW_FRAME_ENV_VAR: &str = "SUBTICK_SLOW_FRAME_MS";

const VK_RETURN: subtick::KeyCode = 0x0D;
const VK_SPACE: subtick::KeyCode = 0x20;
const VK_LEFT: subtick::KeyCode = 0x25;
const VK_UP: subtick::KeyCode = 0x26;
const VK_RIGHT: subtick::KeyCode = 0x27;
const VK_DOWN: subtick::KeyCode = 0x28;
const VK_A: subtick::KeyCode = 0x41;
const VK_D: subtick::KeyCode = 0x44;
const VK_S: subtick::KeyCode = 0x53;
const VK_W: subtick::KeyCode = 0x57;

#[derive(Debug, Clone)]
pub(crate) struct DemoConfig {
    pub(crate) window_title: String,
    pub(crate) window_width: u32,
    pub(crate) window_height: u32,
    pub(crate) target_tps: u32,
    pub(crate) max_frame_delta: Duration,
    pub(crate) max_ticks_per_frame: u32,
    pub(crate) simulated_slow_frame_ms: u64,
    pub(crate) start_dual: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            window_title: "Subtick Demo".to_string(),
            window_width: 1280,
            window_height: 480,
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            simulated_slow_frame_ms: 0,
            start_dual: false,
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum DemoError {
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("failed to spawn simulation thread: {0}")]
    SpawnSimulation(#[source] io::Error),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    match run_demo(app.config, app.settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "startup_failed");
            ExitCode::FAILURE
        }
    }
}

fn run_demo(config: DemoConfig, settings: Settings) -> Result<(), DemoError> {
    let settings = SettingsStore::new(settings);
    let pipeline = Pipeline::new(settings.clone());
    let (native_sender, native_receiver) = mpsc::channel();
    let mut front_end = InputFrontEnd::new(&pipeline, native_sender);

    let event_loop = EventLoop::new().map_err(DemoError::CreateEventLoop)?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                config.window_width as f64,
                config.window_height as f64,
            ))
            .build(&event_loop)
            .map_err(DemoError::CreateWindow)?,
    );
    let mut renderer = Renderer::new(Arc::clone(&window)).map_err(DemoError::CreateRenderer)?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let controls = Arc::new(SimControls::new(config.start_dual));
    let view = SharedView::default();
    let target_tps = config.target_tps.max(1);
    let sim_config = SimulationConfig {
        fixed_dt: Duration::from_secs_f64(1.0 / f64::from(target_tps)),
        max_frame_delta: config.max_frame_delta,
        max_ticks_per_frame: config.max_ticks_per_frame.max(1),
        slow_frame_delay: resolve_slow_frame_delay(config.simulated_slow_frame_ms),
    };
    info!(
        target_tps,
        max_ticks_per_frame = sim_config.max_ticks_per_frame,
        slow_frame_delay_ms = sim_config.slow_frame_delay.as_millis() as u64,
        capture = front_end.has_capture(),
        "demo_config"
    );
    let mut simulation = Some(
        spawn_simulation(
            pipeline,
            sim_config,
            Arc::clone(&controls),
            view.clone(),
            native_receiver,
        )
        .map_err(DemoError::SpawnSimulation)?,
    );

    let base_title = config.window_title;
    let mut last_title = String::new();
    event_loop
        .run(move |event, window_target| match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested => {
                    info!(reason = "window_close", "shutdown_requested");
                    window_target.exit();
                }
                WindowEvent::Resized(size) => {
                    if let Err(err) = renderer.resize(size.width, size.height) {
                        warn!(error = %err, "resize_failed");
                        window_target.exit();
                    }
                }
                WindowEvent::Focused(false) => front_end.focus_lost(),
                WindowEvent::KeyboardInput { event, .. } => {
                    if handle_keyboard(&event, &mut front_end, &settings, &controls) {
                        info!(reason = "escape", "shutdown_requested");
                        window_target.exit();
                    }
                }
                WindowEvent::MouseInput { state, button, .. } => {
                    front_end.mouse(map_mouse_button(button), state == ElementState::Pressed);
                }
                WindowEvent::RedrawRequested => {
                    let frame = view.snapshot();
                    if let Err(err) = renderer.render(&frame) {
                        warn!(error = %err, "render_failed");
                        window_target.exit();
                        return;
                    }
                    let title = frame.title(&base_title);
                    if title != last_title {
                        window.set_title(&title);
                        last_title = title;
                    }
                }
                _ => {}
            },
            Event::AboutToWait => window.request_redraw(),
            Event::LoopExiting => {
                controls.shutdown.store(true, Ordering::Release);
                if let Some(handle) = simulation.take() {
                    if handle.join().is_err() {
                        warn!("simulation_thread_panicked");
                    }
                }
                info!("shutdown");
            }
            _ => {}
        })
        .map_err(DemoError::EventLoopRun)
}

fn demo_keybinds() -> StaticKeybinds {
    StaticKeybinds::new()
        .with(GameAction::P1Jump, &[VK_SPACE, VK_W])
        .with(GameAction::P1Left, &[VK_A])
        .with(GameAction::P1Right, &[VK_D])
        .with(GameAction::P2Jump, &[VK_UP])
        .with(GameAction::P2Left, &[VK_LEFT])
        .with(GameAction::P2Right, &[VK_RIGHT])
}

/// Input-thread side. Stamps events into the pipeline queue and mirrors the
/// resolved button to the simulation thread's native path, which only lets
/// it through while the pipeline is not stepping.
struct InputFrontEnd {
    capture: Option<InputCapture>,
    keybinds: SharedKeyBindings,
    clock: Arc<dyn Clock>,
    native: Sender<Input>,
}

impl InputFrontEnd {
    fn new(pipeline: &Pipeline, native: Sender<Input>) -> Self {
        let capture = match pipeline.capture() {
            Ok(capture) => Some(capture),
            Err(err) => {
                warn!(error = %err, "input_capture_unavailable");
                None
            }
        };
        Self {
            capture,
            keybinds: pipeline.keybinds().clone(),
            clock: pipeline.clock(),
            native,
        }
    }

    fn has_capture(&self) -> bool {
        self.capture.is_some()
    }

    fn key(&mut self, code: subtick::KeyCode, pressed: bool, repeat: bool) -> Option<CaptureOutcome> {
        let outcome = self
            .capture
            .as_mut()
            .map(|capture| capture.handle(RawEvent::key(code, pressed)));
        if let Some(CaptureOutcome::InvalidTimestamp) = outcome {
            debug!(code, "input_timestamp_rejected");
        }
        if !repeat {
            if let Some(action) = self.keybinds.resolve_key(code) {
                self.forward(action, pressed);
            }
        }
        outcome
    }

    fn mouse(&mut self, button: MouseButton, pressed: bool) -> Option<CaptureOutcome> {
        let outcome = self
            .capture
            .as_mut()
            .map(|capture| capture.handle(RawEvent::mouse(button, pressed)));
        if let Some(action) = self.keybinds.resolve_mouse(button) {
            self.forward(action, pressed);
        }
        outcome
    }

    fn forward(&self, action: GameAction, pressed: bool) {
        let input = Input::new(
            self.clock.now(),
            action.button(),
            InputState::from_pressed(pressed),
            action.player(),
        );
        if self.native.send(input).is_err() {
            debug!(?action, "native_input_dropped");
        }
    }

    fn focus_lost(&mut self) {
        if let Some(capture) = self.capture.as_mut() {
            capture.release_all_held();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Quit,
    TogglePipeline,
    ToggleLateCutoff,
    ToggleActualDelta,
    ToggleRightClick,
    ToggleDual,
    TogglePause,
    Restart,
}

fn control_for(code: PhysicalKeyCode) -> Option<Control> {
    match code {
        PhysicalKeyCode::Escape => Some(Control::Quit),
        PhysicalKeyCode::F1 => Some(Control::TogglePipeline),
        PhysicalKeyCode::F2 => Some(Control::ToggleLateCutoff),
        PhysicalKeyCode::F3 => Some(Control::ToggleActualDelta),
        PhysicalKeyCode::F4 => Some(Control::ToggleRightClick),
        PhysicalKeyCode::Tab => Some(Control::ToggleDual),
        PhysicalKeyCode::KeyP => Some(Control::TogglePause),
        PhysicalKeyCode::KeyR => Some(Control::Restart),
        _ => None,
    }
}

fn virtual_key(code: PhysicalKeyCode) -> Option<subtick::KeyCode> {
    match code {
        PhysicalKeyCode::Enter => Some(VK_RETURN),
        PhysicalKeyCode::Space => Some(VK_SPACE),
        PhysicalKeyCode::ArrowLeft => Some(VK_LEFT),
        PhysicalKeyCode::ArrowUp => Some(VK_UP),
        PhysicalKeyCode::ArrowRight => Some(VK_RIGHT),
        PhysicalKeyCode::ArrowDown => Some(VK_DOWN),
        PhysicalKeyCode::KeyA => Some(VK_A),
        PhysicalKeyCode::KeyD => Some(VK_D),
        PhysicalKeyCode::KeyS => Some(VK_S),
        PhysicalKeyCode::KeyW => Some(VK_W),
        _ => None,
    }
}

fn map_mouse_button(button: WinitMouseButton) -> MouseButton {
    match button {
        WinitMouseButton::Left => MouseButton::Left,
        WinitMouseButton::Right => MouseButton::Right,
        WinitMouseButton::Middle => MouseButton::Other(2),
        WinitMouseButton::Back => MouseButton::Other(3),
        WinitMouseButton::Forward => MouseButton::Other(4),
        WinitMouseButton::Other(index) => MouseButton::Other(index),
    }
}

/// Returns true when the demo should quit.
fn handle_keyboard(
    event: &KeyEvent,
    front_end: &mut InputFrontEnd,
    settings: &SettingsStore,
    controls: &SimControls,
) -> bool {
    let PhysicalKey::Code(code) = event.physical_key else {
        return false;
    };
    let pressed = event.state == ElementState::Pressed;
    if let Some(control) = control_for(code) {
        return pressed && !event.repeat && apply_control(control, settings, controls);
    }
    if let Some(key) = virtual_key(code) {
        front_end.key(key, pressed, event.repeat);
    }
    false
}

/// Returns true when the demo should quit.
fn apply_control(control: Control, settings: &SettingsStore, controls: &SimControls) -> bool {
    let current = settings.current();
    let change = match control {
        Control::Quit => return true,
        Control::TogglePipeline => SettingChange::SoftToggle(!current.soft_toggle),
        Control::ToggleLateCutoff => SettingChange::LateCutoff(!current.late_cutoff),
        Control::ToggleActualDelta => SettingChange::ActualDelta(!current.actual_delta),
        Control::ToggleRightClick => SettingChange::RightClickP2Jump(!current.right_click_p2_jump),
        Control::ToggleDual => {
            let dual = !controls.dual.fetch_xor(true, Ordering::AcqRel);
            info!(dual, "dual_mode_toggled");
            return false;
        }
        Control::TogglePause => {
            let paused = !controls.paused.fetch_xor(true, Ordering::AcqRel);
            info!(paused, "pause_toggled");
            return false;
        }
        Control::Restart => {
            controls.restart.store(true, Ordering::Release);
            return false;
        }
    };
    settings.set(change);
    info!(key = change.key(), value = change.value(), "setting_toggled");
    false
}

/// Flags the input thread flips for the simulation thread.
#[derive(Debug, Default)]
struct SimControls {
    shutdown: AtomicBool,
    paused: AtomicBool,
    restart: AtomicBool,
    dual: AtomicBool,
}

impl SimControls {
    fn new(dual: bool) -> Self {
        Self {
            dual: AtomicBool::new(dual),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SimulationConfig {
    fixed_dt: Duration,
    max_frame_delta: Duration,
    max_ticks_per_frame: u32,
    slow_frame_delay: Duration,
}

fn spawn_simulation(
    pipeline: Pipeline,
    config: SimulationConfig,
    controls: Arc<SimControls>,
    view: SharedView,
    native: Receiver<Input>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("simulation".to_string())
        .spawn(move || run_simulation(pipeline, config, &controls, &view, &native))
}

fn run_simulation(
    mut pipeline: Pipeline,
    config: SimulationConfig,
    controls: &SimControls,
    view: &SharedView,
    native: &Receiver<Input>,
) {
    let keybinds = demo_keybinds();
    let host_delta = config.fixed_dt.as_secs_f32();
    let mut level = ToyLevel::new(controls.dual.load(Ordering::Acquire));
    pipeline.level_started(&keybinds);

    let mut accumulator = Duration::ZERO;
    let mut last_frame = Instant::now();
    let mut last_tick = last_frame;
    let mut total_ticks = 0u64;
    info!(enabled = pipeline.is_enabled(), "simulation_started");

    while !controls.shutdown.load(Ordering::Acquire) {
        let now = Instant::now();
        accumulator += clamp_frame_delta(now - last_frame, config.max_frame_delta);
        last_frame = now;

        if controls.restart.swap(false, Ordering::AcqRel) {
            level.restart();
            pipeline.level_started(&keybinds);
        }
        let dual = controls.dual.load(Ordering::Acquire);
        level.set_dual(dual);
        level.set_paused(controls.paused.load(Ordering::Acquire));

        let plan = plan_sim_steps(accumulator, config.fixed_dt, config.max_ticks_per_frame);
        accumulator = plan.remaining_accumulator;
        if !plan.dropped_backlog.is_zero() {
            warn!(
                dropped_backlog_ms = plan.dropped_backlog.as_secs_f64() * 1000.0,
                "sim_backlog_dropped"
            );
        }

        for _ in 0..plan.ticks_to_run {
            let tick_start = Instant::now();
            let actual_delta_seconds = (tick_start - last_tick).as_secs_f32();
            last_tick = tick_start;

            let tick = TickInput {
                host_delta,
                timewarp: 1.0,
                actual_delta_seconds,
            };
            if simulate_tick(&mut pipeline, &mut level, &keybinds, native, tick) {
                total_ticks += 1;
            }
        }

        if plan.ticks_to_run > 0 {
            view.publish(FrameView::capture(
                &level,
                dual,
                pipeline.is_enabled(),
                pipeline.indicator_label(),
                pipeline.metrics().snapshot(),
            ));
        }

        if !config.slow_frame_delay.is_zero() {
            thread::sleep(config.slow_frame_delay);
        }
        thread::sleep(config.fixed_dt.saturating_sub(accumulator));
    }

    info!(total_ticks, "simulation_stopped");
}

/// One host tick. Settings changes are applied before the native button
/// path is drained, so a press made as the pipeline is switched off still
/// reaches the host. Returns false while paused.
fn simulate_tick(
    pipeline: &mut Pipeline,
    level: &mut ToyLevel,
    keybinds: &StaticKeybinds,
    native: &Receiver<Input>,
    tick: TickInput,
) -> bool {
    let status = level.status();
    pipeline.begin_frame(status);
    if status.paused {
        let discarded = native.try_iter().count();
        if discarded > 0 {
            debug!(discarded, "paused_input_discarded");
        }
        return false;
    }

    while let Ok(input) = native.try_recv() {
        pipeline.handle_button(level, &input);
    }
    pipeline.advance_tick(level, tick);
    if level.after_tick() {
        pipeline.level_started(keybinds);
    }
    true
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;
    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator -= fixed_dt;
        ticks_to_run += 1;
    }

    // Past the tick cap the backlog is dropped rather than replayed later.
    let dropped_backlog = if accumulator >= fixed_dt {
        std::mem::take(&mut accumulator)
    } else {
        Duration::ZERO
    };
    StepPlan {
        ticks_to_run,
        remaining_accumulator: accumulator,
        dropped_backlog,
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn resolve_slow_frame_delay(config_slow_frame_ms: u64) -> Duration {
    let fallback = Duration::from_millis(config_slow_frame_ms);
    match env::var(SLOW_FRAME_ENV_VAR) {
        Ok(value) => match value.trim().parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(
                    env_var = SLOW_FRAME_ENV_VAR,
                    value = value.as_str(),
                    "invalid slow-frame env var value; falling back to config"
                );
                fallback
            }
        },
        Err(env::VarError::NotPresent) => fallback,
        Err(err) => {
            warn!(
                env_var = SLOW_FRAME_ENV_VAR,
                error = %err,
                "unable to read slow-frame env var; falling back to config"
            );
            fallback
        }
    }
}
