mod host;
mod state;

pub use host::{
    FrameStatus, HostSimulation, LevelState, MovementMode, PlayerMotion, Vec2,
};
pub use state::{FramePhase, FrameState, PlayerGate};

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, trace};

use crate::clock::Clock;
use crate::input::{Input, Player};
use crate::metrics::{MetricsAccumulator, MetricsHandle, DEFAULT_METRICS_INTERVAL};
use crate::queue::InputQueue;
use crate::scheduler::{self, Step};
use crate::toggle::SoftToggle;

/// How the host should run the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Run the host's own unmodified update.
    Native,
    /// The pipeline advanced the players itself.
    Stepped {
        steps: usize,
        inputs_delivered: usize,
    },
}

/// Owns the per-tick state machine on the simulation thread.
///
/// A host calls [`begin_frame`](Self::begin_frame) once per frame,
/// [`modified_delta`](Self::modified_delta) once per tick to obtain the
/// delta and build the step queue, then [`step_players`](Self::step_players)
/// in place of its player update. Its own rotation update goes through
/// [`rotation_hook`](Self::rotation_hook) and its own button handling is
/// gated by [`allows_button`](Self::allows_button).
pub struct FrameStateManager {
    clock: Arc<dyn Clock>,
    queue: InputQueue,
    soft_toggle: SoftToggle,
    state: FrameState,
    metrics: MetricsAccumulator,
    metrics_handle: MetricsHandle,
}

impl FrameStateManager {
    pub fn new(clock: Arc<dyn Clock>, queue: InputQueue, soft_toggle: SoftToggle) -> Self {
        Self {
            clock,
            queue,
            soft_toggle,
            state: FrameState::default(),
            metrics: MetricsAccumulator::new(DEFAULT_METRICS_INTERVAL),
            metrics_handle: MetricsHandle::default(),
        }
    }

    pub fn state(&self) -> &FrameState {
        &self.state
    }

    pub fn metrics(&self) -> MetricsHandle {
        self.metrics_handle.clone()
    }

    pub fn set_late_cutoff(&mut self, late_cutoff: bool) {
        self.state.late_cutoff = late_cutoff;
    }

    pub fn set_actual_delta(&mut self, actual_delta: bool) {
        self.state.actual_delta = actual_delta;
    }

    /// A level (re)started: the next tick is a skip tick and anything
    /// captured so far is dropped.
    pub fn restart(&mut self) {
        self.state.restart();
        self.state.flush();
        self.queue.clear();
        for gate in &mut self.state.players {
            gate.cached_position = None;
        }
    }

    pub fn begin_frame(&mut self, status: FrameStatus) {
        if !self.state.late_cutoff {
            self.state.current_frame_time = self.clock.now();
        }

        let idle = self.soft_toggle.is_set()
            || !status.has_live_level()
            || status.paused
            || status.overlay_active;
        if idle {
            if !self.state.first_frame {
                debug!(
                    soft_toggle = self.soft_toggle.is_set(),
                    paused = status.paused,
                    "input_flushed"
                );
            }
            self.state.restart();
            self.state.flush();
            self.queue.clear();
        }

        if let Some(snapshot) = self.metrics.maybe_snapshot(Instant::now()) {
            self.metrics_handle.publish(snapshot);
            trace!(
                tps = snapshot.tps,
                skipped_ticks = snapshot.skipped_ticks,
                avg_steps_per_tick = snapshot.avg_steps_per_tick,
                inputs_delivered = snapshot.inputs_delivered,
                "pipeline_metrics"
            );
        }
    }

    /// Returns the delta the host should simulate this tick and builds the
    /// tick's step queue.
    ///
    /// `actual_delta_seconds` is the measured wall time since the last tick;
    /// it replaces `host_delta` (scaled by `timewarp`) when actual delta is on.
    pub fn modified_delta(
        &mut self,
        host_delta: f32,
        timewarp: f32,
        actual_delta_seconds: f32,
        status: FrameStatus,
    ) -> f32 {
        if !status.has_live_level() {
            return host_delta;
        }

        let delta = if self.state.actual_delta {
            actual_delta_seconds * timewarp
        } else {
            host_delta
        };

        if delta > 0.0 {
            self.schedule(scheduler::step_count(delta, timewarp), status);
        } else {
            self.state.skip_update = true;
        }
        delta
    }

    fn schedule(&mut self, step_count: u32, status: FrameStatus) {
        if self.soft_toggle.is_set() || !status.can_schedule() {
            self.state.restart();
            self.state.flush();
            self.queue.clear();
            return;
        }

        self.state.phase = FramePhase::Scheduling;
        self.state.next_input = Input::NONE;
        self.state.step_queue.clear();
        self.state.last_frame_time = self.state.last_physics_frame_time;

        if self.state.late_cutoff {
            self.state.current_frame_time = self
                .queue
                .drain_now(self.clock.as_ref(), &mut self.state.input_queue_copy);
        } else {
            self.queue
                .drain_up_to(self.state.current_frame_time, &mut self.state.input_queue_copy);
        }
        self.state.last_physics_frame_time = self.state.current_frame_time;

        if self.state.first_frame {
            let discarded = self.state.input_queue_copy.len();
            self.state.first_frame = false;
            self.state.skip_update = true;
            self.state.input_queue_copy.clear();
            self.state.phase = FramePhase::Idle;
            debug!(discarded, "first_frame_skipped");
            return;
        }

        self.state.skip_update = false;
        let steps = scheduler::partition(
            &mut self.state.input_queue_copy,
            self.state.last_frame_time,
            self.state.current_frame_time,
            step_count,
        );
        trace!(
            step_count,
            steps = steps.len(),
            leftover = self.state.input_queue_copy.len(),
            "tick_scheduled"
        );
        self.state.step_queue.extend(steps);
    }

    /// Runs the players through the tick's step queue, or tells the host to
    /// run its own update when this is a skip tick. `time_factor` is the
    /// host's full-tick time factor.
    pub fn step_players(
        &mut self,
        host: &mut dyn HostSimulation,
        time_factor: f32,
    ) -> TickOutcome {
        if self.state.skip_update {
            self.metrics.record_skipped_tick();
            return TickOutcome::Native;
        }

        let dual = host.is_dual();
        let platformer = host.is_platformer();
        for player in Player::ALL {
            let gate = &mut self.state.players[player.index()];
            gate.enable_collision_and_rotation =
                !host.player_motion(player).is_buffering(platformer);
            gate.cached_position = Some(host.position(player));
        }

        self.state.mid_step = true;
        let mut steps = 0usize;
        let mut inputs_delivered = 0usize;
        loop {
            self.state.phase = FramePhase::Stepping(steps);
            let (step, delivered) = self.next_step(host);
            if delivered {
                inputs_delivered += 1;
            }

            let step_factor = (f64::from(time_factor) * step.delta_factor) as f32;
            self.advance_player(host, Player::One, time_factor, step_factor, step.end_step);
            if dual {
                self.advance_player(host, Player::Two, time_factor, step_factor, step.end_step);
            }

            steps += 1;
            if step.end_step {
                break;
            }
        }
        self.state.mid_step = false;
        self.state.phase = FramePhase::Settled;

        if steps > 1 {
            trace!(steps, inputs_delivered, "sub_steps_run");
        }
        self.metrics.record_stepped_tick(steps, inputs_delivered);
        TickOutcome::Stepped {
            steps,
            inputs_delivered,
        }
    }

    /// Pops the next step, first delivering the input that ended the
    /// previous one. An exhausted queue yields a single closing step.
    fn next_step(&mut self, host: &mut dyn HostSimulation) -> (Step, bool) {
        self.state.enable_input = false;
        let Some(step) = self.state.step_queue.pop_front() else {
            return (Step::default(), false);
        };

        let mut delivered = false;
        if !self.state.next_input.is_none() {
            let input = self.state.next_input;
            self.state.enable_input = true;
            host.deliver_button(&input);
            self.state.enable_input = false;
            delivered = true;
        }
        self.state.next_input = step.input;
        (step, delivered)
    }

    fn advance_player(
        &mut self,
        host: &mut dyn HostSimulation,
        player: Player,
        time_factor: f32,
        step_factor: f32,
        end_step: bool,
    ) {
        let gate = &mut self.state.players[player.index()];
        if gate.enable_collision_and_rotation {
            gate.rotation_delta = step_factor;
            host.advance_player(player, step_factor);
            if !end_step {
                gate.collision_delta = step_factor;
                host.check_collisions(player, gate.collision_delta);
                host.update_rotation(player, step_factor);
                host.reset_collision_cache(player);
            }
        } else if end_step {
            gate.rotation_delta = time_factor;
            host.advance_player(player, time_factor);
        }
    }

    /// Stands in for the host's rotation update. After stepping finishes the
    /// first call also restores the tick-start position as the host's last
    /// position, so the host's own collision pass sees the whole tick's motion.
    pub fn rotation_hook(&mut self, host: &mut dyn HostSimulation, player: Player, time_factor: f32) {
        if self.state.skip_update {
            host.update_rotation(player, time_factor);
            return;
        }

        let mid_step = self.state.mid_step;
        let gate = &mut self.state.players[player.index()];
        host.update_rotation(player, gate.rotation_delta);
        if !mid_step {
            if let Some(position) = gate.cached_position.take() {
                host.set_last_position(player, position);
            }
        }
    }

    /// Whether a button event arriving through the host's own input path may
    /// run now. Outside skip ticks the pipeline delivers every input itself.
    pub fn allows_button(&self) -> bool {
        self.state.enable_input
    }

    /// Host-originated button events pass through here instead of going
    /// straight to the host. Returns whether the event was delivered.
    pub fn handle_button(&mut self, host: &mut dyn HostSimulation, input: &Input) -> bool {
        if !self.allows_button() {
            trace!(player = ?input.player, button = ?input.button, "host_button_suppressed");
            return false;
        }
        host.deliver_button(input);
        true
    }

    pub(crate) fn log_settings(&self) {
        info!(
            late_cutoff = self.state.late_cutoff,
            actual_delta = self.state.actual_delta,
            soft_toggle = self.soft_toggle.is_set(),
            "frame_settings"
        );
    }
}

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
