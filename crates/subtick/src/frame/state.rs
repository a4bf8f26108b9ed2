use std::collections::VecDeque;

use crate::clock::Timestamp;
use crate::input::{Input, Player};
use crate::scheduler::Step;

use super::host::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePhase {
    #[default]
    Idle,
    Scheduling,
    /// Index of the step currently running.
    Stepping(usize),
    Settled,
}

/// Per-player sub-step bookkeeping for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerGate {
    pub enable_collision_and_rotation: bool,
    /// Factor of the latest mid-tick collision pass. The host's end-of-tick
    /// pass still covers the whole tick.
    pub collision_delta: f32,
    /// Factor the rotation hook forwards to the host.
    pub rotation_delta: f32,
    /// Position at tick start, written back as the host's "last position"
    /// by the first rotation update after stepping finishes.
    pub cached_position: Option<Vec2>,
}

/// Everything the simulation thread carries between and within ticks.
#[derive(Debug, Clone)]
pub struct FrameState {
    pub(crate) input_queue_copy: VecDeque<Input>,
    pub(crate) step_queue: VecDeque<Step>,
    pub(crate) next_input: Input,
    pub(crate) last_frame_time: Timestamp,
    pub(crate) last_physics_frame_time: Timestamp,
    pub(crate) current_frame_time: Timestamp,
    pub(crate) first_frame: bool,
    pub(crate) skip_update: bool,
    pub(crate) enable_input: bool,
    pub(crate) mid_step: bool,
    pub(crate) late_cutoff: bool,
    pub(crate) actual_delta: bool,
    pub(crate) players: [PlayerGate; 2],
    pub(crate) phase: FramePhase,
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            input_queue_copy: VecDeque::new(),
            step_queue: VecDeque::new(),
            next_input: Input::NONE,
            last_frame_time: 0,
            last_physics_frame_time: 0,
            current_frame_time: 0,
            first_frame: true,
            skip_update: true,
            enable_input: true,
            mid_step: false,
            late_cutoff: false,
            actual_delta: false,
            players: [PlayerGate::default(); 2],
            phase: FramePhase::Idle,
        }
    }
}

impl FrameState {
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn skip_update(&self) -> bool {
        self.skip_update
    }

    pub fn first_frame(&self) -> bool {
        self.first_frame
    }

    pub fn enable_input(&self) -> bool {
        self.enable_input
    }

    pub fn mid_step(&self) -> bool {
        self.mid_step
    }

    pub fn late_cutoff(&self) -> bool {
        self.late_cutoff
    }

    pub fn actual_delta(&self) -> bool {
        self.actual_delta
    }

    pub fn current_frame_time(&self) -> Timestamp {
        self.current_frame_time
    }

    pub fn last_frame_time(&self) -> Timestamp {
        self.last_frame_time
    }

    pub fn pending_steps(&self) -> usize {
        self.step_queue.len()
    }

    pub fn staged_inputs(&self) -> usize {
        self.input_queue_copy.len()
    }

    pub fn player(&self, player: Player) -> &PlayerGate {
        &self.players[player.index()]
    }

    pub(crate) fn flush(&mut self) {
        self.input_queue_copy.clear();
        self.step_queue.clear();
        self.next_input = Input::NONE;
    }

    /// Forces the next scheduled tick to be a skip tick.
    pub(crate) fn restart(&mut self) {
        self.first_frame = true;
        self.skip_update = true;
        self.enable_input = true;
        self.mid_step = false;
        self.phase = FramePhase::Idle;
    }
}
