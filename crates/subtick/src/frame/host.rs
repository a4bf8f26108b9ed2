use crate::input::{Input, Player};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelState {
    #[default]
    Absent,
    Editor,
    Playing,
}

/// What the host looks like at the start of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStatus {
    pub level: LevelState,
    pub paused: bool,
    pub overlay_active: bool,
    pub player_dead: bool,
}

impl FrameStatus {
    pub fn playing() -> Self {
        Self {
            level: LevelState::Playing,
            ..Self::default()
        }
    }

    pub fn with_paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }

    pub fn with_player_dead(mut self, dead: bool) -> Self {
        self.player_dead = dead;
        self
    }

    pub(crate) fn has_live_level(&self) -> bool {
        self.level == LevelState::Playing
    }

    pub(crate) fn can_schedule(&self) -> bool {
        self.has_live_level() && !self.player_dead
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovementMode {
    #[default]
    Cube,
    Ship,
    Ball,
    Ufo,
    Wave,
    Robot,
    Spider,
    Swing,
}

impl MovementMode {
    /// Modes that leave the ground on their own and read input every frame.
    pub fn is_free_flying(self) -> bool {
        matches!(
            self,
            MovementMode::Ship | MovementMode::Ufo | MovementMode::Wave | MovementMode::Swing
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayerMotion {
    pub on_ground: bool,
    pub touching_ring: bool,
    pub mode: MovementMode,
}

impl PlayerMotion {
    /// A buffering player is exempt from sub-step collision and rotation and
    /// gets one full update at the end of the tick. Platformer levels always
    /// buffer; mid-tick collision checks break moving-platform tracking there.
    pub fn is_buffering(&self, platformer: bool) -> bool {
        platformer || !(self.on_ground || self.touching_ring || self.mode.is_free_flying())
    }
}

/// The host simulation the pipeline drives. Players are identified by tag,
/// never by object identity.
///
/// `update_rotation`, `deliver_button` and `native_update` are the host's
/// unmodified behaviours; the pipeline decides when they run.
pub trait HostSimulation {
    fn status(&self) -> FrameStatus;
    fn is_dual(&self) -> bool;
    fn is_platformer(&self) -> bool;
    fn player_motion(&self, player: Player) -> PlayerMotion;
    fn position(&self, player: Player) -> Vec2;
    fn set_last_position(&mut self, player: Player, position: Vec2);
    fn advance_player(&mut self, player: Player, time_factor: f32);
    fn check_collisions(&mut self, player: Player, time_factor: f32);
    fn update_rotation(&mut self, player: Player, time_factor: f32);
    /// Drops whatever per-object collision results the host caches between
    /// collision passes.
    fn reset_collision_cache(&mut self, player: Player);
    fn deliver_button(&mut self, input: &Input);
    /// The host's own whole-tick update, run on skip ticks.
    fn native_update(&mut self, time_factor: f32);
}
