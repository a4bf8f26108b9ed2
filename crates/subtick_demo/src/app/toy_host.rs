use subtick::{
    FrameStatus, HostSimulation, Input, InputState, LevelState, MovementMode, Player,
    PlayerButton, PlayerMotion, Vec2,
};

pub(crate) const COURSE_LENGTH: f32 = 96.0;
const RUN_SPEED: f32 = 9.0;
const GRAVITY: f32 = -70.0;
const JUMP_VELOCITY: f32 = 17.0;
const ROTATION_SPEED_DEG: f32 = 400.0;
const DEATH_Y: f32 = -6.0;
const RESPAWN_TICKS: u32 = 45;
const NOMINAL_TPS: f32 = 60.0;
const PLAYER_TWO_LANE_OFFSET: f32 = 1.5;

/// Gaps in the ground, as `[start, end)` spans along the course.
const PITS: [(f32, f32); 3] = [(18.0, 21.0), (44.0, 47.5), (72.0, 76.0)];

/// Floating platforms as `(start, end, top)`.
const PLATFORMS: [(f32, f32, f32); 2] = [(30.0, 38.0, 2.5), (58.0, 66.0, 3.5)];

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct ToyPlayer {
    pub(crate) position: Vec2,
    pub(crate) last_position: Vec2,
    pub(crate) velocity_y: f32,
    pub(crate) rotation_deg: f32,
    pub(crate) on_ground: bool,
    jump_held: bool,
    landed_on: Option<f32>,
}

impl ToyPlayer {
    /// Surface height of the last landing since the collision cache was reset.
    pub(crate) fn landed_on(&self) -> Option<f32> {
        self.landed_on
    }

    fn spawned(lane_offset: f32) -> Self {
        let position = Vec2 {
            x: lane_offset,
            y: 0.0,
        };
        Self {
            position,
            last_position: position,
            on_ground: true,
            ..Self::default()
        }
    }
}

/// Minimal auto-runner: two squares, a floor with pits and a few platforms.
#[derive(Debug, Clone)]
pub(crate) struct ToyLevel {
    players: [ToyPlayer; 2],
    dual: bool,
    paused: bool,
    respawn_in: Option<u32>,
    attempts: u32,
    presses: u32,
}

impl ToyLevel {
    pub(crate) fn new(dual: bool) -> Self {
        Self {
            players: Self::spawn_players(),
            dual,
            paused: false,
            respawn_in: None,
            attempts: 1,
            presses: 0,
        }
    }

    fn spawn_players() -> [ToyPlayer; 2] {
        [
            ToyPlayer::spawned(0.0),
            ToyPlayer::spawned(PLAYER_TWO_LANE_OFFSET),
        ]
    }

    pub(crate) fn player(&self, player: Player) -> &ToyPlayer {
        &self.players[slot(player)]
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn presses(&self) -> u32 {
        self.presses
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub(crate) fn set_dual(&mut self, dual: bool) {
        self.dual = dual;
    }

    pub(crate) fn restart(&mut self) {
        self.players = Self::spawn_players();
        self.respawn_in = None;
        self.attempts = self.attempts.saturating_add(1);
    }

    fn active_players(&self) -> &'static [Player] {
        if self.dual {
            &Player::ALL
        } else {
            &[Player::One]
        }
    }

    fn is_dead(&self) -> bool {
        self.respawn_in.is_some()
    }

    /// Death and respawn bookkeeping, once per tick after simulation.
    /// Returns true when the level restarted.
    pub(crate) fn after_tick(&mut self) -> bool {
        if let Some(remaining) = self.respawn_in {
            if remaining == 0 {
                self.restart();
                return true;
            }
            self.respawn_in = Some(remaining - 1);
            return false;
        }
        let fell = self
            .active_players()
            .iter()
            .any(|&player| self.players[slot(player)].position.y < DEATH_Y);
        if fell {
            self.respawn_in = Some(RESPAWN_TICKS);
        }
        false
    }
}

fn slot(player: Player) -> usize {
    match player {
        Player::One => 0,
        Player::Two => 1,
    }
}

fn over_pit(x: f32) -> bool {
    let course_x = x.rem_euclid(COURSE_LENGTH);
    PITS.iter()
        .any(|&(start, end)| course_x >= start && course_x < end)
}

/// Surfaces under `x` a falling player from `from_y` to `to_y` would cross.
fn landing_surface(x: f32, from_y: f32, to_y: f32) -> Option<f32> {
    let course_x = x.rem_euclid(COURSE_LENGTH);
    let ground = (!over_pit(x)).then_some(0.0);
    let platforms = PLATFORMS
        .iter()
        .filter(|&&(start, end, _)| course_x >= start && course_x < end)
        .map(|&(_, _, top)| top);
    ground
        .into_iter()
        .chain(platforms)
        .filter(|&top| from_y >= top && to_y <= top)
        .fold(None, |best: Option<f32>, top| {
            Some(best.map_or(top, |current| current.max(top)))
        })
}

pub(crate) fn platforms() -> &'static [(f32, f32, f32)] {
    &PLATFORMS
}

pub(crate) fn pits() -> &'static [(f32, f32)] {
    &PITS
}

impl HostSimulation for ToyLevel {
    fn status(&self) -> FrameStatus {
        FrameStatus {
            level: LevelState::Playing,
            paused: self.paused,
            overlay_active: false,
            player_dead: self.is_dead(),
        }
    }

    fn is_dual(&self) -> bool {
        self.dual
    }

    fn is_platformer(&self) -> bool {
        false
    }

    fn player_motion(&self, player: Player) -> PlayerMotion {
        PlayerMotion {
            on_ground: self.players[slot(player)].on_ground,
            touching_ring: false,
            mode: MovementMode::Cube,
        }
    }

    fn position(&self, player: Player) -> Vec2 {
        self.players[slot(player)].position
    }

    fn set_last_position(&mut self, player: Player, position: Vec2) {
        self.players[slot(player)].last_position = position;
    }

    fn advance_player(&mut self, player: Player, time_factor: f32) {
        if self.is_dead() {
            return;
        }
        let dt = time_factor / NOMINAL_TPS;
        let state = &mut self.players[slot(player)];
        if state.jump_held && state.on_ground {
            state.velocity_y = JUMP_VELOCITY;
            state.on_ground = false;
        }
        state.last_position = state.position;
        if !state.on_ground {
            state.velocity_y += GRAVITY * dt;
            state.position.y += state.velocity_y * dt;
        }
        state.position.x += RUN_SPEED * dt;
    }

    fn check_collisions(&mut self, player: Player, _time_factor: f32) {
        let state = &mut self.players[slot(player)];
        if state.on_ground {
            let supported = landing_surface(
                state.position.x,
                state.position.y,
                state.position.y,
            )
            .is_some();
            if !supported {
                state.on_ground = false;
            }
            return;
        }
        if state.velocity_y > 0.0 {
            return;
        }
        if let Some(top) = landing_surface(state.position.x, state.last_position.y, state.position.y)
        {
            state.position.y = top;
            state.velocity_y = 0.0;
            state.on_ground = true;
            state.landed_on = Some(top);
        }
    }

    fn update_rotation(&mut self, player: Player, time_factor: f32) {
        let state = &mut self.players[slot(player)];
        if state.on_ground {
            state.rotation_deg = (state.rotation_deg / 90.0).round() * 90.0 % 360.0;
        } else {
            let dt = time_factor / NOMINAL_TPS;
            state.rotation_deg = (state.rotation_deg - ROTATION_SPEED_DEG * dt).rem_euclid(360.0);
        }
    }

    fn reset_collision_cache(&mut self, player: Player) {
        self.players[slot(player)].landed_on = None;
    }

    fn deliver_button(&mut self, input: &Input) {
        if input.button != PlayerButton::Jump {
            return;
        }
        let held = input.state == InputState::Press;
        if held {
            self.presses = self.presses.saturating_add(1);
        }
        self.players[slot(input.player)].jump_held = held;
    }

    fn native_update(&mut self, time_factor: f32) {
        for &player in self.active_players() {
            self.advance_player(player, time_factor);
            self.check_collisions(player, time_factor);
            self.update_rotation(player, time_factor);
        }
    }
}
