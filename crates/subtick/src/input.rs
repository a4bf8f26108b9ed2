use crate::clock::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Player {
    #[default]
    One,
    Two,
}

impl Player {
    pub const ALL: [Player; 2] = [Player::One, Player::Two];

    pub(crate) const fn index(self) -> usize {
        match self {
            Player::One => 0,
            Player::Two => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlayerButton {
    #[default]
    Jump,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InputState {
    #[default]
    Press,
    Release,
}

impl InputState {
    pub fn from_pressed(pressed: bool) -> Self {
        if pressed {
            InputState::Press
        } else {
            InputState::Release
        }
    }

    pub fn is_press(self) -> bool {
        self == InputState::Press
    }
}

/// One timestamped button transition for a player.
///
/// A zero `time` is reserved for [`Input::NONE`]; capture never produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Input {
    pub time: Timestamp,
    pub button: PlayerButton,
    pub state: InputState,
    pub player: Player,
}

impl Input {
    pub const NONE: Input = Input {
        time: 0,
        button: PlayerButton::Jump,
        state: InputState::Press,
        player: Player::One,
    };

    pub fn new(time: Timestamp, button: PlayerButton, state: InputState, player: Player) -> Self {
        Self {
            time,
            button,
            state,
            player,
        }
    }

    pub fn is_none(&self) -> bool {
        self.time == 0
    }
}

/// The six bindable actions, in keybind resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameAction {
    P1Jump,
    P1Left,
    P1Right,
    P2Jump,
    P2Left,
    P2Right,
}

pub(crate) const ACTION_COUNT: usize = 6;

impl GameAction {
    pub const ALL: [GameAction; ACTION_COUNT] = [
        GameAction::P1Jump,
        GameAction::P1Left,
        GameAction::P1Right,
        GameAction::P2Jump,
        GameAction::P2Left,
        GameAction::P2Right,
    ];

    pub(crate) const fn index(self) -> usize {
        match self {
            GameAction::P1Jump => 0,
            GameAction::P1Left => 1,
            GameAction::P1Right => 2,
            GameAction::P2Jump => 3,
            GameAction::P2Left => 4,
            GameAction::P2Right => 5,
        }
    }

    pub const fn player(self) -> Player {
        match self {
            GameAction::P1Jump | GameAction::P1Left | GameAction::P1Right => Player::One,
            GameAction::P2Jump | GameAction::P2Left | GameAction::P2Right => Player::Two,
        }
    }

    pub const fn button(self) -> PlayerButton {
        match self {
            GameAction::P1Jump | GameAction::P2Jump => PlayerButton::Jump,
            GameAction::P1Left | GameAction::P2Left => PlayerButton::Left,
            GameAction::P1Right | GameAction::P2Right => PlayerButton::Right,
        }
    }
}
