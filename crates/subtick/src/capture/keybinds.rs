use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::input::{GameAction, ACTION_COUNT};
use crate::sync::lock_or_recover;

const KEYBINDS_LOCK: &str = "keybinds";

/// Raw platform key identifier (a virtual-key code on desktop platforms).
pub type KeyCode = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Other(u16),
}

/// Where the live binding table is rebuilt from on level (re)start.
pub trait KeybindSource {
    fn keys_for(&self, action: GameAction) -> Vec<KeyCode>;
}

/// Fixed binding set, for hosts without a configurable binding manager.
#[derive(Debug, Clone, Default)]
pub struct StaticKeybinds {
    keys: HashMap<GameAction, Vec<KeyCode>>,
}

impl StaticKeybinds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, action: GameAction, keys: &[KeyCode]) -> Self {
        self.keys.entry(action).or_default().extend_from_slice(keys);
        self
    }
}

impl KeybindSource for StaticKeybinds {
    fn keys_for(&self, action: GameAction) -> Vec<KeyCode> {
        self.keys.get(&action).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct KeyBindings {
    binds: [HashSet<KeyCode>; ACTION_COUNT],
    right_click_p2_jump: bool,
}

impl KeyBindings {
    pub fn from_source(source: &dyn KeybindSource, right_click_p2_jump: bool) -> Self {
        let mut bindings = Self {
            right_click_p2_jump,
            ..Self::default()
        };
        for action in GameAction::ALL {
            for key in source.keys_for(action) {
                bindings.bind(action, key);
            }
        }
        bindings
    }

    pub fn bind(&mut self, action: GameAction, key: KeyCode) {
        self.binds[action.index()].insert(key);
    }

    /// First match in [`GameAction::ALL`] order wins, so a key bound for both
    /// players drives player one.
    pub fn resolve_key(&self, key: KeyCode) -> Option<GameAction> {
        GameAction::ALL
            .into_iter()
            .find(|action| self.binds[action.index()].contains(&key))
    }

    pub fn resolve_mouse(&self, button: MouseButton) -> Option<GameAction> {
        match button {
            MouseButton::Left => Some(GameAction::P1Jump),
            MouseButton::Right if self.right_click_p2_jump => Some(GameAction::P2Jump),
            MouseButton::Right | MouseButton::Other(_) => None,
        }
    }

    pub fn right_click_p2_jump(&self) -> bool {
        self.right_click_p2_jump
    }

    pub fn bound_key_count(&self) -> usize {
        self.binds.iter().map(HashSet::len).sum()
    }
}

/// The binding table shared between the capture thread (reads) and the
/// level-load/settings path (writes). Its lock is independent of the input
/// queue lock and is never held while pushing.
#[derive(Debug, Clone, Default)]
pub struct SharedKeyBindings {
    inner: Arc<Mutex<KeyBindings>>,
}

impl SharedKeyBindings {
    pub fn new(bindings: KeyBindings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bindings)),
        }
    }

    pub fn rebuild(&self, source: &dyn KeybindSource, right_click_p2_jump: bool) {
        let rebuilt = KeyBindings::from_source(source, right_click_p2_jump);
        let bound_keys = rebuilt.bound_key_count();
        *lock_or_recover(&self.inner, KEYBINDS_LOCK) = rebuilt;
        debug!(bound_keys, right_click_p2_jump, "keybinds_rebuilt");
    }

    pub fn set_right_click_p2_jump(&self, enabled: bool) {
        lock_or_recover(&self.inner, KEYBINDS_LOCK).right_click_p2_jump = enabled;
    }

    pub fn resolve_key(&self, key: KeyCode) -> Option<GameAction> {
        lock_or_recover(&self.inner, KEYBINDS_LOCK).resolve_key(key)
    }

    pub fn resolve_mouse(&self, button: MouseButton) -> Option<GameAction> {
        lock_or_recover(&self.inner, KEYBINDS_LOCK).resolve_mouse(button)
    }

    pub fn snapshot(&self) -> KeyBindings {
        lock_or_recover(&self.inner, KEYBINDS_LOCK).clone()
    }
}
