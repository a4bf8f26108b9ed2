use std::collections::HashSet;
use std::sync::Arc;

use tracing::trace;

use crate::clock::{Clock, Timestamp};
use crate::input::{Input, InputState};
use crate::queue::InputQueue;

use super::keybinds::{KeyCode, MouseButton, SharedKeyBindings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawSource {
    Key { code: KeyCode, pressed: bool },
    Mouse { button: MouseButton, pressed: bool },
}

/// A hardware event as the platform delivered it. `timestamp` is the
/// platform's own stamp when it has one, in clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub source: RawSource,
    pub timestamp: Option<Timestamp>,
}

impl RawEvent {
    pub fn key(code: KeyCode, pressed: bool) -> Self {
        Self {
            source: RawSource::Key { code, pressed },
            timestamp: None,
        }
    }

    pub fn mouse(button: MouseButton, pressed: bool) -> Self {
        Self {
            source: RawSource::Mouse { button, pressed },
            timestamp: None,
        }
    }

    pub fn stamped(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// What capture did with an event. Every outcome means the event was
/// consumed and must not also reach the host's default input handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Queued(Input),
    Repeat,
    Unbound,
    InvalidTimestamp,
}

/// Turns raw events into timestamped [`Input`]s on the input thread.
///
/// The held-key set is owned here and never shared; only the queue and the
/// keybinding table cross threads.
pub struct InputCapture {
    clock: Arc<dyn Clock>,
    queue: InputQueue,
    keybinds: SharedKeyBindings,
    held_keys: HashSet<KeyCode>,
}

impl InputCapture {
    pub fn new(clock: Arc<dyn Clock>, queue: InputQueue, keybinds: SharedKeyBindings) -> Self {
        Self {
            clock,
            queue,
            keybinds,
            held_keys: HashSet::new(),
        }
    }

    pub fn handle(&mut self, event: RawEvent) -> CaptureOutcome {
        // Stamp before any lookup so the time reflects delivery, not processing.
        let time = event.timestamp.unwrap_or_else(|| self.clock.now());
        if time <= 0 {
            return CaptureOutcome::InvalidTimestamp;
        }

        let (action, pressed) = match event.source {
            RawSource::Key { code, pressed } => {
                if self.held_keys.contains(&code) {
                    if pressed {
                        return CaptureOutcome::Repeat;
                    }
                    self.held_keys.remove(&code);
                } else if pressed {
                    // Tracked even when unbound so its auto-repeat stays quiet.
                    self.held_keys.insert(code);
                }
                let Some(action) = self.keybinds.resolve_key(code) else {
                    return CaptureOutcome::Unbound;
                };
                (action, pressed)
            }
            RawSource::Mouse { button, pressed } => {
                let Some(action) = self.keybinds.resolve_mouse(button) else {
                    return CaptureOutcome::Unbound;
                };
                (action, pressed)
            }
        };

        self.enqueue(Input::new(
            time,
            action.button(),
            InputState::from_pressed(pressed),
            action.player(),
        ))
    }

    /// Pushes an already-resolved input, rejecting the reserved zero stamp
    /// and anything before it.
    pub fn enqueue(&self, input: Input) -> CaptureOutcome {
        if input.time <= 0 {
            return CaptureOutcome::InvalidTimestamp;
        }
        self.queue.push(input);
        trace!(
            time = input.time,
            player = ?input.player,
            button = ?input.button,
            state = ?input.state,
            "input_queued"
        );
        CaptureOutcome::Queued(input)
    }

    /// Drops held-key tracking, e.g. when the window loses focus and
    /// releases may never arrive.
    pub fn release_all_held(&mut self) {
        self.held_keys.clear();
    }

    pub fn held_key_count(&self) -> usize {
        self.held_keys.len()
    }
}
