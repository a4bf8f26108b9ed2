mod collector;
mod keybinds;
mod touch;

pub use collector::{CaptureOutcome, InputCapture, RawEvent, RawSource};
pub use keybinds::{
    KeyBindings, KeyCode, KeybindSource, MouseButton, SharedKeyBindings, StaticKeybinds,
};
pub use touch::{TouchPhase, TouchTimestampBridge};

use thiserror::Error;

/// The platform could not start delivering raw input to capture.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to register raw input devices: {reason}")]
pub struct CaptureError {
    pub reason: String,
}

impl CaptureError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
