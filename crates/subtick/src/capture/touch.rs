use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::clock::Timestamp;
use crate::input::{Input, InputState, Player, PlayerButton};

use super::collector::{CaptureOutcome, InputCapture};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Began,
    Moved,
    Ended,
    Cancelled,
}

/// Pairs touch events with the timestamp a touch platform announces just
/// before delivering them.
///
/// The announcement can come from a different thread than the touch
/// dispatch, so the pending stamp lives in an atomic. Stamps must already be
/// in clock ticks.
#[derive(Debug, Clone, Default)]
pub struct TouchTimestampBridge {
    pending: Arc<AtomicI64>,
}

impl TouchTimestampBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_next_timestamp(&self, timestamp: Timestamp) {
        self.pending.store(timestamp, Ordering::Release);
    }

    fn take_timestamp(&self) -> Option<Timestamp> {
        let stamp = self.pending.swap(0, Ordering::AcqRel);
        (stamp > 0).then_some(stamp)
    }

    /// Began/ended touches become player-one jump presses/releases. Other
    /// phases are ignored and leave the pending stamp in place.
    pub fn on_touch(&self, phase: TouchPhase, capture: &InputCapture) -> Option<CaptureOutcome> {
        let state = match phase {
            TouchPhase::Began => InputState::Press,
            TouchPhase::Ended => InputState::Release,
            TouchPhase::Moved | TouchPhase::Cancelled => return None,
        };
        let Some(time) = self.take_timestamp() else {
            return Some(CaptureOutcome::InvalidTimestamp);
        };
        Some(capture.enqueue(Input::new(
            time,
            PlayerButton::Jump,
            state,
            Player::One,
        )))
    }
}
