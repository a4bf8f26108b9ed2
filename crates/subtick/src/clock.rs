use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Monotonic clock ticks. The process-wide unit is nanoseconds.
pub type Timestamp = i64;

pub const TICKS_PER_SECOND: Timestamp = 1_000_000_000;

/// Two inputs inside one 480 Hz interval must still be told apart.
pub const MAX_CLOCK_RESOLUTION: Duration = Duration::from_nanos(1_000_000_000 / 480);

const PROBE_READS: u32 = 1_000_000;
const PROBE_SAMPLES: u32 = 3;

pub trait Clock: Send + Sync {
    /// Never returns 0; that value marks "no input".
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClockError {
    #[error("clock did not advance after {reads} reads")]
    Stalled { reads: u32 },
    #[error("clock went backwards from {earlier} to {later}")]
    WentBackwards { earlier: Timestamp, later: Timestamp },
    #[error("clock resolution {resolution:?} is coarser than the required {required:?}")]
    TooCoarse {
        resolution: Duration,
        required: Duration,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        let elapsed = self.origin.elapsed().as_nanos();
        Timestamp::try_from(elapsed)
            .unwrap_or(Timestamp::MAX - 1)
            .saturating_add(1)
    }
}

/// Checks that `clock` advances monotonically and finely enough for sub-tick
/// scheduling. Returns the smallest increment observed.
pub fn probe_clock(clock: &dyn Clock) -> Result<Duration, ClockError> {
    let mut finest: Option<Timestamp> = None;
    let mut previous = clock.now();

    for _ in 0..PROBE_SAMPLES {
        let mut advanced = None;
        for _ in 0..PROBE_READS {
            let next = clock.now();
            if next < previous {
                return Err(ClockError::WentBackwards {
                    earlier: previous,
                    later: next,
                });
            }
            if next > previous {
                advanced = Some(next - previous);
                previous = next;
                break;
            }
        }
        let Some(step) = advanced else {
            return Err(ClockError::Stalled { reads: PROBE_READS });
        };
        finest = Some(finest.map_or(step, |current| current.min(step)));
    }

    let ticks = finest.unwrap_or(TICKS_PER_SECOND).max(0);
    let resolution = ticks_to_duration(ticks);
    if resolution > MAX_CLOCK_RESOLUTION {
        return Err(ClockError::TooCoarse {
            resolution,
            required: MAX_CLOCK_RESOLUTION,
        });
    }
    Ok(resolution)
}

pub fn ticks_to_duration(ticks: Timestamp) -> Duration {
    Duration::from_nanos(u64::try_from(ticks).unwrap_or(0))
}

pub fn duration_to_ticks(duration: Duration) -> Timestamp {
    Timestamp::try_from(duration.as_nanos()).unwrap_or(Timestamp::MAX)
}

/// Clock driven by the caller. Used by hosts that stamp events themselves and
/// by tests that need exact timestamps.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(start.max(1)),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now.max(1), Ordering::SeqCst);
    }

    pub fn advance(&self, ticks: Timestamp) -> Timestamp {
        self.now.fetch_add(ticks, Ordering::SeqCst) + ticks
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
