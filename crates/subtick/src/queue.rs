use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::clock::{Clock, Timestamp};
use crate::input::Input;
use crate::sync::lock_or_recover;

const QUEUE_LOCK: &str = "input_queue";

/// Time-ordered hand-off between the input thread and the simulation thread.
///
/// Clones share the same queue. One mutex guards the whole collection and is
/// only held for a push or for a bounded drain.
#[derive(Debug, Clone, Default)]
pub struct InputQueue {
    inner: Arc<Mutex<VecDeque<Input>>>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts after every queued input stamped at or before `input.time`, so
    /// the queue stays sorted and equal stamps keep arrival order.
    pub fn push(&self, input: Input) {
        let mut queue = lock_or_recover(&self.inner, QUEUE_LOCK);
        match queue.back() {
            Some(last) if last.time > input.time => {
                let index = queue.partition_point(|queued| queued.time <= input.time);
                queue.insert(index, input);
            }
            _ => queue.push_back(input),
        }
    }

    /// Immediate-cutoff drain: samples `now` and takes every queued input in a
    /// single critical section, appending them to `into`. Returns the cutoff.
    pub fn drain_now(&self, clock: &dyn Clock, into: &mut VecDeque<Input>) -> Timestamp {
        let mut queue = lock_or_recover(&self.inner, QUEUE_LOCK);
        let cutoff = clock.now();
        if into.is_empty() {
            std::mem::swap(&mut *queue, into);
        } else {
            into.append(&mut queue);
        }
        cutoff
    }

    /// Pre-computed-cutoff drain: moves the leading inputs stamped at or
    /// before `cutoff` into `into` and leaves later ones queued.
    pub fn drain_up_to(&self, cutoff: Timestamp, into: &mut VecDeque<Input>) -> usize {
        let mut queue = lock_or_recover(&self.inner, QUEUE_LOCK);
        let mut moved = 0;
        while let Some(front) = queue.front() {
            if front.time > cutoff {
                break;
            }
            if let Some(input) = queue.pop_front() {
                into.push_back(input);
                moved += 1;
            }
        }
        moved
    }

    pub fn clear(&self) {
        lock_or_recover(&self.inner, QUEUE_LOCK).clear();
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.inner, QUEUE_LOCK).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
