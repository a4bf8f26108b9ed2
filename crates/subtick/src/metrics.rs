use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::sync::{read_or_recover, write_or_recover};

const METRICS_LOCK: &str = "pipeline_metrics";

pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineMetricsSnapshot {
    /// Ticks per second over the last interval, skipped ticks included.
    pub tps: f32,
    pub skipped_ticks: u32,
    pub stepped_ticks: u32,
    pub avg_steps_per_tick: f32,
    pub inputs_delivered: u32,
}

#[derive(Clone, Debug, Default)]
pub struct MetricsHandle {
    snapshot: Arc<RwLock<PipelineMetricsSnapshot>>,
}

impl MetricsHandle {
    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        *read_or_recover(&self.snapshot, METRICS_LOCK)
    }

    pub(crate) fn publish(&self, snapshot: PipelineMetricsSnapshot) {
        *write_or_recover(&self.snapshot, METRICS_LOCK) = snapshot;
    }
}

#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Instant,
    interval: Duration,
    skipped_ticks: u32,
    stepped_ticks: u32,
    steps: u32,
    inputs_delivered: u32,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval_start: Instant::now(),
            interval,
            skipped_ticks: 0,
            stepped_ticks: 0,
            steps: 0,
            inputs_delivered: 0,
        }
    }

    pub(crate) fn record_skipped_tick(&mut self) {
        self.skipped_ticks = self.skipped_ticks.saturating_add(1);
    }

    pub(crate) fn record_stepped_tick(&mut self, steps: usize, inputs_delivered: usize) {
        self.stepped_ticks = self.stepped_ticks.saturating_add(1);
        self.steps = self
            .steps
            .saturating_add(u32::try_from(steps).unwrap_or(u32::MAX));
        self.inputs_delivered = self
            .inputs_delivered
            .saturating_add(u32::try_from(inputs_delivered).unwrap_or(u32::MAX));
    }

    pub(crate) fn maybe_snapshot(&mut self, now: Instant) -> Option<PipelineMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let ticks = self.skipped_ticks.saturating_add(self.stepped_ticks);
        let avg_steps_per_tick = if self.stepped_ticks == 0 {
            0.0
        } else {
            self.steps as f32 / self.stepped_ticks as f32
        };

        let snapshot = PipelineMetricsSnapshot {
            tps: ticks as f32 / elapsed_seconds,
            skipped_ticks: self.skipped_ticks,
            stepped_ticks: self.stepped_ticks,
            avg_steps_per_tick,
            inputs_delivered: self.inputs_delivered,
        };

        self.interval_start = now;
        self.skipped_ticks = 0;
        self.stepped_ticks = 0;
        self.steps = 0;
        self.inputs_delivered = 0;

        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn poison_lock(lock: &RwLock<PipelineMetricsSnapshot>) {
        thread::scope(|scope| {
            let _ = scope
                .spawn(|| {
                    let _guard = lock.write().expect("write guard");
                    panic!("poison metrics lock");
                })
                .join();
        });
    }

    #[test]
    fn snapshot_computes_expected_values() {
        let mut accumulator = MetricsAccumulator::new(Duration::from_secs(1));
        let base = Instant::now();

        accumulator.record_skipped_tick();
        accumulator.record_stepped_tick(4, 0);
        accumulator.record_stepped_tick(6, 2);
        accumulator.record_stepped_tick(5, 1);

        let snapshot = accumulator
            .maybe_snapshot(base + Duration::from_secs(1))
            .expect("snapshot should be emitted");

        assert!((snapshot.tps - 4.0).abs() < 0.05);
        assert_eq!(snapshot.skipped_ticks, 1);
        assert_eq!(snapshot.stepped_ticks, 3);
        assert!((snapshot.avg_steps_per_tick - 5.0).abs() < 0.001);
        assert_eq!(snapshot.inputs_delivered, 3);
    }

    #[test]
    fn counters_reset_after_each_snapshot() {
        let mut accumulator = MetricsAccumulator::new(Duration::from_secs(1));
        let base = Instant::now();
        accumulator.record_stepped_tick(4, 1);
        accumulator
            .maybe_snapshot(base + Duration::from_secs(1))
            .expect("first snapshot");

        let second = accumulator
            .maybe_snapshot(base + Duration::from_secs(3))
            .expect("second snapshot");
        assert_eq!(second.stepped_ticks, 0);
        assert_eq!(second.avg_steps_per_tick, 0.0);
    }

    #[test]
    fn snapshot_not_emitted_before_interval() {
        let mut accumulator = MetricsAccumulator::new(Duration::from_secs(1));
        let base = Instant::now();
        accumulator.record_skipped_tick();

        assert!(accumulator
            .maybe_snapshot(base + Duration::from_millis(500))
            .is_none());
    }

    #[test]
    fn snapshot_recovers_after_poison_without_panic() {
        let handle = MetricsHandle::default();
        poison_lock(handle.snapshot.as_ref());

        assert_eq!(handle.snapshot(), PipelineMetricsSnapshot::default());
    }

    #[test]
    fn publish_recovers_after_poison_without_panic() {
        let handle = MetricsHandle::default();
        poison_lock(handle.snapshot.as_ref());

        let expected = PipelineMetricsSnapshot {
            tps: 60.0,
            skipped_ticks: 2,
            stepped_ticks: 58,
            avg_steps_per_tick: 4.1,
            inputs_delivered: 9,
        };
        handle.publish(expected);
        assert_eq!(handle.snapshot(), expected);
    }
}
