use std::collections::VecDeque;

use crate::clock::Timestamp;
use crate::input::Input;

/// Smallest factor a step may carry; stays non-zero after narrowing to `f32`.
pub const MIN_DELTA_FACTOR: f64 = f32::MIN_POSITIVE as f64;

/// Sub-steps per nominal frame.
pub const OVERSAMPLING: f64 = 4.0;

/// Frame rate the host's time factors are expressed against.
pub const NOMINAL_FRAME_RATE: f64 = 60.0;

pub const MAX_STEP_COUNT: u32 = 1024;

/// One partial physics update.
///
/// `input` is the input whose arrival ends this step; it is delivered before
/// the following step runs. `delta_factor` is the share of the whole tick this
/// step advances, and `end_step` marks the tick's last step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub input: Input,
    pub delta_factor: f64,
    pub end_step: bool,
}

impl Default for Step {
    fn default() -> Self {
        Self {
            input: Input::NONE,
            delta_factor: 1.0,
            end_step: true,
        }
    }
}

/// Number of slots for a tick of `effective_delta` seconds. Time-warp below 1
/// is divided back out so slow motion keeps the nominal slot count.
pub fn step_count(effective_delta: f32, timewarp: f32) -> u32 {
    let warp = f64::from(timewarp.min(1.0));
    let warp = if warp > 0.0 { warp } else { 1.0 };
    let raw = (f64::from(effective_delta) * NOMINAL_FRAME_RATE / warp) * OVERSAMPLING;
    let clamped = raw.max(1.0).round();
    if clamped >= f64::from(MAX_STEP_COUNT) {
        MAX_STEP_COUNT
    } else {
        clamped as u32
    }
}

/// Splits the tick `frame_start..=frame_end` into `step_count` equal slots,
/// cutting each slot again wherever a queued input lands inside it.
///
/// Inputs are consumed from the front of `inputs`; any stamped past the last
/// slot stay queued for the next tick. Inputs stamped before `frame_start`
/// land at the start of the tick. Slot-closing steps carry no input.
pub fn partition(
    inputs: &mut VecDeque<Input>,
    frame_start: Timestamp,
    frame_end: Timestamp,
    step_count: u32,
) -> Vec<Step> {
    let step_count = step_count.clamp(1, MAX_STEP_COUNT);
    let slots = Timestamp::from(step_count);
    let delta_time = frame_end.saturating_sub(frame_start).max(0);
    // +1 so integer truncation never leaves an input past the last slot.
    let step_delta = delta_time / slots + 1;
    let slot_share = 1.0 / f64::from(step_count);

    let mut steps = Vec::with_capacity(step_count as usize + inputs.len());
    for slot in 0..slots {
        let slot_end = step_delta.saturating_mul(slot + 1);
        let mut last_fraction = 0.0f64;

        while let Some(front) = inputs.front().copied() {
            let offset = front.time.saturating_sub(frame_start).max(0);
            if offset >= slot_end {
                break;
            }
            let fraction = (offset % step_delta) as f64 / step_delta as f64;
            steps.push(Step {
                input: front,
                delta_factor: tick_factor(fraction - last_fraction, slot_share),
                end_step: false,
            });
            last_fraction = fraction;
            inputs.pop_front();
        }

        steps.push(Step {
            input: Input::NONE,
            delta_factor: tick_factor(1.0 - last_fraction, slot_share),
            end_step: slot == slots - 1,
        });
    }

    debug_assert!(steps
        .iter()
        .all(|step| step.delta_factor > 0.0 && step.delta_factor <= 1.0));
    steps
}

fn tick_factor(slot_fraction: f64, slot_share: f64) -> f64 {
    (slot_fraction.clamp(MIN_DELTA_FACTOR, 1.0) * slot_share).max(MIN_DELTA_FACTOR)
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::input::{InputState, Player, PlayerButton};

    fn press(time: Timestamp) -> Input {
        Input::new(time, PlayerButton::Jump, InputState::Press, Player::One)
    }

    fn factor_sum(steps: &[Step]) -> f64 {
        steps.iter().map(|step| step.delta_factor).sum()
    }

    fn assert_complete(steps: &[Step]) {
        assert!((factor_sum(steps) - 1.0).abs() < 1e-6, "sum = {}", factor_sum(steps));
        let (last, rest) = steps.split_last().expect("at least one step");
        assert!(last.end_step);
        assert!(rest.iter().all(|step| !step.end_step));
        assert!(steps
            .iter()
            .all(|step| step.delta_factor > 0.0 && step.delta_factor <= 1.0));
    }

    #[test]
    fn nominal_frame_gets_four_slots() {
        assert_eq!(step_count(1.0 / 60.0, 1.0), 4);
    }

    #[test]
    fn slow_motion_keeps_nominal_slot_count() {
        assert_eq!(step_count(0.5 / 60.0, 0.5), 4);
    }

    #[test]
    fn fast_forward_and_long_frames_add_slots() {
        assert_eq!(step_count(2.0 / 60.0, 2.0), 8);
        assert_eq!(step_count(1.0 / 30.0, 1.0), 8);
    }

    #[test]
    fn degenerate_step_count_inputs_stay_bounded() {
        assert_eq!(step_count(0.0, 1.0), 1);
        assert_eq!(step_count(f32::NAN, 1.0), 1);
        assert_eq!(step_count(1.0 / 60.0, 0.0), 4);
        assert_eq!(step_count(f32::INFINITY, 1.0), MAX_STEP_COUNT);
    }

    #[test]
    fn two_inputs_in_a_sixteen_tick_frame() {
        let mut inputs = VecDeque::from(vec![press(1_003), press(1_011)]);
        let steps = partition(&mut inputs, 1_000, 1_016, 4);

        assert!(inputs.is_empty());
        assert_complete(&steps);

        let carrying: Vec<(usize, Timestamp)> = steps
            .iter()
            .enumerate()
            .filter(|(_, step)| !step.input.is_none())
            .map(|(index, step)| (index, step.input.time))
            .collect();
        assert_eq!(carrying, vec![(0, 1_003), (3, 1_011)]);
        assert!(carrying.iter().all(|(index, _)| !steps[*index].end_step));

        // step_delta = 16 / 4 + 1 = 5: 3 lands 3/5 into slot 0, 11 lands 1/5 into slot 2.
        let expected = [0.15, 0.1, 0.25, 0.05, 0.2, 0.25];
        assert_eq!(steps.len(), expected.len());
        for (step, expected) in steps.iter().zip(expected) {
            assert!((step.delta_factor - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn empty_tick_is_equal_slots() {
        let mut inputs = VecDeque::new();
        let steps = partition(&mut inputs, 0, 1_000, 4);
        assert_eq!(steps.len(), 4);
        assert_complete(&steps);
        assert!(steps.iter().all(|step| (step.delta_factor - 0.25).abs() < 1e-12));
        assert!(steps.iter().all(|step| step.input.is_none()));
    }

    #[test]
    fn simultaneous_inputs_get_a_positive_minimum_step() {
        let mut inputs = VecDeque::from(vec![press(5), press(5)]);
        let steps = partition(&mut inputs, 0, 16, 1);
        assert_complete(&steps);
        assert_eq!(steps[1].input.time, 5);
        assert_eq!(steps[1].delta_factor, MIN_DELTA_FACTOR);
    }

    #[test]
    fn stale_input_lands_at_tick_start() {
        let mut inputs = VecDeque::from(vec![press(90)]);
        let steps = partition(&mut inputs, 100, 116, 4);
        assert_complete(&steps);
        assert_eq!(steps[0].input.time, 90);
        assert_eq!(steps[0].delta_factor, MIN_DELTA_FACTOR);
    }

    #[test]
    fn inputs_past_the_tick_stay_queued() {
        let mut inputs = VecDeque::from(vec![press(10), press(500)]);
        let steps = partition(&mut inputs, 0, 16, 4);
        assert_complete(&steps);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].time, 500);
    }

    #[test]
    fn zero_length_tick_still_partitions() {
        let mut inputs = VecDeque::from(vec![press(40)]);
        let steps = partition(&mut inputs, 40, 40, 2);
        assert_complete(&steps);
        assert!(inputs.is_empty());
    }

    #[test]
    fn every_input_before_cutoff_appears_exactly_once() {
        let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
        for _ in 0..500 {
            let frame_start: Timestamp = rng.gen_range(1..=1_000_000);
            let delta: Timestamp = rng.gen_range(0..40_000_000);
            let frame_end = frame_start + delta;
            let count = rng.gen_range(0..12usize);
            let mut times: Vec<Timestamp> = (0..count)
                .map(|_| frame_start + rng.gen_range(0..=delta))
                .collect();
            times.sort_unstable();
            let slots = rng.gen_range(1..=16u32);

            let mut inputs: VecDeque<Input> = times.iter().copied().map(press).collect();
            let steps = partition(&mut inputs, frame_start, frame_end, slots);

            assert!(inputs.is_empty());
            assert_complete(&steps);
            let delivered: Vec<Timestamp> = steps
                .iter()
                .filter(|step| !step.input.is_none())
                .map(|step| step.input.time)
                .collect();
            assert_eq!(delivered, times);
            assert_eq!(steps.len(), times.len() + slots as usize);
        }
    }

    #[test]
    fn partition_is_deterministic() {
        let snapshot: VecDeque<Input> = [3, 3, 7, 12, 15].into_iter().map(press).collect();

        let first = partition(&mut snapshot.clone(), 0, 16, 4);
        let second = partition(&mut snapshot.clone(), 0, 16, 4);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.delta_factor.to_bits(), b.delta_factor.to_bits());
            assert_eq!(a.input, b.input);
            assert_eq!(a.end_step, b.end_step);
        }
    }
}
