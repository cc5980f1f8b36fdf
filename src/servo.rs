// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Clock servo: offset/delay estimation, smoothing, and a PI controller.
//!
//! The servo consumes the four exchange timestamps (T1 through T4),
//! computes `offsetFromMaster` and `meanPathDelay`, smooths both with an
//! adaptive exponential filter, and steers the local clock. Two correction
//! strategies exist:
//!
//! - **Slew**: for offsets within the slew range the PI controller emits a
//!   per-update adjustment, `offset/2` proportional plus an integrated
//!   drift term accumulated at `offset/8`.
//! - **Step**: offsets with a whole-seconds component, or beyond 10 ms, are
//!   corrected by rewriting the clock and reinitializing the servo.
//!
//! The P gain of 1/2 and I gain of 1/8 are deliberate fixed-point choices:
//! both are shifts in a signed 32-bit nanosecond domain, and the integral
//! term saturates at [`ADJ_FREQ_MAX`] to prevent wind-up.

use log::{debug, warn};

use crate::clock::Clock;
use crate::time::TimeInternal;

/// Saturation bound for the integrated drift term, in ns per update.
pub const ADJ_FREQ_MAX: i32 = 500_000;

/// Offsets beyond this many nanoseconds (10 ms) are stepped, not slewed.
pub const STEP_THRESHOLD_NS: i32 = 10_000_000;

/// Initial (maximum) exponential filter shift: a 2^4 sample window.
const FILTER_SHIFT: u8 = 4;

/// An exponential smoothing filter with an adaptive window.
///
/// Until enough samples have arrived to fill the nominal 2^4 window, the
/// effective shift follows `floor(log2 n)` so early samples are not drowned
/// by the zero-initialized accumulator: the first sample passes through
/// unchanged, the second averages, and so on.
#[derive(Debug)]
pub struct SmoothingFilter {
    n: u32,
    shift: u8,
    y: i32,
}

impl SmoothingFilter {
    /// Create an empty filter.
    pub fn new() -> Self {
        SmoothingFilter {
            n: 0,
            shift: FILTER_SHIFT,
            y: 0,
        }
    }

    /// Discard all history.
    pub fn reset(&mut self) {
        self.n = 0;
        self.y = 0;
    }

    /// Feed one sample and return the new smoothed value.
    pub fn feed(&mut self, sample: i32) -> i32 {
        self.n = self.n.saturating_add(1);
        let effective = self.shift.min((31 - self.n.leading_zeros()) as u8);
        // y = (y * (2^s - 1) + x) >> s, widened to avoid overflow.
        let weight = (1i64 << effective) - 1;
        self.y = ((i64::from(self.y) * weight + i64::from(sample)) >> effective) as i32;
        self.y
    }

    /// Number of samples since the last reset.
    pub fn len(&self) -> u32 {
        self.n
    }

    /// Whether no samples have been fed since the last reset.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// The current smoothed value.
    pub fn value(&self) -> i32 {
        self.y
    }
}

impl Default for SmoothingFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// The correction the servo applied in one update.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Correction {
    /// The clock was slewed; carries the PI output in nanoseconds (the
    /// clock received its negation).
    Slewed(i32),
    /// The clock was hard-stepped by the carried offset and the servo was
    /// reinitialized.
    Stepped(TimeInternal),
}

/// The clock servo state.
#[derive(Debug, Default)]
pub struct Servo {
    offset_from_master: TimeInternal,
    mean_path_delay: TimeInternal,
    /// Cached master-to-slave interval (T2 - T1) from the last Sync.
    master_to_slave_delay: TimeInternal,
    /// Slave-to-master interval (T4 - T3) from the last delay exchange.
    slave_to_master_delay: TimeInternal,
    observed_drift: i32,
    offset_filter: SmoothingFilter,
    delay_filter: SmoothingFilter,
}

impl Servo {
    /// Create a servo with zeroed state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reinitialize: zero both filters, the drift accumulator, and all
    /// cached intervals.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// The current (smoothed) offset from the master.
    pub fn offset_from_master(&self) -> TimeInternal {
        self.offset_from_master
    }

    /// The current (smoothed) one-way path delay.
    pub fn mean_path_delay(&self) -> TimeInternal {
        self.mean_path_delay
    }

    /// The integrated drift term of the PI controller.
    pub fn observed_drift(&self) -> i32 {
        self.observed_drift
    }

    /// Feed a Sync exchange: T2 is the local ingress time, T1 the master's
    /// (precise) origin timestamp.
    ///
    /// Computes `offset = (T2 - T1) - meanPathDelay` and caches `T2 - T1`
    /// for the next delay computation. Sub-second offsets run through the
    /// smoothing filter; an offset with a whole-seconds component signals a
    /// clock jump, so the filter restarts from scratch.
    pub fn update_offset(&mut self, t2: TimeInternal, t1: TimeInternal) {
        self.master_to_slave_delay = t2 - t1;
        let offset = self.master_to_slave_delay - self.mean_path_delay;
        if offset.seconds == 0 {
            let filtered = self.offset_filter.feed(offset.nanoseconds);
            self.offset_from_master = TimeInternal::new(0, filtered);
        } else {
            self.offset_filter.reset();
            self.offset_from_master = offset;
        }
        debug!("servo: offset from master {}", self.offset_from_master);
    }

    /// Feed a delay exchange: T3 is the local Delay_Req egress time, T4 the
    /// master's ingress timestamp from the Delay_Resp.
    ///
    /// `meanPathDelay = ((T2 - T1) + (T4 - T3)) / 2`, with `T2 - T1` cached
    /// from the last Sync. The same filter-reset rule as the offset path
    /// applies.
    pub fn update_delay(&mut self, t3: TimeInternal, t4: TimeInternal) {
        self.slave_to_master_delay = t4 - t3;
        let mean = (self.master_to_slave_delay + self.slave_to_master_delay).half();
        if mean.seconds == 0 {
            let filtered = self.delay_filter.feed(mean.nanoseconds);
            self.mean_path_delay = TimeInternal::new(0, filtered);
        } else {
            self.delay_filter.reset();
            self.mean_path_delay = mean;
        }
        debug!("servo: mean path delay {}", self.mean_path_delay);
    }

    /// Apply the current offset to the clock.
    ///
    /// Offsets beyond the slew range (a whole-seconds component, or more
    /// than [`STEP_THRESHOLD_NS`]) hard-step the clock and reinitialize the
    /// servo; everything else goes through the PI controller as a slew.
    pub fn update_clock<C: Clock>(&mut self, clock: &mut C) -> Correction {
        let offset = self.offset_from_master;
        if offset.seconds != 0 || offset.nanoseconds.abs() > STEP_THRESHOLD_NS {
            warn!("servo: offset {} beyond slew range, stepping clock", offset);
            let now = clock.get_time();
            clock.set_time(now - offset);
            self.reset();
            return Correction::Stepped(offset);
        }

        let offset_ns = offset.nanoseconds;
        self.observed_drift =
            (self.observed_drift + offset_ns / 8).clamp(-ADJ_FREQ_MAX, ADJ_FREQ_MAX);
        let adjustment = offset_ns / 2 + self.observed_drift;
        clock.adj_time(-adjustment);
        Correction::Slewed(adjustment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every call so the controller output is observable.
    #[derive(Debug, Default)]
    struct RecordingClock {
        now: TimeInternal,
        adjustments: Vec<i32>,
        set_calls: Vec<TimeInternal>,
    }

    impl Clock for RecordingClock {
        fn get_time(&self) -> TimeInternal {
            self.now
        }

        fn set_time(&mut self, time: TimeInternal) {
            self.set_calls.push(time);
            self.now = time;
        }

        fn adj_time(&mut self, delta_ns: i32) {
            self.adjustments.push(delta_ns);
        }
    }

    #[test]
    fn test_filter_first_sample_passes_through() {
        let mut f = SmoothingFilter::new();
        assert_eq!(f.feed(400), 400);
        assert_eq!(f.len(), 1);
    }

    #[test]
    fn test_filter_second_sample_averages() {
        let mut f = SmoothingFilter::new();
        f.feed(100);
        // n=2: effective shift 1, y = (100 * 1 + 300) >> 1 = 200.
        assert_eq!(f.feed(300), 200);
    }

    #[test]
    fn test_filter_window_caps_at_shift() {
        let mut f = SmoothingFilter::new();
        for _ in 0..100 {
            f.feed(1000);
        }
        // Converged on the constant input.
        let settled = f.value();
        assert!((settled - 1000).abs() <= 1, "settled={settled}");
        // A single outlier moves the output by roughly 1/16.
        let after = f.feed(2000);
        assert!(after > settled && after < settled + 80, "after={after}");
    }

    #[test]
    fn test_filter_reset() {
        let mut f = SmoothingFilter::new();
        f.feed(500);
        f.feed(500);
        f.reset();
        assert!(f.is_empty());
        assert_eq!(f.feed(-200), -200);
    }

    #[test]
    fn test_offset_two_step_example() {
        // Sync origin (precise, from Follow_Up) = 10.000000100,
        // ingress T2 = 10.000000500, meanPathDelay = 0.
        let mut servo = Servo::new();
        servo.update_offset(
            TimeInternal::new(10, 500),
            TimeInternal::new(10, 100),
        );
        assert_eq!(servo.offset_from_master(), TimeInternal::new(0, 400));

        let mut clock = RecordingClock::default();
        let correction = servo.update_clock(&mut clock);
        // drift = 400/8 = 50, adj = 400/2 + 50 = 250.
        assert_eq!(correction, Correction::Slewed(250));
        assert_eq!(servo.observed_drift(), 50);
        assert_eq!(clock.adjustments, vec![-250]);
    }

    #[test]
    fn test_offset_uses_mean_path_delay() {
        let mut servo = Servo::new();
        // Establish a 100 ns path delay: T_ms = 300, T_sm = -100,
        // mean = (300 - 100) / 2 = 100.
        servo.update_offset(TimeInternal::new(0, 300), TimeInternal::ZERO);
        servo.update_delay(TimeInternal::new(0, 400), TimeInternal::new(0, 300));
        assert_eq!(servo.mean_path_delay(), TimeInternal::new(0, 100));

        // Next sync: raw interval 300 ns minus 100 ns delay = 200 ns offset.
        servo.update_offset(TimeInternal::new(5, 300), TimeInternal::new(5, 0));
        // Filter has seen 300 then 200: (300 * 1 + 200) >> 1 = 250.
        assert_eq!(servo.offset_from_master(), TimeInternal::new(0, 250));
    }

    #[test]
    fn test_hard_step_on_seconds_offset() {
        let mut servo = Servo::new();
        // Local clock two seconds ahead of the master.
        servo.update_offset(TimeInternal::new(12, 0), TimeInternal::new(10, 0));

        let mut clock = RecordingClock {
            now: TimeInternal::new(12, 0),
            ..Default::default()
        };
        let correction = servo.update_clock(&mut clock);
        assert_eq!(correction, Correction::Stepped(TimeInternal::new(2, 0)));
        // setTime(getTime() - offset) lands on the master's time.
        assert_eq!(clock.set_calls, vec![TimeInternal::new(10, 0)]);
        assert!(clock.adjustments.is_empty());
        // The step reinitialized the servo.
        assert_eq!(servo.observed_drift(), 0);
        assert_eq!(servo.offset_from_master(), TimeInternal::ZERO);
    }

    #[test]
    fn test_hard_step_on_large_subsecond_offset() {
        let mut servo = Servo::new();
        // 20 ms: within one second but beyond the slew threshold.
        servo.update_offset(TimeInternal::new(0, 20_000_000), TimeInternal::ZERO);
        let mut clock = RecordingClock::default();
        assert!(matches!(
            servo.update_clock(&mut clock),
            Correction::Stepped(_)
        ));
        assert_eq!(clock.set_calls.len(), 1);
    }

    #[test]
    fn test_slew_at_threshold_boundary() {
        let mut servo = Servo::new();
        // Exactly 10 ms still slews (strict greater-than steps).
        servo.update_offset(TimeInternal::new(0, STEP_THRESHOLD_NS), TimeInternal::ZERO);
        let mut clock = RecordingClock::default();
        assert!(matches!(
            servo.update_clock(&mut clock),
            Correction::Slewed(_)
        ));
    }

    #[test]
    fn test_drift_clamped() {
        let mut servo = Servo::new();
        let mut clock = RecordingClock::default();
        // Repeated large offsets integrate 10^7/8 per update; the drift
        // term must saturate at ADJ_FREQ_MAX.
        for _ in 0..10 {
            servo.offset_filter.reset();
            servo.update_offset(
                TimeInternal::new(0, STEP_THRESHOLD_NS),
                TimeInternal::ZERO,
            );
            servo.update_clock(&mut clock);
            assert!(servo.observed_drift() <= ADJ_FREQ_MAX);
            assert!(servo.observed_drift() >= -ADJ_FREQ_MAX);
        }
        assert_eq!(servo.observed_drift(), ADJ_FREQ_MAX);
    }

    #[test]
    fn test_drift_clamped_negative() {
        let mut servo = Servo::new();
        let mut clock = RecordingClock::default();
        for _ in 0..10 {
            servo.offset_filter.reset();
            servo.update_offset(
                TimeInternal::new(0, -STEP_THRESHOLD_NS),
                TimeInternal::ZERO,
            );
            servo.update_clock(&mut clock);
        }
        assert_eq!(servo.observed_drift(), -ADJ_FREQ_MAX);
    }

    #[test]
    fn test_offset_filter_reset_on_jump() {
        let mut servo = Servo::new();
        servo.update_offset(TimeInternal::new(0, 100), TimeInternal::ZERO);
        servo.update_offset(TimeInternal::new(0, 100), TimeInternal::ZERO);
        assert_eq!(servo.offset_filter.len(), 2);

        // A jump with a seconds component flushes the filter history.
        servo.update_offset(TimeInternal::new(3, 0), TimeInternal::ZERO);
        assert!(servo.offset_filter.is_empty());
        assert_eq!(servo.offset_from_master(), TimeInternal::new(3, 0));
    }

    #[test]
    fn test_delay_negative_mean_resets_filter() {
        let mut servo = Servo::new();
        // A bogus exchange producing a multi-second "delay".
        servo.update_offset(TimeInternal::new(10, 0), TimeInternal::new(2, 0));
        servo.update_delay(TimeInternal::new(0, 0), TimeInternal::new(2, 0));
        assert!(servo.delay_filter.is_empty());
        assert_eq!(servo.mean_path_delay(), TimeInternal::new(5, 0));
    }

    #[test]
    fn test_slew_converges_constant_offset() {
        // A constant small offset must shrink under repeated corrections
        // when the clock actually applies them.
        let mut servo = Servo::new();
        let mut offset_ns: i64 = 8000;
        for _ in 0..50 {
            servo.offset_filter.reset();
            servo.update_offset(TimeInternal::new(0, offset_ns as i32), TimeInternal::ZERO);
            let mut clock = RecordingClock::default();
            match servo.update_clock(&mut clock) {
                Correction::Slewed(adj) => offset_ns -= i64::from(adj),
                Correction::Stepped(_) => panic!("unexpected step"),
            }
        }
        assert!(
            offset_ns.abs() < 800,
            "offset should converge, still {offset_ns}"
        );
    }
}
