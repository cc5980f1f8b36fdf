// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Local clock abstraction: a free-running tick counter plus a software
//! offset.
//!
//! Two adjustment strategies are available, mirroring the usual clock
//! discipline split:
//!
//! - **Slew**: [`Clock::adj_time`] adds nanoseconds to a software offset, so
//!   subsequent readings incorporate the correction continuously with no
//!   discontinuity. Preferred for small offsets.
//! - **Step**: [`Clock::set_time`] rewrites the counter itself. Used for
//!   large offsets and initial synchronization.
//!
//! The servo decides which strategy to apply; this module only provides the
//! mechanics. [`SoftwareClock`] implements both over any [`TickCounter`],
//! taking care of the consistent two-register read of a 64-bit counter.

use crate::error::PtpError;
use crate::time::{TimeInternal, NSEC_PER_SEC};

/// A free-running 64-bit hardware tick counter, exposed as two 32-bit
/// registers.
///
/// The split read models cascaded 32-bit timers; [`SoftwareClock`] performs
/// the high/low/high retry dance so implementors only need raw register
/// access. Reads must be monotonic while the counter runs.
pub trait TickCounter {
    /// Bring the counter up and start it from zero.
    ///
    /// Failure here is fatal to the endpoint: the port never leaves
    /// INITIALIZING without a working counter.
    fn init(&mut self) -> Result<(), PtpError>;

    /// Read the low 32 bits of the counter.
    fn read_low(&self) -> u32;

    /// Read the high 32 bits of the counter.
    fn read_high(&self) -> u32;

    /// Stop counting; reads return the frozen value.
    fn stop(&mut self);

    /// Resume counting from the current value.
    fn start(&mut self);

    /// Load a new counter value while stopped.
    fn load(&mut self, ticks: u64);

    /// The counter frequency in Hz.
    fn frequency_hz(&self) -> u64;
}

/// The local-clock operations the servo and protocol engine need.
pub trait Clock {
    /// Read the current time.
    ///
    /// Strictly increasing across successive calls separated by at least a
    /// nanosecond of real time, absent [`set_time`](Clock::set_time) or an
    /// out-of-range slew.
    fn get_time(&self) -> TimeInternal;

    /// Hard-step the clock to `time`. Clears any accumulated slew offset.
    fn set_time(&mut self, time: TimeInternal);

    /// Slew the clock by adding `delta_ns` to the software offset.
    fn adj_time(&mut self, delta_ns: i32);
}

/// A local clock built from a [`TickCounter`] and a software slew offset.
#[derive(Debug)]
pub struct SoftwareClock<T: TickCounter> {
    counter: T,
    /// Accumulated slew corrections, applied on every read.
    offset_ns: i64,
}

impl<T: TickCounter> SoftwareClock<T> {
    /// Initialize the counter and wrap it into a clock.
    pub fn new(mut counter: T) -> Result<Self, PtpError> {
        counter.init()?;
        Ok(SoftwareClock {
            counter,
            offset_ns: 0,
        })
    }

    /// Read the raw 64-bit tick value consistently.
    ///
    /// Reads high, low, high again and retries if the high word changed,
    /// so a carry between the two registers can never be observed torn.
    fn read_ticks(&self) -> u64 {
        loop {
            let high1 = self.counter.read_high();
            let low = self.counter.read_low();
            let high2 = self.counter.read_high();
            if high1 == high2 {
                return (u64::from(high2) << 32) | u64::from(low);
            }
        }
    }

    /// Access the underlying counter.
    pub fn counter(&self) -> &T {
        &self.counter
    }

    /// Mutable access to the underlying counter.
    pub fn counter_mut(&mut self) -> &mut T {
        &mut self.counter
    }
}

impl<T: TickCounter> Clock for SoftwareClock<T> {
    fn get_time(&self) -> TimeInternal {
        let ticks = self.read_ticks();
        let freq = self.counter.frequency_hz().max(1);
        let ns = u128::from(ticks) * NSEC_PER_SEC as u128 / u128::from(freq);
        // Counter nanoseconds fit i64 for centuries of uptime; the widened
        // sum keeps the conversion exact before narrowing.
        let total = ns as i128 + i128::from(self.offset_ns);
        TimeInternal::new((total / i128::from(NSEC_PER_SEC)) as i64, (total % i128::from(NSEC_PER_SEC)) as i32)
    }

    fn set_time(&mut self, time: TimeInternal) {
        let freq = self.counter.frequency_hz().max(1);
        let total_ns = time.total_nanos().max(0);
        let ticks = (total_ns as u128 * u128::from(freq) / NSEC_PER_SEC as u128) as u64;
        self.counter.stop();
        self.counter.load(ticks);
        self.counter.start();
        self.offset_ns = 0;
    }

    fn adj_time(&mut self, delta_ns: i32) {
        self.offset_ns += i64::from(delta_ns);
    }
}

/// A deterministic tick counter for tests and simulation.
///
/// Time advances only through [`advance_ns`](SimulatedCounter::advance_ns),
/// so protocol scenarios can pin every timestamp exactly.
#[derive(Debug, Default)]
pub struct SimulatedCounter {
    ticks: u64,
    running: bool,
}

impl SimulatedCounter {
    /// Create a stopped counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the counter by the given number of nanoseconds.
    ///
    /// The simulated frequency is 1 GHz, so ticks are nanoseconds.
    pub fn advance_ns(&mut self, ns: u64) {
        if self.running {
            self.ticks = self.ticks.wrapping_add(ns);
        }
    }
}

impl TickCounter for SimulatedCounter {
    fn init(&mut self) -> Result<(), PtpError> {
        self.ticks = 0;
        self.running = true;
        Ok(())
    }

    fn read_low(&self) -> u32 {
        self.ticks as u32
    }

    fn read_high(&self) -> u32 {
        (self.ticks >> 32) as u32
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn start(&mut self) {
        self.running = true;
    }

    fn load(&mut self, ticks: u64) {
        self.ticks = ticks;
    }

    fn frequency_hz(&self) -> u64 {
        NSEC_PER_SEC as u64
    }
}

/// A hosted tick counter backed by [`std::time::Instant`].
///
/// Runs at a nominal 1 GHz (nanosecond ticks). Useful when the endpoint
/// runs as an ordinary process without hardware timestamping.
#[derive(Debug)]
pub struct MonotonicCounter {
    origin: std::time::Instant,
    base_ticks: u64,
    running: bool,
}

impl MonotonicCounter {
    /// Create a stopped counter at zero.
    pub fn new() -> Self {
        MonotonicCounter {
            origin: std::time::Instant::now(),
            base_ticks: 0,
            running: false,
        }
    }

    fn current(&self) -> u64 {
        if self.running {
            self.base_ticks
                .wrapping_add(self.origin.elapsed().as_nanos() as u64)
        } else {
            self.base_ticks
        }
    }
}

impl Default for MonotonicCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TickCounter for MonotonicCounter {
    fn init(&mut self) -> Result<(), PtpError> {
        self.origin = std::time::Instant::now();
        self.base_ticks = 0;
        self.running = true;
        Ok(())
    }

    fn read_low(&self) -> u32 {
        self.current() as u32
    }

    fn read_high(&self) -> u32 {
        (self.current() >> 32) as u32
    }

    fn stop(&mut self) {
        self.base_ticks = self.current();
        self.running = false;
    }

    fn start(&mut self) {
        self.origin = std::time::Instant::now();
        self.running = true;
    }

    fn load(&mut self, ticks: u64) {
        self.base_ticks = ticks;
    }

    fn frequency_hz(&self) -> u64 {
        NSEC_PER_SEC as u64
    }
}
