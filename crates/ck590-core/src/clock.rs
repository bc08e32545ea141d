//! Monotonic time source and busy-wait delays
//!
//! All chip timing (bit pulses, wake pulses, execution delays, polling
//! budgets) goes through this trait so the drivers never depend on
//! instruction counts.

/// Monotonic clock with busy-wait delays
///
/// Implementations must be cheap to clone; every driver keeps its own
/// handle to the same underlying time source.
pub trait Clock: Clone {
    /// Nanoseconds since an arbitrary fixed origin
    fn now_ns(&self) -> u64;

    /// Block for at least `ns` nanoseconds
    fn delay_ns(&mut self, ns: u64) {
        let start = self.now_ns();
        while self.now_ns().wrapping_sub(start) < ns {
            core::hint::spin_loop();
        }
    }

    /// Block for at least `us` microseconds
    fn delay_us(&mut self, us: u32) {
        self.delay_ns(u64::from(us) * 1_000);
    }

    /// Block for at least `ms` milliseconds
    fn delay_ms(&mut self, ms: u32) {
        self.delay_ns(u64::from(ms) * 1_000_000);
    }

    /// Milliseconds since the clock origin
    fn now_ms(&self) -> u64 {
        self.now_ns() / 1_000_000
    }
}

/// A point in time after which a polling loop gives up
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at_ns: u64,
}

impl Deadline {
    /// Deadline `ns` nanoseconds from now
    pub fn after_ns<C: Clock>(clock: &C, ns: u64) -> Self {
        Self {
            at_ns: clock.now_ns().saturating_add(ns),
        }
    }

    /// Deadline `us` microseconds from now
    pub fn after_us<C: Clock>(clock: &C, us: u32) -> Self {
        Self::after_ns(clock, u64::from(us) * 1_000)
    }

    /// Deadline `ms` milliseconds from now
    pub fn after_ms<C: Clock>(clock: &C, ms: u32) -> Self {
        Self::after_ns(clock, u64::from(ms) * 1_000_000)
    }

    /// True once the deadline has passed
    pub fn expired<C: Clock>(&self, clock: &C) -> bool {
        clock.now_ns() >= self.at_ns
    }
}
