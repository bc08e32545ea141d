//! Simulated time

use std::cell::Cell;
use std::rc::Rc;

use ck590_core::Clock;

/// Nanoseconds that pass on every clock read
const STEP_NS: u64 = 100;

/// Shared virtual clock
///
/// Reading the time moves it forward a little so polling loops end;
/// delays return immediately after moving the clock by their length.
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now: Rc<Cell<u64>>,
}

impl SimClock {
    /// Clock at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `ns`
    pub fn advance(&self, ns: u64) {
        self.now.set(self.now.get().saturating_add(ns));
    }

    /// Current time without advancing it
    pub fn elapsed_ns(&self) -> u64 {
        self.now.get()
    }
}

impl Clock for SimClock {
    fn now_ns(&self) -> u64 {
        let t = self.now.get();
        self.now.set(t + STEP_NS);
        t
    }

    fn delay_ns(&mut self, ns: u64) {
        self.advance(ns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_time() {
        let clock = SimClock::new();
        let mut other = clock.clone();
        other.delay_ms(3);
        assert_eq!(clock.elapsed_ns(), 3_000_000);
        assert!(clock.now_ms() >= 3);
    }
}
