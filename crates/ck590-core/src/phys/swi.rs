//! Single-wire bit-bang driver
//!
//! Bytes go out LSB first, one bit per 8-pulse window. A logic one is a
//! single low pulse at the start of the window; a logic zero adds a
//! second low pulse two pulse-widths later. Receiving works the other way
//! round: wait for the start pulse, then look for a second falling edge
//! inside a short window.

use super::SwiBus;
use crate::clock::{Clock, Deadline};
use crate::error::BusError;

/// Width of one signal pulse
pub const BIT_PULSE_NS: u64 = 4_340;

/// Pulses per bit window
pub const PULSES_PER_BIT: u64 = 8;

/// Gap the device needs to turn its line around before we transmit
pub const TURNAROUND_NS: u64 = 15_000;

/// How long to wait for the start pulse of a bit
pub const START_PULSE_TIMEOUT_NS: u64 = 86_000;

/// Window after the start pulse in which a second falling edge means zero
pub const ZERO_PULSE_TIMEOUT_NS: u64 = 10_000;

/// Pin table behind a single-wire bus
///
/// Lines are open-drain: `release` lets the pull-up take the line high.
pub trait SwiPort {
    /// Number of pins in the table
    fn pin_count(&self) -> u8;

    /// Prepare a pin for use
    fn open(&mut self, pin: u8);

    /// Return a pin to its idle, unconfigured state
    fn close(&mut self, pin: u8);

    /// Pull the line low
    fn drive_low(&mut self, pin: u8);

    /// Release the line
    fn release(&mut self, pin: u8);

    /// Sample the line
    fn is_high(&mut self, pin: u8) -> bool;
}

/// Single-wire master over a [`SwiPort`]
pub struct SwiBitbang<P, C> {
    port: P,
    clock: C,
    pin: u8,
    open: bool,
}

impl<P: SwiPort, C: Clock> SwiBitbang<P, C> {
    /// Create a driver; pin 0 is selected and the channel is closed
    pub fn new(port: P, clock: C) -> Self {
        Self {
            port,
            clock,
            pin: 0,
            open: false,
        }
    }

    /// Currently selected pin index
    pub fn selected(&self) -> u8 {
        self.pin
    }

    /// Borrow the underlying port
    pub fn port(&self) -> &P {
        &self.port
    }

    fn send_bit(&mut self, one: bool) {
        let pin = self.pin;
        self.port.drive_low(pin);
        self.clock.delay_ns(BIT_PULSE_NS);
        self.port.release(pin);
        if one {
            self.clock.delay_ns(BIT_PULSE_NS * (PULSES_PER_BIT - 1));
        } else {
            self.clock.delay_ns(BIT_PULSE_NS);
            self.port.drive_low(pin);
            self.clock.delay_ns(BIT_PULSE_NS);
            self.port.release(pin);
            self.clock.delay_ns(BIT_PULSE_NS * (PULSES_PER_BIT - 3));
        }
    }

    /// Spin until the line reads `high`, or the timeout runs out
    fn wait_for(&mut self, high: bool, timeout_ns: u64) -> bool {
        let deadline = Deadline::after_ns(&self.clock, timeout_ns);
        let pin = self.pin;
        loop {
            if self.port.is_high(pin) == high {
                return true;
            }
            if deadline.expired(&self.clock) {
                return false;
            }
        }
    }

    fn receive_bit(&mut self) -> Option<bool> {
        if !self.wait_for(false, START_PULSE_TIMEOUT_NS) {
            return None;
        }
        if !self.wait_for(true, START_PULSE_TIMEOUT_NS) {
            return None;
        }
        if self.wait_for(false, ZERO_PULSE_TIMEOUT_NS) {
            if !self.wait_for(true, START_PULSE_TIMEOUT_NS) {
                return None;
            }
            Some(false)
        } else {
            Some(true)
        }
    }
}

impl<P: SwiPort, C: Clock> SwiBus for SwiBitbang<P, C> {
    fn pin_count(&self) -> u8 {
        self.port.pin_count()
    }

    fn enable(&mut self) {
        self.port.open(self.pin);
        self.port.release(self.pin);
        self.open = true;
    }

    fn disable(&mut self) {
        self.port.close(self.pin);
        self.open = false;
    }

    fn select(&mut self, pin: u8) {
        if pin >= self.port.pin_count() {
            log::warn!("swi: pin index {} outside pin table, ignored", pin);
            return;
        }
        if self.open && pin != self.pin {
            self.port.close(self.pin);
            self.port.open(pin);
            self.port.release(pin);
        }
        self.pin = pin;
    }

    fn wake_pulse(&mut self, low_us: u32) {
        let pin = self.pin;
        self.port.drive_low(pin);
        self.clock.delay_us(low_us);
        self.port.release(pin);
    }

    fn send_bytes(&mut self, data: &[u8]) -> Result<(), BusError> {
        if data.is_empty() {
            return Err(BusError::CommFail);
        }
        self.clock.delay_ns(TURNAROUND_NS);
        for &byte in data {
            for bit in 0..8 {
                self.send_bit(byte & (1 << bit) != 0);
            }
        }
        Ok(())
    }

    fn receive_bytes(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        self.port.release(self.pin);
        for i in 0..buf.len() {
            let mut value = 0u8;
            for bit in 0..8 {
                match self.receive_bit() {
                    Some(true) => value |= 1 << bit,
                    Some(false) => {}
                    None => {
                        return Err(if i > 0 {
                            BusError::RxFail
                        } else {
                            BusError::Timeout
                        });
                    }
                }
            }
            buf[i] = value;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::fake::FakeClock;
    use std::vec::Vec;

    /// Records every level change on pin 0 with its timestamp, and plays
    /// back a device waveform starting at `reply_at`
    struct ScopePort {
        clock: FakeClock,
        edges: Vec<(u64, bool)>,
        reply: Vec<u8>,
        reply_at: u64,
        pins: u8,
        opened: Vec<u8>,
    }

    impl ScopePort {
        fn new(clock: FakeClock) -> Self {
            Self {
                clock,
                edges: Vec::new(),
                reply: Vec::new(),
                reply_at: 0,
                pins: 4,
                opened: Vec::new(),
            }
        }

        /// Line level the simulated device drives at time `t`
        fn device_level(&self, t: u64) -> bool {
            if t < self.reply_at {
                return true;
            }
            let bit_ns = BIT_PULSE_NS * PULSES_PER_BIT;
            let offset = t - self.reply_at;
            let index = (offset / bit_ns) as usize;
            if index >= self.reply.len() * 8 {
                return true;
            }
            let one = self.reply[index / 8] & (1 << (index % 8)) != 0;
            let pulse = (offset % bit_ns) / BIT_PULSE_NS;
            match pulse {
                0 => false,
                2 => one,
                _ => true,
            }
        }
    }

    impl SwiPort for ScopePort {
        fn pin_count(&self) -> u8 {
            self.pins
        }
        fn open(&mut self, pin: u8) {
            self.opened.push(pin);
        }
        fn close(&mut self, _pin: u8) {}
        fn drive_low(&mut self, _pin: u8) {
            self.edges.push((self.clock.peek(), false));
        }
        fn release(&mut self, _pin: u8) {
            self.edges.push((self.clock.peek(), true));
        }
        fn is_high(&mut self, _pin: u8) -> bool {
            let t = self.clock.peek();
            self.device_level(t)
        }
    }

    /// Low-pulse widths and the gaps between them, in order
    fn low_pulses(edges: &[(u64, bool)]) -> Vec<(u64, u64)> {
        let mut pulses = Vec::new();
        for pair in edges.windows(2) {
            if let [(t0, false), (t1, true)] = pair {
                pulses.push((*t0, t1 - t0));
            }
        }
        pulses
    }

    #[test]
    fn test_send_byte_pulse_encoding() {
        let clock = FakeClock::new();
        let mut bus = SwiBitbang::new(ScopePort::new(clock.clone()), clock);
        bus.enable();
        bus.send_bytes(&[0x01]).unwrap();

        let pulses = low_pulses(&bus.port.edges);
        // bit 0 is a one (1 pulse), bits 1..8 are zeros (2 pulses each)
        assert_eq!(pulses.len(), 1 + 7 * 2);
        for (_, width) in &pulses {
            assert!(*width >= BIT_PULSE_NS, "pulse of {} ns too short", width);
        }
        // Each bit window starts a full 8 pulses after the previous one
        let bit_starts: Vec<u64> = [0usize, 1, 3, 5]
            .iter()
            .map(|&i| pulses[i].0)
            .collect();
        for w in bit_starts.windows(2) {
            assert!(w[1] - w[0] >= BIT_PULSE_NS * PULSES_PER_BIT);
        }
    }

    #[test]
    fn test_send_waits_turnaround_first() {
        let clock = FakeClock::new();
        let mut bus = SwiBitbang::new(ScopePort::new(clock.clone()), clock.clone());
        bus.enable();
        let start = clock.peek();
        bus.send_bytes(&[0xFF]).unwrap();
        let first_low = low_pulses(&bus.port.edges)[0].0;
        assert!(first_low - start >= TURNAROUND_NS);
    }

    #[test]
    fn test_send_empty_is_rejected() {
        let clock = FakeClock::new();
        let mut bus = SwiBitbang::new(ScopePort::new(clock.clone()), clock);
        assert_eq!(bus.send_bytes(&[]), Err(BusError::CommFail));
    }

    #[test]
    fn test_wake_pulse_width() {
        let clock = FakeClock::new();
        let mut bus = SwiBitbang::new(ScopePort::new(clock.clone()), clock);
        bus.wake_pulse(60);
        let pulses = low_pulses(&bus.port.edges);
        assert_eq!(pulses.len(), 1);
        assert!(pulses[0].1 >= 60_000);
    }

    #[test]
    fn test_receive_decodes_waveform() {
        let clock = FakeClock::new();
        let mut port = ScopePort::new(clock.clone());
        port.reply = std::vec![0x04, 0x11, 0x33, 0x43];
        port.reply_at = 20_000;
        let mut bus = SwiBitbang::new(port, clock);
        let mut buf = [0u8; 4];
        bus.receive_bytes(&mut buf).unwrap();
        assert_eq!(buf, [0x04, 0x11, 0x33, 0x43]);
    }

    #[test]
    fn test_receive_short_reply_is_rx_fail() {
        let clock = FakeClock::new();
        let mut port = ScopePort::new(clock.clone());
        port.reply = std::vec![0x04, 0x11];
        port.reply_at = 20_000;
        let mut bus = SwiBitbang::new(port, clock);
        let mut buf = [0u8; 4];
        assert_eq!(bus.receive_bytes(&mut buf), Err(BusError::RxFail));
        assert_eq!(&buf[..2], &[0x04, 0x11]);
    }

    #[test]
    fn test_receive_silence_is_timeout() {
        let clock = FakeClock::new();
        let mut port = ScopePort::new(clock.clone());
        port.reply_at = u64::MAX;
        let mut bus = SwiBitbang::new(port, clock);
        let mut buf = [0u8; 4];
        assert_eq!(bus.receive_bytes(&mut buf), Err(BusError::Timeout));
    }

    #[test]
    fn test_select_out_of_range_is_ignored() {
        let clock = FakeClock::new();
        let mut bus = SwiBitbang::new(ScopePort::new(clock.clone()), clock);
        bus.select(2);
        bus.select(9);
        assert_eq!(bus.selected(), 2);
    }
}
