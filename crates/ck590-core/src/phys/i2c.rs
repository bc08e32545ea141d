//! Two-wire bit-bang driver
//!
//! Open-drain SDA/SCL handled through [`I2cLines`]. Every phase is held
//! for at least the minimum the bus specification allows at the chosen
//! speed, and SCL is read back after release so a slave stretching the
//! clock is honoured (bounded by `stretch_timeout_ns`).

use super::I2cBus;
use crate::clock::{Clock, Deadline};
use crate::error::BusError;

/// Open-drain two-wire lines
///
/// Setting a line high releases it to the pull-up.
pub trait I2cLines {
    /// Drive or release SDA
    fn set_sda(&mut self, high: bool);

    /// Drive or release SCL
    fn set_scl(&mut self, high: bool);

    /// Sample SDA
    fn sda(&mut self) -> bool;

    /// Sample SCL
    fn scl(&mut self) -> bool;
}

/// Minimum hold times for one bus speed, in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(serde::Deserialize))]
pub struct I2cTiming {
    /// SCL low period (tLOW)
    pub low_ns: u64,
    /// SCL high period (tHIGH)
    pub high_ns: u64,
    /// Setup time for a repeated start (tSU;STA)
    pub setup_start_ns: u64,
    /// Hold time after a start (tHD;STA)
    pub hold_start_ns: u64,
    /// Setup time for a stop (tSU;STO)
    pub setup_stop_ns: u64,
    /// Bus free time between stop and start (tBUF)
    pub bus_free_ns: u64,
    /// How long a slave may stretch the clock
    pub stretch_timeout_ns: u64,
}

/// Standard mode, 100 kHz
pub const STANDARD_MODE: I2cTiming = I2cTiming {
    low_ns: 4_700,
    high_ns: 4_000,
    setup_start_ns: 4_700,
    hold_start_ns: 4_000,
    setup_stop_ns: 4_000,
    bus_free_ns: 4_700,
    stretch_timeout_ns: 1_000_000,
};

/// Fast mode, 400 kHz
pub const FAST_MODE: I2cTiming = I2cTiming {
    low_ns: 1_300,
    high_ns: 600,
    setup_start_ns: 600,
    hold_start_ns: 600,
    setup_stop_ns: 600,
    bus_free_ns: 1_300,
    stretch_timeout_ns: 1_000_000,
};

impl Default for I2cTiming {
    fn default() -> Self {
        STANDARD_MODE
    }
}

/// Two-wire master over [`I2cLines`]
pub struct I2cBitbang<L, C> {
    lines: L,
    clock: C,
    timing: I2cTiming,
    enabled: bool,
}

impl<L: I2cLines, C: Clock> I2cBitbang<L, C> {
    /// Create a disabled driver
    pub fn new(lines: L, clock: C, timing: I2cTiming) -> Self {
        Self {
            lines,
            clock,
            timing,
            enabled: false,
        }
    }

    /// Borrow the underlying lines
    pub fn lines(&self) -> &L {
        &self.lines
    }

    /// Release SCL and wait for it to actually go high
    fn scl_high(&mut self) -> Result<(), BusError> {
        self.lines.set_scl(true);
        let deadline = Deadline::after_ns(&self.clock, self.timing.stretch_timeout_ns);
        while !self.lines.scl() {
            if deadline.expired(&self.clock) {
                return Err(BusError::Timeout);
            }
        }
        Ok(())
    }

    /// Clock one bit out; SCL is low on entry and on exit
    fn write_bit(&mut self, high: bool) -> Result<(), BusError> {
        self.lines.set_sda(high);
        self.clock.delay_ns(self.timing.low_ns);
        self.scl_high()?;
        self.clock.delay_ns(self.timing.high_ns);
        self.lines.set_scl(false);
        Ok(())
    }

    /// Clock one bit in; SCL is low on entry and on exit
    fn read_bit(&mut self) -> Result<bool, BusError> {
        self.lines.set_sda(true);
        self.clock.delay_ns(self.timing.low_ns);
        self.scl_high()?;
        let bit = self.lines.sda();
        self.clock.delay_ns(self.timing.high_ns);
        self.lines.set_scl(false);
        Ok(bit)
    }

    /// Send a byte and report whether the slave acknowledged it
    fn write_byte(&mut self, byte: u8) -> Result<bool, BusError> {
        for i in (0..8).rev() {
            self.write_bit(byte & (1 << i) != 0)?;
        }
        // ACK is SDA pulled low by the slave during the ninth clock
        Ok(!self.read_bit()?)
    }

    fn read_byte(&mut self, ack: bool) -> Result<u8, BusError> {
        let mut byte = 0u8;
        for _ in 0..8 {
            byte <<= 1;
            if self.read_bit()? {
                byte |= 1;
            }
        }
        self.write_bit(!ack)?;
        self.lines.set_sda(true);
        Ok(byte)
    }
}

impl<L: I2cLines, C: Clock> I2cBus for I2cBitbang<L, C> {
    fn enable(&mut self) {
        self.lines.set_sda(true);
        self.lines.set_scl(true);
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.lines.set_sda(true);
        self.lines.set_scl(true);
        self.enabled = false;
    }

    fn send_start(&mut self) -> Result<(), BusError> {
        if !self.enabled {
            return Err(BusError::CommFail);
        }
        self.lines.set_sda(true);
        self.scl_high()?;
        self.clock.delay_ns(self.timing.setup_start_ns);
        if !self.lines.sda() {
            // Someone else is holding SDA
            return Err(BusError::CommFail);
        }
        self.lines.set_sda(false);
        self.clock.delay_ns(self.timing.hold_start_ns);
        self.lines.set_scl(false);
        Ok(())
    }

    fn send_stop(&mut self) -> Result<(), BusError> {
        if !self.enabled {
            return Err(BusError::CommFail);
        }
        self.lines.set_sda(false);
        self.clock.delay_ns(self.timing.low_ns);
        self.scl_high()?;
        self.clock.delay_ns(self.timing.setup_stop_ns);
        self.lines.set_sda(true);
        self.clock.delay_ns(self.timing.bus_free_ns);
        Ok(())
    }

    fn send_bytes(&mut self, data: &[u8]) -> Result<(), BusError> {
        if !self.enabled {
            return Err(BusError::CommFail);
        }
        for &byte in data {
            if !self.write_byte(byte)? {
                return Err(BusError::Nack);
            }
        }
        Ok(())
    }

    fn receive_byte(&mut self) -> Result<u8, BusError> {
        if !self.enabled {
            return Err(BusError::CommFail);
        }
        self.read_byte(true)
    }

    fn receive_bytes(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        if !self.enabled {
            return Err(BusError::CommFail);
        }
        let last = buf.len().saturating_sub(1);
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.read_byte(i != last)?;
        }
        self.send_stop()
    }

    fn wake_pulse(&mut self, low_us: u32) {
        self.lines.set_sda(false);
        self.clock.delay_us(low_us);
        self.lines.set_sda(true);
    }
}
