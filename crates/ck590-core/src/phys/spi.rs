//! Serial-peripheral drivers
//!
//! [`HwSpi`] drives a hardware controller through its data register and
//! "transfer complete" flag; [`BitbangSpi`] clocks GPIO lines through
//! [`BitbangSpiMaster`]. Both support several chip-select lines.

use super::bitbang::{self, BitbangSpiMaster};
use super::SpiBus;
use crate::error::BusError;

/// Polls of the transfer-complete flag before a byte transfer times out
pub const TRANSFER_TIMEOUT_POLLS: u32 = 10_000;

/// Register-level access to a hardware serial-peripheral controller
pub trait SpiPeripheral {
    /// Number of chip-select lines wired to the controller
    fn cs_count(&self) -> u8;

    /// Power and configure the controller (mode 0, master)
    fn set_enabled(&mut self, enabled: bool);

    /// Drive chip-select `line` (true = asserted)
    fn set_cs(&mut self, line: u8, asserted: bool);

    /// Load the data register, starting a transfer
    fn write_data(&mut self, byte: u8);

    /// Transfer-complete flag
    fn transfer_complete(&mut self) -> bool;

    /// Read the data register, clearing the flag
    fn read_data(&mut self) -> u8;
}

/// Hardware serial-peripheral master
pub struct HwSpi<P> {
    periph: P,
    cs: u8,
}

impl<P: SpiPeripheral> HwSpi<P> {
    /// Wrap a controller; chip select 0 is chosen
    pub fn new(periph: P) -> Self {
        Self { periph, cs: 0 }
    }

    /// Borrow the controller
    pub fn peripheral(&self) -> &P {
        &self.periph
    }

    fn transfer(&mut self, out: u8) -> Result<u8, BusError> {
        self.periph.write_data(out);
        let mut countdown = TRANSFER_TIMEOUT_POLLS;
        while !self.periph.transfer_complete() {
            if countdown == 0 {
                return Err(BusError::Timeout);
            }
            countdown -= 1;
        }
        Ok(self.periph.read_data())
    }
}

impl<P: SpiPeripheral> SpiBus for HwSpi<P> {
    fn enable(&mut self) {
        self.periph.set_enabled(true);
    }

    fn disable(&mut self) {
        for line in 0..self.periph.cs_count() {
            self.periph.set_cs(line, false);
        }
        self.periph.set_enabled(false);
    }

    fn select_device(&mut self, index: u8) -> Result<(), BusError> {
        if index >= self.periph.cs_count() {
            return Err(BusError::CommFail);
        }
        self.cs = index;
        Ok(())
    }

    fn select(&mut self) {
        self.periph.set_cs(self.cs, true);
    }

    fn deselect(&mut self) {
        self.periph.set_cs(self.cs, false);
    }

    fn send_bytes(&mut self, data: &[u8]) -> Result<(), BusError> {
        for &byte in data {
            self.transfer(byte)?;
        }
        Ok(())
    }

    fn receive_bytes(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        for byte in buf.iter_mut() {
            *byte = self.transfer(0x00)?;
        }
        Ok(())
    }
}

/// GPIO serial-peripheral master
pub struct BitbangSpi<M> {
    master: M,
    enabled: bool,
}

impl<M: BitbangSpiMaster> BitbangSpi<M> {
    /// Wrap a set of lines
    pub fn new(master: M) -> Self {
        Self {
            master,
            enabled: false,
        }
    }

    /// Borrow the lines
    pub fn master(&self) -> &M {
        &self.master
    }
}

impl<M: BitbangSpiMaster> SpiBus for BitbangSpi<M> {
    fn enable(&mut self) {
        self.master.request_bus();
        self.master.set_cs(false);
        self.master.set_sck(false);
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.master.set_cs(false);
        self.master.release_bus();
        self.enabled = false;
    }

    fn select_device(&mut self, index: u8) -> Result<(), BusError> {
        if self.master.route_cs(index) {
            Ok(())
        } else {
            Err(BusError::CommFail)
        }
    }

    fn select(&mut self) {
        self.master.set_cs(true);
        self.master.half_period_delay();
    }

    fn deselect(&mut self) {
        bitbang::single::idle_clock(&mut self.master);
        self.master.set_cs(false);
        self.master.half_period_delay();
    }

    fn send_bytes(&mut self, data: &[u8]) -> Result<(), BusError> {
        if !self.enabled {
            return Err(BusError::CommFail);
        }
        bitbang::single::write_bytes(&mut self.master, data);
        Ok(())
    }

    fn receive_bytes(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        if !self.enabled {
            return Err(BusError::CommFail);
        }
        bitbang::single::read_bytes(&mut self.master, buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    struct Registers {
        lines: u8,
        enabled: bool,
        cs: [bool; 2],
        sent: Vec<u8>,
        rx: Vec<u8>,
        busy_polls: u32,
        polls_left: u32,
    }

    impl Registers {
        fn new(busy_polls: u32) -> Self {
            Self {
                lines: 2,
                enabled: false,
                cs: [false; 2],
                sent: Vec::new(),
                rx: Vec::new(),
                busy_polls,
                polls_left: 0,
            }
        }
    }

    impl SpiPeripheral for Registers {
        fn cs_count(&self) -> u8 {
            self.lines
        }
        fn set_enabled(&mut self, enabled: bool) {
            self.enabled = enabled;
        }
        fn set_cs(&mut self, line: u8, asserted: bool) {
            self.cs[line as usize] = asserted;
        }
        fn write_data(&mut self, byte: u8) {
            self.sent.push(byte);
            self.polls_left = self.busy_polls;
        }
        fn transfer_complete(&mut self) -> bool {
            if self.polls_left == 0 {
                return true;
            }
            self.polls_left -= 1;
            false
        }
        fn read_data(&mut self) -> u8 {
            if self.rx.is_empty() {
                0xFF
            } else {
                self.rx.remove(0)
            }
        }
    }

    #[test]
    fn test_transfer_waits_for_flag() {
        let mut spi = HwSpi::new(Registers::new(3));
        spi.enable();
        spi.periph.rx = std::vec![0xAB];
        let mut buf = [0u8; 1];
        spi.receive_bytes(&mut buf).unwrap();
        assert_eq!(buf, [0xAB]);
    }

    #[test]
    fn test_transfer_times_out() {
        let mut spi = HwSpi::new(Registers::new(u32::MAX));
        spi.enable();
        assert_eq!(spi.send_bytes(&[0x05]), Err(BusError::Timeout));
    }

    #[test]
    fn test_second_chip_select() {
        let mut spi = HwSpi::new(Registers::new(0));
        spi.select_device(1).unwrap();
        spi.select();
        assert_eq!(spi.peripheral().cs, [false, true]);
        spi.deselect();
        assert_eq!(spi.peripheral().cs, [false, false]);
        assert_eq!(spi.select_device(2), Err(BusError::CommFail));
    }

    #[test]
    fn test_disable_releases_all_selects() {
        let mut spi = HwSpi::new(Registers::new(0));
        spi.enable();
        spi.select();
        spi.disable();
        assert!(!spi.peripheral().enabled);
        assert_eq!(spi.peripheral().cs, [false, false]);
    }
}
