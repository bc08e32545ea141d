//! Physical adapters for the AES132 framing layer
//!
//! Both buses expose the chip as a 16-bit address space; the adapters only
//! know how to read and write it.

use super::{spi_op, StatusReg, STATUS_ADDR};
use crate::error::{Aes132Error, BusError};
use crate::phys::{I2cBus, SpiBus};

/// Memory access the framing layer needs from a bus
pub trait Aes132Phy {
    /// Write `data` starting at `address`
    fn write_memory(&mut self, address: u16, data: &[u8]) -> Result<(), Aes132Error>;

    /// Fill `buf` starting at `address`
    fn read_memory(&mut self, address: u16, buf: &mut [u8]) -> Result<(), Aes132Error>;

    /// Read the device status register
    fn read_status(&mut self) -> Result<StatusReg, Aes132Error> {
        let mut byte = [0u8; 1];
        self.read_memory(STATUS_ADDR, &mut byte)?;
        Ok(StatusReg::from_bits_retain(byte[0]))
    }

    /// Select the device by two-wire address or chip-select index
    fn select(&mut self, id: u8) -> Result<(), Aes132Error>;

    /// Bring the bus back to a known state
    fn resync(&mut self) -> Result<(), Aes132Error>;

    /// Enable the bus
    fn enable(&mut self);

    /// Disable the bus
    fn disable(&mut self);
}

impl<P: Aes132Phy + ?Sized> Aes132Phy for &mut P {
    fn write_memory(&mut self, address: u16, data: &[u8]) -> Result<(), Aes132Error> {
        (**self).write_memory(address, data)
    }
    fn read_memory(&mut self, address: u16, buf: &mut [u8]) -> Result<(), Aes132Error> {
        (**self).read_memory(address, buf)
    }
    fn read_status(&mut self) -> Result<StatusReg, Aes132Error> {
        (**self).read_status()
    }
    fn select(&mut self, id: u8) -> Result<(), Aes132Error> {
        (**self).select(id)
    }
    fn resync(&mut self) -> Result<(), Aes132Error> {
        (**self).resync()
    }
    fn enable(&mut self) {
        (**self).enable()
    }
    fn disable(&mut self) {
        (**self).disable()
    }
}

/// AES132 on the two-wire bus
pub struct I2cAes132<'a, T> {
    bus: &'a mut T,
    address: u8,
}

impl<'a, T: I2cBus> I2cAes132<'a, T> {
    /// Adapter for the chip at 8-bit `address`
    pub fn new(bus: &'a mut T, address: u8) -> Self {
        Self {
            bus,
            address: address & !1,
        }
    }

    /// Currently selected address
    pub fn address(&self) -> u8 {
        self.address
    }

    fn send_slave_address(&mut self, read: bool) -> Result<(), Aes132Error> {
        self.bus.send_start()?;
        if let Err(e) = self.bus.send_bytes(&[self.address | u8::from(read)]) {
            let _ = self.bus.send_stop();
            return Err(match e {
                BusError::Nack if read => Aes132Error::AddressReadNack,
                BusError::Nack => Aes132Error::AddressWriteNack,
                other => other.into(),
            });
        }
        Ok(())
    }

    fn send_or_stop(&mut self, data: &[u8]) -> Result<(), Aes132Error> {
        if let Err(e) = self.bus.send_bytes(data) {
            let _ = self.bus.send_stop();
            return Err(e.into());
        }
        Ok(())
    }
}

impl<T: I2cBus> Aes132Phy for I2cAes132<'_, T> {
    fn write_memory(&mut self, address: u16, data: &[u8]) -> Result<(), Aes132Error> {
        self.send_slave_address(false)?;
        self.send_or_stop(&address.to_be_bytes())?;
        if !data.is_empty() {
            self.send_or_stop(data)?;
        }
        self.bus.send_stop()?;
        Ok(())
    }

    fn read_memory(&mut self, address: u16, buf: &mut [u8]) -> Result<(), Aes132Error> {
        if buf.is_empty() {
            return Ok(());
        }
        self.send_slave_address(false)?;
        self.send_or_stop(&address.to_be_bytes())?;
        self.send_slave_address(true)?;
        self.bus.receive_bytes(buf)?;
        Ok(())
    }

    fn select(&mut self, id: u8) -> Result<(), Aes132Error> {
        self.address = id & !1;
        Ok(())
    }

    fn resync(&mut self) -> Result<(), Aes132Error> {
        // A start followed by a stop resets the chip's two-wire state machine
        self.bus.send_start()?;
        self.bus.send_stop()?;
        Ok(())
    }

    fn enable(&mut self) {
        self.bus.enable();
    }

    fn disable(&mut self) {
        self.bus.disable();
    }
}

/// AES132 on the serial-peripheral bus
pub struct SpiAes132<'a, S> {
    bus: &'a mut S,
}

impl<'a, S: SpiBus> SpiAes132<'a, S> {
    /// Adapter for the chip on the currently chosen chip select
    pub fn new(bus: &'a mut S) -> Self {
        Self { bus }
    }

    fn transaction(&mut self, header: &[u8], data: &[u8]) -> Result<(), Aes132Error> {
        self.bus.select();
        let result = self
            .bus
            .send_bytes(header)
            .and_then(|()| self.bus.send_bytes(data));
        self.bus.deselect();
        result.map_err(Aes132Error::from)
    }
}

impl<S: SpiBus> Aes132Phy for SpiAes132<'_, S> {
    fn write_memory(&mut self, address: u16, data: &[u8]) -> Result<(), Aes132Error> {
        self.transaction(&[spi_op::WREN], &[])?;
        let [hi, lo] = address.to_be_bytes();
        self.transaction(&[spi_op::WRITE, hi, lo], data)
    }

    fn read_memory(&mut self, address: u16, buf: &mut [u8]) -> Result<(), Aes132Error> {
        let [hi, lo] = address.to_be_bytes();
        self.bus.select();
        let result = self
            .bus
            .send_bytes(&[spi_op::READ, hi, lo])
            .and_then(|()| self.bus.receive_bytes(buf));
        self.bus.deselect();
        result.map_err(Aes132Error::from)
    }

    fn read_status(&mut self) -> Result<StatusReg, Aes132Error> {
        let mut byte = [0u8; 1];
        self.bus.select();
        let result = self
            .bus
            .send_bytes(&[spi_op::RDSR])
            .and_then(|()| self.bus.receive_bytes(&mut byte));
        self.bus.deselect();
        result?;
        Ok(StatusReg::from_bits_retain(byte[0]))
    }

    fn select(&mut self, id: u8) -> Result<(), Aes132Error> {
        self.bus
            .select_device(id)
            .map_err(|_| Aes132Error::DeviceSelectFail)
    }

    fn resync(&mut self) -> Result<(), Aes132Error> {
        self.bus.deselect();
        self.transaction(&[spi_op::WRDI], &[])
    }

    fn enable(&mut self) {
        self.bus.enable();
    }

    fn disable(&mut self) {
        self.bus.disable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    #[derive(Debug, PartialEq)]
    enum Ev {
        Start,
        Stop,
        Tx(Vec<u8>),
        Rx(usize),
    }

    #[derive(Default)]
    struct LogI2c {
        log: Vec<Ev>,
        nack: Option<u8>,
    }

    impl I2cBus for LogI2c {
        fn enable(&mut self) {}
        fn disable(&mut self) {}
        fn send_start(&mut self) -> Result<(), BusError> {
            self.log.push(Ev::Start);
            Ok(())
        }
        fn send_stop(&mut self) -> Result<(), BusError> {
            self.log.push(Ev::Stop);
            Ok(())
        }
        fn send_bytes(&mut self, data: &[u8]) -> Result<(), BusError> {
            self.log.push(Ev::Tx(data.to_vec()));
            if Some(data[0]) == self.nack {
                return Err(BusError::Nack);
            }
            Ok(())
        }
        fn receive_byte(&mut self) -> Result<u8, BusError> {
            Ok(0)
        }
        fn receive_bytes(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
            self.log.push(Ev::Rx(buf.len()));
            buf.fill(0x04);
            self.log.push(Ev::Stop);
            Ok(())
        }
        fn wake_pulse(&mut self, _low_us: u32) {}
    }

    #[test]
    fn test_i2c_status_read_sequence() {
        let mut bus = LogI2c::default();
        let status = I2cAes132::new(&mut bus, 0xA0).read_status().unwrap();
        assert_eq!(status, StatusReg::WAKE);
        assert_eq!(
            bus.log,
            [
                Ev::Start,
                Ev::Tx(std::vec![0xA0]),
                Ev::Tx(std::vec![0xFF, 0xF0]),
                Ev::Start,
                Ev::Tx(std::vec![0xA1]),
                Ev::Rx(1),
                Ev::Stop,
            ]
        );
    }

    #[test]
    fn test_i2c_read_nack_stops_bus() {
        let mut bus = LogI2c {
            nack: Some(0xA1),
            ..Default::default()
        };
        let mut buf = [0u8; 4];
        let result = I2cAes132::new(&mut bus, 0xA0).read_memory(0xFE00, &mut buf);
        assert_eq!(result, Err(Aes132Error::AddressReadNack));
        assert_eq!(bus.log.last(), Some(&Ev::Stop));
    }

    #[test]
    fn test_i2c_write_nack_code() {
        let mut bus = LogI2c {
            nack: Some(0xA0),
            ..Default::default()
        };
        let result = I2cAes132::new(&mut bus, 0xA0).write_memory(0xFE00, &[9]);
        assert_eq!(result.map_err(Aes132Error::code), Err(0xA0));
    }

    #[derive(Default)]
    struct LogSpi {
        frames: Vec<Vec<u8>>,
        current: Vec<u8>,
        selected: bool,
    }

    impl SpiBus for LogSpi {
        fn enable(&mut self) {}
        fn disable(&mut self) {}
        fn select_device(&mut self, index: u8) -> Result<(), BusError> {
            if index > 1 {
                return Err(BusError::CommFail);
            }
            Ok(())
        }
        fn select(&mut self) {
            self.selected = true;
        }
        fn deselect(&mut self) {
            if self.selected {
                self.frames.push(core::mem::take(&mut self.current));
            }
            self.selected = false;
        }
        fn send_bytes(&mut self, data: &[u8]) -> Result<(), BusError> {
            self.current.extend_from_slice(data);
            Ok(())
        }
        fn receive_bytes(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
            buf.fill(0x40);
            Ok(())
        }
    }

    #[test]
    fn test_spi_write_sets_latch_first() {
        let mut bus = LogSpi::default();
        SpiAes132::new(&mut bus)
            .write_memory(0xFE00, &[0x09, 0x0C])
            .unwrap();
        assert_eq!(
            bus.frames,
            [std::vec![0x06], std::vec![0x02, 0xFE, 0x00, 0x09, 0x0C]]
        );
    }

    #[test]
    fn test_spi_status_uses_rdsr() {
        let mut bus = LogSpi::default();
        let status = SpiAes132::new(&mut bus).read_status().unwrap();
        assert_eq!(status, StatusReg::RESPONSE_READY);
        assert_eq!(bus.frames, [std::vec![0x05]]);
    }

    #[test]
    fn test_spi_select_out_of_range() {
        let mut bus = LogSpi::default();
        assert_eq!(
            SpiAes132::new(&mut bus).select(3),
            Err(Aes132Error::DeviceSelectFail)
        );
    }
}
