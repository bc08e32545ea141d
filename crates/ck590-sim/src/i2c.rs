//! Simulated two-wire bus
//!
//! Devices sit at 8-bit addresses. A CryptoAuth chip only acknowledges
//! its address while awake; an AES132 always does. Writes are handed to
//! the addressed device when the transfer ends with a stop or a repeated
//! start.

use ck590_core::error::BusError;
use ck590_core::sha204::word_address;
use ck590_core::I2cBus;

use crate::aes132::Aes132Chip;
use crate::counters::{Counters, Event};
use crate::crypto_auth::CryptoAuthChip;

/// A device on the bus
#[derive(Debug)]
pub enum I2cDevice {
    /// SHA204 / ECC108
    CryptoAuth {
        /// 8-bit address, read bit clear
        address: u8,
        /// The chip
        chip: CryptoAuthChip,
    },
    /// AES132
    Aes132 {
        /// 8-bit address, read bit clear
        address: u8,
        /// The chip
        chip: Aes132Chip,
    },
}

impl I2cDevice {
    fn acknowledges(&self, sla: u8) -> bool {
        match self {
            Self::CryptoAuth { address, chip } => *address == sla & !1 && chip.is_awake(),
            Self::Aes132 { address, .. } => *address == sla & !1,
        }
    }

    fn read_byte(&mut self) -> u8 {
        match self {
            Self::CryptoAuth { chip, .. } => chip.read_byte(),
            Self::Aes132 { chip, .. } => chip.read_byte(),
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        match self {
            Self::CryptoAuth { chip, .. } => match bytes.split_first() {
                Some((&word_address::RESET, _)) => chip.reset_io(),
                Some((&word_address::SLEEP, _)) => chip.sleep(),
                Some((&word_address::IDLE, _)) => chip.idle(),
                Some((&word_address::COMMAND, frame)) => chip.command(frame),
                Some((other, _)) => log::debug!("sim: unknown word address 0x{:02X}", other),
                None => {}
            },
            Self::Aes132 { chip, .. } => {
                if let [hi, lo, data @ ..] = bytes {
                    chip.write(u16::from_be_bytes([*hi, *lo]), data);
                }
            }
        }
    }
}

#[derive(Debug, Default)]
enum Phase {
    #[default]
    Idle,
    Started,
    Write {
        target: usize,
        bytes: Vec<u8>,
    },
    Read {
        target: usize,
    },
    /// Address was not acknowledged; the rest of the transfer goes nowhere
    Ignored,
}

/// Two-wire bus
#[derive(Debug)]
pub struct SimI2c {
    devices: Vec<I2cDevice>,
    phase: Phase,
    enabled: bool,
    counters: Counters,
}

impl SimI2c {
    /// Empty bus
    pub fn new(counters: Counters) -> Self {
        Self {
            devices: Vec::new(),
            phase: Phase::Idle,
            enabled: false,
            counters,
        }
    }

    /// Put a device on the bus
    pub fn attach(&mut self, device: I2cDevice) {
        self.devices.push(device);
    }

    /// Devices on the bus
    pub fn devices(&self) -> &[I2cDevice] {
        &self.devices
    }

    /// Devices on the bus, mutably
    pub fn devices_mut(&mut self) -> &mut [I2cDevice] {
        &mut self.devices
    }

    /// True while the bus is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn commit(&mut self) {
        if let Phase::Write { target, bytes } = std::mem::take(&mut self.phase) {
            if let Some(device) = self.devices.get_mut(target) {
                device.write(&bytes);
            }
        }
    }

    fn address(&mut self, sla: u8) -> Result<Phase, BusError> {
        match self.devices.iter().position(|d| d.acknowledges(sla)) {
            Some(target) if sla & 1 == 1 => Ok(Phase::Read { target }),
            Some(target) => Ok(Phase::Write {
                target,
                bytes: Vec::new(),
            }),
            None => {
                self.counters.record(Event::Nack(sla & !1));
                Err(BusError::Nack)
            }
        }
    }
}

impl I2cBus for SimI2c {
    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.enabled = false;
        self.phase = Phase::Idle;
    }

    fn send_start(&mut self) -> Result<(), BusError> {
        self.commit();
        self.phase = Phase::Started;
        Ok(())
    }

    fn send_stop(&mut self) -> Result<(), BusError> {
        self.commit();
        self.phase = Phase::Idle;
        Ok(())
    }

    fn send_bytes(&mut self, data: &[u8]) -> Result<(), BusError> {
        match &mut self.phase {
            Phase::Idle => Err(BusError::CommFail),
            Phase::Ignored => Err(BusError::Nack),
            Phase::Read { .. } => Ok(()),
            Phase::Write { bytes, .. } => {
                bytes.extend_from_slice(data);
                Ok(())
            }
            Phase::Started => {
                let Some((&sla, rest)) = data.split_first() else {
                    return Ok(());
                };
                match self.address(sla) {
                    Ok(mut phase) => {
                        if let Phase::Write { bytes, .. } = &mut phase {
                            bytes.extend_from_slice(rest);
                        }
                        self.phase = phase;
                        Ok(())
                    }
                    Err(e) => {
                        self.phase = Phase::Ignored;
                        Err(e)
                    }
                }
            }
        }
    }

    fn receive_byte(&mut self) -> Result<u8, BusError> {
        match self.phase {
            Phase::Read { target } => Ok(self
                .devices
                .get_mut(target)
                .map_or(0xFF, I2cDevice::read_byte)),
            // Nobody drives the line
            _ => Ok(0xFF),
        }
    }

    fn receive_bytes(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        for b in buf.iter_mut() {
            *b = self.receive_byte()?;
        }
        self.send_stop()
    }

    fn wake_pulse(&mut self, _low_us: u32) {
        self.counters.record(Event::Wake);
        self.phase = Phase::Idle;
        for device in &mut self.devices {
            if let I2cDevice::CryptoAuth { chip, .. } = device {
                chip.wake();
            }
        }
    }
}
