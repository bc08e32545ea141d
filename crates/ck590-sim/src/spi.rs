//! Simulated serial-peripheral bus
//!
//! One optional AES132 per chip-select line. Bytes sent while selected
//! are collected into a transaction; reads are served as they are
//! clocked and writes reach the chip when the line is deselected.

use ck590_core::aes132::spi_op;
use ck590_core::error::BusError;
use ck590_core::SpiBus;

use crate::aes132::Aes132Chip;

/// Serial-peripheral bus
#[derive(Debug)]
pub struct SimSpi {
    devices: Vec<Option<Aes132Chip>>,
    chosen: usize,
    selected: bool,
    enabled: bool,
    write_enabled: bool,
    transaction: Vec<u8>,
    addressed: bool,
}

impl SimSpi {
    /// Bus with `lines` chip-select lines, all unpopulated
    pub fn new(lines: usize) -> Self {
        Self {
            devices: (0..lines).map(|_| None).collect(),
            chosen: 0,
            selected: false,
            enabled: false,
            write_enabled: false,
            transaction: Vec::new(),
            addressed: false,
        }
    }

    /// Place `chip` on chip-select `line`, growing the table when needed
    pub fn attach(&mut self, line: usize, chip: Aes132Chip) {
        if self.devices.len() <= line {
            self.devices.resize_with(line + 1, || None);
        }
        self.devices[line] = Some(chip);
    }

    /// Chip on `line`
    pub fn chip(&self, line: usize) -> Option<&Aes132Chip> {
        self.devices.get(line).and_then(Option::as_ref)
    }

    /// True while the peripheral is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn chip_mut(&mut self) -> Option<&mut Aes132Chip> {
        self.devices.get_mut(self.chosen).and_then(Option::as_mut)
    }

    fn address(&self) -> Option<u16> {
        match self.transaction.as_slice() {
            [_, hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }

    fn commit(&mut self) {
        let address = self.address().unwrap_or(0);
        let transaction = std::mem::take(&mut self.transaction);
        match transaction.first() {
            Some(&spi_op::WREN) => self.write_enabled = true,
            Some(&spi_op::WRDI) => self.write_enabled = false,
            Some(&spi_op::WRITE) if self.write_enabled && transaction.len() >= 3 => {
                self.write_enabled = false;
                if let Some(chip) = self.chip_mut() {
                    chip.write(address, &transaction[3..]);
                }
            }
            Some(&spi_op::WRITE) => {
                log::debug!("sim: spi write to 0x{:04X} without write enable", address);
            }
            _ => {}
        }
    }
}

impl SpiBus for SimSpi {
    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.deselect();
        self.enabled = false;
    }

    fn select_device(&mut self, index: u8) -> Result<(), BusError> {
        if usize::from(index) >= self.devices.len() {
            return Err(BusError::CommFail);
        }
        self.chosen = usize::from(index);
        Ok(())
    }

    fn select(&mut self) {
        self.selected = true;
        self.transaction.clear();
        self.addressed = false;
    }

    fn deselect(&mut self) {
        if self.selected {
            self.selected = false;
            self.commit();
        }
    }

    fn send_bytes(&mut self, data: &[u8]) -> Result<(), BusError> {
        if self.selected {
            self.transaction.extend_from_slice(data);
        }
        Ok(())
    }

    fn receive_bytes(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        let op = self.transaction.first().copied();
        let address = self.address();
        let first_read = !std::mem::replace(&mut self.addressed, true);
        let selected = self.selected;
        let Some(chip) = self.devices.get_mut(self.chosen).and_then(Option::as_mut) else {
            buf.fill(0xFF);
            return Ok(());
        };
        match (selected, op, address) {
            (true, Some(spi_op::RDSR), _) => buf.fill(chip.status().bits()),
            (true, Some(spi_op::READ), Some(address)) => {
                if first_read {
                    chip.set_pointer(address);
                }
                for b in buf.iter_mut() {
                    *b = chip.read_byte();
                }
            }
            _ => buf.fill(0xFF),
        }
        Ok(())
    }
}
