//! AES132 chip model
//!
//! The chip is memory mapped: user EEPROM from address 0, the IO buffer
//! at [`IO_ADDR`], the IO reset register at [`RESET_ADDR`] and the status
//! register at [`STATUS_ADDR`]. Commands are frames written into the IO
//! buffer; the response replaces them there.

use ck590_core::aes132::{index, opcode, StatusReg, IO_ADDR, RESET_ADDR, STATUS_ADDR};
use ck590_core::crc::{self, Checksum};

use crate::counters::{Counters, Event};

/// Size of the user EEPROM
pub const EEPROM_SIZE: usize = 4096;

/// Device number returned by Info
pub const DEVICE_NUMBER: [u8; 2] = [0x0A, 0x06];

/// Return codes
pub mod retcode {
    /// Address outside the user zone
    pub const ADDRESS: u8 = 0x08;
    /// Count out of range
    pub const COUNT: u8 = 0x10;
    /// Command not understood
    pub const PARSE: u8 = 0x50;
}

/// Readings returned by TempSense
const TEMP_READINGS: [u16; 2] = [0x0240, 0x0200];

/// Power state after a Sleep command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Power {
    /// Running
    Active,
    /// Standby: keeps volatile state
    Standby,
    /// Sleep: loses volatile state
    Sleep,
}

/// One simulated AES132
#[derive(Debug, Clone)]
pub struct Aes132Chip {
    eeprom: Vec<u8>,
    io: Vec<u8>,
    io_pos: usize,
    pointer: u16,
    status: StatusReg,
    power: Power,
    random_seed: u8,
    counters: Counters,
    /// Number of upcoming responses sent with a broken CRC
    pub corrupt_responses: usize,
    /// Return code Info answers with; zero on a healthy chip
    pub info_retcode: u8,
}

impl Aes132Chip {
    /// Chip with erased EEPROM
    pub fn new(counters: Counters) -> Self {
        Self {
            eeprom: vec![0xFF; EEPROM_SIZE],
            io: Vec::new(),
            io_pos: 0,
            pointer: 0,
            status: StatusReg::WAKE,
            power: Power::Active,
            random_seed: 0,
            counters,
            corrupt_responses: 0,
            info_retcode: 0,
        }
    }

    /// User EEPROM
    pub fn eeprom(&self) -> &[u8] {
        &self.eeprom
    }

    /// Status register
    pub fn status(&self) -> StatusReg {
        self.status
    }

    /// Power state
    pub fn power(&self) -> Power {
        self.power
    }

    /// Memory write
    ///
    /// An empty write only sets the address pointer, except on the IO
    /// reset register where it rewinds the IO buffer.
    pub fn write(&mut self, address: u16, data: &[u8]) {
        self.power = Power::Active;
        self.status.insert(StatusReg::WAKE);
        self.pointer = address;
        if data.is_empty() {
            if address == RESET_ADDR {
                self.io_pos = 0;
            }
            return;
        }
        match address {
            IO_ADDR => self.command(data),
            a if usize::from(a) < EEPROM_SIZE => self.write_eeprom(a, data),
            _ => log::debug!("sim: aes132 write to 0x{:04X} ignored", address),
        }
    }

    /// Move the read pointer
    pub fn set_pointer(&mut self, address: u16) {
        self.pointer = address;
    }

    /// Byte at the read pointer
    ///
    /// The pointer advances through EEPROM and the IO buffer but stays on
    /// the status register.
    pub fn read_byte(&mut self) -> u8 {
        match self.pointer {
            STATUS_ADDR => self.status.bits(),
            IO_ADDR => {
                let byte = self.io.get(self.io_pos).copied().unwrap_or(0xFF);
                self.io_pos += 1;
                byte
            }
            a => {
                let byte = self.eeprom.get(usize::from(a)).copied().unwrap_or(0xFF);
                self.pointer = a.wrapping_add(1);
                byte
            }
        }
    }

    fn write_eeprom(&mut self, address: u16, data: &[u8]) {
        let start = usize::from(address);
        match self.eeprom.get_mut(start..start + data.len()) {
            Some(cells) => {
                cells.copy_from_slice(data);
                self.respond(0, &[]);
            }
            None => self.respond(retcode::ADDRESS, &[]),
        }
    }

    fn command(&mut self, frame: &[u8]) {
        let op = frame.get(index::OPCODE).copied().unwrap_or(0xFF);
        self.counters.record(Event::Command(op));

        let mut crc = crc::AES132;
        let count = frame.first().copied().unwrap_or(0) as usize;
        if count != frame.len() || !crc.verify(frame) {
            log::debug!("sim: aes132 rejected a frame with a bad CRC");
            self.status = StatusReg::WAKE | StatusReg::CRC_ERROR;
            return;
        }
        self.status.remove(StatusReg::CRC_ERROR);

        let mode = frame[index::MODE];
        let param1 = u16::from_be_bytes([frame[index::PARAM1], frame[index::PARAM1 + 1]]);
        let param2 = u16::from_be_bytes([frame[index::PARAM2], frame[index::PARAM2 + 1]]);
        match op {
            opcode::INFO if param1 == 0x0006 => self.respond(self.info_retcode, &DEVICE_NUMBER),
            opcode::INFO => self.respond(self.info_retcode, &[0, 0]),
            opcode::BLOCK_READ => self.block_read(param1, param2),
            opcode::TEMP_SENSE => {
                let [a, b] = TEMP_READINGS[0].to_be_bytes();
                let [c, d] = TEMP_READINGS[1].to_be_bytes();
                self.respond(0, &[a, b, c, d]);
            }
            opcode::RANDOM => {
                let mut bytes = [0u8; 16];
                for (i, b) in bytes.iter_mut().enumerate() {
                    *b = self.random_seed.wrapping_mul(13).wrapping_add(i as u8);
                }
                self.random_seed = self.random_seed.wrapping_add(1);
                self.respond(0, &bytes);
            }
            opcode::RESET => self.clear_response(),
            opcode::SLEEP => {
                self.clear_response();
                self.power = if mode & 0x40 != 0 {
                    Power::Standby
                } else {
                    Power::Sleep
                };
            }
            _ => self.respond(retcode::PARSE, &[]),
        }
    }

    fn block_read(&mut self, address: u16, count: u16) {
        let start = usize::from(address);
        let count = usize::from(count);
        if count == 0 || count > 32 {
            self.respond(retcode::COUNT, &[]);
            return;
        }
        match self.eeprom.get(start..start + count).map(<[u8]>::to_vec) {
            Some(bytes) => self.respond(0, &bytes),
            None => self.respond(retcode::ADDRESS, &[]),
        }
    }

    fn clear_response(&mut self) {
        self.io.clear();
        self.io_pos = 0;
        self.status.remove(StatusReg::RESPONSE_READY);
    }

    fn respond(&mut self, code: u8, data: &[u8]) {
        let mut frame = Vec::with_capacity(data.len() + 4);
        frame.push((data.len() + 4) as u8);
        frame.push(code);
        frame.extend_from_slice(data);
        frame.extend_from_slice(&[0, 0]);
        let mut crc = crc::AES132;
        crc.append(&mut frame);
        if self.corrupt_responses > 0 {
            self.corrupt_responses -= 1;
            if let Some(last) = frame.last_mut() {
                *last ^= 0xFF;
            }
        }
        self.io = frame;
        self.io_pos = 0;
        self.status.insert(StatusReg::RESPONSE_READY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ck590_core::aes132::marshal;

    fn frame(op: u8, mode: u8, param1: u16, param2: u16) -> Vec<u8> {
        let mut tx = [0u8; 9];
        marshal::build_frame(&mut tx, op, mode, param1, param2, &[]).unwrap();
        let mut crc = crc::AES132;
        crc.append(&mut tx);
        tx.to_vec()
    }

    fn read_io(chip: &mut Aes132Chip, n: usize) -> Vec<u8> {
        chip.write(RESET_ADDR, &[]);
        chip.set_pointer(IO_ADDR);
        (0..n).map(|_| chip.read_byte()).collect()
    }

    #[test]
    fn test_info_device_number() {
        let mut chip = Aes132Chip::new(Counters::new());
        chip.write(IO_ADDR, &frame(opcode::INFO, 0, 6, 0));
        assert!(chip.status().contains(StatusReg::RESPONSE_READY));
        let rsp = read_io(&mut chip, 6);
        assert_eq!(&rsp[..4], &[6, 0, 0x0A, 0x06]);
        let mut crc = crc::AES132;
        assert!(crc.verify(&rsp));
    }

    #[test]
    fn test_bad_crc_sets_status_bit() {
        let mut chip = Aes132Chip::new(Counters::new());
        let mut tx = frame(opcode::INFO, 0, 6, 0);
        tx[8] ^= 0x01;
        chip.write(IO_ADDR, &tx);
        assert!(chip.status().contains(StatusReg::CRC_ERROR));
        assert!(!chip.status().contains(StatusReg::RESPONSE_READY));
    }

    #[test]
    fn test_eeprom_write_then_block_read() {
        let mut chip = Aes132Chip::new(Counters::new());
        chip.write(0x0010, &[1, 2, 3]);
        assert_eq!(read_io(&mut chip, 4)[..2], [4, 0]);
        chip.write(IO_ADDR, &frame(opcode::BLOCK_READ, 0, 0x0010, 3));
        assert_eq!(read_io(&mut chip, 7)[..5], [7, 0, 1, 2, 3]);
    }

    #[test]
    fn test_status_read_does_not_advance() {
        let mut chip = Aes132Chip::new(Counters::new());
        chip.set_pointer(STATUS_ADDR);
        assert_eq!(chip.read_byte(), StatusReg::WAKE.bits());
        assert_eq!(chip.read_byte(), StatusReg::WAKE.bits());
    }

    #[test]
    fn test_standby_and_sleep() {
        let mut chip = Aes132Chip::new(Counters::new());
        chip.write(IO_ADDR, &frame(opcode::SLEEP, 0x40, 0, 0));
        assert_eq!(chip.power(), Power::Standby);
        chip.write(IO_ADDR, &frame(opcode::SLEEP, 0, 0, 0));
        assert_eq!(chip.power(), Power::Sleep);
    }
}
