//! SHA204 / ECC108 chip model
//!
//! Models the parts of the chip the kit relies on: sleep, idle and awake
//! states, the wake acknowledgment, CRC checking of commands and a small
//! command set (DevRev, Read, Random, Nonce). Responses wait in an output
//! buffer until the next command.

use ck590_core::crc::{self, Checksum};
use ck590_core::sha204::{index, opcode, status, WAKE_RESPONSE};

use crate::counters::{Counters, Event};

/// Size of the configuration zone
pub const CONFIG_SIZE: usize = 88;
/// Size of the data zone
pub const DATA_SIZE: usize = 512;
/// Size of the OTP zone
pub const OTP_SIZE: usize = 64;

/// Opcode of the SA10x personalization-key command
const GEN_PERS_KEY: u8 = 0x20;

/// Chip family being modelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// SHA204: DevRev answers with revision byte 2 clear
    Sha204,
    /// ECC108: DevRev answers with revision byte 2 set
    Ecc108,
    /// SA102S: ignores DevRev, answers the personalization-key command
    Sa102s,
}

impl Family {
    /// DevRev bytes
    pub const fn revision(self) -> [u8; 4] {
        match self {
            Self::Sha204 => [0x00, 0x02, 0x00, 0x09],
            Self::Ecc108 => [0x00, 0x00, 0x10, 0x01],
            Self::Sa102s => [0; 4],
        }
    }
}

/// Power state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Power {
    /// Ignores everything but a wake pulse
    Sleep,
    /// Like sleep, but keeps its volatile state
    Idle,
    /// Accepts commands
    Awake,
}

/// Misbehaviour to inject
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Faults {
    /// Never wakes up
    pub silent: bool,
    /// Number of upcoming responses sent with a broken CRC
    pub corrupt_responses: usize,
    /// Wake pulses answered before the chip goes silent for good
    pub wakes_left: Option<usize>,
}

/// One simulated CryptoAuth chip
#[derive(Debug, Clone)]
pub struct CryptoAuthChip {
    family: Family,
    power: Power,
    config: [u8; CONFIG_SIZE],
    data: Vec<u8>,
    otp: Vec<u8>,
    output: Vec<u8>,
    read_pos: usize,
    random_seed: u8,
    counters: Counters,
    /// Injected faults
    pub faults: Faults,
}

impl CryptoAuthChip {
    /// Sleeping chip of `family`
    ///
    /// Byte 85 of the configuration zone, the selector reported on the
    /// single-wire bus, starts out zero.
    pub fn new(family: Family, counters: Counters) -> Self {
        let mut config = [0u8; CONFIG_SIZE];
        config[..4].copy_from_slice(&[0x01, 0x23, 0x45, 0x67]);
        Self {
            family,
            power: Power::Sleep,
            config,
            data: vec![0xFF; DATA_SIZE],
            otp: vec![0xFF; OTP_SIZE],
            output: Vec::new(),
            read_pos: 0,
            random_seed: 0,
            counters,
            faults: Faults::default(),
        }
    }

    /// Modelled family
    pub fn family(&self) -> Family {
        self.family
    }

    /// Current power state
    pub fn power(&self) -> Power {
        self.power
    }

    /// Configuration zone
    pub fn config_mut(&mut self) -> &mut [u8; CONFIG_SIZE] {
        &mut self.config
    }

    /// Wake pulse
    ///
    /// An awake chip ignores it; a sleeping or idle one answers with the
    /// wake acknowledgment.
    pub fn wake(&mut self) {
        if self.faults.silent || self.power == Power::Awake {
            return;
        }
        if let Some(left) = self.faults.wakes_left.as_mut() {
            if *left == 0 {
                self.faults.silent = true;
                return;
            }
            *left -= 1;
        }
        self.power = Power::Awake;
        self.set_output(WAKE_RESPONSE.to_vec());
    }

    /// Sleep flag or word address
    pub fn sleep(&mut self) {
        if self.power == Power::Awake {
            self.power = Power::Sleep;
            self.output.clear();
        }
    }

    /// Idle flag or word address
    pub fn idle(&mut self) {
        if self.power == Power::Awake {
            self.power = Power::Idle;
            self.output.clear();
        }
    }

    /// True when the chip acknowledges bus traffic
    pub fn is_awake(&self) -> bool {
        self.power == Power::Awake
    }

    /// Restart reading the output buffer from its first byte
    pub fn reset_io(&mut self) {
        self.read_pos = 0;
    }

    /// Pending response, if any
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Next output byte; 0xFF past the end
    pub fn read_byte(&mut self) -> u8 {
        let byte = self.output.get(self.read_pos).copied().unwrap_or(0xFF);
        self.read_pos += 1;
        byte
    }

    /// Receive a command frame
    pub fn command(&mut self, frame: &[u8]) {
        if !self.is_awake() {
            return;
        }
        let op = frame.get(index::OPCODE).copied().unwrap_or(0);
        self.counters.record(Event::Command(op));

        let mut crc = crc::SHA204;
        let count = frame.first().copied().unwrap_or(0) as usize;
        if count != frame.len() || !crc.verify(frame) {
            log::debug!("sim: {:?} rejected a frame with a bad CRC", self.family);
            self.respond_status(status::COMM);
            return;
        }

        let param1 = frame[index::PARAM1];
        let param2 = u16::from_le_bytes([frame[index::PARAM2], frame[index::PARAM2 + 1]]);
        match (self.family, op) {
            (Family::Sa102s, GEN_PERS_KEY) => self.respond_status(status::SUCCESS),
            // SA10x parts do not answer anything else
            (Family::Sa102s, _) => self.output.clear(),
            (_, opcode::DEVREV) => {
                let revision = self.family.revision();
                self.respond(&revision);
            }
            (_, opcode::READ) => self.read(param1, param2),
            (_, opcode::RANDOM) => {
                let bytes = self.random();
                self.respond(&bytes);
            }
            (_, opcode::NONCE) if param1 & 0x03 == 0x03 => self.respond_status(status::SUCCESS),
            (_, opcode::NONCE) => {
                let bytes = self.random();
                self.respond(&bytes);
            }
            _ => self.respond_status(status::PARSE),
        }
    }

    fn read(&mut self, zone: u8, address: u16) {
        let len = if zone & 0x80 != 0 { 32 } else { 4 };
        let memory: &[u8] = match zone & 0x03 {
            0 => &self.config,
            1 => &self.otp,
            _ => &self.data,
        };
        let start = usize::from(address) * 4;
        match memory.get(start..start + len).map(<[u8]>::to_vec) {
            Some(bytes) => self.respond(&bytes),
            None => self.respond_status(status::EXEC),
        }
    }

    fn random(&mut self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.random_seed.wrapping_mul(31).wrapping_add(i as u8 * 7);
        }
        self.random_seed = self.random_seed.wrapping_add(1);
        bytes
    }

    fn respond_status(&mut self, code: u8) {
        self.respond(&[code]);
    }

    fn respond(&mut self, body: &[u8]) {
        let mut frame = Vec::with_capacity(body.len() + 3);
        frame.push((body.len() + 3) as u8);
        frame.extend_from_slice(body);
        frame.extend_from_slice(&[0, 0]);
        let mut crc = crc::SHA204;
        crc.append(&mut frame);
        self.set_output(frame);
    }

    fn set_output(&mut self, mut frame: Vec<u8>) {
        if self.faults.corrupt_responses > 0 {
            self.faults.corrupt_responses -= 1;
            if let Some(last) = frame.last_mut() {
                *last ^= 0xFF;
            }
        }
        self.output = frame;
        self.read_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ck590_core::sha204::marshal;

    fn awake(family: Family) -> CryptoAuthChip {
        let mut chip = CryptoAuthChip::new(family, Counters::new());
        chip.wake();
        chip
    }

    fn frame(op: u8, param1: u8, param2: u16) -> Vec<u8> {
        let mut tx = [0u8; 7];
        marshal::build_frame(&mut tx, op, param1, param2, &[]).unwrap();
        let mut crc = crc::SHA204;
        crc.append(&mut tx);
        tx.to_vec()
    }

    #[test]
    fn test_wake_acknowledgment() {
        let chip = awake(Family::Sha204);
        assert_eq!(chip.output(), WAKE_RESPONSE);
        assert!(chip.is_awake());
    }

    #[test]
    fn test_dev_rev_is_crc_framed() {
        let mut chip = awake(Family::Ecc108);
        chip.command(&frame(opcode::DEVREV, 0, 0));
        let out = chip.output().to_vec();
        assert_eq!(out.len(), 7);
        assert_eq!(&out[1..5], &Family::Ecc108.revision());
        let mut crc = crc::SHA204;
        assert!(crc.verify(&out));
    }

    #[test]
    fn test_bad_crc_answers_comm_status() {
        let mut chip = awake(Family::Sha204);
        let mut tx = frame(opcode::DEVREV, 0, 0);
        tx[6] ^= 1;
        chip.command(&tx);
        assert_eq!(chip.output()[1], status::COMM);
    }

    #[test]
    fn test_read_selector_word() {
        let mut chip = awake(Family::Sha204);
        chip.config_mut()[85] = 0xA5;
        chip.command(&frame(opcode::READ, 0, 85 / 4));
        assert_eq!(chip.output()[1 + 85 % 4], 0xA5);
    }

    #[test]
    fn test_sleeping_chip_ignores_commands() {
        let mut chip = CryptoAuthChip::new(Family::Sha204, Counters::new());
        chip.command(&frame(opcode::DEVREV, 0, 0));
        assert!(chip.output().is_empty());
        chip.faults.silent = true;
        chip.wake();
        assert_eq!(chip.power(), Power::Sleep);
    }

    #[test]
    fn test_corrupted_response() {
        let mut chip = CryptoAuthChip::new(Family::Sha204, Counters::new());
        chip.faults.corrupt_responses = 1;
        chip.wake();
        assert_ne!(chip.output(), WAKE_RESPONSE);
        chip.idle();
        chip.wake();
        assert_eq!(chip.output(), WAKE_RESPONSE);
    }
}
