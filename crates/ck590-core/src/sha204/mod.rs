//! SHA204 / ECC108 CryptoAuthentication family
//!
//! Both chips share the same frame format and wake/sleep behaviour; ECC108
//! only differs in its larger maximum response. The layers are:
//!
//! - [`phys`]: [`CryptoAuthPhy`] over the single-wire or two-wire bus
//! - [`comm`]: wake-up, re-synchronization and the retrying
//!   [`send_and_receive`](comm::Sha204Comm::send_and_receive)
//! - [`marshal`]: command builders (DevRev, Read, Random, Nonce, ...)

pub mod comm;
pub mod marshal;
pub mod phys;

pub use comm::{Resync, Sha204Comm};
pub use phys::{CryptoAuthPhy, I2cCryptoAuth, SwiCryptoAuth};

/// Smallest command frame
pub const CMD_SIZE_MIN: usize = 7;
/// Largest command frame
pub const CMD_SIZE_MAX: usize = 84;
/// Smallest response frame
pub const RSP_SIZE_MIN: usize = 4;
/// Largest SHA204 response frame
pub const RSP_SIZE_MAX: usize = 35;
/// Largest ECC108 response frame
pub const ECC108_RSP_SIZE_MAX: usize = 75;

/// Frame byte positions
pub mod index {
    /// Count byte (frame length)
    pub const COUNT: usize = 0;
    /// Opcode
    pub const OPCODE: usize = 1;
    /// First parameter (one byte)
    pub const PARAM1: usize = 2;
    /// Second parameter (two bytes, little-endian)
    pub const PARAM2: usize = 3;
    /// Start of the data field
    pub const DATA: usize = 5;
    /// Status or first data byte of a response
    pub const RESPONSE: usize = 1;
}

/// Status byte of a four-byte response
pub mod status {
    /// Command executed
    pub const SUCCESS: u8 = 0x00;
    /// CheckMac miscompare
    pub const CHECKMAC_FAIL: u8 = 0x01;
    /// Parse error
    pub const PARSE: u8 = 0x03;
    /// Execution error
    pub const EXEC: u8 = 0x0F;
    /// Device just woke up
    pub const WAKEUP: u8 = 0x11;
    /// CRC or other communication error
    pub const COMM: u8 = 0xFF;
}

/// Command opcodes
pub mod opcode {
    /// CheckMac
    pub const CHECKMAC: u8 = 0x28;
    /// DeriveKey
    pub const DERIVE_KEY: u8 = 0x1C;
    /// DevRev
    pub const DEVREV: u8 = 0x30;
    /// GenDig
    pub const GENDIG: u8 = 0x15;
    /// GenKey (ECC108 / SA10x)
    pub const GENKEY: u8 = 0x40;
    /// HMAC
    pub const HMAC: u8 = 0x11;
    /// Lock
    pub const LOCK: u8 = 0x17;
    /// MAC
    pub const MAC: u8 = 0x08;
    /// Nonce
    pub const NONCE: u8 = 0x16;
    /// Pause
    pub const PAUSE: u8 = 0x01;
    /// Random
    pub const RANDOM: u8 = 0x1B;
    /// Read
    pub const READ: u8 = 0x02;
    /// UpdateExtra
    pub const UPDATE_EXTRA: u8 = 0x20;
    /// Write
    pub const WRITE: u8 = 0x12;
}

/// Acknowledgment a chip sends after a successful wake-up
pub const WAKE_RESPONSE: [u8; 4] = [0x04, status::WAKEUP, 0x33, 0x43];

/// Width of the wake-up low pulse
pub const WAKEUP_PULSE_US: u32 = 60;
/// Time the chip needs after the wake pulse before it accepts a flag
pub const WAKEUP_DELAY_US: u32 = 3_000;
/// Wait before a single-wire resync attempt
pub const SYNC_TIMEOUT_MS: u32 = 85;
/// Longest execution time of any command
pub const COMMAND_EXEC_MAX_MS: u32 = 69;
/// Execution time assumed for opcodes not in the table
pub const UNKNOWN_EXEC_MS: u32 = 200;

/// Two-wire word addresses selecting the packet function
pub mod word_address {
    /// Reset the IO buffer address
    pub const RESET: u8 = 0x00;
    /// Enter sleep
    pub const SLEEP: u8 = 0x01;
    /// Enter idle
    pub const IDLE: u8 = 0x02;
    /// Command follows
    pub const COMMAND: u8 = 0x03;
}

/// Factory-default two-wire address of an ECC108
pub const ECC108_I2C_ADDRESS: u8 = 0xC0;
/// Factory-default two-wire address of a SHA204
pub const SHA204_I2C_ADDRESS: u8 = 0xC8;

/// Worst-case execution time of a command, in milliseconds
pub fn exec_time_ms(op: u8) -> u32 {
    match op {
        opcode::CHECKMAC => 38,
        opcode::DERIVE_KEY => 62,
        opcode::DEVREV => 2,
        opcode::GENDIG => 43,
        opcode::HMAC => 69,
        opcode::LOCK => 24,
        opcode::MAC => 35,
        opcode::NONCE => 60,
        opcode::PAUSE => 2,
        opcode::RANDOM => 50,
        opcode::READ => 4,
        opcode::UPDATE_EXTRA => 6,
        opcode::WRITE => 42,
        _ => UNKNOWN_EXEC_MS,
    }
}

/// Size of the response a command frame will produce
///
/// `ecc108` selects the larger buffer for opcodes this table does not
/// know.
pub fn response_size(frame: &[u8], ecc108: bool) -> usize {
    let op = frame.get(index::OPCODE).copied().unwrap_or(0);
    let param1 = frame.get(index::PARAM1).copied().unwrap_or(0);
    match op {
        opcode::CHECKMAC
        | opcode::DERIVE_KEY
        | opcode::GENDIG
        | opcode::LOCK
        | opcode::PAUSE
        | opcode::UPDATE_EXTRA
        | opcode::WRITE => 4,
        opcode::HMAC | opcode::MAC | opcode::RANDOM => 35,
        opcode::DEVREV => 7,
        opcode::READ => {
            if param1 & 0x80 != 0 {
                35
            } else {
                7
            }
        }
        opcode::NONCE => {
            if param1 & 0x03 == 0x03 {
                4
            } else {
                35
            }
        }
        _ if ecc108 => ECC108_RSP_SIZE_MAX,
        _ => RSP_SIZE_MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_size_table() {
        assert_eq!(response_size(&[7, opcode::DEVREV, 0, 0, 0], false), 7);
        assert_eq!(response_size(&[7, opcode::READ, 0x80, 0, 0], false), 35);
        assert_eq!(response_size(&[7, opcode::READ, 0x00, 0, 0], false), 7);
        assert_eq!(response_size(&[39, opcode::NONCE, 0x03, 0, 0], false), 4);
        assert_eq!(response_size(&[27, opcode::NONCE, 0x00, 0, 0], false), 35);
        assert_eq!(response_size(&[7, 0x41, 0, 0, 0], false), 35);
        assert_eq!(response_size(&[7, 0x41, 0, 0, 0], true), 75);
    }

    #[test]
    fn test_exec_time_table() {
        assert_eq!(exec_time_ms(opcode::HMAC), COMMAND_EXEC_MAX_MS);
        assert_eq!(exec_time_ms(0x7F), UNKNOWN_EXEC_MS);
    }
}
