//! AES132 family
//!
//! Unlike the CryptoAuth chips, an AES132 is memory mapped: commands are
//! written to an IO buffer address and the response is read back from the
//! same address once the status register says it is ready. There is no
//! wake pulse on either bus.

pub mod comm;
pub mod marshal;
pub mod phys;

use bitflags::bitflags;

pub use comm::Aes132Comm;
pub use phys::{Aes132Phy, I2cAes132, SpiAes132};

/// Smallest command frame
pub const CMD_SIZE_MIN: usize = 9;
/// Largest command frame
pub const CMD_SIZE_MAX: usize = 63;
/// Smallest response frame
pub const RSP_SIZE_MIN: usize = 4;
/// Largest response frame
pub const RSP_SIZE_MAX: usize = 52;
/// Largest single memory access
pub const MEM_ACCESS_MAX: usize = 32;

/// Command and response buffer
pub const IO_ADDR: u16 = 0xFE00;
/// Writing here resets the IO buffer index
pub const RESET_ADDR: u16 = 0xFFE0;
/// Device status register
pub const STATUS_ADDR: u16 = 0xFFF0;

/// Attempts for sending, receiving and memory access
pub const RETRY_COUNT_ERROR: usize = 2;
/// Attempts for re-synchronization
pub const RETRY_COUNT_RESYNC: usize = 2;
/// Time to wait for the device to accept an access
pub const DEVICE_READY_TIMEOUT_MS: u32 = 100;
/// Time to wait for a response (TempSense is the slowest command)
pub const RESPONSE_READY_TIMEOUT_MS: u32 = 145;
/// Pause between two status register polls
pub const STATUS_POLL_US: u32 = 41;

/// Factory-default two-wire address
pub const I2C_ADDRESS: u8 = 0xA0;

/// Highest device return code that still carries a response
pub const DEVICE_RETCODE_MAX: u8 = 0x90;

bitflags! {
    /// Device status register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusReg: u8 {
        /// Write or command in progress
        const WIP = 0x01;
        /// Write enabled (serial peripheral only)
        const WEN = 0x02;
        /// Device is awake
        const WAKE = 0x04;
        /// Last command had a CRC error
        const CRC_ERROR = 0x10;
        /// Response buffer holds a response
        const RESPONSE_READY = 0x40;
        /// Last command failed
        const DEVICE_ERROR = 0x80;
    }
}

bitflags! {
    /// Options for [`Aes132Comm::send_command`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CommandOptions: u8 {
        /// The frame already carries its CRC
        const NO_APPEND_CRC = 0x01;
        /// Do not check the CRC error bit after writing
        const NO_STATUS_READ = 0x02;
    }
}

/// Frame byte positions
pub mod index {
    /// Count byte
    pub const COUNT: usize = 0;
    /// Opcode of a command
    pub const OPCODE: usize = 1;
    /// Mode byte of a command
    pub const MODE: usize = 2;
    /// First parameter (two bytes, big-endian)
    pub const PARAM1: usize = 3;
    /// Second parameter (two bytes, big-endian)
    pub const PARAM2: usize = 5;
    /// Start of command data
    pub const DATA: usize = 7;
    /// Return code of a response
    pub const RETURN_CODE: usize = 1;
    /// Start of response data
    pub const RESPONSE_DATA: usize = 2;
}

/// Command opcodes
pub mod opcode {
    /// Reset
    pub const RESET: u8 = 0x00;
    /// Nonce
    pub const NONCE: u8 = 0x01;
    /// Random
    pub const RANDOM: u8 = 0x02;
    /// Info
    pub const INFO: u8 = 0x0C;
    /// Lock
    pub const LOCK: u8 = 0x0D;
    /// TempSense
    pub const TEMP_SENSE: u8 = 0x0E;
    /// BlockRead
    pub const BLOCK_READ: u8 = 0x10;
    /// Sleep / Standby
    pub const SLEEP: u8 = 0x11;
}

/// Serial-peripheral instruction bytes
pub mod spi_op {
    /// Write memory
    pub const WRITE: u8 = 0x02;
    /// Read memory
    pub const READ: u8 = 0x03;
    /// Clear the write-enable latch
    pub const WRDI: u8 = 0x04;
    /// Read the status register
    pub const RDSR: u8 = 0x05;
    /// Set the write-enable latch
    pub const WREN: u8 = 0x06;
}
