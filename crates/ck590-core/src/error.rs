//! Error types for ck590-core
//!
//! Every error in the kit ends up as a single status byte in front of the
//! hex-encoded response, so each enum here knows its wire code through
//! `code()`. Lower layers return their own enum; the ASCII layer only ever
//! looks at the aggregate [`Error`].

use core::fmt;

/// Status byte for a successful operation
pub const SUCCESS: u8 = 0x00;

/// Physical driver errors (single-wire, two-wire, serial peripheral)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// Addressed device did not acknowledge
    Nack,
    /// Line or peripheral did not reach the expected state in time
    Timeout,
    /// Transfer failed (bus held, arbitration lost, bad parameter)
    CommFail,
    /// Bits were sampled but did not form a valid byte
    RxFail,
}

impl BusError {
    /// Status byte reported to the host
    pub const fn code(self) -> u8 {
        match self {
            Self::CommFail => 0xF0,
            Self::Timeout => 0xF1,
            Self::Nack => 0xF8,
            Self::RxFail => 0xF9,
        }
    }
}

/// SHA204 / ECC108 library errors
///
/// The first five variants mirror the status byte a chip returns in a
/// four-byte response; the rest are raised by the framing layer itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sha204Error {
    // Device-reported
    /// CheckMac miscompare (device status 0x01)
    CheckMacFailed,
    /// Command could not be parsed (device status 0x03)
    ParseError,
    /// Command execution failed (device status 0x0F)
    CmdFail,
    /// Device saw a CRC or communication error (device status 0xFF)
    StatusCrc,
    /// Device returned a status byte this library does not know
    StatusUnknown,

    // Library
    /// Function could not execute because of an incorrect state
    FuncFail,
    /// Unspecified failure
    GenFail,
    /// Bad argument
    BadParam,
    /// Invalid device id
    InvalidId,
    /// Count value out of range or frame too short
    InvalidSize,
    /// Response CRC mismatch
    BadCrc,
    /// Bytes received but malformed
    RxFail,
    /// Device did not answer at all
    RxNoResponse,
    /// Re-synchronization needed a wake-up; the chip lost its state
    ResyncWithWakeup,
    /// Communication with the device failed
    CommFail,
    /// Timed out waiting for the device
    Timeout,
}

impl Sha204Error {
    /// Status byte reported to the host
    pub const fn code(self) -> u8 {
        match self {
            Self::CheckMacFailed => 0xD1,
            Self::ParseError => 0xD2,
            Self::CmdFail => 0xD3,
            Self::StatusCrc => 0xD4,
            Self::StatusUnknown => 0xD5,
            Self::FuncFail => 0xE0,
            Self::GenFail => 0xE1,
            Self::BadParam => 0xE2,
            Self::InvalidId => 0xE3,
            Self::InvalidSize => 0xE4,
            Self::BadCrc => 0xE5,
            Self::RxFail => 0xE6,
            Self::RxNoResponse => 0xE7,
            Self::ResyncWithWakeup => 0xE8,
            Self::CommFail => 0xF0,
            Self::Timeout => 0xF1,
        }
    }
}

/// AES132 library errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aes132Error {
    /// Return code the device placed in byte 1 of its response
    Device(u8),
    /// Device did not acknowledge its address for a write
    AddressWriteNack,
    /// Device did not acknowledge its address for a read
    AddressReadNack,
    /// Caller buffer too small for the response
    SizeTooSmall,
    /// Device flagged a CRC error on the command it received
    BadCrcTx,
    /// Operation not available over the active interface
    NotImplemented,
    /// Device index out of range
    DeviceSelectFail,
    /// Count byte of a frame out of range
    CountInvalid,
    /// Response CRC mismatch
    BadCrcRx,
    /// Status bit did not reach the expected state in time
    Timeout,
    /// Communication failure
    CommFail,
    /// Physical driver error passed through unchanged
    Bus(BusError),
}

impl Aes132Error {
    /// Status byte reported to the host
    pub const fn code(self) -> u8 {
        match self {
            Self::Device(code) => code,
            Self::AddressWriteNack => 0xA0,
            Self::AddressReadNack => 0xA1,
            Self::SizeTooSmall => 0xA2,
            Self::BadCrcTx => 0xD4,
            Self::NotImplemented => 0xE0,
            Self::DeviceSelectFail => 0xE3,
            Self::CountInvalid => 0xE4,
            Self::BadCrcRx => 0xE5,
            Self::Timeout => 0xE7,
            Self::CommFail => 0xF0,
            Self::Bus(e) => e.code(),
        }
    }
}

impl From<BusError> for Aes132Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

/// Protocol-level errors raised by the ASCII dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KitError {
    /// Unrecognized field or operation character
    UnknownCommand,
    /// Host packet exceeded the receive buffer
    RxOverflow,
    /// Result exceeded the transmit buffer and was truncated
    TxOverflow,
    /// Missing or malformed parameters
    InvalidParams,
    /// Function is not wired up for the active interface
    InvalidIfFunction,
    /// No device at the requested index
    NoDevice,
}

impl KitError {
    /// Status byte reported to the host
    pub const fn code(self) -> u8 {
        match self {
            Self::UnknownCommand => 0xC0,
            Self::RxOverflow => 0xC1,
            Self::TxOverflow => 0xC2,
            Self::InvalidParams => 0xC3,
            Self::InvalidIfFunction => 0xC4,
            Self::NoDevice => 0xC5,
        }
    }
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Physical driver error
    Bus(BusError),
    /// SHA204 / ECC108 framing or device error
    Sha204(Sha204Error),
    /// AES132 framing or device error
    Aes132(Aes132Error),
    /// Protocol error
    Kit(KitError),
}

impl Error {
    /// Status byte reported to the host
    pub const fn code(self) -> u8 {
        match self {
            Self::Bus(e) => e.code(),
            Self::Sha204(e) => e.code(),
            Self::Aes132(e) => e.code(),
            Self::Kit(e) => e.code(),
        }
    }
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

impl From<Sha204Error> for Error {
    fn from(e: Sha204Error) -> Self {
        Self::Sha204(e)
    }
}

impl From<Aes132Error> for Error {
    fn from(e: Aes132Error) -> Self {
        Self::Aes132(e)
    }
}

impl From<KitError> for Error {
    fn from(e: KitError) -> Self {
        Self::Kit(e)
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nack => write!(f, "device did not acknowledge"),
            Self::Timeout => write!(f, "bus timed out"),
            Self::CommFail => write!(f, "bus communication failed"),
            Self::RxFail => write!(f, "malformed bits on receive"),
        }
    }
}

impl fmt::Display for Sha204Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CheckMacFailed => write!(f, "CheckMac miscompare"),
            Self::ParseError => write!(f, "device could not parse command"),
            Self::CmdFail => write!(f, "device failed to execute command"),
            Self::StatusCrc => write!(f, "device reported a CRC error"),
            Self::StatusUnknown => write!(f, "unknown device status"),
            Self::FuncFail => write!(f, "function failed in current state"),
            Self::GenFail => write!(f, "general failure"),
            Self::BadParam => write!(f, "bad parameter"),
            Self::InvalidId => write!(f, "invalid device id"),
            Self::InvalidSize => write!(f, "invalid frame size"),
            Self::BadCrc => write!(f, "response CRC mismatch"),
            Self::RxFail => write!(f, "receive failed"),
            Self::RxNoResponse => write!(f, "no response from device"),
            Self::ResyncWithWakeup => write!(f, "re-synchronized with wake-up"),
            Self::CommFail => write!(f, "communication failed"),
            Self::Timeout => write!(f, "timed out"),
        }
    }
}

impl fmt::Display for Aes132Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(code) => write!(f, "device returned 0x{:02X}", code),
            Self::AddressWriteNack => write!(f, "address not acknowledged for write"),
            Self::AddressReadNack => write!(f, "address not acknowledged for read"),
            Self::SizeTooSmall => write!(f, "buffer too small"),
            Self::BadCrcTx => write!(f, "device reported command CRC error"),
            Self::NotImplemented => write!(f, "not implemented on this interface"),
            Self::DeviceSelectFail => write!(f, "device select failed"),
            Self::CountInvalid => write!(f, "count byte out of range"),
            Self::BadCrcRx => write!(f, "response CRC mismatch"),
            Self::Timeout => write!(f, "timed out waiting for status bit"),
            Self::CommFail => write!(f, "communication failed"),
            Self::Bus(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Display for KitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCommand => write!(f, "unknown command"),
            Self::RxOverflow => write!(f, "receive buffer overflow"),
            Self::TxOverflow => write!(f, "transmit buffer overflow"),
            Self::InvalidParams => write!(f, "invalid parameters"),
            Self::InvalidIfFunction => write!(f, "function not available on this interface"),
            Self::NoDevice => write!(f, "no device"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "{}", e),
            Self::Sha204(e) => write!(f, "{}", e),
            Self::Aes132(e) => write!(f, "{}", e),
            Self::Kit(e) => write!(f, "{}", e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BusError {}
#[cfg(feature = "std")]
impl std::error::Error for Sha204Error {}
#[cfg(feature = "std")]
impl std::error::Error for Aes132Error {}
#[cfg(feature = "std")]
impl std::error::Error for KitError {}
#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_wire_values() {
        assert_eq!(Error::from(BusError::Nack).code(), 0xF8);
        assert_eq!(Error::from(Sha204Error::RxNoResponse).code(), 0xE7);
        assert_eq!(Error::from(KitError::NoDevice).code(), 0xC5);
        assert_eq!(Aes132Error::Device(0x50).code(), 0x50);
        assert_eq!(Aes132Error::from(BusError::Timeout).code(), 0xF1);
    }
}
