//! Physical drivers
//!
//! Each electrical interface the kit can drive gets one trait here with
//! start/stop/byte primitives and nothing else. Drivers report every
//! failure as a [`BusError`] and never retry; retry policy belongs to the
//! per-family framing layers.
//!
//! | Interface | Trait | Drivers |
//! |-----------|-------|---------|
//! | single-wire | [`SwiBus`] | [`swi::SwiBitbang`] |
//! | two-wire | [`I2cBus`] | [`i2c::I2cBitbang`] |
//! | serial peripheral | [`SpiBus`] | [`spi::HwSpi`], [`spi::BitbangSpi`] |

pub mod bitbang;
pub mod i2c;
pub mod spi;
pub mod swi;

use crate::error::BusError;

/// Electrical interface identifier, as reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "std", derive(serde::Deserialize))]
#[repr(u8)]
pub enum InterfaceId {
    /// No interface selected
    #[default]
    Unknown = 0,
    /// Serial peripheral interface
    Spi = 1,
    /// Two-wire interface
    I2c = 2,
    /// Single-wire interface
    Swi = 3,
    /// UART (declared by the protocol, not wired on this kit)
    Uart = 4,
}

impl InterfaceId {
    /// Name reported by the board version command
    pub const fn label(self) -> &'static str {
        match self {
            Self::Spi => "SPI ",
            Self::I2c => "TWI ",
            Self::Swi => "SWI ",
            Self::Unknown | Self::Uart => "no_device ",
        }
    }
}

/// Single-wire bus
///
/// One data line per device, selected by index into a fixed pin table.
pub trait SwiBus {
    /// Number of entries in the pin table
    fn pin_count(&self) -> u8;

    /// Open the channel (configure the selected pin)
    fn enable(&mut self);

    /// Close the channel and release the pin
    fn disable(&mut self);

    /// Select a pin by index; indices outside the table are ignored
    fn select(&mut self, pin: u8);

    /// Hold the line low for `low_us` microseconds, then release it
    fn wake_pulse(&mut self, low_us: u32);

    /// Transmit bytes using the pulse-width encoding
    fn send_bytes(&mut self, data: &[u8]) -> Result<(), BusError>;

    /// Receive exactly `buf.len()` bytes
    ///
    /// Returns [`BusError::Timeout`] when nothing arrived and
    /// [`BusError::RxFail`] when the device stopped after at least one
    /// byte. `buf` keeps whatever was received.
    fn receive_bytes(&mut self, buf: &mut [u8]) -> Result<(), BusError>;
}

/// Two-wire bus (master side)
pub trait I2cBus {
    /// Enable the bus and release both lines
    fn enable(&mut self);

    /// Disable the bus
    fn disable(&mut self);

    /// Generate a start (or repeated start) condition
    fn send_start(&mut self) -> Result<(), BusError>;

    /// Generate a stop condition
    fn send_stop(&mut self) -> Result<(), BusError>;

    /// Send bytes, failing with [`BusError::Nack`] on the first byte
    /// that is not acknowledged
    fn send_bytes(&mut self, data: &[u8]) -> Result<(), BusError>;

    /// Receive one byte and acknowledge it
    fn receive_byte(&mut self) -> Result<u8, BusError>;

    /// Receive `buf.len()` bytes, acknowledging all but the last, then
    /// generate a stop condition
    fn receive_bytes(&mut self, buf: &mut [u8]) -> Result<(), BusError>;

    /// Hold the data line low for `low_us` microseconds, then release it
    fn wake_pulse(&mut self, low_us: u32);
}

/// Serial peripheral bus (master side)
pub trait SpiBus {
    /// Enable the peripheral
    fn enable(&mut self);

    /// Disable the peripheral and deassert every chip select
    fn disable(&mut self);

    /// Choose which chip-select line the next transfer uses
    fn select_device(&mut self, index: u8) -> Result<(), BusError>;

    /// Assert the chosen chip select
    fn select(&mut self);

    /// Deassert the chosen chip select
    fn deselect(&mut self);

    /// Send bytes, discarding what is clocked in
    fn send_bytes(&mut self, data: &[u8]) -> Result<(), BusError>;

    /// Clock in `buf.len()` bytes
    fn receive_bytes(&mut self, buf: &mut [u8]) -> Result<(), BusError>;
}

/// Placeholder for an interface that is not part of the build
///
/// Uninhabited, so a board typed with `NoBus` in a slot can never hold a
/// driver there and discovery skips that interface.
#[derive(Debug)]
pub enum NoBus {}

impl SwiBus for NoBus {
    fn pin_count(&self) -> u8 {
        match *self {}
    }
    fn enable(&mut self) {
        match *self {}
    }
    fn disable(&mut self) {
        match *self {}
    }
    fn select(&mut self, _pin: u8) {
        match *self {}
    }
    fn wake_pulse(&mut self, _low_us: u32) {
        match *self {}
    }
    fn send_bytes(&mut self, _data: &[u8]) -> Result<(), BusError> {
        match *self {}
    }
    fn receive_bytes(&mut self, _buf: &mut [u8]) -> Result<(), BusError> {
        match *self {}
    }
}

impl I2cBus for NoBus {
    fn enable(&mut self) {
        match *self {}
    }
    fn disable(&mut self) {
        match *self {}
    }
    fn send_start(&mut self) -> Result<(), BusError> {
        match *self {}
    }
    fn send_stop(&mut self) -> Result<(), BusError> {
        match *self {}
    }
    fn send_bytes(&mut self, _data: &[u8]) -> Result<(), BusError> {
        match *self {}
    }
    fn receive_byte(&mut self) -> Result<u8, BusError> {
        match *self {}
    }
    fn receive_bytes(&mut self, _buf: &mut [u8]) -> Result<(), BusError> {
        match *self {}
    }
    fn wake_pulse(&mut self, _low_us: u32) {
        match *self {}
    }
}

impl SpiBus for NoBus {
    fn enable(&mut self) {
        match *self {}
    }
    fn disable(&mut self) {
        match *self {}
    }
    fn select_device(&mut self, _index: u8) -> Result<(), BusError> {
        match *self {}
    }
    fn select(&mut self) {
        match *self {}
    }
    fn deselect(&mut self) {
        match *self {}
    }
    fn send_bytes(&mut self, _data: &[u8]) -> Result<(), BusError> {
        match *self {}
    }
    fn receive_bytes(&mut self, _buf: &mut [u8]) -> Result<(), BusError> {
        match *self {}
    }
}
