//! ck590-sim - Simulated secure elements for the kit core
//!
//! Byte-level models of SHA204, ECC108 and AES132 chips, wired to
//! simulated single-wire, two-wire and serial-peripheral buses that
//! implement the [`ck590_core`] bus traits. Every model reports to a
//! shared [`Counters`] log so tests can check how often the kit woke,
//! resynchronized or probed a device.
//!
//! # Example
//!
//! ```ignore
//! use ck590_sim::{bench, BusKind, ChipKind};
//!
//! let bench = bench(ChipKind::Ecc108, BusKind::I2c)?;
//! let counters = bench.counters.clone();
//! let mut kit = bench.into_kit(Default::default());
//! kit.discover();
//! println!("{} address probes went unanswered", counters.address_nacks());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod aes132;
pub mod clock;
pub mod counters;
pub mod crypto_auth;
pub mod i2c;
pub mod spi;
pub mod swi;

#[cfg(test)]
mod scenarios;

use std::fmt;
use std::str::FromStr;

use ck590_core::{sha204, Board, Kit, KitConfig};

pub use aes132::Aes132Chip;
pub use clock::SimClock;
pub use counters::{Counters, CountingCrc, CountingPhy, Event};
pub use crypto_auth::{CryptoAuthChip, Family};
pub use i2c::{I2cDevice, SimI2c};
pub use spi::SimSpi;
pub use swi::SimSwi;

/// Entries in the simulated single-wire pin table
pub const SWI_PINS: usize = 2;
/// Chip-select lines on the simulated serial-peripheral bus
pub const SPI_LINES: usize = 1;

/// Board with all three simulated buses
pub type SimBoard = Board<SimSwi, SimI2c, SimSpi, SimClock>;

/// Kit running on a [`SimBoard`]
pub type SimKit = Kit<SimSwi, SimI2c, SimSpi, SimClock>;

/// Simulation setup errors
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// The chip family has no driver for this bus
    #[error("{chip} cannot be attached to the {bus} bus")]
    Unsupported {
        /// Requested chip
        chip: ChipKind,
        /// Requested bus
        bus: BusKind,
    },

    /// Unrecognized chip or bus name
    #[error("unknown {what}: {name}")]
    UnknownName {
        /// "chip" or "bus"
        what: &'static str,
        /// The name given
        name: String,
    },
}

/// Chip to simulate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipKind {
    /// SHA204
    Sha204,
    /// ECC108
    Ecc108,
    /// AES132
    Aes132,
}

impl fmt::Display for ChipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sha204 => "sha204",
            Self::Ecc108 => "ecc108",
            Self::Aes132 => "aes132",
        })
    }
}

impl FromStr for ChipKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha204" => Ok(Self::Sha204),
            "ecc108" => Ok(Self::Ecc108),
            "aes132" => Ok(Self::Aes132),
            _ => Err(SimError::UnknownName {
                what: "chip",
                name: s.to_string(),
            }),
        }
    }
}

/// Bus the chip sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    /// Single-wire
    Swi,
    /// Two-wire
    I2c,
    /// Serial peripheral
    Spi,
}

impl fmt::Display for BusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Swi => "swi",
            Self::I2c => "i2c",
            Self::Spi => "spi",
        })
    }
}

impl FromStr for BusKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "swi" => Ok(Self::Swi),
            "i2c" | "twi" => Ok(Self::I2c),
            "spi" => Ok(Self::Spi),
            _ => Err(SimError::UnknownName {
                what: "bus",
                name: s.to_string(),
            }),
        }
    }
}

/// A simulated board and the handles tests observe it through
pub struct Bench {
    /// Board with all three buses attached
    pub board: SimBoard,
    /// Event log shared by every chip and bus
    pub counters: Counters,
    /// Board clock
    pub clock: SimClock,
}

impl Bench {
    /// Board with nothing attached
    pub fn empty() -> Self {
        let counters = Counters::new();
        Self::with_buses(
            SimSwi::new(SWI_PINS, counters.clone()),
            SimI2c::new(counters.clone()),
            SimSpi::new(SPI_LINES),
            counters,
        )
    }

    fn with_buses(swi: SimSwi, i2c: SimI2c, spi: SimSpi, counters: Counters) -> Self {
        let clock = SimClock::new();
        Self {
            board: Board::new(Some(swi), Some(i2c), Some(spi), clock.clone()),
            counters,
            clock,
        }
    }

    /// Wrap the board in a kit
    pub fn into_kit(self, config: KitConfig) -> SimKit {
        Kit::new(self.board, config)
    }
}

/// Board with one `chip` on `bus`, at the factory-default address or
/// the first pin / chip select
pub fn bench(chip: ChipKind, bus: BusKind) -> Result<Bench, SimError> {
    let counters = Counters::new();
    let mut swi = SimSwi::new(SWI_PINS, counters.clone());
    let mut i2c = SimI2c::new(counters.clone());
    let mut spi = SimSpi::new(SPI_LINES);

    let family = match chip {
        ChipKind::Sha204 => Some(Family::Sha204),
        ChipKind::Ecc108 => Some(Family::Ecc108),
        ChipKind::Aes132 => None,
    };
    match (family, bus) {
        (Some(family), BusKind::Swi) => {
            swi.attach(0, CryptoAuthChip::new(family, counters.clone()));
        }
        (Some(family), BusKind::I2c) => {
            let address = match family {
                Family::Ecc108 => sha204::ECC108_I2C_ADDRESS,
                _ => sha204::SHA204_I2C_ADDRESS,
            };
            i2c.attach(I2cDevice::CryptoAuth {
                address,
                chip: CryptoAuthChip::new(family, counters.clone()),
            });
        }
        (None, BusKind::I2c) => i2c.attach(I2cDevice::Aes132 {
            address: ck590_core::aes132::I2C_ADDRESS,
            chip: Aes132Chip::new(counters.clone()),
        }),
        (None, BusKind::Spi) => spi.attach(0, Aes132Chip::new(counters.clone())),
        _ => return Err(SimError::Unsupported { chip, bus }),
    }
    log::debug!("sim: {} on {}", chip, bus);
    Ok(Bench::with_buses(swi, i2c, spi, counters))
}
