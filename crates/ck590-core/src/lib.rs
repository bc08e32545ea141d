//! ck590-core - Firmware core of a secure-element evaluation kit
//!
//! The kit bridges a host PC to SHA204, ECC108 and AES132 authentication
//! chips. The host sends hex-ASCII command lines; the kit drives the chip
//! over single-wire, two-wire or serial-peripheral buses and answers with
//! a status byte and hex data.
//!
//! The crate is `no_std`. Hardware access goes through the bus traits in
//! [`phys`] and timing through [`clock::Clock`], so the same code runs on
//! a microcontroller, on Linux GPIO pins or against simulated chips.
//!
//! # Features
//!
//! - `std` - `std::error::Error` impls and RON configuration loading
//!   (includes `alloc`)
//! - `alloc` - Enable heap allocation
//!
//! # Example
//!
//! ```ignore
//! use ck590_core::{Board, Kit, KitConfig};
//!
//! let board = Board::new(Some(swi), Some(i2c), None, clock);
//! let mut kit = Kit::new(board, KitConfig::default());
//! kit.discover();
//! kit.serve(&mut host)?;
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod aes132;
pub mod ascii;
pub mod board;
pub mod clock;
pub mod config;
pub mod crc;
pub mod discover;
pub mod error;
pub mod kit;
pub mod phys;
pub mod sha204;

pub use board::Board;
pub use clock::Clock;
pub use config::KitConfig;
pub use discover::{DeviceRecord, DeviceTable, DeviceType};
pub use error::{Error, Result};
pub use kit::{Feedback, Kit, KitState};
pub use phys::{I2cBus, InterfaceId, SpiBus, SwiBus};
