//! ck590-linux-gpio - Linux GPIO backend for the kit core
//!
//! Drives the kit's single-wire, two-wire and serial-peripheral buses by
//! bit-banging GPIO lines through the Linux character device interface
//! (gpiocdev). Any subset of the three buses can be wired; the others
//! are simply absent from the board.
//!
//! # Example
//!
//! ```no_run
//! use ck590_core::{Kit, KitConfig};
//! use ck590_linux_gpio::{open_board, parse_options};
//!
//! let config = parse_options(&[("gpiochip", "0"), ("swi", "17"), ("sda", "2"), ("scl", "3")])?;
//! let kit_config = KitConfig::default();
//! let board = open_board(&config, kit_config.i2c_speed.timing())?;
//! let mut kit = Kit::new(board, kit_config);
//! kit.discover();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Usage with the ck590 CLI
//!
//! ```bash
//! # One SHA204 on GPIO17, two-wire bus on GPIO2/GPIO3
//! ck590 serve --gpio dev=/dev/gpiochip0,swi=17,sda=2,scl=3
//!
//! # AES132 on a bit-banged serial-peripheral bus
//! ck590 discover --gpio gpiochip=0,cs=8,sck=11,mosi=10,miso=9
//! ```
//!
//! # Wiring
//!
//! | Signal | Direction | Notes |
//! |--------|-----------|-------|
//! | SWI    | open-drain | external pull-up recommended |
//! | SDA    | open-drain | external pull-up required |
//! | SCL    | open-drain | external pull-up required |
//! | CS     | output    | active low, one per device |
//! | SCK    | output    | mode 0 |
//! | MOSI   | output    | |
//! | MISO   | input     | |
//!
//! # System Requirements
//!
//! - Linux kernel 4.8+ with GPIO character device support (kernel 5.5+ for v2 API)
//! - Access to `/dev/gpiochipN` devices (may require root or udev rules)
//!
//! Single-wire bit timing is in the microsecond range. Userspace GPIO
//! meets it only on an otherwise idle core; a real-time kernel or an
//! isolated CPU helps.

pub mod device;
pub mod error;

// Re-exports
pub use device::{
    open_board, parse_options, GpioBoard, GpioI2c, GpioI2cLines, GpioSpi, GpioSpiLines, GpioSwi,
    GpioSwiPins, LinuxGpioConfig, SpiWiring, StdClock,
};
pub use error::{LinuxGpioError, Result};

/// Parse options and open the board
///
/// This is a convenience function for the CLI `--gpio` option.
pub fn open_linux_gpio(
    options: &[(&str, &str)],
    timing: ck590_core::phys::i2c::I2cTiming,
) -> Result<GpioBoard> {
    let config = parse_options(options)?;
    open_board(&config, timing)
}
