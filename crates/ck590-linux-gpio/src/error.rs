//! Errors opening GPIO lines

use gpiocdev::line::Offset;
use thiserror::Error;

/// Linux GPIO backend errors
#[derive(Debug, Error)]
pub enum LinuxGpioError {
    /// The kernel refused the line request (busy line, no permission)
    #[error("Failed to request GPIO lines {lines:?} on '{device}': {source}")]
    LineRequestFailed {
        device: String,
        lines: Vec<Offset>,
        #[source]
        source: gpiocdev::Error,
    },

    /// Option value out of range or contradicting another option
    #[error("Invalid option: {0}")]
    InvalidParameter(String),

    /// A bus was partly wired
    #[error("Missing line for {0}")]
    MissingParameter(&'static str),

    /// Neither dev= nor gpiochip= given
    #[error("No GPIO chip specified. Use dev=/dev/gpiochipN or gpiochip=N")]
    NoDevice,

    /// Line offset is not a number
    #[error("{name}={value} is not a GPIO line offset")]
    InvalidLineNumber { name: &'static str, value: String },

    /// The same line was assigned twice
    #[error("GPIO line {0} is used by more than one signal")]
    DuplicateLine(Offset),

    /// No bus was wired at all
    #[error("No bus wired. Give swi=, sda=/scl= or cs=/sck=/mosi=/miso= lines")]
    NothingWired,
}

/// Result alias for this crate
pub type Result<T> = std::result::Result<T, LinuxGpioError>;
