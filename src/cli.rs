//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const PORT_HELP: &str =
    "Host connection: dev=<serial port>[:baud] or ip=<address>:<port> [default: stdin/stdout]";

const GPIO_HELP: &str = "GPIO wiring: dev=/dev/gpiochipN (or gpiochip=N) plus swi=<line> \
     (repeatable), sda=,scl= and/or cs= (repeatable),sck=,mosi=,miso=";

#[derive(Parser)]
#[command(name = "ck590")]
#[command(author, version, about = "Secure-element evaluation kit", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Board configuration file (RON format)
    #[arg(long, global = true)]
    pub board: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the kit protocol on GPIO-wired chips
    Serve {
        #[arg(short, long, help = PORT_HELP)]
        port: Option<String>,

        #[arg(short, long, help = GPIO_HELP)]
        gpio: String,
    },

    /// Run one discovery pass and print the device table
    Discover {
        #[arg(short, long, help = GPIO_HELP)]
        gpio: String,
    },

    /// Serve the kit protocol on a simulated chip
    Sim {
        /// Chip to simulate
        #[arg(short, long, value_enum)]
        chip: ChipArg,

        /// Bus the chip sits on
        #[arg(short, long, value_enum)]
        bus: BusArg,

        #[arg(short, long, help = PORT_HELP)]
        port: Option<String>,
    },
}

/// Simulated chip family
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChipArg {
    Sha204,
    Ecc108,
    Aes132,
}

/// Simulated bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BusArg {
    Swi,
    #[value(alias = "twi")]
    I2c,
    Spi,
}
