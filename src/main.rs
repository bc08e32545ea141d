//! ck590 - Secure-element evaluation kit
//!
//! Runs the kit firmware core on a Linux host. The host tool talks the
//! kit's hex-ASCII protocol over a serial port, a TCP socket or
//! stdin/stdout; the chips sit either on GPIO lines or in the simulator.
//!
//! # Architecture
//!
//! - `ck590-core` holds everything the firmware does: bus drivers,
//!   framing, discovery and the protocol dispatcher
//! - `ck590-linux-gpio` and `ck590-sim` provide the buses
//! - `ck590-transport` provides the host pipe

mod cli;
mod host;

use clap::Parser;
use cli::{BusArg, ChipArg, Cli, Commands};
use ck590_core::{Kit, KitConfig};
use ck590_sim::{BusKind, ChipKind};
use host::LogFeedback;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config = match cli.board.as_deref() {
        Some(path) => match KitConfig::load_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load board configuration: {}", e);
                std::process::exit(1);
            }
        },
        None => KitConfig::default(),
    };

    match cli.command {
        Commands::Serve { port, gpio } => {
            let board = open_gpio(&gpio, &config)?;
            let mut kit = Kit::with_feedback(board, config, LogFeedback::default());
            kit.discover();
            host::serve(&mut kit, port.as_deref())
        }
        Commands::Discover { gpio } => {
            let board = open_gpio(&gpio, &config)?;
            let mut kit = Kit::with_feedback(board, config, LogFeedback::default());
            let found = kit.discover();
            print!("{}", host::format_table(found, &kit.state().devices));
            Ok(())
        }
        Commands::Sim { chip, bus, port } => {
            let bench = ck590_sim::bench(chip.into(), bus.into())?;
            let mut kit = Kit::with_feedback(bench.board, config, LogFeedback::default());
            kit.discover();
            host::serve(&mut kit, port.as_deref())
        }
    }
}

#[cfg(feature = "linux-gpio")]
fn open_gpio(
    options: &str,
    config: &KitConfig,
) -> Result<ck590_linux_gpio::GpioBoard, Box<dyn std::error::Error>> {
    let options: Vec<(&str, &str)> = options
        .split(',')
        .filter_map(|opt| opt.split_once('='))
        .collect();
    let board = ck590_linux_gpio::open_linux_gpio(&options, config.i2c_speed.timing())?;
    Ok(board)
}

#[cfg(not(feature = "linux-gpio"))]
fn open_gpio(
    _options: &str,
    _config: &KitConfig,
) -> Result<ck590_sim::SimBoard, Box<dyn std::error::Error>> {
    Err("ck590 was built without the linux-gpio feature".into())
}

impl From<ChipArg> for ChipKind {
    fn from(chip: ChipArg) -> Self {
        match chip {
            ChipArg::Sha204 => ChipKind::Sha204,
            ChipArg::Ecc108 => ChipKind::Ecc108,
            ChipArg::Aes132 => ChipKind::Aes132,
        }
    }
}

impl From<BusArg> for BusKind {
    fn from(bus: BusArg) -> Self {
        match bus {
            BusArg::Swi => BusKind::Swi,
            BusArg::I2c => BusKind::I2c,
            BusArg::Spi => BusKind::Spi,
        }
    }
}
