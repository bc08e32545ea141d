//! gpiocdev-backed lines for the kit's bit-bang drivers
//!
//! Each bus gets its own line request so a board can wire any subset of
//! them:
//!
//! - [`GpioSwiPins`]: one request per single-wire pin. The line is
//!   released by turning it into a pulled-up input and driven by turning
//!   it into an output at 0, which gives open-drain behavior on chips
//!   without open-drain support.
//! - [`GpioI2cLines`]: SDA and SCL in one request, open-drain the same
//!   way.
//! - [`GpioSpiLines`]: chip selects, SCK and MOSI as outputs, MISO as an
//!   input.
//!
//! Userspace timing is best effort. The drivers only rely on minimum
//! durations, which [`StdClock`] guarantees; a preempted pulse gets
//! longer, never shorter.

use std::time::{Duration, Instant};

use crate::error::{LinuxGpioError, Result};

use gpiocdev::line::{Bias, Offset, Value};
use gpiocdev::request::{Config, Request};

use ck590_core::clock::Clock;
use ck590_core::phys::bitbang::BitbangSpiMaster;
use ck590_core::phys::i2c::{I2cBitbang, I2cLines, I2cTiming};
use ck590_core::phys::spi::BitbangSpi;
use ck590_core::phys::swi::{SwiBitbang, SwiPort};
use ck590_core::Board;

/// Consumer label shown by `gpioinfo`
const CONSUMER: &str = "ck590";

/// Default half-period delay in nanoseconds (for ~100 kHz SPI clock)
const DEFAULT_HALF_PERIOD_NS: u64 = 5000;

/// Delays at least this long sleep instead of spinning
const SLEEP_THRESHOLD_NS: u64 = 200_000;

/// Monotonic clock on `std::time::Instant`
///
/// Short delays spin, long ones sleep. Clones share the origin.
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    /// Clock starting at zero now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now_ns(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn delay_ns(&mut self, ns: u64) {
        if ns >= SLEEP_THRESHOLD_NS {
            std::thread::sleep(Duration::from_nanos(ns));
            return;
        }
        let start = Instant::now();
        let wait = Duration::from_nanos(ns);
        while start.elapsed() < wait {
            std::hint::spin_loop();
        }
    }
}

/// Serial-peripheral wiring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiWiring {
    /// Chip-select lines, one per device index
    pub cs: Vec<Offset>,
    /// Clock line
    pub sck: Offset,
    /// Master Out Slave In
    pub mosi: Offset,
    /// Master In Slave Out
    pub miso: Offset,
}

/// Which lines of one GPIO chip carry which bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxGpioConfig {
    /// Device path (e.g., "/dev/gpiochip0")
    pub device: String,
    /// Single-wire pin table, in index order
    pub swi: Vec<Offset>,
    /// Two-wire SDA and SCL lines
    pub i2c: Option<(Offset, Offset)>,
    /// Serial-peripheral lines
    pub spi: Option<SpiWiring>,
    /// Serial-peripheral half-period delay in nanoseconds
    pub half_period_ns: u64,
}

impl Default for LinuxGpioConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            swi: Vec::new(),
            i2c: None,
            spi: None,
            half_period_ns: DEFAULT_HALF_PERIOD_NS,
        }
    }
}

impl LinuxGpioConfig {
    /// Configuration for `device` with nothing wired yet
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Append a single-wire pin to the pin table
    pub fn with_swi_pin(mut self, offset: Offset) -> Self {
        self.swi.push(offset);
        self
    }

    /// Wire the two-wire bus
    pub fn with_i2c(mut self, sda: Offset, scl: Offset) -> Self {
        self.i2c = Some((sda, scl));
        self
    }

    /// Wire the serial-peripheral bus
    pub fn with_spi(mut self, wiring: SpiWiring) -> Self {
        self.spi = Some(wiring);
        self
    }

    /// Set SPI speed in Hz (approximate, via half-period calculation)
    pub fn with_speed_hz(mut self, hz: u32) -> Self {
        if hz > 0 {
            self.half_period_ns = 500_000_000 / u64::from(hz);
        }
        self
    }

    /// Every line the configuration claims
    fn lines(&self) -> Vec<Offset> {
        let mut lines = self.swi.clone();
        if let Some((sda, scl)) = self.i2c {
            lines.extend([sda, scl]);
        }
        if let Some(spi) = &self.spi {
            lines.extend(spi.cs.iter().copied());
            lines.extend([spi.sck, spi.mosi, spi.miso]);
        }
        lines
    }

    /// Reject a configuration that wires nothing or shares a line
    pub fn validate(&self) -> Result<()> {
        if self.device.is_empty() {
            return Err(LinuxGpioError::NoDevice);
        }
        let lines = self.lines();
        if lines.is_empty() {
            return Err(LinuxGpioError::NothingWired);
        }
        for (i, line) in lines.iter().enumerate() {
            if lines[..i].contains(line) {
                return Err(LinuxGpioError::DuplicateLine(*line));
            }
        }
        Ok(())
    }
}

fn request(device: &str, lines: &[Offset], config: Config) -> Result<Request> {
    Request::from_config(config)
        .on_chip(device)
        .with_consumer(CONSUMER)
        .request()
        .map_err(|source| LinuxGpioError::LineRequestFailed {
            device: device.to_string(),
            lines: lines.to_vec(),
            source,
        })
}

/// Add `offset` to `cfg`, released (pulled-up input) or driven low
fn open_drain(cfg: &mut Config, offset: Offset, high: bool) {
    if high {
        cfg.with_line(offset).as_input().with_bias(Bias::PullUp);
    } else {
        cfg.with_line(offset).as_output(Value::Inactive);
    }
}

fn is_active(request: &Request, offset: Offset, name: &str) -> bool {
    match request.value(offset) {
        Ok(Value::Active) => true,
        Ok(Value::Inactive) => false,
        Err(e) => {
            log::error!("Failed to get {}: {}", name, e);
            false
        }
    }
}

/// Single-wire pin table
pub struct GpioSwiPins {
    pins: Vec<(Offset, Request)>,
}

impl GpioSwiPins {
    /// Request every pin, released
    pub fn open(device: &str, offsets: &[Offset]) -> Result<Self> {
        let mut pins = Vec::with_capacity(offsets.len());
        for &offset in offsets {
            let mut cfg = Config::default();
            open_drain(&mut cfg, offset, true);
            pins.push((offset, request(device, &[offset], cfg)?));
        }
        Ok(Self { pins })
    }

    fn drive(&mut self, pin: u8, high: bool) {
        let Some((offset, request)) = self.pins.get(usize::from(pin)) else {
            return;
        };
        let mut cfg = Config::default();
        open_drain(&mut cfg, *offset, high);
        if let Err(e) = request.reconfigure(&cfg) {
            log::error!("Failed to drive single-wire pin {}: {}", offset, e);
        }
    }
}

impl SwiPort for GpioSwiPins {
    fn pin_count(&self) -> u8 {
        u8::try_from(self.pins.len()).unwrap_or(u8::MAX)
    }

    fn open(&mut self, pin: u8) {
        self.drive(pin, true);
    }

    fn close(&mut self, pin: u8) {
        self.drive(pin, true);
    }

    fn drive_low(&mut self, pin: u8) {
        self.drive(pin, false);
    }

    fn release(&mut self, pin: u8) {
        self.drive(pin, true);
    }

    fn is_high(&mut self, pin: u8) -> bool {
        match self.pins.get(usize::from(pin)) {
            Some((offset, request)) => is_active(request, *offset, "SWI"),
            None => false,
        }
    }
}

/// Two-wire SDA and SCL
pub struct GpioI2cLines {
    request: Request,
    sda: Offset,
    scl: Offset,
    sda_high: bool,
    scl_high: bool,
}

impl GpioI2cLines {
    /// Request both lines, released
    pub fn open(device: &str, sda: Offset, scl: Offset) -> Result<Self> {
        let request = request(device, &[sda, scl], Self::config(sda, scl, true, true))?;
        Ok(Self {
            request,
            sda,
            scl,
            sda_high: true,
            scl_high: true,
        })
    }

    fn config(sda: Offset, scl: Offset, sda_high: bool, scl_high: bool) -> Config {
        let mut cfg = Config::default();
        open_drain(&mut cfg, sda, sda_high);
        open_drain(&mut cfg, scl, scl_high);
        cfg
    }

    fn apply(&mut self, sda_high: bool, scl_high: bool) {
        if (sda_high, scl_high) == (self.sda_high, self.scl_high) {
            return;
        }
        let cfg = Self::config(self.sda, self.scl, sda_high, scl_high);
        if let Err(e) = self.request.reconfigure(&cfg) {
            log::error!("Failed to reconfigure two-wire lines: {}", e);
            return;
        }
        self.sda_high = sda_high;
        self.scl_high = scl_high;
    }
}

impl I2cLines for GpioI2cLines {
    fn set_sda(&mut self, high: bool) {
        self.apply(high, self.scl_high);
    }

    fn set_scl(&mut self, high: bool) {
        self.apply(self.sda_high, high);
    }

    fn sda(&mut self) -> bool {
        is_active(&self.request, self.sda, "SDA")
    }

    fn scl(&mut self) -> bool {
        is_active(&self.request, self.scl, "SCL")
    }
}

/// Bit-banged serial-peripheral lines
pub struct GpioSpiLines {
    request: Request,
    wiring: SpiWiring,
    routed: usize,
    half_period_ns: u64,
}

impl GpioSpiLines {
    /// Request the lines: CS high (inactive), SCK and MOSI low, MISO input
    pub fn open(device: &str, wiring: SpiWiring, half_period_ns: u64) -> Result<Self> {
        if wiring.cs.is_empty() {
            return Err(LinuxGpioError::MissingParameter("cs"));
        }
        let mut cfg = Config::default();
        for &cs in &wiring.cs {
            cfg.with_line(cs).as_output(Value::Active);
        }
        cfg.with_line(wiring.sck).as_output(Value::Inactive);
        cfg.with_line(wiring.mosi).as_output(Value::Inactive);
        cfg.with_line(wiring.miso).as_input();

        let mut lines = wiring.cs.clone();
        lines.extend([wiring.sck, wiring.mosi, wiring.miso]);
        let request = request(device, &lines, cfg)?;
        Ok(Self {
            request,
            wiring,
            routed: 0,
            half_period_ns,
        })
    }

    fn set(&self, offset: Offset, high: bool, name: &str) {
        let value = if high { Value::Active } else { Value::Inactive };
        if let Err(e) = self.request.set_value(offset, value) {
            log::error!("Failed to set {}: {}", name, e);
        }
    }
}

impl BitbangSpiMaster for GpioSpiLines {
    fn cs_count(&self) -> u8 {
        u8::try_from(self.wiring.cs.len()).unwrap_or(u8::MAX)
    }

    fn route_cs(&mut self, index: u8) -> bool {
        if usize::from(index) >= self.wiring.cs.len() {
            return false;
        }
        self.routed = usize::from(index);
        true
    }

    fn set_cs(&mut self, active: bool) {
        // CS is active low
        self.set(self.wiring.cs[self.routed], !active, "CS");
    }

    fn set_sck(&mut self, high: bool) {
        self.set(self.wiring.sck, high, "SCK");
    }

    fn set_mosi(&mut self, high: bool) {
        self.set(self.wiring.mosi, high, "MOSI");
    }

    fn get_miso(&self) -> bool {
        is_active(&self.request, self.wiring.miso, "MISO")
    }

    fn half_period_delay(&self) {
        if self.half_period_ns > 0 {
            std::thread::sleep(Duration::from_nanos(self.half_period_ns));
        }
    }
}

/// Single-wire driver on GPIO pins
pub type GpioSwi = SwiBitbang<GpioSwiPins, StdClock>;
/// Two-wire driver on GPIO lines
pub type GpioI2c = I2cBitbang<GpioI2cLines, StdClock>;
/// Serial-peripheral driver on GPIO lines
pub type GpioSpi = BitbangSpi<GpioSpiLines>;
/// Board built from GPIO lines
pub type GpioBoard = Board<GpioSwi, GpioI2c, GpioSpi, StdClock>;

/// Request every wired line and build the board
pub fn open_board(config: &LinuxGpioConfig, timing: I2cTiming) -> Result<GpioBoard> {
    config.validate()?;
    let clock = StdClock::new();
    let device = config.device.as_str();

    let swi = if config.swi.is_empty() {
        None
    } else {
        let pins = GpioSwiPins::open(device, &config.swi)?;
        Some(SwiBitbang::new(pins, clock))
    };
    let i2c = match config.i2c {
        Some((sda, scl)) => Some(I2cBitbang::new(
            GpioI2cLines::open(device, sda, scl)?,
            clock,
            timing,
        )),
        None => None,
    };
    let spi = match &config.spi {
        Some(wiring) => Some(BitbangSpi::new(GpioSpiLines::open(
            device,
            wiring.clone(),
            config.half_period_ns,
        )?)),
        None => None,
    };

    log::info!(
        "linux_gpio: Opened {} (swi={:?}, i2c={:?}, spi={:?})",
        device,
        config.swi,
        config.i2c,
        config.spi
    );
    Ok(Board::new(swi, i2c, spi, clock))
}

fn line(name: &'static str, value: &str) -> Result<Offset> {
    value
        .parse()
        .map_err(|_| LinuxGpioError::InvalidLineNumber {
            name,
            value: value.to_string(),
        })
}

/// Parse backend options from a list of key-value pairs
///
/// # Supported Options
///
/// - `dev=/dev/gpiochipN` - GPIO chip device path (required, or use gpiochip)
/// - `gpiochip=N` - GPIO chip number (alternative to dev)
/// - `swi=N` - single-wire pin; repeat for a pin table, in index order
/// - `sda=N`, `scl=N` - two-wire lines (both or neither)
/// - `cs=N` - chip-select line; repeat for several devices
/// - `sck=N`, `mosi=N`, `miso=N` - serial-peripheral lines (with `cs`)
/// - `spispeed=N` - SPI speed in kHz (optional, default ~100 kHz)
pub fn parse_options(options: &[(&str, &str)]) -> Result<LinuxGpioConfig> {
    let mut config = LinuxGpioConfig::default();
    let mut gpiochip: Option<u32> = None;
    let (mut sda, mut scl) = (None, None);
    let mut cs = Vec::new();
    let (mut sck, mut mosi, mut miso) = (None, None, None);

    for (key, value) in options {
        match *key {
            "dev" => config.device = value.to_string(),
            "gpiochip" => {
                gpiochip = Some(value.parse().map_err(|_| {
                    LinuxGpioError::InvalidParameter(format!("gpiochip={}", value))
                })?);
            }
            "swi" => config.swi.push(line("swi", value)?),
            "sda" => sda = Some(line("sda", value)?),
            "scl" => scl = Some(line("scl", value)?),
            "cs" => cs.push(line("cs", value)?),
            "sck" => sck = Some(line("sck", value)?),
            "mosi" => mosi = Some(line("mosi", value)?),
            "miso" => miso = Some(line("miso", value)?),
            "spispeed" => {
                let speed_khz: u32 = value.parse().map_err(|_| {
                    LinuxGpioError::InvalidParameter(format!("spispeed={}", value))
                })?;
                config = config.with_speed_hz(speed_khz.saturating_mul(1000));
            }
            _ => log::warn!("linux_gpio: Unknown option: {}={}", key, value),
        }
    }

    // Handle dev vs gpiochip
    if config.device.is_empty() {
        match gpiochip {
            Some(n) if n > 9 => {
                return Err(LinuxGpioError::InvalidParameter(
                    "Maximum gpiochip number supported is 9".to_string(),
                ))
            }
            Some(n) => config.device = format!("/dev/gpiochip{}", n),
            None => return Err(LinuxGpioError::NoDevice),
        }
    } else if gpiochip.is_some() {
        return Err(LinuxGpioError::InvalidParameter(
            "Only one of 'dev' or 'gpiochip' can be specified".to_string(),
        ));
    }

    config.i2c = match (sda, scl) {
        (Some(sda), Some(scl)) => Some((sda, scl)),
        (None, None) => None,
        (Some(_), None) => return Err(LinuxGpioError::MissingParameter("scl")),
        (None, Some(_)) => return Err(LinuxGpioError::MissingParameter("sda")),
    };

    if !cs.is_empty() || sck.is_some() || mosi.is_some() || miso.is_some() {
        if cs.is_empty() {
            return Err(LinuxGpioError::MissingParameter("cs"));
        }
        config.spi = Some(SpiWiring {
            cs,
            sck: sck.ok_or(LinuxGpioError::MissingParameter("sck"))?,
            mosi: mosi.ok_or(LinuxGpioError::MissingParameter("mosi"))?,
            miso: miso.ok_or(LinuxGpioError::MissingParameter("miso"))?,
        });
    }

    config.validate()?;
    Ok(config)
}
