//! The kit context
//!
//! [`Kit`] owns everything the firmware kept in globals: the board and its
//! interface state, the device table, the flags the host can flip, and
//! the receive and transmit buffers. One `Kit` serves one host pipe;
//! nothing in it is shared.

use core::convert::Infallible;

use embedded_io::{Read, Write};

use crate::ascii::{dispatch, packet, Collator, Reply};
use crate::board::Board;
use crate::clock::Clock;
use crate::config::KitConfig;
use crate::discover::{self, DeviceTable, DeviceType};
use crate::phys::{I2cBus, InterfaceId, SpiBus, SwiBus};
use crate::sha204::CryptoAuthPhy;

/// Bytes read from the host per poll
const READ_CHUNK: usize = 64;

/// Indicator for the discovered device family (LEDs on the real kit)
pub trait Feedback {
    /// Called after every discovery pass
    fn device_found(&mut self, device: DeviceType);
}

impl Feedback for () {
    fn device_found(&mut self, _device: DeviceType) {}
}

/// State the command handlers work on
pub struct KitState<W, T, S, C> {
    /// Drivers and interface state
    pub board: Board<W, T, S, C>,
    /// Result of the last discovery pass
    pub devices: DeviceTable,
    /// Board configuration
    pub config: KitConfig,
    /// Periodic discovery runs while this is set
    pub discovery_enabled: bool,
    /// Module number, reset to the configured one on power-up
    pub module_number: u8,
    /// Wrap CryptoAuth talk commands in wake-up and idle
    pub wrap_crypto_auth: bool,
    /// Two-wire address of a CryptoAuth chip parked in idle mode
    pub idle_address: Option<u8>,
    discovered: Option<DeviceType>,
}

impl<W: SwiBus, T: I2cBus, S: SpiBus, C: Clock> KitState<W, T, S, C> {
    /// Fresh state around `board`
    pub fn new(board: Board<W, T, S, C>, config: KitConfig) -> Self {
        Self {
            board,
            devices: DeviceTable::new(),
            discovery_enabled: config.discovery_enabled,
            module_number: config.module_number,
            wrap_crypto_auth: true,
            idle_address: None,
            discovered: None,
            config,
        }
    }

    /// Run discovery and update the flags that depend on it
    ///
    /// Periodic discovery stays enabled only while nothing is found.
    pub fn discover(&mut self) -> InterfaceId {
        let plan = self.config.discovery_plan();
        let found = discover::discover(&mut self.board, &mut self.devices, &plan);
        self.discovery_enabled = found == InterfaceId::Unknown;
        self.idle_address = None;
        self.discovered = Some(
            self.devices
                .first()
                .map_or(DeviceType::Unknown, |r| r.device_type),
        );
        found
    }

    /// Device type of the last discovery pass not yet reported
    pub fn take_discovered(&mut self) -> Option<DeviceType> {
        self.discovered.take()
    }

    /// Remember that the chip on the active two-wire address was put in
    /// idle mode
    pub fn note_idle(&mut self) {
        self.idle_address = match self.board.active() {
            InterfaceId::I2c => Some(self.board.crypto_auth_address()),
            _ => None,
        };
    }

    /// Send the idle keep-alive to a parked chip
    fn keep_alive(&mut self) {
        let Some(address) = self.idle_address else {
            return;
        };
        if self.board.active() != InterfaceId::I2c {
            return;
        }
        let selected = self.board.crypto_auth_address();
        if self.board.select_crypto_auth(address).is_err() {
            return;
        }
        let acknowledged = match self.board.crypto_auth_phy() {
            Ok(mut phy) => phy.idle().is_ok(),
            Err(_) => false,
        };
        if !acknowledged {
            log::debug!("keep-alive to 0x{:02X} not acknowledged", address);
        }
        let _ = self.board.select_crypto_auth(selected);
    }
}

/// A kit serving one host
pub struct Kit<W, T, S, C, F = ()> {
    state: KitState<W, T, S, C>,
    collator: Collator,
    reply: Reply,
    feedback: F,
    last_discovery_ms: u64,
    last_keepalive_ms: u64,
}

impl<W: SwiBus, T: I2cBus, S: SpiBus, C: Clock> Kit<W, T, S, C> {
    /// Kit without a feedback indicator
    pub fn new(board: Board<W, T, S, C>, config: KitConfig) -> Self {
        Self::with_feedback(board, config, ())
    }
}

impl<W, T, S, C, F> Kit<W, T, S, C, F>
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
    F: Feedback,
{
    /// Kit reporting discovery results to `feedback`
    pub fn with_feedback(board: Board<W, T, S, C>, config: KitConfig, feedback: F) -> Self {
        Self {
            state: KitState::new(board, config),
            collator: Collator::new(),
            reply: Reply::new(),
            feedback,
            last_discovery_ms: 0,
            last_keepalive_ms: 0,
        }
    }

    /// Handler state
    pub fn state(&self) -> &KitState<W, T, S, C> {
        &self.state
    }

    /// Handler state, mutable
    pub fn state_mut(&mut self) -> &mut KitState<W, T, S, C> {
        &mut self.state
    }

    /// The feedback indicator
    pub fn feedback(&self) -> &F {
        &self.feedback
    }

    /// Run discovery now
    pub fn discover(&mut self) -> InterfaceId {
        let found = self.state.discover();
        self.notify();
        found
    }

    fn notify(&mut self) {
        if let Some(device) = self.state.take_discovered() {
            self.feedback.device_found(device);
        }
    }

    /// Execute one command line and return its status
    ///
    /// The result stays in [`Kit::reply`] until the next command.
    pub fn execute(&mut self, line: &[u8]) -> u8 {
        let status = dispatch::dispatch(&mut self.state, line, &mut self.reply);
        self.notify();
        status
    }

    /// Result of the last command
    pub fn reply(&self) -> &Reply {
        &self.reply
    }

    /// Feed one host byte; a completed line is executed and its response
    /// written to `out`
    ///
    /// Returns true when a response was written.
    pub fn process_byte<Wr: Write>(&mut self, byte: u8, out: &mut Wr) -> Result<bool, Wr::Error> {
        if !self.collator.push(byte) {
            return Ok(false);
        }
        let status = match self.collator.line() {
            Ok(line) => dispatch::dispatch(&mut self.state, line, &mut self.reply),
            Err(e) => {
                log::debug!("host packet rejected: {}", e);
                self.reply.clear();
                e.code()
            }
        };
        self.notify();
        packet::write_packet(out, status, &self.reply)?;
        Ok(true)
    }

    /// Read what the host has sent and answer every completed line
    ///
    /// Returns the number of bytes read. Transports are expected to return
    /// 0 when nothing arrived within their read timeout and an error once
    /// the host is gone.
    pub fn poll<IO: Read + Write>(&mut self, io: &mut IO) -> Result<usize, IO::Error> {
        let mut buf = [0u8; READ_CHUNK];
        let n = io.read(&mut buf)?;
        for &byte in &buf[..n] {
            self.process_byte(byte, io)?;
        }
        Ok(n)
    }

    /// Periodic work: rediscovery while enabled and the idle keep-alive
    pub fn tick(&mut self, now_ms: u64) {
        let rediscover = u64::from(self.state.config.rediscover_interval_ms);
        if self.state.discovery_enabled
            && now_ms.wrapping_sub(self.last_discovery_ms) >= rediscover
        {
            self.last_discovery_ms = now_ms;
            log::trace!("periodic discovery");
            self.discover();
        }
        let keepalive = u64::from(self.state.config.keepalive_interval_ms);
        if now_ms.wrapping_sub(self.last_keepalive_ms) >= keepalive {
            self.last_keepalive_ms = now_ms;
            self.state.keep_alive();
        }
    }

    /// Serve `io` until it fails
    ///
    /// The periodic work runs between reads, so the transport's read
    /// timeout bounds the tick jitter.
    pub fn serve<IO: Read + Write>(&mut self, io: &mut IO) -> Result<Infallible, IO::Error> {
        let clock = self.state.board.clock();
        loop {
            self.poll(io)?;
            self.tick(clock.now_ms());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ascii::packet::tests::Sink;
    use crate::board::tests::Recorder;
    use crate::clock::fake::FakeClock;
    use crate::phys::NoBus;
    use std::vec::Vec;

    #[derive(Default)]
    struct Leds(Vec<DeviceType>);

    impl Feedback for Leds {
        fn device_found(&mut self, device: DeviceType) {
            self.0.push(device);
        }
    }

    fn kit() -> Kit<Recorder, Recorder, NoBus, FakeClock, Leds> {
        let board = Board::new(
            Some(Recorder::default()),
            Some(Recorder::default()),
            None,
            FakeClock::new(),
        );
        Kit::with_feedback(board, KitConfig::default(), Leds::default())
    }

    #[test]
    fn test_line_answered_once_per_terminator() {
        let mut kit = kit();
        let mut out = Sink::default();
        for &b in b"X:Y" {
            assert!(!kit.process_byte(b, &mut out).unwrap());
        }
        assert!(kit.process_byte(b'\n', &mut out).unwrap());
        assert_eq!(out.0, b"C0()\n");
    }

    #[test]
    fn test_version_without_device() {
        let mut kit = kit();
        let mut out = Sink::default();
        for &b in b"b:v\n" {
            kit.process_byte(b, &mut out).unwrap();
        }
        assert_eq!(out.0, b"CK590 no_device 00()\n");
        assert_eq!(kit.feedback().0, [DeviceType::Unknown]);
        assert!(kit.state().discovery_enabled);
    }

    #[test]
    fn test_tick_rediscovers_on_interval() {
        let mut kit = kit();
        kit.tick(0);
        assert!(kit.feedback().0.is_empty());
        kit.tick(1_000);
        assert_eq!(kit.feedback().0.len(), 1);
        kit.tick(1_500);
        assert_eq!(kit.feedback().0.len(), 1);
        kit.state_mut().discovery_enabled = false;
        kit.tick(5_000);
        assert_eq!(kit.feedback().0.len(), 1);
    }
}
