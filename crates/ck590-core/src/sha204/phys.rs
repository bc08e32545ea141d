//! Physical adapters for the SHA204 / ECC108 framing layer
//!
//! The framing layer talks to a [`CryptoAuthPhy`]; one adapter per bus
//! maps its primitives (flags on single-wire, word addresses on two-wire)
//! and translates bus errors into library errors.

use super::{word_address, RSP_SIZE_MIN, SYNC_TIMEOUT_MS, WAKEUP_DELAY_US, WAKEUP_PULSE_US};
use crate::clock::Clock;
use crate::error::{BusError, Sha204Error};
use crate::phys::{I2cBus, SwiBus};

/// Physical operations the framing layer needs from a bus
pub trait CryptoAuthPhy {
    /// Generate the wake-up signal and wait for the chip to come up
    fn wakeup(&mut self) -> Result<(), Sha204Error>;

    /// Transmit a complete command frame (CRC included)
    fn send_command(&mut self, frame: &[u8]) -> Result<(), Sha204Error>;

    /// Receive a response of at most `buf.len()` bytes
    ///
    /// A count byte outside `[RSP_SIZE_MIN, buf.len()]` is reported as
    /// [`Sha204Error::InvalidSize`].
    fn receive_response(&mut self, buf: &mut [u8]) -> Result<(), Sha204Error>;

    /// Put the chip into idle mode
    fn idle(&mut self) -> Result<(), Sha204Error>;

    /// Put the chip to sleep
    fn sleep(&mut self) -> Result<(), Sha204Error>;

    /// Reset the chip's IO buffer address
    fn reset_io(&mut self) -> Result<(), Sha204Error>;

    /// Try to regain byte synchronization without waking the chip
    fn resync(&mut self, buf: &mut [u8]) -> Result<(), Sha204Error>;
}

impl<P: CryptoAuthPhy + ?Sized> CryptoAuthPhy for &mut P {
    fn wakeup(&mut self) -> Result<(), Sha204Error> {
        (**self).wakeup()
    }
    fn send_command(&mut self, frame: &[u8]) -> Result<(), Sha204Error> {
        (**self).send_command(frame)
    }
    fn receive_response(&mut self, buf: &mut [u8]) -> Result<(), Sha204Error> {
        (**self).receive_response(buf)
    }
    fn idle(&mut self) -> Result<(), Sha204Error> {
        (**self).idle()
    }
    fn sleep(&mut self) -> Result<(), Sha204Error> {
        (**self).sleep()
    }
    fn reset_io(&mut self) -> Result<(), Sha204Error> {
        (**self).reset_io()
    }
    fn resync(&mut self, buf: &mut [u8]) -> Result<(), Sha204Error> {
        (**self).resync(buf)
    }
}

fn check_count(buf: &[u8]) -> Result<(), Sha204Error> {
    let count = buf.first().copied().unwrap_or(0) as usize;
    if count < RSP_SIZE_MIN || count > buf.len() {
        return Err(Sha204Error::InvalidSize);
    }
    Ok(())
}

/// Single-wire flag bytes
pub mod flag {
    /// A command frame follows
    pub const COMMAND: u8 = 0x77;
    /// Request the response
    pub const TRANSMIT: u8 = 0x88;
    /// Enter idle mode
    pub const IDLE: u8 = 0xBB;
    /// Enter sleep mode
    pub const SLEEP: u8 = 0xCC;
}

/// CryptoAuth chip on the single-wire bus
pub struct SwiCryptoAuth<'a, W, C> {
    bus: &'a mut W,
    clock: C,
}

impl<'a, W: SwiBus, C: Clock> SwiCryptoAuth<'a, W, C> {
    /// Adapter over the selected pin of `bus`
    pub fn new(bus: &'a mut W, clock: C) -> Self {
        Self { bus, clock }
    }

    fn send_flag(&mut self, flag: u8) -> Result<(), Sha204Error> {
        self.bus
            .send_bytes(&[flag])
            .map_err(|_| Sha204Error::CommFail)
    }
}

impl<W: SwiBus, C: Clock> CryptoAuthPhy for SwiCryptoAuth<'_, W, C> {
    fn wakeup(&mut self) -> Result<(), Sha204Error> {
        self.bus.wake_pulse(WAKEUP_PULSE_US);
        self.clock.delay_us(WAKEUP_DELAY_US);
        Ok(())
    }

    fn send_command(&mut self, frame: &[u8]) -> Result<(), Sha204Error> {
        // Older silicon needs the command flag to last longer than one
        // flag time, so a zero flag goes first.
        self.send_flag(0x00)?;
        self.send_flag(flag::COMMAND)?;
        self.bus
            .send_bytes(frame)
            .map_err(|_| Sha204Error::CommFail)
    }

    fn receive_response(&mut self, buf: &mut [u8]) -> Result<(), Sha204Error> {
        buf.fill(0);
        if let Err(e) = self.bus.send_bytes(&[flag::TRANSMIT]) {
            log::debug!("swi: transmit flag not sent: {}", e);
        }
        match self.bus.receive_bytes(buf) {
            // A response shorter than the buffer ends in RxFail
            Ok(()) | Err(BusError::RxFail) => check_count(buf),
            Err(BusError::Timeout) => Err(Sha204Error::RxNoResponse),
            Err(_) => Err(Sha204Error::RxFail),
        }
    }

    fn idle(&mut self) -> Result<(), Sha204Error> {
        self.send_flag(flag::IDLE)
    }

    fn sleep(&mut self) -> Result<(), Sha204Error> {
        self.send_flag(flag::SLEEP)
    }

    fn reset_io(&mut self) -> Result<(), Sha204Error> {
        Ok(())
    }

    fn resync(&mut self, buf: &mut [u8]) -> Result<(), Sha204Error> {
        self.clock.delay_ms(SYNC_TIMEOUT_MS);
        self.receive_response(buf)
    }
}

/// CryptoAuth chip on the two-wire bus
pub struct I2cCryptoAuth<'a, T, C> {
    bus: &'a mut T,
    clock: C,
    address: u8,
}

impl<'a, T: I2cBus, C: Clock> I2cCryptoAuth<'a, T, C> {
    /// Adapter for the chip at 8-bit `address` (read bit clear)
    pub fn new(bus: &'a mut T, clock: C, address: u8) -> Self {
        Self {
            bus,
            clock,
            address: address & !1,
        }
    }

    /// Start condition plus address byte; sends a stop on failure
    fn address(&mut self, read: bool) -> Result<(), BusError> {
        self.bus.send_start()?;
        let sla = self.address | u8::from(read);
        if let Err(e) = self.bus.send_bytes(&[sla]) {
            let _ = self.bus.send_stop();
            return Err(e);
        }
        Ok(())
    }

    fn send(&mut self, word_address: u8, data: &[u8]) -> Result<(), Sha204Error> {
        self.address(false).map_err(|_| Sha204Error::CommFail)?;
        let sent = self.bus.send_bytes(&[word_address]).and_then(|()| {
            if data.is_empty() {
                Ok(())
            } else {
                self.bus.send_bytes(data)
            }
        });
        if sent.is_err() {
            let _ = self.bus.send_stop();
            return Err(Sha204Error::CommFail);
        }
        self.bus.send_stop().map_err(|_| Sha204Error::CommFail)
    }
}

impl<T: I2cBus, C: Clock> CryptoAuthPhy for I2cCryptoAuth<'_, T, C> {
    fn wakeup(&mut self) -> Result<(), Sha204Error> {
        self.bus.wake_pulse(WAKEUP_PULSE_US);
        self.clock.delay_us(WAKEUP_DELAY_US);
        Ok(())
    }

    fn send_command(&mut self, frame: &[u8]) -> Result<(), Sha204Error> {
        self.send(word_address::COMMAND, frame)
    }

    fn receive_response(&mut self, buf: &mut [u8]) -> Result<(), Sha204Error> {
        if buf.is_empty() {
            return Err(Sha204Error::BadParam);
        }
        match self.address(true) {
            Ok(()) => {}
            Err(BusError::Nack) => return Err(Sha204Error::RxNoResponse),
            Err(_) => return Err(Sha204Error::CommFail),
        }
        buf[0] = self
            .bus
            .receive_byte()
            .map_err(|_| Sha204Error::CommFail)?;
        if let Err(e) = check_count(buf) {
            // NACK one more byte so the chip lets go of the bus, then stop
            let mut discard = [0u8; 1];
            let _ = self.bus.receive_bytes(&mut discard);
            return Err(e);
        }
        let count = buf[0] as usize;
        self.bus
            .receive_bytes(&mut buf[1..count])
            .map_err(|_| Sha204Error::CommFail)
    }

    fn idle(&mut self) -> Result<(), Sha204Error> {
        self.send(word_address::IDLE, &[])
    }

    fn sleep(&mut self) -> Result<(), Sha204Error> {
        self.send(word_address::SLEEP, &[])
    }

    fn reset_io(&mut self) -> Result<(), Sha204Error> {
        self.send(word_address::RESET, &[])
    }

    fn resync(&mut self, _buf: &mut [u8]) -> Result<(), Sha204Error> {
        // Nine clocks with SDA released let a chip stuck mid-byte finish
        let _ = self.bus.send_start();
        let _ = self.bus.send_bytes(&[0xFF]);
        // A stop may not follow a start directly, so address the chip first
        self.address(true).map_err(|_| Sha204Error::CommFail)?;
        self.bus.send_stop().map_err(|_| Sha204Error::CommFail)?;
        self.reset_io()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::fake::FakeClock;
    use std::collections::VecDeque;
    use std::vec::Vec;

    #[derive(Default)]
    struct ScriptedSwi {
        sent: Vec<Vec<u8>>,
        replies: VecDeque<Vec<u8>>,
        wakes: usize,
    }

    impl SwiBus for ScriptedSwi {
        fn pin_count(&self) -> u8 {
            1
        }
        fn enable(&mut self) {}
        fn disable(&mut self) {}
        fn select(&mut self, _pin: u8) {}
        fn wake_pulse(&mut self, _low_us: u32) {
            self.wakes += 1;
        }
        fn send_bytes(&mut self, data: &[u8]) -> Result<(), BusError> {
            self.sent.push(data.to_vec());
            Ok(())
        }
        fn receive_bytes(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
            let reply = self.replies.pop_front().ok_or(BusError::Timeout)?;
            let n = reply.len().min(buf.len());
            buf[..n].copy_from_slice(&reply[..n]);
            if n < buf.len() {
                Err(BusError::RxFail)
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_swi_command_is_preceded_by_flags() {
        let mut bus = ScriptedSwi::default();
        let mut phy = SwiCryptoAuth::new(&mut bus, FakeClock::new());
        phy.send_command(&[7, 0x30, 0, 0, 0, 0x03, 0x5D]).unwrap();
        assert_eq!(bus.sent[0], [0x00]);
        assert_eq!(bus.sent[1], [flag::COMMAND]);
        assert_eq!(bus.sent[2], [7, 0x30, 0, 0, 0, 0x03, 0x5D]);
    }

    #[test]
    fn test_swi_short_response_is_accepted() {
        let mut bus = ScriptedSwi::default();
        bus.replies.push_back(std::vec![0x04, 0x11, 0x33, 0x43]);
        let mut phy = SwiCryptoAuth::new(&mut bus, FakeClock::new());
        let mut buf = [0u8; 35];
        phy.receive_response(&mut buf).unwrap();
        assert_eq!(&buf[..4], &[0x04, 0x11, 0x33, 0x43]);
        assert_eq!(bus.sent[0], [flag::TRANSMIT]);
    }

    #[test]
    fn test_swi_silence_is_no_response() {
        let mut bus = ScriptedSwi::default();
        let mut phy = SwiCryptoAuth::new(&mut bus, FakeClock::new());
        let mut buf = [0u8; 7];
        assert_eq!(
            phy.receive_response(&mut buf),
            Err(Sha204Error::RxNoResponse)
        );
    }

    #[test]
    fn test_swi_count_out_of_range() {
        let mut bus = ScriptedSwi::default();
        bus.replies.push_back(std::vec![0xFF; 7]);
        bus.replies.push_back(std::vec![0x02, 0x00]);
        let mut phy = SwiCryptoAuth::new(&mut bus, FakeClock::new());
        let mut buf = [0u8; 7];
        assert_eq!(phy.receive_response(&mut buf), Err(Sha204Error::InvalidSize));
        assert_eq!(phy.receive_response(&mut buf), Err(Sha204Error::InvalidSize));
    }

    #[test]
    fn test_swi_resync_waits_sync_timeout() {
        let clock = FakeClock::new();
        let mut bus = ScriptedSwi::default();
        bus.replies.push_back(std::vec![0x04, 0x11, 0x33, 0x43]);
        let start = clock.peek();
        let mut phy = SwiCryptoAuth::new(&mut bus, clock.clone());
        let mut buf = [0u8; 4];
        phy.resync(&mut buf).unwrap();
        assert!(clock.peek() - start >= u64::from(SYNC_TIMEOUT_MS) * 1_000_000);
    }

    #[derive(Default)]
    struct ScriptedI2c {
        log: Vec<&'static str>,
        written: Vec<u8>,
        nack_address: bool,
        rx: VecDeque<u8>,
    }

    impl I2cBus for ScriptedI2c {
        fn enable(&mut self) {}
        fn disable(&mut self) {}
        fn send_start(&mut self) -> Result<(), BusError> {
            self.log.push("start");
            Ok(())
        }
        fn send_stop(&mut self) -> Result<(), BusError> {
            self.log.push("stop");
            Ok(())
        }
        fn send_bytes(&mut self, data: &[u8]) -> Result<(), BusError> {
            if self.nack_address && data.len() == 1 && data[0] & 0xFE == 0xC8 {
                return Err(BusError::Nack);
            }
            self.written.extend_from_slice(data);
            Ok(())
        }
        fn receive_byte(&mut self) -> Result<u8, BusError> {
            self.rx.pop_front().ok_or(BusError::Timeout)
        }
        fn receive_bytes(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
            for b in buf.iter_mut() {
                *b = self.rx.pop_front().unwrap_or(0xFF);
            }
            self.log.push("stop");
            Ok(())
        }
        fn wake_pulse(&mut self, _low_us: u32) {
            self.log.push("wake");
        }
    }

    #[test]
    fn test_i2c_command_uses_word_address() {
        let mut bus = ScriptedI2c::default();
        let mut phy = I2cCryptoAuth::new(&mut bus, FakeClock::new(), 0xC8);
        phy.send_command(&[7, 0x30, 0, 0, 0, 0x03, 0x5D]).unwrap();
        assert_eq!(bus.written, [0xC8, 0x03, 7, 0x30, 0, 0, 0, 0x03, 0x5D]);
        assert_eq!(bus.log, ["start", "stop"]);
    }

    #[test]
    fn test_i2c_read_nack_is_no_response() {
        let mut bus = ScriptedI2c {
            nack_address: true,
            ..Default::default()
        };
        let mut phy = I2cCryptoAuth::new(&mut bus, FakeClock::new(), 0xC8);
        let mut buf = [0u8; 4];
        assert_eq!(
            phy.receive_response(&mut buf),
            Err(Sha204Error::RxNoResponse)
        );
        assert_eq!(bus.log, ["start", "stop"]);
    }

    #[test]
    fn test_i2c_receive_reads_count_then_rest() {
        let mut bus = ScriptedI2c::default();
        bus.rx.extend([0x04, 0x11, 0x33, 0x43, 0xEE]);
        let mut phy = I2cCryptoAuth::new(&mut bus, FakeClock::new(), 0xC8);
        let mut buf = [0u8; 35];
        phy.receive_response(&mut buf).unwrap();
        assert_eq!(&buf[..4], &[0x04, 0x11, 0x33, 0x43]);
        assert_eq!(bus.rx.len(), 1);
    }

    #[test]
    fn test_i2c_resync_ends_with_reset_io() {
        let mut bus = ScriptedI2c::default();
        let mut phy = I2cCryptoAuth::new(&mut bus, FakeClock::new(), 0xC8);
        let mut buf = [0u8; 4];
        phy.resync(&mut buf).unwrap();
        assert_eq!(bus.written, [0xFF, 0xC9, 0xC8, word_address::RESET]);
    }
}
