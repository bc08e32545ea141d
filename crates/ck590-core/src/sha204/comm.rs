//! SHA204 / ECC108 communication layer
//!
//! Wraps a [`CryptoAuthPhy`] with CRC framing, the wake-up handshake and
//! the re-synchronization procedure. [`Sha204Comm::send_and_receive`] is
//! the single entry point for executing a command.

use super::phys::CryptoAuthPhy;
use super::{
    index, status, CMD_SIZE_MAX, CMD_SIZE_MIN, COMMAND_EXEC_MAX_MS, RSP_SIZE_MIN, WAKE_RESPONSE,
};
use crate::clock::{Clock, Deadline};
use crate::crc::{self, Checksum, Crc16};
use crate::error::Sha204Error;

/// Retries after the first attempt, for both sending and receiving
pub const RETRY_COUNT: usize = 1;

/// Outcome of a successful re-synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resync {
    /// The chip answered without a wake-up
    InSync,
    /// The chip had to be woken up and may have lost its TempKey
    WokeUp,
}

/// Framing and retry logic over a physical adapter
pub struct Sha204Comm<P, C, K = Crc16> {
    phy: P,
    clock: C,
    crc: K,
}

impl<P: CryptoAuthPhy, C: Clock> Sha204Comm<P, C> {
    /// Communication layer with the standard frame checksum
    pub fn new(phy: P, clock: C) -> Self {
        Self::with_checksum(phy, clock, crc::SHA204)
    }
}

impl<P: CryptoAuthPhy, C: Clock, K: Checksum> Sha204Comm<P, C, K> {
    /// Communication layer with a caller-supplied checksum
    pub fn with_checksum(phy: P, clock: C, crc: K) -> Self {
        Self { phy, clock, crc }
    }

    /// Borrow the physical adapter
    pub fn phy(&mut self) -> &mut P {
        &mut self.phy
    }

    /// Borrow the checksum
    pub fn checksum(&self) -> &K {
        &self.crc
    }

    /// Wake the chip and check its wake acknowledgment
    ///
    /// `rx` must hold at least four bytes and receives the raw
    /// acknowledgment. On failure the call waits out the longest command
    /// execution time so a chip that was busy finishes before the next try.
    pub fn wakeup(&mut self, rx: &mut [u8]) -> Result<(), Sha204Error> {
        let result = self.wakeup_once(rx);
        if result.is_err() {
            self.clock.delay_ms(COMMAND_EXEC_MAX_MS);
        }
        result
    }

    fn wakeup_once(&mut self, rx: &mut [u8]) -> Result<(), Sha204Error> {
        if rx.len() < RSP_SIZE_MIN {
            return Err(Sha204Error::BadParam);
        }
        self.phy.wakeup()?;
        let ack = &mut rx[..RSP_SIZE_MIN];
        self.phy.receive_response(ack)?;
        if ack[index::COUNT] as usize != RSP_SIZE_MIN {
            return Err(Sha204Error::InvalidSize);
        }
        if ack[index::RESPONSE] != status::WAKEUP {
            return Err(Sha204Error::CommFail);
        }
        if ack[2..] != WAKE_RESPONSE[2..] {
            return Err(Sha204Error::BadCrc);
        }
        Ok(())
    }

    /// Regain synchronization with the chip
    ///
    /// First without a wake pulse; if that fails the chip is put to sleep
    /// and woken up again.
    pub fn resync(&mut self, rx: &mut [u8]) -> Result<Resync, Sha204Error> {
        if self.phy.resync(rx).is_ok() {
            return Ok(Resync::InSync);
        }
        if let Err(e) = self.phy.sleep() {
            log::debug!("sha204: sleep before resync wake-up failed: {}", e);
        }
        self.wakeup(rx)?;
        Ok(Resync::WokeUp)
    }

    /// Put the chip into idle mode
    pub fn idle(&mut self) -> Result<(), Sha204Error> {
        self.phy.idle()
    }

    /// Put the chip to sleep
    pub fn sleep(&mut self) -> Result<(), Sha204Error> {
        self.phy.sleep()
    }

    fn response_crc_ok(&mut self, rx: &[u8]) -> bool {
        let count = rx[index::COUNT] as usize;
        if count < RSP_SIZE_MIN || count > rx.len() {
            return false;
        }
        self.crc.verify(&rx[..count])
    }

    /// Send a command and receive its response
    ///
    /// `tx[0]` is the frame length including the two CRC bytes, which this
    /// call fills in. After sending, the call waits `exec_delay_ms` and then
    /// polls for the response for up to `exec_timeout_ms`. `rx` keeps the
    /// last response received, also when an error is returned.
    pub fn send_and_receive(
        &mut self,
        tx: &mut [u8],
        rx: &mut [u8],
        exec_delay_ms: u32,
        exec_timeout_ms: u32,
    ) -> Result<(), Sha204Error> {
        let count = tx.first().copied().unwrap_or(0) as usize;
        if !(CMD_SIZE_MIN..=CMD_SIZE_MAX).contains(&count) || count > tx.len() {
            return Err(Sha204Error::BadParam);
        }
        if rx.len() < RSP_SIZE_MIN {
            return Err(Sha204Error::InvalidSize);
        }
        self.crc.append(&mut tx[..count]);
        let frame = &tx[..count];

        let mut result = Err(Sha204Error::GenFail);
        'send: for _ in 0..=RETRY_COUNT {
            if let Err(e) = self.phy.send_command(frame) {
                result = Err(e);
                if self.resync(rx) == Err(Sha204Error::RxNoResponse) {
                    return result;
                }
                continue;
            }

            self.clock.delay_ms(exec_delay_ms);

            for _ in 0..=RETRY_COUNT {
                rx.fill(0);
                result = self.poll_response(rx, exec_timeout_ms);

                match result {
                    Err(Sha204Error::RxNoResponse) => {
                        if self.resync(rx) == Err(Sha204Error::RxNoResponse) {
                            return result;
                        }
                        continue 'send;
                    }
                    Err(Sha204Error::InvalidSize) => {
                        // A count of 0xFF usually means we lost the byte boundary
                        match self.resync(rx) {
                            Ok(Resync::InSync) => continue,
                            Ok(Resync::WokeUp) => continue 'send,
                            Err(_) => return result,
                        }
                    }
                    _ => {}
                }

                if !self.response_crc_ok(rx) {
                    result = Err(Sha204Error::BadCrc);
                    log::debug!("sha204: response CRC mismatch, resyncing");
                    match self.resync(rx) {
                        Ok(Resync::InSync) => continue,
                        Ok(Resync::WokeUp) => continue 'send,
                        Err(_) => return result,
                    }
                }

                if rx[index::COUNT] as usize > RSP_SIZE_MIN {
                    return Ok(());
                }
                match rx[index::RESPONSE] {
                    status::PARSE => return Err(Sha204Error::ParseError),
                    status::EXEC => return Err(Sha204Error::CmdFail),
                    status::COMM => {
                        // The chip saw a bad CRC on our command; send it again
                        result = Err(Sha204Error::StatusCrc);
                        continue 'send;
                    }
                    _ => return Ok(()),
                }
            }
        }
        result
    }

    /// Poll until the chip answers or the timeout runs out
    ///
    /// At least one read is made even with a zero timeout.
    fn poll_response(&mut self, rx: &mut [u8], timeout_ms: u32) -> Result<(), Sha204Error> {
        let deadline = Deadline::after_ms(&self.clock, timeout_ms);
        loop {
            match self.phy.receive_response(rx) {
                Err(Sha204Error::RxNoResponse) if !deadline.expired(&self.clock) => continue,
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::fake::FakeClock;
    use crate::error::BusError;
    use crate::phys::SwiBus;
    use crate::sha204::phys::SwiCryptoAuth;
    use std::collections::VecDeque;
    use std::vec::Vec;

    /// Single-wire bus that plays back canned replies
    #[derive(Default)]
    struct ScriptedSwi {
        commands: usize,
        replies: VecDeque<Option<Vec<u8>>>,
        wakes: usize,
        reads: usize,
        flags_fail: bool,
    }

    impl ScriptedSwi {
        fn reply(&mut self, bytes: &[u8]) {
            self.replies.push_back(Some(bytes.to_vec()));
        }

        fn silence(&mut self) {
            self.replies.push_back(None);
        }
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
            if self.flags_fail && data.len() == 1 {
                return Err(BusError::CommFail);
            }
            if data.len() >= CMD_SIZE_MIN {
                self.commands += 1;
            }
            Ok(())
        }
        fn receive_bytes(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
            self.reads += 1;
            let Some(reply) = self.replies.pop_front().flatten() else {
                return Err(BusError::Timeout);
            };
            let n = reply.len().min(buf.len());
            buf[..n].copy_from_slice(&reply[..n]);
            if n < buf.len() {
                Err(BusError::RxFail)
            } else {
                Ok(())
            }
        }
    }

    /// Counts how many times a CRC is computed
    struct CountingCrc {
        inner: Crc16,
        computed: usize,
    }

    impl Checksum for CountingCrc {
        fn compute(&mut self, data: &[u8]) -> u16 {
            self.computed += 1;
            self.inner.calculate(data)
        }
        fn to_bytes(&self, crc: u16) -> [u8; 2] {
            self.inner.to_bytes(crc)
        }
        fn from_bytes(&self, bytes: [u8; 2]) -> u16 {
            self.inner.from_bytes(bytes)
        }
    }

    fn with_crc(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        frame.extend_from_slice(&[0, 0]);
        let mut crc = crc::SHA204;
        crc.append(&mut frame);
        frame
    }

    fn devrev() -> [u8; 7] {
        [7, 0x30, 0, 0, 0, 0, 0]
    }

    #[test]
    fn test_wakeup_accepts_ack() {
        let clock = FakeClock::new();
        let mut bus = ScriptedSwi::default();
        bus.reply(&WAKE_RESPONSE);
        let mut comm = Sha204Comm::new(SwiCryptoAuth::new(&mut bus, clock.clone()), clock);
        let mut rx = [0u8; 4];
        comm.wakeup(&mut rx).unwrap();
        assert_eq!(rx, WAKE_RESPONSE);
    }

    #[test]
    fn test_wakeup_rejects_bad_ack_and_waits() {
        let clock = FakeClock::new();
        let mut bus = ScriptedSwi::default();
        bus.reply(&[0x04, 0x11, 0x00, 0x00]);
        let start = clock.peek();
        let mut comm = Sha204Comm::new(SwiCryptoAuth::new(&mut bus, clock.clone()), clock.clone());
        let mut rx = [0u8; 4];
        assert_eq!(comm.wakeup(&mut rx), Err(Sha204Error::BadCrc));
        assert!(clock.peek() - start >= u64::from(COMMAND_EXEC_MAX_MS) * 1_000_000);
    }

    #[test]
    fn test_send_and_receive_devrev() {
        let clock = FakeClock::new();
        let mut bus = ScriptedSwi::default();
        let reply = with_crc(&[7, 0x00, 0x00, 0x00, 0x04]);
        bus.reply(&reply);
        let mut comm = Sha204Comm::new(SwiCryptoAuth::new(&mut bus, clock.clone()), clock);
        let mut tx = devrev();
        let mut rx = [0u8; 7];
        comm.send_and_receive(&mut tx, &mut rx, 2, 0).unwrap();
        assert_eq!(&tx[5..], &[0x03, 0x5D]);
        assert_eq!(&rx[..], &reply[..]);
        assert_eq!(bus.commands, 1);
    }

    #[test]
    fn test_polls_until_response_arrives() {
        let clock = FakeClock::new();
        let mut bus = ScriptedSwi::default();
        bus.silence();
        bus.silence();
        bus.reply(&with_crc(&[7, 0x00, 0x00, 0x00, 0x04]));
        let mut comm = Sha204Comm::new(SwiCryptoAuth::new(&mut bus, clock.clone()), clock);
        let mut tx = devrev();
        let mut rx = [0u8; 7];
        comm.send_and_receive(&mut tx, &mut rx, 0, 10).unwrap();
        assert_eq!(bus.reads, 3);
    }

    #[test]
    fn test_rejects_command_length_out_of_range() {
        let clock = FakeClock::new();
        let mut bus = ScriptedSwi::default();
        let mut comm = Sha204Comm::new(SwiCryptoAuth::new(&mut bus, clock.clone()), clock);
        let mut tx = [6u8, 0x30, 0, 0, 0, 0];
        let mut rx = [0u8; 7];
        assert_eq!(
            comm.send_and_receive(&mut tx, &mut rx, 0, 0),
            Err(Sha204Error::BadParam)
        );
    }

    #[test]
    fn test_bad_count_rejected_before_crc() {
        let clock = FakeClock::new();
        let mut bus = ScriptedSwi::default();
        for _ in 0..4 {
            bus.reply(&[0x50, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA]);
        }
        let crc = CountingCrc {
            inner: crc::SHA204,
            computed: 0,
        };
        let mut comm =
            Sha204Comm::with_checksum(SwiCryptoAuth::new(&mut bus, clock.clone()), clock, crc);
        let mut tx = devrev();
        let mut rx = [0u8; 7];
        assert_eq!(
            comm.send_and_receive(&mut tx, &mut rx, 0, 0),
            Err(Sha204Error::InvalidSize)
        );
        // Only the outgoing frame was checksummed
        assert_eq!(comm.checksum().computed, 1);
    }

    #[test]
    fn test_bad_crc_triggers_resync() {
        let clock = FakeClock::new();
        let mut bus = ScriptedSwi::default();
        let mut corrupted = with_crc(&[7, 0x00, 0x00, 0x00, 0x04]);
        corrupted[6] ^= 0x01;
        bus.reply(&corrupted);
        // resync read, then the second receive attempt
        bus.reply(&corrupted);
        bus.reply(&with_crc(&[7, 0x00, 0x00, 0x00, 0x04]));
        let mut comm = Sha204Comm::new(SwiCryptoAuth::new(&mut bus, clock.clone()), clock);
        let mut tx = devrev();
        let mut rx = [0u8; 7];
        comm.send_and_receive(&mut tx, &mut rx, 0, 0).unwrap();
        assert_eq!(bus.reads, 3);
        assert_eq!(bus.commands, 1);
    }

    #[test]
    fn test_resync_wakes_even_when_flags_fail() {
        let clock = FakeClock::new();
        let mut bus = ScriptedSwi {
            flags_fail: true,
            ..ScriptedSwi::default()
        };
        bus.silence();
        bus.reply(&WAKE_RESPONSE);
        let mut comm = Sha204Comm::new(SwiCryptoAuth::new(&mut bus, clock.clone()), clock);
        let mut rx = [0u8; 4];
        assert_eq!(comm.resync(&mut rx), Ok(Resync::WokeUp));
        assert_eq!(rx, WAKE_RESPONSE);
        assert_eq!(bus.wakes, 1);
        assert_eq!(bus.reads, 2);
    }

    #[test]
    fn test_status_bytes_map_to_errors() {
        for (code, expected) in [
            (status::PARSE, Err(Sha204Error::ParseError)),
            (status::EXEC, Err(Sha204Error::CmdFail)),
            (status::CHECKMAC_FAIL, Ok(())),
            (status::SUCCESS, Ok(())),
        ] {
            let clock = FakeClock::new();
            let mut bus = ScriptedSwi::default();
            bus.reply(&with_crc(&[4, code]));
            let mut comm = Sha204Comm::new(SwiCryptoAuth::new(&mut bus, clock.clone()), clock);
            let mut tx = devrev();
            let mut rx = [0u8; 4];
            assert_eq!(comm.send_and_receive(&mut tx, &mut rx, 0, 0), expected);
            assert_eq!(rx[1], code);
        }
    }

    #[test]
    fn test_device_crc_error_resends_command() {
        let clock = FakeClock::new();
        let mut bus = ScriptedSwi::default();
        bus.reply(&with_crc(&[4, status::COMM]));
        bus.reply(&with_crc(&[4, status::SUCCESS]));
        let mut comm = Sha204Comm::new(SwiCryptoAuth::new(&mut bus, clock.clone()), clock);
        let mut tx = devrev();
        let mut rx = [0u8; 4];
        comm.send_and_receive(&mut tx, &mut rx, 0, 0).unwrap();
        assert_eq!(bus.commands, 2);
    }

    #[test]
    fn test_dead_device_gives_no_response() {
        let clock = FakeClock::new();
        let mut bus = ScriptedSwi::default();
        let mut comm = Sha204Comm::new(SwiCryptoAuth::new(&mut bus, clock.clone()), clock);
        let mut tx = devrev();
        let mut rx = [0u8; 7];
        assert_eq!(
            comm.send_and_receive(&mut tx, &mut rx, 0, 1),
            Err(Sha204Error::RxNoResponse)
        );
        assert_eq!(bus.commands, 1);
        assert_eq!(bus.wakes, 1);
    }
}
