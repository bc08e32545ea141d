//! AES132 communication layer
//!
//! Every access first waits for the write-in-progress bit to clear.
//! Commands go to the IO buffer with an appended CRC; responses are read
//! back once the response-ready bit is set and are checked for count and
//! CRC before the device return code is looked at.

use super::phys::Aes132Phy;
use super::{
    index, CommandOptions, StatusReg, CMD_SIZE_MAX, CMD_SIZE_MIN, DEVICE_READY_TIMEOUT_MS, IO_ADDR,
    RESET_ADDR, RESPONSE_READY_TIMEOUT_MS, RETRY_COUNT_ERROR, RETRY_COUNT_RESYNC, RSP_SIZE_MAX,
    RSP_SIZE_MIN, STATUS_POLL_US,
};
use crate::clock::{Clock, Deadline};
use crate::crc::{self, Checksum, Crc16};
use crate::error::Aes132Error;

/// Framing and retry logic over a physical adapter
pub struct Aes132Comm<P, C, K = Crc16> {
    phy: P,
    clock: C,
    crc: K,
}

impl<P: Aes132Phy, C: Clock> Aes132Comm<P, C> {
    /// Communication layer with the standard frame checksum
    pub fn new(phy: P, clock: C) -> Self {
        Self::with_checksum(phy, clock, crc::AES132)
    }
}

impl<P: Aes132Phy, C: Clock, K: Checksum> Aes132Comm<P, C, K> {
    /// Communication layer with a caller-supplied checksum
    pub fn with_checksum(phy: P, clock: C, crc: K) -> Self {
        Self { phy, clock, crc }
    }

    /// Borrow the physical adapter
    pub fn phy(&mut self) -> &mut P {
        &mut self.phy
    }

    /// Read the device status register
    pub fn read_status(&mut self) -> Result<StatusReg, Aes132Error> {
        self.phy.read_status()
    }

    fn poll_status(
        &mut self,
        timeout_ms: u32,
        ready: impl Fn(StatusReg) -> bool,
    ) -> Result<StatusReg, Aes132Error> {
        let deadline = Deadline::after_ms(&self.clock, timeout_ms);
        loop {
            // A busy chip may not acknowledge its address, so read errors
            // only count once the deadline has passed
            if let Ok(status) = self.phy.read_status() {
                if ready(status) {
                    return Ok(status);
                }
            }
            if deadline.expired(&self.clock) {
                return Err(Aes132Error::Timeout);
            }
            self.clock.delay_us(STATUS_POLL_US);
        }
    }

    /// Wait until the chip accepts a memory access
    pub fn wait_for_device_ready(&mut self) -> Result<(), Aes132Error> {
        self.poll_status(DEVICE_READY_TIMEOUT_MS, |s| !s.contains(StatusReg::WIP))
            .map(|_| ())
    }

    /// Wait until a response is waiting in the IO buffer
    pub fn wait_for_response_ready(&mut self) -> Result<(), Aes132Error> {
        self.poll_status(RESPONSE_READY_TIMEOUT_MS, |s| {
            s.contains(StatusReg::RESPONSE_READY)
        })
        .map(|_| ())
    }

    /// Reset the IO buffer index to its start
    pub fn reset_io_address(&mut self) -> Result<(), Aes132Error> {
        self.phy.write_memory(RESET_ADDR, &[])
    }

    /// Bring bus and chip back to a known state
    pub fn resync(&mut self) -> Result<(), Aes132Error> {
        let mut result = Ok(());
        for _ in 0..RETRY_COUNT_RESYNC {
            result = self
                .phy
                .resync()
                .and_then(|()| self.reset_io_address());
            if result.is_ok() {
                break;
            }
        }
        result
    }

    /// Write memory once the chip is ready
    pub fn write_memory(&mut self, address: u16, data: &[u8]) -> Result<(), Aes132Error> {
        let mut result = Ok(());
        for _ in 0..RETRY_COUNT_ERROR {
            result = self
                .wait_for_device_ready()
                .and_then(|()| self.phy.write_memory(address, data));
            if result.is_ok() {
                break;
            }
            let _ = self.resync();
        }
        result
    }

    /// Read memory once the chip is ready
    pub fn read_memory(&mut self, address: u16, buf: &mut [u8]) -> Result<(), Aes132Error> {
        let mut result = Ok(());
        for _ in 0..RETRY_COUNT_ERROR {
            result = self
                .wait_for_device_ready()
                .and_then(|()| self.phy.read_memory(address, buf));
            if result.is_ok() {
                break;
            }
            let _ = self.resync();
        }
        result
    }

    /// Write a command frame to the IO buffer
    ///
    /// `tx[0]` is the frame length including the CRC. Unless
    /// [`CommandOptions::NO_STATUS_READ`] is given, the status register is
    /// checked afterwards and a CRC error flagged by the chip causes a
    /// resend.
    pub fn send_command(&mut self, tx: &mut [u8], options: CommandOptions) -> Result<(), Aes132Error> {
        let count = tx.first().copied().unwrap_or(0) as usize;
        if !(CMD_SIZE_MIN..=CMD_SIZE_MAX).contains(&count) || count > tx.len() {
            return Err(Aes132Error::CountInvalid);
        }
        let frame = &mut tx[..count];
        if !options.contains(CommandOptions::NO_APPEND_CRC) {
            self.crc.append(frame);
        }
        let mut result = Ok(());
        for _ in 0..RETRY_COUNT_ERROR {
            result = self.send_once(frame, options);
            match result {
                Ok(()) => break,
                Err(e) => {
                    log::debug!("aes132: send failed ({}), resynchronizing", e);
                    let _ = self.resync();
                }
            }
        }
        result
    }

    fn send_once(&mut self, frame: &[u8], options: CommandOptions) -> Result<(), Aes132Error> {
        self.wait_for_device_ready()?;
        self.reset_io_address()?;
        self.phy.write_memory(IO_ADDR, frame)?;
        if options.contains(CommandOptions::NO_STATUS_READ) {
            return Ok(());
        }
        let status = self.phy.read_status()?;
        if status.contains(StatusReg::CRC_ERROR) {
            return Err(Aes132Error::BadCrcTx);
        }
        Ok(())
    }

    /// Read a response from the IO buffer
    ///
    /// The count byte is checked against `[RSP_SIZE_MIN, rx.len()]` before
    /// the CRC is computed. A non-zero device return code comes back as
    /// [`Aes132Error::Device`] with the response left in `rx`.
    pub fn receive_response(&mut self, rx: &mut [u8]) -> Result<(), Aes132Error> {
        if rx.len() < RSP_SIZE_MIN {
            return Err(Aes132Error::SizeTooSmall);
        }
        let mut result = Ok(());
        for _ in 0..RETRY_COUNT_ERROR {
            result = self.receive_once(rx);
            match result {
                Ok(()) | Err(Aes132Error::Device(_)) => break,
                Err(e) => {
                    log::debug!("aes132: receive failed ({}), resynchronizing", e);
                    let _ = self.resync();
                }
            }
        }
        result
    }

    fn receive_once(&mut self, rx: &mut [u8]) -> Result<(), Aes132Error> {
        self.wait_for_response_ready()?;
        self.reset_io_address()?;
        self.phy.read_memory(IO_ADDR, &mut rx[..1])?;
        let count = rx[index::COUNT] as usize;
        if count < RSP_SIZE_MIN || count > RSP_SIZE_MAX || count > rx.len() {
            return Err(Aes132Error::CountInvalid);
        }
        self.reset_io_address()?;
        self.phy.read_memory(IO_ADDR, &mut rx[..count])?;
        if !self.crc.verify(&rx[..count]) {
            return Err(Aes132Error::BadCrcRx);
        }
        match rx[index::RETURN_CODE] {
            0 => Ok(()),
            code => Err(Aes132Error::Device(code)),
        }
    }

    /// Send a command and receive its response
    pub fn send_and_receive(
        &mut self,
        tx: &mut [u8],
        rx: &mut [u8],
        options: CommandOptions,
    ) -> Result<(), Aes132Error> {
        self.send_command(tx, options)?;
        self.receive_response(rx)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::aes132::STATUS_ADDR;
    use crate::clock::fake::FakeClock;
    use std::vec::Vec;

    /// Memory-mapped chip model: the IO buffer answers with `response`
    /// after a command has been written
    pub(crate) struct MemChip {
        pub(crate) status: StatusReg,
        pub(crate) response: Vec<u8>,
        pub(crate) commands: Vec<Vec<u8>>,
        pub(crate) memory: Vec<(u16, Vec<u8>)>,
        pub(crate) resyncs: usize,
        pub(crate) crc_errors_left: usize,
        pub(crate) io_index: usize,
    }

    impl MemChip {
        pub(crate) fn new(response: &[u8]) -> Self {
            Self {
                status: StatusReg::WAKE,
                response: framed(response),
                commands: Vec::new(),
                memory: Vec::new(),
                resyncs: 0,
                crc_errors_left: 0,
                io_index: 0,
            }
        }
    }

    pub(crate) fn framed(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        frame.extend_from_slice(&[0, 0]);
        let mut crc = crc::AES132;
        crc.append(&mut frame);
        frame
    }

    impl Aes132Phy for MemChip {
        fn write_memory(&mut self, address: u16, data: &[u8]) -> Result<(), Aes132Error> {
            match address {
                RESET_ADDR => self.io_index = 0,
                IO_ADDR => {
                    self.commands.push(data.to_vec());
                    if self.crc_errors_left > 0 {
                        self.crc_errors_left -= 1;
                        self.status = StatusReg::WAKE | StatusReg::CRC_ERROR;
                    } else {
                        self.status = StatusReg::WAKE | StatusReg::RESPONSE_READY;
                    }
                }
                _ => self.memory.push((address, data.to_vec())),
            }
            Ok(())
        }

        fn read_memory(&mut self, address: u16, buf: &mut [u8]) -> Result<(), Aes132Error> {
            match address {
                STATUS_ADDR => buf[0] = self.status.bits(),
                IO_ADDR => {
                    for byte in buf.iter_mut() {
                        *byte = self.response.get(self.io_index).copied().unwrap_or(0xFF);
                        self.io_index += 1;
                    }
                }
                _ => buf.fill(0x5A),
            }
            Ok(())
        }

        fn select(&mut self, _id: u8) -> Result<(), Aes132Error> {
            Ok(())
        }

        fn resync(&mut self) -> Result<(), Aes132Error> {
            self.resyncs += 1;
            Ok(())
        }

        fn enable(&mut self) {}
        fn disable(&mut self) {}
    }

    #[test]
    fn test_info_round_trip() {
        let mut chip = MemChip::new(&[6, 0x00, 0x0A, 0x06]);
        let mut comm = Aes132Comm::new(&mut chip, FakeClock::new());
        let mut tx = [9, 0x0C, 0, 0, 6, 0, 0, 0, 0];
        let mut rx = [0u8; 16];
        comm.send_and_receive(&mut tx, &mut rx, CommandOptions::empty())
            .unwrap();
        assert_eq!(&rx[..4], &[6, 0x00, 0x0A, 0x06]);
        let sent = &chip.commands[0];
        assert_eq!(sent.len(), 9);
        assert!(crc::AES132.calculate(&sent[..7]).to_be_bytes() == [sent[7], sent[8]]);
    }

    #[test]
    fn test_device_return_code_kept() {
        let mut chip = MemChip::new(&[4, 0x50]);
        let mut comm = Aes132Comm::new(&mut chip, FakeClock::new());
        let mut tx = [9, 0x0C, 0, 0, 6, 0, 0, 0, 0];
        let mut rx = [0u8; 8];
        let result = comm.send_and_receive(&mut tx, &mut rx, CommandOptions::empty());
        assert_eq!(result, Err(Aes132Error::Device(0x50)));
        assert_eq!(rx[1], 0x50);
        assert_eq!(chip.resyncs, 0);
    }

    #[test]
    fn test_crc_error_bit_resends() {
        let mut chip = MemChip::new(&[4, 0x00]);
        chip.crc_errors_left = 1;
        let mut comm = Aes132Comm::new(&mut chip, FakeClock::new());
        let mut tx = [9, 0x0C, 0, 0, 6, 0, 0, 0, 0];
        let mut rx = [0u8; 8];
        comm.send_and_receive(&mut tx, &mut rx, CommandOptions::empty())
            .unwrap();
        assert_eq!(chip.commands.len(), 2);
        assert_eq!(chip.resyncs, 1);
    }

    #[test]
    fn test_bad_count_rejected() {
        let mut chip = MemChip::new(&[4, 0x00]);
        chip.response = std::vec![0x02, 0x00, 0x00, 0x00];
        let mut comm = Aes132Comm::new(&mut chip, FakeClock::new());
        let mut tx = [9, 0x0C, 0, 0, 6, 0, 0, 0, 0];
        let mut rx = [0u8; 8];
        let result = comm.send_and_receive(&mut tx, &mut rx, CommandOptions::empty());
        assert_eq!(result, Err(Aes132Error::CountInvalid));
        assert_eq!(chip.resyncs, RETRY_COUNT_ERROR);
    }

    #[test]
    fn test_response_timeout() {
        let mut chip = MemChip::new(&[4, 0x00]);
        let mut comm = Aes132Comm::new(&mut chip, FakeClock::new());
        let mut rx = [0u8; 8];
        assert_eq!(comm.receive_response(&mut rx), Err(Aes132Error::Timeout));
    }

    #[test]
    fn test_command_count_checked() {
        let mut chip = MemChip::new(&[4, 0x00]);
        let mut comm = Aes132Comm::new(&mut chip, FakeClock::new());
        let mut tx = [5, 0x0C, 0, 0, 0];
        assert_eq!(
            comm.send_command(&mut tx, CommandOptions::empty()),
            Err(Aes132Error::CountInvalid)
        );
    }
}
