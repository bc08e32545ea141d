//! Command builders for the SHA204 / ECC108 family
//!
//! Each builder lays out `count, opcode, param1, param2 (LE), data, crc`
//! and runs the frame through [`Sha204Comm::send_and_receive`]. The
//! response size and execution time come from the opcode tables in the
//! parent module.

use super::comm::Sha204Comm;
use super::phys::CryptoAuthPhy;
use super::{exec_time_ms, index, opcode, response_size, CMD_SIZE_MAX};
use crate::clock::Clock;
use crate::crc::{self, Checksum};
use crate::error::Sha204Error;

/// Delay before the first response poll
pub const POLL_START_MS: u32 = 1;

/// Read zones (param1 of Read)
pub mod zone {
    /// Configuration zone
    pub const CONFIG: u8 = 0x00;
    /// One-time-programmable zone
    pub const OTP: u8 = 0x01;
    /// Data zone
    pub const DATA: u8 = 0x02;
    /// Read 32 bytes instead of 4
    pub const READ_32: u8 = 0x80;
}

/// Byte address of the selector byte in the configuration zone
pub const SELECTOR_ADDRESS: u16 = 85;

/// GenPersonalizationKey opcode shared by all SA10x variants
pub const SA10X_GEN_PERS_KEY: u8 = 0x20;

/// Length of the SA10x probe frame
pub const SA10X_PROBE_SIZE: usize = 23;

/// Lay out a command frame in `tx` and return its length
///
/// The CRC bytes are left zero; the framing layer fills them in.
pub fn build_frame(
    tx: &mut [u8],
    op: u8,
    param1: u8,
    param2: u16,
    data: &[u8],
) -> Result<usize, Sha204Error> {
    let len = index::DATA + data.len() + 2;
    if len > CMD_SIZE_MAX || len > tx.len() {
        return Err(Sha204Error::BadParam);
    }
    tx[index::COUNT] = len as u8;
    tx[index::OPCODE] = op;
    tx[index::PARAM1] = param1;
    tx[index::PARAM2..index::DATA].copy_from_slice(&param2.to_le_bytes());
    tx[index::DATA..index::DATA + data.len()].copy_from_slice(data);
    tx[len - 2..len].fill(0);
    Ok(len)
}

/// Build and execute one command
///
/// Returns the response length (its count byte). `rx` must be at least
/// as large as the response the opcode produces.
pub fn execute<P, C, K>(
    comm: &mut Sha204Comm<P, C, K>,
    op: u8,
    param1: u8,
    param2: u16,
    data: &[u8],
    rx: &mut [u8],
) -> Result<usize, Sha204Error>
where
    P: CryptoAuthPhy,
    C: Clock,
    K: Checksum,
{
    let mut tx = [0u8; CMD_SIZE_MAX];
    let len = build_frame(&mut tx, op, param1, param2, data)?;
    let size = response_size(&tx[..len], false);
    let rx = rx.get_mut(..size).ok_or(Sha204Error::BadParam)?;
    comm.send_and_receive(&mut tx[..len], rx, POLL_START_MS, exec_time_ms(op))?;
    Ok(rx[index::COUNT] as usize)
}

/// DevRev: four revision bytes at `rx[1..5]`
pub fn dev_rev<P, C, K>(comm: &mut Sha204Comm<P, C, K>, rx: &mut [u8]) -> Result<usize, Sha204Error>
where
    P: CryptoAuthPhy,
    C: Clock,
    K: Checksum,
{
    execute(comm, opcode::DEVREV, 0, 0, &[], rx)
}

/// Read 4 or 32 bytes (`zone | zone::READ_32`) at word address `address`
pub fn read<P, C, K>(
    comm: &mut Sha204Comm<P, C, K>,
    zone: u8,
    address: u16,
    rx: &mut [u8],
) -> Result<usize, Sha204Error>
where
    P: CryptoAuthPhy,
    C: Clock,
    K: Checksum,
{
    execute(comm, opcode::READ, zone, address, &[], rx)
}

/// Read the configuration selector byte
pub fn read_selector<P, C, K>(comm: &mut Sha204Comm<P, C, K>) -> Result<u8, Sha204Error>
where
    P: CryptoAuthPhy,
    C: Clock,
    K: Checksum,
{
    let mut rx = [0u8; 7];
    read(comm, zone::CONFIG, SELECTOR_ADDRESS / 4, &mut rx)?;
    Ok(rx[1 + (SELECTOR_ADDRESS % 4) as usize])
}

/// Random: 32 bytes at `rx[1..33]`
///
/// `mode` 0 updates the seed first.
pub fn random<P, C, K>(
    comm: &mut Sha204Comm<P, C, K>,
    mode: u8,
    rx: &mut [u8],
) -> Result<usize, Sha204Error>
where
    P: CryptoAuthPhy,
    C: Clock,
    K: Checksum,
{
    execute(comm, opcode::RANDOM, mode, 0, &[], rx)
}

/// Nonce with a 20-byte (random modes) or 32-byte (pass-through) input
pub fn nonce<P, C, K>(
    comm: &mut Sha204Comm<P, C, K>,
    mode: u8,
    num_in: &[u8],
    rx: &mut [u8],
) -> Result<usize, Sha204Error>
where
    P: CryptoAuthPhy,
    C: Clock,
    K: Checksum,
{
    let expected = if mode & 0x03 == 0x03 { 32 } else { 20 };
    if num_in.len() != expected {
        return Err(Sha204Error::BadParam);
    }
    execute(comm, opcode::NONCE, mode, 0, num_in, rx)
}

/// The GenPersonalizationKey frame used to detect SA10x devices
///
/// It is the same for SA100S, SA102S and SA10HS, which is why discovery
/// uses it when a woken device ignores DevRev.
pub fn sa10x_probe_frame() -> [u8; SA10X_PROBE_SIZE] {
    let mut frame = [0u8; SA10X_PROBE_SIZE];
    frame[index::COUNT] = SA10X_PROBE_SIZE as u8;
    frame[index::OPCODE] = SA10X_GEN_PERS_KEY;
    let mut crc = crc::SHA204;
    crc.append(&mut frame);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::fake::FakeClock;
    use crate::sha204::phys::CryptoAuthPhy;
    use std::collections::VecDeque;
    use std::vec::Vec;

    /// Phy that records frames and answers from a queue
    #[derive(Default)]
    struct Recorder {
        frames: Vec<Vec<u8>>,
        replies: VecDeque<Vec<u8>>,
    }

    impl CryptoAuthPhy for Recorder {
        fn wakeup(&mut self) -> Result<(), Sha204Error> {
            Ok(())
        }
        fn send_command(&mut self, frame: &[u8]) -> Result<(), Sha204Error> {
            self.frames.push(frame.to_vec());
            Ok(())
        }
        fn receive_response(&mut self, buf: &mut [u8]) -> Result<(), Sha204Error> {
            let reply = self.replies.pop_front().ok_or(Sha204Error::RxNoResponse)?;
            buf[..reply.len()].copy_from_slice(&reply);
            Ok(())
        }
        fn idle(&mut self) -> Result<(), Sha204Error> {
            Ok(())
        }
        fn sleep(&mut self) -> Result<(), Sha204Error> {
            Ok(())
        }
        fn reset_io(&mut self) -> Result<(), Sha204Error> {
            Ok(())
        }
        fn resync(&mut self, _buf: &mut [u8]) -> Result<(), Sha204Error> {
            Err(Sha204Error::RxNoResponse)
        }
    }

    fn framed(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        frame.extend_from_slice(&[0, 0]);
        let mut crc = crc::SHA204;
        crc.append(&mut frame);
        frame
    }

    #[test]
    fn test_dev_rev_frame() {
        let mut phy = Recorder::default();
        phy.replies.push_back(framed(&[7, 0x00, 0x00, 0x00, 0x04]));
        let mut comm = Sha204Comm::new(&mut phy, FakeClock::new());
        let mut rx = [0u8; 35];
        assert_eq!(dev_rev(&mut comm, &mut rx), Ok(7));
        assert_eq!(&rx[1..5], &[0, 0, 0, 4]);
        assert_eq!(phy.frames[0], [7, 0x30, 0, 0, 0, 0x03, 0x5D]);
    }

    #[test]
    fn test_read_selector_uses_word_address() {
        let mut phy = Recorder::default();
        phy.replies.push_back(framed(&[7, 0xAA, 0x5C, 0x00, 0x00]));
        let mut comm = Sha204Comm::new(&mut phy, FakeClock::new());
        assert_eq!(read_selector(&mut comm), Ok(0x5C));
        let frame = &phy.frames[0];
        assert_eq!(frame[index::OPCODE], opcode::READ);
        assert_eq!(frame[index::PARAM1], zone::CONFIG);
        assert_eq!(&frame[index::PARAM2..index::DATA], &[21, 0]);
    }

    #[test]
    fn test_nonce_checks_input_length() {
        let mut phy = Recorder::default();
        let mut comm = Sha204Comm::new(&mut phy, FakeClock::new());
        let mut rx = [0u8; 35];
        assert_eq!(
            nonce(&mut comm, 0x00, &[0u8; 32], &mut rx),
            Err(Sha204Error::BadParam)
        );
    }

    #[test]
    fn test_frame_too_long_is_rejected() {
        let mut tx = [0u8; 100];
        assert_eq!(
            build_frame(&mut tx, opcode::WRITE, 0, 0, &[0u8; 80]),
            Err(Sha204Error::BadParam)
        );
    }

    #[test]
    fn test_sa10x_probe_frame_is_valid() {
        let frame = sa10x_probe_frame();
        assert_eq!(frame[0], 23);
        assert_eq!(frame[1], SA10X_GEN_PERS_KEY);
        let mut crc = crc::SHA204;
        assert!(crc.verify(&frame));
    }
}
