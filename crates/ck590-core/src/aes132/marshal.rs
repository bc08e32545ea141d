//! AES132 command builders
//!
//! Frame layout: `count, opcode, mode, param1 (BE), param2 (BE), data, crc`.

use super::comm::Aes132Comm;
use super::phys::Aes132Phy;
use super::{index, opcode, CommandOptions, CMD_SIZE_MAX, MEM_ACCESS_MAX, RSP_SIZE_MIN};
use crate::clock::Clock;
use crate::crc::Checksum;
use crate::error::Aes132Error;

/// Info selector returning the device number
pub const INFO_DEVICE_NUMBER: u16 = 0x0006;

/// Sleep command mode bytes
pub mod sleep_mode {
    /// Sleep (loses volatile state)
    pub const SLEEP: u8 = 0x00;
    /// Standby (keeps volatile state)
    pub const STANDBY: u8 = 0x40;
}

/// The TempSense frame; its CRC never changes so it is sent as is
pub const TEMP_SENSE_FRAME: [u8; 9] = [9, opcode::TEMP_SENSE, 0, 0, 0, 0, 0, 0xD9, 0x9C];

/// Lay out a command frame in `tx` and return its length (CRC left zero)
pub fn build_frame(
    tx: &mut [u8],
    op: u8,
    mode: u8,
    param1: u16,
    param2: u16,
    data: &[u8],
) -> Result<usize, Aes132Error> {
    let len = index::DATA + data.len() + 2;
    if len > CMD_SIZE_MAX || len > tx.len() {
        return Err(Aes132Error::CountInvalid);
    }
    tx[index::COUNT] = len as u8;
    tx[index::OPCODE] = op;
    tx[index::MODE] = mode;
    tx[index::PARAM1..index::PARAM2].copy_from_slice(&param1.to_be_bytes());
    tx[index::PARAM2..index::DATA].copy_from_slice(&param2.to_be_bytes());
    tx[index::DATA..index::DATA + data.len()].copy_from_slice(data);
    tx[len - 2..len].fill(0);
    Ok(len)
}

/// Build, send and receive one command
pub fn execute<P, C, K>(
    comm: &mut Aes132Comm<P, C, K>,
    op: u8,
    mode: u8,
    param1: u16,
    param2: u16,
    data: &[u8],
    rx: &mut [u8],
) -> Result<(), Aes132Error>
where
    P: Aes132Phy,
    C: Clock,
    K: Checksum,
{
    let mut tx = [0u8; CMD_SIZE_MAX];
    let len = build_frame(&mut tx, op, mode, param1, param2, data)?;
    comm.send_and_receive(&mut tx[..len], rx, CommandOptions::empty())
}

/// Info: two data bytes at `rx[2..4]`
pub fn info<P, C, K>(
    comm: &mut Aes132Comm<P, C, K>,
    selector: u16,
    rx: &mut [u8],
) -> Result<(), Aes132Error>
where
    P: Aes132Phy,
    C: Clock,
    K: Checksum,
{
    let rx = rx.get_mut(..6).ok_or(Aes132Error::SizeTooSmall)?;
    execute(comm, opcode::INFO, 0, selector, 0, &[], rx)
}

/// BlockRead of `count` bytes (1..=32) at `address`
pub fn block_read<P, C, K>(
    comm: &mut Aes132Comm<P, C, K>,
    address: u16,
    count: u8,
    rx: &mut [u8],
) -> Result<(), Aes132Error>
where
    P: Aes132Phy,
    C: Clock,
    K: Checksum,
{
    let count = count as usize;
    if count == 0 || count > MEM_ACCESS_MAX {
        return Err(Aes132Error::CountInvalid);
    }
    let rx = rx
        .get_mut(..RSP_SIZE_MIN + count)
        .ok_or(Aes132Error::SizeTooSmall)?;
    execute(comm, opcode::BLOCK_READ, 0, address, count as u16, &[], rx)
}

/// TempSense: the difference of the two 16-bit readings
pub fn temp_sense<P, C, K>(comm: &mut Aes132Comm<P, C, K>) -> Result<i32, Aes132Error>
where
    P: Aes132Phy,
    C: Clock,
    K: Checksum,
{
    let mut tx = TEMP_SENSE_FRAME;
    let mut rx = [0u8; 8];
    comm.send_and_receive(&mut tx, &mut rx, CommandOptions::NO_APPEND_CRC)?;
    let d = index::RESPONSE_DATA;
    let first = u16::from_be_bytes([rx[d], rx[d + 1]]);
    let second = u16::from_be_bytes([rx[d + 2], rx[d + 3]]);
    Ok(i32::from(first) - i32::from(second))
}

/// Reset command; the chip answers with nothing, so no status is read
pub fn reset<P, C, K>(comm: &mut Aes132Comm<P, C, K>) -> Result<(), Aes132Error>
where
    P: Aes132Phy,
    C: Clock,
    K: Checksum,
{
    let mut tx = [0u8; 9];
    build_frame(&mut tx, opcode::RESET, 0, 0, 0, &[])?;
    comm.send_command(&mut tx, CommandOptions::NO_STATUS_READ)
}

fn sleep_command<P, C, K>(comm: &mut Aes132Comm<P, C, K>, mode: u8) -> Result<(), Aes132Error>
where
    P: Aes132Phy,
    C: Clock,
    K: Checksum,
{
    let mut tx = [0u8; 9];
    build_frame(&mut tx, opcode::SLEEP, mode, 0, 0, &[])?;
    comm.send_command(&mut tx, CommandOptions::NO_STATUS_READ)
}

/// Put the chip to sleep
pub fn sleep<P, C, K>(comm: &mut Aes132Comm<P, C, K>) -> Result<(), Aes132Error>
where
    P: Aes132Phy,
    C: Clock,
    K: Checksum,
{
    sleep_command(comm, sleep_mode::SLEEP)
}

/// Put the chip into standby
pub fn standby<P, C, K>(comm: &mut Aes132Comm<P, C, K>) -> Result<(), Aes132Error>
where
    P: Aes132Phy,
    C: Clock,
    K: Checksum,
{
    sleep_command(comm, sleep_mode::STANDBY)
}
