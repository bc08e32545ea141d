//! AES132 commands (`a:`)
//!
//! Memory payloads are `count, address high, address low[, data]`.
//! Any status at or above 0xF0 is a bus failure and drops the data.

use super::{Reply, Token};
use crate::aes132::{
    self, marshal, Aes132Comm, Aes132Phy, CommandOptions, DEVICE_RETCODE_MAX, IO_ADDR,
    MEM_ACCESS_MAX,
};
use crate::clock::Clock;
use crate::crc::Checksum;
use crate::error::{Aes132Error, Error, KitError};
use crate::kit::KitState;
use crate::phys::{I2cBus, InterfaceId, SpiBus, SwiBus};

/// Lowest status that counts as a bus failure
const COMM_FAIL: u8 = 0xF0;

/// Which layer a memory access goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    /// Framing layer: waits for the chip and retries
    Comm,
    /// Bare bus access
    Phys,
}

/// Handle `a:<op>`
pub fn handle<W, T, S, C>(
    kit: &mut KitState<W, T, S, C>,
    mut token: Token<'_>,
    reply: &mut Reply,
) -> Result<(), Error>
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    if !token.next_field() {
        return Err(KitError::UnknownCommand.into());
    }
    let result = match token.op(0) {
        b's' => {
            let status = kit.board.aes132()?.read_status()?;
            Ok(reply.push_data(&[status.bits()])?)
        }
        b'm' => memory(kit, &token, reply, Layer::Comm),
        b't' => talk(kit, &token, reply),
        b'c' => command(kit, &token),
        b'r' => receive(kit, &token, reply),
        b'w' => {
            let mut comm = kit.board.aes132()?;
            if token.op(1) == b'd' {
                Ok(comm.wait_for_device_ready()?)
            } else {
                Ok(comm.wait_for_response_ready()?)
            }
        }
        b'p' => physical(kit, token, reply),
        _ => Err(KitError::UnknownCommand.into()),
    };
    if let Err(e) = result {
        if e.code() >= COMM_FAIL {
            reply.data.clear();
        }
    }
    result
}

fn talk<W, T, S, C>(
    kit: &mut KitState<W, T, S, C>,
    token: &Token<'_>,
    reply: &mut Reply,
) -> Result<(), Error>
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    let mut tx = [0u8; aes132::CMD_SIZE_MAX];
    token.data_load(1, &mut tx)?;
    let rx = reply.buffer(aes132::RSP_SIZE_MAX)?;
    let mut comm = kit.board.aes132()?;
    match comm.send_and_receive(&mut tx, rx, CommandOptions::empty()) {
        Ok(()) => {
            reply.keep_counted();
            Ok(())
        }
        // The device return code is in the response data
        Err(Aes132Error::Device(code)) if code <= DEVICE_RETCODE_MAX => {
            reply.keep_counted();
            Ok(())
        }
        Err(e) if e.code() < Aes132Error::Timeout.code() || e == Aes132Error::CommFail => {
            log::debug!("aes132 talk: {}, reading the IO buffer as is", e);
            read_io_buffer(&mut comm, reply)
        }
        Err(e) => Err(e.into()),
    }
}

/// Read whatever is in the IO buffer
///
/// Used when a response came back garbled; the framing layer stops at an
/// out-of-range count byte, this reads past it.
fn read_io_buffer<P, C, K>(comm: &mut Aes132Comm<P, C, K>, reply: &mut Reply) -> Result<(), Error>
where
    P: Aes132Phy,
    C: Clock,
    K: Checksum,
{
    reply.data.clear();
    comm.reset_io_address()?;
    let mut count = [0u8; 1];
    comm.phy().read_memory(IO_ADDR, &mut count)?;
    if count[0] == 0 {
        return Ok(reply.push_data(&count)?);
    }
    let len = (count[0] as usize).min(aes132::RSP_SIZE_MAX);
    let rx = reply.buffer(len)?;
    rx[0] = count[0];
    if let Err(e) = comm.phy().read_memory(IO_ADDR, &mut rx[1..]) {
        reply.data.clear();
        return Err(e.into());
    }
    Ok(())
}

fn command<W, T, S, C>(kit: &mut KitState<W, T, S, C>, token: &Token<'_>) -> Result<(), Error>
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    match token.op(1) {
        b'r' => Ok(marshal::reset(&mut kit.board.aes132()?)?),
        b's' => {
            let mode = token.byte_param(1)?;
            let mut comm = kit.board.aes132()?;
            if mode != 0 {
                Ok(marshal::standby(&mut comm)?)
            } else {
                Ok(marshal::sleep(&mut comm)?)
            }
        }
        _ => {
            let mut tx = [0u8; aes132::CMD_SIZE_MAX];
            token.data_load(1, &mut tx)?;
            let mut comm = kit.board.aes132()?;
            Ok(comm.send_command(&mut tx, CommandOptions::empty())?)
        }
    }
}

fn receive<W, T, S, C>(
    kit: &mut KitState<W, T, S, C>,
    token: &Token<'_>,
    reply: &mut Reply,
) -> Result<(), Error>
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    let size = token.byte_param(1)? as usize;
    let rx = reply.buffer(size)?;
    let result = kit.board.aes132()?.receive_response(rx);
    match result {
        Err(e) if e.code() >= COMM_FAIL => Err(e.into()),
        // Short of a bus failure the host gets what the chip left in the
        // buffer and judges it itself
        _ => {
            reply.keep_counted();
            Ok(())
        }
    }
}

fn memory<W, T, S, C>(
    kit: &mut KitState<W, T, S, C>,
    token: &Token<'_>,
    reply: &mut Reply,
    layer: Layer,
) -> Result<(), Error>
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    let mut load = [0u8; 3 + MEM_ACCESS_MAX];
    let n = token.data_load(2, &mut load)?;
    if n < 3 {
        return Err(KitError::InvalidParams.into());
    }
    let count = load[0] as usize;
    let address = u16::from_be_bytes([load[1], load[2]]);

    if token.op(1) == b'w' {
        let data = load
            .get(3..3 + count)
            .filter(|_| count <= n - 3)
            .ok_or(KitError::InvalidParams)?;
        return match layer {
            // Writing the EEPROM produces a response in the IO buffer
            Layer::Comm if address < IO_ADDR => {
                let mut comm = kit.board.aes132()?;
                comm.write_memory(address, data)?;
                comm.reset_io_address()?;
                let rx = reply.buffer(aes132::RSP_SIZE_MIN)?;
                comm.read_memory(IO_ADDR, rx)?;
                reply.keep_counted();
                Ok(())
            }
            Layer::Comm => Ok(kit.board.aes132()?.write_memory(address, data)?),
            Layer::Phys => Ok(kit.board.aes132_phy()?.write_memory(address, data)?),
        };
    }

    let rx = reply.buffer(count)?;
    let result = match layer {
        Layer::Comm => kit.board.aes132()?.read_memory(address, rx),
        Layer::Phys => kit.board.aes132_phy()?.read_memory(address, rx),
    };
    if let Err(e) = result {
        reply.data.clear();
        return Err(e.into());
    }
    Ok(())
}

/// Physical layer: `p:i:i` / `p:i:s` switch interface, `p:mw` / `p:mr`
/// memory access, `p:sy` resync, `p:s(id)` select, `p:e` / `p:d`
/// enable / disable
pub fn physical<W, T, S, C>(
    kit: &mut KitState<W, T, S, C>,
    mut token: Token<'_>,
    reply: &mut Reply,
) -> Result<(), Error>
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    if !token.next_field() {
        return Err(KitError::UnknownCommand.into());
    }
    match token.op(0) {
        b'i' => {
            let mut sub = token;
            if !sub.next_field() {
                return Err(KitError::UnknownCommand.into());
            }
            let target = match sub.op(0) {
                b'i' => InterfaceId::I2c,
                b's' => InterfaceId::Spi,
                _ => return Err(KitError::InvalidParams.into()),
            };
            Ok(kit.board.switch_interface(target)?)
        }
        b'm' => memory(kit, &token, reply, Layer::Phys),
        b's' if token.op(1) == b'y' => Ok(kit.board.aes132_phy()?.resync()?),
        b's' => {
            let id = token.byte_param(1)?;
            Ok(kit.board.select_aes132(id)?)
        }
        b'e' => {
            kit.board.enable();
            Ok(())
        }
        b'd' => {
            kit.board.disable();
            Ok(())
        }
        _ => Err(KitError::UnknownCommand.into()),
    }
}
