//! Raw bus commands (`i:`)
//!
//! `i:<interface>:<op>` drives a bus directly, bypassing the device
//! libraries. The interface field names the bus either by name (`swi`,
//! `i2c`, `spi`) or by number (`1`, `2`, `3`).

use super::{Reply, Token};
use crate::clock::Clock;
use crate::error::{Error, KitError, SUCCESS};
use crate::kit::KitState;
use crate::phys::{I2cBus, InterfaceId, SpiBus, SwiBus};

/// Handle `i:<interface>:<op>`
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
    let bus = interface(&token);
    if bus == InterfaceId::Unknown || !token.next_field() {
        return Err(KitError::UnknownCommand.into());
    }
    let result = match bus {
        InterfaceId::Swi => swi(kit, &token, reply),
        InterfaceId::I2c => i2c(kit, &token, reply),
        _ => spi(kit, &token, reply),
    };
    if result.is_err() {
        reply.data.clear();
    }
    result
}

/// Bus named by the current field
fn interface(token: &Token<'_>) -> InterfaceId {
    let field = token.rest();
    let field = &field[..field.iter().position(|&c| c == b':').unwrap_or(field.len())];
    let names = |name: &[u8]| field.windows(name.len()).any(|w| w == name);
    match token.op(0) {
        _ if names(b"sw") => InterfaceId::Swi,
        _ if names(b"i2") => InterfaceId::I2c,
        _ if names(b"sp") => InterfaceId::Spi,
        b'1' => InterfaceId::Swi,
        b'2' => InterfaceId::I2c,
        b'3' => InterfaceId::Spi,
        _ => InterfaceId::Unknown,
    }
}

/// Payload to transmit, at most the whole buffer
fn load<'r>(token: &Token<'_>, reply: &'r mut Reply) -> Result<&'r [u8], Error> {
    let buf = reply.buffer(super::BUFFER_SIZE)?;
    let n = token.data_load(1, buf)?;
    Ok(&buf[..n])
}

fn swi<W, T, S, C>(
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
    match token.op(0) {
        b't' => {
            let data = load(token, reply)?;
            kit.board.swi()?.send_bytes(data)?;
            reply.data.clear();
            Ok(reply.push_data(&[SUCCESS])?)
        }
        b'r' => {
            let count = token.count_param(1)?;
            let rx = reply.buffer(count)?;
            Ok(kit.board.swi()?.receive_bytes(rx)?)
        }
        _ => Err(KitError::UnknownCommand.into()),
    }
}

fn i2c<W, T, S, C>(
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
    match token.op(0) {
        b't' => {
            let data = load(token, reply)?;
            kit.board.i2c()?.send_bytes(data)?;
            reply.data.clear();
            Ok(reply.push_data(&[SUCCESS])?)
        }
        b'r' => {
            let count = token.count_param(1)?;
            let rx = reply.buffer(count)?;
            Ok(kit.board.i2c()?.receive_bytes(rx)?)
        }
        b's' => {
            let bus = kit.board.i2c()?;
            match token.op(2) {
                b'a' => bus.send_start()?,
                b'o' => bus.send_stop()?,
                _ => return Err(KitError::UnknownCommand.into()),
            }
            Ok(reply.push_data(&[SUCCESS])?)
        }
        _ => Err(KitError::UnknownCommand.into()),
    }
}

fn spi<W, T, S, C>(
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
    // A missing payload means off
    let on = || token.byte_param(1).is_ok_and(|b| b != 0);
    match token.op(0) {
        b'd' => {
            let bus = kit.board.spi()?;
            if on() {
                bus.enable();
            } else {
                bus.disable();
            }
            Ok(reply.push_data(&[SUCCESS])?)
        }
        b's' => {
            let bus = kit.board.spi()?;
            if on() {
                bus.select();
            } else {
                bus.deselect();
            }
            Ok(reply.push_data(&[SUCCESS])?)
        }
        b't' => {
            let data = load(token, reply)?;
            kit.board.spi()?.send_bytes(data)?;
            reply.data.clear();
            Ok(reply.push_data(&[SUCCESS])?)
        }
        b'r' => {
            let count = token.count_param(1)?;
            let rx = reply.buffer(count)?;
            Ok(kit.board.spi()?.receive_bytes(rx)?)
        }
        _ => Err(KitError::UnknownCommand.into()),
    }
}
