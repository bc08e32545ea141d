//! SHA204 / ECC108 commands (`s:` and `e:`)
//!
//! | Field | Operation |
//! |-------|-----------|
//! | `t(frame)` | talk: send a command and return its response |
//! | `w` | wake-up |
//! | `c(frame)` | send a raw frame |
//! | `r(size)` | receive a raw response |
//! | `s` | sleep |
//! | `i` | idle |
//! | `a(flag)` | wrap talk in wake-up and idle |
//! | `p:...` | physical layer, see [`physical`] |
//!
//! While wrapping is on (the default), `w` and `i` only report success
//! because talk already wakes the chip and parks it in idle afterwards.

use super::{Reply, Token};
use crate::clock::Clock;
use crate::error::{Error, KitError, Sha204Error};
use crate::kit::KitState;
use crate::phys::{I2cBus, InterfaceId, SpiBus, SwiBus};
use crate::sha204::{self, index, CryptoAuthPhy, WAKE_RESPONSE};

/// Delay before the first response poll of a talk command
pub const TALK_POLL_DELAY_MS: u32 = 5;

/// Library codes a talk command reports as success
///
/// These are the chip's own status bytes (miscompare, parse error,
/// execution error, CRC error) translated by the framing layer; the host
/// finds the original status byte in the response data.
pub const TALK_SUCCESS_CODES: [Sha204Error; 5] = [
    Sha204Error::CheckMacFailed,
    Sha204Error::ParseError,
    Sha204Error::CmdFail,
    Sha204Error::StatusCrc,
    Sha204Error::StatusUnknown,
];

/// Status of a talk command as reported to the host
pub fn talk_status(result: Result<(), Sha204Error>) -> Result<(), Sha204Error> {
    match result {
        Err(e) if TALK_SUCCESS_CODES.contains(&e) => Ok(()),
        other => other,
    }
}

/// Status of a talk wrapped in wake-up and idle
///
/// A failed exchange is reported even when the idle that follows it went
/// through; after a good exchange the idle outcome decides.
pub fn wrapped_talk_status(
    talk: Result<(), Sha204Error>,
    idle: Option<Result<(), Sha204Error>>,
) -> Result<(), Sha204Error> {
    talk?;
    idle.unwrap_or(Ok(()))
}

/// Handle `s:<op>` (`ecc108` false) or `e:<op>` (`ecc108` true)
pub fn handle<W, T, S, C>(
    kit: &mut KitState<W, T, S, C>,
    mut token: Token<'_>,
    reply: &mut Reply,
    ecc108: bool,
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
    let wrap = kit.wrap_crypto_auth;
    match token.op(0) {
        b't' => talk(kit, &token, reply, ecc108),
        b'w' if wrap => Ok(reply.push_data(&WAKE_RESPONSE)?),
        b'w' => {
            kit.idle_address = None;
            let rx = reply.buffer(sha204::RSP_SIZE_MIN)?;
            let result = kit.board.crypto_auth()?.wakeup(rx);
            reply.keep_counted();
            Ok(result?)
        }
        b'c' => send_raw(kit, &token),
        b'r' => receive_raw(kit, &token, reply),
        b's' => {
            kit.idle_address = None;
            let mut comm = kit.board.crypto_auth()?;
            if wrap {
                comm.wakeup(&mut [0u8; sha204::RSP_SIZE_MIN])?;
            }
            Ok(comm.sleep()?)
        }
        b'i' if wrap => Ok(()),
        b'i' => idle(kit),
        b'a' => {
            kit.wrap_crypto_auth = token.byte_param(1)? != 0;
            Ok(())
        }
        b'p' => physical(kit, token, reply),
        _ => Err(KitError::UnknownCommand.into()),
    }
}

fn talk<W, T, S, C>(
    kit: &mut KitState<W, T, S, C>,
    token: &Token<'_>,
    reply: &mut Reply,
    ecc108: bool,
) -> Result<(), Error>
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    let mut tx = [0u8; sha204::CMD_SIZE_MAX];
    token.data_load(1, &mut tx)?;
    let size = sha204::response_size(&tx, ecc108);
    let exec_ms = sha204::exec_time_ms(tx[index::OPCODE]);
    let wrap = kit.wrap_crypto_auth;
    kit.idle_address = None;

    let rx = reply.buffer(size)?;
    let mut comm = kit.board.crypto_auth()?;
    if wrap {
        if let Err(e) = comm.wakeup(rx) {
            reply.data.clear();
            return Err(e.into());
        }
        rx.fill(0);
    }
    let result = comm.send_and_receive(
        &mut tx,
        rx,
        TALK_POLL_DELAY_MS,
        exec_ms.saturating_sub(TALK_POLL_DELAY_MS),
    );
    let result = talk_status(result);
    let idled = wrap.then(|| comm.idle());
    reply.keep_counted();
    if let Some(Ok(())) = idled {
        kit.note_idle();
    }
    wrapped_talk_status(result, idled)?;
    Ok(())
}

fn idle<W, T, S, C>(kit: &mut KitState<W, T, S, C>) -> Result<(), Error>
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    kit.board.crypto_auth_phy()?.idle()?;
    kit.note_idle();
    Ok(())
}

fn send_raw<W, T, S, C>(kit: &mut KitState<W, T, S, C>, token: &Token<'_>) -> Result<(), Error>
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    let mut frame = [0u8; sha204::CMD_SIZE_MAX];
    let n = token.data_load(1, &mut frame)?;
    kit.board.crypto_auth_phy()?.send_command(&frame[..n])?;
    Ok(())
}

fn receive_raw<W, T, S, C>(
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
    let result = kit.board.crypto_auth_phy()?.receive_response(rx);
    reply.keep_counted();
    Ok(result?)
}

/// Physical layer: `p:w`, `p:c(frame)`, `p:r(size)`, `p:sy` resync,
/// `p:s(id)` select, `p:s` sleep, `p:e` enable, `p:d` disable,
/// `p:i:i` / `p:i:s` switch interface, `p:i` idle
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
        b'w' => Ok(kit.board.crypto_auth_phy()?.wakeup()?),
        b'c' => send_raw(kit, &token),
        b'r' => receive_raw(kit, &token, reply),
        b's' if token.op(1) == b'y' => {
            let rx = reply.buffer(sha204::RSP_SIZE_MIN)?;
            let result = kit.board.crypto_auth_phy()?.resync(rx);
            reply.keep_counted();
            Ok(result?)
        }
        b's' => {
            let mut id = [0u8; 1];
            match token.data_load(1, &mut id) {
                Ok(0) => Err(KitError::InvalidParams.into()),
                Ok(_) => Ok(kit.board.select_crypto_auth(id[0])?),
                Err(_) => Ok(kit.board.crypto_auth_phy()?.sleep()?),
            }
        }
        b'e' => {
            kit.board.enable();
            Ok(())
        }
        b'd' => {
            kit.board.disable();
            Ok(())
        }
        b'i' => {
            let mut sub = token;
            if !sub.next_field() {
                return idle(kit);
            }
            let target = match sub.op(0) {
                b'i' => InterfaceId::I2c,
                b's' => InterfaceId::Swi,
                _ => return Err(KitError::InvalidParams.into()),
            };
            Ok(kit.board.switch_interface(target)?)
        }
        _ => Err(KitError::UnknownCommand.into()),
    }
}
