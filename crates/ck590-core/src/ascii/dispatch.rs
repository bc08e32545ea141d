//! Routes a command line to its family handler

use super::{aes_cmds, board_cmds, bus_cmds, sha_cmds, Reply, Token};
use crate::clock::Clock;
use crate::error::{Error, KitError, SUCCESS};
use crate::kit::KitState;
use crate::phys::{I2cBus, SpiBus, SwiBus};

/// Execute `line` and leave its result in `reply`; returns the status byte
///
/// `line` is expected lower-cased and without terminator, as the
/// [`Collator`](super::Collator) hands it out. Protocol errors (bad
/// command, bad parameters, no device) always come back with empty data.
pub fn dispatch<W, T, S, C>(kit: &mut KitState<W, T, S, C>, line: &[u8], reply: &mut Reply) -> u8
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    reply.clear();
    let result = route(kit, line, reply);
    match result {
        Ok(()) => {
            log::debug!(
                "{} -> ok, {} bytes",
                core::str::from_utf8(line).unwrap_or("<binary>"),
                reply.data.len()
            );
            SUCCESS
        }
        Err(e) => {
            log::debug!(
                "{} -> {:02X}",
                core::str::from_utf8(line).unwrap_or("<binary>"),
                e.code()
            );
            if let Error::Kit(_) = e {
                reply.data.clear();
            }
            e.code()
        }
    }
}

fn route<W, T, S, C>(
    kit: &mut KitState<W, T, S, C>,
    line: &[u8],
    reply: &mut Reply,
) -> Result<(), Error>
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    let mut token = Token::new(line);
    token.skip_prefix()?;
    match token.op(0) {
        b'a' => aes_cmds::handle(kit, token, reply),
        b's' => sha_cmds::handle(kit, token, reply, false),
        b'e' => sha_cmds::handle(kit, token, reply, true),
        b'b' => board_cmds::handle(kit, token, reply),
        b'i' => bus_cmds::handle(kit, token, reply),
        _ => Err(KitError::UnknownCommand.into()),
    }
}
