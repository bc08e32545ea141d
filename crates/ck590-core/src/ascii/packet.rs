//! Response framing: `[text]SS(HEXDATA)\n`

use embedded_io::Write;

use super::hex;
use super::{Reply, BUFFER_SIZE};
use crate::error::KitError;

/// Bytes hex-encoded per write
const CHUNK: usize = 32;

/// Data bytes that fit the transmit buffer behind a `text_len` preamble
pub const fn max_data(text_len: usize) -> usize {
    (BUFFER_SIZE - 5).saturating_sub(text_len) / 2
}

/// Write `reply` with `status` as one response packet
///
/// Data that would not fit [`BUFFER_SIZE`] together with the text
/// preamble is cut off and the status replaced by the transmit-overflow
/// code; the packet stays well formed.
pub fn write_packet<Wr: Write>(out: &mut Wr, status: u8, reply: &Reply) -> Result<(), Wr::Error> {
    let limit = max_data(reply.text.len());
    let (status, data) = if reply.data.len() > limit {
        log::debug!("packet: {} bytes truncated to {}", reply.data.len(), limit);
        (KitError::TxOverflow.code(), &reply.data[..limit])
    } else {
        (status, &reply.data[..])
    };
    out.write_all(reply.text.as_bytes())?;
    out.write_all(&hex::encode_byte(status))?;
    out.write_all(b"(")?;
    let mut text = [0u8; CHUNK * 2];
    for part in data.chunks(CHUNK) {
        let n = hex::encode(part, &mut text);
        out.write_all(&text[..n])?;
    }
    out.write_all(b")\n")?;
    out.flush()
}
