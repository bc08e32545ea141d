//! Cursor over a command line
//!
//! Fields are separated by `:`; the characters right after a separator
//! select the operation and a parenthesized hex payload may follow
//! anywhere after them.

use super::hex;
use crate::error::KitError;

/// Position of the current field within a command line
#[derive(Debug, Clone, Copy)]
pub struct Token<'a> {
    line: &'a [u8],
    pos: usize,
}

impl<'a> Token<'a> {
    /// Cursor at the start of `line`
    pub fn new(line: &'a [u8]) -> Self {
        Self { line, pos: 0 }
    }

    /// Skip an optional `lib:` style prefix
    ///
    /// A prefix starting with `l` must be followed by a separator.
    pub fn skip_prefix(&mut self) -> Result<(), KitError> {
        if self.op(0) == b'l' && !self.next_field() {
            return Err(KitError::UnknownCommand);
        }
        Ok(())
    }

    /// Move to the field after the next `:`; false when there is none
    pub fn next_field(&mut self) -> bool {
        match self.line[self.pos..].iter().position(|&c| c == b':') {
            Some(i) => {
                self.pos += i + 1;
                true
            }
            None => false,
        }
    }

    /// Character `n` of the current field, or 0 past the end
    pub fn op(&self, n: usize) -> u8 {
        self.line.get(self.pos + n).copied().unwrap_or(0)
    }

    /// The rest of the line from the current field on
    pub fn rest(&self) -> &'a [u8] {
        &self.line[self.pos..]
    }

    /// Decode the parenthesized payload found after character `skip`
    ///
    /// A missing `)` ends the payload at the end of the line. Without a
    /// `(` the parameters are invalid.
    pub fn data_load(&self, skip: usize, out: &mut [u8]) -> Result<usize, KitError> {
        let from = (self.pos + skip).min(self.line.len());
        let tail = &self.line[from..];
        let open = tail
            .iter()
            .position(|&c| c == b'(')
            .ok_or(KitError::InvalidParams)?;
        let body = &tail[open + 1..];
        let end = body.iter().position(|&c| c == b')').unwrap_or(body.len());
        Ok(hex::decode(&body[..end], out))
    }

    /// Payload that must carry at least one byte; returns the first
    pub fn byte_param(&self, skip: usize) -> Result<u8, KitError> {
        let mut byte = [0u8; 1];
        match self.data_load(skip, &mut byte)? {
            0 => Err(KitError::InvalidParams),
            _ => Ok(byte[0]),
        }
    }

    /// A one- or two-byte (big-endian) count
    pub fn count_param(&self, skip: usize) -> Result<usize, KitError> {
        let mut bytes = [0u8; 2];
        match self.data_load(skip, &mut bytes)? {
            0 => Err(KitError::InvalidParams),
            1 => Ok(bytes[0] as usize),
            _ => Ok(u16::from_be_bytes(bytes) as usize),
        }
    }
}
