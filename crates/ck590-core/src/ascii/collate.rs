//! Accumulates host bytes into one command line

use heapless::Vec;

use super::{BUFFER_SIZE, EOP};
use crate::error::KitError;

/// Line collator
///
/// When the buffer fills up before the terminator arrives, the rest of the
/// line is discarded and the line is reported as overflowed once the
/// terminator shows up, so the host and the parser stay in step.
#[derive(Debug, Default)]
pub struct Collator {
    buf: Vec<u8, BUFFER_SIZE>,
    overflow: bool,
    complete: bool,
}

impl Collator {
    /// Empty collator
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            overflow: false,
            complete: false,
        }
    }

    /// Feed one byte; returns true when a line is complete
    ///
    /// The completed line stays available through [`Collator::line`]
    /// until the next byte is fed.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.complete {
            self.reset();
        }
        if byte == EOP {
            self.complete = true;
            return true;
        }
        if !self.overflow && self.buf.push(byte).is_err() {
            log::debug!("collate: line exceeds {} bytes", BUFFER_SIZE);
            self.overflow = true;
        }
        false
    }

    /// The completed line, lower-cased, without terminator or trailing CR
    pub fn line(&mut self) -> Result<&[u8], KitError> {
        if self.overflow {
            return Err(KitError::RxOverflow);
        }
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        self.buf.make_ascii_lowercase();
        Ok(self.buf.as_slice())
    }

    /// Drop whatever was collected
    pub fn reset(&mut self) {
        self.buf.clear();
        self.overflow = false;
        self.complete = false;
    }
}
