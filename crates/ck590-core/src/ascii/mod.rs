//! Hex-ASCII host protocol
//!
//! Requests look like `[lib:]family:op[:subop](hexdata)\n` and are
//! case-insensitive; responses look like `SS(HEXDATA)\n`, optionally
//! preceded by plain text for board commands.
//!
//! | First character | Handler |
//! |-----------------|---------|
//! | `a` | [`aes_cmds`] |
//! | `s`, `e` | [`sha_cmds`] |
//! | `b` | [`board_cmds`] |
//! | `i` | [`bus_cmds`] |

pub mod aes_cmds;
pub mod board_cmds;
pub mod bus_cmds;
pub mod collate;
pub mod dispatch;
pub mod hex;
pub mod packet;
pub mod sha_cmds;
pub mod token;

use heapless::{String, Vec};

use crate::error::KitError;

pub use collate::Collator;
pub use token::Token;

/// Size of the receive and transmit buffers
pub const BUFFER_SIZE: usize = 2300;

/// Largest binary result that fits the transmit buffer as `SS(..)\n`
/// without a text preamble
pub const MAX_RESULT: usize = (BUFFER_SIZE - 5) / 2;

/// End-of-packet byte
pub const EOP: u8 = b'\n';

/// Longest plain-text preamble (board commands)
pub const TEXT_MAX: usize = 48;

/// Result of one command before it is encoded
///
/// `data` may grow past [`MAX_RESULT`]; the packet writer truncates and
/// flags it.
#[derive(Debug, Default)]
pub struct Reply {
    /// Plain-text preamble
    pub text: String<TEXT_MAX>,
    /// Binary result
    pub data: Vec<u8, BUFFER_SIZE>,
}

impl Reply {
    /// Empty reply
    pub const fn new() -> Self {
        Self {
            text: String::new(),
            data: Vec::new(),
        }
    }

    /// Forget the previous result
    pub fn clear(&mut self) {
        self.text.clear();
        self.data.clear();
    }

    /// Make `data` exactly `len` zero bytes long and return it
    pub fn data_mut(&mut self, len: usize) -> Option<&mut [u8]> {
        self.data.clear();
        self.data.resize(len, 0).ok()?;
        Some(&mut self.data)
    }

    /// Keep only the first `len` bytes of `data`
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    /// Trim `data` to the frame length in its count byte
    pub fn keep_counted(&mut self) {
        let count = self.data.first().map_or(0, |&c| c as usize);
        self.data.truncate(count);
    }

    /// Append bytes to `data`
    pub fn push_data(&mut self, bytes: &[u8]) -> Result<(), KitError> {
        self.data
            .extend_from_slice(bytes)
            .map_err(|_| KitError::TxOverflow)
    }

    /// Zeroed `data` of `len` bytes, or invalid parameters when the
    /// buffer cannot hold that much
    pub fn buffer(&mut self, len: usize) -> Result<&mut [u8], KitError> {
        self.data_mut(len).ok_or(KitError::InvalidParams)
    }

    /// Append plain text, cutting it off at [`TEXT_MAX`]
    pub fn push_text(&mut self, text: &str) {
        for c in text.chars() {
            if self.text.push(c).is_err() {
                break;
            }
        }
    }
}
