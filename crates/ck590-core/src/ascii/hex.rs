//! Hex conversion
//!
//! Decoding is lenient: any character that is not a hex digit counts as a
//! zero nibble, and an odd trailing nibble is dropped.

const DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Value of one hex digit; anything else is 0
pub const fn nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => 0,
    }
}

/// Two uppercase hex digits for `byte`
pub const fn encode_byte(byte: u8) -> [u8; 2] {
    [DIGITS[(byte >> 4) as usize], DIGITS[(byte & 0x0F) as usize]]
}

/// Decode pairs of hex digits from `text` into `out`
///
/// Returns the number of bytes written, limited by `out.len()`.
pub fn decode(text: &[u8], out: &mut [u8]) -> usize {
    let mut n = 0;
    for (pair, byte) in text.chunks_exact(2).zip(out.iter_mut()) {
        *byte = (nibble(pair[0]) << 4) | nibble(pair[1]);
        n += 1;
    }
    n
}

/// Encode `data` into `out` as uppercase hex
///
/// Returns the number of characters written; stops when `out` is full.
pub fn encode(data: &[u8], out: &mut [u8]) -> usize {
    let mut n = 0;
    for (byte, pair) in data.iter().zip(out.chunks_exact_mut(2)) {
        pair.copy_from_slice(&encode_byte(*byte));
        n += 2;
    }
    n
}
