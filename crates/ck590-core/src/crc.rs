//! CRC-16 framing checksum
//!
//! Both chip families use the same polynomial (0x8005) computed bit by bit
//! with a zero register, but they disagree on bit order within a byte and on
//! the order of the two CRC bytes in the frame.

/// CRC polynomial shared by every supported chip family
pub const POLYNOMIAL: u16 = 0x8005;

/// Order in which the bits of each input byte are fed into the register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    /// Bit 0 first (SHA204, ECC108)
    LsbFirst,
    /// Bit 7 first (AES132)
    MsbFirst,
}

/// Order in which the 16-bit CRC is stored at the end of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Low byte first
    Little,
    /// High byte first
    Big,
}

/// A frame checksum
///
/// Framing layers take the checksum as a parameter so its use can be
/// observed; [`Crc16`] is the only production implementation.
pub trait Checksum {
    /// Checksum over `data`
    fn compute(&mut self, data: &[u8]) -> u16;

    /// Wire representation of a checksum
    fn to_bytes(&self, crc: u16) -> [u8; 2];

    /// Checksum value from its wire representation
    fn from_bytes(&self, bytes: [u8; 2]) -> u16;

    /// Fill the last two bytes of `frame` with the checksum of the rest
    fn append(&mut self, frame: &mut [u8]) {
        let Some(body_len) = frame.len().checked_sub(2) else {
            return;
        };
        let crc = self.compute(&frame[..body_len]);
        frame[body_len..].copy_from_slice(&self.to_bytes(crc));
    }

    /// Check the last two bytes of `frame` against the checksum of the rest
    ///
    /// The comparison is done on the 16-bit value, not byte by byte.
    fn verify(&mut self, frame: &[u8]) -> bool {
        let Some(body_len) = frame.len().checked_sub(2) else {
            return false;
        };
        let received = self.from_bytes([frame[body_len], frame[body_len + 1]]);
        self.compute(&frame[..body_len]) == received
    }
}

/// Bitwise CRC-16 with a configurable bit and byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc16 {
    bit_order: BitOrder,
    byte_order: ByteOrder,
}

/// Checksum used by SHA204 and ECC108 frames
pub const SHA204: Crc16 = Crc16::new(BitOrder::LsbFirst, ByteOrder::Little);

/// Checksum used by AES132 frames
pub const AES132: Crc16 = Crc16::new(BitOrder::MsbFirst, ByteOrder::Big);

impl Crc16 {
    /// Create a checksum with the given orders
    pub const fn new(bit_order: BitOrder, byte_order: ByteOrder) -> Self {
        Self {
            bit_order,
            byte_order,
        }
    }

    /// CRC of `data`
    pub fn calculate(&self, data: &[u8]) -> u16 {
        let mut crc: u16 = 0;
        for &byte in data {
            for i in 0..8 {
                let shift = match self.bit_order {
                    BitOrder::LsbFirst => i,
                    BitOrder::MsbFirst => 7 - i,
                };
                let data_bit = (byte >> shift) & 1;
                let crc_bit = (crc >> 15) as u8;
                crc <<= 1;
                if data_bit != crc_bit {
                    crc ^= POLYNOMIAL;
                }
            }
        }
        crc
    }
}

impl Checksum for Crc16 {
    fn compute(&mut self, data: &[u8]) -> u16 {
        self.calculate(data)
    }

    fn to_bytes(&self, crc: u16) -> [u8; 2] {
        match self.byte_order {
            ByteOrder::Little => crc.to_le_bytes(),
            ByteOrder::Big => crc.to_be_bytes(),
        }
    }

    fn from_bytes(&self, bytes: [u8; 2]) -> u16 {
        match self.byte_order {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        }
    }
}
