//! Bitbang serial-peripheral line control
//!
//! GPIO-backed serial-peripheral masters implement [`BitbangSpiMaster`]
//! and get byte transfers from the helpers in [`single`]. The kit only
//! needs mode 0 (clock idles low, data sampled on the rising edge),
//! MSB first, which is what the AES132 expects.
//!
//! Hardware controllers should implement
//! [`SpiPeripheral`](super::spi::SpiPeripheral) instead.

/// The four serial-peripheral lines, driven one level at a time
pub trait BitbangSpiMaster {
    /// Number of chip-select lines wired to this master
    fn cs_count(&self) -> u8 {
        1
    }

    /// Route subsequent `set_cs` calls to chip-select line `index`
    ///
    /// Returns false when the line does not exist.
    fn route_cs(&mut self, index: u8) -> bool {
        index < self.cs_count()
    }

    /// Assert (`true`, line low) or release the routed chip select
    fn set_cs(&mut self, active: bool);

    /// Drive SCK
    fn set_sck(&mut self, high: bool);

    /// Drive MOSI
    fn set_mosi(&mut self, high: bool);

    /// Sample MISO
    fn get_miso(&self) -> bool;

    /// Wait out half an SCK period
    fn half_period_delay(&self);

    /// Drive SCK and MOSI together where the hardware can
    fn set_sck_set_mosi(&mut self, sck: bool, mosi: bool) {
        self.set_sck(sck);
        self.set_mosi(mosi);
    }

    /// Drive SCK, then sample MISO
    fn set_sck_get_miso(&mut self, sck: bool) -> bool {
        self.set_sck(sck);
        self.get_miso()
    }

    /// Claim the lines when the bus is enabled
    fn request_bus(&mut self) {}

    /// Give the lines back when the bus is disabled
    fn release_bus(&mut self) {}
}

/// Byte helpers for single-wire-per-direction transfers
pub mod single {
    use super::BitbangSpiMaster;

    /// Shift one byte out and one byte in (MSB first)
    pub fn transfer_byte<M: BitbangSpiMaster + ?Sized>(master: &mut M, out: u8) -> u8 {
        let mut received = 0u8;
        for i in (0..8).rev() {
            master.set_sck_set_mosi(false, (out >> i) & 1 != 0);
            master.half_period_delay();
            received <<= 1;
            if master.set_sck_get_miso(true) {
                received |= 1;
            }
            master.half_period_delay();
        }
        received
    }

    /// Write bytes, ignoring MISO
    pub fn write_bytes<M: BitbangSpiMaster + ?Sized>(master: &mut M, bytes: &[u8]) {
        for &byte in bytes {
            transfer_byte(master, byte);
        }
    }

    /// Read bytes while holding MOSI low
    pub fn read_bytes<M: BitbangSpiMaster + ?Sized>(master: &mut M, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            *byte = transfer_byte(master, 0x00);
        }
    }

    /// Return the clock to idle after the last byte
    pub fn idle_clock<M: BitbangSpiMaster + ?Sized>(master: &mut M) {
        master.set_sck(false);
        master.half_period_delay();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    /// Loopback master: MISO mirrors MOSI as latched on the last falling edge
    struct Loopback {
        mosi: bool,
        sck: bool,
        edges: Vec<bool>,
    }

    impl BitbangSpiMaster for Loopback {
        fn set_cs(&mut self, _active: bool) {}
        fn set_sck(&mut self, high: bool) {
            if high && !self.sck {
                self.edges.push(self.mosi);
            }
            self.sck = high;
        }
        fn set_mosi(&mut self, high: bool) {
            self.mosi = high;
        }
        fn get_miso(&self) -> bool {
            self.mosi
        }
        fn half_period_delay(&self) {}
    }

    #[test]
    fn test_transfer_is_msb_first() {
        let mut m = Loopback {
            mosi: false,
            sck: false,
            edges: Vec::new(),
        };
        let echoed = single::transfer_byte(&mut m, 0xA5);
        assert_eq!(echoed, 0xA5);
        assert_eq!(
            m.edges,
            [true, false, true, false, false, true, false, true]
        );
    }

    #[test]
    fn test_default_cs_routing() {
        let mut m = Loopback {
            mosi: false,
            sck: false,
            edges: Vec::new(),
        };
        assert!(m.route_cs(0));
        assert!(!m.route_cs(1));
    }
}
