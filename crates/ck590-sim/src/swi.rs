//! Simulated single-wire bus
//!
//! One [`CryptoAuthChip`] (or nothing) per pin. Flag bytes steer the chip
//! of the selected pin the way the real protocol does: a command flag
//! makes the next transmission a command frame, the transmit flag makes
//! the chip send its output buffer.

use ck590_core::error::BusError;
use ck590_core::sha204::phys::flag;
use ck590_core::SwiBus;

use crate::counters::{Counters, Event};
use crate::crypto_auth::CryptoAuthChip;

/// Single-wire bus with a fixed pin table
#[derive(Debug)]
pub struct SimSwi {
    pins: Vec<Option<CryptoAuthChip>>,
    selected: usize,
    enabled: bool,
    expecting_command: bool,
    transmit: bool,
    counters: Counters,
}

impl SimSwi {
    /// Bus with `pins` entries in the pin table, all unpopulated
    pub fn new(pins: usize, counters: Counters) -> Self {
        Self {
            pins: (0..pins).map(|_| None).collect(),
            selected: 0,
            enabled: false,
            expecting_command: false,
            transmit: false,
            counters,
        }
    }

    /// Place `chip` on `pin`, growing the pin table when needed
    pub fn attach(&mut self, pin: usize, chip: CryptoAuthChip) {
        if self.pins.len() <= pin {
            self.pins.resize_with(pin + 1, || None);
        }
        self.pins[pin] = Some(chip);
    }

    /// Chip on `pin`
    pub fn chip(&self, pin: usize) -> Option<&CryptoAuthChip> {
        self.pins.get(pin).and_then(Option::as_ref)
    }

    /// Chip on `pin`, mutably
    pub fn chip_mut(&mut self, pin: usize) -> Option<&mut CryptoAuthChip> {
        self.pins.get_mut(pin).and_then(Option::as_mut)
    }

    /// True while the channel is open
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn selected_chip(&mut self) -> Option<&mut CryptoAuthChip> {
        self.chip_mut(self.selected)
    }

    fn flag(&mut self, flag: u8) {
        match flag {
            flag::COMMAND => self.expecting_command = true,
            flag::TRANSMIT => {
                self.transmit = true;
                if let Some(chip) = self.selected_chip() {
                    chip.reset_io();
                }
            }
            flag::IDLE => {
                if let Some(chip) = self.selected_chip() {
                    chip.idle();
                }
            }
            flag::SLEEP => {
                if let Some(chip) = self.selected_chip() {
                    chip.sleep();
                }
            }
            _ => {}
        }
    }
}

impl SwiBus for SimSwi {
    fn pin_count(&self) -> u8 {
        self.pins.len().min(usize::from(u8::MAX)) as u8
    }

    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.enabled = false;
        self.expecting_command = false;
        self.transmit = false;
    }

    fn select(&mut self, pin: u8) {
        if usize::from(pin) < self.pins.len() {
            self.selected = usize::from(pin);
        }
    }

    fn wake_pulse(&mut self, _low_us: u32) {
        self.counters.record(Event::Wake);
        self.transmit = false;
        if let Some(chip) = self.selected_chip() {
            chip.wake();
        }
    }

    fn send_bytes(&mut self, data: &[u8]) -> Result<(), BusError> {
        if self.expecting_command {
            self.expecting_command = false;
            self.transmit = false;
            if let Some(chip) = self.selected_chip() {
                chip.command(data);
            }
            return Ok(());
        }
        if let [single] = data {
            self.flag(*single);
        }
        Ok(())
    }

    fn receive_bytes(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        let transmit = std::mem::take(&mut self.transmit);
        let Some(chip) = self.selected_chip() else {
            return Err(BusError::Timeout);
        };
        if !transmit || !chip.is_awake() || chip.output().is_empty() {
            return Err(BusError::Timeout);
        }
        let available = chip.output().len();
        for b in buf.iter_mut().take(available) {
            *b = chip.read_byte();
        }
        if available < buf.len() {
            return Err(BusError::RxFail);
        }
        Ok(())
    }
}
