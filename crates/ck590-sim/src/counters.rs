//! Call-count instrumentation
//!
//! Every simulated chip and bus reports what happened to a shared
//! [`Counters`] handle. Tests read the totals or the event order.

use std::cell::RefCell;
use std::rc::Rc;

use ck590_core::crc::{self, Checksum, Crc16};
use ck590_core::error::Sha204Error;
use ck590_core::sha204::CryptoAuthPhy;

/// Something a test may want to observe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Wake pulse on a bus
    Wake,
    /// A chip received a command frame with this opcode
    Command(u8),
    /// Resynchronization through a [`CountingPhy`]
    Resync,
    /// No device acknowledged this two-wire address
    Nack(u8),
    /// Checksum computed through a [`CountingCrc`]
    Crc,
}

#[derive(Debug, Default)]
struct Inner {
    events: Vec<Event>,
}

/// Shared event log with per-kind totals
#[derive(Debug, Clone, Default)]
pub struct Counters {
    inner: Rc<RefCell<Inner>>,
}

impl Counters {
    /// Empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event
    pub fn record(&self, event: Event) {
        log::trace!("sim: {:?}", event);
        self.inner.borrow_mut().events.push(event);
    }

    /// Every event so far, oldest first
    pub fn events(&self) -> Vec<Event> {
        self.inner.borrow().events.clone()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.inner.borrow_mut().events.clear();
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.inner.borrow().events.iter().filter(|e| pred(e)).count()
    }

    /// Wake pulses
    pub fn wake_calls(&self) -> usize {
        self.count(|e| *e == Event::Wake)
    }

    /// Resynchronizations
    pub fn resync_calls(&self) -> usize {
        self.count(|e| *e == Event::Resync)
    }

    /// Command frames received by any chip
    pub fn commands(&self) -> usize {
        self.count(|e| matches!(e, Event::Command(_)))
    }

    /// Unacknowledged two-wire addresses
    pub fn address_nacks(&self) -> usize {
        self.count(|e| matches!(e, Event::Nack(_)))
    }

    /// Checksum computations
    pub fn crc_calls(&self) -> usize {
        self.count(|e| *e == Event::Crc)
    }
}

/// [`CryptoAuthPhy`] wrapper that records every resynchronization
pub struct CountingPhy<P> {
    inner: P,
    counters: Counters,
}

impl<P: CryptoAuthPhy> CountingPhy<P> {
    /// Wrap `inner`
    pub fn new(inner: P, counters: Counters) -> Self {
        Self { inner, counters }
    }
}

impl<P: CryptoAuthPhy> CryptoAuthPhy for CountingPhy<P> {
    fn wakeup(&mut self) -> Result<(), Sha204Error> {
        self.inner.wakeup()
    }

    fn send_command(&mut self, frame: &[u8]) -> Result<(), Sha204Error> {
        self.inner.send_command(frame)
    }

    fn receive_response(&mut self, buf: &mut [u8]) -> Result<(), Sha204Error> {
        self.inner.receive_response(buf)
    }

    fn idle(&mut self) -> Result<(), Sha204Error> {
        self.inner.idle()
    }

    fn sleep(&mut self) -> Result<(), Sha204Error> {
        self.inner.sleep()
    }

    fn reset_io(&mut self) -> Result<(), Sha204Error> {
        self.inner.reset_io()
    }

    fn resync(&mut self, buf: &mut [u8]) -> Result<(), Sha204Error> {
        self.counters.record(Event::Resync);
        self.inner.resync(buf)
    }
}

/// [`Checksum`] wrapper that records every computation
#[derive(Debug, Clone)]
pub struct CountingCrc {
    inner: Crc16,
    counters: Counters,
}

impl CountingCrc {
    /// SHA204 / ECC108 checksum
    pub fn sha204(counters: Counters) -> Self {
        Self {
            inner: crc::SHA204,
            counters,
        }
    }

    /// AES132 checksum
    pub fn aes132(counters: Counters) -> Self {
        Self {
            inner: crc::AES132,
            counters,
        }
    }
}

impl Checksum for CountingCrc {
    fn compute(&mut self, data: &[u8]) -> u16 {
        self.counters.record(Event::Crc);
        self.inner.compute(data)
    }

    fn to_bytes(&self, crc: u16) -> [u8; 2] {
        self.inner.to_bytes(crc)
    }

    fn from_bytes(&self, bytes: [u8; 2]) -> u16 {
        self.inner.from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_by_kind() {
        let counters = Counters::new();
        let shared = counters.clone();
        shared.record(Event::Wake);
        shared.record(Event::Command(0x30));
        shared.record(Event::Nack(0xC0));
        shared.record(Event::Wake);
        assert_eq!(counters.wake_calls(), 2);
        assert_eq!(counters.commands(), 1);
        assert_eq!(counters.address_nacks(), 1);
        assert_eq!(counters.resync_calls(), 0);
        counters.clear();
        assert!(shared.events().is_empty());
    }

    #[test]
    fn test_counting_crc_matches_plain() {
        let counters = Counters::new();
        let mut counting = CountingCrc::sha204(counters.clone());
        let mut frame = [7, 0x30, 0, 0, 0, 0, 0];
        counting.append(&mut frame);
        let mut plain = crc::SHA204;
        assert!(plain.verify(&frame));
        assert_eq!(counters.crc_calls(), 1);
    }
}
