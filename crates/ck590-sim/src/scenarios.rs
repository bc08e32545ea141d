//! Host-to-chip runs through the whole kit against simulated hardware

use std::convert::Infallible;

use ck590_core::discover::{self as discovery, DeviceTable, DiscoveryPlan, MAX_DEVICES};
use ck590_core::error::Sha204Error;
use ck590_core::sha204::{marshal, opcode, Sha204Comm, SwiCryptoAuth};
use ck590_core::{aes132, Board, DeviceType, InterfaceId, Kit, KitConfig, SwiBus};

use crate::aes132::retcode;
use crate::{
    bench, Aes132Chip, Bench, BusKind, ChipKind, Counters, CountingCrc, CountingPhy,
    CryptoAuthChip, Event, Family, I2cDevice, SimBoard, SimClock, SimI2c, SimKit, SimSpi, SimSwi,
    SPI_LINES, SWI_PINS,
};

#[derive(Default)]
struct Sink(Vec<u8>);

impl embedded_io::ErrorType for Sink {
    type Error = Infallible;
}

impl embedded_io::Write for Sink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.0.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Send one line the way the host does and return the response packet
fn request(kit: &mut SimKit, line: &str) -> String {
    let mut out = Sink::default();
    for &b in line.as_bytes() {
        kit.process_byte(b, &mut out).unwrap();
    }
    String::from_utf8(out.0).unwrap()
}

fn kit(chip: ChipKind, bus: BusKind) -> SimKit {
    bench(chip, bus).unwrap().into_kit(KitConfig::default())
}

fn commands_with(counters: &Counters, op: u8) -> usize {
    counters
        .events()
        .iter()
        .filter(|e| **e == Event::Command(op))
        .count()
}

/// Kit with one SA102S on the first single-wire pin
fn sa102s_kit(wakes_left: Option<usize>) -> (SimKit, Counters) {
    let counters = Counters::new();
    let mut chip = CryptoAuthChip::new(Family::Sa102s, counters.clone());
    chip.faults.wakes_left = wakes_left;
    let mut swi = SimSwi::new(SWI_PINS, counters.clone());
    swi.attach(0, chip);
    let board: SimBoard = Board::new(Some(swi), None, None, SimClock::new());
    (Kit::new(board, KitConfig::default()), counters)
}

#[test]
fn test_version_without_device() {
    let mut kit = Bench::empty().into_kit(KitConfig::default());
    assert_eq!(request(&mut kit, "b:v\n"), "CK590 no_device 00()\n");
}

#[test]
fn test_discover_ecc108_on_i2c() {
    let mut kit = kit(ChipKind::Ecc108, BusKind::I2c);
    assert_eq!(kit.discover(), InterfaceId::I2c);
    let devices = &kit.state().devices;
    assert_eq!(devices.len(), 1);
    let record = devices.first().unwrap();
    assert_eq!(record.device_type, DeviceType::Ecc108);
    assert_eq!(record.bus, InterfaceId::I2c);
    assert_eq!(record.address, 0xC0);
    assert_eq!(record.revision, Family::Ecc108.revision());
}

#[test]
fn test_discover_sha204_on_swi() {
    let mut kit = kit(ChipKind::Sha204, BusKind::Swi);
    assert_eq!(kit.discover(), InterfaceId::Swi);
    let devices = &kit.state().devices;
    assert_eq!(devices.len(), 1);
    let record = devices.first().unwrap();
    assert_eq!(record.device_type, DeviceType::Sha204);
    assert_eq!(record.bus, InterfaceId::Swi);
    assert_eq!(record.index, 0);
}

#[test]
fn test_sa102s_identified_and_verified() {
    let (mut kit, counters) = sa102s_kit(None);
    assert_eq!(kit.discover(), InterfaceId::Swi);
    let devices = &kit.state().devices;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices.first().unwrap().device_type, DeviceType::Sa102s);
    // Once while identifying, once more while verifying
    assert_eq!(commands_with(&counters, marshal::SA10X_GEN_PERS_KEY), 2);
}

#[test]
fn test_sa102s_gone_before_verification_clears_table() {
    let (mut kit, counters) = sa102s_kit(Some(1));
    assert_eq!(kit.discover(), InterfaceId::Unknown);
    assert!(kit.state().devices.is_empty());
    assert_eq!(commands_with(&counters, marshal::SA10X_GEN_PERS_KEY), 1);
}

#[test]
fn test_aes132_failing_info_is_dropped() {
    let counters = Counters::new();
    let mut chip = Aes132Chip::new(counters.clone());
    chip.info_retcode = retcode::PARSE;
    let mut i2c = SimI2c::new(counters.clone());
    i2c.attach(I2cDevice::Aes132 {
        address: aes132::I2C_ADDRESS,
        chip,
    });
    let board: SimBoard = Board::new(None, Some(i2c), None, SimClock::new());
    let mut kit = Kit::new(board, KitConfig::default());

    assert_eq!(kit.discover(), InterfaceId::Unknown);
    assert!(kit.state().devices.is_empty());
    assert_eq!(commands_with(&counters, aes132::opcode::INFO), 1);
}

#[test]
fn test_discovery_stops_at_table_capacity() {
    let counters = Counters::new();
    let pins = MAX_DEVICES + 2;
    let mut swi = SimSwi::new(pins, counters.clone());
    for pin in 0..pins {
        swi.attach(pin, CryptoAuthChip::new(Family::Sha204, counters.clone()));
    }
    let mut i2c = SimI2c::new(counters.clone());
    i2c.attach(I2cDevice::CryptoAuth {
        address: 0xC0,
        chip: CryptoAuthChip::new(Family::Ecc108, counters.clone()),
    });
    let mut board: SimBoard = Board::new(Some(swi), Some(i2c), None, SimClock::new());
    let plan = DiscoveryPlan {
        swi_pins: pins as u8,
        ..DiscoveryPlan::default()
    };
    let mut table = DeviceTable::new();

    assert_eq!(discovery::discover(&mut board, &mut table, &plan), InterfaceId::Swi);
    assert_eq!(table.len(), MAX_DEVICES);
    let found: Vec<u8> = table.iter().map(|r| r.index).collect();
    assert_eq!(found, [0, 1, 2, 3]);
    // Pins past the capacity are never identified
    assert_eq!(commands_with(&counters, opcode::DEVREV), 2 * MAX_DEVICES);
    assert_eq!(counters.address_nacks(), 0);
}

#[test]
fn test_absent_interfaces_are_skipped() {
    fn run(with_i2c: bool) -> Counters {
        let counters = Counters::new();
        let swi = SimSwi::new(SWI_PINS, counters.clone());
        let i2c = with_i2c.then(|| SimI2c::new(counters.clone()));
        let mut spi = SimSpi::new(SPI_LINES);
        spi.attach(0, Aes132Chip::new(counters.clone()));
        let board: SimBoard = Board::new(Some(swi), i2c, Some(spi), SimClock::new());
        let mut kit = Kit::new(board, KitConfig::default());
        assert_eq!(kit.discover(), InterfaceId::Spi);
        counters
    }

    let without = run(false);
    assert_eq!(without.wake_calls(), SWI_PINS);
    assert_eq!(without.address_nacks(), 0);

    // The same counters do see the two-wire pass when the bus is there
    let with = run(true);
    assert_eq!(with.wake_calls(), SWI_PINS + 1);
    assert_eq!(with.address_nacks(), 3);
}

#[test]
fn test_rediscovery_on_quiet_bus_is_stable() {
    for (chip, bus) in [
        (ChipKind::Sha204, BusKind::Swi),
        (ChipKind::Ecc108, BusKind::I2c),
        (ChipKind::Aes132, BusKind::Spi),
    ] {
        let mut kit = kit(chip, bus);
        let first_bus = kit.discover();
        let first = kit.state().devices.clone();
        assert_eq!(kit.discover(), first_bus);
        assert_eq!(kit.state().devices, first);
        assert_eq!(first.len(), 1);
    }
}

#[test]
fn test_oversized_result_is_truncated() {
    let mut kit = Bench::empty().into_kit(KitConfig::default());
    let response = request(&mut kit, "i:spi:r(0600)\n");
    assert!(response.starts_with("C2("));
    assert!(response.ends_with(")\n"));
    let hex = &response[3..response.len() - 2];
    assert_eq!(hex.len(), 2 * ck590_core::ascii::MAX_RESULT);
    assert!(hex.bytes().all(|c| c == b'F'));
}

#[test]
fn test_silent_i2c_chips_leave_table_empty() {
    let counters = Counters::new();
    let mut i2c = SimI2c::new(counters.clone());
    for (family, address) in [(Family::Ecc108, 0xC0), (Family::Sha204, 0xC8)] {
        let mut chip = CryptoAuthChip::new(family, counters.clone());
        chip.faults.silent = true;
        i2c.attach(I2cDevice::CryptoAuth { address, chip });
    }
    let board: SimBoard = Board::new(None, Some(i2c), None, SimClock::new());
    let mut kit = Kit::new(board, KitConfig::default());

    assert_eq!(kit.discover(), InterfaceId::Unknown);
    assert!(kit.state().devices.is_empty());
    assert_eq!(counters.address_nacks(), 3);
    assert_eq!(counters.wake_calls(), 1);
    assert_eq!(counters.commands(), 0);
}

#[test]
fn test_bad_response_crc_resyncs_before_next_command() {
    let mut bench = bench(ChipKind::Sha204, BusKind::Swi).unwrap();
    let counters = bench.counters.clone();
    let clock = bench.clock.clone();
    let swi = bench.board.swi().unwrap();
    swi.enable();
    swi.select(0);
    let chip = swi.chip_mut(0).unwrap();
    chip.wake();
    chip.faults.corrupt_responses = 4;

    let phy = CountingPhy::new(SwiCryptoAuth::new(swi, clock.clone()), counters.clone());
    let mut comm = Sha204Comm::with_checksum(phy, clock, CountingCrc::sha204(counters.clone()));
    let mut rx = [0u8; 7];
    assert_eq!(marshal::dev_rev(&mut comm, &mut rx), Err(Sha204Error::BadCrc));

    let trail: Vec<Event> = counters
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::Command(_) | Event::Resync))
        .collect();
    let command = Event::Command(opcode::DEVREV);
    assert_eq!(
        trail,
        vec![
            command,
            Event::Resync,
            Event::Resync,
            command,
            Event::Resync,
            Event::Resync
        ]
    );
    assert!(counters.crc_calls() > 0);
}

#[test]
fn test_talk_dev_rev_through_kit() {
    let mut kit = kit(ChipKind::Sha204, BusKind::Swi);
    kit.discover();
    let response = request(&mut kit, "s:t(07300000000000)\n");
    assert!(response.starts_with("00(0700020009"), "{}", response);
    assert_eq!(kit.reply().data.len(), 7);
}

#[test]
fn test_aes132_version_on_i2c() {
    let mut kit = kit(ChipKind::Aes132, BusKind::I2c);
    assert_eq!(request(&mut kit, "b:v\n"), "CK590 AES132 TWI 00(A0)\n");
}

#[test]
fn test_aes132_info_talk() {
    let mut kit = kit(ChipKind::Aes132, BusKind::Spi);
    assert_eq!(kit.discover(), InterfaceId::Spi);
    assert_eq!(kit.state().devices.first().unwrap().revision[2..], [0x0A, 0x06]);
    let response = request(&mut kit, "a:t(090C00000600000000)\n");
    assert!(response.starts_with("00(06000A06"), "{}", response);
}

#[test]
fn test_aes132_memory_write_then_read() {
    let mut kit = kit(ChipKind::Aes132, BusKind::I2c);
    kit.discover();
    let written = request(&mut kit, "a:mw(030010010203)\n");
    assert!(written.starts_with("00(0400"), "{}", written);
    assert_eq!(request(&mut kit, "a:mr(030010)\n"), "00(010203)\n");
}

#[test]
fn test_unsupported_pairings() {
    assert!(bench(ChipKind::Aes132, BusKind::Swi).is_err());
    assert!(bench(ChipKind::Sha204, BusKind::Spi).is_err());
    assert_eq!("TWI".parse::<BusKind>().unwrap(), BusKind::I2c);
    assert!("uart".parse::<BusKind>().is_err());
}
