//! Device discovery
//!
//! Probes the interfaces in a fixed order: single-wire pins first, then
//! the factory-default two-wire addresses, then the serial-peripheral
//! bus. A later interface is only probed when the earlier ones found
//! nothing. Every record is verified with one more round trip before the
//! table is handed out; if any verification fails the table is cleared.

use heapless::Vec;

use crate::aes132::{self, marshal as aes_marshal};
use crate::board::Board;
use crate::clock::Clock;
use crate::crc::{self, Checksum};
use crate::error::{Aes132Error, Sha204Error};
use crate::phys::{I2cBus, InterfaceId, SpiBus, SwiBus};
use crate::sha204::{
    self, marshal as sha_marshal, opcode, CryptoAuthPhy, I2cCryptoAuth, Sha204Comm,
    SwiCryptoAuth, WAKEUP_DELAY_US, WAKEUP_PULSE_US, WAKE_RESPONSE,
};

/// Capacity of the device table
pub const MAX_DEVICES: usize = 4;

/// Settling time between wake-up and the identification command
pub const IDENTIFY_DELAY_US: u32 = 100;
/// Time a DevRev takes before its response can be read
pub const DEVREV_DELAY_MS: u32 = 2;
/// Time the SA10x personalization-key probe takes
pub const SA10X_PROBE_DELAY_MS: u32 = 13;

/// Device families the kit can identify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DeviceType {
    /// Nothing identified
    #[default]
    Unknown = 0,
    /// CryptoMemory
    Cm = 1,
    /// CryptoRF
    Crf = 2,
    /// CryptoMemory with CryptoCompanion
    Cmc = 3,
    /// SA100S
    Sa100s = 4,
    /// SA102S
    Sa102s = 5,
    /// SA10HS
    Sa10hs = 6,
    /// SHA204
    Sha204 = 7,
    /// AES132
    Aes132 = 8,
    /// ECC108
    Ecc108 = 9,
}

impl DeviceType {
    /// Name reported by the board commands, for the families the kit
    /// talks to
    pub const fn name(self) -> Option<&'static str> {
        match self {
            Self::Sha204 => Some("SHA204 "),
            Self::Aes132 => Some("AES132 "),
            Self::Ecc108 => Some("ECC108 "),
            _ => None,
        }
    }

    /// SHA204 and ECC108 share the CryptoAuth framing
    pub const fn is_crypto_auth(self) -> bool {
        matches!(self, Self::Sha204 | Self::Ecc108)
    }

    /// Classify a CryptoAuth chip by its DevRev answer
    pub const fn from_revision(revision: &[u8; 4]) -> Self {
        if revision[2] == 0 {
            Self::Sha204
        } else {
            Self::Ecc108
        }
    }
}

/// One discovered device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Interface the device sits on
    pub bus: InterfaceId,
    /// Identified family
    pub device_type: DeviceType,
    /// Two-wire address, or the configuration selector byte on single-wire
    pub address: u8,
    /// Single-wire pin or chip-select index
    pub index: u8,
    /// Revision bytes
    pub revision: [u8; 4],
}

impl DeviceRecord {
    /// The byte the board commands report: address on two-wire, index
    /// otherwise
    pub fn selector(&self) -> u8 {
        if self.bus == InterfaceId::I2c {
            self.address
        } else {
            self.index
        }
    }
}

/// Discovered devices in discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceTable {
    records: Vec<DeviceRecord, MAX_DEVICES>,
}

impl DeviceTable {
    /// Empty table
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Remove every record
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Append a record; returns false when the table is full
    pub fn push(&mut self, record: DeviceRecord) -> bool {
        self.records.push(record).is_ok()
    }

    /// Record at `index`
    pub fn get(&self, index: usize) -> Option<&DeviceRecord> {
        self.records.get(index)
    }

    /// First record, which decides the active interface
    pub fn first(&self) -> Option<&DeviceRecord> {
        self.records.first()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing was found
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when no more records fit
    pub fn is_full(&self) -> bool {
        self.records.is_full()
    }

    /// Iterate over the records
    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.records.iter()
    }
}

/// What a discovery pass looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryPlan {
    /// Single-wire pins walked, capped by the pins the bus has
    pub swi_pins: u8,
    /// CryptoAuth two-wire addresses, tried in order
    pub crypto_auth: [u8; 2],
    /// AES132 address
    pub aes132: u8,
}

impl Default for DiscoveryPlan {
    fn default() -> Self {
        Self {
            swi_pins: MAX_DEVICES as u8,
            crypto_auth: [sha204::ECC108_I2C_ADDRESS, sha204::SHA204_I2C_ADDRESS],
            aes132: aes132::I2C_ADDRESS,
        }
    }
}

/// Run a full discovery pass
///
/// Returns the interface of the first record, or
/// [`InterfaceId::Unknown`] when nothing was found. That interface is left
/// active with its device selected.
pub fn discover<W, T, S, C>(
    board: &mut Board<W, T, S, C>,
    table: &mut DeviceTable,
    plan: &DiscoveryPlan,
) -> InterfaceId
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    board.disable();
    table.clear();

    if board.has(InterfaceId::Swi) {
        probe_swi(board, table, plan.swi_pins);
    }
    if table.is_empty() && board.has(InterfaceId::I2c) {
        probe_i2c(board, table, plan);
    }
    if table.is_empty() && board.has(InterfaceId::Spi) {
        probe_spi(board, table);
    }

    if !verify(board, table) {
        log::warn!("discovery: verification failed, table cleared");
        table.clear();
    }

    match table.first().copied() {
        Some(first) => {
            if board.activate(first.bus).is_ok() {
                if first.device_type.is_crypto_auth() {
                    let _ = board.select_crypto_auth(first.selector());
                } else {
                    let _ = board.select_aes132(first.selector());
                }
            }
            log::info!(
                "discovery: {} device(s), first {:?} on {:?}",
                table.len(),
                first.device_type,
                first.bus
            );
            first.bus
        }
        None => {
            board.disable();
            log::info!("discovery: no device");
            InterfaceId::Unknown
        }
    }
}

fn probe_swi<W, T, S, C>(board: &mut Board<W, T, S, C>, table: &mut DeviceTable, pins: u8)
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    if board.activate(InterfaceId::Swi).is_err() {
        return;
    }
    let clock = board.clock();
    let Ok(bus) = board.swi() else {
        return;
    };
    for pin in 0..bus.pin_count().min(pins) {
        if table.is_full() {
            break;
        }
        bus.enable();
        bus.select(pin);
        let found = identify_swi_pin(bus, clock.clone(), pin);
        if let Some(record) = found {
            log::debug!("discovery: {:?} on pin {}", record.device_type, pin);
            table.push(record);
        }
        bus.disable();
    }
    board.disable();
}

fn identify_swi_pin<W: SwiBus, C: Clock>(bus: &mut W, clock: C, pin: u8) -> Option<DeviceRecord> {
    let mut delay = clock.clone();
    let mut comm = Sha204Comm::new(SwiCryptoAuth::new(bus, clock.clone()), clock);
    let mut rx = [0u8; sha204::RSP_SIZE_MAX];
    if comm.wakeup(&mut rx).is_err() {
        put_to_sleep(&mut comm);
        return None;
    }
    delay.delay_us(IDENTIFY_DELAY_US);

    // DevRev goes out once, without the retries of the framing layer
    let mut tx = [0u8; sha204::CMD_SIZE_MIN];
    sha_marshal::build_frame(&mut tx, opcode::DEVREV, 0, 0, &[]).ok()?;
    let mut crc = crc::SHA204;
    crc.append(&mut tx);
    let mut record = None;
    if comm.phy().send_command(&tx).is_ok() {
        delay.delay_ms(DEVREV_DELAY_MS);
        let answer = &mut rx[..7];
        match comm.phy().receive_response(answer) {
            Ok(()) => {
                if crc.verify(&answer[..answer[0] as usize]) {
                    let revision = [answer[1], answer[2], answer[3], answer[4]];
                    if let Ok(selector) = sha_marshal::read_selector(&mut comm) {
                        record = Some(DeviceRecord {
                            bus: InterfaceId::Swi,
                            device_type: DeviceType::from_revision(&revision),
                            address: selector,
                            index: pin,
                            revision,
                        });
                    }
                }
            }
            Err(_) => {
                // Chips of the SA10x line do not implement DevRev
                if sa10x_answers(&mut comm, &mut delay) {
                    record = Some(DeviceRecord {
                        bus: InterfaceId::Swi,
                        device_type: DeviceType::Sa102s,
                        address: 0,
                        index: pin,
                        revision: [0; 4],
                    });
                }
            }
        }
    }
    put_to_sleep(&mut comm);
    record
}

/// Send the personalization-key command SA10x chips answer instead of
/// DevRev and check the reply
fn sa10x_answers<P: CryptoAuthPhy, C: Clock>(comm: &mut Sha204Comm<P, C>, delay: &mut C) -> bool {
    let frame = sha_marshal::sa10x_probe_frame();
    if comm.phy().send_command(&frame).is_err() {
        return false;
    }
    delay.delay_ms(SA10X_PROBE_DELAY_MS);
    let mut answer = [0u8; sha204::RSP_SIZE_MIN];
    let mut crc = crc::SHA204;
    comm.phy().receive_response(&mut answer).is_ok() && crc.verify(&answer)
}

fn put_to_sleep<P: CryptoAuthPhy, C: Clock>(comm: &mut Sha204Comm<P, C>) {
    if let Err(e) = comm.sleep() {
        log::debug!("discovery: sleep not delivered: {}", e);
    }
}

fn probe_i2c<W, T, S, C>(
    board: &mut Board<W, T, S, C>,
    table: &mut DeviceTable,
    plan: &DiscoveryPlan,
) where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    if board.activate(InterfaceId::I2c).is_err() {
        return;
    }
    let mut clock = board.clock();
    let Ok(bus) = board.i2c() else {
        return;
    };
    bus.wake_pulse(WAKEUP_PULSE_US);
    clock.delay_us(WAKEUP_DELAY_US);
    for &address in &plan.crypto_auth {
        if table.is_full() {
            return;
        }
        if let Some(record) = identify_i2c_crypto_auth(bus, clock.clone(), address) {
            log::debug!("discovery: {:?} at 0x{:02X}", record.device_type, address);
            table.push(record);
        }
    }
    if !table.is_full() {
        let mut phy = aes132::I2cAes132::new(bus, plan.aes132);
        if aes132::Aes132Phy::read_status(&mut phy).is_ok() {
            log::debug!("discovery: AES132 at 0x{:02X}", plan.aes132);
            table.push(DeviceRecord {
                bus: InterfaceId::I2c,
                device_type: DeviceType::Aes132,
                address: plan.aes132,
                index: 0,
                revision: [0; 4],
            });
        }
    }
}

fn identify_i2c_crypto_auth<T: I2cBus, C: Clock>(
    bus: &mut T,
    clock: C,
    address: u8,
) -> Option<DeviceRecord> {
    let mut delay = clock.clone();
    let mut phy = I2cCryptoAuth::new(bus, clock, address);
    let mut ack = [0u8; sha204::RSP_SIZE_MIN];
    phy.receive_response(&mut ack).ok()?;
    if ack != WAKE_RESPONSE {
        return None;
    }

    let mut tx = [0u8; sha204::CMD_SIZE_MIN];
    sha_marshal::build_frame(&mut tx, opcode::DEVREV, 0, 0, &[]).ok()?;
    let mut crc = crc::SHA204;
    crc.append(&mut tx);
    phy.send_command(&tx).ok()?;
    delay.delay_ms(DEVREV_DELAY_MS);
    let mut rx = [0u8; 7];
    let received = phy.receive_response(&mut rx);
    if let Err(e) = phy.sleep() {
        log::debug!("discovery: sleep to 0x{:02X} not delivered: {}", address, e);
    }
    received.ok()?;
    let count = rx[0] as usize;
    if count < sha204::RSP_SIZE_MIN || !crc.verify(&rx[..count]) {
        return None;
    }
    let revision = [rx[1], rx[2], rx[3], rx[4]];
    Some(DeviceRecord {
        bus: InterfaceId::I2c,
        device_type: DeviceType::from_revision(&revision),
        address,
        index: 0,
        revision,
    })
}

fn probe_spi<W, T, S, C>(board: &mut Board<W, T, S, C>, table: &mut DeviceTable)
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    if board.activate(InterfaceId::Spi).is_err() {
        return;
    }
    if board.select_aes132(0).is_err() {
        board.disable();
        return;
    }
    let mut rx = [0u8; aes132::RSP_SIZE_MAX];
    let Ok(mut comm) = board.aes132() else {
        return;
    };
    match aes_marshal::info(&mut comm, aes_marshal::INFO_DEVICE_NUMBER, &mut rx) {
        Ok(()) => {}
        Err(Aes132Error::Device(code)) if code <= aes132::DEVICE_RETCODE_MAX => {}
        Err(_) => {
            board.disable();
            return;
        }
    }
    table.push(DeviceRecord {
        bus: InterfaceId::Spi,
        device_type: DeviceType::Aes132,
        address: 0,
        index: 0,
        revision: [0, 0, rx[2], rx[3]],
    });
}

/// One more round trip per record; false when any device stopped
/// answering
fn verify<W, T, S, C>(board: &mut Board<W, T, S, C>, table: &mut DeviceTable) -> bool
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    let mut verified = DeviceTable::new();
    for record in table.iter() {
        let mut record = *record;
        let ok = match record.device_type {
            t if t.is_crypto_auth() => verify_crypto_auth(board, &mut record).is_ok(),
            DeviceType::Aes132 => verify_aes132(board, &mut record).is_ok(),
            DeviceType::Sa102s => verify_sa10x(board, &record).is_ok(),
            // Discovery never records the other families
            _ => false,
        };
        if !ok {
            log::debug!("discovery: {:?} did not verify", record.device_type);
            return false;
        }
        verified.push(record);
    }
    *table = verified;
    true
}

fn verify_crypto_auth<W, T, S, C>(
    board: &mut Board<W, T, S, C>,
    record: &mut DeviceRecord,
) -> Result<(), Sha204Error>
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    board
        .activate(record.bus)
        .and_then(|()| board.select_crypto_auth(record.selector()))
        .map_err(|_| Sha204Error::FuncFail)?;
    let mut delay = board.clock();
    let mut comm = board.crypto_auth().map_err(|_| Sha204Error::FuncFail)?;
    let mut rx = [0u8; sha204::RSP_SIZE_MAX];
    if let Err(e) = comm.wakeup(&mut rx) {
        put_to_sleep(&mut comm);
        return Err(e);
    }
    delay.delay_us(IDENTIFY_DELAY_US);
    let result = sha_marshal::dev_rev(&mut comm, &mut rx);
    if comm.sleep().is_err() {
        log::warn!("discovery: could not put {:?} to sleep", record.device_type);
    }
    result?;
    record.revision = [rx[1], rx[2], rx[3], rx[4]];
    Ok(())
}

fn verify_sa10x<W, T, S, C>(
    board: &mut Board<W, T, S, C>,
    record: &DeviceRecord,
) -> Result<(), Sha204Error>
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    board
        .activate(record.bus)
        .and_then(|()| board.select_crypto_auth(record.selector()))
        .map_err(|_| Sha204Error::FuncFail)?;
    let mut delay = board.clock();
    let mut comm = board.crypto_auth().map_err(|_| Sha204Error::FuncFail)?;
    let mut rx = [0u8; sha204::RSP_SIZE_MIN];
    let mut result = comm.wakeup(&mut rx);
    if result.is_ok() {
        delay.delay_us(IDENTIFY_DELAY_US);
        if !sa10x_answers(&mut comm, &mut delay) {
            result = Err(Sha204Error::RxNoResponse);
        }
    }
    put_to_sleep(&mut comm);
    result
}

fn verify_aes132<W, T, S, C>(
    board: &mut Board<W, T, S, C>,
    record: &mut DeviceRecord,
) -> Result<(), Aes132Error>
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    board
        .activate(record.bus)
        .map_err(|_| Aes132Error::NotImplemented)?;
    board.select_aes132(record.selector())?;
    let mut comm = board.aes132()?;
    let mut rx = [0u8; aes132::RSP_SIZE_MAX];
    aes_marshal::info(&mut comm, aes_marshal::INFO_DEVICE_NUMBER, &mut rx)?;
    record.revision[2] = rx[2];
    record.revision[3] = rx[3];
    Ok(())
}
