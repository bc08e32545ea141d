//! Board commands (`b:`)
//!
//! These answer with a plain-text preamble in front of the status byte,
//! e.g. `CK590 SHA204 TWI 00(C8)`.

use super::{Reply, Token};
use crate::clock::Clock;
use crate::discover::MAX_DEVICES;
use crate::error::{Error, KitError};
use crate::kit::KitState;
use crate::phys::{I2cBus, InterfaceId, SpiBus, SwiBus};

/// Kit firmware version
pub const KIT_VERSION: [u8; 3] = [1, 0, 5];
/// SHA204 library version
pub const SHA204_VERSION: [u8; 3] = [1, 3, 0];
/// AES132 library version
pub const AES132_VERSION: [u8; 3] = [1, 1, 0];
/// ECC108 library version
pub const ECC108_VERSION: [u8; 3] = [0, 1, 0];

/// Handle `b:<op>`
pub fn handle<W, T, S, C>(
    kit: &mut KitState<W, T, S, C>,
    mut token: Token<'_>,
    reply: &mut Reply,
) -> Result<(), Error>
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    if !token.next_field() {
        return Err(KitError::UnknownCommand.into());
    }
    let result = match token.op(0) {
        b'v' => version(kit, reply),
        b'f' => firmware(kit, &token, reply),
        b'd' => match token.op(1) {
            b'?' => reply.push_data(&[kit.discovery_enabled as u8]),
            b'i' => {
                kit.discovery_enabled = token.byte_param(2)? != 0;
                Ok(())
            }
            _ => device(kit, &token, reply),
        },
        b'm' => match token.op(1) {
            b'g' => reply.push_data(&[kit.module_number]),
            b's' => {
                kit.module_number = token.byte_param(2)?;
                log::info!("module number set to {}", kit.module_number);
                Ok(())
            }
            _ => Err(KitError::UnknownCommand),
        },
        _ => Err(KitError::UnknownCommand),
    };
    result.map_err(Error::from)
}

fn version<W, T, S, C>(kit: &mut KitState<W, T, S, C>, reply: &mut Reply) -> Result<(), KitError>
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    let found = kit.discover();
    reply.push_text(&kit.config.short_name);
    let first = kit.devices.first().copied();
    if let Some(name) = first.and_then(|r| r.device_type.name()) {
        reply.push_text(name);
    }
    reply.push_text(found.label());
    match first {
        Some(record) if found != InterfaceId::Unknown => reply.push_data(&[record.selector()]),
        _ => Ok(()),
    }
}

fn firmware<W, T, S, C>(
    kit: &KitState<W, T, S, C>,
    token: &Token<'_>,
    reply: &mut Reply,
) -> Result<(), KitError> {
    let (name, version) = match token.byte_param(1)? {
        0 => (kit.config.kit_name.as_str(), KIT_VERSION),
        1 => ("SHA204 ", SHA204_VERSION),
        2 => ("AES132 ", AES132_VERSION),
        3 => ("ECC108 ", ECC108_VERSION),
        _ => return Err(KitError::InvalidParams),
    };
    reply.push_text(name);
    reply.push_data(&version)
}

fn device<W, T, S, C>(
    kit: &mut KitState<W, T, S, C>,
    token: &Token<'_>,
    reply: &mut Reply,
) -> Result<(), KitError>
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
{
    let index = token.byte_param(1)? as usize;
    kit.discover();
    if index >= MAX_DEVICES {
        return Err(KitError::NoDevice);
    }
    let Some(record) = kit.devices.get(index).copied() else {
        reply.push_text(InterfaceId::Unknown.label());
        return Err(KitError::NoDevice);
    };
    reply.push_text(record.device_type.name().unwrap_or("unknown_device"));
    reply.push_text(record.bus.label());
    reply.push_data(&[record.selector()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tests::Recorder;
    use crate::board::Board;
    use crate::clock::fake::FakeClock;
    use crate::config::KitConfig;
    use crate::phys::NoBus;

    type State = KitState<Recorder, Recorder, NoBus, FakeClock>;

    fn state() -> State {
        let board = Board::new(
            Some(Recorder::default()),
            Some(Recorder::default()),
            None,
            FakeClock::new(),
        );
        KitState::new(board, KitConfig::default())
    }

    fn run(kit: &mut State, line: &[u8]) -> (Result<(), Error>, Reply) {
        let mut reply = Reply::new();
        let result = handle(kit, Token::new(line), &mut reply);
        (result, reply)
    }

    #[test]
    fn test_firmware_versions() {
        let mut kit = state();
        let (result, reply) = run(&mut kit, b"b:f(00)");
        assert_eq!(result, Ok(()));
        assert_eq!(reply.text.as_str(), "AT88CK590 ");
        assert_eq!(reply.data, [1, 0, 5]);

        let (_, reply) = run(&mut kit, b"b:f(03)");
        assert_eq!(reply.text.as_str(), "ECC108 ");

        let (result, reply) = run(&mut kit, b"b:f(04)");
        assert_eq!(result, Err(KitError::InvalidParams.into()));
        assert!(reply.text.is_empty());
    }

    #[test]
    fn test_discovery_flag_and_module_number() {
        let mut kit = state();
        run(&mut kit, b"b:di(00)").0.unwrap();
        let (_, reply) = run(&mut kit, b"b:d?");
        assert_eq!(reply.data, [0]);

        run(&mut kit, b"b:ms(07)").0.unwrap();
        let (_, reply) = run(&mut kit, b"b:mg");
        assert_eq!(reply.data, [7]);
        assert_eq!(run(&mut kit, b"b:ms").0, Err(KitError::InvalidParams.into()));
    }

    #[test]
    fn test_device_query_without_devices() {
        let mut kit = state();
        let (result, reply) = run(&mut kit, b"b:d(00)");
        assert_eq!(result, Err(KitError::NoDevice.into()));
        assert_eq!(reply.text.as_str(), "no_device ");
        assert!(reply.data.is_empty());
        assert!(kit.discovery_enabled);

        let (result, reply) = run(&mut kit, b"b:d(09)");
        assert_eq!(result, Err(KitError::NoDevice.into()));
        assert!(reply.text.is_empty());
    }

    #[test]
    fn test_version_reports_no_device() {
        let mut kit = state();
        let (result, reply) = run(&mut kit, b"b:v");
        assert_eq!(result, Ok(()));
        assert_eq!(reply.text.as_str(), "CK590 no_device ");
        assert!(reply.data.is_empty());
    }
}
