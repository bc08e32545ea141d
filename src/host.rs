//! Serving the kit and printing its state

use std::convert::Infallible;

use ck590_core::discover::DeviceTable;
use ck590_core::{Clock, DeviceType, Feedback, I2cBus, InterfaceId, Kit, SpiBus, SwiBus};
use ck590_transport::{
    HostConnection, SerialTransport, StdioTransport, TcpServer, TransportError,
};

/// Logs what the LEDs would show on the real kit
#[derive(Debug, Default)]
pub struct LogFeedback {
    last: Option<DeviceType>,
}

impl Feedback for LogFeedback {
    fn device_found(&mut self, device: DeviceType) {
        if self.last != Some(device) {
            log::info!("Device indicator: {}", device_label(device));
            self.last = Some(device);
        }
    }
}

fn device_label(device: DeviceType) -> &'static str {
    match device.name() {
        Some(name) => name.trim_end(),
        None => "none",
    }
}

/// Outcome of serving one connection
fn served(result: Result<Infallible, TransportError>) -> Result<(), TransportError> {
    match result {
        Ok(never) => match never {},
        Err(TransportError::Closed) => {
            log::info!("Host disconnected");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Serve the kit on `port`, or on stdin/stdout when none is given
///
/// A serial port or stdio is served until the host goes away. A TCP
/// listener accepts one host after the other until an accept fails.
pub fn serve<W, T, S, C, F>(
    kit: &mut Kit<W, T, S, C, F>,
    port: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>>
where
    W: SwiBus,
    T: I2cBus,
    S: SpiBus,
    C: Clock,
    F: Feedback,
{
    let Some(port) = port else {
        log::info!("Serving on stdin/stdout");
        let mut io = StdioTransport::open();
        return Ok(served(kit.serve(&mut io))?);
    };

    match HostConnection::parse(port)? {
        HostConnection::Serial { device, baud } => {
            let mut io = SerialTransport::open(&device, baud)?;
            Ok(served(kit.serve(&mut io))?)
        }
        HostConnection::Tcp { host, port } => {
            let server = TcpServer::bind(&host, port)?;
            loop {
                let mut io = server.accept()?;
                if let Err(e) = served(kit.serve(&mut io)) {
                    log::warn!("Connection dropped: {}", e);
                }
            }
        }
    }
}

/// Render the device table
pub fn format_table(found: InterfaceId, devices: &DeviceTable) -> String {
    if devices.is_empty() {
        return "No device found\n".to_string();
    }
    let mut out = format!("Discovered on {}\n", found.label().trim_end());
    out.push_str(&format!(
        "{:<4} {:<8} {:<5} {:>7} {:>5}  {}\n",
        "#", "Device", "Bus", "Address", "Index", "Revision"
    ));
    for (i, record) in devices.iter().enumerate() {
        out.push_str(&format!(
            "{:<4} {:<8} {:<5} {:>7} {:>5}  {:02X}{:02X}{:02X}{:02X}\n",
            i,
            device_label(record.device_type),
            record.bus.label().trim_end(),
            format!("0x{:02X}", record.address),
            record.index,
            record.revision[0],
            record.revision[1],
            record.revision[2],
            record.revision[3],
        ));
    }
    out
}
