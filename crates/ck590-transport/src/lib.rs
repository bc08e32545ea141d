//! ck590-transport - Host byte pipes for the kit
//!
//! The kit talks to its host over a plain byte stream. This crate
//! provides the streams a Linux-hosted kit can serve on:
//!
//! - Serial port: `/dev/ttyACM0`, `/dev/ttyUSB0`, `COM1`, etc.
//! - TCP socket: the kit listens, one host at a time
//! - Standard input and output
//!
//! All of them implement the `embedded_io` traits the kit's serve loop
//! reads and writes through.
//!
//! # Example
//!
//! ```ignore
//! use ck590_transport::HostConnection;
//!
//! let conn = HostConnection::parse("ip=0.0.0.0:4590")?;
//! ```

pub mod error;
pub mod transport;

// Re-exports
pub use error::{Result, TransportError};
pub use transport::serial::SerialTransport;
pub use transport::stdio::StdioTransport;
pub use transport::tcp::{TcpServer, TcpTransport};
pub use transport::POLL_TIMEOUT;

/// Where the host connects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostConnection {
    /// Serial port connection
    Serial {
        /// Device path (e.g., "/dev/ttyACM0" or "COM1")
        device: String,
        /// Baud rate (None for the default)
        baud: Option<u32>,
    },
    /// TCP listening socket
    Tcp {
        /// Address to bind
        host: String,
        /// Port number
        port: u16,
    },
}

impl HostConnection {
    /// Parse a connection string
    ///
    /// Formats:
    /// - `dev=/dev/ttyACM0` - Serial with default baud
    /// - `dev=/dev/ttyACM0:115200` - Serial with specified baud
    /// - `ip=host:port` - TCP listener
    pub fn parse(s: &str) -> Result<Self> {
        if let Some(dev) = s.strip_prefix("dev=") {
            if let Some((device, baud_str)) = dev.rsplit_once(':') {
                let baud = baud_str.parse().map_err(|_| {
                    TransportError::InvalidConnection(format!("Invalid baud rate: {}", baud_str))
                })?;
                Ok(HostConnection::Serial {
                    device: device.to_string(),
                    baud: Some(baud),
                })
            } else {
                Ok(HostConnection::Serial {
                    device: dev.to_string(),
                    baud: None,
                })
            }
        } else if let Some(ip) = s.strip_prefix("ip=") {
            let (host, port_str) = ip.rsplit_once(':').ok_or_else(|| {
                TransportError::InvalidConnection("Missing port in ip= parameter".to_string())
            })?;
            let port = port_str.parse().map_err(|_| {
                TransportError::InvalidConnection(format!("Invalid port: {}", port_str))
            })?;
            Ok(HostConnection::Tcp {
                host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
                port,
            })
        } else {
            Err(TransportError::InvalidConnection(format!(
                "{}. Use dev=... or ip=...",
                s
            )))
        }
    }
}

impl std::str::FromStr for HostConnection {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serial() {
        assert_eq!(
            HostConnection::parse("dev=/dev/ttyACM0").unwrap(),
            HostConnection::Serial {
                device: "/dev/ttyACM0".to_string(),
                baud: None
            }
        );
        assert_eq!(
            HostConnection::parse("dev=/dev/ttyACM0:57600").unwrap(),
            HostConnection::Serial {
                device: "/dev/ttyACM0".to_string(),
                baud: Some(57600)
            }
        );
        assert!(HostConnection::parse("dev=/dev/ttyACM0:fast").is_err());
    }

    #[test]
    fn test_parse_tcp() {
        assert_eq!(
            "ip=0.0.0.0:4590".parse::<HostConnection>().unwrap(),
            HostConnection::Tcp {
                host: "0.0.0.0".to_string(),
                port: 4590
            }
        );
        assert_eq!(
            HostConnection::parse("ip=[::1]:4590").unwrap(),
            HostConnection::Tcp {
                host: "::1".to_string(),
                port: 4590
            }
        );
        assert!(HostConnection::parse("ip=localhost").is_err());
        assert!(HostConnection::parse("ip=localhost:99999").is_err());
    }

    #[test]
    fn test_parse_unknown_scheme() {
        assert!(matches!(
            HostConnection::parse("/dev/ttyACM0"),
            Err(TransportError::InvalidConnection(_))
        ));
    }
}
