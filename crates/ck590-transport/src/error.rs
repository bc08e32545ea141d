//! Error types for host transports

use thiserror::Error;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection string could not be parsed
    #[error("Invalid connection string: {0}")]
    InvalidConnection(String),

    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error during communication
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The host went away
    #[error("Host closed the connection")]
    Closed,
}

impl embedded_io::Error for TransportError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Self::Closed => embedded_io::ErrorKind::ConnectionReset,
            Self::InvalidConnection(_) => embedded_io::ErrorKind::InvalidInput,
            Self::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                embedded_io::ErrorKind::TimedOut
            }
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;
