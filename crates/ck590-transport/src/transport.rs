//! Byte pipes to the host
//!
//! Every transport implements the `embedded_io` traits the kit reads and
//! writes through, with one convention on top: a read that sees nothing
//! within [`POLL_TIMEOUT`] returns 0 so the kit can run its periodic work,
//! and a host that is gone shows up as [`TransportError::Closed`].

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::{Result, TransportError};

/// How long a read waits for host bytes before returning 0
pub const POLL_TIMEOUT: Duration = Duration::from_millis(50);

fn timed_out(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}

pub mod serial {
    //! Serial port transport implementation

    use super::*;
    use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

    /// Baud rate used when the connection string names none
    pub const DEFAULT_BAUD: u32 = 115_200;

    /// Serial port transport
    pub struct SerialTransport {
        port: Box<dyn SerialPort>,
    }

    impl SerialTransport {
        /// Open a serial port with the specified baud rate
        pub fn open(device: &str, baud: Option<u32>) -> Result<Self> {
            let baud_rate = baud.unwrap_or(DEFAULT_BAUD);

            let port = serialport::new(device, baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(POLL_TIMEOUT)
                .open()?;

            log::info!("Opened serial port {} at {} baud", device, baud_rate);

            Ok(Self { port })
        }
    }

    impl embedded_io::ErrorType for SerialTransport {
        type Error = TransportError;
    }

    impl embedded_io::Read for SerialTransport {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            match self.port.read(buf) {
                Ok(n) => Ok(n),
                Err(e) if timed_out(&e) => Ok(0),
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    Err(TransportError::Closed)
                }
                Err(e) => Err(e.into()),
            }
        }
    }

    impl embedded_io::Write for SerialTransport {
        fn write(&mut self, buf: &[u8]) -> Result<usize> {
            self.port.write_all(buf)?;
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<()> {
            self.port.flush()?;
            Ok(())
        }
    }
}

pub mod tcp {
    //! TCP socket transport implementation
    //!
    //! The kit is the server: [`TcpServer`] listens and hands out one
    //! [`TcpTransport`] per accepted host.

    use super::*;
    use std::net::{SocketAddr, TcpListener, TcpStream};

    /// Listening socket
    pub struct TcpServer {
        listener: TcpListener,
    }

    impl TcpServer {
        /// Listen on `host:port`; port 0 picks a free one
        pub fn bind(host: &str, port: u16) -> Result<Self> {
            let listener = TcpListener::bind((host, port))?;
            log::info!("Listening on {}", listener.local_addr()?);
            Ok(Self { listener })
        }

        /// Address actually bound
        pub fn local_addr(&self) -> Result<SocketAddr> {
            Ok(self.listener.local_addr()?)
        }

        /// Wait for the next host
        pub fn accept(&self) -> Result<TcpTransport> {
            let (stream, peer) = self.listener.accept()?;
            log::info!("Host connected from {}", peer);
            TcpTransport::new(stream)
        }
    }

    /// TCP socket transport
    pub struct TcpTransport {
        stream: TcpStream,
    }

    impl TcpTransport {
        /// Wrap a connected stream
        pub fn new(stream: TcpStream) -> Result<Self> {
            // Set TCP_NODELAY to reduce latency
            stream.set_nodelay(true)?;
            stream.set_read_timeout(Some(POLL_TIMEOUT))?;
            Ok(Self { stream })
        }
    }

    impl embedded_io::ErrorType for TcpTransport {
        type Error = TransportError;
    }

    impl embedded_io::Read for TcpTransport {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            if buf.is_empty() {
                return Ok(0);
            }
            match self.stream.read(buf) {
                Ok(0) => Err(TransportError::Closed),
                Ok(n) => Ok(n),
                Err(e) if timed_out(&e) => Ok(0),
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                    Err(TransportError::Closed)
                }
                Err(e) => Err(e.into()),
            }
        }
    }

    impl embedded_io::Write for TcpTransport {
        fn write(&mut self, buf: &[u8]) -> Result<usize> {
            self.stream.write_all(buf)?;
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<()> {
            self.stream.flush()?;
            Ok(())
        }
    }
}

pub mod stdio {
    //! Standard input and output
    //!
    //! Stdin has no read timeout, so a reader thread forwards chunks over
    //! a channel and [`StdioTransport`] waits on the channel instead.

    use super::*;
    use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
    use std::thread;

    enum Chunk {
        Data(Vec<u8>),
        Failed(std::io::Error),
    }

    /// Stdin/stdout transport
    pub struct StdioTransport {
        rx: Receiver<Chunk>,
        pending: Vec<u8>,
        stdout: std::io::Stdout,
    }

    impl StdioTransport {
        /// Start the stdin reader thread
        pub fn open() -> Self {
            let (tx, rx) = mpsc::channel();
            thread::spawn(move || {
                let mut stdin = std::io::stdin().lock();
                let mut buf = [0u8; 256];
                loop {
                    let chunk = match stdin.read(&mut buf) {
                        // EOF: dropping the sender closes the channel
                        Ok(0) => break,
                        Ok(n) => Chunk::Data(buf[..n].to_vec()),
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => Chunk::Failed(e),
                    };
                    let failed = matches!(chunk, Chunk::Failed(_));
                    if tx.send(chunk).is_err() || failed {
                        break;
                    }
                }
                log::debug!("stdin reader finished");
            });
            Self {
                rx,
                pending: Vec::new(),
                stdout: std::io::stdout(),
            }
        }
    }

    impl embedded_io::ErrorType for StdioTransport {
        type Error = TransportError;
    }

    impl embedded_io::Read for StdioTransport {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            if self.pending.is_empty() {
                match self.rx.recv_timeout(POLL_TIMEOUT) {
                    Ok(Chunk::Data(data)) => self.pending = data,
                    Ok(Chunk::Failed(e)) => return Err(e.into()),
                    Err(RecvTimeoutError::Timeout) => return Ok(0),
                    Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Closed),
                }
            }
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            Ok(n)
        }
    }

    impl embedded_io::Write for StdioTransport {
        fn write(&mut self, buf: &[u8]) -> Result<usize> {
            self.stdout.write_all(buf)?;
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<()> {
            self.stdout.flush()?;
            Ok(())
        }
    }
}
