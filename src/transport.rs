//! The network capability the prober needs, so probes can run against
//! in-memory streams as well as real sockets.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::backend::Backend;

/// Opens a byte stream to a backend.
pub trait Connector {
    type Conn: Read + Write;

    fn connect(&self, backend: &Backend) -> io::Result<Self::Conn>;
}

/// Plain TCP with a bound on both connecting and waiting for data, so a
/// backend that stops sending cannot stall a ranking pass forever.
#[derive(Clone, Debug)]
pub struct TcpConnector {
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(timeout: Duration) -> Self {
        TcpConnector { timeout }
    }
}

impl Connector for TcpConnector {
    type Conn = TcpStream;

    fn connect(&self, backend: &Backend) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in (backend.host.as_str(), backend.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.timeout))?;
                    stream.set_write_timeout(Some(self.timeout))?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{} did not resolve to any address", backend),
            )
        }))
    }
}
