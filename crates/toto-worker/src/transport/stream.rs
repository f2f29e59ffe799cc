//! Byte streams carried over TCP or Unix domain sockets.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use tracing::warn;

use toto_config::Endpoint;

use super::{TRANSPORT_TARGET, TransportError};

/// A connected socket of either supported family.
#[derive(Debug)]
pub enum ConnectionStream {
    /// TCP connection.
    Tcp(TcpStream),
    /// Unix domain socket connection.
    Unix(UnixStream),
}

impl ConnectionStream {
    /// Connects to `endpoint`.
    pub fn connect(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let result = match endpoint {
            Endpoint::Tcp { host, port } => {
                TcpStream::connect((connect_host(host), *port)).map(Self::Tcp)
            }
            Endpoint::Unix { path } => UnixStream::connect(path.as_std_path()).map(Self::Unix),
        };
        result.map_err(|source| TransportError::Connect {
            endpoint: endpoint.to_string(),
            source,
        })
    }

    /// Sets the read timeout; `None` blocks indefinitely.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.set_read_timeout(timeout),
            Self::Unix(stream) => stream.set_read_timeout(timeout),
        }
    }

    /// Clones the underlying socket handle.
    pub fn try_clone(&self) -> io::Result<Self> {
        match self {
            Self::Tcp(stream) => stream.try_clone().map(Self::Tcp),
            Self::Unix(stream) => stream.try_clone().map(Self::Unix),
        }
    }

    /// Shuts down both halves of the connection.
    pub fn shutdown(&self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.shutdown(Shutdown::Both),
            Self::Unix(stream) => stream.shutdown(Shutdown::Both),
        }
    }

    /// Shuts the connection down on drop paths, where failure cannot be
    /// returned. A peer that already disconnected is not worth a warning.
    pub fn close(&self, endpoint: &Endpoint) {
        match self.shutdown() {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotConnected => {}
            Err(error) => {
                warn!(target: TRANSPORT_TARGET, endpoint = %endpoint, error = %error, "failed to close connection");
            }
        }
    }
}

/// Maps wildcard bind hosts onto an address a client can reach.
fn connect_host(host: &str) -> &str {
    match host {
        "0.0.0.0" => "127.0.0.1",
        "::" => "::1",
        other => other,
    }
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ConnectionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            Self::Unix(stream) => stream.flush(),
        }
    }
}
