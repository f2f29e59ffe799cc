//! Error types for queue transport operations.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use toto_envelope::{EncodeError, FrameError};

/// Errors surfaced while binding or running a socket listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Resolving a TCP host failed.
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The TCP host resolved to no addresses.
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
    },
    /// Binding a TCP listener failed.
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        /// Resolved address.
        addr: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Switching the listener to non-blocking mode failed.
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Preparing the socket directory failed.
    #[error("failed to prepare socket directory for {endpoint}: {source}")]
    Prepare {
        /// Endpoint being bound.
        endpoint: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Binding a Unix listener failed.
    #[error("failed to bind unix listener at {path}: {source}")]
    BindUnix {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A live process already listens on the socket path.
    #[error("existing unix socket {path} is already in use")]
    UnixInUse {
        /// Socket path.
        path: String,
    },
    /// The socket path exists but is not a socket.
    #[error("unix socket path {path} is not a socket")]
    UnixNotSocket {
        /// Socket path.
        path: String,
    },
    /// Reading socket metadata failed.
    #[error("failed to read metadata for unix socket {path}: {source}")]
    UnixMetadata {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Probing an existing socket failed unexpectedly.
    #[error("failed to connect to existing unix socket {path}: {source}")]
    UnixConnect {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Removing a stale socket failed.
    #[error("failed to remove stale unix socket {path}: {source}")]
    UnixCleanup {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The accept thread could not be spawned.
    #[error("failed to spawn accept thread for {endpoint}: {source}")]
    Spawn {
        /// Endpoint being served.
        endpoint: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The accept loop panicked.
    #[error("listener thread panicked")]
    ThreadPanic,
}

/// Errors surfaced by queue connections and endpoints.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connecting to an endpoint failed.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        /// Target endpoint.
        endpoint: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Configuring socket options failed.
    #[error("failed to configure connection to {endpoint}: {source}")]
    Configure {
        /// Target endpoint.
        endpoint: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The peer closed the connection.
    #[error("connection to {endpoint} closed by peer")]
    Closed {
        /// Target endpoint.
        endpoint: String,
    },
    /// Reading or writing a frame failed.
    #[error("frame transport failed: {0}")]
    Frame(#[from] FrameError),
    /// Encoding an outbound envelope failed.
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// Binding or running a listener failed.
    #[error(transparent)]
    Listener(#[from] ListenerError),
}
