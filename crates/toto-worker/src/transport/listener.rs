//! Accept loop shared by the bound queue endpoints.
//!
//! Each accepted peer (a producer on the inbound side, a worker on the queue
//! side) is served on its own thread until it disconnects. The accept socket
//! is non-blocking and polled, so stopping never waits on a peer.

use std::fs;
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use toto_config::Endpoint;

use super::{ConnectionStream, ListenerError, TRANSPORT_TARGET};

const IDLE_POLL: Duration = Duration::from_millis(25);
const FAILURE_POLL: Duration = Duration::from_millis(150);

/// Serves one accepted peer; runs on a dedicated thread.
pub(crate) trait ConnectionHandler: Send + Sync + 'static {
    /// Serves `stream` until the peer goes away. Must not panic.
    fn handle(&self, stream: ConnectionStream);
}

/// A bound but not yet accepting socket.
#[derive(Debug)]
pub(crate) struct SocketListener {
    endpoint: Endpoint,
    socket: BoundSocket,
}

#[derive(Debug)]
enum BoundSocket {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl BoundSocket {
    fn set_nonblocking(&self) -> io::Result<()> {
        match self {
            Self::Tcp(listener) => listener.set_nonblocking(true),
            Self::Unix(listener) => listener.set_nonblocking(true),
        }
    }

    /// Returns the next pending peer, or `None` when nobody is waiting.
    fn accept(&self) -> io::Result<Option<ConnectionStream>> {
        let accepted = match self {
            Self::Tcp(listener) => listener.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                stream.set_nodelay(true)?;
                Ok(ConnectionStream::Tcp(stream))
            }),
            Self::Unix(listener) => listener.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                Ok(ConnectionStream::Unix(stream))
            }),
        };
        match accepted {
            Ok(stream) => Ok(Some(stream)),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        }
    }
}

impl SocketListener {
    /// Binds `endpoint`, reclaiming a stale Unix socket file if one is left.
    pub(crate) fn bind(endpoint: &Endpoint) -> Result<Self, ListenerError> {
        match endpoint {
            Endpoint::Tcp { host, port } => {
                let listener = bind_tcp(host, *port)?;
                // Port 0 asks the kernel for a port; record the one it chose.
                let endpoint = listener.local_addr().map_or_else(
                    |_| endpoint.clone(),
                    |addr| Endpoint::tcp(host.clone(), addr.port()),
                );
                Ok(Self {
                    endpoint,
                    socket: BoundSocket::Tcp(listener),
                })
            }
            Endpoint::Unix { path } => {
                endpoint
                    .prepare_filesystem()
                    .map_err(|source| ListenerError::Prepare {
                        endpoint: endpoint.to_string(),
                        source,
                    })?;
                let path = path.as_std_path();
                reclaim_stale_socket(path)?;
                let listener = UnixListener::bind(path).map_err(|source| {
                    ListenerError::BindUnix {
                        path: path.display().to_string(),
                        source,
                    }
                })?;
                Ok(Self {
                    endpoint: endpoint.clone(),
                    socket: BoundSocket::Unix(listener),
                })
            }
        }
    }

    /// Endpoint actually bound, including any kernel-assigned TCP port.
    pub(crate) fn local_endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Starts accepting on a background thread.
    pub(crate) fn start(
        self,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        if let Err(source) = self.socket.set_nonblocking() {
            remove_socket_file(&self.endpoint);
            return Err(ListenerError::NonBlocking { source });
        }
        let stopping = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stopping);
        let endpoint = self.endpoint.to_string();
        let thread = thread::Builder::new()
            .name(format!("accept {endpoint}"))
            .spawn(move || self.accept_until(&flag, &handler))
            .map_err(|source| ListenerError::Spawn { endpoint, source })?;
        Ok(ListenerHandle {
            stopping,
            thread: Some(thread),
        })
    }

    fn accept_until(self, stopping: &AtomicBool, handler: &Arc<dyn ConnectionHandler>) {
        info!(target: TRANSPORT_TARGET, endpoint = %self.endpoint, "accepting connections");
        let mut reported = None::<io::ErrorKind>;
        while !stopping.load(Ordering::SeqCst) {
            match self.socket.accept() {
                Ok(Some(stream)) => {
                    reported = None;
                    self.serve(stream, handler);
                }
                Ok(None) => thread::sleep(IDLE_POLL),
                Err(error) => {
                    // Persistent failures repeat every poll; log each kind once.
                    if reported != Some(error.kind()) {
                        warn!(target: TRANSPORT_TARGET, endpoint = %self.endpoint, error = %error, "accept failed");
                    }
                    reported = Some(error.kind());
                    thread::sleep(FAILURE_POLL);
                }
            }
        }
        remove_socket_file(&self.endpoint);
        debug!(target: TRANSPORT_TARGET, endpoint = %self.endpoint, "accept loop stopped");
    }

    fn serve(&self, stream: ConnectionStream, handler: &Arc<dyn ConnectionHandler>) {
        let handler = Arc::clone(handler);
        let spawned = thread::Builder::new()
            .name(format!("peer {}", self.endpoint))
            .spawn(move || handler.handle(stream));
        if let Err(error) = spawned {
            warn!(target: TRANSPORT_TARGET, endpoint = %self.endpoint, error = %error, "dropping peer; no thread to serve it");
        }
    }
}

/// Owns the accept thread; dropping it stops the loop without waiting.
#[derive(Debug)]
pub(crate) struct ListenerHandle {
    stopping: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Stops accepting and waits for the accept thread to exit.
    ///
    /// Peers already being served keep their threads until they disconnect.
    pub(crate) fn stop(mut self) -> Result<(), ListenerError> {
        self.stopping.store(true, Ordering::SeqCst);
        self.thread
            .take()
            .map_or(Ok(()), |thread| thread.join().map_err(|_| ListenerError::ThreadPanic))
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| ListenerError::ResolveEmpty {
            host: host.to_owned(),
            port,
        })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}

/// Removes a socket file left by a process that no longer listens on it.
///
/// A socket somebody still answers on is refused rather than stolen, and a
/// path that is not a socket at all is never deleted.
fn reclaim_stale_socket(path: &Path) -> Result<(), ListenerError> {
    let display = || path.display().to_string();
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(ListenerError::UnixMetadata {
                path: display(),
                source,
            });
        }
    };
    if !metadata.file_type().is_socket() {
        return Err(ListenerError::UnixNotSocket { path: display() });
    }
    match UnixStream::connect(path) {
        Ok(_) => Err(ListenerError::UnixInUse { path: display() }),
        Err(error)
            if matches!(
                error.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) =>
        {
            debug!(target: TRANSPORT_TARGET, path = %path.display(), "removing stale socket");
            fs::remove_file(path).map_err(|source| ListenerError::UnixCleanup {
                path: display(),
                source,
            })
        }
        Err(source) => Err(ListenerError::UnixConnect {
            path: display(),
            source,
        }),
    }
}

fn remove_socket_file(endpoint: &Endpoint) {
    let Some(path) = endpoint.unix_path() else {
        return;
    };
    if let Err(error) = fs::remove_file(path.as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(target: TRANSPORT_TARGET, path = %path, error = %error, "failed to remove socket file");
    }
}
