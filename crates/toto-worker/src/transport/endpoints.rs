//! Bound pull (inbound) and push (outbound) queue endpoints.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use toto_config::Endpoint;
use toto_envelope::{FramePoll, FrameReader, write_frame};

use super::{
    ConnectionHandler, ConnectionStream, ListenerHandle, SocketListener, TRANSPORT_TARGET,
    TaskQueue, TransportError,
};

/// How long connection threads block before re-checking for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Bound endpoint that accepts frames pushed by producers.
///
/// Every connection may push any number of frames; each one is appended to
/// the shared queue in arrival order. Credit frames are ignored.
#[derive(Debug)]
pub struct PullEndpoint {
    bound: BoundEndpoint,
}

impl PullEndpoint {
    /// Binds `endpoint` and starts accepting producers.
    pub fn bind(endpoint: &Endpoint, queue: TaskQueue) -> Result<Self, TransportError> {
        let bound = BoundEndpoint::start(endpoint, |local, stopping| InboundHandler {
            endpoint: local,
            queue,
            stopping,
        })?;
        Ok(Self { bound })
    }

    /// Endpoint actually bound.
    #[must_use]
    pub fn local_endpoint(&self) -> &Endpoint {
        &self.bound.endpoint
    }

    /// Stops accepting producers and waits for the accept loop to exit.
    pub fn shutdown(self) -> Result<(), TransportError> {
        self.bound.shutdown()
    }
}

/// Bound endpoint that hands queued frames to connected workers.
///
/// A worker receives exactly one frame for each credit it sends, so a frame
/// always goes to a worker that has declared itself idle. A frame whose write
/// fails returns to the head of the queue for the next idle worker.
///
/// Data frames arriving on any connection join the queue, so producers may
/// push to this endpoint directly when no broker fronts it.
#[derive(Debug)]
pub struct PushEndpoint {
    bound: BoundEndpoint,
    queue: TaskQueue,
}

impl PushEndpoint {
    /// Binds `endpoint` and starts serving workers from `queue`.
    pub fn bind(endpoint: &Endpoint, queue: TaskQueue) -> Result<Self, TransportError> {
        let shared = queue.clone();
        let bound = BoundEndpoint::start(endpoint, |local, stopping| OutboundHandler {
            endpoint: local,
            queue: shared,
            stopping,
        })?;
        Ok(Self { bound, queue })
    }

    /// Queue feeding this endpoint.
    #[must_use]
    pub const fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Endpoint actually bound.
    #[must_use]
    pub fn local_endpoint(&self) -> &Endpoint {
        &self.bound.endpoint
    }

    /// Stops serving workers and waits for the accept loop to exit.
    pub fn shutdown(self) -> Result<(), TransportError> {
        self.bound.shutdown()
    }
}

#[derive(Debug)]
struct BoundEndpoint {
    endpoint: Endpoint,
    listener: ListenerHandle,
    stopping: Arc<AtomicBool>,
}

impl BoundEndpoint {
    fn start<H>(
        endpoint: &Endpoint,
        build: impl FnOnce(Endpoint, Arc<AtomicBool>) -> H,
    ) -> Result<Self, TransportError>
    where
        H: ConnectionHandler,
    {
        let listener = SocketListener::bind(endpoint)?;
        let local = listener.local_endpoint().clone();
        let stopping = Arc::new(AtomicBool::new(false));
        let handler = build(local.clone(), Arc::clone(&stopping));
        let listener = listener.start(Arc::new(handler))?;
        Ok(Self {
            endpoint: local,
            listener,
            stopping,
        })
    }

    fn shutdown(self) -> Result<(), TransportError> {
        self.stopping.store(true, Ordering::SeqCst);
        self.listener.stop()?;
        Ok(())
    }
}

struct InboundHandler {
    endpoint: Endpoint,
    queue: TaskQueue,
    stopping: Arc<AtomicBool>,
}

impl ConnectionHandler for InboundHandler {
    fn handle(&self, stream: ConnectionStream) {
        if let Err(error) = stream.set_read_timeout(Some(POLL_INTERVAL)) {
            warn!(target: TRANSPORT_TARGET, endpoint = %self.endpoint, error = %error, "failed to configure producer connection");
            return;
        }
        debug!(target: TRANSPORT_TARGET, endpoint = %self.endpoint, "producer connected");
        let mut reader = FrameReader::new(stream);
        while !self.stopping.load(Ordering::SeqCst) {
            match reader.poll() {
                Ok(FramePoll::Frame(frame)) => self.queue.push(frame),
                Ok(FramePoll::Credit | FramePoll::Pending) => {}
                Ok(FramePoll::Closed) => {
                    debug!(target: TRANSPORT_TARGET, endpoint = %self.endpoint, "producer disconnected");
                    return;
                }
                Err(error) => {
                    warn!(target: TRANSPORT_TARGET, endpoint = %self.endpoint, error = %error, "dropping producer connection");
                    return;
                }
            }
        }
    }
}

struct OutboundHandler {
    endpoint: Endpoint,
    queue: TaskQueue,
    stopping: Arc<AtomicBool>,
}

impl OutboundHandler {
    /// Writes the next queued frame once one arrives; `false` ends the connection.
    fn deliver_one(&self, writer: &mut ConnectionStream) -> bool {
        while !self.stopping.load(Ordering::SeqCst) {
            let Some(frame) = self.queue.pop_timeout(POLL_INTERVAL) else {
                continue;
            };
            return match write_frame(writer, &frame) {
                Ok(()) => true,
                Err(error) => {
                    self.queue.requeue(frame);
                    warn!(target: TRANSPORT_TARGET, endpoint = %self.endpoint, error = %error, "worker went away; task requeued");
                    false
                }
            };
        }
        false
    }
}

impl ConnectionHandler for OutboundHandler {
    fn handle(&self, stream: ConnectionStream) {
        let reader = stream
            .set_read_timeout(Some(POLL_INTERVAL))
            .and_then(|()| stream.try_clone());
        let mut reader = match reader {
            Ok(clone) => FrameReader::new(clone),
            Err(error) => {
                warn!(target: TRANSPORT_TARGET, endpoint = %self.endpoint, error = %error, "failed to configure worker connection");
                return;
            }
        };
        let mut writer = stream;
        debug!(target: TRANSPORT_TARGET, endpoint = %self.endpoint, "peer connected");
        while !self.stopping.load(Ordering::SeqCst) {
            match reader.poll() {
                Ok(FramePoll::Credit) => {
                    if !self.deliver_one(&mut writer) {
                        return;
                    }
                }
                Ok(FramePoll::Frame(frame)) => {
                    debug!(target: TRANSPORT_TARGET, endpoint = %self.endpoint, "task pushed straight to the queue");
                    self.queue.push(frame);
                }
                Ok(FramePoll::Pending) => {}
                Ok(FramePoll::Closed) => {
                    debug!(target: TRANSPORT_TARGET, endpoint = %self.endpoint, "peer disconnected");
                    return;
                }
                Err(error) => {
                    warn!(target: TRANSPORT_TARGET, endpoint = %self.endpoint, error = %error, "dropping worker connection");
                    return;
                }
            }
        }
    }
}
