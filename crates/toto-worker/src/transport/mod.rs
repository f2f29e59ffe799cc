//! Queue transport shared by the broker, workers, and producers.
//!
//! Connections carry length-prefixed frames from [`toto_envelope`]. A bound
//! [`PullEndpoint`] accepts frames pushed by any number of producers and
//! appends them to a [`TaskQueue`]; a bound [`PushEndpoint`] hands queued
//! frames out to connected workers, one frame per credit each worker sends.
//! Together they give the push/pull semantics the broker relays between.

mod connection;
mod endpoints;
mod errors;
mod listener;
mod queue;
mod stream;

pub use self::connection::{QueueConnection, Received};
pub use self::endpoints::{PullEndpoint, PushEndpoint};
pub use self::errors::{ListenerError, TransportError};
pub use self::queue::TaskQueue;
pub use self::stream::ConnectionStream;
pub(crate) use self::listener::{ConnectionHandler, ListenerHandle, SocketListener};

pub(crate) const TRANSPORT_TARGET: &str = concat!(env!("CARGO_CRATE_NAME"), "::transport");
