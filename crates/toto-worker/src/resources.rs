//! Per-process collaborators handed to handlers: storage and remote events.
//!
//! Each worker process builds its own database connection and event manager
//! after it starts; neither is ever shared between processes.

use std::any::Any;
use std::fmt;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use toto_config::{Config, Endpoint, EndpointParseError};
use toto_envelope::{encode, write_frame};

use crate::transport::{ConnectionStream, TransportError};

const RESOURCES_TARGET: &str = concat!(env!("CARGO_CRATE_NAME"), "::resources");

/// An open connection to the application's storage backend.
///
/// The worker treats connections as opaque; handlers downcast through
/// [`DatabaseConnection::as_any`] to the concrete driver type they expect.
pub trait DatabaseConnection: Send + Sync + fmt::Debug {
    /// Short driver name used in logs.
    fn driver(&self) -> &str;

    /// Access to the concrete connection type.
    fn as_any(&self) -> &dyn Any;
}

/// Opens database connections for worker processes.
pub trait DatabaseConnector: Send + Sync {
    /// Opens a connection using the resolved configuration.
    fn connect(&self, config: &Config) -> Result<Box<dyn DatabaseConnection>, ResourceError>;
}

impl<F> DatabaseConnector for F
where
    F: Fn(&Config) -> Result<Box<dyn DatabaseConnection>, ResourceError> + Send + Sync,
{
    fn connect(&self, config: &Config) -> Result<Box<dyn DatabaseConnection>, ResourceError> {
        self(config)
    }
}

/// Errors raised while building worker resources.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// A database connector failed to connect.
    #[error("database connection failed: {message}")]
    Database {
        /// Driver supplied description.
        message: String,
    },
    /// A remote event receiver address could not be parsed.
    #[error("invalid remote event receiver '{address}': {source}")]
    Receiver {
        /// Configured address.
        address: String,
        /// Parse failure.
        #[source]
        source: EndpointParseError,
    },
}

impl ResourceError {
    /// Builds a database failure from a driver message.
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }
}

/// Client that fans application events out to remote receivers.
///
/// Events travel as ordinary task envelopes whose method is the event name,
/// so a receiver is simply another queue endpoint.
#[derive(Debug, Clone, Default)]
pub struct EventManager {
    receivers: Vec<Endpoint>,
    subscriptions: Vec<String>,
}

impl EventManager {
    /// Creates a manager with no receivers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a manager for every receiver listed in the configuration.
    pub fn from_config(config: &Config) -> Result<Self, ResourceError> {
        let mut manager = Self::new();
        for address in config.remote_event_receivers() {
            let endpoint = address
                .parse()
                .map_err(|source| ResourceError::Receiver {
                    address: address.to_owned(),
                    source,
                })?;
            manager.register_receiver(endpoint);
        }
        Ok(manager)
    }

    /// Adds a remote receiver. Registering the same endpoint twice is a no-op.
    pub fn register_receiver(&mut self, endpoint: Endpoint) {
        if !self.receivers.contains(&endpoint) {
            self.receivers.push(endpoint);
        }
    }

    /// Registered receivers in registration order.
    #[must_use]
    pub fn receivers(&self) -> &[Endpoint] {
        &self.receivers
    }

    /// Records interest in an event name; only subscribed names are published.
    ///
    /// With no subscriptions every event is published.
    pub fn subscribe(&mut self, event: impl Into<String>) {
        let event = event.into();
        if !self.subscriptions.contains(&event) {
            self.subscriptions.push(event);
        }
    }

    /// Whether `event` would be sent to the receivers.
    #[must_use]
    pub fn publishes(&self, event: &str) -> bool {
        self.subscriptions.is_empty() || self.subscriptions.iter().any(|name| name == event)
    }

    /// Sends `event` to every receiver, returning how many accepted it.
    ///
    /// Delivery is best effort: failures are logged and skipped.
    pub fn publish(&self, event: &str, payload: &Value) -> usize {
        if !self.publishes(event) {
            debug!(target: RESOURCES_TARGET, event, "event has no subscribers");
            return 0;
        }
        let frame = match encode(event, payload) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(target: RESOURCES_TARGET, event, error = %error, "failed to encode event");
                return 0;
            }
        };
        self.receivers
            .iter()
            .filter(|receiver| match send_frame(receiver, &frame) {
                Ok(()) => true,
                Err(error) => {
                    warn!(
                        target: RESOURCES_TARGET,
                        event,
                        receiver = %receiver,
                        error = %error,
                        "failed to deliver event"
                    );
                    false
                }
            })
            .count()
    }
}

fn send_frame(receiver: &Endpoint, frame: &[u8]) -> Result<(), TransportError> {
    let mut stream = ConnectionStream::connect(receiver)?;
    write_frame(&mut stream, frame)?;
    Ok(())
}
