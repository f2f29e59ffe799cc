//! Relay from the public inbound endpoint to the internal queue endpoint.

use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use toto_config::Endpoint;

use crate::health::HealthReporter;
use crate::process::ShutdownFlag;
use crate::transport::{PullEndpoint, PushEndpoint, TaskQueue, TransportError};

const BROKER_TARGET: &str = concat!(env!("CARGO_CRATE_NAME"), "::broker");

const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// Errors raised while running the relay.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// One of the two endpoints could not be bound.
    #[error("failed to bind broker endpoint {endpoint}: {source}")]
    Bind {
        /// Endpoint that failed.
        endpoint: String,
        /// Transport failure.
        #[source]
        source: TransportError,
    },
    /// Tearing an endpoint down failed.
    #[error("broker shutdown failed: {0}")]
    Shutdown(#[source] TransportError),
}

/// A bound relay: frames accepted inbound leave through the queue endpoint
/// unchanged, one per idle worker.
#[derive(Debug)]
pub struct Broker {
    inbound: PullEndpoint,
    outbound: PushEndpoint,
}

impl Broker {
    /// Binds both endpoints over one shared queue.
    pub fn bind(inbound: &Endpoint, queue: &Endpoint) -> Result<Self, BrokerError> {
        let frames = TaskQueue::new();
        let outbound =
            PushEndpoint::bind(queue, frames.clone()).map_err(|source| BrokerError::Bind {
                endpoint: queue.to_string(),
                source,
            })?;
        let inbound = PullEndpoint::bind(inbound, frames).map_err(|source| BrokerError::Bind {
            endpoint: inbound.to_string(),
            source,
        })?;
        info!(
            target: BROKER_TARGET,
            inbound = %inbound.local_endpoint(),
            queue = %outbound.local_endpoint(),
            "broker bound"
        );
        Ok(Self { inbound, outbound })
    }

    /// Endpoint producers push to.
    #[must_use]
    pub fn inbound_endpoint(&self) -> &Endpoint {
        self.inbound.local_endpoint()
    }

    /// Endpoint workers pull from.
    #[must_use]
    pub fn queue_endpoint(&self) -> &Endpoint {
        self.outbound.local_endpoint()
    }

    /// Frames accepted but not yet handed to a worker.
    #[must_use]
    pub fn backlog(&self) -> usize {
        self.outbound.queue().len()
    }

    /// Relays until `shutdown` is set, then unbinds both endpoints.
    pub fn run(
        self,
        shutdown: &ShutdownFlag,
        reporter: &dyn HealthReporter,
    ) -> Result<(), BrokerError> {
        reporter.broker_listening(self.inbound_endpoint(), self.queue_endpoint());
        while !shutdown.is_set() {
            thread::sleep(SHUTDOWN_POLL);
        }
        self.shutdown()
    }

    /// Unbinds both endpoints. Frames still queued are dropped.
    pub fn shutdown(self) -> Result<(), BrokerError> {
        let backlog = self.backlog();
        self.inbound.shutdown().map_err(BrokerError::Shutdown)?;
        self.outbound.shutdown().map_err(BrokerError::Shutdown)?;
        info!(target: BROKER_TARGET, dropped = backlog, "broker stopped");
        Ok(())
    }
}

/// The queue endpoint on its own, bound by the pool manager when no broker
/// runs.
///
/// Producers push straight to it and workers pull from it, so the service
/// still accepts work with the inbound address disabled.
#[derive(Debug)]
pub struct QueueHost {
    outbound: PushEndpoint,
}

impl QueueHost {
    /// Binds the queue endpoint over a fresh queue.
    pub fn bind(queue: &Endpoint) -> Result<Self, BrokerError> {
        let outbound =
            PushEndpoint::bind(queue, TaskQueue::new()).map_err(|source| BrokerError::Bind {
                endpoint: queue.to_string(),
                source,
            })?;
        info!(target: BROKER_TARGET, queue = %outbound.local_endpoint(), "queue endpoint bound without a broker");
        Ok(Self { outbound })
    }

    /// Endpoint producers push to and workers pull from.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        self.outbound.local_endpoint()
    }

    /// Frames pushed but not yet handed to a worker.
    #[must_use]
    pub fn backlog(&self) -> usize {
        self.outbound.queue().len()
    }

    /// Unbinds the endpoint. Frames still queued are dropped.
    pub fn shutdown(self) -> Result<(), BrokerError> {
        let backlog = self.backlog();
        self.outbound.shutdown().map_err(BrokerError::Shutdown)?;
        info!(target: BROKER_TARGET, dropped = backlog, "queue endpoint unbound");
        Ok(())
    }
}
