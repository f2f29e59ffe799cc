//! Client for submitting tasks to a broker or directly to a queue endpoint.

use serde_json::Value;
use tracing::debug;

use toto_config::Endpoint;
use toto_envelope::{encode, write_frame};

use crate::transport::{ConnectionStream, TransportError};

const PRODUCER_TARGET: &str = concat!(env!("CARGO_CRATE_NAME"), "::producer");

/// Pushes encoded envelopes over one connection, in order.
#[derive(Debug)]
pub struct TaskProducer {
    endpoint: Endpoint,
    stream: ConnectionStream,
}

impl TaskProducer {
    /// Connects to the broker's inbound endpoint, or to the queue endpoint
    /// when no broker runs.
    pub fn connect(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let stream = ConnectionStream::connect(endpoint)?;
        Ok(Self {
            endpoint: endpoint.clone(),
            stream,
        })
    }

    /// Endpoint this producer pushes to.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Encodes and submits one task.
    pub fn send(&mut self, method: &str, parameters: &Value) -> Result<(), TransportError> {
        let frame = encode(method, parameters)?;
        write_frame(&mut self.stream, &frame)?;
        debug!(target: PRODUCER_TARGET, endpoint = %self.endpoint, method, bytes = frame.len(), "task submitted");
        Ok(())
    }
}

impl Drop for TaskProducer {
    fn drop(&mut self) {
        self.stream.close(&self.endpoint);
    }
}
