//! Worker-side connection to a push endpoint.

use std::time::Duration;

use toto_config::Endpoint;
use toto_envelope::{FramePoll, FrameReader, write_credit};

use super::{ConnectionStream, TransportError};

/// Outcome of one receive attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// An encoded task arrived.
    Task(Vec<u8>),
    /// Nothing arrived before the poll interval elapsed.
    Idle,
}

/// Connection a worker uses to pull tasks one at a time.
///
/// The connection keeps at most one credit outstanding: a credit is sent
/// before waiting and the next one only after a task has been taken, so the
/// endpoint never hands this worker more than it is processing.
#[derive(Debug)]
pub struct QueueConnection {
    endpoint: Endpoint,
    reader: FrameReader<ConnectionStream>,
    writer: ConnectionStream,
    credit_outstanding: bool,
}

impl QueueConnection {
    /// Connects to `endpoint`; receives block for at most `poll_interval`.
    pub fn connect(endpoint: &Endpoint, poll_interval: Duration) -> Result<Self, TransportError> {
        let writer = ConnectionStream::connect(endpoint)?;
        let configure = |source| TransportError::Configure {
            endpoint: endpoint.to_string(),
            source,
        };
        writer
            .set_read_timeout(Some(poll_interval))
            .map_err(configure)?;
        let reader = writer.try_clone().map_err(configure)?;
        Ok(Self {
            endpoint: endpoint.clone(),
            reader: FrameReader::new(reader),
            writer,
            credit_outstanding: false,
        })
    }

    /// Endpoint this connection pulls from.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Announces readiness if needed, then waits one poll interval for a task.
    pub fn receive(&mut self) -> Result<Received, TransportError> {
        if !self.credit_outstanding {
            write_credit(&mut self.writer)?;
            self.credit_outstanding = true;
        }
        match self.reader.poll()? {
            FramePoll::Frame(frame) => {
                self.credit_outstanding = false;
                Ok(Received::Task(frame))
            }
            FramePoll::Credit | FramePoll::Pending => Ok(Received::Idle),
            FramePoll::Closed => Err(TransportError::Closed {
                endpoint: self.endpoint.to_string(),
            }),
        }
    }
}

impl Drop for QueueConnection {
    fn drop(&mut self) {
        self.writer.close(&self.endpoint);
    }
}
