//! In-memory capture of the events a test emits.

use std::io;
use std::sync::{Arc, Mutex};

use toto_config::Config;

use crate::telemetry::build_subscriber;

/// Buffer collecting formatted events from a thread-scoped subscriber.
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    /// Runs `body` with the subscriber `config` selects, writing here.
    pub fn record<T>(&self, config: &Config, body: impl FnOnce() -> T) -> T {
        let sink = self.clone();
        let subscriber =
            build_subscriber(config, move || sink.clone(), false).expect("test subscriber");
        tracing::subscriber::with_default(subscriber, body)
    }

    /// Everything written so far.
    #[must_use]
    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().expect("log buffer");
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .map_err(|_| io::Error::other("log buffer poisoned"))?
            .extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
