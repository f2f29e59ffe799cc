use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::flag;
use tracing::debug;

use super::PROCESS_TARGET;
use super::errors::ShutdownError;

/// Cooperative shutdown flag shared by every loop in a process.
///
/// Loops poll the flag between bounded waits; nothing is interrupted
/// mid-task, so an in-flight handler always runs to completion.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    requested: Arc<AtomicBool>,
}

impl ShutdownFlag {
    /// Creates a flag that only [`ShutdownFlag::trigger`] can set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a flag set by `SIGTERM`, `SIGINT`, `SIGQUIT` or `SIGHUP`.
    pub fn install() -> Result<Self, ShutdownError> {
        let shutdown = Self::new();
        for signal in [SIGTERM, SIGINT, SIGQUIT, SIGHUP] {
            flag::register(signal, Arc::clone(&shutdown.requested))
                .map_err(|source: io::Error| ShutdownError::Install { signal, source })?;
        }
        debug!(target: PROCESS_TARGET, "shutdown signal handlers installed");
        Ok(shutdown)
    }

    /// Requests shutdown.
    pub fn trigger(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
