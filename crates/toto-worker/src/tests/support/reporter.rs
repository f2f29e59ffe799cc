//! Test double for [`HealthReporter`] that records structured events for assertions.
//!
//! The recorder captures the lifecycle telemetry emitted during bootstrap and
//! pool supervision so tests can validate observable events.

use std::process::ExitStatus;
use std::sync::Mutex;

use toto_config::{Config, Endpoint};

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;
use crate::process::ProcessRole;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HealthEvent {
    /// Bootstrap started.
    BootstrapStarting,
    /// Bootstrap completed successfully.
    BootstrapSucceeded,
    /// Bootstrap failed with an error description.
    BootstrapFailed(String),
    /// A child process was spawned.
    ProcessSpawned(ProcessRole, u32),
    /// A child process exited.
    ProcessExited {
        role: ProcessRole,
        pid: u32,
        expected: bool,
    },
    /// The broker bound its endpoints.
    BrokerListening { inbound: Endpoint, queue: Endpoint },
    /// The pool reaped its children.
    PoolStopped(usize),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    pub fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn process_spawned(&self, role: ProcessRole, pid: u32) {
        self.record(HealthEvent::ProcessSpawned(role, pid));
    }

    fn process_exited(&self, role: ProcessRole, pid: u32, _status: ExitStatus, expected: bool) {
        self.record(HealthEvent::ProcessExited {
            role,
            pid,
            expected,
        });
    }

    fn broker_listening(&self, inbound: &Endpoint, queue: &Endpoint) {
        self.record(HealthEvent::BrokerListening {
            inbound: inbound.clone(),
            queue: queue.clone(),
        });
    }

    fn pool_stopped(&self, spawned: usize) {
        self.record(HealthEvent::PoolStopped(spawned));
    }
}
