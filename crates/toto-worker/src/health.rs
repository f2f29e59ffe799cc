//! Structured health reporting for pool lifecycle events.

use std::process::ExitStatus;
use std::sync::Arc;

use toto_config::{Config, Endpoint};

use crate::bootstrap::BootstrapError;
use crate::process::ProcessRole;

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked after the pool has spawned a child process.
    fn process_spawned(&self, role: ProcessRole, pid: u32);

    /// Invoked when a child process exits, whether requested or not.
    fn process_exited(&self, role: ProcessRole, pid: u32, status: ExitStatus, expected: bool);

    /// Invoked once the broker relay has bound both endpoints.
    fn broker_listening(&self, inbound: &Endpoint, queue: &Endpoint);

    /// Invoked after every child of the pool has been reaped.
    fn pool_stopped(&self, spawned: usize);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn process_spawned(&self, role: ProcessRole, pid: u32) {
        (**self).process_spawned(role, pid);
    }

    fn process_exited(&self, role: ProcessRole, pid: u32, status: ExitStatus, expected: bool) {
        (**self).process_exited(role, pid, status, expected);
    }

    fn broker_listening(&self, inbound: &Endpoint, queue: &Endpoint) {
        (**self).broker_listening(inbound, queue);
    }

    fn pool_stopped(&self, spawned: usize) {
        (**self).pool_stopped(spawned);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: "toto_worker::health",
            event = "bootstrap_starting",
            "loading worker service configuration"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: "toto_worker::health",
            event = "bootstrap_succeeded",
            inbound = %config.worker_address(),
            queue = %config.worker_socket_address(),
            processes = config.processes(),
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            "worker service configured"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: "toto_worker::health",
            event = "bootstrap_failed",
            error = %error,
            "worker service bootstrap failed"
        );
    }

    fn process_spawned(&self, role: ProcessRole, pid: u32) {
        tracing::info!(
            target: "toto_worker::health",
            event = "process_spawned",
            role = %role,
            pid,
            "spawned child process"
        );
    }

    fn process_exited(&self, role: ProcessRole, pid: u32, status: ExitStatus, expected: bool) {
        if expected {
            tracing::info!(
                target: "toto_worker::health",
                event = "process_exited",
                role = %role,
                pid,
                status = %status,
                "child process stopped"
            );
        } else {
            tracing::warn!(
                target: "toto_worker::health",
                event = "process_exited",
                role = %role,
                pid,
                status = %status,
                "child process exited unexpectedly and will not be restarted"
            );
        }
    }

    fn broker_listening(&self, inbound: &Endpoint, queue: &Endpoint) {
        tracing::info!(
            target: "toto_worker::health",
            event = "broker_listening",
            inbound = %inbound,
            queue = %queue,
            "broker relay listening"
        );
    }

    fn pool_stopped(&self, spawned: usize) {
        tracing::info!(
            target: "toto_worker::health",
            event = "pool_stopped",
            spawned,
            "worker pool stopped"
        );
    }
}
