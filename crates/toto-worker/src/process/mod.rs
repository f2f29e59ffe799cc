//! Process roles, signal handling, daemonisation and lifecycle commands.

use std::env;
use std::fmt;
use std::time::Duration;

pub(crate) mod daemonizer;
mod errors;
pub(crate) mod launch;
mod pidfiles;
pub(crate) mod shutdown;
pub(crate) mod supervisor;

pub use daemonizer::{Daemonizer, SystemDaemonizer};
pub use errors::{DaemonizeError, LaunchError, ShutdownError, SupervisorError};
pub use launch::run;
pub(crate) use pidfiles::write_pid;
pub use shutdown::ShutdownFlag;
pub use supervisor::{LifecycleOutcome, StopReport, Supervisor};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_CRATE_NAME"), "::process");

/// How long `stop` waits for signalled processes to exit.
pub(crate) const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variable naming the role of a re-executed child process.
pub const ROLE_ENV_VAR: &str = "TOTO_PROCESS_ROLE";

/// Environment variable carrying the parent's resolved configuration as JSON.
pub const CONFIG_ENV_VAR: &str = "TOTO_PROCESS_CONFIG";

/// Environment variable carrying a worker's pool index.
pub const WORKER_INDEX_ENV_VAR: &str = "TOTO_WORKER_INDEX";

/// Part a process plays in the service's process tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessRole {
    /// Operator invocation that interprets the lifecycle command.
    Controller,
    /// Detached process that owns the pool and its pidfiles.
    Supervisor,
    /// Task consumer.
    Worker,
    /// Inbound-to-queue relay.
    Broker,
}

impl ProcessRole {
    /// Value stored in [`ROLE_ENV_VAR`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Controller => "controller",
            Self::Supervisor => "supervisor",
            Self::Worker => "worker",
            Self::Broker => "broker",
        }
    }

    /// Role of the current process, read from [`ROLE_ENV_VAR`].
    ///
    /// A missing or unrecognised value means the process was started by an
    /// operator.
    #[must_use]
    pub fn detect() -> Self {
        match env::var(ROLE_ENV_VAR).as_deref() {
            Ok("supervisor") => Self::Supervisor,
            Ok("worker") => Self::Worker,
            Ok("broker") => Self::Broker,
            _ => Self::Controller,
        }
    }
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
