//! Defines the error surface for daemonisation, lifecycle commands and launch.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use nix::errno::Errno;
use thiserror::Error;

use toto_config::{EndpointParseError, LifecycleParseError, PidfileLayoutError};

use crate::bootstrap::BootstrapError;
use crate::broker::BrokerError;
use crate::pool::PoolError;
use crate::worker::WorkerError;

/// Errors reported while installing shutdown signal handlers.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Registering a handler failed.
    #[error("failed to install handler for signal {signal}: {source}")]
    Install {
        /// Signal number.
        signal: i32,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Errors surfaced while detaching the supervisor into the background.
#[derive(Debug, Error)]
pub enum DaemonizeError {
    /// The running executable could not be located.
    #[error("failed to locate the current executable: {source}")]
    Executable {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The configuration could not be handed to the detached process.
    #[error("failed to serialise configuration for the detached process: {source}")]
    Configuration {
        /// Underlying serialisation error.
        #[source]
        source: serde_json::Error,
    },
    /// Spawning the detached process failed.
    #[error("failed to spawn detached process: {source}")]
    Spawn {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The configured log file could not be opened.
    #[error("failed to open log file '{path}': {source}")]
    LogFile {
        /// Configured log file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The readiness pipe could not be read.
    #[error("failed to read readiness from detached process: {source}")]
    Readiness {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The detached process exited before announcing readiness.
    #[error("detached process exited before becoming ready ({status})")]
    NotReady {
        /// Exit status of the detached process.
        status: ExitStatus,
    },
}

/// Errors reported by `start`, `stop` and `restart`.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Pidfiles from a previous start are still present.
    #[error("Not starting, pidfile(s) exist(s) at {}", display_paths(.pidfiles))]
    AlreadyRunning {
        /// Pidfiles blocking the start, ordered by index.
        pidfiles: Vec<PathBuf>,
    },
    /// The configured lifecycle command is not recognised.
    #[error("invalid lifecycle command: {source}")]
    InvalidLifecycleCommand {
        /// Parse failure.
        #[source]
        source: LifecycleParseError,
    },
    /// The pidfile base path is unusable.
    #[error(transparent)]
    Layout(#[from] PidfileLayoutError),
    /// A pidfile could not be read.
    #[error("failed to read pidfile '{path}': {source}")]
    PidRead {
        /// Pidfile path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A pidfile does not contain a process identifier.
    #[error("pidfile '{path}' does not contain a process id")]
    PidParse {
        /// Pidfile path.
        path: PathBuf,
    },
    /// Writing a pidfile failed.
    #[error("failed to write pidfile '{path}': {source}")]
    PidWrite {
        /// Pidfile path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Removing a pidfile failed.
    #[error("failed to remove pidfile '{path}': {source}")]
    PidRemove {
        /// Pidfile path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Signalling a recorded process failed for a reason other than it being gone.
    #[error("failed to signal process {pid}: {source}")]
    Signal {
        /// Recorded process id.
        pid: i32,
        /// Underlying OS error.
        #[source]
        source: Errno,
    },
    /// Detaching the supervisor failed.
    #[error("failed to daemonise: {source}")]
    Daemonize {
        /// Underlying daemonisation error.
        #[source]
        source: DaemonizeError,
    },
}

impl From<DaemonizeError> for SupervisorError {
    fn from(source: DaemonizeError) -> Self {
        Self::Daemonize { source }
    }
}

impl From<LifecycleParseError> for SupervisorError {
    fn from(source: LifecycleParseError) -> Self {
        Self::InvalidLifecycleCommand { source }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors that end a process of any role.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration or telemetry setup failed.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// A lifecycle command failed.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    /// Signal handlers could not be installed.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
    /// The pool manager failed.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// The broker relay failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),
    /// A worker failed to start.
    #[error(transparent)]
    Worker(#[from] WorkerError),
    /// A configured endpoint could not be parsed.
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] EndpointParseError),
    /// The worker index handed to a child process is unusable.
    #[error("invalid worker index '{value}'")]
    WorkerIndex {
        /// Raw environment value.
        value: String,
    },
    /// Announcing readiness to the waiting parent failed.
    #[error("failed to announce readiness: {source}")]
    Readiness {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
