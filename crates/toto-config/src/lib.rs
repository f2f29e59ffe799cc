//! Shared configuration for the Toto worker service.
//!
//! [`Config`] is loaded once per process from defaults, a TOML file, `TOTO_*`
//! environment variables and command-line flags (in increasing precedence)
//! and then passed by reference into the pool manager, broker and workers.
//! Child processes receive the resolved configuration verbatim, so none of
//! them re-reads the environment.
//!
//! Optional fields are kept optional on the struct so the layered merge can
//! tell "unset" from "set to the default"; the accessor methods apply the
//! built-in defaults from [`defaults`].

mod args;
mod defaults;
mod endpoint;
mod lifecycle;
mod logging;
mod pidfile;

use std::ffi::OsString;

use ortho_config::{OrthoConfig, OrthoResult};
use serde::{Deserialize, Serialize};

pub use args::join_negative_values;
pub use defaults::{
    DEFAULT_INBOUND_ADDRESS, DEFAULT_LOG_FILTER, DEFAULT_METHOD_MODULE, DEFAULT_PIDFILE,
    DEFAULT_PROCESSES, DEFAULT_QUEUE_ADDRESS, default_log_filter, default_log_format,
};
pub use endpoint::{Endpoint, EndpointParseError};
pub use lifecycle::{LifecycleCommand, LifecycleParseError};
pub use logging::{LogFormat, LogFormatParseError};
pub use pidfile::{PidfileLayout, PidfileLayoutError};

/// Resolved configuration for one run of the worker service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TOTO")]
pub struct Config {
    /// Broker inbound endpoint. An empty string disables the broker.
    pub worker_address: Option<String>,
    /// Internal queue endpoint that workers connect to.
    pub worker_socket_address: Option<String>,
    /// Number of worker processes; negative runs one per CPU.
    pub processes: Option<i64>,
    /// Name of the registered handler root module.
    pub method_module: Option<String>,
    /// Registered startup hook run once per worker before it consumes tasks.
    pub startup_function: Option<String>,
    /// Registered hook run after remote event receivers are registered.
    pub event_init_module: Option<String>,
    /// Comma separated remote event receiver endpoints.
    pub remote_event_receivers: Option<String>,
    /// Registered database connector name.
    pub database: Option<String>,
    /// Lifecycle command: `start`, `stop`, `restart`, or empty for foreground.
    pub daemon: Option<String>,
    /// Alias for `daemon = "start"`.
    #[serde(default)]
    pub start: bool,
    /// Alias for `daemon = "stop"`.
    #[serde(default)]
    pub stop: bool,
    /// Alias for `daemon = "restart"`.
    #[serde(default)]
    pub restart: bool,
    /// Alias for an empty `daemon`, forcing foreground mode.
    #[serde(default)]
    pub nodaemon: bool,
    /// Base path for pidfiles written in daemon mode.
    pub pidfile: Option<String>,
    /// Logs caught task failures with their full error chain.
    #[serde(default)]
    pub debug: bool,
    /// `tracing` filter expression.
    pub log_filter: Option<String>,
    /// Log output format.
    pub log_format: Option<LogFormat>,
    /// File a detached service appends its logs to; unset discards them.
    pub log_file: Option<String>,
}

impl Config {
    /// Loads the layered configuration from the given command line.
    ///
    /// Negative `--processes` values are accepted in the detached form.
    pub fn load_from_args<I, T>(args: I) -> OrthoResult<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::load_from_iter(join_negative_values(args))
    }

    /// Raw broker inbound address; empty when the broker is disabled.
    #[must_use]
    pub fn worker_address(&self) -> &str {
        self.worker_address
            .as_deref()
            .unwrap_or(DEFAULT_INBOUND_ADDRESS)
            .trim()
    }

    /// Raw internal queue address.
    #[must_use]
    pub fn worker_socket_address(&self) -> &str {
        self.worker_socket_address
            .as_deref()
            .unwrap_or(DEFAULT_QUEUE_ADDRESS)
            .trim()
    }

    /// Parsed broker inbound endpoint, or `None` when the broker is disabled.
    pub fn inbound_endpoint(&self) -> Result<Option<Endpoint>, EndpointParseError> {
        let address = self.worker_address();
        if address.is_empty() {
            return Ok(None);
        }
        address.parse().map(Some)
    }

    /// Parsed internal queue endpoint.
    pub fn queue_endpoint(&self) -> Result<Endpoint, EndpointParseError> {
        self.worker_socket_address().parse()
    }

    /// Configured worker count setting before CPU resolution.
    #[must_use]
    pub fn processes(&self) -> i64 {
        self.processes.unwrap_or(DEFAULT_PROCESSES)
    }

    /// Name of the handler root module.
    #[must_use]
    pub fn method_module(&self) -> &str {
        self.method_module
            .as_deref()
            .unwrap_or(DEFAULT_METHOD_MODULE)
    }

    /// Startup hook name, if one is configured.
    #[must_use]
    pub fn startup_function(&self) -> Option<&str> {
        non_empty(self.startup_function.as_deref())
    }

    /// Event initialisation hook name, if one is configured.
    #[must_use]
    pub fn event_init_module(&self) -> Option<&str> {
        non_empty(self.event_init_module.as_deref())
    }

    /// Remote event receiver addresses in configuration order.
    #[must_use]
    pub fn remote_event_receivers(&self) -> Vec<&str> {
        self.remote_event_receivers
            .as_deref()
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|address| !address.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Database connector name, treating `none` as disabled.
    #[must_use]
    pub fn database(&self) -> Option<&str> {
        non_empty(self.database.as_deref()).filter(|name| !name.eq_ignore_ascii_case("none"))
    }

    /// Resolves the lifecycle command, letting the alias flags win over `daemon`.
    pub fn lifecycle_command(&self) -> Result<LifecycleCommand, LifecycleParseError> {
        if self.start {
            return Ok(LifecycleCommand::Start);
        }
        if self.stop {
            return Ok(LifecycleCommand::Stop);
        }
        if self.restart {
            return Ok(LifecycleCommand::Restart);
        }
        if self.nodaemon {
            return Ok(LifecycleCommand::Foreground);
        }
        self.daemon.as_deref().unwrap_or_default().parse()
    }

    /// Raw pidfile base path.
    #[must_use]
    pub fn pidfile(&self) -> &str {
        self.pidfile.as_deref().unwrap_or(DEFAULT_PIDFILE)
    }

    /// Pidfile naming scheme derived from [`Config::pidfile`].
    pub fn pidfile_layout(&self) -> Result<PidfileLayout, PidfileLayoutError> {
        PidfileLayout::new(self.pidfile())
    }

    /// Whether caught failures are logged with full detail.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }

    /// Log file for a detached service, if one is configured.
    #[must_use]
    pub fn log_file(&self) -> Option<&str> {
        non_empty(self.log_file.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
