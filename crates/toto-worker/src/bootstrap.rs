//! Configuration loading and telemetry setup shared by every process role.

use std::env;
use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use toto_config::{Config, EndpointParseError};

use crate::health::HealthReporter;
use crate::process::CONFIG_ENV_VAR;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the service configuration.
    fn load(&self) -> Result<Config, ConfigLoadError>;
}

/// Errors raised by a [`ConfigLoader`].
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    /// Layered loading from files, environment and flags failed.
    #[error(transparent)]
    Layered(#[from] Arc<OrthoError>),
    /// A child process was started without its parent's configuration.
    #[error("environment variable {variable} is not set")]
    MissingInherited {
        /// Expected variable.
        variable: &'static str,
    },
    /// The inherited configuration is not valid JSON for [`Config`].
    #[error("inherited configuration is invalid: {source}")]
    Inherited {
        /// Underlying deserialisation error.
        #[source]
        source: serde_json::Error,
    },
}

/// Loader that reads the process command line through [`Config::load_from_args`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, ConfigLoadError> {
        Ok(Config::load_from_args(env::args_os())?)
    }
}

/// Loader for child processes: reads the parent's resolved configuration.
///
/// Children never re-read files, environment or flags, so every process in
/// the tree runs with exactly the configuration the operator started.
#[derive(Debug, Default, Clone, Copy)]
pub struct InheritedConfigLoader;

impl ConfigLoader for InheritedConfigLoader {
    fn load(&self) -> Result<Config, ConfigLoadError> {
        let raw = env::var(CONFIG_ENV_VAR).map_err(|_| ConfigLoadError::MissingInherited {
            variable: CONFIG_ENV_VAR,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigLoadError::Inherited { source })
    }
}

/// Loader returning a configuration built in memory.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already-resolved configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, ConfigLoadError> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: ConfigLoadError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// A configured endpoint could not be parsed.
    #[error("invalid endpoint configuration: {source}")]
    Endpoint {
        /// Parse failure.
        #[source]
        source: EndpointParseError,
    },
}

/// Result of a successful bootstrap invocation.
#[derive(Debug)]
pub struct Bootstrapped {
    config: Config,
    telemetry: TelemetryHandle,
}

impl Bootstrapped {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Consumes the result, keeping the configuration.
    #[must_use]
    pub fn into_config(self) -> Config {
        self.config
    }
}

/// Loads configuration, installs telemetry and validates both endpoints.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: &dyn HealthReporter,
) -> Result<Bootstrapped, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let endpoints = config
        .queue_endpoint()
        .and_then(|_| config.inbound_endpoint());
    if let Err(source) = endpoints {
        let error = BootstrapError::Endpoint { source };
        reporter.bootstrap_failed(&error);
        return Err(error);
    }

    reporter.bootstrap_succeeded(&config);
    Ok(Bootstrapped { config, telemetry })
}
