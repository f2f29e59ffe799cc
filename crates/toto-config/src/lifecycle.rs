use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Declarative lifecycle action requested for the worker service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleCommand {
    /// Detach into the background unless pidfiles show a running service.
    Start,
    /// Signal every process recorded in the pidfiles and remove the files.
    Stop,
    /// `Stop` followed by `Start`.
    Restart,
    /// Run the pool in the current process without pidfiles.
    Foreground,
}

impl LifecycleCommand {
    /// Whether this command tears down a running service first.
    #[must_use]
    pub fn stops(self) -> bool {
        matches!(self, Self::Stop | Self::Restart)
    }

    /// Whether this command launches a detached service.
    #[must_use]
    pub fn starts(self) -> bool {
        matches!(self, Self::Start | Self::Restart)
    }
}

impl fmt::Display for LifecycleCommand {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Foreground => "foreground",
        };
        formatter.write_str(label)
    }
}

impl FromStr for LifecycleCommand {
    type Err = LifecycleParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            "" => Ok(Self::Foreground),
            other => Err(LifecycleParseError::InvalidLifecycleCommand {
                value: other.to_owned(),
            }),
        }
    }
}

/// Errors raised while resolving the lifecycle command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleParseError {
    /// The `daemon` option held an unrecognised value.
    #[error("invalid daemon option: {value}")]
    InvalidLifecycleCommand {
        /// Rejected value.
        value: String,
    },
}
