//! Error types for method registration, resolution and invocation.

use std::error::Error as StdError;

use thiserror::Error;

type BoxedSource = Box<dyn StdError + Send + Sync + 'static>;

/// Errors raised while resolving a dotted method path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// A segment of the path does not exist under the handler root.
    #[error("unknown method '{method}': no entry named '{segment}'")]
    UnknownMethod {
        /// Full dotted path requested by the task.
        method: String,
        /// First segment that failed to resolve.
        segment: String,
    },
    /// The path names a module rather than a handler.
    #[error("method '{method}' names a module, not a handler")]
    NotAHandler {
        /// Full dotted path requested by the task.
        method: String,
    },
}

/// Errors raised while building or querying a [`ServiceRegistry`].
///
/// [`ServiceRegistry`]: super::ServiceRegistry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The name is empty or has an empty path segment.
    #[error("invalid {kind} name '{name}'")]
    InvalidName {
        /// Kind of entry being registered.
        kind: &'static str,
        /// Rejected name.
        name: String,
    },
    /// An entry of the same kind is already registered under the name.
    #[error("{kind} '{name}' is already registered")]
    Duplicate {
        /// Kind of entry being registered.
        kind: &'static str,
        /// Conflicting name.
        name: String,
    },
    /// No entry of the requested kind is registered under the name.
    #[error("no {kind} registered as '{name}'")]
    NotRegistered {
        /// Kind of entry requested.
        kind: &'static str,
        /// Requested name.
        name: String,
    },
}

/// Failure reported by a method handler.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<BoxedSource>,
}

impl HandlerError {
    /// Builds a failure from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an underlying error with a message.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Human readable failure description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failure reported by a startup or event-initialisation hook.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
    #[source]
    source: Option<BoxedSource>,
}

impl HookError {
    /// Builds a failure from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an underlying error with a message.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
