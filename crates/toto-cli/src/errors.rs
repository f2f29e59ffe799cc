//! Error types for the CLI runtime.

use std::io;

use thiserror::Error;
use toto_config::EndpointParseError;
use toto_worker::TransportError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("invalid endpoint '{address}': {source}")]
    Endpoint {
        address: String,
        source: EndpointParseError,
    },
    #[error("task parameters are not valid JSON: {0}")]
    Parameters(serde_json::Error),
    #[error("method path must not be empty")]
    EmptyMethod,
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: TransportError,
    },
    #[error("failed to submit task to {endpoint}: {source}")]
    Submit {
        endpoint: String,
        source: TransportError,
    },
    #[error("failed to write output: {0}")]
    Output(io::Error),
}
