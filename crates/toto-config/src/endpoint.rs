use std::fmt;
use std::fs::DirBuilder;
use std::io;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use url::Url;

/// Host written as `*` in a TCP address; binds every interface.
const WILDCARD_HOST: &str = "*";
const ANY_IPV4: &str = "0.0.0.0";

/// A queue endpoint: where a relay binds or a worker/producer connects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// TCP endpoint (`tcp://host:port`).
    Tcp {
        /// Host name or address; `0.0.0.0` when written as `*`.
        host: String,
        /// TCP port.
        port: u16,
    },
    /// Unix domain socket endpoint (`ipc://path` or `unix://path`).
    Unix {
        /// Filesystem path of the socket.
        path: Utf8PathBuf,
    },
}

impl Endpoint {
    /// Builds a TCP endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Builds a Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Returns the socket path when the endpoint uses the Unix transport.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_ref()),
            Self::Tcp { .. } => None,
        }
    }

    /// Ensures a Unix socket's parent directory exists before binding.
    pub fn prepare_filesystem(&self) -> io::Result<()> {
        let Some(parent) = self
            .unix_path()
            .and_then(Utf8Path::parent)
            .filter(|parent| !parent.as_str().is_empty())
        else {
            return Ok(());
        };

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        match builder.create(parent.as_std_path()) {
            Err(error) if error.kind() != io::ErrorKind::AlreadyExists => Err(error),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
            Self::Unix { path } => write!(formatter, "ipc://{path}"),
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| EndpointParseError::MissingScheme(input.to_owned()))?;
        match scheme {
            "tcp" => parse_tcp(input, rest),
            "ipc" | "unix" => {
                if rest.is_empty() {
                    return Err(EndpointParseError::MissingUnixPath(input.to_owned()));
                }
                Ok(Self::unix(rest))
            }
            other => Err(EndpointParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

fn parse_tcp(input: &str, rest: &str) -> Result<Endpoint, EndpointParseError> {
    let normalised = match rest.strip_prefix(WILDCARD_HOST) {
        Some(port) => format!("tcp://{ANY_IPV4}{port}"),
        None => format!("tcp://{rest}"),
    };
    let url = Url::parse(&normalised)?;
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| EndpointParseError::MissingHost(input.to_owned()))?;
    let port = url
        .port()
        .ok_or_else(|| EndpointParseError::MissingPort(input.to_owned()))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok(Endpoint::tcp(host, port))
}

/// Errors encountered while parsing an [`Endpoint`] from text.
#[derive(Debug, Error)]
pub enum EndpointParseError {
    /// The address had no `scheme://` prefix.
    #[error("missing scheme in endpoint '{0}'")]
    MissingScheme(String),
    /// Scheme was not recognised.
    #[error("unsupported endpoint scheme '{0}'")]
    UnsupportedScheme(String),
    /// TCP host name was missing.
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    /// TCP port was missing from the address.
    #[error("missing TCP port in '{0}'")]
    MissingPort(String),
    /// Unix socket path was absent.
    #[error("missing socket path in '{0}'")]
    MissingUnixPath(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}
