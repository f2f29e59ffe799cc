use std::io::{self, Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Upper bound on the inflated size of one envelope.
pub const MAX_DECOMPRESSED_BYTES: u64 = 256 * 1024 * 1024;

/// One unit of work: the handler path and the parameters passed to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Dot-separated handler path, for example `account.create`.
    pub method: String,
    /// Parameters handed verbatim to the handler.
    pub parameters: Value,
}

impl Envelope {
    /// Builds an envelope for `method` carrying `parameters`.
    #[must_use]
    pub fn new(method: impl Into<String>, parameters: Value) -> Self {
        Self {
            method: method.into(),
            parameters,
        }
    }

    /// Handler path of this task.
    #[must_use]
    pub const fn method(&self) -> &str {
        self.method.as_str()
    }

    /// Parameters of this task.
    #[must_use]
    pub const fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// Splits the envelope into its method and parameters.
    #[must_use]
    pub fn into_parts(self) -> (String, Value) {
        (self.method, self.parameters)
    }

    /// Encodes this envelope into its wire representation.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode(&self.method, &self.parameters)
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    method: &'a str,
    parameters: &'a Value,
}

/// Serialises then compresses a task envelope.
pub fn encode(method: &str, parameters: &Value) -> Result<Vec<u8>, EncodeError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    let envelope = EnvelopeRef { method, parameters };
    serde_json::to_writer(&mut encoder, &envelope).map_err(EncodeError::Serialise)?;
    encoder.flush().map_err(EncodeError::Compress)?;
    encoder.finish().map_err(EncodeError::Compress)
}

/// Decompresses then deserialises a task envelope.
pub fn decode(bytes: &[u8]) -> Result<Envelope, MalformedEnvelope> {
    let mut inflated = Vec::new();
    ZlibDecoder::new(bytes)
        .take(MAX_DECOMPRESSED_BYTES + 1)
        .read_to_end(&mut inflated)
        .map_err(MalformedEnvelope::Decompress)?;
    if inflated.len() as u64 > MAX_DECOMPRESSED_BYTES {
        return Err(MalformedEnvelope::TooLarge {
            limit: MAX_DECOMPRESSED_BYTES,
        });
    }
    serde_json::from_slice(&inflated).map_err(MalformedEnvelope::Deserialise)
}

/// Errors raised while encoding an envelope.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The envelope could not be serialised.
    #[error("failed to serialise envelope: {0}")]
    Serialise(#[source] serde_json::Error),
    /// The serialised envelope could not be compressed.
    #[error("failed to compress envelope: {0}")]
    Compress(#[source] io::Error),
}

/// Bytes that do not form a valid task envelope.
#[derive(Debug, Error)]
pub enum MalformedEnvelope {
    /// The payload is not a zlib stream.
    #[error("malformed envelope: payload failed to decompress: {0}")]
    Decompress(#[source] io::Error),
    /// The payload inflates beyond [`MAX_DECOMPRESSED_BYTES`].
    #[error("malformed envelope: payload inflates beyond {limit} bytes")]
    TooLarge {
        /// Inflated size limit in bytes.
        limit: u64,
    },
    /// The inflated payload is not a `{method, parameters}` object.
    #[error("malformed envelope: payload failed to deserialise: {0}")]
    Deserialise(#[source] serde_json::Error),
}
