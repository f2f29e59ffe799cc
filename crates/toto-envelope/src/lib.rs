//! Wire formats shared by task producers, the broker, and workers.
//!
//! A task travels as an [`Envelope`]: a dotted method path plus opaque JSON
//! parameters, serialised as `{"method": ..., "parameters": ...}` and then
//! zlib-compressed. Any producer that can emit those bytes can submit work.
//!
//! On stream connections every payload is wrapped in a frame: a 4-byte
//! big-endian length followed by the payload. A zero-length frame is a credit
//! that a worker sends upstream when it is ready for its next task.

mod envelope;
mod frame;

pub use envelope::{EncodeError, Envelope, MAX_DECOMPRESSED_BYTES, MalformedEnvelope, decode, encode};
pub use frame::{FrameError, FramePoll, FrameReader, MAX_FRAME_BYTES, write_credit, write_frame};
