//! Method resolution for decoded tasks.
//!
//! Applications describe their handlers up front as [`MethodModule`] trees
//! registered by name in a [`ServiceRegistry`]. A worker resolves each task's
//! dotted method path against the configured root and reports a typed
//! [`DispatchError`] when a segment is missing, instead of failing late
//! somewhere inside the handler call.

mod errors;
mod module;
mod registry;

pub use errors::{DispatchError, HandlerError, HookError, RegistryError};
pub use module::{MethodHandler, MethodModule};
pub use registry::{EventInitHook, ServiceRegistry, StartupHook};
