//! Distributed task dispatch: a broker relay, a pool of worker processes and
//! the daemon lifecycle around them.
//!
//! Producers push compressed task envelopes to the broker's inbound
//! endpoint. The broker relays each one, unchanged, to the internal queue
//! endpoint, where the next idle worker takes it, resolves its dotted method
//! path against the application's [`ServiceRegistry`] and invokes the
//! handler. With no inbound address configured, producers talk to the queue
//! endpoint directly and no broker runs.
//!
//! Every role runs in its own OS process. An application builds its registry
//! in `main` and hands it to [`run`]; the operator invocation then either runs
//! the pool in the foreground or detaches a supervisor (`start`), and
//! `stop`/`restart` act on the recorded pidfiles. Children are
//! re-executions of the same binary and receive the resolved configuration
//! from their parent.
//!
//! ## Shutdown
//!
//! Workers block on receive for at most [`worker::RECEIVE_TIMEOUT`] before
//! re-checking a signal-driven [`ShutdownFlag`], so `SIGTERM` ends a worker
//! after its current task instead of killing it mid-handler.

mod bootstrap;
mod broker;
pub mod dispatch;
mod health;
mod panics;
mod pool;
pub mod process;
mod producer;
mod resources;
mod telemetry;
mod transport;
pub mod worker;

pub use bootstrap::{
    BootstrapError, Bootstrapped, ConfigLoadError, ConfigLoader, InheritedConfigLoader,
    StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use broker::{Broker, BrokerError, QueueHost};
pub use dispatch::{
    DispatchError, EventInitHook, HandlerError, HookError, MethodHandler, MethodModule,
    RegistryError, ServiceRegistry, StartupHook,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use pool::{
    ChildSpec, CommandLauncher, PoolError, PoolReport, ProcessLauncher, SupervisedChild,
    WorkerPool, available_parallelism, resolve_worker_count,
};
pub use process::{LaunchError, ProcessRole, ShutdownFlag, run};
pub use producer::TaskProducer;
pub use resources::{DatabaseConnection, DatabaseConnector, EventManager, ResourceError};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{
    ListenerError, PullEndpoint, PushEndpoint, QueueConnection, Received, TaskQueue,
    TransportError,
};
pub use worker::{TaskError, Worker, WorkerContext, WorkerError, WorkerReport};

#[cfg(test)]
mod tests;
