//! The task loop run by every worker process.
//!
//! A worker owns its database connection and event manager, pulls one
//! envelope at a time from the queue endpoint and invokes the resolved
//! handler. Every failure raised while decoding, resolving or running a task
//! is contained here: it is logged and the loop moves on, so task content can
//! never end the process.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use toto_config::{Config, Endpoint};
use toto_envelope::{MalformedEnvelope, decode};

use crate::dispatch::{
    DispatchError, HandlerError, HookError, MethodModule, RegistryError, ServiceRegistry,
};
use crate::panics::{self, CaughtPanic};
use crate::process::ShutdownFlag;
use crate::resources::{DatabaseConnection, EventManager, ResourceError};
use crate::transport::{QueueConnection, Received, TransportError};

const WORKER_TARGET: &str = concat!(env!("CARGO_CRATE_NAME"), "::worker");

/// Bounded wait for each receive, after which the shutdown flag is checked.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(250);

const CONNECT_BACKOFF_START: Duration = Duration::from_millis(50);
const CONNECT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Per-process state handed to every handler and startup hook.
#[derive(Debug, Default)]
pub struct WorkerContext {
    index: usize,
    database: Option<Box<dyn DatabaseConnection>>,
    events: Option<EventManager>,
}

impl WorkerContext {
    /// Creates a context without resources.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    /// Attaches a database connection.
    #[must_use]
    pub fn with_database(mut self, database: Box<dyn DatabaseConnection>) -> Self {
        self.database = Some(database);
        self
    }

    /// Attaches an event manager.
    #[must_use]
    pub fn with_events(mut self, events: EventManager) -> Self {
        self.events = Some(events);
        self
    }

    /// Builds the resources `config` asks for.
    ///
    /// The database connection comes first, then the event manager: remote
    /// receivers are registered before the event-initialisation hook runs.
    pub fn from_config(
        index: usize,
        config: &Config,
        registry: &ServiceRegistry,
    ) -> Result<Self, WorkerError> {
        let mut context = Self::new(index);
        if let Some(name) = config.database() {
            let connector = registry.database(name)?;
            let connection = connector.connect(config)?;
            debug!(
                target: WORKER_TARGET,
                index,
                driver = connection.driver(),
                "database connection opened"
            );
            context = context.with_database(connection);
        }

        let receivers = config.remote_event_receivers();
        let init_hook = config.event_init_module();
        if !receivers.is_empty() || init_hook.is_some() {
            let mut events = EventManager::from_config(config)?;
            if let Some(name) = init_hook {
                registry
                    .event_init_hook(name)?
                    .run(&mut events)
                    .map_err(|source| WorkerError::Hook {
                        name: name.to_owned(),
                        source,
                    })?;
            }
            context = context.with_events(events);
        }
        Ok(context)
    }

    /// Position of this worker in the pool, starting at 1.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// The worker's database connection, when one is configured.
    #[must_use]
    pub fn database(&self) -> Option<&dyn DatabaseConnection> {
        self.database.as_deref()
    }

    /// The worker's event manager, when remote events are configured.
    #[must_use]
    pub const fn events(&self) -> Option<&EventManager> {
        self.events.as_ref()
    }
}

/// Errors that stop a worker before it consumes tasks.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A configured name is missing from the registry.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// A per-process resource could not be built.
    #[error(transparent)]
    Resource(#[from] ResourceError),
    /// The startup or event-initialisation hook failed.
    #[error("hook '{name}' failed: {source}")]
    Hook {
        /// Registered hook name.
        name: String,
        /// Failure reported by the hook.
        #[source]
        source: HookError,
    },
}

/// Why a single task was dropped.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The frame is not a valid envelope.
    #[error(transparent)]
    Malformed(#[from] MalformedEnvelope),
    /// The method path does not name a handler.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// The handler reported a failure.
    #[error("handler for '{method}' failed: {source}")]
    Handler {
        /// Dispatched method path.
        method: String,
        /// Failure reported by the handler.
        #[source]
        source: HandlerError,
    },
    /// The handler panicked.
    #[error("handler for '{method}' panicked: {message}")]
    Panicked {
        /// Dispatched method path.
        method: String,
        /// Panic payload, when it was a string.
        message: String,
        /// `file:line:column` where the panic was raised.
        location: Option<String>,
        /// Backtrace rendered at the panic site; captured in debug mode only.
        trace: Option<String>,
    },
}

impl TaskError {
    /// Messages of every underlying cause, outermost first.
    #[must_use]
    pub fn causes(&self) -> Vec<String> {
        let mut causes = Vec::new();
        let mut next = StdError::source(self);
        while let Some(cause) = next {
            causes.push(cause.to_string());
            next = cause.source();
        }
        causes
    }
}

/// Counters reported when a worker loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Tasks whose handler returned successfully.
    pub completed: u64,
    /// Tasks dropped because of a [`TaskError`].
    pub failed: u64,
}

/// A single worker: its context, its handler root and the failure log style.
pub struct Worker {
    context: WorkerContext,
    root: Arc<MethodModule>,
    debug: bool,
}

impl Worker {
    /// Assembles a worker from already-built parts.
    #[must_use]
    pub fn new(context: WorkerContext, root: Arc<MethodModule>, debug: bool) -> Self {
        Self {
            context,
            root,
            debug,
        }
    }

    /// Builds the worker's resources and runs its startup hook.
    ///
    /// Failures here are not contained: they abort this worker's startup.
    pub fn start(
        index: usize,
        config: &Config,
        registry: &ServiceRegistry,
    ) -> Result<Self, WorkerError> {
        let root = registry.module(config.method_module())?;
        let context = WorkerContext::from_config(index, config, registry)?;
        if let Some(name) = config.startup_function() {
            registry
                .startup_hook(name)?
                .run(&context, context.database())
                .map_err(|source| WorkerError::Hook {
                    name: name.to_owned(),
                    source,
                })?;
            debug!(target: WORKER_TARGET, index, hook = name, "startup hook completed");
        }
        Ok(Self::new(context, root, config.debug()))
    }

    /// Context handed to handlers.
    #[must_use]
    pub const fn context(&self) -> &WorkerContext {
        &self.context
    }

    /// Decodes, resolves and invokes one task, returning its method path.
    ///
    /// In debug mode a handler panic also carries a backtrace.
    pub fn process(&self, frame: &[u8]) -> Result<String, TaskError> {
        let (method, parameters) = decode(frame)?.into_parts();
        let handler = self.root.resolve(&method)?;
        info!(target: WORKER_TARGET, index = self.context.index, method = %method, "dispatching task");
        match panics::catch(self.debug, || handler.invoke(&self.context, parameters)) {
            Ok(Ok(())) => Ok(method),
            Ok(Err(source)) => Err(TaskError::Handler { method, source }),
            Err(CaughtPanic {
                message,
                location,
                trace,
            }) => Err(TaskError::Panicked {
                method,
                message,
                location,
                trace,
            }),
        }
    }

    /// Processes one task and logs its failure; returns whether it succeeded.
    pub fn handle(&self, frame: &[u8]) -> bool {
        match self.process(frame) {
            Ok(_) => true,
            Err(failure) => {
                self.log_failure(&failure);
                false
            }
        }
    }

    /// Compact mode logs the failure's message alone; debug mode adds its
    /// cause chain and, for panics, the location and backtrace.
    fn log_failure(&self, failure: &TaskError) {
        let index = self.context.index;
        if !self.debug {
            error!(target: WORKER_TARGET, index, error = %failure, "task failed");
            return;
        }
        let causes = failure.causes().join(": ");
        let (location, trace) = match failure {
            TaskError::Panicked {
                location, trace, ..
            } => (location.as_deref(), trace.as_deref()),
            _ => (None, None),
        };
        error!(
            target: WORKER_TARGET,
            index,
            error = %failure,
            causes = %causes,
            location,
            backtrace = trace,
            "task failed"
        );
    }

    /// Pulls tasks from `endpoint` until `shutdown` is set.
    ///
    /// Connection failures are retried with backoff, since the endpoint's
    /// owner may start after this worker or restart underneath it.
    pub fn run(&self, endpoint: &Endpoint, shutdown: &ShutdownFlag) -> WorkerReport {
        let mut report = WorkerReport::default();
        while let Some(mut connection) = self.connect(endpoint, shutdown) {
            info!(target: WORKER_TARGET, index = self.context.index, endpoint = %endpoint, "worker connected");
            if let Err(error) = self.consume(&mut connection, shutdown, &mut report) {
                warn!(
                    target: WORKER_TARGET,
                    index = self.context.index,
                    endpoint = %endpoint,
                    error = %error,
                    "queue connection lost; reconnecting"
                );
            }
        }
        info!(
            target: WORKER_TARGET,
            index = self.context.index,
            completed = report.completed,
            failed = report.failed,
            "worker stopped"
        );
        report
    }

    fn connect(&self, endpoint: &Endpoint, shutdown: &ShutdownFlag) -> Option<QueueConnection> {
        let mut backoff = CONNECT_BACKOFF_START;
        while !shutdown.is_set() {
            match QueueConnection::connect(endpoint, RECEIVE_TIMEOUT) {
                Ok(connection) => return Some(connection),
                Err(error) => {
                    debug!(target: WORKER_TARGET, endpoint = %endpoint, error = %error, "queue endpoint not reachable yet");
                    thread::sleep(backoff);
                    backoff = (backoff * 2).min(CONNECT_BACKOFF_MAX);
                }
            }
        }
        None
    }

    fn consume(
        &self,
        connection: &mut QueueConnection,
        shutdown: &ShutdownFlag,
        report: &mut WorkerReport,
    ) -> Result<(), TransportError> {
        while !shutdown.is_set() {
            match connection.receive()? {
                Received::Task(frame) => {
                    if self.handle(&frame) {
                        report.completed += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Received::Idle => {}
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Worker")
            .field("context", &self.context)
            .field("root", &self.root)
            .field("debug", &self.debug)
            .finish()
    }
}
