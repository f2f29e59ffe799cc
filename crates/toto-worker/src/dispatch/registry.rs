//! Named roots, hooks and connectors an application registers at startup.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::errors::{HookError, RegistryError};
use super::module::{MethodModule, validate_hook_name, validate_name};
use crate::resources::{DatabaseConnection, DatabaseConnector, EventManager};
use crate::worker::WorkerContext;

/// Hook run once per worker after its resources exist and before it pulls tasks.
pub trait StartupHook: Send + Sync {
    /// Runs the hook. An error aborts the worker's startup.
    fn run(
        &self,
        worker: &WorkerContext,
        database: Option<&dyn DatabaseConnection>,
    ) -> Result<(), HookError>;
}

impl<F> StartupHook for F
where
    F: Fn(&WorkerContext, Option<&dyn DatabaseConnection>) -> Result<(), HookError> + Send + Sync,
{
    fn run(
        &self,
        worker: &WorkerContext,
        database: Option<&dyn DatabaseConnection>,
    ) -> Result<(), HookError> {
        self(worker, database)
    }
}

/// Hook run once per worker after remote event receivers are registered.
pub trait EventInitHook: Send + Sync {
    /// Runs the hook against the worker's event manager.
    fn run(&self, events: &mut EventManager) -> Result<(), HookError>;
}

impl<F> EventInitHook for F
where
    F: Fn(&mut EventManager) -> Result<(), HookError> + Send + Sync,
{
    fn run(&self, events: &mut EventManager) -> Result<(), HookError> {
        self(events)
    }
}

/// Everything an application contributes to the worker service.
///
/// The registry is built deterministically in `main` before
/// [`crate::run`] is called, so every process role (including re-executed
/// children) sees the same set of handlers. Configuration then selects
/// entries by name.
#[derive(Default)]
pub struct ServiceRegistry {
    modules: BTreeMap<String, Arc<MethodModule>>,
    startup_hooks: BTreeMap<String, Arc<dyn StartupHook>>,
    event_init_hooks: BTreeMap<String, Arc<dyn EventInitHook>>,
    databases: BTreeMap<String, Arc<dyn DatabaseConnector>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler root module.
    pub fn register_module(&mut self, name: &str, module: MethodModule) -> Result<(), RegistryError> {
        validate_name("method module", name)?;
        insert_unique(&mut self.modules, "method module", name, Arc::new(module))
    }

    /// Registers a startup hook, conventionally named `module.function`.
    pub fn register_startup_hook(
        &mut self,
        name: &str,
        hook: impl StartupHook + 'static,
    ) -> Result<(), RegistryError> {
        validate_hook_name("startup hook", name)?;
        let hook: Arc<dyn StartupHook> = Arc::new(hook);
        insert_unique(&mut self.startup_hooks, "startup hook", name, hook)
    }

    /// Registers an event-initialisation hook.
    pub fn register_event_init_hook(
        &mut self,
        name: &str,
        hook: impl EventInitHook + 'static,
    ) -> Result<(), RegistryError> {
        validate_hook_name("event init hook", name)?;
        let hook: Arc<dyn EventInitHook> = Arc::new(hook);
        insert_unique(&mut self.event_init_hooks, "event init hook", name, hook)
    }

    /// Registers a database connector.
    pub fn register_database(
        &mut self,
        name: &str,
        connector: impl DatabaseConnector + 'static,
    ) -> Result<(), RegistryError> {
        validate_name("database connector", name)?;
        let connector: Arc<dyn DatabaseConnector> = Arc::new(connector);
        insert_unique(&mut self.databases, "database connector", name, connector)
    }

    /// Looks up a handler root module.
    pub fn module(&self, name: &str) -> Result<Arc<MethodModule>, RegistryError> {
        lookup(&self.modules, "method module", name)
    }

    /// Looks up a startup hook.
    pub fn startup_hook(&self, name: &str) -> Result<Arc<dyn StartupHook>, RegistryError> {
        lookup(&self.startup_hooks, "startup hook", name)
    }

    /// Looks up an event-initialisation hook.
    pub fn event_init_hook(&self, name: &str) -> Result<Arc<dyn EventInitHook>, RegistryError> {
        lookup(&self.event_init_hooks, "event init hook", name)
    }

    /// Looks up a database connector.
    pub fn database(&self, name: &str) -> Result<Arc<dyn DatabaseConnector>, RegistryError> {
        lookup(&self.databases, "database connector", name)
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ServiceRegistry")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("startup_hooks", &self.startup_hooks.keys().collect::<Vec<_>>())
            .field("event_init_hooks", &self.event_init_hooks.keys().collect::<Vec<_>>())
            .field("databases", &self.databases.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn insert_unique<T: ?Sized>(
    map: &mut BTreeMap<String, Arc<T>>,
    kind: &'static str,
    name: &str,
    value: Arc<T>,
) -> Result<(), RegistryError> {
    if map.contains_key(name) {
        return Err(RegistryError::Duplicate {
            kind,
            name: name.to_owned(),
        });
    }
    map.insert(name.to_owned(), value);
    Ok(())
}

fn lookup<T: ?Sized>(
    map: &BTreeMap<String, Arc<T>>,
    kind: &'static str,
    name: &str,
) -> Result<Arc<T>, RegistryError> {
    map.get(name)
        .cloned()
        .ok_or_else(|| RegistryError::NotRegistered {
            kind,
            name: name.to_owned(),
        })
}
