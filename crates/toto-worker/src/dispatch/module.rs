//! Handler trees addressed by dotted method paths.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::errors::{DispatchError, HandlerError, RegistryError};
use crate::worker::WorkerContext;

/// A unit of application logic invoked for one task.
pub trait MethodHandler: Send + Sync {
    /// Runs the handler with the worker's context and the task parameters.
    fn invoke(&self, worker: &WorkerContext, parameters: Value) -> Result<(), HandlerError>;
}

impl<F> MethodHandler for F
where
    F: Fn(&WorkerContext, Value) -> Result<(), HandlerError> + Send + Sync,
{
    fn invoke(&self, worker: &WorkerContext, parameters: Value) -> Result<(), HandlerError> {
        self(worker, parameters)
    }
}

#[derive(Clone)]
enum MethodEntry {
    Module(MethodModule),
    Handler(Arc<dyn MethodHandler>),
}

/// A namespace of handlers and nested modules.
///
/// Method paths resolve by walking one segment per level:
/// `account.create` looks up the `account` module and then its `create`
/// handler.
#[derive(Clone, Default)]
pub struct MethodModule {
    entries: BTreeMap<String, MethodEntry>,
}

impl MethodModule {
    /// Creates an empty module.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`.
    pub fn add_handler(
        &mut self,
        name: &str,
        handler: impl MethodHandler + 'static,
    ) -> Result<(), RegistryError> {
        self.insert(name, MethodEntry::Handler(Arc::new(handler)))
    }

    /// Registers a nested `module` under `name`.
    pub fn add_module(&mut self, name: &str, module: Self) -> Result<(), RegistryError> {
        self.insert(name, MethodEntry::Module(module))
    }

    /// Builder form of [`MethodModule::add_handler`].
    pub fn with_handler(
        mut self,
        name: &str,
        handler: impl MethodHandler + 'static,
    ) -> Result<Self, RegistryError> {
        self.add_handler(name, handler)?;
        Ok(self)
    }

    /// Builder form of [`MethodModule::add_module`].
    pub fn with_module(mut self, name: &str, module: Self) -> Result<Self, RegistryError> {
        self.add_module(name, module)?;
        Ok(self)
    }

    /// Resolves a dotted method path to its handler.
    pub fn resolve(&self, method: &str) -> Result<Arc<dyn MethodHandler>, DispatchError> {
        let unknown = |segment: &str| DispatchError::UnknownMethod {
            method: method.to_owned(),
            segment: segment.to_owned(),
        };
        let mut segments = method.split('.');
        let mut module = self;
        loop {
            let segment = segments.next().unwrap_or_default();
            match module.entries.get(segment) {
                None => return Err(unknown(segment)),
                Some(MethodEntry::Module(nested)) => match segments.clone().next() {
                    Some(_) => module = nested,
                    None => {
                        return Err(DispatchError::NotAHandler {
                            method: method.to_owned(),
                        });
                    }
                },
                Some(MethodEntry::Handler(handler)) => {
                    return match segments.next() {
                        None => Ok(Arc::clone(handler)),
                        Some(extra) => Err(unknown(extra)),
                    };
                }
            }
        }
    }

    /// Dotted paths of every handler in this module, sorted.
    #[must_use]
    pub fn method_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_paths("", &mut paths);
        paths
    }

    fn collect_paths(&self, prefix: &str, paths: &mut Vec<String>) {
        for (name, entry) in &self.entries {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            match entry {
                MethodEntry::Module(nested) => nested.collect_paths(&path, paths),
                MethodEntry::Handler(_) => paths.push(path),
            }
        }
    }

    fn insert(&mut self, name: &str, entry: MethodEntry) -> Result<(), RegistryError> {
        let kind = match entry {
            MethodEntry::Module(_) => "module",
            MethodEntry::Handler(_) => "handler",
        };
        validate_name(kind, name)?;
        if self.entries.contains_key(name) {
            return Err(RegistryError::Duplicate {
                kind,
                name: name.to_owned(),
            });
        }
        self.entries.insert(name.to_owned(), entry);
        Ok(())
    }
}

impl fmt::Debug for MethodModule {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MethodModule")
            .field("methods", &self.method_paths())
            .finish()
    }
}

pub(super) fn validate_name(kind: &'static str, name: &str) -> Result<(), RegistryError> {
    if name.is_empty() || name.contains('.') {
        return Err(RegistryError::InvalidName {
            kind,
            name: name.to_owned(),
        });
    }
    Ok(())
}

/// Hook names may be dotted (`module.function`) but every segment is non-empty.
pub(super) fn validate_hook_name(kind: &'static str, name: &str) -> Result<(), RegistryError> {
    if name.split('.').any(str::is_empty) {
        return Err(RegistryError::InvalidName {
            kind,
            name: name.to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    fn noop(_: &WorkerContext, _: Value) -> Result<(), HandlerError> {
        Ok(())
    }

    #[fixture]
    fn root() -> MethodModule {
        let account = MethodModule::new()
            .with_handler("create", noop)
            .and_then(|module| module.with_handler("delete", noop))
            .expect("account module");
        let admin = MethodModule::new()
            .with_module(
                "audit",
                MethodModule::new()
                    .with_handler("export", noop)
                    .expect("audit module"),
            )
            .expect("admin module");
        MethodModule::new()
            .with_module("account", account)
            .and_then(|module| module.with_module("admin", admin))
            .and_then(|module| module.with_handler("ping", noop))
            .expect("root module")
    }

    #[rstest]
    #[case("ping")]
    #[case("account.create")]
    #[case("admin.audit.export")]
    fn resolves_registered_paths(root: MethodModule, #[case] method: &str) {
        assert!(root.resolve(method).is_ok(), "{method} should resolve");
    }

    #[rstest]
    #[case("account.nonexistent", "nonexistent")]
    #[case("billing.charge", "billing")]
    #[case("admin.audit.export.csv", "csv")]
    #[case("ping.extra", "extra")]
    #[case("", "")]
    #[case("account..create", "")]
    fn reports_first_missing_segment(
        root: MethodModule,
        #[case] method: &str,
        #[case] segment: &str,
    ) {
        let Err(error) = root.resolve(method) else {
            panic!("{method} should not resolve");
        };
        assert_eq!(
            error,
            DispatchError::UnknownMethod {
                method: method.to_owned(),
                segment: segment.to_owned(),
            }
        );
    }

    #[rstest]
    fn module_paths_are_not_handlers(root: MethodModule) {
        assert!(matches!(
            root.resolve("admin.audit"),
            Err(DispatchError::NotAHandler { .. })
        ));
    }

    #[rstest]
    #[case("")]
    #[case("account.create")]
    fn rejects_invalid_names(#[case] name: &str) {
        let mut module = MethodModule::new();
        assert!(matches!(
            module.add_handler(name, noop),
            Err(RegistryError::InvalidName { .. })
        ));
    }

    #[rstest]
    fn rejects_duplicates_across_entry_kinds(root: MethodModule) {
        let mut module = root;
        assert_eq!(
            module.add_module("ping", MethodModule::new()),
            Err(RegistryError::Duplicate {
                kind: "module",
                name: "ping".to_owned(),
            })
        );
    }

    #[rstest]
    fn lists_method_paths_in_order(root: MethodModule) {
        assert_eq!(
            root.method_paths(),
            vec![
                "account.create",
                "account.delete",
                "admin.audit.export",
                "ping"
            ]
        );
    }
}
