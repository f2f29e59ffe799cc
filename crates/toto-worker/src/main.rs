use std::process::ExitCode;

use serde_json::Value;
use tracing::info;

use toto_worker::{
    DatabaseConnection, HandlerError, HookError, MethodModule, RegistryError, ServiceRegistry,
    WorkerContext,
};

fn main() -> ExitCode {
    match registry() {
        Ok(registry) => toto_worker::run(registry),
        Err(error) => {
            eprintln!("failed to register handlers: {error}");
            ExitCode::FAILURE
        }
    }
}

/// Handlers served by the stock binary; applications register their own.
fn registry() -> Result<ServiceRegistry, RegistryError> {
    let account = MethodModule::new().with_handler("create", log_account)?;
    let methods = MethodModule::new()
        .with_handler("echo", echo)?
        .with_module("account", account)?;
    let mut registry = ServiceRegistry::new();
    registry.register_module("methods", methods)?;
    registry.register_startup_hook("methods.announce", announce)?;
    Ok(registry)
}

fn echo(worker: &WorkerContext, parameters: Value) -> Result<(), HandlerError> {
    info!(target: "toto_worker::methods", worker = worker.index(), %parameters, "echo");
    Ok(())
}

fn log_account(worker: &WorkerContext, parameters: Value) -> Result<(), HandlerError> {
    let name = parameters
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::new("account.create needs a string 'name'"))?;
    info!(target: "toto_worker::methods", worker = worker.index(), name, "account requested");
    Ok(())
}

fn announce(
    worker: &WorkerContext,
    database: Option<&dyn DatabaseConnection>,
) -> Result<(), HookError> {
    info!(
        target: "toto_worker::methods",
        worker = worker.index(),
        database = database.map(DatabaseConnection::driver),
        "worker ready"
    );
    Ok(())
}
