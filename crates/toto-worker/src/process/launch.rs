//! Entry point shared by every process in the tree.

use std::env;
use std::process::ExitCode;

use tracing::{error, info, warn};

use toto_config::Config;

use crate::bootstrap::{ConfigLoader, InheritedConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::broker::{Broker, QueueHost};
use crate::dispatch::ServiceRegistry;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::pool::{CommandLauncher, WorkerPool};
use crate::worker::Worker;

use super::daemonizer::{SystemDaemonizer, announce_ready};
use super::errors::{LaunchError, SupervisorError};
use super::shutdown::ShutdownFlag;
use super::supervisor::{LifecycleOutcome, Supervisor};
use super::{PROCESS_TARGET, ProcessRole, WORKER_INDEX_ENV_VAR};

/// Runs this process in the role recorded in its environment.
///
/// An operator invocation interprets the lifecycle command; re-executed
/// children run as supervisor, worker or broker. Applications call this from
/// `main` after registering their handlers, so every child sees the same
/// registry.
pub fn run(registry: ServiceRegistry) -> ExitCode {
    let role = ProcessRole::detect();
    let reporter = StructuredHealthReporter::new();
    match run_role(role, &registry, &reporter) {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            error!(target: PROCESS_TARGET, role = %role, error = %failure, "process failed");
            eprintln!("{failure}");
            ExitCode::FAILURE
        }
    }
}

/// Runs `role` with the supplied registry and reporter.
pub fn run_role(
    role: ProcessRole,
    registry: &ServiceRegistry,
    reporter: &dyn HealthReporter,
) -> Result<(), LaunchError> {
    match role {
        ProcessRole::Controller => run_controller(&SystemConfigLoader, reporter),
        ProcessRole::Supervisor => run_supervisor(reporter),
        ProcessRole::Worker => run_worker(registry, reporter),
        ProcessRole::Broker => run_broker(reporter),
    }
}

fn run_controller(loader: &dyn ConfigLoader, reporter: &dyn HealthReporter) -> Result<(), LaunchError> {
    let config = bootstrap_with(loader, reporter)?.into_config();
    let command = config
        .lifecycle_command()
        .map_err(SupervisorError::from)?;
    info!(target: PROCESS_TARGET, ?command, "lifecycle command resolved");
    let layout = config.pidfile_layout().map_err(SupervisorError::from)?;
    let supervisor = Supervisor::new(layout, SystemDaemonizer::new());
    match supervisor.execute(command, &config)? {
        LifecycleOutcome::Foreground => run_pool(&config, reporter, None),
        LifecycleOutcome::Started { pid } | LifecycleOutcome::Restarted { pid, .. } => {
            info!(target: PROCESS_TARGET, pid, "service started in the background");
            Ok(())
        }
        LifecycleOutcome::Stopped(report) => {
            info!(
                target: PROCESS_TARGET,
                signalled = report.signalled.len(),
                already_gone = report.already_gone.len(),
                "service stopped"
            );
            Ok(())
        }
    }
}

fn run_supervisor(reporter: &dyn HealthReporter) -> Result<(), LaunchError> {
    let config = bootstrap_with(&InheritedConfigLoader, reporter)?.into_config();
    let layout = config.pidfile_layout().map_err(SupervisorError::from)?;
    run_pool(&config, reporter, Some(layout))
}

fn run_pool(
    config: &Config,
    reporter: &dyn HealthReporter,
    pidfiles: Option<toto_config::PidfileLayout>,
) -> Result<(), LaunchError> {
    let shutdown = ShutdownFlag::install()?;
    let launcher = CommandLauncher::new(config)?;
    let mut pool = WorkerPool::new(config, &launcher, reporter);
    let daemonised = pidfiles.is_some();
    if let Some(layout) = pidfiles {
        pool = pool.with_pidfiles(layout);
    }
    let queue_host = match config.inbound_endpoint()? {
        Some(_) => None,
        None => Some(QueueHost::bind(&config.queue_endpoint()?)?),
    };
    let outcome = pool.run(&shutdown, || {
        if daemonised && let Err(failure) = announce_ready() {
            warn!(target: PROCESS_TARGET, error = %failure, "failed to announce readiness");
        }
    });
    if let Some(host) = queue_host {
        host.shutdown()?;
    }
    outcome?;
    Ok(())
}

fn run_worker(registry: &ServiceRegistry, reporter: &dyn HealthReporter) -> Result<(), LaunchError> {
    let config = bootstrap_with(&InheritedConfigLoader, reporter)?.into_config();
    let index = worker_index()?;
    let shutdown = ShutdownFlag::install()?;
    let endpoint = config.queue_endpoint()?;
    let worker = Worker::start(index, &config, registry)?;
    worker.run(&endpoint, &shutdown);
    Ok(())
}

fn run_broker(reporter: &dyn HealthReporter) -> Result<(), LaunchError> {
    let config = bootstrap_with(&InheritedConfigLoader, reporter)?.into_config();
    let shutdown = ShutdownFlag::install()?;
    let Some(inbound) = config.inbound_endpoint()? else {
        warn!(target: PROCESS_TARGET, "broker started without an inbound address; exiting");
        return Ok(());
    };
    let broker = Broker::bind(&inbound, &config.queue_endpoint()?)?;
    broker.run(&shutdown, reporter)?;
    Ok(())
}

fn worker_index() -> Result<usize, LaunchError> {
    let value = env::var(WORKER_INDEX_ENV_VAR).unwrap_or_default();
    value
        .parse::<usize>()
        .ok()
        .filter(|index| *index > 0)
        .ok_or(LaunchError::WorkerIndex { value })
}
