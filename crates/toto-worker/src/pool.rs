//! The pool manager: spawns workers and the broker, then supervises them.
//!
//! Children are re-executions of the current binary; the role and the
//! resolved configuration travel in the environment so every child builds
//! the same registry and reads the same settings as its parent.

use std::env;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use thiserror::Error;
use tracing::{info, warn};

use toto_config::{Config, EndpointParseError, PidfileLayout};

use crate::health::HealthReporter;
use crate::process::{
    CONFIG_ENV_VAR, ProcessRole, ROLE_ENV_VAR, ShutdownFlag, SupervisorError,
    WORKER_INDEX_ENV_VAR,
};

const POOL_TARGET: &str = concat!(env!("CARGO_CRATE_NAME"), "::pool");

const SUPERVISION_POLL: Duration = Duration::from_millis(250);

/// Resolves the configured worker count against the host.
///
/// Non-negative values are used as-is; negative values mean one worker per
/// available processing unit.
#[must_use]
pub fn resolve_worker_count(configured: i64, available: impl FnOnce() -> usize) -> usize {
    usize::try_from(configured).unwrap_or_else(|_| available())
}

/// Processing units reported by the host, falling back to one.
#[must_use]
pub fn available_parallelism() -> usize {
    thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

/// One child the pool should start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildSpec {
    /// Role of the child.
    pub role: ProcessRole,
    /// Pidfile index: workers are 1..=N, the broker N+1.
    pub index: usize,
}

/// Handle on a spawned child process.
#[cfg_attr(test, mockall::automock)]
pub trait SupervisedChild: Send {
    /// OS process id.
    fn pid(&self) -> u32;

    /// Exit status, if the child has exited.
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>>;

    /// Asks the child to shut down with `SIGTERM`.
    fn terminate(&mut self) -> io::Result<()>;

    /// Blocks until the child exits.
    fn wait(&mut self) -> io::Result<ExitStatus>;
}

/// Seam through which the pool starts children.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessLauncher {
    /// Starts the child described by `spec`.
    fn launch(&self, spec: ChildSpec) -> Result<Box<dyn SupervisedChild>, PoolError>;
}

/// Errors raised by the pool manager.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The running executable could not be located.
    #[error("failed to locate the current executable: {source}")]
    Executable {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The configuration could not be handed to children.
    #[error("failed to serialise configuration for child processes: {source}")]
    Configuration {
        /// Underlying serialisation error.
        #[source]
        source: serde_json::Error,
    },
    /// A configured endpoint could not be parsed.
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] EndpointParseError),
    /// A child could not be started.
    #[error("failed to spawn {role} {index}: {source}")]
    Spawn {
        /// Role of the child.
        role: ProcessRole,
        /// Pidfile index of the child.
        index: usize,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Recording a child's pid failed.
    #[error(transparent)]
    Pidfile(#[from] SupervisorError),
}

/// Launcher that re-executes the current binary once per child.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    executable: PathBuf,
    config: String,
}

impl CommandLauncher {
    /// Prepares a launcher that hands `config` to every child.
    pub fn new(config: &Config) -> Result<Self, PoolError> {
        let executable = env::current_exe().map_err(|source| PoolError::Executable { source })?;
        let config =
            serde_json::to_string(config).map_err(|source| PoolError::Configuration { source })?;
        Ok(Self { executable, config })
    }
}

impl ProcessLauncher for CommandLauncher {
    fn launch(&self, spec: ChildSpec) -> Result<Box<dyn SupervisedChild>, PoolError> {
        let child = Command::new(&self.executable)
            .env(ROLE_ENV_VAR, spec.role.as_str())
            .env(CONFIG_ENV_VAR, &self.config)
            .env(WORKER_INDEX_ENV_VAR, spec.index.to_string())
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| PoolError::Spawn {
                role: spec.role,
                index: spec.index,
                source,
            })?;
        Ok(Box::new(ChildProcess(child)))
    }
}

#[derive(Debug)]
struct ChildProcess(Child);

impl SupervisedChild for ChildProcess {
    fn pid(&self) -> u32 {
        self.0.id()
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.0.try_wait()
    }

    fn terminate(&mut self) -> io::Result<()> {
        let pid = i32::try_from(self.0.id())
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?;
        kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(io::Error::from)
    }

    fn wait(&mut self) -> io::Result<ExitStatus> {
        self.0.wait()
    }
}

/// What a pool run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    /// Workers started.
    pub workers: usize,
    /// Whether a broker was started.
    pub broker: bool,
    /// Children that exited before shutdown was requested.
    pub unexpected_exits: usize,
}

struct Running {
    spec: ChildSpec,
    pid: u32,
    child: Box<dyn SupervisedChild>,
}

/// Spawns the configured children and watches them until shutdown.
pub struct WorkerPool<'a> {
    config: &'a Config,
    launcher: &'a dyn ProcessLauncher,
    reporter: &'a dyn HealthReporter,
    pidfiles: Option<PidfileLayout>,
    available: fn() -> usize,
}

impl<'a> WorkerPool<'a> {
    /// Builds a pool that records no pidfiles.
    #[must_use]
    pub fn new(
        config: &'a Config,
        launcher: &'a dyn ProcessLauncher,
        reporter: &'a dyn HealthReporter,
    ) -> Self {
        Self {
            config,
            launcher,
            reporter,
            pidfiles: None,
            available: available_parallelism,
        }
    }

    /// Records one pidfile per child under `layout`.
    #[must_use]
    pub fn with_pidfiles(mut self, layout: PidfileLayout) -> Self {
        self.pidfiles = Some(layout);
        self
    }

    /// Overrides how processing units are counted.
    #[must_use]
    pub fn with_available_parallelism(mut self, available: fn() -> usize) -> Self {
        self.available = available;
        self
    }

    /// Children this configuration asks for, workers first.
    pub fn plan(&self) -> Result<Vec<ChildSpec>, PoolError> {
        let workers = resolve_worker_count(self.config.processes(), self.available);
        let mut plan: Vec<ChildSpec> = (1..=workers)
            .map(|index| ChildSpec {
                role: ProcessRole::Worker,
                index,
            })
            .collect();
        if self.config.inbound_endpoint()?.is_some() {
            plan.push(ChildSpec {
                role: ProcessRole::Broker,
                index: workers + 1,
            });
        }
        Ok(plan)
    }

    /// Starts every planned child, calls `ready`, and supervises until
    /// `shutdown` is set or no child is left.
    ///
    /// Crashed children are reported but not restarted.
    pub fn run(
        &self,
        shutdown: &ShutdownFlag,
        ready: impl FnOnce(),
    ) -> Result<PoolReport, PoolError> {
        let plan = self.plan()?;
        let mut report = PoolReport::default();
        let mut running = Vec::with_capacity(plan.len());
        for spec in plan {
            match self.spawn(spec) {
                Ok(child) => {
                    match spec.role {
                        ProcessRole::Broker => report.broker = true,
                        _ => report.workers += 1,
                    }
                    running.push(child);
                }
                Err(error) => {
                    warn!(target: POOL_TARGET, error = %error, "aborting pool startup");
                    self.terminate_all(running);
                    return Err(error);
                }
            }
        }
        if running.is_empty() {
            warn!(target: POOL_TARGET, "no workers and no broker configured; nothing to run");
        }
        info!(
            target: POOL_TARGET,
            workers = report.workers,
            broker = report.broker,
            "pool started"
        );
        ready();

        while !shutdown.is_set() && !running.is_empty() {
            report.unexpected_exits += self.reap_exited(&mut running);
            if !running.is_empty() {
                thread::sleep(SUPERVISION_POLL);
            }
        }
        self.terminate_all(running);
        self.reporter
            .pool_stopped(report.workers + usize::from(report.broker));
        Ok(report)
    }

    fn spawn(&self, spec: ChildSpec) -> Result<Running, PoolError> {
        let mut child = self.launcher.launch(spec)?;
        let pid = child.pid();
        if let Some(layout) = &self.pidfiles {
            if let Err(error) = crate::process::write_pid(&layout.path_for(spec.index), pid) {
                discard(pid, child.as_mut());
                return Err(error.into());
            }
        }
        self.reporter.process_spawned(spec.role, pid);
        Ok(Running { spec, pid, child })
    }

    fn reap_exited(&self, running: &mut Vec<Running>) -> usize {
        let before = running.len();
        running.retain_mut(|entry| match entry.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.reporter
                    .process_exited(entry.spec.role, entry.pid, status, false);
                false
            }
            Err(error) => {
                warn!(target: POOL_TARGET, pid = entry.pid, error = %error, "failed to poll child");
                true
            }
        });
        before - running.len()
    }

    fn terminate_all(&self, running: Vec<Running>) {
        let mut signalled = Vec::with_capacity(running.len());
        for mut entry in running {
            if let Err(error) = entry.child.terminate() {
                warn!(target: POOL_TARGET, pid = entry.pid, error = %error, "failed to signal child");
            }
            signalled.push(entry);
        }
        for mut entry in signalled {
            match entry.child.wait() {
                Ok(status) => {
                    self.reporter
                        .process_exited(entry.spec.role, entry.pid, status, true);
                }
                Err(error) => {
                    warn!(target: POOL_TARGET, pid = entry.pid, error = %error, "failed to reap child");
                }
            }
        }
    }
}

/// Stops a child that never joined the pool; failures are logged only.
fn discard(pid: u32, child: &mut dyn SupervisedChild) {
    if let Err(error) = child.terminate() {
        warn!(target: POOL_TARGET, pid, error = %error, "failed to signal child");
    }
    if let Err(error) = child.wait() {
        warn!(target: POOL_TARGET, pid, error = %error, "failed to reap child");
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::process::ExitStatusExt;
    use std::sync::Mutex;

    use mockall::predicate::eq;
    use rstest::rstest;

    use super::*;
    use crate::tests::support::{HealthEvent, RecordingHealthReporter};

    fn config(processes: i64, worker_address: &str) -> Config {
        Config {
            processes: Some(processes),
            worker_address: Some(worker_address.to_owned()),
            ..Config::default()
        }
    }

    fn stopping_child(pid: u32) -> Box<dyn SupervisedChild> {
        let mut child = MockSupervisedChild::new();
        child.expect_pid().return_const(pid);
        child.expect_terminate().times(1).returning(|| Ok(()));
        child
            .expect_wait()
            .times(1)
            .returning(|| Ok(ExitStatus::from_raw(0)));
        Box::new(child)
    }

    #[rstest]
    #[case(4, 8, 4)]
    #[case(0, 8, 0)]
    #[case(-1, 8, 8)]
    #[case(-5, 3, 3)]
    fn resolves_worker_counts(#[case] configured: i64, #[case] cpus: usize, #[case] expected: usize) {
        assert_eq!(resolve_worker_count(configured, || cpus), expected);
    }

    #[rstest]
    fn negative_counts_spawn_one_worker_per_cpu_plus_the_broker() {
        let config = config(-1, "tcp://*:55555");
        let mut launcher = MockProcessLauncher::new();
        for index in 1..=3 {
            launcher
                .expect_launch()
                .with(eq(ChildSpec { role: ProcessRole::Worker, index }))
                .times(1)
                .returning(move |_| Ok(stopping_child(1000 + u32::try_from(index).expect("index"))));
        }
        launcher
            .expect_launch()
            .with(eq(ChildSpec { role: ProcessRole::Broker, index: 4 }))
            .times(1)
            .returning(|_| Ok(stopping_child(2000)));
        let reporter = RecordingHealthReporter::default();
        let shutdown = ShutdownFlag::new();
        shutdown.trigger();

        let report = WorkerPool::new(&config, &launcher, &reporter)
            .with_available_parallelism(|| 3)
            .run(&shutdown, || {})
            .expect("pool run");

        assert_eq!(report, PoolReport { workers: 3, broker: true, unexpected_exits: 0 });
        let events = reporter.events();
        assert!(events.contains(&HealthEvent::ProcessSpawned(ProcessRole::Broker, 2000)));
        assert!(events.contains(&HealthEvent::PoolStopped(4)));
    }

    #[rstest]
    fn zero_workers_runs_only_the_broker() {
        let config = config(0, "tcp://*:55555");
        let mut launcher = MockProcessLauncher::new();
        launcher
            .expect_launch()
            .with(eq(ChildSpec { role: ProcessRole::Broker, index: 1 }))
            .times(1)
            .returning(|_| Ok(stopping_child(2000)));
        let reporter = RecordingHealthReporter::default();
        let shutdown = ShutdownFlag::new();
        shutdown.trigger();

        let report = WorkerPool::new(&config, &launcher, &reporter)
            .run(&shutdown, || {})
            .expect("pool run");
        assert_eq!(report, PoolReport { workers: 0, broker: true, unexpected_exits: 0 });
    }

    #[rstest]
    fn an_empty_inbound_address_disables_the_broker() {
        let config = config(2, "");
        let pool_launcher = MockProcessLauncher::new();
        let reporter = RecordingHealthReporter::default();
        let plan = WorkerPool::new(&config, &pool_launcher, &reporter)
            .plan()
            .expect("plan");
        assert_eq!(
            plan,
            vec![
                ChildSpec { role: ProcessRole::Worker, index: 1 },
                ChildSpec { role: ProcessRole::Worker, index: 2 },
            ]
        );
    }

    #[rstest]
    fn writes_one_pidfile_per_child_and_signals_readiness_afterwards() {
        let dir = tempfile::tempdir().expect("temp dir");
        let layout = PidfileLayout::new(dir.path().join("toto.worker.pid")).expect("layout");
        let config = config(1, "tcp://*:55555");
        let mut launcher = MockProcessLauncher::new();
        launcher
            .expect_launch()
            .returning(|spec| Ok(stopping_child(3000 + u32::try_from(spec.index).expect("index"))));
        let reporter = RecordingHealthReporter::default();
        let shutdown = ShutdownFlag::new();
        shutdown.trigger();
        let observed = Mutex::new(Vec::new());

        WorkerPool::new(&config, &launcher, &reporter)
            .with_pidfiles(layout.clone())
            .run(&shutdown, || {
                *observed.lock().expect("mutex") = layout.existing().expect("scan");
            })
            .expect("pool run");

        assert_eq!(
            *observed.lock().expect("mutex"),
            vec![layout.path_for(1), layout.path_for(2)]
        );
        assert_eq!(
            std::fs::read_to_string(layout.path_for(2)).expect("broker pidfile"),
            "3002\n"
        );
    }

    #[rstest]
    fn crashed_children_are_reported_and_not_restarted() {
        let config = config(1, "");
        let mut launcher = MockProcessLauncher::new();
        launcher.expect_launch().times(1).returning(|_| {
            let mut child = MockSupervisedChild::new();
            child.expect_pid().return_const(4001_u32);
            child
                .expect_try_wait()
                .times(1)
                .returning(|| Ok(Some(ExitStatus::from_raw(1 << 8))));
            Ok(Box::new(child))
        });
        let reporter = RecordingHealthReporter::default();

        let report = WorkerPool::new(&config, &launcher, &reporter)
            .run(&ShutdownFlag::new(), || {})
            .expect("pool run");

        assert_eq!(report.unexpected_exits, 1);
        assert!(reporter.events().contains(&HealthEvent::ProcessExited {
            role: ProcessRole::Worker,
            pid: 4001,
            expected: false,
        }));
    }

    #[rstest]
    fn spawn_failures_tear_down_started_children() {
        let config = config(2, "");
        let mut launcher = MockProcessLauncher::new();
        launcher
            .expect_launch()
            .with(eq(ChildSpec { role: ProcessRole::Worker, index: 1 }))
            .returning(|_| Ok(stopping_child(5001)));
        launcher
            .expect_launch()
            .with(eq(ChildSpec { role: ProcessRole::Worker, index: 2 }))
            .returning(|spec| {
                Err(PoolError::Spawn {
                    role: spec.role,
                    index: spec.index,
                    source: io::Error::other("fork failed"),
                })
            });
        let reporter = RecordingHealthReporter::default();

        let result = WorkerPool::new(&config, &launcher, &reporter).run(&ShutdownFlag::new(), || {
            panic!("readiness must not be announced");
        });
        assert!(matches!(result, Err(PoolError::Spawn { index: 2, .. })));
    }

    #[rstest]
    fn pidfile_failures_reap_the_child_even_when_signalling_fails() {
        let dir = tempfile::tempdir().expect("temp dir");
        let layout =
            PidfileLayout::new(dir.path().join("missing").join("toto.worker.pid")).expect("layout");
        let config = config(1, "");
        let mut launcher = MockProcessLauncher::new();
        launcher.expect_launch().times(1).returning(|_| {
            let mut child = MockSupervisedChild::new();
            child.expect_pid().return_const(6001_u32);
            child
                .expect_terminate()
                .times(1)
                .returning(|| Err(io::Error::other("already gone")));
            child
                .expect_wait()
                .times(1)
                .returning(|| Ok(ExitStatus::from_raw(0)));
            Ok(Box::new(child))
        });
        let reporter = RecordingHealthReporter::default();

        let result = WorkerPool::new(&config, &launcher, &reporter)
            .with_pidfiles(layout)
            .run(&ShutdownFlag::new(), || panic!("readiness must not be announced"));
        assert!(matches!(result, Err(PoolError::Pidfile(_))));
    }
}
