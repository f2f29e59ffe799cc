//! Behavioural tests covering lifecycle commands and pidfile bookkeeping.

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use toto_config::{Config, PidfileLayout};

use crate::process::{
    DaemonizeError, Daemonizer, LifecycleOutcome, Supervisor, SupervisorError,
};

const DETACHED_PID: u32 = 77_001;

type StepResult = Result<(), String>;

#[derive(Debug, Default)]
struct RecordingDaemonizer {
    calls: Arc<AtomicU32>,
}

impl Daemonizer for RecordingDaemonizer {
    fn spawn_detached(&self, _config: &Config) -> Result<u32, DaemonizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(DETACHED_PID)
    }
}

struct SupervisorWorld {
    dir: TempDir,
    supervisor: Supervisor<RecordingDaemonizer>,
    detach_calls: Arc<AtomicU32>,
    outcome: Option<Result<LifecycleOutcome, SupervisorError>>,
    reaper: Option<JoinHandle<ExitStatus>>,
}

impl SupervisorWorld {
    fn new() -> Self {
        let dir = TempDir::new().expect("pidfile directory");
        let layout = PidfileLayout::new(dir.path().join("toto.worker.pid")).expect("layout");
        let daemonizer = RecordingDaemonizer::default();
        let detach_calls = Arc::clone(&daemonizer.calls);
        let supervisor =
            Supervisor::new(layout, daemonizer).with_shutdown_timeout(Duration::from_secs(2));
        Self {
            dir,
            supervisor,
            detach_calls,
            outcome: None,
            reaper: None,
        }
    }

    fn pidfile(&self, index: usize) -> PathBuf {
        self.supervisor.layout().path_for(index)
    }

    fn record(&self, index: usize, pid: u32) {
        fs::write(self.pidfile(index), format!("{pid}\n")).expect("seed pidfile");
    }

    fn run(&mut self, command: &str) {
        let config = Config {
            daemon: Some(command.to_owned()),
            pidfile: self.dir.path().join("toto.worker.pid").to_str().map(str::to_owned),
            ..Config::default()
        };
        let outcome = config
            .lifecycle_command()
            .map_err(SupervisorError::from)
            .and_then(|lifecycle| self.supervisor.execute(lifecycle, &config));
        self.outcome = Some(outcome);
    }

    fn outcome(&self) -> Result<&Result<LifecycleOutcome, SupervisorError>, String> {
        self.outcome
            .as_ref()
            .ok_or_else(|| "no lifecycle command has run".to_owned())
    }
}

#[fixture]
fn world() -> RefCell<SupervisorWorld> {
    RefCell::new(SupervisorWorld::new())
}

#[given("an empty pidfile directory")]
fn given_empty_directory(world: &RefCell<SupervisorWorld>) {
    assert!(
        world
            .borrow()
            .supervisor
            .layout()
            .existing()
            .expect("scan")
            .is_empty()
    );
}

#[given("pidfile {index} records this process")]
fn given_pidfile_for_self(world: &RefCell<SupervisorWorld>, index: usize) {
    world.borrow().record(index, std::process::id());
}

#[given("pidfile {index} records an exited process")]
fn given_pidfile_for_exited(world: &RefCell<SupervisorWorld>, index: usize) {
    let mut child = Command::new("true").spawn().expect("spawn true");
    let pid = child.id();
    child.wait().expect("reap true");
    world.borrow().record(index, pid);
}

#[given("pidfile {index} records a running child")]
fn given_pidfile_for_child(world: &RefCell<SupervisorWorld>, index: usize) {
    let mut child = Command::new("sleep").arg("30").spawn().expect("spawn sleep");
    let pid = child.id();
    let mut world = world.borrow_mut();
    world.record(index, pid);
    world.reaper = Some(thread::spawn(move || child.wait().expect("reap sleep")));
}

#[when("the operator runs \"{command}\"")]
fn when_operator_runs(world: &RefCell<SupervisorWorld>, command: String) {
    world.borrow_mut().run(&command);
}

#[then("the lead pidfile records the detached supervisor")]
fn then_lead_pidfile(world: &RefCell<SupervisorWorld>) -> StepResult {
    let world = world.borrow();
    match world.outcome()? {
        Ok(LifecycleOutcome::Started { pid }) if *pid == DETACHED_PID => {}
        other => return Err(format!("unexpected outcome: {other:?}")),
    }
    let lead = fs::read_to_string(world.supervisor.layout().lead_path())
        .map_err(|error| error.to_string())?;
    assert_eq!(lead.trim(), DETACHED_PID.to_string());
    Ok(())
}

#[then("the command fails because the service is already running")]
fn then_already_running(world: &RefCell<SupervisorWorld>) -> StepResult {
    let world = world.borrow();
    match world.outcome()? {
        Err(SupervisorError::AlreadyRunning { pidfiles }) => {
            assert_eq!(pidfiles, &vec![world.pidfile(1)]);
            Ok(())
        }
        other => Err(format!("expected AlreadyRunning, got {other:?}")),
    }
}

#[then("pidfile {index} still records this process")]
fn then_pidfile_untouched(world: &RefCell<SupervisorWorld>, index: usize) {
    let content = fs::read_to_string(world.borrow().pidfile(index)).expect("pidfile readable");
    assert_eq!(content, format!("{}\n", std::process::id()));
}

#[then("no supervisor was detached")]
fn then_not_detached(world: &RefCell<SupervisorWorld>) {
    assert_eq!(world.borrow().detach_calls.load(Ordering::SeqCst), 0);
}

#[then("{count} processes were signalled")]
fn then_signalled(world: &RefCell<SupervisorWorld>, count: usize) -> StepResult {
    match world.borrow().outcome()? {
        Ok(LifecycleOutcome::Stopped(report)) => {
            assert_eq!(report.signalled.len(), count, "report: {report:?}");
            Ok(())
        }
        other => Err(format!("expected a stop outcome, got {other:?}")),
    }
}

#[then("the running child was terminated")]
fn then_child_terminated(world: &RefCell<SupervisorWorld>) -> StepResult {
    let reaper = world
        .borrow_mut()
        .reaper
        .take()
        .ok_or("no child was started")?;
    let status = reaper.join().map_err(|_| "reaper thread panicked")?;
    assert!(!status.success(), "SIGTERM should have ended the child");
    Ok(())
}

#[then("no pidfiles remain")]
fn then_no_pidfiles(world: &RefCell<SupervisorWorld>) {
    let remaining = world.borrow().supervisor.layout().existing().expect("scan");
    assert!(remaining.is_empty(), "left behind: {remaining:?}");
}

#[then("the command fails as an invalid lifecycle command")]
fn then_invalid_command(world: &RefCell<SupervisorWorld>) -> StepResult {
    match world.borrow().outcome()? {
        Err(SupervisorError::InvalidLifecycleCommand { .. }) => Ok(()),
        other => Err(format!("expected InvalidLifecycleCommand, got {other:?}")),
    }
}

#[scenario(path = "tests/features/supervisor_lifecycle.feature")]
fn supervisor_lifecycle(world: RefCell<SupervisorWorld>) {
    let _ = world;
}
