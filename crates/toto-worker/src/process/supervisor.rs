//! Translates lifecycle commands into pidfile bookkeeping and signals.

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use toto_config::{Config, LifecycleCommand, PidfileLayout};

use super::daemonizer::Daemonizer;
use super::errors::SupervisorError;
use super::pidfiles::{read_pid, remove_pid, write_pid};
use super::{PROCESS_TARGET, SHUTDOWN_TIMEOUT};

const EXIT_POLL: Duration = Duration::from_millis(50);

/// What `stop` found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Processes that received `SIGTERM`.
    pub signalled: Vec<i32>,
    /// Recorded processes that no longer existed.
    pub already_gone: Vec<i32>,
    /// Pidfiles removed, ordered by index.
    pub removed: Vec<PathBuf>,
}

/// Result of one lifecycle command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// A supervisor was detached with this pid.
    Started {
        /// Pid recorded in the lead pidfile.
        pid: u32,
    },
    /// Recorded processes were stopped.
    Stopped(StopReport),
    /// Recorded processes were stopped and a new supervisor detached.
    Restarted {
        /// Outcome of the stop half.
        stopped: StopReport,
        /// Pid recorded in the new lead pidfile.
        pid: u32,
    },
    /// Nothing to do here; the caller runs the pool in the foreground.
    Foreground,
}

/// Owns the pidfile directory for one configured base path.
#[derive(Debug)]
pub struct Supervisor<D> {
    layout: PidfileLayout,
    daemonizer: D,
    shutdown_timeout: Duration,
}

impl<D> Supervisor<D>
where
    D: Daemonizer,
{
    /// Builds a supervisor over `layout` that detaches with `daemonizer`.
    #[must_use]
    pub fn new(layout: PidfileLayout, daemonizer: D) -> Self {
        Self {
            layout,
            daemonizer,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
        }
    }

    /// Overrides how long `stop` waits for signalled processes to exit.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Pidfile naming in use.
    #[must_use]
    pub const fn layout(&self) -> &PidfileLayout {
        &self.layout
    }

    /// Runs `command` against the recorded process tree.
    ///
    /// `restart` stops before it starts, so a failed stop never leaves two
    /// pools racing for the same endpoints.
    pub fn execute(
        &self,
        command: LifecycleCommand,
        config: &Config,
    ) -> Result<LifecycleOutcome, SupervisorError> {
        let stopped = if command.stops() { Some(self.stop()?) } else { None };
        let started = if command.starts() { Some(self.start(config)?) } else { None };
        Ok(match (stopped, started) {
            (Some(stopped), Some(pid)) => LifecycleOutcome::Restarted { stopped, pid },
            (Some(stopped), None) => LifecycleOutcome::Stopped(stopped),
            (None, Some(pid)) => LifecycleOutcome::Started { pid },
            (None, None) => LifecycleOutcome::Foreground,
        })
    }

    /// Refuses to start while any pidfile of the layout exists.
    pub fn ensure_not_running(&self) -> Result<(), SupervisorError> {
        let pidfiles = self.layout.existing()?;
        if pidfiles.is_empty() {
            return Ok(());
        }
        info!(
            target: PROCESS_TARGET,
            count = pidfiles.len(),
            "refusing to start: pidfiles exist"
        );
        Err(SupervisorError::AlreadyRunning { pidfiles })
    }

    /// Detaches a supervisor and records its pid in the lead pidfile.
    pub fn start(&self, config: &Config) -> Result<u32, SupervisorError> {
        self.ensure_not_running()?;
        let directory = self.layout.directory();
        fs::create_dir_all(directory).map_err(|source| SupervisorError::PidWrite {
            path: directory.to_path_buf(),
            source,
        })?;
        let pid = self.daemonizer.spawn_detached(config)?;
        write_pid(&self.layout.lead_path(), pid)?;
        Ok(pid)
    }

    /// Signals every recorded process and removes its pidfile.
    ///
    /// Processes that are already gone are skipped silently. With no
    /// pidfiles this does nothing.
    pub fn stop(&self) -> Result<StopReport, SupervisorError> {
        let mut report = StopReport::default();
        for path in self.layout.existing()? {
            match read_pid(&path) {
                Ok(pid) => match kill(Pid::from_raw(pid), Signal::SIGTERM) {
                    Ok(()) => {
                        info!(target: PROCESS_TARGET, pid, file = %path.display(), "sent SIGTERM");
                        report.signalled.push(pid);
                    }
                    Err(Errno::ESRCH) => {
                        debug!(target: PROCESS_TARGET, pid, "recorded process already exited");
                        report.already_gone.push(pid);
                    }
                    Err(source) => return Err(SupervisorError::Signal { pid, source }),
                },
                Err(SupervisorError::PidParse { path: unreadable }) => {
                    warn!(
                        target: PROCESS_TARGET,
                        file = %unreadable.display(),
                        "discarding pidfile without a process id"
                    );
                }
                Err(error) => return Err(error),
            }
            remove_pid(&path)?;
            report.removed.push(path);
        }
        self.wait_for_exit(&report.signalled);
        Ok(report)
    }

    fn wait_for_exit(&self, pids: &[i32]) {
        let deadline = Instant::now() + self.shutdown_timeout;
        let mut remaining: Vec<i32> = pids.to_vec();
        while !remaining.is_empty() {
            remaining.retain(|pid| kill(Pid::from_raw(*pid), None) != Err(Errno::ESRCH));
            if remaining.is_empty() {
                return;
            }
            if Instant::now() >= deadline {
                warn!(
                    target: PROCESS_TARGET,
                    pids = ?remaining,
                    timeout_ms = self.shutdown_timeout.as_millis(),
                    "processes still running after SIGTERM"
                );
                return;
            }
            thread::sleep(EXIT_POLL);
        }
    }
}
