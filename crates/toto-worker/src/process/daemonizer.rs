//! Implements the daemonisation backend for the `toto-worker` supervisor.

use std::env;
use std::fs::OpenOptions;
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use nix::unistd::setsid;
use tracing::info;

use toto_config::Config;

use super::errors::DaemonizeError;
use super::{CONFIG_ENV_VAR, PROCESS_TARGET, ProcessRole, ROLE_ENV_VAR};

/// Line the detached supervisor writes once its pidfiles exist.
const READY_LINE: &str = "ready";

/// Abstraction over daemonisation strategies.
pub trait Daemonizer: Send + Sync {
    /// Starts the supervisor detached from the terminal.
    ///
    /// Returns the supervisor's pid only after it has confirmed that it is
    /// running.
    fn spawn_detached(&self, config: &Config) -> Result<u32, DaemonizeError>;
}

/// Daemoniser that re-executes the current binary in a new session.
#[derive(Debug, Default)]
pub struct SystemDaemonizer;

impl SystemDaemonizer {
    /// Builds a new system daemoniser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Daemonizer for SystemDaemonizer {
    fn spawn_detached(&self, config: &Config) -> Result<u32, DaemonizeError> {
        let executable =
            env::current_exe().map_err(|source| DaemonizeError::Executable { source })?;
        let serialised = serde_json::to_string(config)
            .map_err(|source| DaemonizeError::Configuration { source })?;
        let mut command = Command::new(executable);
        command
            .env(ROLE_ENV_VAR, ProcessRole::Supervisor.as_str())
            .env(CONFIG_ENV_VAR, serialised)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(detached_stderr(config)?);
        // SAFETY: `setsid` is async-signal-safe and touches no parent state.
        unsafe {
            command.pre_exec(|| setsid().map(|_| ()).map_err(io::Error::from));
        }
        let mut child = command
            .spawn()
            .map_err(|source| DaemonizeError::Spawn { source })?;
        let pid = child.id();

        let mut line = String::new();
        if let Some(stdout) = child.stdout.take() {
            BufReader::new(stdout)
                .read_line(&mut line)
                .map_err(|source| DaemonizeError::Readiness { source })?;
        }
        if line.trim_end() != READY_LINE {
            let status = child
                .wait()
                .map_err(|source| DaemonizeError::Readiness { source })?;
            return Err(DaemonizeError::NotReady { status });
        }
        info!(
            target: PROCESS_TARGET,
            pid,
            "supervisor detached into the background"
        );
        Ok(pid)
    }
}

/// Where the supervisor, and the children inheriting from it, write logs.
///
/// A configured log file is opened for appending; without one the detached
/// tree has no terminal to write to and its output is discarded.
fn detached_stderr(config: &Config) -> Result<Stdio, DaemonizeError> {
    let Some(path) = config.log_file() else {
        return Ok(Stdio::null());
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| DaemonizeError::LogFile {
            path: path.into(),
            source,
        })?;
    Ok(Stdio::from(file))
}

/// Tells a waiting [`SystemDaemonizer`] that the supervisor is running.
pub(crate) fn announce_ready() -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{READY_LINE}")?;
    stdout.flush()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn log_file_is_created_and_appended_to() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("toto.log");
        std::fs::write(&path, "earlier run\n").expect("seed log");
        let config = Config {
            log_file: Some(path.to_str().expect("utf8").to_owned()),
            ..Config::default()
        };

        detached_stderr(&config).expect("open log file");
        assert_eq!(
            std::fs::read_to_string(&path).expect("log contents"),
            "earlier run\n"
        );

        std::fs::remove_file(&path).expect("remove log");
        detached_stderr(&config).expect("recreate log file");
        assert!(path.exists());
    }

    #[rstest]
    fn unopenable_log_files_name_the_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("missing").join("toto.log");
        let config = Config {
            log_file: Some(path.to_str().expect("utf8").to_owned()),
            ..Config::default()
        };
        let Err(DaemonizeError::LogFile { path: reported, .. }) = detached_stderr(&config) else {
            panic!("expected a log file error");
        };
        assert_eq!(reported, path);
    }
}
