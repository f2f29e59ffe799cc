//! CLI entrypoint for submitting tasks to a running worker service.
//!
//! The binary delegates to [`toto_cli::run`], which parses the command line,
//! encodes the task envelope and pushes it to the configured endpoint.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    toto_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
