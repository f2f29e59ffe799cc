//! Command-line producer for the worker service.
//!
//! `toto submit <METHOD> [PARAMETERS_JSON]` encodes a task envelope and pushes
//! it to the broker's inbound endpoint. Delivery is fire-and-forget: success
//! means the endpoint accepted the frame, not that a handler ran.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use serde_json::Value;
use toto_config::Endpoint;
use toto_worker::TaskProducer;

mod cli;
mod errors;

use cli::{Cli, CliCommand, SubmitArgs};
use errors::AppError;

/// Parses `args` and runs the selected command, reporting to the writers.
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) if !error.use_stderr() => {
            return match write!(stdout, "{error}") {
                Ok(()) => ExitCode::SUCCESS,
                Err(source) => report(stderr, &AppError::Output(source)),
            };
        }
        Err(error) => return report(stderr, &AppError::CliUsage(error)),
    };
    let outcome = match cli.command {
        CliCommand::Submit(submit) => submit_task(&submit),
    };
    match outcome {
        Ok(endpoint) => match writeln!(stdout, "submitted to {endpoint}") {
            Ok(()) => ExitCode::SUCCESS,
            Err(source) => report(stderr, &AppError::Output(source)),
        },
        Err(error) => report(stderr, &error),
    }
}

fn report<E: Write>(stderr: &mut E, error: &AppError) -> ExitCode {
    // With stderr unwritable as well, the exit status is the only report left.
    writeln!(stderr, "toto: {error}").ok();
    ExitCode::FAILURE
}

/// Validates the request before opening any connection.
fn prepare(submit: &SubmitArgs) -> Result<(Endpoint, Value), AppError> {
    if submit.method.trim().is_empty() {
        return Err(AppError::EmptyMethod);
    }
    let endpoint = submit
        .address
        .parse::<Endpoint>()
        .map_err(|source| AppError::Endpoint {
            address: submit.address.clone(),
            source,
        })?;
    let parameters = submit
        .parameters
        .as_deref()
        .map_or(Ok(Value::Null), serde_json::from_str)
        .map_err(AppError::Parameters)?;
    Ok((endpoint, parameters))
}

fn submit_task(submit: &SubmitArgs) -> Result<Endpoint, AppError> {
    let (endpoint, parameters) = prepare(submit)?;
    let mut producer = TaskProducer::connect(&endpoint).map_err(|source| AppError::Connect {
        endpoint: endpoint.to_string(),
        source,
    })?;
    producer
        .send(&submit.method, &parameters)
        .map_err(|source| AppError::Submit {
            endpoint: endpoint.to_string(),
            source,
        })?;
    Ok(endpoint)
}

#[cfg(test)]
mod tests;
