//! CLI argument definitions for the task producer.

use clap::{Parser, Subcommand};

/// Endpoint a producer reaches when no address is given: the broker's
/// default inbound port on the local host.
pub(crate) const DEFAULT_SUBMIT_ADDRESS: &str = "tcp://127.0.0.1:55555";

/// Command-line interface for submitting tasks to the worker service.
#[derive(Parser, Debug)]
#[command(name = "toto", disable_help_subcommand = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Structured subcommands.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Encodes one task and pushes it to the service.
    Submit(SubmitArgs),
}

/// Arguments of `toto submit`.
#[derive(clap::Args, Debug, Clone)]
pub(crate) struct SubmitArgs {
    /// Dotted method path, for example `account.create`.
    #[arg(value_name = "METHOD")]
    pub(crate) method: String,
    /// Task parameters as a JSON document; `null` when omitted.
    #[arg(value_name = "PARAMETERS_JSON")]
    pub(crate) parameters: Option<String>,
    /// Broker inbound endpoint, or the queue endpoint when no broker runs.
    #[arg(long, value_name = "ENDPOINT", default_value = DEFAULT_SUBMIT_ADDRESS)]
    pub(crate) address: String,
}
