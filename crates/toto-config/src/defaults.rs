/// Broker inbound endpoint used when none is configured.
pub const DEFAULT_INBOUND_ADDRESS: &str = "tcp://*:55555";

/// Internal queue endpoint shared by the broker and local workers.
pub const DEFAULT_QUEUE_ADDRESS: &str = "ipc:///tmp/workerservice.sock";

/// Worker count setting; negative values resolve to one worker per CPU.
pub const DEFAULT_PROCESSES: i64 = -1;

/// Name of the handler root module looked up in the registry.
pub const DEFAULT_METHOD_MODULE: &str = "methods";

/// Pidfile base path; indices are inserted before the extension.
pub const DEFAULT_PIDFILE: &str = "toto.worker.pid";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the binaries.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}
