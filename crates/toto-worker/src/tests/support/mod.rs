//! Test harness utilities shared by the worker service suites.

mod config_loader;
mod logs;
mod reporter;
mod world;

pub use config_loader::{FailingConfigLoader, TestConfigLoader};
pub use logs::CapturedLogs;
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use world::{TestWorld, world};
