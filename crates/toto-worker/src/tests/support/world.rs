//! Scenario world for the bootstrap behaviour suite.

use std::cell::RefCell;
use std::sync::Arc;

use toto_config::Config;

use crate::bootstrap::{BootstrapError, Bootstrapped, ConfigLoader, StaticConfigLoader, bootstrap_with};

use super::{FailingConfigLoader, RecordingHealthReporter, TestConfigLoader};

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    loader: Box<dyn ConfigLoader>,
    pub reporter: Arc<RecordingHealthReporter>,
    outcome: Option<Result<Bootstrapped, BootstrapError>>,
}

impl TestWorld {
    /// Builds a world with a successful configuration loader.
    pub fn new() -> Self {
        Self {
            loader: Box::new(TestConfigLoader::new()),
            reporter: Arc::new(RecordingHealthReporter::default()),
            outcome: None,
        }
    }

    /// Installs a loader that always fails.
    pub fn use_failing_loader(&mut self) {
        self.loader = Box::new(FailingConfigLoader);
        self.outcome = None;
    }

    /// Installs a loader that succeeds.
    pub fn use_successful_loader(&mut self) {
        self.loader = Box::new(TestConfigLoader::new());
        self.outcome = None;
    }

    /// Installs a loader returning `config` verbatim.
    pub fn use_config(&mut self, config: Config) {
        self.loader = Box::new(StaticConfigLoader::new(config));
        self.outcome = None;
    }

    /// Runs the bootstrap sequence once.
    pub fn bootstrap(&mut self) {
        if self.outcome.is_some() {
            return;
        }
        self.outcome = Some(bootstrap_with(&*self.loader, &*self.reporter));
    }

    /// Returns the bootstrap error, if bootstrap failed.
    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.outcome.as_ref().and_then(|outcome| outcome.as_ref().err())
    }

    /// Returns the resolved configuration, if bootstrap succeeded.
    pub fn config(&self) -> Option<&Config> {
        self.outcome
            .as_ref()
            .and_then(|outcome| outcome.as_ref().ok())
            .map(Bootstrapped::config)
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Default test world fixture.
#[must_use]
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
