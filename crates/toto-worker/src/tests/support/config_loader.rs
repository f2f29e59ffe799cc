//! Test configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use toto_config::Config;

use crate::bootstrap::{ConfigLoadError, ConfigLoader};

/// Loader that places the queue socket and pidfiles under a temporary directory.
pub struct TestConfigLoader {
    dir: Arc<Mutex<TempDir>>,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temporary directory");
        Self {
            dir: Arc::new(Mutex::new(dir)),
        }
    }

    fn path(&self, name: &str) -> String {
        let dir = self.dir.lock().expect("temporary directory mutex poisoned");
        dir.path()
            .join(name)
            .to_str()
            .expect("temporary path was not valid UTF-8")
            .to_owned()
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, ConfigLoadError> {
        Ok(Config {
            worker_address: Some(format!("ipc://{}", self.path("inbound.sock"))),
            worker_socket_address: Some(format!("ipc://{}", self.path("queue.sock"))),
            pidfile: Some(self.path("toto.worker.pid")),
            ..Config::default()
        })
    }
}

/// Loader that intentionally fails by passing an unknown flag.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, ConfigLoadError> {
        let args = vec![
            OsString::from("toto-worker"),
            OsString::from("--processes"),
            OsString::from("many"),
        ];
        Ok(Config::load_from_args(args)?)
    }
}
