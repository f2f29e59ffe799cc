//! Reading, writing and removing individual pidfiles.

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tempfile::Builder;
use tracing::{debug, info};

use super::PROCESS_TARGET;
use super::errors::SupervisorError;

/// Records `pid` at `path` as decimal text.
///
/// The file is written to a temporary sibling, fsync'd and renamed into
/// place so `stop` never reads a partial id.
pub(crate) fn write_pid(path: &Path, pid: u32) -> Result<(), SupervisorError> {
    let write_error = |source| SupervisorError::PidWrite {
        path: path.to_path_buf(),
        source,
    };
    let directory = path.parent().ok_or_else(|| {
        write_error(io::Error::new(
            io::ErrorKind::NotFound,
            "pidfile path has no parent directory",
        ))
    })?;
    let prefix = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("toto");
    let mut file = Builder::new()
        .prefix(prefix)
        .permissions(fs::Permissions::from_mode(0o600))
        .tempfile_in(directory)
        .map_err(write_error)?;
    writeln!(file, "{pid}").map_err(write_error)?;
    file.as_file().sync_all().map_err(write_error)?;
    file.persist(path)
        .map_err(|error| write_error(error.error))?;
    info!(
        target: PROCESS_TARGET,
        pid,
        file = %path.display(),
        "pidfile written"
    );
    Ok(())
}

/// Reads the process id recorded at `path`.
pub(crate) fn read_pid(path: &Path) -> Result<i32, SupervisorError> {
    let content = fs::read_to_string(path).map_err(|source| SupervisorError::PidRead {
        path: path.to_path_buf(),
        source,
    })?;
    content
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|pid| *pid > 0)
        .ok_or_else(|| SupervisorError::PidParse {
            path: path.to_path_buf(),
        })
}

/// Removes the pidfile at `path`; a file that is already gone is fine.
pub(crate) fn remove_pid(path: &Path) -> Result<(), SupervisorError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(target: PROCESS_TARGET, file = %path.display(), "pidfile removed");
            Ok(())
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SupervisorError::PidRemove {
            path: path.to_path_buf(),
            source,
        }),
    }
}
