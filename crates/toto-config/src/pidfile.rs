//! Pidfile naming shared by the daemon supervisor and its lifecycle commands.
//!
//! One configured base path fans out into one file per supervised process by
//! inserting a numeric index before the extension: `toto.worker.pid` becomes
//! `toto.worker.0.pid`, `toto.worker.1.pid`, and so on; a base without an
//! extension gets the index appended (`service` -> `service.1`). Index 0 is
//! the lead pidfile recording the supervisor itself.

use std::fs;
use std::io;
use std::path::{self, Path, PathBuf};

use thiserror::Error;

/// Index of the pidfile recording the detached supervisor process.
const LEAD_INDEX: usize = 0;

/// Deterministic pidfile naming derived from one base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidfileLayout {
    directory: PathBuf,
    stem: String,
    extension: Option<String>,
}

impl PidfileLayout {
    /// Resolves `base` against the working directory and splits its file name.
    pub fn new(base: impl AsRef<Path>) -> Result<Self, PidfileLayoutError> {
        let base = base.as_ref();
        let absolute = path::absolute(base).map_err(|source| PidfileLayoutError::Resolve {
            path: base.to_path_buf(),
            source,
        })?;
        let file_name = absolute
            .file_name()
            .ok_or_else(|| PidfileLayoutError::MissingFileName {
                path: absolute.clone(),
            })?
            .to_str()
            .ok_or_else(|| PidfileLayoutError::NonUtf8 {
                path: absolute.clone(),
            })?
            .to_owned();
        let directory = absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        let (stem, extension) = match file_name.rsplit_once('.') {
            Some((stem, extension)) => (stem.to_owned(), Some(extension.to_owned())),
            None => (file_name, None),
        };
        Ok(Self {
            directory,
            stem,
            extension,
        })
    }

    /// Directory holding every pidfile of this layout.
    #[must_use]
    pub fn directory(&self) -> &Path {
        self.directory.as_path()
    }

    /// Path of the pidfile with the given index.
    #[must_use]
    pub fn path_for(&self, index: usize) -> PathBuf {
        let name = match &self.extension {
            Some(extension) => format!("{}.{index}.{extension}", self.stem),
            None => format!("{}.{index}", self.stem),
        };
        self.directory.join(name)
    }

    /// Path of the lead pidfile recording the supervisor process.
    #[must_use]
    pub fn lead_path(&self) -> PathBuf {
        self.path_for(LEAD_INDEX)
    }

    /// Returns the index encoded in `file_name` when it belongs to this layout.
    #[must_use]
    pub fn index_of(&self, file_name: &str) -> Option<usize> {
        let rest = file_name.strip_prefix(self.stem.as_str())?.strip_prefix('.')?;
        let digits = match &self.extension {
            Some(extension) => rest.strip_suffix(extension.as_str())?.strip_suffix('.')?,
            None => rest,
        };
        if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Lists pidfiles of this layout that currently exist, ordered by index.
    ///
    /// A missing directory yields an empty list.
    pub fn existing(&self) -> Result<Vec<PathBuf>, PidfileLayoutError> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(PidfileLayoutError::ReadDirectory {
                    path: self.directory.clone(),
                    source,
                });
            }
        };
        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| PidfileLayoutError::ReadDirectory {
                path: self.directory.clone(),
                source,
            })?;
            let name = entry.file_name();
            if let Some(index) = name.to_str().and_then(|name| self.index_of(name)) {
                found.push((index, entry.path()));
            }
        }
        found.sort();
        Ok(found.into_iter().map(|(_, path)| path).collect())
    }
}

/// Errors raised while deriving or scanning pidfile paths.
#[derive(Debug, Error)]
pub enum PidfileLayoutError {
    /// The base path could not be made absolute.
    #[error("failed to resolve pidfile path '{path}': {source}")]
    Resolve {
        /// Configured base path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The base path does not name a file.
    #[error("pidfile path '{path}' has no file name")]
    MissingFileName {
        /// Resolved base path.
        path: PathBuf,
    },
    /// The base file name is not valid UTF-8.
    #[error("pidfile path '{path}' is not valid UTF-8")]
    NonUtf8 {
        /// Resolved base path.
        path: PathBuf,
    },
    /// Listing the pidfile directory failed.
    #[error("failed to list pidfile directory '{path}': {source}")]
    ReadDirectory {
        /// Directory being scanned.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("toto.worker.pid", 2, "toto.worker.2.pid")]
    #[case("toto.worker.pid", 0, "toto.worker.0.pid")]
    #[case("service", 1, "service.1")]
    #[case("run/daemon.pid", 12, "daemon.12.pid")]
    fn inserts_index_before_extension(
        #[case] base: &str,
        #[case] index: usize,
        #[case] expected: &str,
    ) {
        let layout = PidfileLayout::new(base).expect("layout");
        let path = layout.path_for(index);
        assert!(path.is_absolute(), "pidfile paths are absolute");
        assert_eq!(
            path.file_name().and_then(|name| name.to_str()),
            Some(expected)
        );
    }

    #[rstest]
    #[case("toto.worker.3.pid", Some(3))]
    #[case("toto.worker.10.pid", Some(10))]
    #[case("toto.worker.pid", None)]
    #[case("toto.worker..pid", None)]
    #[case("toto.worker.x.pid", None)]
    #[case("toto.worker.3.pid.bak", None)]
    #[case("other.worker.3.pid", None)]
    fn recognises_only_indexed_names(#[case] name: &str, #[case] expected: Option<usize>) {
        let layout = PidfileLayout::new("/var/run/toto.worker.pid").expect("layout");
        assert_eq!(layout.index_of(name), expected);
    }

    #[rstest]
    fn extensionless_names_match_trailing_index() {
        let layout = PidfileLayout::new("/var/run/service").expect("layout");
        assert_eq!(layout.index_of("service.4"), Some(4));
        assert_eq!(layout.index_of("service"), None);
        assert_eq!(layout.index_of("service.4.pid"), None);
    }

    #[rstest]
    fn existing_lists_matching_files_in_index_order() {
        let dir = tempfile::tempdir().expect("temp dir");
        let layout = PidfileLayout::new(dir.path().join("toto.worker.pid")).expect("layout");
        for name in [
            "toto.worker.10.pid",
            "toto.worker.2.pid",
            "toto.worker.pid",
            "unrelated.txt",
        ] {
            fs::write(dir.path().join(name), b"1").expect("write file");
        }
        let existing = layout.existing().expect("scan");
        assert_eq!(
            existing,
            vec![layout.path_for(2), layout.path_for(10)],
            "only indexed pidfiles are listed"
        );
    }

    #[rstest]
    fn existing_tolerates_missing_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let layout =
            PidfileLayout::new(dir.path().join("absent").join("toto.pid")).expect("layout");
        assert!(layout.existing().expect("scan").is_empty());
    }
}
