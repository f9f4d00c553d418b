//! Change notifications for input files.
//!
//! Parent directories are watched instead of the files themselves, so files
//! replaced by editors or by ConfigMap symlink swaps keep being followed.

use crate::error::ControllerError;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 64;

/// A watched file
#[derive(Debug, Clone)]
struct Target {
    dir: PathBuf,
    file_name: OsString,
    path: PathBuf,
}

impl Target {
    fn new(path: &Path) -> Result<Self, ControllerError> {
        let absolute = std::path::absolute(path).map_err(|source| ControllerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let (Some(dir), Some(file_name)) = (absolute.parent(), absolute.file_name()) else {
            return Err(ControllerError::InvalidConfig(format!(
                "{} does not name a file",
                path.display()
            )));
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            file_name: file_name.to_os_string(),
            path: path.to_path_buf(),
        })
    }

    fn matches(&self, changed: &Path) -> bool {
        changed.file_name() == Some(self.file_name.as_os_str())
            && changed.parent().is_some_and(|dir| same_dir(dir, &self.dir))
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Reports which of a set of files changed.
///
/// Events for the same file are not coalesced; readers compare content to
/// skip no-op changes.
pub struct FileWatcher {
    // Dropping the watcher stops notifications
    _watcher: RecommendedWatcher,
    changes: mpsc::Receiver<PathBuf>,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher").finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// Start watching `paths`
    pub fn new(paths: &[&Path]) -> Result<Self, ControllerError> {
        let targets = paths
            .iter()
            .map(|path| Target::new(path))
            .collect::<Result<Vec<_>, _>>()?;

        let (tx, changes) = mpsc::channel(CHANNEL_CAPACITY);
        let callback_targets = targets.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Access(_)) {
                    return;
                }
                for target in &callback_targets {
                    if event.paths.iter().any(|changed| target.matches(changed)) {
                        debug!(path = %target.path.display(), kind = ?event.kind, "File event");
                        // Receiver gone means the controller is shutting down
                        if tx.blocking_send(target.path.clone()).is_err() {
                            return;
                        }
                    }
                }
            }
            Err(e) => warn!("File watch error: {}", e),
        })?;

        let mut dirs: Vec<&Path> = targets.iter().map(|t| t.dir.as_path()).collect();
        dirs.sort();
        dirs.dedup();
        for dir in dirs {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
        }

        Ok(Self {
            _watcher: watcher,
            changes,
        })
    }

    /// Path of the next changed file, as passed to [`FileWatcher::new`].
    /// `None` once the watcher has stopped.
    pub async fn changed(&mut self) -> Option<PathBuf> {
        self.changes.recv().await
    }
}

/// A file read only when told it changed
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    last: Option<String>,
}

impl FileSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            last: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file; new content if it differs from the last read
    pub async fn reload(&mut self) -> Result<Option<String>, ControllerError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ControllerError::Io {
                path: self.path.clone(),
                source,
            })?;
        if self.last.as_deref() == Some(content.as_str()) {
            return Ok(None);
        }
        self.last = Some(content.clone());
        Ok(Some(content))
    }
}
