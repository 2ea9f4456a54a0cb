//! Isolated per-scenario working directories.
//!
//! Each scenario runs inside a fresh temporary directory populated with the
//! asset fixtures. Because the current directory is process-global, only one
//! [`Workspace`] can be entered at a time; a process-wide lock serialises
//! them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, warn};

static CWD_LOCK: Mutex<()> = Mutex::new(());

/// Errors entering a workspace.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkspaceError {
    /// The asset directory does not exist.
    #[error("asset directory not found: {}", path.display())]
    MissingAssets {
        /// Configured asset directory.
        path: PathBuf,
    },

    /// Creating the temporary directory failed.
    #[error("failed to create workspace: {0}")]
    Create(#[source] io::Error),

    /// Copying an asset failed.
    #[error("failed to copy {} into workspace: {source}", path.display())]
    Copy {
        /// Asset being copied.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Reading or changing the current directory failed.
    #[error("failed to change directory to {}: {source}", path.display())]
    ChangeDir {
        /// Target directory.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// A temporary directory that is the process's current directory while the
/// value lives.
///
/// Dropping it restores the previous directory and deletes the contents,
/// including on panic unwinding.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    previous: PathBuf,
    // Dropped last so the lock outlives the directory restore.
    _lock: MutexGuard<'static, ()>,
}

impl Workspace {
    /// Creates a workspace seeded with a copy of `assets` and changes into
    /// it. `None` creates an empty workspace.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkspaceError`] if the assets are missing, copying fails,
    /// or the directory cannot be changed.
    pub fn enter(assets: Option<&Path>) -> Result<Self, WorkspaceError> {
        let lock = CWD_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(assets) = assets {
            if !assets.is_dir() {
                return Err(WorkspaceError::MissingAssets {
                    path: assets.to_path_buf(),
                });
            }
        }

        let dir = tempfile::Builder::new()
            .prefix("sigstore-conformance-")
            .tempdir()
            .map_err(WorkspaceError::Create)?;
        if let Some(assets) = assets {
            copy_tree(assets, dir.path())?;
        }

        let previous = std::env::current_dir().map_err(|source| WorkspaceError::ChangeDir {
            path: dir.path().to_path_buf(),
            source,
        })?;
        std::env::set_current_dir(dir.path()).map_err(|source| WorkspaceError::ChangeDir {
            path: dir.path().to_path_buf(),
            source,
        })?;
        debug!(workspace = %dir.path().display(), "entered workspace");

        Ok(Self {
            dir,
            previous,
            _lock: lock,
        })
    }

    /// The workspace directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(error) = std::env::set_current_dir(&self.previous) {
            warn!(
                previous = %self.previous.display(),
                %error,
                "failed to restore working directory"
            );
        }
    }
}

/// Recursively copies the contents of `from` into the existing `to`.
fn copy_tree(from: &Path, to: &Path) -> Result<(), WorkspaceError> {
    let entries = fs::read_dir(from).map_err(|source| WorkspaceError::Copy {
        path: from.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| WorkspaceError::Copy {
            path: from.to_path_buf(),
            source,
        })?;
        let source_path = entry.path();
        let target = to.join(entry.file_name());
        let copy_err = |source| WorkspaceError::Copy {
            path: source_path.clone(),
            source,
        };

        if entry.file_type().map_err(copy_err)?.is_dir() {
            fs::create_dir_all(&target).map_err(copy_err)?;
            copy_tree(&source_path, &target)?;
        } else {
            fs::copy(&source_path, &target).map_err(copy_err)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_copies_assets_and_restores() {
        let assets = tempfile::tempdir().unwrap();
        fs::write(assets.path().join("a.txt"), b"DO NOT MODIFY ME!\n").unwrap();
        fs::create_dir(assets.path().join("nested")).unwrap();
        fs::write(assets.path().join("nested/b.txt"), b"b").unwrap();

        let workspace_path;
        {
            let workspace = Workspace::enter(Some(assets.path())).unwrap();
            workspace_path = workspace.path().to_path_buf();
            let cwd = std::env::current_dir().unwrap();
            assert_eq!(
                cwd.canonicalize().unwrap(),
                workspace_path.canonicalize().unwrap()
            );
            assert_eq!(fs::read(Path::new("a.txt")).unwrap(), b"DO NOT MODIFY ME!\n");
            assert_eq!(fs::read(Path::new("nested/b.txt")).unwrap(), b"b");

            fs::write("scratch.txt", b"x").unwrap();
        }

        assert!(!workspace_path.exists());
        assert!(!assets.path().join("scratch.txt").exists());
        assert_ne!(
            std::env::current_dir().unwrap().canonicalize().ok(),
            workspace_path.canonicalize().ok()
        );
    }

    #[test]
    fn test_enter_missing_assets() {
        let err = Workspace::enter(Some(Path::new("/nonexistent/assets"))).unwrap_err();
        assert!(matches!(err, WorkspaceError::MissingAssets { .. }));
    }

    #[test]
    fn test_enter_empty() {
        let workspace = Workspace::enter(None).unwrap();
        assert_eq!(fs::read_dir(workspace.path()).unwrap().count(), 0);
    }
}
