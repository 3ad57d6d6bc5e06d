//! On-disk working area shared by every engine invocation of a run.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Name of the workspace directory created under the input root.
pub const WORKSPACE_DIR: &str = "colmap_workspace";
/// Flat directory of symlinked images.
pub const IMAGES_DIR: &str = "images";
/// Engine database file.
pub const DATABASE_FILE: &str = "database.db";
/// Sparse model directory; holds one subdirectory per model.
pub const SPARSE_DIR: &str = "sparse";
/// Final undistortion output, sibling of `images/`.
pub const UNDISTORTED_DIR: &str = "undistorted";
/// Advisory lock marking a run in progress.
pub const LOCK_FILE: &str = ".lock";

#[derive(thiserror::Error, Debug)]
pub enum WorkspaceError {
    #[error("failed to prepare {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("workspace {} is locked by another run (remove {} if stale)", .workspace.display(), .lock.display())]
    Locked { workspace: PathBuf, lock: PathBuf },
}

impl WorkspaceError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Paths of the workspace below `<root>/colmap_workspace/`.
///
/// Paths are derived deterministically from the input root, so a second run
/// over the same root finds the state left by the first one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub dir: PathBuf,
    pub images_dir: PathBuf,
    pub database_path: PathBuf,
    pub sparse_dir: PathBuf,
    pub undistorted_dir: PathBuf,
}

impl Workspace {
    /// Derive workspace paths for an input root. Touches nothing on disk.
    pub fn for_root(root: &Path) -> Self {
        let dir = root.join(WORKSPACE_DIR);
        Self {
            images_dir: dir.join(IMAGES_DIR),
            database_path: dir.join(DATABASE_FILE),
            sparse_dir: dir.join(SPARSE_DIR),
            undistorted_dir: dir.join(UNDISTORTED_DIR),
            dir,
        }
    }

    /// Create the workspace, staging and sparse directories if absent.
    ///
    /// Existing directories and their content are left untouched. Nothing is
    /// rolled back when a later step fails.
    pub fn create(&self) -> Result<(), WorkspaceError> {
        for dir in [&self.dir, &self.images_dir, &self.sparse_dir] {
            fs::create_dir_all(dir).map_err(|e| WorkspaceError::io(dir, e))?;
        }
        log::debug!("workspace ready at {}", self.dir.display());
        Ok(())
    }

    /// Create the undistortion output directory if absent.
    pub fn create_undistorted_dir(&self) -> Result<(), WorkspaceError> {
        fs::create_dir_all(&self.undistorted_dir)
            .map_err(|e| WorkspaceError::io(&self.undistorted_dir, e))
    }

    /// Model subdirectories currently present in `sparse/`, sorted by name.
    ///
    /// Plain files are not models and are skipped. A missing `sparse/`
    /// directory yields an empty list.
    pub fn model_dirs(&self) -> Result<Vec<PathBuf>, WorkspaceError> {
        let entries = match fs::read_dir(&self.sparse_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WorkspaceError::io(&self.sparse_dir, e)),
        };
        let mut models = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| WorkspaceError::io(&self.sparse_dir, e))?;
            let path = entry.path();
            if path.is_dir() {
                models.push(path);
            }
        }
        models.sort();
        Ok(models)
    }

    /// Take the run-level advisory lock. See [`WorkspaceLock`].
    pub fn lock(&self) -> Result<WorkspaceLock, WorkspaceError> {
        WorkspaceLock::acquire(&self.dir)
    }
}

/// Exclusive marker file guarding a workspace against concurrent runs.
///
/// The lock file is created with create-new semantics and removed on drop. A
/// crashed run leaves it behind; it must then be removed by hand.
#[derive(Debug)]
pub struct WorkspaceLock {
    path: PathBuf,
}

impl WorkspaceLock {
    pub fn acquire(workspace_dir: &Path) -> Result<Self, WorkspaceError> {
        fs::create_dir_all(workspace_dir).map_err(|e| WorkspaceError::io(workspace_dir, e))?;
        let path = workspace_dir.join(LOCK_FILE);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(WorkspaceError::Locked {
                    workspace: workspace_dir.to_path_buf(),
                    lock: path,
                })
            }
            Err(e) => return Err(WorkspaceError::io(&path, e)),
        };
        // pid is informational only
        let _ = writeln!(file, "{}", std::process::id());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            log::warn!("failed to release {}: {err}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_fixed_layout() {
        let ws = Workspace::for_root(Path::new("/data/scene"));
        assert_eq!(ws.dir, Path::new("/data/scene/colmap_workspace"));
        assert_eq!(ws.images_dir, Path::new("/data/scene/colmap_workspace/images"));
        assert_eq!(
            ws.database_path,
            Path::new("/data/scene/colmap_workspace/database.db")
        );
        assert_eq!(ws.sparse_dir, Path::new("/data/scene/colmap_workspace/sparse"));
        assert_eq!(
            ws.undistorted_dir,
            Path::new("/data/scene/colmap_workspace/undistorted")
        );
    }

    #[test]
    fn create_is_idempotent_and_preserves_content() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::for_root(root.path());
        ws.create().unwrap();
        fs::write(ws.images_dir.join("keep.jpg"), b"x").unwrap();
        fs::write(&ws.database_path, b"db").unwrap();

        ws.create().unwrap();
        assert!(ws.images_dir.join("keep.jpg").exists());
        assert_eq!(fs::read(&ws.database_path).unwrap(), b"db");
        assert!(!ws.undistorted_dir.exists());
    }

    #[test]
    fn model_dirs_counts_directories_only() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::for_root(root.path());
        assert!(ws.model_dirs().unwrap().is_empty());

        ws.create().unwrap();
        fs::create_dir(ws.sparse_dir.join("1")).unwrap();
        fs::create_dir(ws.sparse_dir.join("0")).unwrap();
        fs::write(ws.sparse_dir.join("project.ini"), b"").unwrap();

        let models = ws.model_dirs().unwrap();
        assert_eq!(models, vec![ws.sparse_dir.join("0"), ws.sparse_dir.join("1")]);
    }

    #[test]
    fn lock_is_exclusive_and_released_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::for_root(root.path());

        let lock = ws.lock().unwrap();
        assert!(lock.path().exists());
        assert!(matches!(ws.lock(), Err(WorkspaceError::Locked { .. })));

        drop(lock);
        assert!(!ws.dir.join(LOCK_FILE).exists());
        let _again = ws.lock().unwrap();
    }
}
