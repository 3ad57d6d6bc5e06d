//! Staging of batch images into the flat workspace image directory.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::batch::TimeBatch;

/// What to do when a batch image has the same file name as an image staged
/// from a different source file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Keep the first staged file and log a warning.
    #[default]
    KeepFirst,
    /// Fail staging.
    Reject,
}

#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error(
        "image name collision: {} is already staged from {}",
        .incoming.display(),
        .existing.display()
    )]
    Collision { incoming: PathBuf, existing: PathBuf },
    #[error("failed to stage {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result of staging one batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// Newly created links.
    pub linked: usize,
    /// Images whose link was already present.
    pub already_staged: usize,
    /// File names shadowed by a different, earlier staged file.
    pub collisions: Vec<String>,
}

/// Symlink each image of `batch` into `staging_dir`.
///
/// Links point at the canonical absolute path of the image. An existing
/// staging entry with the same file name is never overwritten, so calling
/// this repeatedly for the same batch is a no-op after the first call.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(batch = batch.index, images = batch.len()))
)]
pub fn stage_batch(
    batch: &TimeBatch,
    staging_dir: &Path,
    policy: CollisionPolicy,
) -> Result<StageOutcome, StageError> {
    let mut outcome = StageOutcome::default();

    for image in &batch.images {
        let Some(name) = image.file_name() else {
            continue;
        };
        let source = fs::canonicalize(image).map_err(|e| StageError::io(image, e))?;
        let target = staging_dir.join(name);

        match fs::symlink_metadata(&target) {
            Ok(meta) => {
                let existing = if meta.file_type().is_symlink() {
                    fs::read_link(&target).map_err(|e| StageError::io(&target, e))?
                } else {
                    target.clone()
                };
                if existing == source {
                    outcome.already_staged += 1;
                    continue;
                }
                match policy {
                    CollisionPolicy::Reject => {
                        return Err(StageError::Collision {
                            incoming: source,
                            existing,
                        })
                    }
                    CollisionPolicy::KeepFirst => {
                        log::warn!(
                            "{} shadowed by already staged {}; keeping the first",
                            source.display(),
                            existing.display()
                        );
                        outcome
                            .collisions
                            .push(name.to_string_lossy().into_owned());
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                symlink_file(&source, &target).map_err(|e| StageError::io(&target, e))?;
                outcome.linked += 1;
            }
            Err(e) => return Err(StageError::io(&target, e)),
        }
    }

    log::info!(
        "staged batch {}: {} linked, {} already present, {} collisions",
        batch.name(),
        outcome.linked,
        outcome.already_staged,
        outcome.collisions.len()
    );
    Ok(outcome)
}

#[cfg(unix)]
fn symlink_file(source: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(windows)]
fn symlink_file(source: &Path, target: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(source, target)
}

/// File names currently present in the staging directory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StagedImageSet {
    names: BTreeSet<OsString>,
}

impl StagedImageSet {
    /// Snapshot the staging directory. A missing directory is an empty set.
    pub fn read(staging_dir: &Path) -> Result<Self, StageError> {
        let entries = match fs::read_dir(staging_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(StageError::io(staging_dir, e)),
        };
        let mut names = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| StageError::io(staging_dir, e))?;
            names.insert(entry.file_name());
        }
        Ok(Self { names })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&OsString::from(name))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OsString> {
        self.names.iter()
    }
}
