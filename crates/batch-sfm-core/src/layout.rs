//! Input layout validation.

use std::fs;
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::batch::{is_image_path, parse_batch_index, TimeBatch};

/// Violations of the `<root>/t<N>/*.{jpg,jpeg,png}` input layout.
#[derive(thiserror::Error, Debug)]
pub enum LayoutError {
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("no subdirectories matching t<N> found in {}", .0.display())]
    NoBatches(PathBuf),
    #[error("batch directory {} is empty", .0.display())]
    EmptyBatch(PathBuf),
    #[error("non-image entry in {}: {name}", .batch.display())]
    NonImageEntry { batch: PathBuf, name: String },
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LayoutError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Discover and validate all `t<N>` batches below `root`.
///
/// The returned batches are sorted ascending by their numeric index, which is
/// the processing order regardless of how the filesystem lists them. Entries
/// of `root` that are not `t<N>` directories are ignored; inside a batch every
/// entry must be an image file. Read-only.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(root = %root.display())))]
pub fn discover_batches(root: &Path) -> Result<Vec<TimeBatch>, LayoutError> {
    if !root.is_dir() {
        return Err(LayoutError::NotADirectory(root.to_path_buf()));
    }

    let mut candidates = Vec::new();
    for entry in fs::read_dir(root).map_err(|e| LayoutError::io(root, e))? {
        let entry = entry.map_err(|e| LayoutError::io(root, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(index) = entry.file_name().to_str().and_then(parse_batch_index) else {
            continue;
        };
        candidates.push((index, path));
    }

    if candidates.is_empty() {
        return Err(LayoutError::NoBatches(root.to_path_buf()));
    }

    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    let batches = candidates
        .into_iter()
        .map(|(index, dir)| read_batch(index, dir))
        .collect::<Result<Vec<_>, _>>()?;

    log::info!(
        "found {} batches in {}: {}",
        batches.len(),
        root.display(),
        batches
            .iter()
            .map(|b| format!("{}({})", b.name(), b.len()))
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(batches)
}

fn read_batch(index: u64, dir: PathBuf) -> Result<TimeBatch, LayoutError> {
    let mut images = Vec::new();
    for entry in fs::read_dir(&dir).map_err(|e| LayoutError::io(&dir, e))? {
        let entry = entry.map_err(|e| LayoutError::io(&dir, e))?;
        let path = entry.path();
        if !(path.is_file() && is_image_path(&path)) {
            return Err(LayoutError::NonImageEntry {
                batch: dir,
                name: entry.file_name().to_string_lossy().into_owned(),
            });
        }
        images.push(path);
    }

    if images.is_empty() {
        return Err(LayoutError::EmptyBatch(dir));
    }
    images.sort();

    Ok(TimeBatch { index, dir, images })
}
