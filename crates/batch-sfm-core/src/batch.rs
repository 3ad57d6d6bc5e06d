use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File extensions accepted as images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// One capture session: the images found in a `t<N>` directory.
///
/// Batches are produced by [`crate::discover_batches`] and are immutable
/// afterwards. `images` is sorted by file name and never empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBatch {
    /// Numeric suffix of the directory name; defines processing order.
    pub index: u64,
    /// The batch directory itself.
    pub dir: PathBuf,
    /// Image files belonging to the batch.
    pub images: Vec<PathBuf>,
}

impl TimeBatch {
    /// Directory name, e.g. `t3`.
    pub fn name(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("t{}", self.index))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Parse the index out of a batch directory name of the form `t<digits>`.
///
/// Returns `None` for anything else, including `t`, `t-1`, `t1a` and `T1`.
pub fn parse_batch_index(name: &str) -> Option<u64> {
    let digits = name.strip_prefix('t')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// `true` when the path carries one of [`IMAGE_EXTENSIONS`].
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
