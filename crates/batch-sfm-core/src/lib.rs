//! Core types and filesystem plumbing for incremental multi-batch SfM.
//!
//! This crate knows nothing about the reconstruction engine. It validates the
//! `<root>/t<N>/` input layout, derives and creates the on-disk workspace, and
//! stages batch images into the flat directory the engine reads from.

mod batch;
mod layout;
mod logger;
mod stage;
mod workspace;

pub use batch::{is_image_path, parse_batch_index, TimeBatch, IMAGE_EXTENSIONS};
pub use layout::{discover_batches, LayoutError};
pub use stage::{stage_batch, CollisionPolicy, StageError, StageOutcome, StagedImageSet};
pub use workspace::{
    Workspace, WorkspaceError, WorkspaceLock, DATABASE_FILE, IMAGES_DIR, LOCK_FILE, SPARSE_DIR,
    UNDISTORTED_DIR, WORKSPACE_DIR,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
