//! Undistortion of the completed reconstruction.

use std::path::{Path, PathBuf};

use batch_sfm_colmap::{ReconstructionEngine, Undistortion};
use batch_sfm_core::Workspace;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::PipelineError;

/// Create `undistorted/` if absent and undistort the staged images with the
/// final model into it. Returns the output directory.
///
/// Existing output is overwritten by the engine.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
pub fn undistort_model<E: ReconstructionEngine + ?Sized>(
    engine: &mut E,
    workspace: &Workspace,
    model_path: &Path,
    output_type: &str,
) -> Result<PathBuf, PipelineError> {
    workspace.create_undistorted_dir()?;
    engine.undistort(&Undistortion {
        image_path: workspace.images_dir.clone(),
        input_path: model_path.to_path_buf(),
        output_path: workspace.undistorted_dir.clone(),
        output_type: output_type.to_string(),
    })?;
    log::info!(
        "undistorted images written to {}",
        workspace.undistorted_dir.display()
    );
    Ok(workspace.undistorted_dir.clone())
}
