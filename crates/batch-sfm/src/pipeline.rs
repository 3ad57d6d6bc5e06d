//! End-to-end run: validate, prepare the workspace, reconstruct, undistort.

use std::path::Path;

use batch_sfm_colmap::ReconstructionEngine;
use batch_sfm_core::{discover_batches, StagedImageSet, Workspace};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::io::{BatchSummary, RunReport};
use crate::orchestrator::{Orchestrator, RunContext};
use crate::{PipelineConfig, PipelineError};

/// Run the whole pipeline for `root` with `engine`, filling `report` as it
/// goes.
///
/// On error the report still describes everything done up to the failure;
/// the caller decides whether to record the error and write it out. The
/// workspace is locked for the duration of the run.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(root = %root.display()))
)]
pub fn run_pipeline<E: ReconstructionEngine>(
    root: &Path,
    config: &PipelineConfig,
    engine: E,
    report: &mut RunReport,
) -> Result<(), PipelineError> {
    let batches = discover_batches(root)?;
    report.batches = batches.iter().map(BatchSummary::from).collect();

    let workspace = Workspace::for_root(root);
    report.workspace = Some(workspace.clone());
    let _lock = workspace.lock()?;
    workspace.create()?;

    let mut orchestrator = Orchestrator::new(
        engine,
        RunContext::new(root, batches),
        config.clone(),
    );
    let result = orchestrator
        .run()
        .and_then(|_| orchestrator.finalize());

    report.phase = orchestrator.phase();
    report.model_path = orchestrator.model_path().map(Path::to_path_buf);
    report.invocations = orchestrator.invocations().to_vec();
    report.collisions = orchestrator
        .staged()
        .iter()
        .flat_map(|s| s.collisions.iter().cloned())
        .collect();
    report.staged_images = StagedImageSet::read(&workspace.images_dir)
        .map(|set| set.len())
        .unwrap_or_default();

    report.undistorted_path = Some(result?);
    Ok(())
}

/// [`run_pipeline`] with the `colmap` client described by `config`.
pub fn run_colmap_pipeline(
    root: &Path,
    config: &PipelineConfig,
    report: &mut RunReport,
) -> Result<(), PipelineError> {
    run_pipeline(root, config, config.build_engine(), report)
}
