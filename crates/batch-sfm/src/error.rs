use std::path::PathBuf;

use batch_sfm_colmap::EngineError;
use batch_sfm_core::{LayoutError, StageError, WorkspaceError};

use crate::io::PipelineIoError;
use crate::orchestrator::Phase;

/// The bootstrap mapper did not leave exactly one model behind.
#[derive(thiserror::Error, Debug)]
pub enum ReconstructionError {
    #[error("no sparse reconstruction found in {}", .sparse_dir.display())]
    NoReconstruction { sparse_dir: PathBuf },
    #[error("{count} sparse reconstructions found in {}, expected exactly one", .sparse_dir.display())]
    AmbiguousReconstruction { sparse_dir: PathBuf, count: usize },
}

/// Every way a run can stop. None of these are retried.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error("engine invocation failed: {0}")]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Reconstruction(#[from] ReconstructionError),
    #[error(transparent)]
    Io(#[from] PipelineIoError),
    #[error("cannot {action} while the pipeline is {phase}")]
    InvalidPhase { action: &'static str, phase: Phase },
}

impl PipelineError {
    /// Layout violations and rejected name collisions.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::Layout(_) | Self::Stage(StageError::Collision { .. })
        )
    }

    /// Captured engine output for failed invocations.
    pub fn engine_diagnostics(&self) -> Option<&str> {
        match self {
            Self::Engine(err) => err.diagnostics(),
            _ => None,
        }
    }
}
