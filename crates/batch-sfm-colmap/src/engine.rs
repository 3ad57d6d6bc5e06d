use std::path::PathBuf;
use std::time::Duration;

use crate::command::{
    BundleAdjustment, ExhaustiveMatching, FeatureExtraction, ImageRegistration, Mapping,
    Subcommand, Undistortion, VocabTreeMatching,
};

/// Diagnostic text captured from a finished engine invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Failure of a single engine invocation. Always fatal for the run.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("{subcommand} failed with {}", describe_status(.status))]
    Invocation {
        subcommand: Subcommand,
        /// Exit code, `None` when the process was killed by a signal.
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("failed to launch {} for {subcommand}: {source}", .program.display())]
    Spawn {
        subcommand: Subcommand,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("lost track of {subcommand} process: {source}")]
    Wait {
        subcommand: Subcommand,
        #[source]
        source: std::io::Error,
    },
    #[error("{subcommand} timed out after {after:?}")]
    TimedOut {
        subcommand: Subcommand,
        after: Duration,
    },
    #[error("{subcommand} cancelled")]
    Cancelled { subcommand: Subcommand },
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {code}"),
        None => "termination by signal".to_string(),
    }
}

impl EngineError {
    /// The subcommand whose invocation failed.
    pub fn subcommand(&self) -> Subcommand {
        match self {
            Self::Invocation { subcommand, .. }
            | Self::Spawn { subcommand, .. }
            | Self::Wait { subcommand, .. }
            | Self::TimedOut { subcommand, .. }
            | Self::Cancelled { subcommand } => *subcommand,
        }
    }

    /// Captured stderr of a failed invocation, falling back to stdout when
    /// stderr is empty (COLMAP logs most of its progress to stdout).
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::Invocation { stdout, stderr, .. } => {
                let text = if stderr.trim().is_empty() {
                    stdout
                } else {
                    stderr
                };
                (!text.trim().is_empty()).then_some(text.as_str())
            }
            _ => None,
        }
    }
}

/// Capability interface of the external SfM engine.
///
/// Calls block until the engine finishes. Implementations must not run two
/// invocations concurrently against the same database; callers sequence them.
pub trait ReconstructionEngine {
    fn extract_features(&mut self, cmd: &FeatureExtraction) -> Result<EngineOutput, EngineError>;

    /// Bootstrap only: all-pairs matching.
    fn match_exhaustive(&mut self, cmd: &ExhaustiveMatching)
        -> Result<EngineOutput, EngineError>;

    /// Bootstrap only: builds the initial model(s) below `cmd.output_path`.
    fn map_build(&mut self, cmd: &Mapping) -> Result<EngineOutput, EngineError>;

    fn register_images(&mut self, cmd: &ImageRegistration) -> Result<EngineOutput, EngineError>;

    fn match_vocab_tree(&mut self, cmd: &VocabTreeMatching)
        -> Result<EngineOutput, EngineError>;

    fn bundle_adjust(&mut self, cmd: &BundleAdjustment) -> Result<EngineOutput, EngineError>;

    fn undistort(&mut self, cmd: &Undistortion) -> Result<EngineOutput, EngineError>;
}
