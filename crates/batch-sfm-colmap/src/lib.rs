//! Reconstruction engine interface and its COLMAP command-line client.
//!
//! The orchestration layer only talks to [`ReconstructionEngine`], one method
//! per engine subcommand, each taking a typed argument record from
//! [`command`]. [`ColmapCli`] implements it by running the `colmap` binary as a
//! blocking child process; tests substitute a scripted fake.

pub mod command;
mod engine;
mod process;

pub use command::{
    BundleAdjustment, EngineCommand, ExhaustiveMatching, FeatureExtraction, ImageRegistration,
    Mapping, Subcommand, Undistortion, VocabTreeMatching,
};
pub use engine::{EngineError, EngineOutput, ReconstructionEngine};
pub use process::{CancelToken, ColmapCli};
