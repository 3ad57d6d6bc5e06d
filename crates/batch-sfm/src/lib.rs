//! Incremental multi-batch sparse reconstruction.
//!
//! Input is a directory of time-ordered capture sessions `t0/`, `t1/`, ...
//! of JPEG/PNG images. Batch 0 bootstraps a single sparse model with an
//! external SfM engine (COLMAP); each later batch is registered into that
//! same model, and the result is undistorted for downstream training.
//!
//! ## Quickstart
//!
//! ```no_run
//! use batch_sfm::{run_colmap_pipeline, PipelineConfig, RunReport};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let root = Path::new("captures/scene");
//! let config = PipelineConfig::default();
//! let mut report = RunReport::new(root);
//! run_colmap_pipeline(root, &config, &mut report)?;
//! println!("model: {:?}", report.model_path);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `batch_sfm::core`: batch discovery, workspace paths, image staging.
//! - `batch_sfm::colmap`: engine trait, typed subcommand records, `colmap` client.
//! - [`Orchestrator`]: the bootstrap / registration state machine.
//! - [`run_pipeline`]: validation through undistortion, filling a [`RunReport`].

pub use batch_sfm_colmap as colmap;
pub use batch_sfm_core as core;

mod error;
mod finalize;
mod io;
mod orchestrator;
mod pipeline;

pub use error::{PipelineError, ReconstructionError};
pub use finalize::undistort_model;
pub use io::{BatchSummary, PipelineConfig, PipelineIoError, RunReport};
pub use orchestrator::{Orchestrator, Phase, RunContext};
pub use pipeline::{run_colmap_pipeline, run_pipeline};
