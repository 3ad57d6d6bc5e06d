//! Incremental registration state machine.
//!
//! ```text
//! Empty -> Bootstrapped -> Registering(1) -> ... -> Registering(n-1) -> Complete
//!   \___________\_______________\________________________\______-> Failed
//! ```
//!
//! Batch 0 is bootstrapped with exhaustive matching and the mapper; every
//! later batch is registered into the same model, which is updated in place.

use std::fmt;
use std::path::{Path, PathBuf};

use batch_sfm_colmap::{
    BundleAdjustment, EngineError, EngineOutput, ExhaustiveMatching, FeatureExtraction,
    ImageRegistration, Mapping, ReconstructionEngine, Subcommand, VocabTreeMatching,
};
use batch_sfm_core::{stage_batch, LayoutError, StageOutcome, TimeBatch, Workspace};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::finalize::undistort_model;
use crate::{PipelineConfig, PipelineError, ReconstructionError};

/// Progress of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing reconstructed yet.
    Empty,
    /// Batch 0 produced exactly one model.
    Bootstrapped,
    /// Batches up to and including this index are registered.
    Registering(usize),
    /// Every batch is registered; the model may be undistorted.
    Complete,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty"),
            Self::Bootstrapped => f.write_str("bootstrapped"),
            Self::Registering(i) => write!(f, "registering (batch {i} done)"),
            Self::Complete => f.write_str("complete"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Paths and batches of a single run.
#[derive(Clone, Debug)]
pub struct RunContext {
    pub root: PathBuf,
    pub workspace: Workspace,
    /// Sorted ascending by index.
    pub batches: Vec<TimeBatch>,
}

impl RunContext {
    pub fn new(root: &Path, batches: Vec<TimeBatch>) -> Self {
        Self {
            root: root.to_path_buf(),
            workspace: Workspace::for_root(root),
            batches,
        }
    }
}

/// Drives an engine through bootstrap, incremental registration and
/// undistortion.
///
/// Any error moves the orchestrator to [`Phase::Failed`]; nothing on disk is
/// rolled back and no further step is accepted.
pub struct Orchestrator<E> {
    engine: E,
    ctx: RunContext,
    config: PipelineConfig,
    phase: Phase,
    model_path: Option<PathBuf>,
    invocations: Vec<Subcommand>,
    staged: Vec<StageOutcome>,
}

impl<E: ReconstructionEngine> Orchestrator<E> {
    pub fn new(engine: E, ctx: RunContext, config: PipelineConfig) -> Self {
        Self {
            engine,
            ctx,
            config,
            phase: Phase::Empty,
            model_path: None,
            invocations: Vec::new(),
            staged: Vec::new(),
        }
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[inline]
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// The single live model, once bootstrapped.
    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    /// Engine subcommands attempted so far, in order.
    pub fn invocations(&self) -> &[Subcommand] {
        &self.invocations
    }

    /// Staging results, one per staged batch.
    pub fn staged(&self) -> &[StageOutcome] {
        &self.staged
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    /// Advance by one transition and return the new phase.
    pub fn step(&mut self) -> Result<Phase, PipelineError> {
        let next = match self.phase {
            Phase::Empty => self.bootstrap().map(|_| Phase::Bootstrapped),
            Phase::Bootstrapped => self.register_after(0),
            Phase::Registering(done) => self.register_after(done),
            Phase::Complete | Phase::Failed => {
                return Err(PipelineError::InvalidPhase {
                    action: "advance",
                    phase: self.phase,
                })
            }
        };
        match next {
            Ok(phase) => {
                log::debug!("phase {} -> {}", self.phase, phase);
                self.phase = phase;
                Ok(phase)
            }
            Err(err) => {
                log::debug!("phase {} -> failed", self.phase);
                self.phase = Phase::Failed;
                Err(err)
            }
        }
    }

    /// Step until every batch is registered. Returns the final model path.
    pub fn run(&mut self) -> Result<PathBuf, PipelineError> {
        while self.phase != Phase::Complete {
            self.step()?;
        }
        self.complete_model()
    }

    /// Undistort the completed model. Only valid in [`Phase::Complete`].
    pub fn finalize(&mut self) -> Result<PathBuf, PipelineError> {
        if self.phase != Phase::Complete {
            return Err(PipelineError::InvalidPhase {
                action: "undistort",
                phase: self.phase,
            });
        }
        let model = self.complete_model()?;
        self.invocations.push(Subcommand::ImageUndistorter);
        let result = undistort_model(
            &mut self.engine,
            &self.ctx.workspace,
            &model,
            &self.config.undistort_output_type,
        );
        if result.is_err() {
            self.phase = Phase::Failed;
        }
        result
    }

    fn complete_model(&self) -> Result<PathBuf, PipelineError> {
        self.model_path
            .clone()
            .ok_or(PipelineError::InvalidPhase {
                action: "read the model",
                phase: self.phase,
            })
    }

    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
    fn bootstrap(&mut self) -> Result<(), PipelineError> {
        let first = self
            .ctx
            .batches
            .first()
            .cloned()
            .ok_or_else(|| LayoutError::NoBatches(self.ctx.root.clone()))?;
        self.stage(&first)?;

        if self.config.resume {
            if let Some(model) = self.existing_model()? {
                log::info!("resuming with existing model {}", model.display());
                self.model_path = Some(model);
                return Ok(());
            }
        }

        log::info!("bootstrapping from batch {}", first.name());
        let ws = self.ctx.workspace.clone();
        let extract = FeatureExtraction {
            database_path: ws.database_path.clone(),
            image_path: ws.images_dir.clone(),
            single_camera: self.config.single_camera,
            camera_model: Some(self.config.camera_model.clone()),
        };
        self.call(Subcommand::FeatureExtractor, |e| e.extract_features(&extract))?;

        let matching = ExhaustiveMatching {
            database_path: ws.database_path.clone(),
        };
        self.call(Subcommand::ExhaustiveMatcher, |e| e.match_exhaustive(&matching))?;

        let mapping = Mapping {
            database_path: ws.database_path.clone(),
            image_path: ws.images_dir.clone(),
            output_path: ws.sparse_dir.clone(),
            ba_global_function_tolerance: self.config.ba_global_function_tolerance,
        };
        self.call(Subcommand::Mapper, |e| e.map_build(&mapping))?;

        let model = self.single_model()?;
        log::info!("bootstrap model at {}", model.display());
        self.model_path = Some(model);
        Ok(())
    }

    /// Register the batch following `done`, or complete when none is left.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    fn register_after(&mut self, done: usize) -> Result<Phase, PipelineError> {
        let index = done + 1;
        let Some(batch) = self.ctx.batches.get(index).cloned() else {
            log::info!("all {} batches registered", self.ctx.batches.len());
            return Ok(Phase::Complete);
        };
        let model = self.complete_model()?;
        self.stage(&batch)?;

        log::info!("registering batch {} into {}", batch.name(), model.display());
        let ws = self.ctx.workspace.clone();
        let extract = FeatureExtraction {
            database_path: ws.database_path.clone(),
            image_path: ws.images_dir.clone(),
            single_camera: self.config.single_camera,
            camera_model: None,
        };
        self.call(Subcommand::FeatureExtractor, |e| e.extract_features(&extract))?;

        let registration = ImageRegistration {
            database_path: ws.database_path.clone(),
            input_path: model.clone(),
            output_path: model.clone(),
        };
        self.call(Subcommand::ImageRegistrator, |e| {
            e.register_images(&registration)
        })?;

        let matching = VocabTreeMatching {
            database_path: ws.database_path.clone(),
            vocab_tree_path: self.config.vocab_tree_path.clone(),
        };
        self.call(Subcommand::VocabTreeMatcher, |e| e.match_vocab_tree(&matching))?;

        let adjustment = BundleAdjustment {
            input_path: model.clone(),
            output_path: model,
        };
        self.call(Subcommand::BundleAdjuster, |e| e.bundle_adjust(&adjustment))?;

        Ok(Phase::Registering(index))
    }

    fn stage(&mut self, batch: &TimeBatch) -> Result<(), PipelineError> {
        let outcome = stage_batch(
            batch,
            &self.ctx.workspace.images_dir,
            self.config.collision_policy,
        )?;
        self.staged.push(outcome);
        Ok(())
    }

    fn call<F>(&mut self, subcommand: Subcommand, f: F) -> Result<EngineOutput, EngineError>
    where
        F: FnOnce(&mut E) -> Result<EngineOutput, EngineError>,
    {
        self.invocations.push(subcommand);
        f(&mut self.engine)
    }

    fn single_model(&self) -> Result<PathBuf, PipelineError> {
        let sparse_dir = self.ctx.workspace.sparse_dir.clone();
        let mut models = self.ctx.workspace.model_dirs()?;
        match models.len() {
            0 => Err(ReconstructionError::NoReconstruction { sparse_dir }.into()),
            1 => Ok(models.remove(0)),
            count => Err(ReconstructionError::AmbiguousReconstruction { sparse_dir, count }.into()),
        }
    }

    /// A usable pre-existing model for resuming, `None` when there is none.
    fn existing_model(&self) -> Result<Option<PathBuf>, PipelineError> {
        match self.ctx.workspace.model_dirs()?.len() {
            0 => Ok(None),
            _ => self.single_model().map(Some),
        }
    }
}
