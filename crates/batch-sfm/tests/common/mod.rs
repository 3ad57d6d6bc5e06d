#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use batch_sfm::colmap::{
    BundleAdjustment, EngineError, EngineOutput, ExhaustiveMatching, FeatureExtraction,
    ImageRegistration, Mapping, ReconstructionEngine, Subcommand, Undistortion,
    VocabTreeMatching,
};

/// Scripted stand-in for COLMAP that records every call.
#[derive(Debug)]
pub struct FakeEngine {
    pub calls: Vec<Subcommand>,
    /// Camera model passed to each `feature_extractor` call.
    pub camera_models: Vec<Option<String>>,
    /// Staged file names visible at each `feature_extractor` call.
    pub staged_at_extract: Vec<Vec<String>>,
    pub registrations: Vec<ImageRegistration>,
    pub adjustments: Vec<BundleAdjustment>,
    pub undistortions: Vec<Undistortion>,
    /// Number of model directories `mapper` creates.
    pub models_created: usize,
    pub fail_on: Option<Subcommand>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            camera_models: Vec::new(),
            staged_at_extract: Vec::new(),
            registrations: Vec::new(),
            adjustments: Vec::new(),
            undistortions: Vec::new(),
            models_created: 1,
            fail_on: None,
        }
    }
}

impl FakeEngine {
    pub fn failing_on(subcommand: Subcommand) -> Self {
        Self {
            fail_on: Some(subcommand),
            ..Self::default()
        }
    }

    pub fn creating_models(count: usize) -> Self {
        Self {
            models_created: count,
            ..Self::default()
        }
    }

    fn record(&mut self, subcommand: Subcommand) -> Result<EngineOutput, EngineError> {
        self.calls.push(subcommand);
        if self.fail_on == Some(subcommand) {
            return Err(EngineError::Invocation {
                subcommand,
                status: Some(1),
                stdout: String::new(),
                stderr: format!("scripted {subcommand} failure"),
            });
        }
        Ok(EngineOutput::default())
    }

    pub fn count(&self, subcommand: Subcommand) -> usize {
        self.calls.iter().filter(|&&c| c == subcommand).count()
    }
}

impl ReconstructionEngine for FakeEngine {
    fn extract_features(&mut self, cmd: &FeatureExtraction) -> Result<EngineOutput, EngineError> {
        self.camera_models.push(cmd.camera_model.clone());
        let mut staged: Vec<String> = fs::read_dir(&cmd.image_path)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        staged.sort();
        self.staged_at_extract.push(staged);
        self.record(Subcommand::FeatureExtractor)
    }

    fn match_exhaustive(
        &mut self,
        _cmd: &ExhaustiveMatching,
    ) -> Result<EngineOutput, EngineError> {
        self.record(Subcommand::ExhaustiveMatcher)
    }

    fn map_build(&mut self, cmd: &Mapping) -> Result<EngineOutput, EngineError> {
        let out = self.record(Subcommand::Mapper)?;
        for k in 0..self.models_created {
            fs::create_dir_all(cmd.output_path.join(k.to_string())).unwrap();
        }
        Ok(out)
    }

    fn register_images(&mut self, cmd: &ImageRegistration) -> Result<EngineOutput, EngineError> {
        self.registrations.push(cmd.clone());
        self.record(Subcommand::ImageRegistrator)
    }

    fn match_vocab_tree(
        &mut self,
        _cmd: &VocabTreeMatching,
    ) -> Result<EngineOutput, EngineError> {
        self.record(Subcommand::VocabTreeMatcher)
    }

    fn bundle_adjust(&mut self, cmd: &BundleAdjustment) -> Result<EngineOutput, EngineError> {
        self.adjustments.push(cmd.clone());
        self.record(Subcommand::BundleAdjuster)
    }

    fn undistort(&mut self, cmd: &Undistortion) -> Result<EngineOutput, EngineError> {
        self.undistortions.push(cmd.clone());
        self.record(Subcommand::ImageUndistorter)
    }
}

/// Create `root/<name>/` holding the given image files.
pub fn make_batch(root: &Path, name: &str, files: &[&str]) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    for f in files {
        fs::write(dir.join(f), f.as_bytes()).unwrap();
    }
    dir
}

/// `t0` with three images and `t1` with two.
pub fn two_batch_root() -> tempfile::TempDir {
    let root = tempfile::tempdir().unwrap();
    make_batch(root.path(), "t0", &["a.jpg", "b.jpg", "c.png"]);
    make_batch(root.path(), "t1", &["d.JPG", "e.jpeg"]);
    root
}
