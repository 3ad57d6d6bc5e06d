//! Typed argument records for the engine subcommands.
//!
//! Each record renders the exact flag vector passed after the subcommand name
//! on the `colmap` command line.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Engine subcommands used by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subcommand {
    FeatureExtractor,
    ExhaustiveMatcher,
    Mapper,
    ImageRegistrator,
    VocabTreeMatcher,
    BundleAdjuster,
    ImageUndistorter,
}

impl Subcommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FeatureExtractor => "feature_extractor",
            Self::ExhaustiveMatcher => "exhaustive_matcher",
            Self::Mapper => "mapper",
            Self::ImageRegistrator => "image_registrator",
            Self::VocabTreeMatcher => "vocab_tree_matcher",
            Self::BundleAdjuster => "bundle_adjuster",
            Self::ImageUndistorter => "image_undistorter",
        }
    }
}

impl fmt::Display for Subcommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An argument record that knows its subcommand and flag vector.
pub trait EngineCommand {
    const SUBCOMMAND: Subcommand;

    fn args(&self) -> Vec<OsString>;
}

#[derive(Default)]
struct Flags(Vec<OsString>);

impl Flags {
    fn push(mut self, flag: &str, value: impl Into<OsString>) -> Self {
        self.0.push(format!("--{flag}").into());
        self.0.push(value.into());
        self
    }

    fn push_opt(self, flag: &str, value: Option<impl Into<OsString>>) -> Self {
        match value {
            Some(value) => self.push(flag, value),
            None => self,
        }
    }
}

/// `feature_extractor`: detect features for every staged image not yet in
/// the database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureExtraction {
    pub database_path: PathBuf,
    pub image_path: PathBuf,
    pub single_camera: bool,
    /// Explicit camera model; `None` reuses the cameras already in the
    /// database.
    pub camera_model: Option<String>,
}

impl EngineCommand for FeatureExtraction {
    const SUBCOMMAND: Subcommand = Subcommand::FeatureExtractor;

    fn args(&self) -> Vec<OsString> {
        Flags::default()
            .push("database_path", &self.database_path)
            .push("image_path", &self.image_path)
            .push(
                "ImageReader.single_camera",
                if self.single_camera { "1" } else { "0" },
            )
            .push_opt("ImageReader.camera_model", self.camera_model.as_deref())
            .0
    }
}

/// `exhaustive_matcher`: all-pairs matching, quadratic in image count.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExhaustiveMatching {
    pub database_path: PathBuf,
}

impl EngineCommand for ExhaustiveMatching {
    const SUBCOMMAND: Subcommand = Subcommand::ExhaustiveMatcher;

    fn args(&self) -> Vec<OsString> {
        Flags::default().push("database_path", &self.database_path).0
    }
}

/// `mapper`: build the initial reconstruction into `output_path/<k>/`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub database_path: PathBuf,
    pub image_path: PathBuf,
    pub output_path: PathBuf,
    pub ba_global_function_tolerance: f64,
}

impl EngineCommand for Mapping {
    const SUBCOMMAND: Subcommand = Subcommand::Mapper;

    fn args(&self) -> Vec<OsString> {
        Flags::default()
            .push("database_path", &self.database_path)
            .push("image_path", &self.image_path)
            .push("output_path", &self.output_path)
            .push(
                "Mapper.ba_global_function_tolerance",
                self.ba_global_function_tolerance.to_string(),
            )
            .0
    }
}

/// `image_registrator`: register new database images into an existing model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageRegistration {
    pub database_path: PathBuf,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
}

impl EngineCommand for ImageRegistration {
    const SUBCOMMAND: Subcommand = Subcommand::ImageRegistrator;

    fn args(&self) -> Vec<OsString> {
        Flags::default()
            .push("database_path", &self.database_path)
            .push("input_path", &self.input_path)
            .push("output_path", &self.output_path)
            .0
    }
}

/// `vocab_tree_matcher`: sub-quadratic matching against a vocabulary tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VocabTreeMatching {
    pub database_path: PathBuf,
    /// Prebuilt vocabulary; `None` leaves the engine default in place.
    pub vocab_tree_path: Option<PathBuf>,
}

impl EngineCommand for VocabTreeMatching {
    const SUBCOMMAND: Subcommand = Subcommand::VocabTreeMatcher;

    fn args(&self) -> Vec<OsString> {
        Flags::default()
            .push("database_path", &self.database_path)
            .push_opt(
                "VocabTreeMatching.vocab_tree_path",
                self.vocab_tree_path.as_ref(),
            )
            .0
    }
}

/// `bundle_adjuster`: refine a model in place when input equals output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BundleAdjustment {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
}

impl EngineCommand for BundleAdjustment {
    const SUBCOMMAND: Subcommand = Subcommand::BundleAdjuster;

    fn args(&self) -> Vec<OsString> {
        Flags::default()
            .push("input_path", &self.input_path)
            .push("output_path", &self.output_path)
            .0
    }
}

/// `image_undistorter`: write pinhole-corrected images plus the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Undistortion {
    pub image_path: PathBuf,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub output_type: String,
}

impl EngineCommand for Undistortion {
    const SUBCOMMAND: Subcommand = Subcommand::ImageUndistorter;

    fn args(&self) -> Vec<OsString> {
        Flags::default()
            .push("image_path", &self.image_path)
            .push("input_path", &self.input_path)
            .push("output_path", &self.output_path)
            .push("output_type", self.output_type.as_str())
            .0
    }
}
