//! JSON configuration and run report helpers.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use batch_sfm_colmap::{ColmapCli, Subcommand};
use batch_sfm_core::{CollisionPolicy, TimeBatch, Workspace};
use serde::{Deserialize, Serialize};

use crate::orchestrator::Phase;

#[derive(thiserror::Error, Debug)]
pub enum PipelineIoError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, PipelineIoError> {
    let raw = fs::read_to_string(path).map_err(|source| PipelineIoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| PipelineIoError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), PipelineIoError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| PipelineIoError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|source| PipelineIoError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn default_colmap_binary() -> PathBuf {
    PathBuf::from("colmap")
}

fn default_camera_model() -> String {
    "OPENCV".to_string()
}

fn default_single_camera() -> bool {
    true
}

fn default_ba_tolerance() -> f64 {
    1e-6
}

fn default_output_type() -> String {
    "COLMAP".to_string()
}

/// Settings for one pipeline run. Every field has a default, so `{}` is a
/// valid config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Engine executable.
    #[serde(default = "default_colmap_binary")]
    pub colmap_binary: PathBuf,
    /// Arguments placed before the subcommand (wrappers, containers).
    #[serde(default)]
    pub colmap_leading_args: Vec<String>,
    /// Camera model fixed at bootstrap; later batches reuse the database
    /// cameras.
    #[serde(default = "default_camera_model")]
    pub camera_model: String,
    #[serde(default = "default_single_camera")]
    pub single_camera: bool,
    /// `--Mapper.ba_global_function_tolerance` for the bootstrap mapper.
    #[serde(default = "default_ba_tolerance")]
    pub ba_global_function_tolerance: f64,
    #[serde(default)]
    pub vocab_tree_path: Option<PathBuf>,
    #[serde(default = "default_output_type")]
    pub undistort_output_type: String,
    /// Per-invocation limit; `None` waits forever.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub collision_policy: CollisionPolicy,
    /// Adopt a single pre-existing model instead of bootstrapping again.
    #[serde(default)]
    pub resume: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            colmap_binary: default_colmap_binary(),
            colmap_leading_args: Vec::new(),
            camera_model: default_camera_model(),
            single_camera: default_single_camera(),
            ba_global_function_tolerance: default_ba_tolerance(),
            vocab_tree_path: None,
            undistort_output_type: default_output_type(),
            timeout_secs: None,
            collision_policy: CollisionPolicy::default(),
            resume: false,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, PipelineIoError> {
        read_json(path.as_ref())
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), PipelineIoError> {
        write_json(self, path.as_ref())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Build the command-line engine client described by this config.
    pub fn build_engine(&self) -> ColmapCli {
        ColmapCli::new(&self.colmap_binary)
            .with_leading_args(&self.colmap_leading_args)
            .with_timeout(self.timeout())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub name: String,
    pub index: u64,
    pub images: usize,
}

impl From<&TimeBatch> for BatchSummary {
    fn from(batch: &TimeBatch) -> Self {
        Self {
            name: batch.name(),
            index: batch.index,
            images: batch.len(),
        }
    }
}

/// What a run did, written whether it succeeded or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub input_root: PathBuf,
    #[serde(default)]
    pub workspace: Option<Workspace>,
    #[serde(default)]
    pub batches: Vec<BatchSummary>,
    #[serde(default)]
    pub staged_images: usize,
    #[serde(default)]
    pub collisions: Vec<String>,
    #[serde(default)]
    pub invocations: Vec<Subcommand>,
    pub phase: Phase,
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    #[serde(default)]
    pub undistorted_path: Option<PathBuf>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RunReport {
    pub fn new(input_root: &Path) -> Self {
        Self {
            input_root: input_root.to_path_buf(),
            workspace: None,
            batches: Vec::new(),
            staged_images: 0,
            collisions: Vec::new(),
            invocations: Vec::new(),
            phase: Phase::Empty,
            model_path: None,
            undistorted_path: None,
            error: None,
        }
    }

    /// Record a run error.
    pub fn set_error(&mut self, err: &impl std::error::Error) {
        self.error = Some(err.to_string());
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.undistorted_path.is_some()
    }

    /// Load a report from JSON on disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, PipelineIoError> {
        read_json(path.as_ref())
    }

    /// Write this report to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), PipelineIoError> {
        write_json(self, path.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let cfg: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, PipelineConfig::default());
        assert_eq!(cfg.camera_model, "OPENCV");
        assert_eq!(cfg.ba_global_function_tolerance, 1e-6);
        assert_eq!(cfg.collision_policy, CollisionPolicy::KeepFirst);
        assert!(cfg.timeout().is_none());
    }

    #[test]
    fn partial_config_overrides_fields() {
        let cfg: PipelineConfig = serde_json::from_str(
            r#"{"camera_model": "PINHOLE", "timeout_secs": 600, "collision_policy": "reject"}"#,
        )
        .unwrap();
        assert_eq!(cfg.camera_model, "PINHOLE");
        assert_eq!(cfg.timeout(), Some(Duration::from_secs(600)));
        assert_eq!(cfg.collision_policy, CollisionPolicy::Reject);
        assert!(cfg.single_camera);
    }

    #[test]
    fn config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        let cfg = PipelineConfig {
            vocab_tree_path: Some("/opt/vocab_tree.bin".into()),
            resume: true,
            ..PipelineConfig::default()
        };
        cfg.write_json(&path).unwrap();
        assert_eq!(PipelineConfig::load_json(&path).unwrap(), cfg);
    }

    #[test]
    fn malformed_config_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        let err = PipelineConfig::load_json(&path).unwrap_err();
        assert!(matches!(err, PipelineIoError::Json { .. }));
        assert!(err.to_string().contains("bad.json"));
    }
}
