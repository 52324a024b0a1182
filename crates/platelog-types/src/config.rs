use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{PlatelogError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub prefer_rear: bool,
    pub jpeg_quality: u8,
    /// Still image served as a virtual camera. A synthetic camera is used
    /// when unset.
    pub still_image: Option<String>,
    #[serde(default)]
    pub front_facing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

/// How an AI-suggested bounding box is turned into the initial selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SeedPolicy {
    /// Clamp the suggestion into the visible image.
    #[default]
    Clamp,
    /// Use the suggestion verbatim, even when it leaves the image.
    PassThrough,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropConfig {
    #[serde(default)]
    pub seed_policy: SeedPolicy,
    /// Width of the default square selection, in percent of the image width.
    pub default_coverage_pct: f64,
    pub pixel_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    pub log_level: String,
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatelogConfig {
    pub camera: CameraConfig,
    pub analysis: AnalysisConfig,
    pub crop: CropConfig,
    pub storage: StorageConfig,
    pub ops: OpsConfig,
}

impl Default for PlatelogConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                prefer_rear: true,
                jpeg_quality: 92,
                still_image: None,
                front_facing: false,
            },
            analysis: AnalysisConfig {
                endpoint: None,
                api_key: None,
                timeout_ms: 20_000,
            },
            crop: CropConfig {
                seed_policy: SeedPolicy::Clamp,
                default_coverage_pct: 90.0,
                pixel_ratio: 1.0,
            },
            storage: StorageConfig {
                data_file: "platelog.json".into(),
            },
            ops: OpsConfig {
                log_level: "info".into(),
                data_dir: "data".into(),
            },
        }
    }
}

impl PlatelogConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            PlatelogError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            PlatelogError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.camera.jpeg_quality) {
            return Err(PlatelogError::Configuration(
                "camera.jpeg_quality must be between 1 and 100".into(),
            ));
        }
        if self.analysis.timeout_ms == 0 {
            return Err(PlatelogError::Configuration(
                "analysis.timeout_ms must be greater than zero".into(),
            ));
        }
        if !(self.crop.default_coverage_pct > 0.0 && self.crop.default_coverage_pct <= 100.0) {
            return Err(PlatelogError::Configuration(
                "crop.default_coverage_pct must be within (0, 100]".into(),
            ));
        }
        if !(self.crop.pixel_ratio.is_finite() && self.crop.pixel_ratio > 0.0) {
            return Err(PlatelogError::Configuration(
                "crop.pixel_ratio must be a positive number".into(),
            ));
        }
        if self.storage.data_file.trim().is_empty() {
            return Err(PlatelogError::Configuration(
                "storage.data_file must not be empty".into(),
            ));
        }
        Ok(())
    }
}
