use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| {
    if let Some(path) = option_env!("FACESORT_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    directories::ProjectDirs::from("", "", "facesort")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("facesort.toml"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum cosine similarity for a face to be assigned a label.
    pub threshold: f32,
    pub reference_dir: PathBuf,
    pub photos_dir: PathBuf,
    pub output_dir: PathBuf,
    pub detection: DetectionConfig,
    pub models: ModelConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            reference_dir: PathBuf::from("data/reference_faces"),
            photos_dir: PathBuf::from("data/photos"),
            output_dir: PathBuf::from("data/output"),
            detection: DetectionConfig::default(),
            models: ModelConfig::default(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.6,
            nms_threshold: 0.3,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            detector: PathBuf::from("models/face_detection_yunet_2023mar.onnx"),
            recognizer: PathBuf::from("models/face_recognition_sface_2021dec.onnx"),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() {
            anyhow::bail!("threshold must be a finite number, got {}", self.threshold);
        }
        for (name, v) in [
            ("detection.score_threshold", self.detection.score_threshold),
            ("detection.nms_threshold", self.detection.nms_threshold),
        ] {
            if !(0.0..=1.0).contains(&v) {
                anyhow::bail!("{} must be within [0, 1], got {}", name, v);
            }
        }
        Ok(())
    }

    pub fn model_paths(&self) -> facesort_vision::ModelPaths {
        facesort_vision::ModelPaths {
            detector: self.models.detector.clone(),
            recognizer: self.models.recognizer.clone(),
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
