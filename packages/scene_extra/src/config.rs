//! Controller configuration and the headless simulation job spec.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::headless::TagSpec;

/// Interval between controller polls in milliseconds.
fn default_poll_interval_ms() -> u64 {
    500
}

/// Frames per second assumed when the host does not report one.
fn default_frame_rate() -> f32 {
    60.0
}

fn default_ambient_intensity() -> f32 {
    0.7
}

fn default_ambient_color() -> u32 {
    0xffffff
}

/// Default switch-group transition length in seconds.
fn default_switch_duration() -> f32 {
    0.4
}

fn default_fingerprint_precision() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_frames_per_poll() -> u32 {
    30
}

fn default_polls() -> u32 {
    4
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Renderer adjustments applied once the scene is ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RendererSettings {
    #[serde(default = "default_true")]
    pub shadows: bool,

    /// Percentage-closer soft shadow filtering.
    #[serde(default = "default_true")]
    pub soft_shadows: bool,

    /// Linear output encoding and linear tone mapping.
    #[serde(default = "default_true")]
    pub linear_tone_mapping: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            shadows: true,
            soft_shadows: true,
            linear_tone_mapping: true,
        }
    }
}

/// Scene controller tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Frame rate used when the viewport does not report one.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f32,

    /// Ambient light added to the root scene during setup.
    #[serde(default = "default_ambient_intensity")]
    pub ambient_intensity: f32,

    #[serde(default = "default_ambient_color")]
    pub ambient_color: u32,

    #[serde(default)]
    pub renderer: RendererSettings,

    #[serde(default = "default_switch_duration")]
    pub switch_duration: f32,

    /// Decimal places kept per matrix element in the camera fingerprint.
    #[serde(default = "default_fingerprint_precision")]
    pub fingerprint_precision: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            frame_rate: default_frame_rate(),
            ambient_intensity: default_ambient_intensity(),
            ambient_color: default_ambient_color(),
            renderer: RendererSettings::default(),
            switch_duration: default_switch_duration(),
            fingerprint_precision: default_fingerprint_precision(),
        }
    }
}

impl ControllerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = read_json(path)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_ms == 0 {
            return Err("Poll interval must be positive".to_string());
        }
        if self.frame_rate <= 0.0 {
            return Err("Frame rate must be positive".to_string());
        }
        if self.ambient_intensity < 0.0 {
            return Err("Ambient intensity cannot be negative".to_string());
        }
        if self.switch_duration < 0.0 {
            return Err("Switch duration cannot be negative".to_string());
        }
        if self.fingerprint_precision > 10 {
            return Err("Fingerprint precision must be at most 10".to_string());
        }
        Ok(())
    }
}

/// Headless run: a scene document, the tags to replace, and optional data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSpec {
    /// Path to the scene document JSON.
    pub scene_path: PathBuf,

    /// Tags to replace, in installation order.
    pub tags: Vec<TagSpec>,

    /// Optional data snapshot (frames, template, rule maps).
    #[serde(default)]
    pub data_path: Option<PathBuf>,

    /// Directory widget asset paths are resolved against. Defaults to the
    /// scene document's directory.
    #[serde(default)]
    pub asset_root: Option<PathBuf>,

    /// Number of poll cycles to run.
    #[serde(default = "default_polls")]
    pub polls: u32,

    #[serde(default = "default_frames_per_poll")]
    pub frames_per_poll: u32,

    /// Poll at which the host finishes loading its scene.
    #[serde(default)]
    pub ready_after_polls: u32,

    #[serde(default)]
    pub controller: ControllerConfig,
}

impl SimulationSpec {
    /// Load a simulation from JSON. Relative paths resolve against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut spec: Self = read_json(path)?;
        if let Some(dir) = path.parent() {
            spec.resolve_paths(dir);
        }
        Ok(spec)
    }

    fn resolve_paths(&mut self, dir: &Path) {
        if self.scene_path.is_relative() {
            self.scene_path = dir.join(&self.scene_path);
        }
        if let Some(data) = self.data_path.as_mut() {
            if data.is_relative() {
                *data = dir.join(&*data);
            }
        }
        if let Some(root) = self.asset_root.as_mut() {
            if root.is_relative() {
                *root = dir.join(&*root);
            }
        }
    }

    /// Directory asset paths are resolved against.
    pub fn effective_asset_root(&self) -> PathBuf {
        self.asset_root.clone().unwrap_or_else(|| {
            self.scene_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.scene_path.exists() {
            return Err(format!("Scene file not found: {:?}", self.scene_path));
        }
        if let Some(data) = &self.data_path {
            if !data.exists() {
                return Err(format!("Data file not found: {:?}", data));
            }
        }
        if self.tags.is_empty() {
            return Err("At least one tag must be configured".to_string());
        }
        for (i, tag) in self.tags.iter().enumerate() {
            if tag.name.is_empty() {
                return Err(format!("Tag {}: name cannot be empty", i));
            }
        }
        if self.polls == 0 {
            return Err("Poll count must be positive".to_string());
        }
        self.controller
            .validate()
            .map_err(|e| format!("Controller: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_defaults() {
        let config: ControllerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.ambient_intensity, 0.7);
        assert_eq!(config.switch_duration, 0.4);
        assert!(config.renderer.soft_shadows);
    }

    #[test]
    fn test_controller_validation() {
        let mut config = ControllerConfig::default();
        assert!(config.validate().is_ok());
        config.frame_rate = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_simulation_spec_parsing() {
        let json = r#"{
            "scenePath": "scene.json",
            "tags": [{"name": "Pump", "widget": {"type": "text", "content": "hello"}}],
            "controller": {"pollIntervalMs": 250}
        }"#;
        let mut spec: SimulationSpec = serde_json::from_str(json).unwrap();
        spec.resolve_paths(Path::new("/jobs"));
        assert_eq!(spec.scene_path, PathBuf::from("/jobs/scene.json"));
        assert_eq!(spec.polls, 4);
        assert_eq!(spec.frames_per_poll, 30);
        assert_eq!(spec.controller.poll_interval_ms, 250);
        assert_eq!(spec.effective_asset_root(), PathBuf::from("/jobs"));
    }

    #[test]
    fn test_simulation_spec_requires_scene_file() {
        let json = r#"{"scenePath": "/definitely/missing.json", "tags": []}"#;
        let spec: SimulationSpec = serde_json::from_str(json).unwrap();
        assert!(spec.validate().unwrap_err().contains("Scene file not found"));
    }
}
