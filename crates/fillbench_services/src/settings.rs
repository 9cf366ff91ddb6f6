//! Settings management
//!
//! Layered as defaults, then an optional JSON file, then command-line flags.
//! Keys missing from the file keep their defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings JSON")]
    Parse(#[from] serde_json::Error),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Bench settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchSettings {
    /// Compositor name, only echoed in the report.
    pub compositor: String,
    pub width: u32,
    pub height: u32,
    /// Surface buffer scale.
    pub scale: u32,
    pub budget_secs: u64,
    pub settle_ms: u64,
    /// Grid cells per axis in the paced workload.
    pub slices: u32,
    pub seed: u64,
    /// DRM render node for GPU-shared buffers. Unset means the node behind
    /// the compositor's main device.
    pub drm_device: Option<PathBuf>,
    /// Refresh rate of the simulated compositor.
    pub refresh_hz: u32,
    pub skip_probes: bool,
    pub headless: bool,
}

impl Default for BenchSettings {
    fn default() -> Self {
        Self {
            compositor: "unknown".to_string(),
            width: 1280,
            height: 720,
            scale: 1,
            budget_secs: 10,
            settle_ms: 1000,
            slices: 100,
            seed: 0,
            drm_device: None,
            refresh_hz: 60,
            skip_probes: false,
            headless: false,
        }
    }
}

impl BenchSettings {
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_json(&json)?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let checks = [
            ("width", u64::from(self.width)),
            ("height", u64::from(self.height)),
            ("scale", u64::from(self.scale)),
            ("budget_secs", self.budget_secs),
            ("slices", u64::from(self.slices)),
            ("refresh_hz", u64::from(self.refresh_hz)),
        ];
        match checks.iter().find(|(_, value)| *value == 0) {
            Some(&(field, _)) => Err(SettingsError::Zero { field }),
            None => Ok(()),
        }
    }

    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.budget_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}
