//! Application Configuration
//!
//! Persistent settings for the evtscan client.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::FacingMode;

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Backend ===
    /// Base URL of the attendance API
    pub api_base_url: String,

    /// Base URL of the public site, used to build check-in links
    pub public_base_url: String,

    /// Request timeout in seconds (None = wait until the backend answers)
    pub request_timeout_secs: Option<u64>,

    // === Camera ===
    /// Camera to open first
    pub preferred_camera: FacingMode,

    /// Decode every N frames (1 = every frame)
    pub scan_interval: u64,

    /// Delay between frames when replaying captured images
    pub frame_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000".to_string(),
            public_base_url: "http://localhost:5173".to_string(),
            request_timeout_secs: None,

            preferred_camera: FacingMode::Environment,
            scan_interval: 1,
            frame_interval_ms: 100,
        }
    }
}

impl Settings {
    /// Get settings file path
    pub fn file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("evtscan").join("settings.json"))
    }

    /// Load settings from the default location
    pub fn load() -> Result<Self> {
        let path = Self::file_path().ok_or_else(|| anyhow::anyhow!("No config directory"))?;
        Self::load_from(&path)
    }

    /// Load settings from a file, falling back to defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::file_path().ok_or_else(|| anyhow::anyhow!("No config directory"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}
