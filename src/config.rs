// src/config.rs
//
// Runtime tunables for the control surface. Loaded from TOML; every field
// has a default so a missing or empty file yields a working configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ControlConfig {
    /// Interval between firmware-progress polls, in milliseconds.
    #[serde(default = "default_poll_cadence_ms")]
    pub poll_cadence_ms: u64,
    /// Devices unseen for this many seconds are dropped from the registry.
    #[serde(default = "default_liveness_window_secs")]
    pub liveness_window_secs: u64,
    /// File extensions accepted as firmware images (case-insensitive).
    #[serde(default = "default_firmware_extensions")]
    pub firmware_extensions: Vec<String>,
}

fn default_poll_cadence_ms() -> u64 {
    500
}
fn default_liveness_window_secs() -> u64 {
    4
}
fn default_firmware_extensions() -> Vec<String> {
    vec!["grplfw".to_string(), "bin".to_string()]
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            poll_cadence_ms: default_poll_cadence_ms(),
            liveness_window_secs: default_liveness_window_secs(),
            firmware_extensions: default_firmware_extensions(),
        }
    }
}

impl ControlConfig {
    pub fn from_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| format!("Failed to parse config: {}", e))
    }

    pub fn load(path: &std::path::Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::from_toml(&text)
    }

    pub fn poll_cadence(&self) -> Duration {
        Duration::from_millis(self.poll_cadence_ms)
    }

    pub fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.liveness_window_secs)
    }

    /// Whether a file extension signals a firmware image.
    pub fn accepts_extension(&self, ext: &str) -> bool {
        self.firmware_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }
}
