//! Panel configuration types.
//!
//! # Example TOML
//!
//! ```toml
//! [storage]
//! backend = "sqlite"
//! path = "~/.local/share/gpanel/panel.db"
//! key_prefix = "gpanel"
//!
//! [capture]
//! fps = 30
//! time_limit_secs = 10.0
//! output_dir = "captures"
//! fallback_background = "#000000"
//!
//! [recording]
//! pause_after = true
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::color::ColorValue;
use crate::error::{PanelError, Result};
use crate::storage::DEFAULT_KEY_PREFIX;

/// Codecs tried in order when starting a video recording.
pub const DEFAULT_CODEC_PREFERENCES: [&str; 3] =
    ["video/webm;codecs=vp9", "video/webm;codecs=vp8", "video/webm"];

/// Highest capture rate accepted from configuration.
pub const MAX_CAPTURE_FPS: u32 = 240;

/// Top-level panel configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub storage: StorageConfig,
    pub capture: CaptureConfig,
    pub recording: RecordingConfig,
}

impl PanelConfig {
    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        trace!("Validating panel config");
        self.storage.validate()?;
        self.capture.validate()
    }
}

/// Where storage lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Volatile; nothing survives the process.
    Memory,
    #[default]
    Sqlite,
}

/// `[storage]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database file; defaults to the user data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub key_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl StorageConfig {
    fn validate(&self) -> Result<()> {
        if self.key_prefix.is_empty() || self.key_prefix.contains(char::is_whitespace) {
            return Err(PanelError::ConfigInvalid(format!(
                "storage.key_prefix '{}' must be non-empty and contain no whitespace",
                self.key_prefix
            )));
        }
        Ok(())
    }

    /// Database path, falling back to `<data_dir>/gpanel/panel.db`.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join("gpanel").join("panel.db"))
            .ok_or_else(|| {
                PanelError::ConfigInvalid("Could not determine data directory".to_string())
            })
    }
}

/// `[capture]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub fps: u32,
    /// Seconds; zero records until stopped.
    pub time_limit_secs: f64,
    /// Where archives and recordings are written; defaults to the downloads directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// Used when neither the surface nor any ancestor has an opaque background.
    pub fallback_background: String,
    pub codec_preferences: Vec<String>,
    /// ICC profile embedded in frames when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icc_profile: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            time_limit_secs: 0.0,
            output_dir: None,
            fallback_background: ColorValue::BLACK.to_hex(),
            codec_preferences: DEFAULT_CODEC_PREFERENCES.map(String::from).to_vec(),
            icc_profile: None,
        }
    }
}

impl CaptureConfig {
    fn validate(&self) -> Result<()> {
        if self.fps == 0 || self.fps > MAX_CAPTURE_FPS {
            return Err(PanelError::ConfigInvalid(format!(
                "capture.fps must be between 1 and {MAX_CAPTURE_FPS}, got {}",
                self.fps
            )));
        }
        if !self.time_limit_secs.is_finite() || self.time_limit_secs < 0.0 {
            return Err(PanelError::ConfigInvalid(format!(
                "capture.time_limit_secs must be zero or positive, got {}",
                self.time_limit_secs
            )));
        }
        self.background()?;
        if self.codec_preferences.iter().any(|c| c.trim().is_empty()) {
            return Err(PanelError::ConfigInvalid(
                "capture.codec_preferences contains an empty entry".to_string(),
            ));
        }
        Ok(())
    }

    /// Configured limit, `None` when unbounded.
    pub fn time_limit(&self) -> Option<f64> {
        (self.time_limit_secs > 0.0).then_some(self.time_limit_secs)
    }

    /// Parsed fallback background, always opaque.
    pub fn background(&self) -> Result<ColorValue> {
        ColorValue::from_hex(&self.fallback_background)
            .map(ColorValue::opaque)
            .map_err(|e| {
                PanelError::ConfigInvalid(format!("capture.fallback_background: {e}"))
            })
    }

    /// Output directory, falling back to downloads then the working directory.
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// `[recording]` section: defaults for the after-recording toggles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub pause_after: bool,
    pub clean_scene_after: bool,
}
