// SPDX-License-Identifier: GPL-3.0-only

//! Persistent settings
//!
//! Stored as JSON in `$XDG_CONFIG_HOME/scanner/config.json`. Every field has a
//! default, so older or hand-edited files load with the missing keys filled in.

use crate::backends::camera::{CameraBackendType, CameraSelector};
use crate::backends::permission::PermissionProvider;
use crate::constants::{decoder, pipeline};
use crate::errors::{AppError, AppResult};
use crate::scanner::{RqrrDecoder, SelectionPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Current on-disk format version
pub const CONFIG_VERSION: u32 = 1;

const APP_DIR: &str = "scanner";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: u32,
    /// Camera backend to use (PipeWire or V4L2)
    pub backend: CameraBackendType,
    /// Pin a camera by device path instead of picking the back camera
    pub camera_path: Option<String>,
    /// Accept USB webcams and other cameras of unknown mounting
    pub allow_external_camera: bool,
    /// Who decides whether the camera may be opened
    pub permission: PermissionProvider,
    /// Which barcode wins when a frame holds several
    pub selection_policy: SelectionPolicy,
    /// Frames are downscaled to this before QR detection
    pub decoder_max_dimension: u32,
    /// Upper bound for frames produced by the camera pipeline
    pub analysis_max_dimension: u32,
    /// Mirror the terminal preview horizontally
    pub mirror_preview: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            backend: CameraBackendType::default(),
            camera_path: None,
            allow_external_camera: true,
            permission: PermissionProvider::default(),
            selection_policy: SelectionPolicy::default(),
            decoder_max_dimension: decoder::DEFAULT_MAX_DIMENSION,
            analysis_max_dimension: pipeline::DEFAULT_ANALYSIS_MAX_DIMENSION,
            mirror_preview: false,
        }
    }
}

impl Config {
    /// Default config file location
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from the default location; a missing file yields the defaults
    pub fn load() -> AppResult<Self> {
        match Self::path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load, falling back to defaults (with a warning) on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            Self::default()
        })
    }

    pub fn load_from(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        if config.version > CONFIG_VERSION {
            warn!(
                version = config.version,
                supported = CONFIG_VERSION,
                "Config written by a newer version, unknown settings are ignored"
            );
        }
        debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    /// Save to the default location
    pub fn save(&self) -> AppResult<()> {
        let path = Self::path()
            .ok_or_else(|| AppError::Config("No config directory available".to_string()))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Camera selection rule for sessions
    pub fn selector(&self) -> CameraSelector {
        CameraSelector {
            device_path: self.camera_path.clone(),
            allow_external: self.allow_external_camera,
        }
    }

    /// Bundled QR decoder with the configured resolution bound
    pub fn decoder(&self) -> RqrrDecoder {
        RqrrDecoder::with_max_dimension(self.decoder_max_dimension)
    }
}
