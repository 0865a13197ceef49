//! Configuration management for shutterbug
//!
//! Provides configuration loading, saving and validation for device access
//! timeouts, capture buffering and recording output naming.

use crate::errors::CameraError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShutterbugConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub recording: RecordingOutputConfig,
}

/// Device access configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Bounded wait for the exclusive open/close lock
    pub lock_timeout_ms: u64,
    /// How long `pause` waits for the worker thread to exit
    pub worker_join_timeout_ms: u64,
}

/// Still capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Frames a still handler may hold outstanding before acquisition fails
    pub frame_buffer_depth: usize,
    /// Upper bound on focus/exposure convergence before capturing anyway (0 disables)
    pub convergence_timeout_ms: u64,
}

/// Recording output naming
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingOutputConfig {
    /// Directory generated recording paths are placed in
    pub output_directory: String,
    /// File name prefix for generated recording paths
    pub file_prefix: String,
    /// File extension, without the dot
    pub extension: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 2500,
            worker_join_timeout_ms: 2000,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_buffer_depth: 2,
            convergence_timeout_ms: 3000,
        }
    }
}

impl Default for RecordingOutputConfig {
    fn default() -> Self {
        Self {
            output_directory: "./recordings".to_string(),
            file_prefix: "VID".to_string(),
            extension: "mp4".to_string(),
        }
    }
}

impl DeviceConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn worker_join_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_join_timeout_ms)
    }
}

impl CaptureConfig {
    pub fn convergence_timeout(&self) -> Option<Duration> {
        match self.convergence_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

impl ShutterbugConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CameraError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ShutterbugConfig = toml::from_str(&contents)
            .map_err(|e| CameraError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CameraError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CameraError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| CameraError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("shutterbug.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), CameraError> {
        if self.device.lock_timeout_ms == 0 {
            return Err(CameraError::Config(
                "lock_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.device.worker_join_timeout_ms == 0 {
            return Err(CameraError::Config(
                "worker_join_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.capture.frame_buffer_depth == 0 || self.capture.frame_buffer_depth > 64 {
            return Err(CameraError::Config(
                "frame_buffer_depth must be between 1 and 64".to_string(),
            ));
        }
        if self.recording.extension.is_empty() || self.recording.extension.contains('.') {
            return Err(CameraError::Config(
                "recording extension must be non-empty and without a dot".to_string(),
            ));
        }
        Ok(())
    }
}
