//! Recording output naming

use crate::config::RecordingOutputConfig;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where generated recording paths go and how they are named
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Directory the recordings are placed in
    pub output_directory: PathBuf,
    /// File name prefix, e.g. "VID"
    pub file_prefix: String,
    /// Extension without the dot
    pub extension: String,
}

impl RecordingConfig {
    pub fn new(output_directory: impl Into<PathBuf>) -> Self {
        Self {
            output_directory: output_directory.into(),
            ..Self::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    /// Path for a recording started at `at`: `<dir>/<prefix>_YYYYMMDD_HHMMSS_mmm.<ext>`
    pub fn path_for(&self, at: DateTime<Local>) -> PathBuf {
        let name = format!(
            "{}_{}.{}",
            self.file_prefix,
            at.format("%Y%m%d_%H%M%S_%3f"),
            self.extension
        );
        self.output_directory.join(name)
    }

    pub fn next_path(&self) -> PathBuf {
        self.path_for(Local::now())
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        RecordingOutputConfig::default().into()
    }
}

impl From<RecordingOutputConfig> for RecordingConfig {
    fn from(config: RecordingOutputConfig) -> Self {
        Self {
            output_directory: PathBuf::from(config.output_directory),
            file_prefix: config.file_prefix,
            extension: config.extension,
        }
    }
}
