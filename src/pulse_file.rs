//! Persisted capture format
//!
//! ```json
//! {
//!   "gpio_in": 17,
//!   "pulse_us": [9000, 4500, 560, 560]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pin::Pin;

#[derive(Error, Debug)]
pub enum PulseFileError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid pulse file: {0}")]
    Format(#[from] serde_json::Error),
}

/// A captured burst together with the pin it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseFile {
    pub gpio_in: Pin,
    pub pulse_us: Vec<u32>,
}

impl PulseFile {
    pub fn new(gpio_in: Pin, pulse_us: Vec<u32>) -> Self {
        Self { gpio_in, pulse_us }
    }

    /// Pretty-printed JSON with two-space indentation
    pub fn to_json(&self) -> Result<String, PulseFileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PulseFileError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), PulseFileError> {
        let mut json = self.to_json()?;
        json.push('\n');
        std::fs::write(path, json).map_err(|source| PulseFileError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, PulseFileError> {
        let json = std::fs::read_to_string(path).map_err(|source| PulseFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}
