//! Serializable record of one calibration iteration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ExposureInfo;
use crate::core::RoiBounds;
use crate::intake::ArchiveReport;

/// Measurement of one tube channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TubeReading {
    pub tube: usize,
    pub frame: PathBuf,
    pub intensity: u32,
    pub roi: RoiBounds,
    pub valid_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationReport {
    pub date: String,
    pub iteration: u32,
    pub position_mm: f64,
    #[serde(default)]
    pub exposure: ExposureInfo,
    pub row_centers: Vec<i64>,
    pub col_center: i64,
    pub readings: Vec<TubeReading>,
    pub target: f64,
    pub target_locked: bool,
    pub tolerance: f64,
    pub converged: bool,
    pub prior_control: Vec<i32>,
    pub new_control: Vec<i32>,
    #[serde(default)]
    pub archive: ArchiveReport,
}

impl IterationReport {
    pub fn intensities(&self) -> Vec<u32> {
        self.readings.iter().map(|r| r.intensity).collect()
    }

    /// Load a report from JSON on disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, crate::ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this report to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), crate::ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
