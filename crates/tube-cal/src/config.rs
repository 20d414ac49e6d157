//! JSON configuration for a calibration session.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::{DetectorSpec, TubeArraySpec, TubeLayout, DEFAULT_HALF_WINDOW};
use crate::control::{ControlError, ControllerParams, FeedbackController, SessionLayout};
use crate::intake::{ArchivePolicy, ClassificationRule, FileOrdering, IntakeError, WaitParams};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Rule(#[from] IntakeError),
    #[error(transparent)]
    Control(#[from] ControlError),
}

/// Batch intake settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub wait: WaitParams,
    pub ordering: FileOrdering,
    /// Warm-up frames at the start of every batch.
    pub leading_dummies: usize,
    /// Explicit data positions; overrides the leading/alternating rule.
    pub keep_positions: Option<Vec<usize>>,
    pub archive: ArchivePolicy,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            wait: WaitParams::default(),
            ordering: FileOrdering::Numeric,
            leading_dummies: 11,
            keep_positions: None,
            archive: ArchivePolicy::default(),
        }
    }
}

/// Exposure settings recorded alongside each iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureInfo {
    pub tube_voltage_kv: Option<f64>,
    pub tube_current_ma: Option<f64>,
}

fn default_session_root() -> PathBuf {
    PathBuf::from(".")
}

/// Complete configuration of one calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Directory holding `cal/`, `archive/`, `log/` and the persisted state.
    #[serde(default = "default_session_root")]
    pub session_root: PathBuf,
    pub detector: DetectorSpec,
    pub array: TubeArraySpec,
    pub roi_half_window: i64,
    pub intake: IntakeConfig,
    pub control: ControllerParams,
    pub exposure: ExposureInfo,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            session_root: default_session_root(),
            detector: DetectorSpec::default(),
            array: TubeArraySpec::default(),
            roi_half_window: DEFAULT_HALF_WINDOW,
            intake: IntakeConfig::default(),
            control: ControllerParams::default(),
            exposure: ExposureInfo::default(),
        }
    }
}

impl CalibrationConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn tube_count(&self) -> usize {
        self.array.tube_count
    }

    pub fn layout(&self) -> SessionLayout {
        SessionLayout::new(&self.session_root)
    }

    pub fn tube_layout(&self) -> TubeLayout {
        TubeLayout::new(self.detector, self.array)
    }

    pub fn wait_params(&self) -> &WaitParams {
        &self.intake.wait
    }

    /// Build the dummy/data rule from the intake section.
    pub fn classification_rule(&self) -> Result<ClassificationRule, ConfigError> {
        let total = self.intake.wait.expected_files;
        let rule = match &self.intake.keep_positions {
            Some(keep) => ClassificationRule::from_keep_positions(total, keep.clone())?,
            None => ClassificationRule::leading_then_alternating(total, self.intake.leading_dummies),
        };
        Ok(rule)
    }

    pub fn controller(&self) -> Result<FeedbackController, ConfigError> {
        Ok(FeedbackController::new(
            self.control.clone(),
            self.tube_count(),
        )?)
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let det = &self.detector;
        if det.rows == 0 || det.cols == 0 {
            return Err(ConfigError::Invalid(format!(
                "detector must have non-zero size (rows={}, cols={})",
                det.rows, det.cols
            )));
        }
        if !det.pixel_size_mm.is_finite() || det.pixel_size_mm <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "pixel_size_mm must be > 0 (got {})",
                det.pixel_size_mm
            )));
        }
        if self.array.tube_count == 0 {
            return Err(ConfigError::Invalid("tube_count must be >= 1".to_string()));
        }
        if !self.array.pitch_mm.is_finite() || self.array.pitch_mm <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "pitch_mm must be > 0 (got {})",
                self.array.pitch_mm
            )));
        }
        if self.roi_half_window <= 0 {
            return Err(ConfigError::Invalid(format!(
                "roi_half_window must be > 0 (got {})",
                self.roi_half_window
            )));
        }
        let rule = self.classification_rule()?;
        if rule.data_count() != self.tube_count() {
            return Err(ConfigError::Invalid(format!(
                "classification keeps {} frames per batch but the array has {} tubes",
                rule.data_count(),
                self.tube_count()
            )));
        }
        self.control.validate(self.tube_count())?;
        Ok(())
    }
}
