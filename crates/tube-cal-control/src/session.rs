//! State carried between calibration iterations.
//!
//! Each iteration may run as a fresh process, so everything that must
//! survive lives on disk: the DAC control vector (one CSV line, overwritten
//! in full) and a small JSON state file with the iteration index, the locked
//! target and the last convergence result. Nothing here is locked; two
//! overlapping iterations would race.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

pub const CAL_DIR: &str = "cal";
pub const ARCHIVE_DIR: &str = "archive";
pub const LOG_DIR: &str = "log";
pub const CONTROL_FILE: &str = "list_indxDAC.csv";
pub const STATE_FILE: &str = "session_state.json";
pub const READINGS_LOG: &str = "LOG_intst.csv";
pub const CONTROL_LOG: &str = "LOG_indxCurr.csv";

/// Storage for the per-tube control vector.
pub trait ControlStore {
    fn load_control_vector(&self) -> Result<Vec<i32>, SessionError>;
    /// Replace the stored vector.
    fn save_control_vector(&mut self, values: &[i32]) -> Result<(), SessionError>;
}

/// Control vector as a single comma-separated line in a file.
#[derive(Clone, Debug)]
pub struct CsvControlFile {
    path: PathBuf,
}

impl CsvControlFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ControlStore for CsvControlFile {
    fn load_control_vector(&self) -> Result<Vec<i32>, SessionError> {
        let raw = fs::read_to_string(&self.path)?;
        let line = raw
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| SessionError::EmptyControlFile(self.path.clone()))?;
        line.split(',')
            .map(|field| {
                let field = field.trim();
                field.parse::<i32>().map_err(|e| SessionError::Parse {
                    path: self.path.clone(),
                    value: field.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    fn save_control_vector(&mut self, values: &[i32]) -> Result<(), SessionError> {
        let line = values
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        fs::write(&self.path, format!("{line}\n"))?;
        Ok(())
    }
}

/// In-process control store.
#[derive(Clone, Debug, Default)]
pub struct MemoryControlStore {
    values: Option<Vec<i32>>,
}

impl MemoryControlStore {
    pub fn with_values(values: Vec<i32>) -> Self {
        Self {
            values: Some(values),
        }
    }
}

impl ControlStore for MemoryControlStore {
    fn load_control_vector(&self) -> Result<Vec<i32>, SessionError> {
        self.values.clone().ok_or_else(|| {
            SessionError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no control vector stored",
            ))
        })
    }

    fn save_control_vector(&mut self, values: &[i32]) -> Result<(), SessionError> {
        self.values = Some(values.to_vec());
        Ok(())
    }
}

/// Status carried across iterations and visible to an external driver.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    /// Index of the next iteration to run.
    pub iteration: u32,
    /// Locked calibration target, set by the first iteration.
    pub target: Option<f64>,
    pub converged: bool,
    pub running: bool,
}

impl SessionState {
    pub fn is_converged(&self) -> bool {
        self.converged
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Load a state file from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load a state file, or start fresh when it does not exist yet.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_json(path)
    }

    /// Write this state to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// On-disk layout of one calibration session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLayout {
    root: PathBuf,
}

impl SessionLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory the exposure controller writes shots into.
    pub fn cal_dir(&self) -> PathBuf {
        self.root.join(CAL_DIR)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join(ARCHIVE_DIR)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join(LOG_DIR)
    }

    pub fn control_file(&self) -> PathBuf {
        self.root.join(CONTROL_FILE)
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    pub fn readings_log(&self) -> PathBuf {
        self.log_dir().join(READINGS_LOG)
    }

    pub fn control_log(&self) -> PathBuf {
        self.log_dir().join(CONTROL_LOG)
    }

    pub fn iteration_report(&self, iteration: u32) -> PathBuf {
        self.log_dir().join(format!("iteration_{iteration}.json"))
    }

    /// Create the cal, archive and log directories if missing.
    pub fn ensure_dirs(&self) -> Result<(), SessionError> {
        for dir in [self.cal_dir(), self.archive_dir(), self.log_dir()] {
            if !dir.exists() {
                fs::create_dir_all(&dir)?;
                log::info!("created {}", dir.display());
            }
        }
        Ok(())
    }
}
