use std::path::PathBuf;

use crate::config::ConfigError;
use crate::control::{ControlError, SessionError};
use crate::core::FrameError;
use crate::intake::IntakeError;

/// Errors that stop a calibration iteration.
#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read frame {}: {source}", path.display())]
    Frame {
        path: PathBuf,
        #[source]
        source: FrameError,
    },

    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("scan of {files} files is not a whole number of {tubes}-tube steps")]
    IncompleteScan { files: usize, tubes: usize },

    #[error("gain estimation needs at least two distinct DAC values")]
    DegenerateSweep,
}
