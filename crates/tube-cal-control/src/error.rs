use std::path::PathBuf;

/// Errors from the feedback computation.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ControlError {
    #[error("trimmed mean needs at least 3 readings, got {count}")]
    TooFewReadings { count: usize },
    #[error("{what} has {got} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("gain for tube {tube} must be finite and > 0 (got {gain})")]
    InvalidGain { tube: usize, gain: f64 },
    #[error("tolerance must be finite and >= 0 (got {0})")]
    InvalidTolerance(f64),
    #[error("invalid target intensity {0}")]
    InvalidTarget(f64),
    #[error("control range is empty (min={min}, max={max})")]
    InvalidRange { min: i32, max: i32 },
}

/// Errors reading or writing persisted session data.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{}: cannot parse {value:?}: {reason}", path.display())]
    Parse {
        path: PathBuf,
        value: String,
        reason: String,
    },
    #[error("{} is empty", .0.display())]
    EmptyControlFile(PathBuf),
    #[error("log row has {got} values, expected {expected}")]
    LogShape { expected: usize, got: usize },
}
