use std::path::PathBuf;

/// Fatal intake failures. Any of these stops the current iteration.
#[derive(thiserror::Error, Debug)]
pub enum IntakeError {
    #[error("timed out after {attempts} polls: found {found} of {expected} files in {}", dir.display())]
    BatchTimeout {
        dir: PathBuf,
        found: usize,
        expected: usize,
        attempts: u32,
    },
    #[error("batch integrity check failed after {attempts} polls: found {found} of {expected} files in {}", dir.display())]
    IntegrityError {
        dir: PathBuf,
        found: usize,
        expected: usize,
        attempts: u32,
    },
    #[error("batch shape mismatch: {reason}")]
    BatchShapeError { reason: String },
    #[error("invalid classification rule: {0}")]
    InvalidRule(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
