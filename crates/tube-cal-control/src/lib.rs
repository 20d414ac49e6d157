//! Feedback control and persisted session state for tube calibration.
//!
//! - [`FeedbackController`] runs one proportional step per iteration: lock
//!   the target (trimmed mean of the first batch unless configured), test
//!   convergence against a relative band, compute the next DAC vector.
//! - [`ControlStore`] / [`SessionState`] carry the DAC vector, iteration
//!   index, target and convergence flag between process invocations.
//! - [`CsvLog`] appends date- and iteration-tagged rows for readings and
//!   control vectors.

mod controller;
mod csv_log;
mod error;
mod session;

pub use controller::{
    compute_correction, compute_target, test_convergence, ControlRange, ControllerParams,
    FeedbackController, StepOutcome,
};
pub use csv_log::{today, CsvLog, LogRow};
pub use error::{ControlError, SessionError};
pub use session::{
    ControlStore, CsvControlFile, MemoryControlStore, SessionLayout, SessionState, ARCHIVE_DIR,
    CAL_DIR, CONTROL_FILE, CONTROL_LOG, LOG_DIR, READINGS_LOG, STATE_FILE,
};
