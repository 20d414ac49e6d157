//! High-level facade for the `tube-cal-*` workspace.
//!
//! This crate provides:
//! - re-exports of the building blocks (`core`, `intake`, `control`)
//! - the JSON session configuration
//! - [`CalibrationSession`], which runs one closed-loop iteration end to end
//! - the uniformity check and DAC sweep used around a calibration run
//! - (feature `image`) ROI overlay rendering for visual inspection
//!
//! ## Quickstart
//!
//! ```no_run
//! use tube_cal::{CalibrationConfig, CalibrationSession};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CalibrationConfig::load_json("tube_cal.json")?;
//! let mut session = CalibrationSession::open(config)?;
//! session.initialize(&[100; 7])?;
//!
//! // after the exposure controller has written a batch into <root>/cal:
//! let report = session.run_iteration(150.0)?;
//! println!("readings {:?} -> DAC {:?}", report.intensities(), report.new_control);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `tube_cal::core`: raw frames, tube geometry, ROI extraction, logger.
//! - `tube_cal::intake`: batch polling, dummy/data classification, archiving.
//! - `tube_cal::control`: feedback controller, control store, session state, CSV logs.
//! - `tube_cal::uniformity`: per-step, per-tube intensity map of a scan.
//! - `tube_cal::sweep`: DAC linearity sweep and gain estimation.
//! - `tube_cal::overlay` (feature `image`): PNG rendering of frames with ROI boxes.

pub use tube_cal_control as control;
pub use tube_cal_core as core;
pub use tube_cal_intake as intake;

mod config;
mod error;
mod iteration;
mod report;

pub mod sweep;
pub mod uniformity;

#[cfg(feature = "image")]
pub mod overlay;

pub use config::{CalibrationConfig, ConfigError, ExposureInfo, IntakeConfig};
pub use error::CalibrationError;
pub use iteration::{
    measure_frame, measure_frames, CalibrationSession, DiagnosticSink, NoDiagnostics,
};
pub use report::{IterationReport, TubeReading};
