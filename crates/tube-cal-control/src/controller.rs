//! Discrete proportional feedback on per-tube DAC values.
//!
//! One step per iteration: lock a target intensity, test every tube against
//! a relative tolerance band, and move each DAC value by the intensity error
//! divided by that tube's gain (intensity per DAC unit).

use serde::{Deserialize, Serialize};

use crate::error::ControlError;
use crate::session::SessionState;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Inclusive range a DAC value is clamped to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRange {
    pub min: i32,
    pub max: i32,
}

impl Default for ControlRange {
    fn default() -> Self {
        Self {
            min: -1000,
            max: 1000,
        }
    }
}

impl ControlRange {
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.min > self.max {
            return Err(ControlError::InvalidRange {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    /// Round half away from zero, then clamp.
    pub fn clamp_round(&self, value: f64) -> i32 {
        let rounded = value.round();
        if rounded <= f64::from(self.min) {
            self.min
        } else if rounded >= f64::from(self.max) {
            self.max
        } else {
            rounded as i32
        }
    }
}

/// Controller settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerParams {
    /// Intensity change per DAC unit, one per tube.
    pub gains: Vec<f64>,
    /// Allowed relative deviation from the target.
    pub tolerance: f64,
    /// Fixed target; when absent the first batch's trimmed mean is used.
    pub target: Option<f64>,
    pub range: ControlRange,
}

impl Default for ControllerParams {
    fn default() -> Self {
        Self {
            gains: vec![9.13; 7],
            tolerance: 0.05,
            target: None,
            range: ControlRange::default(),
        }
    }
}

impl ControllerParams {
    pub fn validate(&self, tube_count: usize) -> Result<(), ControlError> {
        check_len("gains", tube_count, self.gains.len())?;
        for (tube, &gain) in self.gains.iter().enumerate() {
            if !gain.is_finite() || gain <= 0.0 {
                return Err(ControlError::InvalidGain { tube, gain });
            }
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ControlError::InvalidTolerance(self.tolerance));
        }
        if let Some(t) = self.target {
            check_target(t)?;
        }
        self.range.validate()
    }
}

fn check_len(what: &'static str, expected: usize, got: usize) -> Result<(), ControlError> {
    if expected != got {
        return Err(ControlError::LengthMismatch {
            what,
            expected,
            got,
        });
    }
    Ok(())
}

/// Configured targets must be positive.
fn check_target(target: f64) -> Result<(), ControlError> {
    if !target.is_finite() || target <= 0.0 {
        return Err(ControlError::InvalidTarget(target));
    }
    Ok(())
}

/// A locked or computed target may be 0 when every ROI was empty.
fn check_locked_target(target: f64) -> Result<(), ControlError> {
    if !target.is_finite() || target < 0.0 {
        return Err(ControlError::InvalidTarget(target));
    }
    Ok(())
}

/// Mean of the readings with the single lowest and highest removed.
pub fn compute_target(readings: &[u32]) -> Result<f64, ControlError> {
    if readings.len() < 3 {
        return Err(ControlError::TooFewReadings {
            count: readings.len(),
        });
    }
    let mut sorted = readings.to_vec();
    sorted.sort_unstable();
    let inner = &sorted[1..sorted.len() - 1];
    let sum: f64 = inner.iter().map(|&r| f64::from(r)).sum();
    Ok(sum / inner.len() as f64)
}

/// `true` when every reading lies within `target * tolerance` of the target.
pub fn test_convergence(readings: &[u32], target: f64, tolerance: f64) -> bool {
    let band = target * tolerance;
    readings
        .iter()
        .all(|&r| (target - f64::from(r)).abs() <= band)
}

/// `new[i] = clamp(round(prior[i] - (readings[i] - target) / gains[i]))`.
pub fn compute_correction(
    prior: &[i32],
    readings: &[u32],
    target: f64,
    gains: &[f64],
    range: ControlRange,
) -> Result<Vec<i32>, ControlError> {
    check_len("readings", prior.len(), readings.len())?;
    check_len("gains", prior.len(), gains.len())?;
    range.validate()?;

    prior
        .iter()
        .zip(readings)
        .zip(gains)
        .enumerate()
        .map(|(tube, ((&p, &r), &gain))| {
            if !gain.is_finite() || gain <= 0.0 {
                return Err(ControlError::InvalidGain { tube, gain });
            }
            let raw = f64::from(p) - (f64::from(r) - target) / gain;
            let next = range.clamp_round(raw);
            if f64::from(next) != raw.round() {
                log::warn!("tube {tube}: DAC {raw:.2} clamped to {next}");
            }
            Ok(next)
        })
        .collect()
}

/// Result of one feedback step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Iteration the readings were taken at.
    pub iteration: u32,
    pub target: f64,
    /// `true` when this step computed and locked the target.
    pub target_locked: bool,
    pub converged: bool,
    pub control: Vec<i32>,
    /// State to persist for the next iteration.
    pub next_state: SessionState,
}

/// Owns the calibration state machine transitions.
#[derive(Clone, Debug)]
pub struct FeedbackController {
    params: ControllerParams,
    tube_count: usize,
}

impl FeedbackController {
    pub fn new(params: ControllerParams, tube_count: usize) -> Result<Self, ControlError> {
        params.validate(tube_count)?;
        Ok(Self { params, tube_count })
    }

    pub fn params(&self) -> &ControllerParams {
        &self.params
    }

    /// Target for this iteration: the locked one if any, else the configured
    /// one, else the trimmed mean of `readings`.
    pub fn resolve_target(
        &self,
        state: &SessionState,
        readings: &[u32],
    ) -> Result<(f64, bool), ControlError> {
        if let Some(t) = state.target {
            check_locked_target(t)?;
            return Ok((t, false));
        }
        if let Some(t) = self.params.target {
            return Ok((t, true));
        }
        if state.iteration != 0 {
            log::warn!(
                "no target locked at iteration {}; computing one now",
                state.iteration
            );
        }
        let t = compute_target(readings)?;
        if t == 0.0 {
            log::warn!("trimmed mean is 0: no tube produced a valid ROI reading");
        }
        Ok((t, true))
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, state, prior, readings), fields(iteration = state.iteration))
    )]
    pub fn step(
        &self,
        state: &SessionState,
        prior: &[i32],
        readings: &[u32],
    ) -> Result<StepOutcome, ControlError> {
        check_len("control vector", self.tube_count, prior.len())?;
        check_len("readings", self.tube_count, readings.len())?;

        let (target, target_locked) = self.resolve_target(state, readings)?;
        if target_locked {
            log::info!("target locked at {target:.1}");
        }
        let converged = test_convergence(readings, target, self.params.tolerance);
        let control = compute_correction(
            prior,
            readings,
            target,
            &self.params.gains,
            self.params.range,
        )?;
        log::info!(
            "iteration {}: readings {readings:?}, converged={converged}, next DAC {control:?}",
            state.iteration
        );

        let next_state = SessionState {
            iteration: state.iteration + 1,
            target: Some(target),
            converged,
            running: state.running,
        };

        Ok(StepOutcome {
            iteration: state.iteration,
            target,
            target_locked,
            converged,
            control,
            next_state,
        })
    }
}
