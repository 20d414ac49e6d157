//! DAC linearity sweep.
//!
//! The same DAC offset is applied to every tube, one batch is shot per
//! offset into its own directory, and the per-tube readings are fitted with
//! a straight line. The slope is the intensity change per DAC unit, i.e. a
//! candidate for the controller gain of that tube.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::CalibrationConfig;
use crate::control::ControlError;
use crate::error::CalibrationError;
use crate::intake::collect_batch;
use crate::iteration::{measure_frames, NoDiagnostics};

/// One sweep setting and the directory holding its batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub dac: i32,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepMeasurement {
    pub dac: i32,
    pub readings: Vec<u32>,
}

/// Collect and measure one batch per sweep point. Files are left in place.
pub fn measure_dac_sweep(
    points: &[SweepPoint],
    config: &CalibrationConfig,
    position_mm: f64,
) -> Result<Vec<SweepMeasurement>, CalibrationError> {
    let n = config.tube_count();
    let rule = config.classification_rule()?;
    let geometry = config.tube_layout().at_position(position_mm);

    let mut out = Vec::with_capacity(points.len());
    for point in points {
        let batch = collect_batch(
            &point.dir,
            config.wait_params(),
            config.intake.ordering,
            &rule,
            n,
        )?;
        let readings = measure_frames(
            &batch.data,
            &geometry,
            &config.detector,
            config.roi_half_window,
            0,
            &mut NoDiagnostics,
        )?;
        let readings: Vec<u32> = readings.iter().map(|r| r.intensity).collect();
        log::info!("DAC {:+}: {readings:?}", point.dac);
        out.push(SweepMeasurement {
            dac: point.dac,
            readings,
        });
    }
    Ok(out)
}

/// Least-squares slope of intensity against DAC, per tube.
pub fn estimate_gains(
    sweep: &[SweepMeasurement],
    tube_count: usize,
) -> Result<Vec<f64>, CalibrationError> {
    for m in sweep {
        if m.readings.len() != tube_count {
            return Err(ControlError::LengthMismatch {
                what: "sweep readings",
                expected: tube_count,
                got: m.readings.len(),
            }
            .into());
        }
    }

    let xs: Vec<f64> = sweep.iter().map(|m| f64::from(m.dac)).collect();
    if xs.len() < 2 {
        return Err(CalibrationError::DegenerateSweep);
    }
    let x_mean = xs.iter().sum::<f64>() / xs.len() as f64;
    let sxx: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();
    if sxx == 0.0 {
        return Err(CalibrationError::DegenerateSweep);
    }

    let gains = (0..tube_count)
        .map(|tube| {
            let ys: Vec<f64> = sweep.iter().map(|m| f64::from(m.readings[tube])).collect();
            let y_mean = ys.iter().sum::<f64>() / ys.len() as f64;
            let sxy: f64 = xs
                .iter()
                .zip(&ys)
                .map(|(x, y)| (x - x_mean) * (y - y_mean))
                .sum();
            sxy / sxx
        })
        .collect();
    Ok(gains)
}
