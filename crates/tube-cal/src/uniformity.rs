//! Detector-wide uniformity check over a stepped scan.
//!
//! A scan directory holds `steps * N` frames. Frame `i` was taken at scan
//! step `i / N` (carriage at `step * step_mm`) with a single tube firing.
//! In the default mode frames are taken in directory order and frame `i`
//! belongs to tube `i mod N`. Renamed scans are named `0.raw, 1.raw, ...`
//! and were acquired in reverse tube order, so frame `i` belongs to tube
//! `N - 1 - (i mod N)`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::CalibrationConfig;
use crate::error::CalibrationError;
use crate::intake::{list_files, FileOrdering, IntakeError};
use crate::iteration::measure_frame;

/// Intensity of every tube at every scan step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniformityMap {
    pub tube_count: usize,
    /// Carriage position of each step.
    pub positions_mm: Vec<f64>,
    /// `by_step[step][tube]`.
    pub by_step: Vec<Vec<u32>>,
}

/// Spread of the positive entries of a [`UniformityMap`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniformitySummary {
    pub min: u32,
    pub max: u32,
    pub mean: f64,
    /// `(max - min) / mean`.
    pub relative_spread: f64,
    /// Entries with no valid ROI samples.
    pub empty: usize,
}

impl UniformityMap {
    pub fn steps(&self) -> usize {
        self.by_step.len()
    }

    pub fn get(&self, step: usize, tube: usize) -> Option<u32> {
        self.by_step.get(step).and_then(|row| row.get(tube)).copied()
    }

    /// Rows in physical left-to-right order (highest tube index first).
    pub fn display_rows(&self) -> Vec<Vec<u32>> {
        self.by_step
            .iter()
            .map(|row| row.iter().rev().copied().collect())
            .collect()
    }

    /// `None` when no entry has a positive reading.
    pub fn summary(&self) -> Option<UniformitySummary> {
        let values: Vec<u32> = self.by_step.iter().flatten().copied().collect();
        let positive: Vec<u32> = values.iter().copied().filter(|&v| v > 0).collect();
        let min = *positive.iter().min()?;
        let max = *positive.iter().max()?;
        let mean = positive.iter().map(|&v| f64::from(v)).sum::<f64>() / positive.len() as f64;
        Some(UniformitySummary {
            min,
            max,
            mean,
            relative_spread: f64::from(max - min) / mean,
            empty: values.len() - positive.len(),
        })
    }
}

fn scan_files(
    dir: &Path,
    ordering: FileOrdering,
    renamed: bool,
) -> Result<Vec<PathBuf>, CalibrationError> {
    let listed = list_files(dir, ordering).map_err(IntakeError::from)?;
    if !renamed {
        return Ok(listed);
    }
    Ok((0..listed.len())
        .map(|i| dir.join(format!("{i}.raw")))
        .collect())
}

/// Measure every frame of a stepped scan in `dir`.
pub fn check_uniformity(
    dir: &Path,
    config: &CalibrationConfig,
    renamed: bool,
) -> Result<UniformityMap, CalibrationError> {
    let n = config.tube_count();
    let files = scan_files(dir, config.intake.ordering, renamed)?;
    if files.is_empty() || files.len() % n != 0 {
        return Err(CalibrationError::IncompleteScan {
            files: files.len(),
            tubes: n,
        });
    }

    let tubes = config.tube_layout();
    let steps = files.len() / n;
    let mut positions_mm = Vec::with_capacity(steps);
    let mut by_step = Vec::with_capacity(steps);
    for (step, chunk) in files.chunks(n).enumerate() {
        let position_mm = config.array.step_position_mm(step);
        let geometry = tubes.at_position(position_mm);
        let mut row = vec![0u32; n];
        for (k, path) in chunk.iter().enumerate() {
            let tube = if renamed { n - 1 - k } else { k };
            let (_, reading) = measure_frame(
                path.clone(),
                tube,
                &geometry,
                &config.detector,
                config.roi_half_window,
            )?;
            log::debug!(
                "step {step} ({position_mm} mm) tube {tube}: {} -> {}",
                path.display(),
                reading.intensity
            );
            row[tube] = reading.intensity;
        }
        positions_mm.push(position_mm);
        by_step.push(row);
    }
    log::info!("uniformity scan: {steps} steps x {n} tubes from {}", dir.display());

    Ok(UniformityMap {
        tube_count: n,
        positions_mm,
        by_step,
    })
}
