//! Mapping from the physical tube array layout to detector pixel indices.
//!
//! Tubes are mounted along the detector row axis with a fixed pitch; the whole
//! array moves along the column (scan) axis on a carriage. Row centers depend
//! only on the array layout, so they are computed once per [`TubeLayout`].
//! The column center depends on the carriage position of each exposure.

use serde::{Deserialize, Serialize};

/// Detector pixel grid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSpec {
    /// Pixels along the tube axis (detector long axis).
    pub rows: usize,
    /// Pixels along the scan axis.
    pub cols: usize,
    /// Physical pixel pitch in mm.
    pub pixel_size_mm: f64,
    /// Columns at or beyond this index are shadowed by the collimator.
    pub active_col_limit: usize,
}

impl Default for DetectorSpec {
    fn default() -> Self {
        Self {
            rows: 2048,
            cols: 2560,
            pixel_size_mm: 0.124,
            active_col_limit: 2350,
        }
    }
}

/// Physical tube array parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TubeArraySpec {
    pub tube_count: usize,
    /// Center-to-center tube distance in mm.
    pub pitch_mm: f64,
    /// Carriage travel between scan steps in mm.
    pub step_mm: f64,
    /// Source-to-detector distance in mm.
    pub sid_mm: f64,
}

impl Default for TubeArraySpec {
    fn default() -> Self {
        Self {
            tube_count: 7,
            pitch_mm: 30.0,
            step_mm: 30.0,
            sid_mm: 400.0,
        }
    }
}

impl TubeArraySpec {
    /// Carriage position (mm) of the given scan step.
    pub fn step_position_mm(&self, step: usize) -> f64 {
        step as f64 * self.step_mm
    }
}

/// Row center pixel of every tube channel, in mounting order.
///
/// The tube block is centered on `detector_rows / 2`. For an even tube count
/// the block is shifted by half a pitch so that the two middle tubes straddle
/// the detector midline. All values are truncated toward zero.
pub fn tube_row_centers(
    tube_count: usize,
    pitch_mm: f64,
    pixel_size_mm: f64,
    detector_rows: usize,
) -> Vec<i64> {
    let pitch_px = pitch_mm / pixel_size_mm;
    let half_block = (tube_count / 2) as f64 * pitch_px;
    let parity = (tube_count % 2) as f64 - 1.0;
    let start = ((detector_rows / 2) as f64 - half_block - 0.5 * pitch_px * parity).trunc();
    (0..tube_count)
        .map(|i| (start + i as f64 * pitch_px).trunc() as i64)
        .collect()
}

/// Column center pixel shared by all tubes at a carriage position.
pub fn column_center(position_mm: f64, pixel_size_mm: f64) -> i64 {
    (position_mm / pixel_size_mm).trunc() as i64
}

/// Array layout with the position-independent row centers precomputed.
#[derive(Clone, Debug, PartialEq)]
pub struct TubeLayout {
    detector: DetectorSpec,
    array: TubeArraySpec,
    row_centers: Vec<i64>,
}

impl TubeLayout {
    pub fn new(detector: DetectorSpec, array: TubeArraySpec) -> Self {
        let row_centers = tube_row_centers(
            array.tube_count,
            array.pitch_mm,
            detector.pixel_size_mm,
            detector.rows,
        );
        log::debug!("tube row centers: {row_centers:?}");
        Self {
            detector,
            array,
            row_centers,
        }
    }

    pub fn detector(&self) -> &DetectorSpec {
        &self.detector
    }

    pub fn array(&self) -> &TubeArraySpec {
        &self.array
    }

    pub fn tube_count(&self) -> usize {
        self.row_centers.len()
    }

    pub fn row_centers(&self) -> &[i64] {
        &self.row_centers
    }

    /// Full geometry for one exposure.
    pub fn at_position(&self, position_mm: f64) -> TubeGeometry {
        let col_center = column_center(position_mm, self.detector.pixel_size_mm);
        log::debug!("carriage at {position_mm} mm -> column center {col_center}");
        TubeGeometry {
            row_centers: self.row_centers.clone(),
            col_center,
        }
    }
}

/// Per-tube ROI centers for one carriage position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TubeGeometry {
    pub row_centers: Vec<i64>,
    pub col_center: i64,
}

impl TubeGeometry {
    /// `(row, col)` center for a tube channel.
    pub fn center(&self, tube: usize) -> Option<(i64, i64)> {
        self.row_centers.get(tube).map(|&r| (r, self.col_center))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_seven_tube_layout() {
        let centers = tube_row_centers(7, 30.0, 0.124, 2048);
        assert_eq!(centers, vec![298, 539, 781, 1023, 1265, 1507, 1749]);
    }

    #[test]
    fn column_center_truncates() {
        assert_eq!(column_center(150.0, 0.124), 1209);
        assert_eq!(column_center(0.0, 0.124), 0);
        assert_eq!(column_center(30.0, 0.124), 241);
    }

    #[test]
    fn centers_are_increasing_evenly_spaced_and_centered() {
        for &n in &[1usize, 2, 3, 4, 5, 6, 7, 8, 9] {
            for &pitch in &[10.0, 17.3, 25.0, 30.0, 31.7] {
                let pixel = 0.124;
                let rows = 2048;
                let centers = tube_row_centers(n, pitch, pixel, rows);
                assert_eq!(centers.len(), n);
                let step = (pitch / pixel).round() as i64;
                for w in centers.windows(2) {
                    let d = w[1] - w[0];
                    assert!(d > 0, "n={n} pitch={pitch}: not increasing {centers:?}");
                    assert!(
                        (d - step).abs() <= 1,
                        "n={n} pitch={pitch}: spacing {d} vs {step}"
                    );
                }
                let mid = (centers[0] + centers[n - 1]) as f64 / 2.0;
                assert!(
                    (mid - (rows / 2) as f64).abs() <= 1.0,
                    "n={n} pitch={pitch}: block center {mid}"
                );
            }
        }
    }

    #[test]
    fn layout_recomputes_only_the_column() {
        let layout = TubeLayout::new(DetectorSpec::default(), TubeArraySpec::default());
        let a = layout.at_position(0.0);
        let b = layout.at_position(150.0);
        assert_eq!(a.row_centers, b.row_centers);
        assert_eq!(a.col_center, 0);
        assert_eq!(b.col_center, 1209);
        assert_eq!(b.center(3), Some((1023, 1209)));
        assert_eq!(b.center(7), None);
    }

    #[test]
    fn step_positions() {
        let array = TubeArraySpec::default();
        assert_eq!(array.step_position_mm(0), 0.0);
        assert_eq!(array.step_position_mm(5), 150.0);
    }
}
