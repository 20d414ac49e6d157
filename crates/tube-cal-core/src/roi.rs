//! Per-tube intensity from a rectangular neighbourhood of the frame.

use serde::{Deserialize, Serialize};

use crate::frame::FrameView;

/// Default half side of the square ROI, in pixels.
pub const DEFAULT_HALF_WINDOW: i64 = 50;

/// Half-open pixel rectangle `[row_min, row_max) x [col_min, col_max)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiBounds {
    pub row_min: usize,
    pub row_max: usize,
    pub col_min: usize,
    pub col_max: usize,
}

impl RoiBounds {
    /// Window around `(row_center, col_center)`, clipped to `[0, bound)`.
    ///
    /// An upper edge that falls below its lower edge collapses the window to
    /// zero width at the upper edge.
    pub fn around(
        row_center: i64,
        col_center: i64,
        half_window: i64,
        row_bound: usize,
        col_bound: usize,
    ) -> Self {
        let (row_min, row_max) = clip_span(row_center, half_window, row_bound);
        let (col_min, col_max) = clip_span(col_center, half_window, col_bound);
        Self {
            row_min,
            row_max,
            col_min,
            col_max,
        }
    }

    pub fn height(&self) -> usize {
        self.row_max - self.row_min
    }

    pub fn width(&self) -> usize {
        self.col_max - self.col_min
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0 || self.width() == 0
    }
}

fn clip_span(center: i64, half_window: i64, bound: usize) -> (usize, usize) {
    let lo = (center - half_window).max(0);
    let hi = (center + half_window).min(bound as i64);
    if hi < lo {
        let hi = hi.max(0) as usize;
        (hi, hi)
    } else {
        (lo as usize, hi as usize)
    }
}

/// Intensity of one tube together with the window it was measured on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntensityMeasurement {
    pub intensity: u32,
    pub bounds: RoiBounds,
    /// Number of samples that contributed to the mean.
    pub valid_samples: usize,
}

/// Mean of the finite, strictly positive samples, truncated to an integer.
///
/// Returns `(0, 0)` when no sample qualifies.
pub fn mean_positive<I>(samples: I) -> (u32, usize)
where
    I: IntoIterator<Item = f64>,
{
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for s in samples {
        if s.is_finite() && s > 0.0 {
            sum += s;
            count += 1;
        }
    }
    if count == 0 {
        return (0, 0);
    }
    ((sum / count as f64).trunc() as u32, count)
}

/// Extract the ROI intensity for one tube.
///
/// `row_bound`/`col_bound` limit the window in addition to the frame extent;
/// `col_bound` is normally the collimator's active column limit.
/// An empty window is a normal outcome and yields intensity `0`.
pub fn extract_intensity(
    frame: &FrameView<'_>,
    row_center: i64,
    col_center: i64,
    half_window: i64,
    row_bound: usize,
    col_bound: usize,
) -> IntensityMeasurement {
    let bounds = RoiBounds::around(
        row_center,
        col_center,
        half_window,
        row_bound.min(frame.rows),
        col_bound.min(frame.cols),
    );

    let samples = (bounds.row_min..bounds.row_max).flat_map(|r| {
        frame.row(r)[bounds.col_min..bounds.col_max]
            .iter()
            .map(|&v| f64::from(v))
    });
    let (intensity, valid_samples) = mean_positive(samples);

    log::debug!(
        "roi rows [{}, {}) cols [{}, {}): {} valid samples, intensity {}",
        bounds.row_min,
        bounds.row_max,
        bounds.col_min,
        bounds.col_max,
        valid_samples,
        intensity
    );

    IntensityMeasurement {
        intensity,
        bounds,
        valid_samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RawFrame;

    #[test]
    fn uniform_window_returns_its_value() {
        let mut frame = RawFrame::filled(400, 400, 0);
        frame.fill_rect(150, 250, 150, 250, 3712);
        let m = extract_intensity(&frame.view(), 200, 200, 50, 400, 400);
        assert_eq!(m.intensity, 3712);
        assert_eq!(m.valid_samples, 100 * 100);
        assert_eq!(
            m.bounds,
            RoiBounds {
                row_min: 150,
                row_max: 250,
                col_min: 150,
                col_max: 250
            }
        );
    }

    #[test]
    fn all_zero_window_returns_zero() {
        let frame = RawFrame::filled(200, 200, 0);
        let m = extract_intensity(&frame.view(), 100, 100, 50, 200, 200);
        assert_eq!(m.intensity, 0);
        assert_eq!(m.valid_samples, 0);
        assert!(!m.bounds.is_empty());
    }

    #[test]
    fn column_past_active_limit_collapses_to_zero_width() {
        let frame = RawFrame::filled(200, 300, 1000);
        // col window would be [230, 270) but the active limit is 120
        let m = extract_intensity(&frame.view(), 100, 250, 20, 200, 120);
        assert_eq!(m.bounds.col_min, 120);
        assert_eq!(m.bounds.col_max, 120);
        assert!(m.bounds.is_empty());
        assert_eq!(m.intensity, 0);
    }

    #[test]
    fn window_is_clipped_at_frame_origin() {
        let frame = RawFrame::filled(100, 100, 7);
        let m = extract_intensity(&frame.view(), 10, 0, 50, 100, 100);
        assert_eq!(
            m.bounds,
            RoiBounds {
                row_min: 0,
                row_max: 60,
                col_min: 0,
                col_max: 50
            }
        );
        assert_eq!(m.intensity, 7);
    }

    #[test]
    fn non_positive_and_non_finite_samples_are_ignored() {
        let (mean, n) = mean_positive([f64::NAN, 0.0, -4.0, 10.0, 21.0, f64::INFINITY]);
        assert_eq!(n, 2);
        assert_eq!(mean, 15);
        assert_eq!(mean_positive(std::iter::empty()), (0, 0));
    }

    #[test]
    fn dead_pixels_do_not_drag_the_mean() {
        let mut frame = RawFrame::filled(100, 100, 3000);
        frame.fill_rect(40, 45, 40, 60, 0);
        let m = extract_intensity(&frame.view(), 50, 50, 50, 100, 100);
        assert_eq!(m.intensity, 3000);
        assert_eq!(m.valid_samples, 100 * 100 - 5 * 20);
    }
}
