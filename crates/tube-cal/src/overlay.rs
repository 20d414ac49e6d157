//! ROI overlays for checking the tube geometry by eye.
//!
//! Frames are windowed to 8 bit gray (x = column, y = row) and every ROI is
//! outlined in red.

use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};

use crate::core::{FrameView, RoiBounds};
use crate::iteration::DiagnosticSink;
use crate::report::TubeReading;

/// Display window matching the flat-field intensity range of a calibrated array.
pub const DEFAULT_DISPLAY_WINDOW: (u16, u16) = (2700, 3250);

const ROI_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const ROI_LINE_WIDTH: u32 = 2;

fn window_level(v: u16, lo: u16, hi: u16) -> u8 {
    if v <= lo {
        0
    } else if v >= hi {
        255
    } else {
        (u32::from(v - lo) * 255 / u32::from(hi - lo)) as u8
    }
}

fn draw_rect_outline(img: &mut RgbImage, roi: &RoiBounds) {
    let (w, h) = img.dimensions();
    if roi.is_empty() {
        return;
    }
    let x0 = roi.col_min as u32;
    let x1 = (roi.col_max as u32).min(w);
    let y0 = roi.row_min as u32;
    let y1 = (roi.row_max as u32).min(h);
    for y in y0..y1 {
        for x in x0..x1 {
            let edge = x < x0 + ROI_LINE_WIDTH
                || x + ROI_LINE_WIDTH >= x1
                || y < y0 + ROI_LINE_WIDTH
                || y + ROI_LINE_WIDTH >= y1;
            if edge {
                img.put_pixel(x, y, ROI_COLOR);
            }
        }
    }
}

/// Render `frame` with the given display window and ROI outlines.
pub fn render_overlay(frame: &FrameView<'_>, rois: &[RoiBounds], window: (u16, u16)) -> RgbImage {
    let (lo, hi) = window;
    let mut img = RgbImage::from_fn(frame.cols as u32, frame.rows as u32, |x, y| {
        let g = window_level(frame.get(y as usize, x as usize), lo, hi);
        Rgb([g, g, g])
    });
    for roi in rois {
        draw_rect_outline(&mut img, roi);
    }
    img
}

/// Render and save as PNG.
pub fn write_roi_overlay(
    path: impl AsRef<Path>,
    frame: &FrameView<'_>,
    rois: &[RoiBounds],
    window: (u16, u16),
) -> Result<(), image::ImageError> {
    render_overlay(frame, rois, window).save(path)
}

/// Writes `itr{k}_tube{i}.png` for every measured tube.
#[derive(Debug, Clone)]
pub struct OverlaySink {
    dir: PathBuf,
    window: (u16, u16),
    written: Vec<PathBuf>,
}

impl OverlaySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            window: DEFAULT_DISPLAY_WINDOW,
            written: Vec::new(),
        }
    }

    pub fn with_window(mut self, window: (u16, u16)) -> Self {
        self.window = window;
        self
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl DiagnosticSink for OverlaySink {
    fn on_tube(&mut self, iteration: u32, frame: &FrameView<'_>, reading: &TubeReading) {
        if let Err(err) = fs::create_dir_all(&self.dir) {
            log::warn!("overlay dir {}: {err}", self.dir.display());
            return;
        }
        let path = self
            .dir
            .join(format!("itr{iteration}_tube{}.png", reading.tube));
        match write_roi_overlay(&path, frame, &[reading.roi], self.window) {
            Ok(()) => {
                log::debug!("wrote {}", path.display());
                self.written.push(path);
            }
            Err(err) => log::warn!("overlay {}: {err}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RawFrame;

    #[test]
    fn windowing_saturates() {
        assert_eq!(window_level(0, 2700, 3250), 0);
        assert_eq!(window_level(2700, 2700, 3250), 0);
        assert_eq!(window_level(3250, 2700, 3250), 255);
        assert_eq!(window_level(60000, 2700, 3250), 255);
        assert_eq!(window_level(2975, 2700, 3250), 127);
    }

    #[test]
    fn roi_outline_is_red_and_inside_is_gray() {
        let frame = RawFrame::filled(20, 30, 3250);
        let roi = RoiBounds {
            row_min: 5,
            row_max: 15,
            col_min: 10,
            col_max: 20,
        };
        let img = render_overlay(&frame.view(), &[roi], DEFAULT_DISPLAY_WINDOW);
        assert_eq!(img.dimensions(), (30, 20));
        assert_eq!(*img.get_pixel(10, 5), ROI_COLOR);
        assert_eq!(*img.get_pixel(19, 14), ROI_COLOR);
        assert_eq!(*img.get_pixel(15, 10), Rgb([255, 255, 255]));
        assert_eq!(*img.get_pixel(0, 0), Rgb([255, 255, 255]));
    }

    #[test]
    fn sink_writes_png_per_tube() {
        let dir = tempfile::tempdir().expect("tempdir");
        let frame = RawFrame::filled(8, 8, 3000);
        let reading = TubeReading {
            tube: 3,
            frame: PathBuf::from("11.raw"),
            intensity: 3000,
            roi: RoiBounds {
                row_min: 0,
                row_max: 4,
                col_min: 0,
                col_max: 4,
            },
            valid_samples: 16,
        };
        let mut sink = OverlaySink::new(dir.path().join("overlay"));
        sink.on_tube(2, &frame.view(), &reading);
        assert_eq!(sink.written().len(), 1);
        assert!(dir.path().join("overlay").join("itr2_tube3.png").is_file());
    }
}
