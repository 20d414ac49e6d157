//! Core building blocks for X-ray tube array calibration.
//!
//! This crate is intentionally small and free of any file-layout or session
//! policy: it reads raw detector frames, maps the physical tube layout to
//! pixel coordinates and reduces a region of interest to one intensity.

mod frame;
mod geometry;
mod logger;
mod roi;

pub use frame::{
    decode_raw_frame, read_raw_frame, write_raw_frame, FrameError, FrameView, RawFrame,
};
pub use geometry::{
    column_center, tube_row_centers, DetectorSpec, TubeArraySpec, TubeGeometry, TubeLayout,
};
pub use roi::{
    extract_intensity, mean_positive, IntensityMeasurement, RoiBounds, DEFAULT_HALF_WINDOW,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_from_verbosity};
