//! Raw detector frames.
//!
//! A frame file is a flat buffer of little-endian `u16` samples with no
//! header. Its byte length must be exactly `2 * rows * cols`.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

/// Errors produced while reading or writing raw frames.
#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("frame size mismatch (expected {expected} bytes, got {got})")]
    SizeMismatch { expected: usize, got: usize },
    #[error("invalid frame dimensions (rows={rows}, cols={cols})")]
    InvalidDimensions { rows: usize, cols: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Borrowed view into a frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    pub rows: usize,
    pub cols: usize,
    pub data: &'a [u16], // row-major, len = rows*cols
}

impl FrameView<'_> {
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u16 {
        self.data[row * self.cols + col]
    }

    /// One full row of samples.
    #[inline]
    pub fn row(&self, row: usize) -> &[u16] {
        let start = row * self.cols;
        &self.data[start..start + self.cols]
    }
}

/// Owned detector frame.
#[derive(Clone, Debug)]
pub struct RawFrame {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<u16>,
}

impl RawFrame {
    /// Wrap an existing sample buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<u16>) -> Result<Self, FrameError> {
        let expected = checked_len(rows, cols)?;
        if data.len() != expected {
            return Err(FrameError::SizeMismatch {
                expected: expected * 2,
                got: data.len() * 2,
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Frame filled with a single value.
    pub fn filled(rows: usize, cols: usize, value: u16) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            rows: self.rows,
            cols: self.cols,
            data: &self.data,
        }
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: u16) {
        self.data[row * self.cols + col] = value;
    }

    /// Fill the half-open rectangle `[r0, r1) x [c0, c1)`, clipped to the frame.
    pub fn fill_rect(&mut self, r0: usize, r1: usize, c0: usize, c1: usize, value: u16) {
        let r1 = r1.min(self.rows);
        let c1 = c1.min(self.cols);
        for r in r0..r1 {
            let start = r * self.cols;
            if c0 < c1 {
                self.data[start + c0..start + c1].fill(value);
            }
        }
    }
}

fn checked_len(rows: usize, cols: usize) -> Result<usize, FrameError> {
    if rows == 0 || cols == 0 {
        return Err(FrameError::InvalidDimensions { rows, cols });
    }
    rows.checked_mul(cols)
        .ok_or(FrameError::InvalidDimensions { rows, cols })
}

/// Decode a raw little-endian `u16` buffer into a frame.
pub fn decode_raw_frame(bytes: &[u8], rows: usize, cols: usize) -> Result<RawFrame, FrameError> {
    let samples = checked_len(rows, cols)?;
    let expected = samples * 2;
    if bytes.len() != expected {
        return Err(FrameError::SizeMismatch {
            expected,
            got: bytes.len(),
        });
    }
    let mut data = vec![0u16; samples];
    LittleEndian::read_u16_into(bytes, &mut data);
    Ok(RawFrame { rows, cols, data })
}

/// Read a raw frame file from disk.
pub fn read_raw_frame(
    path: impl AsRef<Path>,
    rows: usize,
    cols: usize,
) -> Result<RawFrame, FrameError> {
    let bytes = fs::read(path.as_ref())?;
    decode_raw_frame(&bytes, rows, cols)
}

/// Write a frame in the same headerless little-endian layout.
pub fn write_raw_frame(path: impl AsRef<Path>, frame: &RawFrame) -> Result<(), FrameError> {
    let file = fs::File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    for &v in &frame.data {
        writer.write_u16::<LittleEndian>(v)?;
    }
    writer.flush()?;
    Ok(())
}
