//! Append-only CSV logs of readings and control vectors.
//!
//! Every row is `date, iteration, v1, ..., vN`.

use std::fmt::Display;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use time::macros::format_description;
use time::OffsetDateTime;

use crate::error::SessionError;

/// Today's local date as `YYYY-MM-DD` (UTC when the local offset is unknown).
pub fn today() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| now.date().to_string())
}

/// One parsed log row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRow {
    pub date: String,
    pub iteration: u32,
    pub values: Vec<i64>,
}

/// A log file with a fixed number of values per row.
#[derive(Clone, Debug)]
pub struct CsvLog {
    path: PathBuf,
    width: usize,
}

impl CsvLog {
    pub fn new(path: impl Into<PathBuf>, width: usize) -> Self {
        Self {
            path: path.into(),
            width,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row; the file is created on first use.
    pub fn append<T: Display>(
        &self,
        date: &str,
        iteration: u32,
        values: &[T],
    ) -> Result<(), SessionError> {
        if values.len() != self.width {
            return Err(SessionError::LogShape {
                expected: self.width,
                got: values.len(),
            });
        }
        let mut line = format!("{date},{iteration}");
        for v in values {
            line.push(',');
            line.push_str(&v.to_string());
        }
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read every row back. A missing file has no rows.
    pub fn read_rows(&self) -> Result<Vec<LogRow>, SessionError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        raw.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| self.parse_row(l))
            .collect()
    }

    fn parse_row(&self, line: &str) -> Result<LogRow, SessionError> {
        let mut fields = line.split(',').map(str::trim);
        let date = fields.next().unwrap_or_default().to_string();
        let iteration = self.parse_field(fields.next().unwrap_or_default())?;
        let values = fields
            .map(|f| self.parse_field(f))
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(LogRow {
            date,
            iteration,
            values,
        })
    }

    fn parse_field<T>(&self, field: &str) -> Result<T, SessionError>
    where
        T: std::str::FromStr,
        T::Err: Display,
    {
        field.parse().map_err(|e: T::Err| SessionError::Parse {
            path: self.path.clone(),
            value: field.to_string(),
            reason: e.to_string(),
        })
    }
}
