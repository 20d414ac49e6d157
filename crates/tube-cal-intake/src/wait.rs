//! Bounded wait for a complete batch of shot files.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::IntakeError;
use crate::ordering::{list_files, FileOrdering};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Polling budget for one batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitParams {
    /// Dummy plus data files expected per iteration.
    pub expected_files: usize,
    /// Sleep before each directory scan, in milliseconds.
    pub poll_interval_ms: u64,
    /// Number of scans before giving up.
    pub max_polls: u32,
    /// A timeout after more than this many polls is reported as an
    /// integrity failure rather than a plain timeout. The threshold compares
    /// against the whole budget, so with the defaults (100 polls, threshold
    /// 10) every timeout is an [`IntakeError::IntegrityError`];
    /// [`IntakeError::BatchTimeout`] only appears when `max_polls` is at or
    /// below the threshold.
    pub integrity_threshold: u32,
}

impl Default for WaitParams {
    fn default() -> Self {
        Self {
            expected_files: 25,
            poll_interval_ms: 1000,
            max_polls: 100,
            integrity_threshold: 10,
        }
    }
}

impl WaitParams {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Block until `dir` holds at least `expected_files` regular files.
///
/// Returns the full ordered listing at the moment the batch was complete.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(params), fields(expected = params.expected_files))
)]
pub fn wait_for_batch(
    dir: &Path,
    params: &WaitParams,
    ordering: FileOrdering,
) -> Result<Vec<PathBuf>, IntakeError> {
    let mut found = 0usize;
    for attempt in 1..=params.max_polls {
        thread::sleep(params.poll_interval());
        let files = list_files(dir, ordering)?;
        found = files.len();
        if found >= params.expected_files {
            log::info!(
                "batch complete after {attempt} poll(s): {found} files in {}",
                dir.display()
            );
            return Ok(files);
        }
        log::debug!(
            "poll {attempt}/{}: {found} of {} files",
            params.max_polls,
            params.expected_files
        );
    }

    let dir = dir.to_path_buf();
    let attempts = params.max_polls;
    let expected = params.expected_files;
    if attempts > params.integrity_threshold {
        Err(IntakeError::IntegrityError {
            dir,
            found,
            expected,
            attempts,
        })
    } else {
        Err(IntakeError::BatchTimeout {
            dir,
            found,
            expected,
            attempts,
        })
    }
}
