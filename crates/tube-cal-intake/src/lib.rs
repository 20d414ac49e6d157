//! Batch intake for tube calibration shots.
//!
//! Per iteration a batch moves through `WAITING -> COLLECTED -> CLASSIFIED
//! -> ARCHIVED`:
//! - [`wait_for_batch`] polls the watched directory until the expected number
//!   of files is present, within a bounded number of attempts;
//! - [`classify`] applies a [`ClassificationRule`] to split warm-up/dummy
//!   frames from one data frame per tube;
//! - [`archive_batch`] optionally moves every consumed file to the archive.

mod archive;
mod classify;
mod error;
mod ordering;
mod wait;

pub use archive::{
    archive_batch, archive_destination, ArchiveFailure, ArchiveNaming, ArchivePolicy,
    ArchiveReport,
};
pub use classify::{classify, Batch, ClassificationRule};
pub use error::IntakeError;
pub use ordering::{list_files, FileOrdering};
pub use wait::{wait_for_batch, WaitParams};

use std::path::Path;

/// Wait for a complete batch in `dir` and classify it.
pub fn collect_batch(
    dir: &Path,
    wait: &WaitParams,
    ordering: FileOrdering,
    rule: &ClassificationRule,
    tube_count: usize,
) -> Result<Batch, IntakeError> {
    let files = wait_for_batch(dir, wait, ordering)?;
    classify(&files, rule, tube_count)
}
