//! Move consumed shot files out of the watched directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::classify::Batch;

/// Archive file naming.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveNaming {
    /// Keep the original file name.
    Preserve,
    /// `itr{iteration}_{stem}`; the extension is dropped.
    #[default]
    IterationTagged,
}

/// Whether and how to archive a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchivePolicy {
    pub enabled: bool,
    pub naming: ArchiveNaming,
}

impl Default for ArchivePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            naming: ArchiveNaming::IterationTagged,
        }
    }
}

/// A move that did not happen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveFailure {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub error: String,
}

/// Outcome of archiving one batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveReport {
    pub moved: Vec<PathBuf>,
    pub failed: Vec<ArchiveFailure>,
}

impl ArchiveReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Destination path of `source` inside `archive_dir`.
pub fn archive_destination(
    source: &Path,
    archive_dir: &Path,
    naming: ArchiveNaming,
    iteration: u32,
) -> PathBuf {
    let name = match naming {
        ArchiveNaming::Preserve => source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        ArchiveNaming::IterationTagged => {
            let stem = source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("itr{iteration}_{stem}")
        }
    };
    archive_dir.join(name)
}

/// Rename every consumed file of `batch` into `archive_dir`.
///
/// Moves are plain renames, so the archive must live on the same
/// filesystem. An existing destination is never overwritten; the file stays
/// put and is reported as failed. Failures are collected and logged; files
/// already moved stay moved.
pub fn archive_batch(
    batch: &Batch,
    policy: &ArchivePolicy,
    archive_dir: &Path,
    iteration: u32,
) -> ArchiveReport {
    let mut report = ArchiveReport::default();
    if !policy.enabled {
        return report;
    }

    for source in batch.consumed() {
        let destination = archive_destination(source, archive_dir, policy.naming, iteration);
        let moved = if destination.exists() {
            Err("destination already exists".to_string())
        } else {
            fs::rename(source, &destination).map_err(|err| err.to_string())
        };
        match moved {
            Ok(()) => report.moved.push(destination),
            Err(error) => {
                log::warn!(
                    "failed to archive {} -> {}: {error}",
                    source.display(),
                    destination.display()
                );
                report.failed.push(ArchiveFailure {
                    source: source.clone(),
                    destination,
                    error,
                });
            }
        }
    }

    log::info!(
        "archived {} file(s) to {} ({} failed)",
        report.moved.len(),
        archive_dir.display(),
        report.failed.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_names() {
        let src = Path::new("/cal/13.raw");
        let dir = Path::new("/archive");
        assert_eq!(
            archive_destination(src, dir, ArchiveNaming::Preserve, 2),
            PathBuf::from("/archive/13.raw")
        );
        assert_eq!(
            archive_destination(src, dir, ArchiveNaming::IterationTagged, 2),
            PathBuf::from("/archive/itr2_13")
        );
    }

    #[test]
    fn moves_all_consumed_files() {
        let root = tempfile::tempdir().expect("tempdir");
        let cal = root.path().join("cal");
        let archive = root.path().join("archive");
        fs::create_dir_all(&cal).expect("mkdir");
        fs::create_dir_all(&archive).expect("mkdir");

        let mut batch = Batch::default();
        for i in 0..4 {
            let p = cal.join(format!("{i}.raw"));
            fs::write(&p, b"x").expect("write");
            if i % 2 == 1 {
                batch.data.push(p);
            } else {
                batch.discard.push(p);
            }
        }

        let policy = ArchivePolicy {
            enabled: true,
            naming: ArchiveNaming::IterationTagged,
        };
        let report = archive_batch(&batch, &policy, &archive, 3);
        assert!(report.is_clean());
        assert_eq!(report.moved.len(), 4);
        assert!(archive.join("itr3_1").exists());
        assert_eq!(fs::read_dir(&cal).expect("read").count(), 0);
    }

    #[test]
    fn failures_are_reported_not_raised() {
        let root = tempfile::tempdir().expect("tempdir");
        let present = root.path().join("1.raw");
        fs::write(&present, b"x").expect("write");
        let batch = Batch {
            data: vec![present],
            discard: vec![root.path().join("missing.raw")],
        };
        let archive = root.path().join("archive");
        fs::create_dir_all(&archive).expect("mkdir");

        let report = archive_batch(&batch, &ArchivePolicy::default(), &archive, 0);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.moved, vec![archive.join("itr0_1")]);
    }

    #[test]
    fn existing_archive_entries_are_not_overwritten() {
        let root = tempfile::tempdir().expect("tempdir");
        let cal = root.path().join("cal");
        let archive = root.path().join("archive");
        fs::create_dir_all(&cal).expect("mkdir");
        fs::create_dir_all(&archive).expect("mkdir");
        fs::write(archive.join("11.raw"), b"first").expect("write");

        let shot = cal.join("11.raw");
        fs::write(&shot, b"second").expect("write");
        let batch = Batch {
            data: vec![shot.clone()],
            discard: Vec::new(),
        };
        let policy = ArchivePolicy {
            enabled: true,
            naming: ArchiveNaming::Preserve,
        };
        let report = archive_batch(&batch, &policy, &archive, 1);
        assert!(report.moved.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].destination, archive.join("11.raw"));
        assert_eq!(fs::read(archive.join("11.raw")).expect("read"), b"first");
        assert!(shot.exists());

        // tagged names keep successive iterations apart
        let report = archive_batch(&batch, &ArchivePolicy::default(), &archive, 1);
        assert!(report.is_clean());
        assert!(archive.join("itr1_11").exists());
    }

    #[test]
    fn disabled_policy_moves_nothing() {
        let root = tempfile::tempdir().expect("tempdir");
        let p = root.path().join("0.raw");
        fs::write(&p, b"x").expect("write");
        let batch = Batch {
            data: vec![p.clone()],
            discard: Vec::new(),
        };
        let policy = ArchivePolicy {
            enabled: false,
            ..ArchivePolicy::default()
        };
        let report = archive_batch(&batch, &policy, root.path(), 0);
        assert!(report.moved.is_empty());
        assert!(p.exists());
    }
}
