//! Directory listing in the order the exposure controller produced files.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// How files in the watched directory map onto shot order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOrdering {
    /// Sequential numeric stems (`0.raw`, `1.raw`, ...). Files whose stem is
    /// not a number sort after all numbered files, by name.
    #[default]
    Numeric,
    /// Modification time, ties broken by name.
    Arrival,
    /// Plain lexicographic file name.
    Name,
}

struct Entry {
    path: PathBuf,
    name: String,
    modified: Option<SystemTime>,
}

impl Entry {
    fn numeric_stem(&self) -> Option<u64> {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse().ok())
    }
}

/// List regular files in `dir`, sorted by `ordering`.
pub fn list_files(dir: &Path, ordering: FileOrdering) -> io::Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        entries.push(Entry {
            path: entry.path(),
            name: entry.file_name().to_string_lossy().into_owned(),
            modified: meta.modified().ok(),
        });
    }

    match ordering {
        FileOrdering::Numeric => entries.sort_by(|a, b| {
            match (a.numeric_stem(), b.numeric_stem()) {
                (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.name.cmp(&b.name)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => a.name.cmp(&b.name),
            }
        }),
        FileOrdering::Arrival => {
            entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)))
        }
        FileOrdering::Name => entries.sort_by(|a, b| a.name.cmp(&b.name)),
    }

    Ok(entries.into_iter().map(|e| e.path).collect())
}
