//! Keep-count rotation of timestamped snapshots.
//!
//! Snapshots of one repository live side by side in a parent directory and
//! are named by the Unix timestamp of the run that produced them, optionally
//! followed by the archive suffix (`1700000000`, `1700000000.zip`, ...).

use crate::backup::compress::CompressionConfig;
use crate::backup::file_ext::FileExtProvider;
use crate::backup::result_error::result::Result;
use itertools::Itertools;
use std::cmp::Reverse;
use std::fs::read_dir;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One child of a snapshot parent directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub path: PathBuf,
    pub file_name: String,
    /// Parsed from the file name without the archive suffix
    pub timestamp: Option<i64>,
}

impl SnapshotEntry {
    /// Returns `None` when the entry is not a candidate for rotation
    pub fn from_path(path: PathBuf, compression: CompressionConfig) -> Option<Self> {
        let file_name = path.file_name()?.to_string_lossy().into_owned();
        let stem = if compression.is_enabled() {
            file_name.strip_suffix(compression.file_suffix().as_str())?
        } else {
            file_name.as_str()
        };

        let timestamp = match stem.parse::<i64>() {
            Ok(ts) => Some(ts),
            Err(_) => {
                warn!(stage = "retention", path = ?path, "couldn't parse timestamp! {}", file_name);
                None
            }
        };

        Some(SnapshotEntry {
            path,
            file_name,
            timestamp,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotRetention {
    pub keep: usize,
    pub compression: CompressionConfig,
}

impl SnapshotRetention {
    pub fn new(keep: usize, compression: CompressionConfig) -> Self {
        Self { keep, compression }
    }

    /// Entries falling outside the retention window, newest first
    ///
    /// Candidates are ordered by parsed timestamp, newest first. Names that do
    /// not parse order after every valid timestamp, so they are dropped first.
    pub fn get_delete<I>(&self, iter: I) -> impl Iterator<Item = SnapshotEntry>
    where
        I: IntoIterator<Item = SnapshotEntry>,
    {
        iter.into_iter()
            .sorted_unstable_by_key(|e| Reverse((e.timestamp, e.file_name.clone())))
            .skip(self.keep)
    }

    /// Lists the candidates below `parent_dir` and returns the ones to delete
    pub fn plan<P: AsRef<Path>>(&self, parent_dir: P) -> Result<Vec<SnapshotEntry>> {
        let compression = self.compression;
        let entries = read_dir(parent_dir.as_ref())?
            .filter_map(|r| match r {
                Ok(de) => Some(de.path()),
                Err(e) => {
                    warn!(stage = "retention", "Skipping unreadable entry: {e}");
                    None
                }
            })
            .filter_map(|p| SnapshotEntry::from_path(p, compression))
            .collect_vec();

        Ok(self.get_delete(entries).collect())
    }

    /// Deletes every snapshot below `parent_dir` beyond the newest `keep`
    ///
    /// Deletion failures are logged and do not stop the remaining deletions.
    /// Returns the removed paths.
    pub fn prune<P: AsRef<Path>>(&self, parent_dir: P) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for to_delete in self.plan(parent_dir.as_ref())? {
            info!(stage = "retention", "removing {:?}", to_delete.path);
            match remove_path(&to_delete.path) {
                Ok(()) => removed.push(to_delete.path),
                Err(e) => warn!(
                    stage = "retention",
                    path = ?to_delete.path,
                    "Removing out of retention snapshot failed: {e}"
                ),
            }
        }
        Ok(removed)
    }
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    if std::fs::symlink_metadata(path)?.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}
