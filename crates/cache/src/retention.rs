//! Size-bounded eviction for the directory cache
//!
//! Each pass rebuilds the usage ordering from filesystem timestamps, so
//! nothing has to be persisted between passes and a crash loses no state.
//! Entries are kept most-recently-used first until the configured budget is
//! used up; everything after that point is deleted.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Which filesystem timestamp an entry's last use was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampSource {
    /// Last access time
    Accessed,
    /// Last modification time, used where access times are unsupported
    Modified,
    /// Neither timestamp was readable; the entry is treated as oldest
    Unavailable,
}

/// One file in the cache root as seen by a retention scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Full path of the entry
    pub path: PathBuf,
    /// Size in bytes at scan time
    pub size: u64,
    /// Best available last-use timestamp
    pub last_used: SystemTime,
    /// Where `last_used` came from
    pub timestamp_source: TimestampSource,
}

impl EntryInfo {
    /// Build entry info from filesystem metadata
    ///
    /// Falls back from access time to modification time to the Unix epoch.
    #[must_use]
    pub fn from_metadata(path: PathBuf, metadata: &fs::Metadata) -> Self {
        let (last_used, timestamp_source) = match metadata.accessed() {
            Ok(t) => (t, TimestampSource::Accessed),
            Err(_) => match metadata.modified() {
                Ok(t) => (t, TimestampSource::Modified),
                Err(_) => (SystemTime::UNIX_EPOCH, TimestampSource::Unavailable),
            },
        };
        Self {
            path,
            size: metadata.len(),
            last_used,
            timestamp_source,
        }
    }
}

/// List the entries directly inside `root`
///
/// Subdirectories are not cache entries and are skipped, as are entries that
/// disappear between listing and inspection.
///
/// # Errors
///
/// Returns error if the root directory itself cannot be read
pub fn scan_entries(root: &Path) -> Result<Vec<EntryInfo>> {
    let mut entries = Vec::new();

    for entry in fs::read_dir(root).map_err(|e| Error::io(e, root, "read_dir"))? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(root = %root.display(), error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();

        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Skipping entry without metadata");
                continue;
            }
        };
        if metadata.is_dir() {
            tracing::debug!(path = %path.display(), "Skipping subdirectory in cache root");
            continue;
        }

        entries.push(EntryInfo::from_metadata(path, &metadata));
    }

    Ok(entries)
}

/// Entries split into those that fit the budget and those to delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    /// Most recently used first; cumulative size is within the budget
    pub retained: Vec<EntryInfo>,
    /// Everything from the first entry that overflowed the budget onwards
    pub evicted: Vec<EntryInfo>,
}

/// Order `entries` by last use and cut the list where `max_size_bytes` is exceeded
///
/// Ordering is newest first; equal timestamps are ordered by path, highest
/// first, so the outcome is reproducible. Once one entry overflows the
/// budget it and every later entry are evicted, even if a later entry would
/// fit on its own.
#[must_use]
pub fn plan_evictions(mut entries: Vec<EntryInfo>, max_size_bytes: u64) -> RetentionPlan {
    entries.sort_by(|a, b| {
        b.last_used
            .cmp(&a.last_used)
            .then_with(|| b.path.cmp(&a.path))
    });

    let mut current_size = 0u64;
    let cut = entries
        .iter()
        .position(|entry| {
            current_size = current_size.saturating_add(entry.size);
            current_size > max_size_bytes
        })
        .unwrap_or(entries.len());

    let evicted = entries.split_off(cut);
    RetentionPlan {
        retained: entries,
        evicted,
    }
}

/// Summary of one retention pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionReport {
    /// Entries found in the cache root
    pub entries_scanned: usize,
    /// Entries deleted by this pass
    pub entries_removed: usize,
    /// Evicted entries that could not be deleted
    pub entries_failed: usize,
    /// Bytes released by deleted entries
    pub bytes_freed: u64,
    /// Bytes held by the entries kept
    pub bytes_retained: u64,
}

/// Size bound applied to a cache root
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Maximum total size in bytes; `None` disables eviction
    pub max_size_bytes: Option<u64>,
}

impl RetentionPolicy {
    /// Policy with the given optional bound
    #[must_use]
    pub fn new(max_size_bytes: Option<u64>) -> Self {
        Self { max_size_bytes }
    }

    /// Policy that never evicts
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Run one eviction pass over `root`
    ///
    /// Never fails: a root that cannot be listed yields an empty report and
    /// individual delete failures are logged and skipped.
    pub fn run(&self, root: &Path) -> RetentionReport {
        let Some(max_size) = self.max_size_bytes else {
            return RetentionReport::default();
        };

        let entries = match scan_entries(root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "Cannot scan cache directory for eviction");
                return RetentionReport::default();
            }
        };

        let entries_scanned = entries.len();
        let plan = plan_evictions(entries, max_size);
        let mut report = RetentionReport {
            entries_scanned,
            bytes_retained: plan.retained.iter().map(|e| e.size).sum(),
            ..RetentionReport::default()
        };

        for entry in &plan.evicted {
            match fs::remove_file(&entry.path) {
                Ok(()) => {
                    report.entries_removed += 1;
                    report.bytes_freed += entry.size;
                    tracing::debug!(
                        path = %entry.path.display(),
                        size = entry.size,
                        "Removed entry to reduce cache size"
                    );
                }
                // Raced away by another process or a concurrent pass elsewhere
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    report.entries_failed += 1;
                    tracing::warn!(
                        path = %entry.path.display(),
                        error = %e,
                        "Failed to remove cache entry"
                    );
                }
            }
        }

        tracing::info!(
            root = %root.display(),
            max_size,
            scanned = report.entries_scanned,
            removed = report.entries_removed,
            bytes_freed = report.bytes_freed,
            "Cache retention pass complete"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{File, FileTimes};
    use std::time::Duration;
    use tempfile::TempDir;

    fn info(name: &str, size: u64, secs: u64) -> EntryInfo {
        EntryInfo {
            path: PathBuf::from("/cache").join(name),
            size,
            last_used: SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
            timestamp_source: TimestampSource::Accessed,
        }
    }

    fn names(entries: &[EntryInfo]) -> Vec<String> {
        entries
            .iter()
            .map(|e| e.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    fn write_entry(root: &Path, name: &str, size: usize, accessed_secs: u64) {
        let path = root.join(name);
        fs::write(&path, vec![0u8; size]).unwrap();
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(accessed_secs);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_times(FileTimes::new().set_accessed(t).set_modified(t))
            .unwrap();
    }

    #[test]
    fn test_plan_keeps_newest_prefix() {
        let entries = vec![
            info("e1", 30, 1),
            info("e2", 30, 2),
            info("e3", 30, 3),
            info("e4", 30, 4),
            info("e5", 30, 5),
        ];
        let plan = plan_evictions(entries, 100);
        assert_eq!(names(&plan.retained), vec!["e5", "e4", "e3"]);
        assert_eq!(names(&plan.evicted), vec!["e2", "e1"]);
    }

    #[test]
    fn test_plan_exact_fit_is_retained() {
        let plan = plan_evictions(vec![info("a", 50, 2), info("b", 50, 1)], 100);
        assert_eq!(names(&plan.retained), vec!["a", "b"]);
        assert!(plan.evicted.is_empty());
    }

    #[test]
    fn test_plan_evicts_everything_after_first_overflow() {
        // "small" would fit on its own but comes after the overflow point
        let entries = vec![info("big", 80, 3), info("huge", 50, 2), info("small", 5, 1)];
        let plan = plan_evictions(entries, 100);
        assert_eq!(names(&plan.retained), vec!["big"]);
        assert_eq!(names(&plan.evicted), vec!["huge", "small"]);
    }

    #[test]
    fn test_plan_ties_break_on_reverse_path_order() {
        let entries = vec![info("a", 10, 7), info("c", 10, 7), info("b", 10, 7)];
        let plan = plan_evictions(entries, 20);
        assert_eq!(names(&plan.retained), vec!["c", "b"]);
        assert_eq!(names(&plan.evicted), vec!["a"]);
    }

    #[test]
    fn test_plan_zero_budget_evicts_non_empty_entries() {
        let plan = plan_evictions(vec![info("empty", 0, 2), info("data", 1, 1)], 0);
        assert_eq!(names(&plan.retained), vec!["empty"]);
        assert_eq!(names(&plan.evicted), vec!["data"]);
    }

    #[test]
    fn test_unbounded_policy_is_noop() {
        let tmp = TempDir::new().unwrap();
        write_entry(tmp.path(), "a", 1000, 1);

        let report = RetentionPolicy::unbounded().run(tmp.path());
        assert_eq!(report, RetentionReport::default());
        assert!(tmp.path().join("a").exists());
    }

    #[test]
    fn test_run_deletes_least_recently_used() {
        let tmp = TempDir::new().unwrap();
        write_entry(tmp.path(), "old", 60, 100);
        write_entry(tmp.path(), "mid", 60, 200);
        write_entry(tmp.path(), "new", 30, 300);

        let report = RetentionPolicy::new(Some(100)).run(tmp.path());

        assert_eq!(report.entries_scanned, 3);
        assert_eq!(report.entries_removed, 2);
        assert_eq!(report.bytes_freed, 120);
        assert_eq!(report.bytes_retained, 30);
        assert!(tmp.path().join("new").exists());
        assert!(!tmp.path().join("mid").exists());
        assert!(!tmp.path().join("old").exists());
    }

    #[test]
    fn test_run_ignores_subdirectories() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("inner"), vec![0u8; 500]).unwrap();
        write_entry(tmp.path(), "entry", 10, 1);

        let report = RetentionPolicy::new(Some(5)).run(tmp.path());

        assert_eq!(report.entries_scanned, 1);
        assert_eq!(report.entries_removed, 1);
        assert!(nested.join("inner").exists());
    }

    #[test]
    fn test_run_on_missing_root_reports_nothing() {
        let tmp = TempDir::new().unwrap();
        let report = RetentionPolicy::new(Some(1)).run(&tmp.path().join("gone"));
        assert_eq!(report, RetentionReport::default());
    }

    #[test]
    fn test_scan_reads_size_and_access_time() {
        let tmp = TempDir::new().unwrap();
        write_entry(tmp.path(), "x", 42, 1234);

        let entries = scan_entries(tmp.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].size, 42);
        assert_ne!(entries[0].timestamp_source, TimestampSource::Unavailable);
        assert_eq!(
            entries[0].last_used,
            SystemTime::UNIX_EPOCH + Duration::from_secs(1234)
        );
    }
}
