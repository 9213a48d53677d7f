//! Cache usage statistics

use crate::Result;
use crate::dir::DirArtifactCache;
use crate::retention::scan_entries;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of a directory cache's size and age
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of files in the cache root
    pub entry_count: usize,
    /// Combined size of those files
    pub total_size_bytes: u64,
    /// Configured size bound
    pub max_size_bytes: Option<u64>,
    /// Least recent last-use time
    pub oldest: Option<DateTime<Utc>>,
    /// Most recent last-use time
    pub newest: Option<DateTime<Utc>>,
    /// `total_size_bytes` formatted for humans
    pub human_size: String,
}

impl CacheStats {
    /// Fraction of the size bound in use, if a bound is configured
    #[must_use]
    pub fn utilization(&self) -> Option<f64> {
        match self.max_size_bytes {
            Some(0) => Some(if self.total_size_bytes == 0 { 0.0 } else { 1.0 }),
            #[allow(clippy::cast_precision_loss)]
            Some(max) => Some(self.total_size_bytes as f64 / max as f64),
            None => None,
        }
    }
}

impl DirArtifactCache {
    /// Summarise the entries currently in the cache root
    ///
    /// # Errors
    ///
    /// Returns error if the cache root cannot be listed
    pub fn stats(&self) -> Result<CacheStats> {
        let entries = scan_entries(self.root())?;

        let total_size_bytes = entries.iter().map(|e| e.size).sum();
        let oldest = entries.iter().map(|e| e.last_used).min().map(DateTime::<Utc>::from);
        let newest = entries.iter().map(|e| e.last_used).max().map(DateTime::<Utc>::from);

        Ok(CacheStats {
            entry_count: entries.len(),
            total_size_bytes,
            max_size_bytes: self.max_size_bytes(),
            oldest,
            newest,
            human_size: format_bytes(total_size_bytes),
        })
    }
}

/// Format a byte count with binary units, e.g. `1.5 MiB`
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }
    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheKey;
    use crate::artifact::ArtifactCache;
    use tempfile::TempDir;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.0 KiB");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(10 * 1024 * 1024 * 1024), "10.0 GiB");
    }

    #[test]
    fn test_stats_on_empty_cache() {
        let tmp = TempDir::new().unwrap();
        let cache = DirArtifactCache::new(tmp.path().join("c"), None).unwrap();
        let stats = cache.stats().unwrap();
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.total_size_bytes, 0);
        assert!(stats.oldest.is_none());
        assert!(stats.newest.is_none());
        assert_eq!(stats.utilization(), None);
    }

    #[test]
    fn test_stats_counts_entries() {
        let tmp = TempDir::new().unwrap();
        let cache = DirArtifactCache::new(tmp.path().join("c"), Some(100)).unwrap();
        let src = tmp.path().join("src");
        std::fs::write(&src, [7u8; 25]).unwrap();
        cache.store(&CacheKey::new("a").unwrap(), &src);
        cache.store(&CacheKey::new("b").unwrap(), &src);

        let stats = cache.stats().unwrap();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.total_size_bytes, 50);
        assert_eq!(stats.max_size_bytes, Some(100));
        assert_eq!(stats.human_size, "50 B");
        assert!(stats.oldest <= stats.newest);
        assert_eq!(stats.utilization(), Some(0.5));
    }
}
