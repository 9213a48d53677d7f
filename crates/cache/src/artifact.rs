//! Artifact cache abstraction shared by every cache backend
//!
//! The build orchestrator only talks to [`ArtifactCache`]. The directory
//! backend lives in [`crate::dir`]; [`NoopArtifactCache`] stands in when
//! caching is disabled. Networked backends would implement the same trait.

use crate::CacheKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Outcome of a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheResult {
    /// The artifact was found and copied to the destination
    Hit,
    /// No usable artifact; the destination was left untouched
    Miss,
}

impl CacheResult {
    /// Whether the fetch produced the artifact
    #[must_use]
    pub fn is_hit(self) -> bool {
        matches!(self, Self::Hit)
    }
}

impl fmt::Display for CacheResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit => f.write_str("hit"),
            Self::Miss => f.write_str("miss"),
        }
    }
}

/// Trait for artifact cache backends
///
/// None of these operations can fail a build: problems are logged by the
/// backend and reported as a [`CacheResult::Miss`] or a skipped store.
pub trait ArtifactCache: Send + Sync {
    /// Copy the artifact stored under `key` to `output`
    fn fetch(&self, key: &CacheKey, output: &Path) -> CacheResult;

    /// Store the file at `output` under `key`, replacing any previous entry
    fn store(&self, key: &CacheKey, output: &Path);

    /// Whether [`ArtifactCache::store`] has any effect on this backend
    fn is_store_supported(&self) -> bool;

    /// Release backend resources
    fn close(&self);

    /// Signal that the owning build has finished
    ///
    /// Backends with housekeeping to do (such as size-bounded eviction)
    /// run it here before returning.
    fn notify_build_finished(&self) {}

    /// Get the name of the backend
    fn name(&self) -> &'static str;
}

/// Backend that never hits and never stores
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopArtifactCache;

impl NoopArtifactCache {
    /// Create a no-op cache
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ArtifactCache for NoopArtifactCache {
    fn fetch(&self, key: &CacheKey, output: &Path) -> CacheResult {
        tracing::trace!(key = %key, output = %output.display(), "Caching disabled, fetch misses");
        CacheResult::Miss
    }

    fn store(&self, key: &CacheKey, _output: &Path) {
        tracing::trace!(key = %key, "Caching disabled, store ignored");
    }

    fn is_store_supported(&self) -> bool {
        false
    }

    fn close(&self) {}

    fn name(&self) -> &'static str {
        "noop"
    }
}
