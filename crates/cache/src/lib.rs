//! Directory-backed build artifact cache for rkcache
//!
//! This crate lets a build orchestrator skip work by storing the output of a
//! build step under its rule key and fetching it back on later builds:
//! - Atomic stores: an entry is either absent or complete, even across crashes
//! - Best-effort fetches: every failure degrades to a cache miss
//! - Size-bounded eviction by last access time, run when a build finishes
//!
//! # Overview
//!
//! Callers program against the [`ArtifactCache`] trait and pick a backend at
//! configuration time through [`CacheConfig::build`]:
//!
//! ```rust,no_run
//! use rkcache_cache::{CacheConfig, CacheKey};
//! use std::path::Path;
//!
//! let cache = CacheConfig::default().with_env()?.build()?;
//! let key = CacheKey::new("9f86d081884c7d659a2feaa0c55ad015")?;
//!
//! if !cache.fetch(&key, Path::new("out/libfoo.a")).is_hit() {
//!     // ... run the build step ...
//!     cache.store(&key, Path::new("out/libfoo.a"));
//! }
//!
//! cache.notify_build_finished();
//! # Ok::<(), rkcache_cache::Error>(())
//! ```

pub mod artifact;
pub mod config;
pub mod dir;
mod error;
pub mod key;
pub mod lifecycle;
pub mod retention;
pub mod stats;

// Re-export error types at crate root
pub use error::{Error, Result};

// Re-export main types
pub use artifact::{ArtifactCache, CacheResult, NoopArtifactCache};
pub use config::{CacheConfig, CacheMode, parse_size};
pub use dir::DirArtifactCache;
pub use key::CacheKey;
pub use lifecycle::BuildFinishedHook;
pub use retention::{RetentionPolicy, RetentionReport, TimestampSource};
pub use stats::CacheStats;
