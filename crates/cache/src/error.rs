//! Error types for the cache crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for cache operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Filesystem failure while reading, writing or scanning the cache
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(rkcache::cache::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Entry, temp file or directory involved, when known
        path: Option<Box<Path>>,
        /// Step that failed, e.g. "open", "copy", "create_temp"
        operation: String,
    },

    /// Unusable settings or no writable cache root
    #[error("Cache configuration error: {message}")]
    #[diagnostic(code(rkcache::cache::config))]
    Configuration {
        /// What was wrong
        message: String,
    },

    /// A cache key whose rendering cannot be used as an entry name
    #[error("Invalid cache key {key:?}: {reason}")]
    #[diagnostic(
        code(rkcache::cache::invalid_key),
        help("Cache keys must be a single, non-empty file name component")
    )]
    InvalidKey {
        /// The rejected key
        key: String,
        /// Why it was rejected
        reason: String,
    },

    /// Renaming a finished temporary file onto its final path failed
    #[error("Failed to publish cache file: {}", path.display())]
    #[diagnostic(
        code(rkcache::cache::persist),
        help("The temporary file and its target must live on the same filesystem")
    )]
    Persist {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Final path the file was being renamed to
        path: Box<Path>,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an invalid key error
    #[must_use]
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a persist error for the given target path
    #[must_use]
    pub fn persist(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::Persist {
            source,
            path: path.as_ref().into(),
        }
    }

    /// Returns true when the underlying cause is a missing file
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io { source, .. } | Self::Persist { source, .. } => {
                source.kind() == std::io::ErrorKind::NotFound
            }
            Self::Configuration { .. } | Self::InvalidKey { .. } => false,
        }
    }
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, Error>;
