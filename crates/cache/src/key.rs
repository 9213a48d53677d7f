//! Rule keys: the opaque identity a cache entry is stored under
//!
//! Keys are computed by the build orchestrator and handed to the cache as-is.
//! The cache only compares them, hashes them and renders them as the file
//! name of the entry.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest accepted key rendering, in bytes.
///
/// Leaves headroom below the common 255-byte file name limit for the random
/// characters and `.tmp` suffix appended to temporary files during a store.
pub const MAX_KEY_LEN: usize = 200;

/// Identity of one cached build artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap a caller-provided key
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if the key cannot be used as a single
    /// file name inside the cache root.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::invalid_key(key, "key is empty"));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(Error::invalid_key(
                key,
                format!("key is longer than {MAX_KEY_LEN} bytes"),
            ));
        }
        if key == "." || key == ".." {
            return Err(Error::invalid_key(key, "key is a relative path component"));
        }
        if key.contains(['/', '\\']) {
            return Err(Error::invalid_key(key, "key contains a path separator"));
        }
        if key.contains('\0') {
            return Err(Error::invalid_key(key, "key contains a NUL byte"));
        }
        Ok(Self(key))
    }

    /// The textual rendering, used verbatim as the entry's file name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CacheKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
