//! Cache configuration and backend selection
//!
//! Settings are layered: defaults, then an optional TOML file, then
//! `RKCACHE_*` environment variables, then whatever the caller sets
//! explicitly. [`CacheConfig::build`] turns the result into the configured
//! [`ArtifactCache`] backend.

use crate::artifact::{ArtifactCache, NoopArtifactCache};
use crate::dir::DirArtifactCache;
use crate::{Error, Result};
use dirs::{cache_dir, home_dir};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root
pub const ENV_DIR: &str = "RKCACHE_DIR";
/// Environment variable overriding the maximum cache size
pub const ENV_MAX_SIZE: &str = "RKCACHE_MAX_SIZE";
/// Environment variable overriding the cache mode
pub const ENV_MODE: &str = "RKCACHE_MODE";

/// Which backend to build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Local directory cache
    #[default]
    Dir,
    /// No caching: every fetch misses
    Disabled,
}

impl std::str::FromStr for CacheMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dir" => Ok(Self::Dir),
            "disabled" | "off" | "none" => Ok(Self::Disabled),
            other => Err(Error::configuration(format!(
                "Unknown cache mode '{other}' (expected 'dir' or 'disabled')"
            ))),
        }
    }
}

/// Resolved cache settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache root; resolved from the user's cache directories when unset
    pub dir: Option<PathBuf>,
    /// Maximum total size in bytes; `None` disables eviction
    pub max_size_bytes: Option<u64>,
    /// Backend to use
    pub mode: CacheMode,
}

/// Size given either as a byte count or a string such as `"10GiB"`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Bytes(u64),
    Text(String),
}

impl SizeValue {
    fn to_bytes(&self) -> Result<u64> {
        match self {
            Self::Bytes(n) => Ok(*n),
            Self::Text(s) => parse_size(s),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CacheSection {
    dir: Option<PathBuf>,
    max_size: Option<SizeValue>,
    mode: Option<CacheMode>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    cache: CacheSection,
}

impl CacheConfig {
    /// Load settings from a TOML file's `[cache]` table
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or contains invalid values
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(e, path, "read"))?;
        Self::from_toml_str(&content).map_err(|e| with_context(e, path.display()))
    }

    /// Parse settings from TOML text
    ///
    /// # Errors
    ///
    /// Returns error if the text is not valid TOML or holds invalid values
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: FileConfig = toml::from_str(content)
            .map_err(|e| Error::configuration(format!("Invalid cache config: {e}")))?;
        let max_size_bytes = file
            .cache
            .max_size
            .as_ref()
            .map(SizeValue::to_bytes)
            .transpose()?;
        Ok(Self {
            dir: file.cache.dir,
            max_size_bytes,
            mode: file.cache.mode.unwrap_or_default(),
        })
    }

    /// Apply `RKCACHE_*` overrides from the process environment
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an invalid value
    pub fn with_env(self) -> Result<Self> {
        self.with_env_from(|name| std::env::var(name).ok())
    }

    /// Apply `RKCACHE_*` overrides read through `lookup`
    ///
    /// Empty or whitespace-only values are ignored.
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an invalid value
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get(ENV_DIR) {
            self.dir = Some(PathBuf::from(dir));
        }
        if let Some(size) = get(ENV_MAX_SIZE) {
            self.max_size_bytes =
                Some(parse_size(&size).map_err(|e| with_context(e, ENV_MAX_SIZE))?);
        }
        if let Some(mode) = get(ENV_MODE) {
            self.mode = mode.parse()?;
        }
        Ok(self)
    }

    /// The cache root, resolving a default location when none is set
    ///
    /// # Errors
    ///
    /// Returns error if no writable default location exists
    pub fn resolve_dir(&self) -> Result<PathBuf> {
        match &self.dir {
            Some(dir) => Ok(dir.clone()),
            None => default_cache_root(),
        }
    }

    /// Build the configured backend
    ///
    /// # Errors
    ///
    /// Returns error if the directory backend cannot be set up
    pub fn build(&self) -> Result<Box<dyn ArtifactCache>> {
        match self.mode {
            CacheMode::Dir => {
                let root = self.resolve_dir()?;
                Ok(Box::new(DirArtifactCache::new(root, self.max_size_bytes)?))
            }
            CacheMode::Disabled => {
                tracing::debug!("Artifact caching disabled by configuration");
                Ok(Box::new(NoopArtifactCache::new()))
            }
        }
    }
}

/// Parse a size such as `1048576`, `512K`, `10 MiB` or `2GB`
///
/// Units are binary multiples and case-insensitive.
///
/// # Errors
///
/// Returns error if the value is not a non-negative integer with an optional
/// known unit, or overflows `u64`
pub fn parse_size(input: &str) -> Result<u64> {
    let s = input.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    if digits.is_empty() {
        return Err(Error::configuration(format!("Invalid size '{input}'")));
    }
    let value: u64 = digits
        .parse()
        .map_err(|_| Error::configuration(format!("Invalid size '{input}'")))?;

    let shift = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 0,
        "k" | "kb" | "kib" => 10,
        "m" | "mb" | "mib" => 20,
        "g" | "gb" | "gib" => 30,
        "t" | "tb" | "tib" => 40,
        other => {
            return Err(Error::configuration(format!(
                "Unknown size unit '{other}' in '{input}'"
            )));
        }
    };

    value
        .checked_mul(1u64 << shift)
        .ok_or_else(|| Error::configuration(format!("Size '{input}' is too large")))
}

/// Prefix a configuration error's message with where the value came from
fn with_context(err: Error, context: impl std::fmt::Display) -> Error {
    match err {
        Error::Configuration { message } => Error::configuration(format!("{context}: {message}")),
        other => other,
    }
}

/// Inputs for determining the default cache root
#[derive(Debug, Clone)]
struct CacheInputs {
    xdg_cache_home: Option<PathBuf>,
    os_cache_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
    temp_dir: PathBuf,
}

fn cache_root_from_inputs(inputs: CacheInputs) -> Result<PathBuf> {
    // Resolution order (first writable wins):
    // 1) XDG_CACHE_HOME/rkcache/artifacts
    // 2) OS cache dir/rkcache/artifacts
    // 3) ~/.rkcache/artifacts
    // 4) TMPDIR/rkcache/artifacts (fallback)
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(xdg) = inputs.xdg_cache_home {
        candidates.push(xdg.join("rkcache/artifacts"));
    }
    if let Some(os_cache) = inputs.os_cache_dir {
        candidates.push(os_cache.join("rkcache/artifacts"));
    }
    if let Some(home) = inputs.home_dir {
        candidates.push(home.join(".rkcache/artifacts"));
    }
    candidates.push(inputs.temp_dir.join("rkcache/artifacts"));

    for path in candidates {
        // Nix build sandboxes point HOME here and it is never writable
        if path.starts_with("/homeless-shelter") {
            continue;
        }
        if path.exists() {
            let probe = path.join(".write_probe");
            match fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&probe)
            {
                Ok(_) => {
                    let _ = fs::remove_file(&probe);
                    return Ok(path);
                }
                Err(_) => continue,
            }
        }
        if fs::create_dir_all(&path).is_ok() {
            return Ok(path);
        }
    }
    Err(Error::configuration(
        "Failed to determine a writable cache directory",
    ))
}

fn default_cache_root() -> Result<PathBuf> {
    let inputs = CacheInputs {
        xdg_cache_home: std::env::var("XDG_CACHE_HOME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from),
        os_cache_dir: cache_dir(),
        home_dir: home_dir(),
        temp_dir: std::env::temp_dir(),
    };
    cache_root_from_inputs(inputs)
}
