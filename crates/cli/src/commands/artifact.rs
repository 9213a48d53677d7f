//! `fetch` and `store`: the two operations a build step performs

use crate::cli::CliError;
use rkcache_cache::{CacheConfig, CacheKey, CacheResult};
use std::fs;
use std::path::Path;

/// Copy the entry for `key` to `dest`
///
/// # Errors
///
/// Returns error if the key is invalid or the cache cannot be set up. Fetch
/// failures themselves degrade to [`CacheResult::Miss`].
pub fn fetch(config: &CacheConfig, key: &str, dest: &Path) -> Result<CacheResult, CliError> {
    let key = CacheKey::new(key)?;
    let cache = config.build()?;

    let result = cache.fetch(&key, dest);
    cache.close();
    Ok(result)
}

/// Store `source` under `key`
///
/// # Errors
///
/// Returns error if the key is invalid, `source` is not a readable file, or
/// the cache cannot be set up. A store that fails after that point is logged
/// and otherwise ignored.
pub fn store(config: &CacheConfig, key: &str, source: &Path) -> Result<(), CliError> {
    let key = CacheKey::new(key)?;
    match fs::metadata(source) {
        Ok(metadata) if metadata.is_file() => {}
        Ok(_) => {
            return Err(CliError::cache(format!(
                "{} is not a regular file",
                source.display()
            )));
        }
        Err(e) => {
            return Err(CliError::cache_with_help(
                format!("Cannot read {}: {e}", source.display()),
                "Store the artifact after the build step has produced it",
            ));
        }
    }

    let cache = config.build()?;
    if cache.is_store_supported() {
        cache.store(&key, source);
    } else {
        tracing::warn!(backend = cache.name(), %key, "Cache does not accept stores; nothing written");
    }
    cache.close();
    Ok(())
}
