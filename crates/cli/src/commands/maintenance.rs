//! `gc` and `stats`: operator views of the directory cache

use crate::cli::CliError;
use rkcache_cache::{CacheConfig, CacheMode, CacheStats, DirArtifactCache, RetentionReport};

fn open_dir_cache(config: &CacheConfig) -> Result<DirArtifactCache, CliError> {
    let root = config.resolve_dir()?;
    Ok(DirArtifactCache::new(root, config.max_size_bytes)?)
}

/// Run one retention pass, exactly as a finished build would
///
/// # Errors
///
/// Returns error if the cache root cannot be set up
pub fn gc(config: &CacheConfig) -> Result<RetentionReport, CliError> {
    if config.mode == CacheMode::Disabled {
        tracing::info!("Caching is disabled; nothing to collect");
        return Ok(RetentionReport::default());
    }

    let cache = open_dir_cache(config)?;
    if cache.max_size_bytes().is_none() {
        tracing::info!(root = %cache.root().display(), "No size limit configured; gc keeps every entry");
    }
    Ok(cache.run_retention())
}

/// Summarise the cache root
///
/// # Errors
///
/// Returns error if caching is disabled or the root cannot be read
pub fn stats(config: &CacheConfig) -> Result<CacheStats, CliError> {
    if config.mode == CacheMode::Disabled {
        return Err(CliError::config_with_help(
            "Caching is disabled, there is no cache directory to inspect",
            "Unset RKCACHE_MODE or set it to 'dir'",
        ));
    }

    Ok(open_dir_cache(config)?.stats()?)
}
