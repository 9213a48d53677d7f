//! Directory-backed artifact cache
//!
//! Every entry is a single file directly under the cache root, named by its
//! [`CacheKey`]. Writes go to a temporary file in the same directory and are
//! published with one rename, so a reader (or a later build after a crash)
//! sees either the whole artifact or nothing.
//!
//! ```text
//! <root>/
//!   9f86d081884c7d65...          (entry)
//!   0a4c21e7b8d2f5c3...          (entry)
//!   0a4c21e7b8d2f5c3...Xy7kQ2.tmp  (store in progress)
//! ```

use crate::artifact::{ArtifactCache, CacheResult};
use crate::lifecycle::BuildFinishedHook;
use crate::retention::{RetentionPolicy, RetentionReport};
use crate::{CacheKey, Error, Result};
use std::fs::{self, File, FileTimes};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;

/// Suffix for in-flight temporary files
const TMP_SUFFIX: &str = ".tmp";

/// Prefix for temporary files written next to a fetch destination
const FETCH_PREFIX: &str = ".rkcache-fetch";

/// Artifact cache stored in a local directory
#[derive(Debug)]
pub struct DirArtifactCache {
    root: PathBuf,
    hook: BuildFinishedHook,
}

impl DirArtifactCache {
    /// Open (creating if needed) a cache rooted at `root`
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or is not writable
    pub fn new(root: impl Into<PathBuf>, max_size_bytes: Option<u64>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::io(e, &root, "create_dir_all"))?;

        // Uniquely named and created exclusively, so no entry is ever clobbered
        let probe = NamedTempFile::new_in(&root).map_err(|e| Error::io(e, &root, "write_probe"))?;
        discard(probe);

        tracing::debug!(root = %root.display(), max_size_bytes = ?max_size_bytes, "Opened directory artifact cache");

        let hook = BuildFinishedHook::new(root.clone(), RetentionPolicy::new(max_size_bytes));
        Ok(Self { root, hook })
    }

    /// The cache root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configured size bound, if any
    #[must_use]
    pub fn max_size_bytes(&self) -> Option<u64> {
        self.hook.policy().max_size_bytes
    }

    /// Path of the entry for `key`
    #[must_use]
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Fetch an entry, reporting why it could not be fetched
    ///
    /// A missing entry is `Ok(CacheResult::Miss)`. On error `output` is left
    /// as it was.
    ///
    /// # Errors
    ///
    /// Returns error if the entry exists but could not be copied out
    pub fn try_fetch(&self, key: &CacheKey, output: &Path) -> Result<CacheResult> {
        let entry = self.entry_path(key);
        let mut source = match File::open(&entry) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CacheResult::Miss),
            Err(e) => return Err(Error::io(e, &entry, "open")),
        };
        let permissions = source
            .metadata()
            .map_err(|e| Error::io(e, &entry, "metadata"))?
            .permissions();

        let parent = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|e| Error::io(e, parent, "create_dir_all"))?;

        // Fixed prefix: a name derived from `output` could exceed NAME_MAX
        let mut tmp = tempfile::Builder::new()
            .prefix(FETCH_PREFIX)
            .suffix(TMP_SUFFIX)
            .tempfile_in(parent)
            .map_err(|e| Error::io(e, parent, "create_temp"))?;

        io::copy(&mut source, tmp.as_file_mut()).map_err(|e| Error::io(e, &entry, "copy"))?;
        tmp.as_file()
            .set_permissions(permissions)
            .map_err(|e| Error::io(e, tmp.path(), "set_permissions"))?;
        publish(tmp, output)?;

        touch_accessed(&source, &entry);
        Ok(CacheResult::Hit)
    }

    /// Store an artifact, reporting failures
    ///
    /// Returns the path of the published entry.
    ///
    /// # Errors
    ///
    /// Returns error if the source cannot be read or the entry cannot be
    /// written. No partial entry is left behind in either case.
    pub fn try_store(&self, key: &CacheKey, output: &Path) -> Result<PathBuf> {
        let entry = self.entry_path(key);

        let mut source = File::open(output).map_err(|e| Error::io(e, output, "open"))?;
        let permissions = source
            .metadata()
            .map_err(|e| Error::io(e, output, "metadata"))?
            .permissions();

        // Same directory as the entry, so the final rename stays on one filesystem
        let mut tmp = tempfile::Builder::new()
            .prefix(key.as_str())
            .suffix(TMP_SUFFIX)
            .tempfile_in(&self.root)
            .map_err(|e| Error::io(e, &self.root, "create_temp"))?;

        let written = io::copy(&mut source, tmp.as_file_mut())
            .and_then(|n| tmp.as_file().sync_all().map(|()| n))
            .map_err(|e| Error::io(e, tmp.path(), "write"));
        let written = match written {
            Ok(n) => n,
            Err(e) => {
                discard(tmp);
                return Err(e);
            }
        };
        if let Err(e) = tmp.as_file().set_permissions(permissions) {
            let err = Error::io(e, tmp.path(), "set_permissions");
            discard(tmp);
            return Err(err);
        }

        publish(tmp, &entry)?;
        tracing::debug!(key = %key, path = %entry.display(), size = written, "Stored artifact");
        Ok(entry)
    }

    /// Run one retention pass now
    ///
    /// Passes triggered here and through
    /// [`ArtifactCache::notify_build_finished`] never overlap.
    pub fn run_retention(&self) -> RetentionReport {
        self.hook.build_finished()
    }
}

impl ArtifactCache for DirArtifactCache {
    fn fetch(&self, key: &CacheKey, output: &Path) -> CacheResult {
        let result = self.try_fetch(key, output).unwrap_or_else(|e| {
            tracing::warn!(
                key = %key,
                output = %output.display(),
                error = %e,
                "Artifact fetch failed"
            );
            CacheResult::Miss
        });
        tracing::info!(key = %key, output = %output.display(), result = %result, "Artifact fetch");
        result
    }

    fn store(&self, key: &CacheKey, output: &Path) {
        if let Err(e) = self.try_store(key, output) {
            tracing::warn!(
                key = %key,
                output = %output.display(),
                error = %e,
                "Artifact store failed"
            );
        }
    }

    fn is_store_supported(&self) -> bool {
        true
    }

    fn close(&self) {
        // Every operation completes before returning; nothing to flush.
    }

    fn notify_build_finished(&self) {
        self.run_retention();
    }

    fn name(&self) -> &'static str {
        "dir"
    }
}

/// Atomically rename a finished temporary file onto `target`
fn publish(tmp: NamedTempFile, target: &Path) -> Result<()> {
    match tmp.persist(target) {
        Ok(_) => Ok(()),
        Err(e) => {
            let err = Error::persist(e.error, target);
            discard(e.file);
            Err(err)
        }
    }
}

/// Best-effort removal of an abandoned temporary file
fn discard(tmp: NamedTempFile) {
    let path = tmp.path().to_path_buf();
    if let Err(e) = tmp.close() {
        tracing::info!(path = %path.display(), error = %e, "Unable to delete temp cache file");
    }
}

/// Record a read of `entry` in its access time
///
/// Filesystems mounted `noatime` or `relatime` would otherwise leave the
/// access time stale and the retention pass would evict hot entries.
fn touch_accessed(file: &File, entry: &Path) {
    if let Err(e) = file.set_times(FileTimes::new().set_accessed(SystemTime::now())) {
        tracing::debug!(path = %entry.display(), error = %e, "Could not refresh access time");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s).unwrap()
    }

    fn make_cache(max: Option<u64>) -> (TempDir, DirArtifactCache) {
        let tmp = TempDir::new().unwrap();
        let cache = DirArtifactCache::new(tmp.path().join("cache"), max).unwrap();
        (tmp, cache)
    }

    fn artifact(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, data).unwrap();
        path
    }

    fn root_file_names(cache: &DirArtifactCache) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(cache.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_new_creates_root_recursively() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("a/b/c");
        let cache = DirArtifactCache::new(&root, None).unwrap();
        assert!(root.is_dir());
        assert_eq!(cache.root(), root);
        assert!(root_file_names(&cache).is_empty(), "write probe must be cleaned up");
    }

    #[test]
    fn test_reopening_root_keeps_dot_prefixed_entries() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");
        let cache = DirArtifactCache::new(&root, None).unwrap();
        cache.store(&key(".write_probe"), &artifact(tmp.path(), "src", b"payload"));

        let reopened = DirArtifactCache::new(&root, None).unwrap();
        let dest = tmp.path().join("dest");
        assert_eq!(reopened.fetch(&key(".write_probe"), &dest), CacheResult::Hit);
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
        assert_eq!(root_file_names(&reopened), vec![".write_probe"]);
    }

    #[test]
    fn test_new_fails_when_root_is_a_file() {
        let tmp = TempDir::new().unwrap();
        let blocker = artifact(tmp.path(), "blocker", b"x");
        assert!(DirArtifactCache::new(&blocker, None).is_err());
    }

    #[test]
    fn test_store_then_fetch_roundtrip() {
        let (tmp, cache) = make_cache(None);
        let src = artifact(tmp.path(), "lib.a", &[0xAA; 10]);

        cache.store(&key("ruleA"), &src);
        let dest = tmp.path().join("out/nested/lib.a");
        assert_eq!(cache.fetch(&key("ruleA"), &dest), CacheResult::Hit);
        assert_eq!(fs::read(&dest).unwrap(), vec![0xAA; 10]);
    }

    #[test]
    fn test_fetch_unknown_key_misses_without_touching_destination() {
        let (tmp, cache) = make_cache(None);
        let dest = artifact(tmp.path(), "existing", b"keep me");

        assert_eq!(cache.fetch(&key("ruleB"), &dest), CacheResult::Miss);
        assert_eq!(fs::read(&dest).unwrap(), b"keep me");

        let absent = tmp.path().join("never/created");
        assert_eq!(cache.fetch(&key("ruleB"), &absent), CacheResult::Miss);
        assert!(!absent.exists());
        assert!(!tmp.path().join("never").exists());
    }

    #[test]
    fn test_store_replaces_existing_entry() {
        let (tmp, cache) = make_cache(None);
        cache.store(&key("k"), &artifact(tmp.path(), "v1", b"first version, longer"));
        cache.store(&key("k"), &artifact(tmp.path(), "v2", b"second"));

        let dest = tmp.path().join("dest");
        assert!(cache.fetch(&key("k"), &dest).is_hit());
        assert_eq!(fs::read(&dest).unwrap(), b"second");
        assert_eq!(root_file_names(&cache), vec!["k"]);
    }

    #[test]
    fn test_store_missing_source_leaves_no_files() {
        let (tmp, cache) = make_cache(None);
        let err = cache
            .try_store(&key("k"), &tmp.path().join("does-not-exist"))
            .unwrap_err();
        assert!(err.is_not_found());

        cache.store(&key("k"), &tmp.path().join("does-not-exist"));
        assert!(root_file_names(&cache).is_empty());
    }

    #[test]
    fn test_store_directory_source_cleans_temp_file() {
        let (tmp, cache) = make_cache(None);
        let dir_source = tmp.path().join("a-directory");
        fs::create_dir(&dir_source).unwrap();

        assert!(cache.try_store(&key("k"), &dir_source).is_err());
        assert!(root_file_names(&cache).is_empty());
    }

    #[test]
    fn test_try_store_returns_entry_path() {
        let (tmp, cache) = make_cache(None);
        let path = cache
            .try_store(&key("ruleA"), &artifact(tmp.path(), "a", b"x"))
            .unwrap();
        assert_eq!(path, cache.entry_path(&key("ruleA")));
        assert_eq!(path, cache.root().join("ruleA"));
    }

    #[test]
    fn test_fetch_overwrites_existing_destination_on_hit() {
        let (tmp, cache) = make_cache(None);
        cache.store(&key("k"), &artifact(tmp.path(), "src", b"cached"));
        let dest = artifact(tmp.path(), "dest", b"stale contents that are longer");

        assert!(cache.fetch(&key("k"), &dest).is_hit());
        assert_eq!(fs::read(&dest).unwrap(), b"cached");
    }

    #[test]
    fn test_fetch_leaves_no_temp_files_next_to_destination() {
        let (tmp, cache) = make_cache(None);
        cache.store(&key("k"), &artifact(tmp.path(), "src", b"cached"));
        let out_dir = tmp.path().join("out");

        assert!(cache.fetch(&key("k"), &out_dir.join("file")).is_hit());
        let names: Vec<_> = fs::read_dir(&out_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("file")]);
    }

    #[test]
    fn test_fetch_to_longest_destination_name_hits() {
        let (tmp, cache) = make_cache(None);
        cache.store(&key("ruleA"), &artifact(tmp.path(), "src", b"cached"));

        let dest = tmp.path().join("d".repeat(250));
        assert_eq!(cache.try_fetch(&key("ruleA"), &dest).unwrap(), CacheResult::Hit);
        assert_eq!(fs::read(&dest).unwrap(), b"cached");
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_survive_store_and_fetch() {
        use std::os::unix::fs::PermissionsExt;

        let (tmp, cache) = make_cache(None);
        let src = artifact(tmp.path(), "tool", b"#!/bin/sh\n");
        fs::set_permissions(&src, fs::Permissions::from_mode(0o755)).unwrap();

        cache.store(&key("tool"), &src);
        let dest = tmp.path().join("restored");
        assert!(cache.fetch(&key("tool"), &dest).is_hit());

        let mode = fs::metadata(&dest).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[test]
    fn test_fetch_refreshes_access_time_only() {
        let (tmp, cache) = make_cache(None);
        cache.store(&key("k"), &artifact(tmp.path(), "src", b"data"));

        let entry = cache.entry_path(&key("k"));
        let old = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        File::options()
            .write(true)
            .open(&entry)
            .unwrap()
            .set_times(FileTimes::new().set_accessed(old).set_modified(old))
            .unwrap();

        assert!(cache.fetch(&key("k"), &tmp.path().join("d")).is_hit());

        let meta = fs::metadata(&entry).unwrap();
        assert_eq!(meta.modified().unwrap(), old);
        if let Ok(accessed) = meta.accessed() {
            assert!(accessed > old);
        }
        assert_eq!(fs::read(&entry).unwrap(), b"data");
    }

    #[test]
    fn test_contract_flags() {
        let (_tmp, cache) = make_cache(Some(10));
        assert!(cache.is_store_supported());
        assert_eq!(cache.name(), "dir");
        assert_eq!(cache.max_size_bytes(), Some(10));
        cache.close();
    }

    #[test]
    fn test_notify_build_finished_evicts() {
        let (tmp, cache) = make_cache(Some(15));
        cache.store(&key("a"), &artifact(tmp.path(), "a", &[1; 10]));
        cache.store(&key("b"), &artifact(tmp.path(), "b", &[2; 10]));

        cache.notify_build_finished();
        assert_eq!(root_file_names(&cache).len(), 1);
    }

    #[test]
    fn test_usable_as_trait_object() {
        let (tmp, cache) = make_cache(None);
        let cache: Box<dyn ArtifactCache> = Box::new(cache);
        cache.store(&key("k"), &artifact(tmp.path(), "src", b"via trait"));
        let dest = tmp.path().join("dest");
        assert_eq!(cache.fetch(&key("k"), &dest), CacheResult::Hit);
        assert_eq!(fs::read(dest).unwrap(), b"via trait");
    }
}
