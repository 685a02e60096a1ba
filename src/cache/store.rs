//! On-disk cache of fetched reference bodies.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::NamedTempFile;

use crate::error::Result;

use super::exclude::ExclusionMatcher;
use super::fingerprint::Fingerprint;

/// A directory of cache entries keyed by reference fingerprint.
///
/// One file per reference; the file body is the raw fetched bytes, with no
/// metadata sidecar. Entries persist across engine invocations and are
/// removed only by [`FileCache::clear`].
///
/// Stores are atomic whole-file replacements (temp file in the cache
/// directory, then rename), so a crashed writer never leaves a partial
/// entry behind. Concurrent writers are not otherwise coordinated; the
/// cache assumes single-writer usage per directory.
#[derive(Debug, Default)]
pub struct FileCache {
    dir: PathBuf,
    matcher: ExclusionMatcher,
}

impl FileCache {
    /// Create a cache over `dir` that excludes nothing.
    ///
    /// The directory is created lazily on the first store.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            matcher: ExclusionMatcher::new(),
        }
    }

    /// Create a cache over `dir` with an exclusion matcher.
    pub fn with_matcher(dir: impl Into<PathBuf>, matcher: ExclusionMatcher) -> Self {
        Self {
            dir: dir.into(),
            matcher,
        }
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The on-disk path a reference would be stored at, without touching
    /// the filesystem.
    pub fn cached_path(&self, reference: &str) -> PathBuf {
        self.dir.join(Fingerprint::of(reference).file_name)
    }

    /// Whether the exclusion patterns forbid caching `reference`.
    pub fn is_excluded(&self, reference: &str) -> bool {
        self.matcher.is_excluded(reference)
    }

    /// Return the cached body for `reference`, or `None` when no entry
    /// exists.
    pub fn find(&self, reference: &str) -> Result<Option<Vec<u8>>> {
        let path = self.cached_path(reference);
        match std::fs::read(&path) {
            Ok(body) => {
                debug!("cache hit for {reference:?} ({} bytes)", body.len());
                Ok(Some(body))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("cache miss for {reference:?}");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Store `body` as the cache entry for `reference`.
    ///
    /// Creates the cache directory if needed and replaces any existing
    /// entry atomically.
    pub fn store(&self, reference: &str, body: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut staged = NamedTempFile::new_in(&self.dir)?;
        staged.write_all(body)?;
        let path = self.cached_path(reference);
        staged.persist(&path).map_err(|e| e.error)?;
        debug!("cached {reference:?} at {} ({} bytes)", path.display(), body.len());
        Ok(())
    }

    /// Remove the cache directory and everything in it.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_then_find() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path().join("cache"));

        cache.store("github:a/b/c.js", b"body").unwrap();
        assert_eq!(cache.find("github:a/b/c.js").unwrap().unwrap(), b"body");
    }

    #[test]
    fn test_find_without_entry() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path());
        assert!(cache.find("https://example.com/a.js").unwrap().is_none());
    }

    #[test]
    fn test_store_replaces() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path());

        cache.store("r", b"one").unwrap();
        cache.store("r", b"two").unwrap();
        assert_eq!(cache.find("r").unwrap().unwrap(), b"two");
    }

    #[test]
    fn test_clear_removes_entries() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path().join("cache"));

        cache.store("r", b"body").unwrap();
        cache.clear().unwrap();
        assert!(cache.find("r").unwrap().is_none());

        // Clearing an absent directory is fine.
        cache.clear().unwrap();
    }

    #[test]
    fn test_cached_path_stays_inside_dir() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path());
        let path = cache.cached_path("../../etc/passwd");
        assert!(path.starts_with(dir.path()));
    }

    #[test]
    fn test_exclusion_delegation() {
        let matcher = ExclusionMatcher::from_manifest("^github:\n").unwrap();
        let dir = TempDir::new().unwrap();
        let cache = FileCache::with_matcher(dir.path(), matcher);
        assert!(cache.is_excluded("github:a/b/c.js"));
        assert!(!cache.is_excluded("https://x/a.js"));
    }
}
