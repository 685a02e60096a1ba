//! Include resolution: reference string → body bytes, through the cache.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::cache::{FileCache, SourceKind};
use crate::error::{Error, Result};

use super::reader::Reader;

/// References naming a git repository are rejected outright.
static GIT_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.git\b").expect("static pattern"));

/// Resolves include references to their bodies.
///
/// Classification order: `http(s):` URLs go to the HTTP reader; anything
/// else naming `.git` is a hard error; `github:` shorthand goes to the
/// GitHub reader; the rest is read as a local file.
///
/// Remote bodies are served read-through from the [`FileCache`] when
/// `use_cache` is on and the reference is not excluded; local files are
/// never stored (readers are cheap, and the working tree is the source of
/// truth).
#[derive(Debug)]
pub struct IncludeResolver {
    cache: FileCache,
    use_cache: bool,
    file_reader: Reader,
    http_reader: Reader,
    github_reader: Reader,
}

impl IncludeResolver {
    /// Create a resolver; relative local references resolve against
    /// `base_dir`.
    pub fn new(cache: FileCache, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache,
            use_cache: true,
            file_reader: Reader::File {
                base_dir: base_dir.into(),
            },
            http_reader: Reader::Http,
            github_reader: Reader::GitHub,
        }
    }

    /// Enable or disable cache consultation and population.
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// The underlying cache.
    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    #[cfg(test)]
    pub(crate) fn with_http_reader(mut self, reader: Reader) -> Self {
        self.http_reader = reader;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_github_reader(mut self, reader: Reader) -> Self {
        self.github_reader = reader;
        self
    }

    /// Resolve `reference` to its body.
    pub fn resolve(&self, reference: &str) -> Result<Vec<u8>> {
        let kind = SourceKind::classify(reference);
        if kind != SourceKind::Http && GIT_REFERENCE.is_match(reference) {
            return Err(Error::UnsupportedScheme(reference.to_string()));
        }

        let cacheable = self.use_cache && !self.cache.is_excluded(reference);
        if cacheable {
            if let Some(body) = self.cache.find(reference)? {
                return Ok(body);
            }
        }

        let reader = match kind {
            SourceKind::Http => &self.http_reader,
            SourceKind::GitHub => &self.github_reader,
            SourceKind::File => &self.file_reader,
        };
        let body = reader.read(reference)?;

        if cacheable && kind.is_remote() {
            self.cache.store(reference, &body)?;
        }
        Ok(body)
    }
}
