//! Exclusion patterns: which references may be cached.

use std::path::Path;

use regex::Regex;

use crate::error::{Error, Result};

/// An ordered list of regex patterns loaded from an exclusion manifest.
///
/// The manifest is UTF-8 text, one pattern per line. Lines starting with
/// `#` are comments; blank lines are skipped. Patterns are plain regex
/// semantics: unanchored unless the pattern anchors itself.
///
/// ```text
/// # never cache the api host
/// ^https://api\.internal/
/// \.generated\.js$
/// ```
#[derive(Debug, Default)]
pub struct ExclusionMatcher {
    patterns: Vec<Regex>,
}

impl ExclusionMatcher {
    /// A matcher that excludes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a manifest. Malformed patterns fail with
    /// [`Error::InvalidExclusionPattern`].
    pub fn from_manifest(text: &str) -> Result<Self> {
        let mut patterns = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let regex = Regex::new(line).map_err(|source| Error::InvalidExclusionPattern {
                pattern: line.to_string(),
                source,
            })?;
            patterns.push(regex);
        }
        Ok(Self { patterns })
    }

    /// Load a manifest from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_manifest(&text)
    }

    /// Whether any pattern matches `reference`.
    pub fn is_excluded(&self, reference: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(reference))
    }

    /// Number of loaded patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether no patterns are loaded.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
