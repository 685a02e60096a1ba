//! Reference fingerprinting.
//!
//! A fingerprint maps an include reference (local path, `http(s)://` URL,
//! or `github:owner/repo/path[@ref]` shorthand) to the file name of its
//! cache entry. The mapping is:
//!
//! - **deterministic**: the same reference always yields the same name;
//! - **collision-free in practice**: the name embeds a SHA-256 digest of
//!   the reference, so distinct references get distinct names;
//! - **bounded**: the name stays under 255 bytes no matter how long the
//!   reference is.
//!
//! The name is composed of a scheme tag, a sanitized human-readable prefix
//! (debugging aid only), and the hex digest:
//!
//! ```text
//! github:rust-lang/log/src/lib.rs@0.4
//!   └─> github-rust-lang-log-src-lib.rs-0.4-3f56c0…e2 (72 hex chars elided)
//! ```

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

/// Maximum bytes of the human-readable prefix inside a cache file name.
const PREFIX_MAX_BYTES: usize = 80;

static HTTP_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?:").expect("static pattern"));

// =============================================================================
// SourceKind
// =============================================================================

/// The scheme family a reference belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// `http://` or `https://` URL.
    Http,
    /// `github:owner/repo/path[@ref]` shorthand.
    GitHub,
    /// Anything else: a local filesystem path.
    File,
}

impl SourceKind {
    /// Classify a reference string by scheme.
    pub fn classify(reference: &str) -> Self {
        if HTTP_SCHEME.is_match(reference) {
            SourceKind::Http
        } else if reference.starts_with("github:") {
            SourceKind::GitHub
        } else {
            SourceKind::File
        }
    }

    /// Short tag embedded in cache file names.
    pub fn tag(self) -> &'static str {
        match self {
            SourceKind::Http => "http",
            SourceKind::GitHub => "github",
            SourceKind::File => "file",
        }
    }

    /// Whether the reference's target lives on the network.
    pub fn is_remote(self) -> bool {
        !matches!(self, SourceKind::File)
    }
}

// =============================================================================
// GithubRef
// =============================================================================

/// Parsed `github:owner/repo/path[@ref]` shorthand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubRef {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Path within the repository.
    pub path: String,
    /// Git ref (branch, tag, commit), if given after `@`.
    pub git_ref: Option<String>,
}

impl GithubRef {
    /// Parse the shorthand. Returns `None` when `reference` lacks the
    /// `github:` prefix or an `owner/repo/path` shape.
    pub fn parse(reference: &str) -> Option<Self> {
        let rest = reference.strip_prefix("github:")?;
        let mut parts = rest.splitn(3, '/');
        let owner = parts.next()?;
        let repo = parts.next()?;
        let tail = parts.next()?;
        if owner.is_empty() || repo.is_empty() || tail.is_empty() {
            return None;
        }
        let (path, git_ref) = match tail.rsplit_once('@') {
            Some((path, git_ref)) if !path.is_empty() => (path, Some(git_ref.to_string())),
            _ => (tail, None),
        };
        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path: path.to_string(),
            git_ref,
        })
    }
}

// =============================================================================
// Fingerprint
// =============================================================================

/// The cache identity of a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Scheme family of the reference.
    pub kind: SourceKind,
    /// Cache entry file name, ≤ 255 bytes.
    pub file_name: String,
    /// Human-readable short name for logging (typically the basename).
    pub display: String,
}

impl Fingerprint {
    /// Fingerprint a reference.
    pub fn of(reference: &str) -> Self {
        let kind = SourceKind::classify(reference);
        let digest = hex::encode(digest_for(kind, reference));
        let prefix = sanitize(reference);
        let file_name = if prefix.is_empty() {
            format!("{}-{digest}", kind.tag())
        } else {
            format!("{}-{prefix}-{digest}", kind.tag())
        };
        Self {
            kind,
            file_name,
            display: display_name(kind, reference),
        }
    }
}

/// Digest the reference.
///
/// GitHub references digest their parsed fields with a NUL separator so the
/// ref participates distinctly from the path (`a/b/c.js@a` vs `a/b/c.j@s`).
/// Everything else digests the full reference string, query included.
fn digest_for(kind: SourceKind, reference: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    match (kind, GithubRef::parse(reference)) {
        (SourceKind::GitHub, Some(github)) => {
            hasher.update(b"github\0");
            hasher.update(github.owner.as_bytes());
            hasher.update(b"\0");
            hasher.update(github.repo.as_bytes());
            hasher.update(b"\0");
            hasher.update(github.path.as_bytes());
            hasher.update(b"\0");
            hasher.update(github.git_ref.as_deref().unwrap_or("").as_bytes());
        }
        _ => hasher.update(reference.as_bytes()),
    }
    hasher.finalize().into()
}

/// Sanitized, length-capped prefix: `[A-Za-z0-9._-]` kept, everything else
/// mapped to `-`, runs collapsed.
fn sanitize(reference: &str) -> String {
    let mut out = String::with_capacity(PREFIX_MAX_BYTES);
    let mut last_dash = true;
    for c in reference.chars() {
        let mapped = if c.is_ascii_alphanumeric() || matches!(c, '.' | '_') {
            c
        } else {
            '-'
        };
        if mapped == '-' {
            if last_dash {
                continue;
            }
            last_dash = true;
        } else {
            last_dash = false;
        }
        out.push(mapped);
        if out.len() >= PREFIX_MAX_BYTES {
            break;
        }
    }
    out.trim_matches('-').to_string()
}

fn display_name(kind: SourceKind, reference: &str) -> String {
    let path = match kind {
        SourceKind::GitHub => GithubRef::parse(reference)
            .map(|github| github.path)
            .unwrap_or_else(|| reference.to_string()),
        SourceKind::Http => {
            let no_fragment = reference.split('#').next().unwrap_or(reference);
            no_fragment.split('?').next().unwrap_or(no_fragment).to_string()
        }
        SourceKind::File => reference.to_string(),
    };
    let base = path.rsplit('/').next().unwrap_or("");
    if base.is_empty() {
        sanitize(reference)
    } else {
        base.to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(SourceKind::classify("https://x/a.js"), SourceKind::Http);
        assert_eq!(SourceKind::classify("HTTP://x/a.js"), SourceKind::Http);
        assert_eq!(SourceKind::classify("github:a/b/c.js"), SourceKind::GitHub);
        assert_eq!(SourceKind::classify("lib/util.src"), SourceKind::File);
        assert_eq!(SourceKind::classify("githubby.txt"), SourceKind::File);
    }

    #[test]
    fn test_github_parse() {
        let parsed = GithubRef::parse("github:rust-lang/log/src/lib.rs@0.4").unwrap();
        assert_eq!(parsed.owner, "rust-lang");
        assert_eq!(parsed.repo, "log");
        assert_eq!(parsed.path, "src/lib.rs");
        assert_eq!(parsed.git_ref.as_deref(), Some("0.4"));

        let bare = GithubRef::parse("github:a/b/c/js").unwrap();
        assert_eq!(bare.path, "c/js");
        assert_eq!(bare.git_ref, None);

        assert!(GithubRef::parse("github:a/b").is_none());
        assert!(GithubRef::parse("https://github.com/a/b").is_none());
    }

    #[test]
    fn test_deterministic() {
        let a = Fingerprint::of("github:a/b/c.js");
        let b = Fingerprint::of("github:a/b/c.js");
        assert_eq!(a, b);
    }

    #[test]
    fn test_github_references_pairwise_distinct() {
        let references = [
            "github:a/b/c.js",
            "github:b/a/c.js",
            "github:a/b/c.js@a",
            "github:a/b/c.j@s",
            "github:a/b/a-b-c.js",
            "github:a/b-c_js/c.js",
            "github:a/b/c_js.js",
            "github:a/b/c/js",
        ];
        assert_pairwise_distinct(&references);
    }

    #[test]
    fn test_urls_pairwise_distinct() {
        let references = [
            "https://example.com/a.js",
            "http://example.com/a.js",
            "https://example.com/a.js?x=1",
            "https://example.com/a.js?x=2",
            "https://example.com/a.js?x=1&y=2",
            "https://example.com/b/a.js",
            "https://example.com/b-a.js",
            "https://example.org/a.js",
            "https://example.com/a.js#frag",
            "https://example.com:8080/a.js",
            "https://example.com/A.js",
            "https://example.com/a.js/",
            "https://example.com/a_js",
        ];
        assert_pairwise_distinct(&references);
    }

    fn assert_pairwise_distinct(references: &[&str]) {
        for (i, a) in references.iter().enumerate() {
            for b in &references[i + 1..] {
                assert_ne!(
                    Fingerprint::of(a).file_name,
                    Fingerprint::of(b).file_name,
                    "{a:?} vs {b:?}"
                );
            }
        }
    }

    #[test]
    fn test_long_reference_bounded() {
        let long = format!("https://example.com/{}.js", "x".repeat(400));
        assert!(long.len() > 256);
        let fingerprint = Fingerprint::of(&long);
        assert!(fingerprint.file_name.len() < 256, "{}", fingerprint.file_name.len());
    }

    #[test]
    fn test_file_name_charset() {
        let fingerprint = Fingerprint::of("https://example.com/a b/ü.js?q=1");
        assert!(fingerprint
            .file_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(Fingerprint::of("github:a/b/c.js@v1").display, "c.js");
        assert_eq!(Fingerprint::of("https://x.com/p/a.js?q=1").display, "a.js");
        assert_eq!(Fingerprint::of("lib/util.src").display, "util.src");
    }
}
