//! Readers: the capability set that fetches reference bodies.

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use log::{info, warn};

use crate::cache::GithubRef;
use crate::config;
use crate::error::{Error, Result};

/// Bodies larger than this are rejected rather than buffered.
const MAX_FETCH_BYTES: u64 = 8 * 1024 * 1024;

/// Attempts per HTTP fetch; transient failures are retried with backoff.
const FETCH_ATTEMPTS: usize = 3;

/// A reader fetches the raw bytes behind one scheme family.
///
/// Selection happens by scheme in the resolver, not by dynamic dispatch;
/// the closed set keeps "which I/O can an include perform" auditable.
#[derive(Debug, Clone)]
pub enum Reader {
    /// Local filesystem, resolved against a base directory.
    File {
        /// Directory relative references resolve against.
        base_dir: PathBuf,
    },
    /// Plain `http(s)://` GET.
    Http,
    /// `github:` shorthand, rewritten to a raw.githubusercontent.com URL
    /// and fetched over HTTP.
    GitHub,
    /// Canned responses for tests; no I/O.
    #[cfg(test)]
    Fixed(rustc_hash::FxHashMap<String, Vec<u8>>),
}

impl Reader {
    /// Fetch the body behind `reference`.
    pub fn read(&self, reference: &str) -> Result<Vec<u8>> {
        match self {
            Reader::File { base_dir } => read_local(base_dir, reference),
            Reader::Http => fetch(reference),
            Reader::GitHub => fetch(&github_raw_url(reference)?),
            #[cfg(test)]
            Reader::Fixed(bodies) => bodies.get(reference).cloned().ok_or_else(|| {
                Error::source_reading(format!("no fixed body for {reference:?}"))
            }),
        }
    }
}

/// Rewrite `github:owner/repo/path[@ref]` to its raw-content URL.
///
/// A missing ref fetches `master`.
fn github_raw_url(reference: &str) -> Result<String> {
    let github = GithubRef::parse(reference).ok_or_else(|| {
        Error::source_reading(format!("malformed github reference {reference:?}"))
    })?;
    let git_ref = github.git_ref.as_deref().unwrap_or("master");
    Ok(format!(
        "https://raw.githubusercontent.com/{}/{}/{}/{}",
        github.owner, github.repo, git_ref, github.path
    ))
}

fn read_local(base_dir: &std::path::Path, reference: &str) -> Result<Vec<u8>> {
    let path = if std::path::Path::new(reference).is_absolute() {
        PathBuf::from(reference)
    } else {
        base_dir.join(reference)
    };
    let map_err =
        |e: std::io::Error| Error::source_reading(format!("cannot read {}: {e}", path.display()));
    let metadata = std::fs::metadata(&path).map_err(map_err)?;
    if metadata.is_dir() {
        return Err(Error::source_reading(format!(
            "cannot read {}: is a directory",
            path.display()
        )));
    }
    std::fs::read(&path).map_err(map_err)
}

fn fetch(url: &str) -> Result<Vec<u8>> {
    let config = config::get();
    info!("fetching {url}");
    for attempt in 1..=FETCH_ATTEMPTS {
        let request = ureq::get(url)
            .timeout(config.http_timeout)
            .set("User-Agent", &config.user_agent);
        match request.call() {
            Ok(response) => return read_response(url, response),
            Err(ureq::Error::Status(status, _)) => {
                if status >= 500 && attempt < FETCH_ATTEMPTS {
                    warn!("fetching {url}: status {status}, retrying");
                    std::thread::sleep(Duration::from_millis(150 * attempt as u64));
                    continue;
                }
                return Err(Error::source_reading(format!(
                    "fetching {url} returned status {status}"
                )));
            }
            Err(e) => {
                if attempt < FETCH_ATTEMPTS {
                    warn!("fetching {url}: {e}, retrying");
                    std::thread::sleep(Duration::from_millis(150 * attempt as u64));
                    continue;
                }
                return Err(Error::source_reading(format!("failed to fetch {url}: {e}")));
            }
        }
    }
    Err(Error::source_reading(format!(
        "failed to fetch {url}: exhausted retries"
    )))
}

fn read_response(url: &str, response: ureq::Response) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_FETCH_BYTES + 1)
        .read_to_end(&mut body)
        .map_err(|e| Error::source_reading(format!("reading response from {url}: {e}")))?;
    if body.len() as u64 > MAX_FETCH_BYTES {
        return Err(Error::source_reading(format!(
            "fetching {url}: response exceeds {MAX_FETCH_BYTES} bytes"
        )));
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_local_relative() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "content").unwrap();

        let reader = Reader::File {
            base_dir: dir.path().to_path_buf(),
        };
        assert_eq!(reader.read("a.txt").unwrap(), b"content");
    }

    #[test]
    fn test_read_local_missing() {
        let dir = TempDir::new().unwrap();
        let reader = Reader::File {
            base_dir: dir.path().to_path_buf(),
        };
        let err = reader.read("missing.txt").unwrap_err();
        assert!(matches!(err, Error::SourceReading(_)));
    }

    #[test]
    fn test_read_local_directory() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let reader = Reader::File {
            base_dir: dir.path().to_path_buf(),
        };
        let err = reader.read("sub").unwrap_err();
        assert!(err.to_string().contains("directory"));
    }

    #[test]
    fn test_github_raw_url() {
        assert_eq!(
            github_raw_url("github:rust-lang/log/src/lib.rs@0.4").unwrap(),
            "https://raw.githubusercontent.com/rust-lang/log/0.4/src/lib.rs"
        );
        assert_eq!(
            github_raw_url("github:a/b/c.js").unwrap(),
            "https://raw.githubusercontent.com/a/b/master/c.js"
        );
        assert!(github_raw_url("github:a/b").is_err());
    }

    #[test]
    fn test_fixed_reader() {
        let mut bodies = rustc_hash::FxHashMap::default();
        bodies.insert("https://x/a.js".to_string(), b"body".to_vec());
        let reader = Reader::Fixed(bodies);
        assert_eq!(reader.read("https://x/a.js").unwrap(), b"body");
        assert!(reader.read("https://x/b.js").is_err());
    }
}
