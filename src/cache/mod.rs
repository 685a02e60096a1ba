//! Reference fingerprinting, exclusion patterns, and the on-disk cache.

mod exclude;
mod fingerprint;
mod store;

pub use exclude::ExclusionMatcher;
pub use fingerprint::{Fingerprint, GithubRef, SourceKind};
pub use store::FileCache;
