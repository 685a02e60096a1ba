//! Crate error type.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for preprocessing failures.
///
/// This provides structured access to failures for programmatic handling,
/// while also implementing `Display` for human-readable output.
///
/// # Example
///
/// ```ignore
/// match engine.execute(source, None) {
///     Ok(output) => { /* success */ }
///     Err(Error::UserDefined(message)) => {
///         eprintln!("template aborted: {message}");
///     }
///     Err(Error::MaxExecutionDepthReached { location, .. }) => {
///         eprintln!("runaway recursion at {location}");
///     }
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
#[derive(Debug, Error)]
pub enum Error {
    /// Raised by an `@error` directive; the message is the evaluated expression.
    #[error("{0}")]
    UserDefined(String),

    /// A macro was declared twice within a single execution.
    #[error("macro {name:?} is already declared at {first}; redeclared at {second}")]
    MacroAlreadyDeclared {
        /// Macro name.
        name: String,
        /// `file:line` of the original declaration.
        first: String,
        /// `file:line` of the redeclaration.
        second: String,
    },

    /// Expression evaluation failed.
    ///
    /// When raised inside the VM the message carries a `(file:line)` suffix.
    #[error("{0}")]
    Expression(String),

    /// A reader failed to fetch a reference.
    #[error("{0}")]
    SourceReading(String),

    /// A reader failure observed while executing an `@include`; the message
    /// carries a `(file:line)` suffix.
    #[error("{0}")]
    SourceInclusion(String),

    /// The execution-depth bound was hit.
    #[error("maximum execution depth ({limit}) reached ({location})")]
    MaxExecutionDepthReached {
        /// The configured bound.
        limit: usize,
        /// `file:line` of the recursion site.
        location: String,
    },

    /// A reference with a scheme the engine refuses to resolve.
    #[error("GIT sources are not supported: {0:?}")]
    UnsupportedScheme(String),

    /// The surface parser rejected the input.
    #[error("{0}")]
    Parse(String),

    /// An exclusion manifest contained a malformed pattern.
    #[error("invalid exclusion pattern {pattern:?}: {source}")]
    InvalidExclusionPattern {
        /// The offending manifest line.
        pattern: String,
        /// The underlying regex error.
        source: regex::Error,
    },

    /// File I/O error outside the reader boundary (cache maintenance).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an expression error.
    pub fn expression(message: impl Into<String>) -> Self {
        Self::Expression(message.into())
    }

    /// Create a reader error.
    pub fn source_reading(message: impl Into<String>) -> Self {
        Self::SourceReading(message.into())
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Enrich this error with the source location of the instruction that
    /// observed it.
    ///
    /// Expression failures keep their kind and gain a `(file:line)` suffix;
    /// reader failures are lifted into [`Error::SourceInclusion`] with the
    /// same suffix. Every other kind propagates unchanged.
    pub(crate) fn at(self, location: &str) -> Self {
        match self {
            Self::Expression(message) => Self::Expression(format!("{message} ({location})")),
            Self::SourceReading(message) => {
                Self::SourceInclusion(format!("{message} ({location})"))
            }
            other => other,
        }
    }

    /// Whether this error was raised by an `@error` directive.
    pub fn is_user_defined(&self) -> bool {
        matches!(self, Self::UserDefined(_))
    }
}
