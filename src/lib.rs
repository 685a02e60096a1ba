//! # sourceprep
//!
//! A directive-driven source-preprocessing engine.
//!
//! Templates are plain text annotated with `@` directives. The engine
//! parses them into an instruction tree and interprets it under a scoped
//! context, assembling a single output buffer from literal text, evaluated
//! expressions, macro expansions, and included fragments:
//!
//! - **Includes**: local files, `http(s)://` URLs, and
//!   `github:owner/repo/path[@ref]` shorthand, resolved through a
//!   fingerprint-keyed on-disk cache with exclusion patterns
//! - **Macros**: declared once, expanded by name, inline or as includes
//! - **Conditionals**: `@if` / `@elseif` / `@else` chains
//! - **Line control**: optional `#line N "file"` emission so compilers
//!   report locations in the original sources
//!
//! ## Quick Start
//!
//! ```ignore
//! use sourceprep::EngineBuilder;
//!
//! let mut engine = EngineBuilder::new()
//!     .file("main.src")
//!     .base_dir("templates")
//!     .cache_dir(".cache")
//!     .build();
//!
//! let source = "\
//! @set version '1.2'
//! @echo '// build ' + version
//! @include 'lib/util.src'
//! ";
//! let output = engine.execute(source, None)?;
//! ```
//!
//! ## Directive syntax
//!
//! A line whose first non-whitespace character is `@` is a directive;
//! every other line passes through literally (`@@` escapes a literal `@`).
//! See [`parse::Parser`] for the full syntax and [`expr`] for the
//! expression grammar.
//!
//! ## Module map
//!
//! - [`vm`]: the execution engine, contexts, and the output buffer
//! - [`parse`]: the surface parser and the instruction tree
//! - [`expr`]: scalar values and the expression evaluator
//! - [`resolve`]: readers and the include resolver
//! - [`cache`]: fingerprints, exclusion patterns, and the on-disk cache
//! - [`config`]: runtime configuration (User-Agent, HTTP timeout)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod error;
pub mod expr;
pub mod parse;
pub mod resolve;
pub mod vm;

// =============================================================================
// Prelude - import commonly used items with a single `use`
// =============================================================================

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
///
/// ```ignore
/// use sourceprep::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Context, Engine, EngineBuilder, Error, ExclusionMatcher, FileCache, IncludeResolver,
        Result, Value,
    };
}

// =============================================================================
// Engine
// =============================================================================

pub use error::{Error, Result};
pub use vm::{Context, Engine, EngineBuilder, OutputBuffer, MAX_EXECUTION_DEPTH};

// =============================================================================
// Parsing and evaluation
// =============================================================================

pub use expr::{Value, MacroCall, MacroSignature};
pub use parse::{Conditional, Instruction, Parser};

// =============================================================================
// Resolution and caching
// =============================================================================

pub use cache::{ExclusionMatcher, FileCache, Fingerprint, GithubRef, SourceKind};
pub use config::{Config, ConfigBuilder};
pub use resolve::{IncludeResolver, Reader};
