//! The execution VM: contexts, the output buffer, and the engine.

mod buffer;
mod context;
mod machine;

pub use buffer::OutputBuffer;
pub use context::{Context, FILE_KEY, INLINE_KEY, LINE_KEY, PATH_KEY};
pub use machine::{Engine, EngineBuilder, MAX_EXECUTION_DEPTH};
