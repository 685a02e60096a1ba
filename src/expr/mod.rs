//! Scalar values and the expression evaluator.

mod eval;
mod value;

pub use eval::{evaluate, parse_macro_call, parse_macro_declaration, MacroCall, MacroSignature};
pub use value::Value;
