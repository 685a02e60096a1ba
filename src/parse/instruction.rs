//! The instruction tree.

/// One preprocessing instruction.
///
/// The VM dispatches on this sum type with exhaustive matching, so an
/// unhandled variant is a compile-time error rather than a runtime one.
/// Every variant carries the 1-based source line it was parsed from, for
/// diagnostics and `#line` emission.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Assign an evaluated expression into the VM globals.
    Set {
        /// Target variable name.
        variable: String,
        /// Expression text, evaluated at execution time.
        value: String,
        /// Source line.
        line: usize,
    },
    /// Append to the output buffer.
    Output {
        /// Literal text when `computed`, expression text otherwise.
        value: String,
        /// `true` for literal source lines; `false` for `@echo` operands
        /// that still need evaluation (or macro expansion).
        computed: bool,
        /// Source line.
        line: usize,
    },
    /// Include another source, or expand a macro by name.
    Include {
        /// Expression yielding a reference string, or a macro call.
        value: String,
        /// Source line.
        line: usize,
    },
    /// Branching.
    Conditional(Conditional),
    /// Declare a macro.
    Macro {
        /// Declaration text, e.g. `greet(name)`.
        declaration: String,
        /// Instructions expanded on invocation.
        body: Vec<Instruction>,
        /// Source line.
        line: usize,
    },
    /// Abort execution with an evaluated message.
    Error {
        /// Expression yielding the message.
        value: String,
        /// Source line.
        line: usize,
    },
}

impl Instruction {
    /// Source line this instruction was parsed from.
    pub fn line(&self) -> usize {
        match self {
            Instruction::Set { line, .. }
            | Instruction::Output { line, .. }
            | Instruction::Include { line, .. }
            | Instruction::Macro { line, .. }
            | Instruction::Error { line, .. } => *line,
            Instruction::Conditional(conditional) => conditional.line,
        }
    }
}

/// A conditional: an `@if` arm plus its `@elseif` chain and optional
/// `@else` arm.
///
/// Each `@elseif` is itself a `Conditional` with empty `elseifs` and no
/// `alternate`; executing one reports the truthiness of its own test so the
/// owning chain can stop at the first match.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    /// Test expression text.
    pub test: String,
    /// Instructions executed when the test is truthy.
    pub consequent: Vec<Instruction>,
    /// `@elseif` arms, in source order.
    pub elseifs: Vec<Conditional>,
    /// `@else` arm, if present.
    pub alternate: Option<Vec<Instruction>>,
    /// Source line of the owning directive.
    pub line: usize,
}
