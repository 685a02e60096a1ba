//! The surface parser: directive-annotated text → instruction tree.
//!
//! The syntax is line-oriented. A line whose first non-whitespace character
//! is `@` is a directive; every other line is literal output. A line
//! starting with `@@` escapes to a literal line with a single `@`.
//!
//! ```text
//! @set NAME EXPR          assign into the globals
//! @echo EXPR              append an evaluated expression (or expand a macro)
//! @include EXPR           include a reference (or expand a macro)
//! @if EXPR … @elseif EXPR … @else … @endif
//! @macro NAME(ARGS) … @endmacro
//! @error EXPR             abort with an evaluated message
//! ```

use crate::error::{Error, Result};

use super::instruction::{Conditional, Instruction};

/// Parses directive-annotated source into an instruction tree.
///
/// The `file` attribute names the source in parse errors; the VM sets it
/// before each nested parse so errors from included content report the
/// correct origin.
#[derive(Debug, Clone)]
pub struct Parser {
    /// Name of the source being parsed, for diagnostics.
    pub file: String,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new("<source>")
    }
}

impl Parser {
    /// Create a parser reporting errors against `file`.
    pub fn new(file: impl Into<String>) -> Self {
        Self { file: file.into() }
    }

    /// Parse `source` into an instruction tree.
    pub fn parse(&self, source: &str) -> Result<Vec<Instruction>> {
        let mut state = ParseState::default();

        let mut lines: Vec<&str> = source.split('\n').collect();
        let ends_with_newline = source.ends_with('\n');
        if ends_with_newline {
            lines.pop();
        }
        let last = lines.len();

        for (index, raw) in lines.iter().enumerate() {
            let line_no = index + 1;
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            let trimmed = line.trim_start();

            let terminated = line_no < last || ends_with_newline;
            if let Some(escaped) = trimmed.strip_prefix("@@") {
                let indent = &line[..line.len() - trimmed.len()];
                self.push_literal(&mut state, format!("{indent}@{escaped}"), line_no, terminated);
            } else if let Some(directive) = trimmed.strip_prefix('@') {
                self.parse_directive(&mut state, directive, line_no)?;
            } else {
                self.push_literal(&mut state, line.to_string(), line_no, terminated);
            }
        }

        if let Some(frame) = state.stack.last() {
            let (what, line) = match frame {
                Frame::If { line, .. } => ("@if", *line),
                Frame::Macro { line, .. } => ("@macro", *line),
            };
            return Err(self.error(line, format!("unterminated {what}")));
        }
        Ok(state.root)
    }

    fn push_literal(&self, state: &mut ParseState, text: String, line: usize, terminated: bool) {
        let value = if terminated { format!("{text}\n") } else { text };
        if value.is_empty() {
            return;
        }
        state.push(Instruction::Output {
            value,
            computed: true,
            line,
        });
    }

    fn parse_directive(&self, state: &mut ParseState, directive: &str, line: usize) -> Result<()> {
        let word: String = directive
            .chars()
            .take_while(char::is_ascii_alphabetic)
            .collect();
        let rest = directive[word.len()..].trim();

        match word.as_str() {
            "set" => {
                let (variable, value) = self.parse_set_operand(rest, line)?;
                state.push(Instruction::Set {
                    variable,
                    value,
                    line,
                });
            }
            "echo" => {
                let value = self.require_operand(rest, "@echo", line)?;
                state.push(Instruction::Output {
                    value,
                    computed: false,
                    line,
                });
            }
            "include" => {
                let value = self.require_operand(rest, "@include", line)?;
                state.push(Instruction::Include { value, line });
            }
            "error" => {
                let value = self.require_operand(rest, "@error", line)?;
                state.push(Instruction::Error { value, line });
            }
            "if" => {
                let test = self.require_operand(rest, "@if", line)?;
                state.stack.push(Frame::If {
                    line,
                    branches: vec![Branch::new(Some(test), line)],
                    has_else: false,
                });
            }
            "elseif" => {
                let test = self.require_operand(rest, "@elseif", line)?;
                match state.stack.last_mut() {
                    Some(Frame::If {
                        branches,
                        has_else: false,
                        ..
                    }) => branches.push(Branch::new(Some(test), line)),
                    Some(Frame::If { has_else: true, .. }) => {
                        return Err(self.error(line, "@elseif after @else"));
                    }
                    _ => return Err(self.error(line, "@elseif without matching @if")),
                }
            }
            "else" => {
                self.require_bare(rest, "@else", line)?;
                match state.stack.last_mut() {
                    Some(Frame::If {
                        branches,
                        has_else,
                        ..
                    }) if !*has_else => {
                        *has_else = true;
                        branches.push(Branch::new(None, line));
                    }
                    Some(Frame::If { .. }) => {
                        return Err(self.error(line, "duplicate @else"));
                    }
                    _ => return Err(self.error(line, "@else without matching @if")),
                }
            }
            "endif" => {
                self.require_bare(rest, "@endif", line)?;
                match state.stack.pop() {
                    Some(Frame::If { line, branches, .. }) => {
                        let conditional = fold_branches(line, branches);
                        state.push(Instruction::Conditional(conditional));
                    }
                    other => {
                        // Put a macro frame back before failing.
                        if let Some(frame) = other {
                            state.stack.push(frame);
                        }
                        return Err(self.error(line, "@endif without matching @if"));
                    }
                }
            }
            "macro" => {
                let declaration = self.require_operand(rest, "@macro", line)?;
                state.stack.push(Frame::Macro {
                    declaration,
                    line,
                    body: Vec::new(),
                });
            }
            "endmacro" => {
                self.require_bare(rest, "@endmacro", line)?;
                match state.stack.pop() {
                    Some(Frame::Macro {
                        declaration,
                        line,
                        body,
                    }) => {
                        state.push(Instruction::Macro {
                            declaration,
                            body,
                            line,
                        });
                    }
                    other => {
                        if let Some(frame) = other {
                            state.stack.push(frame);
                        }
                        return Err(self.error(line, "@endmacro without matching @macro"));
                    }
                }
            }
            _ => {
                return Err(self.error(
                    line,
                    format!("unknown directive \"@{word}\" (escape literal text with @@)"),
                ));
            }
        }
        Ok(())
    }

    fn parse_set_operand(&self, rest: &str, line: usize) -> Result<(String, String)> {
        let name_len = rest
            .char_indices()
            .take_while(|(i, c)| {
                if *i == 0 {
                    c.is_ascii_alphabetic() || *c == '_'
                } else {
                    c.is_ascii_alphanumeric() || *c == '_'
                }
            })
            .count();
        if name_len == 0 {
            return Err(self.error(line, "@set expects a variable name"));
        }
        let variable = rest[..name_len].to_string();
        let mut value = rest[name_len..].trim_start();
        if let Some(stripped) = value.strip_prefix('=') {
            value = stripped.trim_start();
        }
        if value.is_empty() {
            return Err(self.error(line, format!("@set {variable} expects an expression")));
        }
        Ok((variable, value.to_string()))
    }

    fn require_operand(&self, rest: &str, directive: &str, line: usize) -> Result<String> {
        if rest.is_empty() {
            return Err(self.error(line, format!("{directive} expects an operand")));
        }
        Ok(rest.to_string())
    }

    fn require_bare(&self, rest: &str, directive: &str, line: usize) -> Result<()> {
        if rest.is_empty() {
            Ok(())
        } else {
            Err(self.error(line, format!("{directive} takes no operand")))
        }
    }

    fn error(&self, line: usize, message: impl std::fmt::Display) -> Error {
        Error::parse(format!("{message} ({}:{line})", self.file))
    }
}

// =============================================================================
// Parse state
// =============================================================================

#[derive(Default)]
struct ParseState {
    root: Vec<Instruction>,
    stack: Vec<Frame>,
}

impl ParseState {
    fn push(&mut self, instruction: Instruction) {
        match self.stack.last_mut() {
            None => self.root.push(instruction),
            Some(Frame::If { branches, .. }) => {
                branches
                    .last_mut()
                    .expect("if frame has at least one branch")
                    .body
                    .push(instruction);
            }
            Some(Frame::Macro { body, .. }) => body.push(instruction),
        }
    }
}

enum Frame {
    If {
        line: usize,
        branches: Vec<Branch>,
        has_else: bool,
    },
    Macro {
        declaration: String,
        line: usize,
        body: Vec<Instruction>,
    },
}

struct Branch {
    test: Option<String>,
    line: usize,
    body: Vec<Instruction>,
}

impl Branch {
    fn new(test: Option<String>, line: usize) -> Self {
        Self {
            test,
            line,
            body: Vec::new(),
        }
    }
}

fn fold_branches(line: usize, branches: Vec<Branch>) -> Conditional {
    let mut iter = branches.into_iter();
    let first = iter.next().expect("if frame has at least one branch");
    let mut elseifs = Vec::new();
    let mut alternate = None;
    for branch in iter {
        match branch.test {
            Some(test) => elseifs.push(Conditional {
                test,
                consequent: branch.body,
                elseifs: Vec::new(),
                alternate: None,
                line: branch.line,
            }),
            None => alternate = Some(branch.body),
        }
    }
    Conditional {
        test: first.test.expect("first branch carries the @if test"),
        consequent: first.body,
        elseifs,
        alternate,
        line,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Vec<Instruction> {
        Parser::new("test.src").parse(source).unwrap()
    }

    #[test]
    fn test_literal_lines() {
        let tree = parse("one\ntwo\n");
        assert_eq!(
            tree,
            vec![
                Instruction::Output {
                    value: "one\n".into(),
                    computed: true,
                    line: 1
                },
                Instruction::Output {
                    value: "two\n".into(),
                    computed: true,
                    line: 2
                },
            ]
        );
    }

    #[test]
    fn test_final_line_without_newline() {
        let tree = parse("one\ntwo");
        assert_eq!(
            tree.last(),
            Some(&Instruction::Output {
                value: "two".into(),
                computed: true,
                line: 2
            })
        );
    }

    #[test]
    fn test_crlf_normalized() {
        let tree = parse("one\r\ntwo\r\n");
        assert_eq!(
            tree[0],
            Instruction::Output {
                value: "one\n".into(),
                computed: true,
                line: 1
            }
        );
    }

    #[test]
    fn test_escape() {
        let tree = parse("  @@media print\n");
        assert_eq!(
            tree,
            vec![Instruction::Output {
                value: "  @media print\n".into(),
                computed: true,
                line: 1
            }]
        );
    }

    #[test]
    fn test_set_directive() {
        assert_eq!(
            parse("@set version '1.2'\n"),
            vec![Instruction::Set {
                variable: "version".into(),
                value: "'1.2'".into(),
                line: 1
            }]
        );
        // Optional equals sign.
        assert_eq!(
            parse("@set n = 3\n"),
            vec![Instruction::Set {
                variable: "n".into(),
                value: "3".into(),
                line: 1
            }]
        );
    }

    #[test]
    fn test_echo_include_error() {
        let tree = parse("@echo version\n@include 'lib.src'\n@error 'nope'\n");
        assert_eq!(
            tree,
            vec![
                Instruction::Output {
                    value: "version".into(),
                    computed: false,
                    line: 1
                },
                Instruction::Include {
                    value: "'lib.src'".into(),
                    line: 2
                },
                Instruction::Error {
                    value: "'nope'".into(),
                    line: 3
                },
            ]
        );
    }

    #[test]
    fn test_conditional_chain() {
        let tree = parse("@if a\nA\n@elseif b\nB\n@elseif c\nC\n@else\nD\n@endif\n");
        let Instruction::Conditional(conditional) = &tree[0] else {
            panic!("expected conditional, got {:?}", tree[0]);
        };
        assert_eq!(conditional.test, "a");
        assert_eq!(conditional.line, 1);
        assert_eq!(conditional.consequent.len(), 1);
        assert_eq!(conditional.elseifs.len(), 2);
        assert_eq!(conditional.elseifs[0].test, "b");
        assert_eq!(conditional.elseifs[1].test, "c");
        assert_eq!(conditional.alternate.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_nested_blocks() {
        let tree = parse("@macro m(x)\n@if x\nyes\n@endif\n@endmacro\n");
        let Instruction::Macro { declaration, body, .. } = &tree[0] else {
            panic!("expected macro, got {:?}", tree[0]);
        };
        assert_eq!(declaration, "m(x)");
        assert!(matches!(body[0], Instruction::Conditional(_)));
    }

    #[test]
    fn test_line_numbers_survive_nesting() {
        let tree = parse("top\n@if a\ninner\n@endif\ntail\n");
        assert_eq!(tree[0].line(), 1);
        let Instruction::Conditional(conditional) = &tree[1] else {
            panic!();
        };
        assert_eq!(conditional.consequent[0].line(), 3);
        assert_eq!(tree[2].line(), 5);
    }

    #[test]
    fn test_stray_and_unterminated() {
        let parser = Parser::new("bad.src");
        for source in [
            "@endif\n",
            "@else\n",
            "@elseif x\n",
            "@endmacro\n",
            "@if x\n",
            "@macro m\n",
            "@if a\n@else\n@elseif b\n@endif\n",
            "@if a\n@else\n@else\n@endif\n",
        ] {
            let err = parser.parse(source).unwrap_err();
            assert!(matches!(err, Error::Parse(_)), "{source:?}: {err}");
            assert!(err.to_string().contains("bad.src:"), "{err}");
        }
    }

    #[test]
    fn test_unknown_directive() {
        let err = Parser::new("x.src").parse("@frobnicate\n").unwrap_err();
        assert!(err.to_string().contains("@frobnicate"));
    }

    #[test]
    fn test_missing_operands() {
        for source in ["@set\n", "@set x\n", "@echo\n", "@include\n", "@if\n", "@endif extra\n"] {
            assert!(Parser::default().parse(source).is_err(), "{source:?}");
        }
    }
}
