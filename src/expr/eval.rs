//! Expression evaluation and macro-call recognition.
//!
//! Expressions appear as directive operands (`@set`, `@echo`, `@include`,
//! `@if`, `@error`). The grammar, precedence low to high:
//!
//! ```text
//! or        := and ("||" and)*
//! and       := cmp ("&&" cmp)*
//! cmp       := additive (("==" | "!=" | "<=" | ">=" | "<" | ">") additive)*
//! additive  := unary (("+" | "-") unary)*
//! unary     := ("!" | "-") unary | primary
//! primary   := "(" or ")" | string | number | "true" | "false" | "null"
//!            | "defined" "(" ident ")" | ident
//! ```
//!
//! Identifier lookup resolves through the supplied context; an unknown
//! identifier evaluates to [`Value::Null`] so absent macro arguments read as
//! a null-equivalent. `+` concatenates when either operand is a string.

use crate::error::{Error, Result};
use crate::vm::Context;

use super::value::Value;

// =============================================================================
// Public API
// =============================================================================

/// A recognized macro invocation: the macro name plus its evaluated
/// positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroCall {
    /// Name of the invoked macro.
    pub name: String,
    /// Actual arguments, evaluated in the caller's context.
    pub args: Vec<Value>,
}

/// A parsed macro declaration: `name` or `name(p1, p2, …)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroSignature {
    /// Declared macro name.
    pub name: String,
    /// Declared formal parameters, in order.
    pub params: Vec<String>,
}

/// Evaluate `text` against `context`, yielding a scalar.
pub fn evaluate(text: &str, context: &Context) -> Result<Value> {
    let mut cursor = Cursor::new(text, context);
    let value = cursor.parse_or()?;
    cursor.skip_ws();
    if !cursor.at_end() {
        return Err(Error::expression(format!(
            "unexpected trailing input in expression {text:?}"
        )));
    }
    Ok(value)
}

/// Try to read `text` as a macro invocation.
///
/// Succeeds only when the whole text has the shape `ident(args…)` and
/// `is_macro(ident)` holds; anything else returns `Ok(None)` and should be
/// treated as an ordinary expression. Argument evaluation errors propagate.
pub fn parse_macro_call<F>(text: &str, context: &Context, is_macro: F) -> Result<Option<MacroCall>>
where
    F: Fn(&str) -> bool,
{
    let mut cursor = Cursor::new(text, context);
    cursor.skip_ws();
    let name = match cursor.try_ident() {
        Some(name) => name,
        None => return Ok(None),
    };
    cursor.skip_ws();
    if !cursor.eat(b'(') {
        return Ok(None);
    }
    if !is_macro(&name) {
        return Ok(None);
    }

    let mut args = Vec::new();
    cursor.skip_ws();
    if !cursor.eat(b')') {
        loop {
            args.push(cursor.parse_or()?);
            cursor.skip_ws();
            if cursor.eat(b',') {
                continue;
            }
            if cursor.eat(b')') {
                break;
            }
            return Err(Error::expression(format!(
                "expected ',' or ')' in call to {name:?}"
            )));
        }
    }

    cursor.skip_ws();
    if !cursor.at_end() {
        // `m() + 1` is an expression that happens to start with a call shape.
        return Ok(None);
    }
    Ok(Some(MacroCall { name, args }))
}

/// Parse a macro declaration: a bare identifier or `ident(p1, p2, …)`.
pub fn parse_macro_declaration(text: &str) -> Result<MacroSignature> {
    let trimmed = text.trim();
    let (name, params) = match trimmed.find('(') {
        None => (trimmed, Vec::new()),
        Some(open) => {
            let name = trimmed[..open].trim_end();
            let inner = trimmed[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| invalid_declaration(text))?;
            let params = if inner.trim().is_empty() {
                Vec::new()
            } else {
                inner
                    .split(',')
                    .map(|param| {
                        let param = param.trim();
                        if is_identifier(param) {
                            Ok(param.to_string())
                        } else {
                            Err(invalid_declaration(text))
                        }
                    })
                    .collect::<Result<Vec<_>>>()?
            };
            (name, params)
        }
    };

    if !is_identifier(name) {
        return Err(invalid_declaration(text));
    }
    Ok(MacroSignature {
        name: name.to_string(),
        params,
    })
}

fn invalid_declaration(text: &str) -> Error {
    Error::expression(format!("invalid macro declaration {:?}", text.trim()))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// =============================================================================
// Cursor
// =============================================================================

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    context: &'a Context,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, context: &'a Context) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
            context,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, token: &str) -> bool {
        if self.bytes[self.pos..].starts_with(token.as_bytes()) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn try_ident(&mut self) -> Option<String> {
        let start = self.pos;
        match self.peek() {
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => self.pos += 1,
            _ => return None,
        }
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        // Identifier bytes are ASCII by construction.
        Some(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    // ── Precedence chain ─────────────────────────────────────────────────

    fn parse_or(&mut self) -> Result<Value> {
        let mut value = self.parse_and()?;
        loop {
            self.skip_ws();
            if self.eat_str("||") {
                let rhs = self.parse_and()?;
                value = Value::Bool(value.is_truthy() || rhs.is_truthy());
            } else {
                return Ok(value);
            }
        }
    }

    fn parse_and(&mut self) -> Result<Value> {
        let mut value = self.parse_cmp()?;
        loop {
            self.skip_ws();
            if self.eat_str("&&") {
                let rhs = self.parse_cmp()?;
                value = Value::Bool(value.is_truthy() && rhs.is_truthy());
            } else {
                return Ok(value);
            }
        }
    }

    fn parse_cmp(&mut self) -> Result<Value> {
        let mut value = self.parse_additive()?;
        loop {
            self.skip_ws();
            if self.eat_str("==") {
                let rhs = self.parse_additive()?;
                value = Value::Bool(equals(&value, &rhs));
            } else if self.eat_str("!=") {
                let rhs = self.parse_additive()?;
                value = Value::Bool(!equals(&value, &rhs));
            } else if self.eat_str("<=") {
                let rhs = self.parse_additive()?;
                value = Value::Bool(ordering(&value, &rhs)?.is_le());
            } else if self.eat_str(">=") {
                let rhs = self.parse_additive()?;
                value = Value::Bool(ordering(&value, &rhs)?.is_ge());
            } else if self.peek() == Some(b'<') {
                self.pos += 1;
                let rhs = self.parse_additive()?;
                value = Value::Bool(ordering(&value, &rhs)?.is_lt());
            } else if self.peek() == Some(b'>') {
                self.pos += 1;
                let rhs = self.parse_additive()?;
                value = Value::Bool(ordering(&value, &rhs)?.is_gt());
            } else {
                return Ok(value);
            }
        }
    }

    fn parse_additive(&mut self) -> Result<Value> {
        let mut value = self.parse_unary()?;
        loop {
            self.skip_ws();
            if self.eat(b'+') {
                let rhs = self.parse_unary()?;
                value = add(&value, &rhs)?;
            } else if self.eat(b'-') {
                let rhs = self.parse_unary()?;
                value = subtract(&value, &rhs)?;
            } else {
                return Ok(value);
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Value> {
        self.skip_ws();
        if self.eat(b'!') {
            let value = self.parse_unary()?;
            return Ok(Value::Bool(!value.is_truthy()));
        }
        if self.eat(b'-') {
            let value = self.parse_unary()?;
            return match value {
                Value::Int(n) => Ok(Value::Int(-n)),
                Value::Float(n) => Ok(Value::Float(-n)),
                other => Err(Error::expression(format!(
                    "cannot negate a {}",
                    other.type_name()
                ))),
            };
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Value> {
        self.skip_ws();
        if self.eat(b'(') {
            let value = self.parse_or()?;
            self.skip_ws();
            if !self.eat(b')') {
                return Err(Error::expression("expected ')'"));
            }
            return Ok(value);
        }
        match self.peek() {
            Some(quote @ (b'\'' | b'"')) => {
                self.pos += 1;
                return self.read_string(quote);
            }
            Some(b) if b.is_ascii_digit() => return self.read_number(),
            _ => {}
        }

        let ident = self
            .try_ident()
            .ok_or_else(|| Error::expression("expected identifier, literal, or '('"))?;
        match ident.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "null" => Ok(Value::Null),
            "defined" => {
                self.skip_ws();
                if !self.eat(b'(') {
                    return Err(Error::expression("expected '(' after defined"));
                }
                self.skip_ws();
                let name = self
                    .try_ident()
                    .ok_or_else(|| Error::expression("expected name in defined()"))?;
                self.skip_ws();
                if !self.eat(b')') {
                    return Err(Error::expression("expected ')'"));
                }
                Ok(Value::Bool(self.context.get(&name).is_some()))
            }
            _ => Ok(self.context.get(&ident).cloned().unwrap_or(Value::Null)),
        }
    }

    // ── Literals ─────────────────────────────────────────────────────────

    fn read_string(&mut self, quote: u8) -> Result<Value> {
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(Error::expression("unterminated string literal")),
                Some(b) if b == quote => {
                    self.pos += 1;
                    return Ok(Value::Str(out));
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(b'n') => out.push('\n'),
                        Some(b't') => out.push('\t'),
                        Some(b'r') => out.push('\r'),
                        Some(b'\\') => out.push('\\'),
                        Some(b'\'') => out.push('\''),
                        Some(b'"') => out.push('"'),
                        _ => return Err(Error::expression("invalid escape in string literal")),
                    }
                    self.pos += 1;
                }
                Some(_) => {
                    // Consume one UTF-8 scalar, not one byte.
                    let rest = std::str::from_utf8(&self.bytes[self.pos..])
                        .map_err(|_| Error::expression("invalid UTF-8 in string literal"))?;
                    let c = rest.chars().next().expect("non-empty by peek");
                    out.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    fn read_number(&mut self) -> Result<Value> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.peek() == Some(b'.')
            && matches!(self.bytes.get(self.pos + 1), Some(b) if b.is_ascii_digit())
        {
            is_float = true;
            self.pos += 1;
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).expect("ascii digits");
        if is_float {
            text.parse::<f64>()
                .map(Value::Float)
                .map_err(|_| Error::expression(format!("invalid number literal {text:?}")))
        } else {
            text.parse::<i64>()
                .map(Value::Int)
                .map_err(|_| Error::expression(format!("invalid number literal {text:?}")))
        }
    }
}

// =============================================================================
// Operators
// =============================================================================

fn equals(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
        (a, b) if std::mem::discriminant(a) == std::mem::discriminant(b) => a == b,
        _ => false,
    }
}

fn ordering(lhs: &Value, rhs: &Value) -> Result<std::cmp::Ordering> {
    if let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) {
        return a.partial_cmp(&b).ok_or_else(|| {
            Error::expression("cannot order NaN")
        });
    }
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        _ => Err(Error::expression(format!(
            "cannot compare {} to {}",
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn add(lhs: &Value, rhs: &Value) -> Result<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        (Value::Str(_), _) | (_, Value::Str(_)) => Ok(Value::Str(format!("{lhs}{rhs}"))),
        _ => match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => Ok(Value::Float(a + b)),
            _ => Err(Error::expression(format!(
                "cannot add {} to {}",
                lhs.type_name(),
                rhs.type_name()
            ))),
        },
    }
}

fn subtract(lhs: &Value, rhs: &Value) -> Result<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
        _ => match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => Ok(Value::Float(a - b)),
            _ => Err(Error::expression(format!(
                "cannot subtract {} from {}",
                rhs.type_name(),
                lhs.type_name()
            ))),
        },
    }
}

// =============================================================================
// Tests
// =============================================================================
