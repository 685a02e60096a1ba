//! Execution contexts.
//!
//! A context is the variable scope one instruction sees. Contexts have
//! pass-by-value semantics: every nested frame receives a merged clone, so
//! a callee can never mutate its caller's scope. The VM overlays its
//! globals on the local context before each instruction step.

use rustc_hash::FxHashMap;

use crate::expr::Value;

/// Basename of the source currently executing.
pub const FILE_KEY: &str = "__FILE__";
/// Directory part of the source currently executing; empty for ".".
pub const PATH_KEY: &str = "__PATH__";
/// Line of the instruction currently executing.
pub const LINE_KEY: &str = "__LINE__";
/// Truthy inside inline macro expansion; suppresses line/file tracking.
pub const INLINE_KEY: &str = "__INLINE__";

/// A variable scope: name → scalar value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    vars: FxHashMap<String, Value>,
}

impl Context {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a context with `__FILE__` and `__PATH__` derived from a source
    /// name.
    ///
    /// The file part is everything after the last `/`; the path part is
    /// everything before it, normalized to the empty string for `.` and
    /// stripped of a trailing slash.
    pub fn from_path(source: &str) -> Self {
        let (path, file) = match source.rsplit_once('/') {
            Some((path, file)) => (path.trim_end_matches('/'), file),
            None => ("", source),
        };
        let path = if path == "." { "" } else { path };
        let mut context = Self::new();
        context.set(FILE_KEY, file);
        context.set(PATH_KEY, path);
        context
    }

    /// Merge contexts left to right: clone of the first layer, each later
    /// layer's keys applied on top, last writer wins per key.
    pub fn merge<'a, I>(layers: I) -> Self
    where
        I: IntoIterator<Item = &'a Context>,
    {
        let mut merged = Self::new();
        for layer in layers {
            merged.overlay(layer);
        }
        merged
    }

    /// Apply every key of `other` onto `self`.
    pub fn overlay(&mut self, other: &Context) {
        for (name, value) in &other.vars {
            self.vars.insert(name.clone(), value.clone());
        }
    }

    /// Look up a variable.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Assign a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Iterate over all variables.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the context holds no variables.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Whether `name` is one of the reserved tracking keys.
    pub fn is_reserved(name: &str) -> bool {
        matches!(name, FILE_KEY | PATH_KEY | LINE_KEY | INLINE_KEY)
    }

    /// Whether `__INLINE__` is truthy.
    pub fn is_inline(&self) -> bool {
        self.get(INLINE_KEY).is_some_and(Value::is_truthy)
    }

    /// Current `__FILE__`, stringified; empty when unset.
    pub fn file(&self) -> String {
        self.get(FILE_KEY).map(ToString::to_string).unwrap_or_default()
    }

    /// Current `__PATH__`, stringified; empty when unset.
    pub fn path(&self) -> String {
        self.get(PATH_KEY).map(ToString::to_string).unwrap_or_default()
    }

    /// Current `__LINE__`; 0 when unset or non-integer.
    pub fn line(&self) -> usize {
        match self.get(LINE_KEY) {
            Some(Value::Int(n)) if *n >= 0 => *n as usize,
            _ => 0,
        }
    }

    /// `file:line` rendering for diagnostics.
    pub fn location(&self) -> String {
        format!("{}:{}", self.file(), self.line())
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path() {
        let context = Context::from_path("dir/sub/name.txt");
        assert_eq!(context.file(), "name.txt");
        assert_eq!(context.path(), "dir/sub");

        let bare = Context::from_path("name.txt");
        assert_eq!(bare.file(), "name.txt");
        assert_eq!(bare.path(), "");

        let dotted = Context::from_path("./name.txt");
        assert_eq!(dotted.file(), "name.txt");
        assert_eq!(dotted.path(), "");

        let url = Context::from_path("https://example.com/lib/a.js");
        assert_eq!(url.file(), "a.js");
        assert_eq!(url.path(), "https://example.com/lib");
    }

    #[test]
    fn test_merge_last_writer_wins() {
        let mut a = Context::new();
        a.set("x", 1);
        a.set("y", 1);
        let mut b = Context::new();
        b.set("y", 2);
        b.set("z", 2);

        let merged = Context::merge([&a, &b]);
        assert_eq!(merged.get("x"), Some(&Value::Int(1)));
        assert_eq!(merged.get("y"), Some(&Value::Int(2)));
        assert_eq!(merged.get("z"), Some(&Value::Int(2)));
        // The inputs are untouched.
        assert_eq!(a.get("y"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_merge_clones() {
        let mut a = Context::new();
        a.set("x", 1);
        let mut merged = Context::merge([&a]);
        merged.set("x", 2);
        assert_eq!(a.get("x"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_inline_flag() {
        let mut context = Context::new();
        assert!(!context.is_inline());
        context.set(INLINE_KEY, true);
        assert!(context.is_inline());
        context.set(INLINE_KEY, false);
        assert!(!context.is_inline());
    }

    #[test]
    fn test_location() {
        let mut context = Context::from_path("a/b.src");
        context.set(LINE_KEY, 12);
        assert_eq!(context.location(), "b.src:12");
    }
}
