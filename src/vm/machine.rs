//! The execution VM.
//!
//! [`Engine`] walks an instruction tree depth-first, appending output
//! chunks to a buffer. It owns the globals map (mutated only by `@set`),
//! the macro table (append-only within one execution), and the depth
//! counter bounding recursion through includes and macro expansion.
//!
//! # Execution model
//!
//! Before dispatching each instruction the engine recomputes the working
//! context as `merge(globals, local)` and, outside inline mode, points
//! `__LINE__` at the instruction. `@include` re-enters the walk on the
//! parsed content of the resolved reference; macro expansion re-enters it
//! on the macro body. Both paths consume a depth frame, so cyclic include
//! or macro graphs terminate at [`MAX_EXECUTION_DEPTH`] rather than
//! overflowing the stack.

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use log::debug;
use rustc_hash::FxHashMap;

use crate::cache::{ExclusionMatcher, FileCache};
use crate::error::{Error, Result};
use crate::expr::{self, MacroCall, Value};
use crate::parse::{Conditional, Instruction, Parser};
use crate::resolve::IncludeResolver;

use super::buffer::OutputBuffer;
use super::context::{Context, FILE_KEY, INLINE_KEY, LINE_KEY, PATH_KEY};

/// Maximum number of live execution frames.
///
/// Frames are consumed by nested includes, macro expansion, and
/// conditional branches; the bound is what terminates cyclic include and
/// macro graphs. A bound of 0 would forbid execution entirely, since
/// `__LINE__` is only meaningful from depth 1; the limit is a positive
/// constant.
pub const MAX_EXECUTION_DEPTH: usize = 256;

// =============================================================================
// Engine
// =============================================================================

/// The preprocessing engine.
///
/// Single-threaded and synchronous: one [`Engine::execute`] call runs to
/// completion before the next, and globals, macros, and the depth counter
/// are reset at the start of each call.
///
/// # Example
///
/// ```ignore
/// use sourceprep::EngineBuilder;
///
/// let mut engine = EngineBuilder::new()
///     .file("main.src")
///     .base_dir("templates")
///     .build();
/// let output = engine.execute("@set who 'world'\nhello\n@echo who\n", None)?;
/// assert_eq!(output, "hello\nworld");
/// ```
#[derive(Debug)]
pub struct Engine {
    file: String,
    generate_line_control: bool,
    parser: Parser,
    resolver: IncludeResolver,
    globals: Context,
    macros: FxHashMap<String, MacroDef>,
    depth: Rc<Cell<usize>>,
}

#[derive(Debug, Clone)]
struct MacroDef {
    params: Vec<String>,
    body: Vec<Instruction>,
    file: String,
    path: String,
    line: usize,
}

impl Engine {
    /// Execute `source`, returning the concatenated output.
    ///
    /// Globals, the macro table, and the depth counter are reset first.
    /// The initial context merges, in order: `__FILE__`/`__PATH__` derived
    /// from the engine's source name, the (freshly reset) globals, and the
    /// caller-supplied context with reserved keys filtered out.
    pub fn execute(&mut self, source: &str, context: Option<&Context>) -> Result<String> {
        self.globals = Context::new();
        self.macros.clear();
        self.depth.set(0);

        let mut initial = Context::merge([&Context::from_path(&self.file), &self.globals]);
        if let Some(caller) = context {
            for (name, value) in caller.iter() {
                if !Context::is_reserved(name) {
                    initial.set(name.clone(), value.clone());
                }
            }
        }

        self.parser.file = self.file.clone();
        let instructions = self.parser.parse(source)?;

        let mut buffer = OutputBuffer::new();
        self.execute_tree(&instructions, &initial, &mut buffer)?;
        Ok(buffer.into_string())
    }

    /// The include resolver in use.
    pub fn resolver(&self) -> &IncludeResolver {
        &self.resolver
    }

    // ── Tree walking ─────────────────────────────────────────────────────

    fn execute_tree(
        &mut self,
        instructions: &[Instruction],
        local: &Context,
        buffer: &mut OutputBuffer,
    ) -> Result<()> {
        let _frame = DepthFrame::enter(&self.depth, local)?;
        for instruction in instructions {
            self.step(instruction, local, buffer)?;
        }
        Ok(())
    }

    fn step(
        &mut self,
        instruction: &Instruction,
        local: &Context,
        buffer: &mut OutputBuffer,
    ) -> Result<()> {
        let mut context = Context::merge([&self.globals, local]);
        if !context.is_inline() {
            context.set(LINE_KEY, Value::Int(instruction.line() as i64));
        }

        match instruction {
            Instruction::Set { variable, value, .. } => {
                let evaluated = self.eval(value, &context)?;
                self.globals.set(variable.clone(), evaluated);
            }
            Instruction::Output { value, computed, .. } => {
                self.execute_output(value, *computed, &context, buffer)?;
            }
            Instruction::Include { value, .. } => {
                self.execute_include(value, &context, buffer)?;
            }
            Instruction::Conditional(conditional) => {
                self.execute_conditional(conditional, &context, buffer)?;
            }
            Instruction::Macro { declaration, body, .. } => {
                self.declare_macro(declaration, body, &context)?;
            }
            Instruction::Error { value, .. } => {
                let message = self.eval(value, &context)?;
                return Err(Error::UserDefined(message.to_string()));
            }
        }
        Ok(())
    }

    // ── Instruction semantics ────────────────────────────────────────────

    fn execute_output(
        &mut self,
        value: &str,
        computed: bool,
        context: &Context,
        buffer: &mut OutputBuffer,
    ) -> Result<()> {
        if computed {
            self.emit(buffer, context, value.to_string());
            return Ok(());
        }
        if let Some(call) = self.try_macro_call(value, context)? {
            // Inline expansion: the macro writes into a fresh sub-buffer,
            // loses exactly one trailing newline, and lands contiguously at
            // the call site.
            let mut expansion = OutputBuffer::new();
            self.expand_macro(&call, context, true, &mut expansion)?;
            expansion.strip_trailing_newline();
            if !expansion.is_empty() {
                self.line_control(buffer, context);
                buffer.append(expansion);
            }
            return Ok(());
        }
        let evaluated = self.eval(value, context)?;
        self.emit(buffer, context, evaluated.to_string());
        Ok(())
    }

    fn execute_include(
        &mut self,
        value: &str,
        context: &Context,
        buffer: &mut OutputBuffer,
    ) -> Result<()> {
        if let Some(call) = self.try_macro_call(value, context)? {
            // Macro inclusion runs in the caller's current mode and appends
            // straight into the caller's buffer.
            return self.expand_macro(&call, context, false, buffer);
        }

        let reference = self.eval(value, context)?.to_string();
        let body = self
            .resolver
            .resolve(&reference)
            .map_err(|e| e.at(&context.location()))?;
        let text = decode_utf8(&body).map_err(|e| e.at(&context.location()))?;
        debug!("including {reference:?} ({} bytes)", body.len());

        // Parser errors from the nested source must name it.
        self.parser.file = reference.clone();
        let nested = self.parser.parse(&text)?;

        let nested_context = if context.is_inline() {
            context.clone()
        } else {
            let mut updated = context.clone();
            updated.overlay(&Context::from_path(&reference));
            updated
        };
        self.execute_tree(&nested, &nested_context, buffer)
    }

    fn execute_conditional(
        &mut self,
        conditional: &Conditional,
        context: &Context,
        buffer: &mut OutputBuffer,
    ) -> Result<bool> {
        let mut context = context.clone();
        if !context.is_inline() {
            context.set(LINE_KEY, Value::Int(conditional.line as i64));
        }

        let truthy = self.eval(&conditional.test, &context)?.is_truthy();
        if truthy {
            self.execute_tree(&conditional.consequent, &context, buffer)?;
        } else {
            let mut matched = false;
            for elseif in &conditional.elseifs {
                if self.execute_conditional(elseif, &context, buffer)? {
                    matched = true;
                    break;
                }
            }
            if !matched {
                if let Some(alternate) = &conditional.alternate {
                    self.execute_tree(alternate, &context, buffer)?;
                }
            }
        }
        Ok(truthy)
    }

    fn declare_macro(
        &mut self,
        declaration: &str,
        body: &[Instruction],
        context: &Context,
    ) -> Result<()> {
        let signature =
            expr::parse_macro_declaration(declaration).map_err(|e| e.at(&context.location()))?;
        if let Some(existing) = self.macros.get(&signature.name) {
            return Err(Error::MacroAlreadyDeclared {
                name: signature.name,
                first: format!("{}:{}", existing.file, existing.line),
                second: context.location(),
            });
        }
        debug!("declared macro {:?}", signature.name);
        self.macros.insert(
            signature.name,
            MacroDef {
                params: signature.params,
                body: body.to_vec(),
                file: context.file(),
                path: context.path(),
                line: context.line(),
            },
        );
        Ok(())
    }

    fn expand_macro(
        &mut self,
        call: &MacroCall,
        caller: &Context,
        inline: bool,
        buffer: &mut OutputBuffer,
    ) -> Result<()> {
        let def = self
            .macros
            .get(&call.name)
            .cloned()
            .expect("macro existence checked during call recognition");

        // Positional binding up to min(arity, provided): excess actuals are
        // dropped, missing formals stay absent and read as null.
        let mut local = Context::new();
        for (param, arg) in def.params.iter().zip(&call.args) {
            local.set(param.clone(), arg.clone());
        }
        if !caller.is_inline() {
            local.set(FILE_KEY, def.file.as_str());
            local.set(PATH_KEY, def.path.as_str());
        }
        if inline {
            local.set(INLINE_KEY, true);
        }

        debug!("expanding macro {:?}", call.name);
        let context = Context::merge([caller, &local]);
        self.execute_tree(&def.body, &context, buffer)
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn eval(&self, text: &str, context: &Context) -> Result<Value> {
        expr::evaluate(text, context).map_err(|e| e.at(&context.location()))
    }

    fn try_macro_call(&self, text: &str, context: &Context) -> Result<Option<MacroCall>> {
        expr::parse_macro_call(text, context, |name| self.macros.contains_key(name))
            .map_err(|e| e.at(&context.location()))
    }

    fn emit(&mut self, buffer: &mut OutputBuffer, context: &Context, chunk: String) {
        if chunk.is_empty() {
            return;
        }
        self.line_control(buffer, context);
        buffer.push(chunk);
    }

    /// Emit a `#line` chunk when output is about to switch source files.
    fn line_control(&self, buffer: &mut OutputBuffer, context: &Context) {
        if !self.generate_line_control || context.is_inline() {
            return;
        }
        let file = context.file();
        if buffer.last_output_file() != Some(file.as_str()) {
            buffer.push_line_control(context.line(), &file);
        }
    }
}

fn decode_utf8(body: &[u8]) -> Result<String> {
    let body = body.strip_prefix(b"\xef\xbb\xbf").unwrap_or(body);
    std::str::from_utf8(body)
        .map(str::to_string)
        .map_err(|_| Error::source_reading("included content is not valid UTF-8"))
}

// =============================================================================
// Depth frames
// =============================================================================

/// Scoped occupation of one depth slot.
///
/// `Drop` releases the slot, so the counter returns to its prior value on
/// every exit path, error returns included.
struct DepthFrame {
    slot: Rc<Cell<usize>>,
}

impl DepthFrame {
    fn enter(slot: &Rc<Cell<usize>>, context: &Context) -> Result<Self> {
        let depth = slot.get();
        if depth >= MAX_EXECUTION_DEPTH {
            return Err(Error::MaxExecutionDepthReached {
                limit: MAX_EXECUTION_DEPTH,
                location: context.location(),
            });
        }
        slot.set(depth + 1);
        Ok(Self {
            slot: Rc::clone(slot),
        })
    }
}

impl Drop for DepthFrame {
    fn drop(&mut self) {
        self.slot.set(self.slot.get() - 1);
    }
}

// =============================================================================
// EngineBuilder
// =============================================================================

/// Builder for [`Engine`].
#[derive(Debug, Default)]
pub struct EngineBuilder {
    file: Option<String>,
    base_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    exclusions: Option<ExclusionMatcher>,
    use_cache: Option<bool>,
    generate_line_control: bool,
    resolver: Option<IncludeResolver>,
}

impl EngineBuilder {
    /// Create a builder with defaults: source name `<source>`, base
    /// directory `.`, cache directory `.sourceprep-cache` under the base,
    /// caching on, no exclusions, no `#line` emission.
    pub fn new() -> Self {
        Self::default()
    }

    /// Name the top-level source for diagnostics and `__FILE__` seeding.
    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Directory relative local includes resolve against.
    pub fn base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Directory remote include bodies are cached in.
    pub fn cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    /// Exclusion patterns governing which references may be cached.
    pub fn exclusions(mut self, matcher: ExclusionMatcher) -> Self {
        self.exclusions = Some(matcher);
        self
    }

    /// Enable or disable the include cache (default: enabled).
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = Some(use_cache);
        self
    }

    /// Emit `#line <line> "<file>"` chunks when output switches source
    /// files (default: off).
    pub fn generate_line_control(mut self, generate: bool) -> Self {
        self.generate_line_control = generate;
        self
    }

    /// Use a fully custom resolver instead of building one from
    /// `base_dir`/`cache_dir`/`exclusions`/`use_cache`.
    pub fn resolver(mut self, resolver: IncludeResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Build the engine.
    pub fn build(self) -> Engine {
        let file = self.file.unwrap_or_else(|| "<source>".to_string());
        let base_dir = self.base_dir.unwrap_or_else(|| PathBuf::from("."));
        let resolver = self.resolver.unwrap_or_else(|| {
            let cache_dir = self
                .cache_dir
                .unwrap_or_else(|| base_dir.join(".sourceprep-cache"));
            let cache = match self.exclusions {
                Some(matcher) => FileCache::with_matcher(cache_dir, matcher),
                None => FileCache::new(cache_dir),
            };
            IncludeResolver::new(cache, base_dir).use_cache(self.use_cache.unwrap_or(true))
        });
        Engine {
            parser: Parser::new(file.clone()),
            file,
            generate_line_control: self.generate_line_control,
            resolver,
            globals: Context::new(),
            macros: FxHashMap::default(),
            depth: Rc::new(Cell::new(0)),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
