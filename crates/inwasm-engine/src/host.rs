//! Module execution
//!
//! The discovery loop needs a file "executed" far enough for its next raw
//! declaration to register itself. [`ModuleHost`] is that seam. The built-in
//! [`ScriptHost`] does not run JavaScript: it walks the file's declaration
//! calls in source order and evaluates their literal arguments statically.

use crate::capture::{CaptureError, CaptureSession};
use crate::declaration::{
    CompileOptions, CustomRunner, Declaration, ExportStub, ImportObject, OutputMode, OutputType,
    SourceType, TrackMode,
};
use crate::memory::HostMemory;
use crate::runtime::{self, Declare};
use crate::stack::DECLARATION_LABEL;
use inwasm_syntax::{evaluate, CallExpr, LiteralValue, SyntaxTree};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// How a pass over a file ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Ran to the end without an unresolved declaration
    Completed,
    /// Stopped by the capture signal
    Interrupted,
}

/// Errors raised while executing a file
#[derive(Debug, Error)]
pub enum HostError {
    /// IO error reading the file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file does not parse
    #[error("{file}: syntax error: {message}")]
    Parse { file: String, message: String },

    /// A declaration literal that cannot be turned into a declaration
    #[error("{file}:{line}:{column}: invalid declaration: {reason}")]
    InvalidDeclaration {
        file: String,
        line: u32,
        column: u32,
        reason: String,
    },

    /// Capture protocol violation
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Executes a source file so its declarations can register.
pub trait ModuleHost {
    /// Execute `file` fresh. Raw declarations register with `session`; the
    /// first named one stops execution with [`ExecOutcome::Interrupted`].
    fn execute(&mut self, file: &Path, session: &CaptureSession) -> Result<ExecOutcome, HostError>;
}

/// Built-in host evaluating declaration literals statically.
#[derive(Clone, Default)]
pub struct ScriptHost {
    runners: HashMap<String, CustomRunner>,
}

impl ScriptHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `runner` available to declarations naming it in `customRunner`.
    pub fn register_runner(&mut self, name: impl Into<String>, runner: CustomRunner) {
        self.runners.insert(name.into(), runner);
    }

    pub fn with_runner(mut self, name: impl Into<String>, runner: CustomRunner) -> Self {
        self.register_runner(name, runner);
        self
    }
}

impl fmt::Debug for ScriptHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.runners.keys().collect();
        names.sort();
        f.debug_struct("ScriptHost").field("runners", &names).finish()
    }
}

impl ModuleHost for ScriptHost {
    fn execute(&mut self, file: &Path, session: &CaptureSession) -> Result<ExecOutcome, HostError> {
        let source = fs::read_to_string(file)?;
        let file_name = file.display().to_string();
        let tree = SyntaxTree::parse(&source).map_err(|e| HostError::Parse {
            file: file_name.clone(),
            message: e.format_with_source(&source),
        })?;

        for call in tree
            .calls()
            .iter()
            .filter(|call| call.callee_name() == Some(DECLARATION_LABEL))
        {
            let (line, column) = call_position(call);
            let invalid = |reason: String| HostError::InvalidDeclaration {
                file: file_name.clone(),
                line,
                column,
                reason,
            };

            let literal = match call.arguments.first() {
                Some(argument) => {
                    tree.resolve_references(evaluate(&argument.tokens, &source), call.span.start, &source)
                }
                None => LiteralValue::Undefined,
            };

            match runtime::declare(Some(session), &literal)? {
                Declare::Resolved(record) => {
                    tracing::trace!(line, column, bytes = record.bytes.len(), "compiled declaration");
                }
                Declare::Pending(_) if is_unnamed(&literal) => {
                    tracing::trace!(line, column, "unnamed declaration skipped");
                }
                Declare::Pending(session) => {
                    let declaration = self.declaration_from_literal(&literal).map_err(invalid)?;
                    let trace = capture_trace(&file_name, line, column);
                    if session.register(declaration, trace).is_err() {
                        return Ok(ExecOutcome::Interrupted);
                    }
                }
            }
        }

        Ok(ExecOutcome::Completed)
    }
}

/// An object literal whose `name` is missing or falsy.
fn is_unnamed(literal: &LiteralValue) -> bool {
    if !matches!(literal, LiteralValue::Object(_)) {
        return false;
    }
    match literal.get("name") {
        None => true,
        Some(LiteralValue::String(name)) => name.is_empty(),
        Some(LiteralValue::Bool(flag)) => !flag,
        Some(LiteralValue::Number(n)) => *n == 0.0 || n.is_nan(),
        Some(value) => value.is_nullish(),
    }
}

/// One-based position reported for a call: its trailing callee identifier,
/// where a JavaScript engine would report it.
fn call_position(call: &CallExpr) -> (u32, u32) {
    let at = call
        .callee_ident
        .as_ref()
        .map(|ident| ident.span.start_loc)
        .unwrap_or(call.span.start_loc);
    (at.line, at.column + 1)
}

/// Trace shaped like the one a JavaScript engine prints for a throw inside
/// the declaration wrapper.
fn capture_trace(file: &str, line: u32, column: u32) -> String {
    format!(
        "InWasmCapture: exit\n    at CaptureSession.register (inwasm:capture:1:1)\n    at {} (inwasm:runtime:1:1)\n    at Object.<anonymous> ({}:{}:{})",
        DECLARATION_LABEL, file, line, column
    )
}

impl ScriptHost {
    /// Convert an evaluated declaration literal.
    fn declaration_from_literal(&self, literal: &LiteralValue) -> Result<Declaration, String> {
        if !matches!(literal, LiteralValue::Object(_)) {
            return Err(format!("expected an object literal, found {}", literal.type_name()));
        }

        let name = optional(literal, "name")
            .map(|v| string(v, "name"))
            .transpose()?
            .unwrap_or_default();
        if name.contains(['/', '\\']) || name.contains("..") {
            return Err(format!("'name' must not contain path separators or '..', found '{}'", name));
        }
        let srctype: SourceType = match optional(literal, "srctype") {
            Some(value) => string(value, "srctype")?.parse()?,
            None => return Err("missing 'srctype'".to_string()),
        };
        let code = optional(literal, "code")
            .map(|v| string(v, "code"))
            .transpose()?
            .unwrap_or_default();

        let mut declaration = Declaration::new(name, srctype, code);

        if let Some(value) = optional(literal, "type") {
            declaration.output_type = enum_field(value, "type", "OutputType", OutputType::from_member)?;
        }
        if let Some(value) = optional(literal, "mode") {
            declaration.mode = enum_field(value, "mode", "OutputMode", OutputMode::from_member)?;
        }
        if let Some(value) = optional(literal, "exports") {
            declaration.exports = stubs(value, "exports")?;
        }
        if let Some(value) = optional(literal, "imports") {
            declaration.imports = Some(imports(value)?);
        }
        if let Some(value) = optional(literal, "compile") {
            declaration.compile = Some(compile_options(value)?);
        }
        if let Some(value) = optional(literal, "customRunner") {
            declaration.custom_runner = Some(self.runner(value)?);
        }
        if let Some(value) = optional(literal, "noCache") {
            declaration.no_cache = Some(
                value
                    .as_bool()
                    .ok_or_else(|| format!("'noCache' must be a boolean, found {}", value.type_name()))?,
            );
        }
        if let Some(value) = optional(literal, "trackChanges") {
            declaration.track_changes = string_list(value, "trackChanges")?;
        }
        if let Some(value) = optional(literal, "trackMode") {
            declaration.track_mode = string(value, "trackMode")?.parse::<TrackMode>()?;
        }

        Ok(declaration)
    }

    fn runner(&self, value: &LiteralValue) -> Result<CustomRunner, String> {
        let name = match value {
            LiteralValue::String(name) => name.clone(),
            LiteralValue::Path(parts) => parts.last().cloned().unwrap_or_default(),
            LiteralValue::Function => {
                return Err("inline 'customRunner' functions are not supported, register the runner by name".to_string())
            }
            other => return Err(format!("'customRunner' must name a runner, found {}", other.type_name())),
        };
        self.runners
            .get(&name)
            .cloned()
            .ok_or_else(|| format!("no runner registered as '{}'", name))
    }
}

/// Field value, absent when missing or nullish.
fn optional<'a>(literal: &'a LiteralValue, key: &str) -> Option<&'a LiteralValue> {
    literal.get(key).filter(|value| !value.is_nullish())
}

fn string(value: &LiteralValue, field: &str) -> Result<String, String> {
    value
        .as_str()
        .map(String::from)
        .ok_or_else(|| format!("'{}' must be a string, found {}", field, value.type_name()))
}

fn string_list(value: &LiteralValue, field: &str) -> Result<Vec<String>, String> {
    match value {
        LiteralValue::Array(items) => items.iter().map(|item| string(item, field)).collect(),
        LiteralValue::String(single) => Ok(vec![single.clone()]),
        other => Err(format!("'{}' must be an array of strings, found {}", field, other.type_name())),
    }
}

/// `OutputType.BYTES`, or the raw number.
fn enum_field<T>(
    value: &LiteralValue,
    field: &str,
    enum_name: &str,
    from_member: fn(&str) -> Option<T>,
) -> Result<T, String>
where
    T: TryFrom<u8, Error = String>,
{
    match value {
        LiteralValue::Path(parts) if parts.len() == 2 && parts[0] == enum_name => {
            from_member(&parts[1]).ok_or_else(|| format!("unknown member {}.{}", enum_name, parts[1]))
        }
        LiteralValue::Number(n) if n.fract() == 0.0 && (0.0..=255.0).contains(n) => T::try_from(*n as u8),
        other => Err(format!("'{}' must be an {} member, found {}", field, enum_name, other.type_name())),
    }
}

fn stubs(value: &LiteralValue, field: &str) -> Result<BTreeMap<String, ExportStub>, String> {
    match value {
        LiteralValue::Object(entries) => entries
            .iter()
            .map(|(name, value)| Ok::<_, String>((name.clone(), stub(value, field, name)?)))
            .collect(),
        other => Err(format!("'{}' must be an object, found {}", field, other.type_name())),
    }
}

fn imports(value: &LiteralValue) -> Result<ImportObject, String> {
    match value {
        LiteralValue::Object(modules) => modules
            .iter()
            .map(|(module, fields)| Ok::<_, String>((module.clone(), stubs(fields, "imports")?)))
            .collect(),
        other => Err(format!("'imports' must be an object, found {}", other.type_name())),
    }
}

/// Stub for one export or import value. Only the kind survives, plus the
/// memory handle for `new WebAssembly.Memory(...)`.
fn stub(value: &LiteralValue, field: &str, name: &str) -> Result<ExportStub, String> {
    match value {
        LiteralValue::Function | LiteralValue::Path(_) | LiteralValue::Opaque(_) => Ok(ExportStub::Function),
        LiteralValue::Number(_) => Ok(ExportStub::Global),
        LiteralValue::New { path, arguments } => match path.join(".").as_str() {
            "WebAssembly.Memory" => memory(arguments.first()).map(ExportStub::Memory),
            "WebAssembly.Global" => Ok(ExportStub::Global),
            "WebAssembly.Table" => Ok(ExportStub::Table),
            other => Err(format!("{}.{}: unsupported constructor '{}'", field, name, other)),
        },
        other => Err(format!("{}.{}: unsupported value {}", field, name, other.type_name())),
    }
}

fn memory(descriptor: Option<&LiteralValue>) -> Result<crate::memory::MemoryHandle, String> {
    let descriptor = descriptor.ok_or("WebAssembly.Memory needs a descriptor")?;
    let pages = |key: &str| -> Result<Option<u32>, String> {
        match optional(descriptor, key) {
            None => Ok(None),
            Some(LiteralValue::Number(n)) if n.fract() == 0.0 && *n >= 0.0 && *n <= u32::MAX as f64 => {
                Ok(Some(*n as u32))
            }
            Some(other) => Err(format!("memory '{}' must be a page count, found {}", key, other.type_name())),
        }
    };

    let initial = pages("initial")?.ok_or("memory descriptor needs 'initial'")?;
    let maximum = pages("maximum")?;
    let shared = optional(descriptor, "shared").and_then(LiteralValue::as_bool).unwrap_or(false);
    if maximum.is_some_and(|max| max < initial) {
        return Err("memory 'maximum' is below 'initial'".to_string());
    }
    Ok(HostMemory::handle(initial, maximum, shared))
}

fn compile_options(value: &LiteralValue) -> Result<CompileOptions, String> {
    let mut options = CompileOptions::default();

    if let Some(defines) = optional(value, "defines") {
        let LiteralValue::Object(entries) = defines else {
            return Err(format!("'compile.defines' must be an object, found {}", defines.type_name()));
        };
        for (key, define) in entries {
            let text = match define {
                LiteralValue::String(s) => s.clone(),
                LiteralValue::Number(n) => n.to_string(),
                LiteralValue::Bool(b) => b.to_string(),
                other => {
                    return Err(format!("'compile.defines.{}' has unsupported value {}", key, other.type_name()))
                }
            };
            options.defines.insert(key.clone(), text);
        }
    }
    if let Some(switches) = optional(value, "switches") {
        options.switches = string_list(switches, "compile.switches")?;
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::ExportKind;
    use crate::stack::{find_declaration_frame, parse_call_stack};
    use std::sync::Arc;

    fn literal_of(source: &str) -> LiteralValue {
        let tree = SyntaxTree::parse(source).unwrap();
        evaluate(&tree.calls()[0].arguments[0].tokens, source)
    }

    #[test]
    fn test_full_declaration() {
        let literal = literal_of(
            r#"InWasm({
  name: 'sum',
  type: OutputType.MODULE,
  mode: OutputMode.SYNC,
  srctype: 'Clang-C',
  compile: { defines: { N: 16, LABEL: 'x' }, switches: ['-g'] },
  trackChanges: ['data/*.bin'],
  trackMode: 'content',
  noCache: false,
  imports: { env: { memory: new WebAssembly.Memory({ initial: 2, maximum: 20 }) } },
  exports: { sum: (p, n) => 0, counter: new WebAssembly.Global({ value: 'i32' }) },
  code: 'int sum;'
})"#,
        );
        let decl = ScriptHost::new().declaration_from_literal(&literal).unwrap();

        assert_eq!(decl.name, "sum");
        assert_eq!(decl.output_type, OutputType::Module);
        assert_eq!(decl.mode, OutputMode::Sync);
        assert_eq!(decl.srctype, SourceType::ClangC);
        assert_eq!(decl.code, "int sum;");
        assert_eq!(decl.track_mode, TrackMode::Content);
        assert_eq!(decl.no_cache, Some(false));
        assert_eq!(decl.exports["counter"].kind(), ExportKind::Global);
        let compile = decl.compile.as_ref().unwrap();
        assert_eq!(compile.defines["N"], "16");
        assert_eq!(compile.switches, vec!["-g"]);

        let memory = decl.imports.as_ref().unwrap()["env"]["memory"].memory().unwrap();
        assert_eq!(crate::memory::probe(memory.as_ref()).maximum, Some(20));
    }

    #[test]
    fn test_invalid_fields() {
        let host = ScriptHost::new();
        let cases = [
            "InWasm({ name: 'a', code: '' })",
            "InWasm({ name: 'a', srctype: 'Fortran' })",
            "InWasm({ name: 'a', srctype: 'wat', type: OutputType.NOPE })",
            "InWasm({ name: 'a', srctype: 'custom', customRunner: (d) => d })",
            "InWasm({ name: 'a', srctype: 'custom', customRunner: 'unknown' })",
        ];
        for case in cases {
            assert!(host.declaration_from_literal(&literal_of(case)).is_err(), "{}", case);
        }
    }

    #[test]
    fn test_named_runner() {
        let runner: CustomRunner =
            Arc::new(|_: &Declaration, _: &Path, _: &Path, _: &crate::memory::MemorySettings| Ok(vec![0]));
        let host = ScriptHost::new().with_runner("fixed", runner);
        let decl = host
            .declaration_from_literal(&literal_of(
                "InWasm({ name: 'c', srctype: 'custom', customRunner: 'fixed' })",
            ))
            .unwrap();
        assert!(decl.custom_runner.is_some());
    }

    #[test]
    fn test_trace_points_at_call() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("mod.wasm.js");
        fs::write(
            &file,
            "const done = InWasm({s:0,t:0,d:'AA=='});\nconst next = lib.InWasm({ name: 'n', srctype: 'wat', code: '(module)' });\n",
        )
        .unwrap();

        let session = CaptureSession::new();
        let outcome = ScriptHost::new().execute(&file, &session).unwrap();
        assert_eq!(outcome, ExecOutcome::Interrupted);

        let records = session.take();
        assert_eq!(records.len(), 1);
        let frames = parse_call_stack(&records[0].trace).unwrap();
        let frame = find_declaration_frame(&frames, &file.display().to_string()).unwrap();
        assert_eq!((frame.line, frame.column), (2, 18));
    }

    #[test]
    fn test_unnamed_declarations_complete() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("inert.js");
        fs::write(&file, "InWasm({ srctype: 'wat', code: '(module)' });\n").unwrap();

        let session = CaptureSession::new();
        let outcome = ScriptHost::new().execute(&file, &session).unwrap();
        assert_eq!(outcome, ExecOutcome::Completed);
        assert!(session.is_empty());
    }

    fn execute_source(source: &str) -> (ExecOutcome, Vec<crate::capture::CaptureRecord>) {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("mod.wasm.js");
        fs::write(&file, source).unwrap();
        let session = CaptureSession::new();
        let outcome = ScriptHost::new().execute(&file, &session).unwrap();
        (outcome, session.take())
    }

    #[test]
    fn test_unnamed_literal_skipped_before_validation() {
        let (outcome, records) = execute_source(
            "InWasm({});
InWasm({ name: '', srctype: 'nope' });
InWasm({ name: 0 });
const a = InWasm({ name: 'a', srctype: 'wat', code: '(module)' });
",
        );
        assert_eq!(outcome, ExecOutcome::Interrupted);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].declaration.name, "a");
    }

    #[test]
    fn test_non_object_argument_is_still_invalid() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("mod.wasm.js");
        fs::write(&file, "InWasm('a');
").unwrap();
        let err = ScriptHost::new().execute(&file, &CaptureSession::new()).unwrap_err();
        assert!(matches!(err, HostError::InvalidDeclaration { line: 1, column: 1, .. }));
    }

    #[test]
    fn test_names_must_not_escape_the_build_dir() {
        let host = ScriptHost::new();
        for name in ["../up", "a/b", r"a\\b", "..", "x..y"] {
            let source = format!("InWasm({{ name: '{}', srctype: 'wat', code: '' }})", name);
            let err = host.declaration_from_literal(&literal_of(&source)).unwrap_err();
            assert!(err.contains("path separators"), "{}: {}", name, err);
        }
        assert!(host
            .declaration_from_literal(&literal_of("InWasm({ name: 'a.b-c_d', srctype: 'wat', code: '' })"))
            .is_ok());
    }

    #[test]
    fn test_references_resolve_through_const_bindings() {
        let (outcome, records) = execute_source(
            r#"const UNIT = 'unit';
const SRC = '(module)';
function build() {
  const importObj = { env: { memory: new WebAssembly.Memory({ initial: 1 }) } };
  return InWasm({ name: UNIT, srctype: 'wat', code: SRC, imports: importObj });
}
"#,
        );
        assert_eq!(outcome, ExecOutcome::Interrupted);
        let decl = &records[0].declaration;
        assert_eq!(decl.name, "unit");
        assert_eq!(decl.code, "(module)");
        let settings = crate::memory::reflect_memory(decl).unwrap();
        assert_eq!(settings.descriptor.unwrap().initial, 1);
    }

    #[test]
    fn test_unresolvable_reference_is_reported() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("mod.wasm.js");
        fs::write(&file, "InWasm({ name: fromElsewhere(), srctype: 'wat' });
").unwrap();
        let err = ScriptHost::new().execute(&file, &CaptureSession::new()).unwrap_err();
        assert!(matches!(err, HostError::InvalidDeclaration { .. }));
    }
}
