//! Discovery/rewrite loop integration tests

mod common;

use common::{declaration, module, Project};
use inwasm_engine::marker;
use inwasm_engine::{
    BuildOptions, BuildRecord, CacheError, CaptureSession, Declaration, Engine, ExecOutcome,
    HostError, MemoryError, ModuleHost, ProcessError, ScriptHost, SourceType,
};
use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Script host that snapshots the file at every pass.
struct RecordingHost {
    inner: ScriptHost,
    passes: Arc<Mutex<Vec<String>>>,
}

impl ModuleHost for RecordingHost {
    fn execute(&mut self, file: &Path, session: &CaptureSession) -> Result<ExecOutcome, HostError> {
        self.passes.lock().push(fs::read_to_string(file)?);
        self.inner.execute(file, session)
    }
}

/// Host that reports a new declaration at the same position forever.
struct StuckHost {
    passes: usize,
}

impl ModuleHost for StuckHost {
    fn execute(&mut self, file: &Path, session: &CaptureSession) -> Result<ExecOutcome, HostError> {
        self.passes += 1;
        let trace = format!(
            "InWasmCapture: exit\n    at InWasm (inwasm:runtime:1:1)\n    at Object.<anonymous> ({}:1:1)",
            file.display()
        );
        let declaration = Declaration::new(format!("unit{}", self.passes), SourceType::Wat, "(module)");
        let _ = session.register(declaration, trace);
        Ok(ExecOutcome::Interrupted)
    }
}

#[test]
fn test_first_run_compiles_and_second_run_is_idle() {
    let project = Project::new();
    let file = project.write("src/add.wasm.js", module(&["add"]));

    let report = project.engine(BuildOptions::default()).process_file(&file).unwrap();
    assert_eq!(report.iterations, 1);
    assert_eq!(report.units.len(), 1);
    assert_eq!(report.units[0].name, "add");
    assert_eq!(report.units[0].bytes, 4);
    assert!(!report.units[0].skipped);
    assert_eq!(project.calls(), 1);

    let compiled = project.read(&file);
    assert!(compiled.contains("{s:1,t:0,d:'AAECAw=='}"));
    let pairs = marker::scan(&compiled);
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].name, "add");
    assert_eq!(&compiled[pairs[0].inner.clone()], "{s:1,t:0,d:'AAECAw=='}");

    let build_dir = project.build_dir(&file, "add");
    assert_eq!(fs::read(build_dir.join("final.wasm")).unwrap(), vec![0, 1, 2, 3]);
    assert!(build_dir.join("final.wat").exists());
    let record = BuildRecord::load(&build_dir).unwrap().unwrap();
    assert!(record.code_block.starts_with("{\n  name: 'add'"));

    let second = project.engine(BuildOptions::default()).process_file(&file).unwrap();
    assert_eq!(second.iterations, 0);
    assert!(second.is_empty());
    assert_eq!(project.calls(), 1);
    assert_eq!(project.read(&file), compiled);
}

#[test]
fn test_one_declaration_per_iteration() {
    let project = Project::new();
    let file = project.write("two.wasm.js", module(&["a", "b"]));
    let passes = Arc::new(Mutex::new(Vec::new()));
    let host = RecordingHost {
        inner: ScriptHost::new(),
        passes: passes.clone(),
    };
    let mut engine = Engine::new(
        Box::new(host),
        project.backends(),
        project.cache(),
        BuildOptions::default(),
    );

    let report = engine.process_file(&file).unwrap();
    assert_eq!(report.iterations, 2);
    let names: Vec<_> = report.units.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);

    let passes = passes.lock();
    assert_eq!(passes.len(), 3);
    assert!(passes[0].contains("name: 'a'"));
    assert!(!passes[1].contains("name: 'a'"));
    assert!(passes[1].contains("name: 'b'"));
    assert_eq!(marker::scan(&passes[1]).len(), 1);
    assert_eq!(marker::scan(&passes[2]).len(), 2);
}

#[test]
fn test_n_declarations_take_n_iterations() {
    let project = Project::new();
    let file = project.write("three.wasm.js", module(&["x", "y", "z"]));

    let report = project.engine(BuildOptions::default()).process_file(&file).unwrap();
    assert_eq!(report.iterations, 3);
    assert_eq!(project.calls(), 3);
}

#[test]
fn test_duplicate_name_stops_before_second_build() {
    let project = Project::new();
    let file = project.write("dup.wasm.js", module(&["unit", "unit"]));

    let result = project.engine(BuildOptions::default()).process_file(&file);
    assert!(matches!(
        result,
        Err(ProcessError::DuplicateName { ref name, .. }) if name == "unit"
    ));
    assert_eq!(project.calls(), 1);

    // the first site stays compiled, the second stays raw
    let content = project.read(&file);
    assert_eq!(marker::scan(&content).len(), 1);
    assert!(content.contains("name: 'unit'"));
}

#[test]
fn test_no_progress_is_fatal() {
    let project = Project::new();
    let file = project.write("stuck.wasm.js", declaration("unit1"));
    let mut engine = Engine::new(
        Box::new(StuckHost { passes: 0 }),
        project.backends(),
        project.cache(),
        BuildOptions::default(),
    );

    let result = engine.process_file(&file);
    assert!(matches!(
        result,
        Err(ProcessError::NoProgress { line: 1, column: 1, .. })
    ));
    assert_eq!(project.calls(), 1);
}

#[test]
fn test_memory_conflict_never_reaches_backend() {
    let project = Project::new();
    let source = "InWasm({\n  name: 'mem',\n  srctype: 'wat',\n  code: '(module)',\n  imports: { env: { memory: new WebAssembly.Memory({ initial: 1 }) } },\n  exports: { memory: new WebAssembly.Memory({ initial: 2, maximum: 20 }) }\n});\n";
    let file = project.write("mem.wasm.js", source);

    let result = project.engine(BuildOptions::default()).process_file(&file);
    assert!(matches!(
        result,
        Err(ProcessError::Cache(CacheError::Memory(MemoryError::Exclusivity { .. })))
    ));
    assert_eq!(project.calls(), 0);
    assert_eq!(project.read(&file), source);
}

#[test]
fn test_exported_memory_reaches_backend_settings() {
    let project = Project::new();
    let file = project.write(
        "exported.wasm.js",
        "InWasm({ name: 'm', srctype: 'wat', code: '(module)', exports: { memory: new WebAssembly.Memory({ initial: 2, maximum: 20 }) } });\n",
    );

    project.engine(BuildOptions::default()).process_file(&file).unwrap();
    let record = BuildRecord::load(&project.build_dir(&file, "m")).unwrap().unwrap();
    let descriptor = record.memory.descriptor.unwrap();
    assert_eq!((descriptor.initial, descriptor.maximum), (2, Some(20)));
}

#[test]
fn test_declaration_outside_run_is_protocol_error() {
    let project = Project::new();
    let file = project.write("bare.js", declaration("bare"));
    let literal = {
        let source = fs::read_to_string(&file).unwrap();
        let tree = inwasm_syntax::SyntaxTree::parse(&source).unwrap();
        inwasm_syntax::evaluate(&tree.calls()[0].arguments[0].tokens, &source)
    };
    assert!(matches!(
        inwasm_engine::declare(None, &literal),
        Err(inwasm_engine::CaptureError::MustRunCompiler)
    ));
}

#[test]
fn test_instantiated_declaration_rewrites_inner_literal() {
    let project = Project::new();
    let file = project.write(
        "inst.wasm.js",
        "const inst = InWasm({ name: 'a', srctype: 'wat', code: '(module)' })(imports);\n",
    );

    let report = project.engine(BuildOptions::default()).process_file(&file).unwrap();
    assert_eq!(report.iterations, 1);

    let compiled = project.read(&file);
    let pairs = marker::scan(&compiled);
    assert_eq!(pairs.len(), 1);
    assert_eq!(&compiled[pairs[0].inner.clone()], "{s:1,t:0,d:'AAECAw=='}");
    assert!(compiled.starts_with("const inst = InWasm(/*inwasm#"));
    assert!(compiled.ends_with("*/)(imports);\n"));
}

#[test]
fn test_unnamed_declaration_before_named_one() {
    let project = Project::new();
    let file = project.write(
        "mixed.wasm.js",
        "InWasm({});\nconst a = InWasm({ name: 'a', srctype: 'wat', code: '(module)' });\n",
    );

    let report = project.engine(BuildOptions::default()).process_file(&file).unwrap();
    assert_eq!(report.iterations, 1);
    assert_eq!(report.units[0].name, "a");
    assert!(project.read(&file).starts_with("InWasm({});\n"));
}

#[test]
fn test_bound_identifiers_feed_the_declaration() {
    let project = Project::new();
    let file = project.write(
        "bound.wasm.js",
        r#"const UNIT = 'unit';
export function load(env) {
  const importObj = { env: { memory: new WebAssembly.Memory({ initial: 3 }) } };
  return InWasm({ name: UNIT, srctype: 'wat', code: '(module)', imports: importObj });
}
"#,
    );

    let report = project.engine(BuildOptions::default()).process_file(&file).unwrap();
    assert_eq!(report.units[0].name, "unit");

    let record = BuildRecord::load(&project.build_dir(&file, "unit")).unwrap().unwrap();
    assert_eq!(record.memory.descriptor.unwrap().initial, 3);
    assert!(record.code_block.contains("imports: importObj"));
}
