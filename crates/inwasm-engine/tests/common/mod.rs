//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use inwasm_engine::{
    Backend, BackendError, BackendRegistry, BuildCache, BuildOptions, Declaration, Engine,
    MemorySettings, ScriptHost, SourceType,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Bytes every stub build produces.
pub const STUB_BYTES: [u8; 4] = [0, 1, 2, 3];

/// Backend returning fixed bytes and counting its invocations.
#[derive(Debug, Default)]
pub struct CountingBackend {
    calls: AtomicUsize,
}

impl CountingBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Backend for CountingBackend {
    fn name(&self) -> &str {
        "stub"
    }

    fn compile(
        &self,
        _declaration: &Declaration,
        _build_dir: &Path,
        _file: &Path,
        _memory: &MemorySettings,
    ) -> Result<Vec<u8>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(STUB_BYTES.to_vec())
    }
}

/// Temporary project with a counting backend registered for `wat`.
pub struct Project {
    _temp: TempDir,
    pub root: PathBuf,
    pub backend: Arc<CountingBackend>,
}

impl Project {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        Self {
            _temp: temp,
            root,
            backend: Arc::new(CountingBackend::default()),
        }
    }

    /// Write `content` to `relative` below the root and return its path.
    pub fn write(&self, relative: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    pub fn read(&self, path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    pub fn cache(&self) -> BuildCache {
        // no disassembler, final.wat falls back to the section listing
        BuildCache::new(
            self.root.clone(),
            self.root.join("inwasm-builds"),
            "inwasm-test-missing-wasm2wat",
        )
    }

    pub fn backends(&self) -> BackendRegistry {
        let mut backends = BackendRegistry::new();
        backends.register(SourceType::Wat, self.backend.clone());
        backends
    }

    /// Fresh engine, so a fresh run id, over the script host.
    pub fn engine(&self, options: BuildOptions) -> Engine {
        Engine::new(Box::new(ScriptHost::new()), self.backends(), self.cache(), options)
    }

    pub fn build_dir(&self, file: &Path, name: &str) -> PathBuf {
        self.cache().build_dir_for(file, name)
    }

    pub fn calls(&self) -> usize {
        self.backend.calls()
    }
}

/// Source of a `wat` declaration named `name`.
pub fn declaration(name: &str) -> String {
    format!(
        "InWasm({{\n  name: '{}',\n  type: OutputType.INSTANCE,\n  mode: OutputMode.SYNC,\n  srctype: 'wat',\n  exports: {{ run: () => 0 }},\n  code: '(module)'\n}})",
        name
    )
}

/// Module declaring each of `names` in order.
pub fn module(names: &[&str]) -> String {
    let mut source = String::from("const { InWasm, OutputMode, OutputType } = require('inwasm');\n");
    for name in names {
        source.push_str(&format!("\nconst {} = {};\n", name, declaration(name)));
    }
    source
}
