//! Discovery/rewrite loop
//!
//! One file is driven to a fixed point: execute it, resolve every captured
//! declaration to its call site, build it, splice the compiled record in,
//! write the file back and execute it again. The loop ends once a pass
//! captures nothing.

use crate::backend::BackendRegistry;
use crate::cache::{BuildCache, BuildOptions, CacheError};
use crate::capture::{CaptureSession, DISCOVERY_LOCK};
use crate::config::Config;
use crate::host::{HostError, ModuleHost, ScriptHost};
use crate::marker::{self, RunId};
use crate::resolve::{resolve_in_tree, ResolveError};
use crate::runtime::RuntimeRecord;
use crate::stack::{find_declaration_frame, parse_call_stack, DECLARATION_LABEL};
use inwasm_syntax::SyntaxTree;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that abort processing of one file
#[derive(Debug, Error)]
pub enum ProcessError {
    /// IO error reading or writing the source file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Executing the file failed
    #[error(transparent)]
    Host(#[from] HostError),

    /// A captured declaration could not be tied to its call site
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The same call site was resolved twice in a row
    #[error("unable to parse/compile InWasm call at {file}:{line}:{column}")]
    NoProgress { file: String, line: u32, column: u32 },

    /// Two declarations in one file share a name
    #[error("{file}: duplicate InWasm name '{name}'")]
    DuplicateName { file: String, name: String },

    /// Building a declaration failed
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Outcome for one compiled or reused declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    pub name: String,
    /// Size of the module in bytes
    pub bytes: usize,
    /// Reused from the build cache
    pub skipped: bool,
}

/// Result of [`Engine::process_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub file: PathBuf,
    /// Passes that captured at least one declaration
    pub iterations: usize,
    /// Handled declarations in handling order
    pub units: Vec<UnitReport>,
}

impl FileReport {
    fn new(file: &Path) -> Self {
        Self {
            file: file.to_path_buf(),
            iterations: 0,
            units: Vec::new(),
        }
    }

    pub fn compiled(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|unit| !unit.skipped)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|unit| unit.skipped)
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Drives files through discovery, build and rewrite.
pub struct Engine {
    host: Box<dyn ModuleHost + Send>,
    pub(crate) backends: BackendRegistry,
    pub(crate) cache: BuildCache,
    pub(crate) options: BuildOptions,
    session: CaptureSession,
    pub(crate) run_id: RunId,
}

impl Engine {
    pub fn new(
        host: Box<dyn ModuleHost + Send>,
        backends: BackendRegistry,
        cache: BuildCache,
        options: BuildOptions,
    ) -> Self {
        Self {
            host,
            backends,
            cache,
            options,
            session: CaptureSession::new(),
            run_id: RunId::generate(),
        }
    }

    /// Engine with the script host, toolchain backends and cache layout of
    /// `config`.
    pub fn from_config(config: &Config, options: BuildOptions) -> Self {
        Self::new(
            Box::new(ScriptHost::new()),
            BackendRegistry::with_toolchains(&config.tools),
            BuildCache::from_config(config),
            options,
        )
    }

    /// Start a new run. Markers written from now on carry the new run id.
    pub fn begin_run(&mut self) -> RunId {
        self.run_id = RunId::generate();
        tracing::debug!(run_id = %self.run_id, "begin run");
        self.run_id
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn options(&self) -> BuildOptions {
        self.options
    }

    pub fn cache(&self) -> &BuildCache {
        &self.cache
    }

    pub fn backends_mut(&mut self) -> &mut BackendRegistry {
        &mut self.backends
    }

    /// Compile every raw declaration in `file` and rewrite it in place.
    ///
    /// Each pass handles the declarations captured by one execution. An error
    /// aborts the file; passes written before it stay written.
    pub fn process_file(&mut self, file: &Path) -> Result<FileReport, ProcessError> {
        let _guard = DISCOVERY_LOCK.lock();

        let mut report = FileReport::new(file);
        let mut content = fs::read_to_string(file)?;
        if !content.contains(DECLARATION_LABEL) {
            return Ok(report);
        }

        let file_name = file.display().to_string();
        let mut handled: HashSet<String> = HashSet::new();
        let mut last_position = None;

        loop {
            self.session.clear();
            self.host.execute(file, &self.session)?;
            let records = self.session.take();
            if records.is_empty() {
                break;
            }
            report.iterations += 1;
            tracing::debug!(file = %file_name, pass = report.iterations, captured = records.len(), "discovery pass");

            let tree = SyntaxTree::parse(&content).map_err(|e| ResolveError::Syntax(e.to_string()))?;
            let mut rewritten = String::with_capacity(content.len());
            let mut last_end = 0;

            for record in records {
                let declaration = &record.declaration;
                if !handled.insert(declaration.name.clone()) {
                    return Err(ProcessError::DuplicateName {
                        file: file_name,
                        name: declaration.name.clone(),
                    });
                }

                let frames = parse_call_stack(&record.trace)?;
                let frame = find_declaration_frame(&frames, &file_name)?;
                let position = (frame.line, frame.column);
                if last_position == Some(position) {
                    return Err(ProcessError::NoProgress {
                        file: file_name,
                        line: frame.line,
                        column: frame.column,
                    });
                }
                last_position = Some(position);

                let block = resolve_in_tree(frame, &tree)?;
                if block.start < last_end {
                    return Err(ResolveError::Ambiguous {
                        line: frame.line,
                        column: frame.column,
                    }
                    .into());
                }

                let code_block = &content[block.start..block.end];
                let output = self
                    .cache
                    .build(declaration, file, code_block, &self.backends, self.options)?;

                let size = output.bytes.len();
                let runtime = RuntimeRecord::new(declaration, output.bytes).to_source();
                rewritten.push_str(&content[last_end..block.start]);
                rewritten.push_str(&marker::wrap(self.run_id, &declaration.name, &runtime));
                last_end = block.end;

                report.units.push(UnitReport {
                    name: declaration.name.clone(),
                    bytes: size,
                    skipped: output.skipped,
                });
            }

            rewritten.push_str(&content[last_end..]);
            fs::write(file, &rewritten)?;
            content = fs::read_to_string(file)?;
        }

        Ok(report)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("backends", &self.backends)
            .field("cache", &self.cache)
            .field("options", &self.options)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_without_declarations() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("plain.js");
        fs::write(&file, "console.log(1);\n").unwrap();

        let mut engine = Engine::new(
            Box::new(ScriptHost::new()),
            BackendRegistry::new(),
            BuildCache::new(temp.path().to_path_buf(), temp.path().join("b"), "wasm2wat"),
            BuildOptions::default(),
        );
        let report = engine.process_file(&file).unwrap();
        assert_eq!(report.iterations, 0);
        assert!(report.is_empty());
    }
}
