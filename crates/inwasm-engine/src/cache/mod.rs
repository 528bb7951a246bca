//! Build cache
//!
//! Every compiled declaration owns a build directory keyed by source file and
//! declaration name:
//!
//! ```text
//! <build root>/
//! └── <source path relative to project root>/
//!     └── <declaration name>/
//!         ├── final.wasm
//!         ├── final.wat
//!         └── build.json
//! ```
//!
//! A stored build is reused when a freshly computed [`BuildRecord`] equals the
//! stored one, which covers the declaration, the reflected memory, the
//! call-site text and the tracked-file hash.

mod record;
pub mod tracking;

pub use record::{BuildRecord, RECORD_FILE};
pub use tracking::{resolve_tracked, track_hash};

use crate::backend::{BackendError, BackendRegistry};
use crate::config::Config;
use crate::declaration::Declaration;
use crate::disasm;
use crate::memory::{reflect_memory, MemoryError};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Compiled module inside a build directory.
pub const WASM_FILE: &str = "final.wasm";

/// Text companion of [`WASM_FILE`].
pub const WAT_FILE: &str = "final.wat";

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unreadable or unwritable build record
    #[error("build record error: {0}")]
    Json(#[from] serde_json::Error),

    /// Memory reflection failed
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// The backend failed or produced nothing
    #[error("compile error in '{name}': {source}")]
    Compile {
        name: String,
        #[source]
        source: BackendError,
    },

    /// A tracked pattern is not a valid glob
    #[error("invalid tracked pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },
}

/// Flags controlling cache reuse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Rebuild everything
    pub force: bool,
    /// Reuse builds even for non-cacheable declarations
    pub skip_existing: bool,
}

/// Result of [`BuildCache::build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub bytes: Vec<u8>,
    /// `true` if the stored build was reused
    pub skipped: bool,
}

/// On-disk build cache
#[derive(Debug, Clone)]
pub struct BuildCache {
    /// Root for relative source paths and tracked patterns
    project_root: PathBuf,
    /// Directory holding all build directories
    build_root: PathBuf,
    /// Disassembler for `final.wat`
    wasm2wat: String,
}

impl BuildCache {
    pub fn new(project_root: PathBuf, build_root: PathBuf, wasm2wat: impl Into<String>) -> Self {
        Self {
            project_root,
            build_root,
            wasm2wat: wasm2wat.into(),
        }
    }

    /// Cache laid out as `config` describes.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.root.clone(),
            config.build_root(),
            config.tools.wasm2wat.clone(),
        )
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn build_root(&self) -> &Path {
        &self.build_root
    }

    /// Build directory of declaration `name` in `file`.
    ///
    /// Files outside the project root keep their full path below the build
    /// root.
    pub fn build_dir_for(&self, file: &Path, name: &str) -> PathBuf {
        let relative: PathBuf = match file.strip_prefix(&self.project_root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => file
                .components()
                .filter(|c| matches!(c, Component::Normal(_)))
                .collect(),
        };
        self.build_root.join(relative).join(name)
    }

    /// Stored record of declaration `name` in `file`.
    pub fn load_record(&self, file: &Path, name: &str) -> Result<Option<BuildRecord>, CacheError> {
        BuildRecord::load(&self.build_dir_for(file, name))
    }

    /// Compute the record a build of `declaration` would store now.
    ///
    /// Probes the declaration's memory handle, if any.
    pub fn current_record(
        &self,
        declaration: &Declaration,
        code_block: &str,
    ) -> Result<BuildRecord, CacheError> {
        let memory = reflect_memory(declaration)?;
        let track_hash = track_hash(
            &declaration.track_changes,
            declaration.track_mode,
            &self.project_root,
        )?;

        Ok(BuildRecord {
            definition: declaration.snapshot(),
            memory,
            code_block: code_block.to_string(),
            track_hash,
        })
    }

    /// Build `declaration`, reusing the stored build when it is still valid.
    ///
    /// # Arguments
    /// * `declaration` - The captured declaration
    /// * `file` - Source file the declaration lives in
    /// * `code_block` - Call-site text, restored when the site is reprocessed
    /// * `backends` - Backend lookup by source type
    /// * `options` - Force and skip flags
    ///
    /// # Returns
    /// * `Ok(BuildOutput)` - Module bytes and whether they came from the cache
    /// * `Err(CacheError)` - Memory, tracking, backend or IO failure
    pub fn build(
        &self,
        declaration: &Declaration,
        file: &Path,
        code_block: &str,
        backends: &BackendRegistry,
        options: BuildOptions,
    ) -> Result<BuildOutput, CacheError> {
        let record = self.current_record(declaration, code_block)?;
        let build_dir = self.build_dir_for(file, &declaration.name);
        let wasm_path = build_dir.join(WASM_FILE);

        let reusable = !options.force
            && (declaration.is_cacheable() || options.skip_existing)
            && wasm_path.exists();
        if reusable {
            match BuildRecord::load(&build_dir) {
                Ok(Some(stored)) if stored == record => {
                    tracing::info!(name = %declaration.name, "skipping build, no changes");
                    return Ok(BuildOutput {
                        bytes: fs::read(&wasm_path)?,
                        skipped: true,
                    });
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(name = %declaration.name, error = %err, "ignoring unreadable build record");
                }
            }
        }

        fs::create_dir_all(&build_dir)?;
        let bytes = backends
            .compile(declaration, &build_dir, file, &record.memory)
            .map_err(|source| CacheError::Compile {
                name: declaration.name.clone(),
                source,
            })?;

        fs::write(&wasm_path, &bytes)?;
        disasm::write_companion(&wasm_path, &build_dir.join(WAT_FILE), &self.wasm2wat)?;
        record.save(&build_dir)?;

        Ok(BuildOutput {
            bytes,
            skipped: false,
        })
    }
}
