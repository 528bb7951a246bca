//! Compiler backends
//!
//! Every backend turns a declaration into wasm bytes inside its private build
//! directory. The engine only depends on [`Backend`]; which backend handles a
//! declaration is decided by its [`SourceType`] through [`BackendRegistry`].

mod custom;
mod toolchain;

pub use custom::CustomBackend;
pub use toolchain::{memory_link_flags, Toolchain, ToolchainBackend};

use crate::config::ToolsConfig;
use crate::declaration::{Declaration, SourceType};
use crate::memory::MemorySettings;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by backends
#[derive(Debug, Error)]
pub enum BackendError {
    /// IO error in the build directory
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend produced no bytes
    #[error("compile error: '{name}' produced no output")]
    EmptyOutput { name: String },

    /// `srctype: 'custom'` without a runner
    #[error("no customRunner defined for '{name}'")]
    MissingRunner { name: String },

    /// No backend registered for the srctype
    #[error("no backend registered for srctype '{0}'")]
    Unsupported(SourceType),

    /// An external tool failed
    #[error("{tool} failed with {status}")]
    ToolFailed { tool: String, status: String },

    /// An external tool could not be started
    #[error("cannot run {tool}: {source}")]
    ToolMissing {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Failure reported by a custom runner
    #[error("{0}")]
    Custom(String),
}

/// Uniform compile contract.
pub trait Backend: Send + Sync {
    /// Name used in log output
    fn name(&self) -> &str;

    /// Compile `declaration` from `file` inside `build_dir`.
    fn compile(
        &self,
        declaration: &Declaration,
        build_dir: &Path,
        file: &Path,
        memory: &MemorySettings,
    ) -> Result<Vec<u8>, BackendError>;
}

/// Maps source types to backends.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<SourceType, Arc<dyn Backend>>,
}

impl BackendRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the toolchain backends for every source type and the
    /// custom forwarder.
    pub fn with_toolchains(tools: &ToolsConfig) -> Self {
        let mut registry = Self::new();
        for srctype in SourceType::ALL {
            match Toolchain::for_source(srctype) {
                Some(toolchain) => {
                    let tool = toolchain.executable(tools).to_string();
                    registry.register(srctype, Arc::new(ToolchainBackend::new(toolchain, tool)));
                }
                None => registry.register(srctype, Arc::new(CustomBackend)),
            }
        }
        registry
    }

    /// Register or replace the backend for `srctype`.
    pub fn register(&mut self, srctype: SourceType, backend: Arc<dyn Backend>) {
        self.backends.insert(srctype, backend);
    }

    pub fn get(&self, srctype: SourceType) -> Result<&Arc<dyn Backend>, BackendError> {
        self.backends
            .get(&srctype)
            .ok_or(BackendError::Unsupported(srctype))
    }

    /// Run the backend for `declaration`. Empty output is an error.
    pub fn compile(
        &self,
        declaration: &Declaration,
        build_dir: &Path,
        file: &Path,
        memory: &MemorySettings,
    ) -> Result<Vec<u8>, BackendError> {
        let backend = self.get(declaration.srctype)?;
        tracing::info!(
            backend = backend.name(),
            name = %declaration.name,
            build_dir = %build_dir.display(),
            "compiling"
        );
        let bytes = backend.compile(declaration, build_dir, file, memory)?;
        if bytes.is_empty() {
            return Err(BackendError::EmptyOutput {
                name: declaration.name.clone(),
            });
        }
        Ok(bytes)
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self
            .backends
            .iter()
            .map(|(srctype, backend)| (srctype.as_str(), backend.name()))
            .collect();
        names.sort();
        f.debug_map().entries(names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<u8>);

    impl Backend for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn compile(
            &self,
            _: &Declaration,
            _: &Path,
            _: &Path,
            _: &MemorySettings,
        ) -> Result<Vec<u8>, BackendError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_unregistered_srctype() {
        let registry = BackendRegistry::new();
        let decl = Declaration::new("x", SourceType::Zig, "");
        let result = registry.compile(&decl, Path::new("."), Path::new("x.js"), &MemorySettings::default());
        assert!(matches!(result, Err(BackendError::Unsupported(SourceType::Zig))));
    }

    #[test]
    fn test_empty_output_is_compile_error() {
        let mut registry = BackendRegistry::new();
        registry.register(SourceType::Wat, Arc::new(Fixed(Vec::new())));
        let decl = Declaration::new("empty", SourceType::Wat, "");
        let result = registry.compile(&decl, Path::new("."), Path::new("x.js"), &MemorySettings::default());
        assert!(matches!(result, Err(BackendError::EmptyOutput { ref name }) if name == "empty"));
    }

    #[test]
    fn test_default_registry_covers_every_srctype() {
        let registry = BackendRegistry::with_toolchains(&ToolsConfig::default());
        for srctype in SourceType::ALL {
            assert!(registry.get(srctype).is_ok(), "{} has no backend", srctype);
        }
        assert_eq!(registry.get(SourceType::Custom).unwrap().name(), "custom");
        assert_eq!(registry.get(SourceType::Wat).unwrap().name(), "wat");
    }
}
