use super::{Backend, BackendError};
use crate::declaration::Declaration;
use crate::memory::MemorySettings;
use std::path::Path;

/// Forwards to the declaration's own runner.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomBackend;

impl Backend for CustomBackend {
    fn name(&self) -> &str {
        "custom"
    }

    fn compile(
        &self,
        declaration: &Declaration,
        build_dir: &Path,
        file: &Path,
        memory: &MemorySettings,
    ) -> Result<Vec<u8>, BackendError> {
        let runner = declaration
            .custom_runner
            .as_ref()
            .ok_or_else(|| BackendError::MissingRunner {
                name: declaration.name.clone(),
            })?;
        runner(declaration, build_dir, file, memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::SourceType;
    use std::sync::Arc;

    #[test]
    fn test_forwards_to_runner() {
        let decl = Declaration::new("c", SourceType::Custom, "payload").with_runner(Arc::new(
            |decl: &Declaration, _: &Path, _: &Path, _: &MemorySettings| Ok(decl.code.as_bytes().to_vec()),
        ));
        let bytes = CustomBackend
            .compile(&decl, Path::new("."), Path::new("c.js"), &MemorySettings::default())
            .unwrap();
        assert_eq!(bytes, b"payload");
    }

    #[test]
    fn test_missing_runner() {
        let decl = Declaration::new("c", SourceType::Custom, "");
        let result = CustomBackend.compile(&decl, Path::new("."), Path::new("c.js"), &MemorySettings::default());
        assert!(matches!(result, Err(BackendError::MissingRunner { .. })));
    }
}
