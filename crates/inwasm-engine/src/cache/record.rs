//! Build record (build.json)

use super::CacheError;
use crate::declaration::DeclarationSnapshot;
use crate::memory::MemorySettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// File name of the record inside a build directory.
pub const RECORD_FILE: &str = "build.json";

/// Everything a build depended on, plus the original call-site text.
///
/// A stored build is reused only if a freshly computed record is equal to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    /// Serialized declaration
    pub definition: DeclarationSnapshot,

    /// Reflected memory settings
    #[serde(default)]
    pub memory: MemorySettings,

    /// Source text of the call-site block before it was compiled
    pub code_block: String,

    /// Hash over the tracked files, empty without tracking
    #[serde(default)]
    pub track_hash: String,
}

impl BuildRecord {
    /// Load a record from `build_dir`, `None` if there is none.
    pub fn load(build_dir: &Path) -> Result<Option<Self>, CacheError> {
        let path = build_dir.join(RECORD_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Write the record into `build_dir`.
    pub fn save(&self, build_dir: &Path) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(build_dir.join(RECORD_FILE), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::{Declaration, SourceType};

    #[test]
    fn test_save_and_load() {
        let temp = tempfile::tempdir().unwrap();
        let record = BuildRecord {
            definition: Declaration::new("add", SourceType::Wat, "(module)").snapshot(),
            memory: MemorySettings::default(),
            code_block: "{ name: 'add' }".to_string(),
            track_hash: String::new(),
        };

        assert_eq!(BuildRecord::load(temp.path()).unwrap(), None);
        record.save(temp.path()).unwrap();
        assert_eq!(BuildRecord::load(temp.path()).unwrap(), Some(record));

        let json = fs::read_to_string(temp.path().join(RECORD_FILE)).unwrap();
        assert!(json.contains("\"codeBlock\""));
        assert!(json.contains("\"trackHash\""));
    }

    #[test]
    fn test_corrupt_record() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join(RECORD_FILE), "{ not json").unwrap();
        assert!(matches!(BuildRecord::load(temp.path()), Err(CacheError::Json(_))));
    }
}
