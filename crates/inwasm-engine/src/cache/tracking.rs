//! Change detection for tracked files

use super::CacheError;
use crate::declaration::TrackMode;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Resolve tracked glob patterns against `root`.
///
/// Only regular files are returned, sorted and deduplicated. A leading `./`
/// is stripped; absolute patterns are used as given.
pub fn resolve_tracked(patterns: &[String], root: &Path) -> Result<Vec<PathBuf>, CacheError> {
    let mut files = Vec::new();
    for pattern in patterns {
        let relative = pattern.strip_prefix("./").unwrap_or(pattern);
        let full = root.join(relative);
        let entries = glob::glob(&full.to_string_lossy()).map_err(|e| CacheError::Pattern {
            pattern: pattern.clone(),
            reason: e.msg.to_string(),
        })?;
        files.extend(entries.filter_map(Result::ok).filter(|path| path.is_file()));
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Hash the files matched by `patterns`.
///
/// An empty pattern list hashes to `""`. Paths enter the hash relative to
/// `root`, so moving the whole project keeps its hashes.
pub fn track_hash(patterns: &[String], mode: TrackMode, root: &Path) -> Result<String, CacheError> {
    if patterns.is_empty() {
        return Ok(String::new());
    }

    let mut hasher = Sha256::new();
    for path in resolve_tracked(patterns, root)? {
        let relative = path.strip_prefix(root).unwrap_or(&path);
        hasher.update(relative.to_string_lossy().replace('\\', "/").as_bytes());
        hasher.update([0u8]);

        match mode {
            TrackMode::Content => hasher.update(fs::read(&path)?),
            TrackMode::Mtime => {
                let millis = fs::metadata(&path)?
                    .modified()?
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis())
                    .unwrap_or(0);
                hasher.update(millis.to_string().as_bytes());
            }
        }
        hasher.update([0u8]);
    }

    Ok(hex::encode(hasher.finalize()))
}
