//! Source file collection from command-line globs.

use anyhow::Context;
use std::path::{Path, PathBuf};

/// Directory names never searched for sources.
const SKIPPED_DIRS: [&str; 2] = ["node_modules", "dist"];

/// Turn a relative glob into an absolute one rooted at `base`.
pub fn absolute_pattern(pattern: &str, base: &Path) -> String {
    let pattern = pattern.strip_prefix("./").unwrap_or(pattern);
    if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        base.join(pattern).to_string_lossy().into_owned()
    }
}

/// Expand files and globs relative to `base` into a sorted, deduplicated
/// list of canonical source paths.
///
/// Paths inside hidden directories, `node_modules`, `dist` or `skip` (the
/// build root) are left out.
pub fn collect_sources(patterns: &[String], base: &Path, skip: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for pattern in patterns {
        let direct = base.join(pattern);
        if direct.is_file() {
            files.push(direct.canonicalize()?);
            continue;
        }

        let absolute = absolute_pattern(pattern, base);
        let entries = glob::glob(&absolute).with_context(|| format!("invalid pattern '{}'", pattern))?;
        for path in entries.flatten() {
            if !path.is_file() || is_skipped(&path, base, skip) {
                continue;
            }
            files.push(path.canonicalize()?);
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Whether `path` lies in a directory that is never searched.
pub fn is_skipped(path: &Path, base: &Path, skip: &Path) -> bool {
    if path.starts_with(skip) {
        return true;
    }
    let relative = path.strip_prefix(base).unwrap_or(path);
    let Some(dirs) = relative.parent() else {
        return false;
    };
    dirs.components().any(|component| {
        let name = component.as_os_str().to_string_lossy();
        (name.starts_with('.') && name != "." && name != "..") || SKIPPED_DIRS.contains(&name.as_ref())
    })
}
