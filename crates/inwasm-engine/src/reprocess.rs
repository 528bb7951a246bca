//! Reprocessing of compiled call sites
//!
//! Sites compiled by an earlier run are restored to their declaration text
//! when their build is due again, so the next discovery pass recompiles them.

use crate::cache::{track_hash, BuildRecord, CacheError};
use crate::capture::DISCOVERY_LOCK;
use crate::engine::{Engine, ProcessError};
use crate::marker;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Non-fatal findings of a reprocessing scan
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReprocessWarning {
    /// A marked site has no build record; it stays compiled
    #[error("{file}: lost build cache for '{name}', leaving the compiled site in place")]
    LostCache { file: PathBuf, name: String },
}

/// Result of [`Engine::reprocess`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReprocessReport {
    /// Names whose declaration text was restored
    pub restored: Vec<String>,
    pub warnings: Vec<ReprocessWarning>,
}

impl ReprocessReport {
    /// Whether discovery has to run again.
    pub fn rerun(&self) -> bool {
        !self.restored.is_empty()
    }
}

impl Engine {
    /// Restore every site of `file` compiled by another run whose build is
    /// due. Writes the file only if something was restored.
    ///
    /// A build is due when `force` is set, the declaration is not cacheable,
    /// or the hash of its tracked files changed.
    pub fn reprocess(&mut self, file: &Path) -> Result<ReprocessReport, ProcessError> {
        let _guard = DISCOVERY_LOCK.lock();

        let content = fs::read_to_string(file)?;
        let mut report = ReprocessReport::default();
        let mut rewritten = String::with_capacity(content.len());
        let mut last_end = 0;

        for pair in marker::scan(&content)
            .into_iter()
            .filter(|pair| pair.run_id != self.run_id)
        {
            let Some(record) = self.cache.load_record(file, &pair.name)? else {
                let warning = ReprocessWarning::LostCache {
                    file: file.to_path_buf(),
                    name: pair.name,
                };
                tracing::warn!("{}", warning);
                report.warnings.push(warning);
                continue;
            };

            if !self.is_due(&record)? {
                continue;
            }

            tracing::info!(file = %file.display(), name = %pair.name, "restoring declaration");
            rewritten.push_str(&content[last_end..pair.range.start]);
            rewritten.push_str(&record.code_block);
            last_end = pair.range.end;
            report.restored.push(pair.name);
        }

        if report.rerun() {
            rewritten.push_str(&content[last_end..]);
            fs::write(file, rewritten)?;
        }
        Ok(report)
    }

    /// Union of the tracked patterns of every compiled site in `file`.
    pub fn tracked_patterns(&self, file: &Path) -> Result<BTreeSet<String>, ProcessError> {
        let content = fs::read_to_string(file)?;
        let mut patterns = BTreeSet::new();
        for pair in marker::scan(&content) {
            if let Some(record) = self.cache.load_record(file, &pair.name)? {
                patterns.extend(record.definition.track_changes);
            }
        }
        Ok(patterns)
    }

    fn is_due(&self, record: &BuildRecord) -> Result<bool, CacheError> {
        let definition = &record.definition;
        if self.options.force || !definition.is_cacheable() {
            return Ok(true);
        }
        let current = track_hash(
            &definition.track_changes,
            definition.track_mode,
            self.cache.project_root(),
        )?;
        Ok(current != record.track_hash)
    }
}
