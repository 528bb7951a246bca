//! Declaration capture
//!
//! While a file is executed for discovery, every unresolved declaration call
//! registers itself with the run's [`CaptureSession`]. Registration records the
//! declaration plus the trace at the call and answers with [`CaptureSignal`],
//! which the host must treat as "stop executing this file now". Only one
//! unresolved declaration is therefore observed per pass.

use crate::declaration::Declaration;
use parking_lot::Mutex;
use std::fmt;
use thiserror::Error;

/// Serializes discovery loops across files.
///
/// Sessions are threaded explicitly, but a file's discovery loop rewrites it
/// between passes, and watch events for different files may arrive together.
pub static DISCOVERY_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Errors of the capture protocol
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// A declaration executed outside a compiling run
    #[error("must run \"inwasm\"")]
    MustRunCompiler,

    /// A resolved runtime record that cannot be decoded
    #[error("invalid runtime record: {0}")]
    InvalidRecord(String),
}

/// Tells the host to unwind out of the current file.
///
/// Distinct from every error type so it can never be mistaken for a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSignal;

impl fmt::Display for CaptureSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InWasmCapture: exit")
    }
}

/// A declaration plus the trace captured at its call.
#[derive(Debug, Clone)]
pub struct CaptureRecord {
    pub declaration: Declaration,
    pub trace: String,
}

/// Run-scoped capture buffer.
#[derive(Debug, Default)]
pub struct CaptureSession {
    records: Mutex<Vec<CaptureRecord>>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a declaration call.
    ///
    /// Unnamed declarations are inert and return `Ok(())`; the host keeps
    /// executing. Named ones are recorded and answered with the signal.
    pub fn register(
        &self,
        declaration: Declaration,
        trace: impl Into<String>,
    ) -> Result<(), CaptureSignal> {
        if !declaration.is_named() {
            return Ok(());
        }
        tracing::debug!(name = %declaration.name, "captured declaration");
        self.records.lock().push(CaptureRecord {
            declaration,
            trace: trace.into(),
        });
        Err(CaptureSignal)
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Drain the records of the current pass.
    pub fn take(&self) -> Vec<CaptureRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::SourceType;

    #[test]
    fn test_named_declaration_signals() {
        let session = CaptureSession::new();
        let result = session.register(Declaration::new("a", SourceType::Wat, ""), "trace");
        assert_eq!(result, Err(CaptureSignal));
        assert_eq!(session.len(), 1);

        let records = session.take();
        assert_eq!(records[0].declaration.name, "a");
        assert_eq!(records[0].trace, "trace");
        assert!(session.is_empty());
    }

    #[test]
    fn test_unnamed_declaration_is_ignored() {
        let session = CaptureSession::new();
        assert_eq!(
            session.register(Declaration::new("", SourceType::Wat, ""), "trace"),
            Ok(())
        );
        assert!(session.is_empty());
    }

    #[test]
    fn test_clear() {
        let session = CaptureSession::new();
        let _ = session.register(Declaration::new("a", SourceType::Wat, ""), "t");
        session.clear();
        assert!(session.is_empty());
    }
}
