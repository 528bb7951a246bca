//! Runtime records
//!
//! A compiled call site holds `{s:<mode>,t:<type>,d:'<base64>'}` in place of
//! the declaration literal. Evaluating a declaration call either decodes such
//! a record or, for a raw declaration, defers to the capture session.

use crate::capture::{CaptureError, CaptureSession};
use crate::declaration::{Declaration, OutputMode, OutputType};
use data_encoding::BASE64;
use inwasm_syntax::LiteralValue;

/// Decoded compact record of a compiled declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeRecord {
    pub mode: OutputMode,
    pub output_type: OutputType,
    pub bytes: Vec<u8>,
}

impl RuntimeRecord {
    pub fn new(declaration: &Declaration, bytes: Vec<u8>) -> Self {
        Self {
            mode: declaration.mode,
            output_type: declaration.output_type,
            bytes,
        }
    }

    /// Source text that replaces the declaration literal.
    pub fn to_source(&self) -> String {
        format!(
            "{{s:{},t:{},d:'{}'}}",
            u8::from(self.mode),
            u8::from(self.output_type),
            BASE64.encode(&self.bytes)
        )
    }

    /// Decode a record literal. `Ok(None)` if the literal carries no `d`,
    /// meaning it is still a raw declaration.
    pub fn from_literal(literal: &LiteralValue) -> Result<Option<Self>, CaptureError> {
        let Some(data) = literal.get("d") else {
            return Ok(None);
        };
        let data = data
            .as_str()
            .ok_or_else(|| CaptureError::InvalidRecord(format!("'d' is a {}", data.type_name())))?;
        let bytes = BASE64
            .decode(data.as_bytes())
            .map_err(|e| CaptureError::InvalidRecord(e.to_string()))?;

        let mode: OutputMode = small_int(literal, "s")?
            .try_into()
            .map_err(CaptureError::InvalidRecord)?;
        let output_type: OutputType = small_int(literal, "t")?
            .try_into()
            .map_err(CaptureError::InvalidRecord)?;

        Ok(Some(Self {
            mode,
            output_type,
            bytes,
        }))
    }
}

/// Numeric record field, `0` when absent.
fn small_int(literal: &LiteralValue, key: &str) -> Result<u8, CaptureError> {
    match literal.get(key) {
        None => Ok(0),
        Some(value) => value
            .as_f64()
            .filter(|n| n.fract() == 0.0 && (0.0..=255.0).contains(n))
            .map(|n| n as u8)
            .ok_or_else(|| CaptureError::InvalidRecord(format!("'{}' is not a small integer", key))),
    }
}

/// What a declaration call evaluates to.
#[derive(Debug)]
pub enum Declare<'a> {
    /// Compiled site, ready to instantiate
    Resolved(RuntimeRecord),
    /// Raw declaration inside a compiling run; register it with the session
    Pending(&'a CaptureSession),
}

/// Evaluate a declaration call's literal.
///
/// Compiled records decode without touching the session. Raw declarations
/// need one and fail with [`CaptureError::MustRunCompiler`] outside a run.
pub fn declare<'a>(
    session: Option<&'a CaptureSession>,
    literal: &LiteralValue,
) -> Result<Declare<'a>, CaptureError> {
    if let Some(record) = RuntimeRecord::from_literal(literal)? {
        return Ok(Declare::Resolved(record));
    }
    session.map(Declare::Pending).ok_or(CaptureError::MustRunCompiler)
}
