//! Declaration model
//!
//! A [`Declaration`] is one inline foreign-code unit as written in an
//! `InWasm({...})` call. [`DeclarationSnapshot`] is its serializable form,
//! stored in build records and compared on every cache lookup.

use crate::backend::BackendError;
use crate::memory::{MemoryHandle, MemorySettings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// What the runtime hands back for a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum OutputType {
    Instance = 0,
    Module = 1,
    Bytes = 2,
}

/// Whether the runtime bootstraps the module synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum OutputMode {
    Async = 0,
    Sync = 1,
}

impl From<OutputType> for u8 {
    fn from(value: OutputType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for OutputType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OutputType::Instance),
            1 => Ok(OutputType::Module),
            2 => Ok(OutputType::Bytes),
            other => Err(format!("invalid output type {}", other)),
        }
    }
}

impl OutputType {
    /// Parse the member name used in `OutputType.INSTANCE`.
    pub fn from_member(member: &str) -> Option<Self> {
        match member.to_ascii_uppercase().as_str() {
            "INSTANCE" => Some(OutputType::Instance),
            "MODULE" => Some(OutputType::Module),
            "BYTES" => Some(OutputType::Bytes),
            _ => None,
        }
    }
}

impl From<OutputMode> for u8 {
    fn from(value: OutputMode) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for OutputMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OutputMode::Async),
            1 => Ok(OutputMode::Sync),
            other => Err(format!("invalid output mode {}", other)),
        }
    }
}

impl OutputMode {
    /// Parse the member name used in `OutputMode.SYNC`.
    pub fn from_member(member: &str) -> Option<Self> {
        match member.to_ascii_uppercase().as_str() {
            "ASYNC" => Some(OutputMode::Async),
            "SYNC" => Some(OutputMode::Sync),
            _ => None,
        }
    }
}

/// Backend tag of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceType {
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C++")]
    Cpp,
    #[serde(rename = "Clang-C")]
    ClangC,
    #[serde(rename = "Clang-C++")]
    ClangCpp,
    #[serde(rename = "Zig")]
    Zig,
    #[serde(rename = "wat")]
    Wat,
    #[serde(rename = "custom")]
    Custom,
    #[serde(rename = "Rust")]
    Rust,
}

impl SourceType {
    pub const ALL: [SourceType; 8] = [
        SourceType::C,
        SourceType::Cpp,
        SourceType::ClangC,
        SourceType::ClangCpp,
        SourceType::Zig,
        SourceType::Wat,
        SourceType::Custom,
        SourceType::Rust,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::C => "C",
            SourceType::Cpp => "C++",
            SourceType::ClangC => "Clang-C",
            SourceType::ClangCpp => "Clang-C++",
            SourceType::Zig => "Zig",
            SourceType::Wat => "wat",
            SourceType::Custom => "custom",
            SourceType::Rust => "Rust",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown srctype '{}'", s))
    }
}

/// Hash mode for tracked files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackMode {
    /// Path plus modification time. Cheap, but blind to same-mtime edits.
    #[default]
    Mtime,
    /// SHA-256 over file contents.
    Content,
}

impl FromStr for TrackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mtime" => Ok(TrackMode::Mtime),
            "content" => Ok(TrackMode::Content),
            other => Err(format!("unknown trackMode '{}'", other)),
        }
    }
}

/// Exported or imported symbol stub. Only its kind matters; memory stubs
/// carry the live handle that memory reflection probes.
#[derive(Debug, Clone)]
pub enum ExportStub {
    Function,
    Global,
    Table,
    Memory(MemoryHandle),
}

impl ExportStub {
    pub fn kind(&self) -> ExportKind {
        match self {
            ExportStub::Function => ExportKind::Function,
            ExportStub::Global => ExportKind::Global,
            ExportStub::Table => ExportKind::Table,
            ExportStub::Memory(_) => ExportKind::Memory,
        }
    }

    pub fn memory(&self) -> Option<&MemoryHandle> {
        match self {
            ExportStub::Memory(handle) => Some(handle),
            _ => None,
        }
    }
}

/// Serialized kind of an [`ExportStub`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Function,
    Global,
    Table,
    Memory,
}

/// Import object: module name -> field name -> stub.
pub type ImportObject = BTreeMap<String, BTreeMap<String, ExportStub>>;

/// Extra compiler input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Macro defines, passed as `-DNAME=value`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub defines: BTreeMap<String, String>,

    /// Extra command-line switches, applied last
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub switches: Vec<String>,
}

/// Caller-supplied backend for `srctype: 'custom'`.
pub type CustomRunner = Arc<
    dyn Fn(&Declaration, &Path, &Path, &MemorySettings) -> Result<Vec<u8>, BackendError>
        + Send
        + Sync,
>;

/// One inline foreign-code unit.
#[derive(Clone)]
pub struct Declaration {
    /// Unique within a file. Empty means the declaration is inert.
    pub name: String,
    pub output_type: OutputType,
    pub mode: OutputMode,
    pub srctype: SourceType,
    pub code: String,
    pub exports: BTreeMap<String, ExportStub>,
    pub imports: Option<ImportObject>,
    pub compile: Option<CompileOptions>,
    pub custom_runner: Option<CustomRunner>,
    /// `None` means the srctype default (custom is never cached).
    pub no_cache: Option<bool>,
    pub track_changes: Vec<String>,
    pub track_mode: TrackMode,
}

impl Declaration {
    /// New declaration with runtime defaults (async instance, no options).
    pub fn new(name: impl Into<String>, srctype: SourceType, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output_type: OutputType::Instance,
            mode: OutputMode::Async,
            srctype,
            code: code.into(),
            exports: BTreeMap::new(),
            imports: None,
            compile: None,
            custom_runner: None,
            no_cache: None,
            track_changes: Vec::new(),
            track_mode: TrackMode::Mtime,
        }
    }

    pub fn with_output(mut self, output_type: OutputType, mode: OutputMode) -> Self {
        self.output_type = output_type;
        self.mode = mode;
        self
    }

    pub fn with_export(mut self, name: impl Into<String>, stub: ExportStub) -> Self {
        self.exports.insert(name.into(), stub);
        self
    }

    pub fn with_import(
        mut self,
        module: impl Into<String>,
        field: impl Into<String>,
        stub: ExportStub,
    ) -> Self {
        self.imports
            .get_or_insert_with(BTreeMap::new)
            .entry(module.into())
            .or_default()
            .insert(field.into(), stub);
        self
    }

    pub fn with_tracking(mut self, patterns: Vec<String>, mode: TrackMode) -> Self {
        self.track_changes = patterns;
        self.track_mode = mode;
        self
    }

    pub fn with_runner(mut self, runner: CustomRunner) -> Self {
        self.custom_runner = Some(runner);
        self
    }

    pub fn is_named(&self) -> bool {
        !self.name.is_empty()
    }

    /// Whether a stored build may be reused.
    pub fn is_cacheable(&self) -> bool {
        cacheable(self.srctype, self.no_cache)
    }

    pub fn snapshot(&self) -> DeclarationSnapshot {
        DeclarationSnapshot {
            name: self.name.clone(),
            output_type: self.output_type,
            mode: self.mode,
            srctype: self.srctype,
            code: self.code.clone(),
            exports: self
                .exports
                .iter()
                .map(|(name, stub)| (name.clone(), stub.kind()))
                .collect(),
            imports: self.imports.as_ref().map(|imports| {
                imports
                    .iter()
                    .map(|(module, fields)| {
                        let kinds = fields
                            .iter()
                            .map(|(field, stub)| (field.clone(), stub.kind()))
                            .collect();
                        (module.clone(), kinds)
                    })
                    .collect()
            }),
            compile: self.compile.clone(),
            no_cache: self.no_cache,
            track_changes: self.track_changes.clone(),
            track_mode: self.track_mode,
        }
    }
}

impl fmt::Debug for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Declaration")
            .field("name", &self.name)
            .field("output_type", &self.output_type)
            .field("mode", &self.mode)
            .field("srctype", &self.srctype)
            .field("exports", &self.exports)
            .field("imports", &self.imports)
            .field("compile", &self.compile)
            .field("custom_runner", &self.custom_runner.is_some())
            .field("no_cache", &self.no_cache)
            .field("track_changes", &self.track_changes)
            .field("track_mode", &self.track_mode)
            .finish_non_exhaustive()
    }
}

fn cacheable(srctype: SourceType, no_cache: Option<bool>) -> bool {
    match no_cache {
        Some(no_cache) => !no_cache,
        None => srctype != SourceType::Custom,
    }
}

/// Serializable form of a [`Declaration`], stored in `build.json`.
///
/// Live handles and runner callbacks are reduced to their kind or dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarationSnapshot {
    pub name: String,

    #[serde(rename = "type")]
    pub output_type: OutputType,

    pub mode: OutputMode,

    pub srctype: SourceType,

    pub code: String,

    #[serde(default)]
    pub exports: BTreeMap<String, ExportKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imports: Option<BTreeMap<String, BTreeMap<String, ExportKind>>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile: Option<CompileOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_cache: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub track_changes: Vec<String>,

    #[serde(default)]
    pub track_mode: TrackMode,
}

impl DeclarationSnapshot {
    pub fn is_cacheable(&self) -> bool {
        cacheable(self.srctype, self.no_cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_srctype_round_trips_through_str() {
        for srctype in SourceType::ALL {
            assert_eq!(srctype.as_str().parse::<SourceType>(), Ok(srctype));
        }
        assert!("Fortran".parse::<SourceType>().is_err());
    }

    #[test]
    fn test_custom_is_not_cacheable_by_default() {
        let custom = Declaration::new("x", SourceType::Custom, "");
        assert!(!custom.is_cacheable());

        let mut opted_in = custom.clone();
        opted_in.no_cache = Some(false);
        assert!(opted_in.is_cacheable());

        let mut wat = Declaration::new("y", SourceType::Wat, "(module)");
        assert!(wat.is_cacheable());
        wat.no_cache = Some(true);
        assert!(!wat.is_cacheable());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let decl = Declaration::new("add", SourceType::ClangC, "int x;")
            .with_output(OutputType::Bytes, OutputMode::Sync)
            .with_export("add", ExportStub::Function);
        let json = serde_json::to_value(decl.snapshot()).unwrap();

        assert_eq!(json["type"], 2);
        assert_eq!(json["mode"], 1);
        assert_eq!(json["srctype"], "Clang-C");
        assert_eq!(json["exports"]["add"], "function");
        assert_eq!(json["trackMode"], "mtime");
        assert!(json.get("noCache").is_none());
    }

    #[test]
    fn test_output_members() {
        assert_eq!(OutputType::from_member("INSTANCE"), Some(OutputType::Instance));
        assert_eq!(OutputType::from_member("Bytes"), Some(OutputType::Bytes));
        assert_eq!(OutputMode::from_member("SYNC"), Some(OutputMode::Sync));
        assert_eq!(OutputMode::from_member("LATER"), None);
    }
}
