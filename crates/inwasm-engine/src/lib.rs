//! Build-time compiler for inline WebAssembly declarations.
//!
//! Source files declare foreign code through `InWasm({...})` calls. The
//! [`Engine`] discovers those calls by executing the file through a
//! [`ModuleHost`], builds each declaration with a [`Backend`] and rewrites the
//! call site in place with a compact runtime record.

pub mod backend;
pub mod cache;
pub mod capture;
pub mod config;
pub mod declaration;
pub mod disasm;
pub mod engine;
pub mod host;
pub mod marker;
pub mod memory;
pub mod reprocess;
pub mod resolve;
pub mod runtime;
pub mod stack;

pub use backend::{Backend, BackendError, BackendRegistry, CustomBackend, Toolchain, ToolchainBackend};
pub use cache::{BuildCache, BuildOptions, BuildOutput, BuildRecord, CacheError};
pub use capture::{CaptureError, CaptureRecord, CaptureSession, CaptureSignal};
pub use config::{find_project_root, Config, ConfigError};
pub use declaration::{
    CompileOptions, CustomRunner, Declaration, DeclarationSnapshot, ExportKind, ExportStub,
    ImportObject, OutputMode, OutputType, SourceType, TrackMode,
};
pub use engine::{Engine, FileReport, ProcessError, UnitReport};
pub use host::{ExecOutcome, HostError, ModuleHost, ScriptHost};
pub use marker::{MarkerPair, RunId};
pub use memory::{
    reflect_memory, HostMemory, LinearMemory, MemoryDescriptor, MemoryError, MemoryHandle,
    MemoryMode, MemorySettings,
};
pub use reprocess::{ReprocessReport, ReprocessWarning};
pub use resolve::{resolve_call_site, CallSiteBlock, ResolveError};
pub use runtime::{declare, Declare, RuntimeRecord};
pub use stack::{find_declaration_frame, parse_call_stack, StackFrame};
