//! Memory reflection
//!
//! Declarations carry a live linear-memory handle, not the descriptor it was
//! created from. The descriptor is recovered by probing the handle's growth
//! primitive and then replayed into backend linker flags.

use crate::declaration::Declaration;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Bytes per wasm page.
pub const PAGE_SIZE: usize = 65536;

/// Platform page limit for 32-bit memories.
pub const MAX_PAGES: u32 = 65536;

/// Errors that can occur during memory reflection
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// Both an imported and an exported memory were declared
    #[error("'{name}': memory must be either imported or exported, not both")]
    Exclusivity { name: String },
}

/// A growable linear memory, as seen through its handle.
pub trait LinearMemory: Send + Sync + fmt::Debug {
    /// Current size in bytes.
    fn byte_length(&self) -> usize;

    /// Grow by `delta` pages. Returns the previous size in pages, or `None`
    /// if the memory cannot grow that far.
    fn grow(&self, delta: u32) -> Option<u32>;

    /// Whether the memory is backed by a shared buffer.
    fn is_shared(&self) -> bool;
}

pub type MemoryHandle = Arc<dyn LinearMemory>;

/// Recovered memory parameters, in pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryDescriptor {
    pub initial: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<u32>,

    #[serde(default)]
    pub shared: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMode {
    Imported,
    #[default]
    Exported,
}

/// Memory settings handed to backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySettings {
    /// `None` if the declaration has no memory placeholder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<MemoryDescriptor>,

    pub mode: MemoryMode,
}

/// Derive memory settings from a declaration's memory placeholder.
///
/// Fails before any probing if the declaration both imports and exports a
/// memory.
pub fn reflect_memory(declaration: &Declaration) -> Result<MemorySettings, MemoryError> {
    let exported = declaration.exports.values().find_map(|stub| stub.memory());
    let imported = declaration
        .imports
        .iter()
        .flat_map(|modules| modules.values())
        .flat_map(|fields| fields.values())
        .find_map(|stub| stub.memory());

    match (imported, exported) {
        (Some(_), Some(_)) => Err(MemoryError::Exclusivity {
            name: declaration.name.clone(),
        }),
        (Some(handle), None) => Ok(MemorySettings {
            descriptor: Some(probe(handle.as_ref())),
            mode: MemoryMode::Imported,
        }),
        (None, Some(handle)) => Ok(MemorySettings {
            descriptor: Some(probe(handle.as_ref())),
            mode: MemoryMode::Exported,
        }),
        (None, None) => Ok(MemorySettings::default()),
    }
}

/// Probe a memory handle for its descriptor. Grows the memory.
pub fn probe(memory: &dyn LinearMemory) -> MemoryDescriptor {
    let initial = (memory.byte_length() / PAGE_SIZE) as u32;

    let maximum = if memory.grow(MAX_PAGES.saturating_sub(initial)).is_some() {
        None
    } else {
        let mut grown = 0;
        while memory.grow(1).is_some() {
            grown += 1;
        }
        Some(initial + grown)
    };

    MemoryDescriptor {
        initial,
        maximum,
        shared: memory.is_shared(),
    }
}

/// In-process memory placeholder built from a `new WebAssembly.Memory(...)`
/// descriptor. Only tracks its page count.
#[derive(Debug)]
pub struct HostMemory {
    pages: Mutex<u32>,
    maximum: Option<u32>,
    shared: bool,
}

impl HostMemory {
    pub fn new(initial: u32, maximum: Option<u32>, shared: bool) -> Self {
        Self {
            pages: Mutex::new(initial),
            maximum,
            shared,
        }
    }

    pub fn handle(initial: u32, maximum: Option<u32>, shared: bool) -> MemoryHandle {
        Arc::new(Self::new(initial, maximum, shared))
    }

    pub fn pages(&self) -> u32 {
        *self.pages.lock()
    }
}

impl LinearMemory for HostMemory {
    fn byte_length(&self) -> usize {
        *self.pages.lock() as usize * PAGE_SIZE
    }

    fn grow(&self, delta: u32) -> Option<u32> {
        let mut pages = self.pages.lock();
        let limit = self.maximum.unwrap_or(MAX_PAGES).min(MAX_PAGES);
        let old = *pages;
        let new = old.checked_add(delta).filter(|&n| n <= limit)?;
        *pages = new;
        Some(old)
    }

    fn is_shared(&self) -> bool {
        self.shared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::{ExportStub, SourceType};

    #[test]
    fn test_probe_bounded_memory() {
        let memory = HostMemory::new(2, Some(20), false);
        let descriptor = probe(&memory);
        assert_eq!(
            descriptor,
            MemoryDescriptor {
                initial: 2,
                maximum: Some(20),
                shared: false
            }
        );
    }

    #[test]
    fn test_probe_unbounded_memory() {
        let memory = HostMemory::new(1, None, true);
        let descriptor = probe(&memory);
        assert_eq!(descriptor.initial, 1);
        assert_eq!(descriptor.maximum, None);
        assert!(descriptor.shared);
    }

    #[test]
    fn test_probe_memory_at_its_maximum() {
        let memory = HostMemory::new(3, Some(3), false);
        assert_eq!(probe(&memory).maximum, Some(3));
    }

    #[test]
    fn test_reflect_modes() {
        let exported = Declaration::new("e", SourceType::Wat, "")
            .with_export("memory", ExportStub::Memory(HostMemory::handle(1, Some(4), false)));
        let settings = reflect_memory(&exported).unwrap();
        assert_eq!(settings.mode, MemoryMode::Exported);
        assert_eq!(settings.descriptor.unwrap().maximum, Some(4));

        let imported = Declaration::new("i", SourceType::Wat, "").with_import(
            "env",
            "memory",
            ExportStub::Memory(HostMemory::handle(1, None, false)),
        );
        assert_eq!(reflect_memory(&imported).unwrap().mode, MemoryMode::Imported);

        let none = Declaration::new("n", SourceType::Wat, "");
        assert_eq!(reflect_memory(&none).unwrap(), MemorySettings::default());
    }

    #[test]
    fn test_both_memories_rejected_before_probing() {
        let exported = HostMemory::handle(2, Some(20), false);
        let decl = Declaration::new("both", SourceType::ClangC, "")
            .with_export("memory", ExportStub::Memory(exported.clone()))
            .with_import("env", "memory", ExportStub::Memory(HostMemory::handle(1, None, false)));

        assert_eq!(
            reflect_memory(&decl),
            Err(MemoryError::Exclusivity {
                name: "both".to_string()
            })
        );
        assert_eq!(exported.byte_length(), 2 * PAGE_SIZE);
    }
}
