//! `final.wat` companion files
//!
//! The text form is produced by `wasm2wat` when it is available. Without it a
//! section listing is written instead, enough to eyeball what a build produced.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;
use std::process::Command;

const MAGIC: &[u8; 4] = b"\0asm";

/// Write the text companion of `wasm` to `wat`.
pub fn write_companion(wasm: &Path, wat: &Path, tool: &str) -> io::Result<()> {
    let status = Command::new(tool).arg(wasm).arg("-o").arg(wat).status();

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => {
            tracing::warn!(tool, %status, "disassembly failed, writing section listing");
            fs::write(wat, section_listing(&fs::read(wasm)?))
        }
        Err(err) => {
            tracing::debug!(tool, error = %err, "disassembler unavailable, writing section listing");
            fs::write(wat, section_listing(&fs::read(wasm)?))
        }
    }
}

/// Human-readable listing of a module's sections.
pub fn section_listing(bytes: &[u8]) -> String {
    let mut out = String::new();

    if bytes.len() < 8 || &bytes[..4] != MAGIC {
        let _ = writeln!(out, ";; not a wasm module ({} bytes)", bytes.len());
        return out;
    }

    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let _ = writeln!(out, ";; magic: \\00asm");
    let _ = writeln!(out, ";; version: {}", version);

    let mut pos = 8;
    while pos < bytes.len() {
        let id = bytes[pos];
        pos += 1;
        let Some((size, read)) = read_leb128(&bytes[pos..]) else {
            let _ = writeln!(out, ";; truncated section header at offset {}", pos - 1);
            break;
        };
        pos += read;
        let _ = writeln!(
            out,
            ";; section {:>2} {:<9} size {}",
            id,
            section_name(id),
            size
        );
        pos = pos.saturating_add(size as usize);
    }

    if pos > bytes.len() {
        let _ = writeln!(out, ";; last section runs past the end of the module");
    }
    out
}

fn section_name(id: u8) -> &'static str {
    match id {
        0 => "custom",
        1 => "type",
        2 => "import",
        3 => "function",
        4 => "table",
        5 => "memory",
        6 => "global",
        7 => "export",
        8 => "start",
        9 => "element",
        10 => "code",
        11 => "data",
        12 => "datacount",
        13 => "tag",
        _ => "unknown",
    }
}

/// Unsigned LEB128. Returns the value and the number of bytes read.
fn read_leb128(bytes: &[u8]) -> Option<(u32, usize)> {
    let mut result: u32 = 0;
    for (i, &byte) in bytes.iter().enumerate().take(5) {
        result |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    // (module (func (export "f")))
    const MODULE: &[u8] = &[
        0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
        0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type
        0x03, 0x02, 0x01, 0x00, // function
        0x07, 0x05, 0x01, 0x01, 0x66, 0x00, 0x00, // export
        0x0a, 0x04, 0x01, 0x02, 0x00, 0x0b, // code
    ];

    #[test]
    fn test_listing() {
        let listing = section_listing(MODULE);
        assert!(listing.contains(";; version: 1"));
        assert!(listing.contains("section  1 type      size 4"));
        assert!(listing.contains("section  7 export    size 5"));
        assert!(listing.contains("section 10 code      size 4"));
        assert!(!listing.contains("past the end"));
    }

    #[test]
    fn test_not_a_module() {
        assert!(section_listing(&[0, 1, 2, 3]).starts_with(";; not a wasm module"));
    }

    #[test]
    fn test_leb128() {
        assert_eq!(read_leb128(&[0xe5, 0x8e, 0x26]), Some((624485, 3)));
        assert_eq!(read_leb128(&[0x80]), None);
    }

    #[test]
    fn test_fallback_when_tool_missing() {
        let temp = tempfile::tempdir().unwrap();
        let wasm = temp.path().join("final.wasm");
        let wat = temp.path().join("final.wat");
        fs::write(&wasm, MODULE).unwrap();

        write_companion(&wasm, &wat, "inwasm-no-such-wasm2wat").unwrap();
        assert!(fs::read_to_string(&wat).unwrap().contains(";; magic"));
    }
}
