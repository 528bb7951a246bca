//! Backends that shell out to a wasm toolchain.

use super::{Backend, BackendError};
use crate::config::ToolsConfig;
use crate::declaration::{Declaration, ExportKind, SourceType};
use crate::memory::{MemoryMode, MemorySettings, PAGE_SIZE};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// External toolchain flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toolchain {
    /// `wat2wasm`
    Wat,
    /// `clang --target=wasm32-unknown-unknown`
    Clang { cpp: bool },
    /// `zig build-lib -target wasm32-freestanding`
    Zig,
    /// `cargo rustc --target wasm32-unknown-unknown`
    Rust,
    /// `emcc`
    Emscripten { cpp: bool },
}

impl Toolchain {
    /// `None` for `custom`, which has no toolchain.
    pub fn for_source(srctype: SourceType) -> Option<Self> {
        match srctype {
            SourceType::Wat => Some(Toolchain::Wat),
            SourceType::ClangC => Some(Toolchain::Clang { cpp: false }),
            SourceType::ClangCpp => Some(Toolchain::Clang { cpp: true }),
            SourceType::Zig => Some(Toolchain::Zig),
            SourceType::Rust => Some(Toolchain::Rust),
            SourceType::C => Some(Toolchain::Emscripten { cpp: false }),
            SourceType::Cpp => Some(Toolchain::Emscripten { cpp: true }),
            SourceType::Custom => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Toolchain::Wat => "wat",
            Toolchain::Clang { cpp: false } => "clang-c",
            Toolchain::Clang { cpp: true } => "clang-c++",
            Toolchain::Zig => "zig",
            Toolchain::Rust => "rust",
            Toolchain::Emscripten { cpp: false } => "emscripten-c",
            Toolchain::Emscripten { cpp: true } => "emscripten-c++",
        }
    }

    /// Configured executable for this toolchain.
    pub fn executable<'a>(&self, tools: &'a ToolsConfig) -> &'a str {
        match self {
            Toolchain::Wat => &tools.wat2wasm,
            Toolchain::Clang { .. } => &tools.clang,
            Toolchain::Zig => &tools.zig,
            Toolchain::Rust => &tools.cargo,
            Toolchain::Emscripten { .. } => &tools.emcc,
        }
    }
}

/// Raw wasm-ld memory flags for `memory`.
pub fn memory_link_flags(memory: &MemorySettings) -> Vec<String> {
    let mut flags = Vec::new();
    if let Some(descriptor) = memory.descriptor {
        flags.push(format!(
            "--initial-memory={}",
            descriptor.initial as usize * PAGE_SIZE
        ));
        if let Some(maximum) = descriptor.maximum {
            flags.push(format!("--max-memory={}", maximum as usize * PAGE_SIZE));
        }
        if descriptor.shared {
            flags.push("--shared-memory".to_string());
        }
    }
    if memory.mode == MemoryMode::Imported {
        flags.push("--import-memory".to_string());
    }
    flags
}

/// Backend running one external toolchain.
#[derive(Debug, Clone)]
pub struct ToolchainBackend {
    toolchain: Toolchain,
    tool: String,
}

impl ToolchainBackend {
    pub fn new(toolchain: Toolchain, tool: impl Into<String>) -> Self {
        Self {
            toolchain,
            tool: tool.into(),
        }
    }

    /// Command-line arguments and the path of the produced module.
    fn plan(
        &self,
        declaration: &Declaration,
        build_dir: &Path,
        memory: &MemorySettings,
    ) -> Result<(Vec<String>, PathBuf), BackendError> {
        let name = &declaration.name;
        let target = format!("{}.wasm", name);
        let defines = defines(declaration);
        let switches = declaration
            .compile
            .as_ref()
            .map(|c| c.switches.clone())
            .unwrap_or_default();

        let (args, output) = match self.toolchain {
            Toolchain::Wat => {
                let src = format!("{}.wat", name);
                fs::write(build_dir.join(&src), &declaration.code)?;
                (vec![src, "-o".to_string(), target.clone()], build_dir.join(&target))
            }
            Toolchain::Clang { cpp } => {
                let src = format!("{}.{}", name, if cpp { "cpp" } else { "c" });
                fs::write(build_dir.join(&src), &declaration.code)?;

                let mut args = vec![
                    "--target=wasm32-unknown-unknown".to_string(),
                    "--no-standard-libraries".to_string(),
                    "-Wl,--no-entry".to_string(),
                    "-Wl,--lto-O3".to_string(),
                    "-O3".to_string(),
                    "-flto".to_string(),
                ];
                if cpp {
                    args.push("-fno-exceptions".to_string());
                }
                args.extend(
                    exported_symbols(declaration)
                        .map(|symbol| format!("-Wl,--export={}", symbol)),
                );
                args.extend(memory_link_flags(memory).into_iter().map(|f| format!("-Wl,{}", f)));
                args.extend(defines);
                args.extend(switches);
                args.extend(["-o".to_string(), target.clone(), src]);
                (args, build_dir.join(&target))
            }
            Toolchain::Zig => {
                let src = format!("{}.zig", name);
                fs::write(build_dir.join(&src), &declaration.code)?;

                let mut args = vec![
                    "build-lib".to_string(),
                    src,
                    "-target".to_string(),
                    "wasm32-freestanding".to_string(),
                    "-dynamic".to_string(),
                    "-O".to_string(),
                    "ReleaseFast".to_string(),
                ];
                args.extend(exported_symbols(declaration).map(|symbol| format!("--export={}", symbol)));
                args.extend(memory_link_flags(memory));
                args.extend(switches);
                (args, build_dir.join(&target))
            }
            Toolchain::Rust => {
                let crate_name = name.replace('-', "_");
                fs::create_dir_all(build_dir.join("src"))?;
                fs::write(build_dir.join("src").join("lib.rs"), &declaration.code)?;
                fs::write(
                    build_dir.join("Cargo.toml"),
                    format!(
                        "[package]\nname = \"{}\"\nversion = \"0.0.0\"\nedition = \"2021\"\n\n\
                         [lib]\ncrate-type = [\"cdylib\"]\n\n[profile.release]\nlto = true\n\n[workspace]\n",
                        crate_name
                    ),
                )?;

                let mut args = vec![
                    "rustc".to_string(),
                    "--target".to_string(),
                    "wasm32-unknown-unknown".to_string(),
                    "--release".to_string(),
                    "--".to_string(),
                ];
                args.extend(
                    memory_link_flags(memory)
                        .into_iter()
                        .map(|f| format!("-Clink-arg={}", f)),
                );
                args.extend(switches);
                let output = build_dir
                    .join("target")
                    .join("wasm32-unknown-unknown")
                    .join("release")
                    .join(format!("{}.wasm", crate_name));
                (args, output)
            }
            Toolchain::Emscripten { cpp } => {
                let src = format!("{}.{}", name, if cpp { "cpp" } else { "c" });
                fs::write(build_dir.join(&src), &declaration.code)?;

                let functions: Vec<String> = declaration
                    .exports
                    .iter()
                    .filter(|(_, stub)| stub.kind() == ExportKind::Function)
                    .map(|(symbol, _)| format!("\"_{}\"", symbol))
                    .collect();

                let mut args = vec!["-O3".to_string()];
                args.extend(defines);
                args.extend([
                    "-s".to_string(),
                    format!("EXPORTED_FUNCTIONS=[{}]", functions.join(",")),
                ]);
                args.extend(emscripten_memory_settings(memory));
                args.extend(switches);
                args.extend(
                    ["ERROR_ON_UNDEFINED_SYMBOLS=0", "WARN_ON_UNDEFINED_SYMBOLS=0"]
                        .into_iter()
                        .flat_map(|setting| ["-s".to_string(), setting.to_string()]),
                );
                args.extend(["--no-entry".to_string(), src, "-o".to_string(), target.clone()]);
                (args, build_dir.join(&target))
            }
        };

        Ok((args, output))
    }

    fn run(&self, args: &[String], build_dir: &Path) -> Result<(), BackendError> {
        tracing::info!(
            backend = self.toolchain.name(),
            command = %format!("{} {}", self.tool, args.join(" ")),
            "running toolchain"
        );
        let status = Command::new(&self.tool)
            .args(args)
            .current_dir(build_dir)
            .status()
            .map_err(|source| BackendError::ToolMissing {
                tool: self.tool.clone(),
                source,
            })?;

        if !status.success() {
            return Err(BackendError::ToolFailed {
                tool: self.tool.clone(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

impl Backend for ToolchainBackend {
    fn name(&self) -> &str {
        self.toolchain.name()
    }

    fn compile(
        &self,
        declaration: &Declaration,
        build_dir: &Path,
        _file: &Path,
        memory: &MemorySettings,
    ) -> Result<Vec<u8>, BackendError> {
        fs::create_dir_all(build_dir)?;
        let (args, output) = self.plan(declaration, build_dir, memory)?;
        self.run(&args, build_dir)?;
        Ok(fs::read(output)?)
    }
}

/// Function and global exports, the symbols the linker must keep.
fn exported_symbols(declaration: &Declaration) -> impl Iterator<Item = &String> {
    declaration
        .exports
        .iter()
        .filter(|(_, stub)| matches!(stub.kind(), ExportKind::Function | ExportKind::Global))
        .map(|(symbol, _)| symbol)
}

fn defines(declaration: &Declaration) -> Vec<String> {
    declaration
        .compile
        .iter()
        .flat_map(|c| c.defines.iter())
        .map(|(name, value)| format!("-D{}={}", name, value))
        .collect()
}

fn emscripten_memory_settings(memory: &MemorySettings) -> Vec<String> {
    let mut settings = Vec::new();
    if let Some(descriptor) = memory.descriptor {
        settings.push(format!(
            "INITIAL_MEMORY={}",
            descriptor.initial as usize * PAGE_SIZE
        ));
        if let Some(maximum) = descriptor.maximum.filter(|&max| max != descriptor.initial) {
            settings.push(format!("MAXIMUM_MEMORY={}", maximum as usize * PAGE_SIZE));
            settings.push("ALLOW_MEMORY_GROWTH=1".to_string());
        }
        if descriptor.shared {
            settings.push("SHARED_MEMORY=1".to_string());
        }
    }
    if memory.mode == MemoryMode::Imported {
        settings.push("IMPORTED_MEMORY=1".to_string());
    }
    settings
        .into_iter()
        .flat_map(|setting| ["-s".to_string(), setting])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::{CompileOptions, ExportStub};
    use crate::memory::MemoryDescriptor;

    fn bounded_import() -> MemorySettings {
        MemorySettings {
            descriptor: Some(MemoryDescriptor {
                initial: 2,
                maximum: Some(20),
                shared: false,
            }),
            mode: MemoryMode::Imported,
        }
    }

    #[test]
    fn test_memory_link_flags() {
        assert_eq!(
            memory_link_flags(&bounded_import()),
            vec![
                "--initial-memory=131072".to_string(),
                "--max-memory=1310720".to_string(),
                "--import-memory".to_string(),
            ]
        );
        assert!(memory_link_flags(&MemorySettings::default()).is_empty());
    }

    #[test]
    fn test_clang_plan() {
        let dir = tempfile::tempdir().unwrap();
        let mut decl = Declaration::new("add", SourceType::ClangC, "int add(int a, int b) { return a + b; }")
            .with_export("add", ExportStub::Function)
            .with_export("table", ExportStub::Table);
        decl.compile = Some(CompileOptions {
            defines: [("N".to_string(), "16".to_string())].into_iter().collect(),
            switches: vec!["-g".to_string()],
        });

        let backend = ToolchainBackend::new(Toolchain::Clang { cpp: false }, "clang");
        let (args, output) = backend.plan(&decl, dir.path(), &bounded_import()).unwrap();

        assert!(dir.path().join("add.c").exists());
        assert_eq!(output, dir.path().join("add.wasm"));
        assert!(args.contains(&"-Wl,--export=add".to_string()));
        assert!(!args.iter().any(|a| a.contains("--export=table")));
        assert!(args.contains(&"-Wl,--import-memory".to_string()));
        assert!(args.contains(&"-DN=16".to_string()));
        let switch_at = args.iter().position(|a| a == "-g").unwrap();
        let define_at = args.iter().position(|a| a == "-DN=16").unwrap();
        assert!(define_at < switch_at);
    }

    #[test]
    fn test_emscripten_growth_only_when_bounded_above_initial() {
        let fixed = MemorySettings {
            descriptor: Some(MemoryDescriptor {
                initial: 4,
                maximum: Some(4),
                shared: false,
            }),
            mode: MemoryMode::Exported,
        };
        let settings = emscripten_memory_settings(&fixed);
        assert_eq!(settings, vec!["-s".to_string(), "INITIAL_MEMORY=262144".to_string()]);
    }

    #[test]
    fn test_rust_plan_writes_crate() {
        let dir = tempfile::tempdir().unwrap();
        let decl = Declaration::new("my-unit", SourceType::Rust, "#[no_mangle] pub fn f() {}");
        let backend = ToolchainBackend::new(Toolchain::Rust, "cargo");
        let (args, output) = backend.plan(&decl, dir.path(), &MemorySettings::default()).unwrap();

        assert_eq!(args[0], "rustc");
        assert!(output.ends_with("wasm32-unknown-unknown/release/my_unit.wasm"));
        let manifest = fs::read_to_string(dir.path().join("Cargo.toml")).unwrap();
        assert!(manifest.contains("name = \"my_unit\""));
        assert!(manifest.contains("crate-type = [\"cdylib\"]"));
    }

    #[test]
    fn test_missing_tool() {
        let dir = tempfile::tempdir().unwrap();
        let decl = Declaration::new("w", SourceType::Wat, "(module)");
        let backend = ToolchainBackend::new(Toolchain::Wat, "inwasm-no-such-tool-wat2wasm");
        let result = backend.compile(&decl, dir.path(), Path::new("w.js"), &MemorySettings::default());
        assert!(matches!(result, Err(BackendError::ToolMissing { .. })));
    }
}
