//! Project configuration (inwasm.toml)
//!
//! Settings are blended in this order, later layers overriding earlier ones:
//! built-in defaults, `inwasm.toml` from the project root, and `INWASM_*`
//! environment variables.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the project configuration file.
pub const CONFIG_FILE: &str = "inwasm.toml";

/// Prefix of environment overrides, as in `INWASM_BUILD_DIR`.
pub const ENV_PREFIX: &str = "INWASM_";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// An environment override has a value of the wrong shape
    #[error("Invalid value for {var}: {reason}")]
    InvalidOverride { var: String, reason: String },
}

/// Project configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    /// Project root the config was loaded for
    #[serde(skip)]
    pub root: PathBuf,
}

/// Build output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildConfig {
    /// Build root, relative to the project root (default: "inwasm-builds")
    #[serde(default = "default_build_dir")]
    pub dir: String,
}

fn default_build_dir() -> String {
    "inwasm-builds".to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            dir: default_build_dir(),
        }
    }
}

/// External tool executables. Plain names are looked up on `PATH`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    #[serde(default = "default_wasm2wat")]
    pub wasm2wat: String,
    #[serde(default = "default_wat2wasm")]
    pub wat2wasm: String,
    #[serde(default = "default_clang")]
    pub clang: String,
    #[serde(default = "default_zig")]
    pub zig: String,
    #[serde(default = "default_cargo")]
    pub cargo: String,
    #[serde(default = "default_emcc")]
    pub emcc: String,
}

fn default_wasm2wat() -> String {
    "wasm2wat".to_string()
}

fn default_wat2wasm() -> String {
    "wat2wasm".to_string()
}

fn default_clang() -> String {
    "clang".to_string()
}

fn default_zig() -> String {
    "zig".to_string()
}

fn default_cargo() -> String {
    "cargo".to_string()
}

fn default_emcc() -> String {
    "emcc".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            wasm2wat: default_wasm2wat(),
            wat2wasm: default_wat2wasm(),
            clang: default_clang(),
            zig: default_zig(),
            cargo: default_cargo(),
            emcc: default_emcc(),
        }
    }
}

/// Watch mode settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchConfig {
    /// Source globs watched when none are given on the command line
    #[serde(default = "default_watch_patterns")]
    pub patterns: Vec<String>,

    /// Quiet period before a burst of events is handled
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_watch_patterns() -> Vec<String> {
    vec!["./**/*.wasm.js".to_string()]
}

fn default_debounce_ms() -> u64 {
    100
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            patterns: default_watch_patterns(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Config {
    /// Load the configuration for the project containing `start_dir`.
    ///
    /// The project root is the nearest ancestor holding `inwasm.toml` (or,
    /// failing that, `package.json`); `start_dir` itself otherwise. Process
    /// environment overrides are applied last.
    pub fn load(start_dir: &Path) -> Result<Self, ConfigError> {
        let root = find_project_root(start_dir).unwrap_or_else(|| start_dir.to_path_buf());
        let mut config = Self::load_root(&root)?;
        config.apply_overrides(std::env::vars())?;
        Ok(config)
    }

    /// Load `inwasm.toml` from `root` without environment overrides.
    pub fn load_root(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.root = root.to_path_buf();
        Ok(config)
    }

    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from TOML text
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `INWASM_<SECTION>_<KEY>` overrides.
    ///
    /// The first segment after the prefix names the section, the rest is the
    /// lower-cased key. Variables that name no known setting are ignored.
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (var, value) in vars {
            let Some(rest) = var.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let Some((section, key)) = rest.split_once('_') else {
                continue;
            };
            let section = section.to_ascii_lowercase();
            let key = key.to_ascii_lowercase();

            let slot = match (section.as_str(), key.as_str()) {
                ("build", "dir") => &mut self.build.dir,
                ("tools", "wasm2wat") => &mut self.tools.wasm2wat,
                ("tools", "wat2wasm") => &mut self.tools.wat2wasm,
                ("tools", "clang") => &mut self.tools.clang,
                ("tools", "zig") => &mut self.tools.zig,
                ("tools", "cargo") => &mut self.tools.cargo,
                ("tools", "emcc") => &mut self.tools.emcc,
                ("watch", "patterns") => {
                    self.watch.patterns = value
                        .split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(String::from)
                        .collect();
                    continue;
                }
                ("watch", "debounce_ms") => {
                    self.watch.debounce_ms =
                        value.parse().map_err(|e| ConfigError::InvalidOverride {
                            var: var.clone(),
                            reason: format!("{}", e),
                        })?;
                    continue;
                }
                _ => continue,
            };
            tracing::debug!(var = %var, "config override");
            *slot = value;
        }
        Ok(())
    }

    /// Absolute build root.
    pub fn build_root(&self) -> PathBuf {
        self.root.join(&self.build.dir)
    }
}

/// Find the project root by walking up from `start_dir`.
///
/// Prefers a directory containing `inwasm.toml`; falls back to the nearest
/// directory containing `package.json`.
pub fn find_project_root(start_dir: &Path) -> Option<PathBuf> {
    find_ancestor_with(start_dir, CONFIG_FILE).or_else(|| find_ancestor_with(start_dir, "package.json"))
}

fn find_ancestor_with(start_dir: &Path, marker: &str) -> Option<PathBuf> {
    let mut current = start_dir;

    loop {
        if current.join(marker).exists() {
            return Some(current.to_path_buf());
        }

        current = current.parent()?;
    }
}
