//! inwasm command-line tool
//!
//! Compiles the inline WebAssembly declarations of the given source files
//! and rewrites them in place. `-w` keeps watching and recompiles on change.

mod files;
mod output;
mod watch;

use anyhow::Context;
use clap::Parser;
use inwasm_engine::{BuildOptions, Config, Engine};
use output::{resolve_color_choice, StyledOutput};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "INWASM_LOG";

#[derive(Parser)]
#[command(name = "inwasm")]
#[command(about = "Compile inline WebAssembly declarations in JavaScript sources", long_about = None)]
#[command(version)]
struct Cli {
    /// Source files or glob patterns
    #[arg(required_unless_present = "watch")]
    files: Vec<String>,

    /// Watch sources and tracked files, recompile on change
    #[arg(short, long)]
    watch: bool,

    /// Rebuild every declaration, ignoring the build cache
    #[arg(short, long)]
    force: bool,

    /// Reuse existing builds even for non-cacheable declarations
    #[arg(short, long)]
    skip_existing: bool,

    /// Colored output: auto, always or never
    #[arg(long, value_name = "WHEN")]
    color: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut out = StyledOutput::new(resolve_color_choice(cli.color.as_deref()));
    let cwd = std::env::current_dir()?
        .canonicalize()
        .context("failed to resolve the working directory")?;
    let config = Config::load(&cwd).context("failed to load inwasm.toml")?;
    tracing::debug!(root = %config.root.display(), "project root");

    let options = BuildOptions {
        force: cli.force,
        skip_existing: cli.skip_existing,
    };
    let engine = Engine::from_config(&config, options);

    if cli.watch {
        let runtime = tokio::runtime::Runtime::new()?;
        return runtime.block_on(watch::run(engine, &config, cli.files, cwd, out));
    }

    let failed = run_batch(engine, &config, &cli.files, &cwd, &mut out)?;
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Process every matched file once. Returns the number of files that failed.
fn run_batch(
    mut engine: Engine,
    config: &Config,
    patterns: &[String],
    base: &Path,
    out: &mut StyledOutput,
) -> anyhow::Result<usize> {
    let sources = files::collect_sources(patterns, base, &config.build_root())?;
    if sources.is_empty() {
        out.warning("[inwasm]");
        out.plain(&format!(" no files matched {}", patterns.join(" ")));
        out.newline();
        out.flush();
        return Ok(0);
    }

    engine.begin_run();
    let mut failed = 0;
    for file in sources {
        if let Err(e) = process(&mut engine, &file, out) {
            tracing::error!(file = %file.display(), "{:#}", e);
            out.stderr_error("Error while processing", &format!("{}: {:#}", file.display(), e));
            failed += 1;
        }
    }
    Ok(failed)
}

fn process(engine: &mut Engine, file: &Path, out: &mut StyledOutput) -> anyhow::Result<()> {
    let restored = engine.reprocess(file)?;
    for warning in &restored.warnings {
        out.reprocess_warning(warning);
    }
    let report = engine.process_file(file)?;
    out.file_report(&report);
    Ok(())
}
