//! Watch mode
//!
//! A primary watcher recompiles source files when they are added or changed.
//! Each compiled source also gets a [`WatcherSet`] over the files its
//! declarations track, watching only the literal base directory of every
//! pattern; a change there reprocesses the source. Events are
//! handled one at a time on a single task, engine work runs on the blocking
//! pool.

use crate::files::{absolute_pattern, collect_sources, is_skipped};
use crate::output::StyledOutput;
use anyhow::Context;
use glob::Pattern;
use inwasm_engine::{Config, Engine, ReprocessReport};
use notify::{recommended_watcher, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Something that needs handling for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum WatchEvent {
    /// The source itself was added or changed
    Source(PathBuf),
    /// A file tracked by one of the source's declarations changed
    Tracked(PathBuf),
}

/// Watcher over the tracked patterns of one source file.
pub struct WatcherSet {
    patterns: BTreeSet<String>,
    _watcher: RecommendedWatcher,
}

impl WatcherSet {
    fn new(
        source: &Path,
        patterns: BTreeSet<String>,
        root: &Path,
        tx: UnboundedSender<WatchEvent>,
    ) -> anyhow::Result<Self> {
        let filters = compile_patterns(&patterns, root)?;
        let source = source.to_path_buf();
        let mut watcher = recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else {
                return;
            };
            if !is_content_event(&event.kind) {
                return;
            }
            if event.paths.iter().any(|path| matches_any(&filters, path)) {
                let _ = tx.send(WatchEvent::Tracked(source.clone()));
            }
        })?;
        for (dir, mode) in watch_roots(&patterns, root) {
            watcher
                .watch(&dir, mode)
                .with_context(|| format!("failed to watch '{}'", dir.display()))?;
        }
        Ok(Self {
            patterns,
            _watcher: watcher,
        })
    }
}

/// Directories to watch for `patterns`, relative to `root`.
///
/// Each pattern contributes the components before its first glob character.
/// The directory is watched recursively when the rest of the pattern spans
/// directories; a base that does not exist yet falls back to its nearest
/// existing ancestor, watched recursively.
fn watch_roots(patterns: &BTreeSet<String>, root: &Path) -> BTreeMap<PathBuf, RecursiveMode> {
    let mut roots = BTreeMap::new();
    for pattern in patterns {
        let absolute = PathBuf::from(absolute_pattern(pattern, root));
        let components: Vec<_> = absolute.components().collect();
        let literal = components
            .iter()
            .take(components.len().saturating_sub(1))
            .take_while(|component| !has_glob_chars(&component.as_os_str().to_string_lossy()))
            .count();

        let mut base: PathBuf = components[..literal].iter().collect();
        let mut recursive = components.len() - literal > 1 || pattern.contains("**");
        while !base.is_dir() {
            recursive = true;
            if !base.pop() {
                base = root.to_path_buf();
                break;
            }
        }

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        let entry = roots.entry(base).or_insert(mode);
        if mode == RecursiveMode::Recursive {
            *entry = mode;
        }
    }
    roots
}

fn has_glob_chars(component: &str) -> bool {
    component.contains(['*', '?', '[', '{'])
}

/// What a change to a tracked file leads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackedAction {
    /// Sites were restored, run discovery on the source right away
    Rerun,
    /// Nothing restored, bump the source's mtime for the primary watcher
    Touch,
}

fn tracked_action(report: &ReprocessReport) -> TrackedAction {
    if report.rerun() {
        TrackedAction::Rerun
    } else {
        TrackedAction::Touch
    }
}

/// How the tracked watcher of a source changes after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatcherChange {
    Keep,
    Remove,
    Replace,
}

fn watcher_change(current: Option<&BTreeSet<String>>, patterns: &BTreeSet<String>) -> WatcherChange {
    if patterns.is_empty() {
        WatcherChange::Remove
    } else if current == Some(patterns) {
        WatcherChange::Keep
    } else {
        WatcherChange::Replace
    }
}

/// Set the mtime of `file` to now.
fn touch(file: &Path) -> std::io::Result<()> {
    File::options()
        .write(true)
        .open(file)?
        .set_modified(SystemTime::now())
}

/// State of a running watch session.
struct Session {
    engine: Option<Engine>,
    output: StyledOutput,
    root: PathBuf,
    tx: UnboundedSender<WatchEvent>,
    secondary: HashMap<PathBuf, WatcherSet>,
    /// Content last written by the engine, per source
    settled: HashMap<PathBuf, String>,
    /// Sources whose mtime was touched to request a primary pass
    touched: HashSet<PathBuf>,
}

/// Run watch mode until Ctrl-C.
pub async fn run(
    engine: Engine,
    config: &Config,
    patterns: Vec<String>,
    base: PathBuf,
    output: StyledOutput,
) -> anyhow::Result<()> {
    let (patterns, base) = if patterns.is_empty() {
        (config.watch.patterns.clone(), config.root.clone())
    } else {
        (patterns, base)
    };
    let skip = config.build_root();
    let debounce = Duration::from_millis(config.watch.debounce_ms);

    let (tx, mut rx) = unbounded_channel();
    let filters = compile_patterns(&patterns, &base)?;
    let primary_tx = tx.clone();
    let primary_base = base.clone();
    let primary_skip = skip.clone();
    let mut primary = recommended_watcher(move |res: notify::Result<notify::Event>| {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "watch error");
                return;
            }
        };
        if !is_content_event(&event.kind) {
            return;
        }
        for path in event.paths {
            if matches_any(&filters, &path) && !is_skipped(&path, &primary_base, &primary_skip) {
                let _ = primary_tx.send(WatchEvent::Source(path));
            }
        }
    })?;
    primary
        .watch(&base, RecursiveMode::Recursive)
        .with_context(|| format!("failed to watch '{}'", base.display()))?;

    let mut session = Session {
        engine: Some(engine),
        output,
        root: config.root.clone(),
        tx,
        secondary: HashMap::new(),
        settled: HashMap::new(),
        touched: HashSet::new(),
    };

    session
        .output
        .info(&format!("Starting watch mode with pattern {}", patterns.join(" ")));
    session.output.newline();
    session.output.flush();

    for file in collect_sources(&patterns, &base, &skip)? {
        session.handle(WatchEvent::Source(file)).await;
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let first = tokio::select! {
            _ = &mut ctrl_c => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let mut batch = BTreeSet::from([first]);
        collect_burst(&mut rx, &mut batch, debounce).await;

        for event in batch {
            session.handle(event).await;
        }
    }

    tracing::info!("watch mode stopped");
    Ok(())
}

/// Gather events until the channel stays quiet for `debounce`.
async fn collect_burst(
    rx: &mut UnboundedReceiver<WatchEvent>,
    batch: &mut BTreeSet<WatchEvent>,
    debounce: Duration,
) {
    while let Ok(Some(event)) = tokio::time::timeout(debounce, rx.recv()).await {
        batch.insert(event);
    }
}

impl Session {
    async fn handle(&mut self, event: WatchEvent) {
        let result = match &event {
            WatchEvent::Source(file) => self.on_source(file).await,
            WatchEvent::Tracked(file) => self.on_tracked(file).await,
        };
        if let Err(e) = result {
            let file = match &event {
                WatchEvent::Source(file) | WatchEvent::Tracked(file) => file,
            };
            tracing::error!(file = %file.display(), "{:#}", e);
            self.output
                .stderr_error("Error while processing", &format!("{}: {:#}", file.display(), e));
        }
    }

    async fn on_source(&mut self, file: &Path) -> anyhow::Result<()> {
        if !file.is_file() {
            self.secondary.remove(file);
            self.settled.remove(file);
            return Ok(());
        }
        let content = fs::read_to_string(file)?;
        let touched = self.touched.remove(file);
        if !touched && self.settled.get(file) == Some(&content) {
            tracing::debug!(file = %file.display(), "own write, ignored");
            return Ok(());
        }

        let path = file.to_path_buf();
        let (reprocessed, report) = self
            .with_engine(move |engine| {
                engine.begin_run();
                let reprocessed = engine.reprocess(&path)?;
                let report = engine.process_file(&path)?;
                Ok((reprocessed, report))
            })
            .await?;

        for warning in &reprocessed.warnings {
            self.output.reprocess_warning(warning);
        }
        self.output.file_report(&report);
        self.settle(file).await
    }

    async fn on_tracked(&mut self, file: &Path) -> anyhow::Result<()> {
        let path = file.to_path_buf();
        let report = self
            .with_engine(move |engine| {
                engine.begin_run();
                Ok(engine.reprocess(&path)?)
            })
            .await?;

        for warning in &report.warnings {
            self.output.reprocess_warning(warning);
        }

        if tracked_action(&report) == TrackedAction::Rerun {
            self.touched.remove(file);
            self.settled.remove(file);
            let path = file.to_path_buf();
            let processed = self
                .with_engine(move |engine| Ok(engine.process_file(&path)?))
                .await?;
            self.output.file_report(&processed);
            return self.settle(file).await;
        }

        // let the primary watcher pick the source up again
        touch(file)?;
        self.touched.insert(file.to_path_buf());
        Ok(())
    }

    /// Remember what the engine left in `file` and refresh its tracked
    /// watcher.
    async fn settle(&mut self, file: &Path) -> anyhow::Result<()> {
        self.settled
            .insert(file.to_path_buf(), fs::read_to_string(file)?);

        let path = file.to_path_buf();
        let patterns = self
            .with_engine(move |engine| Ok(engine.tracked_patterns(&path)?))
            .await?;

        match watcher_change(self.secondary.get(file).map(|set| &set.patterns), &patterns) {
            WatcherChange::Keep => {}
            WatcherChange::Remove => {
                self.secondary.remove(file);
            }
            WatcherChange::Replace => {
                tracing::debug!(file = %file.display(), ?patterns, "replacing tracked watcher");
                let set = WatcherSet::new(file, patterns, &self.root, self.tx.clone())?;
                self.secondary.insert(file.to_path_buf(), set);
            }
        }
        Ok(())
    }

    /// Run `job` on the blocking pool with exclusive use of the engine.
    async fn with_engine<T, F>(&mut self, job: F) -> anyhow::Result<T>
    where
        F: FnOnce(&mut Engine) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut engine = self.engine.take().context("engine lost by an earlier failure")?;
        let (engine, result) = tokio::task::spawn_blocking(move || {
            let result = job(&mut engine);
            (engine, result)
        })
        .await
        .context("compile task panicked")?;
        self.engine = Some(engine);
        result
    }
}

fn compile_patterns<'a, I>(patterns: I, base: &Path) -> anyhow::Result<Vec<Pattern>>
where
    I: IntoIterator<Item = &'a String>,
{
    patterns
        .into_iter()
        .map(|pattern| {
            Pattern::new(&absolute_pattern(pattern, base))
                .with_context(|| format!("invalid pattern '{}'", pattern))
        })
        .collect()
}

fn matches_any(filters: &[Pattern], path: &Path) -> bool {
    filters.iter().any(|pattern| pattern.matches_path(path))
}

fn is_content_event(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}
