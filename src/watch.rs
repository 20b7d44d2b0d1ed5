//! Folder watch mode
//!
//! Subscribes to filesystem events in an input directory and runs the
//! pipeline on every file that arrives, writing `<stem><suffix>.pdf` into
//! the output directory. Files are handled one at a time in event order.
//! Inputs that share a stem (`scan.pdf`, `scan.png`) get distinct outputs.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::WatchConfig;
use crate::error::{ProcessError, WatchError};
use crate::pipeline::{Pipeline, ProcessReport};

/// Name suffixes of files that are still being written
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".tmp", ".crdownload", "~"];

const EVENT_QUEUE: usize = 256;

/// Output path for an input file
pub fn output_path(input: &Path, output_dir: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output_dir.join(format!("{}{}.pdf", stem, suffix))
}

/// Output path that keeps the input's extension in the name
///
/// `scan.png` becomes `<stem>-png<suffix>.pdf`, with a counter appended
/// while `taken` reports the name as used.
pub fn disambiguated_output_path<F>(input: &Path, output_dir: &Path, suffix: &str, taken: F) -> PathBuf
where
    F: Fn(&Path) -> bool,
{
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let base = match input.extension() {
        Some(ext) => format!("{}-{}", stem, ext.to_string_lossy()),
        None => stem,
    };

    let mut candidate = output_dir.join(format!("{}{}.pdf", base, suffix));
    let mut n = 1;
    while taken(&candidate) {
        n += 1;
        candidate = output_dir.join(format!("{}-{}{}.pdf", base, n, suffix));
    }
    candidate
}

/// Why a path is not picked up, if it is not
pub fn ignore_reason(path: &Path, suffix: &str) -> Option<&'static str> {
    let name = match path.file_name() {
        Some(name) => name.to_string_lossy(),
        None => return Some("no file name"),
    };

    if name.starts_with('.') {
        return Some("hidden file");
    }
    if PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s)) {
        return Some("partial download");
    }
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    if !suffix.is_empty() && stem.ends_with(suffix) {
        return Some("already processed");
    }
    None
}

/// Paths an event brings into the directory
pub fn arrived_paths(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(kind) if kind != CreateKind::Folder => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().cloned().into_iter().collect()
        }
        // Backends that cannot tell both ends of a rename apart
        EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => {
            event.paths.iter().filter(|p| p.exists()).cloned().collect()
        }
        _ => Vec::new(),
    }
}

/// Drops repeated events for the same path
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    seen: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// Whether an event for `path` at `now` should be handled
    pub fn accept(&mut self, path: &Path, now: Instant) -> bool {
        let window = self.window;
        self.seen
            .retain(|_, at| now.saturating_duration_since(*at) < window);

        if self.seen.contains_key(path) {
            return false;
        }
        self.seen.insert(path.to_path_buf(), now);
        true
    }
}

/// Wait until the file stops growing
///
/// Returns `Ok(false)` if it was still changing when `timeout` ran out.
pub async fn wait_until_settled(path: &Path, delay: Duration, timeout: Duration) -> std::io::Result<bool> {
    let started = Instant::now();
    let mut last = tokio::fs::metadata(path).await?.len();

    loop {
        tokio::time::sleep(delay).await;
        let len = tokio::fs::metadata(path).await?.len();
        if len == last && len > 0 {
            return Ok(true);
        }
        if started.elapsed() >= timeout {
            return Ok(false);
        }
        last = len;
    }
}

/// Watch `input_dir` until `shutdown` resolves, writing results into `output_dir`
pub async fn watch<S>(pipeline: &Pipeline, input_dir: &Path, output_dir: &Path, shutdown: S) -> Result<(), WatchError>
where
    S: Future<Output = ()>,
{
    FolderWatch::new(pipeline, input_dir, output_dir)?.run(shutdown).await
}

/// Folder watcher bound to one pipeline
pub struct FolderWatch<'a> {
    pipeline: &'a Pipeline,
    input_dir: PathBuf,
    output_dir: PathBuf,
    config: WatchConfig,
    debouncer: Debouncer,
    /// Outputs written so far, with the input each came from
    written: HashMap<PathBuf, PathBuf>,
}

impl<'a> FolderWatch<'a> {
    pub fn new(pipeline: &'a Pipeline, input_dir: &Path, output_dir: &Path) -> Result<Self, WatchError> {
        if !input_dir.is_dir() {
            return Err(WatchError::NotADirectory(input_dir.to_path_buf()));
        }
        std::fs::create_dir_all(output_dir)?;

        let config = pipeline.config().watch.clone();
        Ok(Self {
            pipeline,
            input_dir: input_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            debouncer: Debouncer::new(config.debounce),
            config,
            written: HashMap::new(),
        })
    }

    /// Watch until `shutdown` resolves
    pub async fn run<S>(mut self, shutdown: S) -> Result<(), WatchError>
    where
        S: Future<Output = ()>,
    {
        let (tx, mut rx) = mpsc::channel(EVENT_QUEUE);
        let handler = move |res: notify::Result<Event>| {
            if let Err(e) = tx.blocking_send(res) {
                tracing::error!("Failed to forward file event: {}", e);
            }
        };

        let mut watcher: Box<dyn Watcher + Send> = if self.config.poll {
            let config = notify::Config::default().with_poll_interval(self.config.poll_interval);
            Box::new(PollWatcher::new(handler, config)?)
        } else {
            Box::new(notify::recommended_watcher(handler)?)
        };
        watcher.watch(&self.input_dir, RecursiveMode::NonRecursive)?;

        tracing::info!(
            "Watching {} -> {}",
            self.input_dir.display(),
            self.output_dir.display()
        );

        tokio::pin!(shutdown);

        if self.config.process_existing {
            for path in self.existing_files()? {
                tokio::select! {
                    _ = self.handle_path(&path) => {}
                    _ = &mut shutdown => {
                        tracing::info!("Shutdown requested, stopping watch");
                        return Ok(());
                    }
                }
            }
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping watch");
                    break;
                }
                received = rx.recv() => {
                    let event = match received {
                        Some(Ok(event)) => event,
                        Some(Err(e)) => {
                            tracing::warn!("Watch error: {}", e);
                            continue;
                        }
                        None => break,
                    };

                    for path in arrived_paths(&event) {
                        tokio::select! {
                            _ = self.handle_path(&path) => {}
                            _ = &mut shutdown => {
                                tracing::info!("Shutdown requested while processing {}", path.display());
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Files already in the input directory, sorted by name
    fn existing_files(&self) -> Result<Vec<PathBuf>, WatchError> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.input_dir)? {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Filter, settle and process one arrived path
    ///
    /// Returns `None` when the path was skipped.
    pub async fn handle_path(&mut self, path: &Path) -> Option<Result<ProcessReport, ProcessError>> {
        if let Some(reason) = ignore_reason(path, &self.config.output_suffix) {
            tracing::debug!("Ignoring {} ({})", path.display(), reason);
            return None;
        }
        if !self.debouncer.accept(path, Instant::now()) {
            tracing::debug!("Ignoring repeated event for {}", path.display());
            return None;
        }

        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return None,
            Err(e) => {
                tracing::debug!("{} vanished before processing: {}", path.display(), e);
                return None;
            }
        }

        match wait_until_settled(path, self.config.settle_delay, self.config.settle_timeout).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                "{} still changing after {:?}, processing anyway",
                path.display(),
                self.config.settle_timeout
            ),
            Err(e) => {
                tracing::warn!("{} vanished while settling: {}", path.display(), e);
                return None;
            }
        }

        let output = self.claim_output(path);
        let result = self.pipeline.process_file(path, &output).await;
        if let Err(e) = &result {
            tracing::error!("Failed to process {}: {}", path.display(), e);
        }
        Some(result)
    }

    /// Pick the output for `input`, keeping inputs that share a stem apart
    fn claim_output(&mut self, input: &Path) -> PathBuf {
        let suffix = &self.config.output_suffix;
        let mut output = output_path(input, &self.output_dir, suffix);

        if let Some(owner) = self.written.get(&output).filter(|owner| owner.as_path() != input) {
            let written = &self.written;
            let alternative = disambiguated_output_path(input, &self.output_dir, suffix, |candidate| {
                written.get(candidate).is_some_and(|o| o.as_path() != input)
            });
            tracing::warn!(
                "{} and {} both map to {}, writing {} instead",
                owner.display(),
                input.display(),
                output.display(),
                alternative.display()
            );
            output = alternative;
        }

        self.written.insert(output.clone(), input.to_path_buf());
        output
    }
}
