//! Watch mode for the dev server
//!
//! After the initial build, debounced changes below the source tree are
//! matched against the configured watch groups. Each matched group re-runs its
//! tasks in order and then signals connected browsers.
//!
//! Changes that match no group (images, fonts, icons by default) are ignored.

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::build::{matches_any, BuildStatus, FailureMode, RunReport, Runner, TaskName};
use crate::config::schema::{ReloadSignal, WatchConfig, WatchGroupConfig};
use crate::serve::Reloader;

/// Error during watch mode
#[derive(Debug, Error)]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("Failed to initialize file watcher: {0}")]
    WatcherInit(notify::Error),
    /// Failed to add watch path
    #[error("Failed to watch path: {0}")]
    WatchPath(notify::Error),
    /// The notification channel closed
    #[error("Watch channel closed")]
    ChannelClosed,
    /// Source directory not found
    #[error("Source directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),
}

/// Tracks files with errors across iterations for recovery detection.
///
/// Errors are tracked per task, so a run of one group never reports another
/// group's broken files as fixed.
#[derive(Debug, Default)]
pub struct ErrorTracker {
    files_with_errors: HashMap<TaskName, HashSet<PathBuf>>,
}

impl ErrorTracker {
    /// Create a new error tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the tasks of `report`; returns files that failed before and
    /// no longer do.
    pub fn update(&mut self, report: &RunReport) -> Vec<PathBuf> {
        let mut fixed = Vec::new();
        for task in report.tasks.iter().filter(|t| t.status != BuildStatus::Skipped) {
            let current: HashSet<PathBuf> = task.errors.iter().map(|e| e.file.clone()).collect();
            if let Some(previous) = self.files_with_errors.get(&task.task) {
                fixed.extend(previous.difference(&current).cloned());
            }
            if current.is_empty() {
                self.files_with_errors.remove(&task.task);
            } else {
                self.files_with_errors.insert(task.task, current);
            }
        }
        fixed.sort();
        fixed
    }

    /// Check if there are any tracked errors
    pub fn has_errors(&self) -> bool {
        !self.files_with_errors.is_empty()
    }
}

/// Configured watch groups.
#[derive(Debug, Clone)]
pub struct WatchGroups {
    groups: Vec<WatchGroupConfig>,
}

impl WatchGroups {
    pub fn new(groups: Vec<WatchGroupConfig>) -> Self {
        Self { groups }
    }

    /// Groups matched by any of `changed` (paths relative to the source
    /// root), each once, in declaration order.
    pub fn select(&self, changed: &[PathBuf]) -> Vec<&WatchGroupConfig> {
        self.groups
            .iter()
            .filter(|g| changed.iter().any(|rel| matches_any(rel, &g.patterns)))
            .collect()
    }

    pub fn is_watched(&self, rel: &Path) -> bool {
        self.groups.iter().any(|g| matches_any(rel, &g.patterns))
    }
}

/// Clear the terminal screen
pub fn clear_screen() {
    // ANSI escape code to clear screen and move cursor to top-left
    print!("\x1B[2J\x1B[1;1H");
}

/// Format duration for display
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{} ms", millis)
    } else {
        format!("{:.2} s", duration.as_secs_f64())
    }
}

/// Re-runs watch groups on change.
pub struct Watcher {
    runner: Runner,
    reloader: Reloader,
    groups: WatchGroups,
    config: WatchConfig,
    src_dir: PathBuf,
    /// Canonical form of `src_dir`, as notify reports it
    canonical_src: PathBuf,
    tracker: ErrorTracker,
    overlay: bool,
}

impl Watcher {
    /// Failures are isolated: a broken file is reported and watching goes on.
    pub fn new(runner: Runner, reloader: Reloader) -> Self {
        let config = runner.context().config().watch.clone();
        let src_dir = runner.context().src_dir();
        let canonical_src = std::fs::canonicalize(&src_dir).unwrap_or_else(|_| src_dir.clone());
        let runner = runner.with_reloader(reloader.clone()).with_mode(FailureMode::Isolate);

        Self {
            runner,
            reloader,
            groups: WatchGroups::new(config.groups.clone()),
            config,
            src_dir,
            canonical_src,
            tracker: ErrorTracker::new(),
            overlay: false,
        }
    }

    fn relative(&self, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(&self.canonical_src)
            .or_else(|_| path.strip_prefix(&self.src_dir))
            .ok()
            .map(Path::to_path_buf)
    }

    /// Handle one debounced batch of changed paths.
    ///
    /// Returns the tasks that ran, in order.
    pub async fn handle_changes(&mut self, paths: &[PathBuf]) -> Vec<TaskName> {
        let changed: Vec<PathBuf> = paths.iter().filter_map(|p| self.relative(p)).collect();
        for rel in &changed {
            if !self.groups.is_watched(rel) {
                tracing::debug!("ignored change: {}", rel.display());
            }
        }

        let groups: Vec<WatchGroupConfig> = self.groups.select(&changed).into_iter().cloned().collect();
        if groups.is_empty() {
            return Vec::new();
        }

        if self.config.clear_screen {
            clear_screen();
        }
        for rel in changed.iter().filter(|rel| self.groups.is_watched(rel)) {
            tracing::info!("Changed: {}", rel.display());
        }

        let mut ran = Vec::new();
        for group in &groups {
            ran.extend(self.run_group(group).await);
        }
        ran
    }

    async fn run_group(&mut self, group: &WatchGroupConfig) -> Vec<TaskName> {
        let report = match self.runner.run_sequence(&group.tasks).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("'{}': {}", group.name, e);
                self.reloader.error(e.to_string());
                self.overlay = true;
                return Vec::new();
            }
        };

        for file in self.tracker.update(&report) {
            tracing::info!("Fixed: {}", file.display());
        }

        if report.is_success() {
            if self.overlay && !self.tracker.has_errors() {
                self.reloader.clear_error();
                self.overlay = false;
            }
            if group.signal == ReloadSignal::Reload {
                self.reloader.reload();
            }
        } else {
            let message: Vec<String> = report
                .failures()
                .iter()
                .map(|r| format!("{}: {}", r.task, r.status))
                .collect();
            self.reloader.error(message.join("\n"));
            self.overlay = true;
        }

        report.tasks.iter().filter(|r| r.status != BuildStatus::Skipped).map(|r| r.task).collect()
    }

    /// Watch until `shutdown` resolves.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<(), WatchError> {
        if !self.src_dir.is_dir() {
            return Err(WatchError::SourceNotFound(self.src_dir.clone()));
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<DebounceEventResult>();
        let debounce = Duration::from_millis(u64::from(self.config.debounce_ms));
        let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
            // The receiver only goes away when watching stops.
            let _ = tx.send(result);
        })
        .map_err(WatchError::WatcherInit)?;

        debouncer
            .watcher()
            .watch(&self.canonical_src, RecursiveMode::Recursive)
            .map_err(WatchError::WatchPath)?;

        tracing::info!("Watching {} for changes...", self.src_dir.display());

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                received = rx.recv() => match received {
                    Some(Ok(events)) => {
                        let paths: Vec<PathBuf> = events
                            .into_iter()
                            .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                            .map(|e| e.path)
                            .collect();
                        self.handle_changes(&paths).await;
                    }
                    Some(Err(error)) => {
                        // Non-fatal; keep watching
                        tracing::warn!("Watch error: {:?}", error);
                    }
                    None => return Err(WatchError::ChannelClosed),
                },
            }
        }

        drop(debouncer);
        Ok(())
    }
}
