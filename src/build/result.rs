//! Run report types.
//!
//! Every task invocation yields one [`TaskReport`]; a graph run aggregates
//! them into a [`RunReport`].

use crate::build::TaskName;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Status of a single task invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    /// Task ran to completion
    Success,
    /// Task was not started because an earlier stage failed
    Skipped,
    /// Task failed with error
    Failed(String),
}

impl BuildStatus {
    /// Check if the status indicates success.
    pub fn is_success(&self) -> bool {
        matches!(self, BuildStatus::Success | BuildStatus::Skipped)
    }

    /// Check if the status indicates failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, BuildStatus::Failed(_))
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStatus::Success => write!(f, "success"),
            BuildStatus::Skipped => write!(f, "skipped"),
            BuildStatus::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// A failure tied to one source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileError {
    /// File that failed
    pub file: PathBuf,
    /// Line number (1-indexed, if available)
    pub line: Option<usize>,
    /// Column number (1-indexed, if available)
    pub column: Option<usize>,
    /// Error message
    pub message: String,
}

impl FileError {
    /// Create a new file error.
    pub fn new(file: PathBuf, message: String) -> Self {
        Self { file, line: None, column: None, message }
    }
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(col)) => {
                write!(f, "{}:{}:{}: {}", self.file.display(), line, col, self.message)
            }
            (Some(line), None) => write!(f, "{}:{}: {}", self.file.display(), line, self.message),
            _ => write!(f, "{}: {}", self.file.display(), self.message),
        }
    }
}

/// Outcome of one task invocation.
#[derive(Debug, Clone)]
pub struct TaskReport {
    /// Task that ran
    pub task: TaskName,
    /// Final status
    pub status: BuildStatus,
    /// Files written, relative to the output root
    pub outputs: Vec<PathBuf>,
    /// Per-file failures
    pub errors: Vec<FileError>,
    /// Wall-clock duration
    pub duration: Duration,
}

impl TaskReport {
    /// Create a successful report.
    pub fn success(task: TaskName, outputs: Vec<PathBuf>, duration: Duration) -> Self {
        Self { task, status: BuildStatus::Success, outputs, errors: vec![], duration }
    }

    /// Create a skipped report.
    pub fn skipped(task: TaskName) -> Self {
        Self {
            task,
            status: BuildStatus::Skipped,
            outputs: vec![],
            errors: vec![],
            duration: Duration::ZERO,
        }
    }

    /// Create a failed report.
    pub fn failed(task: TaskName, error: String, duration: Duration) -> Self {
        Self { task, status: BuildStatus::Failed(error), outputs: vec![], errors: vec![], duration }
    }

    /// Build a report from per-file results: failed as soon as one file failed.
    pub fn from_files(
        task: TaskName,
        outputs: Vec<PathBuf>,
        errors: Vec<FileError>,
        duration: Duration,
    ) -> Self {
        let status = match errors.len() {
            0 => BuildStatus::Success,
            1 => BuildStatus::Failed(errors[0].to_string()),
            n => BuildStatus::Failed(format!("{} (and {} more)", errors[0], n - 1)),
        };
        Self { task, status, outputs, errors, duration }
    }

    /// Check if this report is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Result of a complete graph run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Reports in completion order
    pub tasks: Vec<TaskReport>,
    /// Total duration
    pub total_duration: Duration,
    /// Set when a failed stage stopped the run
    pub aborted: bool,
}

impl RunReport {
    /// Create a new empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task report.
    pub fn add(&mut self, report: TaskReport) {
        self.tasks.push(report);
    }

    /// Report for a given task, if it ran.
    pub fn get(&self, task: TaskName) -> Option<&TaskReport> {
        self.tasks.iter().find(|r| r.task == task)
    }

    /// Get the number of successful tasks.
    pub fn success_count(&self) -> usize {
        self.tasks.iter().filter(|r| matches!(r.status, BuildStatus::Success)).count()
    }

    /// Get the number of skipped tasks.
    pub fn skipped_count(&self) -> usize {
        self.tasks.iter().filter(|r| matches!(r.status, BuildStatus::Skipped)).count()
    }

    /// Get the number of failed tasks.
    pub fn failed_count(&self) -> usize {
        self.tasks.iter().filter(|r| r.status.is_failure()).count()
    }

    /// Check if the run succeeded (no failures).
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0 && !self.aborted
    }

    /// All outputs produced.
    pub fn all_outputs(&self) -> Vec<&PathBuf> {
        self.tasks.iter().flat_map(|r| r.outputs.iter()).collect()
    }

    /// All per-file errors.
    pub fn all_errors(&self) -> Vec<&FileError> {
        self.tasks.iter().flat_map(|r| r.errors.iter()).collect()
    }

    /// Failed task reports.
    pub fn failures(&self) -> Vec<&TaskReport> {
        self.tasks.iter().filter(|r| r.status.is_failure()).collect()
    }

    /// Format a summary of the run.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        let success = self.success_count();
        let skipped = self.skipped_count();
        let failed = self.failed_count();
        let total = self.tasks.len();

        if failed > 0 {
            lines.push(format!(
                "Build failed: {} succeeded, {} skipped, {} failed ({} total)",
                success, skipped, failed, total
            ));
            for report in self.failures() {
                lines.push(format!("  - {}: {}", report.task, report.status));
            }
        } else {
            lines.push(format!(
                "Build succeeded: {} tasks, {} files written in {}",
                success,
                self.all_outputs().len(),
                crate::watch::format_duration(self.total_duration)
            ));
        }

        let errors = self.all_errors();
        if errors.len() > 1 {
            lines.push(format!("Errors ({}):", errors.len()));
            for error in errors.iter().take(5) {
                lines.push(format!("  - {}", error));
            }
            if errors.len() > 5 {
                lines.push(format!("  ... and {} more", errors.len() - 5));
            }
        }

        lines.join("\n")
    }
}
