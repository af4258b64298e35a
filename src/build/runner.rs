//! Task execution.
//!
//! # How It Works
//!
//! 1. Plan every transform task of the graph and validate ownership
//! 2. Group graph nodes into dependency levels
//! 3. Run each level's tasks concurrently, one blocking job per task
//! 4. Wait for the whole level before starting the next
//!
//! A task's join handle is the only way its [`TaskReport`] comes back, so
//! every invocation reports exactly once, including when nothing matched.
//! Per-file work inside a task runs on the rayon pool.
//!
//! # Example
//!
//! ```ignore
//! let runner = Runner::new(BuildContext::new(config, project_root));
//! let report = runner.run_graph(TaskName::Build).await?;
//! println!("{}", report.summary());
//! ```

use crate::build::{
    clean_output, plan_tasks, BuildContext, FileError, GraphNode, PlanError, PlannedUnit,
    RunReport, TaskGraph, TaskMode, TaskName, TaskPlan, TaskReport,
};
use crate::serve::Reloader;
use crate::transforms::sprite::SvgStore;
use crate::transforms::{apply_chain, build_chain, write_asset, Asset, Transform};
use crate::watch::format_duration;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{JoinHandle, JoinSet};

/// What a failed task does to the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// The current stage finishes; later stages are skipped.
    #[default]
    Abort,
    /// Keep going; the caller reports failures.
    Isolate,
}

/// Executes tasks and task graphs.
#[derive(Clone)]
pub struct Runner {
    ctx: Arc<BuildContext>,
    reloader: Option<Reloader>,
    mode: FailureMode,
}

impl Runner {
    /// Create a runner in [`FailureMode::Abort`] without a reloader.
    pub fn new(ctx: BuildContext) -> Self {
        Self { ctx: Arc::new(ctx), reloader: None, mode: FailureMode::Abort }
    }

    /// Push written files of streaming tasks to `reloader`.
    pub fn with_reloader(mut self, reloader: Reloader) -> Self {
        self.reloader = Some(reloader);
        self
    }

    /// Set the failure mode.
    pub fn with_mode(mut self, mode: FailureMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    /// Start one task invocation on the blocking pool.
    ///
    /// `plan` is required for transform tasks and ignored for `clean`.
    pub fn invoke(&self, task: TaskName, plan: Option<TaskPlan>) -> JoinHandle<TaskReport> {
        let ctx = Arc::clone(&self.ctx);
        let reloader = self.reloader.clone();
        tokio::task::spawn_blocking(move || execute(&ctx, task, plan, reloader.as_ref()))
    }

    /// Await an invocation; a panicked job becomes a failed report.
    async fn complete(task: TaskName, handle: JoinHandle<TaskReport>) -> TaskReport {
        match handle.await {
            Ok(report) => report,
            Err(e) => TaskReport::failed(task, format!("task did not complete: {}", e), Default::default()),
        }
    }

    /// Run one stage concurrently and collect its reports.
    async fn run_stage(
        &self,
        tasks: Vec<TaskName>,
        plans: &mut HashMap<TaskName, TaskPlan>,
    ) -> Vec<TaskReport> {
        let mut set = JoinSet::new();
        for task in tasks {
            let handle = self.invoke(task, plans.remove(&task));
            set.spawn(Self::complete(task, handle));
        }

        let mut reports = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => tracing::error!("stage task lost: {}", e),
            }
        }
        reports
    }

    /// Plan and run the graph for `target` (`build`, `default` or a single
    /// task). Service nodes (`server`, the watcher) are left to the caller.
    ///
    /// Planning errors are returned before anything, `clean` included, runs.
    pub async fn run_graph(&self, target: TaskName) -> Result<RunReport, PlanError> {
        let graph = TaskGraph::for_task(target);
        let levels = graph.levels()?;
        let plans = plan_tasks(&self.ctx, &graph.transform_tasks(), &TaskGraph::claimants(target))?;
        let mut plans: HashMap<TaskName, TaskPlan> =
            plans.into_iter().map(|p| (p.name(), p)).collect();

        if self.ctx.is_verbose() {
            for (i, level) in levels.iter().enumerate() {
                let names: Vec<String> = level.iter().map(|n| n.to_string()).collect();
                tracing::debug!("stage {}: {}", i, names.join(", "));
            }
        }

        let start = Instant::now();
        let mut report = RunReport::new();

        for level in levels {
            let tasks: Vec<TaskName> = level
                .iter()
                .filter(|n| n.is_buildable())
                .filter_map(|n| match n {
                    GraphNode::Task(name) => Some(*name),
                    GraphNode::Watch => None,
                })
                .collect();
            if tasks.is_empty() {
                continue;
            }

            if report.aborted {
                tasks.into_iter().for_each(|t| report.add(TaskReport::skipped(t)));
                continue;
            }

            for task_report in self.run_stage(tasks, &mut plans).await {
                if task_report.status.is_failure() && self.mode == FailureMode::Abort {
                    report.aborted = true;
                }
                report.add(task_report);
            }
        }

        report.total_duration = start.elapsed();
        Ok(report)
    }

    /// Plan `tasks` against the `default` graph's claims and run them one
    /// after another. Used by the watcher.
    pub async fn run_sequence(&self, tasks: &[TaskName]) -> Result<RunReport, PlanError> {
        let plans = plan_tasks(&self.ctx, tasks, &TaskGraph::claimants(TaskName::Default))?;
        let mut plans: HashMap<TaskName, TaskPlan> =
            plans.into_iter().map(|p| (p.name(), p)).collect();

        let start = Instant::now();
        let mut report = RunReport::new();
        for task in tasks {
            if report.aborted {
                report.add(TaskReport::skipped(*task));
                continue;
            }
            let task_report = Self::complete(*task, self.invoke(*task, plans.remove(task))).await;
            if task_report.status.is_failure() && self.mode == FailureMode::Abort {
                report.aborted = true;
            }
            report.add(task_report);
        }
        report.total_duration = start.elapsed();
        Ok(report)
    }
}

/// Run one task to completion on the current thread.
pub fn execute(
    ctx: &BuildContext,
    task: TaskName,
    plan: Option<TaskPlan>,
    reloader: Option<&Reloader>,
) -> TaskReport {
    let start = Instant::now();
    tracing::info!("Starting '{}'...", task);
    let streams = plan.as_ref().is_some_and(|p| p.descriptor.stream);

    let report = match (task, plan) {
        (TaskName::Clean, _) => execute_clean(ctx, start),
        (_, Some(plan)) => execute_plan(ctx, &plan, start),
        (_, None) => TaskReport::failed(task, "task has no plan".to_string(), start.elapsed()),
    };

    match &report.status {
        s if s.is_failure() => {
            tracing::error!("'{}' errored after {}: {}", task, format_duration(report.duration), s)
        }
        _ => tracing::info!("Finished '{}' after {}", task, format_duration(report.duration)),
    }

    if let (Some(reloader), true) = (reloader, streams && report.is_success()) {
        reloader.stream(&report.outputs);
    }
    report
}

fn execute_clean(ctx: &BuildContext, start: Instant) -> TaskReport {
    let out_dir = ctx.out_dir();
    if let Some(err) = ctx.output_errors().first() {
        return TaskReport::failed(
            TaskName::Clean,
            format!("refusing to remove {}: {}", out_dir.display(), err),
            start.elapsed(),
        );
    }
    match clean_output(&out_dir) {
        Ok(removed) => {
            if removed {
                tracing::debug!("removed {}", out_dir.display());
            }
            TaskReport::success(TaskName::Clean, vec![], start.elapsed())
        }
        Err(e) => TaskReport::failed(
            TaskName::Clean,
            format!("failed to remove {}: {}", out_dir.display(), e),
            start.elapsed(),
        ),
    }
}

/// Source path relative to the source root, `/`-separated.
fn source_name(plan: &TaskPlan, rel: &Path) -> String {
    let path = plan.descriptor.sources.base.join(rel);
    let parts: Vec<String> =
        path.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
    parts.join("/")
}

fn execute_plan(ctx: &BuildContext, plan: &TaskPlan, start: Instant) -> TaskReport {
    let task = plan.name();
    if plan.is_empty() {
        tracing::debug!("'{}': no matching sources", task);
        return TaskReport::success(task, vec![], start.elapsed());
    }

    let chain = match build_chain(&plan.descriptor.steps, ctx) {
        Ok(chain) => chain,
        Err(e) => return TaskReport::failed(task, e.to_string(), start.elapsed()),
    };
    let out_root = ctx.out_dir();

    let results: Vec<Result<Vec<PathBuf>, Vec<FileError>>> = match &plan.descriptor.mode {
        TaskMode::Each => plan
            .units
            .par_iter()
            .map(|unit| execute_unit(plan, unit, &chain, &out_root).map_err(|e| vec![e]))
            .collect(),
        TaskMode::Combine { .. } => {
            plan.units.iter().map(|unit| combine_unit(plan, unit, &chain, &out_root)).collect()
        }
    };

    let mut outputs = Vec::new();
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(written) => outputs.extend(written),
            Err(errs) => errors.extend(errs),
        }
    }
    outputs.sort();
    for error in &errors {
        tracing::error!("'{}': {}", task, error);
    }

    TaskReport::from_files(task, outputs, errors, start.elapsed())
}

/// One source file to one output.
fn execute_unit(
    plan: &TaskPlan,
    unit: &PlannedUnit,
    chain: &[Box<dyn Transform>],
    out_root: &Path,
) -> Result<Vec<PathBuf>, FileError> {
    let source = &unit.sources[0];
    let name = source_name(plan, &source.rel);
    let io_error = |e: std::io::Error| FileError::new(PathBuf::from(&name), e.to_string());

    if chain.is_empty() {
        let dest = out_root.join(&unit.dest);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::copy(&source.path, &dest).map_err(io_error)?;
        return Ok(vec![unit.dest.clone()]);
    }

    let asset = Asset::read(unit.dest.clone(), source.path.clone(), name.clone())
        .and_then(|asset| apply_chain(chain, asset))
        .and_then(|asset| write_asset(out_root, asset, plan.descriptor.source_maps));
    asset.map_err(|e| e.into_file_error(PathBuf::from(&name)))
}

/// Many sources to one combined output.
fn combine_unit(
    plan: &TaskPlan,
    unit: &PlannedUnit,
    chain: &[Box<dyn Transform>],
    out_root: &Path,
) -> Result<Vec<PathBuf>, Vec<FileError>> {
    let (assets, errors): (Vec<_>, Vec<_>) = unit
        .sources
        .iter()
        .map(|source| {
            let name = source_name(plan, &source.rel);
            Asset::read(unit.dest.clone(), source.path.clone(), name.clone())
                .and_then(|asset| apply_chain(chain, asset))
                .map_err(|e| e.into_file_error(PathBuf::from(name)))
        })
        .partition(Result::is_ok);
    let errors: Vec<FileError> = errors.into_iter().filter_map(Result::err).collect();
    if !errors.is_empty() {
        return Err(errors);
    }
    let assets: Vec<Asset> = assets.into_iter().filter_map(Result::ok).collect();

    let sprite = SvgStore.combine(unit.dest.clone(), &assets)?;
    write_asset(out_root, sprite, plan.descriptor.source_maps)
        .map_err(|e| vec![e.into_file_error(unit.dest.clone())])
}
