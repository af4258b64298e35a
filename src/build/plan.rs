//! Task planning.
//!
//! Planning resolves every task's sources, computes destinations and checks
//! them against the ownership table before a single byte is written.

use crate::build::{
    descriptors, discover_sources, BuildContext, DiscoveryError, OwnershipError, OwnershipTable,
    SourceFile, TaskDescriptor, TaskMode, TaskName,
};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Error raised before any stage runs.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("{0}")]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Ownership(#[from] OwnershipError),
    #[error("task graph has a cycle between: {0}")]
    Cycle(String),
}

/// One output of a task and the sources it is produced from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUnit {
    pub sources: Vec<SourceFile>,
    /// Destination relative to the output root
    pub dest: PathBuf,
}

/// Discovery result for one task.
#[derive(Debug, Clone)]
pub struct TaskPlan {
    pub descriptor: TaskDescriptor,
    pub units: Vec<PlannedUnit>,
}

impl TaskPlan {
    pub fn name(&self) -> TaskName {
        self.descriptor.name
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Every file the task may write, source maps included.
    pub fn destinations(&self) -> Vec<PathBuf> {
        let mut out = Vec::with_capacity(self.units.len());
        for unit in &self.units {
            out.push(unit.dest.clone());
            if self.descriptor.source_maps {
                out.push(map_path(&unit.dest));
            }
        }
        out
    }
}

/// `<dest>.map`
pub fn map_path(dest: &std::path::Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".map");
    PathBuf::from(name)
}

/// Plan a single task against an ownership table.
///
/// Sources whose destination belongs to another task are dropped here.
pub fn plan_task(
    ctx: &BuildContext,
    descriptor: &TaskDescriptor,
    table: &OwnershipTable,
) -> Result<TaskPlan, PlanError> {
    let sources = discover_sources(&ctx.src_dir(), &descriptor.sources)?;

    let units = match &descriptor.mode {
        TaskMode::Each => sources
            .into_iter()
            .filter_map(|source| {
                let dest = descriptor.destination(&source.rel);
                if table.owns(descriptor.name, &dest) {
                    Some(PlannedUnit { sources: vec![source], dest })
                } else {
                    tracing::debug!(
                        task = %descriptor.name,
                        "skipping {}: output {} is owned elsewhere",
                        source.rel.display(),
                        dest.display()
                    );
                    None
                }
            })
            .collect(),
        TaskMode::Combine { .. } => {
            let dest = descriptor.destination(std::path::Path::new(""));
            if sources.is_empty() || !table.owns(descriptor.name, &dest) {
                Vec::new()
            } else {
                vec![PlannedUnit { sources, dest }]
            }
        }
    };

    Ok(TaskPlan { descriptor: descriptor.clone(), units })
}

/// Fail when any destination would be written twice.
pub fn check_disjoint(plans: &[TaskPlan]) -> Result<(), OwnershipError> {
    let mut seen: HashMap<PathBuf, TaskName> = HashMap::new();
    for plan in plans {
        for dest in plan.destinations() {
            if let Some(first) = seen.insert(dest.clone(), plan.name()) {
                return Err(OwnershipError::Contested { path: dest, first, second: plan.name() });
            }
        }
    }
    Ok(())
}

/// Plan `tasks` against the claims of `claimants`.
///
/// Builds the ownership table (failing on overlapping claims), plans each
/// task and checks the union of plans for contested destinations.
pub fn plan_tasks(
    ctx: &BuildContext,
    tasks: &[TaskName],
    claimants: &[TaskName],
) -> Result<Vec<TaskPlan>, PlanError> {
    let config = ctx.config();
    let mut claim_set: Vec<TaskName> = claimants.to_vec();
    for task in tasks {
        if task.is_transform() && !claim_set.contains(task) {
            claim_set.push(*task);
        }
    }
    let table = OwnershipTable::build(&descriptors(&claim_set, config))?;

    let plans = descriptors(tasks, config)
        .iter()
        .map(|desc| plan_task(ctx, desc, &table))
        .collect::<Result<Vec<_>, _>>()?;

    check_disjoint(&plans)?;
    Ok(plans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::TaskGraph;
    use crate::config::default_config;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn create_test_file(root: &Path, name: &str) {
        let path = root.join("source").join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    fn ctx(temp: &TempDir) -> BuildContext {
        BuildContext::new(default_config(), temp.path().to_path_buf())
    }

    #[test]
    fn test_image_plan_leaves_icons_to_sprite() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "img/logo.png");
        create_test_file(temp.path(), "img/icons/cart.svg");
        create_test_file(temp.path(), "img/sprite.svg");

        let plans = plan_tasks(
            &ctx(&temp),
            &[TaskName::Image, TaskName::Sprite],
            &TaskGraph::claimants(TaskName::Build),
        )
        .unwrap();

        let image: Vec<_> = plans[0].units.iter().map(|u| u.dest.clone()).collect();
        assert_eq!(image, vec![PathBuf::from("img/logo.png")]);

        assert_eq!(plans[1].units.len(), 1);
        assert_eq!(plans[1].units[0].dest, PathBuf::from("img/sprite.svg"));
        assert_eq!(plans[1].units[0].sources.len(), 1);
    }

    #[test]
    fn test_single_image_task_uses_build_claims() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "img/icons/cart.svg");

        let plans =
            plan_tasks(&ctx(&temp), &[TaskName::Image], &TaskGraph::claimants(TaskName::Image))
                .unwrap();
        assert!(plans[0].is_empty());
    }

    #[test]
    fn test_empty_sprite_plan() {
        let temp = TempDir::new().unwrap();
        let plans = plan_tasks(&ctx(&temp), &[TaskName::Sprite], &[]).unwrap();
        assert!(plans[0].is_empty());
    }

    #[test]
    fn test_styles_destinations_include_map() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "less/style.less");
        create_test_file(temp.path(), "less/blocks/header.less");

        let plans = plan_tasks(&ctx(&temp), &[TaskName::Styles], &[]).unwrap();
        assert_eq!(
            plans[0].destinations(),
            vec![PathBuf::from("css/style.min.css"), PathBuf::from("css/style.min.css.map")]
        );
    }

    #[test]
    fn test_contested_webp_destination() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "img/hero.png");
        create_test_file(temp.path(), "img/hero.jpg");

        let err = plan_tasks(&ctx(&temp), &[TaskName::CreateWebp], &[]).unwrap_err();
        match err {
            PlanError::Ownership(OwnershipError::Contested { path, first, second }) => {
                assert_eq!(path, PathBuf::from("img/hero.webp"));
                assert_eq!(first, TaskName::CreateWebp);
                assert_eq!(second, TaskName::CreateWebp);
            }
            other => panic!("expected contested destination, got {:?}", other),
        }
    }

    #[test]
    fn test_check_disjoint_names_both_tasks() {
        let config = default_config();
        let unit = |dest: &str| PlannedUnit { sources: vec![], dest: PathBuf::from(dest) };
        let plans = vec![
            TaskPlan {
                descriptor: crate::build::descriptor(TaskName::Image, &config).unwrap(),
                units: vec![unit("img/a.png")],
            },
            TaskPlan {
                descriptor: crate::build::descriptor(TaskName::CopyImages, &config).unwrap(),
                units: vec![unit("img/a.png")],
            },
        ];

        let err = check_disjoint(&plans).unwrap_err();
        assert_eq!(err.to_string(), "output 'img/a.png' would be written by both 'image' and 'copyImages'");
    }

    #[test]
    fn test_overlapping_claimants_fail_fast() {
        let temp = TempDir::new().unwrap();
        let err = plan_tasks(&ctx(&temp), &[TaskName::Image], &[TaskName::CopyImages]).unwrap_err();
        assert!(matches!(err, PlanError::Ownership(OwnershipError::Overlap { .. })));
    }

    #[test]
    fn test_map_path() {
        assert_eq!(map_path(Path::new("js/app.js")), PathBuf::from("js/app.js.map"));
    }
}
