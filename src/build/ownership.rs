//! Output ownership table.
//!
//! Each transform task claims part of the output tree. The table rejects
//! overlapping claims up front and answers "which task owns this path",
//! which is how tasks stay out of each other's way without hand-written
//! exclusion globs.

use crate::build::{Claim, TaskDescriptor, TaskName};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Conflicting ownership between tasks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OwnershipError {
    /// Two tasks claim the same prefix with intersecting extensions
    #[error("'{first}' and '{second}' both claim output {claim}")]
    Overlap { first: TaskName, second: TaskName, claim: String },
    /// Two planned units write the same file
    #[error(
        "output '{}' would be written by both '{first}' and '{second}'; rename one of the sources that map to it",
        .path.display()
    )]
    Contested { path: PathBuf, first: TaskName, second: TaskName },
}

/// Extension of `path`, lowercased.
fn extension(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase())
}

fn extensions_intersect(a: &Claim, b: &Claim) -> bool {
    match (&a.extensions, &b.extensions) {
        (Some(x), Some(y)) => x.intersection(y).next().is_some(),
        _ => true,
    }
}

/// Claims of every task participating in a run.
#[derive(Debug, Clone, Default)]
pub struct OwnershipTable {
    entries: Vec<(TaskName, Claim)>,
}

impl OwnershipTable {
    /// Build the table, failing on the first pair of overlapping claims.
    pub fn build(descriptors: &[TaskDescriptor]) -> Result<Self, OwnershipError> {
        let mut table = Self::default();
        for desc in descriptors {
            for claim in &desc.claims {
                table.insert(desc.name, claim.clone())?;
            }
        }
        Ok(table)
    }

    fn insert(&mut self, task: TaskName, claim: Claim) -> Result<(), OwnershipError> {
        for (owner, existing) in &self.entries {
            if *owner != task
                && existing.prefix == claim.prefix
                && extensions_intersect(existing, &claim)
            {
                return Err(OwnershipError::Overlap {
                    first: *owner,
                    second: task,
                    claim: claim.to_string(),
                });
            }
        }
        self.entries.push((task, claim));
        Ok(())
    }

    /// Task owning `path` (relative to the output root).
    ///
    /// The longest matching prefix wins; on an equal prefix a claim that
    /// names the extension beats one that does not.
    pub fn owner(&self, path: &Path) -> Option<TaskName> {
        let ext = extension(path);
        self.entries
            .iter()
            .filter(|(_, claim)| path.starts_with(&claim.prefix))
            .filter(|(_, claim)| match (&claim.extensions, &ext) {
                (None, _) => true,
                (Some(set), Some(e)) => set.contains(e),
                (Some(_), None) => false,
            })
            .max_by_key(|(_, claim)| (claim.prefix.components().count(), claim.extensions.is_some()))
            .map(|(task, _)| *task)
    }

    /// Whether `task` owns `path`.
    pub fn owns(&self, task: TaskName, path: &Path) -> bool {
        self.owner(path) == Some(task)
    }
}
