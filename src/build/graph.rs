//! Task graphs.
//!
//! A graph is a set of nodes with declared dependencies. Execution stages
//! are the dependency levels of that graph: level 0 has no dependencies,
//! and every node's dependencies sit in earlier levels. Nodes within a level
//! run concurrently.

use crate::build::{PlanError, TaskName};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A node of a task graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphNode {
    /// `clean`, a transform task or `server`
    Task(TaskName),
    /// The file watcher; only part of the `default` graph
    Watch,
}

impl GraphNode {
    /// Whether the runner executes this node (as opposed to a long-running
    /// service started by the caller once all stages are done).
    pub fn is_buildable(&self) -> bool {
        match self {
            GraphNode::Task(name) => *name == TaskName::Clean || name.is_transform(),
            GraphNode::Watch => false,
        }
    }
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphNode::Task(name) => write!(f, "{}", name),
            GraphNode::Watch => write!(f, "watcher"),
        }
    }
}

impl From<TaskName> for GraphNode {
    fn from(name: TaskName) -> Self {
        GraphNode::Task(name)
    }
}

/// Transforms that run side by side once the copy stages are done.
const PARALLEL_STAGE: [TaskName; 6] = [
    TaskName::Styles,
    TaskName::Html,
    TaskName::Js,
    TaskName::Sprite,
    TaskName::CreateWebp,
    TaskName::CopyNormalize,
];

/// Dependency graph of nodes, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    nodes: Vec<GraphNode>,
    deps: HashMap<GraphNode, Vec<GraphNode>>,
}

impl TaskGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with its dependencies. Re-adding a node replaces its
    /// dependencies.
    pub fn add(&mut self, node: impl Into<GraphNode>, deps: &[GraphNode]) -> &mut Self {
        let node = node.into();
        if !self.nodes.contains(&node) {
            self.nodes.push(node);
        }
        self.deps.insert(node, deps.to_vec());
        self
    }

    /// `clean → copy → image → parallel{…}`
    pub fn build() -> Self {
        let mut graph = Self::new();
        graph
            .add(TaskName::Clean, &[])
            .add(TaskName::Copy, &[TaskName::Clean.into()])
            .add(TaskName::Image, &[TaskName::Copy.into()]);
        for task in PARALLEL_STAGE {
            graph.add(task, &[TaskName::Image.into()]);
        }
        graph
    }

    /// `clean → copy → copyImages → parallel{…} → server → watcher`
    pub fn dev() -> Self {
        let mut graph = Self::new();
        graph
            .add(TaskName::Clean, &[])
            .add(TaskName::Copy, &[TaskName::Clean.into()])
            .add(TaskName::CopyImages, &[TaskName::Copy.into()]);
        for task in PARALLEL_STAGE {
            graph.add(task, &[TaskName::CopyImages.into()]);
        }
        let parallel: Vec<GraphNode> = PARALLEL_STAGE.iter().map(|t| (*t).into()).collect();
        graph.add(TaskName::Server, &parallel).add(GraphNode::Watch, &[TaskName::Server.into()]);
        graph
    }

    /// Graph for a command-line task name.
    pub fn for_task(name: TaskName) -> Self {
        match name {
            TaskName::Build => Self::build(),
            TaskName::Default => Self::dev(),
            single => {
                let mut graph = Self::new();
                graph.add(single, &[]);
                graph
            }
        }
    }

    /// Tasks whose claims form the ownership table when running `name`.
    ///
    /// A single task is planned against the graph it normally belongs to, so
    /// that e.g. `image` still leaves the icon directory to `sprite`.
    pub fn claimants(name: TaskName) -> Vec<TaskName> {
        match name {
            TaskName::Build | TaskName::Image => Self::build().transform_tasks(),
            TaskName::Clean | TaskName::Server => Vec::new(),
            _ => Self::dev().transform_tasks(),
        }
    }

    /// Transform tasks in the graph, in insertion order.
    pub fn transform_tasks(&self) -> Vec<TaskName> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                GraphNode::Task(name) if name.is_transform() => Some(*name),
                _ => None,
            })
            .collect()
    }

    /// Group nodes into dependency levels.
    ///
    /// Dependencies on nodes outside the graph are ignored. Nodes keep their
    /// insertion order within a level.
    pub fn levels(&self) -> Result<Vec<Vec<GraphNode>>, PlanError> {
        if self.nodes.is_empty() {
            return Ok(vec![]);
        }

        let present: HashSet<GraphNode> = self.nodes.iter().copied().collect();
        let deps_map: HashMap<GraphNode, Vec<GraphNode>> = self
            .nodes
            .iter()
            .map(|n| {
                let deps = self
                    .deps
                    .get(n)
                    .map(|d| d.iter().filter(|d| present.contains(d)).copied().collect())
                    .unwrap_or_default();
                (*n, deps)
            })
            .collect();

        let mut levels_map: HashMap<GraphNode, usize> = HashMap::new();
        let mut remaining: Vec<GraphNode> = self.nodes.clone();
        let mut levels = Vec::new();

        while !remaining.is_empty() {
            let this_level: Vec<GraphNode> = remaining
                .iter()
                .filter(|n| {
                    deps_map
                        .get(n)
                        .map(|deps| deps.iter().all(|d| levels_map.contains_key(d)))
                        .unwrap_or(true)
                })
                .copied()
                .collect();

            if this_level.is_empty() {
                let stuck: Vec<String> = remaining.iter().map(|n| n.to_string()).collect();
                return Err(PlanError::Cycle(stuck.join(", ")));
            }

            for node in &this_level {
                levels_map.insert(*node, levels.len());
            }
            remaining.retain(|n| !levels_map.contains_key(n));
            levels.push(this_level);
        }

        Ok(levels)
    }
}
