//! Build pipeline for siteforge
//!
//! Turns the source tree into the output tree by running named tasks.
//!
//! # Overview
//!
//! The build pipeline consists of:
//! - **Catalog**: Every task's sources, steps and output claims ([`task`])
//! - **Graphs**: Which tasks run, and in what order ([`graph`])
//! - **Planning**: Discover sources and decide each task's destinations
//!   ([`plan`], [`ownership`])
//! - **Execution**: Run the plans, stage by stage ([`runner`])
//!
//! # Example
//!
//! ```ignore
//! use siteforge::build::{BuildContext, Runner, TaskName};
//! use siteforge::config::{find_config, load_config_file, project_root};
//!
//! let path = find_config().ok_or("no siteforge.toml")?;
//! let config = load_config_file(&path)?;
//! let project_root = project_root(&path).unwrap().to_path_buf();
//! let runner = Runner::new(BuildContext::new(config, project_root));
//!
//! let report = runner.run_graph(TaskName::Build).await?;
//! println!("{}", report.summary());
//! ```

pub mod clean;
pub mod context;
pub mod discovery;
pub mod graph;
pub mod ownership;
pub mod plan;
pub mod result;
pub mod runner;
pub mod task;

pub use clean::*;
pub use context::*;
pub use discovery::*;
pub use graph::*;
pub use ownership::*;
pub use plan::*;
pub use result::*;
pub use runner::*;
pub use task::*;
