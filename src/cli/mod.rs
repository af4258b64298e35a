//! Command-line interface implementation
//!
//! `siteforge [TASK]` runs one task, one of the two graphs (`build`,
//! `default`) or the bare dev server.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::build::{BuildContext, RunReport, Runner, TaskName};
use crate::config::{find_config, load_config_file, project_root, SiteConfig};
use crate::serve::{DevServer, Reloader};
use crate::watch::Watcher;

/// Exit codes (2 for unparseable arguments, as clap reports them)
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// Siteforge - static-site asset pipeline with a live-reload dev server
#[derive(Debug, Parser)]
#[command(name = "siteforge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Task to run
    #[arg(value_enum, default_value_t = TaskName::Default)]
    pub task: TaskName,

    /// Configuration file (default: siteforge.toml, searched upwards)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Entry point for the binary.
pub fn run() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(usage_exit_code(&e));
        }
    };

    let (config, root) = match resolve_config(cli.config.as_deref(), cli.verbose) {
        Ok(found) => found,
        Err(message) => {
            eprintln!("Error loading config: {}", message);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    init_logging(&config.log.level, cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to start runtime: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let ctx = BuildContext::new(config, root).with_verbose(cli.verbose);
    runtime.block_on(dispatch(cli.task, ctx))
}

/// `--help` and `--version` arrive as errors too but are not failures.
fn usage_exit_code(err: &clap::Error) -> u8 {
    if err.use_stderr() {
        EXIT_INVALID_ARGS
    } else {
        EXIT_SUCCESS
    }
}

/// Load the explicit config, the discovered one, or the defaults, along
/// with the project root paths are resolved against.
fn resolve_config(explicit: Option<&Path>, verbose: bool) -> Result<(SiteConfig, PathBuf), String> {
    let cwd = std::env::current_dir().map_err(|e| e.to_string())?;
    let config_path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config(),
    };

    let (config, root) = match config_path {
        Some(path) => {
            if verbose {
                println!("Using config: {}", path.display());
            }
            let config = load_config_file(&path).map_err(|e| format!("{}: {}", path.display(), e))?;
            let root = match project_root(&path) {
                Some(parent) if !parent.as_os_str().is_empty() => cwd.join(parent),
                _ => cwd,
            };
            (config, root)
        }
        None => {
            if verbose {
                println!("No siteforge.toml found, using defaults");
            }
            (crate::config::default_config(), cwd)
        }
    };

    let errors = config.validate_paths(&root);
    if !errors.is_empty() {
        let lines: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(lines.join("\n"));
    }
    Ok((config, root))
}

fn init_logging(level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // try_init: a subscriber may already be installed when embedded
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(atty::is(atty::Stream::Stdout)),
        )
        .try_init();
}

async fn dispatch(task: TaskName, ctx: BuildContext) -> ExitCode {
    match task {
        TaskName::Server => serve_only(ctx).await,
        TaskName::Default => develop(ctx).await,
        _ => run_once(task, ctx).await,
    }
}

/// Run a graph and print its summary. `None` when planning failed.
async fn build(runner: &Runner, task: TaskName) -> Option<RunReport> {
    match runner.run_graph(task).await {
        Ok(report) => {
            println!("{}", report.summary());
            Some(report)
        }
        Err(e) => {
            tracing::error!("{}", e);
            None
        }
    }
}

async fn run_once(task: TaskName, ctx: BuildContext) -> ExitCode {
    match build(&Runner::new(ctx), task).await {
        Some(report) if report.is_success() => ExitCode::from(EXIT_SUCCESS),
        _ => ExitCode::from(EXIT_ERROR),
    }
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for Ctrl+C: {}", e);
    }
}

async fn serve_only(ctx: BuildContext) -> ExitCode {
    let mut server = DevServer::new(ctx.out_dir(), &ctx.config().server, Reloader::new());
    if let Err(e) = server.start().await {
        tracing::error!("{}", e);
        return ExitCode::from(EXIT_ERROR);
    }

    wait_for_ctrl_c().await;
    match server.shutdown().await {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Initial build, then the dev server and the watcher until Ctrl+C.
async fn develop(ctx: BuildContext) -> ExitCode {
    let reloader = Reloader::new();
    let out_dir = ctx.out_dir();
    let server_config = ctx.config().server.clone();
    let runner = Runner::new(ctx).with_reloader(reloader.clone());

    match build(&runner, TaskName::Default).await {
        Some(report) if report.is_success() => {}
        _ => return ExitCode::from(EXIT_ERROR),
    }

    let mut server = DevServer::new(out_dir, &server_config, reloader.clone());
    if let Err(e) = server.start().await {
        tracing::error!("{}", e);
        return ExitCode::from(EXIT_ERROR);
    }

    let watched = Watcher::new(runner, reloader).run(wait_for_ctrl_c()).await;
    let stopped = server.shutdown().await;

    match (watched, stopped) {
        (Ok(()), Ok(())) => ExitCode::from(EXIT_SUCCESS),
        (Err(e), _) => {
            tracing::error!("{}", e);
            ExitCode::from(EXIT_ERROR)
        }
        (_, Err(e)) => {
            tracing::error!("{}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_task() {
        let cli = Cli::try_parse_from(["siteforge"]).unwrap();
        assert_eq!(cli.task, TaskName::Default);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_task_names() {
        let cli = Cli::try_parse_from(["siteforge", "createWebp", "-v"]).unwrap();
        assert_eq!(cli.task, TaskName::CreateWebp);
        assert!(cli.verbose);

        let cli = Cli::try_parse_from(["siteforge", "copyNormalize", "-c", "site.toml"]).unwrap();
        assert_eq!(cli.task, TaskName::CopyNormalize);
        assert_eq!(cli.config, Some(PathBuf::from("site.toml")));
    }

    #[test]
    fn test_unknown_task_is_usage_error() {
        let err = Cli::try_parse_from(["siteforge", "deploy"]).unwrap_err();
        assert_eq!(usage_exit_code(&err), EXIT_INVALID_ARGS);
        assert_eq!(err.exit_code(), i32::from(EXIT_INVALID_ARGS));
    }

    #[test]
    fn test_help_is_not_a_failure() {
        let err = Cli::try_parse_from(["siteforge", "--help"]).unwrap_err();
        assert_eq!(usage_exit_code(&err), EXIT_SUCCESS);
    }

    #[test]
    #[serial]
    fn test_resolve_explicit_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("site.toml");
        fs::write(&path, "[project]\nout = \"dist\"\n").unwrap();

        let (config, root) = resolve_config(Some(&path), false).unwrap();
        assert_eq!(config.project.out, PathBuf::from("dist"));
        assert_eq!(root, temp.path());
    }

    #[test]
    #[serial]
    fn test_resolve_rejects_out_at_project_root() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("site.toml");
        let toml = format!("[project]\nout = {:?}\n", temp.path().display().to_string());
        fs::write(&path, toml).unwrap();

        let err = resolve_config(Some(&path), false).unwrap_err();
        assert!(err.contains("project.out"));
        assert!(err.contains("contains the project root"));
    }

    #[test]
    #[serial]
    fn test_resolve_invalid_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("site.toml");
        fs::write(&path, "[images]\njpeg_quality = 0\n").unwrap();

        let err = resolve_config(Some(&path), false).unwrap_err();
        assert!(err.contains("jpeg_quality"));
    }
}
