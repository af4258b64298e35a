//! Build system integration tests
//!
//! Runs the task graphs against a fixture site and checks the output tree:
//!
//! - Full build produces exactly the expected files
//! - Successive builds are byte-identical
//! - Output claims are disjoint
//! - Every task succeeds on an empty source tree
//! - Clean is idempotent
//!
//! The fixtures use the in-process style and script fallbacks so no
//! external tools are needed.

use image::{Rgb, RgbImage, Rgba, RgbaImage};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use siteforge::build::{
    clean_output, descriptors, plan_tasks, BuildContext, BuildStatus, OwnershipError,
    OwnershipTable, PlanError, Runner, TaskGraph, TaskName,
};
use siteforge::config::{default_config, ScriptMinifier, SiteConfig, StyleCompiler};

// ============================================================================
// Test Utilities
// ============================================================================

fn offline_config() -> SiteConfig {
    let mut config = default_config();
    config.styles.compiler = StyleCompiler::Css;
    config.scripts.minifier = ScriptMinifier::Builtin;
    config
}

fn context(temp: &TempDir) -> BuildContext {
    BuildContext::new(offline_config(), temp.path().to_path_buf())
}

/// Create a source file with content.
fn create_source(root: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = root.join("source").join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// A small site touching every task.
fn create_fixture_site(root: &Path) {
    create_source(root, "less/style.less", b"a {\n  color: #ff0000;\n  user-select: none;\n}\n");
    create_source(
        root,
        "index.html",
        b"<!DOCTYPE html>\n<html>\n  <head>\n    <title>Home</title>\n  </head>\n  <body>\n    <p>Hello   world</p>\n  </body>\n</html>\n",
    );
    create_source(root, "about.html", b"<html>\n  <body>\n    <h1>About</h1>\n  </body>\n</html>\n");
    create_source(root, "js/app.js", b"function add(first, second) {\n  return first + second;\n}\nadd(1, 2);\n");
    create_source(root, "js/menu.js", b"var open = false;\nfunction toggle() { open = !open; }\n");
    create_source(
        root,
        "img/logo.svg",
        b"<?xml version=\"1.0\"?>\n<svg xmlns=\"http://www.w3.org/2000/svg\">\n  <rect width=\"4\" height=\"4\"/>\n</svg>\n",
    );
    create_source(root, "img/icons/cart.svg", b"<svg viewBox=\"0 0 24 24\"><path d=\"M1 1\"/></svg>");
    create_source(root, "img/icons/user.svg", b"<svg viewBox=\"0 0 20 20\"><circle r=\"5\"/></svg>");
    create_source(root, "fonts/body.woff2", b"wOF2 font");
    create_source(root, "favicon.ico", b"ico");
    create_source(root, "css/normalize.css", b"html { line-height: 1.15; }\n");

    let badge = RgbaImage::from_fn(8, 8, |x, y| Rgba([(x * 30) as u8, (y * 30) as u8, 128, 255]));
    badge.save(root.join("source/img/badge.png")).unwrap();
    let photo = RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 15) as u8, 90, (y * 15) as u8]));
    photo.save(root.join("source/img/photo.jpg")).unwrap();
}

/// Relative paths of every file below `dir`.
fn tree(dir: &Path) -> BTreeSet<PathBuf> {
    let pattern = format!("{}/**/*", glob::Pattern::escape(&dir.display().to_string()));
    glob::glob(&pattern)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .map(|p| p.strip_prefix(dir).unwrap().to_path_buf())
        .collect()
}

/// SHA256 over every file's path and contents, in path order.
fn tree_digest(dir: &Path) -> String {
    let mut hasher = Sha256::new();
    for rel in tree(dir) {
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update(fs::read(dir.join(&rel)).unwrap());
    }
    format!("{:x}", hasher.finalize())
}

fn paths(list: &[&str]) -> BTreeSet<PathBuf> {
    list.iter().map(PathBuf::from).collect()
}

// ============================================================================
// Full Build
// ============================================================================

#[tokio::test]
async fn test_full_build_produces_expected_tree() {
    let temp = TempDir::new().unwrap();
    create_fixture_site(temp.path());

    let report = Runner::new(context(&temp)).run_graph(TaskName::Build).await.unwrap();
    assert!(report.is_success(), "{}", report.summary());

    let expected = paths(&[
        "about.html",
        "css/normalize.css",
        "css/style.min.css",
        "css/style.min.css.map",
        "favicon.ico",
        "fonts/body.woff2",
        "img/badge.png",
        "img/badge.webp",
        "img/logo.svg",
        "img/photo.jpg",
        "img/photo.webp",
        "img/sprite.svg",
        "index.html",
        "js/app.js",
        "js/menu.js",
    ]);
    assert_eq!(tree(&temp.path().join("build")), expected);

    let reported: BTreeSet<PathBuf> = report.all_outputs().into_iter().cloned().collect();
    assert_eq!(reported, expected);
}

#[tokio::test]
async fn test_full_build_contents() {
    let temp = TempDir::new().unwrap();
    create_fixture_site(temp.path());
    let out = temp.path().join("build");

    Runner::new(context(&temp)).run_graph(TaskName::Build).await.unwrap();

    let css = fs::read_to_string(out.join("css/style.min.css")).unwrap();
    assert!(css.starts_with("a{"));
    assert!(css.contains("color:red"));
    assert!(css.ends_with("/*# sourceMappingURL=style.min.css.map */\n"));

    let map: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("css/style.min.css.map")).unwrap()).unwrap();
    assert_eq!(map["file"], "style.min.css");
    assert_eq!(map["sources"][0], "less/style.less");

    let html = fs::read_to_string(out.join("index.html")).unwrap();
    assert!(html.contains("<title>Home</title>"));
    assert!(!html.contains("\n  "));

    let sprite = fs::read_to_string(out.join("img/sprite.svg")).unwrap();
    let cart = sprite.find("<symbol id=\"cart\"").unwrap();
    let user = sprite.find("<symbol id=\"user\"").unwrap();
    assert!(cart < user);

    assert_eq!(fs::read(out.join("favicon.ico")).unwrap(), b"ico");
    assert_eq!(fs::read(out.join("css/normalize.css")).unwrap(), b"html { line-height: 1.15; }\n");
    assert_eq!(&fs::read(out.join("img/photo.webp")).unwrap()[..4], b"RIFF");
    image::open(out.join("img/badge.png")).unwrap();
}

#[tokio::test]
async fn test_build_replaces_stale_output() {
    let temp = TempDir::new().unwrap();
    create_fixture_site(temp.path());
    fs::create_dir_all(temp.path().join("build/old")).unwrap();
    fs::write(temp.path().join("build/old/stale.txt"), "stale").unwrap();

    Runner::new(context(&temp)).run_graph(TaskName::Build).await.unwrap();
    assert!(!temp.path().join("build/old").exists());
}

// ============================================================================
// Idempotence
// ============================================================================

#[tokio::test]
async fn test_successive_builds_identical() {
    let temp = TempDir::new().unwrap();
    create_fixture_site(temp.path());
    let runner = Runner::new(context(&temp));
    let out = temp.path().join("build");

    runner.run_graph(TaskName::Build).await.unwrap();
    let first = tree_digest(&out);
    runner.run_graph(TaskName::Build).await.unwrap();
    let second = tree_digest(&out);

    assert_eq!(first, second);
}

// ============================================================================
// Disjointness
// ============================================================================

#[test]
fn test_build_plans_are_disjoint() {
    let temp = TempDir::new().unwrap();
    create_fixture_site(temp.path());
    let ctx = context(&temp);

    for target in [TaskName::Build, TaskName::Default] {
        let graph = TaskGraph::for_task(target);
        let plans =
            plan_tasks(&ctx, &graph.transform_tasks(), &TaskGraph::claimants(target)).unwrap();

        let mut seen = BTreeSet::new();
        for plan in &plans {
            for dest in plan.destinations() {
                assert!(seen.insert(dest.clone()), "{} planned twice", dest.display());
            }
        }
    }
}

#[test]
fn test_icons_and_sprite_left_to_sprite_task() {
    let temp = TempDir::new().unwrap();
    create_fixture_site(temp.path());
    create_source(temp.path(), "img/sprite.svg", b"<svg/>");
    let ctx = context(&temp);

    let plans =
        plan_tasks(&ctx, &[TaskName::Image, TaskName::Sprite], &TaskGraph::claimants(TaskName::Build))
            .unwrap();
    let image: BTreeSet<PathBuf> = plans[0].destinations().into_iter().collect();
    assert_eq!(image, paths(&["img/badge.png", "img/logo.svg", "img/photo.jpg"]));
}

#[test]
fn test_overlapping_claims_fail_fast() {
    let config = offline_config();
    let err = OwnershipTable::build(&descriptors(&[TaskName::Image, TaskName::CopyImages], &config))
        .unwrap_err();
    assert!(matches!(err, OwnershipError::Overlap { .. }));
}

#[test]
fn test_contested_destination_names_both_tasks() {
    let temp = TempDir::new().unwrap();
    create_source(temp.path(), "img/hero.png", b"x");
    create_source(temp.path(), "img/hero.jpg", b"x");

    let err = plan_tasks(&context(&temp), &[TaskName::CreateWebp], &[]).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("img/hero.webp"), "{}", message);
    assert!(message.contains("rename one of the sources"), "{}", message);
    match err {
        PlanError::Ownership(OwnershipError::Contested { path, first, second }) => {
            assert_eq!(path, PathBuf::from("img/hero.webp"));
            assert_eq!((first, second), (TaskName::CreateWebp, TaskName::CreateWebp));
        }
        other => panic!("unexpected error: {}", other),
    }
}

// ============================================================================
// Zero Match
// ============================================================================

#[tokio::test]
async fn test_every_task_succeeds_on_empty_tree() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("source")).unwrap();
    let runner = Runner::new(context(&temp));

    for task in TaskName::TRANSFORMS {
        let report = runner.run_graph(task).await.unwrap();
        assert_eq!(report.tasks.len(), 1, "{}", task);
        assert_eq!(report.tasks[0].status, BuildStatus::Success, "{}", task);
        assert!(report.tasks[0].outputs.is_empty(), "{}", task);
    }
    assert!(!temp.path().join("build").exists());
}

#[tokio::test]
async fn test_build_without_source_dir() {
    let temp = TempDir::new().unwrap();
    let report = Runner::new(context(&temp)).run_graph(TaskName::Build).await.unwrap();

    assert!(report.is_success());
    assert!(report.all_outputs().is_empty());
}

// ============================================================================
// Clean
// ============================================================================

#[tokio::test]
async fn test_clean_twice() {
    let temp = TempDir::new().unwrap();
    create_fixture_site(temp.path());
    let runner = Runner::new(context(&temp));
    runner.run_graph(TaskName::Build).await.unwrap();

    let first = runner.run_graph(TaskName::Clean).await.unwrap();
    let second = runner.run_graph(TaskName::Clean).await.unwrap();

    assert!(first.is_success());
    assert!(second.is_success());
    assert!(!temp.path().join("build").exists());
    assert!(!clean_output(&temp.path().join("build")).unwrap());
}

#[tokio::test]
async fn test_clean_refuses_project_root() {
    let temp = TempDir::new().unwrap();
    create_fixture_site(temp.path());
    let mut config = offline_config();
    config.project.out = temp.path().to_path_buf();
    let runner = Runner::new(BuildContext::new(config, temp.path().to_path_buf()));

    for task in [TaskName::Clean, TaskName::Build] {
        let report = runner.run_graph(task).await.unwrap();
        assert!(!report.is_success(), "{}", task);
        assert_eq!(report.tasks[0].task, TaskName::Clean);
        assert!(report.tasks[0].status.to_string().contains("refusing to remove"));
    }
    assert!(temp.path().join("source/less/style.less").exists());
    assert!(!temp.path().join("index.html").exists());
}

#[tokio::test]
async fn test_clean_refuses_parent_of_project() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("site");
    create_source(&root, "index.html", b"<p>Hi</p>");

    for out in ["..", "../.."] {
        let mut config = offline_config();
        config.project.out = PathBuf::from(out);
        let report = Runner::new(BuildContext::new(config, root.clone()))
            .run_graph(TaskName::Clean)
            .await
            .unwrap();
        assert!(report.tasks[0].status.is_failure(), "out = {}", out);
    }
    assert!(root.join("source/index.html").exists());
}
