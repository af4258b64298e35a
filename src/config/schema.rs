//! Configuration schema types for `siteforge.toml`
//!
//! Every section is optional. An absent file yields the fixed `source/` →
//! `build/` layout the pipeline was designed around.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::build::TaskName;

/// How style entry points are turned into plain CSS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StyleCompiler {
    /// Run the external `lessc` program
    #[default]
    Lessc,
    /// Sources are already CSS; pass them through unchanged
    Css,
}

/// Which minifier handles scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScriptMinifier {
    /// Run the external `terser` program (emits source maps)
    #[default]
    Terser,
    /// In-process `minify-js` (no source maps)
    Builtin,
}

/// What the dev server is told after a watch group finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadSignal {
    /// Full page reload in every connected browser
    Reload,
    /// The group's tasks stream their own changed files
    Stream,
    /// Nothing
    None,
}

/// Project metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    #[serde(default = "default_name")]
    pub name: String,
    /// Source tree
    #[serde(default = "default_src")]
    pub src: PathBuf,
    /// Output tree (deleted by `clean`)
    #[serde(default = "default_out")]
    pub out: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self { name: default_name(), src: default_src(), out: default_out() }
    }
}

fn default_name() -> String {
    "site".to_string()
}

fn default_src() -> PathBuf {
    PathBuf::from("source")
}

fn default_out() -> PathBuf {
    PathBuf::from("build")
}

/// External programs used by collaborators without a Rust equivalent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// LESS compiler
    #[serde(default = "default_lessc")]
    pub lessc: String,
    /// JavaScript minifier
    #[serde(default = "default_terser")]
    pub terser: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self { lessc: default_lessc(), terser: default_terser() }
    }
}

fn default_lessc() -> String {
    "lessc".to_string()
}

fn default_terser() -> String {
    "terser".to_string()
}

/// Stylesheet task settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylesConfig {
    /// Entry point, relative to the source tree
    #[serde(default = "default_style_entry")]
    pub entry: PathBuf,
    /// Name of the single compiled artifact
    #[serde(default = "default_style_output")]
    pub output: String,
    /// Compiler for the entry point
    #[serde(default)]
    pub compiler: StyleCompiler,
    /// Browserslist queries used for prefixing
    #[serde(default = "default_browsers")]
    pub browsers: Vec<String>,
    /// Write `<output>.map` next to the stylesheet
    #[serde(default = "default_true")]
    pub source_maps: bool,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            entry: default_style_entry(),
            output: default_style_output(),
            compiler: StyleCompiler::default(),
            browsers: default_browsers(),
            source_maps: true,
        }
    }
}

fn default_style_entry() -> PathBuf {
    PathBuf::from("less/style.less")
}

fn default_style_output() -> String {
    "style.min.css".to_string()
}

fn default_browsers() -> Vec<String> {
    vec!["defaults".to_string()]
}

fn default_true() -> bool {
    true
}

/// Script task settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    #[serde(default)]
    pub minifier: ScriptMinifier,
    #[serde(default = "default_true")]
    pub source_maps: bool,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self { minifier: ScriptMinifier::default(), source_maps: true }
    }
}

/// Image optimization and WebP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// oxipng preset (0-6)
    #[serde(default = "default_png_level")]
    pub png_level: u8,
    /// JPEG re-encode quality; the smaller of original and re-encode is kept
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Lossy WebP quality (0-100)
    #[serde(default = "default_webp_quality")]
    pub webp_quality: u8,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            png_level: default_png_level(),
            jpeg_quality: default_jpeg_quality(),
            webp_quality: default_webp_quality(),
        }
    }
}

fn default_png_level() -> u8 {
    3
}

fn default_jpeg_quality() -> u8 {
    90
}

fn default_webp_quality() -> u8 {
    80
}

/// Icon sprite settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpriteConfig {
    /// File name of the generated sprite, written under `img/`
    #[serde(default = "default_sprite_name")]
    pub name: String,
}

impl Default for SpriteConfig {
    fn default() -> Self {
        Self { name: default_sprite_name() }
    }
}

fn default_sprite_name() -> String {
    "sprite.svg".to_string()
}

/// Dev server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS headers on every response
    #[serde(default = "default_true")]
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port(), cors: true }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

/// One watched glob group and the tasks it re-runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchGroupConfig {
    pub name: String,
    /// Glob patterns relative to the source tree
    pub patterns: Vec<String>,
    /// Tasks re-run in order when a pattern matches
    pub tasks: Vec<TaskName>,
    #[serde(default = "default_signal")]
    pub signal: ReloadSignal,
}

fn default_signal() -> ReloadSignal {
    ReloadSignal::Reload
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce delay in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
    /// Clear terminal between rebuilds
    #[serde(default)]
    pub clear_screen: bool,
    #[serde(default = "default_watch_groups")]
    pub groups: Vec<WatchGroupConfig>,
}

fn default_debounce_ms() -> u32 {
    100
}

/// Styles stream, scripts stream, markup reloads. Markup also re-copies the
/// normalize stylesheet.
pub fn default_watch_groups() -> Vec<WatchGroupConfig> {
    vec![
        WatchGroupConfig {
            name: "styles".to_string(),
            patterns: vec!["less/**/*.less".to_string()],
            tasks: vec![TaskName::Styles],
            signal: ReloadSignal::Stream,
        },
        WatchGroupConfig {
            name: "scripts".to_string(),
            patterns: vec!["js/*.js".to_string()],
            tasks: vec![TaskName::Js],
            signal: ReloadSignal::Stream,
        },
        WatchGroupConfig {
            name: "markup".to_string(),
            patterns: vec!["*.html".to_string()],
            tasks: vec![TaskName::Html, TaskName::CopyNormalize],
            signal: ReloadSignal::Reload,
        },
    ]
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: default_debounce_ms(), clear_screen: false, groups: default_watch_groups() }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing` filter directive, e.g. "info" or "siteforge=debug"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Complete siteforge.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub styles: StylesConfig,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub sprite: SpriteConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "images.webp_quality")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "siteforge.toml: '{}' {}", self.field, self.message)
    }
}

/// Resolve `.` and `..` without touching the filesystem.
///
/// `..` at the filesystem root stays at the root; leading `..` of a relative
/// path are kept.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Absolute, normalized form of `path` below `project_root`.
///
/// The deepest existing ancestor is canonicalized so symlinked roots compare
/// equal to their targets; the missing remainder is appended unchanged.
fn absolute_dir(project_root: &Path, path: &Path) -> PathBuf {
    let joined = normalize_path(&super::resolve_path(project_root, path));

    let mut existing = joined.as_path();
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = std::fs::canonicalize(existing).unwrap_or_else(|_| existing.to_path_buf());
    for name in missing.iter().rev() {
        resolved.push(name);
    }
    resolved
}

impl SiteConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: &str| {
            errors.push(ConfigValidationError {
                field: field.to_string(),
                message: message.to_string(),
            });
        };

        if self.project.name.is_empty() {
            push("project.name", "must be a non-empty string");
        }

        let out = normalize_path(&self.project.out);
        let src = normalize_path(&self.project.src);
        if out.components().all(|c| !matches!(c, Component::Normal(_))) {
            push("project.out", "must not be the project root or one of its ancestors");
        } else if src.starts_with(&out) || out.starts_with(&src) {
            push("project.out", "must not contain or be contained by project.src");
        }

        if self.styles.entry.as_os_str().is_empty() {
            push("styles.entry", "must be a non-empty path");
        }
        if self.styles.output.is_empty() || self.styles.output.contains('/') {
            push("styles.output", "must be a plain file name");
        }
        if self.styles.browsers.is_empty() {
            push("styles.browsers", "must contain at least one query");
        }

        if self.images.png_level > 6 {
            push("images.png_level", "must be between 0 and 6");
        }
        if self.images.jpeg_quality == 0 || self.images.jpeg_quality > 100 {
            push("images.jpeg_quality", "must be between 1 and 100");
        }
        if self.images.webp_quality > 100 {
            push("images.webp_quality", "must be between 0 and 100");
        }

        if self.sprite.name.is_empty() || self.sprite.name.contains('/') {
            push("sprite.name", "must be a plain file name");
        }

        if self.watch.debounce_ms == 0 {
            push("watch.debounce_ms", "must be a positive integer");
        }

        let mut group_errors = Vec::new();
        for (i, group) in self.watch.groups.iter().enumerate() {
            if group.patterns.is_empty() {
                group_errors.push((format!("watch.groups[{}].patterns", i), "must not be empty"));
            }
            if group.tasks.iter().any(|t| !t.is_transform()) {
                group_errors
                    .push((format!("watch.groups[{}].tasks", i), "may only list transform tasks"));
            }
        }
        for (field, message) in group_errors {
            push(&field, message);
        }

        errors
    }

    /// Check `project.out` against the real directories below `project_root`.
    ///
    /// `validate` only sees the configured text; this catches absolute or
    /// `..` paths that land on the project root, an ancestor of it, or the
    /// source tree once resolved.
    pub fn validate_paths(&self, project_root: &Path) -> Vec<ConfigValidationError> {
        let root = absolute_dir(project_root, Path::new(""));
        let src = absolute_dir(project_root, &self.project.src);
        let out = absolute_dir(project_root, &self.project.out);

        let message = if root.starts_with(&out) {
            Some(format!("resolves to {}, which contains the project root", out.display()))
        } else if src.starts_with(&out) || out.starts_with(&src) {
            Some(format!("resolves to {}, which overlaps project.src", out.display()))
        } else {
            None
        };

        message
            .map(|message| ConfigValidationError { field: "project.out".to_string(), message })
            .into_iter()
            .collect()
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}
