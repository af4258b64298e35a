//! Task names and the static task catalog.
//!
//! Every transform task is described by a [`TaskDescriptor`]: which source
//! files it reads, the ordered steps applied to each, where results go and
//! which part of the output tree it owns. Descriptors are derived from
//! [`SiteConfig`] only; nothing here depends on runtime input.

use crate::config::{ScriptMinifier, SiteConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Every task that can be invoked from the command line.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "camelCase")]
#[value(rename_all = "camelCase")]
pub enum TaskName {
    Clean,
    Styles,
    Html,
    Js,
    Image,
    CopyImages,
    CreateWebp,
    Sprite,
    Copy,
    CopyNormalize,
    Server,
    Build,
    Default,
}

impl TaskName {
    /// Tasks that read sources and write into the output tree.
    pub const TRANSFORMS: [TaskName; 9] = [
        TaskName::Styles,
        TaskName::Html,
        TaskName::Js,
        TaskName::Image,
        TaskName::CopyImages,
        TaskName::CreateWebp,
        TaskName::Sprite,
        TaskName::Copy,
        TaskName::CopyNormalize,
    ];

    /// Name as typed on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskName::Clean => "clean",
            TaskName::Styles => "styles",
            TaskName::Html => "html",
            TaskName::Js => "js",
            TaskName::Image => "image",
            TaskName::CopyImages => "copyImages",
            TaskName::CreateWebp => "createWebp",
            TaskName::Sprite => "sprite",
            TaskName::Copy => "copy",
            TaskName::CopyNormalize => "copyNormalize",
            TaskName::Server => "server",
            TaskName::Build => "build",
            TaskName::Default => "default",
        }
    }

    /// Whether this task has a descriptor in the catalog.
    pub fn is_transform(&self) -> bool {
        Self::TRANSFORMS.contains(self)
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which files feed a task, relative to the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    /// Directory the include patterns are evaluated in. Relative structure
    /// below it is preserved in the output.
    pub base: PathBuf,
    /// Glob patterns; single-level braces such as `*.{png,jpg}` are allowed.
    pub include: Vec<String>,
}

impl SourceSpec {
    pub fn new(base: impl Into<PathBuf>, include: &[&str]) -> Self {
        Self { base: base.into(), include: include.iter().map(|s| s.to_string()).collect() }
    }
}

/// A single transformation applied to a file on its way to the output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    CompileLess,
    Autoprefix,
    MinifyCss,
    /// Replace the file name, keeping the directory.
    Rename(String),
    MinifyHtml,
    MinifyJs,
    OptimizeImage,
    /// Lossy WebP at the given quality; the extension becomes `.webp`.
    EncodeWebp(u8),
}

impl Step {
    /// Output path after this step, given the path before it.
    pub fn output_path(&self, path: &Path) -> PathBuf {
        match self {
            Step::Rename(name) => path.with_file_name(name),
            Step::EncodeWebp(_) => path.with_extension("webp"),
            _ => path.to_path_buf(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Step::CompileLess => "compile-less",
            Step::Autoprefix => "autoprefix",
            Step::MinifyCss => "minify-css",
            Step::Rename(_) => "rename",
            Step::MinifyHtml => "minify-html",
            Step::MinifyJs => "minify-js",
            Step::OptimizeImage => "optimize-image",
            Step::EncodeWebp(_) => "encode-webp",
        }
    }
}

/// How matched files map to outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskMode {
    /// One output per source file.
    Each,
    /// All matched files merged into one named output.
    Combine { name: String },
}

/// Part of the output tree a task owns.
///
/// `prefix` is relative to the output root; `extensions` restricts the claim
/// to files with those (lowercase) extensions, `None` claims everything below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub prefix: PathBuf,
    pub extensions: Option<BTreeSet<String>>,
}

impl Claim {
    /// Everything at or below `prefix`.
    pub fn subtree(prefix: impl Into<PathBuf>) -> Self {
        Self { prefix: prefix.into(), extensions: None }
    }

    /// Files below `prefix` with one of `extensions`.
    pub fn with_extensions(prefix: impl Into<PathBuf>, extensions: &[&str]) -> Self {
        Self {
            prefix: prefix.into(),
            extensions: Some(extensions.iter().map(|e| e.to_ascii_lowercase()).collect()),
        }
    }
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.prefix.as_os_str().is_empty() {
            "<root>".to_string()
        } else {
            self.prefix.display().to_string()
        };
        match &self.extensions {
            Some(exts) => {
                write!(f, "{} [{}]", prefix, exts.iter().cloned().collect::<Vec<_>>().join(","))
            }
            None => write!(f, "{}", prefix),
        }
    }
}

/// Static description of one transform task.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub name: TaskName,
    pub sources: SourceSpec,
    pub mode: TaskMode,
    pub steps: Vec<Step>,
    /// Output directory relative to the output root.
    pub out_dir: PathBuf,
    pub claims: Vec<Claim>,
    /// Write `<file>.map` beside outputs that carry a map.
    pub source_maps: bool,
    /// Push written paths to the reloader.
    pub stream: bool,
}

impl TaskDescriptor {
    /// Destination (relative to the output root) of a source file that sits
    /// at `rel` below the task's source base.
    pub fn destination(&self, rel: &Path) -> PathBuf {
        match &self.mode {
            TaskMode::Each => {
                let start = self.out_dir.join(rel);
                self.steps.iter().fold(start, |path, step| step.output_path(&path))
            }
            TaskMode::Combine { name } => self.out_dir.join(name),
        }
    }
}

fn image_claims() -> Vec<Claim> {
    vec![Claim::with_extensions("img", &["png", "jpg", "svg"])]
}

fn image_sources() -> SourceSpec {
    SourceSpec::new("img", &["**/*.{png,jpg,svg}"])
}

/// Build the descriptor for a transform task. Returns `None` for `clean`,
/// `server` and the composite graphs.
pub fn descriptor(name: TaskName, config: &SiteConfig) -> Option<TaskDescriptor> {
    let desc = match name {
        TaskName::Styles => {
            let entry = &config.styles.entry;
            let base = entry.parent().map(Path::to_path_buf).unwrap_or_default();
            let file = entry.file_name().map(|f| f.to_string_lossy().into_owned()).unwrap_or_default();
            let output = config.styles.output.clone();
            let steps = vec![
                Step::CompileLess,
                Step::Autoprefix,
                Step::MinifyCss,
                Step::Rename(output.clone()),
            ];
            TaskDescriptor {
                name,
                sources: SourceSpec::new(base, &[file.as_str()]),
                mode: TaskMode::Each,
                steps,
                out_dir: PathBuf::from("css"),
                claims: vec![
                    Claim::subtree(Path::new("css").join(&output)),
                    Claim::subtree(Path::new("css").join(format!("{}.map", output))),
                ],
                source_maps: config.styles.source_maps,
                stream: true,
            }
        }
        TaskName::Html => TaskDescriptor {
            name,
            sources: SourceSpec::new("", &["**/*.html"]),
            mode: TaskMode::Each,
            steps: vec![Step::MinifyHtml],
            out_dir: PathBuf::new(),
            claims: vec![Claim::with_extensions("", &["html"])],
            source_maps: false,
            stream: false,
        },
        TaskName::Js => TaskDescriptor {
            name,
            sources: SourceSpec::new("js", &["*.js"]),
            mode: TaskMode::Each,
            steps: vec![Step::MinifyJs],
            out_dir: PathBuf::from("js"),
            claims: vec![Claim::with_extensions("js", &["js", "map"])],
            source_maps: config.scripts.source_maps
                && config.scripts.minifier == ScriptMinifier::Terser,
            stream: true,
        },
        TaskName::Image => TaskDescriptor {
            name,
            sources: image_sources(),
            mode: TaskMode::Each,
            steps: vec![Step::OptimizeImage],
            out_dir: PathBuf::from("img"),
            claims: image_claims(),
            source_maps: false,
            stream: false,
        },
        TaskName::CopyImages => TaskDescriptor {
            name,
            sources: image_sources(),
            mode: TaskMode::Each,
            steps: Vec::new(),
            out_dir: PathBuf::from("img"),
            claims: image_claims(),
            source_maps: false,
            stream: false,
        },
        TaskName::CreateWebp => TaskDescriptor {
            name,
            sources: SourceSpec::new("img", &["**/*.{png,jpg}"]),
            mode: TaskMode::Each,
            steps: vec![Step::EncodeWebp(config.images.webp_quality)],
            out_dir: PathBuf::from("img"),
            claims: vec![Claim::with_extensions("img", &["webp"])],
            source_maps: false,
            stream: false,
        },
        TaskName::Sprite => TaskDescriptor {
            name,
            sources: SourceSpec::new("img/icons", &["*.svg"]),
            mode: TaskMode::Combine { name: config.sprite.name.clone() },
            steps: Vec::new(),
            out_dir: PathBuf::from("img"),
            claims: vec![
                Claim::subtree(Path::new("img").join(&config.sprite.name)),
                Claim::subtree("img/icons"),
            ],
            source_maps: false,
            stream: false,
        },
        TaskName::Copy => TaskDescriptor {
            name,
            sources: SourceSpec::new("", &["fonts/*.{woff2,woff}", "*.ico"]),
            mode: TaskMode::Each,
            steps: Vec::new(),
            out_dir: PathBuf::new(),
            claims: vec![
                Claim::with_extensions("fonts", &["woff", "woff2"]),
                Claim::with_extensions("", &["ico"]),
            ],
            source_maps: false,
            stream: false,
        },
        TaskName::CopyNormalize => TaskDescriptor {
            name,
            sources: SourceSpec::new("css", &["*.css"]),
            mode: TaskMode::Each,
            steps: Vec::new(),
            out_dir: PathBuf::from("css"),
            claims: vec![Claim::with_extensions("css", &["css"])],
            source_maps: false,
            stream: false,
        },
        TaskName::Clean | TaskName::Server | TaskName::Build | TaskName::Default => return None,
    };
    Some(desc)
}

/// Descriptors for the given tasks, skipping non-transform names.
pub fn descriptors(names: &[TaskName], config: &SiteConfig) -> Vec<TaskDescriptor> {
    names.iter().filter_map(|n| descriptor(*n, config)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;

    #[test]
    fn test_task_name_round_trip_through_cli_names() {
        use clap::ValueEnum;
        for name in TaskName::value_variants() {
            let parsed = TaskName::from_str(name.as_str(), false).unwrap();
            assert_eq!(parsed, *name);
        }
        assert_eq!(TaskName::from_str("copyImages", false).unwrap(), TaskName::CopyImages);
    }

    #[test]
    fn test_every_transform_has_descriptor() {
        let config = default_config();
        for name in TaskName::TRANSFORMS {
            assert!(descriptor(name, &config).is_some(), "{} has no descriptor", name);
        }
        assert!(descriptor(TaskName::Clean, &config).is_none());
        assert!(descriptor(TaskName::Server, &config).is_none());
        assert!(descriptor(TaskName::Build, &config).is_none());
    }

    #[test]
    fn test_styles_destination_is_renamed() {
        let desc = descriptor(TaskName::Styles, &default_config()).unwrap();
        assert_eq!(desc.sources.base, PathBuf::from("less"));
        assert_eq!(desc.sources.include, vec!["style.less".to_string()]);
        assert_eq!(desc.destination(Path::new("style.less")), PathBuf::from("css/style.min.css"));
    }

    #[test]
    fn test_webp_destination_changes_extension() {
        let desc = descriptor(TaskName::CreateWebp, &default_config()).unwrap();
        assert_eq!(
            desc.destination(Path::new("photos/beach.jpg")),
            PathBuf::from("img/photos/beach.webp")
        );
        assert_eq!(desc.steps, vec![Step::EncodeWebp(80)]);
    }

    #[test]
    fn test_sprite_combines_into_named_file() {
        let desc = descriptor(TaskName::Sprite, &default_config()).unwrap();
        assert_eq!(desc.destination(Path::new("cart.svg")), PathBuf::from("img/sprite.svg"));
    }

    #[test]
    fn test_copy_preserves_relative_path() {
        let desc = descriptor(TaskName::Copy, &default_config()).unwrap();
        assert_eq!(
            desc.destination(Path::new("fonts/open-sans.woff2")),
            PathBuf::from("fonts/open-sans.woff2")
        );
        assert_eq!(desc.destination(Path::new("favicon.ico")), PathBuf::from("favicon.ico"));
    }

    #[test]
    fn test_builtin_minifier_disables_script_maps() {
        let mut config = default_config();
        config.scripts.minifier = ScriptMinifier::Builtin;
        let desc = descriptor(TaskName::Js, &config).unwrap();
        assert!(!desc.source_maps);
        assert!(desc.stream);
    }

    #[test]
    fn test_claim_display() {
        assert_eq!(Claim::with_extensions("img", &["png", "jpg"]).to_string(), "img [jpg,png]");
        assert_eq!(Claim::subtree("").to_string(), "<root>");
    }
}
