//! File transformations.
//!
//! Each [`Step`] of a task descriptor becomes a [`Transform`]: a stateless
//! object that turns one in-flight [`Asset`] into the next. Transforms are
//! shared across rayon workers, so they must be `Sync`.
//!
//! | Step | Implementation |
//! |------|----------------|
//! | compile-less | external `lessc`, or pass-through for plain CSS |
//! | autoprefix / minify-css | lightningcss |
//! | minify-html | minify-html |
//! | minify-js | external `terser`, or minify-js |
//! | optimize-image | oxipng, image (JPEG), regex SVG cleanup |
//! | encode-webp | webp |
//!
//! Combining several files into one (the icon sprite) is handled by
//! [`sprite::SvgStore`].

pub mod external;
pub mod html;
pub mod images;
pub mod scripts;
pub mod sprite;
pub mod styles;

use crate::build::{map_path, BuildContext, FileError, Step};
use crate::config::{ScriptMinifier, StyleCompiler};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a transformation could not produce output.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The input was rejected by a parser or encoder
    #[error("{message}")]
    Rejected { line: Option<usize>, column: Option<usize>, message: String },
    /// An external program is not installed
    #[error("'{0}' was not found; install it or point [tools] in siteforge.toml at it")]
    ToolMissing(String),
    /// An external program failed without a recognizable diagnostic
    #[error("'{tool}' exited with {status}: {stderr}")]
    ToolFailed { tool: String, status: String, stderr: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransformError {
    /// Rejected input without a location.
    pub fn rejected(message: impl Into<String>) -> Self {
        TransformError::Rejected { line: None, column: None, message: message.into() }
    }

    /// Rejected input at a 1-indexed line and column.
    pub fn rejected_at(line: usize, column: usize, message: impl Into<String>) -> Self {
        TransformError::Rejected { line: Some(line), column: Some(column), message: message.into() }
    }

    /// Attach the failing file.
    pub fn into_file_error(self, file: PathBuf) -> FileError {
        match self {
            TransformError::Rejected { line, column, message } => {
                FileError { file, line, column, message }
            }
            other => FileError::new(file, other.to_string()),
        }
    }
}

impl From<image::ImageError> for TransformError {
    fn from(err: image::ImageError) -> Self {
        TransformError::rejected(err.to_string())
    }
}

/// A file on its way from the source tree to the output tree.
#[derive(Debug, Clone)]
pub struct Asset {
    /// Destination relative to the output root
    pub path: PathBuf,
    /// Absolute path of the originating source file
    pub source: PathBuf,
    /// Path of the source relative to the source root, used in maps
    pub source_name: String,
    pub bytes: Vec<u8>,
    /// Source map JSON, when a step produced one
    pub map: Option<String>,
}

impl Asset {
    pub fn new(path: PathBuf, source: PathBuf, source_name: String, bytes: Vec<u8>) -> Self {
        Self { path, source, source_name, bytes, map: None }
    }

    /// Read a source file from disk.
    pub fn read(path: PathBuf, source: PathBuf, source_name: String) -> Result<Self, TransformError> {
        let bytes = fs::read(&source)?;
        Ok(Self::new(path, source, source_name, bytes))
    }

    /// Contents as UTF-8 text.
    pub fn text(&self) -> Result<&str, TransformError> {
        std::str::from_utf8(&self.bytes)
            .map_err(|e| TransformError::rejected(format!("not valid UTF-8: {}", e)))
    }

    /// Lowercased extension of the source file.
    pub fn source_extension(&self) -> Option<String> {
        self.source.extension().map(|e| e.to_string_lossy().to_ascii_lowercase())
    }
}

/// One transformation step.
pub trait Transform: Send + Sync {
    /// Step name used in logs.
    fn name(&self) -> &'static str;

    /// Transform an asset.
    fn apply(&self, asset: Asset) -> Result<Asset, TransformError>;
}

/// Steps that only move an asset (the rename is already reflected in the
/// planned destination).
struct Passthrough(&'static str);

impl Transform for Passthrough {
    fn name(&self) -> &'static str {
        self.0
    }

    fn apply(&self, asset: Asset) -> Result<Asset, TransformError> {
        Ok(asset)
    }
}

/// Instantiate the transform for a step.
pub fn build_step(step: &Step, ctx: &BuildContext) -> Result<Box<dyn Transform>, TransformError> {
    let config = ctx.config();
    let transform: Box<dyn Transform> = match step {
        Step::CompileLess => match config.styles.compiler {
            StyleCompiler::Lessc => Box::new(styles::LessCompiler::new(&config.tools.lessc)),
            StyleCompiler::Css => Box::new(Passthrough("compile-less")),
        },
        Step::Autoprefix => Box::new(styles::Autoprefixer::new(&config.styles.browsers)?),
        Step::MinifyCss => Box::new(
            styles::CssMinifier::new(&config.styles.browsers)?
                .with_source_maps(config.styles.source_maps),
        ),
        Step::Rename(_) => Box::new(Passthrough("rename")),
        Step::MinifyHtml => Box::new(html::HtmlMinifier::new()),
        Step::MinifyJs => match config.scripts.minifier {
            ScriptMinifier::Terser => Box::new(
                scripts::TerserMinifier::new(&config.tools.terser)
                    .with_source_maps(config.scripts.source_maps),
            ),
            ScriptMinifier::Builtin => Box::new(scripts::BuiltinMinifier),
        },
        Step::OptimizeImage => Box::new(images::ImageOptimizer::new(
            config.images.png_level,
            config.images.jpeg_quality,
        )),
        Step::EncodeWebp(quality) => Box::new(images::WebpEncoder::new(*quality)),
    };
    Ok(transform)
}

/// Instantiate a step chain.
pub fn build_chain(steps: &[Step], ctx: &BuildContext) -> Result<Vec<Box<dyn Transform>>, TransformError> {
    steps.iter().map(|s| build_step(s, ctx)).collect()
}

/// Run an asset through a chain of transforms.
pub fn apply_chain(chain: &[Box<dyn Transform>], asset: Asset) -> Result<Asset, TransformError> {
    chain.iter().try_fold(asset, |asset, t| {
        tracing::trace!(step = t.name(), "{}", asset.path.display());
        t.apply(asset)
    })
}

/// `sourceMappingURL` trailer for a written file.
fn map_trailer(dest: &Path, map_name: &str) -> String {
    match dest.extension().and_then(|e| e.to_str()) {
        Some("css") => format!("\n/*# sourceMappingURL={} */\n", map_name),
        _ => format!("\n//# sourceMappingURL={}\n", map_name),
    }
}

/// Point a map's `file` at the written output.
fn finish_map(map: &str, file_name: &str) -> Result<String, TransformError> {
    let mut value: serde_json::Value = serde_json::from_str(map)
        .map_err(|e| TransformError::rejected(format!("invalid source map: {}", e)))?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("file".to_string(), serde_json::Value::String(file_name.to_string()));
    }
    serde_json::to_string(&value)
        .map_err(|e| TransformError::rejected(format!("invalid source map: {}", e)))
}

/// Write an asset below `out_root`.
///
/// With `source_maps` set and a map present, `<file>.map` is written beside
/// the output and a trailer referencing it is appended.
///
/// # Returns
/// The written paths, relative to `out_root`.
pub fn write_asset(out_root: &Path, asset: Asset, source_maps: bool) -> Result<Vec<PathBuf>, TransformError> {
    let dest = out_root.join(&asset.path);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut written = vec![asset.path.clone()];
    let mut bytes = asset.bytes;

    if let (true, Some(map)) = (source_maps, asset.map.as_deref()) {
        let file_name =
            asset.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let map_rel = map_path(&asset.path);
        let map_name = format!("{}.map", file_name);

        fs::write(out_root.join(&map_rel), finish_map(map, &file_name)?)?;
        while bytes.last().is_some_and(|b| b.is_ascii_whitespace()) {
            bytes.pop();
        }
        bytes.extend_from_slice(map_trailer(&asset.path, &map_name).as_bytes());
        written.push(map_rel);
    }

    fs::write(&dest, bytes)?;
    Ok(written)
}
