//! Stylesheet steps: LESS compilation, prefixing and minification.

use crate::transforms::{external, Asset, Transform, TransformError};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;
use std::fmt::Display;
use std::path::Path;

/// Convert a lightningcss error, keeping its location (lines are 0-based
/// in lightningcss).
fn css_error<T: Display>(err: lightningcss::error::Error<T>) -> TransformError {
    let message = err.kind.to_string();
    match err.loc {
        Some(loc) => TransformError::rejected_at(loc.line as usize + 1, loc.column as usize, message),
        None => TransformError::rejected(message),
    }
}

/// Resolve browserslist queries such as `defaults` or `last 2 versions`.
fn resolve_browsers(queries: &[String]) -> Result<Option<Browsers>, TransformError> {
    Browsers::from_browserslist(queries)
        .map_err(|e| TransformError::rejected(format!("invalid browsers query: {}", e)))
}

/// Parse, apply target-driven rewrites, print.
fn process(
    asset: &Asset,
    browsers: Option<Browsers>,
    minify: bool,
    source_map: Option<&mut SourceMap>,
) -> Result<String, TransformError> {
    let code = asset.text()?;
    let targets = Targets::from(browsers);

    let mut sheet = StyleSheet::parse(
        code,
        ParserOptions { filename: asset.source_name.clone(), ..ParserOptions::default() },
    )
    .map_err(css_error)?;

    sheet.minify(MinifyOptions { targets, ..MinifyOptions::default() }).map_err(css_error)?;

    let result = sheet
        .to_css(PrinterOptions { minify, source_map, targets, ..PrinterOptions::default() })
        .map_err(css_error)?;
    Ok(result.code)
}

/// Compiles a LESS entry point with the external `lessc` program.
///
/// `lessc` is run on the source file itself so that `@import` resolves
/// relative to it.
pub struct LessCompiler {
    program: String,
}

impl LessCompiler {
    pub fn new(program: &str) -> Self {
        Self { program: program.to_string() }
    }
}

impl Transform for LessCompiler {
    fn name(&self) -> &'static str {
        "compile-less"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        let cwd = asset.source.parent().unwrap_or(Path::new("."));
        let source = asset.source.to_string_lossy().into_owned();
        let css = external::run_tool(&self.program, &["--no-color", &source], cwd)?;
        asset.bytes = css.into_bytes();
        Ok(asset)
    }
}

/// Adds vendor prefixes for the configured browsers.
pub struct Autoprefixer {
    browsers: Option<Browsers>,
}

impl Autoprefixer {
    pub fn new(queries: &[String]) -> Result<Self, TransformError> {
        Ok(Self { browsers: resolve_browsers(queries)? })
    }
}

impl Transform for Autoprefixer {
    fn name(&self) -> &'static str {
        "autoprefix"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        asset.bytes = process(&asset, self.browsers, false, None)?.into_bytes();
        Ok(asset)
    }
}

/// Minifies CSS, optionally producing a source map.
///
/// The map points into the stylesheet as it entered this step, with that
/// text embedded as `sourcesContent`.
pub struct CssMinifier {
    browsers: Option<Browsers>,
    source_maps: bool,
}

impl CssMinifier {
    pub fn new(queries: &[String]) -> Result<Self, TransformError> {
        Ok(Self { browsers: resolve_browsers(queries)?, source_maps: false })
    }

    pub fn with_source_maps(mut self, enabled: bool) -> Self {
        self.source_maps = enabled;
        self
    }
}

impl Transform for CssMinifier {
    fn name(&self) -> &'static str {
        "minify-css"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        if !self.source_maps {
            asset.bytes = process(&asset, self.browsers, true, None)?.into_bytes();
            return Ok(asset);
        }

        let mut map = SourceMap::new("/");
        let index = map.add_source(&asset.source_name);
        map.set_source_content(index as usize, asset.text()?)
            .map_err(|e| TransformError::rejected(format!("source map: {:?}", e)))?;

        let css = process(&asset, self.browsers, true, Some(&mut map))?;
        let json = map
            .to_json(None)
            .map_err(|e| TransformError::rejected(format!("source map: {:?}", e)))?;

        asset.bytes = css.into_bytes();
        asset.map = Some(json);
        Ok(asset)
    }
}
