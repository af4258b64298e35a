//! Inline SVG sprite assembly.
//!
//! Every icon's root `<svg>` becomes a `<symbol>` whose id is the icon's
//! file stem, so pages can reference `<use href="#cart"/>`. Symbols are
//! ordered by id and the sprite carries no XML prolog, which makes it safe
//! to inline into markup.

use crate::build::FileError;
use crate::transforms::images::clean_svg;
use crate::transforms::{Asset, TransformError};
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

static SVG_ROOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^<svg\b([^>]*?)/?>(.*?)(?:</svg>)?$").expect("Invalid regex pattern"));

static KEPT_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(viewBox|preserveAspectRatio)\s*=\s*("[^"]*"|'[^']*')"#).expect("Invalid regex pattern")
});

const SVG_NS: &str = "http://www.w3.org/2000/svg";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// One icon converted to a `<symbol>`.
fn to_symbol(asset: &Asset) -> Result<(String, String), TransformError> {
    let id = asset
        .source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| TransformError::rejected("icon has no file name"))?;

    let svg = clean_svg(asset.text()?);
    let caps = SVG_ROOT
        .captures(&svg)
        .ok_or_else(|| TransformError::rejected("no <svg> root element"))?;

    let attrs: Vec<String> = KEPT_ATTRIBUTE
        .captures_iter(&caps[1])
        .map(|c| format!("{}={}", &c[1], &c[2]))
        .collect();
    let attrs = if attrs.is_empty() { String::new() } else { format!(" {}", attrs.join(" ")) };

    Ok((id.clone(), format!("<symbol id=\"{}\"{}>{}</symbol>", id, attrs, &caps[2])))
}

/// Combines icons into a single inline sprite.
pub struct SvgStore;

impl SvgStore {
    /// Combine `icons` into an asset at `path`.
    ///
    /// Every icon that cannot be converted is reported; no sprite is
    /// produced in that case.
    pub fn combine(&self, path: PathBuf, icons: &[Asset]) -> Result<Asset, Vec<FileError>> {
        let mut symbols = Vec::with_capacity(icons.len());
        let mut errors = Vec::new();

        for icon in icons {
            match to_symbol(icon) {
                Ok(symbol) => symbols.push(symbol),
                Err(e) => errors.push(e.into_file_error(PathBuf::from(&icon.source_name))),
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        symbols.sort_by(|a, b| a.0.cmp(&b.0));
        let body: String = symbols.into_iter().map(|(_, s)| s).collect();
        let xlink = if body.contains("xlink:") {
            format!(" xmlns:xlink=\"{}\"", XLINK_NS)
        } else {
            String::new()
        };
        let sprite = format!("<svg xmlns=\"{}\"{}>{}</svg>", SVG_NS, xlink, body);

        let source = icons.first().map(|i| i.source.clone()).unwrap_or_default();
        Ok(Asset::new(path, source, "sprite".to_string(), sprite.into_bytes()))
    }
}
