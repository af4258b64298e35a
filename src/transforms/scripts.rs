//! Script minification.

use crate::transforms::{external, Asset, Transform, TransformError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use minify_js::{minify, Session, TopLevelMode};
use std::path::Path;

const INLINE_MAP_PREFIX: &str = "//# sourceMappingURL=data:";

/// Minifies with the external `terser` program.
///
/// With source maps on, terser is asked for an inline map which is then
/// split off the code, so the writer can place it in `<file>.map`.
pub struct TerserMinifier {
    program: String,
    source_maps: bool,
}

impl TerserMinifier {
    pub fn new(program: &str) -> Self {
        Self { program: program.to_string(), source_maps: false }
    }

    pub fn with_source_maps(mut self, enabled: bool) -> Self {
        self.source_maps = enabled;
        self
    }
}

impl Transform for TerserMinifier {
    fn name(&self) -> &'static str {
        "minify-js"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        let cwd = asset.source.parent().unwrap_or(Path::new("."));
        let source = asset.source.to_string_lossy().into_owned();

        let mut args = vec![source.as_str(), "--compress", "--mangle"];
        if self.source_maps {
            args.extend(["--source-map", "includeSources,url=inline"]);
        }
        let output = external::run_tool(&self.program, &args, cwd)?;

        let (code, map) = if self.source_maps {
            split_inline_map(&output, &asset.source_name)?
        } else {
            (output, None)
        };
        asset.bytes = code.into_bytes();
        asset.map = map;
        Ok(asset)
    }
}

/// Separate an inline base64 source map from the code, renaming the map's
/// single source to `source_name`.
pub fn split_inline_map(
    output: &str,
    source_name: &str,
) -> Result<(String, Option<String>), TransformError> {
    let Some(start) = output.rfind(INLINE_MAP_PREFIX) else {
        return Ok((output.to_string(), None));
    };

    let comment = output[start..].lines().next().unwrap_or_default();
    let Some((_, encoded)) = comment.split_once("base64,") else {
        return Ok((output.to_string(), None));
    };

    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|e| TransformError::rejected(format!("inline source map: {}", e)))?;
    let mut map: serde_json::Value = serde_json::from_slice(&decoded)
        .map_err(|e| TransformError::rejected(format!("inline source map: {}", e)))?;
    if let Some(obj) = map.as_object_mut() {
        obj.insert("sources".to_string(), serde_json::json!([source_name]));
    }

    let code = output[..start].trim_end().to_string();
    Ok((code, Some(map.to_string())))
}

/// In-process minifier (`minify-js`). Produces no source map.
pub struct BuiltinMinifier;

impl Transform for BuiltinMinifier {
    fn name(&self) -> &'static str {
        "minify-js"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        let session = Session::new();
        let mut out = Vec::new();
        minify(&session, TopLevelMode::Global, &asset.bytes, &mut out)
            .map_err(|e| TransformError::rejected(format!("{:?}", e)))?;
        asset.bytes = out;
        asset.map = None;
        Ok(asset)
    }
}
