//! Image steps: lossless optimization and WebP conversion.
//!
//! | Input | Optimization |
//! |---|---|
//! | PNG | `oxipng` preset |
//! | JPEG | re-encode with `image`, kept only when smaller |
//! | SVG | strip prolog, doctype, comments, metadata and inter-tag whitespace |

use crate::transforms::{Asset, Transform, TransformError};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use regex::Regex;
use std::sync::LazyLock;

static SVG_PROLOG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<\?xml.*?\?>|<!DOCTYPE[^>]*>|<!--.*?-->|<metadata\b.*?</metadata>")
        .expect("Invalid regex pattern")
});

static SVG_GAPS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s+<").expect("Invalid regex pattern"));

/// Strip parts of an SVG document that browsers never render.
pub fn clean_svg(svg: &str) -> String {
    let stripped = SVG_PROLOG.replace_all(svg, "");
    SVG_GAPS.replace_all(stripped.trim(), "><").into_owned()
}

/// Optimizes PNG, JPEG and SVG files; anything else passes through.
pub struct ImageOptimizer {
    png_level: u8,
    jpeg_quality: u8,
}

impl ImageOptimizer {
    pub fn new(png_level: u8, jpeg_quality: u8) -> Self {
        Self { png_level, jpeg_quality }
    }

    fn optimize_png(&self, data: &[u8]) -> Result<Vec<u8>, TransformError> {
        let options = oxipng::Options::from_preset(self.png_level);
        oxipng::optimize_from_memory(data, &options)
            .map_err(|e| TransformError::rejected(format!("PNG: {}", e)))
    }

    fn optimize_jpeg(&self, data: &[u8]) -> Result<Vec<u8>, TransformError> {
        let img = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?;
        let mut out = Vec::new();
        img.write_with_encoder(JpegEncoder::new_with_quality(&mut out, self.jpeg_quality))?;
        Ok(if out.len() < data.len() { out } else { data.to_vec() })
    }
}

impl Transform for ImageOptimizer {
    fn name(&self) -> &'static str {
        "optimize-image"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        asset.bytes = match asset.source_extension().as_deref() {
            Some("png") => self.optimize_png(&asset.bytes)?,
            Some("jpg") | Some("jpeg") => self.optimize_jpeg(&asset.bytes)?,
            Some("svg") => clean_svg(asset.text()?).into_bytes(),
            _ => return Ok(asset),
        };
        Ok(asset)
    }
}

/// Encodes raster images as lossy WebP.
pub struct WebpEncoder {
    quality: u8,
}

impl WebpEncoder {
    pub fn new(quality: u8) -> Self {
        Self { quality }
    }
}

impl Transform for WebpEncoder {
    fn name(&self) -> &'static str {
        "encode-webp"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        let img = match image::load_from_memory(&asset.bytes)? {
            img @ (DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_)) => img,
            other => DynamicImage::ImageRgba8(other.to_rgba8()),
        };
        let encoder = webp::Encoder::from_image(&img)
            .map_err(|e| TransformError::rejected(format!("WebP: {}", e)))?;
        asset.bytes = encoder.encode(f32::from(self.quality)).to_vec();
        Ok(asset)
    }
}
