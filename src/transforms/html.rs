//! Markup minification.

use crate::transforms::{Asset, Transform, TransformError};
use minify_html::Cfg;

/// Collapses whitespace and drops comments.
///
/// Closing tags and the `<html>`/`<head>` start tags are kept, and inline
/// scripts and styles are left alone, so the result stays valid for
/// tooling that expects well-formed markup.
pub struct HtmlMinifier {
    cfg: Cfg,
}

impl HtmlMinifier {
    pub fn new() -> Self {
        Self {
            cfg: Cfg {
                keep_closing_tags: true,
                keep_html_and_head_opening_tags: true,
                ..Cfg::default()
            },
        }
    }
}

impl Default for HtmlMinifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for HtmlMinifier {
    fn name(&self) -> &'static str {
        "minify-html"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        asset.bytes = minify_html::minify(&asset.bytes, &self.cfg);
        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn html_asset(html: &str) -> Asset {
        Asset::new(
            PathBuf::from("index.html"),
            PathBuf::from("/site/source/index.html"),
            "index.html".to_string(),
            html.as_bytes().to_vec(),
        )
    }

    #[test]
    fn test_collapses_whitespace() {
        let src = "<html>\n  <head>\n    <title>Shop</title>\n  </head>\n  <body>\n    <p>Hello,    world</p>\n  </body>\n</html>\n";
        let out = HtmlMinifier::new().apply(html_asset(src)).unwrap();
        let html = String::from_utf8(out.bytes).unwrap();

        assert!(html.len() < src.len());
        assert!(html.contains("<p>Hello, world</p>"), "{}", html);
        assert!(html.contains("</body>"));
        assert!(!html.contains('\n'));
    }

    #[test]
    fn test_drops_comments() {
        let out = HtmlMinifier::new().apply(html_asset("<p>a<!-- note --></p>")).unwrap();
        let html = String::from_utf8(out.bytes).unwrap();
        assert!(!html.contains("note"));
    }

    #[test]
    fn test_empty_input() {
        let out = HtmlMinifier::new().apply(html_asset("")).unwrap();
        assert!(out.bytes.is_empty());
    }
}
