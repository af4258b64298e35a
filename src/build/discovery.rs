//! Source file discovery for transform tasks.
//!
//! Resolves a task's [`SourceSpec`] against the source root. Patterns may use
//! one level of braces (`*.{png,jpg}`); a missing base directory simply
//! matches nothing.

use crate::build::SourceSpec;
use glob::{glob_with, MatchOptions, Pattern};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Error during source discovery.
#[derive(Debug)]
pub enum DiscoveryError {
    /// Invalid glob pattern
    InvalidPattern(String, glob::PatternError),
    /// IO error during file enumeration
    Io(std::io::Error),
}

impl std::fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryError::InvalidPattern(pattern, err) => {
                write!(f, "Invalid glob pattern '{}': {}", pattern, err)
            }
            DiscoveryError::Io(err) => write!(f, "IO error during discovery: {}", err),
        }
    }
}

impl std::error::Error for DiscoveryError {}

impl From<std::io::Error> for DiscoveryError {
    fn from(err: std::io::Error) -> Self {
        DiscoveryError::Io(err)
    }
}

/// A matched source file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceFile {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Path relative to the spec's base directory
    pub rel: PathBuf,
}

const MATCH_OPTIONS: MatchOptions =
    MatchOptions { case_sensitive: true, require_literal_separator: true, require_literal_leading_dot: false };

/// Expand one level of `{a,b}` alternatives.
///
/// `*.{png,jpg}` becomes `*.png` and `*.jpg`. Patterns without braces are
/// returned unchanged; nested braces are not supported.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };
    let Some(close) = pattern[open..].find('}').map(|i| open + i) else {
        return vec![pattern.to_string()];
    };

    let (head, tail) = (&pattern[..open], &pattern[close + 1..]);
    pattern[open + 1..close]
        .split(',')
        .flat_map(|alt| expand_braces(&format!("{}{}{}", head, alt, tail)))
        .collect()
}

/// Discover files matching a glob pattern below `base_dir`.
///
/// # Returns
/// Sorted list of matching file paths. Directories are skipped.
pub fn discover_files(base_dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
    let mut files = BTreeSet::new();
    let escaped_base = Pattern::escape(&base_dir.to_string_lossy());

    for expanded in expand_braces(pattern) {
        let full_pattern = Path::new(&escaped_base).join(&expanded);
        let pattern_str = full_pattern.to_string_lossy();

        let paths = glob_with(&pattern_str, MATCH_OPTIONS)
            .map_err(|e| DiscoveryError::InvalidPattern(pattern.to_string(), e))?;

        for entry in paths {
            match entry {
                Ok(path) => {
                    if path.is_file() {
                        files.insert(path);
                    }
                }
                Err(e) => {
                    tracing::warn!("error reading path: {}", e);
                }
            }
        }
    }

    Ok(files.into_iter().collect())
}

/// Resolve a source spec against the source root.
///
/// Results are deduplicated across include patterns and sorted by relative
/// path, so planning is deterministic.
pub fn discover_sources(src_root: &Path, spec: &SourceSpec) -> Result<Vec<SourceFile>, DiscoveryError> {
    let base_dir = src_root.join(&spec.base);

    let mut found = BTreeSet::new();
    for pattern in &spec.include {
        for path in discover_files(&base_dir, pattern)? {
            let Ok(rel) = path.strip_prefix(&base_dir).map(Path::to_path_buf) else {
                continue;
            };
            found.insert(SourceFile { path, rel });
        }
    }

    let mut result: Vec<_> = found.into_iter().collect();
    result.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(result)
}

/// Whether a path relative to the source root matches any of `patterns`.
pub fn matches_any(rel: &Path, patterns: &[String]) -> bool {
    patterns.iter().flat_map(|p| expand_braces(p)).any(|p| {
        Pattern::new(&p).map(|pat| pat.matches_path_with(rel, MATCH_OPTIONS)).unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, "x").unwrap();
        path
    }

    #[test]
    fn test_expand_braces() {
        assert_eq!(expand_braces("*.html"), vec!["*.html"]);
        assert_eq!(expand_braces("**/*.{png,jpg,svg}"), vec!["**/*.png", "**/*.jpg", "**/*.svg"]);
        assert_eq!(expand_braces("fonts/*.{woff2,woff}"), vec!["fonts/*.woff2", "fonts/*.woff"]);
    }

    #[test]
    fn test_expand_braces_unclosed() {
        assert_eq!(expand_braces("*.{png"), vec!["*.{png"]);
    }

    #[test]
    fn test_discover_files_empty_dir() {
        let temp = TempDir::new().unwrap();
        let files = discover_files(temp.path(), "*.html").unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_discover_files_missing_dir() {
        let temp = TempDir::new().unwrap();
        let files = discover_files(&temp.path().join("nope"), "**/*.png").unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_discover_files_single_star_stays_in_directory() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "index.html");
        create_test_file(temp.path(), "blog/post.html");

        let files = discover_files(temp.path(), "*.html").unwrap();
        assert_eq!(files, vec![temp.path().join("index.html")]);

        let files = discover_files(temp.path(), "**/*.html").unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_discover_files_braces() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "a.png");
        create_test_file(temp.path(), "b.jpg");
        create_test_file(temp.path(), "c.gif");

        let files = discover_files(temp.path(), "*.{png,jpg}").unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_discover_files_skips_directories() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("folder.svg")).unwrap();
        create_test_file(temp.path(), "icon.svg");

        let files = discover_files(temp.path(), "*.svg").unwrap();
        assert_eq!(files, vec![temp.path().join("icon.svg")]);
    }

    #[test]
    fn test_discover_files_base_with_glob_characters() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("site[1]");
        create_test_file(&base, "index.html");

        let files = discover_files(&base, "*.html").unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_discover_sources_relative_paths() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "img/logo.png");
        create_test_file(temp.path(), "img/photos/beach.jpg");
        create_test_file(temp.path(), "fonts/body.woff2");

        let spec = SourceSpec::new("img", &["**/*.{png,jpg,svg}"]);
        let files = discover_sources(temp.path(), &spec).unwrap();

        let rels: Vec<_> = files.iter().map(|f| f.rel.clone()).collect();
        assert_eq!(rels, vec![PathBuf::from("logo.png"), PathBuf::from("photos/beach.jpg")]);
        assert_eq!(files[0].path, temp.path().join("img/logo.png"));
    }

    #[test]
    fn test_discover_sources_dedupes_overlapping_patterns() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "favicon.ico");

        let spec = SourceSpec::new("", &["*.ico", "favicon.*"]);
        let files = discover_sources(temp.path(), &spec).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_invalid_pattern() {
        let temp = TempDir::new().unwrap();
        let result = discover_files(temp.path(), "***/[");
        assert!(matches!(result, Err(DiscoveryError::InvalidPattern(_, _))));
    }

    #[test]
    fn test_matches_any() {
        let patterns = vec!["less/**/*.less".to_string(), "*.html".to_string()];
        assert!(matches_any(Path::new("less/blocks/header.less"), &patterns));
        assert!(matches_any(Path::new("less/style.less"), &patterns));
        assert!(matches_any(Path::new("index.html"), &patterns));
        assert!(!matches_any(Path::new("blog/index.html"), &patterns));
        assert!(!matches_any(Path::new("js/app.js"), &patterns));
    }
}
