//! Siteforge - static-site asset pipeline
//!
//! This library provides functionality to:
//! - Compile, prefix and minify stylesheets, minify markup and scripts
//! - Optimize images, encode WebP copies and build an inline SVG sprite
//! - Serve the output tree with live reload, rebuilding on change

pub mod build;
pub mod cli;
pub mod config;
pub mod serve;
pub mod transforms;
pub mod watch;
