//! Configuration module for the siteforge pipeline
//!
//! Provides types and parsing for `siteforge.toml` project configuration.

pub mod loader;
pub mod schema;

pub use loader::*;
pub use schema::*;
