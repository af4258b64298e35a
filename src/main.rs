//! Siteforge - command-line tool that builds and serves a static site

use std::process::ExitCode;

use siteforge::cli;

fn main() -> ExitCode {
    cli::run()
}
