//! External programs for the collaborators that have no Rust equivalent.

use crate::transforms::TransformError;
use regex::Regex;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;

/// `... on line 3, column 5:` (lessc)
static LESS_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"line (\d+), column (\d+)").expect("Invalid regex pattern"));

/// `Parse error at /src/app.js:3,7` (terser)
static TERSER_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":(\d+),(\d+)\b").expect("Invalid regex pattern"));

/// Run `program` with `args` inside `cwd` and return its stdout.
///
/// A missing program maps to [`TransformError::ToolMissing`]. A non-zero
/// exit whose diagnostics contain a location maps to
/// [`TransformError::Rejected`] at that location.
pub fn run_tool(program: &str, args: &[&str], cwd: &Path) -> Result<String, TransformError> {
    let output = match Command::new(program).args(args).current_dir(cwd).output() {
        Ok(output) => output,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(TransformError::ToolMissing(program.to_string()))
        }
        Err(e) => return Err(TransformError::Io(e)),
    };

    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(diagnose(program, &output.status.to_string(), &stderr))
}

/// Turn a failed tool's stderr into a typed error.
pub fn diagnose(program: &str, status: &str, stderr: &str) -> TransformError {
    let message = stderr.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default();

    for re in [&*LESS_LOCATION, &*TERSER_LOCATION] {
        if let Some(caps) = re.captures(stderr) {
            let line = caps[1].parse().unwrap_or(0);
            let column = caps[2].parse().unwrap_or(0);
            return TransformError::rejected_at(line, column, message);
        }
    }

    TransformError::ToolFailed {
        tool: program.to_string(),
        status: status.to_string(),
        stderr: stderr.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool() {
        let result = run_tool("siteforge-no-such-tool", &["--version"], Path::new("."));
        assert!(matches!(result, Err(TransformError::ToolMissing(name)) if name == "siteforge-no-such-tool"));
    }

    #[test]
    fn test_diagnose_lessc() {
        let stderr = "ParseError: Unrecognised input in /site/source/less/style.less on line 3, column 5:\n2 a {\n3   color: ;";
        match diagnose("lessc", "exit status: 1", stderr) {
            TransformError::Rejected { line, column, message } => {
                assert_eq!(line, Some(3));
                assert_eq!(column, Some(5));
                assert!(message.starts_with("ParseError: Unrecognised input"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_diagnose_terser() {
        let stderr = "Parse error at /site/source/js/app.js:12,4\nSyntaxError: Unexpected token";
        match diagnose("terser", "exit status: 1", stderr) {
            TransformError::Rejected { line, column, .. } => {
                assert_eq!(line, Some(12));
                assert_eq!(column, Some(4));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_diagnose_without_location() {
        let err = diagnose("lessc", "exit status: 2", "something broke");
        assert!(matches!(err, TransformError::ToolFailed { .. }));
        assert_eq!(err.to_string(), "'lessc' exited with exit status: 2: something broke");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_captures_stdout() {
        let out = run_tool("sh", &["-c", "printf 'a{}'"], Path::new(".")).unwrap();
        assert_eq!(out, "a{}");
    }
}
