//! Output tree removal.

use std::fs;
use std::io;
use std::path::Path;

/// Recursively delete the output tree.
///
/// # Returns
/// `true` when something was removed, `false` when the tree did not exist.
pub fn clean_output(out_dir: &Path) -> io::Result<bool> {
    match fs::remove_dir_all(out_dir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
