//! File globbing for multi-file source targets.
//!
//! A schema document may target `data/items_*.xlsx`; every matching file is read
//! in turn as one logical table.
//!
//! # Examples
//!
//! ```no_run
//! use ironsheet::io::glob::expand_glob;
//!
//! // All workbooks in a directory
//! let files = expand_glob("tables/*.xlsx")?;
//! # use anyhow::Error; Ok::<(), Error>(())
//! ```

use anyhow::{Context, Result};
use glob::glob;
use std::path::{Path, PathBuf};

/// Whether `pattern` contains glob metacharacters.
#[must_use]
pub fn is_pattern(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Expand a glob pattern into a sorted vector of matching file paths.
///
/// Directories are skipped, as are files whose name starts with `~` (the lock
/// files office suites leave next to open workbooks). Zero matches is not an
/// error; callers decide.
///
/// # Errors
///
/// Returns an error if:
/// - The pattern is invalid
/// - There are I/O errors accessing the filesystem
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;

    let mut result = Vec::new();
    for entry in paths {
        let path =
            entry.with_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
        if path.is_file() && !is_lock_file(&path) {
            result.push(path);
        }
    }

    // Sort for deterministic order
    result.sort();

    Ok(result)
}

fn is_lock_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('~'))
}
