//! Run settings and schema-document lookup.

use crate::datetime;
use crate::error::ConvertError;
use crate::io::glob::expand_glob;
use anyhow::{Context, Result, bail};
use chrono::{FixedOffset, Local, Offset};
use std::path::{Path, PathBuf};

/// Upper bound on worker threads, whatever the host reports.
pub const MAX_JOBS: usize = 20;

/// Settings shared by every stage of a run.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Directory that document `target` paths are resolved against.
    pub source_search_path: PathBuf,
    /// Directories searched, in order, for schema documents. Empty means the
    /// current directory.
    pub schema_search_paths: Vec<PathBuf>,
    /// Directory that handler output paths are resolved against.
    pub output_base_path: PathBuf,
    /// Worker thread count, including the calling thread.
    pub jobs: usize,
    /// Open every source table privately, even when several jobs read it.
    pub no_cache: bool,
    /// Offset used for spreadsheet dates and zone-less date strings.
    pub tz_offset: FixedOffset,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_search_path: PathBuf::from("."),
            schema_search_paths: Vec::new(),
            output_base_path: PathBuf::from("."),
            jobs: clamp_jobs(num_cpus::get()),
            no_cache: false,
            tz_offset: Local::now().offset().fix(),
        }
    }
}

impl Settings {
    /// Resolve a schema document name against the search paths.
    ///
    /// # Errors
    /// Returns a resource error if no search path contains `name`.
    pub fn search_schema_path(&self, name: &str) -> Result<PathBuf> {
        if self.schema_search_paths.is_empty() {
            let path = PathBuf::from(name);
            if path.is_file() {
                return Ok(path);
            }
        } else {
            for dir in &self.schema_search_paths {
                let path = dir.join(name);
                if path.is_file() {
                    return Ok(path);
                }
            }
        }
        Err(ConvertError::resource(name, "does not exist.").into())
    }

    /// Every `*.yaml`/`*.yml` document below the first schema search path, as
    /// names relative to that path, sorted.
    ///
    /// # Errors
    /// Fails without a search path or when nothing is found.
    pub fn discover_targets(&self) -> Result<Vec<String>> {
        let Some(root) = self.schema_search_paths.first() else {
            bail!(ConvertError::config("requires --schema-search-path."));
        };
        let mut names = Vec::new();
        for ext in ["yaml", "yml"] {
            let pattern = format!("{}/**/*.{ext}", root.display());
            for path in expand_glob(&pattern)? {
                names.push(relative_name(root, &path)?);
            }
        }
        if names.is_empty() {
            bail!(ConvertError::config(format!(
                "{}: no schema documents found.",
                root.display()
            )));
        }
        names.sort();
        Ok(names)
    }
}

fn relative_name(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

fn clamp_jobs(jobs: usize) -> usize {
    jobs.clamp(1, MAX_JOBS)
}

/// Parse a `--jobs` value: `full`, `half`, `quarter` of the CPU count, or a number.
/// The result is clamped to `1..=MAX_JOBS`.
///
/// # Errors
/// Fails on anything that is neither a keyword nor an integer.
pub fn parse_jobs(value: &str) -> Result<usize> {
    let cpus = num_cpus::get();
    let jobs = match value {
        "full" => cpus,
        "half" => cpus / 2,
        "quarter" => cpus / 4,
        other => other
            .parse::<usize>()
            .map_err(|_| ConvertError::config(format!("arg={other}: failed argparse.")))?,
    };
    Ok(clamp_jobs(jobs))
}

/// Parse a `--timezone` value such as `Z`, `+09:00` or `-0530`.
///
/// # Errors
/// Fails when the value is not a valid UTC offset.
pub fn parse_timezone(value: &str) -> Result<FixedOffset> {
    datetime::parse_offset(value)
        .ok_or_else(|| ConvertError::config(format!("arg={value}: failed date parse.")).into())
}
