use super::Workbook;
use crate::metrics::RunStats;
use crate::sync::{KeyedCache, MutexMap};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Hands out workbook handles for one run.
///
/// A path that more than one job reads (its reference count survived pruning)
/// is opened once through the pipeline's workbook cache and shared; any other
/// path is opened privately on every request.
pub struct SourceProvider<'a> {
    cache: &'a KeyedCache<PathBuf, Workbook>,
    shared_paths: &'a MutexMap<PathBuf, usize>,
    no_cache: bool,
    stats: &'a RunStats,
}

impl<'a> SourceProvider<'a> {
    #[must_use]
    pub fn new(
        cache: &'a KeyedCache<PathBuf, Workbook>,
        shared_paths: &'a MutexMap<PathBuf, usize>,
        no_cache: bool,
        stats: &'a RunStats,
    ) -> Self {
        Self {
            cache,
            shared_paths,
            no_cache,
            stats,
        }
    }

    /// Whether `path` goes through the shared cache.
    #[must_use]
    pub fn is_shared(&self, path: &Path) -> bool {
        !self.no_cache && self.shared_paths.has(&path.to_path_buf())
    }

    /// # Errors
    /// Fails when the workbook cannot be opened.
    pub fn open(&self, path: &Path) -> Result<Arc<Workbook>> {
        let shared = self.is_shared(path);
        let key = path.to_path_buf();
        let book = self
            .cache
            .get_or_try_create(&key, shared, || {
                debug!(path = %path.display(), shared, "reading workbook");
                self.stats.record_workbook_read();
                Workbook::open(path)
            })?;
        if shared {
            self.stats.record_shared_open();
        } else {
            self.stats.record_private_open();
        }
        Ok(book)
    }
}
