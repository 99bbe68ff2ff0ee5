//! Run statistics.
//!
//! [`RunStats`] is a set of atomic counters shared by every worker of a
//! [`Pipeline`](crate::Pipeline). Counters accumulate across runs of the same
//! pipeline. A JSON snapshot can be printed or saved with `--metrics`.
//!
//! # Example
//!
//! ```no_run
//! use ironsheet::{Pipeline, Settings};
//!
//! # fn main() -> anyhow::Result<()> {
//! let p = Pipeline::new(Settings::default());
//! p.run(&["items.yaml".to_string()])?;
//! println!("{}", p.stats().snapshot());
//! p.stats().save_to_file("metrics.json")?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RunStats {
    jobs_loaded: AtomicU64,
    relations_discovered: AtomicU64,
    relation_replays: AtomicU64,
    relation_maps_published: AtomicU64,
    jobs_converted: AtomicU64,
    jobs_skipped: AtomicU64,
    outputs_written: AtomicU64,
    shared_opens: AtomicU64,
    private_opens: AtomicU64,
    workbook_reads: AtomicU64,
}

macro_rules! counter {
    ($record:ident, $get:ident, $field:ident) => {
        pub fn $record(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }

        #[must_use]
        pub fn $get(&self) -> u64 {
            self.$field.load(Ordering::Relaxed)
        }
    };
}

impl RunStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    counter!(record_job_loaded, jobs_loaded, jobs_loaded);
    counter!(record_relation_discovered, relations_discovered, relations_discovered);
    counter!(record_relation_replay, relation_replays, relation_replays);
    counter!(record_relation_map_published, relation_maps_published, relation_maps_published);
    counter!(record_job_converted, jobs_converted, jobs_converted);
    counter!(record_job_skipped, jobs_skipped, jobs_skipped);
    counter!(record_output_written, outputs_written, outputs_written);
    counter!(record_shared_open, shared_opens, shared_opens);
    counter!(record_private_open, private_opens, private_opens);
    counter!(record_workbook_read, workbook_reads, workbook_reads);

    /// All counters as a JSON object.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        json!({
            "jobs_loaded": self.jobs_loaded(),
            "relations_discovered": self.relations_discovered(),
            "relation_replays": self.relation_replays(),
            "relation_maps_published": self.relation_maps_published(),
            "jobs_converted": self.jobs_converted(),
            "jobs_skipped": self.jobs_skipped(),
            "outputs_written": self.outputs_written(),
            "shared_opens": self.shared_opens(),
            "private_opens": self.private_opens(),
            "workbook_reads": self.workbook_reads(),
        })
    }

    /// Write the snapshot as pretty JSON.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        let mut file =
            File::create(path).with_context(|| format!("create {}", path.display()))?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
