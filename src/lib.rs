//! # Ironsheet
//!
//! A **spreadsheet-to-data converter** driven by declarative YAML schema documents.
//! Each document names a source table, a list of typed fields and one or more
//! output handlers; ironsheet reads the table, coerces and validates every cell,
//! and writes JSON, CSV, Django fixtures, Lua tables or MessagePack.
//!
//! ## Key Features
//!
//! - **Foreign keys across documents** - a `foreignkey` field resolves its cell
//!   through a lookup table built from another document's rows, transitively
//! - **Build once, share everywhere** - every lookup table is materialized at most
//!   once per run; source files read by several jobs are opened once
//! - **Concurrent** - a fixed pool of worker threads runs four ordered stages
//! - **Fail fast** - the first error cancels the whole run
//! - **Many sources** - xlsx, xlsm, xlsb, xls and ods (feature `xlsx`) plus csv
//!
//! ## Quick Start
//!
//! ```no_run
//! use ironsheet::{Pipeline, Settings};
//! use std::path::PathBuf;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let settings = Settings {
//!     source_search_path: PathBuf::from("tables"),
//!     schema_search_paths: vec![PathBuf::from("schemas")],
//!     output_base_path: PathBuf::from("out"),
//!     ..Settings::default()
//! };
//! let pipeline = Pipeline::new(settings);
//! let report = pipeline.run(&["items.yaml".to_string()])?;
//! for path in &report.outputs {
//!     println!("wrote {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Schema documents
//!
//! ```yaml
//! target: xls:///items.xlsx#Items
//! row: 1
//! handler: {type: json, path: items.json}
//! fields:
//!   - {column: id, name: ID, type: int, validate: {unique: true}}
//!   - {column: category_id, name: Category, type: foreignkey,
//!      relation: {column: id, from: categories.yaml, key: code}}
//! ```
//!
//! ## Modules
//!
//! - [`pipeline`] - the staged scheduler
//! - [`schema`] - document loading
//! - [`source`] - workbooks and the per-run source provider
//! - [`convert`] - cell coercion, validation and the [`RowSink`] interface
//! - [`relation`] - lookup tables and the publish-once relation cache
//! - [`handlers`] - output formats
//! - [`sync`] - the coordination primitives the workers share
//!
//! ## Feature Flags
//!
//! - `xlsx` (default) - spreadsheet sources via calamine
//! - `msgpack` (default) - the `messagepack` output handler
//! - `template` (default) - the `template` output handler via handlebars

pub mod config;
pub mod convert;
pub mod datetime;
pub mod error;
pub mod handlers;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod relation;
pub mod schema;
pub mod source;
pub mod sync;
pub mod value;

pub use config::Settings;
pub use convert::{Converter, RowSink};
pub use error::ConvertError;
pub use handlers::OutputHandler;
pub use metrics::RunStats;
pub use pipeline::{Pipeline, RunReport};
pub use relation::{RelationCache, RelationMap};
pub use schema::{Field, FieldType, JobDescriptor, Relation};
pub use source::{CellValue, Sheet, SourceProvider, Workbook};
pub use value::Value;
