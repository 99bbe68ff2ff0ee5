//! Shared fixtures: a temporary tree with `schemas/`, `tables/` and `out/`.

#![allow(dead_code)]

use anyhow::Result;
use chrono::FixedOffset;
use ironsheet::Settings;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct Fixture {
    pub dir: TempDir,
    pub schemas: PathBuf,
    pub tables: PathBuf,
    pub out: PathBuf,
}

impl Fixture {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let schemas = dir.path().join("schemas");
        let tables = dir.path().join("tables");
        let out = dir.path().join("out");
        fs::create_dir_all(&schemas)?;
        fs::create_dir_all(&tables)?;
        Ok(Self {
            dir,
            schemas,
            tables,
            out,
        })
    }

    pub fn schema(&self, name: &str, yaml: &str) -> Result<PathBuf> {
        write(&self.schemas.join(name), yaml)
    }

    pub fn table(&self, name: &str, csv: &str) -> Result<PathBuf> {
        write(&self.tables.join(name), csv)
    }

    pub fn settings(&self, jobs: usize) -> Settings {
        Settings {
            source_search_path: self.tables.clone(),
            schema_search_paths: vec![self.schemas.clone()],
            output_base_path: self.out.clone(),
            jobs,
            no_cache: false,
            tz_offset: utc(),
        }
    }

    pub fn output(&self, name: &str) -> Result<String> {
        Ok(fs::read_to_string(self.out.join(name))?)
    }

    pub fn output_json(&self, name: &str) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.output(name)?)?)
    }

    /// The items/categories pair: items resolve `Category` codes to category ids.
    pub fn items_and_categories(&self) -> Result<()> {
        self.schema(
            "categories.yaml",
            r#"
target: categories.csv
row: 1
handler: {type: none}
fields:
  - {column: id, name: ID, type: int}
  - {column: code, name: Code, type: char}
"#,
        )?;
        self.table("categories.csv", "ID,Code\n1,WEAPON\n2,SHIELD\n")?;
        self.schema(
            "items.yaml",
            r#"
target: xls:///items.csv
row: 1
handler: {type: json, path: items.json}
fields:
  - {column: id, name: ID, type: int}
  - {column: name, name: Name, type: char}
  - column: category_id
    name: Category
    type: foreignkey
    relation: {column: id, from: categories.yaml, key: code}
"#,
        )?;
        self.table("items.csv", "ID,Name,Category\n10,Sword,WEAPON\n11,Buckler,SHIELD\n")?;
        Ok(())
    }
}

pub fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

fn write(path: &Path, contents: &str) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(path.to_path_buf())
}

/// A row sink that keeps everything it is given.
#[derive(Default)]
pub struct Collect {
    pub comment_row: Option<usize>,
    pub comment: Vec<(String, ironsheet::Value)>,
    pub rows: Vec<Vec<(String, ironsheet::Value)>>,
    pub(crate) in_comment: bool,
    pub(crate) begun: usize,
    pub(crate) ended: usize,
}

impl Collect {
    pub fn calls(&self) -> (usize, usize) {
        (self.begun, self.ended)
    }
}

impl ironsheet::RowSink for Collect {
    fn begin(&mut self) -> Result<()> {
        self.begun += 1;
        Ok(())
    }

    fn comment_row(&self) -> Option<usize> {
        self.comment_row
    }

    fn begin_comment_row(&mut self) -> Result<()> {
        self.in_comment = true;
        Ok(())
    }

    fn end_comment_row(&mut self) -> Result<()> {
        self.in_comment = false;
        Ok(())
    }

    fn begin_row(&mut self) -> Result<()> {
        self.rows.push(Vec::new());
        Ok(())
    }

    fn field(&mut self, field: &ironsheet::Field, value: ironsheet::Value) -> Result<()> {
        let entry = (field.column.clone(), value);
        if self.in_comment {
            self.comment.push(entry);
        } else if let Some(row) = self.rows.last_mut() {
            row.push(entry);
        }
        Ok(())
    }

    fn end_row(&mut self) -> Result<()> {
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.ended += 1;
        Ok(())
    }
}
