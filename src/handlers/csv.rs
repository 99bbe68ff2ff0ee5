//! `csv` output.
//!
//! Record order: the optional comment row, the optional field-type row
//! (`csv_field_type`), the optional column row (`csv_field_column`), then data.

use super::OutputHandler;
use crate::convert::RowSink;
use crate::relation::RelationCache;
use crate::schema::{Field, FieldType, HandlerSpec, JobDescriptor};
use crate::value::Value;
use anyhow::{Context, Result};
use csv::{Terminator, WriterBuilder};

pub struct CsvHandler {
    spec: HandlerSpec,
    comment: Option<Vec<String>>,
    header_rows: Vec<Vec<String>>,
    rows: Vec<Vec<String>>,
    in_comment: bool,
    keep_comment: bool,
}

impl CsvHandler {
    /// # Errors
    /// Fails when `csv_field_type` needs the column type of a relation map
    /// that has not been published.
    pub fn new(spec: HandlerSpec, doc: &JobDescriptor, relations: &RelationCache) -> Result<Self> {
        let fields: Vec<&Field> = doc
            .fields
            .iter()
            .filter(|f| f.kind != FieldType::IsIgnored)
            .collect();
        let mut header_rows = Vec::new();
        if spec.csv_field_type {
            let mut types = Vec::with_capacity(fields.len());
            for f in &fields {
                types.push(field_type_name(f, relations)?);
            }
            header_rows.push(types);
        }
        if spec.csv_field_column {
            header_rows.push(fields.iter().map(|f| f.column.clone()).collect());
        }
        Ok(Self {
            spec,
            comment: None,
            header_rows,
            rows: Vec::new(),
            in_comment: false,
            keep_comment: false,
        })
    }
}

fn field_type_name(field: &Field, relations: &RelationCache) -> Result<String> {
    if let Some(alias) = &field.type_alias {
        return Ok(alias.clone());
    }
    match (&field.kind, &field.relation) {
        (FieldType::ForeignKey, Some(relation)) => {
            let map = relations
                .find(&relation.id)
                .with_context(|| format!("field={}", field.column))?;
            Ok(map.column_type().as_str().to_string())
        }
        (kind, _) => Ok(kind.as_str().to_string()),
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::Str(s) => s,
        other => other.to_string(),
    }
}

impl RowSink for CsvHandler {
    fn comment_row(&self) -> Option<usize> {
        self.spec.comment_row
    }

    fn begin_comment_row(&mut self) -> Result<()> {
        // Multi-file targets see the comment row once per file; keep the first.
        self.in_comment = true;
        self.keep_comment = self.comment.is_none();
        if self.keep_comment {
            self.comment = Some(Vec::new());
        }
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

    fn field(&mut self, _field: &Field, value: Value) -> Result<()> {
        let target = match (self.in_comment, self.keep_comment) {
            (true, true) => self.comment.as_mut(),
            (true, false) => None,
            (false, _) => self.rows.last_mut(),
        };
        if let Some(record) = target {
            record.push(cell_text(value));
        }
        Ok(())
    }

    fn end_row(&mut self) -> Result<()> {
        Ok(())
    }
}

impl OutputHandler for CsvHandler {
    fn spec(&self) -> &HandlerSpec {
        &self.spec
    }

    fn render(&self) -> Result<Vec<u8>> {
        let mut wtr = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        for record in self
            .comment
            .iter()
            .chain(self.header_rows.iter())
            .chain(self.rows.iter())
        {
            wtr.write_record(record)?;
        }
        wtr.into_inner()
            .map_err(|e| anyhow::anyhow!("flush csv: {}", e.error()))
    }
}
