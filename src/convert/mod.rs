//! Replaying a document's source table through a row sink.
//!
//! [`Converter::run`] reads every source path of a document, maps fields to
//! sheet columns by header text, coerces each cell to its field type and feeds
//! the resulting [`Value`]s to a [`RowSink`]: an output handler, or a
//! [`RelationMap`](crate::relation::RelationMap) being populated.

mod validator;

pub use validator::Validator;

use crate::config::Settings;
use crate::datetime;
use crate::error::ConvertError;
use crate::relation::{RelationCache, RelationMap};
use crate::schema::{Field, FieldType, JobDescriptor};
use crate::source::{CellValue, Sheet, SourceProvider, cell_name};
use crate::value::Value;
use anyhow::{Context, Result, bail};
use chrono::FixedOffset;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Receiver of converted rows.
///
/// Call order: `begin`, then optionally one comment row, then
/// `begin_row`/`field`*/`end_row` per data row, then `end`.
pub trait RowSink {
    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    /// 1-based sheet row to emit as a comment row before the data, if any.
    fn comment_row(&self) -> Option<usize> {
        None
    }

    fn begin_comment_row(&mut self) -> Result<()> {
        Ok(())
    }

    fn end_comment_row(&mut self) -> Result<()> {
        Ok(())
    }

    fn begin_row(&mut self) -> Result<()>;

    fn field(&mut self, field: &Field, value: Value) -> Result<()>;

    fn end_row(&mut self) -> Result<()>;

    fn end(&mut self) -> Result<()> {
        Ok(())
    }
}

const FALSY: &[&str] = &[
    "false", "False", "FALSE", "no", "No", "NO", "non", "Non", "NON", "n", "N", "off", "Off",
    "OFF", "null", "Null", "NULL", "nil", "Nill", "NILL", "none", "None", "NONE", "0", "0.0", "",
];

/// Whether a cell string reads as true.
#[must_use]
pub fn truthy(s: &str) -> bool {
    !FALSY.contains(&s)
}

pub struct Converter<'a> {
    doc: &'a JobDescriptor,
    provider: &'a SourceProvider<'a>,
    tz: FixedOffset,
    ignore_relations: bool,
    relations: Vec<Option<Arc<RelationMap>>>,
}

impl<'a> Converter<'a> {
    /// Bind a document to its sources and, unless `ignore_relations`, to the
    /// published relation maps its foreign keys resolve through.
    ///
    /// # Errors
    /// Fails when a referenced relation map has not been published.
    pub fn new(
        doc: &'a JobDescriptor,
        relations: &RelationCache,
        provider: &'a SourceProvider<'a>,
        settings: &Settings,
        ignore_relations: bool,
    ) -> Result<Self> {
        let mut bound = Vec::with_capacity(doc.fields.len());
        for field in &doc.fields {
            match &field.relation {
                Some(relation) if !ignore_relations => {
                    let map = relations
                        .find(&relation.id)
                        .with_context(|| format!("{}: field={}", doc.path, field.column))?;
                    bound.push(Some(map));
                }
                _ => bound.push(None),
            }
        }
        Ok(Self {
            doc,
            provider,
            tz: settings.tz_offset,
            ignore_relations,
            relations: bound,
        })
    }

    /// Replay every row of every source path into `sink`.
    ///
    /// # Errors
    /// Fails on missing sources, missing columns, bad cells, failed validation
    /// or sink errors. The message names the document and the source path.
    pub fn run<S: RowSink + ?Sized>(&self, sink: &mut S) -> Result<()> {
        let doc = self.doc;
        let paths = doc.source_paths()?;
        if paths.is_empty() {
            bail!(ConvertError::resource(&doc.path, "target file does not exist."));
        }
        let mut validators: Vec<Option<Validator<'_>>> = doc
            .fields
            .iter()
            .map(|f| f.validate.as_ref().map(Validator::new))
            .collect();

        sink.begin()?;
        for path in &paths {
            self.run_path(path, sink, &mut validators)
                .with_context(|| format!("{}: {}", doc.path, path.display()))?;
        }
        sink.end()
    }

    fn run_path<S: RowSink + ?Sized>(
        &self,
        path: &Path,
        sink: &mut S,
        validators: &mut [Option<Validator<'_>>],
    ) -> Result<()> {
        let book = self.provider.open(path)?;
        let sheet = book.sheet(&self.doc.sheet_name)?;
        let mapping = self.map_columns(sheet)?;

        if let Some(row) = sink.comment_row() {
            self.emit_comment_row(sheet, &mapping, row, sink)?;
        }

        for j in self.doc.row..sheet.row_count() {
            if self.skip_row(sheet, &mapping, j) {
                continue;
            }
            sink.begin_row()?;
            for (field, col) in self.doc.fields.iter().zip(&mapping) {
                if field.kind == FieldType::IsIgnored {
                    continue;
                }
                let Some(col) = *col else {
                    let Some(default) = &field.default else {
                        bail!(ConvertError::config(format!(
                            "field={}: optional field requires default.",
                            field.column
                        )));
                    };
                    sink.field(field, default.clone())?;
                    continue;
                };
                let cell = sheet.cell(j, col);
                let converted = self
                    .convert_cell(field, cell, validators[field.index].as_mut())
                    .with_context(|| {
                        format!(
                            "field={}: cell[{}]={{value={},type={}}}",
                            field.column,
                            cell_name(j, col),
                            cell.as_str(),
                            cell.type_name()
                        )
                    })?;
                if let Some(value) = converted {
                    sink.field(field, value)?;
                }
            }
            sink.end_row().with_context(|| format!("row={}", j + 1))?;
        }
        Ok(())
    }

    /// Column index of each field in header row `doc.row`; `None` for absent
    /// optional fields.
    fn map_columns(&self, sheet: &Sheet) -> Result<Vec<Option<usize>>> {
        let header = self.doc.row - 1;
        let mut mapping = Vec::with_capacity(self.doc.fields.len());
        for field in &self.doc.fields {
            let found = (0..sheet.col_count()).find(|&i| sheet.cell(header, i).as_str() == field.name);
            match found {
                Some(i) => mapping.push(Some(i)),
                None if field.optional => mapping.push(None),
                None => {
                    for i in 0..sheet.col_count() {
                        let cell = sheet.cell(header, i);
                        debug!(cell = %cell_name(header, i), value = %cell.as_str(), "header");
                    }
                    bail!(ConvertError::config(format!(
                        "row={}: field{{column={},name={}}}: NOT exists.",
                        self.doc.row, field.column, field.name
                    )));
                }
            }
        }
        Ok(mapping)
    }

    fn emit_comment_row<S: RowSink + ?Sized>(
        &self,
        sheet: &Sheet,
        mapping: &[Option<usize>],
        row: usize,
        sink: &mut S,
    ) -> Result<()> {
        let row = row.saturating_sub(1);
        sink.begin_comment_row()?;
        for (field, col) in self.doc.fields.iter().zip(mapping) {
            if field.kind == FieldType::IsIgnored {
                continue;
            }
            let text = match col {
                Some(i) => sheet.cell(row, *i).as_str().into_owned(),
                None => String::new(),
            };
            sink.field(field, Value::Str(text))?;
        }
        sink.end_comment_row()
    }

    /// Rows whose mapped cells are all empty, or whose `isignored` cell is
    /// truthy, produce nothing.
    fn skip_row(&self, sheet: &Sheet, mapping: &[Option<usize>], j: usize) -> bool {
        let mut empty = true;
        for (field, col) in self.doc.fields.iter().zip(mapping) {
            let Some(col) = *col else { continue };
            let cell = sheet.cell(j, col);
            if !cell.is_empty() {
                empty = false;
            }
            if field.kind == FieldType::IsIgnored {
                let ignored = match cell {
                    CellValue::Int(_) | CellValue::Float(_) => cell.as_int().is_some_and(|i| i != 0),
                    CellValue::Bool(b) => *b,
                    CellValue::String(s) => truthy(s),
                    _ => false,
                };
                if ignored {
                    return true;
                }
            }
        }
        empty
    }

    fn definition_value<'f>(field: &'f Field, cell: &CellValue) -> Result<Option<&'f str>> {
        let Some(definition) = &field.definition else {
            return Ok(None);
        };
        match definition.get(cell.as_str().as_ref()) {
            Some(v) => Ok(Some(v.as_str())),
            None => bail!(ConvertError::data("not in definition.")),
        }
    }

    /// Coerce one cell. `Ok(None)` means the field emits nothing for this row.
    fn convert_cell(
        &self,
        field: &Field,
        cell: &CellValue,
        validator: Option<&mut Validator<'_>>,
    ) -> Result<Option<Value>> {
        let default = || field.default.clone().filter(|_| cell.is_empty());

        let value = match field.kind {
            FieldType::IsIgnored => return Ok(None),
            FieldType::Int => {
                let v = if let Some(def) = Self::definition_value(field, cell)? {
                    def.trim().parse::<i64>().map_err(|_| {
                        ConvertError::data(format!("definition value={def}: expect int."))
                    })?
                } else if cell.is_numeric() {
                    cell.as_int().unwrap_or_default()
                } else if let Some(d) = default() {
                    return Ok(Some(d));
                } else {
                    bail!(ConvertError::data("type error. expect int."));
                };
                if let Some(validator) = validator {
                    validator.check_int(v)?;
                }
                Value::Int(v)
            }
            FieldType::Float => {
                if let Some(def) = Self::definition_value(field, cell)? {
                    Value::Float(def.trim().parse::<f64>().map_err(|_| {
                        ConvertError::data(format!("definition value={def}: expect float."))
                    })?)
                } else if cell.is_numeric() {
                    Value::Float(cell.as_f64().unwrap_or_default())
                } else if let Some(d) = default() {
                    d
                } else {
                    bail!(ConvertError::data("type error. expect float."));
                }
            }
            FieldType::Bool => {
                if let Some(def) = Self::definition_value(field, cell)? {
                    Value::Bool(def != "false" && def != "no")
                } else if let Some(d) = default() {
                    d
                } else {
                    match cell {
                        CellValue::Empty => Value::Bool(false),
                        CellValue::Int(_) | CellValue::Float(_) => {
                            Value::Bool(cell.as_int().is_some_and(|i| i != 0))
                        }
                        CellValue::Bool(b) => Value::Bool(*b),
                        CellValue::String(s) => Value::Bool(truthy(s)),
                        CellValue::DateTime(_) => bail!(ConvertError::data("type error. expect bool.")),
                    }
                }
            }
            FieldType::Char => {
                if let Some(def) = Self::definition_value(field, cell)? {
                    Value::Str(def.to_string())
                } else if let Some(d) = default() {
                    d
                } else {
                    let s = cell.as_str().into_owned();
                    if let Some(validator) = validator {
                        validator.check_str(&s)?;
                    }
                    Value::Str(s)
                }
            }
            FieldType::DateTime | FieldType::UnixTime => {
                if field.definition.is_some() {
                    bail!(ConvertError::config(format!(
                        "not support {} definition.",
                        field.kind
                    )));
                }
                let epoch = match cell {
                    CellValue::DateTime(serial) => datetime::serial_to_epoch(*serial, self.tz)?,
                    CellValue::Empty if field.default.is_some() => {
                        return Ok(field.default.clone());
                    }
                    CellValue::String(s) => datetime::parse_datetime(s, self.tz)
                        .ok_or_else(|| ConvertError::data("parsing datetime error."))?,
                    _ => bail!(ConvertError::data("type error. expect datetime.")),
                };
                if field.kind == FieldType::UnixTime {
                    Value::Int(epoch)
                } else {
                    Value::Str(datetime::isoformat(epoch, self.tz)?)
                }
            }
            FieldType::Any => match cell {
                CellValue::Empty => field.default.clone().unwrap_or(Value::Null),
                CellValue::String(s) => Value::Str(s.clone()),
                CellValue::Int(i) => Value::Int(*i),
                CellValue::Float(v) => Value::Float(*v),
                CellValue::Bool(b) => Value::Bool(*b),
                CellValue::DateTime(serial) => Value::Str(datetime::isoformat(
                    datetime::serial_to_epoch(*serial, self.tz)?,
                    self.tz,
                )?),
            },
            FieldType::ForeignKey => {
                if self.ignore_relations {
                    return Ok(None);
                }
                if field.definition.is_some() {
                    bail!(ConvertError::config("not support foreignkey definition."));
                }
                let Some(map) = &self.relations[field.index] else {
                    bail!(ConvertError::config("requires relation map."));
                };
                if let Some(d) = default() {
                    return Ok(Some(d));
                }
                let key = match map.key_type() {
                    FieldType::Int => {
                        if !cell.is_numeric() {
                            bail!(ConvertError::data("not matched relation key_type."));
                        }
                        Value::Int(cell.as_int().unwrap_or_default())
                    }
                    _ => Value::Str(cell.as_str().into_owned()),
                };
                let v = map.lookup(&key)?;
                if let Some(validator) = validator {
                    validator.check_int(v)?;
                }
                Value::Int(v)
            }
        };
        Ok(Some(value))
    }
}
