//! Source tables: eagerly loaded, immutable workbooks.
//!
//! A [`Workbook`] is read completely on open and never mutated afterwards, so
//! one `Arc<Workbook>` can be handed to any number of conversion jobs.

mod csv;
mod provider;
#[cfg(feature = "xlsx")]
mod xlsx;

pub use provider::SourceProvider;

use crate::error::ConvertError;
use crate::value::format_float;
use anyhow::Result;
use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// A single typed cell.
#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    Empty,
    String(String),
    Int(i64),
    Float(f64),
    /// Spreadsheet date serial: days since 1899-12-30, fraction = time of day.
    DateTime(f64),
    Bool(bool),
}

static EMPTY: CellValue = CellValue::Empty;

impl CellValue {
    /// Cell text as shown to users and matched against definitions.
    #[must_use]
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            CellValue::Empty => Cow::Borrowed(""),
            CellValue::String(s) => Cow::Borrowed(s),
            CellValue::Int(i) => Cow::Owned(i.to_string()),
            CellValue::Float(v) | CellValue::DateTime(v) => Cow::Owned(format_float(*v)),
            CellValue::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            CellValue::Int(i) => Some(*i),
            CellValue::Float(v) | CellValue::DateTime(v) => Some(v.trunc() as i64),
            CellValue::Bool(b) => Some(i64::from(*b)),
            CellValue::Empty | CellValue::String(_) => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Float(v) | CellValue::DateTime(v) => Some(*v),
            CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            CellValue::Empty | CellValue::String(_) => None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, CellValue::Int(_) | CellValue::Float(_))
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Empty => "empty",
            CellValue::String(_) => "string",
            CellValue::Int(_) => "int",
            CellValue::Float(_) => "double",
            CellValue::DateTime(_) => "datetime",
            CellValue::Bool(_) => "bool",
        }
    }
}

/// `A1`-style name of a zero-based cell position.
#[must_use]
pub fn cell_name(row: usize, col: usize) -> String {
    let mut letters = Vec::new();
    let mut n = col + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    format!("{}{}", String::from_utf8_lossy(&letters), row + 1)
}

/// One sheet, addressed from the top-left cell `A1` regardless of where the
/// used range starts.
#[derive(Clone, Debug, Default)]
pub struct Sheet {
    pub name: String,
    rows: Vec<Vec<CellValue>>,
    ncols: usize,
}

impl Sheet {
    #[must_use]
    pub fn new(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let ncols = rows.iter().map(Vec::len).max().unwrap_or(0);
        Self {
            name: name.into(),
            rows,
            ncols,
        }
    }

    /// The cell at zero-based `(row, col)`; out-of-range positions read as empty.
    #[must_use]
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn col_count(&self) -> usize {
        self.ncols
    }
}

#[derive(Debug)]
pub struct Workbook {
    pub path: PathBuf,
    sheets: Vec<Sheet>,
}

impl Workbook {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, sheets: Vec<Sheet>) -> Self {
        Self {
            path: path.into(),
            sheets,
        }
    }

    /// Read the whole file. `.csv` files become a one-sheet workbook named after
    /// the file stem; everything else goes through the spreadsheet reader.
    ///
    /// # Errors
    /// Fails when the file is missing or cannot be decoded.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ConvertError::resource(path.display(), "does not exist.").into());
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let sheets = match ext.as_str() {
            "csv" => vec![csv::read_sheet(path)?],
            #[cfg(feature = "xlsx")]
            _ => xlsx::read_sheets(path)?,
            #[cfg(not(feature = "xlsx"))]
            other => {
                return Err(ConvertError::resource(
                    path.display(),
                    format!("unsupported source format: {other}"),
                )
                .into());
            }
        };
        Ok(Self::new(path, sheets))
    }

    /// Sheet by name; an empty name selects the first sheet.
    ///
    /// # Errors
    /// Fails when no such sheet exists.
    pub fn sheet(&self, name: &str) -> Result<&Sheet> {
        let found = if name.is_empty() {
            self.sheets.first()
        } else {
            self.sheets.iter().find(|s| s.name == name)
        };
        found.ok_or_else(|| {
            ConvertError::resource(self.path.display(), format!("sheet={name}: not found.")).into()
        })
    }

    #[must_use]
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}
