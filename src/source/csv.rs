//! CSV source tables.
//!
//! The whole file is one sheet named after the file stem. Every row, header
//! included, is kept as data; cell types are inferred per cell.

use super::{CellValue, Sheet};
use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;

pub(super) fn read_sheet(path: &Path) -> Result<Sheet> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(f);
    let mut rows = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec.with_context(|| format!("parse CSV record #{}", i + 1))?;
        rows.push(rec.iter().map(infer_cell).collect());
    }
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Sheet::new(name, rows))
}

fn infer_cell(text: &str) -> CellValue {
    if text.is_empty() {
        return CellValue::Empty;
    }
    if let Ok(i) = text.parse::<i64>() {
        return CellValue::Int(i);
    }
    if let Ok(v) = text.parse::<f64>()
        && v.is_finite()
    {
        return CellValue::Float(v);
    }
    CellValue::String(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_cell_types() {
        assert_eq!(infer_cell(""), CellValue::Empty);
        assert_eq!(infer_cell("42"), CellValue::Int(42));
        assert_eq!(infer_cell("1.5"), CellValue::Float(1.5));
        assert_eq!(infer_cell("WEAPON"), CellValue::String("WEAPON".into()));
        assert_eq!(infer_cell("inf"), CellValue::String("inf".into()));
    }
}
