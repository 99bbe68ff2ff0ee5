//! Spreadsheet source tables via calamine (xlsx, xlsm, xlsb, xls, ods).

use super::{CellValue, Sheet};
use crate::error::ConvertError;
use anyhow::Result;
use calamine::{Data, Reader, open_workbook_auto};
use std::path::Path;

pub(super) fn read_sheets(path: &Path) -> Result<Vec<Sheet>> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| ConvertError::resource(path.display(), e.to_string()))?;
    let mut sheets = Vec::new();
    for name in workbook.sheet_names().to_vec() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ConvertError::resource(path.display(), format!("sheet={name}: {e}")))?;

        // Ranges start at the first used cell; pad so that (0, 0) is A1.
        let (row0, col0) = range
            .start()
            .map_or((0, 0), |(r, c)| (r as usize, c as usize));
        let mut rows: Vec<Vec<CellValue>> = vec![Vec::new(); row0];
        for row in range.rows() {
            let mut cells = vec![CellValue::Empty; col0];
            cells.extend(row.iter().map(convert_cell));
            rows.push(cells);
        }
        sheets.push(Sheet::new(name, rows));
    }
    Ok(sheets)
}

fn convert_cell(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => CellValue::Int(*v as i64),
        Data::Float(v) => CellValue::Float(*v),
        Data::String(s) if s.is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::String(s.clone()),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::DateTime(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::String(s.clone()),
        Data::Error(e) => CellValue::String(format!("#{e:?}")),
    }
}
