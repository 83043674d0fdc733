// Excel workbook reading (xlsx, xlsm, xlsb, xls, ods)

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};

use crate::error::IoError;
use crate::grid::{excel_serial, Cell, RawGrid};

/// Read one worksheet into an untyped grid. The first row is the header row.
/// `sheet = None` reads the first sheet.
pub fn read_grid(path: &Path, sheet: Option<&str>) -> Result<RawGrid, IoError> {
    let excel_err = |message: String| IoError::Excel {
        path: path.to_path_buf(),
        message,
    };

    let mut workbook: Sheets<_> = open_workbook_auto(path).map_err(|e| excel_err(e.to_string()))?;
    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();

    let name = match sheet {
        Some(wanted) => sheet_names
            .iter()
            .find(|n| n.as_str() == wanted)
            .cloned()
            .ok_or_else(|| IoError::SheetNotFound {
                path: path.to_path_buf(),
                sheet: wanted.to_string(),
                available: sheet_names.clone(),
            })?,
        None => sheet_names
            .first()
            .cloned()
            .ok_or_else(|| excel_err("workbook contains no sheets".into()))?,
    };

    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| excel_err(format!("failed to read sheet '{name}': {e}")))?;
    tracing::debug!(path = %path.display(), sheet = %name, size = ?range.get_size(), "reading worksheet");

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(row) => row.iter().map(header_text).collect(),
        None => return Ok(RawGrid::default()),
    };
    let rows: Vec<Vec<Cell>> = rows.map(|row| row.iter().map(cell).collect()).collect();
    Ok(RawGrid::new(headers, rows))
}

fn header_text(data: &Data) -> String {
    match cell(data) {
        Cell::Empty => String::new(),
        Cell::Text(s) => s,
        Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", n as i64),
        Cell::Number(n) => format!("{n}"),
        Cell::DateTime(t) => t.to_string(),
    }
}

fn cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::text(s),
        Data::Float(n) => Cell::Number(*n),
        Data::Int(n) => Cell::Number(*n as f64),
        Data::Bool(b) => Cell::Text(if *b { "TRUE" } else { "FALSE" }.into()),
        Data::Error(e) => Cell::Text(format!("#{e:?}")),
        // 1900 date system; the 1904 flag is not exposed by calamine.
        Data::DateTime(dt) => excel_serial(dt.as_f64()).map_or(Cell::Empty, Cell::DateTime),
        Data::DateTimeIso(s) => Cell::text(s),
        Data::DurationIso(s) => Cell::text(s),
    }
}
