//! Untyped cell grid produced by the readers, and its conversion into a typed
//! [`Table`].
//!
//! CSV sources only produce [`Cell::Text`]; workbooks also carry native
//! numbers and dates. The [`Schema`] decides which columns become timestamps
//! and numbers; every other column is text.

use chrono::{NaiveDate, NaiveDateTime};
use dosematch_recon::{Column, ColumnData, Table};

use crate::error::IoError;

/// chrono formats tried in order when a source configures none.
pub const DEFAULT_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Date-only fallbacks, read as midnight.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y"];

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
}

impl Cell {
    /// Text cells are trimmed; blank text is empty.
    pub fn text(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(trimmed.to_string())
        }
    }

    fn render(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            Cell::Number(n) => Some(format!("{n}")),
            Cell::DateTime(t) => Some(t.format(dosematch_recon::table::TIMESTAMP_FORMAT).to_string()),
        }
    }
}

/// Which columns are typed on load.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub timestamps: Vec<String>,
    pub numbers: Vec<String>,
    /// Empty means [`DEFAULT_TIMESTAMP_FORMATS`].
    pub timestamp_formats: Vec<String>,
}

impl Schema {
    fn formats(&self) -> Vec<&str> {
        if self.timestamp_formats.is_empty() {
            DEFAULT_TIMESTAMP_FORMATS.to_vec()
        } else {
            self.timestamp_formats.iter().map(String::as_str).collect()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RawGrid {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawGrid {
    /// Build from a header row and data rows. Short rows are padded and
    /// duplicate or blank headers get a positional suffix so no column is
    /// silently replaced.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let headers: Vec<String> = headers
            .into_iter()
            .enumerate()
            .map(|(i, h)| {
                let h = h.trim().trim_start_matches('\u{feff}').to_string();
                let base = if h.is_empty() { format!("Unnamed: {i}") } else { h };
                let mut name = base.clone();
                let mut n = 1;
                while !seen.insert(name.clone()) {
                    name = format!("{base}.{n}");
                    n += 1;
                }
                name
            })
            .collect();

        let width = headers.len();
        let rows = rows
            .into_iter()
            .filter(|r| r.iter().any(|c| *c != Cell::Empty))
            .map(|mut r| {
                r.resize(width, Cell::Empty);
                r
            })
            .collect();
        Self { headers, rows }
    }

    pub fn into_table(self, name: &str, schema: &Schema) -> Result<Table, IoError> {
        let formats = schema.formats();
        let mut columns = Vec::with_capacity(self.headers.len());

        for (i, header) in self.headers.iter().enumerate() {
            let cells = self.rows.iter().map(|r| &r[i]);
            let data = if schema.timestamps.contains(header) {
                let values = cells
                    .enumerate()
                    .map(|(row, cell)| timestamp_cell(cell, &formats).map_err(|value| IoError::DateParse {
                        table: name.into(),
                        column: header.clone(),
                        row: row + 1,
                        value,
                    }))
                    .collect::<Result<Vec<_>, _>>()?;
                ColumnData::Timestamp(values)
            } else if schema.numbers.contains(header) {
                let values = cells
                    .enumerate()
                    .map(|(row, cell)| number_cell(cell).map_err(|value| IoError::NumberParse {
                        table: name.into(),
                        column: header.clone(),
                        row: row + 1,
                        value,
                    }))
                    .collect::<Result<Vec<_>, _>>()?;
                ColumnData::Number(values)
            } else {
                ColumnData::Text(cells.map(Cell::render).collect())
            };
            columns.push(Column::new(header.clone(), data));
        }

        let table = Table::from_columns(name, columns)?;
        tracing::debug!(table = name, rows = table.len(), columns = self.headers.len(), "typed table");
        Ok(table)
    }
}

fn timestamp_cell(cell: &Cell, formats: &[&str]) -> Result<Option<NaiveDateTime>, String> {
    match cell {
        Cell::Empty => Ok(None),
        Cell::DateTime(t) => Ok(Some(*t)),
        Cell::Number(serial) => excel_serial(*serial).map(Some).ok_or_else(|| serial.to_string()),
        Cell::Text(s) => parse_timestamp(s, formats).map(Some).ok_or_else(|| s.clone()),
    }
}

fn number_cell(cell: &Cell) -> Result<Option<f64>, String> {
    match cell {
        Cell::Empty => Ok(None),
        Cell::Number(n) => Ok(Some(*n)),
        Cell::Text(s) => parse_number(s).map(Some).ok_or_else(|| s.clone()),
        Cell::DateTime(t) => Err(t.to_string()),
    }
}

pub fn parse_timestamp(value: &str, formats: &[&str]) -> Option<NaiveDateTime> {
    let value = value.trim();
    formats
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(value, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Accepts a decimal comma when the value has no decimal point.
pub fn parse_number(value: &str) -> Option<f64> {
    let value = value.trim();
    value.parse::<f64>().ok().or_else(|| {
        if value.contains('.') {
            None
        } else {
            value.replacen(',', ".", 1).parse::<f64>().ok()
        }
    })
}

/// Excel 1900 date system serial to timestamp.
pub fn excel_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(chrono::Duration::milliseconds(millis))
}
