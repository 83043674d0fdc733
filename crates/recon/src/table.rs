//! In-memory record store.
//!
//! A [`Table`] is a named, column-oriented collection with a header order.
//! Every column holds typed data of the same length. The engine never mutates
//! a table it borrows: transformations take `&Table` and return a new one, or
//! take `Table` by value when they own the buffer.

use chrono::NaiveDateTime;

use crate::error::ReconError;
use crate::model::Mapping;

/// Timestamp rendering used for display and export.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Text(Vec<Option<String>>),
    Timestamp(Vec<Option<NaiveDateTime>>),
    Number(Vec<Option<f64>>),
    Flag(Vec<bool>),
    Category(Vec<Mapping>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            Self::Text(v) => v.len(),
            Self::Timestamp(v) => v.len(),
            Self::Number(v) => v.len(),
            Self::Flag(v) => v.len(),
            Self::Category(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
            Self::Number(_) => "number",
            Self::Flag(_) => "flag",
            Self::Category(_) => "category",
        }
    }

    /// Render one cell as text. Missing values render as an empty string.
    pub fn display(&self, row: usize) -> String {
        match self {
            Self::Text(v) => v[row].clone().unwrap_or_default(),
            Self::Timestamp(v) => v[row]
                .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
                .unwrap_or_default(),
            Self::Number(v) => match v[row] {
                Some(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", n as i64),
                Some(n) => format!("{n}"),
                None => String::new(),
            },
            Self::Flag(v) => if v[row] { "true" } else { "false" }.to_string(),
            Self::Category(v) => v[row].to_string(),
        }
    }

    /// Keep only the rows whose `keep` entry is true.
    fn select(&self, keep: &[bool]) -> Self {
        fn pick<T: Clone>(v: &[T], keep: &[bool]) -> Vec<T> {
            v.iter()
                .zip(keep)
                .filter(|(_, k)| **k)
                .map(|(x, _)| x.clone())
                .collect()
        }
        match self {
            Self::Text(v) => Self::Text(pick(v, keep)),
            Self::Timestamp(v) => Self::Timestamp(pick(v, keep)),
            Self::Number(v) => Self::Number(pick(v, keep)),
            Self::Flag(v) => Self::Flag(pick(v, keep)),
            Self::Category(v) => Self::Category(pick(v, keep)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self { name: name.into(), data }
    }

    pub fn text<S: Into<String>>(name: impl Into<String>, values: Vec<Option<S>>) -> Self {
        Self::new(
            name,
            ColumnData::Text(values.into_iter().map(|v| v.map(Into::into)).collect()),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    len: usize,
}

impl Table {
    /// Empty table with no columns and no rows.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            len: 0,
        }
    }

    /// Build a table from columns. All columns must have the same length.
    pub fn from_columns(name: impl Into<String>, columns: Vec<Column>) -> Result<Self, ReconError> {
        let mut table = Self::new(name);
        for column in columns {
            table = table.with_column(column)?;
        }
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn require(&self, name: &str) -> Result<&Column, ReconError> {
        self.column(name).ok_or_else(|| self.missing(name))
    }

    fn missing(&self, name: &str) -> ReconError {
        ReconError::MissingColumn {
            table: self.name.clone(),
            column: name.into(),
        }
    }

    fn wrong_type(&self, name: &str, expected: &'static str) -> ReconError {
        ReconError::ColumnType {
            table: self.name.clone(),
            column: name.into(),
            expected,
        }
    }

    pub fn text_column(&self, name: &str) -> Result<&[Option<String>], ReconError> {
        match &self.require(name)?.data {
            ColumnData::Text(v) => Ok(v),
            _ => Err(self.wrong_type(name, "text")),
        }
    }

    pub fn timestamp_column(&self, name: &str) -> Result<&[Option<NaiveDateTime>], ReconError> {
        match &self.require(name)?.data {
            ColumnData::Timestamp(v) => Ok(v),
            _ => Err(self.wrong_type(name, "timestamp")),
        }
    }

    pub fn number_column(&self, name: &str) -> Result<&[Option<f64>], ReconError> {
        match &self.require(name)?.data {
            ColumnData::Number(v) => Ok(v),
            _ => Err(self.wrong_type(name, "number")),
        }
    }

    pub fn flag_column(&self, name: &str) -> Result<&[bool], ReconError> {
        match &self.require(name)?.data {
            ColumnData::Flag(v) => Ok(v),
            _ => Err(self.wrong_type(name, "flag")),
        }
    }

    pub fn category_column(&self, name: &str) -> Result<&[Mapping], ReconError> {
        match &self.require(name)?.data {
            ColumnData::Category(v) => Ok(v),
            _ => Err(self.wrong_type(name, "category")),
        }
    }

    /// Mutable access to a text column of an owned table.
    pub fn text_column_mut(&mut self, name: &str) -> Result<&mut Vec<Option<String>>, ReconError> {
        let missing = self.missing(name);
        let wrong = self.wrong_type(name, "text");
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or(missing)?;
        match &mut column.data {
            ColumnData::Text(v) => Ok(v),
            _ => Err(wrong),
        }
    }

    /// Text cell accessor; `None` for missing values, absent columns and
    /// non-text columns.
    pub fn text(&self, column: &str, row: usize) -> Option<&str> {
        match self.column(column).map(|c| &c.data) {
            Some(ColumnData::Text(v)) => v.get(row).and_then(|s| s.as_deref()),
            _ => None,
        }
    }

    pub fn timestamp(&self, column: &str, row: usize) -> Option<NaiveDateTime> {
        match self.column(column).map(|c| &c.data) {
            Some(ColumnData::Timestamp(v)) => v.get(row).copied().flatten(),
            _ => None,
        }
    }

    pub fn flag(&self, column: &str, row: usize) -> Option<bool> {
        match self.column(column).map(|c| &c.data) {
            Some(ColumnData::Flag(v)) => v.get(row).copied(),
            _ => None,
        }
    }

    /// Render any cell as text (empty for absent columns).
    pub fn display(&self, column: &str, row: usize) -> String {
        self.column(column)
            .map(|c| c.data.display(row))
            .unwrap_or_default()
    }

    /// Append a column, or replace an existing column of the same name in place.
    pub fn with_column(mut self, column: Column) -> Result<Self, ReconError> {
        self.check_length(&column)?;
        if self.columns.is_empty() {
            self.len = column.data.len();
        }
        match self.position(&column.name) {
            Some(idx) => self.columns[idx] = column,
            None => self.columns.push(column),
        }
        Ok(self)
    }

    /// Insert a column at position 0, removing any existing column of the same name.
    pub fn with_column_first(mut self, column: Column) -> Result<Self, ReconError> {
        self.check_length(&column)?;
        if self.columns.is_empty() {
            self.len = column.data.len();
        }
        if let Some(idx) = self.position(&column.name) {
            self.columns.remove(idx);
        }
        self.columns.insert(0, column);
        Ok(self)
    }

    fn check_length(&self, column: &Column) -> Result<(), ReconError> {
        if !self.columns.is_empty() && column.data.len() != self.len {
            return Err(ReconError::ColumnLength {
                table: self.name.clone(),
                column: column.name.clone(),
                expected: self.len,
                found: column.data.len(),
            });
        }
        Ok(())
    }

    /// New table with only the rows for which `keep(row)` is true.
    pub fn filter_rows(&self, keep: impl Fn(usize) -> bool) -> Self {
        let mask: Vec<bool> = (0..self.len).map(keep).collect();
        let len = mask.iter().filter(|k| **k).count();
        Self {
            name: self.name.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.data.select(&mask)))
                .collect(),
            len,
        }
    }
}
