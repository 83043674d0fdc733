use std::path::PathBuf;

use dosematch_recon::ReconError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("cannot read workbook {}: {message}", path.display())]
    Excel { path: PathBuf, message: String },

    #[error("sheet '{sheet}' not found in {} (available: {})", path.display(), available.join(", "))]
    SheetNotFound {
        path: PathBuf,
        sheet: String,
        available: Vec<String>,
    },

    #[error("{} has no header row", path.display())]
    NoHeader { path: PathBuf },

    /// `row` is the 1-based data row (header excluded).
    #[error("{table}.{column} row {row}: cannot parse '{value}' as a timestamp")]
    DateParse {
        table: String,
        column: String,
        row: usize,
        value: String,
    },

    #[error("{table}.{column} row {row}: cannot parse '{value}' as a number")]
    NumberParse {
        table: String,
        column: String,
        row: usize,
        value: String,
    },

    #[error("unsupported file type: {} (expected .csv, .tsv, .txt, .xlsx, .xlsm, .xlsb, .xls or .ods)", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error(transparent)]
    Table(#[from] ReconError),
}
