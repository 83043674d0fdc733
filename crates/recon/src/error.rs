use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (empty column name, bad legacy format, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// A classification rule that cannot be evaluated.
    #[error("rule {index} ('{criteria}'): {reason}")]
    InvalidRule {
        index: usize,
        criteria: String,
        reason: String,
    },
    /// Missing required column in a table.
    #[error("table '{table}': missing column '{column}'")]
    MissingColumn { table: String, column: String },
    /// Column exists but holds a different kind of data than the operation needs.
    #[error("table '{table}': column '{column}' is not a {expected} column")]
    ColumnType {
        table: String,
        column: String,
        expected: &'static str,
    },
    /// Column length does not match the table's row count.
    #[error("table '{table}': column '{column}' has {found} rows, expected {expected}")]
    ColumnLength {
        table: String,
        column: String,
        expected: usize,
        found: usize,
    },
    /// Input carries a column that must never be processed (direct personal identifiers).
    #[error("table '{table}' contains forbidden column '{column}'; remove or pseudonymize it before running")]
    ForbiddenColumn { table: String, column: String },
    /// Writing a report to its sink failed.
    #[error("report write failed: {0}")]
    Write(#[from] std::io::Error),
}
