//! `dosematch-io`: reading referral and dose exports into engine tables.
//!
//! Delimited text (sniffed delimiter, Windows-1252 fallback) and Excel
//! workbooks are read into an untyped grid, typed per source configuration,
//! then filtered. Config-relative paths are resolved against the directory
//! holding the config file.

pub mod csv;
pub mod error;
pub mod filter;
pub mod grid;
pub mod xlsx;

use std::path::{Path, PathBuf};

use dosematch_recon::{ReconConfig, ReconInput, RuleSet, Table};

pub use error::IoError;
pub use grid::Schema;

/// Table names used for the two sources.
pub const REFERRAL_TABLE: &str = "referral";
pub const DOSE_TABLE: &str = "dose";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Delimited,
    Workbook,
}

impl FileKind {
    pub fn of(path: &Path) -> Result<Self, IoError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Ok(FileKind::Delimited),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(FileKind::Workbook),
            _ => Err(IoError::UnsupportedFormat { path: path.to_path_buf() }),
        }
    }
}

/// Resolve `file` against `base` unless it is absolute.
pub fn resolve_path(base: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Read any supported file into a typed table.
pub fn read_table(path: &Path, sheet: Option<&str>, name: &str, schema: &Schema) -> Result<Table, IoError> {
    let grid = match FileKind::of(path)? {
        FileKind::Delimited => csv::read_grid(path, None)?,
        FileKind::Workbook => xlsx::read_grid(path, sheet)?,
    };
    if grid.headers.is_empty() {
        return Err(IoError::NoHeader { path: path.to_path_buf() });
    }
    grid.into_table(name, schema)
}

/// Load the referral source: ordering timestamps typed, filters applied.
pub fn load_referral(config: &ReconConfig, base: &Path) -> Result<Table, IoError> {
    let source = &config.referral;
    let path = resolve_path(base, &source.file);
    let schema = Schema {
        timestamps: vec![source.columns.ordered_at.clone()],
        numbers: Vec::new(),
        timestamp_formats: source.timestamp_formats.clone(),
    };
    let table = read_table(&path, source.sheet.as_deref(), REFERRAL_TABLE, &schema)?;
    tracing::info!(path = %path.display(), rows = table.len(), "loaded referral source");

    let table = filter::apply_filters(table, &source.filters);
    Ok(filter::drop_missing(table, &source.drop_missing))
}

/// Load the dose source: summed columns typed as numbers, filters applied.
pub fn load_dose(config: &ReconConfig, base: &Path) -> Result<Table, IoError> {
    let source = &config.dose;
    let path = resolve_path(base, &source.file);
    let schema = Schema {
        timestamps: Vec::new(),
        numbers: source.sum_columns.clone(),
        timestamp_formats: Vec::new(),
    };
    let table = read_table(&path, source.sheet.as_deref(), DOSE_TABLE, &schema)?;
    tracing::info!(path = %path.display(), rows = table.len(), "loaded dose source");

    let table = filter::apply_filters(table, &source.filters);
    Ok(filter::drop_missing(table, &source.drop_missing))
}

pub fn load_input(config: &ReconConfig, base: &Path) -> Result<ReconInput, IoError> {
    Ok(ReconInput {
        referral: load_referral(config, base)?,
        dose: load_dose(config, base)?,
    })
}

/// The complete ordered rule set: rules file first, then inline rules.
/// `None` when classification is not configured.
pub fn load_rules(config: &ReconConfig, base: &Path) -> Result<Option<RuleSet>, IoError> {
    let Some(classification) = config.classification.as_ref() else {
        return Ok(None);
    };
    let file_rules = match classification.rules_file.as_deref() {
        Some(file) => Some(read_rules_file(&resolve_path(base, file))?),
        None => None,
    };
    Ok(Some(classification.rule_set(file_rules)?))
}

pub fn read_rules_file(path: &Path) -> Result<RuleSet, IoError> {
    let text = std::fs::read_to_string(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let rules = RuleSet::from_toml(&text)?;
    tracing::debug!(path = %path.display(), rules = rules.len(), "loaded rules file");
    Ok(rules)
}

/// Read and validate a config file. Returns the config and the directory its
/// relative paths are resolved against.
pub fn load_config(path: &Path) -> Result<(ReconConfig, PathBuf), IoError> {
    let text = std::fs::read_to_string(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = ReconConfig::from_toml(&text)?;
    let base = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((config, base))
}
