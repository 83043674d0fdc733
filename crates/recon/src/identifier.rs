//! Legacy identifier migration.
//!
//! Older dose exports carry short all-digit accession numbers. The current
//! namespace is the same number with a fixed prefix, so `1234567` becomes
//! `MIGR_1234567`. A migrated identifier contains a non-digit and is never
//! legacy again, which makes the rewrite idempotent.

use std::borrow::Cow;

use serde::Deserialize;

use crate::error::ReconError;
use crate::table::{Column, ColumnData, Table};

pub const DEFAULT_LEGACY_DIGITS: usize = 7;
pub const DEFAULT_MIGRATION_PREFIX: &str = "MIGR_";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdentifierFormat {
    #[serde(default = "default_digits")]
    pub digits: usize,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Accepted referral identifier prefixes. Empty accepts any prefix.
    #[serde(default)]
    pub valid_prefixes: Vec<String>,
    /// Accepted referral identifier lengths. Empty accepts any length.
    #[serde(default)]
    pub valid_lengths: Vec<usize>,
}

fn default_digits() -> usize {
    DEFAULT_LEGACY_DIGITS
}

fn default_prefix() -> String {
    DEFAULT_MIGRATION_PREFIX.into()
}

impl Default for IdentifierFormat {
    fn default() -> Self {
        Self {
            digits: DEFAULT_LEGACY_DIGITS,
            prefix: DEFAULT_MIGRATION_PREFIX.into(),
            valid_prefixes: Vec::new(),
            valid_lengths: Vec::new(),
        }
    }
}

impl IdentifierFormat {
    pub fn validate(&self) -> Result<(), ReconError> {
        if self.digits == 0 || self.digits > 32 {
            return Err(ReconError::ConfigValidation(format!(
                "identifier.digits must be between 1 and 32, got {}",
                self.digits
            )));
        }
        // An all-digit prefix could turn a migrated id back into a legacy one.
        if !self.prefix.chars().any(|c| !c.is_ascii_digit()) {
            return Err(ReconError::ConfigValidation(format!(
                "identifier.prefix must contain a non-digit character, got '{}'",
                self.prefix
            )));
        }
        Ok(())
    }

    /// Exactly `digits` ASCII digits, nothing else.
    pub fn is_legacy(&self, id: &str) -> bool {
        id.len() == self.digits && id.bytes().all(|b| b.is_ascii_digit())
    }

    pub fn migrate<'a>(&self, id: &'a str) -> Cow<'a, str> {
        if self.is_legacy(id) {
            Cow::Owned(format!("{}{id}", self.prefix))
        } else {
            Cow::Borrowed(id)
        }
    }

    pub fn checks_format(&self) -> bool {
        !self.valid_prefixes.is_empty() || !self.valid_lengths.is_empty()
    }

    /// Whether `id` has an accepted prefix and length. Lengths count characters.
    pub fn is_well_formed(&self, id: &str) -> bool {
        let prefix_ok =
            self.valid_prefixes.is_empty() || self.valid_prefixes.iter().any(|p| id.starts_with(p.as_str()));
        let length_ok =
            self.valid_lengths.is_empty() || self.valid_lengths.contains(&id.chars().count());
        prefix_ok && length_ok
    }
}

/// Comparison form of an identifier: surrounding whitespace removed, empty
/// values dropped.
pub fn clean(id: Option<&str>) -> Option<&str> {
    id.map(str::trim).filter(|s| !s.is_empty())
}

/// Rewrite every legacy identifier in `column`. Returns the new table and the
/// number of cells rewritten.
pub fn normalize_column(
    table: &Table,
    column: &str,
    format: &IdentifierFormat,
) -> Result<(Table, usize), ReconError> {
    let values = table.text_column(column)?;
    let mut migrated = 0;
    let rewritten: Vec<Option<String>> = values
        .iter()
        .map(|v| {
            v.as_deref().map(|raw| match format.migrate(raw.trim()) {
                Cow::Owned(new) => {
                    migrated += 1;
                    new
                }
                Cow::Borrowed(_) => raw.to_string(),
            })
        })
        .collect();

    if migrated == 0 {
        return Ok((table.clone(), 0));
    }

    let table = table
        .clone()
        .with_column(Column::new(column, ColumnData::Text(rewritten)))?;
    Ok((table, migrated))
}

/// Drop rows whose identifier is missing or malformed. Only dose identifiers
/// are migrated, so a legacy referral identifier is judged as written.
/// Returns the kept rows and the distinct rejected identifiers in encounter
/// order.
pub fn drop_malformed(
    table: &Table,
    column: &str,
    format: &IdentifierFormat,
) -> Result<(Table, Vec<String>), ReconError> {
    let values = table.text_column(column)?;
    let mut rejected: Vec<String> = Vec::new();
    let keep: Vec<bool> = values
        .iter()
        .map(|v| match clean(v.as_deref()) {
            Some(id) if format.is_well_formed(id) => true,
            other => {
                let shown = other.unwrap_or("").to_string();
                if !rejected.contains(&shown) {
                    rejected.push(shown);
                }
                false
            }
        })
        .collect();

    if rejected.is_empty() {
        return Ok((table.clone(), rejected));
    }
    Ok((table.filter_rows(|row| keep[row]), rejected))
}
