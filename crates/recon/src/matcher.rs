use std::collections::HashSet;

use serde::Serialize;

use crate::config::ReconConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::identifier::{self, clean};
use crate::table::{Column, ColumnData, Table};

/// Distinct identifier counts for one annotated source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MembershipStats {
    pub identifiers: usize,
    pub unconfirmed: usize,
}

impl MembershipStats {
    /// Count distinct identifiers and distinct unconfirmed identifiers.
    /// Returns `None` if either column is absent.
    pub fn of(table: &Table, id_column: &str, flag_column: &str) -> Option<Self> {
        let ids = table.text_column(id_column).ok()?;
        let flags = table.flag_column(flag_column).ok()?;
        let mut all = HashSet::new();
        let mut unconfirmed = HashSet::new();
        for (id, confirmed) in ids.iter().zip(flags) {
            if let Some(id) = clean(id.as_deref()) {
                all.insert(id);
                if !confirmed {
                    unconfirmed.insert(id);
                }
            }
        }
        Some(Self {
            identifiers: all.len(),
            unconfirmed: unconfirmed.len(),
        })
    }
}

/// Flag every row of `source` whose identifier occurs in `other`.
///
/// Identifiers are compared after trimming; blank identifiers are never
/// confirmed. If either identifier column is missing, a diagnostic is pushed
/// and `source` is returned unchanged.
pub fn annotate_membership(
    source: &Table,
    source_column: &str,
    other: &Table,
    other_column: &str,
    flag_column: &str,
    diagnostics: &mut Diagnostics,
) -> Table {
    let (ids, other_ids) = match (source.text_column(source_column), other.text_column(other_column)) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(_), _) => {
            diagnostics.push(missing(source, source_column));
            return source.clone();
        }
        (_, Err(_)) => {
            diagnostics.push(missing(other, other_column));
            return source.clone();
        }
    };

    let known: HashSet<&str> = other_ids.iter().filter_map(|id| clean(id.as_deref())).collect();
    let flags: Vec<bool> = ids
        .iter()
        .map(|id| clean(id.as_deref()).is_some_and(|id| known.contains(id)))
        .collect();

    let annotated = match source
        .clone()
        .with_column(Column::new(flag_column, ColumnData::Flag(flags)))
    {
        Ok(t) => t,
        Err(_) => return source.clone(),
    };

    if let Some(stats) = MembershipStats::of(&annotated, source_column, flag_column) {
        tracing::debug!(
            table = source.name(),
            identifiers = stats.identifiers,
            unconfirmed = stats.unconfirmed,
            "membership annotated"
        );
    }
    annotated
}

fn missing(table: &Table, column: &str) -> Diagnostic {
    Diagnostic::MissingColumn {
        operation: "identity matching".into(),
        table: table.name().into(),
        column: column.into(),
    }
}

/// Migrate legacy dose identifiers in place of the configured column.
/// Returns the dose table unchanged if the column is missing.
pub fn normalize_dose(dose: &Table, config: &ReconConfig, diagnostics: &mut Diagnostics) -> Table {
    let column = &config.dose.columns.identifier;
    match identifier::normalize_column(dose, column, &config.identifier) {
        Ok((table, 0)) => table,
        Ok((table, count)) => {
            diagnostics.push(Diagnostic::LegacyIdentifiersMigrated {
                table: dose.name().into(),
                column: column.clone(),
                count,
            });
            table
        }
        Err(_) => dose.clone(),
    }
}

/// Annotate referral rows with whether the dose source knows their
/// identifier. Returns the annotated referral table and the normalized dose
/// table.
pub fn confirm_referrals(
    referral: &Table,
    dose: &Table,
    config: &ReconConfig,
    diagnostics: &mut Diagnostics,
) -> (Table, Table) {
    let dose = normalize_dose(dose, config, diagnostics);
    let referral = annotate_membership(
        referral,
        &config.referral.columns.identifier,
        &dose,
        &config.dose.columns.identifier,
        &config.referral.columns.confirmed,
        diagnostics,
    );
    (referral, dose)
}

/// Reverse direction: annotate dose rows with whether the referral source
/// knows their identifier.
pub fn confirm_doses(
    dose: &Table,
    referral: &Table,
    config: &ReconConfig,
    diagnostics: &mut Diagnostics,
) -> Table {
    let dose = normalize_dose(dose, config, diagnostics);
    annotate_membership(
        &dose,
        &config.dose.columns.identifier,
        referral,
        &config.referral.columns.identifier,
        &config.dose.columns.confirmed,
        diagnostics,
    )
}
