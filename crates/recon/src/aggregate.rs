use std::collections::{BTreeMap, BTreeSet};

use crate::config::ReconConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::ReconError;
use crate::identifier::clean;
use crate::model::Mapping;
use crate::table::{Column, ColumnData, Table};

pub const MERGED_TABLE: &str = "merged";

/// Confirmed rows of `table` grouped by identifier, rows in table order.
/// `None` if either column is missing.
fn group_confirmed(
    table: &Table,
    id_column: &str,
    flag_column: &str,
    diagnostics: &mut Diagnostics,
) -> Option<BTreeMap<String, Vec<usize>>> {
    let ids = table.text_column(id_column);
    let flags = table.flag_column(flag_column);
    let (ids, flags) = match (ids, flags) {
        (Ok(ids), Ok(flags)) => (ids, flags),
        (Err(_), _) => {
            diagnostics.push(missing(table, id_column));
            return None;
        }
        (_, Err(_)) => {
            diagnostics.push(missing(table, flag_column));
            return None;
        }
    };

    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (row, (id, confirmed)) in ids.iter().zip(flags).enumerate() {
        if !confirmed {
            continue;
        }
        if let Some(id) = clean(id.as_deref()) {
            groups.entry(id.to_string()).or_default().push(row);
        }
    }
    Some(groups)
}

fn missing(table: &Table, column: &str) -> Diagnostic {
    Diagnostic::MissingColumn {
        operation: "merge".into(),
        table: table.name().into(),
        column: column.into(),
    }
}

/// Sorted distinct descriptions joined with `", "`.
fn joined_descriptions(descriptions: &[Option<String>], rows: &[usize]) -> Option<String> {
    let unique: BTreeSet<&str> = rows
        .iter()
        .filter_map(|&row| descriptions[row].as_deref())
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .collect();
    if unique.is_empty() {
        None
    } else {
        Some(unique.into_iter().collect::<Vec<_>>().join(", "))
    }
}

/// First non-missing value per group, keeping the column's kind.
fn first_values(data: &ColumnData, groups: &[Option<&Vec<usize>>]) -> ColumnData {
    fn pick<T: Clone>(values: &[Option<T>], groups: &[Option<&Vec<usize>>]) -> Vec<Option<T>> {
        groups
            .iter()
            .map(|rows| rows.and_then(|rows| rows.iter().find_map(|&r| values[r].clone())))
            .collect()
    }
    match data {
        ColumnData::Text(v) => ColumnData::Text(pick(v, groups)),
        ColumnData::Timestamp(v) => ColumnData::Timestamp(pick(v, groups)),
        ColumnData::Number(v) => ColumnData::Number(pick(v, groups)),
        ColumnData::Flag(v) => ColumnData::Flag(
            groups
                .iter()
                .map(|rows| rows.and_then(|rows| rows.first()).is_some_and(|&r| v[r]))
                .collect(),
        ),
        ColumnData::Category(v) => ColumnData::Category(
            groups
                .iter()
                .map(|rows| {
                    rows.and_then(|rows| rows.iter().find(|&&r| v[r].is_mapped()))
                        .map(|&r| v[r].clone())
                        .unwrap_or(Mapping::Unmapped)
                })
                .collect(),
        ),
    }
}

/// Sum per group. A group with no numeric value sums to missing.
fn sums(values: &[Option<f64>], groups: &[Option<&Vec<usize>>]) -> Vec<Option<f64>> {
    groups
        .iter()
        .map(|rows| {
            let present: Vec<f64> = rows
                .map(|rows| rows.iter().filter_map(|&r| values[r]).collect())
                .unwrap_or_default();
            if present.is_empty() {
                None
            } else {
                Some(present.iter().sum())
            }
        })
        .collect()
}

/// One row per confirmed procedure: confirmed referral rows and confirmed
/// dose rows grouped by identifier and joined on it (full outer join).
///
/// Returns `None` when an identifier or confirmation column is missing.
/// Configured columns that are absent or of the wrong kind are reported and
/// left out.
pub fn merge(
    referral: &Table,
    dose: &Table,
    config: &ReconConfig,
    diagnostics: &mut Diagnostics,
) -> Result<Option<Table>, ReconError> {
    let rc = &config.referral.columns;
    let dc = &config.dose.columns;

    let Some(referral_groups) = group_confirmed(referral, &rc.identifier, &rc.confirmed, diagnostics) else {
        return Ok(None);
    };
    let Some(dose_groups) = group_confirmed(dose, &dc.identifier, &dc.confirmed, diagnostics) else {
        return Ok(None);
    };

    let keys: BTreeSet<&String> = referral_groups.keys().chain(dose_groups.keys()).collect();
    let left: Vec<Option<&Vec<usize>>> = keys.iter().map(|k| referral_groups.get(*k)).collect();
    let right: Vec<Option<&Vec<usize>>> = keys.iter().map(|k| dose_groups.get(*k)).collect();

    let mut merged = Table::from_columns(
        MERGED_TABLE,
        vec![Column::text(
            rc.identifier.clone(),
            keys.iter().map(|k| Some(k.as_str())).collect(),
        )],
    )?;

    match referral.text_column(&rc.description) {
        Ok(descriptions) => {
            let joined = left
                .iter()
                .map(|rows| rows.and_then(|rows| joined_descriptions(descriptions, rows)))
                .collect();
            merged = merged.with_column(Column::new(rc.description.clone(), ColumnData::Text(joined)))?;
        }
        Err(_) => diagnostics.push(missing(referral, &rc.description)),
    }

    for name in &config.referral.first_columns {
        match referral.column(name) {
            Some(column) if !merged.has_column(name) => {
                merged = merged.with_column(Column::new(name.clone(), first_values(&column.data, &left)))?;
            }
            Some(_) => tracing::warn!(column = %name, "merge: duplicate output column skipped"),
            None => diagnostics.push(missing(referral, name)),
        }
    }

    for name in &config.dose.sum_columns {
        match dose.number_column(name) {
            Ok(values) if !merged.has_column(name) => {
                merged = merged.with_column(Column::new(name.clone(), ColumnData::Number(sums(values, &right))))?;
            }
            Ok(_) => tracing::warn!(column = %name, "merge: duplicate output column skipped"),
            Err(_) => diagnostics.push(missing(dose, name)),
        }
    }

    for name in &config.dose.first_columns {
        match dose.column(name) {
            Some(column) if !merged.has_column(name) => {
                merged = merged.with_column(Column::new(name.clone(), first_values(&column.data, &right)))?;
            }
            Some(_) => tracing::warn!(column = %name, "merge: duplicate output column skipped"),
            None => diagnostics.push(missing(dose, name)),
        }
    }

    tracing::info!(procedures = merged.len(), "merged referral and dose groups");
    Ok(Some(merged))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ReconConfig {
        ReconConfig::from_toml(
            r#"
name = "t"
[referral]
file = "r.csv"
first_columns = ["Pasient"]
[dose]
file = "d.csv"
sum_columns = ["DAP"]
first_columns = ["Modality Room"]
"#,
        )
        .unwrap()
    }

    fn referral() -> Table {
        Table::from_columns(
            "referral",
            vec![
                Column::text("Henvisnings-ID", vec![Some("A1"), Some("A1"), Some("A1"), Some("A2"), Some("A3")]),
                Column::text(
                    "Beskrivelse",
                    vec![Some("RG Thorax"), Some("CT Abdomen"), Some("RG Thorax"), Some("HSG"), Some("Caput")],
                ),
                Column::text("Pasient", vec![Some("P1"), Some("P1"), Some("P1"), Some("P2"), Some("P3")]),
                Column::new(
                    "is_confirmed_in_dose_source",
                    ColumnData::Flag(vec![true, true, true, true, false]),
                ),
            ],
        )
        .unwrap()
    }

    fn dose() -> Table {
        Table::from_columns(
            "dose",
            vec![
                Column::text("Accession Number", vec![Some("A1"), Some("A1"), Some("A2"), Some("B9")]),
                Column::new("DAP", ColumnData::Number(vec![Some(1.5), Some(2.0), None, Some(9.0)])),
                Column::text("Modality Room", vec![Some("Lab 1"), Some("Lab 2"), Some("Lab 3"), Some("Lab 4")]),
                Column::new(
                    "is_confirmed_in_referral_source",
                    ColumnData::Flag(vec![true, true, true, false]),
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn merges_confirmed_groups() {
        let mut d = Diagnostics::new();
        let merged = merge(&referral(), &dose(), &config(), &mut d).unwrap().unwrap();
        assert_eq!(
            merged.headers(),
            vec!["Henvisnings-ID", "Beskrivelse", "Pasient", "DAP", "Modality Room"]
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.text("Beskrivelse", 0), Some("CT Abdomen, RG Thorax"));
        assert_eq!(merged.text("Pasient", 0), Some("P1"));
        assert_eq!(merged.number_column("DAP").unwrap(), &[Some(3.5), None]);
        assert_eq!(merged.text("Modality Room", 0), Some("Lab 1"));
        assert_eq!(merged.text("Modality Room", 1), Some("Lab 3"));
        assert!(d.is_empty());
    }

    #[test]
    fn missing_sum_column_is_reported_and_skipped() {
        let mut cfg = config();
        cfg.dose.sum_columns.push("CAK".into());
        let mut d = Diagnostics::new();
        let merged = merge(&referral(), &dose(), &cfg, &mut d).unwrap().unwrap();
        assert!(!merged.has_column("CAK"));
        assert_eq!(d.count_kind("missing_column"), 1);
    }

    #[test]
    fn outer_join_keeps_one_sided_keys() {
        let r = referral();
        let d = dose()
            .with_column(Column::new(
                "is_confirmed_in_referral_source",
                ColumnData::Flag(vec![true, true, true, true]),
            ))
            .unwrap();
        let merged = merge(&r, &d, &config(), &mut Diagnostics::new()).unwrap().unwrap();
        assert_eq!(merged.text("Henvisnings-ID", 2), Some("B9"));
        assert_eq!(merged.text("Beskrivelse", 2), None);
        assert_eq!(merged.number_column("DAP").unwrap()[2], Some(9.0));
    }

    #[test]
    fn without_confirmation_flags_nothing_is_merged() {
        let r = Table::from_columns("referral", vec![Column::text("Henvisnings-ID", vec![Some("A1")])]).unwrap();
        let mut d = Diagnostics::new();
        assert!(merge(&r, &dose(), &config(), &mut d).unwrap().is_none());
        assert_eq!(d.count_kind("missing_column"), 1);
    }
}
