//! Plain-text reports.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use crate::error::ReconError;
use crate::table::Table;

/// Rows per category, ranked by descending count then name.
pub fn category_counts(table: &Table, column: &str) -> Result<Vec<(String, usize)>, ReconError> {
    let data = &table.require(column)?.data;
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for row in 0..table.len() {
        *counts.entry(data.display(row)).or_insert(0) += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(ranked)
}

/// One line per category: `(n = 12) Category`.
pub fn category_report<W: Write>(table: &Table, column: &str, out: &mut W) -> Result<(), ReconError> {
    for (category, n) in category_counts(table, column)? {
        writeln!(out, "(n = {n}) {category}")?;
    }
    Ok(())
}

/// Distinct description combinations and how many identifiers carry each.
///
/// Each identifier's sorted distinct descriptions are joined with `", "`;
/// combinations are listed alphabetically.
pub fn code_combinations(
    table: &Table,
    id_column: &str,
    description_column: &str,
    rows: &[usize],
) -> Result<Vec<(String, usize)>, ReconError> {
    let ids = table.text_column(id_column)?;
    let descriptions = table.text_column(description_column)?;

    let mut per_id: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for &row in rows {
        let Some(id) = ids[row].as_deref() else {
            continue;
        };
        let codes = per_id.entry(id).or_default();
        if let Some(d) = descriptions[row].as_deref() {
            codes.insert(d);
        }
    }

    let mut combinations: BTreeMap<String, usize> = BTreeMap::new();
    for codes in per_id.into_values() {
        let code = codes.into_iter().collect::<Vec<_>>().join(", ");
        *combinations.entry(code).or_insert(0) += 1;
    }
    Ok(combinations.into_iter().collect())
}

/// Examination-code listing, optionally split by a group column such as the
/// laboratory. Groups appear in first-appearance order under a `## group`
/// heading.
pub fn code_report<W: Write>(
    table: &Table,
    id_column: &str,
    description_column: &str,
    group_column: Option<&str>,
    out: &mut W,
) -> Result<(), ReconError> {
    let sections: Vec<(Option<String>, Vec<usize>)> = match group_column {
        None => vec![(None, (0..table.len()).collect())],
        Some(column) => {
            let data = &table.require(column)?.data;
            let mut order: Vec<(Option<String>, Vec<usize>)> = Vec::new();
            for row in 0..table.len() {
                let group = data.display(row);
                match order.iter_mut().find(|(g, _)| g.as_deref() == Some(group.as_str())) {
                    Some((_, rows)) => rows.push(row),
                    None => order.push((Some(group), vec![row])),
                }
            }
            order
        }
    };

    for (i, (group, rows)) in sections.iter().enumerate() {
        if let Some(group) = group {
            if i > 0 {
                writeln!(out)?;
            }
            writeln!(out, "## {group}")?;
        }
        for (code, n) in code_combinations(table, id_column, description_column, rows)? {
            writeln!(out, "(n = {n}) {code}")?;
        }
    }
    Ok(())
}
