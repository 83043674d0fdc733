// Load-time row filters

use dosematch_recon::config::RowFilter;
use dosematch_recon::Table;

/// Drop rows whose value in a filter column is one of the excluded values.
/// Comparison is on the trimmed display form. A filter naming a column the
/// table lacks is skipped with a warning.
pub fn apply_filters(table: Table, filters: &[RowFilter]) -> Table {
    filters.iter().fold(table, |table, filter| {
        let Some(column) = table.column(&filter.column) else {
            tracing::warn!(table = table.name(), column = %filter.column, "filter column missing; filter skipped");
            return table;
        };
        let mask: Vec<bool> = (0..table.len())
            .map(|row| {
                let value = column.data.display(row);
                !filter.exclude.iter().any(|x| x.trim() == value.trim())
            })
            .collect();
        let filtered = table.filter_rows(|row| mask[row]);
        tracing::info!(
            table = table.name(),
            column = %filter.column,
            dropped = table.len() - filtered.len(),
            "row filter applied"
        );
        filtered
    })
}

/// Drop rows with an empty value in any of `columns`.
pub fn drop_missing(table: Table, columns: &[String]) -> Table {
    columns.iter().fold(table, |table, name| {
        let Some(column) = table.column(name) else {
            tracing::warn!(table = table.name(), column = %name, "drop_missing column missing; skipped");
            return table;
        };
        let mask: Vec<bool> = (0..table.len())
            .map(|row| !column.data.display(row).trim().is_empty())
            .collect();
        let filtered = table.filter_rows(|row| mask[row]);
        if filtered.len() < table.len() {
            tracing::info!(
                table = table.name(),
                column = %name,
                dropped = table.len() - filtered.len(),
                "rows with missing values dropped"
            );
        }
        filtered
    })
}
