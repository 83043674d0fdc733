//! Writing run outputs: annotated tables, reports and the JSON result.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use dosematch_io::csv::export_table;
use dosematch_io::{resolve_path, IoError};
use dosematch_recon::config::{default_category_column, OutputConfig};
use dosematch_recon::report::{category_report, code_report};
use dosematch_recon::{ReconConfig, ReconOutput, ReconResult, Table};

use crate::CliError;

/// Output paths from `[output]`, resolved against `base`.
pub struct OutputPaths {
    pub referral: Option<PathBuf>,
    pub dose: Option<PathBuf>,
    pub merged: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub codes: Option<PathBuf>,
    pub json: Option<PathBuf>,
}

impl OutputPaths {
    pub fn resolve(output: &OutputConfig, base: &Path) -> Self {
        let path = |p: &Option<String>| p.as_deref().map(|p| resolve_path(base, p));
        Self {
            referral: path(&output.referral),
            dose: path(&output.dose),
            merged: path(&output.merged),
            report: path(&output.report),
            codes: path(&output.codes),
            json: path(&output.json),
        }
    }
}

/// Write every configured output. Reports are taken from the merged table
/// when there is one, otherwise from the referral table.
pub fn write_outputs(config: &ReconConfig, paths: &OutputPaths, output: &ReconOutput) -> Result<(), CliError> {
    if let Some(ref path) = paths.referral {
        export_table(&output.referral, path).map_err(CliError::from_io)?;
    }
    if let Some(ref path) = paths.dose {
        export_table(&output.dose, path).map_err(CliError::from_io)?;
    }
    if let (Some(path), Some(merged)) = (&paths.merged, &output.merged) {
        export_table(merged, path).map_err(CliError::from_io)?;
    }

    let report_table = output.merged.as_ref().unwrap_or(&output.referral);
    let category_column = config
        .classification
        .as_ref()
        .map(|c| c.output_column.clone())
        .unwrap_or_else(default_category_column);

    if let Some(ref path) = paths.report {
        if report_table.has_column(&category_column) {
            write_with(path, |out| category_report(report_table, &category_column, out))?;
        } else {
            tracing::warn!(path = %path.display(), "no classification column; category report not written");
        }
    }

    if let Some(ref path) = paths.codes {
        let rc = &config.referral.columns;
        write_with(path, |out| {
            code_report(
                report_table,
                &rc.identifier,
                &rc.description,
                config.output.codes_group.as_deref(),
                out,
            )
        })?;
    }

    if let Some(ref path) = paths.json {
        write_json(&output.result, path)?;
    }
    Ok(())
}

/// Create `path` and hand a buffered writer to `f`.
pub fn write_with<E: std::fmt::Display>(
    path: &Path,
    f: impl FnOnce(&mut BufWriter<File>) -> Result<(), E>,
) -> Result<(), CliError> {
    let file = File::create(path).map_err(|source| {
        CliError::from_io(IoError::Write {
            path: path.to_path_buf(),
            source,
        })
    })?;
    let mut out = BufWriter::new(file);
    f(&mut out).map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))?;
    out.flush()
        .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), "wrote report");
    Ok(())
}

pub fn to_json(result: &ReconResult) -> Result<String, CliError> {
    serde_json::to_string_pretty(result).map_err(|e| CliError::general(format!("JSON serialization error: {e}")))
}

pub fn write_json(result: &ReconResult, path: &Path) -> Result<(), CliError> {
    let json = to_json(result)?;
    std::fs::write(path, json).map_err(|source| {
        CliError::from_io(IoError::Write {
            path: path.to_path_buf(),
            source,
        })
    })?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

/// Human summary on stderr.
pub fn print_summary(result: &ReconResult, merged: Option<&Table>) {
    let s = &result.summary;
    eprintln!(
        "{}: {} referral rows, {} dose rows; {} referral identifiers ({} unconfirmed), {} dose identifiers ({} unconfirmed)",
        result.meta.config_name,
        s.referral_rows,
        s.dose_rows,
        s.referral_identifiers,
        s.referral_unconfirmed,
        s.dose_identifiers,
        s.dose_unconfirmed,
    );
    if result.resolution.skipped {
        eprintln!("duplicate resolution: skipped");
    } else {
        eprintln!(
            "duplicate bookings: {} group(s), {} rewritten, {} unresolved",
            s.duplicate_groups, s.rewritten_groups, s.unresolved_groups,
        );
    }
    if s.legacy_migrated > 0 {
        eprintln!("legacy identifiers migrated: {}", s.legacy_migrated);
    }
    if let Some(merged) = merged {
        eprintln!("merged procedures: {}", merged.len());
    }
    if let Some(ref c) = result.classification {
        if c.skipped {
            eprintln!("classification: skipped");
        } else {
            eprintln!(
                "classification: {} categories, {} unmapped, {} conflicting rule(s), {} dead rule(s)",
                c.category_counts.len(),
                c.unmapped,
                s.rule_conflicts,
                s.dead_rules,
            );
        }
    }
    eprintln!("diagnostics: {} warning(s), {} conflict(s)", s.warnings, s.conflicts);
}

/// One line per diagnostic on stderr.
pub fn print_diagnostics(result: &ReconResult) {
    for d in &result.diagnostics {
        eprintln!("{}: {}", d.severity(), d);
    }
}
