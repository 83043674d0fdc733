use crate::classify::ClassificationReport;
use crate::config::ReconConfig;
use crate::diagnostics::{Diagnostic, Diagnostics, Severity};
use crate::matcher::MembershipStats;
use crate::model::ReconSummary;
use crate::resolver::ResolutionReport;
use crate::table::Table;

/// Compute summary statistics from the annotated tables and stage reports.
pub fn compute_summary(
    config: &ReconConfig,
    referral: &Table,
    dose: &Table,
    merged: Option<&Table>,
    resolution: &ResolutionReport,
    classification: Option<&ClassificationReport>,
    diagnostics: &Diagnostics,
) -> ReconSummary {
    let rc = &config.referral.columns;
    let dc = &config.dose.columns;
    let referral_stats = MembershipStats::of(referral, &rc.identifier, &rc.confirmed).unwrap_or_default();
    let dose_stats = MembershipStats::of(dose, &dc.identifier, &dc.confirmed).unwrap_or_default();

    let legacy_migrated = diagnostics
        .iter()
        .map(|d| match d {
            Diagnostic::LegacyIdentifiersMigrated { count, .. } => *count,
            _ => 0,
        })
        .sum();

    let mut summary = ReconSummary {
        referral_rows: referral.len(),
        dose_rows: dose.len(),
        referral_identifiers: referral_stats.identifiers,
        referral_unconfirmed: referral_stats.unconfirmed,
        dose_identifiers: dose_stats.identifiers,
        dose_unconfirmed: dose_stats.unconfirmed,
        legacy_migrated,
        duplicate_groups: resolution.groups.len(),
        rewritten_groups: resolution.rewritten(),
        unresolved_groups: resolution.unresolved(),
        merged_procedures: merged.map_or(0, Table::len),
        warnings: diagnostics.count(Severity::Warning),
        conflicts: diagnostics.count(Severity::Conflict),
        ..ReconSummary::default()
    };

    if let Some(c) = classification.filter(|c| !c.skipped) {
        summary.unmapped = c.unmapped;
        summary.category_counts = c.category_counts.clone();
        summary.rule_conflicts = c.conflicts();
        summary.dead_rules = c.dead();
    }

    summary
}
