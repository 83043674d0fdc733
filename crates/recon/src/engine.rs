use crate::aggregate;
use crate::classify::{self, ClassificationReport, RuleSet};
use crate::config::{default_category_column, ClassifyTarget, ReconConfig};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::ReconError;
use crate::evidence::compute_summary;
use crate::identifier;
use crate::matcher;
use crate::model::{ReconInput, ReconMeta, ReconOutput, ReconResult};
use crate::resolver::{self, ResolutionReport, ResolutionStrategy};
use crate::table::Table;

const MALFORMED_EXAMPLES: usize = 5;

/// Run the full pipeline: identity matching, duplicate resolution, merge and
/// classification. `rules` is the complete ordered rule set; classification
/// is skipped when it is `None`.
///
/// Data-quality problems and conflicts end up in the result's diagnostics.
/// The only errors are inputs that must not be processed at all and internal
/// table construction failures.
pub fn run(
    config: &ReconConfig,
    input: &ReconInput,
    rules: Option<&RuleSet>,
    strategy: &mut dyn ResolutionStrategy,
) -> Result<ReconOutput, ReconError> {
    check_forbidden(config, &input.referral)?;
    check_forbidden(config, &input.dose)?;

    let mut diagnostics = Diagnostics::new();
    let rc = &config.referral.columns;

    let referral = drop_malformed(config, &input.referral, &mut diagnostics);

    tracing::info!(
        referral_rows = referral.len(),
        dose_rows = input.dose.len(),
        "matching identifiers"
    );
    let (referral, dose) = matcher::confirm_referrals(&referral, &input.dose, config, &mut diagnostics);

    let (referral, resolution) = if config.resolution.enabled {
        tracing::info!("resolving duplicate bookings");
        resolver::resolve(&referral, &dose, config, strategy, &mut diagnostics)?
    } else {
        let report = ResolutionReport {
            skipped: true,
            ..ResolutionReport::default()
        };
        (referral, report)
    };

    let dose = matcher::confirm_doses(&dose, &referral, config, &mut diagnostics);
    let merged = aggregate::merge(&referral, &dose, config, &mut diagnostics)?;

    let settings = config.classification.as_ref();
    let target = settings.map(|c| c.target).unwrap_or_default();
    let output_column = settings
        .map(|c| c.output_column.clone())
        .unwrap_or_else(default_category_column);

    let mut referral = referral;
    let mut merged = merged;
    let mut classification: Option<ClassificationReport> = None;
    if let Some(rules) = rules {
        tracing::info!(rules = rules.len(), ?target, "classifying descriptions");
        let table: Option<&mut Table> = match target {
            ClassifyTarget::Referral => Some(&mut referral),
            ClassifyTarget::Merged => merged.as_mut(),
        };
        if let Some(table) = table {
            let (classified, report) =
                classify::classify(table, &rc.description, &output_column, rules, &mut diagnostics)?;
            *table = classified;
            classification = Some(report);
        }
    }

    let summary = compute_summary(
        config,
        &referral,
        &dose,
        merged.as_ref(),
        &resolution,
        classification.as_ref(),
        &diagnostics,
    );
    tracing::info!(
        warnings = summary.warnings,
        conflicts = summary.conflicts,
        merged = summary.merged_procedures,
        "run finished"
    );

    Ok(ReconOutput {
        referral,
        dose,
        merged,
        result: ReconResult {
            meta: ReconMeta {
                config_name: config.name.clone(),
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                run_at: chrono::Utc::now().to_rfc3339(),
            },
            summary,
            resolution,
            classification,
            diagnostics,
        },
    })
}

/// Refuse tables carrying direct personal identifiers.
pub fn check_forbidden(config: &ReconConfig, table: &Table) -> Result<(), ReconError> {
    match config.forbidden_columns.iter().find(|c| table.has_column(c)) {
        Some(column) => Err(ReconError::ForbiddenColumn {
            table: table.name().into(),
            column: column.clone(),
        }),
        None => Ok(()),
    }
}

fn drop_malformed(config: &ReconConfig, referral: &Table, diagnostics: &mut Diagnostics) -> Table {
    if !config.identifier.checks_format() {
        return referral.clone();
    }
    let column = &config.referral.columns.identifier;
    match identifier::drop_malformed(referral, column, &config.identifier) {
        Ok((kept, rejected)) if !rejected.is_empty() => {
            diagnostics.push(Diagnostic::MalformedIdentifiers {
                table: referral.name().into(),
                column: column.clone(),
                count: rejected.len(),
                examples: rejected.into_iter().take(MALFORMED_EXAMPLES).collect(),
            });
            kept
        }
        Ok((kept, _)) => kept,
        // The matcher reports the missing column.
        Err(_) => referral.clone(),
    }
}
