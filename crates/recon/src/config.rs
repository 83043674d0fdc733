use serde::Deserialize;

use crate::classify::{RuleSet, RuleSpec};
use crate::error::ReconError;
use crate::identifier::IdentifierFormat;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    pub name: String,
    /// Columns that abort a run when present in either input.
    #[serde(default = "default_forbidden_columns")]
    pub forbidden_columns: Vec<String>,
    pub referral: ReferralConfig,
    pub dose: DoseConfig,
    #[serde(default)]
    pub identifier: IdentifierFormat,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub classification: Option<ClassificationConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_forbidden_columns() -> Vec<String> {
    vec!["Fødselsnummer".into()]
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReferralConfig {
    pub file: String,
    /// Worksheet name for Excel sources (first sheet when omitted).
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default)]
    pub columns: ReferralColumns,
    /// chrono formats tried in order when parsing `ordered_at`.
    #[serde(default)]
    pub timestamp_formats: Vec<String>,
    #[serde(default)]
    pub filters: Vec<RowFilter>,
    /// Columns whose empty rows are dropped at load time.
    #[serde(default)]
    pub drop_missing: Vec<String>,
    /// Columns carried into the merged table (first value per identifier).
    #[serde(default)]
    pub first_columns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferralColumns {
    #[serde(default = "default_referral_identifier")]
    pub identifier: String,
    #[serde(default = "default_patient_id")]
    pub patient_id: String,
    #[serde(default = "default_ordered_at")]
    pub ordered_at: String,
    #[serde(default = "default_description")]
    pub description: String,
    /// Annotation column written by the identity matcher.
    #[serde(default = "default_referral_confirmed")]
    pub confirmed: String,
}

impl Default for ReferralColumns {
    fn default() -> Self {
        Self {
            identifier: default_referral_identifier(),
            patient_id: default_patient_id(),
            ordered_at: default_ordered_at(),
            description: default_description(),
            confirmed: default_referral_confirmed(),
        }
    }
}

fn default_referral_identifier() -> String {
    "Henvisnings-ID".into()
}

fn default_patient_id() -> String {
    "Pasient".into()
}

fn default_ordered_at() -> String {
    "Bestilt dato og tidspunkt".into()
}

fn default_description() -> String {
    "Beskrivelse".into()
}

fn default_referral_confirmed() -> String {
    "is_confirmed_in_dose_source".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoseConfig {
    pub file: String,
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default)]
    pub columns: DoseColumns,
    /// Numeric columns summed per identifier in the merged table.
    #[serde(default)]
    pub sum_columns: Vec<String>,
    /// Columns carried into the merged table (first value per identifier).
    #[serde(default)]
    pub first_columns: Vec<String>,
    #[serde(default)]
    pub filters: Vec<RowFilter>,
    #[serde(default)]
    pub drop_missing: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoseColumns {
    #[serde(default = "default_dose_identifier")]
    pub identifier: String,
    #[serde(default = "default_dose_confirmed")]
    pub confirmed: String,
}

impl Default for DoseColumns {
    fn default() -> Self {
        Self {
            identifier: default_dose_identifier(),
            confirmed: default_dose_confirmed(),
        }
    }
}

fn default_dose_identifier() -> String {
    "Accession Number".into()
}

fn default_dose_confirmed() -> String {
    "is_confirmed_in_referral_source".into()
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Drop rows whose `column` value is one of `exclude`.
#[derive(Debug, Clone, Deserialize)]
pub struct RowFilter {
    pub column: String,
    pub exclude: Vec<String>,
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ResolutionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub mode: ResolutionMode,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: ResolutionMode::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// Hard ambiguities are reported and left as-is.
    #[default]
    NonInteractive,
    /// Hard ambiguities are offered to an operator.
    Interactive,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationConfig {
    /// Rule file with `[[rule]]` entries, relative to the config file.
    #[serde(default)]
    pub rules_file: Option<String>,
    /// Inline rules, applied after the rules file's rules.
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleSpec>,
    #[serde(default)]
    pub target: ClassifyTarget,
    #[serde(default = "default_category_column")]
    pub output_column: String,
}

impl ClassificationConfig {
    /// Rules from the rules file (if any) followed by the inline rules.
    pub fn rule_set(&self, file_rules: Option<RuleSet>) -> Result<RuleSet, ReconError> {
        let mut rules = file_rules.unwrap_or_default();
        rules.extend(RuleSet::from_specs(&self.rules)?);
        Ok(rules)
    }
}

pub fn default_category_column() -> String {
    "mapped_category".into()
}

/// Which table's description column the rule engine reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifyTarget {
    Referral,
    #[default]
    Merged,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub referral: Option<String>,
    #[serde(default)]
    pub dose: Option<String>,
    #[serde(default)]
    pub merged: Option<String>,
    /// Ranked category report.
    #[serde(default)]
    pub report: Option<String>,
    /// Examination-code listing.
    #[serde(default)]
    pub codes: Option<String>,
    /// Merged-table column splitting the code listing, e.g. the laboratory.
    #[serde(default)]
    pub codes_group: Option<String>,
    #[serde(default)]
    pub json: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let r = &self.referral.columns;
        let named = [
            ("referral.columns.identifier", &r.identifier),
            ("referral.columns.patient_id", &r.patient_id),
            ("referral.columns.ordered_at", &r.ordered_at),
            ("referral.columns.description", &r.description),
            ("referral.columns.confirmed", &r.confirmed),
            ("dose.columns.identifier", &self.dose.columns.identifier),
            ("dose.columns.confirmed", &self.dose.columns.confirmed),
        ];
        for (key, value) in named {
            if value.trim().is_empty() {
                return Err(ReconError::ConfigValidation(format!("{key} must not be empty")));
            }
        }

        if r.confirmed == r.identifier || r.confirmed == r.description {
            return Err(ReconError::ConfigValidation(format!(
                "referral.columns.confirmed '{}' would overwrite an input column",
                r.confirmed
            )));
        }
        if self.dose.columns.confirmed == self.dose.columns.identifier {
            return Err(ReconError::ConfigValidation(format!(
                "dose.columns.confirmed '{}' would overwrite the identifier column",
                self.dose.columns.confirmed
            )));
        }

        self.identifier.validate()?;

        if let Some(ref classification) = self.classification {
            if classification.output_column.trim().is_empty() {
                return Err(ReconError::ConfigValidation(
                    "classification.output_column must not be empty".into(),
                ));
            }
            if classification.rules_file.is_none() && classification.rules.is_empty() {
                return Err(ReconError::ConfigValidation(
                    "classification needs a rules_file or at least one [[classification.rule]]".into(),
                ));
            }
            // Inline rules are checked here; file rules when the file is loaded.
            RuleSet::from_specs(&classification.rules)?;
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
