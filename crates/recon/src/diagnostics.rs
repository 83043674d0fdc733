//! Structured diagnostics.
//!
//! Data-quality problems and conflicts never abort a run. Each one is pushed
//! into a [`Diagnostics`] sink that travels with the result, and is mirrored
//! to `tracing` without patient identifiers.

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::classify::RuleConflict;
use crate::resolver::UnresolvedReason;
use crate::table::TIMESTAMP_FORMAT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Conflict,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Conflict => "conflict",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// An operation was skipped because a required column is absent.
    MissingColumn {
        operation: String,
        table: String,
        column: String,
    },
    /// Free text contains a character reserved for rule syntax.
    ReservedCharacter {
        column: String,
        character: char,
        rows: usize,
        example: String,
    },
    /// Legacy identifiers rewritten before comparison.
    LegacyIdentifiersMigrated {
        table: String,
        column: String,
        count: usize,
    },
    /// Referral rows dropped because their identifier has an unaccepted prefix or length.
    MalformedIdentifiers {
        table: String,
        column: String,
        count: usize,
        examples: Vec<String>,
    },
    /// A classification rule matched no records.
    DeadRule {
        index: usize,
        criteria: String,
        category: String,
    },
    /// A classification rule would have overwritten earlier categories.
    RuleConflict(RuleConflict),
    /// Several confirmed identifiers in one booking group, left for manual review.
    HardAmbiguity {
        patient: String,
        #[serde(with = "timestamp")]
        ordered_at: NaiveDateTime,
        confirmed: Vec<String>,
        unconfirmed: Vec<String>,
    },
    /// A booking group with several identifiers and no evidence to pick one.
    UnresolvedGroup {
        patient: String,
        #[serde(with = "timestamp")]
        ordered_at: NaiveDateTime,
        identifiers: Vec<String>,
        reason: UnresolvedReason,
    },
    /// The operator picked an identifier that is not a confirmed member of the group.
    InvalidChoice {
        patient: String,
        #[serde(with = "timestamp")]
        ordered_at: NaiveDateTime,
        choice: String,
        valid: Vec<String>,
    },
}

mod timestamp {
    use chrono::NaiveDateTime;
    use serde::Serializer;

    use crate::table::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Self::LegacyIdentifiersMigrated { .. } => Severity::Info,
            Self::MissingColumn { .. }
            | Self::ReservedCharacter { .. }
            | Self::MalformedIdentifiers { .. }
            | Self::DeadRule { .. }
            | Self::UnresolvedGroup { .. }
            | Self::InvalidChoice { .. } => Severity::Warning,
            Self::RuleConflict(_) | Self::HardAmbiguity { .. } => Severity::Conflict,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingColumn { .. } => "missing_column",
            Self::ReservedCharacter { .. } => "reserved_character",
            Self::LegacyIdentifiersMigrated { .. } => "legacy_identifiers_migrated",
            Self::MalformedIdentifiers { .. } => "malformed_identifiers",
            Self::DeadRule { .. } => "dead_rule",
            Self::RuleConflict(_) => "rule_conflict",
            Self::HardAmbiguity { .. } => "hard_ambiguity",
            Self::UnresolvedGroup { .. } => "unresolved_group",
            Self::InvalidChoice { .. } => "invalid_choice",
        }
    }

    /// One-line form without patient identifiers, for logs.
    fn log_line(&self) -> String {
        match self {
            Self::HardAmbiguity { confirmed, unconfirmed, .. } => format!(
                "confirmed [{}], unconfirmed [{}]",
                confirmed.join(", "),
                unconfirmed.join(", ")
            ),
            Self::UnresolvedGroup { identifiers, reason, .. } => {
                format!("{reason}: [{}]", identifiers.join(", "))
            }
            Self::InvalidChoice { choice, valid, .. } => {
                format!("'{choice}' not in [{}]", valid.join(", "))
            }
            Self::RuleConflict(c) => format!(
                "rule {} -> '{}' overlaps {} mapped description(s)",
                c.index,
                c.category,
                c.already_mapped.len()
            ),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingColumn { operation, table, column } => {
                write!(f, "{operation} skipped: table '{table}' has no column '{column}'")
            }
            Self::ReservedCharacter { column, character, rows, example } => write!(
                f,
                "column '{column}' contains reserved character '{character}' in {rows} row(s) (e.g. \"{example}\"); classification skipped"
            ),
            Self::LegacyIdentifiersMigrated { table, column, count } => write!(
                f,
                "{count} legacy identifier(s) in '{table}'.'{column}' rewritten to the current namespace"
            ),
            Self::MalformedIdentifiers { table, column, count, examples } => write!(
                f,
                "{count} distinct malformed identifier(s) in '{table}'.'{column}' dropped (e.g. {})",
                examples.join(", ")
            ),
            Self::DeadRule { index, criteria, category } => {
                write!(f, "rule {index} ('{criteria}' -> '{category}') matched no records")
            }
            Self::RuleConflict(c) => {
                write!(
                    f,
                    "rule {} ('{}' -> '{}') rejected: inclusion [{}], exclusion [{}]; already mapped:",
                    c.index,
                    c.criteria,
                    c.category,
                    c.include.join(" & "),
                    c.exclude.join(" & ")
                )?;
                for m in &c.already_mapped {
                    write!(f, "\n  {}   --->   {}", m.description, m.category)?;
                }
                Ok(())
            }
            Self::HardAmbiguity { patient, ordered_at, confirmed, unconfirmed } => write!(
                f,
                "patient {patient} at {}: confirmed identifiers [{}], unconfirmed [{}]; manual review needed",
                ordered_at.format(TIMESTAMP_FORMAT),
                confirmed.join(", "),
                unconfirmed.join(", ")
            ),
            Self::UnresolvedGroup { patient, ordered_at, identifiers, reason } => write!(
                f,
                "patient {patient} at {}: identifiers [{}] left unchanged ({reason})",
                ordered_at.format(TIMESTAMP_FORMAT),
                identifiers.join(", ")
            ),
            Self::InvalidChoice { patient, ordered_at, choice, valid } => write!(
                f,
                "patient {patient} at {}: '{choice}' is not one of the confirmed identifiers [{}]",
                ordered_at.format(TIMESTAMP_FORMAT),
                valid.join(", ")
            ),
        }
    }
}

/// Ordered list of diagnostics produced by one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        let kind = diagnostic.kind();
        match diagnostic.severity() {
            Severity::Info => tracing::info!(kind, "{}", diagnostic.log_line()),
            Severity::Warning | Severity::Conflict => {
                tracing::warn!(kind, "{}", diagnostic.log_line())
            }
        }
        self.items.push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.items.iter().filter(|d| d.severity() == severity).count()
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.items.iter().filter(|d| d.kind() == kind).count()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
