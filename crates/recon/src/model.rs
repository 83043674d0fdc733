use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::classify::ClassificationReport;
use crate::diagnostics::Diagnostics;
use crate::resolver::ResolutionReport;
use crate::table::Table;

/// Category label of records no rule has claimed.
pub const UNMAPPED: &str = "Unmapped";

// ---------------------------------------------------------------------------
// Classification state
// ---------------------------------------------------------------------------

/// Per-record classification state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Mapping {
    #[default]
    Unmapped,
    Mapped(String),
}

impl Mapping {
    pub fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped(_))
    }

    pub fn category(&self) -> Option<&str> {
        match self {
            Self::Unmapped => None,
            Self::Mapped(c) => Some(c),
        }
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmapped => f.write_str(UNMAPPED),
            Self::Mapped(c) => f.write_str(c),
        }
    }
}

impl Serialize for Mapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Pre-loaded referral and dose tables.
#[derive(Debug, Clone)]
pub struct ReconInput {
    pub referral: Table,
    pub dose: Table,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconSummary {
    pub referral_rows: usize,
    pub dose_rows: usize,
    pub referral_identifiers: usize,
    pub referral_unconfirmed: usize,
    pub dose_identifiers: usize,
    pub dose_unconfirmed: usize,
    pub legacy_migrated: usize,
    pub duplicate_groups: usize,
    pub rewritten_groups: usize,
    pub unresolved_groups: usize,
    pub merged_procedures: usize,
    pub unmapped: usize,
    pub category_counts: BTreeMap<String, usize>,
    pub rule_conflicts: usize,
    pub dead_rules: usize,
    pub warnings: usize,
    pub conflicts: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
}

/// Serializable outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub summary: ReconSummary,
    pub resolution: ResolutionReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ClassificationReport>,
    pub diagnostics: Diagnostics,
}

/// Annotated tables plus the serializable result.
#[derive(Debug, Clone)]
pub struct ReconOutput {
    pub referral: Table,
    pub dose: Table,
    pub merged: Option<Table>,
    pub result: ReconResult,
}
