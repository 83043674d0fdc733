//! Rule-based procedure classification.
//!
//! A rule is a criteria key and a category. The key is a conjunction of
//! terms separated by `&`; a term prefixed with `~` is an exclusion. A record
//! matches when its description contains every inclusion term and none of the
//! exclusion terms, compared case-insensitively as substrings.
//!
//! Rules run in order. A rule whose matches include a record already mapped
//! to a different category is rejected as a whole and reported; nothing it
//! matched is changed.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::ReconError;
use crate::model::Mapping;
use crate::table::{Column, ColumnData, Table};

pub const DELIMITER: char = '&';
pub const EXCLUSION_MARKER: char = '~';

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// A rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub criteria: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criteria {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    include_lower: Vec<String>,
    exclude_lower: Vec<String>,
}

impl Criteria {
    pub fn parse(key: &str) -> Self {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for term in key.split(DELIMITER).map(str::trim).filter(|t| !t.is_empty()) {
            match term.strip_prefix(EXCLUSION_MARKER) {
                Some(rest) => {
                    let rest = rest.trim();
                    if !rest.is_empty() {
                        exclude.push(rest.to_string());
                    }
                }
                None => include.push(term.to_string()),
            }
        }
        let include_lower = include.iter().map(|t| t.to_lowercase()).collect();
        let exclude_lower = exclude.iter().map(|t| t.to_lowercase()).collect();
        Self {
            include,
            exclude,
            include_lower,
            exclude_lower,
        }
    }

    /// `description` must already be lowercased.
    pub fn matches(&self, description: &str) -> bool {
        self.include_lower.iter().all(|t| description.contains(t.as_str()))
            && !self.exclude_lower.iter().any(|t| description.contains(t.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub key: String,
    pub criteria: Criteria,
    pub category: String,
}

/// Ordered classification rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

#[derive(Deserialize)]
struct RuleFile {
    #[serde(default, rename = "rule")]
    rules: Vec<RuleSpec>,
}

impl RuleSet {
    pub fn from_specs(specs: &[RuleSpec]) -> Result<Self, ReconError> {
        let mut rules = Vec::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            let criteria = Criteria::parse(&spec.criteria);
            if criteria.include.is_empty() {
                return Err(ReconError::InvalidRule {
                    index,
                    criteria: spec.criteria.clone(),
                    reason: "needs at least one inclusion term".into(),
                });
            }
            if spec.category.trim().is_empty() {
                return Err(ReconError::InvalidRule {
                    index,
                    criteria: spec.criteria.clone(),
                    reason: "category must not be empty".into(),
                });
            }
            rules.push(Rule {
                key: spec.criteria.clone(),
                criteria,
                category: spec.category.clone(),
            });
        }
        Ok(Self { rules })
    }

    /// Parse a rules file made of `[[rule]]` tables.
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let file: RuleFile =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        Self::from_specs(&file.rules)
    }

    /// Append `other`'s rules after this set's rules.
    pub fn extend(&mut self, other: RuleSet) {
        self.rules.extend(other.rules);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }
}

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappedDescription {
    pub description: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleConflict {
    pub index: usize,
    pub criteria: String,
    pub category: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Distinct matched descriptions already carrying another category.
    pub already_mapped: Vec<MappedDescription>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Applied,
    Dead,
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    pub index: usize,
    pub criteria: String,
    pub category: String,
    pub matched: usize,
    pub status: RuleStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationReport {
    pub column: String,
    /// True when a precondition failed and no rule was evaluated.
    pub skipped: bool,
    pub rules: Vec<RuleOutcome>,
    pub category_counts: BTreeMap<String, usize>,
    pub unmapped: usize,
}

impl ClassificationReport {
    pub fn conflicts(&self) -> usize {
        self.rules.iter().filter(|r| r.status == RuleStatus::Conflict).count()
    }

    pub fn dead(&self) -> usize {
        self.rules.iter().filter(|r| r.status == RuleStatus::Dead).count()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Classify every row of `table` by its `description_column`.
///
/// Returns a copy of the table with `output_column` (a category column) in
/// first position. When the description column is missing, or contains a
/// reserved character, the input is returned unchanged and the report is
/// marked `skipped`.
pub fn classify(
    table: &Table,
    description_column: &str,
    output_column: &str,
    rules: &RuleSet,
    diagnostics: &mut Diagnostics,
) -> Result<(Table, ClassificationReport), ReconError> {
    let mut report = ClassificationReport {
        column: output_column.to_string(),
        ..ClassificationReport::default()
    };

    let descriptions = match table.text_column(description_column) {
        Ok(values) => values,
        Err(_) => {
            diagnostics.push(Diagnostic::MissingColumn {
                operation: "classification".into(),
                table: table.name().into(),
                column: description_column.into(),
            });
            report.skipped = true;
            return Ok((table.clone(), report));
        }
    };

    if let Some(reserved) = find_reserved(description_column, descriptions) {
        diagnostics.push(reserved);
        report.skipped = true;
        return Ok((table.clone(), report));
    }

    let lowered: Vec<String> = descriptions
        .iter()
        .map(|d| d.as_deref().unwrap_or("").to_lowercase())
        .collect();
    let mut state = vec![Mapping::Unmapped; table.len()];

    for (index, rule) in rules.iter().enumerate() {
        tracing::debug!(index, criteria = %rule.key, category = %rule.category, "applying rule");

        let targets: Vec<usize> = lowered
            .iter()
            .enumerate()
            .filter(|(_, d)| rule.criteria.matches(d))
            .map(|(row, _)| row)
            .collect();

        let mut outcome = RuleOutcome {
            index,
            criteria: rule.key.clone(),
            category: rule.category.clone(),
            matched: targets.len(),
            status: RuleStatus::Applied,
        };

        if targets.is_empty() {
            diagnostics.push(Diagnostic::DeadRule {
                index,
                criteria: rule.key.clone(),
                category: rule.category.clone(),
            });
            outcome.status = RuleStatus::Dead;
            report.rules.push(outcome);
            continue;
        }

        let already_mapped = conflicting_descriptions(&targets, &state, descriptions, &rule.category);
        if !already_mapped.is_empty() {
            diagnostics.push(Diagnostic::RuleConflict(RuleConflict {
                index,
                criteria: rule.key.clone(),
                category: rule.category.clone(),
                include: rule.criteria.include.clone(),
                exclude: rule.criteria.exclude.clone(),
                already_mapped,
            }));
            outcome.status = RuleStatus::Conflict;
            report.rules.push(outcome);
            continue;
        }

        for row in targets {
            state[row] = Mapping::Mapped(rule.category.clone());
        }
        report.rules.push(outcome);
    }

    for mapping in &state {
        match mapping {
            Mapping::Unmapped => report.unmapped += 1,
            Mapping::Mapped(c) => *report.category_counts.entry(c.clone()).or_insert(0) += 1,
        }
    }

    let column = Column::new(output_column, ColumnData::Category(state));
    let classified = table.clone().with_column_first(column)?;

    Ok((classified, report))
}

fn find_reserved(column: &str, descriptions: &[Option<String>]) -> Option<Diagnostic> {
    for character in [DELIMITER, EXCLUSION_MARKER] {
        let mut hits = descriptions
            .iter()
            .filter_map(|d| d.as_deref())
            .filter(|d| d.contains(character));
        if let Some(first) = hits.next() {
            return Some(Diagnostic::ReservedCharacter {
                column: column.into(),
                character,
                rows: 1 + hits.count(),
                example: first.to_string(),
            });
        }
    }
    None
}

fn conflicting_descriptions(
    targets: &[usize],
    state: &[Mapping],
    descriptions: &[Option<String>],
    category: &str,
) -> Vec<MappedDescription> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for &row in targets {
        if let Mapping::Mapped(current) = &state[row] {
            if current != category {
                let description = descriptions[row].clone().unwrap_or_default();
                if seen.insert(description.clone()) {
                    out.push(MappedDescription {
                        description,
                        category: current.clone(),
                    });
                }
            }
        }
    }
    out
}
