//! Duplicate booking repair.
//!
//! One physical procedure sometimes receives two referral identifiers. Rows
//! sharing a patient and booking timestamp but carrying different
//! identifiers form a booking group. When the dose source confirms exactly
//! one identifier of the group, the other identifiers are rewritten to it.
//! Groups with several confirmed identifiers are offered to a
//! [`ResolutionStrategy`]; every other case is left as-is and reported.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};

use crate::config::{ReconConfig, ReferralColumns};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::ReconError;
use crate::identifier::clean;
use crate::matcher;
use crate::table::{Column, ColumnData, Table, TIMESTAMP_FORMAT};

// ---------------------------------------------------------------------------
// Operator choice
// ---------------------------------------------------------------------------

/// A booking group with two or more confirmed identifiers and at least one
/// unconfirmed identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousGroup {
    pub patient: String,
    pub ordered_at: NaiveDateTime,
    pub confirmed: Vec<String>,
    pub unconfirmed: Vec<String>,
    /// Descriptions of each identifier's rows, in identifier encounter order.
    pub descriptions: Vec<(String, Vec<String>)>,
    /// Choices already rejected for this group.
    pub rejected: Vec<String>,
}

/// Decides which confirmed identifier absorbs the unconfirmed rows of an
/// ambiguous group. `None` leaves the group unresolved.
pub trait ResolutionStrategy {
    fn choose(&mut self, group: &AmbiguousGroup) -> Option<String>;
}

impl<F> ResolutionStrategy for F
where
    F: FnMut(&AmbiguousGroup) -> Option<String>,
{
    fn choose(&mut self, group: &AmbiguousGroup) -> Option<String> {
        self(group)
    }
}

/// Never chooses; every ambiguous group is reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractive;

impl ResolutionStrategy for NonInteractive {
    fn choose(&mut self, _group: &AmbiguousGroup) -> Option<String> {
        None
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    NoneConfirmed,
    AllConfirmed,
    MultipleConfirmed,
    InconsistentConfirmation,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoneConfirmed => "no identifier confirmed",
            Self::AllConfirmed => "all identifiers confirmed",
            Self::MultipleConfirmed => "several identifiers confirmed",
            Self::InconsistentConfirmation => "rows of one identifier disagree on confirmation",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GroupOutcome {
    Rewritten { from: Vec<String>, to: String },
    OperatorRewritten { from: Vec<String>, to: String },
    Unresolved { reason: UnresolvedReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupReport {
    pub patient: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub ordered_at: NaiveDateTime,
    pub identifiers: Vec<String>,
    #[serde(flatten)]
    pub outcome: GroupOutcome,
}

fn serialize_timestamp<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionReport {
    /// True when a required column was missing and nothing was examined.
    pub skipped: bool,
    pub groups: Vec<GroupReport>,
}

impl ResolutionReport {
    pub fn rewritten(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| !matches!(g.outcome, GroupOutcome::Unresolved { .. }))
            .count()
    }

    pub fn unresolved(&self) -> usize {
        self.groups.len() - self.rewritten()
    }

    pub fn changed(&self) -> bool {
        self.rewritten() > 0
    }
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Rows sharing a patient and booking timestamp.
struct Booking<'a> {
    patient: &'a str,
    ordered_at: NaiveDateTime,
    rows: Vec<usize>,
}

struct BookingColumns<'a> {
    ids: &'a [Option<String>],
    patients: &'a [Option<String>],
    times: &'a [Option<NaiveDateTime>],
}

impl<'a> BookingColumns<'a> {
    fn load(
        table: &'a Table,
        columns: &ReferralColumns,
        operation: &str,
        diagnostics: &mut Diagnostics,
    ) -> Option<Self> {
        let ids = table.text_column(&columns.identifier);
        let patients = table.text_column(&columns.patient_id);
        let times = table.timestamp_column(&columns.ordered_at);
        let missing = |column: &str| Diagnostic::MissingColumn {
            operation: operation.into(),
            table: table.name().into(),
            column: column.into(),
        };
        match (ids, patients, times) {
            (Ok(ids), Ok(patients), Ok(times)) => Some(Self { ids, patients, times }),
            (Err(_), _, _) => {
                diagnostics.push(missing(&columns.identifier));
                None
            }
            (_, Err(_), _) => {
                diagnostics.push(missing(&columns.patient_id));
                None
            }
            (_, _, Err(_)) => {
                diagnostics.push(missing(&columns.ordered_at));
                None
            }
        }
    }

    /// Patients in first-appearance order, each patient's bookings by
    /// ascending timestamp, rows in table order.
    fn bookings(&self) -> Vec<Booking<'a>> {
        let mut order: Vec<&'a str> = Vec::new();
        let mut by_patient: HashMap<&'a str, BTreeMap<NaiveDateTime, Vec<usize>>> = HashMap::new();
        for row in 0..self.ids.len() {
            let (Some(patient), Some(at)) = (clean(self.patients[row].as_deref()), self.times[row]) else {
                continue;
            };
            let slots = by_patient.entry(patient).or_insert_with(|| {
                order.push(patient);
                BTreeMap::new()
            });
            slots.entry(at).or_default().push(row);
        }

        let mut out = Vec::new();
        for patient in order {
            if let Some(slots) = by_patient.remove(patient) {
                for (ordered_at, rows) in slots {
                    out.push(Booking { patient, ordered_at, rows });
                }
            }
        }
        out
    }

    /// Distinct identifiers of `rows` in encounter order.
    fn identifiers(&self, rows: &[usize]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for &row in rows {
            if let Some(id) = clean(self.ids[row].as_deref()) {
                if !out.iter().any(|x| x == id) {
                    out.push(id.to_string());
                }
            }
        }
        out
    }
}

/// Read-only listing of a booking group that carries several identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateBooking {
    pub patient: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub ordered_at: NaiveDateTime,
    pub identifiers: Vec<String>,
}

/// Booking groups (same patient, same timestamp) with more than one identifier.
pub fn scan_same_time(
    referral: &Table,
    columns: &ReferralColumns,
    diagnostics: &mut Diagnostics,
) -> Vec<DuplicateBooking> {
    let Some(cols) = BookingColumns::load(referral, columns, "same-time scan", diagnostics) else {
        return Vec::new();
    };
    cols.bookings()
        .into_iter()
        .filter_map(|b| {
            let identifiers = cols.identifiers(&b.rows);
            (identifiers.len() > 1).then(|| DuplicateBooking {
                patient: b.patient.to_string(),
                ordered_at: b.ordered_at,
                identifiers,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SameDayBooking {
    pub patient: String,
    pub date: NaiveDate,
    /// `(timestamp, identifier)` pairs, by timestamp then identifier.
    pub bookings: Vec<(String, String)>,
}

/// Patients with different identifiers booked on the same calendar day at
/// different times. Such bookings are never rewritten, only listed.
pub fn scan_same_day(
    referral: &Table,
    columns: &ReferralColumns,
    diagnostics: &mut Diagnostics,
) -> Vec<SameDayBooking> {
    let Some(cols) = BookingColumns::load(referral, columns, "same-day scan", diagnostics) else {
        return Vec::new();
    };

    let mut days: Vec<(&str, NaiveDate, Vec<(NaiveDateTime, String)>)> = Vec::new();
    for booking in cols.bookings() {
        let date = booking.ordered_at.date();
        let ids = cols.identifiers(&booking.rows);
        let entries = ids.into_iter().map(|id| (booking.ordered_at, id));
        let same_day = matches!(days.last(), Some((p, d, _)) if *p == booking.patient && *d == date);
        match days.last_mut() {
            Some(last) if same_day => last.2.extend(entries),
            _ => days.push((booking.patient, date, entries.collect())),
        }
    }

    days.into_iter()
        .filter_map(|(patient, date, mut list)| {
            list.sort();
            list.dedup();
            let first_time = list.first()?.0;
            let several_times = list.iter().any(|(t, _)| *t != first_time);
            let first_id = &list.first()?.1;
            let several_ids = list.iter().any(|(_, id)| id != first_id);
            (several_times && several_ids).then(|| SameDayBooking {
                patient: patient.to_string(),
                date,
                bookings: list
                    .into_iter()
                    .map(|(t, id)| (t.format(TIMESTAMP_FORMAT).to_string(), id))
                    .collect(),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

enum Decision {
    /// Rows carrying an identifier in `from` take `to`.
    Rewrite {
        to: String,
        from: Vec<String>,
        by_operator: bool,
    },
    Leave(UnresolvedReason),
}

/// Repair split bookings in `referral` using `dose` as ground truth.
///
/// The confirmation column is computed first if the referral table does not
/// carry one. Legacy dose identifiers are migrated either way. After any
/// rewrite the confirmation column is recomputed, so the result is a fixed
/// point: resolving it again changes nothing. Missing columns skip
/// resolution and return the input unchanged.
pub fn resolve(
    referral: &Table,
    dose: &Table,
    config: &ReconConfig,
    strategy: &mut dyn ResolutionStrategy,
    diagnostics: &mut Diagnostics,
) -> Result<(Table, ResolutionReport), ReconError> {
    let columns = &config.referral.columns;
    let mut report = ResolutionReport::default();

    let (referral, dose) = if referral.has_column(&columns.confirmed) {
        (referral.clone(), matcher::normalize_dose(dose, config, diagnostics))
    } else {
        matcher::confirm_referrals(referral, dose, config, diagnostics)
    };

    if referral.flag_column(&columns.confirmed).is_err() {
        diagnostics.push(Diagnostic::MissingColumn {
            operation: "duplicate resolution".into(),
            table: referral.name().into(),
            column: columns.confirmed.clone(),
        });
        report.skipped = true;
        return Ok((referral, report));
    }
    let Some(cols) = BookingColumns::load(&referral, columns, "duplicate resolution", diagnostics) else {
        report.skipped = true;
        return Ok((referral.clone(), report));
    };
    let flags = referral.flag_column(&columns.confirmed)?;
    let descriptions = referral.text_column(&columns.description).ok();

    let mut rewritten_ids: Vec<Option<String>> = cols.ids.to_vec();

    for booking in cols.bookings() {
        let identifiers = cols.identifiers(&booking.rows);
        if identifiers.len() < 2 {
            continue;
        }

        let decision = match partition(&cols, flags, &booking.rows, &identifiers) {
            None => Decision::Leave(UnresolvedReason::InconsistentConfirmation),
            Some((confirmed, _)) if confirmed.is_empty() => Decision::Leave(UnresolvedReason::NoneConfirmed),
            Some((confirmed, unconfirmed)) if unconfirmed.is_empty() => {
                diagnostics.push(Diagnostic::HardAmbiguity {
                    patient: booking.patient.to_string(),
                    ordered_at: booking.ordered_at,
                    confirmed,
                    unconfirmed,
                });
                Decision::Leave(UnresolvedReason::AllConfirmed)
            }
            Some((mut confirmed, unconfirmed)) if confirmed.len() == 1 => Decision::Rewrite {
                to: confirmed.remove(0),
                from: unconfirmed,
                by_operator: false,
            },
            Some((confirmed, unconfirmed)) => {
                let group = AmbiguousGroup {
                    patient: booking.patient.to_string(),
                    ordered_at: booking.ordered_at,
                    descriptions: describe(&cols, descriptions, &booking.rows, &identifiers),
                    confirmed,
                    unconfirmed,
                    rejected: Vec::new(),
                };
                ask_operator(group, strategy, diagnostics)
            }
        };

        let outcome = match decision {
            Decision::Leave(reason) => {
                if !matches!(reason, UnresolvedReason::AllConfirmed | UnresolvedReason::MultipleConfirmed) {
                    diagnostics.push(Diagnostic::UnresolvedGroup {
                        patient: booking.patient.to_string(),
                        ordered_at: booking.ordered_at,
                        identifiers: identifiers.clone(),
                        reason,
                    });
                }
                GroupOutcome::Unresolved { reason }
            }
            Decision::Rewrite { to, from, by_operator } => {
                for &row in &booking.rows {
                    if clean(rewritten_ids[row].as_deref()).is_some_and(|id| from.iter().any(|f| f == id)) {
                        rewritten_ids[row] = Some(to.clone());
                    }
                }
                tracing::debug!(from = ?from, to = %to, by_operator, "booking group rewritten");
                if by_operator {
                    GroupOutcome::OperatorRewritten { from, to }
                } else {
                    GroupOutcome::Rewritten { from, to }
                }
            }
        };

        report.groups.push(GroupReport {
            patient: booking.patient.to_string(),
            ordered_at: booking.ordered_at,
            identifiers,
            outcome,
        });
    }

    tracing::info!(
        groups = report.groups.len(),
        rewritten = report.rewritten(),
        unresolved = report.unresolved(),
        "duplicate resolution finished"
    );

    if !report.changed() {
        return Ok((referral, report));
    }

    let updated = referral.clone().with_column(Column::new(
        columns.identifier.clone(),
        ColumnData::Text(rewritten_ids),
    ))?;
    let updated = matcher::annotate_membership(
        &updated,
        &columns.identifier,
        &dose,
        &config.dose.columns.identifier,
        &columns.confirmed,
        diagnostics,
    );
    Ok((updated, report))
}

/// Split a group's identifiers into confirmed and unconfirmed. `None` when
/// rows of one identifier disagree.
fn partition(
    cols: &BookingColumns<'_>,
    flags: &[bool],
    rows: &[usize],
    identifiers: &[String],
) -> Option<(Vec<String>, Vec<String>)> {
    let mut confirmed = Vec::new();
    let mut unconfirmed = Vec::new();
    for id in identifiers {
        let mut statuses = rows
            .iter()
            .filter(|&&row| clean(cols.ids[row].as_deref()) == Some(id.as_str()))
            .map(|&row| flags[row]);
        let first = statuses.next()?;
        if statuses.any(|s| s != first) {
            return None;
        }
        if first {
            confirmed.push(id.clone());
        } else {
            unconfirmed.push(id.clone());
        }
    }
    Some((confirmed, unconfirmed))
}

fn describe(
    cols: &BookingColumns<'_>,
    descriptions: Option<&[Option<String>]>,
    rows: &[usize],
    identifiers: &[String],
) -> Vec<(String, Vec<String>)> {
    identifiers
        .iter()
        .map(|id| {
            let texts = rows
                .iter()
                .filter(|&&row| clean(cols.ids[row].as_deref()) == Some(id.as_str()))
                .filter_map(|&row| descriptions.and_then(|d| d[row].clone()))
                .collect();
            (id.clone(), texts)
        })
        .collect()
}

/// Offer the group until the strategy returns a confirmed identifier or gives up.
fn ask_operator(
    mut group: AmbiguousGroup,
    strategy: &mut dyn ResolutionStrategy,
    diagnostics: &mut Diagnostics,
) -> Decision {
    loop {
        let Some(choice) = strategy.choose(&group) else {
            diagnostics.push(Diagnostic::HardAmbiguity {
                patient: group.patient,
                ordered_at: group.ordered_at,
                confirmed: group.confirmed,
                unconfirmed: group.unconfirmed,
            });
            return Decision::Leave(UnresolvedReason::MultipleConfirmed);
        };
        let choice = choice.trim().to_string();
        if group.confirmed.contains(&choice) {
            return Decision::Rewrite {
                to: choice,
                from: group.unconfirmed,
                by_operator: true,
            };
        }
        diagnostics.push(Diagnostic::InvalidChoice {
            patient: group.patient.clone(),
            ordered_at: group.ordered_at,
            choice: choice.clone(),
            valid: group.confirmed.clone(),
        });
        group.rejected.push(choice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn config() -> ReconConfig {
        ReconConfig::from_toml(
            r#"
name = "t"
[referral]
file = "r.csv"
[dose]
file = "d.csv"
"#,
        )
        .unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 10).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn referral(rows: &[(&str, NaiveDateTime, &str, &str)]) -> Table {
        Table::from_columns(
            "referral",
            vec![
                Column::text("Pasient", rows.iter().map(|r| Some(r.0)).collect()),
                Column::new(
                    "Bestilt dato og tidspunkt",
                    ColumnData::Timestamp(rows.iter().map(|r| Some(r.1)).collect()),
                ),
                Column::text("Henvisnings-ID", rows.iter().map(|r| Some(r.2)).collect()),
                Column::text("Beskrivelse", rows.iter().map(|r| Some(r.3)).collect()),
            ],
        )
        .unwrap()
    }

    fn dose(ids: &[&str]) -> Table {
        Table::from_columns(
            "dose",
            vec![Column::text("Accession Number", ids.iter().map(|i| Some(*i)).collect())],
        )
        .unwrap()
    }

    fn ids(t: &Table) -> Vec<&str> {
        t.text_column("Henvisnings-ID")
            .unwrap()
            .iter()
            .map(|v| v.as_deref().unwrap_or(""))
            .collect()
    }

    fn two_ids() -> Table {
        referral(&[("P1", at(9, 0), "A1", "RG Thorax"), ("P1", at(9, 0), "A2", "RG Abdomen")])
    }

    #[test]
    fn single_confirmed_identifier_absorbs_the_group() {
        let mut d = Diagnostics::new();
        let (out, report) = resolve(&two_ids(), &dose(&["A1"]), &config(), &mut NonInteractive, &mut d).unwrap();
        assert_eq!(ids(&out), vec!["A1", "A1"]);
        assert_eq!(out.flag_column("is_confirmed_in_dose_source").unwrap(), &[true, true]);
        assert_eq!(
            report.groups[0].outcome,
            GroupOutcome::Rewritten {
                from: vec!["A2".into()],
                to: "A1".into()
            }
        );
        assert!(d.is_empty());
    }

    #[test]
    fn no_confirmed_identifier_is_unresolved() {
        let mut d = Diagnostics::new();
        let (out, report) = resolve(&two_ids(), &dose(&["Z9"]), &config(), &mut NonInteractive, &mut d).unwrap();
        assert_eq!(ids(&out), vec!["A1", "A2"]);
        assert_eq!(
            report.groups[0].outcome,
            GroupOutcome::Unresolved {
                reason: UnresolvedReason::NoneConfirmed
            }
        );
        assert_eq!(d.count_kind("unresolved_group"), 1);
    }

    #[test]
    fn all_confirmed_is_hard_ambiguity_without_prompt() {
        let mut asked = 0;
        let mut strategy = |_: &AmbiguousGroup| {
            asked += 1;
            Some("A1".to_string())
        };
        let mut d = Diagnostics::new();
        let (out, report) = resolve(&two_ids(), &dose(&["A1", "A2"]), &config(), &mut strategy, &mut d).unwrap();
        assert_eq!(asked, 0);
        assert_eq!(ids(&out), vec!["A1", "A2"]);
        assert_eq!(report.unresolved(), 1);
        assert_eq!(d.count_kind("hard_ambiguity"), 1);
    }

    fn three_ids() -> Table {
        referral(&[
            ("P1", at(9, 0), "A1", "RG Thorax"),
            ("P1", at(9, 0), "A2", "RG Abdomen"),
            ("P1", at(9, 0), "A3", "RG Bekken"),
        ])
    }

    #[test]
    fn multiple_confirmed_without_operator_is_reported() {
        let mut d = Diagnostics::new();
        let (out, report) =
            resolve(&three_ids(), &dose(&["A1", "A2"]), &config(), &mut NonInteractive, &mut d).unwrap();
        assert_eq!(ids(&out), vec!["A1", "A2", "A3"]);
        assert_eq!(
            report.groups[0].outcome,
            GroupOutcome::Unresolved {
                reason: UnresolvedReason::MultipleConfirmed
            }
        );
        match d.iter().next().unwrap() {
            Diagnostic::HardAmbiguity { confirmed, unconfirmed, .. } => {
                assert_eq!(confirmed, &vec!["A1".to_string(), "A2".to_string()]);
                assert_eq!(unconfirmed, &vec!["A3".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        };
    }

    #[test]
    fn operator_choice_is_validated_and_reprompted() {
        let mut answers = vec!["A3".to_string(), " A2 ".to_string()].into_iter();
        let mut seen_rejected = Vec::new();
        let mut strategy = |g: &AmbiguousGroup| {
            seen_rejected.push(g.rejected.clone());
            answers.next()
        };
        let mut d = Diagnostics::new();
        let (out, report) = resolve(&three_ids(), &dose(&["A1", "A2"]), &config(), &mut strategy, &mut d).unwrap();
        assert_eq!(ids(&out), vec!["A1", "A2", "A2"]);
        assert_eq!(
            report.groups[0].outcome,
            GroupOutcome::OperatorRewritten {
                from: vec!["A3".into()],
                to: "A2".into()
            }
        );
        assert_eq!(seen_rejected, vec![vec![], vec!["A3".to_string()]]);
        assert_eq!(d.count_kind("invalid_choice"), 1);
    }

    #[test]
    fn operator_choice_keeps_other_confirmed_identifiers() {
        let t = referral(&[
            ("P1", at(9, 0), "A1", "RG Thorax"),
            ("P1", at(9, 0), "A1", "RG Thorax sidebilde"),
            ("P1", at(9, 0), "A2", "RG Abdomen"),
            ("P1", at(9, 0), "A3", "RG Bekken"),
            ("P1", at(9, 0), "A4", "RG Hofte"),
        ]);
        let mut strategy = |_: &AmbiguousGroup| Some("A1".to_string());
        let mut d = Diagnostics::new();
        let (out, _) = resolve(&t, &dose(&["A1", "A2"]), &config(), &mut strategy, &mut d).unwrap();
        assert_eq!(ids(&out), vec!["A1", "A1", "A2", "A1", "A1"]);
        assert_eq!(
            out.flag_column("is_confirmed_in_dose_source").unwrap(),
            &[true, true, true, true, true]
        );
    }

    #[test]
    fn annotated_referral_keeps_legacy_matches() {
        let t = referral(&[
            ("P1", at(9, 0), "A1", "x"),
            ("P1", at(9, 0), "A2", "y"),
            ("P2", at(10, 0), "MIGR_1234567", "z"),
        ]);
        let cfg = config();
        let raw_dose = dose(&["A1", "1234567"]);
        let (annotated, _) = matcher::confirm_referrals(&t, &raw_dose, &cfg, &mut Diagnostics::new());
        assert_eq!(
            annotated.flag_column("is_confirmed_in_dose_source").unwrap(),
            &[true, false, true]
        );

        let mut d = Diagnostics::new();
        let (out, report) = resolve(&annotated, &raw_dose, &cfg, &mut NonInteractive, &mut d).unwrap();
        assert_eq!(report.rewritten(), 1);
        assert_eq!(ids(&out), vec!["A1", "A1", "MIGR_1234567"]);
        assert_eq!(out.flag_column("is_confirmed_in_dose_source").unwrap(), &[true, true, true]);
        assert_eq!(d.count_kind("legacy_identifiers_migrated"), 1);
    }

    #[test]
    fn confirmation_column_of_wrong_type_is_reported() {
        let t = two_ids()
            .with_column(Column::text("is_confirmed_in_dose_source", vec![Some("yes"), Some("no")]))
            .unwrap();
        let mut d = Diagnostics::new();
        let (out, report) = resolve(&t, &dose(&["A1"]), &config(), &mut NonInteractive, &mut d).unwrap();
        assert!(report.skipped);
        assert_eq!(out, t);
        assert_eq!(d.count_kind("missing_column"), 1);
    }

    #[test]
    fn operator_sees_descriptions() {
        let mut captured = None;
        let mut strategy = |g: &AmbiguousGroup| {
            captured = Some(g.descriptions.clone());
            None
        };
        resolve(&three_ids(), &dose(&["A1", "A2"]), &config(), &mut strategy, &mut Diagnostics::new()).unwrap();
        let captured = captured.unwrap();
        assert_eq!(captured[2], ("A3".to_string(), vec!["RG Bekken".to_string()]));
    }

    #[test]
    fn resolve_is_idempotent() {
        let cfg = config();
        let d = dose(&["A1"]);
        let (once, _) = resolve(&two_ids(), &d, &cfg, &mut NonInteractive, &mut Diagnostics::new()).unwrap();
        let (twice, report) = resolve(&once, &d, &cfg, &mut NonInteractive, &mut Diagnostics::new()).unwrap();
        assert_eq!(once, twice);
        assert!(report.groups.is_empty());
    }

    #[test]
    fn inconsistent_confirmation_leaves_group() {
        let t = referral(&[
            ("P1", at(9, 0), "A1", "x"),
            ("P1", at(9, 0), "A1", "y"),
            ("P1", at(9, 0), "A2", "z"),
        ])
        .with_column(Column::new(
            "is_confirmed_in_dose_source",
            ColumnData::Flag(vec![true, false, false]),
        ))
        .unwrap();
        let mut d = Diagnostics::new();
        let (out, report) = resolve(&t, &dose(&["A1"]), &config(), &mut NonInteractive, &mut d).unwrap();
        assert_eq!(out, t);
        assert_eq!(
            report.groups[0].outcome,
            GroupOutcome::Unresolved {
                reason: UnresolvedReason::InconsistentConfirmation
            }
        );
        assert_eq!(d.count_kind("unresolved_group"), 1);
    }

    #[test]
    fn different_timestamps_are_separate_groups() {
        let t = referral(&[("P1", at(9, 0), "A1", "x"), ("P1", at(9, 5), "A2", "y")]);
        let (out, report) = resolve(&t, &dose(&["A1"]), &config(), &mut NonInteractive, &mut Diagnostics::new()).unwrap();
        assert_eq!(ids(&out), vec!["A1", "A2"]);
        assert!(report.groups.is_empty());
    }

    #[test]
    fn missing_patient_column_skips() {
        let t = Table::from_columns("referral", vec![Column::text("Henvisnings-ID", vec![Some("A1")])]).unwrap();
        let mut d = Diagnostics::new();
        let (_, report) = resolve(&t, &dose(&["A1"]), &config(), &mut NonInteractive, &mut d).unwrap();
        assert!(report.skipped);
        assert_eq!(d.count_kind("missing_column"), 1);
    }

    #[test]
    fn same_time_scan_lists_groups() {
        let t = referral(&[
            ("P1", at(9, 0), "A1", "x"),
            ("P1", at(9, 0), "A2", "y"),
            ("P2", at(9, 0), "B1", "z"),
        ]);
        let found = scan_same_time(&t, &config().referral.columns, &mut Diagnostics::new());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].identifiers, vec!["A1", "A2"]);
    }

    #[test]
    fn same_day_scan_needs_different_times_and_ids() {
        let t = referral(&[
            ("P1", at(9, 0), "A1", "x"),
            ("P1", at(13, 30), "A2", "y"),
            ("P2", at(8, 0), "B1", "z"),
            ("P2", at(10, 0), "B1", "z"),
        ]);
        let found = scan_same_day(&t, &config().referral.columns, &mut Diagnostics::new());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].patient, "P1");
        assert_eq!(
            found[0].bookings,
            vec![
                ("2024-01-10 09:00:00".to_string(), "A1".to_string()),
                ("2024-01-10 13:30:00".to_string(), "A2".to_string()),
            ]
        );
    }
}
