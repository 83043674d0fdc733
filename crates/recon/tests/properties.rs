// Property-based tests for matching, resolution and classification.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use proptest::prelude::*;

use dosematch_recon::classify::{classify, RuleSpec, RuleStatus};
use dosematch_recon::config::ReconConfig;
use dosematch_recon::identifier::IdentifierFormat;
use dosematch_recon::matcher::annotate_membership;
use dosematch_recon::resolver::{resolve, AmbiguousGroup, NonInteractive};
use dosematch_recon::{Column, ColumnData, Diagnostics, Mapping, RuleSet, Table};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

fn recon_config() -> ReconConfig {
    ReconConfig::from_toml("name = \"prop\"\n[referral]\nfile = \"r\"\n[dose]\nfile = \"d\"\n").unwrap()
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

fn slot(i: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 4, 1).unwrap().and_hms_opt(8 + i, 0, 0).unwrap()
}

/// Referral row: (patient, timestamp slot, identifier).
fn arb_referral_row() -> impl Strategy<Value = (String, u32, String)> {
    (
        prop::sample::select(vec!["P1", "P2", "P3"]),
        0u32..3,
        prop::sample::select(vec!["A1", "A2", "A3", "A4", "MIGR_1234567"]),
    )
        .prop_map(|(p, t, id)| (p.to_string(), t, id.to_string()))
}

/// Dose identifiers, `1234567` being the legacy form of `MIGR_1234567`.
fn arb_dose_ids() -> impl Strategy<Value = Vec<String>> {
    prop::sample::subsequence(vec!["A1", "A2", "A3", "A4", "1234567", "B1"], 0..6)
        .prop_map(|ids| ids.into_iter().map(String::from).collect())
}

fn referral_table(rows: &[(String, u32, String)]) -> Table {
    Table::from_columns(
        "referral",
        vec![
            Column::text("Pasient", rows.iter().map(|r| Some(r.0.clone())).collect()),
            Column::new(
                "Bestilt dato og tidspunkt",
                ColumnData::Timestamp(rows.iter().map(|r| Some(slot(r.1))).collect()),
            ),
            Column::text("Henvisnings-ID", rows.iter().map(|r| Some(r.2.clone())).collect()),
        ],
    )
    .unwrap()
}

fn dose_table(ids: &[String]) -> Table {
    Table::from_columns(
        "dose",
        vec![Column::text("Accession Number", ids.iter().map(|i| Some(i.clone())).collect())],
    )
    .unwrap()
}

const WORDS: &[&str] = &["rg", "ct", "caput", "thorax", "abdomen", "columna", "lumbal", "hsg"];

fn arb_description() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(WORDS.to_vec()), 1..4).prop_map(|w| w.join(" "))
}

fn arb_rule() -> impl Strategy<Value = RuleSpec> {
    (
        prop::collection::vec(prop::sample::select(WORDS.to_vec()), 1..3),
        prop::option::of(prop::sample::select(WORDS.to_vec())),
        prop::sample::select(vec!["Cat A", "Cat B", "Cat C"]),
    )
        .prop_map(|(include, exclude, category)| {
            let mut terms: Vec<String> = include.into_iter().map(String::from).collect();
            if let Some(ex) = exclude {
                terms.push(format!("~{ex}"));
            }
            RuleSpec {
                criteria: terms.join(" & "),
                category: category.to_string(),
            }
        })
}

fn description_table(descriptions: &[String]) -> Table {
    Table::from_columns(
        "merged",
        vec![Column::text(
            "Beskrivelse",
            descriptions.iter().map(|d| Some(d.clone())).collect(),
        )],
    )
    .unwrap()
}

fn categories(specs: &[RuleSpec], table: &Table) -> (Vec<Mapping>, Vec<RuleStatus>) {
    let rules = RuleSet::from_specs(specs).unwrap();
    let (out, report) = classify(table, "Beskrivelse", "mapped_category", &rules, &mut Diagnostics::new()).unwrap();
    (
        out.category_column("mapped_category").unwrap().to_vec(),
        report.rules.iter().map(|r| r.status).collect(),
    )
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn resolve_is_idempotent(
        rows in prop::collection::vec(arb_referral_row(), 0..12),
        dose_ids in arb_dose_ids(),
    ) {
        let config = recon_config();
        let referral = referral_table(&rows);
        let dose = dose_table(&dose_ids);

        let (once, _) = resolve(&referral, &dose, &config, &mut NonInteractive, &mut Diagnostics::new()).unwrap();
        let (twice, report) = resolve(&once, &dose, &config, &mut NonInteractive, &mut Diagnostics::new()).unwrap();

        prop_assert_eq!(&once, &twice);
        prop_assert!(!report.changed(), "second pass rewrote a group");
    }

    #[test]
    fn resolve_never_merges_confirmed_identifiers(
        rows in prop::collection::vec(arb_referral_row(), 0..12),
        dose_ids in arb_dose_ids(),
        operator in any::<bool>(),
    ) {
        let config = recon_config();
        let referral = referral_table(&rows);
        let known: HashSet<String> = dose_ids.iter().map(|id| config.identifier.migrate(id).into_owned()).collect();

        let mut first_confirmed = |g: &AmbiguousGroup| g.confirmed.first().cloned();
        let dose = dose_table(&dose_ids);
        let (out, _) = if operator {
            resolve(&referral, &dose, &config, &mut first_confirmed, &mut Diagnostics::new()).unwrap()
        } else {
            resolve(&referral, &dose, &config, &mut NonInteractive, &mut Diagnostics::new()).unwrap()
        };
        let before = referral.text_column("Henvisnings-ID").unwrap();
        let after = out.text_column("Henvisnings-ID").unwrap();
        for (b, a) in before.iter().zip(after) {
            if b != a {
                prop_assert!(!known.contains(b.as_deref().unwrap()), "confirmed identifier {:?} was rewritten", b);
                prop_assert!(known.contains(a.as_deref().unwrap()), "rewritten to unconfirmed {:?}", a);
            }
        }
    }

    #[test]
    fn migration_is_idempotent(id in r"[0-9A-Z_]{0,10}") {
        let format = IdentifierFormat::default();
        let once = format.migrate(&id).into_owned();
        let twice = format.migrate(&once).into_owned();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn membership_matches_set(
        ids in prop::collection::vec(prop::sample::select(vec!["A1", "A2", "A3", "B1"]), 0..10),
        dose_ids in arb_dose_ids(),
    ) {
        let source = Table::from_columns("referral", vec![Column::text("id", ids.iter().map(|s| Some(*s)).collect())]).unwrap();
        let out = annotate_membership(&source, "id", &dose_table(&dose_ids), "Accession Number", "hit", &mut Diagnostics::new());
        let flags = out.flag_column("hit").unwrap();
        for (id, flag) in ids.iter().zip(flags) {
            prop_assert_eq!(*flag, dose_ids.iter().any(|d| d == id));
        }
    }

    #[test]
    fn classification_is_deterministic(
        descriptions in prop::collection::vec(arb_description(), 1..15),
        rules in prop::collection::vec(arb_rule(), 0..6),
    ) {
        let table = description_table(&descriptions);
        prop_assert_eq!(categories(&rules, &table), categories(&rules, &table));
    }

    #[test]
    fn rejected_rules_change_nothing(
        descriptions in prop::collection::vec(arb_description(), 1..15),
        rules in prop::collection::vec(arb_rule(), 1..6),
    ) {
        let table = description_table(&descriptions);
        for k in 0..rules.len() {
            let (before, _) = categories(&rules[..k], &table);
            let (after, statuses) = categories(&rules[..=k], &table);
            if statuses[k] != RuleStatus::Applied {
                prop_assert_eq!(&before, &after, "rule {} ({:?}) changed categories", k, statuses[k]);
            } else {
                for (b, a) in before.iter().zip(&after) {
                    prop_assert!(
                        b == a || !b.is_mapped(),
                        "rule {} overwrote {:?} with {:?}", k, b, a
                    );
                }
            }
        }
    }
}
