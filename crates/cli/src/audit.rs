//! `dosematch audit`: read-only data-quality listing.

use std::path::PathBuf;

use serde::Serialize;

use dosematch_recon::engine::check_forbidden;
use dosematch_recon::matcher::{confirm_doses, confirm_referrals, MembershipStats};
use dosematch_recon::resolver::{scan_same_day, scan_same_time, DuplicateBooking, SameDayBooking};
use dosematch_recon::table::TIMESTAMP_FORMAT;
use dosematch_recon::Diagnostics;

use crate::CliError;

#[derive(Debug, Serialize)]
struct AuditReport {
    config_name: String,
    referral: MembershipStats,
    dose: MembershipStats,
    same_time: Vec<DuplicateBooking>,
    same_day: Vec<SameDayBooking>,
    diagnostics: Diagnostics,
}

pub fn cmd_audit(config_path: PathBuf, json: bool) -> Result<(), CliError> {
    let (config, base) = dosematch_io::load_config(&config_path).map_err(CliError::from_io)?;
    let input = dosematch_io::load_input(&config, &base).map_err(CliError::from_io)?;
    check_forbidden(&config, &input.referral).map_err(CliError::from_recon)?;
    check_forbidden(&config, &input.dose).map_err(CliError::from_recon)?;

    let rc = &config.referral.columns;
    let dc = &config.dose.columns;
    let mut diagnostics = Diagnostics::new();
    let (referral, dose) = confirm_referrals(&input.referral, &input.dose, &config, &mut diagnostics);
    let dose = confirm_doses(&dose, &referral, &config, &mut diagnostics);

    let report = AuditReport {
        config_name: config.name.clone(),
        referral: MembershipStats::of(&referral, &rc.identifier, &rc.confirmed).unwrap_or_default(),
        dose: MembershipStats::of(&dose, &dc.identifier, &dc.confirmed).unwrap_or_default(),
        same_time: scan_same_time(&referral, rc, &mut diagnostics),
        same_day: scan_same_day(&referral, rc, &mut diagnostics),
        diagnostics,
    };

    if json {
        let text = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::general(format!("JSON serialization error: {e}")))?;
        println!("{text}");
    } else {
        print_audit(&report);
    }
    Ok(())
}

fn print_audit(report: &AuditReport) {
    println!("{}", report.config_name);
    println!(
        "referral identifiers: {} ({} not in dose source)",
        report.referral.identifiers, report.referral.unconfirmed
    );
    println!(
        "dose identifiers: {} ({} not in referral source)",
        report.dose.identifiers, report.dose.unconfirmed
    );

    println!();
    println!("same booking, several identifiers: {}", report.same_time.len());
    for b in &report.same_time {
        println!(
            "  {} {}: {}",
            b.patient,
            b.ordered_at.format(TIMESTAMP_FORMAT),
            b.identifiers.join(", ")
        );
    }

    println!();
    println!("same day, several bookings: {}", report.same_day.len());
    for day in &report.same_day {
        println!("  {} {}", day.patient, day.date);
        for (at, id) in &day.bookings {
            println!("    {at}  {id}");
        }
    }

    for d in &report.diagnostics {
        eprintln!("{}: {}", d.severity(), d);
    }
}
