//! `dosematch classify`: run the rule engine over any table.

use std::io::{self, Write};
use std::path::PathBuf;

use dosematch_io::csv::export_table;
use dosematch_io::Schema;
use dosematch_recon::classify::classify;
use dosematch_recon::engine::check_forbidden;
use dosematch_recon::report::category_report;
use dosematch_recon::{Diagnostics, Severity};

use crate::exit_codes::EXIT_CONFLICTS;
use crate::CliError;

pub struct ClassifyArgs {
    pub config: PathBuf,
    pub input: PathBuf,
    pub sheet: Option<String>,
    pub column: Option<String>,
    pub output: Option<PathBuf>,
    pub strict: bool,
    pub quiet: bool,
}

pub fn cmd_classify(args: ClassifyArgs) -> Result<(), CliError> {
    if args.output.as_ref() == Some(&args.input) {
        return Err(CliError::usage("--output must not overwrite the input table"));
    }

    let (config, base) = dosematch_io::load_config(&args.config).map_err(CliError::from_io)?;
    let Some(settings) = config.classification.as_ref() else {
        return Err(CliError::config(format!(
            "{} has no [classification] section",
            args.config.display()
        )));
    };
    let rules = dosematch_io::load_rules(&config, &base)
        .map_err(CliError::from_io)?
        .unwrap_or_default();

    let table = dosematch_io::read_table(&args.input, args.sheet.as_deref(), "input", &Schema::default())
        .map_err(CliError::from_io)?;
    check_forbidden(&config, &table).map_err(CliError::from_recon)?;

    let column = args
        .column
        .unwrap_or_else(|| config.referral.columns.description.clone());
    let mut diagnostics = Diagnostics::new();
    let (classified, report) = classify(&table, &column, &settings.output_column, &rules, &mut diagnostics)
        .map_err(CliError::from_recon)?;

    if let Some(ref path) = args.output {
        export_table(&classified, path).map_err(CliError::from_io)?;
    }

    if !report.skipped {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        category_report(&classified, &settings.output_column, &mut out).map_err(CliError::from_recon)?;
        out.flush().map_err(|e| CliError::io(format!("cannot write report: {e}")))?;
    }

    if !args.quiet {
        for d in &diagnostics {
            eprintln!("{}: {}", d.severity(), d);
        }
        eprintln!(
            "{} row(s), {} rule(s): {} unmapped, {} conflicting, {} dead",
            classified.len(),
            rules.len(),
            report.unmapped,
            report.conflicts(),
            report.dead(),
        );
    }

    let conflicts = diagnostics.count(Severity::Conflict);
    if args.strict && conflicts > 0 {
        return Err(CliError::general(format!("{conflicts} rule conflict(s)")).with_code(EXIT_CONFLICTS));
    }
    Ok(())
}
