// dosematch CLI - referral/dose reconciliation and procedure mapping

mod audit;
mod classify;
mod console;
mod exit_codes;
mod logging;
mod output;
mod recon;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dosematch_io::IoError;
use dosematch_recon::ReconError;

use exit_codes::{EXIT_ERROR, EXIT_INVALID_CONFIG, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "dosematch")]
#[command(about = "Reconcile referral and dose-tracking exports and classify procedures")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only print errors
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run matching, duplicate resolution, merge and classification
    #[command(after_help = "\
Exit code 3 with --strict means the run finished but reported conflicts \
(hard ambiguities, unresolved booking groups or conflicting rules).

Examples:
  dosematch run ir-lab.recon.toml
  dosematch run ir-lab.recon.toml --interactive
  dosematch run ir-lab.recon.toml --json > result.json
  dosematch run ir-lab.recon.toml --out-dir results/2024-03 --strict")]
    Run {
        /// Path to the .recon.toml config file
        config: PathBuf,

        /// Ask the operator to settle hard-ambiguous booking groups
        #[arg(long, env = "DOSEMATCH_INTERACTIVE")]
        interactive: bool,

        /// Print the JSON result to stdout
        #[arg(long)]
        json: bool,

        /// Write the JSON result to a file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Directory for the [output] files (default: the config's directory)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Exit 3 when the run reported conflicts
        #[arg(long)]
        strict: bool,
    },

    /// Validate a config and its rules file without reading any data
    #[command(after_help = "\
Examples:
  dosematch validate ir-lab.recon.toml")]
    Validate {
        /// Path to the .recon.toml config file
        config: PathBuf,
    },

    /// Classify the descriptions of any table with the config's rules
    #[command(after_help = "\
Examples:
  dosematch classify ir-lab.recon.toml merged.csv
  dosematch classify ir-lab.recon.toml ids7.xlsx --sheet Export --column Beskrivelse
  dosematch classify ir-lab.recon.toml merged.csv --output classified.csv")]
    Classify {
        /// Path to the .recon.toml config file (its [classification] section is used)
        config: PathBuf,

        /// Table to classify (csv, tsv, xlsx, xls, ods)
        input: PathBuf,

        /// Worksheet for workbook inputs
        #[arg(long)]
        sheet: Option<String>,

        /// Description column (default: the referral description column)
        #[arg(long)]
        column: Option<String>,

        /// Write the classified table (category column first)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Exit 3 when rules conflicted
        #[arg(long)]
        strict: bool,
    },

    /// List membership counts and split bookings without changing anything
    #[command(after_help = "\
Examples:
  dosematch audit ir-lab.recon.toml
  dosematch audit ir-lab.recon.toml --json")]
    Audit {
        /// Path to the .recon.toml config file
        config: PathBuf,

        /// Print the audit as JSON to stdout
        #[arg(long)]
        json: bool,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  dosematch-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(logging::level_for(cli.verbose, cli.quiet));

    let result = match cli.command {
        Commands::Run {
            config,
            interactive,
            json,
            output,
            out_dir,
            strict,
        } => recon::cmd_run(recon::RunArgs {
            config,
            interactive,
            json,
            output,
            out_dir,
            strict,
            quiet: cli.quiet,
        }),
        Commands::Validate { config } => recon::cmd_validate(config),
        Commands::Classify {
            config,
            input,
            sheet,
            column,
            output,
            strict,
        } => classify::cmd_classify(classify::ClassifyArgs {
            config,
            input,
            sheet,
            column,
            output,
            strict,
            quiet: cli.quiet,
        }),
        Commands::Audit { config, json } => audit::cmd_audit(config, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn general(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_INVALID_CONFIG, message: msg.into(), hint: None }
    }

    pub fn with_code(mut self, code: u8) -> Self {
        self.code = code;
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn from_recon(err: ReconError) -> Self {
        let message = err.to_string();
        match err {
            ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) | ReconError::InvalidRule { .. } => {
                Self::config(message)
            }
            ReconError::ForbiddenColumn { .. } => Self::general(message)
                .with_hint("remove the column from the export; direct patient identifiers are not processed"),
            ReconError::Write(_) => Self::io(message),
            _ => Self::general(message),
        }
    }

    pub fn from_io(err: IoError) -> Self {
        match err {
            IoError::Table(inner) => Self::from_recon(inner),
            IoError::SheetNotFound { ref available, .. } => {
                let hint = format!("set `sheet` to one of: {}", available.join(", "));
                Self::io(err.to_string()).with_hint(hint)
            }
            IoError::DateParse { .. } => {
                Self::io(err.to_string()).with_hint("add the export's format to `timestamp_formats`")
            }
            other => Self::io(other.to_string()),
        }
    }
}
