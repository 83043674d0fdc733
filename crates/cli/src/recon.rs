//! `dosematch run` and `dosematch validate`.

use std::io;
use std::path::PathBuf;

use dosematch_recon::config::ResolutionMode;
use dosematch_recon::diagnostics::Severity;
use dosematch_recon::{run, NonInteractive, ReconOutput};

use crate::console::ConsoleStrategy;
use crate::exit_codes::EXIT_CONFLICTS;
use crate::output::{self, OutputPaths};
use crate::CliError;

pub struct RunArgs {
    pub config: PathBuf,
    pub interactive: bool,
    pub json: bool,
    pub output: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub strict: bool,
    pub quiet: bool,
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let (config, base) = dosematch_io::load_config(&args.config).map_err(CliError::from_io)?;
    let rules = dosematch_io::load_rules(&config, &base).map_err(CliError::from_io)?;
    let input = dosematch_io::load_input(&config, &base).map_err(CliError::from_io)?;

    let interactive = args.interactive || config.resolution.mode == ResolutionMode::Interactive;
    let result: ReconOutput = if interactive {
        let stdin = io::stdin();
        let mut strategy = ConsoleStrategy::new(stdin.lock(), io::stderr());
        run(&config, &input, rules.as_ref(), &mut strategy)
    } else {
        run(&config, &input, rules.as_ref(), &mut NonInteractive)
    }
    .map_err(CliError::from_recon)?;

    let out_base = args.out_dir.as_deref().unwrap_or(&base);
    let paths = OutputPaths::resolve(&config.output, out_base);
    output::write_outputs(&config, &paths, &result)?;

    if let Some(ref path) = args.output {
        output::write_json(&result.result, path)?;
    }
    if args.json {
        println!("{}", output::to_json(&result.result)?);
    }

    if !args.quiet {
        output::print_diagnostics(&result.result);
        output::print_summary(&result.result, result.merged.as_ref());
    }

    let conflicts = result.result.diagnostics.count(Severity::Conflict);
    if args.strict && conflicts > 0 {
        return Err(CliError::general(format!("{conflicts} conflict(s) reported"))
            .with_code(EXIT_CONFLICTS)
            .with_hint("review the conflicts above; rerun with --interactive to settle hard ambiguities"));
    }
    Ok(())
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let (config, base) = dosematch_io::load_config(&config_path).map_err(CliError::from_io)?;
    let rules = dosematch_io::load_rules(&config, &base).map_err(CliError::from_io)?;

    let mode = match config.resolution.mode {
        _ if !config.resolution.enabled => "disabled",
        ResolutionMode::NonInteractive => "non-interactive",
        ResolutionMode::Interactive => "interactive",
    };
    eprintln!(
        "valid: '{}' (duplicate resolution {mode}, {} classification rule(s))",
        config.name,
        rules.as_ref().map_or(0, |r| r.len()),
    );
    Ok(())
}
