//! Logging setup using `tracing` and `tracing-subscriber`.
//!
//! Logs go to stderr so that `--json` stdout stays machine-readable.
//!
//! | Flags  | Level |
//! |--------|-------|
//! | `-q`   | error |
//! | (none) | warn  |
//! | `-v`   | info  |
//! | `-vv`  | debug |
//! | `-vvv` | trace |
//!
//! `RUST_LOG` overrides the flags when set.

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn level_for(verbosity: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(level: Level) {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    // try_init: a second call (tests) is a no-op rather than a panic
    let _ = tracing_subscriber::registry()
        .with(build_env_filter(level))
        .with(layer)
        .try_init();
}

/// `RUST_LOG` wins; otherwise our crates log at `level` and dependencies at warn.
fn build_env_filter(level: Level) -> EnvFilter {
    let level = level.as_str().to_lowercase();
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,dosematch={level},dosematch_cli={level},dosematch_recon={level},dosematch_io={level}"
        ))
    })
}
