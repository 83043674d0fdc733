//! CLI Exit Code Registry
//!
//! Single source of truth for `dosematch` exit codes. Scripts and scheduled
//! jobs rely on them.
//!
//! | Code | Meaning                                                   |
//! |------|-----------------------------------------------------------|
//! | 0    | Success                                                   |
//! | 1    | General error (engine refused the input)                  |
//! | 2    | CLI usage error (bad arguments)                           |
//! | 3    | Conflicts found (only with `--strict`)                    |
//! | 4    | Invalid config or rules file                              |
//! | 5    | I/O error (unreadable input, unparsable cell, write fail) |
//!
//! clap exits with 2 on its own for argument errors.

/// Command completed. Diagnostics may still have been reported.
pub const EXIT_SUCCESS: u8 = 0;

/// General error, e.g. an input carrying a forbidden column.
pub const EXIT_ERROR: u8 = 1;

/// Bad arguments.
pub const EXIT_USAGE: u8 = 2;

/// `--strict` and the run produced conflict diagnostics (hard ambiguities,
/// rule conflicts, unresolved groups).
pub const EXIT_CONFLICTS: u8 = 3;

/// Config or rules file failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 4;

/// Reading inputs or writing outputs failed.
pub const EXIT_IO: u8 = 5;
