//! `dosematch-recon`: referral/dose reconciliation and procedure classification engine.
//!
//! Pure engine crate: receives pre-loaded tables, returns annotated tables,
//! a merged procedure table and structured diagnostics.
//! No CLI or file IO dependencies.

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod identifier;
pub mod matcher;
pub mod model;
pub mod report;
pub mod resolver;
pub mod table;

pub use classify::RuleSet;
pub use config::ReconConfig;
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use engine::run;
pub use error::ReconError;
pub use model::{Mapping, ReconInput, ReconOutput, ReconResult};
pub use resolver::{AmbiguousGroup, NonInteractive, ResolutionStrategy};
pub use table::{Column, ColumnData, Table};
