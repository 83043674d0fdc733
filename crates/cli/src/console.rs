//! Operator prompt for hard-ambiguous booking groups.

use std::io::{BufRead, Write};

use dosematch_recon::table::TIMESTAMP_FORMAT;
use dosematch_recon::{AmbiguousGroup, ResolutionStrategy};

/// Shows each ambiguous group on `output` and reads the chosen identifier from
/// `input`. An empty line or end of input leaves the group unresolved.
pub struct ConsoleStrategy<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ConsoleStrategy<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn show(&mut self, group: &AmbiguousGroup) -> std::io::Result<()> {
        let out = &mut self.output;
        writeln!(out)?;
        writeln!(
            out,
            "Patient {} booked {} under several identifiers:",
            group.patient,
            group.ordered_at.format(TIMESTAMP_FORMAT)
        )?;
        for (id, descriptions) in &group.descriptions {
            let status = if group.confirmed.contains(id) {
                "confirmed"
            } else {
                "unconfirmed"
            };
            writeln!(out, "  {id} ({status}): {}", descriptions.join(", "))?;
        }
        Ok(())
    }

    fn prompt(&mut self, group: &AmbiguousGroup) -> std::io::Result<Option<String>> {
        match group.rejected.last() {
            None => self.show(group)?,
            Some(bad) => writeln!(self.output, "'{bad}' is not a confirmed identifier of this booking.")?,
        }
        write!(
            self.output,
            "Identifier that keeps the unconfirmed rows [{}] (empty to skip): ",
            group.confirmed.join(", ")
        )?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let choice = line.trim();
        Ok((!choice.is_empty()).then(|| choice.to_string()))
    }
}

impl<R: BufRead, W: Write> ResolutionStrategy for ConsoleStrategy<R, W> {
    fn choose(&mut self, group: &AmbiguousGroup) -> Option<String> {
        match self.prompt(group) {
            Ok(choice) => choice,
            Err(e) => {
                tracing::warn!(error = %e, "operator prompt failed; group left unresolved");
                None
            }
        }
    }
}
