//! `Reporter` sinks for user-facing narration.

use std::io::Write;
use std::sync::Mutex;

use crate::collaborators::Reporter;

/// Forwards narration to `tracing` at info/warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn message(&self, text: &str) {
        tracing::info!(target: "nixpack::report", "{text}");
    }

    fn progress(&self, text: &str) {
        tracing::info!(target: "nixpack::report", progress = true, "{text}");
    }

    fn error(&self, text: &str) {
        tracing::warn!(target: "nixpack::report", "{text}");
    }
}

/// Writes narration to a terminal-like sink, one line per call.
pub struct TerminalReporter<W: Write + Send> {
    out: Mutex<W>,
}

impl TerminalReporter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TerminalReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn line(&self, prefix: &str, text: &str) {
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Narration is fire-and-forget; a closed terminal is not a run failure.
        let _ = writeln!(out, "{prefix} {text}");
    }
}

impl<W: Write + Send> Reporter for TerminalReporter<W> {
    fn message(&self, text: &str) {
        self.line("[nixpack]", text);
    }

    fn progress(&self, text: &str) {
        self.line("[nixpack] ...", text);
    }

    fn error(&self, text: &str) {
        self.line("[nixpack] error:", text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_reporter_lines() {
        let reporter = TerminalReporter::new(Vec::new());
        reporter.message("Selected template: rust");
        reporter.error("outer iteration budget exhausted");
        let out = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "[nixpack] Selected template: rust");
        assert_eq!(lines[1], "[nixpack] error: outer iteration budget exhausted");
    }
}
