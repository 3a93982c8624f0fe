//! Where diagnostics go.
//!
//! The orchestrator never prints directly; it emits through a
//! [`ReportContext`] holding any number of [`DiagnosticWriter`]s.

use crate::report::{Category, Diagnostic};
use std::sync::{Arc, Mutex};

pub trait DiagnosticWriter: Send + Sync {
    fn write_diagnostic(&self, diagnostic: &Diagnostic);

    /// Receives the plain-text summary once per scan. Ignored by default.
    fn write_summary(&self, _summary: &str) {}
}

/// Prints diagnostics to stdout, where build hosts pick them up.
pub struct ConsoleWriter {
    pub print_summary: bool,
}

impl DiagnosticWriter for ConsoleWriter {
    fn write_diagnostic(&self, diagnostic: &Diagnostic) {
        println!("{}", diagnostic);
    }

    fn write_summary(&self, summary: &str) {
        if self.print_summary {
            println!("{}", summary);
        }
    }
}

/// Mirrors diagnostics into the log.
pub struct TracingWriter;

impl DiagnosticWriter for TracingWriter {
    fn write_diagnostic(&self, diagnostic: &Diagnostic) {
        match diagnostic.category {
            Category::Error => tracing::error!(code = %diagnostic.code, "{}", diagnostic.message),
            Category::Warning => tracing::warn!(code = %diagnostic.code, "{}", diagnostic.message),
        }
    }
}

/// Collects rendered lines in memory.
#[derive(Clone, Default)]
pub struct MemoryWriter {
    lines: Arc<Mutex<Vec<String>>>,
    summaries: Arc<Mutex<Vec<String>>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn summaries(&self) -> Vec<String> {
        self.summaries.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl DiagnosticWriter for MemoryWriter {
    fn write_diagnostic(&self, diagnostic: &Diagnostic) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(diagnostic.to_string());
        }
    }

    fn write_summary(&self, summary: &str) {
        if let Ok(mut summaries) = self.summaries.lock() {
            summaries.push(summary.to_string());
        }
    }
}

/// The set of writers a scan reports through.
#[derive(Default)]
pub struct ReportContext {
    writers: Vec<Box<dyn DiagnosticWriter>>,
}

impl ReportContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_writer(mut self, writer: impl DiagnosticWriter + 'static) -> Self {
        self.writers.push(Box::new(writer));
        self
    }

    pub fn emit(&self, diagnostic: &Diagnostic) {
        for writer in &self.writers {
            writer.write_diagnostic(diagnostic);
        }
    }

    pub fn emit_summary(&self, summary: &str) {
        for writer in &self.writers {
            writer.write_summary(summary);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_fans_out_to_every_writer() {
        let first = MemoryWriter::new();
        let second = MemoryWriter::new();
        let context = ReportContext::new()
            .with_writer(first.clone())
            .with_writer(second.clone());

        context.emit(&Diagnostic::fatal("app/vulngate.deps", "boom"));
        context.emit_summary("done");

        let expected = vec!["app/vulngate.deps(1,1): error VG9999: boom".to_string()];
        assert_eq!(first.lines(), expected);
        assert_eq!(second.lines(), expected);
        assert_eq!(first.summaries(), vec!["done".to_string()]);
    }
}
