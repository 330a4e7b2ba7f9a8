//! Accumulates diagnostics across a phase.

use super::{Diagnostic, DiagnosticList, sort_diagnostics};

/// Collects diagnostics while a phase keeps going after a finding.
///
/// Parsing and linting never stop at the first defect. Each finding is
/// emitted here and the sorted result is taken with [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic.
    pub fn emit(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Record every diagnostic from `diagnostics`.
    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    /// Returns `true` if any collected diagnostic is an error.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Consume the collector, returning the diagnostics in reporting order.
    pub fn finish(mut self) -> Vec<Diagnostic> {
        sort_diagnostics(&mut self.diagnostics);
        self.diagnostics
    }

    /// Consume the collector, returning `Err` when any error was collected.
    ///
    /// Warnings alone yield `Ok` with the sorted warnings.
    pub fn into_result(self) -> Result<Vec<Diagnostic>, DiagnosticList> {
        if self.has_errors() {
            Err(DiagnosticList::new(self.finish()))
        } else {
            Ok(self.finish())
        }
    }
}
