//! The DiagnosticList type for wrapping phase failures.
//!
//! [`DiagnosticList`] wraps one or more [`Diagnostic`]s and is the error type
//! of validation and compilation.

use std::fmt;

use crate::error::{Diagnostic, ErrorCode};

/// Error type for a phase that failed as a whole.
///
/// Wraps one or more diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiagnosticList {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticList {
    /// Create a new list from diagnostics.
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        Self { diagnostics }
    }

    /// Get all diagnostics in this list.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Returns `true` if any diagnostic has error severity.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Returns `true` if any diagnostic carries `code`.
    pub fn contains(&self, code: ErrorCode) -> bool {
        self.diagnostics.iter().any(|diag| diag.code() == code)
    }
}

impl fmt::Display for DiagnosticList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(first) = self.diagnostics.first() {
            write!(f, "{}", first)?;
            if self.diagnostics.len() > 1 {
                write!(f, " (+{} more)", self.diagnostics.len() - 1)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for DiagnosticList {}

impl From<Diagnostic> for DiagnosticList {
    fn from(diagnostic: Diagnostic) -> Self {
        Self {
            diagnostics: vec![diagnostic],
        }
    }
}

impl From<Vec<Diagnostic>> for DiagnosticList {
    fn from(diagnostics: Vec<Diagnostic>) -> Self {
        Self { diagnostics }
    }
}

impl IntoIterator for DiagnosticList {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_from_diagnostic() {
        let diag = Diagnostic::error(ErrorCode::CompilerError, "test error");
        let list: DiagnosticList = diag.into();

        assert_eq!(list.len(), 1);
        assert_eq!(list.diagnostics()[0].message(), "test error");
        assert!(list.contains(ErrorCode::CompilerError));
        assert!(!list.contains(ErrorCode::Timeout));
    }

    #[test]
    fn test_list_display_multiple() {
        let diags = vec![
            Diagnostic::error(ErrorCode::CompilerError, "first error"),
            Diagnostic::warning(ErrorCode::CompilerWarning, "second"),
            Diagnostic::warning(ErrorCode::CompilerWarning, "third"),
        ];
        let list: DiagnosticList = diags.into();

        assert_eq!(list.to_string(), "error[C301]: first error (+2 more)");
        assert!(list.has_errors());
    }

    #[test]
    fn test_list_only_warnings_has_no_errors() {
        let list = DiagnosticList::from(Diagnostic::warning(ErrorCode::CompilerWarning, "w"));
        assert!(!list.has_errors());
    }
}
