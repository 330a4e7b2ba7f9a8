//! Core diagnostic type.

use std::{cmp::Ordering, fmt};

use serde::Serialize;

use super::{ErrorCode, Location, Severity};

/// A diagnostic message produced by parsing, validation, linting or compilation.
///
/// Diagnostics are created with [`Diagnostic::error`] or [`Diagnostic::warning`]
/// and refined with the builder methods:
///
/// ```
/// # use hsforge_core::error::{Diagnostic, ErrorCode, Location};
/// # use hsforge_core::SlotRole;
/// let diag = Diagnostic::warning(ErrorCode::EmptySection, "section `2D SCRIPT` is empty")
///     .with_location(Location::new(SlotRole::Projection, 1));
///
/// assert!(diag.severity().is_warning());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    severity: Severity,
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    help: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<Location>,
}

impl Diagnostic {
    /// Create a new fatal diagnostic.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    /// Create a new advisory diagnostic.
    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    fn new(severity: Severity, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            location: None,
            help: None,
        }
    }

    /// Attach a slot-relative location.
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Attach an optional location, leaving the diagnostic unchanged on `None`.
    pub fn with_maybe_location(mut self, location: Option<Location>) -> Self {
        if location.is_some() {
            self.location = location;
        }
        self
    }

    /// Attach help text describing how to fix the problem.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Downgrade to a warning, for readers that tolerate the defect.
    pub fn demoted(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }

    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub fn is_error(&self) -> bool {
        self.severity.is_error()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.code, self.message)
    }
}

/// Sort diagnostics into reporting order.
///
/// Unlocated diagnostics come first, then by slot role order and line.
/// The sort is stable, so diagnostics with equal keys keep their emission order.
pub fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| compare_locations(a.location, b.location));
}

fn compare_locations(a: Option<Location>, b: Option<Location>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.cmp(&b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::SlotRole;

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::error(ErrorCode::UnexpectedTerminator, "`ENDIF` without `IF`");
        assert_eq!(diag.to_string(), "error[L202]: `ENDIF` without `IF`");

        let diag = Diagnostic::warning(ErrorCode::InferredParameter, "inferred `w`");
        assert_eq!(diag.to_string(), "warning[P004]: inferred `w`");
    }

    #[test]
    fn test_diagnostic_builder() {
        let diag = Diagnostic::error(ErrorCode::MissingReturn, "no return")
            .with_location(Location::new(SlotRole::Geometry, 7))
            .with_help("add `RETURN`");

        assert_eq!(diag.code(), ErrorCode::MissingReturn);
        assert_eq!(diag.location(), Some(Location::new(SlotRole::Geometry, 7)));
        assert_eq!(diag.help(), Some("add `RETURN`"));
        assert!(diag.is_error());

        let warning = diag.demoted();
        assert!(warning.severity().is_warning());
        assert_eq!(warning.code(), ErrorCode::MissingReturn);
    }

    #[test]
    fn test_sort_diagnostics() {
        let mut diags = vec![
            Diagnostic::error(ErrorCode::EmptyProjection, "a")
                .with_location(Location::new(SlotRole::Projection, 1)),
            Diagnostic::error(ErrorCode::UnbalancedBlock, "b")
                .with_location(Location::new(SlotRole::Geometry, 9)),
            Diagnostic::error(ErrorCode::CompilerError, "c"),
            Diagnostic::error(ErrorCode::UnbalancedBlock, "d")
                .with_location(Location::new(SlotRole::Geometry, 2)),
        ];
        sort_diagnostics(&mut diags);

        let order: Vec<_> = diags.iter().map(|d| d.message()).collect();
        assert_eq!(order, ["c", "d", "b", "a"]);
    }
}
