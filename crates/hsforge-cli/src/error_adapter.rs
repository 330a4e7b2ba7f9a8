//! miette reports for [`ForgeError`].
//!
//! Located diagnostics are labelled on their script line, using the slot text
//! of the project the error carries. Everything else becomes one plain
//! report with a code and, where the fix is known, a hint.

use std::fmt;

use miette::{Diagnostic as MietteDiagnostic, LabeledSpan, SourceSpan};

use hsforge::{ForgeError, orchestrator::FailureReason};
use hsforge_core::{Diagnostic, Project};

/// A diagnostic together with the text of the slot it points into.
#[derive(Debug)]
pub struct SlotReport<'a> {
    diag: &'a Diagnostic,
    /// Empty when the slot text is unknown.
    script: &'a str,
}

impl<'a> SlotReport<'a> {
    pub fn detached(diag: &'a Diagnostic) -> Self {
        Self { diag, script: "" }
    }

    pub fn in_project(diag: &'a Diagnostic, project: &'a Project) -> Self {
        let script = diag
            .location()
            .map_or("", |location| project.script(location.role()));
        Self { diag, script }
    }

    fn span(&self) -> Option<SourceSpan> {
        line_span(self.script, self.diag.location()?.line())
    }
}

impl fmt::Display for SlotReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(location) = self.diag.location() {
            write!(f, "{location}: ")?;
        }
        f.write_str(self.diag.message())
    }
}

impl std::error::Error for SlotReport<'_> {}

impl MietteDiagnostic for SlotReport<'_> {
    fn code<'b>(&'b self) -> Option<Box<dyn fmt::Display + 'b>> {
        Some(Box::new(self.diag.code()))
    }

    fn severity(&self) -> Option<miette::Severity> {
        if self.diag.is_error() {
            Some(miette::Severity::Error)
        } else {
            Some(miette::Severity::Warning)
        }
    }

    fn help<'b>(&'b self) -> Option<Box<dyn fmt::Display + 'b>> {
        let help = self.diag.help()?;
        Some(Box::new(help) as Box<dyn fmt::Display + 'b>)
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.span()?;
        Some(&self.script as &dyn miette::SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let label = LabeledSpan::new_primary_with_span(
            Some(self.diag.code().description().to_string()),
            self.span()?,
        );
        Some(Box::new(std::iter::once(label)))
    }
}

/// A [`ForgeError`] with no line to point at.
#[derive(Debug)]
pub struct PlainReport<'a>(&'a ForgeError);

impl fmt::Display for PlainReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.0, f)
    }
}

impl std::error::Error for PlainReport<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(self.0)
    }
}

impl MietteDiagnostic for PlainReport<'_> {
    fn code<'b>(&'b self) -> Option<Box<dyn fmt::Display + 'b>> {
        let code = match self.0 {
            ForgeError::Io(_) => "hsforge::io",
            ForgeError::File { .. } => "hsforge::file",
            ForgeError::Run { .. } => "hsforge::run",
            ForgeError::Generation(_) => "hsforge::generation",
            ForgeError::Diagnostics(_) | ForgeError::Invalid { .. } => return None,
        };
        Some(Box::new(code))
    }

    fn help<'b>(&'b self) -> Option<Box<dyn fmt::Display + 'b>> {
        let hint = match self.0 {
            ForgeError::Run { report, .. } => run_hint(report.reason)?,
            ForgeError::Generation(_) => "check `generation.command` in the configuration",
            _ => return None,
        };
        Some(Box::new(hint))
    }
}

fn run_hint(reason: FailureReason) -> Option<&'static str> {
    Some(match reason {
        FailureReason::Exhausted => "raise `run.max_attempts` or narrow the task",
        FailureReason::Stalled => "the generation service repeated its answer; rephrase the task",
        FailureReason::Timeout => "raise `timeout_secs` for the slow tool",
        FailureReason::ToolUnavailable => {
            "set `compiler.path` or CONVERTER_PATH, and `generation.command`"
        }
        FailureReason::Cancelled => return None,
    })
}

/// Byte span of a 1-based line, line break excluded.
fn line_span(src: &str, line: usize) -> Option<SourceSpan> {
    let start: usize = src.split_inclusive('\n').take(line.checked_sub(1)?).map(str::len).sum();
    let text = src.split_inclusive('\n').nth(line - 1)?;
    Some(SourceSpan::new(start.into(), text.trim_end_matches(['\n', '\r']).len()))
}

/// Split `err` into the reports to print, in order.
///
/// A failed run leads with its summary, followed by the diagnostics of its
/// last attempt.
pub fn to_reportables(err: &ForgeError) -> Vec<Box<dyn MietteDiagnostic + '_>> {
    fn boxed<'a>(report: impl MietteDiagnostic + 'a) -> Box<dyn MietteDiagnostic + 'a> {
        Box::new(report)
    }

    match err {
        ForgeError::Diagnostics(list) => list
            .diagnostics()
            .iter()
            .map(|diag| boxed(SlotReport::detached(diag)))
            .collect(),
        ForgeError::Invalid {
            diagnostics,
            project,
        } => diagnostics
            .diagnostics()
            .iter()
            .map(|diag| boxed(SlotReport::in_project(diag, project)))
            .collect(),
        ForgeError::Run { report, project } => {
            let mut reports = vec![boxed(PlainReport(err))];
            reports.extend(
                report
                    .last_diagnostics
                    .iter()
                    .map(|diag| boxed(SlotReport::in_project(diag, project))),
            );
            reports
        }
        _ => vec![boxed(PlainReport(err))],
    }
}

#[cfg(test)]
mod tests {
    use hsforge::orchestrator::FailureReport;
    use hsforge_core::{DiagnosticList, ErrorCode, Location, SlotRole};

    use super::*;

    fn project() -> Project {
        let mut project = Project::new("Table");
        project.set_script(SlotRole::Geometry, "BLOCK A, B, ZZYZX\nADD 0, 0, 1\nEND\n");
        project
    }

    #[test]
    fn test_invalid_labels_script_line() {
        let diag = Diagnostic::error(ErrorCode::TransformImbalance, "1 transform never removed")
            .with_location(Location::new(SlotRole::Geometry, 2))
            .with_help("add `DEL 1`");
        let err = ForgeError::new_invalid(diag, project());

        let reports = to_reportables(&err);
        assert_eq!(reports.len(), 1);

        let labels: Vec<_> = reports[0].labels().unwrap().collect();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].offset(), "BLOCK A, B, ZZYZX\n".len());
        assert_eq!(labels[0].len(), "ADD 0, 0, 1".len());
        assert!(labels[0].primary());
        assert!(reports[0].source_code().is_some());
        assert_eq!(
            reports[0].help().map(|h| h.to_string()),
            Some("add `DEL 1`".to_string())
        );
    }

    #[test]
    fn test_line_past_the_end_has_no_label() {
        let diag = Diagnostic::error(ErrorCode::CompilerError, "somewhere")
            .with_location(Location::new(SlotRole::Geometry, 9));
        let err = ForgeError::new_invalid(diag, project());

        let reports = to_reportables(&err);
        assert!(reports[0].labels().is_none());
        assert!(reports[0].source_code().is_none());
    }

    #[test]
    fn test_unlocated_diagnostic_has_no_source() {
        let list = DiagnosticList::from(vec![
            Diagnostic::error(ErrorCode::CompilerError, "first"),
            Diagnostic::warning(ErrorCode::CompilerWarning, "second"),
        ]);
        let err = ForgeError::from(list);

        let reports = to_reportables(&err);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].to_string(), "first");
        assert!(reports[0].labels().is_none());
        assert_eq!(reports[1].severity(), Some(miette::Severity::Warning));
    }

    #[test]
    fn test_run_failure_is_summarized_first() {
        let report = FailureReport {
            reason: FailureReason::Stalled,
            attempts: Vec::new(),
            last_diagnostics: vec![Diagnostic::error(ErrorCode::Stalled, "same document")],
        };
        let err = ForgeError::new_run_failure(report, project());

        let reports = to_reportables(&err);
        assert_eq!(reports.len(), 2);
        assert_eq!(
            reports[0].code().map(|c| c.to_string()),
            Some("hsforge::run".to_string())
        );
        assert!(reports[0].help().is_some());
        assert_eq!(reports[1].to_string(), "same document");
    }

    #[test]
    fn test_io_error() {
        let err = ForgeError::Io(std::io::Error::other("disk full"));

        let reports = to_reportables(&err);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].to_string(), "I/O error: disk full");
        assert_eq!(
            reports[0].code().map(|c| c.to_string()),
            Some("hsforge::io".to_string())
        );
    }
}
