//! Error types for hsforge operations.
//!
//! Defects in a library part are [`Diagnostic`](hsforge_core::Diagnostic)s.
//! [`ForgeError`] covers what stops an operation from producing a result
//! at all.

use std::{io, path::PathBuf};

use thiserror::Error;

use hsforge_core::{DiagnosticList, Project};

use crate::{generation::GenerationError, orchestrator::FailureReport};

/// The main error type for hsforge operations.
///
/// # Diagnostic Variants
///
/// `Invalid` and `Run` carry the project the diagnostics point into, so a
/// front end can show the offending script lines.
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Diagnostics without a project to point into.
    #[error("{0}")]
    Diagnostics(#[from] DiagnosticList),

    #[error("{diagnostics}")]
    Invalid {
        diagnostics: DiagnosticList,
        project: Box<Project>,
    },

    #[error("{report}")]
    Run {
        report: Box<FailureReport>,
        project: Box<Project>,
    },

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),
}

impl ForgeError {
    /// Attach the path an I/O error happened on.
    pub fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }

    /// Create a new `Invalid` error for defects found in `project`.
    pub fn new_invalid(diagnostics: impl Into<DiagnosticList>, project: Project) -> Self {
        Self::Invalid {
            diagnostics: diagnostics.into(),
            project: Box::new(project),
        }
    }

    /// Create a new `Run` error from a failed run on `project`.
    pub fn new_run_failure(report: FailureReport, project: Project) -> Self {
        Self::Run {
            report: Box::new(report),
            project: Box::new(project),
        }
    }
}
