//! CLI logic for the hsforge library-part tool.
//!
//! Each subcommand maps onto one [`Forge`] operation. Results are written as
//! HSF trees; defects come back as [`ForgeError`]s for `main` to render.

pub mod error_adapter;

mod args;
mod config;

pub use args::{Args, Command};

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{info, warn};
use serde::Serialize;

use hsforge::{
    Diagnostic, Forge, ForgeError, Project,
    generation::GenerationError,
    orchestrator::{AttemptRecord, FailureReason, FailureReport, Observer, RunSuccess, State},
};

/// Run the hsforge CLI application
///
/// # Arguments
///
/// * `args` - Command-line arguments
///
/// # Errors
///
/// Returns `ForgeError` for:
/// - File I/O errors
/// - Configuration loading errors
/// - Defects found in a library part
/// - Failed generation runs
/// - Converter failures
pub fn run(args: &Args) -> Result<(), ForgeError> {
    let app_config = config::load_config(args.config.as_ref())?;
    let forge = Forge::load(app_config)?;

    match &args.command {
        Command::New { name, output } => {
            let project = forge.create_from_scratch(name);
            let dir = output_dir(output.as_deref(), name);
            forge.save_tree(&project, &dir)?;
            info!(output_dir = dir.display().to_string(); "Library part created");
        }
        Command::Import { input, output } => {
            let input = Path::new(input);
            let (project, diagnostics) = forge.import(input)?;
            report_warnings(&diagnostics);
            let dir = output_dir(output.as_deref(), project.name());
            forge.save_tree(&project, &dir)?;
            info!(output_dir = dir.display().to_string(); "Source imported");
        }
        Command::Lint { input } => {
            let project = load_project(&forge, Path::new(input))?;
            let diagnostics = forge.lint(&project);
            if diagnostics.iter().any(Diagnostic::is_error) {
                return Err(ForgeError::new_invalid(diagnostics, project));
            }
            report_warnings(&diagnostics);
            info!(name = project.name(); "No errors found");
        }
        Command::Run {
            task,
            project,
            name,
            max_attempts,
            output,
            report,
        } => {
            let mut project = match project {
                Some(path) => load_project(&forge, Path::new(path))?,
                None => forge.create_from_scratch(name),
            };

            let mut generator = forge.generator().ok_or_else(|| {
                GenerationError::Unavailable("no `generation.command` configured".to_string())
            })?;
            let compiler = forge.compiler();
            let max_attempts = max_attempts.unwrap_or(forge.config().run().max_attempts());

            let mut observer = LogObserver;
            let context = forge.context().with_observer(&mut observer);
            let result = forge.run_with(
                &mut project,
                task,
                max_attempts,
                &mut generator,
                &compiler,
                context,
            );

            match result {
                Ok(success) => {
                    if let Some(path) = report {
                        write_report(Path::new(path), &RunReport::succeeded(&success))?;
                    }
                    let dir = output_dir(output.as_deref(), project.name());
                    forge.save_tree(&project, &dir)?;
                    info!(
                        artifact = success.artifact.path().display().to_string(),
                        attempts = success.attempts_consumed();
                        "Library part compiled"
                    );
                }
                Err(failure) => {
                    if let Some(path) = report {
                        write_report(Path::new(path), &RunReport::failed(&failure))?;
                    }
                    return Err(ForgeError::new_run_failure(failure, project));
                }
            }
        }
        Command::Decompile { input, output } => {
            let input = Path::new(input);
            let tree = forge.decompile(input)?;
            report_warnings(&tree.diagnostics);
            let stem = input
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or(tree.project.name());
            let dir = output_dir(output.as_deref(), stem);
            forge.save_tree(&tree.project, &dir)?;
            info!(output_dir = dir.display().to_string(); "Library part decompiled");
        }
    }

    Ok(())
}

/// Read an HSF tree when `path` is a directory, a flat source file otherwise.
fn load_project(forge: &Forge, path: &Path) -> Result<Project, ForgeError> {
    let (project, diagnostics) = if path.is_dir() {
        let tree = forge.load_tree(path)?;
        (tree.project, tree.diagnostics)
    } else {
        forge.import(path)?
    };
    report_warnings(&diagnostics);
    Ok(project)
}

fn report_warnings(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        warn!("{diagnostic}");
    }
}

fn output_dir(explicit: Option<&str>, fallback: &str) -> PathBuf {
    PathBuf::from(explicit.unwrap_or(fallback))
}

/// The attempt history written by `run --report`.
#[derive(Debug, Serialize)]
struct RunReport<'a> {
    succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifact: Option<String>,
    attempts: &'a [AttemptRecord],
}

impl<'a> RunReport<'a> {
    fn succeeded(success: &'a RunSuccess) -> Self {
        Self {
            succeeded: true,
            reason: None,
            artifact: Some(success.artifact.path().display().to_string()),
            attempts: &success.attempts,
        }
    }

    fn failed(failure: &'a FailureReport) -> Self {
        Self {
            succeeded: false,
            reason: Some(failure.reason),
            artifact: None,
            attempts: &failure.attempts,
        }
    }
}

fn write_report(path: &Path, report: &RunReport<'_>) -> Result<(), ForgeError> {
    let text = toml::to_string(report).map_err(io::Error::other)?;
    fs::write(path, text).map_err(|err| ForgeError::file(path, err))?;
    info!(path = path.display().to_string(); "Run report written");
    Ok(())
}

/// Logs every phase change of a run.
struct LogObserver;

impl Observer for LogObserver {
    fn on_transition(&mut self, attempt: u32, from: State, to: State) {
        info!(attempt = attempt, from:% = from, to:% = to; "Phase changed");
    }

    fn on_attempt(&mut self, record: &AttemptRecord) {
        info!(
            attempt = record.index,
            outcome:% = record.outcome,
            diagnostics = record.diagnostics.len();
            "Attempt finished"
        );
    }
}
