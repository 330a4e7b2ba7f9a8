//! The generation-service seam.
//!
//! The orchestration loop never talks to a model directly. It builds a
//! [`GenerationRequest`] and hands it to a [`Generator`], which returns the
//! raw reply text. Tests substitute deterministic generators;
//! [`CommandGenerator`] pipes the rendered prompt through an external
//! command.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    process::Command,
    time::Duration,
};

use log::{debug, info};
use serde::Serialize;
use thiserror::Error;

use hsforge_core::{Diagnostic, Project, SlotRole};

use crate::{
    config::GenerationConfig,
    knowledge::Document,
    process::{self, RunError},
    prompt,
};

/// What a generation round is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Write a library part from nothing.
    Create,
    /// Change an existing library part.
    Modify,
    /// Fix the defects of the previous attempt.
    Repair,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskKind::Create => "create",
            TaskKind::Modify => "modify",
            TaskKind::Repair => "repair",
        })
    }
}

/// The lines of one slot implicated by a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotExcerpt {
    pub role: SlotRole,
    /// Offending lines as `(line, text)`, in line order.
    pub lines: Vec<(usize, String)>,
    /// The slot's full text at the time of the failure.
    pub text: String,
}

/// What the next round needs to know about the previous failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairContext {
    diagnostics: Vec<Diagnostic>,
    excerpts: Vec<SlotExcerpt>,
}

impl RepairContext {
    /// Collect `diagnostics` and an excerpt of every slot they point into.
    ///
    /// Every located diagnostic implicates its slot, whether or not that
    /// slot was part of the failed round.
    pub fn new(project: &Project, diagnostics: Vec<Diagnostic>) -> Self {
        let mut implicated: BTreeMap<SlotRole, BTreeSet<usize>> = BTreeMap::new();
        for location in diagnostics.iter().filter_map(Diagnostic::location) {
            implicated
                .entry(location.role())
                .or_default()
                .insert(location.line());
        }

        let excerpts = implicated
            .into_iter()
            .map(|(role, lines)| {
                let slot = project.slot(role);
                SlotExcerpt {
                    role,
                    lines: lines
                        .into_iter()
                        .filter_map(|line| slot.line(line).map(|text| (line, text.to_string())))
                        .collect(),
                    text: slot.text().to_string(),
                }
            })
            .collect();

        Self {
            diagnostics,
            excerpts,
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn excerpts(&self) -> &[SlotExcerpt] {
        &self.excerpts
    }

    /// Slots the failure points into, in canonical order.
    pub fn implicated(&self) -> impl Iterator<Item = SlotRole> + '_ {
        self.excerpts.iter().map(|excerpt| excerpt.role)
    }
}

/// One call to the generation service.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    task: String,
    kind: TaskKind,
    slots: Vec<(SlotRole, String)>,
    parameters: String,
    documents: Vec<Document>,
    repair: Option<RepairContext>,
    timeout: Option<Duration>,
}

impl GenerationRequest {
    pub fn new(task: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            task: task.into(),
            kind,
            slots: Vec::new(),
            parameters: String::new(),
            documents: Vec::new(),
            repair: None,
            timeout: None,
        }
    }

    /// The selected slots with their current text.
    pub fn with_slots(mut self, slots: Vec<(SlotRole, String)>) -> Self {
        self.slots = slots;
        self
    }

    /// The parameter table, rendered as declaration lines.
    pub fn with_parameters(mut self, parameters: impl Into<String>) -> Self {
        self.parameters = parameters.into();
        self
    }

    pub fn with_documents(mut self, documents: Vec<Document>) -> Self {
        self.documents = documents;
        self
    }

    pub fn with_repair(mut self, repair: Option<RepairContext>) -> Self {
        self.repair = repair;
        self
    }

    /// The longest the caller waits for a reply.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn slots(&self) -> &[(SlotRole, String)] {
        &self.slots
    }

    /// Returns `true` when `role` was selected for this round.
    pub fn selects(&self, role: SlotRole) -> bool {
        self.slots.iter().any(|(r, _)| *r == role)
    }

    pub fn parameters(&self) -> &str {
        &self.parameters
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn repair(&self) -> Option<&RepairContext> {
        self.repair.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Errors raised by a [`Generator`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation service did not answer within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("generation service unavailable: {0}")]
    Unavailable(String),

    #[error("generation failed: {0}")]
    Failed(String),
}

/// Answers generation requests with reply text.
pub trait Generator {
    /// Produce the reply for `request`. One blocking call per round, which
    /// should give up with [`GenerationError::Timeout`] once
    /// [`GenerationRequest::timeout`] has passed.
    fn generate(&mut self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// [`Generator`] that runs an external command.
///
/// The rendered prompt is written to the command's stdin; whatever it prints
/// on stdout is the reply.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: GenerationConfig::default().timeout(),
        }
    }

    /// Build from configuration. `None` when no command is configured.
    pub fn from_config(config: &GenerationConfig) -> Option<Self> {
        config.command().map(|program| {
            Self::new(program, config.args().to_vec()).with_timeout(config.timeout())
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Generator for CommandGenerator {
    fn generate(&mut self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let prompt = prompt::render(request);
        let timeout = request
            .timeout()
            .map_or(self.timeout, |limit| limit.min(self.timeout));
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        debug!(
            program = self.program.as_str(),
            kind:% = request.kind(),
            prompt_bytes = prompt.len();
            "Requesting generation"
        );

        let output =
            process::run_bounded(&mut command, Some(&prompt), timeout).map_err(|err| {
                match err {
                    RunError::Timeout { timeout, .. } => GenerationError::Timeout(timeout),
                    err if err.is_not_found() => GenerationError::Unavailable(err.to_string()),
                    err => GenerationError::Failed(err.to_string()),
                }
            })?;

        if !output.status.success() {
            return Err(GenerationError::Failed(format!(
                "`{}` exited with {}: {}",
                self.program,
                output.status,
                output.stderr.trim()
            )));
        }
        info!(program = self.program.as_str(), reply_bytes = output.stdout.len(); "Generation finished");
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use hsforge_core::{ErrorCode, Location};

    use super::*;

    #[test]
    fn test_repair_context_collects_offending_lines() {
        let mut project = Project::new("Table");
        project.set_script(SlotRole::Geometry, "BLOCK A, B, ZZYZX\nBLOK 1\nEND\n");
        project.set_script(SlotRole::Master, "w = A / 2\n");

        let context = RepairContext::new(
            &project,
            vec![
                Diagnostic::error(ErrorCode::CompilerError, "unknown command")
                    .with_location(Location::new(SlotRole::Geometry, 2)),
                Diagnostic::error(ErrorCode::CompilerError, "no location"),
            ],
        );

        assert_eq!(context.diagnostics().len(), 2);
        assert_eq!(context.implicated().collect::<Vec<_>>(), [SlotRole::Geometry]);
        let excerpt = &context.excerpts()[0];
        assert_eq!(excerpt.lines, [(2, "BLOK 1".to_string())]);
        assert!(excerpt.text.starts_with("BLOCK"));
    }

    #[test]
    fn test_request_selects() {
        let request = GenerationRequest::new("add legs", TaskKind::Modify)
            .with_slots(vec![(SlotRole::Geometry, String::new())]);

        assert!(request.selects(SlotRole::Geometry));
        assert!(!request.selects(SlotRole::Interface));
        assert!(request.repair().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_generator_pipes_prompt() {
        let mut generator = CommandGenerator::new("cat", Vec::new());
        let request = GenerationRequest::new("a round side table", TaskKind::Create);

        let reply = generator.generate(&request).unwrap();
        assert!(reply.contains("a round side table"));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_generator_failures() {
        let request = GenerationRequest::new("x", TaskKind::Create);

        let err = CommandGenerator::new("false", Vec::new())
            .generate(&request)
            .unwrap_err();
        assert!(matches!(err, GenerationError::Failed(_)));

        let err = CommandGenerator::new("/nonexistent/hsforge-model", Vec::new())
            .generate(&request)
            .unwrap_err();
        assert!(matches!(err, GenerationError::Unavailable(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_request_timeout_bounds_the_command() {
        let request = GenerationRequest::new("x", TaskKind::Create)
            .with_timeout(Duration::from_millis(50));

        let err = CommandGenerator::new("sleep", vec!["5".into()])
            .generate(&request)
            .unwrap_err();
        assert_eq!(err, GenerationError::Timeout(Duration::from_millis(50)));
    }
}
