//! The generate, validate, compile and repair loop.
//!
//! A run owns its [`Project`] exclusively and is strictly sequential. Each
//! attempt walks the states
//!
//! ```text
//! Planning -> Generating -> Merging -> Validating -> Compiling
//! ```
//!
//! and ends in [`State::Succeeded`], [`State::Retrying`] or
//! [`State::Failed`]. Defects found before compilation never leave the
//! loop; they are fed back to the next round as a [`RepairContext`]. Only a
//! loop-fatal condition or running out of attempts produces a
//! [`FailureReport`].
//!
//! Before every attempt, the content hashes of the last two attempts that
//! merged a reply are compared. Identical documents mean the generation
//! service ignored the repair feedback, and the run ends as
//! [`FailureReason::Stalled`] without another generation call. Attempts that
//! never merged anything (a failed call, an empty reply) carry no hash.

use std::{
    collections::BTreeSet,
    fmt,
    mem,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use hsforge_core::{Diagnostic, ErrorCode, ModelError, Project, SlotRole};
use hsforge_parser::{
    ParameterBuilder, Reply, lint, parse_reply, source::render_declaration, source::render_source,
    validate_table,
};

use crate::{
    compiler::{Artifact, Compiler},
    generation::{GenerationError, GenerationRequest, Generator, RepairContext, TaskKind},
    knowledge::Knowledge,
    planner::{self, Plan},
};

/// Phases of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Idle,
    Planning,
    Generating,
    Merging,
    Validating,
    Compiling,
    Succeeded,
    Retrying,
    Failed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Idle => "idle",
            State::Planning => "planning",
            State::Generating => "generating",
            State::Merging => "merging",
            State::Validating => "validating",
            State::Compiling => "compiling",
            State::Succeeded => "succeeded",
            State::Retrying => "retrying",
            State::Failed => "failed",
        })
    }
}

/// Receives progress of a run.
pub trait Observer {
    /// Called on every state change. `attempt` is 0 before the first attempt.
    fn on_transition(&mut self, attempt: u32, from: State, to: State);

    /// Called once per finished attempt.
    fn on_attempt(&mut self, _record: &AttemptRecord) {}
}

/// Cooperative cancellation, checked between phases.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Read-only context threaded through a run.
pub struct RunContext<'a> {
    knowledge: &'a Knowledge,
    cancel: CancelFlag,
    observer: Option<&'a mut dyn Observer>,
    generation_timeout: Option<Duration>,
}

impl<'a> RunContext<'a> {
    pub fn new(knowledge: &'a Knowledge) -> Self {
        Self {
            knowledge,
            cancel: CancelFlag::default(),
            observer: None,
            generation_timeout: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: &'a mut dyn Observer) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Bound every generation call. A reply arriving later is a timeout.
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = Some(timeout);
        self
    }
}

/// How an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    GenerationFailed,
    EmptyReply,
    Invalid,
    CompileFailed,
    TimedOut,
    ToolUnavailable,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Succeeded => "succeeded",
            Outcome::GenerationFailed => "generation failed",
            Outcome::EmptyReply => "empty reply",
            Outcome::Invalid => "invalid",
            Outcome::CompileFailed => "compile failed",
            Outcome::TimedOut => "timed out",
            Outcome::ToolUnavailable => "tool unavailable",
        })
    }
}

/// The history entry of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub index: u32,
    pub outcome: Outcome,
    /// SHA-256 of the merged document, hex encoded. `None` when the attempt
    /// merged nothing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Slots the reply wrote.
    pub touched: Vec<SlotRole>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Why a run gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Every attempt failed.
    Exhausted,
    /// Two consecutive attempts produced the same document.
    Stalled,
    /// The generation service or the compiler ran out of time.
    Timeout,
    /// The compiler or the generation service could not be started.
    ToolUnavailable,
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureReason::Exhausted => "attempts exhausted",
            FailureReason::Stalled => "stalled",
            FailureReason::Timeout => "timed out",
            FailureReason::ToolUnavailable => "tool unavailable",
            FailureReason::Cancelled => "cancelled",
        })
    }
}

/// A failed run.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("run {reason} after {} attempt(s)", .attempts.len())]
pub struct FailureReport {
    pub reason: FailureReason,
    /// Every attempt, in order.
    pub attempts: Vec<AttemptRecord>,
    pub last_diagnostics: Vec<Diagnostic>,
}

impl FailureReport {
    pub fn attempts_consumed(&self) -> usize {
        self.attempts.len()
    }
}

/// A successful run.
#[derive(Debug, Clone)]
pub struct RunSuccess {
    pub artifact: Artifact,
    pub attempts: Vec<AttemptRecord>,
}

impl RunSuccess {
    pub fn attempts_consumed(&self) -> usize {
        self.attempts.len()
    }
}

/// SHA-256 over the canonical flat rendering of `project`.
pub fn content_hash(project: &Project) -> String {
    format!("{:x}", Sha256::digest(render_source(project).as_bytes()))
}

/// Run the loop on `project` for at most `max_attempts` attempts.
///
/// # Errors
///
/// A [`FailureReport`] carrying every attempt record when the run fails.
pub fn run<G, C>(
    project: &mut Project,
    task: &str,
    max_attempts: u32,
    generator: &mut G,
    compiler: &C,
    context: RunContext<'_>,
) -> Result<RunSuccess, FailureReport>
where
    G: Generator + ?Sized,
    C: Compiler + ?Sized,
{
    let mut run = Loop {
        generator,
        compiler,
        context,
        state: State::Idle,
        attempt: 0,
        merged: false,
        records: Vec::new(),
    };
    run.execute(project, task, max_attempts)
}

enum Step {
    Succeeded(Artifact),
    Retry(RepairContext),
    Fatal(FailureReason),
}

struct Loop<'r, 'c, G: ?Sized, C: ?Sized> {
    generator: &'r mut G,
    compiler: &'r C,
    context: RunContext<'c>,
    state: State,
    attempt: u32,
    merged: bool,
    records: Vec<AttemptRecord>,
}

impl<G, C> Loop<'_, '_, G, C>
where
    G: Generator + ?Sized,
    C: Compiler + ?Sized,
{
    fn execute(
        &mut self,
        project: &mut Project,
        task: &str,
        max_attempts: u32,
    ) -> Result<RunSuccess, FailureReport> {
        info!(max_attempts = max_attempts; "Starting run");
        self.enter(State::Planning);
        let plan = planner::plan(task, project);
        let mut repair = None;

        while self.attempt < max_attempts {
            if self.context.cancel.is_cancelled() {
                return Err(self.fail(FailureReason::Cancelled, None));
            }
            if self.stalled() {
                let diag = Diagnostic::error(
                    ErrorCode::Stalled,
                    "the last two attempts produced the same document",
                );
                return Err(self.fail(FailureReason::Stalled, Some(diag)));
            }

            self.attempt += 1;
            match self.attempt_once(project, task, &plan, repair.take()) {
                Step::Succeeded(artifact) => {
                    self.enter(State::Succeeded);
                    info!(attempts = self.records.len(); "Run succeeded");
                    return Ok(RunSuccess {
                        artifact,
                        attempts: mem::take(&mut self.records),
                    });
                }
                Step::Retry(context) => {
                    repair = Some(context);
                    if self.attempt < max_attempts {
                        self.enter(State::Retrying);
                    }
                }
                Step::Fatal(reason) => return Err(self.fail(reason, None)),
            }
        }
        Err(self.fail(FailureReason::Exhausted, None))
    }

    fn attempt_once(
        &mut self,
        project: &mut Project,
        task: &str,
        plan: &Plan,
        repair: Option<RepairContext>,
    ) -> Step {
        let kind = if repair.is_some() {
            TaskKind::Repair
        } else {
            plan.kind()
        };
        let mut selection = plan.slots().clone();
        if let Some(repair) = &repair {
            selection.extend(repair.implicated());
        }

        self.enter(State::Generating);
        self.merged = false;
        project.clear_touched();
        let request = GenerationRequest::new(task, kind)
            .with_slots(
                selection
                    .iter()
                    .map(|role| (*role, project.script(*role).to_string()))
                    .collect(),
            )
            .with_parameters(render_parameters(project))
            .with_documents(
                self.context
                    .knowledge
                    .select(kind)
                    .into_iter()
                    .cloned()
                    .collect(),
            )
            .with_repair(repair);
        let request = match self.context.generation_timeout {
            Some(timeout) => request.with_timeout(timeout),
            None => request,
        };
        info!(attempt = self.attempt, kind:% = kind, slots:? = selection; "Generating");

        let started = Instant::now();
        let reply = match self.generator.generate(&request) {
            Ok(reply) => reply,
            Err(err) => return self.generation_failed(project, err),
        };
        if let Some(timeout) = request.timeout().filter(|t| started.elapsed() > *t) {
            return self.generation_failed(project, GenerationError::Timeout(timeout));
        }
        if self.context.cancel.is_cancelled() {
            return Step::Fatal(FailureReason::Cancelled);
        }

        self.enter(State::Merging);
        let reply = parse_reply(&reply);
        let mut diagnostics = merge(project, &reply, &selection);
        if reply.is_empty() {
            diagnostics.push(
                Diagnostic::error(
                    ErrorCode::EmptyReply,
                    "the reply contained no script or parameter block",
                )
                .with_help("open every block with a `[FILE: scripts/3d.gdl]` style header"),
            );
            return self.retry(project, Outcome::EmptyReply, diagnostics);
        }
        self.merged = true;
        if self.context.cancel.is_cancelled() {
            return Step::Fatal(FailureReason::Cancelled);
        }

        self.enter(State::Validating);
        diagnostics.extend(validate_table(project.parameters()));
        diagnostics.extend(lint(project));
        if diagnostics.iter().any(Diagnostic::is_error) {
            return self.retry(project, Outcome::Invalid, diagnostics);
        }
        if self.context.cancel.is_cancelled() {
            return Step::Fatal(FailureReason::Cancelled);
        }

        self.enter(State::Compiling);
        match self.compiler.compile(project) {
            Ok(artifact) => {
                diagnostics.extend(artifact.diagnostics().iter().cloned());
                self.record(project, Outcome::Succeeded, diagnostics);
                Step::Succeeded(artifact)
            }
            Err(errors) => {
                let fatal = if errors.contains(ErrorCode::ExternalToolUnavailable) {
                    Some((FailureReason::ToolUnavailable, Outcome::ToolUnavailable))
                } else if errors.contains(ErrorCode::Timeout) {
                    Some((FailureReason::Timeout, Outcome::TimedOut))
                } else {
                    None
                };
                diagnostics.extend(errors);
                match fatal {
                    Some((reason, outcome)) => {
                        self.record(project, outcome, diagnostics);
                        Step::Fatal(reason)
                    }
                    None => self.retry(project, Outcome::CompileFailed, diagnostics),
                }
            }
        }
    }

    fn generation_failed(&mut self, project: &Project, err: GenerationError) -> Step {
        warn!(attempt = self.attempt, err:% = err; "Generation failed");
        match err {
            GenerationError::Timeout(_) => {
                let diag = Diagnostic::error(ErrorCode::Timeout, err.to_string());
                self.record(project, Outcome::TimedOut, vec![diag]);
                Step::Fatal(FailureReason::Timeout)
            }
            GenerationError::Unavailable(_) => {
                let diag = Diagnostic::error(ErrorCode::ExternalToolUnavailable, err.to_string());
                self.record(project, Outcome::ToolUnavailable, vec![diag]);
                Step::Fatal(FailureReason::ToolUnavailable)
            }
            GenerationError::Failed(_) => {
                let diag = Diagnostic::error(ErrorCode::GenerationFailed, err.to_string());
                self.retry(project, Outcome::GenerationFailed, vec![diag])
            }
        }
    }

    fn retry(&mut self, project: &Project, outcome: Outcome, diagnostics: Vec<Diagnostic>) -> Step {
        let errors = diagnostics
            .iter()
            .filter(|diag| diag.is_error())
            .cloned()
            .collect();
        let context = RepairContext::new(project, errors);
        self.record(project, outcome, diagnostics);
        Step::Retry(context)
    }

    fn record(&mut self, project: &Project, outcome: Outcome, diagnostics: Vec<Diagnostic>) {
        let record = AttemptRecord {
            index: self.attempt,
            outcome,
            content_hash: self.merged.then(|| content_hash(project)),
            touched: project.touched(),
            diagnostics,
        };
        info!(
            attempt = record.index,
            outcome:% = outcome,
            errors = record.diagnostics.iter().filter(|d| d.is_error()).count();
            "Attempt finished"
        );
        if let Some(observer) = self.context.observer.as_deref_mut() {
            observer.on_attempt(&record);
        }
        self.records.push(record);
    }

    fn stalled(&self) -> bool {
        let mut hashes = self
            .records
            .iter()
            .rev()
            .filter_map(|record| record.content_hash.as_deref());
        match (hashes.next(), hashes.next()) {
            (Some(last), Some(previous)) => last == previous,
            _ => false,
        }
    }

    fn enter(&mut self, state: State) {
        let from = mem::replace(&mut self.state, state);
        debug!(attempt = self.attempt, from:% = from, to:% = state; "State transition");
        if let Some(observer) = self.context.observer.as_deref_mut() {
            observer.on_transition(self.attempt, from, state);
        }
    }

    fn fail(&mut self, reason: FailureReason, extra: Option<Diagnostic>) -> FailureReport {
        self.enter(State::Failed);
        let mut last_diagnostics = self
            .records
            .last()
            .map(|record| record.diagnostics.clone())
            .unwrap_or_default();
        last_diagnostics.extend(extra);
        warn!(reason:% = reason, attempts = self.records.len(); "Run failed");
        FailureReport {
            reason,
            attempts: mem::take(&mut self.records),
            last_diagnostics,
        }
    }
}

fn render_parameters(project: &Project) -> String {
    project
        .parameters()
        .iter()
        .map(render_declaration)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Apply a reply to `project`.
///
/// Script blocks overwrite selected slots wholesale. Parameters are added or
/// updated; a fixed parameter keeps its declaration when the reply changes
/// its type. A name declared twice in one reply is an error and only the
/// first declaration is merged.
fn merge(project: &mut Project, reply: &Reply, selection: &BTreeSet<SlotRole>) -> Vec<Diagnostic> {
    let mut diagnostics = reply.diagnostics().to_vec();

    for (role, text) in reply.scripts() {
        if selection.contains(role) {
            project.set_script(*role, text.as_str());
            project.mark_touched(*role);
        } else {
            diagnostics.push(Diagnostic::warning(
                ErrorCode::ParseAnomaly,
                format!("reply rewrote {role}, which was not requested; ignored"),
            ));
        }
    }

    let Some(candidates) = reply.parameters() else {
        return diagnostics;
    };
    let builder = ParameterBuilder::new().fix_reserved(true);
    let mut corrections = Vec::new();
    let mut seen = BTreeSet::new();
    for candidate in candidates.iter().cloned() {
        let parameter = match builder.correct(candidate, &mut corrections) {
            Ok(parameter) => parameter,
            Err(diag) => {
                diagnostics.push(diag);
                continue;
            }
        };
        if !seen.insert(parameter.name().to_string()) {
            let name = parameter.name().to_string();
            diagnostics.push(
                Diagnostic::from(ModelError::DuplicateParameter { name: name.clone() })
                    .with_help(format!("declare `{name}` once")),
            );
            continue;
        }
        let existing = project
            .parameter(parameter.name())
            .map(|p| (p.is_fixed(), p.param_type()));
        match existing {
            Some((true, ty)) if ty != parameter.param_type() => {
                diagnostics.push(
                    Diagnostic::warning(
                        ErrorCode::FixedParameterRetyped,
                        format!(
                            "fixed parameter `{}` keeps type {ty}; the reply declared {}",
                            parameter.name(),
                            parameter.param_type()
                        ),
                    )
                    .with_help(format!("keep `{}` as {ty}", parameter.name())),
                );
            }
            Some((fixed, _)) => {
                let fixed = fixed || parameter.is_fixed();
                project.parameters_mut().upsert(parameter.with_fixed(fixed));
            }
            None => {
                project.parameters_mut().upsert(parameter);
            }
        }
    }
    diagnostics.extend(
        corrections
            .iter()
            .map(|correction| Diagnostic::warning(ErrorCode::ParseAnomaly, correction.to_string())),
    );
    diagnostics
}
