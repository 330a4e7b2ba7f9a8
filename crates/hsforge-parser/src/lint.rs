//! Structural linter for GDL scripts.
//!
//! The linter catches defects the external converter accepts but that
//! break the object at runtime or corrupt the next generation round:
//! unbalanced blocks, `END` used where `RETURN` belongs, leaked
//! transformations, pasted Markdown residue and empty 2D scripts.
//!
//! Rules implement [`LintRule`] and are evaluated independently over a
//! shared [`LintContext`]. [`Linter::default`] carries the built-in rules;
//! more can be added with [`Linter::with_rule`].

use std::collections::BTreeSet;

use log::{debug, trace};

use hsforge_core::{
    Diagnostic, ErrorCode, Location, Project, SlotRole, error::DiagnosticCollector,
};

use crate::statement::{BlockKind, DelCount, Script, ScriptLine, Statement, contains_keyword};

/// Statements that draw in a 2D script.
const DRAWING_DIRECTIVES: &[&str] = &[
    "PROJECT2", "LINE2", "RECT2", "CIRC2", "ARC2", "TEXT2", "FRAGMENT2", "SPLINE2", "PICTURE2",
    "HOTLINE2", "HOTARC2",
];

/// Tokens that never belong in GDL source.
const RESIDUE_TOKENS: &[&str] = &["```", "~~~", "[FILE:", "<![CDATA[", "]]>"];

/// Classified scripts of one project, shared by all rules.
pub struct LintContext<'a> {
    scripts: Vec<Script<'a>>,
    entries: Vec<BTreeSet<usize>>,
}

impl<'a> LintContext<'a> {
    pub fn new(project: &'a Project) -> Self {
        let scripts: Vec<_> = project.slots().iter().map(Script::parse).collect();
        let entries = scripts
            .iter()
            .map(|script| subroutine_entries(script, &scripts))
            .collect();
        Self { scripts, entries }
    }

    pub fn scripts(&self) -> &[Script<'a>] {
        &self.scripts
    }

    pub fn script(&self, role: SlotRole) -> &Script<'a> {
        &self.scripts[role.index()]
    }

    /// Line numbers of the labels that start a subroutine body.
    ///
    /// A label starts a subroutine when some `GOSUB` names it, or when it
    /// follows the script's top-level `END`.
    pub fn subroutine_entries(&self, role: SlotRole) -> &BTreeSet<usize> {
        &self.entries[role.index()]
    }
}

fn subroutine_entries(script: &Script<'_>, all: &[Script<'_>]) -> BTreeSet<usize> {
    let called: BTreeSet<&str> = if script.role == SlotRole::Master {
        all.iter().flat_map(Script::gosub_targets).collect()
    } else {
        script.gosub_targets().collect()
    };

    let mut entries = BTreeSet::new();
    let mut depth = 0usize;
    let mut main_ended = false;
    for line in &script.lines {
        if let Some(label) = &line.label {
            if main_ended || called.contains(label.as_str()) {
                entries.insert(line.number);
            }
        }
        match (&line.statement, line.conditional) {
            (Some(Statement::Open(_)), false) => depth += 1,
            (Some(Statement::Close(_)), false) => depth = depth.saturating_sub(1),
            (Some(Statement::End), false) if depth == 0 && entries.is_empty() => main_ended = true,
            _ => {}
        }
    }
    entries
}

/// A structural check over a project's scripts.
pub trait LintRule {
    /// Short rule name, used in logs.
    fn name(&self) -> &'static str;

    fn check(&self, ctx: &LintContext<'_>, out: &mut DiagnosticCollector);
}

/// Runs a table of [`LintRule`]s.
pub struct Linter {
    rules: Vec<Box<dyn LintRule>>,
}

impl Default for Linter {
    fn default() -> Self {
        Self::empty()
            .with_rule(BlockBalance)
            .with_rule(Termination)
            .with_rule(TransformBalance)
            .with_rule(ForeignResidue)
            .with_rule(Projection)
    }
}

impl Linter {
    /// A linter with no rules.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: impl LintRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Lint every slot of `project`.
    ///
    /// Never mutates the project; the same project always yields the same
    /// diagnostics, ordered by slot role and line.
    pub fn lint(&self, project: &Project) -> Vec<Diagnostic> {
        let ctx = LintContext::new(project);
        let mut collector = DiagnosticCollector::new();
        for rule in &self.rules {
            trace!(rule = rule.name(); "Running lint rule");
            rule.check(&ctx, &mut collector);
        }
        let diagnostics = collector.finish();
        debug!(findings = diagnostics.len(); "Lint finished");
        diagnostics
    }
}

/// Lint `project` with the built-in rules.
pub fn lint(project: &Project) -> Vec<Diagnostic> {
    Linter::default().lint(project)
}

fn at(script: &Script<'_>, line: usize) -> Location {
    Location::new(script.role, line)
}

/// Block openers and closers must pair up and nest.
pub struct BlockBalance;

impl BlockBalance {
    fn unclosed(script: &Script<'_>, kind: BlockKind, line: usize) -> Diagnostic {
        Diagnostic::error(
            ErrorCode::UnbalancedBlock,
            format!("`{}` is never closed", kind.opener()),
        )
        .with_location(at(script, line))
        .with_help(format!("add a matching `{}`", kind.closer()))
    }

    fn check_script(script: &Script<'_>, out: &mut DiagnosticCollector) {
        let mut stack: Vec<(BlockKind, usize)> = Vec::new();

        for line in script.lines.iter().filter(|l| !l.conditional) {
            match &line.statement {
                Some(Statement::Open(kind)) => stack.push((*kind, line.number)),
                Some(Statement::Else) => {
                    match stack.iter().rposition(|(kind, _)| *kind == BlockKind::If) {
                        Some(idx) => {
                            for (kind, opened) in stack.drain(idx + 1..) {
                                out.emit(Self::unclosed(script, kind, opened));
                            }
                        }
                        None => out.emit(
                            Diagnostic::error(
                                ErrorCode::UnexpectedTerminator,
                                "`ELSE` outside an `IF` block",
                            )
                            .with_location(at(script, line.number)),
                        ),
                    }
                }
                Some(Statement::Close(kind)) => {
                    match stack.iter().rposition(|(open, _)| open == kind) {
                        Some(idx) => {
                            for (skipped, opened) in stack.drain(idx + 1..) {
                                out.emit(Self::unclosed(script, skipped, opened));
                            }
                            stack.pop();
                        }
                        None => out.emit(
                            Diagnostic::error(
                                ErrorCode::UnexpectedTerminator,
                                format!(
                                    "`{}` has no matching `{}`",
                                    kind.closer(),
                                    kind.opener()
                                ),
                            )
                            .with_location(at(script, line.number))
                            .with_help(if *kind == BlockKind::If {
                                "a single-line `IF ... THEN statement` takes no `ENDIF`"
                            } else {
                                "remove it or add the missing opener"
                            }),
                        ),
                    }
                }
                _ => {}
            }
        }

        for (kind, opened) in stack {
            out.emit(Self::unclosed(script, kind, opened));
        }
    }
}

impl LintRule for BlockBalance {
    fn name(&self) -> &'static str {
        "block-balance"
    }

    fn check(&self, ctx: &LintContext<'_>, out: &mut DiagnosticCollector) {
        for script in ctx.scripts() {
            Self::check_script(script, out);
        }
    }
}

/// `END`, `RETURN` and `GOSUB` usage.
pub struct Termination;

struct Subroutine {
    line: usize,
    /// Some path through the body returns.
    returned: bool,
    /// An unconditional top-level `RETURN` ended the body.
    closed: bool,
    premature: bool,
}

impl Termination {
    fn close(script: &Script<'_>, sub: Option<Subroutine>, out: &mut DiagnosticCollector) {
        if let Some(sub) = sub.filter(|s| !s.returned && !s.premature) {
            out.emit(
                Diagnostic::error(
                    ErrorCode::MissingReturn,
                    "subroutine body has no `RETURN`",
                )
                .with_location(at(script, sub.line))
                .with_help("end the subroutine with `RETURN`"),
            );
        }
    }

    fn check_script(ctx: &LintContext<'_>, script: &Script<'_>, out: &mut DiagnosticCollector) {
        let entries = ctx.subroutine_entries(script.role);
        let master = ctx.script(SlotRole::Master);
        let defined: BTreeSet<&str> = script
            .labels()
            .chain(master.labels())
            .map(|(_, label)| label)
            .collect();

        let mut current: Option<Subroutine> = None;
        let mut depth = 0usize;
        let mut last_main: Option<&ScriptLine<'_>> = None;

        for line in &script.lines {
            if entries.contains(&line.number) {
                Self::close(script, current.take(), out);
                current = Some(Subroutine {
                    line: line.number,
                    returned: false,
                    closed: false,
                    premature: false,
                });
                depth = 0;
            }
            let Some(statement) = &line.statement else {
                continue;
            };
            if current.is_none() {
                last_main = Some(line);
            }

            match statement {
                Statement::Open(_) if !line.conditional => depth += 1,
                Statement::Close(_) if !line.conditional => depth = depth.saturating_sub(1),
                Statement::End => {
                    if let Some(sub) = current.as_mut().filter(|s| !s.closed) {
                        sub.premature = true;
                        out.emit(
                            Diagnostic::error(
                                ErrorCode::PrematureTermination,
                                "`END` inside a subroutine stops the whole script",
                            )
                            .with_location(at(script, line.number))
                            .with_help("use `RETURN` to leave a subroutine"),
                        );
                    }
                }
                Statement::Return => {
                    if let Some(sub) = current.as_mut() {
                        sub.returned = true;
                        sub.closed |= !line.conditional && depth == 0;
                    }
                }
                Statement::Gosub(Some(target)) if !defined.contains(target.as_str()) => {
                    out.emit(
                        Diagnostic::error(
                            ErrorCode::UndefinedSubroutine,
                            format!("`GOSUB` to undefined label `{target}`"),
                        )
                        .with_location(at(script, line.number)),
                    );
                }
                _ => {}
            }
        }
        Self::close(script, current, out);

        if script.role == SlotRole::Geometry {
            Self::check_terminator(script, entries, last_main, out);
        }
    }

    fn check_terminator(
        script: &Script<'_>,
        entries: &BTreeSet<usize>,
        last_main: Option<&ScriptLine<'_>>,
        out: &mut DiagnosticCollector,
    ) {
        let Some(last) = last_main else {
            return;
        };
        if last.statement == Some(Statement::End) && !last.conditional {
            return;
        }
        let diag = if entries.is_empty() {
            Diagnostic::warning(
                ErrorCode::MissingTerminator,
                "3D script does not end with `END`",
            )
        } else {
            Diagnostic::error(
                ErrorCode::MissingTerminator,
                "main 3D flow runs into the subroutines without `END`",
            )
        };
        out.emit(
            diag.with_location(at(script, last.number))
                .with_help("finish the main flow with `END`"),
        );
    }
}

impl LintRule for Termination {
    fn name(&self) -> &'static str {
        "termination"
    }

    fn check(&self, ctx: &LintContext<'_>, out: &mut DiagnosticCollector) {
        for script in ctx.scripts() {
            Self::check_script(ctx, script, out);
        }
    }
}

/// Transformation pushes must be removed with `DEL` in the scope that made them.
pub struct TransformBalance;

struct Scope {
    block: Option<BlockKind>,
    pushes: Vec<usize>,
    indeterminate: bool,
}

impl Scope {
    fn new(block: Option<BlockKind>) -> Self {
        Self {
            block,
            pushes: Vec::new(),
            indeterminate: false,
        }
    }
}

impl TransformBalance {
    fn leak(script: &Script<'_>, scope: &Scope) -> Option<Diagnostic> {
        let first = *scope.pushes.first()?;
        if scope.indeterminate {
            return None;
        }
        Some(
            Diagnostic::error(
                ErrorCode::TransformImbalance,
                format!(
                    "{} transformation(s) pushed in this scope are never removed",
                    scope.pushes.len()
                ),
            )
            .with_location(at(script, first))
            .with_help(format!("add `DEL {}` before the scope ends", scope.pushes.len())),
        )
    }

    /// Close the innermost scope, reporting leaked pushes.
    fn close(script: &Script<'_>, scopes: &mut Vec<Scope>, out: &mut DiagnosticCollector) {
        let Some(scope) = scopes.pop() else {
            return;
        };
        let leaked = !scope.pushes.is_empty();
        match (scope.block, scopes.last_mut()) {
            // The net push count of a loop body depends on its iteration count.
            (Some(kind), Some(parent)) if kind.is_loop() && leaked => parent.indeterminate = true,
            _ => out.extend(Self::leak(script, &scope)),
        }
    }

    fn check_script(ctx: &LintContext<'_>, script: &Script<'_>, out: &mut DiagnosticCollector) {
        let entries = ctx.subroutine_entries(script.role);
        let mut scopes = vec![Scope::new(None)];

        for line in &script.lines {
            if entries.contains(&line.number) {
                while !scopes.is_empty() {
                    Self::close(script, &mut scopes, out);
                }
                scopes.push(Scope::new(None));
            }
            let Some(statement) = &line.statement else {
                continue;
            };

            if line.conditional {
                if matches!(statement, Statement::Push | Statement::Del(_)) {
                    if let Some(scope) = scopes.last_mut() {
                        scope.indeterminate = true;
                    }
                }
                continue;
            }

            match statement {
                Statement::Open(kind) => scopes.push(Scope::new(Some(*kind))),
                Statement::Else => {
                    if scopes.last().is_some_and(|s| s.block == Some(BlockKind::If)) {
                        Self::close(script, &mut scopes, out);
                        scopes.push(Scope::new(Some(BlockKind::If)));
                    }
                }
                Statement::Close(kind) => {
                    if let Some(idx) = scopes.iter().rposition(|s| s.block == Some(*kind)) {
                        while scopes.len() > idx {
                            Self::close(script, &mut scopes, out);
                        }
                    }
                }
                Statement::Push => {
                    if let Some(scope) = scopes.last_mut() {
                        scope.pushes.push(line.number);
                    }
                }
                Statement::Del(count) => {
                    if let Some(scope) = scopes.last_mut() {
                        Self::pop(script, line, *count, scope, out);
                    }
                }
                _ => {}
            }
        }

        while !scopes.is_empty() {
            Self::close(script, &mut scopes, out);
        }
    }

    fn pop(
        script: &Script<'_>,
        line: &ScriptLine<'_>,
        count: DelCount,
        scope: &mut Scope,
        out: &mut DiagnosticCollector,
    ) {
        match count {
            DelCount::Top => {
                scope.pushes.clear();
                scope.indeterminate = false;
            }
            DelCount::Unknown => scope.indeterminate = true,
            DelCount::Count(n) if n > scope.pushes.len() && !scope.indeterminate => {
                out.emit(
                    Diagnostic::error(
                        ErrorCode::TransformImbalance,
                        format!(
                            "`DEL {n}` removes more transformations than this scope pushed ({})",
                            scope.pushes.len()
                        ),
                    )
                    .with_location(at(script, line.number))
                    .with_help("pop only what the enclosing block pushed"),
                );
                scope.pushes.clear();
            }
            DelCount::Count(n) => {
                let keep = scope.pushes.len().saturating_sub(n);
                scope.pushes.truncate(keep);
            }
        }
    }
}

impl LintRule for TransformBalance {
    fn name(&self) -> &'static str {
        "transform-balance"
    }

    fn check(&self, ctx: &LintContext<'_>, out: &mut DiagnosticCollector) {
        for script in ctx.scripts() {
            Self::check_script(ctx, script, out);
        }
    }
}

/// Markdown fences, reply headers and CDATA delimiters left in a script.
pub struct ForeignResidue;

impl LintRule for ForeignResidue {
    fn name(&self) -> &'static str {
        "foreign-residue"
    }

    fn check(&self, ctx: &LintContext<'_>, out: &mut DiagnosticCollector) {
        for script in ctx.scripts() {
            for line in &script.lines {
                let upper = line.raw.to_ascii_uppercase();
                if let Some(token) = RESIDUE_TOKENS.iter().find(|t| upper.contains(**t)) {
                    out.emit(
                        Diagnostic::error(
                            ErrorCode::ForeignTokenResidue,
                            format!("`{token}` does not belong in GDL source"),
                        )
                        .with_location(at(script, line.number))
                        .with_help("remove formatting residue from the script"),
                    );
                }
            }
        }
    }
}

/// The 2D script must draw something.
pub struct Projection;

impl Projection {
    fn draws(line: &ScriptLine<'_>) -> bool {
        DRAWING_DIRECTIVES
            .iter()
            .any(|directive| contains_keyword(line.code, directive))
            || crate::syntax::words(line.code)
                .iter()
                .any(|(_, word)| word.to_ascii_uppercase().starts_with("POLY2"))
    }
}

impl LintRule for Projection {
    fn name(&self) -> &'static str {
        "projection"
    }

    fn check(&self, ctx: &LintContext<'_>, out: &mut DiagnosticCollector) {
        let script = ctx.script(SlotRole::Projection);
        if !script.lines.iter().any(Self::draws) {
            out.emit(
                Diagnostic::error(
                    ErrorCode::EmptyProjection,
                    "2D script contains no drawing statement",
                )
                .with_location(at(script, 1))
                .with_help("add `PROJECT2 3, 270, 2` or explicit 2D statements"),
            );
        }
    }
}
