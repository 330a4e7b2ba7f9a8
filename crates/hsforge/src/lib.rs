//! hsforge - Generate, validate, compile and repair ArchiCAD GDL library parts.
//!
//! A library part is held as a [`Project`]: a parameter table and five
//! script slots. Projects come from a flat GDL source file, from an HSF tree
//! on disk, or from nothing. The [`orchestrator`] loop then asks a
//! [`Generator`](generation::Generator) for script text, merges and checks
//! the reply, and compiles the result through a
//! [`Compiler`](compiler::Compiler), feeding every defect back until the
//! part compiles or the loop gives up.

pub mod compiler;
pub mod config;
pub mod generation;
pub mod hsf;
pub mod knowledge;
pub mod orchestrator;
pub mod planner;
pub mod prompt;

mod error;
mod process;

pub use hsforge_core::{Diagnostic, DiagnosticList, ErrorCode, Project, SlotRole};

pub use error::ForgeError;

use std::path::Path;

use log::{debug, info};

use hsforge_core::error::sort_diagnostics;
use hsforge_parser::{ParsedSource, parse_file, parse_source};

use compiler::{Compiler, LpConverter};
use config::AppConfig;
use generation::{CommandGenerator, Generator};
use hsf::LoadedTree;
use knowledge::Knowledge;
use orchestrator::{FailureReport, RunContext, RunSuccess};

/// Entry point for every hsforge operation.
///
/// Holds the configuration and the domain documents loaded once for all
/// runs.
///
/// # Examples
///
/// ```rust,no_run
/// use hsforge::{Forge, SlotRole, compiler::Compiler, config::AppConfig};
///
/// let forge = Forge::new(AppConfig::default());
///
/// let (project, diagnostics) = forge.create_from_source(
///     "! ==== 3D SCRIPT ====\nBLOCK A, B, ZZYZX\nEND\n",
/// );
/// assert!(diagnostics.iter().all(|d| !d.is_error()));
/// assert!(!project.slot(SlotRole::Geometry).is_empty());
///
/// let artifact = forge.compiler().compile(&project)
///     .expect("Failed to compile");
/// ```
#[derive(Debug, Default)]
pub struct Forge {
    config: AppConfig,
    knowledge: Knowledge,
}

impl Forge {
    /// Create a forge with no domain documents.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            knowledge: Knowledge::default(),
        }
    }

    /// Create a forge and load the domain documents named by the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError` when the knowledge directory cannot be read.
    pub fn load(config: AppConfig) -> Result<Self, ForgeError> {
        let knowledge = match config.knowledge().dir() {
            Some(dir) => Knowledge::load(dir).map_err(|err| ForgeError::file(dir, err))?,
            None => Knowledge::default(),
        };
        Ok(Self { config, knowledge })
    }

    pub fn with_knowledge(mut self, knowledge: Knowledge) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn knowledge(&self) -> &Knowledge {
        &self.knowledge
    }

    /// A blank project holding only the reserved parameters.
    pub fn create_from_scratch(&self, name: &str) -> Project {
        info!(name; "Creating project");
        Project::new(name)
    }

    /// Parse flat GDL source text. Never fails; anomalies are reported.
    pub fn create_from_source(&self, text: &str) -> (Project, Vec<Diagnostic>) {
        let ParsedSource {
            project,
            diagnostics,
        } = parse_source(text);
        debug!(name = project.name(), diagnostics = diagnostics.len(); "Parsed source");
        (project, diagnostics)
    }

    /// Parse a flat GDL source file, naming the project after the file.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError` when the file cannot be read.
    pub fn import(&self, path: &Path) -> Result<(Project, Vec<Diagnostic>), ForgeError> {
        let ParsedSource {
            project,
            diagnostics,
        } = parse_file(path).map_err(|err| ForgeError::file(path, err))?;
        Ok((project, diagnostics))
    }

    /// Every parameter and structural defect of `project`, sorted.
    pub fn lint(&self, project: &Project) -> Vec<Diagnostic> {
        let mut diagnostics = hsforge_parser::validate_table(project.parameters());
        diagnostics.extend(hsforge_parser::lint(project));
        sort_diagnostics(&mut diagnostics);
        diagnostics
    }

    /// The converter described by the configuration.
    pub fn compiler(&self) -> LpConverter {
        LpConverter::from_config(self.config.compiler())
    }

    /// The configured generation command, if any.
    pub fn generator(&self) -> Option<CommandGenerator> {
        CommandGenerator::from_config(self.config.generation())
    }

    /// Run the loop with the configured attempt limit.
    ///
    /// # Errors
    ///
    /// A [`FailureReport`] with the full attempt history.
    pub fn run<G, C>(
        &self,
        project: &mut Project,
        task: &str,
        generator: &mut G,
        compiler: &C,
    ) -> Result<RunSuccess, FailureReport>
    where
        G: Generator + ?Sized,
        C: Compiler + ?Sized,
    {
        self.run_with(
            project,
            task,
            self.config.run().max_attempts(),
            generator,
            compiler,
            self.context(),
        )
    }

    /// Run the loop with an explicit attempt limit and context.
    ///
    /// # Errors
    ///
    /// A [`FailureReport`] with the full attempt history.
    pub fn run_with<G, C>(
        &self,
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
        orchestrator::run(project, task, max_attempts, generator, compiler, context)
    }

    /// A run context over this forge's documents and generation timeout.
    pub fn context(&self) -> RunContext<'_> {
        RunContext::new(&self.knowledge).with_generation_timeout(self.config.generation().timeout())
    }

    /// Write `project` as an HSF tree into `dir`.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError` when a file cannot be written.
    pub fn save_tree(&self, project: &Project, dir: &Path) -> Result<(), ForgeError> {
        hsf::write_tree(project, dir).map_err(|err| ForgeError::file(dir, err))
    }

    /// Read an HSF tree from `dir`.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError` when the directory cannot be read.
    pub fn load_tree(&self, dir: &Path) -> Result<LoadedTree, ForgeError> {
        hsf::read_tree(dir).map_err(|err| ForgeError::file(dir, err))
    }

    /// Decompile a `.gsm` library part with the configured converter.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError::Diagnostics` when the converter fails.
    pub fn decompile(&self, artifact: &Path) -> Result<LoadedTree, ForgeError> {
        Ok(self.compiler().decompile(artifact)?)
    }
}
