//! The compiler boundary.
//!
//! [`Compiler`] is the seam the orchestration loop compiles through;
//! [`LpConverter`] implements it with ArchiCAD's `LP_XMLConverter`. Each
//! call works in its own scratch directory, removed on every exit path.

use std::{
    env,
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
    process::Command,
    time::Duration,
};

use log::{debug, info, warn};
use tempfile::TempDir;

use hsforge_core::{Diagnostic, DiagnosticList, ErrorCode, Location, Project, SlotRole};

use crate::{
    config::CompilerConfig,
    hsf::{self, LoadedTree},
    process::{self, Output, RunError},
};

/// Environment variable naming the converter executable.
pub const CONVERTER_ENV: &str = "CONVERTER_PATH";

const CONVERTER_NAMES: &[&str] = &["LP_XMLConverter", "LP_XMLConverter.exe"];

/// Most recent first.
const ARCHICAD_VERSIONS: [u32; 5] = [29, 28, 27, 26, 25];

/// Lines of converter output kept when no diagnostic line is recognized.
const TAIL_LINES: usize = 20;

/// A compiled library part.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    path: PathBuf,
    diagnostics: Vec<Diagnostic>,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            path: path.into(),
            diagnostics,
        }
    }

    /// Location of the `.gsm` file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Warnings the compiler reported on success.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// Compiles projects into library parts and back.
pub trait Compiler {
    /// Compile `project`, returning the artifact or the compiler's diagnostics.
    fn compile(&self, project: &Project) -> Result<Artifact, DiagnosticList>;

    /// Decompile an existing library part.
    fn decompile(&self, artifact: &Path) -> Result<LoadedTree, DiagnosticList>;
}

/// [`Compiler`] backed by `LP_XMLConverter`.
#[derive(Debug, Clone)]
pub struct LpConverter {
    path: Option<PathBuf>,
    timeout: Duration,
    output_dir: PathBuf,
}

impl LpConverter {
    /// A converter at `path`; `None` makes every call fail with
    /// [`ErrorCode::ExternalToolUnavailable`].
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            timeout: CompilerConfig::default().timeout(),
            output_dir: PathBuf::from("."),
        }
    }

    /// Build from configuration, discovering the converter when no path is set.
    pub fn from_config(config: &CompilerConfig) -> Self {
        let path = config.path().map(Path::to_path_buf).or_else(discover);
        Self::new(path)
            .with_timeout(config.timeout())
            .with_output_dir(config.output_dir().unwrap_or(Path::new(".")))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn converter(&self) -> Result<&Path, DiagnosticList> {
        let Some(path) = self.path.as_deref() else {
            return Err(unavailable(
                "LP_XMLConverter not found",
                format!("install ArchiCAD, set `compiler.path` or export {CONVERTER_ENV}"),
            ));
        };
        if !path.is_file() {
            return Err(unavailable(
                format!("LP_XMLConverter not found at {}", path.display()),
                "check `compiler.path`",
            ));
        }
        Ok(path)
    }

    fn invoke(
        &self,
        converter: &Path,
        mode: &str,
        source: &Path,
        dest: &Path,
    ) -> Result<Output, DiagnosticList> {
        let mut command = Command::new(converter);
        command.args([OsStr::new(mode), source.as_os_str(), dest.as_os_str()]);
        debug!(mode = mode, source:? = source, dest:? = dest; "Invoking converter");

        process::run_bounded(&mut command, None, self.timeout).map_err(|err| {
            let diag = match &err {
                RunError::Timeout { timeout, .. } => Diagnostic::error(
                    ErrorCode::Timeout,
                    format!("LP_XMLConverter did not finish within {}s", timeout.as_secs()),
                ),
                _ if err.is_not_found() => Diagnostic::error(
                    ErrorCode::ExternalToolUnavailable,
                    err.to_string(),
                ),
                _ => Diagnostic::error(ErrorCode::CompilerError, err.to_string()),
            };
            DiagnosticList::from(diag)
        })
    }
}

impl Default for LpConverter {
    fn default() -> Self {
        Self::from_config(&CompilerConfig::default())
    }
}

impl Compiler for LpConverter {
    fn compile(&self, project: &Project) -> Result<Artifact, DiagnosticList> {
        let converter = self.converter()?;
        let scratch = scratch_dir()?;
        let tree = scratch.path().join(file_stem(project.name()));
        hsf::write_tree(project, &tree)
            .map_err(|err| scratch_failure("could not write the HSF tree", &err))?;

        fs::create_dir_all(&self.output_dir)
            .map_err(|err| scratch_failure("could not create the output directory", &err))?;
        let gsm = self
            .output_dir
            .join(format!("{}.gsm", file_stem(project.name())));

        let output = self.invoke(converter, "hsf2libpart", &tree, &gsm)?;
        let diagnostics = extract_diagnostics(&output);

        if !output.status.success() {
            warn!(status:? = output.status; "Compilation failed");
            return Err(failure(diagnostics, &output));
        }
        if !gsm.is_file() {
            return Err(DiagnosticList::from(Diagnostic::error(
                ErrorCode::CompilerError,
                format!("LP_XMLConverter reported success but wrote no {}", gsm.display()),
            )));
        }

        info!(artifact:? = gsm; "Compiled library part");
        Ok(Artifact::new(
            gsm,
            diagnostics.into_iter().map(Diagnostic::demoted).collect(),
        ))
    }

    fn decompile(&self, artifact: &Path) -> Result<LoadedTree, DiagnosticList> {
        let converter = self.converter()?;
        if !artifact.is_file() {
            return Err(DiagnosticList::from(Diagnostic::error(
                ErrorCode::CompilerError,
                format!("library part {} not found", artifact.display()),
            )));
        }
        let scratch = scratch_dir()?;
        let stem = artifact
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "libpart".to_string());
        let tree = scratch.path().join(file_stem(&stem));

        let output = self.invoke(converter, "libpart2hsf", artifact, &tree)?;
        if !output.status.success() {
            return Err(failure(extract_diagnostics(&output), &output));
        }

        let loaded = hsf::read_tree(&tree)
            .map_err(|err| scratch_failure("could not read the decompiled tree", &err))?;
        info!(artifact:? = artifact; "Decompiled library part");
        Ok(loaded)
    }
}

fn unavailable(message: impl Into<String>, help: impl Into<String>) -> DiagnosticList {
    DiagnosticList::from(
        Diagnostic::error(ErrorCode::ExternalToolUnavailable, message).with_help(help),
    )
}

fn scratch_dir() -> Result<TempDir, DiagnosticList> {
    tempfile::Builder::new()
        .prefix("hsforge-")
        .tempdir()
        .map_err(|err| scratch_failure("could not create a scratch directory", &err))
}

fn scratch_failure(what: &str, err: &std::io::Error) -> DiagnosticList {
    DiagnosticList::from(Diagnostic::error(
        ErrorCode::CompilerError,
        format!("{what}: {err}"),
    ))
}

/// Make sure a failed run carries at least one error.
fn failure(mut diagnostics: Vec<Diagnostic>, output: &Output) -> DiagnosticList {
    if !diagnostics.iter().any(Diagnostic::is_error) {
        let text = if output.stderr.trim().is_empty() {
            &output.stdout
        } else {
            &output.stderr
        };
        let lines: Vec<&str> = text.lines().collect();
        let tail = lines[lines.len().saturating_sub(TAIL_LINES)..].join("\n");
        diagnostics.push(Diagnostic::error(
            ErrorCode::CompilerError,
            format!("LP_XMLConverter exited with {}:\n{}", output.status, tail.trim()),
        ));
    }
    DiagnosticList::from(diagnostics)
}

/// File-system friendly form of a project name.
fn file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim_matches('.').trim();
    if stem.is_empty() {
        "libpart".to_string()
    } else {
        stem.to_string()
    }
}

/// Turn converter output lines mentioning errors or warnings into diagnostics.
pub(crate) fn extract_diagnostics(output: &Output) -> Vec<Diagnostic> {
    parse_output(&output.stderr)
        .into_iter()
        .chain(parse_output(&output.stdout))
        .collect()
}

/// Diagnostics from one output stream.
pub fn parse_output(text: &str) -> Vec<Diagnostic> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            let lower = line.to_lowercase();
            let diag = if lower.contains("error") {
                Diagnostic::error(ErrorCode::CompilerError, line)
            } else if lower.contains("warning") {
                Diagnostic::warning(ErrorCode::CompilerWarning, line)
            } else {
                return None;
            };
            Some(diag.with_maybe_location(locate(&lower)))
        })
        .collect()
}

/// Map a converter message onto a slot and a local line, when it names both.
fn locate(lower: &str) -> Option<Location> {
    let role = SlotRole::ALL.into_iter().find(|role| {
        lower.contains(role.file_name()) || lower.contains(&role.header().to_lowercase())
    })?;
    Some(Location::new(role, line_number(lower)?))
}

fn line_number(lower: &str) -> Option<usize> {
    let after_keyword = lower.match_indices("line").find_map(|(idx, word)| {
        let rest = lower[idx + word.len()..].trim_start_matches([' ', ':', '#']);
        leading_number(rest)
    });
    after_keyword.or_else(|| {
        // `file:12: message`
        let segments: Vec<&str> = lower.split(':').map(str::trim).collect();
        segments
            .iter()
            .skip(1)
            .take(segments.len().saturating_sub(2))
            .find(|segment| !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()))
            .and_then(|segment| leading_number(segment))
    })
}

fn leading_number(text: &str) -> Option<usize> {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    text[..end].parse().ok().filter(|n| *n > 0)
}

/// Find the converter: `CONVERTER_PATH`, then `PATH`, then the ArchiCAD
/// install directories of the current platform.
pub fn discover() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONVERTER_ENV).map(PathBuf::from) {
        if path.is_file() {
            return Some(path);
        }
        warn!(path:? = path; "Ignoring {CONVERTER_ENV}, not a file");
    }
    let found = search_path().or_else(|| install_locations().into_iter().find(|p| p.is_file()));
    debug!(found:? = found; "Converter discovery finished");
    found
}

fn search_path() -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .flat_map(|dir| CONVERTER_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

fn install_locations() -> Vec<PathBuf> {
    ARCHICAD_VERSIONS
        .iter()
        .flat_map(|version| {
            if cfg!(target_os = "macos") {
                let base = PathBuf::from(format!("/Applications/GRAPHISOFT/Archicad {version}"));
                vec![
                    base.join("LP_XMLConverter.app/Contents/MacOS/LP_XMLConverter"),
                    base.join("LP_XMLConverter"),
                ]
            } else if cfg!(windows) {
                vec![PathBuf::from(format!(
                    r"C:\Program Files\GRAPHISOFT\Archicad {version}\LP_XMLConverter.exe"
                ))]
            } else {
                Vec::new()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output_locations() {
        let diags = parse_output(
            "Converting...\n\
             Error in 3D script at line 12: unknown command BLOK\n\
             scripts/2d.gdl:4: warning: unused variable\n\
             error: paramlist.xml is malformed\n\
             done\n",
        );

        assert_eq!(diags.len(), 3);
        assert_eq!(diags[0].code(), ErrorCode::CompilerError);
        assert_eq!(diags[0].location(), Some(Location::new(SlotRole::Geometry, 12)));
        assert_eq!(diags[1].code(), ErrorCode::CompilerWarning);
        assert_eq!(diags[1].location(), Some(Location::new(SlotRole::Projection, 4)));
        assert_eq!(diags[2].location(), None);
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("Side Table"), "Side Table");
        assert_eq!(file_stem("a/b:c"), "a_b_c");
        assert_eq!(file_stem("  "), "libpart");
    }

    #[test]
    fn test_missing_converter_is_unavailable() {
        let project = Project::new("x");

        let err = LpConverter::new(None).compile(&project).unwrap_err();
        assert!(err.contains(ErrorCode::ExternalToolUnavailable));

        let err = LpConverter::new(Some("/nonexistent/LP_XMLConverter".into()))
            .decompile(Path::new("x.gsm"))
            .unwrap_err();
        assert!(err.contains(ErrorCode::ExternalToolUnavailable));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_converter_reports_output_tail() {
        // `sh hsf2libpart ...` fails: there is no script called `hsf2libpart`.
        let out = tempfile::tempdir().unwrap();
        let converter = LpConverter::new(Some("/bin/sh".into())).with_output_dir(out.path());

        let err = converter.compile(&Project::new("Chair")).unwrap_err();

        assert!(err.has_errors());
        assert!(
            err.diagnostics()
                .iter()
                .all(|d| d.code() == ErrorCode::CompilerError)
        );
    }
}
