//! On-disk HSF source trees.
//!
//! An HSF tree is the directory layout `LP_XMLConverter` compiles from and
//! decompiles to:
//!
//! ```text
//! <name>/
//!   libpartdata.xml    identity
//!   paramlist.xml      parameter manifest
//!   ancestry.xml       classification
//!   calledmacros.xml
//!   libpartdocs.xml
//!   scripts/1d.gdl 3d.gdl 2d.gdl vl.gdl ui.gdl
//! ```
//!
//! Every file is UTF-8 with a byte-order mark; the converter rejects files
//! without one.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, info};

use hsforge_core::{
    Diagnostic, ErrorCode, Guid, ParameterTable, Project, SlotRole,
    error::DiagnosticCollector,
    project::DEFAULT_VERSION,
};
use hsforge_parser::{
    ParameterBuilder,
    manifest::{self, LibpartData},
};

pub const SCRIPTS_DIR: &str = "scripts";

const BOM: &str = "\u{feff}";

/// A project read back from a tree, with whatever was wrong with the tree.
#[derive(Debug, Clone)]
pub struct LoadedTree {
    pub project: Project,
    pub diagnostics: Vec<Diagnostic>,
}

/// Write `project` as an HSF tree rooted at `dir`, creating it if needed.
///
/// All five script files are always written, empty slots included.
pub fn write_tree(project: &Project, dir: &Path) -> io::Result<()> {
    let scripts = dir.join(SCRIPTS_DIR);
    fs::create_dir_all(&scripts)?;

    write_text(&dir.join(manifest::LIBPARTDATA_FILE), &manifest::render_libpartdata(project))?;
    write_text(
        &dir.join(manifest::PARAMLIST_FILE),
        &manifest::render_paramlist(project.parameters()),
    )?;
    write_text(&dir.join(manifest::ANCESTRY_FILE), &manifest::render_ancestry())?;
    write_text(&dir.join(manifest::CALLEDMACROS_FILE), &manifest::render_calledmacros())?;
    write_text(&dir.join(manifest::LIBPARTDOCS_FILE), &manifest::render_libpartdocs(project))?;
    for slot in project.slots() {
        write_text(&scripts.join(slot.role().file_name()), slot.text())?;
    }

    info!(dir:? = dir, guid = project.guid().as_str(); "Wrote HSF tree");
    Ok(())
}

fn write_text(path: &Path, text: &str) -> io::Result<()> {
    let mut bytes = Vec::with_capacity(BOM.len() + text.len());
    bytes.extend_from_slice(BOM.as_bytes());
    bytes.extend_from_slice(text.as_bytes());
    fs::write(path, bytes)
}

/// Read a file, dropping the BOM. A missing file yields `None`.
fn read_text(path: &Path, collector: &mut DiagnosticCollector) -> io::Result<Option<String>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            collector.emit(Diagnostic::warning(
                ErrorCode::ParseAnomaly,
                format!("{} is not valid UTF-8; undecodable bytes were replaced", path.display()),
            ));
            String::from_utf8_lossy(err.as_bytes()).into_owned()
        }
    };
    Ok(Some(match text.strip_prefix(BOM) {
        Some(stripped) => stripped.to_string(),
        None => text,
    }))
}

/// Read an HSF tree.
///
/// Missing or unreadable manifest files are tolerated and reported as
/// warnings; the project name is the directory name.
///
/// # Errors
///
/// Only when `dir` itself cannot be read.
pub fn read_tree(dir: &Path) -> io::Result<LoadedTree> {
    fs::read_dir(dir)?;
    let mut collector = DiagnosticCollector::new();
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string());

    let identity = read_identity(&dir.join(manifest::LIBPARTDATA_FILE), &mut collector)?;
    let mut parameters = read_parameters(&dir.join(manifest::PARAMLIST_FILE), &mut collector)?;
    for name in parameters.coerce_reserved() {
        collector.emit(Diagnostic::warning(
            ErrorCode::ParseAnomaly,
            format!("paramlist.xml declares `{name}` as other than a fixed Length; corrected"),
        ));
    }
    let description = read_text(&dir.join(manifest::LIBPARTDOCS_FILE), &mut collector)?
        .and_then(|text| manifest::parse_libpartdocs(&text).ok().flatten());

    let mut scripts = Vec::new();
    for role in SlotRole::ALL {
        let path = script_path(dir, role);
        match read_text(&path, &mut collector)? {
            Some(text) => scripts.push((role, text)),
            None => debug!(file = role.file_name(); "Script file missing, slot left empty"),
        }
    }

    let guid = identity.guid.unwrap_or_else(|| {
        collector.emit(Diagnostic::warning(
            ErrorCode::ParseAnomaly,
            "libpartdata.xml has no valid MainGUID; a new identity was generated",
        ));
        Guid::generate()
    });
    let project = Project::from_parts(guid, name, parameters, scripts)
        .with_description(description)
        .with_version(identity.version.unwrap_or(DEFAULT_VERSION));

    info!(dir:? = dir, parameters = project.parameters().len(); "Read HSF tree");
    Ok(LoadedTree {
        project,
        diagnostics: collector.finish(),
    })
}

/// Path of a slot's script file below a tree root.
pub fn script_path(dir: &Path, role: SlotRole) -> PathBuf {
    dir.join(SCRIPTS_DIR).join(role.file_name())
}

fn read_identity(path: &Path, collector: &mut DiagnosticCollector) -> io::Result<LibpartData> {
    let Some(text) = read_text(path, collector)? else {
        collector.emit(missing(path));
        return Ok(LibpartData::default());
    };
    Ok(manifest::parse_libpartdata(&text).unwrap_or_else(|err| {
        collector.emit(malformed(path, &err));
        LibpartData::default()
    }))
}

fn read_parameters(
    path: &Path,
    collector: &mut DiagnosticCollector,
) -> io::Result<ParameterTable> {
    let mut table = ParameterTable::new();
    let Some(text) = read_text(path, collector)? else {
        collector.emit(missing(path));
        return Ok(table);
    };
    let candidates = match manifest::parse_paramlist(&text) {
        Ok(candidates) => candidates,
        Err(err) => {
            collector.emit(malformed(path, &err));
            return Ok(table);
        }
    };

    let builder = ParameterBuilder::new();
    let mut corrections = Vec::new();
    for candidate in candidates {
        match builder.correct(candidate, &mut corrections) {
            Ok(parameter) => {
                if let Err(err) = table.insert(parameter) {
                    collector.emit(Diagnostic::from(err).demoted());
                }
            }
            Err(diag) => collector.emit(diag.demoted()),
        }
    }
    collector.extend(
        corrections
            .into_iter()
            .map(|c| Diagnostic::warning(ErrorCode::ParseAnomaly, c.to_string())),
    );
    Ok(table)
}

fn missing(path: &Path) -> Diagnostic {
    Diagnostic::warning(
        ErrorCode::ParseAnomaly,
        format!("{} is missing", path.display()),
    )
}

fn malformed(path: &Path, err: &impl std::fmt::Display) -> Diagnostic {
    Diagnostic::warning(
        ErrorCode::ParseAnomaly,
        format!("{} could not be read: {err}", path.display()),
    )
}

#[cfg(test)]
mod tests {
    use hsforge_core::{ParamType, Parameter, Value};

    use super::*;

    fn sample() -> Project {
        let mut project = Project::new("Shelf").with_description(Some("wall shelf".into()));
        project
            .parameters_mut()
            .insert(
                Parameter::new("iShelves", ParamType::Integer, Value::Number(3.0))
                    .with_description("Number of shelves"),
            )
            .unwrap();
        project.set_script(SlotRole::Geometry, "BLOCK A, B, ZZYZX\nEND\n");
        project.set_script(SlotRole::Projection, "PROJECT2 3, 270, 2\n");
        project
    }

    #[test]
    fn test_tree_layout_and_bom() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(&sample(), dir.path()).unwrap();

        for file in [
            manifest::LIBPARTDATA_FILE,
            manifest::PARAMLIST_FILE,
            manifest::ANCESTRY_FILE,
            manifest::CALLEDMACROS_FILE,
            manifest::LIBPARTDOCS_FILE,
        ] {
            let bytes = fs::read(dir.path().join(file)).unwrap();
            assert!(bytes.starts_with(&[0xEF, 0xBB, 0xBF]), "{file} has no BOM");
        }
        for role in SlotRole::ALL {
            let bytes = fs::read(script_path(dir.path(), role)).unwrap();
            assert!(bytes.starts_with(&[0xEF, 0xBB, 0xBF]));
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let project = sample();
        write_tree(&project, dir.path()).unwrap();

        let loaded = read_tree(dir.path()).unwrap();

        assert!(loaded.diagnostics.is_empty(), "{:?}", loaded.diagnostics);
        assert_eq!(loaded.project.guid(), project.guid());
        assert_eq!(loaded.project.version(), project.version());
        assert_eq!(loaded.project.description(), Some("wall shelf"));
        assert_eq!(loaded.project.parameters(), project.parameters());
        for role in SlotRole::ALL {
            assert_eq!(loaded.project.script(role), project.script(role));
        }
    }

    #[test]
    fn test_read_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(SCRIPTS_DIR)).unwrap();
        fs::write(script_path(dir.path(), SlotRole::Geometry), "\u{feff}END\n").unwrap();

        let loaded = read_tree(dir.path()).unwrap();

        assert_eq!(loaded.project.script(SlotRole::Geometry), "END\n");
        assert!(loaded.project.parameter("A").is_some());
        assert!(
            loaded
                .diagnostics
                .iter()
                .all(|d| d.code() == ErrorCode::ParseAnomaly && !d.is_error())
        );
        assert_eq!(loaded.diagnostics.len(), 3);
    }

    #[test]
    fn test_mistyped_reserved_parameter_is_corrected() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(&sample(), dir.path()).unwrap();
        let mut table = ParameterTable::new();
        table
            .insert(Parameter::new("A", ParamType::Integer, Value::Number(2.0)))
            .unwrap();
        fs::write(
            dir.path().join(manifest::PARAMLIST_FILE),
            manifest::render_paramlist(&table),
        )
        .unwrap();

        let loaded = read_tree(dir.path()).unwrap();

        let a = loaded.project.parameter("A").unwrap();
        assert_eq!(a.param_type(), ParamType::Length);
        assert!(a.is_fixed());
        assert_eq!(a.value(), &Value::Number(2.0));
        assert!(
            loaded
                .diagnostics
                .iter()
                .any(|d| d.code() == ErrorCode::ParseAnomaly && d.message().contains("`A`"))
        );
    }

    #[test]
    fn test_read_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_tree(&dir.path().join("absent")).is_err());
    }
}
