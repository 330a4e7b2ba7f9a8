//! Flat GDL source files.
//!
//! A flat source holds a whole library part in one text file: optional
//! metadata comments, a parameter list and one section per script, each
//! introduced by a header line (see [`aliases`](crate::aliases)). Parsing
//! is permissive: anything unexpected becomes a warning and parsing goes on.

use std::{fs, io, path::Path};

use log::{debug, info};

use hsforge_core::{
    Diagnostic, ErrorCode, Guid, Location, ParamType, Parameter, ParameterTable, Project,
    SlotRole, Value,
    error::DiagnosticCollector,
    param::{format_number, is_reserved},
};

use crate::{
    aliases::{SectionTarget, recognize_header},
    params::{CandidateParameter, ParameterBuilder},
    syntax,
};

const BOM: char = '\u{feff}';

/// Metadata comments are only looked for this far into the file.
const METADATA_WINDOW: usize = 20;

const NAME_KEYS: &[&str] = &["Name", "Object", "名称", "对象"];
const DESCRIPTION_KEYS: &[&str] = &["Description", "描述", "说明"];

/// Name prefixes of GDL globals and request variables, never user parameters.
const GLOBAL_PREFIXES: &[&str] = &["GLOB_", "SYMB_", "AC_", "WALL_", "WIDO_"];

/// A parsed flat source.
#[derive(Debug, Clone)]
pub struct ParsedSource {
    pub project: Project,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Slot(SlotRole),
    Parameters,
    Dropped,
}

/// A header seen in the source, tracked to report empty sections.
struct OpenSection {
    title: String,
    line: usize,
    content: usize,
}

#[derive(Default)]
struct Sections<'a> {
    slots: [Vec<&'a str>; 5],
    seen: [bool; 5],
    parameters: Vec<(usize, &'a str)>,
    name: Option<String>,
    description: Option<String>,
}

/// Parse a flat source, naming the project `Untitled` unless the source
/// carries a name comment.
pub fn parse_source(text: &str) -> ParsedSource {
    parse_source_named(text, "Untitled")
}

/// Parse a flat source with a fallback project name.
pub fn parse_source_named(text: &str, default_name: &str) -> ParsedSource {
    let mut collector = DiagnosticCollector::new();
    let sections = split_sections(text.trim_start_matches(BOM), &mut collector);

    let mut table = parameter_list(&sections.parameters, &mut collector);
    let scripts: Vec<(SlotRole, String)> = SlotRole::ALL
        .into_iter()
        .map(|role| (role, join_lines(&sections.slots[role.index()])))
        .collect();

    discover_parameters(&scripts[SlotRole::Master.index()].1, &mut table, &mut collector);

    let inserted = table.ensure_reserved();
    if !inserted.is_empty() {
        debug!(names:? = inserted; "Inserted reserved parameters");
    }
    for name in table.coerce_reserved() {
        collector.emit(Diagnostic::warning(
            ErrorCode::ParseAnomaly,
            format!("reserved parameter `{name}` was redeclared; kept as a fixed Length"),
        ));
    }

    let name = sections.name.unwrap_or_else(|| default_name.to_string());
    let project = Project::from_parts(Guid::generate(), name, table, scripts)
        .with_description(sections.description);
    let diagnostics = collector.finish();
    info!(
        name = project.name(),
        parameters = project.parameters().len(),
        warnings = diagnostics.len();
        "Parsed flat source"
    );
    ParsedSource {
        project,
        diagnostics,
    }
}

/// Read and parse a flat source file.
///
/// The file stem names the project unless the source names itself. Bytes
/// that are not valid UTF-8 are replaced and reported.
pub fn parse_file(path: &Path) -> io::Result<ParsedSource> {
    let bytes = fs::read(path)?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string());

    match String::from_utf8(bytes) {
        Ok(text) => Ok(parse_source_named(&text, &stem)),
        Err(err) => {
            let text = String::from_utf8_lossy(err.as_bytes()).into_owned();
            let mut parsed = parse_source_named(&text, &stem);
            parsed.diagnostics.insert(
                0,
                Diagnostic::warning(
                    ErrorCode::ParseAnomaly,
                    format!("{} is not valid UTF-8; undecodable bytes were replaced", path.display()),
                ),
            );
            Ok(parsed)
        }
    }
}

fn split_sections<'a>(text: &'a str, collector: &mut DiagnosticCollector) -> Sections<'a> {
    let mut sections = Sections::default();
    let mut current = Section::Slot(SlotRole::Master);
    let mut open: Option<OpenSection> = None;

    let lines: Vec<&str> = text.lines().collect();
    for (idx, line) in lines.iter().copied().enumerate() {
        let number = idx + 1;

        if let Some(target) = recognize_header(line) {
            close_section(open.take(), collector);
            current = enter_section(target, &mut sections, line, number, collector);
            open = Some(OpenSection {
                title: line.trim().to_string(),
                line: number,
                content: 0,
            });
            continue;
        }

        if open.is_none() && number <= METADATA_WINDOW && read_metadata(line, &mut sections) {
            continue;
        }
        if is_separator(line) && (open.is_none() || frames_header(&lines, idx)) {
            continue;
        }
        if let Some(section) = open.as_mut().filter(|_| !line.trim().is_empty()) {
            section.content += 1;
        }

        match current {
            Section::Slot(role) => sections.slots[role.index()].push(line),
            Section::Parameters => sections.parameters.push((number, line)),
            Section::Dropped => {}
        }
    }
    close_section(open, collector);
    sections
}

fn enter_section(
    target: SectionTarget,
    sections: &mut Sections<'_>,
    header: &str,
    number: usize,
    collector: &mut DiagnosticCollector,
) -> Section {
    match target {
        SectionTarget::Slot(role) => {
            if sections.seen[role.index()] {
                collector.emit(Diagnostic::warning(
                    ErrorCode::ParseAnomaly,
                    format!(
                        "section `{}` repeated at line {number}; contents appended",
                        header.trim()
                    ),
                ));
            }
            sections.seen[role.index()] = true;
            Section::Slot(role)
        }
        SectionTarget::Parameters => Section::Parameters,
        SectionTarget::Unsupported(kind) => {
            collector.emit(
                Diagnostic::warning(
                    ErrorCode::UnsupportedSection,
                    format!("{kind} at line {number} has no library-part slot; contents dropped"),
                )
                .with_help("move its statements into one of the five scripts"),
            );
            Section::Dropped
        }
    }
}

fn close_section(section: Option<OpenSection>, collector: &mut DiagnosticCollector) {
    if let Some(section) = section.filter(|s| s.content == 0) {
        collector.emit(Diagnostic::warning(
            ErrorCode::EmptySection,
            format!("section `{}` at line {} is empty", section.title, section.line),
        ));
    }
}

/// Record a `! Name: ...` or `! Description: ...` comment.
fn read_metadata(line: &str, sections: &mut Sections<'_>) -> bool {
    let Some(text) = line.trim().strip_prefix('!') else {
        return false;
    };
    let text = text.trim_start_matches('!').trim();
    if let Some(name) = metadata_value(text, NAME_KEYS) {
        sections.name = Some(name.to_string());
        return true;
    }
    if let Some(description) = metadata_value(text, DESCRIPTION_KEYS) {
        sections.description = Some(description.to_string());
        return true;
    }
    false
}

fn metadata_value<'a>(text: &'a str, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| {
        let head = text.get(..key.len())?;
        if !head.eq_ignore_ascii_case(key) {
            return None;
        }
        let rest = text[key.len()..].trim_start();
        let value = rest
            .strip_prefix(':')
            .or_else(|| rest.strip_prefix('：'))?
            .trim();
        (!value.is_empty()).then_some(value)
    })
}

/// Decorative separator lines such as `! ==========`.
fn is_separator(line: &str) -> bool {
    let body = line.trim().trim_start_matches('!').trim();
    body.chars().count() >= 3 && body.chars().all(|c| "=-_*#".contains(c))
}

/// Whether the separator at `idx` sits directly above or below a header,
/// blank lines aside. Any other separator is script text.
fn frames_header(lines: &[&str], idx: usize) -> bool {
    let filled = |line: &&&str| !line.trim().is_empty();
    let header = |line: Option<&&str>| line.is_some_and(|line| recognize_header(line).is_some());
    header(lines[..idx].iter().rev().find(filled)) || header(lines[idx + 1..].iter().find(filled))
}

/// Join section lines, dropping leading and trailing blank lines.
pub(crate) fn join_lines(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => {
            let mut text = lines[start..=end].join("\n");
            text.push('\n');
            text
        }
        _ => String::new(),
    }
}

fn parameter_list(
    lines: &[(usize, &str)],
    collector: &mut DiagnosticCollector,
) -> ParameterTable {
    let builder = ParameterBuilder::new().fix_reserved(true);
    let mut corrections = Vec::new();
    let mut table = ParameterTable::new();

    for (number, line) in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some(decl) = syntax::parse_declaration(trimmed) else {
            if !trimmed.starts_with('!') {
                collector.emit(
                    Diagnostic::warning(
                        ErrorCode::UnreadableDeclaration,
                        format!("line {number} is not a parameter declaration: `{trimmed}`"),
                    )
                    .with_help("write `Type name = value ! description`"),
                );
            }
            continue;
        };
        let candidate = CandidateParameter::new(decl.name, decl.type_name, decl.value)
            .with_description(decl.description)
            .with_fixed(decl.fixed)
            .with_flags(decl.flags);

        match builder.correct(candidate, &mut corrections) {
            Ok(parameter) => {
                if let Err(err) = table.insert(parameter) {
                    collector.emit(Diagnostic::warning(
                        err.code(),
                        format!("{err} (line {number}); first declaration kept"),
                    ));
                }
            }
            Err(diag) => collector.emit(
                diag.demoted()
                    .with_help(format!("the declaration on line {number} was skipped")),
            ),
        }
    }

    for correction in corrections {
        collector.emit(Diagnostic::warning(ErrorCode::ParseAnomaly, correction.to_string()));
    }
    table
}

/// Register undeclared `name = constant` assignments from the master script.
fn discover_parameters(
    master: &str,
    table: &mut ParameterTable,
    collector: &mut DiagnosticCollector,
) {
    for (idx, line) in master.lines().enumerate() {
        let Some((name, value)) = syntax::parse_assignment(line) else {
            continue;
        };
        if table.contains(&name) || is_reserved(&name) || is_global(&name) {
            continue;
        }
        let param_type = infer_type(&name, &value);
        collector.emit(
            Diagnostic::warning(
                ErrorCode::InferredParameter,
                format!("`{name}` registered as {param_type} parameter from its assignment"),
            )
            .with_location(Location::new(SlotRole::Master, idx + 1))
            .with_help("declare it in the parameter list to set its type explicitly"),
        );
        let parameter = Parameter::new(name, param_type, value);
        // Cannot collide: presence was checked above.
        let _ = table.insert(parameter);
    }
}

fn is_global(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    GLOBAL_PREFIXES.iter().any(|prefix| upper.starts_with(prefix))
}

/// `true` if `name` starts with a lower-case Hungarian `prefix`.
fn has_prefix(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Guess a parameter type from the literal's shape and GDL naming habits.
pub fn infer_type(name: &str, value: &Value) -> ParamType {
    let Value::Number(n) = value else {
        return ParamType::String;
    };
    let whole = n.fract() == 0.0;

    if has_prefix(name, "b") && (*n == 0.0 || *n == 1.0) {
        return ParamType::Boolean;
    }
    let indexed = [
        ("mat", ParamType::Material),
        ("pen", ParamType::PenColor),
        ("fill", ParamType::FillPattern),
        ("lt", ParamType::LineType),
    ];
    if let Some((_, ty)) = indexed
        .iter()
        .find(|(prefix, _)| whole && has_prefix(name, prefix))
    {
        return *ty;
    }
    if has_prefix(name, "ang") || has_prefix(name, "rot") {
        return ParamType::Angle;
    }
    if whole {
        ParamType::Integer
    } else {
        ParamType::Length
    }
}

/// Render a project as a flat source.
///
/// Parsing the result reproduces the parameter table and the script texts.
pub fn render_source(project: &Project) -> String {
    let mut out = String::new();
    out.push_str(&format!("! Name: {}\n", project.name()));
    if let Some(description) = project.description() {
        out.push_str(&format!("! Description: {description}\n"));
    }

    out.push_str("\n! ==== PARAMETERS ====\n");
    for parameter in project.parameters() {
        out.push_str(&render_declaration(parameter));
        out.push('\n');
    }

    for slot in project.slots().iter().filter(|slot| !slot.is_empty()) {
        out.push_str(&format!("\n! ==== {} ====\n", slot.role().header()));
        out.push_str(slot.text());
        if !slot.text().ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

/// Render one `Type name = value [@attrs] [! description]` declaration.
pub fn render_declaration(parameter: &Parameter) -> String {
    let mut line = format!(
        "{} {} = {}",
        parameter.param_type(),
        parameter.name(),
        render_value(parameter.value())
    );
    if parameter.is_fixed() {
        line.push_str(" @fixed");
    }
    for flag in parameter.flags() {
        line.push_str(" @");
        line.push_str(flag);
    }
    if let Some(description) = parameter.description() {
        line.push_str(" ! ");
        line.push_str(&quote(description));
    }
    line
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Number(n) => format_number(*n),
        Value::Text(text) => quote(text),
    }
}

/// Quote `text` with `"`, or `'` when it holds a double quote.
pub fn quote(text: &str) -> String {
    if text.contains('"') {
        format!("'{text}'")
    } else {
        format!("\"{text}\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(parsed: &ParsedSource) -> Vec<ErrorCode> {
        parsed.diagnostics.iter().map(Diagnostic::code).collect()
    }

    #[test]
    fn test_bare_geometry_gets_reserved_parameters() {
        let parsed = parse_source("BLOCK A, B, ZZYZX\nEND\n");
        let project = &parsed.project;

        assert_eq!(project.script(SlotRole::Master), "BLOCK A, B, ZZYZX\nEND\n");
        for name in ["A", "B", "ZZYZX"] {
            let p = project.parameter(name).unwrap();
            assert_eq!(p.param_type(), ParamType::Length);
            assert!(p.is_fixed());
            assert_eq!(p.value(), &Value::Number(1.0));
        }
    }

    #[test]
    fn test_redeclared_reserved_parameter_is_coerced() {
        let parsed = parse_source("! ==== PARAMETERS ====\nInteger A = 2\n! ==== 3D SCRIPT ====\nEND\n");

        let a = parsed.project.parameter("A").unwrap();
        assert_eq!(a.param_type(), ParamType::Length);
        assert!(a.is_fixed());
        assert_eq!(a.value(), &Value::Number(2.0));
        assert!(
            parsed
                .diagnostics
                .iter()
                .any(|d| d.code() == ErrorCode::ParseAnomaly && d.message().contains("`A`"))
        );
    }

    #[test]
    fn test_sections_and_metadata() {
        let text = "\
! Name: Side Table
! Description: A small table
! ==== PARAMETERS ====
Length legH = 0.7 ! Leg height
! bLegs Bool 1 Show legs

! ==== 3D SCRIPT ====
BLOCK A, B, legH
END

【平面脚本】
PROJECT2 3, 270, 2
";
        let parsed = parse_source(text);
        let project = &parsed.project;

        assert_eq!(project.name(), "Side Table");
        assert_eq!(project.description(), Some("A small table"));
        assert_eq!(project.script(SlotRole::Geometry), "BLOCK A, B, legH\nEND\n");
        assert_eq!(project.script(SlotRole::Projection), "PROJECT2 3, 270, 2\n");
        assert_eq!(project.parameter("legH").unwrap().param_type(), ParamType::Length);
        assert_eq!(project.parameter("bLegs").unwrap().param_type(), ParamType::Boolean);
        assert_eq!(codes(&parsed), [ErrorCode::ParseAnomaly]);
    }

    #[test]
    fn test_master_assignments_are_inferred() {
        let text = "\
! ==== MASTER SCRIPT ====
legCount = 4
thick = 0.025
bShelf = 1
matTop = 12
angTilt = 15
label = \"Oak\"
GLOB_FOO = 1
total = legCount * 2
";
        let parsed = parse_source(text);
        let p = &parsed.project;

        assert_eq!(p.parameter("legCount").unwrap().param_type(), ParamType::Integer);
        assert_eq!(p.parameter("thick").unwrap().param_type(), ParamType::Length);
        assert_eq!(p.parameter("bShelf").unwrap().param_type(), ParamType::Boolean);
        assert_eq!(p.parameter("matTop").unwrap().param_type(), ParamType::Material);
        assert_eq!(p.parameter("angTilt").unwrap().param_type(), ParamType::Angle);
        assert_eq!(p.parameter("label").unwrap().param_type(), ParamType::String);
        assert!(p.parameter("GLOB_FOO").is_none());
        assert!(p.parameter("total").is_none());

        let inferred = &parsed.diagnostics[0];
        assert_eq!(inferred.code(), ErrorCode::InferredParameter);
        assert_eq!(inferred.location(), Some(Location::new(SlotRole::Master, 1)));
    }

    #[test]
    fn test_declared_parameters_win_over_inference() {
        let text = "\
PARAMETERS:
Integer legCount = 3
MASTER SCRIPT:
legCount = 4
";
        let parsed = parse_source(text);
        assert_eq!(
            parsed.project.parameter("legCount").unwrap().value(),
            &Value::Number(3.0)
        );
        assert!(!codes(&parsed).contains(&ErrorCode::InferredParameter));
    }

    #[test]
    fn test_anomalies_are_warnings() {
        let text = "\
! ==== 3D SCRIPT ====
BLOCK 1, 1, 1
! ==== PROPERTIES SCRIPT ====
DESCRIPTOR \"x\"
! ==== UI SCRIPT ====
! ==== 3D SCRIPT ====
END
! ==== PARAMETERS ====
this is not a declaration
Colour c = 1
";
        let parsed = parse_source(text);
        let codes = codes(&parsed);

        assert!(parsed.diagnostics.iter().all(|d| d.severity().is_warning()));
        assert!(codes.contains(&ErrorCode::UnsupportedSection));
        assert!(codes.contains(&ErrorCode::EmptySection));
        assert!(codes.contains(&ErrorCode::ParseAnomaly));
        assert!(codes.contains(&ErrorCode::UnreadableDeclaration));
        assert!(codes.contains(&ErrorCode::UnsupportedParameterType));
        assert_eq!(parsed.project.script(SlotRole::Geometry), "BLOCK 1, 1, 1\nEND\n");
        assert!(parsed.project.parameter("c").is_none());
    }

    #[test]
    fn test_render_then_parse() {
        let mut project = Project::new("Shelf");
        project
            .parameters_mut()
            .insert(
                Parameter::new("note", ParamType::String, Value::Text("say \"hi\"".into()))
                    .with_description("Label text")
                    .with_flags(vec!["ParFlg_Hidden".into()]),
            )
            .unwrap();
        project.set_script(SlotRole::Geometry, "BLOCK A, B, ZZYZX\nEND\n");
        project.set_script(SlotRole::Projection, "PROJECT2 3, 270, 2\n");

        let parsed = parse_source(&render_source(&project));

        assert_eq!(parsed.project.name(), "Shelf");
        assert_eq!(parsed.project.parameters(), project.parameters());
        for role in SlotRole::ALL {
            assert_eq!(parsed.project.script(role), project.script(role));
        }
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn test_comments_inside_scripts_survive() {
        let mut project = Project::new("Shelf");
        project.set_script(
            SlotRole::Geometry,
            "! 3D Script\nBLOCK A, B, ZZYZX\n! =====\n  ! ==== legs ====\nEND\n",
        );
        project.set_script(SlotRole::Projection, "! 2D script (symbol)\nPROJECT2 3, 270, 2\n");

        let parsed = parse_source(&render_source(&project));

        for role in SlotRole::ALL {
            assert_eq!(parsed.project.script(role), project.script(role));
        }
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn test_separators_around_headers_are_dropped() {
        let text = "\
! ==========
! Name: Shelf
! ==========

! ==========
! ==== 3D SCRIPT ====
! ==========
BLOCK 1, 1, 1
END
";
        let parsed = parse_source(text);
        assert_eq!(parsed.project.script(SlotRole::Geometry), "BLOCK 1, 1, 1\nEND\n");
        assert_eq!(parsed.project.script(SlotRole::Master), "");
    }

    #[test]
    fn test_parse_strips_bom() {
        let parsed = parse_source("\u{feff}! ==== 3D SCRIPT ====\nEND\n");
        assert_eq!(parsed.project.script(SlotRole::Geometry), "END\n");
    }
}
