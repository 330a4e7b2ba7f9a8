//! Library-part manifests.
//!
//! Renders and reads the XML files of an HSF tree other than the scripts:
//! `paramlist.xml` (the parameter manifest), `libpartdata.xml` (identity),
//! and the fixed `ancestry.xml`, `calledmacros.xml` and `libpartdocs.xml`.
//! Rendering produces the exact layout `LP_XMLConverter` itself writes.

use std::fmt::Write as _;

use log::debug;

use hsforge_core::{
    Guid, ParamType, Parameter, ParameterTable, Project, Value, param::format_number,
};

use crate::{
    params::CandidateParameter,
    source::quote,
    xml::{self, Element, XmlError, cdata, escape},
};

pub const PARAMLIST_FILE: &str = "paramlist.xml";
pub const LIBPARTDATA_FILE: &str = "libpartdata.xml";
pub const ANCESTRY_FILE: &str = "ancestry.xml";
pub const CALLEDMACROS_FILE: &str = "calledmacros.xml";
pub const LIBPARTDOCS_FILE: &str = "libpartdocs.xml";

/// Classification of a general GDL object, most generic first.
pub const ANCESTRY: [&str; 2] = [
    "F938E33A-329D-4A36-BE3E-85E126820996",
    "103E8D2C-8230-42E1-9597-46F84CCE28C0",
];

const PROLOG: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Flags a manifest entry may carry inside `<Flags>`.
pub const PARAMETER_FLAGS: [&str; 7] = [
    "ParFlg_Child",
    "ParFlg_BoldName",
    "ParFlg_Unique",
    "ParFlg_Hidden",
    "ParFlg_Open",
    "ParFlg_SH_Hidden",
    "ParFlg_Disabled",
];

/// Canonical spelling of a parameter flag, matched case-insensitively.
pub fn parameter_flag(raw: &str) -> Option<&'static str> {
    PARAMETER_FLAGS
        .into_iter()
        .find(|flag| flag.eq_ignore_ascii_case(raw.trim()))
}

/// Manifest entries that carry no value.
const LAYOUT_TAGS: &[&str] = &["Title", "Separator"];

const PARAM_SECT_HEADER: &str = "\t<ParamSectHeader>
\t\t<AutoHotspots>false</AutoHotspots>
\t\t<StatBits>
\t\t\t<STBit_FixSize/>
\t\t</StatBits>
\t\t<WDLeftFrame>0</WDLeftFrame>
\t\t<WDRightFrame>0</WDRightFrame>
\t\t<WDTopFrame>0</WDTopFrame>
\t\t<WDBotFrame>0</WDBotFrame>
\t\t<LayFlags>65535</LayFlags>
\t\t<WDMirrorThickness>0</WDMirrorThickness>
\t\t<WDWallInset>0</WDWallInset>
\t</ParamSectHeader>
";

/// Render `paramlist.xml` for a parameter table.
pub fn render_paramlist(table: &ParameterTable) -> String {
    let mut out = String::from(PROLOG);
    out.push_str("<ParamSection>\n");
    out.push_str(PARAM_SECT_HEADER);
    out.push_str("\t<Parameters SectVersion=\"27\" SectionFlags=\"0\" SubIdent=\"0\">\n");
    for parameter in table {
        render_parameter(&mut out, parameter);
    }
    out.push_str("\t</Parameters>\n</ParamSection>\n");
    out
}

fn render_parameter(out: &mut String, parameter: &Parameter) {
    let tag = parameter.param_type().tag();
    let description = parameter.description().unwrap_or_default();

    // Writing to a String cannot fail.
    let _ = writeln!(out, "\t\t<{tag} Name=\"{}\">", escape(parameter.name()));
    let _ = writeln!(
        out,
        "\t\t\t<Description>{}</Description>",
        cdata(&quote(description))
    );
    if parameter.is_fixed() {
        out.push_str("\t\t\t<Fix/>\n");
    }
    let flags: Vec<&str> = parameter
        .flags()
        .iter()
        .filter_map(|flag| {
            let known = parameter_flag(flag);
            if known.is_none() {
                debug!(name = parameter.name(), flag = flag.as_str(); "Dropping unknown parameter flag");
            }
            known
        })
        .collect();
    if !flags.is_empty() {
        out.push_str("\t\t\t<Flags>\n");
        for flag in flags {
            let _ = writeln!(out, "\t\t\t\t<{flag}/>");
        }
        out.push_str("\t\t\t</Flags>\n");
    }
    let _ = writeln!(
        out,
        "\t\t\t<Value>{}</Value>",
        manifest_value(parameter.param_type(), parameter.value())
    );
    let _ = writeln!(out, "\t\t</{tag}>");
}

/// Format a value the way the manifest stores it.
///
/// Integer-valued types, including the index types, are always written as
/// integers; text is written as a quoted CDATA section.
pub fn manifest_value(param_type: ParamType, value: &Value) -> String {
    match value {
        Value::Text(text) => cdata(&quote(text)),
        Value::Number(n) => match param_type {
            ParamType::Length | ParamType::Angle | ParamType::RealNum => format_number(*n),
            _ => format_number(n.round()),
        },
    }
}

/// Read the parameters declared in `paramlist.xml`.
///
/// Entries are returned in manifest order as candidates, so type checks and
/// duplicate detection happen in the parameter builder. Layout entries such
/// as titles and separators are skipped.
pub fn parse_paramlist(text: &str) -> Result<Vec<CandidateParameter>, XmlError> {
    let root = xml::parse_document(text)?;
    let parameters = if root.name() == "Parameters" {
        &root
    } else {
        root.descendant("Parameters").unwrap_or(&root)
    };

    let candidates = parameters
        .elements()
        .filter(|element| {
            let layout = LAYOUT_TAGS.contains(&element.name());
            if layout {
                debug!(tag = element.name(); "Skipping manifest layout entry");
            }
            !layout
        })
        .map(candidate)
        .collect();
    Ok(candidates)
}

fn candidate(element: &Element) -> CandidateParameter {
    let name = element.attribute("Name").unwrap_or_default();
    let tag = element.name();
    let raw = element
        .child("Value")
        .map(|value| value.text())
        .unwrap_or_default();

    let value = match ParamType::from_tag(tag) {
        Some(ParamType::String) | None => Value::Text(unquote(raw.trim()).to_string()),
        Some(_) => raw
            .trim()
            .parse::<f64>()
            .map(Value::Number)
            .unwrap_or_else(|_| Value::Text(raw.trim().to_string())),
    };
    let description = element
        .child("Description")
        .map(|d| unquote(d.text().trim()).to_string())
        .filter(|d| !d.is_empty());
    let flags = element
        .child("Flags")
        .map(|flags| flags.elements().map(|f| f.name().to_string()).collect())
        .unwrap_or_default();

    CandidateParameter::new(name, tag, value)
        .with_description(description)
        .with_fixed(element.child("Fix").is_some())
        .with_flags(flags)
}

/// Drop one pair of matching surrounding quotes.
fn unquote(text: &str) -> &str {
    ['"', '\'']
        .iter()
        .find_map(|q| {
            text.strip_prefix(*q)
                .and_then(|t| t.strip_suffix(*q))
                .filter(|_| text.len() >= 2)
        })
        .unwrap_or(text)
}

/// Render `libpartdata.xml`.
pub fn render_libpartdata(project: &Project) -> String {
    let mut out = String::from(PROLOG);
    let _ = writeln!(
        out,
        "<LibpartData Owner=\"0\" Signature=\"0\" Version=\"{}\">",
        project.version()
    );
    let _ = write!(
        out,
        "\t<Identification>
\t\t<MainGUID>{}</MainGUID>
\t\t<IsPlaceable>true</IsPlaceable>
\t\t<IsArchivable>false</IsArchivable>
\t\t<MigrationValue>Normal</MigrationValue>
\t\t<IsTemplate>false</IsTemplate>
\t</Identification>
",
        project.guid()
    );
    for (section, version) in [
        ("Ancestry", 1),
        ("CalledMacros", 2),
        ("Script_3D", 20),
        ("Script_2D", 20),
        ("Script_1D", 20),
        ("Script_UI", 20),
        ("Script_VL", 20),
        ("ParamSection", 27),
        ("Copyright", 1),
        ("Keywords", 1),
    ] {
        let _ = writeln!(
            out,
            "\t<{section} SectVersion=\"{version}\" SectionFlags=\"0\" SubIdent=\"0\"/>"
        );
    }
    out.push_str("</LibpartData>\n");
    out
}

/// Identity read from `libpartdata.xml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibpartData {
    /// `None` when the file has no valid `MainGUID`.
    pub guid: Option<Guid>,
    pub version: Option<u32>,
}

pub fn parse_libpartdata(text: &str) -> Result<LibpartData, XmlError> {
    let root = xml::parse_document(text)?;
    Ok(LibpartData {
        guid: root
            .descendant("MainGUID")
            .and_then(|guid| Guid::parse(&guid.text())),
        version: root
            .attribute("Version")
            .and_then(|version| version.trim().parse().ok()),
    })
}

pub fn render_ancestry() -> String {
    let mut out = String::from(PROLOG);
    out.push_str("<Ancestry>\n");
    for guid in ANCESTRY {
        let _ = writeln!(out, "\t<MainGUID>{guid}</MainGUID>");
    }
    out.push_str("</Ancestry>\n");
    out
}

pub fn render_calledmacros() -> String {
    format!("{PROLOG}<CalledMacros>\n</CalledMacros>\n")
}

/// Render `libpartdocs.xml`, carrying the project description as keywords.
pub fn render_libpartdocs(project: &Project) -> String {
    format!(
        "{PROLOG}<libpartdocs>
\t<Copyright>
\t\t<Author></Author>
\t\t<License>
\t\t\t<Type>CC BY</Type>
\t\t\t<Version>4.0</Version>
\t\t</License>
\t</Copyright>
\t<Keywords SectVersion=\"1\" SectionFlags=\"0\" SubIdent=\"0\">
\t\t{}
\t</Keywords>
</libpartdocs>
",
        cdata(project.description().unwrap_or_default())
    )
}

/// Read the keywords back from `libpartdocs.xml`.
pub fn parse_libpartdocs(text: &str) -> Result<Option<String>, XmlError> {
    let root = xml::parse_document(text)?;
    Ok(root
        .child("Keywords")
        .map(|keywords| keywords.text().trim().to_string())
        .filter(|keywords| !keywords.is_empty()))
}
