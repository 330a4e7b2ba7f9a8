//! Parameter table builder and validator.
//!
//! Candidate parameters come from flat sources, generation replies and
//! manifests. They pass through two phases before reaching a
//! [`ParameterTable`]:
//!
//! 1. **Type correction** rewrites commonly confused type spellings onto the
//!    closed [`ParamType`] set and drops manifest flags outside the known
//!    set. Every rewrite is reported as a [`Correction`].
//! 2. **Structural validation** checks names, the reserved parameters,
//!    boolean domains, value shapes and description encoding. Each
//!    violation carries its own [`ErrorCode`].

use log::debug;

use hsforge_core::{
    Diagnostic, DiagnosticList, ErrorCode, Location, ParamType, Parameter, ParameterTable, Value,
    error::DiagnosticCollector,
    param::{RESERVED_PARAMETERS, is_reserved},
};

use crate::manifest::parameter_flag;

/// Type spellings that are rewritten onto a canonical type.
const TYPE_ALIASES: &[(&str, ParamType)] = &[
    ("Float", ParamType::RealNum),
    ("Real", ParamType::RealNum),
    ("Double", ParamType::RealNum),
    ("Number", ParamType::RealNum),
    ("Int", ParamType::Integer),
    ("Bool", ParamType::Boolean),
    ("Text", ParamType::String),
    ("Str", ParamType::String),
    ("Pen", ParamType::PenColor),
    ("Fill", ParamType::FillPattern),
    ("Line", ParamType::LineType),
    ("Mat", ParamType::Material),
];

/// A parameter as proposed by a source, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateParameter {
    pub name: String,
    pub type_name: String,
    pub value: Value,
    pub description: Option<String>,
    pub fixed: bool,
    pub flags: Vec<String>,
    pub location: Option<Location>,
}

impl CandidateParameter {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            value,
            description: None,
            fixed: false,
            flags: Vec::new(),
            location: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_fixed(mut self, fixed: bool) -> Self {
        self.fixed = fixed;
        self
    }

    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_location(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }
}

impl From<&Parameter> for CandidateParameter {
    fn from(parameter: &Parameter) -> Self {
        CandidateParameter::new(
            parameter.name(),
            parameter.param_type().tag(),
            parameter.value().clone(),
        )
        .with_description(parameter.description().map(str::to_string))
        .with_fixed(parameter.is_fixed())
        .with_flags(parameter.flags().to_vec())
    }
}

/// A type name rewritten during type correction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeCorrection {
    pub name: String,
    pub from: String,
    pub to: ParamType,
}

/// A change the builder applied to the candidate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correction {
    /// A type spelling was rewritten.
    Retyped(TypeCorrection),
    /// A missing reserved parameter was inserted at its default.
    ReservedInserted(&'static str),
    /// A flag outside the manifest's flag set was dropped.
    FlagDropped { name: String, flag: String },
}

impl std::fmt::Display for Correction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Correction::Retyped(c) => {
                write!(f, "type `{}` of `{}` corrected to {}", c.from, c.name, c.to)
            }
            Correction::ReservedInserted(name) => {
                write!(f, "reserved parameter `{name}` inserted at its default")
            }
            Correction::FlagDropped { name, flag } => {
                write!(f, "unknown flag `{flag}` of `{name}` dropped")
            }
        }
    }
}

/// Resolve a raw type name onto the closed type set.
///
/// Returns the type and whether the spelling had to be rewritten. Canonical
/// names are matched case-insensitively, then the alias table is consulted.
pub fn correct_type(raw: &str) -> Option<(ParamType, bool)> {
    let raw = raw.trim();
    if let Some(ty) = ParamType::from_tag(raw) {
        return Some((ty, ty.tag() != raw));
    }
    TYPE_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(raw))
        .map(|(_, ty)| (*ty, true))
}

/// A validated table and the corrections applied while building it.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltTable {
    pub table: ParameterTable,
    pub corrections: Vec<Correction>,
}

/// Builds a [`ParameterTable`] from candidates.
#[derive(Debug, Clone, Default)]
pub struct ParameterBuilder {
    fix_reserved: bool,
}

impl ParameterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark reserved candidates as fixed before validation.
    ///
    /// Generation replies rarely carry the fixed marker, so reply merging
    /// enables this.
    pub fn fix_reserved(mut self, fix: bool) -> Self {
        self.fix_reserved = fix;
        self
    }

    /// Run type correction only, returning a parameter or the unsupported-type
    /// diagnostic.
    pub fn correct(
        &self,
        candidate: CandidateParameter,
        corrections: &mut Vec<Correction>,
    ) -> Result<Parameter, Diagnostic> {
        let Some((param_type, rewritten)) = correct_type(&candidate.type_name) else {
            return Err(Diagnostic::error(
                ErrorCode::UnsupportedParameterType,
                format!(
                    "parameter `{}` has unsupported type `{}`",
                    candidate.name, candidate.type_name
                ),
            )
            .with_maybe_location(candidate.location)
            .with_help(format!(
                "use one of: {}",
                ParamType::ALL.map(ParamType::tag).join(", ")
            )));
        };
        if rewritten {
            debug!(
                name = candidate.name.as_str(),
                from = candidate.type_name.as_str(),
                to = param_type.tag();
                "Corrected parameter type"
            );
            corrections.push(Correction::Retyped(TypeCorrection {
                name: candidate.name.clone(),
                from: candidate.type_name.clone(),
                to: param_type,
            }));
        }

        let mut flags = Vec::with_capacity(candidate.flags.len());
        for raw in &candidate.flags {
            match parameter_flag(raw) {
                Some(flag) => flags.push(flag.to_string()),
                None => corrections.push(Correction::FlagDropped {
                    name: candidate.name.clone(),
                    flag: raw.clone(),
                }),
            }
        }

        let fixed = candidate.fixed || (self.fix_reserved && is_reserved(&candidate.name));
        let mut parameter = Parameter::new(candidate.name, param_type, candidate.value)
            .with_fixed(fixed)
            .with_flags(flags);
        if let Some(description) = candidate.description {
            parameter = parameter.with_description(description);
        }
        Ok(parameter)
    }

    /// Correct and validate `candidates` into a table.
    ///
    /// The returned table always holds the reserved parameters; missing ones
    /// are inserted at their defaults and reported as corrections.
    ///
    /// # Errors
    ///
    /// Every structural violation found, sorted, when at least one is fatal.
    pub fn build(
        &self,
        candidates: impl IntoIterator<Item = CandidateParameter>,
    ) -> Result<BuiltTable, DiagnosticList> {
        let mut collector = DiagnosticCollector::new();
        let mut corrections = Vec::new();
        let mut table = ParameterTable::new();

        for candidate in candidates {
            let location = candidate.location;
            let parameter = match self.correct(candidate, &mut corrections) {
                Ok(parameter) => parameter,
                Err(diag) => {
                    collector.emit(diag);
                    continue;
                }
            };
            for diag in check_parameter(&parameter) {
                collector.emit(diag.with_maybe_location(location));
            }
            if let Err(err) = table.insert(parameter) {
                collector.emit(Diagnostic::from(err).with_maybe_location(location));
            }
        }

        corrections.extend(
            table
                .ensure_reserved()
                .into_iter()
                .map(Correction::ReservedInserted),
        );

        collector.into_result()?;
        Ok(BuiltTable { table, corrections })
    }
}

/// Validate a whole table, including the presence of the reserved parameters.
pub fn validate_table(table: &ParameterTable) -> Vec<Diagnostic> {
    let mut collector = DiagnosticCollector::new();
    for (name, _) in RESERVED_PARAMETERS {
        if !table.contains(name) {
            collector.emit(
                Diagnostic::error(
                    ErrorCode::MissingReservedParameter,
                    format!("reserved parameter `{name}` is missing"),
                )
                .with_help(format!("declare `Length {name} = 1 @fixed`")),
            );
        }
    }
    for parameter in table {
        collector.extend(check_parameter(parameter));
    }
    collector.finish()
}

/// Structural checks on one parameter.
pub fn check_parameter(parameter: &Parameter) -> Vec<Diagnostic> {
    let mut found = Vec::new();
    let name = parameter.name();
    let ty = parameter.param_type();

    if parameter.is_reserved() {
        if ty != ParamType::Length {
            found.push(
                Diagnostic::error(
                    ErrorCode::ReservedParameterType,
                    format!("reserved parameter `{name}` must be Length, found {ty}"),
                )
                .with_help(format!("declare `{name}` as Length")),
            );
        }
        if !parameter.is_fixed() {
            found.push(
                Diagnostic::error(
                    ErrorCode::ReservedParameterNotFixed,
                    format!("reserved parameter `{name}` must be fixed"),
                )
                .with_help("mark it with `@fixed`"),
            );
        }
    }

    if !ty.accepts(parameter.value()) {
        let code = if ty == ParamType::Boolean {
            ErrorCode::BooleanDomain
        } else {
            ErrorCode::InvalidValue
        };
        let help = match ty {
            ParamType::Boolean => "boolean parameters take exactly 0 or 1",
            ParamType::String => "string parameters take quoted text",
            ParamType::Integer => "integer parameters take whole numbers",
            t if t.is_index() => "index parameters take whole attribute indices",
            _ => "numeric parameters take finite numbers",
        };
        found.push(
            Diagnostic::error(
                code,
                format!(
                    "value `{}` of parameter `{name}` is not a valid {ty}",
                    parameter.value()
                ),
            )
            .with_help(help),
        );
    } else if parameter.value().as_text().is_some_and(|text| !is_embeddable(text)) {
        found.push(Diagnostic::error(
            ErrorCode::InvalidValue,
            format!("text value of parameter `{name}` cannot be embedded in the manifest"),
        ));
    }

    if parameter.description().is_some_and(|d| !is_embeddable(d)) {
        found.push(
            Diagnostic::error(
                ErrorCode::MalformedDescription,
                format!("description of parameter `{name}` cannot be delimited safely"),
            )
            .with_help("remove line breaks, `]]>`, or one of the quote characters"),
        );
    }
    found
}

/// Returns `true` if `text` can be written as a quoted CDATA literal.
pub fn is_embeddable(text: &str) -> bool {
    !text.contains("]]>")
        && !text.contains(['\n', '\r'])
        && !(text.contains('"') && text.contains('\''))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, ty: &str, value: f64) -> CandidateParameter {
        CandidateParameter::new(name, ty, Value::Number(value))
    }

    #[test]
    fn test_correct_type() {
        assert_eq!(correct_type("Length"), Some((ParamType::Length, false)));
        assert_eq!(correct_type("length"), Some((ParamType::Length, true)));
        assert_eq!(correct_type("Float"), Some((ParamType::RealNum, true)));
        assert_eq!(correct_type("bool"), Some((ParamType::Boolean, true)));
        assert_eq!(correct_type("Mat"), Some((ParamType::Material, true)));
        assert_eq!(correct_type("Color"), None);
    }

    #[test]
    fn test_build_reports_corrections() {
        let built = ParameterBuilder::new()
            .build([candidate("ratio", "Float", 0.5)])
            .unwrap();

        assert_eq!(
            built.corrections[0],
            Correction::Retyped(TypeCorrection {
                name: "ratio".into(),
                from: "Float".into(),
                to: ParamType::RealNum,
            })
        );
        assert!(built.corrections.contains(&Correction::ReservedInserted("A")));
        assert_eq!(built.table.get("ratio").unwrap().param_type(), ParamType::RealNum);
    }

    #[test]
    fn test_unknown_flags_are_dropped() {
        let built = ParameterBuilder::new()
            .build([candidate("w", "Length", 0.5)
                .with_flags(vec!["parflg_hidden".into(), "Fix/><Evil".into()])])
            .unwrap();

        assert_eq!(built.table.get("w").unwrap().flags(), ["ParFlg_Hidden"]);
        assert!(built.corrections.contains(&Correction::FlagDropped {
            name: "w".into(),
            flag: "Fix/><Evil".into(),
        }));
    }

    #[test]
    fn test_build_always_has_reserved() {
        let built = ParameterBuilder::new().build([]).unwrap();
        for (name, _) in RESERVED_PARAMETERS {
            let p = built.table.get(name).unwrap();
            assert_eq!(p.param_type(), ParamType::Length);
            assert!(p.is_fixed());
        }
    }

    #[test]
    fn test_boolean_domain_is_not_clamped() {
        let err = ParameterBuilder::new()
            .build([candidate("flag", "Boolean", 2.0)])
            .unwrap_err();

        assert_eq!(err.len(), 1);
        assert_eq!(err.diagnostics()[0].code(), ErrorCode::BooleanDomain);
    }

    #[test]
    fn test_unsupported_type() {
        let err = ParameterBuilder::new()
            .build([candidate("c", "Colour", 1.0)])
            .unwrap_err();
        assert!(err.contains(ErrorCode::UnsupportedParameterType));
    }

    #[test]
    fn test_duplicate_names() {
        let err = ParameterBuilder::new()
            .build([candidate("w", "Length", 1.0), candidate("w", "Length", 2.0)])
            .unwrap_err();
        assert!(err.contains(ErrorCode::DuplicateParameter));
    }

    #[test]
    fn test_reserved_shape() {
        let err = ParameterBuilder::new()
            .build([candidate("A", "Integer", 1.0)])
            .unwrap_err();
        assert!(err.contains(ErrorCode::ReservedParameterType));
        assert!(err.contains(ErrorCode::ReservedParameterNotFixed));

        let built = ParameterBuilder::new()
            .fix_reserved(true)
            .build([candidate("A", "Length", 2.0)])
            .unwrap();
        assert!(built.table.get("A").unwrap().is_fixed());
    }

    #[test]
    fn test_invalid_value_and_description() {
        let err = ParameterBuilder::new()
            .build([
                candidate("n", "Integer", 1.5),
                candidate("d", "Length", 1.0)
                    .with_description(Some("say \"hi\" isn't".into())),
            ])
            .unwrap_err();

        assert!(err.contains(ErrorCode::InvalidValue));
        assert!(err.contains(ErrorCode::MalformedDescription));
    }

    #[test]
    fn test_validate_table_missing_reserved() {
        let mut table = ParameterTable::new();
        table
            .insert(Parameter::new("w", ParamType::Length, Value::Number(1.0)))
            .unwrap();

        let diags = validate_table(&table);
        assert_eq!(diags.len(), 3);
        assert!(
            diags
                .iter()
                .all(|d| d.code() == ErrorCode::MissingReservedParameter)
        );
    }
}
