//! Parameters and the parameter table.
//!
//! The parameter type system is closed: every parameter has one of the ten
//! [`ParamType`]s a library part manifest can express. Three reserved
//! parameters (`A`, `B`, `ZZYZX`) describe the object's bounding box and
//! are always present.

use std::{collections::BTreeMap, fmt};

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::ModelError;

/// Reserved parameter names with their descriptions, in table order.
pub const RESERVED_PARAMETERS: [(&str, &str); 3] =
    [("A", "Width"), ("B", "Depth"), ("ZZYZX", "Height")];

/// Default value of a reserved parameter, in meters.
pub const RESERVED_DEFAULT: f64 = 1.0;

/// Returns `true` if `name` is one of the reserved parameter names.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_PARAMETERS.iter().any(|(reserved, _)| *reserved == name)
}

/// The reserved parameters at their built-in defaults.
pub fn reserved_parameters() -> impl Iterator<Item = Parameter> {
    RESERVED_PARAMETERS.iter().map(|(name, description)| {
        Parameter::new(*name, ParamType::Length, Value::Number(RESERVED_DEFAULT))
            .with_description(*description)
            .with_fixed(true)
    })
}

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ParamType {
    Length,
    Angle,
    RealNum,
    Integer,
    Boolean,
    String,
    Material,
    FillPattern,
    LineType,
    PenColor,
}

impl ParamType {
    pub const ALL: [ParamType; 10] = [
        ParamType::Length,
        ParamType::Angle,
        ParamType::RealNum,
        ParamType::Integer,
        ParamType::Boolean,
        ParamType::String,
        ParamType::Material,
        ParamType::FillPattern,
        ParamType::LineType,
        ParamType::PenColor,
    ];

    /// The manifest element name for this type.
    pub fn tag(self) -> &'static str {
        match self {
            ParamType::Length => "Length",
            ParamType::Angle => "Angle",
            ParamType::RealNum => "RealNum",
            ParamType::Integer => "Integer",
            ParamType::Boolean => "Boolean",
            ParamType::String => "String",
            ParamType::Material => "Material",
            ParamType::FillPattern => "FillPattern",
            ParamType::LineType => "LineType",
            ParamType::PenColor => "PenColor",
        }
    }

    /// Resolve a canonical type name, ignoring case.
    ///
    /// Aliases such as `Float` are not resolved here; see the parameter
    /// builder's type correction for those.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        Self::ALL
            .into_iter()
            .find(|ty| ty.tag().eq_ignore_ascii_case(tag))
    }

    /// Returns `true` for the attribute index types.
    pub fn is_index(self) -> bool {
        matches!(
            self,
            ParamType::Material | ParamType::FillPattern | ParamType::LineType | ParamType::PenColor
        )
    }

    /// Returns `true` if `value` has a shape this type can hold.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (ParamType::String, Value::Text(_)) => true,
            (ParamType::String, Value::Number(_)) => false,
            (_, Value::Text(_)) => false,
            (ParamType::Boolean, Value::Number(n)) => *n == 0.0 || *n == 1.0,
            (ParamType::Integer, Value::Number(n)) => n.is_finite() && n.fract() == 0.0,
            (ty, Value::Number(n)) if ty.is_index() => n.is_finite() && n.fract() == 0.0,
            (_, Value::Number(n)) => n.is_finite(),
        }
    }

    /// The value a fresh parameter of this type starts with.
    pub fn default_value(self) -> Value {
        match self {
            ParamType::String => Value::Text(String::new()),
            ParamType::Length => Value::Number(RESERVED_DEFAULT),
            ParamType::Material | ParamType::FillPattern | ParamType::LineType | ParamType::PenColor => {
                Value::Number(1.0)
            }
            _ => Value::Number(0.0),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A parameter default value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            Value::Number(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Text(text) => f.write_str(text),
        }
    }
}

/// Format a number the way GDL source writes it.
///
/// Whole numbers print without a fractional part; everything else uses the
/// shortest representation that reads back to the same value.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// One entry of the parameter table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    name: String,
    param_type: ParamType,
    value: Value,
    description: Option<String>,
    fixed: bool,
    flags: Vec<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, param_type: ParamType, value: Value) -> Self {
        Self {
            name: name.into(),
            param_type,
            value,
            description: None,
            fixed: false,
            flags: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = (!description.is_empty()).then_some(description);
        self
    }

    pub fn with_fixed(mut self, fixed: bool) -> Self {
        self.fixed = fixed;
        self
    }

    /// Attach raw manifest flags such as `ParFlg_Hidden`.
    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.flags = flags;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn param_type(&self) -> ParamType {
        self.param_type
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    pub fn is_reserved(&self) -> bool {
        is_reserved(&self.name)
    }

    /// Replace the value, checking it against the declared type.
    pub fn set_value(&mut self, value: Value) -> Result<(), ModelError> {
        if !self.param_type.accepts(&value) {
            return Err(ModelError::TypeMismatch {
                name: self.name.clone(),
                param_type: self.param_type,
                value,
            });
        }
        self.value = value;
        Ok(())
    }
}

/// Ordered, name-indexed parameter table.
///
/// Iteration follows declaration order, with the reserved parameters first
/// once [`ensure_reserved`](Self::ensure_reserved) has run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterTable {
    entries: IndexMap<String, Parameter>,
}

impl ParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table holding only the reserved parameters at their defaults.
    pub fn with_reserved() -> Self {
        let mut table = Self::new();
        table.ensure_reserved();
        table
    }

    /// Append a parameter, rejecting duplicate names.
    pub fn insert(&mut self, parameter: Parameter) -> Result<(), ModelError> {
        if self.entries.contains_key(parameter.name()) {
            return Err(ModelError::DuplicateParameter {
                name: parameter.name,
            });
        }
        self.entries.insert(parameter.name.clone(), parameter);
        Ok(())
    }

    /// Insert or replace a parameter in place, returning the previous entry.
    pub fn upsert(&mut self, parameter: Parameter) -> Option<Parameter> {
        self.entries.insert(parameter.name.clone(), parameter)
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Set the value of a declared parameter.
    pub fn set_value(&mut self, name: &str, value: Value) -> Result<(), ModelError> {
        let parameter = self
            .entries
            .get_mut(name)
            .ok_or_else(|| ModelError::UnknownParameter {
                name: name.to_string(),
            })?;
        parameter.set_value(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert missing reserved parameters at their defaults and move all
    /// reserved parameters to the front of the table.
    ///
    /// Existing reserved entries keep their values. Returns the names that
    /// had to be inserted.
    pub fn ensure_reserved(&mut self) -> Vec<&'static str> {
        let mut inserted = Vec::new();
        let mut rebuilt = IndexMap::with_capacity(self.entries.len() + RESERVED_PARAMETERS.len());

        for (default, (name, _)) in reserved_parameters().zip(RESERVED_PARAMETERS) {
            let parameter = match self.entries.shift_remove(name) {
                Some(existing) => existing,
                None => {
                    inserted.push(name);
                    default
                }
            };
            rebuilt.insert(name.to_string(), parameter);
        }
        rebuilt.extend(self.entries.drain(..));
        self.entries = rebuilt;
        inserted
    }

    /// Force declared reserved parameters to Length and fixed.
    ///
    /// A value a Length cannot hold is reset to the default. Returns the
    /// names that had to change.
    pub fn coerce_reserved(&mut self) -> Vec<&'static str> {
        let mut coerced = Vec::new();
        for (name, _) in RESERVED_PARAMETERS {
            let Some(parameter) = self.entries.get_mut(name) else {
                continue;
            };
            if parameter.param_type == ParamType::Length && parameter.fixed {
                continue;
            }
            parameter.param_type = ParamType::Length;
            parameter.fixed = true;
            if !ParamType::Length.accepts(&parameter.value) {
                parameter.value = ParamType::Length.default_value();
            }
            coerced.push(name);
        }
        coerced
    }

    /// Number of parameters per declared type.
    pub fn count_by_type(&self) -> BTreeMap<ParamType, usize> {
        let mut counts = BTreeMap::new();
        for parameter in self.iter() {
            *counts.entry(parameter.param_type).or_insert(0) += 1;
        }
        counts
    }
}

impl<'a> IntoIterator for &'a ParameterTable {
    type Item = &'a Parameter;
    type IntoIter = indexmap::map::Values<'a, String, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_accepts_shapes() {
        assert!(ParamType::Length.accepts(&Value::Number(0.25)));
        assert!(!ParamType::Length.accepts(&Value::Text("x".into())));
        assert!(!ParamType::Length.accepts(&Value::Number(f64::NAN)));
        assert!(ParamType::Boolean.accepts(&Value::Number(1.0)));
        assert!(!ParamType::Boolean.accepts(&Value::Number(2.0)));
        assert!(ParamType::Integer.accepts(&Value::Number(-3.0)));
        assert!(!ParamType::Integer.accepts(&Value::Number(1.5)));
        assert!(!ParamType::PenColor.accepts(&Value::Number(1.5)));
        assert!(ParamType::String.accepts(&Value::Text(String::new())));
        assert!(!ParamType::String.accepts(&Value::Number(1.0)));
    }

    #[test]
    fn test_from_tag_is_case_insensitive() {
        assert_eq!(ParamType::from_tag("realnum"), Some(ParamType::RealNum));
        assert_eq!(ParamType::from_tag(" PenColor "), Some(ParamType::PenColor));
        assert_eq!(ParamType::from_tag("Float"), None);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.05), "0.05");
        assert_eq!(format_number(1e20), "100000000000000000000");
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut table = ParameterTable::new();
        let p = Parameter::new("w", ParamType::Length, Value::Number(1.0));
        table.insert(p.clone()).unwrap();

        assert_eq!(
            table.insert(p),
            Err(ModelError::DuplicateParameter { name: "w".into() })
        );
    }

    #[test]
    fn test_ensure_reserved_moves_reserved_first() {
        let mut table = ParameterTable::new();
        table
            .insert(Parameter::new("mat", ParamType::Material, Value::Number(3.0)))
            .unwrap();
        table
            .insert(
                Parameter::new("B", ParamType::Length, Value::Number(0.6)).with_fixed(true),
            )
            .unwrap();

        let inserted = table.ensure_reserved();

        assert_eq!(inserted, ["A", "ZZYZX"]);
        let names: Vec<_> = table.iter().map(Parameter::name).collect();
        assert_eq!(names, ["A", "B", "ZZYZX", "mat"]);
        assert_eq!(table.get("B").unwrap().value(), &Value::Number(0.6));
        assert!(table.get("A").unwrap().is_fixed());
    }

    #[test]
    fn test_set_value_errors() {
        let mut table = ParameterTable::with_reserved();
        table
            .insert(Parameter::new("flag", ParamType::Boolean, Value::Number(0.0)))
            .unwrap();

        assert!(matches!(
            table.set_value("missing", Value::Number(1.0)),
            Err(ModelError::UnknownParameter { .. })
        ));
        assert!(matches!(
            table.set_value("flag", Value::Number(2.0)),
            Err(ModelError::TypeMismatch { .. })
        ));
        assert_eq!(table.get("flag").unwrap().value(), &Value::Number(0.0));

        table.set_value("A", Value::Number(2.5)).unwrap();
        assert_eq!(table.get("A").unwrap().value(), &Value::Number(2.5));
    }

    #[test]
    fn test_count_by_type() {
        let table = ParameterTable::with_reserved();
        let counts = table.count_by_type();
        assert_eq!(counts.get(&ParamType::Length), Some(&3));
        assert_eq!(counts.len(), 1);
    }

    #[test]
    fn test_coerce_reserved() {
        let mut table = ParameterTable::new();
        table
            .insert(Parameter::new("A", ParamType::Integer, Value::Number(2.0)))
            .unwrap();
        table
            .insert(Parameter::new("B", ParamType::String, Value::Text("wide".into())))
            .unwrap();
        table
            .insert(Parameter::new("ZZYZX", ParamType::Length, Value::Number(0.9)).with_fixed(true))
            .unwrap();

        assert_eq!(table.coerce_reserved(), ["A", "B"]);

        let a = table.get("A").unwrap();
        assert_eq!(a.param_type(), ParamType::Length);
        assert!(a.is_fixed());
        assert_eq!(a.value(), &Value::Number(2.0));
        assert_eq!(table.get("B").unwrap().value(), &Value::Number(RESERVED_DEFAULT));
        assert!(table.coerce_reserved().is_empty());
    }

    proptest! {
        #[test]
        fn prop_format_number_round_trips(n in -1.0e9f64..1.0e9) {
            let text = format_number(n);
            prop_assert_eq!(text.parse::<f64>().unwrap(), n);
        }

        #[test]
        fn prop_boolean_accepts_only_zero_and_one(n in -10i32..10) {
            let accepted = ParamType::Boolean.accepts(&Value::Number(f64::from(n)));
            prop_assert_eq!(accepted, n == 0 || n == 1);
        }
    }
}
