//! The library-part project aggregate.

use std::{collections::BTreeMap, fmt};

use log::debug;

use crate::{
    error::ModelError,
    identity::Guid,
    param::{ParamType, Parameter, ParameterTable, Value},
    slot::{ScriptSlot, SlotRole},
};

/// Library-part format version written when none is known.
pub const DEFAULT_VERSION: u32 = 46;

/// A GDL library part under construction.
///
/// A project is created empty with [`Project::new`] or assembled from a parsed
/// or loaded tree with [`Project::from_parts`]. Either way the reserved
/// parameters are present from the start. A project is owned by exactly one
/// run at a time and mutated only through `&mut self`.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    guid: Guid,
    name: String,
    description: Option<String>,
    version: u32,
    slots: [ScriptSlot; 5],
    parameters: ParameterTable,
}

impl Project {
    /// Create an empty project with a fresh identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            guid: Guid::generate(),
            name: name.into(),
            description: None,
            version: DEFAULT_VERSION,
            slots: SlotRole::ALL.map(ScriptSlot::empty),
            parameters: ParameterTable::with_reserved(),
        }
    }

    /// Assemble a project from already parsed parts.
    ///
    /// Missing reserved parameters are inserted at their defaults and
    /// declared ones are forced to fixed Length. Callers that need to report
    /// either should run [`ParameterTable::ensure_reserved`] and
    /// [`ParameterTable::coerce_reserved`] first and inspect their results.
    pub fn from_parts(
        guid: Guid,
        name: impl Into<String>,
        mut parameters: ParameterTable,
        scripts: impl IntoIterator<Item = (SlotRole, String)>,
    ) -> Self {
        let inserted = parameters.ensure_reserved();
        if !inserted.is_empty() {
            debug!(names:? = inserted; "Inserted reserved parameters");
        }
        let coerced = parameters.coerce_reserved();
        if !coerced.is_empty() {
            debug!(names:? = coerced; "Coerced reserved parameters");
        }
        let mut slots = SlotRole::ALL.map(ScriptSlot::empty);
        for (role, text) in scripts {
            slots[role.index()].replace(text);
        }
        Self {
            guid,
            name: name.into(),
            description: None,
            version: DEFAULT_VERSION,
            slots,
            parameters,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description.filter(|d| !d.trim().is_empty());
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn guid(&self) -> &Guid {
        &self.guid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    pub fn parameters(&self) -> &ParameterTable {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterTable {
        &mut self.parameters
    }

    /// Set the value of a declared parameter.
    ///
    /// # Errors
    ///
    /// [`ModelError::UnknownParameter`] if `name` is not declared and
    /// [`ModelError::TypeMismatch`] if `value` does not fit its type.
    pub fn set_parameter(&mut self, name: &str, value: Value) -> Result<(), ModelError> {
        self.parameters.set_value(name, value)
    }

    pub fn script(&self, role: SlotRole) -> &str {
        self.slots[role.index()].text()
    }

    /// Overwrite a slot's text wholesale.
    pub fn set_script(&mut self, role: SlotRole, text: impl Into<String>) {
        self.slots[role.index()].replace(text.into());
    }

    pub fn slot(&self, role: SlotRole) -> &ScriptSlot {
        &self.slots[role.index()]
    }

    /// All slots in canonical order.
    pub fn slots(&self) -> &[ScriptSlot] {
        &self.slots
    }

    pub fn mark_touched(&mut self, role: SlotRole) {
        self.slots[role.index()].set_touched(true);
    }

    pub fn clear_touched(&mut self) {
        for slot in &mut self.slots {
            slot.set_touched(false);
        }
    }

    /// Roles of the slots written by the last generation round.
    pub fn touched(&self) -> Vec<SlotRole> {
        self.slots
            .iter()
            .filter(|slot| slot.is_touched())
            .map(ScriptSlot::role)
            .collect()
    }

    /// Returns `true` when every slot is empty.
    pub fn is_blank(&self) -> bool {
        self.slots.iter().all(ScriptSlot::is_empty)
    }

    pub fn summary(&self) -> Summary {
        Summary {
            parameters_by_type: self.parameters.count_by_type(),
            non_empty_slots: self
                .slots
                .iter()
                .filter(|slot| !slot.is_empty())
                .map(ScriptSlot::role)
                .collect(),
        }
    }
}

/// Read-only overview of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    parameters_by_type: BTreeMap<ParamType, usize>,
    non_empty_slots: Vec<SlotRole>,
}

impl Summary {
    pub fn parameters_by_type(&self) -> &BTreeMap<ParamType, usize> {
        &self.parameters_by_type
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters_by_type.values().sum()
    }

    pub fn non_empty_slots(&self) -> &[SlotRole] {
        &self.non_empty_slots
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} parameters", self.parameter_count())?;
        let counts: Vec<_> = self
            .parameters_by_type
            .iter()
            .map(|(ty, n)| format!("{ty}: {n}"))
            .collect();
        if !counts.is_empty() {
            write!(f, " ({})", counts.join(", "))?;
        }
        let slots: Vec<_> = self.non_empty_slots.iter().map(|role| role.file_name()).collect();
        if slots.is_empty() {
            write!(f, "; no scripts")
        } else {
            write!(f, "; scripts: {}", slots.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_project_has_reserved_parameters() {
        let project = Project::new("Table");

        for name in ["A", "B", "ZZYZX"] {
            let p = project.parameter(name).unwrap();
            assert_eq!(p.param_type(), ParamType::Length);
            assert!(p.is_fixed());
            assert_eq!(p.value(), &Value::Number(1.0));
        }
        assert!(project.is_blank());
        assert_eq!(project.version(), DEFAULT_VERSION);
    }

    #[test]
    fn test_set_parameter() {
        let mut project = Project::new("Table");
        project
            .parameters_mut()
            .insert(Parameter::new("legs", ParamType::Integer, Value::Number(4.0)))
            .unwrap();

        project.set_parameter("legs", Value::Number(3.0)).unwrap();
        assert_eq!(project.parameter("legs").unwrap().value(), &Value::Number(3.0));

        assert_eq!(
            project.set_parameter("nope", Value::Number(1.0)),
            Err(ModelError::UnknownParameter { name: "nope".into() })
        );
        assert!(matches!(
            project.set_parameter("legs", Value::Number(2.5)),
            Err(ModelError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_touched_flags() {
        let mut project = Project::new("Table");
        project.set_script(SlotRole::Geometry, "BLOCK A, B, ZZYZX\nEND\n");
        project.mark_touched(SlotRole::Geometry);

        assert_eq!(project.touched(), [SlotRole::Geometry]);
        project.clear_touched();
        assert!(project.touched().is_empty());
    }

    #[test]
    fn test_summary() {
        let mut project = Project::new("Table");
        project.set_script(SlotRole::Projection, "PROJECT2 3, 270, 2\n");

        let summary = project.summary();
        assert_eq!(summary.parameter_count(), 3);
        assert_eq!(summary.non_empty_slots(), [SlotRole::Projection]);
        assert_eq!(
            summary.to_string(),
            "3 parameters (Length: 3); scripts: 2d.gdl"
        );
    }

    #[test]
    fn test_from_parts_keeps_guid_and_inserts_reserved() {
        let guid = Guid::generate();
        let project = Project::from_parts(
            guid.clone(),
            "Shelf",
            ParameterTable::new(),
            [(SlotRole::Geometry, "END\n".to_string())],
        );

        assert_eq!(project.guid(), &guid);
        assert_eq!(project.parameters().len(), 3);
        assert_eq!(project.script(SlotRole::Geometry), "END\n");
    }
}
