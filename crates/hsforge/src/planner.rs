//! Slot selection for a task.
//!
//! Only the slots a task is about are sent to the generation service. The
//! selection comes from a static keyword table; it is never inferred from
//! the reply.

use std::collections::BTreeSet;

use log::debug;

use hsforge_core::{
    Project,
    SlotRole::{self, Constraints, Geometry, Interface, Projection},
};

use crate::generation::TaskKind;

/// Keywords and the slots they make relevant.
///
/// ASCII keywords match whole words; others match anywhere in the task.
const RELEVANCE: &[(&str, &[SlotRole])] = &[
    ("3d", &[Geometry]),
    ("geometry", &[Geometry]),
    ("shape", &[Geometry]),
    ("model", &[Geometry]),
    ("block", &[Geometry]),
    ("prism", &[Geometry]),
    ("cylinder", &[Geometry]),
    ("leg", &[Geometry]),
    ("legs", &[Geometry]),
    ("height", &[Geometry]),
    ("width", &[Geometry, Projection]),
    ("depth", &[Geometry, Projection]),
    ("size", &[Geometry, Projection]),
    ("material", &[Geometry, Constraints]),
    ("2d", &[Projection]),
    ("plan", &[Projection]),
    ("symbol", &[Projection]),
    ("hotspot", &[Projection]),
    ("hotspots", &[Projection]),
    ("projection", &[Projection]),
    ("line", &[Projection]),
    ("parameter", &[Constraints]),
    ("parameters", &[Constraints]),
    ("values", &[Constraints]),
    ("range", &[Constraints]),
    ("limit", &[Constraints]),
    ("lock", &[Constraints]),
    ("option", &[Constraints]),
    ("options", &[Constraints]),
    ("ui", &[Interface]),
    ("interface", &[Interface]),
    ("dialog", &[Interface]),
    ("panel", &[Interface]),
    ("page", &[Interface]),
    ("三维", &[Geometry]),
    ("几何", &[Geometry]),
    ("形状", &[Geometry]),
    ("模型", &[Geometry]),
    ("高度", &[Geometry]),
    ("宽度", &[Geometry, Projection]),
    ("尺寸", &[Geometry, Projection]),
    ("材质", &[Geometry, Constraints]),
    ("二维", &[Projection]),
    ("平面", &[Projection]),
    ("符号", &[Projection]),
    ("参数", &[Constraints]),
    ("范围", &[Constraints]),
    ("界面", &[Interface]),
    ("面板", &[Interface]),
    ("对话框", &[Interface]),
];

/// Slots selected when no keyword matched.
const FALLBACK: &[SlotRole] = &[Geometry, Constraints];

/// The outcome of planning a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    kind: TaskKind,
    slots: BTreeSet<SlotRole>,
}

impl Plan {
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Selected slots in canonical order. Always contains the master slot.
    pub fn slots(&self) -> &BTreeSet<SlotRole> {
        &self.slots
    }
}

/// Pick the slots relevant to `task` on `project`.
///
/// A project with only empty slots is a creation task, which also selects
/// the 2D slot so the part is visible in plan.
pub fn plan(task: &str, project: &Project) -> Plan {
    let lower = task.to_lowercase();
    let words: BTreeSet<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();

    let mut slots: BTreeSet<SlotRole> = RELEVANCE
        .iter()
        .filter(|(keyword, _)| {
            if keyword.is_ascii() {
                words.contains(keyword)
            } else {
                lower.contains(keyword)
            }
        })
        .flat_map(|(_, roles)| roles.iter().copied())
        .collect();
    if slots.is_empty() {
        slots.extend(FALLBACK);
    }
    slots.insert(SlotRole::Master);

    let kind = if project.is_blank() {
        slots.insert(Projection);
        TaskKind::Create
    } else {
        TaskKind::Modify
    };

    debug!(kind:% = kind, slots:? = slots; "Planned task");
    Plan { kind, slots }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn existing() -> Project {
        let mut project = Project::new("Desk");
        project.set_script(Geometry, "BLOCK A, B, ZZYZX\nEND\n");
        project
    }

    fn roles(plan: &Plan) -> Vec<SlotRole> {
        plan.slots().iter().copied().collect()
    }

    #[test]
    fn test_geometry_request_selects_master_and_geometry() {
        let plan = plan("Make the 3D geometry rounder", &existing());

        assert_eq!(plan.kind(), TaskKind::Modify);
        assert_eq!(roles(&plan), [SlotRole::Master, Geometry]);
    }

    #[test]
    fn test_keywords_match_whole_words() {
        // `build` must not select the interface through `ui`.
        let plan = plan("build a dialog", &existing());
        assert_eq!(roles(&plan), [SlotRole::Master, Interface]);
    }

    #[test]
    fn test_chinese_keywords() {
        let plan = plan("修改平面符号", &existing());
        assert_eq!(roles(&plan), [SlotRole::Master, Projection]);
    }

    #[test]
    fn test_fallback_and_creation() {
        let plan = plan("make it nicer", &existing());
        assert_eq!(roles(&plan), [SlotRole::Master, Geometry, Constraints]);

        let plan = super::plan("a coffee table", &Project::new("Table"));
        assert_eq!(plan.kind(), TaskKind::Create);
        assert_eq!(roles(&plan), [SlotRole::Master, Geometry, Projection, Constraints]);
    }
}
