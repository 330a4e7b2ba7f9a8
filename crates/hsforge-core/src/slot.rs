//! Script slots of a library part.
//!
//! A library part carries exactly five script sections. Their identity is
//! fixed; only their text changes over the lifetime of a [`Project`](crate::Project).

use std::fmt;

use serde::{Deserialize, Serialize};

/// The role of a script section.
///
/// The declaration order is the canonical slot order used for storage,
/// rendering and diagnostic sorting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SlotRole {
    /// Master script: global computations, shared variables, subroutines.
    Master,
    /// 3D script: model geometry.
    Geometry,
    /// 2D script: plan symbol and projection.
    Projection,
    /// Parameter script: `VALUES`, `LOCK` and other constraints.
    Constraints,
    /// Interface script: settings dialog layout.
    Interface,
}

impl SlotRole {
    /// All roles in canonical order.
    pub const ALL: [SlotRole; 5] = [
        SlotRole::Master,
        SlotRole::Geometry,
        SlotRole::Projection,
        SlotRole::Constraints,
        SlotRole::Interface,
    ];

    /// Position of this role in [`SlotRole::ALL`].
    pub fn index(self) -> usize {
        match self {
            SlotRole::Master => 0,
            SlotRole::Geometry => 1,
            SlotRole::Projection => 2,
            SlotRole::Constraints => 3,
            SlotRole::Interface => 4,
        }
    }

    /// The HSF script file name for this role.
    pub fn file_name(self) -> &'static str {
        match self {
            SlotRole::Master => "1d.gdl",
            SlotRole::Geometry => "3d.gdl",
            SlotRole::Projection => "2d.gdl",
            SlotRole::Constraints => "vl.gdl",
            SlotRole::Interface => "ui.gdl",
        }
    }

    /// The canonical English section header, as written by the flat renderer.
    pub fn header(self) -> &'static str {
        match self {
            SlotRole::Master => "MASTER SCRIPT",
            SlotRole::Geometry => "3D SCRIPT",
            SlotRole::Projection => "2D SCRIPT",
            SlotRole::Constraints => "PARAMETER SCRIPT",
            SlotRole::Interface => "UI SCRIPT",
        }
    }

    /// Resolve a role from a path or file name ending in one of the script file names.
    ///
    /// Matching is case-insensitive and only looks at the final path component,
    /// so `scripts/3D.gdl` and `3d.gdl` both resolve to [`SlotRole::Geometry`].
    pub fn from_file_name(path: &str) -> Option<Self> {
        let file = path
            .trim()
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self::ALL.into_iter().find(|role| role.file_name() == file)
    }
}

impl fmt::Display for SlotRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// A named section holding the raw text for one [`SlotRole`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSlot {
    role: SlotRole,
    text: String,
    touched: bool,
}

impl ScriptSlot {
    /// Create an empty slot.
    pub fn empty(role: SlotRole) -> Self {
        Self {
            role,
            text: String::new(),
            touched: false,
        }
    }

    /// Create a slot holding `text`.
    pub fn with_text(role: SlotRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            touched: false,
        }
    }

    pub fn role(&self) -> SlotRole {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns `true` when the slot holds nothing but whitespace.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Whether the last generation round wrote this slot.
    pub fn is_touched(&self) -> bool {
        self.touched
    }

    /// Iterate the slot's lines with their 1-based line numbers.
    pub fn numbered_lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.text.lines().enumerate().map(|(idx, line)| (idx + 1, line))
    }

    /// The text of a 1-based line, if it exists.
    pub fn line(&self, line: usize) -> Option<&str> {
        line.checked_sub(1).and_then(|idx| self.text.lines().nth(idx))
    }

    pub(crate) fn replace(&mut self, text: String) {
        self.text = text;
    }

    pub(crate) fn set_touched(&mut self, touched: bool) {
        self.touched = touched;
    }
}
