//! Slot-relative source locations.

use std::fmt;

use serde::Serialize;

use crate::slot::SlotRole;

/// A position inside one script slot.
///
/// Lines are 1-based and local to the slot, so line 12 of the geometry
/// slot is line 12 of `3d.gdl` regardless of what the other slots hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Location {
    role: SlotRole,
    line: usize,
}

impl Location {
    pub fn new(role: SlotRole, line: usize) -> Self {
        Self { role, line }
    }

    pub fn role(&self) -> SlotRole {
        self.role
    }

    pub fn line(&self) -> usize {
        self.line
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.line)
    }
}
