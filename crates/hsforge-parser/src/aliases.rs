//! Section header recognition.
//!
//! Flat sources mark their sections with header lines such as
//! `! ==== 3D SCRIPT ====`, `【三维脚本】` or `PARAMETERS (list):`. The
//! recognized spellings live in [`SECTION_ALIASES`]; adding a locale means
//! adding rows, not code.
//!
//! Headers start in the first column. A `!` comment counts as a header only
//! when decoration frames its text, so `! 3D script` inside a script stays
//! an ordinary comment.

use hsforge_core::SlotRole;

/// What a recognized section header introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionTarget {
    /// One of the five script slots.
    Slot(SlotRole),
    /// The parameter declaration list.
    Parameters,
    /// A section a library part has no slot for, such as a property script.
    Unsupported(&'static str),
}

/// Header aliases, compared after normalization with all whitespace removed.
pub const SECTION_ALIASES: &[(SectionTarget, &[&str])] = &[
    (
        SectionTarget::Slot(SlotRole::Master),
        &["MASTER SCRIPT", "1D SCRIPT", "主脚本"],
    ),
    (
        SectionTarget::Slot(SlotRole::Constraints),
        &["PARAMETER SCRIPT", "VL SCRIPT", "参数脚本"],
    ),
    (
        SectionTarget::Slot(SlotRole::Projection),
        &["2D SCRIPT", "二维脚本", "平面脚本"],
    ),
    (
        SectionTarget::Slot(SlotRole::Geometry),
        &["3D SCRIPT", "三维脚本"],
    ),
    (
        SectionTarget::Slot(SlotRole::Interface),
        &["UI SCRIPT", "INTERFACE SCRIPT", "界面脚本"],
    ),
    (
        SectionTarget::Unsupported("property script"),
        &["PROPERTY SCRIPT", "PROPERTIES SCRIPT", "属性脚本"],
    ),
    (
        SectionTarget::Parameters,
        &["PARAMETERS", "PARAMETER LIST", "PARAMETERS LIST", "参数列表"],
    ),
];

/// Characters that frame a commented header such as `! ==== 3D SCRIPT ====`.
const FRAME: &[char] = &[
    '=', '-', '_', '*', '#', '[', ']', '【', '】', '<', '>', '《', '》',
];

const DECORATION: &[char] = &[
    '!', '=', '-', '_', '*', '#', '[', ']', '【', '】', '<', '>', '《', '》', ':', '：',
];

/// Strip comment markers, decoration runs, brackets, colons and a trailing
/// parenthesized note from a candidate header line.
///
/// Returns an upper-cased key with all whitespace removed.
pub fn normalize_header(line: &str) -> String {
    let mut text = line.trim().trim_matches(|c: char| DECORATION.contains(&c) || c.is_whitespace());
    if let Some(stripped) = strip_note(text) {
        text = stripped.trim_matches(|c: char| DECORATION.contains(&c) || c.is_whitespace());
    }
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Remove a trailing `(...)` or `（...）` note.
fn strip_note(text: &str) -> Option<&str> {
    let close = text.chars().last()?;
    let open = match close {
        ')' => '(',
        '）' => '（',
        _ => return None,
    };
    text.rfind(open).map(|idx| &text[..idx])
}

/// Look up the section a line introduces, if it is a header.
pub fn recognize_header(line: &str) -> Option<SectionTarget> {
    if line.starts_with(char::is_whitespace) {
        return None;
    }
    if let Some(comment) = line.strip_prefix('!') {
        let body = comment.trim_start_matches('!').trim();
        if !body.starts_with(FRAME) && !body.ends_with(FRAME) {
            return None;
        }
    }
    let key = normalize_header(line);
    if key.is_empty() {
        return None;
    }
    SECTION_ALIASES.iter().find_map(|(target, aliases)| {
        aliases
            .iter()
            .any(|alias| alias_key(alias) == key)
            .then_some(*target)
    })
}

fn alias_key(alias: &str) -> String {
    alias
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}
