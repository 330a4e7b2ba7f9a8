//! Generation replies.
//!
//! A reply is free text in which `[FILE: <path>]` lines open blocks. A block
//! addressed to a script file (`scripts/3d.gdl`, ...) replaces that slot; a
//! block addressed to `paramlist.xml` holds one declaration per line.
//! A code fence right after the header opens the block body and the next
//! fence closes it; text outside any block is kept as prose.

use log::debug;

use hsforge_core::{Diagnostic, ErrorCode, SlotRole};

use crate::{params::CandidateParameter, source::join_lines, syntax};

const FILE_HEADER: &str = "[FILE:";
const FENCES: [&str; 2] = ["```", "~~~"];

/// Where a reply block goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTarget {
    Slot(SlotRole),
    Parameters,
}

impl BlockTarget {
    /// Resolve a `[FILE: ...]` path.
    pub fn from_path(path: &str) -> Option<Self> {
        if let Some(role) = SlotRole::from_file_name(path) {
            return Some(BlockTarget::Slot(role));
        }
        path.to_ascii_lowercase()
            .contains("paramlist")
            .then_some(BlockTarget::Parameters)
    }
}

/// A parsed generation reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    scripts: Vec<(SlotRole, String)>,
    parameters: Option<Vec<CandidateParameter>>,
    prose: String,
    diagnostics: Vec<Diagnostic>,
}

impl Reply {
    /// Script blocks in reply order, one per slot.
    pub fn scripts(&self) -> &[(SlotRole, String)] {
        &self.scripts
    }

    pub fn script(&self, role: SlotRole) -> Option<&str> {
        self.scripts
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, text)| text.as_str())
    }

    /// Declarations from the parameter block, if the reply had one.
    pub fn parameters(&self) -> Option<&[CandidateParameter]> {
        self.parameters.as_deref()
    }

    /// Text outside any block.
    pub fn prose(&self) -> &str {
        &self.prose
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// `true` when no block was recognized.
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty() && self.parameters.is_none()
    }
}

/// Extract the path from a `[FILE: path]` header line.
pub fn file_header(line: &str) -> Option<&str> {
    let inner = line.trim().strip_prefix(FILE_HEADER)?.strip_suffix(']')?;
    let path = inner.trim();
    (!path.is_empty()).then_some(path)
}

fn is_fence(line: &str) -> bool {
    let line = line.trim_start();
    FENCES.iter().any(|fence| line.starts_with(fence))
}

struct OpenBlock<'a> {
    target: Option<BlockTarget>,
    path: &'a str,
    line: usize,
    lines: Vec<(usize, &'a str)>,
    fenced: bool,
}

impl OpenBlock<'_> {
    /// A fence ends the block once its body has started.
    fn closed_by_fence(&self) -> bool {
        self.fenced || self.lines.iter().any(|(_, line)| !line.trim().is_empty())
    }
}

/// Parse a generation reply. Never fails; anomalies become warnings.
pub fn parse_reply(text: &str) -> Reply {
    let mut reply = Reply::default();
    let mut prose = Vec::new();
    let mut open: Option<OpenBlock<'_>> = None;

    for (idx, line) in text.lines().enumerate() {
        let number = idx + 1;
        if let Some(path) = file_header(line) {
            if let Some(block) = open.take() {
                reply.close(block);
            }
            let target = BlockTarget::from_path(path);
            if target.is_none() {
                reply.diagnostics.push(
                    Diagnostic::warning(
                        ErrorCode::UnrecognizedBlock,
                        format!("reply block `{path}` at line {number} is not a library-part file; ignored"),
                    )
                    .with_help("address blocks to scripts/<1d|3d|2d|vl|ui>.gdl or paramlist.xml"),
                );
            }
            open = Some(OpenBlock {
                target,
                path,
                line: number,
                lines: Vec::new(),
                fenced: false,
            });
            continue;
        }
        if is_fence(line) {
            match open.take() {
                Some(block) if block.closed_by_fence() => reply.close(block),
                Some(mut block) => {
                    block.fenced = true;
                    open = Some(block);
                }
                None => {}
            }
            continue;
        }
        match open.as_mut() {
            Some(block) => block.lines.push((number, line)),
            None => prose.push(line),
        }
    }
    if let Some(block) = open {
        reply.close(block);
    }

    reply.prose = join_lines(&prose).trim_end().to_string();
    debug!(
        scripts = reply.scripts.len(),
        parameters = reply.parameters.as_ref().map_or(0, Vec::len),
        warnings = reply.diagnostics.len();
        "Parsed generation reply"
    );
    reply
}

impl Reply {
    fn close(&mut self, block: OpenBlock<'_>) {
        let Some(target) = block.target else {
            return;
        };
        let lines: Vec<&str> = block.lines.iter().map(|(_, line)| *line).collect();
        let text = join_lines(&lines);
        if text.is_empty() {
            self.diagnostics.push(Diagnostic::warning(
                ErrorCode::EmptySection,
                format!("reply block `{}` at line {} is empty; ignored", block.path, block.line),
            ));
            return;
        }

        match target {
            BlockTarget::Slot(role) => {
                if let Some(existing) = self.scripts.iter_mut().find(|(r, _)| *r == role) {
                    self.diagnostics.push(Diagnostic::warning(
                        ErrorCode::ParseAnomaly,
                        format!(
                            "reply block `{}` at line {} repeats {role}; the later block wins",
                            block.path, block.line
                        ),
                    ));
                    existing.1 = text;
                } else {
                    self.scripts.push((role, text));
                }
            }
            BlockTarget::Parameters => {
                let candidates = self.declarations(&block.lines);
                self.parameters.get_or_insert_with(Vec::new).extend(candidates);
            }
        }
    }

    fn declarations(&mut self, lines: &[(usize, &str)]) -> Vec<CandidateParameter> {
        let mut candidates = Vec::new();
        for (number, line) in lines {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match syntax::parse_declaration(trimmed) {
                Some(decl) => candidates.push(
                    CandidateParameter::new(decl.name, decl.type_name, decl.value)
                        .with_description(decl.description)
                        .with_fixed(decl.fixed)
                        .with_flags(decl.flags),
                ),
                None if trimmed.starts_with('!') => {}
                None => self.diagnostics.push(Diagnostic::warning(
                    ErrorCode::UnreadableDeclaration,
                    format!("reply line {number} is not a parameter declaration: `{trimmed}`"),
                )),
            }
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use hsforge_core::Value;

    use super::*;

    #[test]
    fn test_parse_blocks() {
        let text = "\
I added legs and a plan symbol.

[FILE: scripts/3d.gdl]
```gdl
BLOCK A, B, 0.05
ADD 0, 0, 0.05
  CYLIND legH, 0.02
DEL 1
END
```

[FILE: scripts/2d.gdl]
PROJECT2 3, 270, 2

[FILE: paramlist.xml]
Length legH = 0.7 ! Leg height
Bool bLegs = 1
! comment lines are fine
";
        let reply = parse_reply(text);

        assert_eq!(reply.prose(), "I added legs and a plan symbol.");
        assert_eq!(
            reply.script(SlotRole::Geometry),
            Some("BLOCK A, B, 0.05\nADD 0, 0, 0.05\n  CYLIND legH, 0.02\nDEL 1\nEND\n")
        );
        assert_eq!(reply.script(SlotRole::Projection), Some("PROJECT2 3, 270, 2\n"));
        assert_eq!(reply.script(SlotRole::Master), None);

        let params = reply.parameters().unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "legH");
        assert_eq!(params[0].description.as_deref(), Some("Leg height"));
        assert_eq!(params[1].type_name, "Bool");
        assert_eq!(params[1].value, Value::Number(1.0));
        assert!(reply.diagnostics().is_empty());
    }

    #[test]
    fn test_closing_fence_ends_block() {
        let text = "\
[FILE: scripts/3d.gdl]
```
BLOCK A, B, ZZYZX
END
```
This draws a simple box.
";
        let reply = parse_reply(text);

        assert_eq!(reply.script(SlotRole::Geometry), Some("BLOCK A, B, ZZYZX\nEND\n"));
        assert_eq!(reply.prose(), "This draws a simple box.");
        assert!(reply.diagnostics().is_empty());
    }

    #[test]
    fn test_unfenced_block_runs_to_next_header() {
        let text = "\
[FILE: scripts/2d.gdl]
PROJECT2 3, 270, 2

[FILE: scripts/1d.gdl]
```gdl
w = A / 2
```
";
        let reply = parse_reply(text);

        assert_eq!(reply.script(SlotRole::Projection), Some("PROJECT2 3, 270, 2\n"));
        assert_eq!(reply.script(SlotRole::Master), Some("w = A / 2\n"));
        assert_eq!(reply.prose(), "");
    }

    #[test]
    fn test_prose_only_reply_is_empty() {
        let reply = parse_reply("The 3D script looks fine to me.\n");
        assert!(reply.is_empty());
        assert_eq!(reply.prose(), "The 3D script looks fine to me.");
    }

    #[test]
    fn test_unknown_and_repeated_blocks() {
        let text = "\
[FILE: notes.txt]
ignore me
[FILE: scripts/3d.gdl]
BLOCK 1, 1, 1
[FILE: scripts/3D.gdl]
BLOCK 2, 2, 2
END
[FILE: scripts/vl.gdl]

[FILE: paramlist.xml]
Length w 0.5
";
        let reply = parse_reply(text);
        let codes: Vec<_> = reply.diagnostics().iter().map(Diagnostic::code).collect();

        assert_eq!(
            codes,
            [
                ErrorCode::UnrecognizedBlock,
                ErrorCode::ParseAnomaly,
                ErrorCode::EmptySection,
                ErrorCode::UnreadableDeclaration,
            ]
        );
        assert_eq!(reply.script(SlotRole::Geometry), Some("BLOCK 2, 2, 2\nEND\n"));
        assert_eq!(reply.script(SlotRole::Constraints), None);
        assert_eq!(reply.parameters().map(<[_]>::len), Some(0));
        assert!(!reply.is_empty());
    }

    #[test]
    fn test_file_header() {
        assert_eq!(file_header("  [FILE: scripts/1d.gdl] "), Some("scripts/1d.gdl"));
        assert_eq!(file_header("[FILE:]"), None);
        assert_eq!(file_header("FILE: scripts/1d.gdl"), None);
        assert_eq!(
            BlockTarget::from_path("paramlist.xml"),
            Some(BlockTarget::Parameters)
        );
        assert_eq!(
            BlockTarget::from_path("scripts/ui.gdl"),
            Some(BlockTarget::Slot(SlotRole::Interface))
        );
    }
}
