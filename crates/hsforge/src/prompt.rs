//! Prompt rendering.

use std::fmt::Write;

use hsforge_core::SlotRole;

use crate::generation::{GenerationRequest, TaskKind};

const FORMAT_RULES: &str = "\
## Output format
- Start every script you write with a header line such as `[FILE: scripts/3d.gdl]`.
  A block ends where the next `[FILE: ...]` header starts.
- Script files: scripts/1d.gdl (master), scripts/3d.gdl (3D), scripts/2d.gdl (2D),
  scripts/vl.gdl (parameter script), scripts/ui.gdl (interface).
- Write each script in full; a block replaces the whole script.
- To add or change parameters, add a `[FILE: paramlist.xml]` block with one
  `Type name = value ! description` line per parameter. No XML tags.
- Parameter types: Length, Angle, RealNum, Integer, Boolean, String, PenColor,
  FillPattern, LineType, Material.
- Do not use code fences.

## GDL rules
- A, B and ZZYZX are reserved: fixed Length parameters for width, depth and height.
- Every multi-line IF needs ENDIF, every FOR needs NEXT, every WHILE needs ENDWHILE.
- Every ADD, ROT or MUL needs a matching DEL.
- The 3D script ends with END; subroutines follow it and end with RETURN.
- Call subroutines with quoted names: GOSUB \"Legs\".
- The 2D script must draw something, at least PROJECT2 3, 270, 2.
";

/// Render the single prompt text for `request`.
pub fn render(request: &GenerationRequest) -> String {
    let mut out = String::new();

    let intro = match request.kind() {
        TaskKind::Create => "Create a new ArchiCAD GDL library part.",
        TaskKind::Modify => "Modify the existing ArchiCAD GDL library part.",
        TaskKind::Repair => "The previous attempt failed. Fix the problems listed under Repair.",
    };
    let _ = writeln!(out, "{intro}\n\n## Task\n{}\n", request.task().trim());
    out.push_str(FORMAT_RULES);

    let _ = writeln!(out, "\n## Parameters\n{}", request.parameters().trim_end());

    out.push_str("\n## Scripts\n");
    if request.slots().is_empty() {
        out.push_str("(none selected)\n");
    }
    for (role, text) in request.slots() {
        write_slot(&mut out, *role, text);
    }
    let _ = writeln!(
        out,
        "\nOnly write the scripts listed above{}.",
        if request.slots().is_empty() { "" } else { " and paramlist.xml" }
    );

    if let Some(repair) = request.repair() {
        out.push_str("\n## Repair\n");
        for diag in repair.diagnostics() {
            let _ = writeln!(out, "- {diag}");
        }
        for excerpt in repair.excerpts() {
            for (line, text) in &excerpt.lines {
                let _ = writeln!(out, "- scripts/{} line {line}: {}", excerpt.role, text.trim());
            }
        }
        // Implicated slots that are not already shown above.
        for excerpt in repair
            .excerpts()
            .iter()
            .filter(|excerpt| !request.selects(excerpt.role))
        {
            out.push('\n');
            write_slot(&mut out, excerpt.role, &excerpt.text);
        }
    }

    if !request.documents().is_empty() {
        out.push_str("\n## Reference\n");
        for doc in request.documents() {
            let _ = writeln!(out, "\n### {}\n{}", doc.name(), doc.text().trim_end());
        }
    }

    out
}

fn write_slot(out: &mut String, role: SlotRole, text: &str) {
    let _ = writeln!(out, "[FILE: scripts/{role}]");
    if text.trim().is_empty() {
        out.push_str("! (empty)\n");
    } else {
        out.push_str(text.trim_end());
        out.push('\n');
    }
}
