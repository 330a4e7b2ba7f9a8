//! Classification of GDL script lines.
//!
//! The linter does not need a full GDL grammar. It needs to know, per line,
//! whether the line opens or closes a block, defines a label, calls or
//! returns from a subroutine, stops the script, or changes the
//! transformation stack. [`Script::parse`] produces that view.

use hsforge_core::{ScriptSlot, SlotRole};

use crate::syntax;

/// Multi-line block kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    If,
    For,
    While,
    Repeat,
}

impl BlockKind {
    pub fn opener(self) -> &'static str {
        match self {
            BlockKind::If => "IF",
            BlockKind::For => "FOR",
            BlockKind::While => "WHILE",
            BlockKind::Repeat => "REPEAT",
        }
    }

    pub fn closer(self) -> &'static str {
        match self {
            BlockKind::If => "ENDIF",
            BlockKind::For => "NEXT",
            BlockKind::While => "ENDWHILE",
            BlockKind::Repeat => "UNTIL",
        }
    }

    pub fn is_loop(self) -> bool {
        !matches!(self, BlockKind::If)
    }
}

/// Argument of a `DEL` statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelCount {
    Count(usize),
    Top,
    Unknown,
}

/// What a line does, as far as the structural rules care.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Open(BlockKind),
    Else,
    Close(BlockKind),
    /// `GOSUB` with its literal target, or `None` for a computed target.
    Gosub(Option<String>),
    Return,
    End,
    /// A transformation that pushes one entry onto the stack.
    Push,
    Del(DelCount),
    Other,
}

const PUSH_KEYWORDS: &[&str] = &[
    "ADD", "ADDX", "ADDY", "ADDZ", "ADD2", "ROT", "ROTX", "ROTY", "ROTZ", "ROT2", "MUL", "MULX",
    "MULY", "MULZ", "MUL2", "XFORM",
];

/// One classified line of a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine<'a> {
    /// 1-based line number within the slot.
    pub number: usize,
    pub raw: &'a str,
    /// The line with its comment removed.
    pub code: &'a str,
    pub label: Option<String>,
    pub statement: Option<Statement>,
    /// The statement is the body of a single-line `IF ... THEN`.
    pub conditional: bool,
}

/// A classified script slot.
#[derive(Debug, Clone)]
pub struct Script<'a> {
    pub role: SlotRole,
    pub lines: Vec<ScriptLine<'a>>,
}

impl<'a> Script<'a> {
    pub fn parse(slot: &'a ScriptSlot) -> Self {
        let lines = slot
            .numbered_lines()
            .map(|(number, raw)| classify_line(number, raw))
            .collect();
        Self {
            role: slot.role(),
            lines,
        }
    }

    /// Literal `GOSUB` targets in this script.
    pub fn gosub_targets(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|line| match &line.statement {
            Some(Statement::Gosub(Some(target))) => Some(target.as_str()),
            _ => None,
        })
    }

    /// Labels defined in this script.
    pub fn labels(&self) -> impl Iterator<Item = (usize, &str)> {
        self.lines
            .iter()
            .filter_map(|line| line.label.as_deref().map(|label| (line.number, label)))
    }
}

/// Classify a single raw line.
pub fn classify_line(number: usize, raw: &str) -> ScriptLine<'_> {
    let code = syntax::strip_comment(raw);
    let (label, body) = match syntax::split_label(code) {
        Some((label, rest)) => (Some(label), rest),
        None => (None, code),
    };
    let (statement, conditional) = classify_statement(body);
    ScriptLine {
        number,
        raw,
        code,
        label,
        statement,
        conditional,
    }
}

fn classify_statement(code: &str) -> (Option<Statement>, bool) {
    let code = code.trim();
    let words = syntax::words(code);
    let Some(&(offset, first)) = words.first() else {
        return (None, false);
    };
    let keyword = first.to_ascii_uppercase();

    if keyword == "IF" {
        return classify_if(code, &words);
    }

    let args = &code[offset + first.len()..];
    let statement = match keyword.as_str() {
        "ELSE" => Statement::Else,
        "ENDIF" => Statement::Close(BlockKind::If),
        "FOR" => Statement::Open(BlockKind::For),
        "NEXT" => Statement::Close(BlockKind::For),
        "WHILE" => Statement::Open(BlockKind::While),
        "ENDWHILE" => Statement::Close(BlockKind::While),
        "REPEAT" => Statement::Open(BlockKind::Repeat),
        "UNTIL" => Statement::Close(BlockKind::Repeat),
        "GOSUB" => Statement::Gosub(syntax::parse_label_reference(args)),
        "RETURN" => Statement::Return,
        "END" => Statement::End,
        "DEL" => Statement::Del(del_count(args)),
        kw if PUSH_KEYWORDS.contains(&kw) => Statement::Push,
        _ => Statement::Other,
    };
    (Some(statement), false)
}

/// `IF cond THEN` opens a block; anything after `THEN`, or a `GOTO`/`GOSUB`
/// form, is a single-line conditional.
fn classify_if(code: &str, words: &[(usize, &str)]) -> (Option<Statement>, bool) {
    let branch = words.iter().skip(1).find(|(_, word)| {
        ["THEN", "GOTO", "GOSUB"]
            .iter()
            .any(|kw| word.eq_ignore_ascii_case(kw))
    });
    let Some((offset, word)) = branch else {
        return (Some(Statement::Other), false);
    };

    if word.eq_ignore_ascii_case("THEN") {
        let tail = code[offset + word.len()..].trim();
        if tail.is_empty() {
            return (Some(Statement::Open(BlockKind::If)), false);
        }
        let (inner, _) = classify_statement(inline_then_branch(tail));
        return (inner.or(Some(Statement::Other)), true);
    }

    let (inner, _) = classify_statement(&code[*offset..]);
    (inner, true)
}

/// The statement executed when a single-line condition holds, without any
/// `ELSE` part.
fn inline_then_branch(tail: &str) -> &str {
    syntax::words(tail)
        .into_iter()
        .skip(1)
        .find(|(_, word)| word.eq_ignore_ascii_case("ELSE"))
        .map_or(tail, |(offset, _)| &tail[..offset])
}

fn del_count(args: &str) -> DelCount {
    let first = args.split(',').next().unwrap_or_default().trim();
    if first.eq_ignore_ascii_case("TOP") {
        return DelCount::Top;
    }
    syntax::parse_count(first).map_or(DelCount::Unknown, DelCount::Count)
}

/// Returns `true` if `code` contains `word` as a whole keyword outside strings.
pub fn contains_keyword(code: &str, keyword: &str) -> bool {
    syntax::words(code)
        .iter()
        .any(|(_, word)| word.eq_ignore_ascii_case(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(line: &str) -> (Option<Statement>, bool) {
        let classified = classify_line(1, line);
        (classified.statement, classified.conditional)
    }

    #[test]
    fn test_blocks() {
        assert_eq!(statement("IF a > 1 THEN"), (Some(Statement::Open(BlockKind::If)), false));
        assert_eq!(statement("  endif ! done"), (Some(Statement::Close(BlockKind::If)), false));
        assert_eq!(statement("FOR i = 1 TO n"), (Some(Statement::Open(BlockKind::For)), false));
        assert_eq!(statement("NEXT i"), (Some(Statement::Close(BlockKind::For)), false));
        assert_eq!(statement("WHILE a DO"), (Some(Statement::Open(BlockKind::While)), false));
        assert_eq!(statement("UNTIL a"), (Some(Statement::Close(BlockKind::Repeat)), false));
        assert_eq!(statement("ELSE"), (Some(Statement::Else), false));
    }

    #[test]
    fn test_single_line_if() {
        assert_eq!(statement("IF a THEN b = 1"), (Some(Statement::Other), true));
        assert_eq!(statement("IF a THEN END"), (Some(Statement::End), true));
        assert_eq!(statement("IF a THEN ADDZ 1 ELSE ROTZ 90"), (Some(Statement::Push), true));
        assert_eq!(
            statement("IF a GOSUB 100"),
            (Some(Statement::Gosub(Some("100".into()))), true)
        );
        assert_eq!(statement("IF a THEN ! nothing"), (Some(Statement::Open(BlockKind::If)), false));
    }

    #[test]
    fn test_labels_and_calls() {
        let line = classify_line(4, "100: ADDZ h");
        assert_eq!(line.label.as_deref(), Some("100"));
        assert_eq!(line.statement, Some(Statement::Push));

        assert_eq!(
            statement("GOSUB \"legs\""),
            (Some(Statement::Gosub(Some("legs".into()))), false)
        );
        assert_eq!(statement("GOSUB sub + 1"), (Some(Statement::Gosub(None)), false));
        assert_eq!(statement("RETURN"), (Some(Statement::Return), false));
    }

    #[test]
    fn test_transforms() {
        assert_eq!(statement("ADDX 0.1"), (Some(Statement::Push), false));
        assert_eq!(statement("XFORM 1,0,0,0, 0,1,0,0, 0,0,1,0"), (Some(Statement::Push), false));
        assert_eq!(statement("DEL 2"), (Some(Statement::Del(DelCount::Count(2))), false));
        assert_eq!(statement("DEL TOP"), (Some(Statement::Del(DelCount::Top)), false));
        assert_eq!(statement("DEL n"), (Some(Statement::Del(DelCount::Unknown)), false));
        assert_eq!(statement("ADDITION = 1"), (Some(Statement::Other), false));
    }

    #[test]
    fn test_comments_and_blanks() {
        assert_eq!(statement("! ADDZ 1"), (None, false));
        assert_eq!(statement("   "), (None, false));
        assert_eq!(statement("TEXT2 0, 0, \"END\""), (Some(Statement::Other), false));
    }
}
