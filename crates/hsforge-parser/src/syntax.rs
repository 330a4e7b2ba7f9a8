//! Line-level grammar shared by the source, reply and script readers.
//!
//! GDL is line oriented, so every entry point here takes a single line and
//! either recognizes it completely or returns `None`. The grammar covers:
//!
//! - literals: numbers (`1`, `-0.25`, `1e3`) and quoted text (`"a"`, `'b'`)
//! - typed declarations: `Length w = 0.9 @fixed ! Width of the top`
//! - comment declarations: `! w Length 0.9 Width of the top`
//! - constant assignments: `w = 0.9`
//! - labels: `100:` and `"name":`

use hsforge_core::Value;
use winnow::{
    Parser as _,
    ascii::{float, space0, space1},
    combinator::{alt, delimited, eof, not, opt, peek, preceded, repeat, terminated},
    error::ModalResult,
    token::{one_of, rest, take_till, take_while},
};

type Input<'a> = &'a str;

/// A parameter declaration read from one line.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub type_name: String,
    pub value: Value,
    pub description: Option<String>,
    pub fixed: bool,
    pub flags: Vec<String>,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '~'
}

/// Parse identifiers
fn identifier<'a>(input: &mut Input<'a>) -> ModalResult<&'a str> {
    take_while(1.., is_ident_char)
        .verify(|s: &str| {
            s.chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        })
        .parse_next(input)
}

/// Parse a number not followed by identifier characters
fn number<'a>(input: &mut Input<'a>) -> ModalResult<f64> {
    terminated(float, peek(not(one_of(is_ident_char))))
        .verify(|n: &f64| n.is_finite())
        .parse_next(input)
}

/// Parse text between matching single or double quotes
fn quoted<'a>(input: &mut Input<'a>) -> ModalResult<&'a str> {
    alt((
        delimited('"', take_till(0.., '"'), '"'),
        delimited('\'', take_till(0.., '\''), '\''),
    ))
    .parse_next(input)
}

fn literal<'a>(input: &mut Input<'a>) -> ModalResult<Value> {
    alt((
        quoted.map(|text: &str| Value::Text(text.to_string())),
        number.map(Value::Number),
    ))
    .parse_next(input)
}

/// Parse `@name` attributes following a declaration's value
fn attributes<'a>(input: &mut Input<'a>) -> ModalResult<Vec<&'a str>> {
    repeat(0.., preceded((space0, '@'), identifier)).parse_next(input)
}

/// Parse a trailing `! comment` up to the end of the line
fn trailing_comment<'a>(input: &mut Input<'a>) -> ModalResult<Option<&'a str>> {
    terminated(opt(preceded((space0, '!'), rest)), (space0, eof)).parse_next(input)
}

fn typed_declaration<'a>(input: &mut Input<'a>) -> ModalResult<Declaration> {
    let (type_name, _, name, _, _, _, value, attrs, description) = (
        identifier,
        space1,
        identifier,
        space0,
        '=',
        space0,
        literal,
        attributes,
        trailing_comment,
    )
        .parse_next(input)?;
    Ok(declaration(name, type_name, value, attrs, description))
}

fn comment_declaration<'a>(input: &mut Input<'a>) -> ModalResult<Declaration> {
    let (_, _, name, _, type_name, _, value, attrs, description) = (
        '!',
        space0,
        identifier,
        space1,
        identifier,
        space1,
        literal,
        attributes,
        rest,
    )
        .parse_next(input)?;
    Ok(declaration(name, type_name, value, attrs, Some(description)))
}

fn declaration(
    name: &str,
    type_name: &str,
    value: Value,
    attrs: Vec<&str>,
    description: Option<&str>,
) -> Declaration {
    let mut fixed = false;
    let mut flags = Vec::new();
    for attr in attrs {
        if attr.eq_ignore_ascii_case("fixed") {
            fixed = true;
        } else {
            flags.push(attr.to_string());
        }
    }
    Declaration {
        name: name.to_string(),
        type_name: type_name.to_string(),
        value,
        description: description.and_then(unquote_description),
        fixed,
        flags,
    }
}

/// Trim a free-text description and drop one pair of surrounding quotes.
fn unquote_description(raw: &str) -> Option<String> {
    let text = raw.trim();
    let text = ['"', '\'']
        .iter()
        .find_map(|q| {
            text.strip_prefix(*q)
                .and_then(|t| t.strip_suffix(*q))
                .filter(|_| text.len() >= 2)
        })
        .unwrap_or(text);
    (!text.is_empty()).then(|| text.to_string())
}

/// Parse `Type name = value [@attr...] [! description]`.
pub fn parse_typed_declaration(line: &str) -> Option<Declaration> {
    typed_declaration.parse(line.trim()).ok()
}

/// Parse either declaration form.
pub fn parse_declaration(line: &str) -> Option<Declaration> {
    let line = line.trim();
    if line.starts_with('!') {
        comment_declaration.parse(line).ok()
    } else {
        typed_declaration.parse(line).ok()
    }
}

/// Parse `name = constant [! comment]`, returning the name and the literal.
pub fn parse_assignment(line: &str) -> Option<(String, Value)> {
    (identifier, space0, '=', space0, literal, trailing_comment)
        .map(|(name, _, _, _, value, _)| (name.to_string(), value))
        .parse(line.trim())
        .ok()
}

/// Split a leading label off a line.
///
/// Returns the label text (`100` or `name`) and the remainder of the line.
pub fn split_label(line: &str) -> Option<(String, &str)> {
    let mut input = line.trim_start();
    let label = terminated(
        alt((
            quoted.map(str::to_string),
            number.map(hsforge_core::param::format_number),
        )),
        (space0, ':'),
    )
    .parse_next(&mut input)
    .ok()?;
    // `:=` is not a label separator
    if input.starts_with('=') {
        return None;
    }
    Some((label, input))
}

/// Parse the target of a `GOSUB` or `GOTO`, if it is a literal label.
pub fn parse_label_reference(text: &str) -> Option<String> {
    terminated(
        alt((
            quoted.map(str::to_string),
            number.map(hsforge_core::param::format_number),
        )),
        (space0, eof),
    )
    .parse(text.trim())
    .ok()
}

/// Parse a whole, non-negative number literal.
pub fn parse_count(text: &str) -> Option<usize> {
    terminated(number, (space0, eof))
        .parse(text.trim())
        .ok()
        .filter(|n| *n >= 0.0 && n.fract() == 0.0)
        .map(|n| n as usize)
}

/// Remove a `!` comment, ignoring `!` inside string literals.
pub fn strip_comment(line: &str) -> &str {
    let mut quote = None;
    for (idx, c) in line.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), _) if q == c => quote = None,
            (None, '!') => return &line[..idx],
            _ => {}
        }
    }
    line
}

/// Identifier-like words outside string literals, with their byte offsets.
pub fn words(code: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut quote = None;
    let mut start = None;
    for (idx, c) in code.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        if is_ident_char(c) {
            start.get_or_insert(idx);
            continue;
        }
        if let Some(s) = start.take() {
            out.push((s, &code[s..idx]));
        }
        if c == '"' || c == '\'' {
            quote = Some(c);
        }
    }
    if let Some(s) = start {
        out.push((s, &code[s..]));
    }
    out
}
