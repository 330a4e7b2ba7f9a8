//! Minimal XML reader for library-part manifests.
//!
//! Handles the subset `LP_XMLConverter` writes: a prolog, nested elements
//! with quoted attributes, text with the predefined and numeric entities,
//! CDATA sections, comments and processing instructions. Namespaces and
//! DTDs are not interpreted.

use thiserror::Error;
use winnow::{
    Parser as _,
    ascii::{multispace0, multispace1},
    combinator::{alt, cut_err, delimited, opt, repeat},
    error::ModalResult,
    token::{literal, take_till, take_until, take_while},
};

type Input<'a> = &'a str;

/// An XML document that could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed XML at byte {offset}")]
pub struct XmlError {
    offset: usize,
}

impl XmlError {
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Content of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Character data, with entities resolved. CDATA sections appear here too.
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Child elements, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// The first child element called `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|element| element.name == name)
    }

    /// The first element called `name` in a depth-first walk below this one.
    pub fn descendant(&self, name: &str) -> Option<&Element> {
        self.elements().find_map(|element| {
            if element.name == name {
                Some(element)
            } else {
                element.descendant(name)
            }
        })
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }
}

/// Parse a whole document, returning its root element.
pub fn parse_document(text: &str) -> Result<Element, XmlError> {
    document.parse(text).map_err(|err| XmlError {
        offset: err.offset(),
    })
}

/// Escape text for use in element content or a double-quoted attribute.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Wrap text in a CDATA section, splitting any embedded terminator.
pub fn cdata(text: &str) -> String {
    format!("<![CDATA[{}]]>", text.replace("]]>", "]]]]><![CDATA[>"))
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        let resolved = rest
            .find(';')
            .and_then(|end| entity(&rest[1..end]).map(|c| (c, end)));
        match resolved {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = match name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => name.strip_prefix('#')?.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

fn name<'a>(input: &mut Input<'a>) -> ModalResult<&'a str> {
    take_while(1.., |c: char| {
        c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '.')
    })
    .parse_next(input)
}

fn attribute(input: &mut Input<'_>) -> ModalResult<(String, String)> {
    let (_, key, _, _, _, value) = (
        multispace1,
        name,
        multispace0,
        '=',
        multispace0,
        alt((
            delimited('"', take_till(0.., '"'), '"'),
            delimited('\'', take_till(0.., '\''), '\''),
        )),
    )
        .parse_next(input)?;
    Ok((key.to_string(), unescape(value)))
}

fn comment(input: &mut Input<'_>) -> ModalResult<()> {
    ("<!--", take_until(0.., "-->"), "-->")
        .void()
        .parse_next(input)
}

fn processing_instruction(input: &mut Input<'_>) -> ModalResult<()> {
    ("<?", take_until(0.., "?>"), "?>").void().parse_next(input)
}

fn doctype(input: &mut Input<'_>) -> ModalResult<()> {
    ("<!DOCTYPE", take_till(0.., '>'), '>')
        .void()
        .parse_next(input)
}

fn cdata_section<'a>(input: &mut Input<'a>) -> ModalResult<&'a str> {
    delimited("<![CDATA[", take_until(0.., "]]>"), "]]>").parse_next(input)
}

fn node(input: &mut Input<'_>) -> ModalResult<Option<Node>> {
    alt((
        cdata_section.map(|text| Some(Node::Text(text.to_string()))),
        comment.map(|_| None),
        processing_instruction.map(|_| None),
        element.map(|element| Some(Node::Element(element))),
        take_till(1.., '<').map(|text| Some(Node::Text(unescape(text)))),
    ))
    .parse_next(input)
}

fn element(input: &mut Input<'_>) -> ModalResult<Element> {
    let tag = ('<', name).map(|(_, tag)| tag).parse_next(input)?;
    let attributes: Vec<(String, String)> = repeat(0.., attribute).parse_next(input)?;
    multispace0.parse_next(input)?;

    if opt("/>").parse_next(input)?.is_some() {
        return Ok(Element {
            name: tag.to_string(),
            attributes,
            children: Vec::new(),
        });
    }

    cut_err('>').parse_next(input)?;
    let children: Vec<Option<Node>> = repeat(0.., node).parse_next(input)?;
    cut_err(("</", literal(tag), multispace0, '>')).parse_next(input)?;

    Ok(Element {
        name: tag.to_string(),
        attributes,
        children: children.into_iter().flatten().collect(),
    })
}

fn misc(input: &mut Input<'_>) -> ModalResult<()> {
    alt((multispace1.void(), comment, processing_instruction, doctype)).parse_next(input)
}

fn document(input: &mut Input<'_>) -> ModalResult<Element> {
    opt('\u{feff}').parse_next(input)?;
    let _: () = repeat(0.., misc).parse_next(input)?;
    let root = element.parse_next(input)?;
    let _: () = repeat(0.., misc).parse_next(input)?;
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest_fragment() {
        let text = "\u{feff}<?xml version=\"1.0\" encoding=\"UTF-8\"?>
<!-- generated -->
<ParamSection>
  <Parameters SectVersion=\"27\">
    <Length Name=\"A\">
      <Description><![CDATA[\"Width & <span>\"]]></Description>
      <Fix/>
      <Value>0.9</Value>
    </Length>
  </Parameters>
</ParamSection>
";
        let root = parse_document(text).unwrap();
        assert_eq!(root.name(), "ParamSection");

        let params = root.child("Parameters").unwrap();
        assert_eq!(params.attribute("SectVersion"), Some("27"));

        let length = params.elements().next().unwrap();
        assert_eq!(length.name(), "Length");
        assert_eq!(length.attribute("Name"), Some("A"));
        assert_eq!(
            length.child("Description").unwrap().text(),
            "\"Width & <span>\""
        );
        assert!(length.child("Fix").is_some());
        assert_eq!(length.child("Value").unwrap().text(), "0.9");
        assert!(root.descendant("Fix").is_some());
    }

    #[test]
    fn test_entities() {
        let root = parse_document("<a t='x &quot;y&quot;'>1 &lt; 2 &amp;&#65;&#x42; &bogus;</a>").unwrap();
        assert_eq!(root.attribute("t"), Some("x \"y\""));
        assert_eq!(root.text(), "1 < 2 &AB &bogus;");
    }

    #[test]
    fn test_malformed_documents() {
        assert!(parse_document("<a><b></a>").is_err());
        assert!(parse_document("<a>").is_err());
        assert!(parse_document("<a/><b/>").is_err());
        assert!(parse_document("").is_err());
    }

    #[test]
    fn test_escape_and_cdata() {
        assert_eq!(escape("a&b<\"c\">"), "a&amp;b&lt;&quot;c&quot;&gt;");
        let wrapped = cdata("x]]>y");
        let root = parse_document(&format!("<d>{wrapped}</d>")).unwrap();
        assert_eq!(root.text(), "x]]>y");
    }
}
