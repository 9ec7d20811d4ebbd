//! Lossless XML document tree.
//!
//! Every node remembers the exact source text it was parsed from and is
//! written back byte for byte until it is modified.  Qualified names
//! (`o:a="1"`), namespace declarations, CDATA sections, entity references,
//! comments and processing instructions before or after the root element,
//! and the DOCTYPE all survive a save unchanged.
//!
//! Only an element whose attributes change, or a self-closing element that
//! gains children, has its start tag rebuilt.  Attribute values written by
//! [`Element::set_attribute`] escape `\t`, `\n` and `\r` as character
//! references so that conforming readers do not normalize them to spaces.

use std::borrow::Cow;

use quick_xml::escape::{unescape, EscapeError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use thiserror::Error;

use super::StoreOptions;

const DEFAULT_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const BOM: char = '\u{feff}';

/// The text is not a well-formed single-root XML document.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed XML at byte {position}: {source}")]
    Syntax {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },

    #[error("invalid reference in attribute `{attribute}`: {source}")]
    Escape {
        attribute: String,
        #[source]
        source: EscapeError,
    },

    #[error("markup is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("closing tag without a matching start tag at byte {0}")]
    UnexpectedEnd(usize),

    #[error("element `{0}` is never closed")]
    Unclosed(String),

    #[error("document has no root element")]
    NoRoot,

    #[error("document has more than one root element")]
    MultipleRoots,

    #[error("text outside the root element")]
    TextOutsideRoot,
}

/// One node of the tree.  Every variant except `Element` holds its raw
/// source text, delimiters included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Character data, still escaped as in the source.
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
    Declaration(String),
    DocType(String),
}

/// An attribute with its qualified name and its value as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    raw_value: String,
}

impl Attribute {
    /// Qualified name, prefix included.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value a conforming reader reports: literal whitespace normalized
    /// to spaces, then references resolved.
    pub fn value(&self) -> Cow<'_, str> {
        decode_attribute(&self.raw_value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub(crate) name: String,
    pub(crate) attributes: Vec<Attribute>,
    pub(crate) children: Vec<Node>,
    self_closing: bool,
    /// Verbatim start tag; dropped once the attributes change.
    source: Option<String>,
}

impl Element {
    /// A new, empty element written as `<name/>` until it gains children.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            self_closing: true,
            source: None,
        }
    }

    fn from_start(
        start: &BytesStart<'_>,
        raw: &str,
        position: usize,
        self_closing: bool,
    ) -> Result<Self, ParseError> {
        let name = std::str::from_utf8(start.name().as_ref())?.to_string();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| ParseError::Syntax {
                position,
                source: e.into(),
            })?;
            let name = std::str::from_utf8(attr.key.as_ref())?.to_string();
            let raw_value = std::str::from_utf8(&attr.value)?.to_string();
            if let Err(source) = unescape(&raw_value) {
                return Err(ParseError::Escape {
                    attribute: name,
                    source,
                });
            }
            attributes.push(Attribute { name, raw_value });
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
            self_closing,
            source: Some(raw.to_string()),
        })
    }

    /// Qualified name, prefix included.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Decoded value of the attribute with this qualified name.
    pub fn attribute(&self, name: &str) -> Option<Cow<'_, str>> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(Attribute::value)
    }

    /// Sets an attribute, replacing an existing value in place or appending
    /// a new attribute after the existing ones.
    pub fn set_attribute(&mut self, name: &str, value: &str) {
        let raw_value = escape_attribute(value);
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(attr) => attr.raw_value = raw_value,
            None => self.attributes.push(Attribute {
                name: name.to_string(),
                raw_value,
            }),
        }
        self.source = None;
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Child elements, in document order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(child) => Some(child),
            _ => None,
        })
    }

    /// First child element with this qualified name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    /// Concatenated, decoded text and CDATA content of the direct children.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for node in &self.children {
            match node {
                Node::Text(raw) => {
                    text.push_str(&unescape(raw).unwrap_or(Cow::Borrowed(raw.as_str())))
                }
                Node::CData(raw) => text.push_str(
                    raw.strip_prefix("<![CDATA[")
                        .and_then(|s| s.strip_suffix("]]>"))
                        .unwrap_or(raw.as_str()),
                ),
                _ => {}
            }
        }
        text
    }

    fn write(&self, out: &mut String) {
        let collapsed = self.self_closing && self.children.is_empty();
        match &self.source {
            Some(raw) if collapsed || !self.self_closing => out.push_str(raw),
            _ => {
                out.push('<');
                out.push_str(&self.name);
                for attr in &self.attributes {
                    // A raw value containing `"` came from a single-quoted attribute.
                    let quote = if attr.raw_value.contains('"') { '\'' } else { '"' };
                    out.push(' ');
                    out.push_str(&attr.name);
                    out.push('=');
                    out.push(quote);
                    out.push_str(&attr.raw_value);
                    out.push(quote);
                }
                out.push_str(if collapsed { "/>" } else { ">" });
            }
        }
        if collapsed {
            return;
        }
        for child in &self.children {
            child.write(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

impl Node {
    fn write(&self, out: &mut String) {
        match self {
            Node::Element(element) => element.write(out),
            Node::Text(raw)
            | Node::CData(raw)
            | Node::Comment(raw)
            | Node::ProcessingInstruction(raw)
            | Node::Declaration(raw)
            | Node::DocType(raw) => out.push_str(raw),
        }
    }

    /// `true` for a text node made only of XML whitespace.
    pub fn is_blank(&self) -> bool {
        matches!(self, Node::Text(raw) if is_blank(raw))
    }
}

/// A whole document: the root element plus whatever surrounds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    prolog: Vec<Node>,
    root: Element,
    epilog: Vec<Node>,
    bom: bool,
}

impl Document {
    /// A document holding only `root`, followed by `epilog`.
    pub fn new(root: Element, epilog: Vec<Node>) -> Self {
        Self {
            prolog: Vec::new(),
            root,
            epilog,
            bom: false,
        }
    }

    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let (bom, text) = match text.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let mut reader = Reader::from_str(text);
        let mut stack: Vec<Element> = Vec::new();
        let mut prolog = Vec::new();
        let mut root: Option<Element> = None;
        let mut epilog = Vec::new();

        loop {
            let start = reader.buffer_position();
            let event = reader.read_event().map_err(|source| ParseError::Syntax {
                position: reader.buffer_position(),
                source,
            })?;
            let end = reader.buffer_position();
            let raw = text.get(start..end).unwrap_or_default();

            let node = match event {
                Event::Start(e) => {
                    stack.push(Element::from_start(&e, raw, start, false)?);
                    continue;
                }
                Event::Empty(e) => Node::Element(Element::from_start(&e, raw, start, true)?),
                Event::End(_) => Node::Element(stack.pop().ok_or(ParseError::UnexpectedEnd(start))?),
                Event::Text(_) if raw.is_empty() => continue,
                Event::Text(_) => Node::Text(raw.to_string()),
                Event::CData(_) => Node::CData(raw.to_string()),
                Event::Comment(_) => Node::Comment(raw.to_string()),
                Event::PI(_) => Node::ProcessingInstruction(raw.to_string()),
                Event::Decl(_) => Node::Declaration(raw.to_string()),
                Event::DocType(_) => Node::DocType(raw.to_string()),
                Event::Eof => break,
            };

            if let Some(parent) = stack.last_mut() {
                parent.children.push(node);
                continue;
            }
            match (node, root.is_some()) {
                (Node::Element(element), false) => root = Some(element),
                (Node::Element(_), true) => return Err(ParseError::MultipleRoots),
                (Node::Text(raw), _) if !is_blank(&raw) => return Err(ParseError::TextOutsideRoot),
                (Node::CData(_), _) => return Err(ParseError::TextOutsideRoot),
                (node, false) => prolog.push(node),
                (node, true) => epilog.push(node),
            }
        }

        if let Some(open) = stack.pop() {
            return Err(ParseError::Unclosed(open.name));
        }
        let root = root.ok_or(ParseError::NoRoot)?;
        Ok(Self {
            prolog,
            root,
            epilog,
            bom,
        })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Nodes before the root element.
    pub fn prolog(&self) -> &[Node] {
        &self.prolog
    }

    /// Nodes after the root element.
    pub fn epilog(&self) -> &[Node] {
        &self.epilog
    }

    pub fn has_declaration(&self) -> bool {
        self.prolog.iter().any(|n| matches!(n, Node::Declaration(_)))
    }

    /// Renders the document.  A declaration is added only when
    /// `options.write_declaration` is set and the document has none.
    pub fn to_xml(&self, options: &StoreOptions) -> String {
        let mut out = String::new();
        if self.bom {
            out.push(BOM);
        }
        if options.write_declaration && !self.has_declaration() {
            out.push_str(DEFAULT_DECLARATION);
            out.push('\n');
        }
        for node in &self.prolog {
            node.write(&mut out);
        }
        self.root.write(&mut out);
        for node in &self.epilog {
            node.write(&mut out);
        }
        out
    }
}

/// `true` if `name` matches the XML 1.0 `Name` production.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_name_start_char) && chars.all(is_name_char)
}

fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z'
        | '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}' | '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' | '\u{10000}'..='\u{EFFFF}')
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}'
            | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

fn is_blank(raw: &str) -> bool {
    raw.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
}

/// Escapes a value for a double-quoted attribute.
pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            c => out.push(c),
        }
    }
    out
}

fn decode_attribute(raw: &str) -> Cow<'_, str> {
    let is_control = |c: char| matches!(c, '\t' | '\n' | '\r');
    let normalized: Cow<'_, str> = if raw.contains(is_control) {
        Cow::Owned(
            raw.replace("\r\n", " ")
                .replace(is_control, " "),
        )
    } else {
        Cow::Borrowed(raw)
    };
    match normalized {
        Cow::Borrowed(raw) => unescape(raw).unwrap_or(Cow::Borrowed(raw)),
        Cow::Owned(owned) => Cow::Owned(
            unescape(&owned)
                .map(Cow::into_owned)
                .unwrap_or_else(|_| owned.clone()),
        ),
    }
}
