//! Lenient HTML reader producing an in-memory [`DomTree`].
//!
//! Built on `winnow` 0.7. This is not a conforming HTML5 tree builder; it
//! only has to be good enough to recover the element/comment structure of
//! pages rendered by the channel backend so they can be parsed outside a
//! browser. It never fails: anything it cannot read as markup becomes text.
//!
//! Handles: comments, open/close/self-closing tags, quoted and bare
//! attributes, void elements, raw-text elements (`script`, `style`, ...),
//! doctype and processing instructions (skipped), stray close tags (ignored),
//! and unclosed elements (closed at their parent's end).

use crate::dom::{DomNodeId, DomNodeKind, DomTree};
use smallvec::SmallVec;
use std::borrow::Cow;
use winnow::ascii::multispace0;
use winnow::combinator::{alt, delimited};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{take_till, take_until, take_while};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

#[derive(Debug, Clone)]
enum MarkupKind {
    Document,
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Comment(String),
    Text(String),
}

#[derive(Debug, Clone)]
struct MarkupNode {
    kind: MarkupKind,
    parent: Option<DomNodeId>,
    children: SmallVec<[DomNodeId; 8]>,
}

/// An arena-allocated document. Node ids are assigned in document order.
#[derive(Debug, Clone)]
pub struct MarkupDocument {
    nodes: Vec<MarkupNode>,
}

impl MarkupDocument {
    /// Read `input` into a document tree.
    pub fn parse(input: &str) -> Self {
        let mut doc = Self {
            nodes: vec![MarkupNode {
                kind: MarkupKind::Document,
                parent: None,
                children: SmallVec::new(),
            }],
        };
        let mut open: Vec<DomNodeId> = vec![DomNodeId::new(0)];
        let mut rest = input;

        while !rest.is_empty() {
            let parent = open.last().copied().unwrap_or(DomNodeId::new(0));
            let start = rest;

            if rest.starts_with("<!--") {
                match parse_comment.parse_next(&mut rest) {
                    Ok(text) => {
                        doc.push(parent, MarkupKind::Comment(text.to_string()));
                    }
                    Err(_) => {
                        // Unterminated comment swallows the remainder, like a browser.
                        doc.push(parent, MarkupKind::Comment(start[4..].to_string()));
                        rest = "";
                    }
                }
            } else if rest.starts_with("</") {
                match parse_close_tag.parse_next(&mut rest) {
                    Ok(name) => close_element(&doc, &mut open, &name.to_ascii_lowercase()),
                    Err(_) => {
                        doc.push_text(parent, "<");
                        rest = &start[1..];
                    }
                }
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                skip_declaration(&mut rest);
            } else if rest.starts_with('<') {
                match parse_open_tag.parse_next(&mut rest) {
                    Ok(tag) => {
                        let name = tag.name.to_ascii_lowercase();
                        let is_void = VOID_ELEMENTS.contains(&name.as_str());
                        let is_raw = RAW_TEXT_ELEMENTS.contains(&name.as_str());
                        let el = doc.push(
                            parent,
                            MarkupKind::Element {
                                tag: name.clone(),
                                attrs: tag.attrs,
                            },
                        );
                        if tag.self_closing || is_void {
                            continue;
                        }
                        if is_raw {
                            let body = take_raw_text(&mut rest, &name);
                            if !body.is_empty() {
                                doc.push_text(el, body);
                            }
                        } else {
                            open.push(el);
                        }
                    }
                    Err(_) => {
                        doc.push_text(parent, "<");
                        rest = &start[1..];
                    }
                }
            } else {
                let text: Result<&str, ErrMode<ContextError>> =
                    take_till(1.., '<').parse_next(&mut rest);
                if let Ok(text) = text {
                    doc.push_text(parent, text);
                }
            }
        }

        doc
    }

    fn push(&mut self, parent: DomNodeId, kind: MarkupKind) -> DomNodeId {
        let id = DomNodeId::new(self.nodes.len() as u32);
        self.nodes.push(MarkupNode {
            kind,
            parent: Some(parent),
            children: SmallVec::new(),
        });
        self.nodes[parent.index() as usize].children.push(id);
        id
    }

    fn push_text(&mut self, parent: DomNodeId, text: &str) {
        // Merge with a preceding text sibling so "<" fallbacks don't fragment text.
        if let Some(&last) = self.nodes[parent.index() as usize].children.last()
            && let MarkupKind::Text(existing) = &mut self.nodes[last.index() as usize].kind
        {
            existing.push_str(text);
            return;
        }
        self.push(parent, MarkupKind::Text(text.to_string()));
    }

    fn node(&self, id: DomNodeId) -> Option<&MarkupNode> {
        self.nodes.get(id.index() as usize)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn parent(&self, id: DomNodeId) -> Option<DomNodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// Lower-cased tag name of an element.
    pub fn tag(&self, id: DomNodeId) -> Option<&str> {
        match &self.node(id)?.kind {
            MarkupKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn attribute(&self, id: DomNodeId, name: &str) -> Option<&str> {
        match &self.node(id)?.kind {
            MarkupKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn text(&self, id: DomNodeId) -> Option<&str> {
        match &self.node(id)?.kind {
            MarkupKind::Text(t) => Some(t),
            _ => None,
        }
    }

    /// All element ids in document order.
    pub fn elements(&self) -> impl Iterator<Item = DomNodeId> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, n)| {
            matches!(n.kind, MarkupKind::Element { .. }).then(|| DomNodeId::new(i as u32))
        })
    }

    /// First element whose `id` attribute equals `id`.
    pub fn element_by_id(&self, id: &str) -> Option<DomNodeId> {
        self.elements()
            .find(|&el| self.attribute(el, "id") == Some(id))
    }

    /// Elements carrying `class` among their classes, in document order.
    pub fn elements_by_class<'a>(&'a self, class: &'a str) -> impl Iterator<Item = DomNodeId> + 'a {
        self.elements().filter(move |&el| {
            self.attribute(el, "class")
                .is_some_and(|c| c.split_ascii_whitespace().any(|c| c == class))
        })
    }
}

impl DomTree for MarkupDocument {
    fn root(&self) -> DomNodeId {
        DomNodeId::new(0)
    }

    fn kind(&self, node: DomNodeId) -> DomNodeKind {
        match self.node(node).map(|n| &n.kind) {
            Some(MarkupKind::Document) => DomNodeKind::Document,
            Some(MarkupKind::Element { .. }) => DomNodeKind::Element,
            Some(MarkupKind::Comment(_)) => DomNodeKind::Comment,
            Some(MarkupKind::Text(_)) => DomNodeKind::Text,
            None => DomNodeKind::Other,
        }
    }

    fn children(&self, node: DomNodeId) -> SmallVec<[DomNodeId; 8]> {
        self.node(node).map(|n| n.children.clone()).unwrap_or_default()
    }

    fn comment_text(&self, node: DomNodeId) -> Option<Cow<'_, str>> {
        match &self.node(node)?.kind {
            MarkupKind::Comment(text) => Some(Cow::Borrowed(text.as_str())),
            _ => None,
        }
    }
}

/// Pop the open-element stack down to the nearest element named `name`.
/// A close tag with no matching open element is ignored.
fn close_element(doc: &MarkupDocument, open: &mut Vec<DomNodeId>, name: &str) {
    if let Some(pos) = open.iter().rposition(|&el| doc.tag(el) == Some(name))
        && pos > 0
    {
        open.truncate(pos);
    }
}

// ─── Low-level parsers ──────────────────────────────────────────────────

struct OpenTag<'a> {
    name: &'a str,
    attrs: Vec<(String, String)>,
    self_closing: bool,
}

fn parse_comment<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    delimited("<!--", take_until(0.., "-->"), "-->").parse_next(input)
}

fn parse_tag_name<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    take_while(1.., |c: char| {
        c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':'
    })
    .parse_next(input)
}

fn parse_close_tag<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    let _ = "</".parse_next(input)?;
    let name = parse_tag_name.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let _ = '>'.parse_next(input)?;
    Ok(name)
}

fn parse_open_tag<'a>(input: &mut &'a str) -> ModalResult<OpenTag<'a>> {
    let _ = '<'.parse_next(input)?;
    let name = parse_tag_name.parse_next(input)?;
    let mut attrs = Vec::new();
    loop {
        let _ = multispace0.parse_next(input)?;
        if let Some(after) = input.strip_prefix("/>") {
            *input = after;
            return Ok(OpenTag {
                name,
                attrs,
                self_closing: true,
            });
        }
        if let Some(after) = input.strip_prefix('>') {
            *input = after;
            return Ok(OpenTag {
                name,
                attrs,
                self_closing: false,
            });
        }
        if input.is_empty() {
            return Err(ErrMode::Backtrack(ContextError::new()));
        }
        attrs.push(parse_attribute.parse_next(input)?);
    }
}

fn parse_attribute(input: &mut &str) -> ModalResult<(String, String)> {
    let name: &str = take_while(1.., |c: char| {
        !c.is_whitespace() && !matches!(c, '=' | '>' | '/' | '"' | '\'')
    })
    .parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    if !input.starts_with('=') {
        return Ok((name.to_ascii_lowercase(), String::new()));
    }
    let _ = '='.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let value: &str = alt((
        delimited('"', take_till(0.., '"'), '"'),
        delimited('\'', take_till(0.., '\''), '\''),
        take_while(1.., |c: char| !c.is_whitespace() && c != '>'),
    ))
    .parse_next(input)?;
    Ok((name.to_ascii_lowercase(), value.to_string()))
}

/// Consume the body of a raw-text element and its close tag.
fn take_raw_text<'a>(input: &mut &'a str, name: &str) -> &'a str {
    let close = format!("</{name}");
    let lower = input.to_ascii_lowercase();
    match lower.find(&close) {
        Some(pos) => {
            let body = &input[..pos];
            *input = &input[pos..];
            if parse_close_tag.parse_next(input).is_err() {
                // "</script" without `>`: drop the rest.
                *input = "";
            }
            body
        }
        None => {
            let body = *input;
            *input = "";
            body
        }
    }
}

fn skip_declaration(input: &mut &str) {
    match input.find('>') {
        Some(pos) => *input = &input[pos + 1..],
        None => *input = "",
    }
}
