//! Structural comment parser: rendered document → [`Page`].
//!
//! The rendering backend brackets every container and component with a pair
//! of HTML comments carrying JSON:
//!
//! ```text
//! <!--{"type":"container","id":"main","attributes":{"label":"Main"}}-->
//! <div class="container-box"> ... </div>
//! <!--{"id":"main","end":true}-->
//! ```
//!
//! The first element after a begin marker is the item's box element.
//! Components attach to the innermost open container. A single
//! `{"type":"page-meta", ...}` comment carries page metadata.
//!
//! Parsing never fails. Broken structure is reported as [`ParseWarning`]s
//! (also logged) and whatever could be recovered is kept.

use crate::dom::{DomNodeId, DomNodeKind, DomTree};
use crate::id::ItemId;
use crate::model::{Component, Container, DragDirection, Page, PageMeta};
use petgraph::graph::NodeIndex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use thiserror::Error;

/// Result of parsing one document.
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub page: Page,
    pub warnings: Vec<ParseWarning>,
}

/// Recoverable structure problems found while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseWarning {
    #[error("marker `{0}` was never closed")]
    Unterminated(ItemId),
    #[error("end marker `{0}` has no matching begin marker")]
    UnmatchedEnd(ItemId),
    #[error("marker `{0}` encloses no element")]
    MissingBoxElement(ItemId),
    #[error("component `{0}` is not inside a container")]
    OrphanComponent(ItemId),
    #[error("id `{0}` appears more than once")]
    DuplicateId(ItemId),
    #[error("unreadable marker comment: {0}")]
    MalformedMarker(String),
}

// ─── Markers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Container,
    Component,
}

/// A decoded structural comment.
#[derive(Debug, Clone, PartialEq)]
pub enum Marker {
    Begin {
        kind: MarkerKind,
        id: ItemId,
        attributes: Map<String, Value>,
    },
    End {
        id: ItemId,
    },
    PageMeta(PageMeta),
    /// Well-formed marker of a type this parser doesn't know.
    Unknown {
        kind: String,
        id: Option<ItemId>,
    },
}

#[derive(Debug, Deserialize)]
struct MarkerPayload {
    #[serde(rename = "type")]
    kind: Option<String>,
    id: Option<String>,
    #[serde(default)]
    end: bool,
    #[serde(default)]
    attributes: Map<String, Value>,
    /// Top-level keys besides the known ones are treated as attributes too.
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Decode comment text into a marker.
///
/// `Ok(None)` for ordinary comments (not JSON objects). `Err` for comments
/// that look like markers but can't be read.
pub fn read_marker(text: &str) -> Result<Option<Marker>, ParseWarning> {
    let text = text.trim();
    if !text.starts_with('{') {
        return Ok(None);
    }
    let payload: MarkerPayload = serde_json::from_str(text)
        .map_err(|e| ParseWarning::MalformedMarker(format!("{e}: {}", abbreviate(text))))?;

    let mut attributes = payload.extra;
    attributes.extend(payload.attributes);
    let id = payload.id.as_deref().map(ItemId::intern);

    if payload.end {
        return id
            .map(|id| Some(Marker::End { id }))
            .ok_or_else(|| ParseWarning::MalformedMarker(abbreviate(text)));
    }

    match payload.kind.as_deref() {
        Some("container") | Some("component") => {
            let kind = if payload.kind.as_deref() == Some("container") {
                MarkerKind::Container
            } else {
                MarkerKind::Component
            };
            let id = id.ok_or_else(|| ParseWarning::MalformedMarker(abbreviate(text)))?;
            Ok(Some(Marker::Begin {
                kind,
                id,
                attributes,
            }))
        }
        Some("page-meta") => Ok(Some(Marker::PageMeta(PageMeta {
            channel_id: string_attr(&attributes, "channelId"),
            page_id: string_attr(&attributes, "pageId"),
            path_info: string_attr(&attributes, "pathInfo"),
            mount_id: string_attr(&attributes, "mountId"),
        }))),
        Some(other) => Ok(Some(Marker::Unknown {
            kind: other.to_string(),
            id,
        })),
        None => Ok(None),
    }
}

fn abbreviate(text: &str) -> String {
    const MAX: usize = 80;
    match text.char_indices().nth(MAX) {
        Some((pos, _)) => format!("{}…", &text[..pos]),
        None => text.to_string(),
    }
}

fn string_attr(attrs: &Map<String, Value>, key: &str) -> Option<String> {
    match attrs.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn bool_attr(attrs: &Map<String, Value>, key: &str) -> bool {
    match attrs.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn timestamp_attr(attrs: &Map<String, Value>, key: &str) -> Option<i64> {
    match attrs.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn drag_direction(attrs: &Map<String, Value>) -> DragDirection {
    match attrs.get("dragDirection").and_then(Value::as_str) {
        Some("horizontal") => DragDirection::Horizontal,
        Some(_) => DragDirection::Vertical,
        None => match attrs.get("xtype").and_then(Value::as_str) {
            Some("hst.span") | Some("hst.hbox") => DragDirection::Horizontal,
            _ => DragDirection::Vertical,
        },
    }
}

// ─── Tree walk ───────────────────────────────────────────────────────────

/// Item announced by a begin marker, waiting for its box element.
struct Pending {
    kind: MarkerKind,
    attributes: Map<String, Value>,
}

struct OpenMarker {
    id: ItemId,
    kind: MarkerKind,
    pending: Option<Pending>,
    node: Option<NodeIndex>,
    /// Not part of the tree (duplicate/orphan); only kept so its end marker matches.
    skipped: bool,
}

struct Walker {
    page: Page,
    warnings: Vec<ParseWarning>,
    open: Vec<OpenMarker>,
    /// Ids of unknown-type markers; their end markers are dropped quietly.
    unknown_ids: HashSet<ItemId>,
}

/// Parse all structural comments of `doc`. Always starts from an empty page.
pub fn parse_page(doc: &dyn DomTree) -> ParseOutput {
    let mut walker = Walker {
        page: Page::new(),
        warnings: Vec::new(),
        open: Vec::new(),
        unknown_ids: HashSet::new(),
    };

    // Iterative pre-order walk; children pushed in reverse so they pop in order.
    let mut stack = vec![doc.root()];
    while let Some(node) = stack.pop() {
        match doc.kind(node) {
            DomNodeKind::Comment => {
                if let Some(text) = doc.comment_text(node) {
                    walker.comment(&text);
                }
            }
            DomNodeKind::Element => {
                walker.element(node);
                stack.extend(doc.children(node).into_iter().rev());
            }
            DomNodeKind::Document | DomNodeKind::Other => {
                stack.extend(doc.children(node).into_iter().rev());
            }
            DomNodeKind::Text => {}
        }
    }

    while let Some(marker) = walker.open.pop() {
        walker.warn(ParseWarning::Unterminated(marker.id));
        walker.close(marker);
    }

    ParseOutput {
        page: walker.page,
        warnings: walker.warnings,
    }
}

impl Walker {
    fn warn(&mut self, warning: ParseWarning) {
        log::warn!("structural comments: {warning}");
        self.warnings.push(warning);
    }

    fn comment(&mut self, text: &str) {
        let marker = match read_marker(text) {
            Ok(Some(marker)) => marker,
            Ok(None) => return,
            Err(warning) => return self.warn(warning),
        };
        match marker {
            Marker::Begin {
                kind,
                id,
                attributes,
            } => self.begin(kind, id, attributes),
            Marker::End { id } => self.end(id),
            Marker::PageMeta(meta) => self.page.set_meta(meta),
            Marker::Unknown { kind, id } => {
                log::debug!("ignoring structural comment of type `{kind}`");
                if let Some(id) = id {
                    self.unknown_ids.insert(id);
                }
            }
        }
    }

    fn begin(&mut self, kind: MarkerKind, id: ItemId, attributes: Map<String, Value>) {
        let duplicate =
            self.page.contains_id(id) || self.open.iter().any(|m| m.id == id && !m.skipped);
        if duplicate {
            self.warn(ParseWarning::DuplicateId(id));
        }
        let orphan = kind == MarkerKind::Component
            && !self
                .open
                .iter()
                .any(|m| m.kind == MarkerKind::Container && !m.skipped);
        if orphan && !duplicate {
            self.warn(ParseWarning::OrphanComponent(id));
        }
        let skipped = duplicate || orphan;
        self.open.push(OpenMarker {
            id,
            kind,
            pending: (!skipped).then_some(Pending { kind, attributes }),
            node: None,
            skipped,
        });
    }

    fn end(&mut self, id: ItemId) {
        let Some(pos) = self.open.iter().rposition(|m| m.id == id) else {
            if !self.unknown_ids.contains(&id) {
                self.warn(ParseWarning::UnmatchedEnd(id));
            }
            return;
        };
        // Everything opened after `id` was never closed; keep what it built.
        while self.open.len() > pos + 1 {
            if let Some(inner) = self.open.pop() {
                self.warn(ParseWarning::Unterminated(inner.id));
                self.close(inner);
            }
        }
        if let Some(marker) = self.open.pop() {
            self.close(marker);
        }
    }

    fn close(&mut self, marker: OpenMarker) {
        if marker.pending.is_some() {
            self.warn(ParseWarning::MissingBoxElement(marker.id));
        }
    }

    /// The first element after a begin marker becomes that item's box.
    ///
    /// An element is claimed by the innermost waiting marker only. Outer
    /// markers still waiting at that point have no wrapper of their own.
    fn element(&mut self, element: DomNodeId) {
        let Some(i) = self.open.iter().rposition(|m| m.pending.is_some()) else {
            return;
        };
        for outer in 0..i {
            if self.open[outer].pending.take().is_some() {
                let id = self.open[outer].id;
                self.warn(ParseWarning::MissingBoxElement(id));
            }
        }
        if let Some(pending) = self.open[i].pending.take() {
            let id = self.open[i].id;
            let node = match pending.kind {
                MarkerKind::Container => Some(self.page.add_container(Container {
                    id,
                    label: string_attr(&pending.attributes, "label"),
                    drag_direction: drag_direction(&pending.attributes),
                    inherited: bool_attr(&pending.attributes, "inherited"),
                    locked_by: string_attr(&pending.attributes, "lockedBy"),
                    locked_by_current_user: bool_attr(&pending.attributes, "lockedByCurrentUser"),
                    last_modified: timestamp_attr(&pending.attributes, "lastModified"),
                    box_element: element,
                })),
                MarkerKind::Component => {
                    let container = self.open[..i]
                        .iter()
                        .rev()
                        .find(|m| m.kind == MarkerKind::Container && m.node.is_some())
                        .and_then(|m| m.node);
                    match container {
                        Some(container) => self.page.add_component(
                            container,
                            Component {
                                id,
                                label: string_attr(&pending.attributes, "label"),
                                last_modified: timestamp_attr(&pending.attributes, "lastModified"),
                                render_variant: string_attr(&pending.attributes, "renderVariant"),
                                box_element: element,
                            },
                        ),
                        None => {
                            // Enclosing container was dropped (it had no box).
                            self.warn(ParseWarning::OrphanComponent(id));
                            None
                        }
                    }
                }
            };
            self.open[i].node = node;
        }
    }
}
