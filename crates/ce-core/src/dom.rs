//! Opaque handles for nodes living in the iframe's document.
//!
//! The host never keeps a live reference to a foreign node. Every realm that
//! exposes a document (the in-memory [`crate::markup::MarkupDocument`], the
//! browser bridge) numbers its nodes and resolves a [`DomNodeId`] through its
//! own table. Tables are rebuilt from scratch on every document load, so a
//! handle from a previous load simply resolves to nothing.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::borrow::Cow;
use std::fmt;

/// Handle of a node inside one loaded iframe document.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DomNodeId(u32);

impl DomNodeId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for DomNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dom#{}", self.0)
    }
}

/// Coarse node type, enough for the structural comment walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomNodeKind {
    Document,
    Element,
    Comment,
    Text,
    Other,
}

/// Read-only tree view of a document.
///
/// Children are returned in document order.
pub trait DomTree {
    fn root(&self) -> DomNodeId;

    fn kind(&self, node: DomNodeId) -> DomNodeKind;

    fn children(&self, node: DomNodeId) -> SmallVec<[DomNodeId; 8]>;

    /// Text of a comment node, `None` for any other kind.
    fn comment_text(&self, node: DomNodeId) -> Option<Cow<'_, str>>;
}
