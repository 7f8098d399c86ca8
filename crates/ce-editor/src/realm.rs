//! The two realms the editor straddles, plus its outside collaborators.
//!
//! The engine never touches a browser object directly. The iframe document is
//! a [`FrameDocument`] whose nodes are [`DomNodeId`] handles, the host page is
//! a [`HostSurface`], and everything asynchronous comes back as a
//! [`LocalBoxFuture`]. The wasm bridge implements these on top of `web-sys`;
//! tests implement them in memory.

use crate::error::{ChannelError, DragError, InjectError};
use ce_core::{DomNodeId, DomTree, DragDirection, Geometry, ItemId, Offset};
use futures::future::LocalBoxFuture;
use serde::Serialize;
use std::fmt;
use std::rc::Rc;

// ─── Generations ─────────────────────────────────────────────────────────

/// Identity of one loaded iframe document.
///
/// Every load gets a new generation. Continuations compare the generation
/// they started with against the current one before touching shared state.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Generation(u64);

impl Generation {
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.0)
    }
}

// ─── Listener guards ─────────────────────────────────────────────────────

/// Keeps a listener or observer attached; detaches it when dropped.
#[must_use = "the listener is detached as soon as the guard is dropped"]
pub struct ListenerGuard {
    detach: Option<Box<dyn FnOnce()>>,
}

impl ListenerGuard {
    pub fn new(detach: impl FnOnce() + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// A guard with nothing to detach.
    pub fn noop() -> Self {
        Self { detach: None }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerGuard")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

pub type Callback = Rc<dyn Fn()>;

// ─── Iframe realm ────────────────────────────────────────────────────────

/// Position and bottom margin of the element that marks the end of the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightMarker {
    pub top: f64,
    pub margin_bottom: f64,
}

/// Scrollable size of the iframe document.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContentSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Down,
    Up,
}

/// A synthesized pointer event in iframe coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerInput {
    pub kind: PointerKind,
    pub position: Offset,
    pub button: i16,
}

/// How a pressed pointer ended up leaving a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerRelease {
    Up,
    Leave,
}

pub type ReleaseHandler = Rc<dyn Fn(PointerRelease)>;

/// One loaded iframe document.
pub trait FrameDocument: DomTree {
    fn generation(&self) -> Generation;

    /// Box of `element` relative to the iframe viewport origin.
    fn element_geometry(&self, element: DomNodeId) -> Option<Geometry>;

    fn content_size(&self) -> ContentSize;

    fn height_marker(&self) -> Option<HeightMarker>;

    /// Fires after the body subtree or its attributes changed.
    fn observe_mutations(&self, on_change: Callback) -> ListenerGuard;

    /// Fires when the iframe window is resized.
    fn observe_resize(&self, on_resize: Callback) -> ListenerGuard;

    /// Installs a handler that fires once, at the first `mouseup` or
    /// `mouseleave` on `element`.
    fn on_pointer_release(&self, element: DomNodeId, handler: ReleaseHandler) -> ListenerGuard;

    /// Dispatches a native pointer event at `target`. Returns `false` if the
    /// handle no longer resolves.
    fn dispatch_pointer(&self, target: DomNodeId, input: PointerInput) -> bool;

    /// Computed style of `element` as property/value pairs.
    fn computed_style(&self, element: DomNodeId) -> Vec<(String, String)>;

    fn set_style(&self, element: DomNodeId, properties: &[(String, String)]);

    /// Runs `handler` once when this document unloads.
    fn on_unload(&self, handler: Box<dyn FnOnce()>);
}

// ─── Host realm ──────────────────────────────────────────────────────────

/// The host elements whose size follows the iframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostPart {
    /// The canvas sheet around the iframe.
    Sheet,
    Frame,
    Overlay,
    ScrollbarWrapper,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Length {
    /// Let layout decide.
    Auto,
    Px(f64),
}

/// Handle of an overlay element in the host document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OverlayId(u32);

impl OverlayId {
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayKind {
    Container,
    Component,
}

/// What the host needs to draw one overlay element.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayItem {
    pub item: ItemId,
    pub kind: OverlayKind,
    pub label: Option<String>,
    pub disabled: bool,
}

/// The host page: the iframe element, the sheet around it and the overlay.
///
/// Host coordinates are those of the overlay layer.
pub trait HostSurface {
    /// Offset of the iframe viewport origin in host coordinates.
    fn frame_offset(&self) -> Offset;

    fn scrollbar_width(&self) -> f64;

    fn set_width(&self, part: HostPart, width: Length);

    fn set_height(&self, part: HostPart, height: Length);

    fn show_horizontal_scrollbar(&self, visible: bool);

    fn create_overlay(&self, item: &OverlayItem) -> OverlayId;

    fn remove_overlay(&self, overlay: OverlayId);

    /// `None` hides the overlay.
    fn place_overlay(&self, overlay: OverlayId, geometry: Option<Geometry>);

    /// While set, pointer events pass through the overlay into the iframe.
    fn set_click_through(&self, enabled: bool);

    fn observe_resize(&self, on_resize: Callback) -> ListenerGuard;
}

// ─── Collaborators ───────────────────────────────────────────────────────

pub trait ResourceInjector {
    fn inject_script(
        &self,
        doc: &dyn FrameDocument,
        url: &str,
    ) -> LocalBoxFuture<'static, Result<(), InjectError>>;

    fn inject_css(
        &self,
        doc: &dyn FrameDocument,
        url: &str,
    ) -> LocalBoxFuture<'static, Result<(), InjectError>>;
}

pub trait ChannelService {
    /// Id of the channel the editor is currently working in.
    fn current_id(&self) -> String;

    fn switch_to_channel(&self, channel: &str) -> LocalBoxFuture<'static, Result<(), ChannelError>>;
}

/// Rewrites links in a freshly loaded document so navigation stays inside
/// the editor.
pub trait LinkRewriter {
    fn rewrite_links(&self, doc: &dyn FrameDocument);
}

// ─── Drag library ────────────────────────────────────────────────────────

/// Verdict of the drop handler, so the library can revert a refused drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    Accepted,
    Rejected,
}

/// The fixed callback set a drag library instance is wired to.
///
/// All element arguments are handles into the current iframe document.
pub trait DragCallbacks {
    /// May `element` be picked up from `source`?
    fn moves(&self, element: DomNodeId, source: DomNodeId) -> bool;

    /// May `element` be dropped into `target`?
    fn accepts(
        &self,
        element: DomNodeId,
        target: DomNodeId,
        source: DomNodeId,
        sibling: Option<DomNodeId>,
    ) -> bool;

    fn on_drag_start(&self, element: DomNodeId, source: DomNodeId);

    fn on_mirror_created(&self, mirror: DomNodeId, original: DomNodeId);

    /// Layout axis of the hovered container, if it is one.
    fn on_drag_over(&self, element: DomNodeId, container: DomNodeId) -> Option<DragDirection>;

    fn on_drag_end(&self, element: DomNodeId);

    fn on_drop(
        &self,
        element: DomNodeId,
        target: DomNodeId,
        source: DomNodeId,
        sibling: Option<DomNodeId>,
    ) -> DropOutcome;
}

/// A live drag library instance bound to a set of containers.
pub trait DragLibrary {
    fn is_dragging(&self) -> bool;

    /// Aborts the current drag; `revert` puts the element back.
    fn cancel(&self, revert: bool);

    fn destroy(&self);
}

pub trait DragLibraryFactory {
    /// Builds an instance over `containers` once the library script is in
    /// the document.
    fn create(
        &self,
        doc: &dyn FrameDocument,
        containers: &[DomNodeId],
        callbacks: Rc<dyn DragCallbacks>,
    ) -> Result<Box<dyn DragLibrary>, DragError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn guard_detaches_once_on_drop() {
        let detached = Rc::new(Cell::new(0));
        let counter = Rc::clone(&detached);
        let guard = ListenerGuard::new(move || counter.set(counter.get() + 1));
        assert_eq!(detached.get(), 0);
        drop(guard);
        assert_eq!(detached.get(), 1);
        drop(ListenerGuard::noop());
    }

    #[test]
    fn generations_advance() {
        let g = Generation::new(3);
        assert!(g.next() > g);
        assert_eq!(format!("{:?}", g.next()), "gen4");
    }
}
