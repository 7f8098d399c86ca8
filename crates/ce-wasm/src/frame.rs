//! The iframe document seen through `web-sys`.
//!
//! Nodes are numbered on first sight and looked up through a per-document
//! table, so the engine only ever holds [`DomNodeId`]s. A new
//! [`BrowserDocument`] (and table) is built for every load.

use ce_core::{DomNodeId, DomNodeKind, DomTree, Geometry};
use ce_editor::{
    Callback, ContentSize, FrameDocument, Generation, HeightMarker, ListenerGuard, PointerInput,
    PointerKind, PointerRelease, ReleaseHandler,
};
use smallvec::SmallVec;
use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{
    AddEventListenerOptions, Document, Element, EventTarget, HtmlElement, MouseEvent,
    MouseEventInit, MutationObserver, MutationObserverInit, Node, Window,
};

// ─── Node table ──────────────────────────────────────────────────────────

struct NodeTable {
    nodes: RefCell<Vec<Node>>,
    index: js_sys::Map,
}

impl NodeTable {
    fn new() -> Self {
        Self {
            nodes: RefCell::new(Vec::new()),
            index: js_sys::Map::new(),
        }
    }

    fn id_of(&self, node: &Node) -> DomNodeId {
        if let Some(n) = self.index.get(node.as_ref()).as_f64() {
            return DomNodeId::new(n as u32);
        }
        let mut nodes = self.nodes.borrow_mut();
        let id = nodes.len() as u32;
        nodes.push(node.clone());
        self.index.set(node.as_ref(), &JsValue::from(id));
        DomNodeId::new(id)
    }

    fn node(&self, id: DomNodeId) -> Option<Node> {
        self.nodes.borrow().get(id.index() as usize).cloned()
    }
}

// ─── Document ────────────────────────────────────────────────────────────

pub struct BrowserDocument {
    generation: Generation,
    window: Window,
    document: Document,
    table: NodeTable,
    height_marker_selector: String,
}

impl BrowserDocument {
    pub fn new(
        generation: Generation,
        window: Window,
        document: Document,
        height_marker_selector: String,
    ) -> Self {
        Self {
            generation,
            window,
            document,
            table: NodeTable::new(),
            height_marker_selector,
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Handle for a node passed in from JavaScript, if it is a node.
    ///
    /// Iframe nodes belong to another realm and fail `instanceof Node`, so
    /// they are recognised by their `nodeType`.
    pub fn id_of_value(&self, value: &JsValue) -> Option<DomNodeId> {
        if !value.is_object() {
            return None;
        }
        js_sys::Reflect::get(value, &JsValue::from_str("nodeType"))
            .ok()?
            .as_f64()?;
        Some(self.table.id_of(value.unchecked_ref::<Node>()))
    }

    pub fn node(&self, id: DomNodeId) -> Option<Node> {
        self.table.node(id)
    }

    pub fn element(&self, id: DomNodeId) -> Option<Element> {
        let node = self.table.node(id)?;
        (node.node_type() == Node::ELEMENT_NODE).then(|| node.unchecked_into::<Element>())
    }
}

/// Adds an event listener that stays attached until the guard drops.
pub(crate) fn listen(target: &EventTarget, event: &'static str, callback: Callback) -> ListenerGuard {
    let closure = Closure::<dyn FnMut()>::new(move || callback());
    if let Err(err) =
        target.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())
    {
        log::warn!("could not listen to `{event}`: {err:?}");
        return ListenerGuard::noop();
    }
    let target = target.clone();
    ListenerGuard::new(move || {
        let _ =
            target.remove_event_listener_with_callback(event, closure.as_ref().unchecked_ref());
    })
}

fn px(value: &str) -> f64 {
    value.trim().trim_end_matches("px").parse().unwrap_or(0.0)
}

impl DomTree for BrowserDocument {
    fn root(&self) -> DomNodeId {
        self.table.id_of(&self.document)
    }

    fn kind(&self, node: DomNodeId) -> DomNodeKind {
        match self.table.node(node).map(|n| n.node_type()) {
            Some(Node::DOCUMENT_NODE) => DomNodeKind::Document,
            Some(Node::ELEMENT_NODE) => DomNodeKind::Element,
            Some(Node::COMMENT_NODE) => DomNodeKind::Comment,
            Some(Node::TEXT_NODE) => DomNodeKind::Text,
            _ => DomNodeKind::Other,
        }
    }

    fn children(&self, node: DomNodeId) -> SmallVec<[DomNodeId; 8]> {
        let Some(node) = self.table.node(node) else {
            return SmallVec::new();
        };
        let list = node.child_nodes();
        (0..list.length())
            .filter_map(|i| list.item(i))
            .map(|child| self.table.id_of(&child))
            .collect()
    }

    fn comment_text(&self, node: DomNodeId) -> Option<Cow<'_, str>> {
        let node = self.table.node(node)?;
        if node.node_type() != Node::COMMENT_NODE {
            return None;
        }
        node.node_value().map(Cow::Owned)
    }
}

impl FrameDocument for BrowserDocument {
    fn generation(&self) -> Generation {
        self.generation
    }

    fn element_geometry(&self, element: DomNodeId) -> Option<Geometry> {
        let rect = self.element(element)?.get_bounding_client_rect();
        Some(Geometry::new(rect.x(), rect.y(), rect.width(), rect.height()))
    }

    fn content_size(&self) -> ContentSize {
        self.document
            .document_element()
            .map(|root| ContentSize {
                width: f64::from(root.scroll_width()),
                height: f64::from(root.scroll_height()),
            })
            .unwrap_or_default()
    }

    fn height_marker(&self) -> Option<HeightMarker> {
        let marker = self
            .document
            .query_selector(&self.height_marker_selector)
            .ok()
            .flatten()?;
        let scroll_y = self.window.scroll_y().unwrap_or(0.0);
        let margin_bottom = self
            .window
            .get_computed_style(&marker)
            .ok()
            .flatten()
            .and_then(|style| style.get_property_value("margin-bottom").ok())
            .map(|v| px(&v))
            .unwrap_or(0.0);
        Some(HeightMarker {
            top: marker.get_bounding_client_rect().top() + scroll_y,
            margin_bottom,
        })
    }

    fn observe_mutations(&self, on_change: Callback) -> ListenerGuard {
        let Some(body) = self.document.body() else {
            return ListenerGuard::noop();
        };
        let closure = Closure::<dyn FnMut()>::new(move || on_change());
        let observer = match MutationObserver::new(closure.as_ref().unchecked_ref()) {
            Ok(observer) => observer,
            Err(err) => {
                log::warn!("mutation observer unavailable: {err:?}");
                return ListenerGuard::noop();
            }
        };
        let options = MutationObserverInit::new();
        options.set_child_list(true);
        options.set_subtree(true);
        options.set_attributes(true);
        options.set_character_data(true);
        if let Err(err) = observer.observe_with_options(&body, &options) {
            log::warn!("could not observe iframe body: {err:?}");
        }
        ListenerGuard::new(move || {
            observer.disconnect();
            drop(closure);
        })
    }

    fn observe_resize(&self, on_resize: Callback) -> ListenerGuard {
        listen(&self.window, "resize", on_resize)
    }

    fn on_pointer_release(&self, element: DomNodeId, handler: ReleaseHandler) -> ListenerGuard {
        let Some(element) = self.element(element) else {
            return ListenerGuard::noop();
        };
        let on_up = Rc::clone(&handler);
        let up = listen(&element, "mouseup", Rc::new(move || on_up(PointerRelease::Up)));
        let leave = listen(
            &element,
            "mouseleave",
            Rc::new(move || handler(PointerRelease::Leave)),
        );
        ListenerGuard::new(move || {
            drop(up);
            drop(leave);
        })
    }

    fn dispatch_pointer(&self, target: DomNodeId, input: PointerInput) -> bool {
        let Some(element) = self.element(target) else {
            return false;
        };
        let kind = match input.kind {
            PointerKind::Down => "mousedown",
            PointerKind::Up => "mouseup",
        };
        let init = MouseEventInit::new();
        init.set_bubbles(true);
        init.set_cancelable(true);
        init.set_client_x(input.position.x.round() as i32);
        init.set_client_y(input.position.y.round() as i32);
        init.set_button(input.button);
        let event = match MouseEvent::new_with_mouse_event_init_dict(kind, &init) {
            Ok(event) => event,
            Err(err) => {
                log::warn!("could not create {kind}: {err:?}");
                return false;
            }
        };
        element.dispatch_event(&event).is_ok()
    }

    fn computed_style(&self, element: DomNodeId) -> Vec<(String, String)> {
        let Some(style) = self
            .element(element)
            .and_then(|el| self.window.get_computed_style(&el).ok().flatten())
        else {
            return Vec::new();
        };
        (0..style.length())
            .map(|i| style.item(i))
            .filter_map(|property| {
                let value = style.get_property_value(&property).ok()?;
                Some((property, value))
            })
            .collect()
    }

    fn set_style(&self, element: DomNodeId, properties: &[(String, String)]) {
        let Some(element) = self.element(element) else {
            return;
        };
        let style = element.unchecked_into::<HtmlElement>().style();
        for (property, value) in properties {
            if let Err(err) = style.set_property(property, value) {
                log::debug!("style {property} not copied: {err:?}");
            }
        }
    }

    fn on_unload(&self, handler: Box<dyn FnOnce()>) {
        let callback = Closure::once_into_js(move || handler());
        let options = AddEventListenerOptions::new();
        options.set_once(true);
        if let Err(err) = self
            .window
            .add_event_listener_with_callback_and_add_event_listener_options(
                "unload",
                callback.unchecked_ref(),
                &options,
            )
        {
            log::warn!("could not hook iframe unload: {err:?}");
        }
    }
}

// ─── Current frame ───────────────────────────────────────────────────────

/// The browser document of the latest load, shared with the collaborators
/// that need the real DOM behind a [`FrameDocument`].
#[derive(Clone, Default)]
pub struct CurrentFrame(Rc<RefCell<Option<Rc<BrowserDocument>>>>);

impl CurrentFrame {
    pub fn set(&self, doc: Rc<BrowserDocument>) {
        *self.0.borrow_mut() = Some(doc);
    }

    /// The browser document of `generation`, if it is still the current one.
    pub fn get(&self, generation: Generation) -> Option<Rc<BrowserDocument>> {
        self.0
            .borrow()
            .as_ref()
            .filter(|doc| doc.generation() == generation)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::px;

    #[test]
    fn pixel_values() {
        assert_eq!(px("42px"), 42.0);
        assert_eq!(px(" 8.5px "), 8.5);
        assert_eq!(px("auto"), 0.0);
    }
}
