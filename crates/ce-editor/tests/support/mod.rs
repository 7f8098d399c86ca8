//! In-memory stand-ins for the iframe document, the host page and the
//! editor's collaborators.

#![allow(dead_code)]

use ce_core::{DomNodeId, DomNodeKind, DomTree, Geometry, MarkupDocument, Offset};
use ce_editor::{
    Callback, ChannelError, ChannelService, Collaborators, ContentSize, DragCallbacks, DragError,
    DragLibrary, DragLibraryFactory, EditorConfig, FrameDocument, Generation, HeightMarker,
    HostPart, HostSurface, InjectError, Length, LinkRewriter, ListenerGuard, LoadError,
    LoadReport, OverlayId, OverlayItem, PageLoadController, PointerInput, PointerRelease,
    ReleaseHandler, ResourceInjector,
};
use futures::channel::oneshot;
use futures::future::{FutureExt, LocalBoxFuture};
use smallvec::SmallVec;
use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

pub const EDITOR_PAGE: &str = include_str!("../fixtures/editor_page.html");

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ─── Observers ───────────────────────────────────────────────────────────

/// A listener list whose guards remove their own entry.
#[derive(Clone)]
pub struct Observers<T: Clone + 'static> {
    next: Rc<Cell<u32>>,
    entries: Rc<RefCell<BTreeMap<u32, T>>>,
}

impl<T: Clone + 'static> Default for Observers<T> {
    fn default() -> Self {
        Self {
            next: Rc::new(Cell::new(0)),
            entries: Rc::new(RefCell::new(BTreeMap::new())),
        }
    }
}

impl<T: Clone + 'static> Observers<T> {
    pub fn add(&self, entry: T) -> ListenerGuard {
        let key = self.next.get();
        self.next.set(key + 1);
        self.entries.borrow_mut().insert(key, entry);
        let entries = Rc::downgrade(&self.entries);
        ListenerGuard::new(move || {
            if let Some(entries) = entries.upgrade() {
                entries.borrow_mut().remove(&key);
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Snapshot, so entries can be called without holding the borrow.
    pub fn all(&self) -> Vec<T> {
        self.entries.borrow().values().cloned().collect()
    }
}

impl Observers<Callback> {
    pub fn fire(&self) {
        for callback in self.all() {
            callback();
        }
    }
}

// ─── Iframe document ─────────────────────────────────────────────────────

pub struct FakeDocument {
    pub markup: MarkupDocument,
    generation: Generation,
    pub geometry: RefCell<HashMap<DomNodeId, Geometry>>,
    pub content: Cell<ContentSize>,
    pub marker: Cell<Option<HeightMarker>>,
    pub mutations: Observers<Callback>,
    pub resizes: Observers<Callback>,
    pub releases: Observers<(DomNodeId, ReleaseHandler)>,
    pub dispatched: RefCell<Vec<(DomNodeId, PointerInput)>>,
    pub styles: RefCell<HashMap<DomNodeId, Vec<(String, String)>>>,
    unload: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl FakeDocument {
    pub fn new(markup: &str, generation: u64) -> Rc<Self> {
        Rc::new(Self {
            markup: MarkupDocument::parse(markup),
            generation: Generation::new(generation),
            geometry: RefCell::new(HashMap::new()),
            content: Cell::new(ContentSize {
                width: 800.0,
                height: 600.0,
            }),
            marker: Cell::new(None),
            mutations: Observers::default(),
            resizes: Observers::default(),
            releases: Observers::default(),
            dispatched: RefCell::new(Vec::new()),
            styles: RefCell::new(HashMap::new()),
            unload: RefCell::new(Vec::new()),
        })
    }

    pub fn el(&self, id: &str) -> DomNodeId {
        self.markup
            .element_by_id(id)
            .unwrap_or_else(|| panic!("no element #{id}"))
    }

    pub fn place(&self, id: &str, geometry: Geometry) {
        let el = self.el(id);
        self.geometry.borrow_mut().insert(el, geometry);
    }

    /// Delivers a release to the handlers still installed on `element`.
    pub fn release(&self, element: DomNodeId, release: PointerRelease) {
        let handlers: Vec<ReleaseHandler> = self
            .releases
            .all()
            .into_iter()
            .filter(|(el, _)| *el == element)
            .map(|(_, handler)| handler)
            .collect();
        for handler in handlers {
            handler(release);
        }
    }

    pub fn unload(&self) {
        let handlers = std::mem::take(&mut *self.unload.borrow_mut());
        for handler in handlers {
            handler();
        }
    }

    pub fn has_unload_handler(&self) -> bool {
        !self.unload.borrow().is_empty()
    }
}

impl DomTree for FakeDocument {
    fn root(&self) -> DomNodeId {
        self.markup.root()
    }

    fn kind(&self, node: DomNodeId) -> DomNodeKind {
        self.markup.kind(node)
    }

    fn children(&self, node: DomNodeId) -> SmallVec<[DomNodeId; 8]> {
        self.markup.children(node)
    }

    fn comment_text(&self, node: DomNodeId) -> Option<Cow<'_, str>> {
        self.markup.comment_text(node)
    }
}

impl FrameDocument for FakeDocument {
    fn generation(&self) -> Generation {
        self.generation
    }

    fn element_geometry(&self, element: DomNodeId) -> Option<Geometry> {
        self.geometry.borrow().get(&element).copied()
    }

    fn content_size(&self) -> ContentSize {
        self.content.get()
    }

    fn height_marker(&self) -> Option<HeightMarker> {
        self.marker.get()
    }

    fn observe_mutations(&self, on_change: Callback) -> ListenerGuard {
        self.mutations.add(on_change)
    }

    fn observe_resize(&self, on_resize: Callback) -> ListenerGuard {
        self.resizes.add(on_resize)
    }

    fn on_pointer_release(&self, element: DomNodeId, handler: ReleaseHandler) -> ListenerGuard {
        self.releases.add((element, handler))
    }

    fn dispatch_pointer(&self, target: DomNodeId, input: PointerInput) -> bool {
        if self.markup.tag(target).is_none() {
            return false;
        }
        self.dispatched.borrow_mut().push((target, input));
        true
    }

    fn computed_style(&self, element: DomNodeId) -> Vec<(String, String)> {
        self.styles.borrow().get(&element).cloned().unwrap_or_default()
    }

    fn set_style(&self, element: DomNodeId, properties: &[(String, String)]) {
        self.styles
            .borrow_mut()
            .insert(element, properties.to_vec());
    }

    fn on_unload(&self, handler: Box<dyn FnOnce()>) {
        self.unload.borrow_mut().push(handler);
    }
}

// ─── Host page ───────────────────────────────────────────────────────────

pub struct FakeHost {
    pub frame_offset: Cell<Offset>,
    pub scrollbar_width: f64,
    pub widths: RefCell<HashMap<HostPart, Length>>,
    pub heights: RefCell<HashMap<HostPart, Length>>,
    pub horizontal_scrollbar: Cell<bool>,
    pub overlays: RefCell<BTreeMap<OverlayId, (OverlayItem, Option<Geometry>)>>,
    next_overlay: Cell<u32>,
    pub click_through: Cell<bool>,
    pub resizes: Observers<Callback>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            frame_offset: Cell::new(Offset::ZERO),
            scrollbar_width: 15.0,
            widths: RefCell::new(HashMap::new()),
            heights: RefCell::new(HashMap::new()),
            horizontal_scrollbar: Cell::new(false),
            overlays: RefCell::new(BTreeMap::new()),
            next_overlay: Cell::new(1),
            click_through: Cell::new(false),
            resizes: Observers::default(),
        }
    }
}

impl FakeHost {
    pub fn width(&self, part: HostPart) -> Option<Length> {
        self.widths.borrow().get(&part).copied()
    }

    pub fn height(&self, part: HostPart) -> Option<Length> {
        self.heights.borrow().get(&part).copied()
    }

    /// Placement of the overlay drawn for `item`.
    pub fn overlay_of(&self, item: &str) -> Option<Geometry> {
        self.overlays
            .borrow()
            .values()
            .find(|(overlay, _)| overlay.item.as_str() == item)
            .and_then(|(_, geometry)| *geometry)
    }

    pub fn overlay_items(&self) -> Vec<String> {
        self.overlays
            .borrow()
            .values()
            .map(|(overlay, _)| overlay.item.as_str().to_string())
            .collect()
    }
}

impl HostSurface for FakeHost {
    fn frame_offset(&self) -> Offset {
        self.frame_offset.get()
    }

    fn scrollbar_width(&self) -> f64 {
        self.scrollbar_width
    }

    fn set_width(&self, part: HostPart, width: Length) {
        self.widths.borrow_mut().insert(part, width);
    }

    fn set_height(&self, part: HostPart, height: Length) {
        self.heights.borrow_mut().insert(part, height);
    }

    fn show_horizontal_scrollbar(&self, visible: bool) {
        self.horizontal_scrollbar.set(visible);
    }

    fn create_overlay(&self, item: &OverlayItem) -> OverlayId {
        let id = OverlayId::new(self.next_overlay.get());
        self.next_overlay.set(id.get() + 1);
        self.overlays.borrow_mut().insert(id, (item.clone(), None));
        id
    }

    fn remove_overlay(&self, overlay: OverlayId) {
        self.overlays.borrow_mut().remove(&overlay);
    }

    fn place_overlay(&self, overlay: OverlayId, geometry: Option<Geometry>) {
        if let Some(entry) = self.overlays.borrow_mut().get_mut(&overlay) {
            entry.1 = geometry;
        }
    }

    fn set_click_through(&self, enabled: bool) {
        self.click_through.set(enabled);
    }

    fn observe_resize(&self, on_resize: Callback) -> ListenerGuard {
        self.resizes.add(on_resize)
    }
}

// ─── Collaborators ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeInjector {
    pub scripts: RefCell<Vec<(Generation, String)>>,
    pub stylesheets: RefCell<Vec<(Generation, String)>>,
    pub fail_css: Cell<bool>,
    pub fail_script: Cell<bool>,
    script_gate: RefCell<Option<oneshot::Receiver<()>>>,
}

impl FakeInjector {
    /// Holds the next script load open until the returned sender fires.
    pub fn hold_next_script(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.script_gate.borrow_mut() = Some(rx);
        tx
    }
}

fn injected(
    url: &str,
    fail: bool,
    gate: Option<oneshot::Receiver<()>>,
) -> LocalBoxFuture<'static, Result<(), InjectError>> {
    let result = if fail {
        Err(InjectError::LoadFailed {
            url: url.to_string(),
            reason: "404".into(),
        })
    } else {
        Ok(())
    };
    async move {
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        result
    }
    .boxed_local()
}

impl ResourceInjector for FakeInjector {
    fn inject_script(
        &self,
        doc: &dyn FrameDocument,
        url: &str,
    ) -> LocalBoxFuture<'static, Result<(), InjectError>> {
        self.scripts
            .borrow_mut()
            .push((doc.generation(), url.to_string()));
        let gate = self.script_gate.borrow_mut().take();
        injected(url, self.fail_script.get(), gate)
    }

    fn inject_css(
        &self,
        doc: &dyn FrameDocument,
        url: &str,
    ) -> LocalBoxFuture<'static, Result<(), InjectError>> {
        self.stylesheets
            .borrow_mut()
            .push((doc.generation(), url.to_string()));
        injected(url, self.fail_css.get(), None)
    }
}

pub struct FakeChannel {
    pub current: RefCell<String>,
    pub switches: RefCell<Vec<String>>,
    pub refuse: Cell<bool>,
    gate: RefCell<Option<oneshot::Receiver<()>>>,
}

impl FakeChannel {
    pub fn new(current: &str) -> Self {
        Self {
            current: RefCell::new(current.to_string()),
            switches: RefCell::new(Vec::new()),
            refuse: Cell::new(false),
            gate: RefCell::new(None),
        }
    }

    /// Holds the next switch open until the returned sender fires.
    pub fn hold_next_switch(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.borrow_mut() = Some(rx);
        tx
    }
}

impl ChannelService for FakeChannel {
    fn current_id(&self) -> String {
        self.current.borrow().clone()
    }

    fn switch_to_channel(&self, channel: &str) -> LocalBoxFuture<'static, Result<(), ChannelError>> {
        self.switches.borrow_mut().push(channel.to_string());
        let gate = self.gate.borrow_mut().take();
        let result = if self.refuse.get() {
            Err(ChannelError {
                channel: channel.to_string(),
                reason: "no access".into(),
            })
        } else {
            *self.current.borrow_mut() = channel.to_string();
            Ok(())
        };
        async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            result
        }
        .boxed_local()
    }
}

#[derive(Default)]
pub struct FakeLinks {
    pub rewritten: RefCell<Vec<Generation>>,
}

impl LinkRewriter for FakeLinks {
    fn rewrite_links(&self, doc: &dyn FrameDocument) {
        self.rewritten.borrow_mut().push(doc.generation());
    }
}

// ─── Drag library ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct LibraryLog {
    pub dragging: Cell<bool>,
    pub cancelled: Cell<usize>,
    pub destroyed: Cell<usize>,
}

pub struct FakeLibrary {
    log: Rc<LibraryLog>,
}

impl DragLibrary for FakeLibrary {
    fn is_dragging(&self) -> bool {
        self.log.dragging.get()
    }

    fn cancel(&self, _revert: bool) {
        self.log.cancelled.set(self.log.cancelled.get() + 1);
        self.log.dragging.set(false);
    }

    fn destroy(&self) {
        self.log.destroyed.set(self.log.destroyed.get() + 1);
    }
}

#[derive(Default)]
pub struct FakeLibraryFactory {
    pub created: RefCell<Vec<Vec<DomNodeId>>>,
    pub callbacks: RefCell<Option<Rc<dyn DragCallbacks>>>,
    pub log: Rc<LibraryLog>,
}

impl FakeLibraryFactory {
    pub fn callbacks(&self) -> Rc<dyn DragCallbacks> {
        self.callbacks
            .borrow()
            .clone()
            .expect("drag library was never created")
    }
}

impl DragLibraryFactory for FakeLibraryFactory {
    fn create(
        &self,
        _doc: &dyn FrameDocument,
        containers: &[DomNodeId],
        callbacks: Rc<dyn DragCallbacks>,
    ) -> Result<Box<dyn DragLibrary>, DragError> {
        self.created.borrow_mut().push(containers.to_vec());
        *self.callbacks.borrow_mut() = Some(callbacks);
        Ok(Box::new(FakeLibrary {
            log: Rc::clone(&self.log),
        }))
    }
}

// ─── Harness ─────────────────────────────────────────────────────────────

pub struct Harness {
    pub controller: PageLoadController,
    pub host: Rc<FakeHost>,
    pub injector: Rc<FakeInjector>,
    pub library: Rc<FakeLibraryFactory>,
    pub channel: Rc<FakeChannel>,
    pub links: Rc<FakeLinks>,
}

impl Harness {
    pub fn new(config: EditorConfig) -> Self {
        init_logging();
        let host = Rc::new(FakeHost::default());
        let injector = Rc::new(FakeInjector::default());
        let library = Rc::new(FakeLibraryFactory::default());
        let channel = Rc::new(FakeChannel::new("live"));
        let links = Rc::new(FakeLinks::default());
        let controller = PageLoadController::new(
            config,
            Collaborators {
                host: host.clone(),
                injector: injector.clone(),
                drag_library: library.clone(),
                channel: channel.clone(),
                links: links.clone(),
            },
        );
        Self {
            controller,
            host,
            injector,
            library,
            channel,
            links,
        }
    }

    pub fn editing() -> Self {
        Self::new(EditorConfig {
            edit_mode: true,
            ..EditorConfig::default()
        })
    }

    pub fn load(&self, doc: &Rc<FakeDocument>) -> Result<LoadReport, LoadError> {
        futures::executor::block_on(self.controller.on_load(doc.clone()))
    }
}
