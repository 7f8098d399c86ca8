//! Cross-frame drag and drop of components between containers.
//!
//! The drag library itself runs inside the iframe. This service injects it
//! once per document, binds an instance over the enabled containers and
//! answers its callbacks against the [`PageModel`]. A press on a component
//! overlay in the host is replayed as a native pointer-down on the
//! component's box element. The library then either starts a drag, or the
//! pointer comes back up and the press counts as a selection.

use crate::config::EditorConfig;
use crate::error::{DragError, DropError, InjectError};
use crate::events::{EditorEvent, EventQueue};
use crate::gesture::{GestureEvent, GestureState};
use crate::realm::{
    DragCallbacks, DragLibrary, DragLibraryFactory, DropOutcome, FrameDocument, Generation,
    HostSurface, ListenerGuard, PointerInput, PointerKind, PointerRelease, ResourceInjector,
};
use ce_core::{DomNodeId, DragDirection, ItemId, Offset, PageModel};
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

type Injection = Shared<LocalBoxFuture<'static, Result<(), InjectError>>>;

struct DragShared {
    config: Rc<EditorConfig>,
    model: Rc<RefCell<PageModel>>,
    events: EventQueue,
    injector: Rc<dyn ResourceInjector>,
    factory: Rc<dyn DragLibraryFactory>,
    host: RefCell<Option<Rc<dyn HostSurface>>>,
    doc: RefCell<Option<Rc<dyn FrameDocument>>>,
    /// Script injection of the current document, shared by every `enable()`.
    injection: RefCell<Option<(Generation, Injection)>>,
    library: RefCell<Option<Box<dyn DragLibrary>>>,
    /// Bumped by every `disable()`; an `enable()` started before the bump
    /// never binds.
    epoch: Cell<u64>,
    gesture: Cell<GestureState>,
    release_listener: RefCell<Option<ListenerGuard>>,
}

/// Handle to the drag and drop state. Clones share it.
#[derive(Clone)]
pub struct DragDropService {
    shared: Rc<DragShared>,
}

impl DragDropService {
    pub fn new(
        config: Rc<EditorConfig>,
        model: Rc<RefCell<PageModel>>,
        events: EventQueue,
        injector: Rc<dyn ResourceInjector>,
        factory: Rc<dyn DragLibraryFactory>,
    ) -> Self {
        Self {
            shared: Rc::new(DragShared {
                config,
                model,
                events,
                injector,
                factory,
                host: RefCell::new(None),
                doc: RefCell::new(None),
                injection: RefCell::new(None),
                library: RefCell::new(None),
                epoch: Cell::new(0),
                gesture: Cell::new(GestureState::Idle),
                release_listener: RefCell::new(None),
            }),
        }
    }

    pub fn init(&self, host: Rc<dyn HostSurface>) {
        *self.shared.host.borrow_mut() = Some(host);
    }

    /// Follows a newly loaded document. Anything bound to the previous one
    /// is torn down first.
    pub fn attach(&self, doc: Rc<dyn FrameDocument>) {
        let same = self
            .shared
            .doc
            .borrow()
            .as_ref()
            .is_some_and(|old| old.generation() == doc.generation());
        if !same {
            self.detach();
        }
        *self.shared.doc.borrow_mut() = Some(doc);
    }

    /// Forgets the current document, including its memoized injection.
    pub fn detach(&self) {
        self.disable();
        self.shared.doc.borrow_mut().take();
        self.shared.injection.borrow_mut().take();
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.library.borrow().is_some()
    }

    pub fn state(&self) -> GestureState {
        self.shared.gesture.get()
    }

    /// Injects the drag library if needed and binds an instance over the
    /// enabled containers. Concurrent calls share one injection.
    ///
    /// A `disable()` before the library is ready cancels the bind with
    /// [`DragError::Cancelled`].
    pub fn enable(&self) -> LocalBoxFuture<'static, Result<(), DragError>> {
        let shared = Rc::clone(&self.shared);
        let epoch = shared.epoch.get();
        let prepared = shared.injection();
        async move {
            let (generation, injection) = prepared?;
            injection.await?;
            shared.bind_library(generation, epoch)
        }
        .boxed_local()
    }

    /// Destroys the library instance. Safe to call when never enabled.
    pub fn disable(&self) {
        self.shared.epoch.set(self.shared.epoch.get().wrapping_add(1));
        // Taken out first: cancelling may call back into this service.
        let library = self.shared.library.borrow_mut().take();
        if let Some(library) = library {
            if library.is_dragging() {
                library.cancel(true);
            }
            library.destroy();
            self.shared.events.push(EditorEvent::DragDisabled);
        }
        self.shared.end_press();
        self.shared.gesture.set(GestureState::Idle);
    }

    /// Replays a press on `component`'s overlay inside the iframe.
    ///
    /// `position` is in host coordinates. The release that follows decides
    /// between click and drag: a `mouseup` before the library starts a drag
    /// selects the component.
    pub fn start_drag_or_click(&self, position: Offset, component: ItemId) -> Result<(), DragError> {
        let shared = &self.shared;
        let doc = shared.doc.borrow().clone().ok_or(DragError::NoDocument)?;
        let element = shared
            .model
            .borrow()
            .get_component(component)
            .map(|c| c.box_element)
            .ok_or(DragError::UnknownComponent(component))?;

        let next = shared
            .gesture
            .get()
            .on(GestureEvent::Press)
            .map_err(|_| DragError::Busy)?;
        shared.gesture.set(next);

        let host = shared.host.borrow().clone();
        let frame_offset = host.as_ref().map(|h| h.frame_offset()).unwrap_or(Offset::ZERO);
        if let Some(host) = &host {
            host.set_click_through(true);
        }

        let weak = Rc::downgrade(shared);
        let listener = doc.on_pointer_release(
            element,
            Rc::new(move |release| {
                if let Some(shared) = weak.upgrade() {
                    shared.pointer_released(component, release);
                }
            }),
        );
        *shared.release_listener.borrow_mut() = Some(listener);

        let input = PointerInput {
            kind: PointerKind::Down,
            position: position - frame_offset,
            button: 0,
        };
        if !doc.dispatch_pointer(element, input) {
            log::warn!("box element of {component} is gone, press dropped");
            shared.end_press();
            shared.gesture.set(GestureState::Idle);
        }
        Ok(())
    }

    /// The callback set a library instance is wired to.
    pub fn callbacks(&self) -> Rc<dyn DragCallbacks> {
        Rc::new(DragHandler {
            shared: Rc::downgrade(&self.shared),
        })
    }
}

impl DragShared {
    fn current_generation(&self) -> Option<Generation> {
        self.doc.borrow().as_ref().map(|d| d.generation())
    }

    fn injection(&self) -> Result<(Generation, Injection), DragError> {
        let doc = self.doc.borrow().clone().ok_or(DragError::NoDocument)?;
        let generation = doc.generation();

        let mut memo = self.injection.borrow_mut();
        if let Some((g, injection)) = memo.as_ref()
            && *g == generation
        {
            return Ok((generation, injection.clone()));
        }
        log::debug!(
            "injecting {} into {generation:?}",
            self.config.drag_library_url
        );
        let injection = self
            .injector
            .inject_script(doc.as_ref(), &self.config.drag_library_url)
            .shared();
        *memo = Some((generation, injection.clone()));
        Ok((generation, injection))
    }

    fn bind_library(self: &Rc<Self>, generation: Generation, epoch: u64) -> Result<(), DragError> {
        if self.current_generation() != Some(generation) {
            log::debug!("drag library loaded for stale {generation:?}, not binding");
            return Err(DragError::Superseded);
        }
        if self.epoch.get() != epoch {
            log::debug!("drag and drop disabled while the library loaded, not binding");
            return Err(DragError::Cancelled);
        }
        if self.library.borrow().is_some() {
            return Ok(());
        }
        let doc = self.doc.borrow().clone().ok_or(DragError::NoDocument)?;

        let containers: Vec<DomNodeId> = self
            .model
            .borrow()
            .get_containers()
            .into_iter()
            .filter(|c| !c.is_disabled())
            .map(|c| c.box_element)
            .collect();

        let callbacks: Rc<dyn DragCallbacks> = Rc::new(DragHandler {
            shared: Rc::downgrade(self),
        });
        let library = self.factory.create(doc.as_ref(), &containers, callbacks)?;
        log::debug!("drag enabled over {} containers", containers.len());
        *self.library.borrow_mut() = Some(library);
        self.events.push(EditorEvent::DragEnabled);
        Ok(())
    }

    fn end_press(&self) {
        self.release_listener.borrow_mut().take();
        if let Some(host) = self.host.borrow().as_ref() {
            host.set_click_through(false);
        }
    }

    fn pointer_released(&self, component: ItemId, release: PointerRelease) {
        let state = self.gesture.get();
        let event = match release {
            PointerRelease::Up => GestureEvent::Release,
            PointerRelease::Leave => GestureEvent::Leave,
        };
        match state.on(event) {
            Ok(next) => {
                self.gesture.set(next);
                if state.is_click_release() {
                    self.end_press();
                    if release == PointerRelease::Up {
                        self.events
                            .push(EditorEvent::ComponentSelected { component });
                    }
                }
            }
            Err(err) => log::trace!("pointer release ignored: {err}"),
        }
    }

    fn transition(&self, event: GestureEvent) {
        match self.gesture.get().on(event) {
            Ok(next) => self.gesture.set(next),
            Err(err) => log::debug!("{err}"),
        }
    }

    fn container_enabled(&self, element: DomNodeId) -> bool {
        self.model
            .borrow()
            .get_container_by_iframe_element(element)
            .is_some_and(|c| !c.is_disabled())
    }

    fn handle_drop(
        &self,
        element: DomNodeId,
        target: DomNodeId,
        source: DomNodeId,
        sibling: Option<DomNodeId>,
    ) -> Result<(), DropError> {
        let next = self
            .gesture
            .get()
            .on(GestureEvent::Drop)
            .map_err(|_| DropError::NotDragging)?;
        self.gesture.set(next);
        let _finish = DropGuard {
            gesture: &self.gesture,
        };

        let (component, from, to, before) = {
            let model = self.model.borrow();
            let component = model
                .get_component_by_iframe_element(element)
                .ok_or(DropError::UnknownElement)?
                .id;
            let to = model
                .get_container_by_iframe_element(target)
                .ok_or(DropError::UnknownTarget)?
                .id;
            let from = model.container_of(component).map(|c| c.id);
            if let Some(source_container) = model.get_container_by_iframe_element(source)
                && Some(source_container.id) != from
            {
                log::warn!(
                    "drop source {} does not own {component}",
                    source_container.id
                );
            }
            let before = sibling.and_then(|s| {
                let found = model.get_component_by_iframe_element(s).map(|c| c.id);
                if found.is_none() {
                    log::debug!("drop sibling {s:?} is not a component, appending");
                }
                found
            });
            (component, from, to, before)
        };

        let moved = self.model.borrow_mut().move_component(component, to, before);
        match moved {
            Ok(()) => {
                self.events.push(EditorEvent::ComponentMoved {
                    component,
                    from: from.unwrap_or(to),
                    to,
                    before,
                });
                Ok(())
            }
            Err(reason) => {
                self.events.push(EditorEvent::MoveRejected {
                    component,
                    reason: reason.clone(),
                });
                Err(reason.into())
            }
        }
    }
}

/// Leaves [`GestureState::Dropping`] however the drop handler exits,
/// unwinding included.
struct DropGuard<'a> {
    gesture: &'a Cell<GestureState>,
}

impl Drop for DropGuard<'_> {
    fn drop(&mut self) {
        let next = self
            .gesture
            .get()
            .on(GestureEvent::DropFinished)
            .unwrap_or(GestureState::Idle);
        self.gesture.set(next);
    }
}

// ─── Library callbacks ───────────────────────────────────────────────────

struct DragHandler {
    shared: Weak<DragShared>,
}

impl DragCallbacks for DragHandler {
    fn moves(&self, _element: DomNodeId, source: DomNodeId) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        !shared.gesture.get().is_dropping() && shared.container_enabled(source)
    }

    fn accepts(
        &self,
        _element: DomNodeId,
        target: DomNodeId,
        _source: DomNodeId,
        _sibling: Option<DomNodeId>,
    ) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.container_enabled(target))
    }

    fn on_drag_start(&self, _element: DomNodeId, _source: DomNodeId) {
        if let Some(shared) = self.shared.upgrade() {
            shared.transition(GestureEvent::DragStart);
        }
    }

    fn on_mirror_created(&self, mirror: DomNodeId, original: DomNodeId) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let Some(doc) = shared.doc.borrow().clone() else {
            return;
        };
        let style: Vec<(String, String)> = doc
            .computed_style(original)
            .into_iter()
            .filter(|(property, _)| !shared.config.excludes_from_mirror(property))
            .collect();
        doc.set_style(mirror, &style);
    }

    fn on_drag_over(&self, _element: DomNodeId, container: DomNodeId) -> Option<DragDirection> {
        let shared = self.shared.upgrade()?;
        let model = shared.model.borrow();
        model
            .get_container_by_iframe_element(container)
            .map(|c| c.drag_direction)
    }

    fn on_drag_end(&self, _element: DomNodeId) {
        if let Some(shared) = self.shared.upgrade() {
            shared.transition(GestureEvent::DragEnd);
            shared.end_press();
        }
    }

    fn on_drop(
        &self,
        element: DomNodeId,
        target: DomNodeId,
        source: DomNodeId,
        sibling: Option<DomNodeId>,
    ) -> DropOutcome {
        let Some(shared) = self.shared.upgrade() else {
            return DropOutcome::Rejected;
        };
        match shared.handle_drop(element, target, source, sibling) {
            Ok(()) => DropOutcome::Accepted,
            Err(err) => {
                log::warn!("drop rejected: {err}");
                DropOutcome::Rejected
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realm::{ContentSize, HeightMarker, ReleaseHandler};
    use ce_core::{DomNodeKind, DomTree, Geometry, MarkupDocument};
    use pretty_assertions::assert_eq;
    use smallvec::SmallVec;
    use std::borrow::Cow;

    /// A parsed page with no browser behind it.
    struct StaticDoc(MarkupDocument);

    impl DomTree for StaticDoc {
        fn root(&self) -> DomNodeId {
            self.0.root()
        }
        fn kind(&self, node: DomNodeId) -> DomNodeKind {
            self.0.kind(node)
        }
        fn children(&self, node: DomNodeId) -> SmallVec<[DomNodeId; 8]> {
            self.0.children(node)
        }
        fn comment_text(&self, node: DomNodeId) -> Option<Cow<'_, str>> {
            self.0.comment_text(node)
        }
    }

    impl FrameDocument for StaticDoc {
        fn generation(&self) -> Generation {
            Generation::new(1)
        }
        fn element_geometry(&self, _: DomNodeId) -> Option<Geometry> {
            None
        }
        fn content_size(&self) -> ContentSize {
            ContentSize::default()
        }
        fn height_marker(&self) -> Option<HeightMarker> {
            None
        }
        fn observe_mutations(&self, _: Rc<dyn Fn()>) -> ListenerGuard {
            ListenerGuard::noop()
        }
        fn observe_resize(&self, _: Rc<dyn Fn()>) -> ListenerGuard {
            ListenerGuard::noop()
        }
        fn on_pointer_release(&self, _: DomNodeId, _: ReleaseHandler) -> ListenerGuard {
            ListenerGuard::noop()
        }
        fn dispatch_pointer(&self, _: DomNodeId, _: PointerInput) -> bool {
            true
        }
        fn computed_style(&self, _: DomNodeId) -> Vec<(String, String)> {
            Vec::new()
        }
        fn set_style(&self, _: DomNodeId, _: &[(String, String)]) {}
        fn on_unload(&self, _: Box<dyn FnOnce()>) {}
    }

    struct NoInjector;

    impl ResourceInjector for NoInjector {
        fn inject_script(
            &self,
            _: &dyn FrameDocument,
            _: &str,
        ) -> LocalBoxFuture<'static, Result<(), InjectError>> {
            futures::future::ready(Ok(())).boxed_local()
        }
        fn inject_css(
            &self,
            _: &dyn FrameDocument,
            _: &str,
        ) -> LocalBoxFuture<'static, Result<(), InjectError>> {
            futures::future::ready(Ok(())).boxed_local()
        }
    }

    struct NoLibrary;

    impl DragLibraryFactory for NoLibrary {
        fn create(
            &self,
            _: &dyn FrameDocument,
            _: &[DomNodeId],
            _: Rc<dyn DragCallbacks>,
        ) -> Result<Box<dyn DragLibrary>, DragError> {
            Err(DragError::Library("not available in unit tests".into()))
        }
    }

    const PAGE: &str = r#"<body>
<!--{"type":"container","id":"left"}--><div id="left"><!--{"type":"component","id":"one"}--><p id="one">1</p><!--{"id":"one","end":true}--><!--{"type":"component","id":"two"}--><p id="two">2</p><!--{"id":"two","end":true}--></div><!--{"id":"left","end":true}-->
<!--{"type":"container","id":"right","xtype":"hst.span"}--><div id="right"></div><!--{"id":"right","end":true}-->
</body>"#;

    struct Fixture {
        service: DragDropService,
        model: Rc<RefCell<PageModel>>,
        events: EventQueue,
        doc: Rc<StaticDoc>,
    }

    impl Fixture {
        fn new() -> Self {
            let doc = Rc::new(StaticDoc(MarkupDocument::parse(PAGE)));
            let model = Rc::new(RefCell::new(PageModel::new()));
            let warnings = model.borrow_mut().parse(doc.as_ref());
            assert!(warnings.is_empty(), "{warnings:?}");
            let events = EventQueue::new();
            let service = DragDropService::new(
                Rc::new(EditorConfig::default()),
                Rc::clone(&model),
                events.clone(),
                Rc::new(NoInjector),
                Rc::new(NoLibrary),
            );
            service.attach(doc.clone());
            Self {
                service,
                model,
                events,
                doc,
            }
        }

        fn el(&self, id: &str) -> DomNodeId {
            self.doc.0.element_by_id(id).unwrap()
        }

        fn order(&self, container: &str) -> Vec<String> {
            let model = self.model.borrow();
            model
                .page()
                .unwrap()
                .components(ItemId::intern(container))
                .iter()
                .map(|c| c.id.as_str().to_string())
                .collect()
        }

        fn drag(&self) {
            let callbacks = self.service.callbacks();
            callbacks.on_drag_start(self.el("one"), self.el("left"));
            assert_eq!(self.service.state(), GestureState::Dragging);
        }
    }

    #[test]
    fn drop_moves_component_and_returns_to_idle() {
        let f = Fixture::new();
        let callbacks = f.service.callbacks();
        f.drag();

        let outcome = callbacks.on_drop(f.el("one"), f.el("right"), f.el("left"), None);

        assert_eq!(outcome, DropOutcome::Accepted);
        assert_eq!(f.service.state(), GestureState::Idle);
        assert_eq!(f.order("left"), vec!["two"]);
        assert_eq!(f.order("right"), vec!["one"]);
        assert_eq!(
            f.events.drain(),
            vec![EditorEvent::ComponentMoved {
                component: ItemId::intern("one"),
                from: ItemId::intern("left"),
                to: ItemId::intern("right"),
                before: None,
            }]
        );
    }

    #[test]
    fn refused_move_still_leaves_dropping() {
        let f = Fixture::new();
        let callbacks = f.service.callbacks();
        f.drag();
        // Locked by someone else after the drag started.
        f.model
            .borrow_mut()
            .set_container_lock(ItemId::intern("right"), Some("alice".into()), false);

        let outcome = callbacks.on_drop(f.el("one"), f.el("right"), f.el("left"), None);

        assert_eq!(outcome, DropOutcome::Rejected);
        assert_eq!(f.service.state(), GestureState::Idle);
        assert_eq!(f.order("left"), vec!["one", "two"]);
        assert!(matches!(
            f.events.drain().as_slice(),
            [EditorEvent::MoveRejected { .. }]
        ));
    }

    #[test]
    fn panicking_drop_still_leaves_dropping() {
        let f = Fixture::new();
        let callbacks = f.service.callbacks();
        f.drag();

        // The model is busy elsewhere: the drop handler's borrow panics.
        let held = f.model.borrow_mut();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            callbacks.on_drop(f.el("one"), f.el("right"), f.el("left"), None)
        }));
        drop(held);

        assert!(result.is_err());
        assert_eq!(f.service.state(), GestureState::Idle);
    }

    #[test]
    fn drop_without_drag_is_rejected() {
        let f = Fixture::new();
        let callbacks = f.service.callbacks();
        let outcome = callbacks.on_drop(f.el("one"), f.el("right"), f.el("left"), None);
        assert_eq!(outcome, DropOutcome::Rejected);
        assert_eq!(f.order("left"), vec!["one", "two"]);
        assert!(f.events.is_empty());
    }

    #[test]
    fn moves_refused_while_dropping_or_from_disabled() {
        let f = Fixture::new();
        let callbacks = f.service.callbacks();
        assert!(callbacks.moves(f.el("one"), f.el("left")));

        f.service.shared.gesture.set(GestureState::Dropping);
        assert!(!callbacks.moves(f.el("one"), f.el("left")));
        f.service.shared.gesture.set(GestureState::Idle);

        f.model
            .borrow_mut()
            .set_container_lock(ItemId::intern("left"), Some("bob".into()), false);
        assert!(!callbacks.moves(f.el("one"), f.el("left")));
        assert!(!callbacks.accepts(f.el("two"), f.el("left"), f.el("right"), None));
        assert!(callbacks.accepts(f.el("two"), f.el("right"), f.el("left"), None));
    }

    #[test]
    fn drag_over_reports_container_direction() {
        let f = Fixture::new();
        let callbacks = f.service.callbacks();
        assert_eq!(
            callbacks.on_drag_over(f.el("one"), f.el("right")),
            Some(DragDirection::Horizontal)
        );
        assert_eq!(
            callbacks.on_drag_over(f.el("one"), f.el("left")),
            Some(DragDirection::Vertical)
        );
        assert_eq!(callbacks.on_drag_over(f.el("one"), f.el("one")), None);
    }

    #[test]
    fn failed_library_leaves_service_disabled() {
        let f = Fixture::new();
        let result = futures::executor::block_on(f.service.enable());
        assert!(matches!(result, Err(DragError::Library(_))));
        assert!(!f.service.is_enabled());
        f.service.disable();
        assert!(f.events.is_empty());
    }
}
