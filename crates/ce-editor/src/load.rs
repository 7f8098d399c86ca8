//! The load cycle run for every document the iframe loads.
//!
//! 1. hook the document's unload to tear everything down again
//! 2. drop the previous page
//! 3. parse the new one
//! 4. size the frame and place overlays (needs the overlay stylesheet)
//! 5. follow the page into its channel if it belongs to another one
//! 6. rewrite links
//! 7. enable drag and drop when in edit mode
//! 8. report the page as loaded
//!
//! A failed stylesheet injection only skips step 4. A refused channel switch
//! skips steps 6 and 7 but keeps the parsed page. Step 8 always runs unless a
//! newer document took over, in which case the cycle stops at the first
//! suspension point that notices.

use crate::config::EditorConfig;
use crate::dragdrop::DragDropService;
use crate::error::{DragError, LoadError};
use crate::events::{EditorEvent, EventQueue};
use crate::overlay::OverlaySyncService;
use crate::realm::{
    ChannelService, DragLibraryFactory, FrameDocument, Generation, HostSurface, LinkRewriter,
    ResourceInjector,
};
use ce_core::{ItemId, Offset, PageModel, PageSnapshot};
use futures::future::{FutureExt, LocalBoxFuture};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Everything outside the engine it talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub host: Rc<dyn HostSurface>,
    pub injector: Rc<dyn ResourceInjector>,
    pub drag_library: Rc<dyn DragLibraryFactory>,
    pub channel: Rc<dyn ChannelService>,
    pub links: Rc<dyn LinkRewriter>,
}

/// What a finished load cycle managed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub generation: Generation,
    pub warnings: usize,
    pub overlay_synced: bool,
    pub drag_enabled: bool,
}

/// Owns the page model and both services, and runs the load cycle.
/// Clones share everything.
#[derive(Clone)]
pub struct PageLoadController {
    config: Rc<EditorConfig>,
    model: Rc<RefCell<PageModel>>,
    events: EventQueue,
    overlay: OverlaySyncService,
    dragdrop: DragDropService,
    injector: Rc<dyn ResourceInjector>,
    channel: Rc<dyn ChannelService>,
    links: Rc<dyn LinkRewriter>,
    edit_mode: Rc<Cell<bool>>,
    current: Rc<Cell<Option<Generation>>>,
}

impl PageLoadController {
    pub fn new(config: EditorConfig, collaborators: Collaborators) -> Self {
        let config = Rc::new(config);
        let model = Rc::new(RefCell::new(PageModel::new()));
        let events = EventQueue::new();

        let overlay = OverlaySyncService::new(Rc::clone(&config));
        overlay.init(Rc::clone(&collaborators.host));

        let dragdrop = DragDropService::new(
            Rc::clone(&config),
            Rc::clone(&model),
            events.clone(),
            Rc::clone(&collaborators.injector),
            collaborators.drag_library,
        );
        dragdrop.init(collaborators.host);

        Self {
            edit_mode: Rc::new(Cell::new(config.edit_mode)),
            config,
            model,
            events,
            overlay,
            dragdrop,
            injector: collaborators.injector,
            channel: collaborators.channel,
            links: collaborators.links,
            current: Rc::new(Cell::new(None)),
        }
    }

    pub fn model(&self) -> &Rc<RefCell<PageModel>> {
        &self.model
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    pub fn overlay(&self) -> &OverlaySyncService {
        &self.overlay
    }

    pub fn dragdrop(&self) -> &DragDropService {
        &self.dragdrop
    }

    pub fn current_generation(&self) -> Option<Generation> {
        self.current.get()
    }

    pub fn is_edit_mode(&self) -> bool {
        self.edit_mode.get()
    }

    pub fn snapshot(&self) -> Option<PageSnapshot> {
        self.model.borrow().page().map(|p| p.snapshot())
    }

    /// Runs the load cycle for `doc`. The returned future may be dropped at
    /// any point; the next load starts from scratch regardless.
    pub fn on_load(
        &self,
        doc: Rc<dyn FrameDocument>,
    ) -> LocalBoxFuture<'static, Result<LoadReport, LoadError>> {
        let this = self.clone();
        async move { this.run(doc).await }.boxed_local()
    }

    async fn run(self, doc: Rc<dyn FrameDocument>) -> Result<LoadReport, LoadError> {
        let generation = doc.generation();
        if let Some(previous) = self.current.get()
            && previous != generation
        {
            log::debug!("{previous:?} replaced without unload");
            self.teardown();
        }
        self.current.set(Some(generation));
        log::debug!("load cycle for {generation:?}");

        // 1
        let this = self.clone();
        doc.on_unload(Box::new(move || this.on_unload(generation)));

        // 2, 3
        self.model.borrow_mut().clear_parsed_elements();
        let warnings = self.model.borrow_mut().parse(&*doc).len();
        self.dragdrop.attach(Rc::clone(&doc));

        // 4
        let css = self
            .injector
            .inject_css(&*doc, &self.config.overlay_css_url)
            .await;
        self.ensure_current(generation)?;
        let overlay_synced = match css {
            Ok(()) => {
                self.overlay.on_load(Rc::clone(&doc));
                if let Some(page) = self.model.borrow().page() {
                    self.overlay.create_overlays(page);
                }
                true
            }
            Err(err) => {
                log::warn!("overlay stylesheet not injected, skipping overlay sync: {err}");
                false
            }
        };

        // 5
        let page_channel = self.model.borrow().channel_id().map(str::to_owned);
        if let Some(channel) = page_channel
            && channel != self.channel.current_id()
        {
            log::debug!("page belongs to channel {channel}, switching");
            let switched = self.channel.switch_to_channel(&channel).await;
            self.ensure_current(generation)?;
            if let Err(err) = switched {
                log::warn!("{err}; keeping page without links or drag and drop");
                self.events
                    .push(EditorEvent::PageLoaded { generation, warnings });
                return Err(err.into());
            }
        }

        // 6
        self.links.rewrite_links(&*doc);

        // 7
        let mut drag_enabled = false;
        if self.edit_mode.get() {
            match self.dragdrop.enable().await {
                Ok(()) => drag_enabled = true,
                Err(DragError::Superseded) => return Err(LoadError::Superseded),
                Err(DragError::Cancelled) => log::debug!("edit mode left during load"),
                Err(err) => log::warn!("drag and drop unavailable: {err}"),
            }
            self.ensure_current(generation)?;
            if drag_enabled && !self.edit_mode.get() {
                self.dragdrop.disable();
                drag_enabled = false;
            }
        }

        // 8
        self.events
            .push(EditorEvent::PageLoaded { generation, warnings });
        Ok(LoadReport {
            generation,
            warnings,
            overlay_synced,
            drag_enabled,
        })
    }

    fn ensure_current(&self, generation: Generation) -> Result<(), LoadError> {
        if self.current.get() == Some(generation) {
            Ok(())
        } else {
            log::debug!("load cycle for {generation:?} superseded");
            Err(LoadError::Superseded)
        }
    }

    /// Tears down everything bound to `generation`. Ignored for any other
    /// document.
    pub fn on_unload(&self, generation: Generation) {
        if self.current.get() != Some(generation) {
            log::trace!("unload of stale {generation:?} ignored");
            return;
        }
        log::debug!("unloading {generation:?}");
        self.teardown();
    }

    fn teardown(&self) {
        self.current.set(None);
        self.overlay.on_unload();
        self.dragdrop.detach();
        self.model.borrow_mut().clear_parsed_elements();
    }

    /// Turns drag and drop on or off for the current document.
    pub fn set_edit_mode(&self, enabled: bool) -> LocalBoxFuture<'static, Result<(), DragError>> {
        self.edit_mode.set(enabled);
        if enabled && self.current.get().is_some() {
            self.dragdrop.enable()
        } else {
            self.dragdrop.disable();
            futures::future::ready(Ok(())).boxed_local()
        }
    }

    /// A press on a component overlay at host position `position`.
    pub fn press_component(&self, position: Offset, component: ItemId) -> Result<(), DragError> {
        self.dragdrop.start_drag_or_click(position, component)
    }
}
