//! Keeps the host overlay in step with the iframe.
//!
//! The iframe is sized to its content so the host scrolls instead of the
//! frame, and every registered overlay element is placed over its box
//! element. A sync runs once per load and again on every body mutation,
//! iframe resize and host resize.
//!
//! ```text
//! Uninitialized ──init──▶ Attached ──load──▶ Active
//!                            ▲                  │
//!                            └──────unload──────┘
//! ```
//!
//! `on_load` also works before `init`: the document is remembered and the
//! first sync happens as soon as a host surface arrives.

use crate::config::EditorConfig;
use crate::realm::{
    ContentSize, FrameDocument, HeightMarker, HostPart, HostSurface, Length, ListenerGuard,
    OverlayId, OverlayItem, OverlayKind,
};
use ce_core::{DomNodeId, Page};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    Uninitialized,
    Attached,
    Active,
}

// ─── Frame metrics ───────────────────────────────────────────────────────

/// Inputs of one sizing pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    pub content: ContentSize,
    pub marker: Option<HeightMarker>,
    pub scrollbar_width: f64,
    pub viewport_width: Option<f64>,
}

/// Sizes applied to the host by one sync.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMetrics {
    /// Shared by iframe, overlay and scrollbar wrapper.
    pub height: f64,
    pub sheet_width: Length,
    /// Shared by iframe and overlay.
    pub frame_width: Length,
    pub horizontal_scrollbar: bool,
}

impl FrameMetrics {
    pub fn compute(input: &FrameInput, config: &EditorConfig) -> Self {
        let page_height = input
            .marker
            .map(|m| m.top + m.margin_bottom)
            .unwrap_or(input.content.height);
        let mut height = page_height + config.border_compensation;

        match input.viewport_width {
            Some(width) if width > 0.0 => {
                let overflows = input.content.width > width;
                let frame_width = if overflows {
                    height += input.scrollbar_width;
                    input.content.width + config.horizontal_compensation
                } else {
                    width
                };
                Self {
                    height,
                    sheet_width: Length::Px(width),
                    frame_width: Length::Px(frame_width),
                    horizontal_scrollbar: overflows,
                }
            }
            _ => Self {
                height,
                sheet_width: Length::Auto,
                frame_width: Length::Auto,
                horizontal_scrollbar: false,
            },
        }
    }
}

// ─── Service ─────────────────────────────────────────────────────────────

struct OverlayInner {
    config: Rc<EditorConfig>,
    host: Option<Rc<dyn HostSurface>>,
    doc: Option<Rc<dyn FrameDocument>>,
    frame_listeners: Vec<ListenerGuard>,
    host_listener: Option<ListenerGuard>,
    registry: BTreeMap<OverlayId, DomNodeId>,
    /// Overlays this service created and must remove on unload.
    owned: BTreeSet<OverlayId>,
    viewport_width: Option<f64>,
    last_metrics: Option<FrameMetrics>,
}

/// Handle to the overlay sync state. Clones share it.
#[derive(Clone)]
pub struct OverlaySyncService {
    inner: Rc<RefCell<OverlayInner>>,
}

impl OverlaySyncService {
    pub fn new(config: Rc<EditorConfig>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(OverlayInner {
                config,
                host: None,
                doc: None,
                frame_listeners: Vec::new(),
                host_listener: None,
                registry: BTreeMap::new(),
                owned: BTreeSet::new(),
                viewport_width: None,
                last_metrics: None,
            })),
        }
    }

    pub fn state(&self) -> OverlayState {
        let inner = self.inner.borrow();
        match (&inner.host, &inner.doc) {
            (None, _) => OverlayState::Uninitialized,
            (Some(_), None) => OverlayState::Attached,
            (Some(_), Some(_)) => OverlayState::Active,
        }
    }

    /// Binds the host elements the iframe size is mirrored onto.
    pub fn init(&self, host: Rc<dyn HostSurface>) {
        let listener = host.observe_resize(self.resync_callback());
        {
            let mut inner = self.inner.borrow_mut();
            inner.host_listener = Some(listener);
            inner.host = Some(host);
        }
        self.sync_iframe();
    }

    /// Starts following a freshly loaded document. Calling it again for the
    /// same or a newer document replaces the previous observers.
    pub fn on_load(&self, doc: Rc<dyn FrameDocument>) {
        let replaced = self
            .inner
            .borrow()
            .doc
            .as_ref()
            .is_some_and(|old| old.generation() != doc.generation());
        if replaced {
            self.on_unload();
        }

        let listeners = vec![
            doc.observe_mutations(self.resync_callback()),
            doc.observe_resize(self.resync_callback()),
        ];
        let previous = {
            let mut inner = self.inner.borrow_mut();
            log::debug!("overlay following document {:?}", doc.generation());
            inner.doc = Some(doc);
            std::mem::replace(&mut inner.frame_listeners, listeners)
        };
        drop(previous);
        self.sync_iframe();
    }

    /// Stops following the document and removes the overlays created for it.
    /// Safe to call at any time.
    pub fn on_unload(&self) {
        let (host, owned, listeners) = {
            let mut inner = self.inner.borrow_mut();
            inner.doc = None;
            inner.registry.clear();
            inner.last_metrics = None;
            let owned = std::mem::take(&mut inner.owned);
            let listeners = std::mem::take(&mut inner.frame_listeners);
            (inner.host.clone(), owned, listeners)
        };
        drop(listeners);
        if let Some(host) = host {
            for overlay in owned {
                host.remove_overlay(overlay);
            }
        }
    }

    /// Asks the host for one overlay element per container and component of
    /// `page` and registers each over its box element.
    pub fn create_overlays(&self, page: &Page) -> Vec<OverlayId> {
        let Some(host) = self.inner.borrow().host.clone() else {
            log::debug!("no host surface yet, skipping overlay creation");
            return Vec::new();
        };

        let mut created = Vec::new();
        for container in page.containers() {
            let item = OverlayItem {
                item: container.id,
                kind: OverlayKind::Container,
                label: container.label.clone(),
                disabled: container.is_disabled(),
            };
            created.push((host.create_overlay(&item), container.box_element));
            for component in page.components(container.id) {
                let item = OverlayItem {
                    item: component.id,
                    kind: OverlayKind::Component,
                    label: component.label.clone(),
                    disabled: container.is_disabled(),
                };
                created.push((host.create_overlay(&item), component.box_element));
            }
        }

        let ids: Vec<OverlayId> = created.iter().map(|(overlay, _)| *overlay).collect();
        {
            let mut inner = self.inner.borrow_mut();
            for (overlay, element) in created {
                inner.registry.insert(overlay, element);
                inner.owned.insert(overlay);
            }
        }
        self.sync_iframe();
        ids
    }

    /// Registers `overlay` to follow `element`. Returns `false` if the overlay
    /// is already registered.
    pub fn register_element(&self, overlay: OverlayId, element: DomNodeId) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.registry.contains_key(&overlay) {
            return false;
        }
        inner.registry.insert(overlay, element);
        true
    }

    /// Returns `false` if the overlay was not registered.
    pub fn unregister_element(&self, overlay: OverlayId) -> bool {
        self.inner.borrow_mut().registry.remove(&overlay).is_some()
    }

    pub fn registered(&self) -> Vec<(OverlayId, DomNodeId)> {
        self.inner
            .borrow()
            .registry
            .iter()
            .map(|(&overlay, &element)| (overlay, element))
            .collect()
    }

    /// Width constraint for the next sync. Does not sync by itself.
    pub fn set_viewport_width(&self, width: Option<f64>) {
        self.inner.borrow_mut().viewport_width = width.filter(|w| *w > 0.0);
    }

    pub fn last_metrics(&self) -> Option<FrameMetrics> {
        self.inner.borrow().last_metrics
    }

    /// Resizes the host parts to the iframe content and repositions every
    /// registered overlay. A no-op until both a host and a document exist.
    pub fn sync_iframe(&self) -> Option<FrameMetrics> {
        let (host, doc, config, viewport_width, registry) = {
            let inner = self.inner.borrow();
            let (Some(host), Some(doc)) = (inner.host.clone(), inner.doc.clone()) else {
                log::trace!("sync skipped: overlay not active");
                return None;
            };
            (
                host,
                doc,
                Rc::clone(&inner.config),
                inner.viewport_width,
                inner.registry.clone(),
            )
        };

        let metrics = FrameMetrics::compute(
            &FrameInput {
                content: doc.content_size(),
                marker: doc.height_marker(),
                scrollbar_width: host.scrollbar_width(),
                viewport_width,
            },
            &config,
        );

        let height = Length::Px(metrics.height);
        host.set_height(HostPart::Frame, height);
        host.set_height(HostPart::Overlay, height);
        host.set_height(HostPart::ScrollbarWrapper, height);
        host.set_width(HostPart::Sheet, metrics.sheet_width);
        host.set_width(HostPart::Frame, metrics.frame_width);
        host.set_width(HostPart::Overlay, metrics.frame_width);
        host.show_horizontal_scrollbar(metrics.horizontal_scrollbar);

        let offset = host.frame_offset();
        for (overlay, element) in registry {
            let geometry = doc.element_geometry(element).map(|g| g.translate(offset));
            host.place_overlay(overlay, geometry);
        }

        log::trace!("synced {:?} with {metrics:?}", doc.generation());
        self.inner.borrow_mut().last_metrics = Some(metrics);
        Some(metrics)
    }

    fn resync_callback(&self) -> Rc<dyn Fn()> {
        let weak: Weak<RefCell<OverlayInner>> = Rc::downgrade(&self.inner);
        Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                OverlaySyncService { inner }.sync_iframe();
            }
        })
    }
}
