//! The host page elements around the iframe.

use crate::frame::listen;
use ce_core::{Geometry, Offset};
use ce_editor::{
    Callback, HostPart, HostSurface, Length, ListenerGuard, OverlayId, OverlayItem, OverlayKind,
};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use wasm_bindgen::JsCast;
use web_sys::{Document, HtmlElement, HtmlIFrameElement, Window};

pub struct BrowserHost {
    window: Window,
    document: Document,
    sheet: HtmlElement,
    frame: HtmlIFrameElement,
    overlay: HtmlElement,
    scrollbar_wrapper: HtmlElement,
    overlays: RefCell<BTreeMap<OverlayId, HtmlElement>>,
    next_overlay: Cell<u32>,
}

impl BrowserHost {
    pub fn new(
        window: Window,
        document: Document,
        sheet: HtmlElement,
        frame: HtmlIFrameElement,
        overlay: HtmlElement,
        scrollbar_wrapper: HtmlElement,
    ) -> Self {
        Self {
            window,
            document,
            sheet,
            frame,
            overlay,
            scrollbar_wrapper,
            overlays: RefCell::new(BTreeMap::new()),
            next_overlay: Cell::new(1),
        }
    }

    fn part(&self, part: HostPart) -> &HtmlElement {
        match part {
            HostPart::Sheet => &self.sheet,
            HostPart::Frame => &self.frame,
            HostPart::Overlay => &self.overlay,
            HostPart::ScrollbarWrapper => &self.scrollbar_wrapper,
        }
    }

    fn set_length(element: &HtmlElement, property: &str, length: Length) {
        let value = match length {
            Length::Auto => String::new(),
            Length::Px(px) => format!("{px}px"),
        };
        let style = element.style();
        let result = if value.is_empty() {
            style.remove_property(property).map(|_| ())
        } else {
            style.set_property(property, &value)
        };
        if let Err(err) = result {
            log::debug!("could not set {property}: {err:?}");
        }
    }
}

impl HostSurface for BrowserHost {
    fn frame_offset(&self) -> Offset {
        Offset::new(
            f64::from(self.frame.offset_left() + self.frame.client_left()),
            f64::from(self.frame.offset_top() + self.frame.client_top()),
        )
    }

    fn scrollbar_width(&self) -> f64 {
        let wrapper = &self.scrollbar_wrapper;
        f64::from((wrapper.offset_height() - wrapper.client_height()).max(0))
    }

    fn set_width(&self, part: HostPart, width: Length) {
        Self::set_length(self.part(part), "width", width);
    }

    fn set_height(&self, part: HostPart, height: Length) {
        Self::set_length(self.part(part), "height", height);
    }

    fn show_horizontal_scrollbar(&self, visible: bool) {
        let value = if visible { "scroll" } else { "hidden" };
        if let Err(err) = self.scrollbar_wrapper.style().set_property("overflow-x", value) {
            log::debug!("could not toggle scrollbar: {err:?}");
        }
    }

    fn create_overlay(&self, item: &OverlayItem) -> OverlayId {
        let id = OverlayId::new(self.next_overlay.get());
        self.next_overlay.set(id.get() + 1);

        let element = match self
            .document
            .create_element("div")
            .map(|el| el.dyn_into::<HtmlElement>())
        {
            Ok(Ok(element)) => element,
            _ => {
                log::warn!("could not create overlay for {}", item.item);
                return id;
            }
        };
        let kind = match item.kind {
            OverlayKind::Container => "container",
            OverlayKind::Component => "component",
        };
        let mut class = format!("channel-overlay channel-overlay-{kind}");
        if item.disabled {
            class.push_str(" channel-overlay-disabled");
        }
        element.set_class_name(&class);
        let _ = element.set_attribute("data-item-id", item.item.as_str());
        if let Some(label) = &item.label {
            let _ = element.set_attribute("data-label", label);
        }
        let _ = element.style().set_property("display", "none");
        if let Err(err) = self.overlay.append_child(&element) {
            log::warn!("could not attach overlay for {}: {err:?}", item.item);
        }
        self.overlays.borrow_mut().insert(id, element);
        id
    }

    fn remove_overlay(&self, overlay: OverlayId) {
        if let Some(element) = self.overlays.borrow_mut().remove(&overlay) {
            element.remove();
        }
    }

    fn place_overlay(&self, overlay: OverlayId, geometry: Option<Geometry>) {
        let overlays = self.overlays.borrow();
        let Some(element) = overlays.get(&overlay) else {
            return;
        };
        let style = element.style();
        let _ = match geometry {
            Some(g) => style
                .set_property("display", "block")
                .and_then(|_| style.set_property("left", &format!("{}px", g.x)))
                .and_then(|_| style.set_property("top", &format!("{}px", g.y)))
                .and_then(|_| style.set_property("width", &format!("{}px", g.width)))
                .and_then(|_| style.set_property("height", &format!("{}px", g.height))),
            None => style.set_property("display", "none"),
        };
    }

    fn set_click_through(&self, enabled: bool) {
        let value = if enabled { "none" } else { "auto" };
        let _ = self.overlay.style().set_property("pointer-events", value);
    }

    fn observe_resize(&self, on_resize: Callback) -> ListenerGuard {
        listen(&self.window, "resize", on_resize)
    }
}
