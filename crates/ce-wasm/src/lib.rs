//! WASM bridge for the CMS host page.
//!
//! The host hands over its sheet, iframe, overlay layer and scrollbar
//! wrapper plus its channel service. From then on every iframe `load`
//! starts a new load cycle; everything the engine reports is queued as
//! [`EditorEvent`](ce_editor::EditorEvent)s the host drains as JSON.

pub mod collab;
pub mod frame;
pub mod host;
pub mod logger;

use ce_core::{ItemId, MarkupDocument, Offset, parse_page};
use ce_editor::{
    Callback, Collaborators, EditorConfig, Generation, ListenerGuard, LoadError,
    PageLoadController,
};
use collab::{DragulaFactory, ElementInjector, JsChannelService, JsLinkRewriter};
use frame::{BrowserDocument, CurrentFrame, listen};
use host::BrowserHost;
use std::cell::Cell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};
use web_sys::{HtmlElement, HtmlIFrameElement};

/// The channel editor, one per host page.
#[wasm_bindgen]
pub struct ChannelEditor {
    controller: PageLoadController,
    load_frame: Callback,
    _iframe_load: ListenerGuard,
}

#[wasm_bindgen]
impl ChannelEditor {
    /// `config_json` is an [`EditorConfig`]; missing keys take defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(
        config_json: &str,
        iframe: HtmlIFrameElement,
        sheet: HtmlElement,
        overlay: HtmlElement,
        scrollbar_wrapper: HtmlElement,
        channel: JsValue,
        rewrite_links: js_sys::Function,
    ) -> Result<ChannelEditor, JsValue> {
        console_error_panic_hook_setup();
        logger::init(log::max_level().max(log::LevelFilter::Warn));

        let config = if config_json.trim().is_empty() {
            EditorConfig::default()
        } else {
            EditorConfig::from_json(config_json)
                .map_err(|e| JsValue::from_str(&format!("invalid editor config: {e}")))?
        };
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("no document"))?;

        let frame = CurrentFrame::default();
        let host = BrowserHost::new(
            window,
            document,
            sheet,
            iframe.clone(),
            overlay,
            scrollbar_wrapper,
        );
        let selector = config.height_marker_selector.clone();
        let controller = PageLoadController::new(
            config,
            Collaborators {
                host: Rc::new(host),
                injector: Rc::new(ElementInjector::new(frame.clone())),
                drag_library: Rc::new(DragulaFactory::new(frame.clone())),
                channel: Rc::new(JsChannelService::new(channel)),
                links: Rc::new(JsLinkRewriter::new(rewrite_links, frame.clone())),
            },
        );

        let load_frame: Callback = {
            let controller = controller.clone();
            let iframe = iframe.clone();
            let counter = Rc::new(Cell::new(Generation::new(0)));
            Rc::new(move || {
                let (Some(window), Some(document)) =
                    (iframe.content_window(), iframe.content_document())
                else {
                    log::warn!("iframe document is not accessible");
                    return;
                };
                let generation = counter.get().next();
                counter.set(generation);
                let doc = Rc::new(BrowserDocument::new(
                    generation,
                    window,
                    document,
                    selector.clone(),
                ));
                frame.set(Rc::clone(&doc));
                let load = controller.on_load(doc);
                spawn_local(async move {
                    match load.await {
                        Ok(report) => log::info!("page loaded: {report:?}"),
                        Err(LoadError::Superseded) => {
                            log::debug!("{generation:?} superseded before it finished loading")
                        }
                        Err(err) => log::warn!("{err}"),
                    }
                });
            })
        };
        let iframe_load = listen(&iframe, "load", Rc::clone(&load_frame));

        Ok(Self {
            controller,
            load_frame,
            _iframe_load: iframe_load,
        })
    }

    /// Runs the load cycle for the document already in the iframe, for
    /// hosts that construct the editor after the first `load`.
    #[wasm_bindgen(js_name = loadCurrent)]
    pub fn load_current(&self) {
        (self.load_frame)();
    }

    /// Queued events as a JSON array, oldest first.
    #[wasm_bindgen(js_name = drainEvents)]
    pub fn drain_events_json(&self) -> String {
        serde_json::to_string(&self.controller.events().drain()).unwrap_or_else(|_| "[]".into())
    }

    /// The parsed page as JSON, or `null` between documents.
    #[wasm_bindgen(js_name = snapshot)]
    pub fn snapshot_json(&self) -> String {
        serde_json::to_string(&self.controller.snapshot()).unwrap_or_else(|_| "null".into())
    }

    #[wasm_bindgen(js_name = isEditMode)]
    pub fn is_edit_mode(&self) -> bool {
        self.controller.is_edit_mode()
    }

    /// Resolves once drag and drop is bound (or unbound); rejects with the
    /// reason it could not be enabled.
    #[wasm_bindgen(js_name = setEditMode)]
    pub fn set_edit_mode(&self, enabled: bool) -> js_sys::Promise {
        let done = self.controller.set_edit_mode(enabled);
        future_to_promise(async move {
            done.await
                .map(|()| JsValue::from_bool(enabled))
                .map_err(|e| JsValue::from_str(&e.to_string()))
        })
    }

    /// Width of the host viewport the iframe is shown in; `undefined`
    /// lets the page size itself.
    #[wasm_bindgen(js_name = setViewportWidth)]
    pub fn set_viewport_width(&self, width: Option<f64>) {
        let overlay = self.controller.overlay();
        overlay.set_viewport_width(width);
        overlay.sync_iframe();
    }

    /// Re-measures the iframe and repositions overlays. Returns the applied
    /// metrics as JSON, or `null` when there is nothing to sync.
    pub fn sync(&self) -> String {
        match self.controller.overlay().sync_iframe() {
            Some(metrics) => format!(
                r#"{{"height":{},"horizontalScrollbar":{}}}"#,
                metrics.height, metrics.horizontal_scrollbar
            ),
            None => "null".into(),
        }
    }

    /// A mouse press on a component overlay at host coordinates.
    #[wasm_bindgen(js_name = pressComponent)]
    pub fn press_component(&self, x: f64, y: f64, component: &str) -> Result<(), JsValue> {
        let id = known_component(component).map_err(|e| JsValue::from_str(&e))?;
        self.controller
            .press_component(Offset::new(x, y), id)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Applies a lock change reported by the CMS. Returns false for unknown
    /// containers.
    #[wasm_bindgen(js_name = setContainerLock)]
    pub fn set_container_lock(
        &self,
        container: &str,
        locked_by: Option<String>,
        locked_by_current_user: bool,
    ) -> bool {
        let Some(id) = ItemId::get(container) else {
            return false;
        };
        let changed = self.controller.model().borrow_mut().set_container_lock(
            id,
            locked_by,
            locked_by_current_user,
        );
        if changed {
            self.controller.overlay().sync_iframe();
        }
        changed
    }
}

/// Resolves a host-supplied id without interning unknown ones.
fn known_component(component: &str) -> Result<ItemId, String> {
    ItemId::get(component).ok_or_else(|| format!("unknown component `{component}`"))
}

fn console_error_panic_hook_setup() {
    #[cfg(target_arch = "wasm32")]
    {
        use std::sync::Once;
        static SET_HOOK: Once = Once::new();
        SET_HOOK.call_once(|| {
            std::panic::set_hook(Box::new(|info| {
                let msg = format!("channel editor panic: {info}");
                web_sys::console::error_1(&msg.into());
            }));
        });
    }
}

// ─── Standalone functions ────────────────────────────────────────────────

/// Parses page markup without an iframe. Returns JSON:
/// `{"page":{...},"warnings":["..."]}`.
#[wasm_bindgen(js_name = parseMarkup)]
pub fn parse_markup_to_json(markup: &str) -> String {
    let doc = MarkupDocument::parse(markup);
    let output = parse_page(&doc);
    let warnings: Vec<String> = output.warnings.iter().map(ToString::to_string).collect();
    serde_json::json!({
        "page": output.page.snapshot(),
        "warnings": warnings,
    })
    .to_string()
}

/// `off`, `error`, `warn`, `info`, `debug` or `trace`.
#[wasm_bindgen(js_name = setLogLevel)]
pub fn set_log_level(level: &str) {
    logger::init(logger::parse_level(level));
}
