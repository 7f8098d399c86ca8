//! Browser-side collaborators: resource injection, the host's channel
//! service, link rewriting and the dragula drag library.

use crate::frame::{BrowserDocument, CurrentFrame};
use ce_core::{DomNodeId, DragDirection};
use ce_editor::{
    ChannelError, ChannelService, DragCallbacks, DragError, DragLibrary, DragLibraryFactory,
    DropOutcome, FrameDocument, InjectError, LinkRewriter, ResourceInjector,
};
use futures::future::{self, FutureExt, LocalBoxFuture};
use js_sys::{Array, Function, Object, Promise, Reflect};
use std::rc::Rc;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{HtmlElement, HtmlLinkElement, HtmlScriptElement};

/// A function value from any realm; `instanceof Function` fails for
/// functions created inside the iframe.
fn function(value: JsValue) -> Option<Function> {
    value.is_function().then(|| value.unchecked_into())
}

/// Calls `target[name](...args)`.
fn call_method(target: &JsValue, name: &str, args: &[&JsValue]) -> Result<JsValue, JsValue> {
    let method = function(Reflect::get(target, &JsValue::from_str(name))?)
        .ok_or_else(|| JsValue::from_str(&format!("`{name}` is not a function")))?;
    let args: Array = args.iter().copied().collect();
    method.apply(target, &args)
}

fn describe(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

// ─── Injection ───────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Resource {
    Script,
    Stylesheet,
}

impl Resource {
    fn element(self, doc: &BrowserDocument, url: &str) -> Result<HtmlElement, JsValue> {
        let document = doc.document();
        match self {
            Resource::Script => {
                let script = document
                    .create_element("script")?
                    .unchecked_into::<HtmlScriptElement>();
                script.set_type("text/javascript");
                script.set_src(url);
                Ok(script.into())
            }
            Resource::Stylesheet => {
                let link = document
                    .create_element("link")?
                    .unchecked_into::<HtmlLinkElement>();
                link.set_rel("stylesheet");
                link.set_type("text/css");
                link.set_href(url);
                Ok(link.into())
            }
        }
    }
}

/// Appends `<script>` and `<link>` elements to the iframe's `<head>` and
/// resolves once the browser has loaded them.
pub struct ElementInjector {
    frame: CurrentFrame,
}

impl ElementInjector {
    pub fn new(frame: CurrentFrame) -> Self {
        Self { frame }
    }

    fn inject(
        &self,
        doc: &dyn FrameDocument,
        url: &str,
        resource: Resource,
    ) -> LocalBoxFuture<'static, Result<(), InjectError>> {
        let url = url.to_owned();
        let generation = doc.generation();
        let Some(browser) = self.frame.get(generation) else {
            return future::ready(Err(InjectError::Unloaded(url))).boxed_local();
        };
        let Some(head) = browser.document().head() else {
            return future::ready(Err(InjectError::NoHead)).boxed_local();
        };
        let element = match resource.element(&browser, &url) {
            Ok(element) => element,
            Err(err) => {
                let reason = describe(&err);
                return future::ready(Err(InjectError::LoadFailed { url, reason })).boxed_local();
            }
        };

        let loaded = Promise::new(&mut |resolve, reject| {
            element.set_onload(Some(&resolve));
            element.set_onerror(Some(&reject));
        });
        if let Err(err) = head.append_child(&element) {
            let reason = describe(&err);
            return future::ready(Err(InjectError::LoadFailed { url, reason })).boxed_local();
        }
        log::debug!("injecting {url} into {generation:?}");

        let frame = self.frame.clone();
        async move {
            let result = JsFuture::from(loaded).await;
            if frame.get(generation).is_none() {
                return Err(InjectError::Unloaded(url));
            }
            result.map(|_| ()).map_err(|_| InjectError::LoadFailed {
                url,
                reason: "load error".into(),
            })
        }
        .boxed_local()
    }
}

impl ResourceInjector for ElementInjector {
    fn inject_script(
        &self,
        doc: &dyn FrameDocument,
        url: &str,
    ) -> LocalBoxFuture<'static, Result<(), InjectError>> {
        self.inject(doc, url, Resource::Script)
    }

    fn inject_css(
        &self,
        doc: &dyn FrameDocument,
        url: &str,
    ) -> LocalBoxFuture<'static, Result<(), InjectError>> {
        self.inject(doc, url, Resource::Stylesheet)
    }
}

// ─── Channel service ─────────────────────────────────────────────────────

/// The host's channel service object: `getId()` and a promise-returning
/// `switchToChannel(id)`.
pub struct JsChannelService {
    service: JsValue,
}

impl JsChannelService {
    pub fn new(service: JsValue) -> Self {
        Self { service }
    }
}

impl ChannelService for JsChannelService {
    fn current_id(&self) -> String {
        match call_method(&self.service, "getId", &[]) {
            Ok(id) => id.as_string().unwrap_or_default(),
            Err(err) => {
                log::warn!("channel service has no id: {}", describe(&err));
                String::new()
            }
        }
    }

    fn switch_to_channel(&self, channel: &str) -> LocalBoxFuture<'static, Result<(), ChannelError>> {
        let channel = channel.to_owned();
        let started = call_method(
            &self.service,
            "switchToChannel",
            &[&JsValue::from_str(&channel)],
        );
        async move {
            let refused = |reason: String| ChannelError {
                channel: channel.clone(),
                reason,
            };
            let value = started.map_err(|err| refused(describe(&err)))?;
            let value = match value.dyn_into::<Promise>() {
                Ok(promise) => JsFuture::from(promise)
                    .await
                    .map_err(|err| refused(describe(&err)))?,
                Err(value) => value,
            };
            if value.as_bool() == Some(false) {
                return Err(refused("refused by host".into()));
            }
            Ok(())
        }
        .boxed_local()
    }
}

// ─── Links ───────────────────────────────────────────────────────────────

/// Hands each loaded iframe document to a host callback.
pub struct JsLinkRewriter {
    callback: Function,
    frame: CurrentFrame,
}

impl JsLinkRewriter {
    pub fn new(callback: Function, frame: CurrentFrame) -> Self {
        Self { callback, frame }
    }
}

impl LinkRewriter for JsLinkRewriter {
    fn rewrite_links(&self, doc: &dyn FrameDocument) {
        let Some(browser) = self.frame.get(doc.generation()) else {
            return;
        };
        if let Err(err) = self.callback.call1(&JsValue::NULL, browser.document()) {
            log::warn!("link rewriting failed: {}", describe(&err));
        }
    }
}

// ─── Dragula ─────────────────────────────────────────────────────────────

/// Builds `dragula(containers, options)` instances from the script the
/// engine injected into the iframe.
pub struct DragulaFactory {
    frame: CurrentFrame,
}

impl DragulaFactory {
    pub fn new(frame: CurrentFrame) -> Self {
        Self { frame }
    }
}

struct Bridge {
    doc: Rc<BrowserDocument>,
    callbacks: Rc<dyn DragCallbacks>,
}

impl Bridge {
    fn id(&self, value: &JsValue) -> Option<DomNodeId> {
        self.doc.id_of_value(value)
    }
}

impl DragLibraryFactory for DragulaFactory {
    fn create(
        &self,
        doc: &dyn FrameDocument,
        containers: &[DomNodeId],
        callbacks: Rc<dyn DragCallbacks>,
    ) -> Result<Box<dyn DragLibrary>, DragError> {
        let browser = self
            .frame
            .get(doc.generation())
            .ok_or(DragError::NoDocument)?;
        let dragula = Reflect::get(browser.window(), &JsValue::from_str("dragula"))
            .ok()
            .and_then(function)
            .ok_or_else(|| DragError::Library("dragula is not defined".into()))?;

        let elements: Array = containers
            .iter()
            .filter_map(|&id| browser.node(id))
            .collect();
        let direction = initial_direction(callbacks.as_ref(), containers);
        let bridge = Rc::new(Bridge {
            doc: browser,
            callbacks,
        });

        let options = Object::new();
        let b = Rc::clone(&bridge);
        let moves = Closure::<dyn FnMut(JsValue, JsValue) -> bool>::new(move |el, source| {
            match (b.id(&el), b.id(&source)) {
                (Some(el), Some(source)) => b.callbacks.moves(el, source),
                _ => false,
            }
        });
        let b = Rc::clone(&bridge);
        let accepts = Closure::<dyn FnMut(JsValue, JsValue, JsValue, JsValue) -> bool>::new(
            move |el, target, source, sibling| match (b.id(&el), b.id(&target), b.id(&source)) {
                (Some(el), Some(target), Some(source)) => {
                    b.callbacks.accepts(el, target, source, b.id(&sibling))
                }
                _ => false,
            },
        );
        set(&options, "moves", &moves.into_js_value())?;
        set(&options, "accepts", &accepts.into_js_value())?;
        set(&options, "direction", &JsValue::from_str(direction))?;

        let drake = dragula
            .call2(&JsValue::UNDEFINED, &elements, &options)
            .map_err(|err| DragError::Library(describe(&err)))?;

        let b = Rc::clone(&bridge);
        on(&drake, "drag", Closure::<dyn FnMut(JsValue, JsValue)>::new(move |el, source| {
            if let (Some(el), Some(source)) = (b.id(&el), b.id(&source)) {
                b.callbacks.on_drag_start(el, source);
            }
        }))?;
        let b = Rc::clone(&bridge);
        on(
            &drake,
            "cloned",
            Closure::<dyn FnMut(JsValue, JsValue, JsValue)>::new(move |clone: JsValue, original: JsValue, kind: JsValue| {
                if kind.as_string().as_deref() != Some("mirror") {
                    return;
                }
                if let (Some(mirror), Some(original)) = (b.id(&clone), b.id(&original)) {
                    b.callbacks.on_mirror_created(mirror, original);
                }
            }),
        )?;
        let b = Rc::clone(&bridge);
        let over_options = options.clone();
        on(&drake, "over", Closure::<dyn FnMut(JsValue, JsValue)>::new(move |el, container| {
            let (Some(el), Some(container)) = (b.id(&el), b.id(&container)) else {
                return;
            };
            if let Some(direction) = b.callbacks.on_drag_over(el, container) {
                let value = direction_name(direction);
                let _ = Reflect::set(&over_options, &"direction".into(), &value.into());
            }
        }))?;
        let b = Rc::clone(&bridge);
        on(&drake, "dragend", Closure::<dyn FnMut(JsValue)>::new(move |el| {
            if let Some(el) = b.id(&el) {
                b.callbacks.on_drag_end(el);
            }
        }))?;
        let b = bridge;
        on(
            &drake,
            "drop",
            Closure::<dyn FnMut(JsValue, JsValue, JsValue, JsValue)>::new(
                move |el, target, source, sibling| {
                    let (Some(el), Some(target), Some(source)) =
                        (b.id(&el), b.id(&target), b.id(&source))
                    else {
                        log::warn!("drop outside the known document ignored");
                        return;
                    };
                    if b.callbacks.on_drop(el, target, source, b.id(&sibling))
                        == DropOutcome::Rejected
                    {
                        log::debug!("drop of {el:?} rejected after the element moved");
                    }
                },
            ),
        )?;

        log::debug!("dragula bound to {} containers", elements.length());
        Ok(Box::new(DragulaInstance { drake }))
    }
}

fn direction_name(direction: DragDirection) -> &'static str {
    match direction {
        DragDirection::Vertical => "vertical",
        DragDirection::Horizontal => "horizontal",
    }
}

/// Axis of the first bound container, used until the first `over` event.
fn initial_direction(callbacks: &dyn DragCallbacks, containers: &[DomNodeId]) -> &'static str {
    containers
        .first()
        .and_then(|&first| callbacks.on_drag_over(first, first))
        .map(direction_name)
        .unwrap_or("vertical")
}

fn set(target: &Object, key: &str, value: &JsValue) -> Result<(), DragError> {
    Reflect::set(target, &JsValue::from_str(key), value)
        .map(|_| ())
        .map_err(|err| DragError::Library(describe(&err)))
}

fn on<F: ?Sized + wasm_bindgen::closure::WasmClosure>(
    drake: &JsValue,
    event: &str,
    handler: Closure<F>,
) -> Result<(), DragError> {
    call_method(drake, "on", &[&JsValue::from_str(event), &handler.into_js_value()])
        .map(|_| ())
        .map_err(|err| DragError::Library(describe(&err)))
}

struct DragulaInstance {
    drake: JsValue,
}

impl DragLibrary for DragulaInstance {
    fn is_dragging(&self) -> bool {
        Reflect::get(&self.drake, &JsValue::from_str("dragging"))
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    fn cancel(&self, revert: bool) {
        if let Err(err) = call_method(&self.drake, "cancel", &[&JsValue::from_bool(revert)]) {
            log::warn!("dragula cancel failed: {}", describe(&err));
        }
    }

    fn destroy(&self) {
        if let Err(err) = call_method(&self.drake, "destroy", &[]) {
            log::warn!("dragula destroy failed: {}", describe(&err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Reports every container as laid out along `axis`.
    struct Axis(DragDirection);

    impl DragCallbacks for Axis {
        fn moves(&self, _: DomNodeId, _: DomNodeId) -> bool {
            true
        }

        fn accepts(&self, _: DomNodeId, _: DomNodeId, _: DomNodeId, _: Option<DomNodeId>) -> bool {
            true
        }

        fn on_drag_start(&self, _: DomNodeId, _: DomNodeId) {}

        fn on_mirror_created(&self, _: DomNodeId, _: DomNodeId) {}

        fn on_drag_over(&self, _: DomNodeId, _: DomNodeId) -> Option<DragDirection> {
            Some(self.0)
        }

        fn on_drag_end(&self, _: DomNodeId) {}

        fn on_drop(&self, _: DomNodeId, _: DomNodeId, _: DomNodeId, _: Option<DomNodeId>) -> DropOutcome {
            DropOutcome::Accepted
        }
    }

    #[test]
    fn direction_seeded_from_first_container() {
        let sidebar = [DomNodeId::new(4)];
        assert_eq!(
            initial_direction(&Axis(DragDirection::Horizontal), &sidebar),
            "horizontal"
        );
        assert_eq!(
            initial_direction(&Axis(DragDirection::Vertical), &sidebar),
            "vertical"
        );
        assert_eq!(initial_direction(&Axis(DragDirection::Horizontal), &[]), "vertical");
    }
}
