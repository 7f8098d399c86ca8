//! Integration tests: rendered markup → page model.
//!
//! Exercises the full `ce-core` pipeline: markup → DOM tree → structural
//! comments → page model lookups.

use ce_core::id::ItemId;
use ce_core::markup::MarkupDocument;
use ce_core::model::{DragDirection, PageModel};
use ce_core::parser::parse_page;
use pretty_assertions::assert_eq;

const PAGE: &str = include_str!("fixtures/channel_page.html");

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn fixture_page_parses_without_warnings() {
    init_logging();
    let doc = MarkupDocument::parse(PAGE);
    let out = parse_page(&doc);
    assert!(out.warnings.is_empty(), "{:?}", out.warnings);

    let ids: Vec<_> = out.page.containers().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["header", "main", "aside"]);

    let meta = out.page.meta();
    assert_eq!(meta.channel_id.as_deref(), Some("example-preview"));
    assert_eq!(meta.page_id.as_deref(), Some("home"));
    assert_eq!(meta.mount_id.as_deref(), Some("m-1"));

    let main: Vec<_> = out
        .page
        .components(ItemId::intern("main"))
        .iter()
        .map(|c| c.id.as_str())
        .collect();
    assert_eq!(main, vec!["banner", "news"]);

    let aside = out.page.container(ItemId::intern("aside")).unwrap();
    assert_eq!(aside.drag_direction, DragDirection::Horizontal);
    assert!(out.page.components(ItemId::intern("aside")).is_empty());
}

#[test]
fn parsing_twice_is_idempotent() {
    let doc = MarkupDocument::parse(PAGE);
    let mut model = PageModel::new();

    model.parse(&doc);
    let first = model.page().unwrap().snapshot();
    let first_boxes: Vec<_> = model
        .get_containers()
        .iter()
        .map(|c| (c.id, c.box_element))
        .collect();

    model.parse(&doc);
    let second = model.page().unwrap().snapshot();
    let second_boxes: Vec<_> = model
        .get_containers()
        .iter()
        .map(|c| (c.id, c.box_element))
        .collect();

    assert_eq!(first, second);
    assert_eq!(first_boxes, second_boxes);
}

#[test]
fn element_lookups_resolve_box_elements_only() {
    let doc = MarkupDocument::parse(PAGE);
    let mut model = PageModel::new();
    model.parse(&doc);

    let banner_box = doc.element_by_id("banner-box").unwrap();
    let main_box = doc.element_by_id("main-box").unwrap();
    assert_eq!(
        model.get_component_by_iframe_element(banner_box).map(|c| c.id),
        Some(ItemId::intern("banner"))
    );
    assert_eq!(
        model.get_container_by_iframe_element(main_box).map(|c| c.id),
        Some(ItemId::intern("main"))
    );

    // Inner content of a box is not itself a box.
    let heading = doc
        .elements()
        .find(|&el| doc.tag(el) == Some("h1"))
        .unwrap();
    assert!(model.get_component_by_iframe_element(heading).is_none());
    assert!(model.get_container_by_iframe_element(heading).is_none());
}

#[test]
fn moves_survive_until_next_parse() {
    let doc = MarkupDocument::parse(PAGE);
    let mut model = PageModel::new();
    model.parse(&doc);

    model
        .move_component(ItemId::intern("news"), ItemId::intern("aside"), None)
        .unwrap();
    assert_eq!(model.page().unwrap().components(ItemId::intern("aside")).len(), 1);

    // Header is inherited: nothing moves in.
    assert!(
        model
            .move_component(ItemId::intern("banner"), ItemId::intern("header"), None)
            .is_err()
    );

    // A fresh parse rebuilds from markup; in-memory moves are gone.
    model.parse(&doc);
    assert!(model.page().unwrap().components(ItemId::intern("aside")).is_empty());
}

#[test]
fn snapshot_serializes_camel_case() {
    let doc = MarkupDocument::parse(PAGE);
    let out = parse_page(&doc);
    let json = serde_json::to_value(out.page.snapshot()).unwrap();
    assert_eq!(json["meta"]["channelId"], "example-preview");
    assert_eq!(json["containers"][0]["disabled"], true);
    assert_eq!(json["containers"][1]["components"][0]["renderVariant"], "wide");
    assert_eq!(json["containers"][2]["dragDirection"], "horizontal");
}
