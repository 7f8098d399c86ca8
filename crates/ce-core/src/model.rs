//! Page model: the container/component tree recovered from one rendered page.
//!
//! The tree is a petgraph DAG rooted at the page: edges go page → container →
//! component. Edges give the owning-container back-reference; the explicit
//! child order lists give document order. Box elements are opaque
//! [`DomNodeId`] handles into the iframe document that was parsed; the whole
//! [`Page`] is dropped and rebuilt on every iframe load, so no handle outlives
//! its document.

use crate::dom::{DomNodeId, DomTree};
use crate::id::ItemId;
use crate::parser::{ParseWarning, parse_page};
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use thiserror::Error;

// ─── Items ───────────────────────────────────────────────────────────────

/// Axis along which a container's components are laid out and reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DragDirection {
    #[default]
    Vertical,
    Horizontal,
}

/// Data announced by the `page-meta` structural comment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub channel_id: Option<String>,
    pub page_id: Option<String>,
    pub path_info: Option<String>,
    pub mount_id: Option<String>,
}

/// An editable drop-target region.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub id: ItemId,
    pub label: Option<String>,
    pub drag_direction: DragDirection,
    /// Defined in an inherited configuration, so not editable in this channel.
    pub inherited: bool,
    pub locked_by: Option<String>,
    pub locked_by_current_user: bool,
    pub last_modified: Option<i64>,
    pub box_element: DomNodeId,
}

impl Container {
    /// Inherited containers and containers locked by someone else are
    /// read-only: nothing may be dragged out of or dropped into them.
    pub fn is_disabled(&self) -> bool {
        self.inherited || (self.locked_by.is_some() && !self.locked_by_current_user)
    }
}

/// The smallest placeable unit inside a container.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub id: ItemId,
    pub label: Option<String>,
    pub last_modified: Option<i64>,
    pub render_variant: Option<String>,
    pub box_element: DomNodeId,
}

#[derive(Debug, Clone)]
pub enum PageNode {
    Root,
    Container(Container),
    Component(Component),
}

// ─── Errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("no page has been parsed")]
    NothingParsed,
    #[error("unknown component `{0}`")]
    UnknownComponent(ItemId),
    #[error("unknown container `{0}`")]
    UnknownContainer(ItemId),
    #[error("container `{0}` is disabled")]
    ContainerDisabled(ItemId),
    #[error("component `{sibling}` is not in container `{container}`")]
    SiblingNotInContainer { sibling: ItemId, container: ItemId },
}

// ─── Page ────────────────────────────────────────────────────────────────

/// One parsed document.
#[derive(Debug, Clone)]
pub struct Page {
    graph: StableDiGraph<PageNode, ()>,
    root: NodeIndex,
    meta: PageMeta,
    child_order: HashMap<NodeIndex, SmallVec<[NodeIndex; 8]>>,
    id_index: HashMap<ItemId, NodeIndex>,
    container_elements: HashMap<DomNodeId, NodeIndex>,
    component_elements: HashMap<DomNodeId, NodeIndex>,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    #[must_use]
    pub fn new() -> Self {
        let mut graph = StableDiGraph::new();
        let root = graph.add_node(PageNode::Root);
        Self {
            graph,
            root,
            meta: PageMeta::default(),
            child_order: HashMap::new(),
            id_index: HashMap::new(),
            container_elements: HashMap::new(),
            component_elements: HashMap::new(),
        }
    }

    pub fn meta(&self) -> &PageMeta {
        &self.meta
    }

    pub fn set_meta(&mut self, meta: PageMeta) {
        self.meta = meta;
    }

    pub fn contains_id(&self, id: ItemId) -> bool {
        self.id_index.contains_key(&id)
    }

    /// Append a container after all existing ones.
    pub fn add_container(&mut self, container: Container) -> NodeIndex {
        let id = container.id;
        let element = container.box_element;
        let idx = self.graph.add_node(PageNode::Container(container));
        self.link(self.root, idx);
        self.id_index.insert(id, idx);
        self.container_elements.insert(element, idx);
        idx
    }

    /// Append a component at the end of `container`.
    /// Returns `None` if `container` is not a container of this page.
    pub fn add_component(&mut self, container: NodeIndex, component: Component) -> Option<NodeIndex> {
        if !matches!(self.graph.node_weight(container), Some(PageNode::Container(_))) {
            return None;
        }
        let id = component.id;
        let element = component.box_element;
        let idx = self.graph.add_node(PageNode::Component(component));
        self.link(container, idx);
        self.id_index.insert(id, idx);
        self.component_elements.insert(element, idx);
        Some(idx)
    }

    fn link(&mut self, parent: NodeIndex, child: NodeIndex) {
        self.graph.add_edge(parent, child, ());
        self.child_order.entry(parent).or_default().push(child);
    }

    fn children(&self, idx: NodeIndex) -> &[NodeIndex] {
        self.child_order.get(&idx).map(|c| c.as_slice()).unwrap_or(&[])
    }

    fn parent(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .neighbors_directed(idx, petgraph::Direction::Incoming)
            .next()
    }

    fn container_at(&self, idx: NodeIndex) -> Option<&Container> {
        match self.graph.node_weight(idx)? {
            PageNode::Container(c) => Some(c),
            _ => None,
        }
    }

    fn component_at(&self, idx: NodeIndex) -> Option<&Component> {
        match self.graph.node_weight(idx)? {
            PageNode::Component(c) => Some(c),
            _ => None,
        }
    }

    /// Containers in document order.
    pub fn containers(&self) -> impl Iterator<Item = &Container> + '_ {
        self.children(self.root)
            .iter()
            .filter_map(|&idx| self.container_at(idx))
    }

    /// Components of `container` in document order (empty if unknown).
    pub fn components(&self, container: ItemId) -> Vec<&Component> {
        self.id_index
            .get(&container)
            .map(|&idx| {
                self.children(idx)
                    .iter()
                    .filter_map(|&c| self.component_at(c))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn container(&self, id: ItemId) -> Option<&Container> {
        self.id_index.get(&id).and_then(|&idx| self.container_at(idx))
    }

    pub fn component(&self, id: ItemId) -> Option<&Component> {
        self.id_index.get(&id).and_then(|&idx| self.component_at(idx))
    }

    /// The container currently owning `component`.
    pub fn container_of(&self, component: ItemId) -> Option<&Container> {
        let idx = *self.id_index.get(&component)?;
        self.component_at(idx)?;
        self.parent(idx).and_then(|p| self.container_at(p))
    }

    pub fn container_by_element(&self, element: DomNodeId) -> Option<&Container> {
        self.container_elements
            .get(&element)
            .and_then(|&idx| self.container_at(idx))
    }

    pub fn component_by_element(&self, element: DomNodeId) -> Option<&Component> {
        self.component_elements
            .get(&element)
            .and_then(|&idx| self.component_at(idx))
    }

    pub fn component_count(&self) -> usize {
        self.component_elements.len()
    }

    /// Move `component` into `target`, before `before` or at the end.
    ///
    /// Everything is validated before anything is touched, so on error both
    /// containers are exactly as they were.
    pub fn move_component(
        &mut self,
        component: ItemId,
        target: ItemId,
        before: Option<ItemId>,
    ) -> Result<(), ModelError> {
        let comp_idx = self
            .id_index
            .get(&component)
            .copied()
            .filter(|&idx| self.component_at(idx).is_some())
            .ok_or(ModelError::UnknownComponent(component))?;
        let source_idx = self
            .parent(comp_idx)
            .ok_or(ModelError::UnknownComponent(component))?;
        let source = self
            .container_at(source_idx)
            .ok_or(ModelError::UnknownComponent(component))?;
        let target_idx = self
            .id_index
            .get(&target)
            .copied()
            .filter(|&idx| self.container_at(idx).is_some())
            .ok_or(ModelError::UnknownContainer(target))?;

        if source.is_disabled() {
            return Err(ModelError::ContainerDisabled(source.id));
        }
        if self.container_at(target_idx).is_some_and(Container::is_disabled) {
            return Err(ModelError::ContainerDisabled(target));
        }

        let before_idx = match before {
            Some(sibling) => {
                let idx = self
                    .id_index
                    .get(&sibling)
                    .copied()
                    .filter(|&idx| {
                        self.component_at(idx).is_some() && self.parent(idx) == Some(target_idx)
                    })
                    .ok_or(ModelError::SiblingNotInContainer {
                        sibling,
                        container: target,
                    })?;
                Some(idx)
            }
            None => None,
        };

        // Validated; from here on nothing can fail.
        let old_pos = self.children(source_idx).iter().position(|&c| c == comp_idx);
        if let Some(order) = self.child_order.get_mut(&source_idx) {
            order.retain(|c| *c != comp_idx);
        }
        if let Some(edge) = self.graph.find_edge(source_idx, comp_idx) {
            self.graph.remove_edge(edge);
        }

        let order = self.child_order.entry(target_idx).or_default();
        let pos = match before_idx {
            Some(b) if b == comp_idx => old_pos.unwrap_or(order.len()),
            Some(b) => order.iter().position(|&c| c == b).unwrap_or(order.len()),
            None => order.len(),
        };
        order.insert(pos.min(order.len()), comp_idx);
        self.graph.add_edge(target_idx, comp_idx, ());

        log::debug!(
            "moved component {} into {} (before {:?})",
            component,
            target,
            before
        );
        Ok(())
    }

    /// Update the lock state of a container. Returns `false` if unknown.
    pub fn set_container_lock(
        &mut self,
        container: ItemId,
        locked_by: Option<String>,
        locked_by_current_user: bool,
    ) -> bool {
        let Some(&idx) = self.id_index.get(&container) else {
            return false;
        };
        match self.graph.node_weight_mut(idx) {
            Some(PageNode::Container(c)) => {
                c.locked_by = locked_by;
                c.locked_by_current_user = locked_by_current_user;
                true
            }
            _ => false,
        }
    }

    /// Serializable view of the tree for the host UI.
    pub fn snapshot(&self) -> PageSnapshot {
        PageSnapshot {
            meta: self.meta.clone(),
            containers: self
                .containers()
                .map(|c| ContainerSnapshot {
                    id: c.id,
                    label: c.label.clone(),
                    disabled: c.is_disabled(),
                    drag_direction: c.drag_direction,
                    components: self
                        .components(c.id)
                        .into_iter()
                        .map(|comp| ComponentSnapshot {
                            id: comp.id,
                            label: comp.label.clone(),
                            render_variant: comp.render_variant.clone(),
                            last_modified: comp.last_modified,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

// ─── Snapshot ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub meta: PageMeta,
    pub containers: Vec<ContainerSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSnapshot {
    pub id: ItemId,
    pub label: Option<String>,
    pub disabled: bool,
    pub drag_direction: DragDirection,
    pub components: Vec<ComponentSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSnapshot {
    pub id: ItemId,
    pub label: Option<String>,
    pub render_variant: Option<String>,
    pub last_modified: Option<i64>,
}

// ─── Page model ──────────────────────────────────────────────────────────

/// Registry of the currently parsed page.
///
/// Empty until the first parse, and emptied again on every iframe unload.
#[derive(Debug, Default)]
pub struct PageModel {
    page: Option<Page>,
}

impl PageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear, then parse `doc` into a fresh page.
    pub fn parse(&mut self, doc: &dyn DomTree) -> Vec<ParseWarning> {
        self.clear_parsed_elements();
        let output = parse_page(doc);
        self.page = Some(output.page);
        output.warnings
    }

    pub fn page(&self) -> Option<&Page> {
        self.page.as_ref()
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.page.as_ref()?.meta.channel_id.as_deref()
    }

    pub fn get_containers(&self) -> Vec<&Container> {
        self.page
            .as_ref()
            .map(|p| p.containers().collect())
            .unwrap_or_default()
    }

    pub fn get_container(&self, id: ItemId) -> Option<&Container> {
        self.page.as_ref()?.container(id)
    }

    pub fn get_component(&self, id: ItemId) -> Option<&Component> {
        self.page.as_ref()?.component(id)
    }

    /// The container currently holding `component`.
    pub fn container_of(&self, component: ItemId) -> Option<&Container> {
        self.page.as_ref()?.container_of(component)
    }

    /// Components of `container` in document order; empty when unknown.
    pub fn components_of(&self, container: ItemId) -> Vec<&Component> {
        self.page
            .as_ref()
            .map(|p| p.components(container))
            .unwrap_or_default()
    }

    pub fn get_container_by_iframe_element(&self, element: DomNodeId) -> Option<&Container> {
        self.page.as_ref()?.container_by_element(element)
    }

    pub fn get_component_by_iframe_element(&self, element: DomNodeId) -> Option<&Component> {
        self.page.as_ref()?.component_by_element(element)
    }

    pub fn move_component(
        &mut self,
        component: ItemId,
        target: ItemId,
        before: Option<ItemId>,
    ) -> Result<(), ModelError> {
        self.page
            .as_mut()
            .ok_or(ModelError::NothingParsed)?
            .move_component(component, target, before)
    }

    pub fn set_container_lock(
        &mut self,
        container: ItemId,
        locked_by: Option<String>,
        locked_by_current_user: bool,
    ) -> bool {
        self.page
            .as_mut()
            .is_some_and(|p| p.set_container_lock(container, locked_by, locked_by_current_user))
    }

    pub fn clear_parsed_elements(&mut self) {
        self.page = None;
    }
}
