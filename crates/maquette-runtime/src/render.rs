#![forbid(unsafe_code)]

//! Rendering with per-node containment.
//!
//! Every logical node renders inside its own boundary: a panic thrown
//! while rendering that node's subtree is caught at the boundary, recorded
//! as the node's [`RuntimeError`], and replaced by an inline error marker;
//! sibling and ancestor nodes are unaffected.
//!
//! Two markers attribute rendered output back to logical nodes without
//! leaking node identity into committed markup:
//!
//! - [`NodeBoundary`] - the outer containment wrapper, carrying the node
//!   id and the render result;
//! - [`NodeHost`] - the inner marker directly wrapping the node's real
//!   rendered element, the unambiguous anchor for geometry measurement.

use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};

use indexmap::IndexMap;
use maquette_bindings::PageViewState;
use maquette_core::{FlowDirection, NodeId, RuntimeError, SlotType};
use maquette_dom::{AppDom, AppDomNode, DomResult, NodeKind};
use serde_json::Value;
use tracing::{debug, warn};

use crate::component::{ComponentRegistry, RenderScope};
use crate::events::{self, EventSink};

/// A node in the rendered output tree.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedNode {
    /// A host element, committed to the page.
    Element(RenderedElement),
    /// Text content.
    Text(String),
    /// A transparent grouping of siblings.
    Fragment(Vec<RenderedNode>),
    /// Outer per-node containment wrapper. Never committed to markup.
    Boundary(NodeBoundary),
    /// Inner per-node marker. Never committed to markup.
    Host(NodeHost),
    /// A slot marker produced by `Placeholder`/`Slots`.
    Slot(SlotMarker),
}

impl RenderedNode {
    /// Convenience element constructor.
    pub fn element(
        tag: impl Into<String>,
        attrs: IndexMap<String, Value>,
        children: Vec<RenderedNode>,
    ) -> Self {
        Self::Element(RenderedElement {
            tag: tag.into(),
            attrs,
            children,
        })
    }

    /// Convenience text constructor.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// An element as a host renderer would commit it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedElement {
    /// Element tag.
    pub tag: String,
    /// Element attributes.
    pub attrs: IndexMap<String, Value>,
    /// Child content.
    pub children: Vec<RenderedNode>,
}

/// The outer boundary around one node's rendered subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeBoundary {
    /// The logical node this boundary belongs to.
    pub node_id: NodeId,
    /// The contained render result: the host-wrapped content, or the
    /// error caught at this boundary.
    pub result: Result<Box<RenderedNode>, RuntimeError>,
}

/// The inner marker directly wrapping a node's real rendered element.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeHost {
    /// The logical node.
    pub node_id: NodeId,
    /// The node's actual rendered output.
    pub child: Box<RenderedNode>,
}

/// A slot marker: where children of a named slot live in rendered output.
///
/// An empty marker is an insertion placeholder for the editor.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotMarker {
    /// The node owning the slot.
    pub parent_id: NodeId,
    /// Slot name.
    pub prop: String,
    /// Arity of the slot.
    pub slot_type: SlotType,
    /// Flow direction of children.
    pub direction: FlowDirection,
    /// Rendered children, in sibling order.
    pub children: Vec<RenderedNode>,
}

/// Renders one page of a document against resolved live state.
pub struct PageRenderer<'a> {
    dom: &'a AppDom,
    registry: &'a ComponentRegistry,
    state: &'a PageViewState,
    sink: &'a EventSink,
}

impl<'a> PageRenderer<'a> {
    /// Renderer reporting events to the process-wide sink.
    pub fn new(
        dom: &'a AppDom,
        registry: &'a ComponentRegistry,
        state: &'a PageViewState,
    ) -> Self {
        Self::with_sink(dom, registry, state, events::global())
    }

    /// Renderer reporting events to an explicit sink.
    pub fn with_sink(
        dom: &'a AppDom,
        registry: &'a ComponentRegistry,
        state: &'a PageViewState,
        sink: &'a EventSink,
    ) -> Self {
        Self {
            dom,
            registry,
            state,
            sink,
        }
    }

    /// Render every element on the page.
    pub fn render(&self, page: NodeId) -> DomResult<ViewTree> {
        self.dom.get_node_of_kind(page, NodeKind::Page)?;
        let roots = self
            .dom
            .child_nodes(page, "children")
            .into_iter()
            .map(|child| self.render_node(child))
            .collect();
        Ok(ViewTree {
            page_id: page,
            roots,
        })
    }

    fn render_node(&self, node: &AppDomNode) -> RenderedNode {
        let node_id = node.id;
        let component_type = node.component_type().unwrap_or_default();
        let Some(component) = self.registry.get(component_type) else {
            return RenderedNode::Boundary(NodeBoundary {
                node_id,
                result: Err(RuntimeError::new(format!(
                    "unknown component {component_type:?}"
                ))),
            });
        };

        // Children grouped by slot; slots the component does not declare
        // are dropped with a warning rather than rendered somewhere wrong.
        let declared: HashSet<String> = component
            .slots()
            .into_iter()
            .map(|slot| slot.name)
            .collect();
        let mut children: IndexMap<String, Vec<RenderedNode>> = IndexMap::new();
        for (prop, group) in self.dom.get_children(node_id) {
            if !declared.contains(&prop) {
                warn!(node = %node_id, slot = prop.as_str(), "dropping children of undeclared slot");
                continue;
            }
            children.insert(
                prop,
                group.into_iter().map(|child| self.render_node(child)).collect(),
            );
        }

        let props = self
            .state
            .nodes
            .get(&node_id)
            .map(|info| info.props.clone())
            .unwrap_or_default();
        let mut scope = RenderScope::new(node_id, &node.name, &props, &children, self.sink);
        match catch_unwind(AssertUnwindSafe(|| component.render(&mut scope))) {
            Ok(output) => RenderedNode::Boundary(NodeBoundary {
                node_id,
                result: Ok(Box::new(RenderedNode::Host(NodeHost {
                    node_id,
                    child: Box::new(output),
                }))),
            }),
            Err(payload) => {
                let error = RuntimeError::from_panic(payload);
                debug!(node = %node_id, %error, "render panic contained at node boundary");
                RenderedNode::Boundary(NodeBoundary {
                    node_id,
                    result: Err(error),
                })
            }
        }
    }
}

/// The rendered output of one page, with marker-aware queries.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewTree {
    /// The rendered page.
    pub page_id: NodeId,
    /// Rendered top-level elements, in sibling order.
    pub roots: Vec<RenderedNode>,
}

impl ViewTree {
    /// The boundary of a node, if the node rendered.
    pub fn boundary_of(&self, node_id: NodeId) -> Option<&NodeBoundary> {
        self.walk(&mut |node| match node {
            RenderedNode::Boundary(boundary) if boundary.node_id == node_id => Some(boundary),
            _ => None,
        })
    }

    /// The single nearest host marker for a node.
    pub fn host_of(&self, node_id: NodeId) -> Option<&NodeHost> {
        self.walk(&mut |node| match node {
            RenderedNode::Host(host) if host.node_id == node_id => Some(host),
            _ => None,
        })
    }

    /// The error caught at a node's boundary, if any.
    pub fn node_error(&self, node_id: NodeId) -> Option<&RuntimeError> {
        match &self.boundary_of(node_id)?.result {
            Ok(_) => None,
            Err(error) => Some(error),
        }
    }

    /// All slot markers owned by a node.
    pub fn slot_markers_of(&self, parent_id: NodeId) -> Vec<&SlotMarker> {
        let mut out = Vec::new();
        self.walk(&mut |node| -> Option<()> {
            if let RenderedNode::Slot(marker) = node {
                if marker.parent_id == parent_id {
                    out.push(marker);
                }
            }
            None
        });
        out
    }

    /// The markup a host renderer would commit: all markers stripped,
    /// failed boundaries replaced by inline error markers. Node identity
    /// never appears in the result.
    pub fn committed(&self) -> Vec<RenderedNode> {
        let mut out = Vec::new();
        for root in &self.roots {
            strip_markers(root, &mut out);
        }
        out
    }

    fn walk<'t, T>(&'t self, visit: &mut impl FnMut(&'t RenderedNode) -> Option<T>) -> Option<T> {
        fn go<'t, T>(
            node: &'t RenderedNode,
            visit: &mut impl FnMut(&'t RenderedNode) -> Option<T>,
        ) -> Option<T> {
            if let Some(found) = visit(node) {
                return Some(found);
            }
            match node {
                RenderedNode::Element(element) => {
                    element.children.iter().find_map(|child| go(child, visit))
                }
                RenderedNode::Text(_) => None,
                RenderedNode::Fragment(children) => {
                    children.iter().find_map(|child| go(child, visit))
                }
                RenderedNode::Boundary(boundary) => match &boundary.result {
                    Ok(content) => go(content, visit),
                    Err(_) => None,
                },
                RenderedNode::Host(host) => go(&host.child, visit),
                RenderedNode::Slot(marker) => {
                    marker.children.iter().find_map(|child| go(child, visit))
                }
            }
        }
        self.roots.iter().find_map(|root| go(root, visit))
    }
}

fn strip_markers(node: &RenderedNode, out: &mut Vec<RenderedNode>) {
    match node {
        RenderedNode::Element(element) => {
            let mut children = Vec::new();
            for child in &element.children {
                strip_markers(child, &mut children);
            }
            out.push(RenderedNode::Element(RenderedElement {
                tag: element.tag.clone(),
                attrs: element.attrs.clone(),
                children,
            }));
        }
        RenderedNode::Text(text) => out.push(RenderedNode::Text(text.clone())),
        RenderedNode::Fragment(children) => {
            for child in children {
                strip_markers(child, out);
            }
        }
        RenderedNode::Boundary(boundary) => match &boundary.result {
            Ok(content) => strip_markers(content, out),
            Err(error) => out.push(error_marker(error)),
        },
        RenderedNode::Host(host) => strip_markers(&host.child, out),
        RenderedNode::Slot(marker) => {
            for child in &marker.children {
                strip_markers(child, out);
            }
        }
    }
}

/// Inline visual marker rendered in place of a failed node's content.
fn error_marker(error: &RuntimeError) -> RenderedNode {
    RenderedNode::element(
        "span",
        IndexMap::from([("class".to_string(), Value::String("node-error".to_string()))]),
        vec![RenderedNode::text(format!("Error: {}", error.message))],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, ComponentSlot};
    use maquette_bindings::{Resolver, Sources};
    use maquette_dom::{BindableAttrValue, NodePartial};
    use serde_json::json;

    struct Text;

    impl Component for Text {
        fn render(&self, scope: &mut RenderScope<'_>) -> RenderedNode {
            RenderedNode::element(
                "span",
                IndexMap::new(),
                vec![RenderedNode::text(
                    scope.prop("value").as_str().unwrap_or_default(),
                )],
            )
        }
    }

    struct Stack;

    impl Component for Stack {
        fn slots(&self) -> Vec<ComponentSlot> {
            vec![ComponentSlot::multiple("children", FlowDirection::Column)]
        }

        fn render(&self, scope: &mut RenderScope<'_>) -> RenderedNode {
            RenderedNode::element(
                "div",
                IndexMap::new(),
                vec![scope.slots("children", FlowDirection::Column)],
            )
        }
    }

    struct Exploding;

    impl Component for Exploding {
        fn render(&self, _scope: &mut RenderScope<'_>) -> RenderedNode {
            panic!("component exploded");
        }
    }

    fn registry() -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        registry.register("Text", Text);
        registry.register("Stack", Stack);
        registry.register("Exploding", Exploding);
        registry
    }

    struct Fixture {
        dom: AppDom,
        page: NodeId,
    }

    impl Fixture {
        fn new() -> Self {
            let dom = AppDom::new("app");
            let page = dom
                .create_node(NodeKind::Page, NodePartial::new().name("page1"))
                .unwrap();
            let page_id = page.id;
            let dom = dom.add_node(page, dom.root(), "pages", None).unwrap();
            Self { dom, page: page_id }
        }

        fn add(&mut self, parent: NodeId, prop: &str, component: &str, value: Value) -> NodeId {
            let mut node = self.dom.create_element(component, []);
            node.namespaces
                .entry("props".to_string())
                .or_default()
                .insert("value".to_string(), BindableAttrValue::Const { value });
            let id = node.id;
            self.dom = self.dom.add_node(node, parent, prop, None).unwrap();
            id
        }

        fn render(&self) -> (ViewTree, PageViewState) {
            let mut resolver = Resolver::new();
            let state = resolver
                .evaluate(&self.dom, self.page, &Sources::new())
                .clone();
            let registry = registry();
            let sink = EventSink::new();
            let renderer = PageRenderer::with_sink(&self.dom, &registry, &state, &sink);
            (renderer.render(self.page).unwrap(), state)
        }
    }

    #[test]
    fn healthy_node_is_boundary_host_content() {
        let mut fx = Fixture::new();
        let id = fx.add(fx.page, "children", "Text", json!("hello"));
        let (tree, _) = fx.render();

        let boundary = tree.boundary_of(id).unwrap();
        let content = boundary.result.as_ref().unwrap();
        let RenderedNode::Host(host) = content.as_ref() else {
            panic!("boundary must wrap a host marker");
        };
        assert_eq!(host.node_id, id);
        assert!(matches!(host.child.as_ref(), RenderedNode::Element(el) if el.tag == "span"));
    }

    #[test]
    fn panic_is_contained_to_the_node() {
        let mut fx = Fixture::new();
        let good = fx.add(fx.page, "children", "Text", json!("ok"));
        let bad = fx.add(fx.page, "children", "Exploding", json!(null));
        let (tree, _) = fx.render();

        assert!(tree.node_error(good).is_none());
        let error = tree.node_error(bad).unwrap();
        assert_eq!(error.message, "component exploded");
        // The healthy sibling still rendered.
        assert!(tree.host_of(good).is_some());
        // The failed node has no host marker.
        assert!(tree.host_of(bad).is_none());
    }

    #[test]
    fn unknown_component_is_a_node_error() {
        let mut fx = Fixture::new();
        let id = fx.add(fx.page, "children", "Mystery", json!(null));
        let (tree, _) = fx.render();
        let error = tree.node_error(id).unwrap();
        assert!(error.message.contains("Mystery"));
    }

    #[test]
    fn nested_hosts_resolve_unambiguously() {
        let mut fx = Fixture::new();
        let outer = fx.add(fx.page, "children", "Stack", json!(null));
        let inner = fx.add(outer, "children", "Stack", json!(null));
        let leaf = fx.add(inner, "children", "Text", json!("deep"));
        let (tree, _) = fx.render();

        assert_eq!(tree.host_of(outer).unwrap().node_id, outer);
        assert_eq!(tree.host_of(inner).unwrap().node_id, inner);
        assert_eq!(tree.host_of(leaf).unwrap().node_id, leaf);
    }

    #[test]
    fn committed_markup_carries_no_node_identity() {
        let mut fx = Fixture::new();
        let outer = fx.add(fx.page, "children", "Stack", json!(null));
        let leaf = fx.add(outer, "children", "Text", json!("content"));
        let (tree, _) = fx.render();

        let committed = tree.committed();
        let debug = format!("{committed:?}");
        assert!(!debug.contains(&outer.to_canonical()));
        assert!(!debug.contains(&leaf.to_canonical()));
        assert!(debug.contains("content"));
    }

    #[test]
    fn committed_markup_shows_error_marker_for_failed_node() {
        let mut fx = Fixture::new();
        fx.add(fx.page, "children", "Exploding", json!(null));
        let (tree, _) = fx.render();
        let committed = tree.committed();
        let debug = format!("{committed:?}");
        assert!(debug.contains("node-error"));
        assert!(debug.contains("component exploded"));
    }

    #[test]
    fn empty_stack_renders_slot_placeholder() {
        let mut fx = Fixture::new();
        let stack = fx.add(fx.page, "children", "Stack", json!(null));
        let (tree, _) = fx.render();
        let markers = tree.slot_markers_of(stack);
        assert_eq!(markers.len(), 1);
        assert!(markers[0].children.is_empty());
        assert_eq!(markers[0].prop, "children");
    }

    #[test]
    fn rendering_a_non_page_fails_fast() {
        let fx = Fixture::new();
        let mut resolver = Resolver::new();
        let state = resolver
            .evaluate(&fx.dom, fx.page, &Sources::new())
            .clone();
        let registry = registry();
        let sink = EventSink::new();
        let renderer = PageRenderer::with_sink(&fx.dom, &registry, &state, &sink);
        assert!(renderer.render(fx.dom.root()).is_err());
    }
}
