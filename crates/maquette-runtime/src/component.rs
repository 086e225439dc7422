#![forbid(unsafe_code)]

//! Components and the rendering scope they run in.
//!
//! A [`Component`] turns resolved props and pre-rendered slot children into
//! a [`RenderedNode`] tree. Components run inside a per-node boundary (see
//! the `render` module); a panicking component is contained there and never
//! takes down the page.

use std::collections::HashMap;

use indexmap::IndexMap;
use maquette_core::{FlowDirection, NodeId, SlotType};
use serde_json::Value;

use crate::events::{EventSink, NodeHandle};
use crate::render::RenderedNode;
use crate::slots;

/// A slot declared by a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSlot {
    /// Slot name; children arrive under this `parent_prop`.
    pub name: String,
    /// Arity of the slot.
    pub slot_type: SlotType,
    /// Flow direction of the slot's children.
    pub direction: FlowDirection,
}

impl ComponentSlot {
    /// A single-child slot with default (column) flow.
    pub fn single(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot_type: SlotType::Single,
            direction: FlowDirection::Column,
        }
    }

    /// A multiple-children slot with the given flow.
    pub fn multiple(name: impl Into<String>, direction: FlowDirection) -> Self {
        Self {
            name: name.into(),
            slot_type: SlotType::Multiple,
            direction,
        }
    }
}

/// The scope one node renders in.
///
/// Exposes the node's resolved props, its pre-rendered slot children, and
/// the node handle used for fire-and-forget prop updates (two-way
/// binding). A handle is only reachable from within the owning node's own
/// rendering scope.
pub struct RenderScope<'a> {
    node_id: NodeId,
    name: &'a str,
    props: &'a IndexMap<String, Value>,
    children: &'a IndexMap<String, Vec<RenderedNode>>,
    sink: &'a EventSink,
}

impl<'a> RenderScope<'a> {
    pub(crate) fn new(
        node_id: NodeId,
        name: &'a str,
        props: &'a IndexMap<String, Value>,
        children: &'a IndexMap<String, Vec<RenderedNode>>,
        sink: &'a EventSink,
    ) -> Self {
        Self {
            node_id,
            name,
            props,
            children,
            sink,
        }
    }

    /// The rendering node's id.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The rendering node's name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// One resolved prop, `null` when absent.
    pub fn prop(&self, name: &str) -> &Value {
        self.props.get(name).unwrap_or(&Value::Null)
    }

    /// All resolved props.
    pub fn props(&self) -> &IndexMap<String, Value> {
        self.props
    }

    /// Handle for reporting prop updates from the live node.
    pub fn node(&self) -> NodeHandle<'a> {
        NodeHandle::new(self.node_id, self.sink)
    }

    /// Pre-rendered children of one slot, in sibling order.
    pub fn slot_children(&self, prop: &str) -> Vec<RenderedNode> {
        self.children.get(prop).cloned().unwrap_or_default()
    }

    /// Render a single-child slot: children pass through unchanged, an
    /// empty slot marks an insertion point.
    pub fn placeholder(&self, prop: &str) -> RenderedNode {
        slots::placeholder(self.node_id, prop, self.slot_children(prop))
    }

    /// Render an ordered multiple-children slot; degrades to a placeholder
    /// when empty.
    pub fn slots(&self, prop: &str, direction: FlowDirection) -> RenderedNode {
        slots::slots(self.node_id, prop, direction, self.slot_children(prop))
    }
}

/// A renderable component.
///
/// Implementations may panic while rendering; the per-node boundary
/// catches the panic and records it as that node's runtime error.
pub trait Component: Send + Sync {
    /// Slots the component accepts children in.
    fn slots(&self) -> Vec<ComponentSlot> {
        Vec::new()
    }

    /// Produce the node's rendered output.
    fn render(&self, scope: &mut RenderScope<'_>) -> RenderedNode;
}

/// Registry mapping component type names to implementations.
///
/// An unknown component type becomes a per-node error at render time, not
/// a crash.
#[derive(Default)]
pub struct ComponentRegistry {
    components: HashMap<String, Box<dyn Component>>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component under a type name, replacing any previous one.
    pub fn register(&mut self, type_name: impl Into<String>, component: impl Component + 'static) {
        self.components.insert(type_name.into(), Box::new(component));
    }

    /// Look up a component by type name.
    pub fn get(&self, type_name: &str) -> Option<&dyn Component> {
        self.components.get(type_name).map(Box::as_ref)
    }

    /// Registered type names.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }
}
