#![forbid(unsafe_code)]

//! Editor-facing view state capture.
//!
//! Combines the resolver's live state with what the runtime bridge
//! observed: per-node bounding rectangles, measured slot states, and
//! render errors. The editor overlays the result on the design surface to
//! draw selection outlines and compute drop positions.

use indexmap::IndexMap;
use maquette_bindings::{BindingError, PageViewState};
use maquette_core::{NodeId, Rect, SlotState};
use serde::Serialize;
use serde_json::Value;

use crate::diagnostics::DiagnosticsSink;
use crate::probe::{GeometryProbe, LayoutProbe};
use crate::render::ViewTree;

/// Everything the editor knows about one rendered node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    /// The node.
    pub node_id: NodeId,
    /// Scope name.
    pub name: String,
    /// Component type, for elements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Binding or render error attached to the node, if any. A render
    /// error takes precedence over a binding error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BindingError>,
    /// Measured bounding rectangle, when the node rendered visibly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rect: Option<Rect>,
    /// Measured slot states, keyed by slot name.
    pub slots: IndexMap<String, SlotState>,
    /// Resolved props.
    pub props: IndexMap<String, Value>,
}

/// Editor view state for every node on a page.
pub type NodesInfo = IndexMap<NodeId, NodeView>;

/// Merge live state with measured geometry.
pub fn capture_nodes(
    tree: &ViewTree,
    state: &PageViewState,
    probe: &dyn GeometryProbe,
) -> NodesInfo {
    let mut out = NodesInfo::new();
    for (node_id, info) in &state.nodes {
        let error = match tree.node_error(*node_id) {
            Some(render_error) => Some(BindingError::Runtime {
                error: render_error.clone(),
            }),
            None => info.error.clone(),
        };
        let mut slots = IndexMap::new();
        for marker in tree.slot_markers_of(*node_id) {
            if let Some(rect) = probe.slot_rect_of(*node_id, &marker.prop) {
                slots.insert(
                    marker.prop.clone(),
                    SlotState {
                        slot_type: marker.slot_type,
                        rect,
                        direction: marker.direction,
                    },
                );
            }
        }
        out.insert(
            *node_id,
            NodeView {
                node_id: *node_id,
                name: info.name.clone(),
                component: info.component.clone(),
                error,
                rect: probe.rect_of(*node_id),
                slots,
                props: info.props.clone(),
            },
        );
    }
    out
}

/// Publish state to diagnostics, then measure and capture.
///
/// The diagnostic hand-off is synchronous and strictly precedes layout
/// measurement, so observers triggered by layout always see the state the
/// measurement was computed from.
pub fn publish_and_capture(
    sink: &dyn DiagnosticsSink,
    tree: &ViewTree,
    state: &PageViewState,
    viewport: Rect,
) -> NodesInfo {
    sink.publish(state);
    let probe = LayoutProbe::measure(tree, viewport);
    capture_nodes(tree, state, &probe)
}
