#![forbid(unsafe_code)]

//! Marker-to-geometry queries.
//!
//! The editor needs the bounding rectangle of every node and slot it
//! overlays on the design surface. [`GeometryProbe`] is the stable query
//! interface a host renderer must provide; how it measures is its own
//! business. [`LayoutProbe`] implements the interface with a simple,
//! deterministic flow layout over a rendered [`ViewTree`], which is what
//! the editor and the tests run against.

use std::collections::HashMap;

use maquette_core::{NodeId, Rect, SlotDirection};

use crate::render::{RenderedNode, SlotMarker, ViewTree};

/// Geometry queries against rendered output, keyed by node markers.
pub trait GeometryProbe {
    /// Bounding rectangle of a node's rendered content.
    fn rect_of(&self, node_id: NodeId) -> Option<Rect>;

    /// Bounding rectangle of one named slot of a node.
    fn slot_rect_of(&self, node_id: NodeId, prop: &str) -> Option<Rect>;
}

const TEXT_CHAR_WIDTH: f64 = 8.0;
const TEXT_HEIGHT: f64 = 16.0;
const ELEMENT_PADDING: f64 = 8.0;
const EMPTY_ELEMENT_HEIGHT: f64 = 24.0;
const PLACEHOLDER_HEIGHT: f64 = 40.0;

/// Deterministic block/flow layout over a rendered tree.
///
/// Elements are blocks filling the available width; slot markers lay their
/// children out along the slot's flow direction; empty slots take the
/// placeholder's minimum size. Real hosts substitute their own probe.
#[derive(Debug, Default)]
pub struct LayoutProbe {
    rects: HashMap<NodeId, Rect>,
    slot_rects: HashMap<(NodeId, String), Rect>,
}

impl LayoutProbe {
    /// Measure a rendered tree inside a viewport.
    pub fn measure(tree: &ViewTree, viewport: Rect) -> Self {
        let mut probe = Self::default();
        let mut y = viewport.y;
        for root in &tree.roots {
            let (_, height) = probe.layout(root, viewport.x, y, viewport.width);
            y += height;
        }
        probe
    }

    fn layout(&mut self, node: &RenderedNode, x: f64, y: f64, width: f64) -> (f64, f64) {
        match node {
            RenderedNode::Text(text) => {
                let text_width = (text.chars().count() as f64 * TEXT_CHAR_WIDTH).min(width);
                (text_width, TEXT_HEIGHT)
            }
            RenderedNode::Element(element) => {
                let inner_x = x + ELEMENT_PADDING;
                let inner_width = (width - 2.0 * ELEMENT_PADDING).max(0.0);
                let mut inner_y = y + ELEMENT_PADDING;
                for child in &element.children {
                    let (_, height) = self.layout(child, inner_x, inner_y, inner_width);
                    inner_y += height;
                }
                let content_height = inner_y - y - ELEMENT_PADDING;
                let height = if element.children.is_empty() {
                    EMPTY_ELEMENT_HEIGHT
                } else {
                    content_height + 2.0 * ELEMENT_PADDING
                };
                (width, height)
            }
            RenderedNode::Fragment(children) => {
                let mut height = 0.0;
                for child in children {
                    let (_, child_height) = self.layout(child, x, y + height, width);
                    height += child_height;
                }
                (width, height)
            }
            RenderedNode::Boundary(boundary) => match &boundary.result {
                Ok(content) => self.layout(content, x, y, width),
                Err(_) => {
                    // The inline error marker occupies the node's place.
                    let rect = Rect::new(x, y, width, PLACEHOLDER_HEIGHT);
                    self.rects.insert(boundary.node_id, rect);
                    (width, PLACEHOLDER_HEIGHT)
                }
            },
            RenderedNode::Host(host) => {
                let (child_width, child_height) = self.layout(&host.child, x, y, width);
                self.rects
                    .insert(host.node_id, Rect::new(x, y, child_width, child_height));
                (child_width, child_height)
            }
            RenderedNode::Slot(marker) => self.layout_slot(marker, x, y, width),
        }
    }

    fn layout_slot(&mut self, marker: &SlotMarker, x: f64, y: f64, width: f64) -> (f64, f64) {
        let key = (marker.parent_id, marker.prop.clone());
        if marker.children.is_empty() {
            let rect = Rect::new(x, y, width, PLACEHOLDER_HEIGHT);
            self.slot_rects.insert(key, rect);
            return (width, PLACEHOLDER_HEIGHT);
        }

        let reverse = marker.direction.is_reverse();
        let ordered: Vec<&RenderedNode> = if reverse {
            marker.children.iter().rev().collect()
        } else {
            marker.children.iter().collect()
        };

        let (slot_width, slot_height) = match marker.direction.axis() {
            SlotDirection::Vertical => {
                let mut height = 0.0;
                for child in ordered {
                    let (_, child_height) = self.layout(child, x, y + height, width);
                    height += child_height;
                }
                (width, height)
            }
            SlotDirection::Horizontal => {
                let track = width / marker.children.len() as f64;
                let mut max_height: f64 = 0.0;
                for (i, child) in ordered.into_iter().enumerate() {
                    let (_, child_height) = self.layout(child, x + track * i as f64, y, track);
                    max_height = max_height.max(child_height);
                }
                (width, max_height)
            }
        };
        self.slot_rects
            .insert(key, Rect::new(x, y, slot_width, slot_height));
        (slot_width, slot_height)
    }
}

impl GeometryProbe for LayoutProbe {
    fn rect_of(&self, node_id: NodeId) -> Option<Rect> {
        self.rects.get(&node_id).copied()
    }

    fn slot_rect_of(&self, node_id: NodeId, prop: &str) -> Option<Rect> {
        self.slot_rects.get(&(node_id, prop.to_string())).copied()
    }
}
