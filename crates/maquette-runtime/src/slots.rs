#![forbid(unsafe_code)]

//! Slot rendering and drop geometry.
//!
//! [`placeholder`] and [`slots`] are the two slot wrappers components use
//! to place their children: a single-child slot passes children through
//! unchanged and only marks an insertion point while empty; a
//! multiple-children slot wraps its ordered children and degrades to a
//! placeholder when empty.
//!
//! [`drop_index`] turns a hover position over a measured slot into the
//! sibling index a dragged node would be inserted at.

use maquette_core::{FlowDirection, NodeId, Rect, SlotDirection, SlotState, SlotType};

use crate::render::{RenderedNode, SlotMarker};

/// Render a single-child slot.
///
/// With children present they pass through unchanged; an empty slot
/// renders an insertion-point marker instead.
pub fn placeholder(parent_id: NodeId, prop: &str, children: Vec<RenderedNode>) -> RenderedNode {
    if children.is_empty() {
        RenderedNode::Slot(SlotMarker {
            parent_id,
            prop: prop.to_string(),
            slot_type: SlotType::Single,
            direction: FlowDirection::Column,
            children: Vec::new(),
        })
    } else {
        RenderedNode::Fragment(children)
    }
}

/// Render an ordered multiple-children slot.
///
/// Degrades to a [`placeholder`] when no children are present.
pub fn slots(
    parent_id: NodeId,
    prop: &str,
    direction: FlowDirection,
    children: Vec<RenderedNode>,
) -> RenderedNode {
    if children.is_empty() {
        return placeholder(parent_id, prop, children);
    }
    RenderedNode::Slot(SlotMarker {
        parent_id,
        prop: prop.to_string(),
        slot_type: SlotType::Multiple,
        direction,
        children,
    })
}

/// The sibling index a drop at `(x, y)` would insert at.
///
/// `child_rects` are the measured rectangles of the slot's current
/// children in document order; reversed flows are accounted for, so the
/// returned index is always a document-order position.
pub fn drop_index(slot: &SlotState, child_rects: &[Rect], x: f64, y: f64) -> usize {
    let before = |rect: &Rect| match slot.direction.axis() {
        SlotDirection::Horizontal => x < rect.center().0,
        SlotDirection::Vertical => y < rect.center().1,
    };
    let mut visual = child_rects.len();
    for (i, rect) in child_rects.iter().enumerate() {
        if before(rect) {
            visual = i;
            break;
        }
    }
    if slot.direction.is_reverse() {
        child_rects.len() - visual
    } else {
        visual
    }
}

/// A thin highlight rectangle marking the insertion edge for `index`.
///
/// Used by the editor to draw the drop indicator between two measured
/// children (or at the slot edge for the first/last position).
pub fn insertion_edge(slot: &SlotState, child_rects: &[Rect], index: usize) -> Rect {
    const EDGE: f64 = 2.0;
    let rect = slot.rect;
    let horizontal = slot.direction.axis() == SlotDirection::Horizontal;
    if child_rects.is_empty() {
        return if horizontal {
            Rect::new(rect.x, rect.y, EDGE, rect.height)
        } else {
            Rect::new(rect.x, rect.y, rect.width, EDGE)
        };
    }
    let index = index.min(child_rects.len());
    // Edge coordinate: before the child at `index`, or after the last.
    let at = if index < child_rects.len() {
        let r = &child_rects[index];
        if horizontal { r.x } else { r.y }
    } else {
        let r = &child_rects[child_rects.len() - 1];
        if horizontal { r.right() } else { r.bottom() }
    };
    if horizontal {
        Rect::new(at - EDGE / 2.0, rect.y, EDGE, rect.height)
    } else {
        Rect::new(rect.x, at - EDGE / 2.0, rect.width, EDGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column_slot() -> SlotState {
        SlotState {
            slot_type: SlotType::Multiple,
            rect: Rect::new(0.0, 0.0, 100.0, 300.0),
            direction: FlowDirection::Column,
        }
    }

    fn column_children() -> Vec<Rect> {
        vec![
            Rect::new(0.0, 0.0, 100.0, 100.0),
            Rect::new(0.0, 100.0, 100.0, 100.0),
            Rect::new(0.0, 200.0, 100.0, 100.0),
        ]
    }

    #[test]
    fn empty_single_slot_is_a_placeholder_marker() {
        let id = NodeId::generate();
        let node = placeholder(id, "content", Vec::new());
        let RenderedNode::Slot(marker) = node else {
            panic!("expected a slot marker");
        };
        assert_eq!(marker.slot_type, SlotType::Single);
        assert!(marker.children.is_empty());
    }

    #[test]
    fn filled_single_slot_passes_children_through() {
        let id = NodeId::generate();
        let node = placeholder(id, "content", vec![RenderedNode::text("x")]);
        assert!(matches!(node, RenderedNode::Fragment(children) if children.len() == 1));
    }

    #[test]
    fn empty_multiple_slot_degrades_to_placeholder() {
        let id = NodeId::generate();
        let node = slots(id, "children", FlowDirection::Row, Vec::new());
        let RenderedNode::Slot(marker) = node else {
            panic!("expected a slot marker");
        };
        assert_eq!(marker.slot_type, SlotType::Single);
    }

    #[test]
    fn filled_multiple_slot_keeps_order_and_direction() {
        let id = NodeId::generate();
        let node = slots(
            id,
            "children",
            FlowDirection::Row,
            vec![RenderedNode::text("a"), RenderedNode::text("b")],
        );
        let RenderedNode::Slot(marker) = node else {
            panic!("expected a slot marker");
        };
        assert_eq!(marker.slot_type, SlotType::Multiple);
        assert_eq!(marker.direction, FlowDirection::Row);
        assert_eq!(marker.children.len(), 2);
    }

    #[test]
    fn drop_index_in_a_column() {
        let slot = column_slot();
        let children = column_children();
        assert_eq!(drop_index(&slot, &children, 50.0, 10.0), 0);
        assert_eq!(drop_index(&slot, &children, 50.0, 120.0), 1);
        assert_eq!(drop_index(&slot, &children, 50.0, 260.0), 2);
        assert_eq!(drop_index(&slot, &children, 50.0, 299.0), 3);
    }

    #[test]
    fn drop_index_in_a_row() {
        let slot = SlotState {
            slot_type: SlotType::Multiple,
            rect: Rect::new(0.0, 0.0, 300.0, 100.0),
            direction: FlowDirection::Row,
        };
        let children = vec![
            Rect::new(0.0, 0.0, 100.0, 100.0),
            Rect::new(100.0, 0.0, 100.0, 100.0),
        ];
        assert_eq!(drop_index(&slot, &children, 10.0, 50.0), 0);
        assert_eq!(drop_index(&slot, &children, 140.0, 50.0), 1);
        assert_eq!(drop_index(&slot, &children, 290.0, 50.0), 2);
    }

    #[test]
    fn drop_index_in_a_reversed_row() {
        let slot = SlotState {
            slot_type: SlotType::Multiple,
            rect: Rect::new(0.0, 0.0, 300.0, 100.0),
            direction: FlowDirection::RowReverse,
        };
        // Document order: first child is visually rightmost.
        let children = vec![
            Rect::new(200.0, 0.0, 100.0, 100.0),
            Rect::new(100.0, 0.0, 100.0, 100.0),
            Rect::new(0.0, 0.0, 100.0, 100.0),
        ];
        // Hovering at the far right inserts before the first document child.
        assert_eq!(drop_index(&slot, &children, 299.0, 50.0), 0);
        // Hovering at the far left inserts after the last document child.
        assert_eq!(drop_index(&slot, &children, 1.0, 50.0), 3);
    }

    #[test]
    fn insertion_edge_positions() {
        let slot = column_slot();
        let children = column_children();
        let first = insertion_edge(&slot, &children, 0);
        assert!((first.y - -1.0).abs() < f64::EPSILON);
        let last = insertion_edge(&slot, &children, 3);
        assert!((last.y - 299.0).abs() < f64::EPSILON);
        assert!((last.width - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn insertion_edge_in_empty_slot() {
        let slot = column_slot();
        let edge = insertion_edge(&slot, &[], 0);
        assert!((edge.height - 2.0).abs() < f64::EPSILON);
        assert!((edge.y - slot.rect.y).abs() < f64::EPSILON);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn drop_index_is_in_bounds_and_monotone(y1 in 0.0..300.0f64, y2 in 0.0..300.0f64) {
            let slot = column_slot();
            let children = column_children();
            let a = drop_index(&slot, &children, 50.0, y1.min(y2));
            let b = drop_index(&slot, &children, 50.0, y1.max(y2));
            prop_assert!(a <= b);
            prop_assert!(b <= children.len());
        }
    }
}
