#![forbid(unsafe_code)]

//! Slot vocabulary shared by the document model and the runtime.
//!
//! A slot is a named insertion point on a node. The document model uses
//! [`SlotType`] to constrain arity; the runtime reports measured
//! [`SlotState`]s back to the editor, which uses the flow direction to
//! compute drop positions between children.

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

/// Whether a slot holds at most one child or an ordered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotType {
    /// Zero or one child.
    Single,
    /// Zero or more ordered children.
    Multiple,
}

/// Layout flow of a multiple slot's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowDirection {
    /// Left to right.
    Row,
    /// Top to bottom (default).
    #[default]
    Column,
    /// Right to left.
    RowReverse,
    /// Bottom to top.
    ColumnReverse,
}

/// Axis of a flow, ignoring reversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotDirection {
    /// Children flow along the x axis.
    Horizontal,
    /// Children flow along the y axis.
    Vertical,
}

impl FlowDirection {
    /// The axis this flow lays children out on.
    pub fn axis(&self) -> SlotDirection {
        match self {
            FlowDirection::Row | FlowDirection::RowReverse => SlotDirection::Horizontal,
            FlowDirection::Column | FlowDirection::ColumnReverse => SlotDirection::Vertical,
        }
    }

    /// Whether children are laid out in reverse order along the axis.
    pub fn is_reverse(&self) -> bool {
        matches!(self, FlowDirection::RowReverse | FlowDirection::ColumnReverse)
    }
}

/// Measured state of one slot, reported by the runtime bridge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotState {
    /// Arity of the slot.
    pub slot_type: SlotType,
    /// Bounding rectangle of the slot's content area.
    pub rect: Rect,
    /// Flow direction of children inside the slot.
    pub direction: FlowDirection,
}
