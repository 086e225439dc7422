#![forbid(unsafe_code)]

//! Structural errors for document mutations.
//!
//! Every mutation is checked before a new snapshot is produced; on error
//! the prior snapshot remains authoritative and unchanged.

use std::fmt;

use maquette_core::NodeId;

use crate::node::NodeKind;

/// Errors raised by document queries and mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    /// Malformed input to a node constructor or mutation.
    Validation(String),
    /// The referenced node does not exist in the snapshot.
    NotFound(NodeId),
    /// The node exists but has a different kind than expected.
    KindMismatch {
        /// Node that was looked up.
        id: NodeId,
        /// Kind the caller required.
        expected: NodeKind,
        /// Kind actually stored.
        actual: NodeKind,
    },
    /// The slot name is not recognized for the parent's kind, or the child
    /// kind is not accepted there.
    InvalidSlot {
        /// Kind of the would-be parent.
        parent_kind: NodeKind,
        /// Requested slot name.
        prop: String,
        /// Kind of the would-be child.
        child_kind: NodeKind,
    },
    /// A node with this id already exists in the tree.
    DuplicateId(NodeId),
    /// The name collides with another node in the same naming scope.
    DuplicateName(String),
    /// The mutation would make a node an ancestor of itself.
    WouldCycle(NodeId),
}

impl fmt::Display for DomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomError::Validation(msg) => write!(f, "invalid node: {msg}"),
            DomError::NotFound(id) => write!(f, "node {id} not found"),
            DomError::KindMismatch {
                id,
                expected,
                actual,
            } => write!(f, "node {id} is a {actual}, expected a {expected}"),
            DomError::InvalidSlot {
                parent_kind,
                prop,
                child_kind,
            } => write!(
                f,
                "slot {prop:?} of a {parent_kind} does not accept {child_kind} children"
            ),
            DomError::DuplicateId(id) => write!(f, "node {id} already exists"),
            DomError::DuplicateName(name) => {
                write!(f, "name {name:?} is already taken in this scope")
            }
            DomError::WouldCycle(id) => {
                write!(f, "moving node {id} here would create a cycle")
            }
        }
    }
}

impl std::error::Error for DomError {}

/// Result type for document operations.
pub type DomResult<T> = Result<T, DomError>;
