#![forbid(unsafe_code)]

//! Core primitives shared by every Maquette crate.
//!
//! This crate provides the building blocks the document model and runtime
//! are assembled from:
//!
//! - [`NodeId`] - opaque, globally unique node identity
//! - [`FractionalIndex`] - sibling ordering keys that support insertion
//!   between neighbors without renumbering
//! - [`Rect`] - measured geometry of rendered output
//! - [`RuntimeError`] - the per-node evaluation/render failure record

pub mod error;
pub mod geometry;
pub mod id;
pub mod index;
pub mod slots;

pub use error::RuntimeError;
pub use geometry::Rect;
pub use id::NodeId;
pub use index::FractionalIndex;
pub use slots::{FlowDirection, SlotDirection, SlotState, SlotType};
