#![forbid(unsafe_code)]

//! The Maquette app document model.
//!
//! An application is described by a normalized, versioned document: a flat
//! map of typed nodes (pages, elements, queries, connections, theme) linked
//! through named slots. This crate owns:
//!
//! - [`AppDom`] - immutable document snapshots with a pure mutation API
//! - [`BindableAttrValue`] - the constant/secret/bound attribute model
//! - [`DomHistory`] - bounded undo/redo over snapshots
//! - [`DomStore`] - the persistence boundary, with in-memory and file
//!   backends
//!
//! Binding resolution lives in `maquette-bindings`; this crate only defines
//! the shapes bindings are declared in.

pub mod attr;
pub mod error;
pub mod history;
pub mod node;
pub mod store;
pub mod tree;

pub use attr::{AttrValues, BindableAttrValue, BindingFormat, from_const_values};
pub use error::{DomError, DomResult};
pub use history::DomHistory;
pub use maquette_core::SlotType;
pub use node::{AppDomNode, NodeKind, NodePartial, ParentLink, SlotDef};
pub use store::{AppVersion, DomStore, FileStore, MemoryStore, StoreError};
pub use tree::AppDom;
