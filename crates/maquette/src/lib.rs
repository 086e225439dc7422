#![forbid(unsafe_code)]

//! Maquette public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for embedders.
//! It re-exports common types from the internal crates and offers a
//! lightweight prelude for day-to-day usage.

use std::fmt;

// --- Core re-exports -------------------------------------------------------

pub use maquette_core::{
    FlowDirection, FractionalIndex, NodeId, Rect, RuntimeError, SlotDirection, SlotState, SlotType,
};

// --- Document re-exports ---------------------------------------------------

pub use maquette_dom::{
    AppDom, AppDomNode, AppVersion, AttrValues, BindableAttrValue, BindingFormat, DomError,
    DomHistory, DomStore, FileStore, MemoryStore, NodeKind, NodePartial, ParentLink, SlotDef,
    StoreError, from_const_values,
};

// --- Bindings re-exports ---------------------------------------------------

pub use maquette_bindings::{
    BindingError, LiveBinding, LiveBindings, NodeInfo, PageViewState, ParseError, Resolver,
    SECRET_PLACEHOLDER, Sources, parse_binding_path, parse_expression, parse_template,
};

// --- Runtime re-exports ----------------------------------------------------

pub use maquette_runtime::{
    CompileError, CompileService, CompiledComponent, Component, ComponentRegistry, ComponentSlot,
    Diagnostics, DiagnosticsSink, DiagnosticsSnapshot, EventSink, GeometryProbe, LayoutProbe,
    NodeBoundary, NodeHandle, NodeHost, NodeView, NodesInfo, PageRenderer, PassthroughCompiler,
    RenderScope, RenderedElement, RenderedNode, RuntimeEvent, SlotMarker, ViewTree, capture_nodes,
    fire_event, publish_and_capture,
};

// --- Errors ---------------------------------------------------------------

/// Top-level error type for maquette embedders.
#[derive(Debug)]
pub enum Error {
    /// Structural document error.
    Dom(DomError),
    /// Persistence boundary error.
    Store(StoreError),
    /// Binding resolution error.
    Binding(BindingError),
    /// Code component compilation error.
    Compile(CompileError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dom(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Binding(err) => write!(f, "{err}"),
            Self::Compile(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<DomError> for Error {
    fn from(err: DomError) -> Self {
        Self::Dom(err)
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<BindingError> for Error {
    fn from(err: BindingError) -> Self {
        Self::Binding(err)
    }
}

impl From<CompileError> for Error {
    fn from(err: CompileError) -> Self {
        Self::Compile(err)
    }
}

/// Standard result type for maquette APIs.
pub type Result<T> = std::result::Result<T, Error>;

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    //! Common imports for embedders.
    pub use crate::{
        AppDom, AppVersion, BindableAttrValue, Component, ComponentRegistry, ComponentSlot,
        DomHistory, DomStore, Error, EventSink, NodeId, NodeKind, NodePartial, PageRenderer,
        PageViewState, RenderScope, RenderedNode, Resolver, Result, RuntimeEvent, Sources,
        ViewTree,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_wrap_and_display() {
        let err: Error = DomError::Validation("bad".to_string()).into();
        assert!(err.to_string().contains("bad"));
        let err: Error = CompileError::new("nope").into();
        assert!(err.to_string().contains("nope"));
    }
}
