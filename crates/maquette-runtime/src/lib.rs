#![forbid(unsafe_code)]

//! The Maquette node-runtime bridge.
//!
//! This crate ties rendered output back to logical document nodes:
//!
//! - [`render`] - per-node boundaries with panic containment, host
//!   markers, and the rendered view tree
//! - [`component`] - the component trait, registry, and rendering scope
//! - [`slots`] - placeholder/slot wrappers and drop geometry
//! - [`probe`] - the marker-to-bounding-rect query interface
//! - [`events`] - the fire-and-forget runtime event sink
//! - [`diagnostics`] - the global diagnostic channel
//! - [`view_state`] - the editor-facing capture of state plus geometry
//! - [`compile`] - the external compile-service boundary
//!
//! The ordering contract at the heart of the bridge: after each recompute
//! the new state is published to diagnostics synchronously, before any
//! layout measurement, so the editor's measurement pass never observes
//! stale state.

pub mod compile;
pub mod component;
pub mod diagnostics;
pub mod events;
pub mod probe;
pub mod render;
pub mod slots;
pub mod view_state;

pub use compile::{CompileError, CompileService, CompiledComponent, PassthroughCompiler};
pub use component::{Component, ComponentRegistry, ComponentSlot, RenderScope};
pub use diagnostics::{Diagnostics, DiagnosticsSink, DiagnosticsSnapshot};
pub use events::{EventSink, NodeHandle, RuntimeEvent, fire_event};
pub use probe::{GeometryProbe, LayoutProbe};
pub use render::{
    NodeBoundary, NodeHost, PageRenderer, RenderedElement, RenderedNode, SlotMarker, ViewTree,
};
pub use slots::{drop_index, insertion_edge, placeholder, slots};
pub use view_state::{NodeView, NodesInfo, capture_nodes, publish_and_capture};
