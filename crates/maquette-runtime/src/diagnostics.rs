#![forbid(unsafe_code)]

//! The global diagnostic channel.
//!
//! After every recompute the runtime hands the current page state and live
//! bindings to a diagnostics holder, where out-of-process observers (the
//! editor's measurement and inspection layer) can read them. The hand-off
//! is synchronous and happens before any dependent layout measurement, so
//! an observer triggered by layout never reads stale state.
//!
//! Lifecycle: the holder is lazily initialized, overwritten on every
//! recompute, and cleared only on reload. [`DiagnosticsSink`] is the
//! injectable interface; [`global`] is the process-wide instance.

use std::sync::{OnceLock, RwLock};

use indexmap::IndexMap;
use maquette_bindings::{LiveBindings, PageViewState};
use serde_json::Value;

/// The most recent published state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiagnosticsSnapshot {
    /// Name-to-value page state.
    pub page_state: IndexMap<String, Value>,
    /// Per-binding results.
    pub bindings: LiveBindings,
}

/// Receiver for recompute hand-offs. Implemented by the process-wide
/// [`Diagnostics`] holder and by test doubles.
pub trait DiagnosticsSink: Send + Sync {
    /// Record the state of a completed recompute. Called synchronously,
    /// before dependent layout measurement.
    fn publish(&self, state: &PageViewState);

    /// Drop any held state (page reload).
    fn clear(&self);
}

/// Holder of the most recent page state and live bindings.
#[derive(Debug, Default)]
pub struct Diagnostics {
    inner: RwLock<Option<DiagnosticsSnapshot>>,
}

impl Diagnostics {
    /// Create an empty holder.
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent snapshot, if any recompute has published yet.
    pub fn snapshot(&self) -> Option<DiagnosticsSnapshot> {
        self.inner.read().unwrap().clone()
    }
}

impl DiagnosticsSink for Diagnostics {
    fn publish(&self, state: &PageViewState) {
        let snapshot = DiagnosticsSnapshot {
            page_state: state.page_state.clone(),
            bindings: state.bindings.clone(),
        };
        *self.inner.write().unwrap() = Some(snapshot);
    }

    fn clear(&self) {
        *self.inner.write().unwrap() = None;
    }
}

static GLOBAL: OnceLock<Diagnostics> = OnceLock::new();

/// The process-wide diagnostics holder, created on first use.
pub fn global() -> &'static Diagnostics {
    GLOBAL.get_or_init(Diagnostics::new)
}
