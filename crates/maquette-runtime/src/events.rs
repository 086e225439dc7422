#![forbid(unsafe_code)]

//! The runtime event sink.
//!
//! Live-rendered nodes report events (prop updates, recompute notices)
//! through a process-wide sink. With no collector installed, events
//! accumulate in an unbounded buffer; once a collector is installed it
//! first receives the buffered backlog, then every later event
//! synchronously.
//!
//! The sink is an explicit value so tests and embedders can hold their
//! own; [`global`] returns the lazily-initialized process-wide instance
//! and [`fire_event`] is the convenience entry point nodes use.

use std::sync::{Mutex, OnceLock};

use maquette_core::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An event reported by the live runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuntimeEvent {
    /// A rendered node requests an update of one of its own props.
    #[serde(rename_all = "camelCase")]
    PropUpdated {
        /// The reporting node.
        node_id: NodeId,
        /// Prop name.
        prop: String,
        /// New value.
        value: Value,
    },
    /// Live page state was recomputed.
    PageStateUpdated,
}

type Collector = Box<dyn Fn(RuntimeEvent) + Send + Sync>;

enum SinkState {
    Buffered(Vec<RuntimeEvent>),
    Collected(Collector),
}

/// A runtime event sink: buffered until a collector is installed.
pub struct EventSink {
    state: Mutex<SinkState>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink {
    /// Create a sink with an empty buffer and no collector.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SinkState::Buffered(Vec::new())),
        }
    }

    /// Report an event: buffered, or delivered synchronously to the
    /// installed collector.
    pub fn fire(&self, event: RuntimeEvent) {
        let mut state = self.state.lock().unwrap();
        match &mut *state {
            SinkState::Buffered(buffer) => buffer.push(event),
            SinkState::Collected(collector) => collector(event),
        }
    }

    /// Install a collector, returning any buffered backlog.
    ///
    /// Later events are delivered synchronously to the collector instead
    /// of being buffered.
    pub fn install_collector(
        &self,
        collector: impl Fn(RuntimeEvent) + Send + Sync + 'static,
    ) -> Vec<RuntimeEvent> {
        let mut state = self.state.lock().unwrap();
        let backlog = match &mut *state {
            SinkState::Buffered(buffer) => std::mem::take(buffer),
            SinkState::Collected(_) => Vec::new(),
        };
        *state = SinkState::Collected(Box::new(collector));
        backlog
    }

    /// Remove any collector and clear the buffer.
    pub fn reset(&self) {
        *self.state.lock().unwrap() = SinkState::Buffered(Vec::new());
    }

    /// Snapshot of currently buffered events (empty while a collector is
    /// installed).
    pub fn buffered(&self) -> Vec<RuntimeEvent> {
        match &*self.state.lock().unwrap() {
            SinkState::Buffered(buffer) => buffer.clone(),
            SinkState::Collected(_) => Vec::new(),
        }
    }
}

static GLOBAL: OnceLock<EventSink> = OnceLock::new();

/// The process-wide sink, created on first use.
pub fn global() -> &'static EventSink {
    GLOBAL.get_or_init(EventSink::new)
}

/// Report an event to the process-wide sink.
pub fn fire_event(event: RuntimeEvent) {
    global().fire(event);
}

/// Handle a rendered node uses to talk back to the runtime.
///
/// Obtained through the node's own rendering scope only. Prop updates are
/// fire-and-forget events, not direct document mutations; the editor or
/// runtime applies them on its own schedule.
#[derive(Clone, Copy)]
pub struct NodeHandle<'a> {
    node_id: NodeId,
    sink: &'a EventSink,
}

impl<'a> NodeHandle<'a> {
    pub(crate) fn new(node_id: NodeId, sink: &'a EventSink) -> Self {
        Self { node_id, sink }
    }

    /// The owning node.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Asynchronously request an update of one of the node's own props.
    pub fn set_prop(&self, prop: impl Into<String>, value: Value) {
        self.sink.fire(RuntimeEvent::PropUpdated {
            node_id: self.node_id,
            prop: prop.into(),
            value,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn events_buffer_without_collector() {
        let sink = EventSink::new();
        sink.fire(RuntimeEvent::PageStateUpdated);
        sink.fire(RuntimeEvent::PageStateUpdated);
        assert_eq!(sink.buffered().len(), 2);
    }

    #[test]
    fn collector_receives_backlog_then_live_events() {
        let sink = EventSink::new();
        let id = NodeId::generate();
        sink.fire(RuntimeEvent::PropUpdated {
            node_id: id,
            prop: "value".to_string(),
            value: json!(1),
        });

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let backlog = sink.install_collector(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(backlog.len(), 1);
        assert!(sink.buffered().is_empty());

        sink.fire(RuntimeEvent::PageStateUpdated);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_restores_buffering() {
        let sink = EventSink::new();
        let _ = sink.install_collector(|_| {});
        sink.reset();
        sink.fire(RuntimeEvent::PageStateUpdated);
        assert_eq!(sink.buffered().len(), 1);
    }

    #[test]
    fn node_handle_fires_prop_updates() {
        let sink = EventSink::new();
        let id = NodeId::generate();
        let handle = NodeHandle::new(id, &sink);
        handle.set_prop("value", json!("typed"));

        let events = sink.buffered();
        assert_eq!(
            events,
            vec![RuntimeEvent::PropUpdated {
                node_id: id,
                prop: "value".to_string(),
                value: json!("typed"),
            }]
        );
    }

    #[test]
    fn event_serialization_shape() {
        let id = NodeId::generate();
        let event = RuntimeEvent::PropUpdated {
            node_id: id,
            prop: "value".to_string(),
            value: json!(1),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "propUpdated");
        assert_eq!(json["nodeId"], json!(id.to_canonical()));
    }

    #[test]
    fn global_sink_is_shared() {
        global().reset();
        fire_event(RuntimeEvent::PageStateUpdated);
        assert_eq!(global().buffered().len(), 1);
        global().reset();
    }
}
