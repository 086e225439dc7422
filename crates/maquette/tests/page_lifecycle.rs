//! End-to-end lifecycle: author a page, bind it to query results, render
//! it with containment, inspect geometry, persist and release it.

use indexmap::IndexMap;
use maquette::prelude::*;
use maquette::{
    BindingError, Diagnostics, LayoutProbe, MemoryStore, Rect, StoreError, publish_and_capture,
};
use serde_json::{Value, json};

struct Text;

impl Component for Text {
    fn render(&self, scope: &mut RenderScope<'_>) -> RenderedNode {
        RenderedNode::element(
            "span",
            IndexMap::new(),
            vec![RenderedNode::text(
                maquette_display(scope.prop("value")),
            )],
        )
    }
}

struct Stack;

impl Component for Stack {
    fn slots(&self) -> Vec<ComponentSlot> {
        vec![ComponentSlot::multiple(
            "children",
            maquette::FlowDirection::Column,
        )]
    }

    fn render(&self, scope: &mut RenderScope<'_>) -> RenderedNode {
        RenderedNode::element(
            "div",
            IndexMap::new(),
            vec![scope.slots("children", maquette::FlowDirection::Column)],
        )
    }
}

/// An input control that writes its value back through the node handle.
struct Input;

impl Component for Input {
    fn render(&self, scope: &mut RenderScope<'_>) -> RenderedNode {
        // Simulate the user typing during render, the way a live form
        // control reports changes: fire-and-forget, no direct mutation.
        scope.node().set_prop("value", json!("typed"));
        RenderedNode::element("input", IndexMap::new(), Vec::new())
    }
}

fn maquette_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();
    registry.register("Text", Text);
    registry.register("Stack", Stack);
    registry.register("Input", Input);
    registry
}

/// An app with one page, a connection, a query `api1`, and a query state
/// `q1` bound to it. Returns (dom, page id, label element id).
fn build_app() -> (AppDom, NodeId, NodeId) {
    let dom = AppDom::new("demo");

    let connection = dom
        .create_node(
            NodeKind::Connection,
            NodePartial::new().name("db").attr(
                "attributes",
                "params",
                BindableAttrValue::secret(json!({"token": "s3cr3t-token"})),
            ),
        )
        .unwrap();
    let connection_id = connection.id;
    let dom = dom
        .add_node(connection, dom.root(), "connections", None)
        .unwrap();

    let query = dom
        .create_node(
            NodeKind::Query,
            NodePartial::new()
                .name("api1")
                .attr(
                    "attributes",
                    "connectionId",
                    BindableAttrValue::constant(connection_id.to_canonical()),
                )
                .attr(
                    "attributes",
                    "query",
                    BindableAttrValue::constant(json!({"path": "/rows"})),
                ),
        )
        .unwrap();
    let query_id = query.id;
    let dom = dom.add_node(query, dom.root(), "queries", None).unwrap();

    let page = dom
        .create_node(NodeKind::Page, NodePartial::new().name("page1"))
        .unwrap();
    let page_id = page.id;
    let dom = dom.add_node(page, dom.root(), "pages", None).unwrap();

    let query_state = dom
        .create_node(
            NodeKind::QueryState,
            NodePartial::new().name("q1").attr(
                "attributes",
                "api",
                BindableAttrValue::constant(query_id.to_canonical()),
            ),
        )
        .unwrap();
    let dom = dom
        .add_node(query_state, page_id, "queryStates", None)
        .unwrap();

    let mut label = dom.create_element("Text", []);
    label.name = "label1".to_string();
    label.namespaces.entry("props".to_string()).or_default().insert(
        "value".to_string(),
        BindableAttrValue::expression("q1.data.length"),
    );
    let label_id = label.id;
    let dom = dom.add_node(label, page_id, "children", None).unwrap();

    (dom, page_id, label_id)
}

#[test]
fn query_results_flow_into_bound_elements() {
    let (dom, page, label) = build_app();
    let mut resolver = Resolver::new();
    let mut sources = Sources::new();

    // api1 resolves with rows; the resolver applies the result because q1
    // is still alive.
    let state = resolver
        .apply_query_result(&dom, page, &mut sources, "q1", json!({"data": [1, 2, 3]}))
        .expect("q1 is live")
        .clone();

    assert_eq!(state.page_state["q1"]["data"], json!([1, 2, 3]));
    assert_eq!(state.nodes[&label].props["value"], json!(3));
    assert!(state.nodes[&label].error.is_none());
}

#[test]
fn deleted_query_state_discards_late_results() {
    let (dom, page, _) = build_app();
    let q1 = dom
        .iter()
        .find(|node| node.kind == NodeKind::QueryState)
        .unwrap()
        .id;

    let mut resolver = Resolver::new();
    let mut sources = Sources::new();
    resolver.evaluate(&dom, page, &sources);

    let dom = dom.remove_node(q1);
    let applied =
        resolver.apply_query_result(&dom, page, &mut sources, "q1", json!({"data": [1]}));
    assert!(applied.is_none());
}

#[test]
fn secrets_never_reach_serialized_live_state() {
    let (dom, page, _) = build_app();
    let mut resolver = Resolver::new();
    let state = resolver.evaluate(&dom, page, &Sources::new());
    let serialized = serde_json::to_string(state).unwrap();
    assert!(!serialized.contains("s3cr3t-token"));
}

#[test]
fn render_capture_and_diagnostics_round_trip() {
    let (dom, page, label) = build_app();
    let mut resolver = Resolver::new();
    let mut sources = Sources::new();
    let state = resolver
        .apply_query_result(&dom, page, &mut sources, "q1", json!({"data": [1, 2, 3]}))
        .unwrap()
        .clone();

    let registry = registry();
    let sink = EventSink::new();
    let renderer = PageRenderer::with_sink(&dom, &registry, &state, &sink);
    let tree = renderer.render(page).unwrap();

    // The label rendered its bound value.
    let committed = format!("{:?}", tree.committed());
    assert!(committed.contains("\"3\""));

    let diagnostics = Diagnostics::new();
    let nodes = publish_and_capture(&diagnostics, &tree, &state, Rect::from_size(800.0, 600.0));
    assert!(nodes[&label].rect.is_some());
    assert_eq!(diagnostics.snapshot().unwrap().page_state, state.page_state);
}

#[test]
fn prop_updates_are_fire_and_forget_events() {
    let (dom, page, _) = build_app();
    let input = dom.create_element("Input", []);
    let input_id = input.id;
    let dom = dom.add_node(input, page, "children", None).unwrap();

    let mut resolver = Resolver::new();
    let state = resolver.evaluate(&dom, page, &Sources::new()).clone();

    let registry = registry();
    let sink = EventSink::new();
    PageRenderer::with_sink(&dom, &registry, &state, &sink)
        .render(page)
        .unwrap();

    let events = sink.buffered();
    assert_eq!(
        events,
        vec![RuntimeEvent::PropUpdated {
            node_id: input_id,
            prop: "value".to_string(),
            value: json!("typed"),
        }]
    );
    // The document itself was not mutated by the event.
    assert!(
        dom.get_node(input_id)
            .unwrap()
            .attr("props", "value")
            .is_none()
    );
}

#[test]
fn editor_history_supports_undo_and_redo() {
    let (dom, _page, label) = build_app();
    let mut history = DomHistory::new(dom);

    let updated = history
        .current()
        .set_namespaced_prop(label, "props", "value", BindableAttrValue::constant("fixed"))
        .unwrap();
    history.commit(updated);

    assert_eq!(
        history
            .current()
            .get_node(label)
            .unwrap()
            .attr("props", "value"),
        Some(&BindableAttrValue::constant("fixed"))
    );

    history.undo().unwrap();
    assert_eq!(
        history
            .current()
            .get_node(label)
            .unwrap()
            .attr("props", "value"),
        Some(&BindableAttrValue::expression("q1.data.length"))
    );

    history.redo().unwrap();
    assert_eq!(
        history
            .current()
            .get_node(label)
            .unwrap()
            .attr("props", "value"),
        Some(&BindableAttrValue::constant("fixed"))
    );
}

#[test]
fn query_state_param_cycles_are_detected() {
    let (dom, page, _) = build_app();

    // Two query states whose params reference each other's outputs.
    let q2 = dom
        .create_node(
            NodeKind::QueryState,
            NodePartial::new()
                .name("q2")
                .attr("attributes", "api", BindableAttrValue::constant(Value::Null))
                .attr("params", "seed", BindableAttrValue::expression("q3.data")),
        )
        .unwrap();
    let q2_id = q2.id;
    let dom = dom.add_node(q2, page, "queryStates", None).unwrap();

    let q3 = dom
        .create_node(
            NodeKind::QueryState,
            NodePartial::new()
                .name("q3")
                .attr("attributes", "api", BindableAttrValue::constant(Value::Null))
                .attr("params", "seed", BindableAttrValue::expression("q2.data")),
        )
        .unwrap();
    let q3_id = q3.id;
    let dom = dom.add_node(q3, page, "queryStates", None).unwrap();

    let mut resolver = Resolver::new();
    let sources = Sources::from([("q1".to_string(), json!({"data": []}))]);
    let state = resolver.evaluate(&dom, page, &sources);

    assert!(matches!(
        state.nodes[&q2_id].error,
        Some(BindingError::CircularBinding { .. })
    ));
    assert!(matches!(
        state.nodes[&q3_id].error,
        Some(BindingError::CircularBinding { .. })
    ));
    // The unrelated query state is untouched.
    assert_eq!(state.page_state["q1"], json!({"data": []}));
}

#[test]
fn preview_and_release_lifecycle() {
    let (dom, _, _) = build_app();
    let store = MemoryStore::new();

    store.save_dom("demo", &dom).unwrap();
    let release = store.release("demo").unwrap();
    assert_eq!(release, AppVersion::Release(1));

    // Preview keeps evolving; release 1 stays frozen.
    let page2 = dom
        .create_node(NodeKind::Page, NodePartial::new().name("page2"))
        .unwrap();
    let evolved = dom.add_node(page2, dom.root(), "pages", None).unwrap();
    store.save_dom("demo", &evolved).unwrap();

    let frozen = store.load_versioned_dom("demo", AppVersion::Release(1)).unwrap();
    let preview = store.load_versioned_dom("demo", AppVersion::Preview).unwrap();
    assert_eq!(frozen.node_count(), dom.node_count());
    assert_eq!(preview.node_count(), dom.node_count() + 1);

    assert!(matches!(
        store.load_versioned_dom("demo", AppVersion::Release(2)),
        Err(StoreError::NotFound { .. })
    ));
}

#[test]
fn file_store_round_trips_documents() {
    let (dom, page, label) = build_app();
    let dir = tempfile::tempdir().unwrap();
    let store = maquette::FileStore::new(dir.path());

    store.save_dom("demo", &dom).unwrap();
    let loaded = store
        .load_versioned_dom("demo", AppVersion::Preview)
        .unwrap();

    // The reloaded document resolves identically.
    let mut resolver = Resolver::new();
    let sources = Sources::from([("q1".to_string(), json!({"data": [1, 2, 3]}))]);
    let state = resolver.evaluate(&loaded, page, &sources);
    assert_eq!(state.nodes[&label].props["value"], json!(3));
}

#[test]
fn removal_cascades_and_isolates_failures() {
    let (dom, page, _) = build_app();

    // A stack with a child; removing the stack removes both.
    let stack = dom.create_element("Stack", []);
    let stack_id = stack.id;
    let dom = dom.add_node(stack, page, "children", None).unwrap();
    let inner = dom.create_element("Text", []);
    let inner_id = inner.id;
    let dom = dom.add_node(inner, stack_id, "children", None).unwrap();

    let dom = dom.remove_node(stack_id);
    assert!(dom.get_maybe_node(stack_id).is_none());
    assert!(dom.get_maybe_node(inner_id).is_none());

    // Sibling isolation: a failing expression affects only its node.
    let mut broken = dom.create_element("Text", []);
    broken.name = "broken".to_string();
    broken.namespaces.entry("props".to_string()).or_default().insert(
        "value".to_string(),
        BindableAttrValue::expression("1 / 0"),
    );
    let broken_id = broken.id;
    let dom = dom.add_node(broken, page, "children", None).unwrap();

    let mut resolver = Resolver::new();
    let sources = Sources::from([("q1".to_string(), json!({"data": []}))]);
    let state = resolver.evaluate(&dom, page, &sources);

    assert!(matches!(
        state.nodes[&broken_id].error,
        Some(BindingError::Runtime { .. })
    ));
    let healthy = state
        .nodes
        .values()
        .find(|info| info.name == "label1")
        .unwrap();
    assert!(healthy.error.is_none());
    assert_eq!(healthy.props["value"], json!(0));
}

#[test]
fn geometry_probe_reports_slot_rects_for_drop_targets() {
    let (dom, page, _) = build_app();
    let stack = dom.create_element("Stack", []);
    let stack_id = stack.id;
    let dom = dom.add_node(stack, page, "children", None).unwrap();

    let mut resolver = Resolver::new();
    let sources = Sources::from([("q1".to_string(), json!({"data": []}))]);
    let state = resolver.evaluate(&dom, page, &sources).clone();

    let registry = registry();
    let sink = EventSink::new();
    let tree = PageRenderer::with_sink(&dom, &registry, &state, &sink)
        .render(page)
        .unwrap();
    let probe = LayoutProbe::measure(&tree, Rect::from_size(800.0, 600.0));

    use maquette::GeometryProbe as _;
    let slot_rect = probe.slot_rect_of(stack_id, "children").unwrap();
    assert!(!slot_rect.is_empty());
    let node_rect = probe.rect_of(stack_id).unwrap();
    assert!(node_rect.contains(slot_rect.x, slot_rect.y));
}
