#![forbid(unsafe_code)]

//! Live state resolution.
//!
//! The resolver turns a document snapshot plus externally supplied source
//! values (query results, global params) into a [`PageViewState`]: resolved
//! per-node props, a name-to-value page state, and per-binding results.
//!
//! Evaluation is ordered by a dependency graph over scope names. Cycle
//! members are all marked with a circular-binding error and never partially
//! evaluated; an evaluation failure is attached to its own node only, and
//! unrelated nodes are unaffected.
//!
//! The dependency index is memoized per document revision, so when only
//! source values change, only nodes whose transitive dependencies intersect
//! the changed sources are re-evaluated.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

use indexmap::IndexMap;
use maquette_core::{NodeId, RuntimeError};
use maquette_dom::{AppDom, BindableAttrValue, NodeKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, debug_span};

use crate::eval::{self, EvalError, Scope};
use crate::expr::{self, BindingPath, Expr, Template};

/// Placeholder substituted for secret values in resolved state.
///
/// Secrets are applied server-side only and never reach client-visible
/// live state verbatim.
pub const SECRET_PLACEHOLDER: &str = "[secret]";

/// Error attached to one binding or node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BindingError {
    /// Evaluation failed.
    Runtime {
        /// The captured failure.
        error: RuntimeError,
    },
    /// The binding participates in a dependency cycle.
    CircularBinding {
        /// Scope name of the cycle member.
        name: String,
    },
    /// The binding reads a name no source or node provides.
    MissingSource {
        /// The unknown name.
        name: String,
    },
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingError::Runtime { error } => write!(f, "{error}"),
            BindingError::CircularBinding { name } => {
                write!(f, "circular binding through {name:?}")
            }
            BindingError::MissingSource { name } => write!(f, "unknown source {name:?}"),
        }
    }
}

impl std::error::Error for BindingError {}

/// Resolved result of one bound attribute.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LiveBinding {
    /// The resolved value, absent on error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// The failure, if resolution failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BindingError>,
}

/// All binding results, keyed `<nodeId>.<namespace>.<attr>`.
pub type LiveBindings = IndexMap<String, LiveBinding>;

/// Externally supplied source values, keyed by scope name.
pub type Sources = IndexMap<String, Value>;

/// Resolved live state of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    /// The node.
    pub node_id: NodeId,
    /// The node's scope name.
    pub name: String,
    /// Component type, for elements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// First error among the node's bindings, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BindingError>,
    /// Resolved `props` namespace; entries that failed are absent.
    pub props: IndexMap<String, Value>,
}

/// The full resolved state of one page.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageViewState {
    /// Per-node live state.
    pub nodes: IndexMap<NodeId, NodeInfo>,
    /// Name-to-value scope: query outputs, element prop objects, globals.
    pub page_state: IndexMap<String, Value>,
    /// Per-binding results.
    pub bindings: LiveBindings,
}

// ── Dependency index ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum CellKind {
    Const(Value),
    Secret,
    Path(BindingPath),
    Expr(Expr),
    Template(Template),
    Invalid(String),
}

#[derive(Debug, Clone)]
struct Cell {
    binding_id: String,
    namespace: String,
    attr: String,
    kind: CellKind,
}

#[derive(Debug, Clone)]
struct ScopeEntry {
    node_id: NodeId,
    kind: NodeKind,
    name: String,
    component: Option<String>,
    cells: Vec<Cell>,
    deps: BTreeSet<String>,
}

/// Parsed binding cells of one page, grouped by scope name.
///
/// Built once per document revision; invalidated exactly on document
/// change, never on source-value change.
#[derive(Debug, Clone, Default)]
pub struct DependencyIndex {
    entries: IndexMap<String, ScopeEntry>,
}

impl DependencyIndex {
    fn build(dom: &AppDom, page: NodeId) -> Self {
        let mut entries: IndexMap<String, ScopeEntry> = IndexMap::new();
        // Elements and query states claim their names first; their names
        // are what binding paths resolve.
        for referenceable in [true, false] {
            for node in dom.iter() {
                let is_referenceable =
                    matches!(node.kind, NodeKind::Element | NodeKind::QueryState);
                if is_referenceable != referenceable {
                    continue;
                }
                if dom.owning_page(node.id) != Some(page) {
                    continue;
                }
                let entry = Self::entry_for(node);
                let key = if entries.contains_key(&entry.name) {
                    format!("${}", node.id)
                } else {
                    entry.name.clone()
                };
                entries.insert(key, entry);
            }
        }
        Self { entries }
    }

    fn entry_for(node: &maquette_dom::AppDomNode) -> ScopeEntry {
        let mut cells = Vec::new();
        let mut deps = BTreeSet::new();
        for (namespace, attrs) in &node.namespaces {
            for (attr, value) in attrs {
                let kind = match value {
                    BindableAttrValue::Const { value } => CellKind::Const(value.clone()),
                    BindableAttrValue::Secret { .. } => CellKind::Secret,
                    BindableAttrValue::Binding { value } => match expr::parse_binding_path(value) {
                        Ok(path) => CellKind::Path(path),
                        Err(err) => CellKind::Invalid(err.to_string()),
                    },
                    BindableAttrValue::JsExpression { value } => {
                        match expr::parse_expression(value) {
                            Ok(parsed) => CellKind::Expr(parsed),
                            Err(err) => CellKind::Invalid(err.to_string()),
                        }
                    }
                    BindableAttrValue::BoundExpression { value, .. } => {
                        match expr::parse_template(value) {
                            Ok(template) => CellKind::Template(template),
                            Err(err) => CellKind::Invalid(err.to_string()),
                        }
                    }
                };
                match &kind {
                    CellKind::Path(path) => {
                        deps.insert(path.source.clone());
                    }
                    CellKind::Expr(parsed) => deps.extend(parsed.deps()),
                    CellKind::Template(template) => deps.extend(template.deps()),
                    _ => {}
                }
                cells.push(Cell {
                    binding_id: format!("{}.{namespace}.{attr}", node.id),
                    namespace: namespace.clone(),
                    attr: attr.clone(),
                    kind,
                });
            }
        }
        ScopeEntry {
            node_id: node.id,
            kind: node.kind,
            name: node.name.clone(),
            component: node.component_type().map(String::from),
            cells,
            deps,
        }
    }

    /// Names whose transitive dependency set intersects `changed`.
    fn affected_names(&self, changed: &BTreeSet<String>) -> HashSet<String> {
        let mut affected: HashSet<String> = changed.iter().cloned().collect();
        loop {
            let mut grew = false;
            for (key, entry) in &self.entries {
                if affected.contains(key) {
                    continue;
                }
                if entry.deps.iter().any(|dep| affected.contains(dep)) {
                    affected.insert(key.clone());
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }
        affected
    }
}

// ── Resolver ───────────────────────────────────────────────────────────

#[derive(Debug)]
struct Cache {
    revision: u64,
    page: NodeId,
    index: DependencyIndex,
    sources: Sources,
    scope: Scope,
    state: PageViewState,
    last_evaluated: Vec<String>,
}

/// The live state engine.
///
/// Owns the memoized dependency index and the previous evaluation, which
/// drive incremental recomputation when only source values change.
#[derive(Debug, Default)]
pub struct Resolver {
    cache: Option<Cache>,
}

impl Resolver {
    /// Create an engine with no cached state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the live state of `page`.
    ///
    /// When the document revision and page are unchanged since the previous
    /// call, only nodes whose transitive dependencies intersect the changed
    /// sources are re-evaluated; with no changes at all the previous state
    /// is returned untouched.
    pub fn evaluate(&mut self, dom: &AppDom, page: NodeId, sources: &Sources) -> &PageViewState {
        let _span = debug_span!("resolve_page", page = %page).entered();
        let prev = self.cache.take();
        let cache = match prev {
            Some(mut prev) if prev.revision == dom.revision() && prev.page == page => {
                let changed = source_diff(&prev.sources, sources);
                if changed.is_empty() {
                    prev.last_evaluated = Vec::new();
                    prev
                } else {
                    let affected = prev.index.affected_names(&changed);
                    debug!(changed = changed.len(), affected = affected.len(), "incremental recompute");
                    let (state, scope, evaluated) = run(
                        &prev.index,
                        sources,
                        Some(&affected),
                        Some((&prev.state, &prev.scope)),
                    );
                    Cache {
                        revision: prev.revision,
                        page,
                        index: prev.index,
                        sources: sources.clone(),
                        scope,
                        state,
                        last_evaluated: evaluated,
                    }
                }
            }
            _ => {
                let index = DependencyIndex::build(dom, page);
                let (state, scope, evaluated) = run(&index, sources, None, None);
                Cache {
                    revision: dom.revision(),
                    page,
                    index,
                    sources: sources.clone(),
                    scope,
                    state,
                    last_evaluated: evaluated,
                }
            }
        };
        &self.cache.insert(cache).state
    }

    /// Apply a late-arriving query result.
    ///
    /// The owning query state is looked up again in the current snapshot;
    /// results for nodes that have been deleted mid-flight are discarded.
    pub fn apply_query_result(
        &mut self,
        dom: &AppDom,
        page: NodeId,
        sources: &mut Sources,
        name: &str,
        result: Value,
    ) -> Option<&PageViewState> {
        let live = dom.iter().any(|node| {
            node.kind == NodeKind::QueryState
                && node.name == name
                && dom.owning_page(node.id) == Some(page)
        });
        if !live {
            debug!(source = name, "discarding result for deleted query state");
            return None;
        }
        sources.insert(name.to_string(), result);
        Some(self.evaluate(dom, page, sources))
    }

    /// Scope names re-evaluated by the most recent [`Resolver::evaluate`].
    pub fn last_evaluated(&self) -> &[String] {
        self.cache
            .as_ref()
            .map(|cache| cache.last_evaluated.as_slice())
            .unwrap_or(&[])
    }
}

fn source_diff(old: &Sources, new: &Sources) -> BTreeSet<String> {
    let mut changed = BTreeSet::new();
    for (name, value) in new {
        if old.get(name) != Some(value) {
            changed.insert(name.clone());
        }
    }
    for name in old.keys() {
        if !new.contains_key(name) {
            changed.insert(name.clone());
        }
    }
    changed
}

/// One full or partial evaluation pass.
fn run(
    index: &DependencyIndex,
    sources: &Sources,
    affected: Option<&HashSet<String>>,
    prev: Option<(&PageViewState, &Scope)>,
) -> (PageViewState, Scope, Vec<String>) {
    let mut scope: Scope = sources.clone();
    let mut state = PageViewState::default();
    let mut evaluated = Vec::new();

    // Kahn's algorithm over scope names.
    let mut indegree: IndexMap<&str, usize> = IndexMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for (key, entry) in &index.entries {
        let degree = entry
            .deps
            .iter()
            .filter(|dep| index.entries.contains_key(dep.as_str()))
            .count();
        indegree.insert(key.as_str(), degree);
        for dep in &entry.deps {
            if index.entries.contains_key(dep.as_str()) {
                dependents.entry(dep.as_str()).or_default().push(key.as_str());
            }
        }
    }
    let mut queue: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(key, _)| *key)
        .collect();
    let mut done: HashSet<&str> = HashSet::new();
    while let Some(key) = queue.pop_front() {
        done.insert(key);
        process_entry(
            &index.entries[key],
            affected,
            prev,
            sources,
            &mut scope,
            &mut state,
            &mut evaluated,
            key,
        );
        if let Some(deps) = dependents.get(key) {
            for &dependent in deps {
                let degree = indegree.get_mut(dependent).map(|d| {
                    *d = d.saturating_sub(1);
                    *d
                });
                if degree == Some(0) {
                    queue.push_back(dependent);
                }
            }
        }
    }

    // Whatever is left depends on a cycle, or is on one.
    let remaining: Vec<&str> = index
        .entries
        .keys()
        .map(String::as_str)
        .filter(|key| !done.contains(key))
        .collect();
    if !remaining.is_empty() {
        let remaining_set: HashSet<&str> = remaining.iter().copied().collect();
        let cyclic: HashSet<&str> = remaining
            .iter()
            .copied()
            .filter(|key| reaches_self(index, &remaining_set, key))
            .collect();

        // Cycle members first: mark every one, publish nothing.
        for &key in &remaining {
            if cyclic.contains(key) {
                mark_cycle(&index.entries[key], &mut scope, &mut state);
            }
        }

        // Downstream of cycles evaluates normally; references into the
        // cycle read as missing sources rather than stale values.
        let mut pending: Vec<&str> = remaining
            .iter()
            .copied()
            .filter(|key| !cyclic.contains(key))
            .collect();
        while !pending.is_empty() {
            let ready: Vec<&str> = pending
                .iter()
                .copied()
                .filter(|key| {
                    let entry = &index.entries[*key];
                    !entry
                        .deps
                        .iter()
                        .any(|dep| pending.contains(&dep.as_str()) && dep.as_str() != *key)
                })
                .collect();
            if ready.is_empty() {
                break;
            }
            for &key in &ready {
                process_entry(
                    &index.entries[key],
                    affected,
                    prev,
                    sources,
                    &mut scope,
                    &mut state,
                    &mut evaluated,
                    key,
                );
            }
            pending.retain(|key| !ready.contains(key));
        }
    }

    state.page_state = scope.clone();
    (state, scope, evaluated)
}

#[allow(clippy::too_many_arguments)]
fn process_entry(
    entry: &ScopeEntry,
    affected: Option<&HashSet<String>>,
    prev: Option<(&PageViewState, &Scope)>,
    sources: &Sources,
    scope: &mut Scope,
    state: &mut PageViewState,
    evaluated: &mut Vec<String>,
    key: &str,
) {
    // Unaffected entries reuse the previous evaluation wholesale.
    if let (Some(affected), Some((prev_state, prev_scope))) = (affected, prev) {
        if !affected.contains(key) {
            if let Some(info) = prev_state.nodes.get(&entry.node_id) {
                state.nodes.insert(entry.node_id, info.clone());
            }
            for cell in &entry.cells {
                if let Some(binding) = prev_state.bindings.get(&cell.binding_id) {
                    state
                        .bindings
                        .insert(cell.binding_id.clone(), binding.clone());
                }
            }
            match prev_scope.get(&entry.name) {
                Some(value) => {
                    scope.insert(entry.name.clone(), value.clone());
                }
                None => {
                    scope.shift_remove(&entry.name);
                }
            }
            return;
        }
    }

    evaluated.push(key.to_string());
    let mut first_error: Option<BindingError> = None;
    let mut props: IndexMap<String, Value> = IndexMap::new();
    for cell in &entry.cells {
        let (value, error) = eval_cell(cell, scope);
        if first_error.is_none() {
            first_error = error.clone();
        }
        if cell.namespace == "props" {
            if let Some(value) = &value {
                props.insert(cell.attr.clone(), value.clone());
            }
        }
        if !matches!(cell.kind, CellKind::Const(_) | CellKind::Secret) {
            state
                .bindings
                .insert(cell.binding_id.clone(), LiveBinding { value, error });
        }
    }

    match entry.kind {
        NodeKind::Element => {
            let object: serde_json::Map<String, Value> = props
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            scope.insert(entry.name.clone(), Value::Object(object));
        }
        NodeKind::QueryState => {
            // Output comes from the external source; params only feed the
            // query execution outside this engine.
            if let Some(value) = sources.get(&entry.name) {
                scope.insert(entry.name.clone(), value.clone());
            }
        }
        _ => {}
    }

    state.nodes.insert(
        entry.node_id,
        NodeInfo {
            node_id: entry.node_id,
            name: entry.name.clone(),
            component: entry.component.clone(),
            error: first_error,
            props,
        },
    );
}

fn mark_cycle(entry: &ScopeEntry, scope: &mut Scope, state: &mut PageViewState) {
    let error = BindingError::CircularBinding {
        name: entry.name.clone(),
    };
    for cell in &entry.cells {
        if !matches!(cell.kind, CellKind::Const(_) | CellKind::Secret) {
            state.bindings.insert(
                cell.binding_id.clone(),
                LiveBinding {
                    value: None,
                    error: Some(error.clone()),
                },
            );
        }
    }
    // No partial value is published for cycle members; dependents must not
    // observe a stale output.
    scope.shift_remove(&entry.name);
    state.nodes.insert(
        entry.node_id,
        NodeInfo {
            node_id: entry.node_id,
            name: entry.name.clone(),
            component: entry.component.clone(),
            error: Some(error),
            props: IndexMap::new(),
        },
    );
}

fn eval_cell(cell: &Cell, scope: &Scope) -> (Option<Value>, Option<BindingError>) {
    match &cell.kind {
        CellKind::Const(value) => (Some(value.clone()), None),
        CellKind::Secret => (Some(Value::String(SECRET_PLACEHOLDER.to_string())), None),
        CellKind::Path(path) => wrap(eval::evaluate(&path.to_expr(), scope)),
        CellKind::Expr(parsed) => wrap(eval::evaluate(parsed, scope)),
        CellKind::Template(template) => wrap(eval::evaluate_template(template, scope)),
        CellKind::Invalid(message) => (
            None,
            Some(BindingError::Runtime {
                error: RuntimeError::new(message.clone()),
            }),
        ),
    }
}

fn wrap(result: Result<Value, EvalError>) -> (Option<Value>, Option<BindingError>) {
    match result {
        Ok(value) => (Some(value), None),
        Err(EvalError::MissingSource(name)) => (None, Some(BindingError::MissingSource { name })),
        Err(EvalError::Type(message)) => (
            None,
            Some(BindingError::Runtime {
                error: RuntimeError::new(message),
            }),
        ),
    }
}

fn reaches_self(index: &DependencyIndex, remaining: &HashSet<&str>, start: &str) -> bool {
    let mut stack: Vec<&str> = vec![start];
    let mut visited: HashSet<&str> = HashSet::new();
    while let Some(current) = stack.pop() {
        for (key, entry) in &index.entries {
            let key = key.as_str();
            if !remaining.contains(key) || !entry.deps.contains(current) {
                continue;
            }
            if key == start {
                return true;
            }
            if visited.insert(key) {
                stack.push(key);
            }
        }
    }
    false
}
