#![forbid(unsafe_code)]

//! The normalized document tree.
//!
//! An [`AppDom`] is an immutable snapshot: a flat map from node id to node
//! record plus the root id. Mutations are pure functions producing a new
//! snapshot; node records are `Arc`-shared between snapshots so an edit of
//! one node never copies the rest of the tree. Readers always observe one
//! consistent snapshot, and a failed mutation leaves the prior snapshot
//! authoritative.
//!
//! Structural invariants maintained by every operation:
//!
//! - exactly one root node, of kind `app`;
//! - every non-root node links to an existing parent through a slot that is
//!   valid for the parent's kind;
//! - sibling ordering keys are distinct and totally ordered within one
//!   (parent, slot) group;
//! - parent chains terminate at the root.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use maquette_core::{FractionalIndex, NodeId, SlotType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::attr::{AttrValues, BindableAttrValue, from_const_values};
use crate::error::{DomError, DomResult};
use crate::node::{AppDomNode, NodeKind, NodePartial, ParentLink, validate_shape};

/// An immutable snapshot of one app document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppDom {
    root: NodeId,
    nodes: IndexMap<NodeId, Arc<AppDomNode>>,
    revision: u64,
}

impl AppDom {
    /// Create a document containing only a root `app` node.
    pub fn new(app_name: impl Into<String>) -> Self {
        let root = NodeId::generate();
        let node = AppDomNode {
            id: root,
            kind: NodeKind::App,
            name: app_name.into(),
            parent: None,
            namespaces: IndexMap::new(),
        };
        Self {
            root,
            nodes: IndexMap::from([(root, Arc::new(node))]),
            revision: 0,
        }
    }

    /// Id of the root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Monotonic change counter. Bumped by every mutation; used by the
    /// binding resolver to invalidate its memoized dependency index.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of nodes in the document.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate all nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &AppDomNode> {
        self.nodes.values().map(Arc::as_ref)
    }

    // ── Queries ────────────────────────────────────────────────────────

    /// Look up a node, or `None` if absent.
    pub fn get_maybe_node(&self, id: NodeId) -> Option<&AppDomNode> {
        self.nodes.get(&id).map(Arc::as_ref)
    }

    /// Look up a node, failing with `NotFound` if absent.
    pub fn get_node(&self, id: NodeId) -> DomResult<&AppDomNode> {
        self.get_maybe_node(id).ok_or(DomError::NotFound(id))
    }

    /// Look up a node and require its kind.
    pub fn get_node_of_kind(&self, id: NodeId, expected: NodeKind) -> DomResult<&AppDomNode> {
        let node = self.get_node(id)?;
        if node.kind == expected {
            Ok(node)
        } else {
            Err(DomError::KindMismatch {
                id,
                expected,
                actual: node.kind,
            })
        }
    }

    /// Like [`AppDom::get_node_of_kind`], but absence is `Ok(None)` rather
    /// than an error. A present node of the wrong kind still fails.
    pub fn get_maybe_node_of_kind(
        &self,
        id: NodeId,
        expected: NodeKind,
    ) -> DomResult<Option<&AppDomNode>> {
        match self.get_maybe_node(id) {
            None => Ok(None),
            Some(node) if node.kind == expected => Ok(Some(node)),
            Some(node) => Err(DomError::KindMismatch {
                id,
                expected,
                actual: node.kind,
            }),
        }
    }

    /// Children of a node grouped by slot, each group ordered by sibling
    /// index ascending.
    pub fn get_children(&self, id: NodeId) -> IndexMap<String, Vec<&AppDomNode>> {
        let mut groups: IndexMap<String, Vec<&AppDomNode>> = IndexMap::new();
        for node in self.iter() {
            if let Some(parent) = &node.parent {
                if parent.parent_id == id {
                    groups.entry(parent.parent_prop.clone()).or_default().push(node);
                }
            }
        }
        for children in groups.values_mut() {
            children.sort_by(|a, b| sibling_index(a).cmp(&sibling_index(b)));
        }
        groups
    }

    /// Children of one slot, ordered by sibling index ascending.
    pub fn child_nodes(&self, id: NodeId, prop: &str) -> Vec<&AppDomNode> {
        let mut children: Vec<&AppDomNode> = self
            .iter()
            .filter(|node| {
                node.parent
                    .as_ref()
                    .is_some_and(|p| p.parent_id == id && p.parent_prop == prop)
            })
            .collect();
        children.sort_by(|a, b| sibling_index(a).cmp(&sibling_index(b)));
        children
    }

    /// Ids of all descendants of `id`, depth-first, excluding `id` itself.
    pub fn descendant_ids(&self, id: NodeId) -> Vec<NodeId> {
        let mut by_parent: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for node in self.iter() {
            if let Some(parent) = &node.parent {
                by_parent.entry(parent.parent_id).or_default().push(node.id);
            }
        }
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(children) = by_parent.get(&next) {
                for &child in children {
                    out.push(child);
                    stack.push(child);
                }
            }
        }
        out
    }

    /// Ids on `id`'s parent chain, nearest first, ending at the root.
    pub fn ancestor_ids(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = id;
        let mut hops = self.nodes.len() + 1;
        while let Some(parent) = self
            .get_maybe_node(current)
            .and_then(|n| n.parent.as_ref())
        {
            out.push(parent.parent_id);
            current = parent.parent_id;
            hops -= 1;
            if hops == 0 {
                break;
            }
        }
        out
    }

    /// Whether `ancestor` appears on `id`'s parent chain.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = id;
        let mut hops = self.nodes.len() + 1;
        while let Some(parent) = self
            .get_maybe_node(current)
            .and_then(|n| n.parent.as_ref())
        {
            if parent.parent_id == ancestor {
                return true;
            }
            current = parent.parent_id;
            hops -= 1;
            if hops == 0 {
                break;
            }
        }
        false
    }

    /// The page that owns `id`, walking the parent chain from `id`
    /// inclusive.
    pub fn owning_page(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        let mut hops = self.nodes.len() + 1;
        loop {
            let node = self.get_maybe_node(current)?;
            if node.kind == NodeKind::Page {
                return Some(current);
            }
            current = node.parent.as_ref()?.parent_id;
            hops -= 1;
            if hops == 0 {
                return None;
            }
        }
    }

    // ── Constructors ───────────────────────────────────────────────────

    /// Create a detached element node for a component type.
    ///
    /// A fresh id is allocated against this snapshot and the `props`
    /// namespace is seeded with `initial_props` wrapped as constants. The
    /// node is not inserted; pass it to [`AppDom::add_node`].
    pub fn create_element<I>(&self, component_type: &str, initial_props: I) -> AppDomNode
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let base = component_type
            .rsplit('.')
            .next()
            .unwrap_or(component_type)
            .to_lowercase();
        AppDomNode {
            id: self.fresh_id(),
            kind: NodeKind::Element,
            name: self.unique_name(&base),
            parent: None,
            namespaces: IndexMap::from([
                (
                    "attributes".to_string(),
                    AttrValues::from([(
                        "component".to_string(),
                        BindableAttrValue::constant(component_type),
                    )]),
                ),
                ("props".to_string(), from_const_values(initial_props)),
            ]),
        }
    }

    /// Create a detached node of any kind.
    ///
    /// The partial's namespaces are checked against the kind's expected
    /// shape; a violation fails with `Validation` and leaves the snapshot
    /// untouched.
    pub fn create_node(&self, kind: NodeKind, partial: NodePartial) -> DomResult<AppDomNode> {
        validate_shape(kind, &partial)?;
        let name = match &partial.name {
            Some(name) => name.clone(),
            None => self.unique_name(&kind.to_string()),
        };
        Ok(AppDomNode {
            id: self.fresh_id(),
            kind,
            name,
            parent: None,
            namespaces: partial.namespaces,
        })
    }

    // ── Mutations ──────────────────────────────────────────────────────

    /// Insert a detached node as a child of `parent_id` under slot
    /// `parent_prop`, at `index` (or after the last sibling).
    pub fn add_node(
        &self,
        node: AppDomNode,
        parent_id: NodeId,
        parent_prop: &str,
        index: Option<usize>,
    ) -> DomResult<AppDom> {
        if node.parent.is_some() {
            return Err(DomError::Validation(
                "node is already attached to a parent".to_string(),
            ));
        }
        if self.nodes.contains_key(&node.id) {
            return Err(DomError::DuplicateId(node.id));
        }
        let parent = self.get_node(parent_id)?;
        if !parent.kind.accepts_child(parent_prop, node.kind) {
            return Err(DomError::InvalidSlot {
                parent_kind: parent.kind,
                prop: parent_prop.to_string(),
                child_kind: node.kind,
            });
        }
        self.assert_slot_capacity(parent.kind, parent_id, parent_prop, None)?;
        self.assert_name_free(&node, parent_id, parent_prop, None)?;

        let parent_index = self.index_at(parent_id, parent_prop, index, None);
        debug!(node = %node.id, parent = %parent_id, prop = parent_prop, "add node");

        let mut nodes = self.nodes.clone();
        let id = node.id;
        nodes.insert(
            id,
            Arc::new(AppDomNode {
                parent: Some(ParentLink {
                    parent_id,
                    parent_prop: parent_prop.to_string(),
                    parent_index,
                }),
                ..node
            }),
        );
        Ok(self.with_nodes(nodes))
    }

    /// Move a node (with its subtree) to a new parent slot and position.
    pub fn move_node(
        &self,
        id: NodeId,
        parent_id: NodeId,
        parent_prop: &str,
        index: Option<usize>,
    ) -> DomResult<AppDom> {
        let node = self.get_node(id)?.clone();
        if node.parent.is_none() {
            return Err(DomError::Validation("cannot move the root".to_string()));
        }
        if parent_id == id || self.is_ancestor(id, parent_id) {
            return Err(DomError::WouldCycle(id));
        }
        let parent = self.get_node(parent_id)?;
        if !parent.kind.accepts_child(parent_prop, node.kind) {
            return Err(DomError::InvalidSlot {
                parent_kind: parent.kind,
                prop: parent_prop.to_string(),
                child_kind: node.kind,
            });
        }
        self.assert_slot_capacity(parent.kind, parent_id, parent_prop, Some(id))?;
        self.assert_name_free(&node, parent_id, parent_prop, Some(id))?;

        let parent_index = self.index_at(parent_id, parent_prop, index, Some(id));
        debug!(node = %id, parent = %parent_id, prop = parent_prop, "move node");

        let mut nodes = self.nodes.clone();
        nodes.insert(
            id,
            Arc::new(AppDomNode {
                parent: Some(ParentLink {
                    parent_id,
                    parent_prop: parent_prop.to_string(),
                    parent_index,
                }),
                ..node
            }),
        );
        Ok(self.with_nodes(nodes))
    }

    /// Detach a node and all its descendants.
    ///
    /// A missing id is a no-op returning an unchanged clone; callers must
    /// check existence first when absence is meaningful.
    pub fn remove_node(&self, id: NodeId) -> AppDom {
        if !self.nodes.contains_key(&id) || id == self.root {
            return self.clone();
        }
        let mut doomed: HashSet<NodeId> = self.descendant_ids(id).into_iter().collect();
        doomed.insert(id);
        debug!(node = %id, removed = doomed.len(), "remove node");

        let mut nodes = self.nodes.clone();
        nodes.retain(|node_id, _| !doomed.contains(node_id));
        self.with_nodes(nodes)
    }

    /// Replace one attribute in a namespace, leaving every other node
    /// record shared with this snapshot.
    pub fn set_namespaced_prop(
        &self,
        id: NodeId,
        namespace: &str,
        name: &str,
        value: BindableAttrValue,
    ) -> DomResult<AppDom> {
        let mut node = self.get_node(id)?.clone();
        node.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(name.to_string(), value);

        let mut nodes = self.nodes.clone();
        nodes.insert(id, Arc::new(node));
        Ok(self.with_nodes(nodes))
    }

    /// Rename a node, enforcing scope uniqueness.
    pub fn set_node_name(&self, id: NodeId, name: impl Into<String>) -> DomResult<AppDom> {
        let mut node = self.get_node(id)?.clone();
        node.name = name.into();
        if let Some(parent) = &node.parent {
            let (parent_id, parent_prop) = (parent.parent_id, parent.parent_prop.clone());
            self.assert_name_free(&node, parent_id, &parent_prop, Some(id))?;
        }
        let mut nodes = self.nodes.clone();
        nodes.insert(id, Arc::new(node));
        Ok(self.with_nodes(nodes))
    }

    // ── Invariant checking ─────────────────────────────────────────────

    /// Check the structural invariants of a whole snapshot.
    ///
    /// Used when loading persisted documents; a healthy tree produced by
    /// the mutation API always passes.
    pub fn validate(&self) -> DomResult<()> {
        let root = self
            .get_maybe_node(self.root)
            .ok_or(DomError::NotFound(self.root))?;
        if root.kind != NodeKind::App || root.parent.is_some() {
            return Err(DomError::Validation(
                "root must be an unattached app node".to_string(),
            ));
        }
        let mut seen_indexes: HashMap<(NodeId, &str), Vec<&FractionalIndex>> = HashMap::new();
        for node in self.iter() {
            if node.id == self.root {
                continue;
            }
            if node.kind == NodeKind::App {
                return Err(DomError::Validation(
                    "document has more than one app node".to_string(),
                ));
            }
            let parent_link = node.parent.as_ref().ok_or_else(|| {
                DomError::Validation(format!("node {} has no parent", node.id))
            })?;
            let parent = self.get_node(parent_link.parent_id)?;
            if !parent
                .kind
                .accepts_child(&parent_link.parent_prop, node.kind)
            {
                return Err(DomError::InvalidSlot {
                    parent_kind: parent.kind,
                    prop: parent_link.parent_prop.clone(),
                    child_kind: node.kind,
                });
            }
            if !self.is_ancestor(self.root, node.id) {
                return Err(DomError::WouldCycle(node.id));
            }
            seen_indexes
                .entry((parent_link.parent_id, parent_link.parent_prop.as_str()))
                .or_default()
                .push(&parent_link.parent_index);
        }
        for ((parent, prop), mut indexes) in seen_indexes {
            let count = indexes.len();
            indexes.sort();
            indexes.dedup();
            if indexes.len() != count {
                return Err(DomError::Validation(format!(
                    "duplicate sibling index under {parent}.{prop}"
                )));
            }
        }
        Ok(())
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn with_nodes(&self, nodes: IndexMap<NodeId, Arc<AppDomNode>>) -> AppDom {
        AppDom {
            root: self.root,
            nodes,
            revision: self.revision + 1,
        }
    }

    fn fresh_id(&self) -> NodeId {
        loop {
            let id = NodeId::generate();
            if !self.nodes.contains_key(&id) {
                return id;
            }
        }
    }

    /// Smallest numbered name `{base}{n}` not taken by any node.
    fn unique_name(&self, base: &str) -> String {
        let taken: HashSet<&str> = self.iter().map(|node| node.name.as_str()).collect();
        let mut n = 1usize;
        loop {
            let candidate = format!("{base}{n}");
            if !taken.contains(candidate.as_str()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Ordering key for a child inserted at `position` in a slot.
    /// `exclude` removes a node from the sibling list when it is being
    /// moved within the same slot.
    fn index_at(
        &self,
        parent_id: NodeId,
        parent_prop: &str,
        position: Option<usize>,
        exclude: Option<NodeId>,
    ) -> FractionalIndex {
        let siblings: Vec<&AppDomNode> = self
            .child_nodes(parent_id, parent_prop)
            .into_iter()
            .filter(|sibling| Some(sibling.id) != exclude)
            .collect();
        let at = position.unwrap_or(siblings.len()).min(siblings.len());
        let lo = at.checked_sub(1).and_then(|i| siblings.get(i));
        let hi = siblings.get(at);
        FractionalIndex::between(
            lo.and_then(|node| sibling_index(node)),
            hi.and_then(|node| sibling_index(node)),
        )
    }

    /// A statically-declared single slot holds at most one child.
    fn assert_slot_capacity(
        &self,
        parent_kind: NodeKind,
        parent_id: NodeId,
        parent_prop: &str,
        exclude: Option<NodeId>,
    ) -> DomResult<()> {
        let single = parent_kind
            .slots()
            .iter()
            .any(|slot| slot.name == parent_prop && slot.slot_type == SlotType::Single);
        if !single {
            return Ok(());
        }
        let occupied = self
            .child_nodes(parent_id, parent_prop)
            .iter()
            .any(|child| Some(child.id) != exclude);
        if occupied {
            Err(DomError::Validation(format!(
                "slot {parent_prop:?} of a {parent_kind} holds a single child"
            )))
        } else {
            Ok(())
        }
    }

    /// Name-uniqueness check for `node` about to live under
    /// (`parent_id`, `parent_prop`). Elements and query states are checked
    /// page-wide because binding paths resolve their names; everything else
    /// is checked among siblings.
    fn assert_name_free(
        &self,
        node: &AppDomNode,
        parent_id: NodeId,
        parent_prop: &str,
        exclude: Option<NodeId>,
    ) -> DomResult<()> {
        let clash = match node.kind {
            NodeKind::Element | NodeKind::QueryState => {
                let page = self.owning_page(parent_id);
                self.iter().any(|other| {
                    Some(other.id) != exclude
                        && matches!(other.kind, NodeKind::Element | NodeKind::QueryState)
                        && other.name == node.name
                        && self.owning_page(other.id) == page
                        && page.is_some()
                })
            }
            _ => self.child_nodes(parent_id, parent_prop).iter().any(|other| {
                Some(other.id) != exclude && other.name == node.name
            }),
        };
        if clash {
            Err(DomError::DuplicateName(node.name.clone()))
        } else {
            Ok(())
        }
    }
}

fn sibling_index(node: &AppDomNode) -> Option<&FractionalIndex> {
    node.parent.as_ref().map(|p| &p.parent_index)
}
