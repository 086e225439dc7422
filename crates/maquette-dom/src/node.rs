#![forbid(unsafe_code)]

//! Typed nodes and their slot tables.
//!
//! Every entry in an app document is an [`AppDomNode`] typed by
//! [`NodeKind`]. The kind determines which named slots may hold children
//! and which attribute namespaces the node is expected to carry; both are
//! checked structurally when nodes are created and inserted.

use std::fmt;

use indexmap::IndexMap;
use maquette_core::{FractionalIndex, NodeId, SlotType};
use serde::{Deserialize, Serialize};

use crate::attr::{AttrValues, BindableAttrValue};
use crate::error::{DomError, DomResult};

/// The type of one document node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    /// The single document root.
    App,
    /// A page of the application.
    Page,
    /// A visual element on a page.
    Element,
    /// A user-authored component definition.
    CodeComponent,
    /// An app-scoped data query definition.
    Query,
    /// A page-scoped instantiation of a query, exposing live results.
    QueryState,
    /// A connection holding data-source credentials.
    Connection,
    /// The app theme.
    Theme,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::App => "app",
            NodeKind::Page => "page",
            NodeKind::Element => "element",
            NodeKind::CodeComponent => "codeComponent",
            NodeKind::Query => "query",
            NodeKind::QueryState => "queryState",
            NodeKind::Connection => "connection",
            NodeKind::Theme => "theme",
        };
        f.write_str(name)
    }
}

/// A named insertion point declared by a node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotDef {
    /// Slot name, the child's `parent_prop`.
    pub name: &'static str,
    /// Child kind accepted by the slot.
    pub accepts: NodeKind,
    /// Arity of the slot.
    pub slot_type: SlotType,
}

const APP_SLOTS: &[SlotDef] = &[
    SlotDef {
        name: "pages",
        accepts: NodeKind::Page,
        slot_type: SlotType::Multiple,
    },
    SlotDef {
        name: "queries",
        accepts: NodeKind::Query,
        slot_type: SlotType::Multiple,
    },
    SlotDef {
        name: "connections",
        accepts: NodeKind::Connection,
        slot_type: SlotType::Multiple,
    },
    SlotDef {
        name: "codeComponents",
        accepts: NodeKind::CodeComponent,
        slot_type: SlotType::Multiple,
    },
    SlotDef {
        name: "themes",
        accepts: NodeKind::Theme,
        slot_type: SlotType::Single,
    },
];

const PAGE_SLOTS: &[SlotDef] = &[
    SlotDef {
        name: "children",
        accepts: NodeKind::Element,
        slot_type: SlotType::Multiple,
    },
    SlotDef {
        name: "queryStates",
        accepts: NodeKind::QueryState,
        slot_type: SlotType::Multiple,
    },
];

impl NodeKind {
    /// The statically declared slots of this kind.
    ///
    /// Element slots are declared by the component, not the kind; see
    /// [`NodeKind::accepts_child`].
    pub fn slots(&self) -> &'static [SlotDef] {
        match self {
            NodeKind::App => APP_SLOTS,
            NodeKind::Page => PAGE_SLOTS,
            _ => &[],
        }
    }

    /// Whether a child of `child` kind may be inserted under slot `prop`.
    ///
    /// Elements accept any slot name with element children, because their
    /// slots are declared per component and validated against the component
    /// config at the runtime layer.
    pub fn accepts_child(&self, prop: &str, child: NodeKind) -> bool {
        match self {
            NodeKind::Element => child == NodeKind::Element,
            _ => self
                .slots()
                .iter()
                .any(|slot| slot.name == prop && slot.accepts == child),
        }
    }
}

/// Linkage of a node to its parent slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentLink {
    /// Owning parent node.
    pub parent_id: NodeId,
    /// Which named slot of the parent holds this node.
    pub parent_prop: String,
    /// Ordering key among siblings in the same slot.
    pub parent_index: FractionalIndex,
}

/// One typed entry in the app document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDomNode {
    /// Unique identity.
    pub id: NodeId,
    /// Node type.
    pub kind: NodeKind,
    /// Name, unique within the node's naming scope. Binding paths resolve
    /// names, not ids.
    pub name: String,
    /// Parent linkage; `None` only for the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentLink>,
    /// Disjoint attribute namespaces (`props`, `params`, `attributes`, ...).
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub namespaces: IndexMap<String, AttrValues>,
}

impl AppDomNode {
    /// Look up one attribute in a namespace.
    pub fn attr(&self, namespace: &str, name: &str) -> Option<&BindableAttrValue> {
        self.namespaces.get(namespace)?.get(name)
    }

    /// The `props` namespace, if present.
    pub fn props(&self) -> Option<&AttrValues> {
        self.namespaces.get("props")
    }

    /// The `params` namespace, if present.
    pub fn params(&self) -> Option<&AttrValues> {
        self.namespaces.get("params")
    }

    /// The `attributes` namespace, if present.
    pub fn attributes(&self) -> Option<&AttrValues> {
        self.namespaces.get("attributes")
    }

    /// The component type of an element node.
    pub fn component_type(&self) -> Option<&str> {
        self.attr("attributes", "component")?.as_const()?.as_str()
    }
}

/// Caller-supplied parts of a new node, checked by `create_node`.
#[derive(Debug, Clone, Default)]
pub struct NodePartial {
    /// Explicit name; a default is derived when absent.
    pub name: Option<String>,
    /// Attribute namespaces to seed.
    pub namespaces: IndexMap<String, AttrValues>,
}

impl NodePartial {
    /// Empty partial.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the node name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add one attribute under a namespace.
    #[must_use]
    pub fn attr(
        mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        value: BindableAttrValue,
    ) -> Self {
        self.namespaces
            .entry(namespace.into())
            .or_default()
            .insert(name.into(), value);
        self
    }

    /// Replace a whole namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>, values: AttrValues) -> Self {
        self.namespaces.insert(namespace.into(), values);
        self
    }
}

/// Check that a partial's namespaces match the structural expectations of
/// the kind. Violations reject the construction; they never corrupt an
/// existing snapshot.
pub(crate) fn validate_shape(kind: NodeKind, partial: &NodePartial) -> DomResult<()> {
    let require = |namespace: &str, name: &str| -> DomResult<()> {
        let present = partial
            .namespaces
            .get(namespace)
            .is_some_and(|ns| ns.contains_key(name));
        if present {
            Ok(())
        } else {
            Err(DomError::Validation(format!(
                "a {kind} node requires {namespace}.{name}"
            )))
        }
    };
    let require_const_string = |namespace: &str, name: &str| -> DomResult<()> {
        require(namespace, name)?;
        let ok = partial
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .and_then(BindableAttrValue::as_const)
            .is_some_and(serde_json::Value::is_string);
        if ok {
            Ok(())
        } else {
            Err(DomError::Validation(format!(
                "{namespace}.{name} of a {kind} node must be a constant string"
            )))
        }
    };

    match kind {
        NodeKind::App | NodeKind::Page | NodeKind::Theme => Ok(()),
        NodeKind::Element => require_const_string("attributes", "component"),
        NodeKind::CodeComponent => require_const_string("attributes", "code"),
        NodeKind::Query => {
            require("attributes", "connectionId")?;
            require("attributes", "query")
        }
        NodeKind::QueryState => require("attributes", "api"),
        NodeKind::Connection => require("attributes", "params"),
    }
}
