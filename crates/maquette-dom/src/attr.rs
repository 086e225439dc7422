#![forbid(unsafe_code)]

//! Bindable attribute values.
//!
//! Every node attribute is a [`BindableAttrValue`]: either a plain constant,
//! a secret, or one of three declarative forms that are resolved against
//! live page state by the binding resolver. This module only defines the
//! shapes; resolution lives in `maquette-bindings`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a bound string template is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BindingFormat {
    /// The template result is quoted as a string literal.
    StringLiteral,
    /// The template result is used as-is.
    #[default]
    Default,
}

/// A single attribute value, constant or bound.
///
/// Serialized with a `type` tag so persisted documents read naturally:
/// `{"type": "const", "value": 3}`, `{"type": "binding", "value":
/// "q1.data"}`, and so on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BindableAttrValue {
    /// A literal value.
    Const {
        /// The literal.
        value: Value,
    },
    /// A literal that must never reach client-visible resolved state.
    ///
    /// Secrets are applied server-side only; the resolver substitutes a
    /// redacted marker.
    Secret {
        /// The secret literal.
        value: Value,
    },
    /// A reference to another node's live output, `<sourceName>.<path>`.
    Binding {
        /// The dotted reference path.
        value: String,
    },
    /// A side-effect-free expression evaluated against live page state.
    JsExpression {
        /// Expression source text.
        value: String,
    },
    /// A string template with `{{ expr }}` interpolations.
    BoundExpression {
        /// Template source text.
        value: String,
        /// Optional rendering format.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<BindingFormat>,
    },
}

impl BindableAttrValue {
    /// Wrap a literal value.
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Const {
            value: value.into(),
        }
    }

    /// Wrap a secret literal.
    pub fn secret(value: impl Into<Value>) -> Self {
        Self::Secret {
            value: value.into(),
        }
    }

    /// Reference another node's live output by dotted path.
    pub fn binding(path: impl Into<String>) -> Self {
        Self::Binding { value: path.into() }
    }

    /// Wrap an expression source string.
    pub fn expression(source: impl Into<String>) -> Self {
        Self::JsExpression {
            value: source.into(),
        }
    }

    /// Wrap a string template.
    pub fn template(source: impl Into<String>) -> Self {
        Self::BoundExpression {
            value: source.into(),
            format: None,
        }
    }

    /// The literal value, if this is a `const`.
    pub fn as_const(&self) -> Option<&Value> {
        match self {
            Self::Const { value } => Some(value),
            _ => None,
        }
    }

    /// True for `secret` values.
    pub fn is_secret(&self) -> bool {
        matches!(self, Self::Secret { .. })
    }

    /// True for the declarative forms that require resolution.
    pub fn is_bound(&self) -> bool {
        matches!(
            self,
            Self::Binding { .. } | Self::JsExpression { .. } | Self::BoundExpression { .. }
        )
    }
}

/// One namespace of attribute values, iterated in insertion order.
///
/// Within a namespace each name maps to exactly one value; different
/// namespaces on the same node are disjoint, so the same name may appear
/// in `props` and `params` without conflict.
pub type AttrValues = IndexMap<String, BindableAttrValue>;

/// Seed a namespace from plain values, wrapping each as a `const`.
pub fn from_const_values<I, K>(values: I) -> AttrValues
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    values
        .into_iter()
        .map(|(k, v)| (k.into(), BindableAttrValue::constant(v)))
        .collect()
}
