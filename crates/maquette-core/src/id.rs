#![forbid(unsafe_code)]

//! Opaque node identity.
//!
//! A [`NodeId`] names one node in an app document. Ids are globally unique,
//! never reused after deletion, and carry no structural meaning: code must
//! never derive hierarchy or ordering from the token itself.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifier of a single node in an app document.
///
/// Serializes as its canonical 26-character string, which is also the form
/// used as a JSON object key in persisted documents.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Ulid);

impl NodeId {
    /// Allocate a fresh, globally unique id.
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// The canonical string form.
    pub fn to_canonical(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Error returned when parsing a [`NodeId`] from a malformed string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseNodeIdError {
    input: String,
}

impl fmt::Display for ParseNodeIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid node id: {:?}", self.input)
    }
}

impl std::error::Error for ParseNodeIdError {}

impl FromStr for NodeId {
    type Err = ParseNodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self).map_err(|_| ParseNodeIdError {
            input: s.to_string(),
        })
    }
}
