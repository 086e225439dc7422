#![forbid(unsafe_code)]

//! Per-node runtime failure record.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A failure produced while evaluating or rendering a single node.
///
/// Runtime errors are captured, attached to the offending node's state, and
/// displayed inline; they never propagate to sibling or ancestor nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeError {
    /// Human-readable failure message.
    pub message: String,
    /// Stack or location information, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl RuntimeError {
    /// Create an error from a message alone.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    /// Extract an error from a caught panic payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::new(message)
    }

    /// Attach stack or location information.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_str_panic() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(RuntimeError::from_panic(payload).message, "boom");
    }

    #[test]
    fn extracts_string_panic() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom".to_string());
        assert_eq!(RuntimeError::from_panic(payload).message, "boom");
    }

    #[test]
    fn unknown_payload_gets_placeholder() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(17u32);
        assert_eq!(RuntimeError::from_panic(payload).message, "unknown panic");
    }

    #[test]
    fn stack_is_optional_in_json() {
        let err = RuntimeError::new("x");
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, r#"{"message":"x"}"#);
    }
}
