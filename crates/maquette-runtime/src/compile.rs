#![forbid(unsafe_code)]

//! The code-component compile boundary.
//!
//! User-authored component source is compiled to an executable module by
//! an external service; this module only defines the contract and the
//! loading path. A failed compile surfaces as that component's error and
//! is rendered through the node boundary like any other per-node failure,
//! never as a process crash.

use std::fmt;

use indexmap::IndexMap;
use maquette_core::NodeId;
use maquette_dom::{AppDom, NodeKind};
use tracing::warn;

/// Compilation failure for one code component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    /// Compiler output.
    pub message: String,
}

impl CompileError {
    /// Create an error from compiler output.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "compile error: {}", self.message)
    }
}

impl std::error::Error for CompileError {}

/// External compile service: source code in, executable module code out.
pub trait CompileService: Send + Sync {
    /// Compile one component's source.
    fn compile(&self, source: &str) -> Result<String, CompileError>;
}

/// Identity compiler for hosts that execute source directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCompiler;

impl CompileService for PassthroughCompiler {
    fn compile(&self, source: &str) -> Result<String, CompileError> {
        Ok(source.to_string())
    }
}

/// A successfully compiled code component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledComponent {
    /// The defining node.
    pub node_id: NodeId,
    /// Component name.
    pub name: String,
    /// Executable module code.
    pub module: String,
}

/// Compile every code component of an app.
///
/// Failures are collected per component; one broken component never
/// prevents the others from loading.
pub fn load_code_components(
    dom: &AppDom,
    service: &dyn CompileService,
) -> (Vec<CompiledComponent>, IndexMap<NodeId, CompileError>) {
    let mut compiled = Vec::new();
    let mut errors = IndexMap::new();
    for node in dom.iter() {
        if node.kind != NodeKind::CodeComponent {
            continue;
        }
        let source = node
            .attr("attributes", "code")
            .and_then(|attr| attr.as_const())
            .and_then(|value| value.as_str())
            .unwrap_or_default();
        match service.compile(source) {
            Ok(module) => compiled.push(CompiledComponent {
                node_id: node.id,
                name: node.name.clone(),
                module,
            }),
            Err(error) => {
                warn!(node = %node.id, component = node.name.as_str(), %error, "code component failed to compile");
                errors.insert(node.id, error);
            }
        }
    }
    (compiled, errors)
}
