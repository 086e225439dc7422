#![forbid(unsafe_code)]

//! The Maquette binding language and live state engine.
//!
//! Bound attributes declare references into live page state; this crate
//! parses them, orders them by dependency, evaluates them in a sandboxed
//! scope, and assembles the per-page [`PageViewState`] the editor and
//! runtime consume.
//!
//! - [`expr`] - the expression grammar, binding paths, and templates
//! - [`eval`] - sandboxed evaluation over JSON values
//! - [`resolver`] - dependency graph, cycle detection, error containment,
//!   and incremental recomputation

pub mod eval;
pub mod expr;
pub mod resolver;

pub use eval::{EvalError, Scope, evaluate, evaluate_template};
pub use expr::{
    BindingPath, Expr, ParseError, Template, parse_binding_path, parse_expression, parse_template,
};
pub use resolver::{
    BindingError, DependencyIndex, LiveBinding, LiveBindings, NodeInfo, PageViewState, Resolver,
    SECRET_PLACEHOLDER, Sources,
};
