#![forbid(unsafe_code)]

//! Sandboxed expression evaluation.
//!
//! Expressions are evaluated against a scope that exposes only the resolved
//! values of their declared dependencies; there is no ambient global
//! access. Access semantics follow the original binding language: missing
//! interior properties read as `null`, `.length` works on arrays and
//! strings, and a missing *root* name is a distinct error so the resolver
//! can classify it.

use std::fmt;

use indexmap::IndexMap;
use serde_json::{Number, Value};

use crate::expr::{BinaryOp, Expr, Template, TemplatePart, UnaryOp};

/// Name-to-value environment an expression is evaluated in.
pub type Scope = IndexMap<String, Value>;

/// Evaluation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// The expression reads a root name the scope does not provide.
    MissingSource(String),
    /// A type error or other evaluation fault.
    Type(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::MissingSource(name) => write!(f, "unknown source {name:?}"),
            EvalError::Type(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for EvalError {}

/// Truthiness of a value, following the binding language's rules.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    value.as_f64()
}

fn number_value(x: f64) -> Result<Value, EvalError> {
    Number::from_f64(x)
        .map(Value::Number)
        .ok_or_else(|| EvalError::Type("arithmetic produced a non-finite number".to_string()))
}

/// Render a value for string concatenation and templates.
///
/// Integral floats render without a decimal point, the way the original
/// binding language displays them.
pub fn display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Property access with the binding language's semantics.
pub(crate) fn member_access(value: &Value, property: &str) -> Result<Value, EvalError> {
    match value {
        Value::Null => Err(EvalError::Type(format!(
            "cannot read property {property:?} of null"
        ))),
        Value::Object(map) => Ok(map.get(property).cloned().unwrap_or(Value::Null)),
        Value::Array(items) => {
            if property == "length" {
                return Ok(Value::Number(Number::from(items.len())));
            }
            match property.parse::<usize>() {
                Ok(i) => Ok(items.get(i).cloned().unwrap_or(Value::Null)),
                Err(_) => Ok(Value::Null),
            }
        }
        Value::String(s) => {
            if property == "length" {
                Ok(Value::Number(Number::from(s.chars().count())))
            } else {
                Ok(Value::Null)
            }
        }
        Value::Bool(_) | Value::Number(_) => Ok(Value::Null),
    }
}

fn index_access(value: &Value, index: &Value) -> Result<Value, EvalError> {
    match index {
        Value::String(key) => member_access(value, key),
        Value::Number(n) => {
            let f = n.as_f64().unwrap_or(f64::NAN);
            if f.fract() != 0.0 || f < 0.0 {
                return Ok(Value::Null);
            }
            member_access(value, &format!("{}", f as u64))
        }
        other => Err(EvalError::Type(format!(
            "invalid index {}",
            display_string(other)
        ))),
    }
}

/// Evaluate an expression against a scope.
pub fn evaluate(expr: &Expr, scope: &Scope) -> Result<Value, EvalError> {
    match expr {
        Expr::Null => Ok(Value::Null),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Number(n) => number_value(*n),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Ident(name) => scope
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::MissingSource(name.clone())),
        Expr::Member { object, property } => {
            let value = evaluate(object, scope)?;
            member_access(&value, property)
        }
        Expr::Index { object, index } => {
            let value = evaluate(object, scope)?;
            let index = evaluate(index, scope)?;
            index_access(&value, &index)
        }
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, scope)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                UnaryOp::Neg => match as_number(&value) {
                    Some(n) => number_value(-n),
                    None => Err(EvalError::Type(format!(
                        "cannot negate {}",
                        display_string(&value)
                    ))),
                },
            }
        }
        Expr::Binary { op, lhs, rhs } => evaluate_binary(*op, lhs, rhs, scope),
        Expr::Ternary {
            condition,
            consequent,
            alternate,
        } => {
            let cond = evaluate(condition, scope)?;
            if truthy(&cond) {
                evaluate(consequent, scope)
            } else {
                evaluate(alternate, scope)
            }
        }
    }
}

fn evaluate_binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, scope: &Scope) -> Result<Value, EvalError> {
    // Short-circuit forms return an operand, not a boolean.
    match op {
        BinaryOp::And => {
            let left = evaluate(lhs, scope)?;
            return if truthy(&left) {
                evaluate(rhs, scope)
            } else {
                Ok(left)
            };
        }
        BinaryOp::Or => {
            let left = evaluate(lhs, scope)?;
            return if truthy(&left) {
                Ok(left)
            } else {
                evaluate(rhs, scope)
            };
        }
        _ => {}
    }

    let left = evaluate(lhs, scope)?;
    let right = evaluate(rhs, scope)?;
    match op {
        BinaryOp::Add => match (as_number(&left), as_number(&right)) {
            (Some(a), Some(b)) => number_value(a + b),
            _ if left.is_string() || right.is_string() => Ok(Value::String(format!(
                "{}{}",
                display_string(&left),
                display_string(&right)
            ))),
            _ => Err(type_error("+", &left, &right)),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (a, b) = match (as_number(&left), as_number(&right)) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(type_error(op_symbol(op), &left, &right)),
            };
            let result = match op {
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Rem => a % b,
                _ => unreachable!("arithmetic op"),
            };
            number_value(result)
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (&left, &right) {
                (Value::String(a), Value::String(b)) => a.cmp(b),
                _ => match (as_number(&left), as_number(&right)) {
                    (Some(a), Some(b)) => a
                        .partial_cmp(&b)
                        .ok_or_else(|| type_error(op_symbol(op), &left, &right))?,
                    _ => return Err(type_error(op_symbol(op), &left, &right)),
                },
            };
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::Ge => ordering.is_ge(),
                _ => unreachable!("comparison op"),
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::Ne => Ok(Value::Bool(left != right)),
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
    }
}

fn type_error(op: &str, left: &Value, right: &Value) -> EvalError {
    EvalError::Type(format!(
        "invalid operands for {op}: {} and {}",
        display_string(left),
        display_string(right)
    ))
}

/// Evaluate a string template against a scope.
pub fn evaluate_template(template: &Template, scope: &Scope) -> Result<Value, EvalError> {
    let mut out = String::new();
    for part in &template.parts {
        match part {
            TemplatePart::Literal(text) => out.push_str(text),
            TemplatePart::Expr(expr) => {
                let value = evaluate(expr, scope)?;
                out.push_str(&display_string(&value));
            }
        }
    }
    Ok(Value::String(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{parse_expression, parse_template};
    use serde_json::json;

    fn scope(entries: &[(&str, Value)]) -> Scope {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn eval(src: &str, scope: &Scope) -> Result<Value, EvalError> {
        evaluate(&parse_expression(src).unwrap(), scope)
    }

    #[test]
    fn array_length_resolves() {
        let scope = scope(&[("q1", json!({"data": [1, 2, 3]}))]);
        assert_eq!(eval("q1.data.length", &scope).unwrap(), json!(3));
    }

    #[test]
    fn missing_interior_key_is_null() {
        let scope = scope(&[("q1", json!({"data": {}}))]);
        assert_eq!(eval("q1.data.missing", &scope).unwrap(), json!(null));
    }

    #[test]
    fn missing_root_is_missing_source() {
        let scope = Scope::new();
        assert_eq!(
            eval("nope.field", &scope),
            Err(EvalError::MissingSource("nope".to_string()))
        );
    }

    #[test]
    fn property_of_null_is_a_type_error() {
        let scope = scope(&[("a", json!(null))]);
        assert!(matches!(eval("a.x", &scope), Err(EvalError::Type(_))));
    }

    #[test]
    fn index_access_on_arrays() {
        let scope = scope(&[("rows", json!([{"name": "ada"}, {"name": "grace"}]))]);
        assert_eq!(eval("rows[1].name", &scope).unwrap(), json!("grace"));
        assert_eq!(eval("rows[9]", &scope).unwrap(), json!(null));
        assert_eq!(eval("rows[0]['name']", &scope).unwrap(), json!("ada"));
    }

    #[test]
    fn arithmetic_and_precedence() {
        let scope = Scope::new();
        assert_eq!(eval("1 + 2 * 3", &scope).unwrap(), json!(7.0));
        assert_eq!(eval("(1 + 2) * 3", &scope).unwrap(), json!(9.0));
        assert_eq!(eval("7 % 4", &scope).unwrap(), json!(3.0));
    }

    #[test]
    fn string_concatenation() {
        let scope = scope(&[("n", json!(2))]);
        assert_eq!(eval("'page ' + n", &scope).unwrap(), json!("page 2"));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let scope = Scope::new();
        assert!(matches!(eval("1 / 0", &scope), Err(EvalError::Type(_))));
    }

    #[test]
    fn comparisons() {
        let scope = Scope::new();
        assert_eq!(eval("1 < 2", &scope).unwrap(), json!(true));
        assert_eq!(eval("'a' < 'b'", &scope).unwrap(), json!(true));
        assert_eq!(eval("2 >= 2", &scope).unwrap(), json!(true));
        assert!(eval("1 < 'b'", &scope).is_err());
    }

    #[test]
    fn equality_is_structural() {
        let scope = scope(&[("a", json!([1, 2])), ("b", json!([1, 2]))]);
        assert_eq!(eval("a == b", &scope).unwrap(), json!(true));
        assert_eq!(eval("a != b", &scope).unwrap(), json!(false));
    }

    #[test]
    fn logic_returns_operands() {
        let scope = scope(&[("empty", json!("")), ("name", json!("ada"))]);
        assert_eq!(eval("empty || name", &scope).unwrap(), json!("ada"));
        assert_eq!(eval("name && empty", &scope).unwrap(), json!(""));
    }

    #[test]
    fn short_circuit_skips_missing_roots() {
        let scope = scope(&[("flag", json!(false))]);
        // `missing` would fail, but the left side short-circuits.
        assert_eq!(eval("flag && missing", &scope).unwrap(), json!(false));
    }

    #[test]
    fn ternary_branches() {
        let scope = scope(&[("n", json!(3))]);
        assert_eq!(eval("n > 2 ? 'big' : 'small'", &scope).unwrap(), json!("big"));
    }

    #[test]
    fn unary_operators() {
        let scope = scope(&[("n", json!(2))]);
        assert_eq!(eval("-n", &scope).unwrap(), json!(-2.0));
        assert_eq!(eval("!n", &scope).unwrap(), json!(false));
        assert_eq!(eval("!null", &scope).unwrap(), json!(true));
        assert!(eval("-'x'", &scope).is_err());
    }

    #[test]
    fn string_length() {
        let scope = scope(&[("s", json!("héllo"))]);
        assert_eq!(eval("s.length", &scope).unwrap(), json!(5));
    }

    #[test]
    fn template_renders_parts() {
        let template = parse_template("Hello {{ user.name }}! ({{ n + 1 }})").unwrap();
        let scope = scope(&[("user", json!({"name": "Ada"})), ("n", json!(1))]);
        assert_eq!(
            evaluate_template(&template, &scope).unwrap(),
            json!("Hello Ada! (2)")
        );
    }

    #[test]
    fn template_propagates_errors() {
        let template = parse_template("{{ missing }}").unwrap();
        assert!(matches!(
            evaluate_template(&template, &Scope::new()),
            Err(EvalError::MissingSource(_))
        ));
    }
}
