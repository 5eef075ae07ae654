#![forbid(unsafe_code)]

//! Expression evaluation.
//!
//! Evaluation is total: every expression yields a [`Value`] for any bindings.
//! Unknown variables are whatever the lookup returns (callers map missing
//! tags to [`Value::Null`]); comparisons between incomparable kinds are
//! `false` rather than errors.

use core::cmp::Ordering;

use crate::parser::{CompareOp, Expr};
use crate::value::Value;

/// Evaluate `expr`, resolving variables through `lookup`.
pub fn evaluate(expr: &Expr, lookup: &dyn Fn(&str) -> Value) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Variable(name) => lookup(name),
        Expr::List(items) => Value::List(items.iter().map(|e| evaluate(e, lookup)).collect()),
        Expr::Not(inner) => Value::Bool(!evaluate(inner, lookup).is_truthy()),
        Expr::All(terms) => Value::Bool(terms.iter().all(|t| evaluate(t, lookup).is_truthy())),
        Expr::Any(terms) => Value::Bool(terms.iter().any(|t| evaluate(t, lookup).is_truthy())),
        Expr::Compare { op, lhs, rhs } => {
            let lhs = evaluate(lhs, lookup);
            let rhs = evaluate(rhs, lookup);
            Value::Bool(compare(*op, &lhs, &rhs))
        }
    }
}

/// Apply a comparison operator to two evaluated operands.
#[must_use]
pub fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> bool {
    match op {
        CompareOp::Eq => lhs.loose_eq(rhs),
        CompareOp::Ne => !lhs.loose_eq(rhs),
        CompareOp::Lt => lhs.loose_cmp(rhs) == Some(Ordering::Less),
        CompareOp::Le => matches!(
            lhs.loose_cmp(rhs),
            Some(Ordering::Less | Ordering::Equal)
        ),
        CompareOp::Gt => lhs.loose_cmp(rhs) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(
            lhs.loose_cmp(rhs),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CompareOp::Contains => contains(lhs, rhs),
        CompareOp::In => contains(rhs, lhs),
        CompareOp::BeginsWith => match (lhs, rhs) {
            (Value::Text(s), Value::Text(prefix)) => s.starts_with(prefix.as_str()),
            _ => false,
        },
        CompareOp::EndsWith => match (lhs, rhs) {
            (Value::Text(s), Value::Text(suffix)) => s.ends_with(suffix.as_str()),
            _ => false,
        },
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Text(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        Value::List(items) => items.iter().any(|item| item.loose_eq(needle)),
        _ => false,
    }
}
