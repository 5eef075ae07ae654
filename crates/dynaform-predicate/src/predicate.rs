#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{PredicateError, Result};
use crate::eval::evaluate;
use crate::parser::{Expr, parse};
use crate::value::Value;

/// A parsed, immutable predicate together with the variables it references.
///
/// The variable set is computed once at parse time so that dependency
/// tracking can key off it before the predicate is ever evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    source: String,
    expr: Expr,
    variables: BTreeSet<String>,
}

impl Predicate {
    /// Parse `source` into a predicate.
    ///
    /// # Errors
    ///
    /// Returns [`PredicateError`] if the source is not a valid predicate.
    pub fn parse(source: &str) -> Result<Self> {
        let expr = parse(source)?;
        let mut variables = BTreeSet::new();
        expr.collect_variables(&mut variables);
        Ok(Self {
            source: source.to_owned(),
            expr,
            variables,
        })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Every `$variable` referenced by the predicate, sorted and deduplicated.
    #[must_use]
    pub fn variables(&self) -> &BTreeSet<String> {
        &self.variables
    }

    #[must_use]
    pub fn references(&self, name: &str) -> bool {
        self.variables.contains(name)
    }

    /// Evaluate against a lookup function. The result is coerced by truthiness.
    pub fn evaluate(&self, lookup: impl Fn(&str) -> Value) -> bool {
        evaluate(&self.expr, &lookup).is_truthy()
    }

    /// Evaluate against a snapshot map; names absent from the map are `nil`.
    #[must_use]
    pub fn evaluate_with<S>(&self, bindings: &std::collections::HashMap<String, Value, S>) -> bool
    where
        S: std::hash::BuildHasher,
    {
        self.evaluate(|name| bindings.get(name).cloned().unwrap_or(Value::Null))
    }
}

impl FromStr for Predicate {
    type Err = PredicateError;

    fn from_str(source: &str) -> Result<Self> {
        Self::parse(source)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
