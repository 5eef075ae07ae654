#![forbid(unsafe_code)]

//! Hidden/disabled conditions.
//!
//! A [`Condition`] is immutable once built and knows up front which row tags
//! it reads, so the form can register dependencies before the first
//! evaluation.
//!
//! # Invariants
//!
//! 1. Evaluation never mutates the form; any mutation attempted while a
//!    condition is being evaluated panics.
//! 2. Tags referenced by a predicate but absent from the form read as
//!    [`Value::Null`].

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use dynaform_predicate::{Predicate, PredicateError, Value};

use crate::form::Form;

static NO_TAGS: BTreeSet<String> = BTreeSet::new();

/// Which cached flag a condition drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    Hidden,
    Disabled,
}

impl ConditionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hidden => "hidden",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A boolean expression over the values of tagged rows.
#[derive(Clone)]
pub enum Condition {
    /// Constant result.
    Always(bool),
    /// Parsed predicate string; its `$tag` variables are the dependencies.
    Predicate(Predicate),
    /// Closure over the form with an explicit dependency set.
    Function {
        tags: BTreeSet<String>,
        eval: Rc<dyn Fn(&Form) -> bool>,
    },
}

impl Condition {
    /// Parse a predicate condition such as `"$age < 18"`.
    ///
    /// # Panics
    ///
    /// Panics if `source` is not a valid predicate. Use
    /// [`try_predicate`](Self::try_predicate) to handle the error.
    #[must_use]
    #[track_caller]
    pub fn predicate(source: &str) -> Self {
        match Self::try_predicate(source) {
            Ok(condition) => condition,
            Err(err) => {
                tracing::error!(message = "form.invalid_predicate", source, error = %err);
                panic!("invalid predicate {source:?}: {err}");
            }
        }
    }

    pub fn try_predicate(source: &str) -> Result<Self, PredicateError> {
        Predicate::parse(source).map(Self::Predicate)
    }

    /// A closure condition depending on `tags`.
    ///
    /// The closure only reads the form. Tags it reads but does not list are
    /// not tracked, so changes to them never trigger a re-evaluation.
    pub fn function<I, S, F>(tags: I, eval: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&Form) -> bool + 'static,
    {
        Self::Function {
            tags: tags.into_iter().map(Into::into).collect(),
            eval: Rc::new(eval),
        }
    }

    /// Tags whose value changes must re-evaluate this condition.
    #[must_use]
    pub fn referenced_tags(&self) -> &BTreeSet<String> {
        match self {
            Self::Always(_) => &NO_TAGS,
            Self::Predicate(predicate) => predicate.variables(),
            Self::Function { tags, .. } => tags,
        }
    }

    /// Evaluate against the current values of `form`.
    ///
    /// The form is locked against mutation for the duration of the call.
    #[must_use]
    pub fn evaluate(&self, form: &Form) -> bool {
        let _guard = form.enter_evaluation();
        match self {
            Self::Always(value) => *value,
            Self::Predicate(predicate) => predicate.evaluate(|tag| form.value_of(tag)),
            Self::Function { eval, .. } => eval(form),
        }
    }

    /// Evaluate without a form: tags read as `nil` and closures are skipped
    /// (treated as `false`).
    pub(crate) fn evaluate_detached(&self) -> bool {
        match self {
            Self::Always(value) => *value,
            Self::Predicate(predicate) => predicate.evaluate(|_| Value::Null),
            Self::Function { .. } => false,
        }
    }
}

impl From<bool> for Condition {
    fn from(value: bool) -> Self {
        Self::Always(value)
    }
}

impl From<Predicate> for Condition {
    fn from(predicate: Predicate) -> Self {
        Self::Predicate(predicate)
    }
}

impl FromStr for Condition {
    type Err = PredicateError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Self::try_predicate(source)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always(value) => f.debug_tuple("Always").field(value).finish(),
            Self::Predicate(predicate) => f.debug_tuple("Predicate").field(&predicate.source()).finish(),
            Self::Function { tags, .. } => f
                .debug_struct("Function")
                .field("tags", tags)
                .finish_non_exhaustive(),
        }
    }
}
