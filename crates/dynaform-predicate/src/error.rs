#![forbid(unsafe_code)]

use thiserror::Error;

use crate::lexer::Span;

pub type Result<T> = std::result::Result<T, PredicateError>;

/// A predicate string that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at byte {}", span.start)]
pub struct PredicateError {
    pub message: String,
    pub span: Span,
    pub expected: Option<Vec<&'static str>>,
}

impl PredicateError {
    #[must_use]
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            expected: None,
        }
    }

    #[must_use]
    pub fn with_expected(mut self, expected: Vec<&'static str>) -> Self {
        self.expected = Some(expected);
        self
    }
}
