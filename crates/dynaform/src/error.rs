#![forbid(unsafe_code)]

//! Configuration errors raised while building or mutating a form.
//!
//! The `try_*` mutation methods return these; the plain methods treat them
//! as programmer error and panic through [`fatal`].

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FormError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    /// A row tag is already used by another row of the same form.
    #[error("duplicate row tag '{0}'")]
    DuplicateTag(String),

    /// A position past the end of a shown sequence.
    #[error("index {index} out of bounds for {what} of length {len}")]
    IndexOutOfBounds {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// A row already owned by a section, or a section already owned by a form.
    #[error("{0} is already attached")]
    AlreadyAttached(String),

    /// The model was mutated from inside a condition evaluation.
    #[error("form mutated while a condition was being evaluated")]
    ReentrantMutation,
}

impl FormError {
    pub(crate) fn out_of_bounds(what: &'static str, index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds { what, index, len }
    }
}

/// Log and panic on a configuration error.
#[track_caller]
pub(crate) fn fatal(err: FormError) -> ! {
    tracing::error!(message = "form.configuration_error", error = %err);
    panic!("{err}");
}

/// Unwrap a `try_*` result the way the panicking API variants do.
#[track_caller]
pub(crate) fn or_fatal<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => fatal(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        assert_eq!(
            FormError::DuplicateTag("email".into()).to_string(),
            "duplicate row tag 'email'"
        );
        assert_eq!(
            FormError::out_of_bounds("section", 4, 2).to_string(),
            "index 4 out of bounds for section of length 2"
        );
    }

    #[test]
    #[should_panic(expected = "duplicate row tag 'a'")]
    fn fatal_panics_with_message() {
        or_fatal::<()>(Err(FormError::DuplicateTag("a".into())));
    }
}
