#![forbid(unsafe_code)]

//! Value model and predicate language for dynaform conditions.
//!
//! A predicate is a small boolean expression over `$tag` variables:
//!
//! ```
//! use dynaform_predicate::{Predicate, Value};
//!
//! let predicate = Predicate::parse("$age >= 18 AND $country IN {'NL', 'BE'}").unwrap();
//! assert!(predicate.references("age"));
//!
//! let adult_in_benelux = predicate.evaluate(|tag| match tag {
//!     "age" => Value::Int(21),
//!     "country" => Value::from("NL"),
//!     _ => Value::Null,
//! });
//! assert!(adult_in_benelux);
//! ```
//!
//! Evaluation is total: unknown variables read as `nil` and mismatched
//! comparisons are simply false.

pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod predicate;
pub mod value;

pub use error::{PredicateError, Result};
pub use lexer::Span;
pub use parser::{CompareOp, Expr, MAX_DEPTH};
pub use predicate::Predicate;
pub use value::Value;
