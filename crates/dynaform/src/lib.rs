#![forbid(unsafe_code)]

//! Declarative dynamic forms: sections of typed rows whose visibility and
//! enablement depend on other rows' values, with minimal-diff change
//! notifications for an incremental view layer.
//!
//! ```
//! use dynaform::{ChangeLog, Condition, Form, Row, Section};
//!
//! let has_pet = Row::<bool>::new("has_pet").with_value(false);
//! let pet_name = Row::<String>::new("pet_name").with_hidden(Condition::predicate("NOT $has_pet"));
//!
//! let section = Section::new().with_row(&has_pet).with_row(&pet_name);
//! let form = Form::new().with_section(section.clone());
//! assert_eq!(section.len(), 1);
//!
//! let log = ChangeLog::new();
//! form.set_delegate(&log);
//! has_pet.set_value(true);
//!
//! assert_eq!(section.len(), 2);
//! assert_eq!(pet_name.index_path().map(|p| p.row), Some(1));
//! assert_eq!(log.len(), 2); // value_changed, rows_added
//! ```

pub mod change;
pub mod condition;
pub mod config;
pub mod error;
pub mod form;
pub mod navigation;
pub mod registry;
pub mod row;
pub mod section;
mod visibility;

pub use change::{Change, ChangeKind, ChangeLog, FormDelegate, IndexPath};
pub use condition::{Condition, ConditionKind};
pub use config::FormConfig;
pub use dynaform_predicate::{Predicate, PredicateError, Value};
pub use error::{FormError, Result};
pub use form::Form;
pub use navigation::{Direction, NavigationOptions};
pub use registry::NodeId;
pub use row::{BaseRow, Row, RowValue};
pub use section::Section;
