#![forbid(unsafe_code)]

//! Change notifications.
//!
//! Every mutation that changes a shown sequence builds exactly one
//! [`Change`] describing what moved and where, then hands it to the form's
//! [`FormDelegate`]. Positions always refer to the *shown* sequences at the
//! moment the change is delivered.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use dynaform_predicate::Value;

use crate::row::BaseRow;
use crate::section::Section;

/// Position of a row in the shown structure: shown section index, then shown
/// row index inside that section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexPath {
    pub section: usize,
    pub row: usize,
}

impl IndexPath {
    #[must_use]
    pub const fn new(section: usize, row: usize) -> Self {
        Self { section, row }
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.section, self.row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Removed,
    Replaced,
}

/// One structural or value notification.
#[derive(Debug, Clone)]
pub enum Change {
    SectionsAdded {
        sections: Vec<Section>,
        indices: Vec<usize>,
    },
    SectionsRemoved {
        sections: Vec<Section>,
        indices: Vec<usize>,
    },
    /// `old` occupied the shown indices starting at `indices[0]` before the
    /// change; `indices` are where `new` is shown now. The lengths may differ.
    SectionsReplaced {
        old: Vec<Section>,
        new: Vec<Section>,
        indices: Vec<usize>,
    },
    RowsAdded {
        rows: Vec<BaseRow>,
        paths: Vec<IndexPath>,
    },
    RowsRemoved {
        rows: Vec<BaseRow>,
        paths: Vec<IndexPath>,
    },
    /// `old` occupied the shown rows starting at `paths[0]` before the
    /// change; `paths` are where `new` is shown now. The lengths may differ.
    RowsReplaced {
        old: Vec<BaseRow>,
        new: Vec<BaseRow>,
        paths: Vec<IndexPath>,
    },
    ValueChanged {
        row: BaseRow,
        old: Value,
        new: Value,
    },
    FocusReleased {
        row: BaseRow,
    },
}

impl Change {
    /// Structural kind, `None` for value and focus notifications.
    #[must_use]
    pub fn kind(&self) -> Option<ChangeKind> {
        match self {
            Self::SectionsAdded { .. } | Self::RowsAdded { .. } => Some(ChangeKind::Added),
            Self::SectionsRemoved { .. } | Self::RowsRemoved { .. } => Some(ChangeKind::Removed),
            Self::SectionsReplaced { .. } | Self::RowsReplaced { .. } => {
                Some(ChangeKind::Replaced)
            }
            Self::ValueChanged { .. } | Self::FocusReleased { .. } => None,
        }
    }

    /// Shown section indices for section changes.
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        match self {
            Self::SectionsAdded { indices, .. }
            | Self::SectionsRemoved { indices, .. }
            | Self::SectionsReplaced { indices, .. } => indices,
            _ => &[],
        }
    }

    /// Index paths for row changes.
    #[must_use]
    pub fn paths(&self) -> &[IndexPath] {
        match self {
            Self::RowsAdded { paths, .. }
            | Self::RowsRemoved { paths, .. }
            | Self::RowsReplaced { paths, .. } => paths,
            _ => &[],
        }
    }

    /// Event name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SectionsAdded { .. } => "form.sections_added",
            Self::SectionsRemoved { .. } => "form.sections_removed",
            Self::SectionsReplaced { .. } => "form.sections_replaced",
            Self::RowsAdded { .. } => "form.rows_added",
            Self::RowsRemoved { .. } => "form.rows_removed",
            Self::RowsReplaced { .. } => "form.rows_replaced",
            Self::ValueChanged { .. } => "form.value_changed",
            Self::FocusReleased { .. } => "form.focus_released",
        }
    }

    pub(crate) fn deliver(&self, delegate: &dyn FormDelegate) {
        match self {
            Self::SectionsAdded { sections, indices } => delegate.sections_added(sections, indices),
            Self::SectionsRemoved { sections, indices } => {
                delegate.sections_removed(sections, indices);
            }
            Self::SectionsReplaced { old, new, indices } => {
                delegate.sections_replaced(old, new, indices);
            }
            Self::RowsAdded { rows, paths } => delegate.rows_added(rows, paths),
            Self::RowsRemoved { rows, paths } => delegate.rows_removed(rows, paths),
            Self::RowsReplaced { old, new, paths } => delegate.rows_replaced(old, new, paths),
            Self::ValueChanged { row, old, new } => delegate.row_value_changed(row, old, new),
            Self::FocusReleased { row } => delegate.release_focus(row),
        }
    }
}

/// Receiver of form notifications, typically the view layer.
///
/// Every method has an empty default so implementors pick what they need.
/// Calls are synchronous and arrive in program order. Implementations may
/// mutate the form; the mutation's own notifications are delivered before
/// the outer call returns.
pub trait FormDelegate {
    fn sections_added(&self, _sections: &[Section], _indices: &[usize]) {}
    fn sections_removed(&self, _sections: &[Section], _indices: &[usize]) {}
    fn sections_replaced(&self, _old: &[Section], _new: &[Section], _indices: &[usize]) {}
    fn rows_added(&self, _rows: &[BaseRow], _paths: &[IndexPath]) {}
    fn rows_removed(&self, _rows: &[BaseRow], _paths: &[IndexPath]) {}
    fn rows_replaced(&self, _old: &[BaseRow], _new: &[BaseRow], _paths: &[IndexPath]) {}
    fn row_value_changed(&self, _row: &BaseRow, _old: &Value, _new: &Value) {}
    /// The row is about to be hidden or removed while it holds focus.
    fn release_focus(&self, _row: &BaseRow) {}
}

/// Delegate that records every notification it receives.
#[derive(Debug, Default)]
pub struct ChangeLog {
    changes: RefCell<Vec<Change>>,
}

impl ChangeLog {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    #[must_use]
    pub fn changes(&self) -> Vec<Change> {
        self.changes.borrow().clone()
    }

    /// Drain the recorded changes.
    pub fn take(&self) -> Vec<Change> {
        std::mem::take(&mut *self.changes.borrow_mut())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.borrow().is_empty()
    }

    fn push(&self, change: Change) {
        self.changes.borrow_mut().push(change);
    }
}

impl FormDelegate for ChangeLog {
    fn sections_added(&self, sections: &[Section], indices: &[usize]) {
        self.push(Change::SectionsAdded {
            sections: sections.to_vec(),
            indices: indices.to_vec(),
        });
    }

    fn sections_removed(&self, sections: &[Section], indices: &[usize]) {
        self.push(Change::SectionsRemoved {
            sections: sections.to_vec(),
            indices: indices.to_vec(),
        });
    }

    fn sections_replaced(&self, old: &[Section], new: &[Section], indices: &[usize]) {
        self.push(Change::SectionsReplaced {
            old: old.to_vec(),
            new: new.to_vec(),
            indices: indices.to_vec(),
        });
    }

    fn rows_added(&self, rows: &[BaseRow], paths: &[IndexPath]) {
        self.push(Change::RowsAdded {
            rows: rows.to_vec(),
            paths: paths.to_vec(),
        });
    }

    fn rows_removed(&self, rows: &[BaseRow], paths: &[IndexPath]) {
        self.push(Change::RowsRemoved {
            rows: rows.to_vec(),
            paths: paths.to_vec(),
        });
    }

    fn rows_replaced(&self, old: &[BaseRow], new: &[BaseRow], paths: &[IndexPath]) {
        self.push(Change::RowsReplaced {
            old: old.to_vec(),
            new: new.to_vec(),
            paths: paths.to_vec(),
        });
    }

    fn row_value_changed(&self, row: &BaseRow, old: &Value, new: &Value) {
        self.push(Change::ValueChanged {
            row: row.clone(),
            old: old.clone(),
            new: new.clone(),
        });
    }

    fn release_focus(&self, row: &BaseRow) {
        self.push(Change::FocusReleased { row: row.clone() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_path_orders_by_section_then_row() {
        assert!(IndexPath::new(0, 5) < IndexPath::new(1, 0));
        assert_eq!(IndexPath::new(2, 3).to_string(), "[2, 3]");
    }

    #[test]
    fn change_log_records_and_drains() {
        let log = ChangeLog::new();
        let section = Section::new();
        log.sections_added(std::slice::from_ref(&section), &[0]);
        log.rows_removed(&[], &[]);
        assert_eq!(log.len(), 2);

        let changes = log.take();
        assert!(log.is_empty());
        assert_eq!(changes[0].kind(), Some(ChangeKind::Added));
        assert_eq!(changes[0].indices(), &[0]);
        assert_eq!(changes[1].name(), "form.rows_removed");
    }

    #[test]
    fn deliver_routes_to_matching_method() {
        let log = ChangeLog::new();
        let change = Change::RowsReplaced {
            old: Vec::new(),
            new: Vec::new(),
            paths: vec![IndexPath::new(0, 1)],
        };
        change.deliver(&*log);
        let recorded = log.changes();
        assert_eq!(recorded[0].kind(), Some(ChangeKind::Replaced));
        assert_eq!(recorded[0].paths(), &[IndexPath::new(0, 1)]);
    }
}
