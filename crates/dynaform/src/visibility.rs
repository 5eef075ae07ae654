#![forbid(unsafe_code)]

//! Declared vs. shown sequences.
//!
//! [`ShownList`] backs both a section's rows and a form's sections. It keeps
//! every declared item in `all` and the currently visible ones in `shown`.
//!
//! # Invariants
//!
//! 1. `shown` is an order-preserving subsequence of `all`.
//! 2. [`show`](ShownList::show) inserts right after the nearest preceding
//!    declared item that is shown (or at 0), so showing an item never
//!    reorders items that were already shown.
//! 3. Both operations are idempotent: showing a shown item or hiding a
//!    hidden one changes nothing and reports `None`.

use std::ops::Range;

#[derive(Debug, Clone)]
pub(crate) struct ShownList<T> {
    all: Vec<T>,
    shown: Vec<T>,
}

impl<T> Default for ShownList<T> {
    fn default() -> Self {
        Self {
            all: Vec::new(),
            shown: Vec::new(),
        }
    }
}

impl<T: Clone + PartialEq> ShownList<T> {
    pub(crate) fn all(&self) -> &[T] {
        &self.all
    }

    pub(crate) fn shown(&self) -> &[T] {
        &self.shown
    }

    pub(crate) fn declared_position(&self, item: &T) -> Option<usize> {
        self.all.iter().position(|x| x == item)
    }

    pub(crate) fn shown_position(&self, item: &T) -> Option<usize> {
        self.shown.iter().position(|x| x == item)
    }

    /// Show `item`, returning its new shown position if it was hidden.
    ///
    /// Items that are not declared are ignored.
    pub(crate) fn show(&mut self, item: &T) -> Option<usize> {
        if self.shown.contains(item) {
            return None;
        }
        let declared = self.declared_position(item)?;
        let at = self.all[..declared]
            .iter()
            .rev()
            .find_map(|prev| self.shown_position(prev))
            .map_or(0, |p| p + 1);
        self.shown.insert(at, item.clone());
        Some(at)
    }

    /// Hide `item`, returning the shown position it left.
    pub(crate) fn hide(&mut self, item: &T) -> Option<usize> {
        let at = self.shown_position(item)?;
        self.shown.remove(at);
        Some(at)
    }

    /// Insert `items` into the declared sequence at `at`; those flagged
    /// visible are shown. Returns the shown positions of the visible ones,
    /// ascending.
    pub(crate) fn insert(&mut self, at: usize, items: Vec<(T, bool)>) -> Vec<usize> {
        let at = at.min(self.all.len());
        let visible: Vec<T> = items
            .iter()
            .filter(|(_, visible)| *visible)
            .map(|(item, _)| item.clone())
            .collect();
        for (offset, (item, _)) in items.into_iter().enumerate() {
            self.all.insert(at + offset, item);
        }
        visible.iter().filter_map(|item| self.show(item)).collect()
    }

    /// Declared index where items replacing `shown[range]` belong.
    ///
    /// The first replaced item's slot if the range is non-empty, otherwise
    /// right before the shown item at `range.end`, otherwise the end.
    pub(crate) fn anchor(&self, range: &Range<usize>) -> usize {
        let pivot = if range.is_empty() {
            self.shown.get(range.end)
        } else {
            self.shown.get(range.start)
        };
        pivot
            .and_then(|item| self.declared_position(item))
            .unwrap_or(self.all.len())
    }

    /// Remove `shown[range]` from both sequences.
    pub(crate) fn remove_shown(&mut self, range: Range<usize>) -> Vec<T> {
        let removed: Vec<T> = self.shown.drain(range).collect();
        self.all.retain(|item| !removed.contains(item));
        removed
    }

    /// Remove `item` from both sequences. Returns its former shown position
    /// (`Some(None)` if it was declared but hidden, `None` if not declared).
    pub(crate) fn remove(&mut self, item: &T) -> Option<Option<usize>> {
        let declared = self.declared_position(item)?;
        self.all.remove(declared);
        Some(self.hide(item))
    }

    /// Remove everything, returning the former declared and shown sequences.
    pub(crate) fn clear(&mut self) -> (Vec<T>, Vec<T>) {
        (std::mem::take(&mut self.all), std::mem::take(&mut self.shown))
    }

    /// Recompute `shown` from scratch.
    pub(crate) fn rebuild(&mut self, visible: impl Fn(&T) -> bool) {
        self.shown = self.all.iter().filter(|item| visible(item)).cloned().collect();
    }

    pub(crate) fn is_consistent(&self) -> bool {
        let mut declared = self.all.iter();
        self.shown
            .iter()
            .all(|item| declared.by_ref().any(|candidate| candidate == item))
    }
}
