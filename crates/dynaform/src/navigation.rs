#![forbid(unsafe_code)]

//! Moving between rows in display order.

use crate::form::Form;
use crate::row::BaseRow;

bitflags::bitflags! {
    /// How [`Form::navigate`] chooses the next row.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct NavigationOptions: u8 {
        /// Navigation is allowed at all.
        const ENABLED          = 0b0000_0001;
        /// Stop on disabled rows instead of skipping them.
        const STOP_AT_DISABLED = 0b0000_0010;
        /// Skip rows that cannot take focus.
        const SKIP_UNFOCUSABLE = 0b0000_0100;
    }
}

impl Default for NavigationOptions {
    fn default() -> Self {
        Self::ENABLED | Self::SKIP_UNFOCUSABLE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl Form {
    /// Shown row after `row`, across section boundaries.
    #[must_use]
    pub fn next_row(&self, row: &BaseRow) -> Option<BaseRow> {
        let rows = self.rows();
        let at = rows.iter().position(|r| r == row)?;
        rows.get(at + 1).cloned()
    }

    /// Shown row before `row`, across section boundaries.
    #[must_use]
    pub fn previous_row(&self, row: &BaseRow) -> Option<BaseRow> {
        let rows = self.rows();
        let at = rows.iter().position(|r| r == row)?;
        at.checked_sub(1).and_then(|prev| rows.get(prev).cloned())
    }

    /// Row an input cursor on `row` should move to, honouring the form's
    /// [`NavigationOptions`].
    ///
    /// Enabled focusable rows are always stops. Disabled rows are stops only
    /// with [`STOP_AT_DISABLED`](NavigationOptions::STOP_AT_DISABLED);
    /// unfocusable enabled rows are stops unless
    /// [`SKIP_UNFOCUSABLE`](NavigationOptions::SKIP_UNFOCUSABLE) is set.
    #[must_use]
    pub fn navigate(&self, row: &BaseRow, direction: Direction) -> Option<BaseRow> {
        let options = self.config().navigation;
        if !options.contains(NavigationOptions::ENABLED) {
            return None;
        }
        let rows = self.rows();
        let start = rows.iter().position(|r| r == row)?;
        let mut candidates: Box<dyn Iterator<Item = &BaseRow>> = match direction {
            Direction::Down => Box::new(rows[start + 1..].iter()),
            Direction::Up => Box::new(rows[..start].iter().rev()),
        };
        candidates.find(|next| is_stop(next, options)).cloned()
    }
}

fn is_stop(row: &BaseRow, options: NavigationOptions) -> bool {
    if row.is_disabled() {
        return options.contains(NavigationOptions::STOP_AT_DISABLED);
    }
    row.is_focusable() || !options.contains(NavigationOptions::SKIP_UNFOCUSABLE)
}
