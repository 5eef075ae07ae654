#![forbid(unsafe_code)]

//! Sections: ordered row containers with an optional hidden condition.
//!
//! Positions passed to the mutation API index the *shown* rows, the same
//! sequence the view layer displays. Hidden rows keep their declared slot and
//! reappear there when shown again.
//!
//! # Invariants
//!
//! 1. The shown rows are an order-preserving subsequence of the declared rows.
//! 2. A declared row is shown iff its hidden cache is `false`.
//! 3. Each structural mutation emits at most one notification, and only
//!    while the section itself is shown in a form.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Range;
use std::rc::{Rc, Weak};

use crate::change::{Change, IndexPath};
use crate::condition::{Condition, ConditionKind};
use crate::error::{FormError, Result, or_fatal};
use crate::form::{Form, FormCore};
use crate::registry::{NodeId, Observer};
use crate::row::{BaseRow, Row, RowValue};
use crate::visibility::ShownList;

pub(crate) struct SectionCore {
    this: Weak<SectionCore>,
    id: NodeId,
    tag: Option<String>,
    header: RefCell<Option<String>>,
    footer: RefCell<Option<String>>,
    hidden: RefCell<Option<Rc<Condition>>>,
    hidden_cache: Cell<bool>,
    rows: RefCell<ShownList<BaseRow>>,
    form: RefCell<Weak<FormCore>>,
}

impl SectionCore {
    fn new(tag: Option<String>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            id: NodeId::next(),
            tag,
            header: RefCell::new(None),
            footer: RefCell::new(None),
            hidden: RefCell::new(None),
            hidden_cache: Cell::new(false),
            rows: RefCell::new(ShownList::default()),
            form: RefCell::new(Weak::new()),
        })
    }

    fn compute_hidden(&self, form: Option<&Form>) -> bool {
        let condition = self.hidden.borrow().clone();
        let Some(condition) = condition else {
            return false;
        };
        let result = match form {
            Some(form) => condition.evaluate(form),
            None => condition.evaluate_detached(),
        };
        tracing::trace!(
            message = "form.condition_evaluated",
            node = self.id.get(),
            tag = self.tag.as_deref().unwrap_or(""),
            kind = ConditionKind::Hidden.as_str(),
            result
        );
        result
    }
}

impl Observer for SectionCore {
    fn evaluate_hidden(&self) {
        let Some(section) = self.this.upgrade().map(Section) else {
            return;
        };
        let form = section.form();
        let hidden = self.compute_hidden(form.as_ref());
        self.hidden_cache.set(hidden);
        if let Some(form) = form {
            if hidden {
                form.hide_section(&section);
            } else {
                form.show_section(&section);
            }
        }
    }

    fn evaluate_disabled(&self) {}
}

/// Section handle. Clones share the same section; equality is identity.
#[derive(Clone)]
pub struct Section(pub(crate) Rc<SectionCore>);

impl Default for Section {
    fn default() -> Self {
        Self::new()
    }
}

impl Section {
    #[must_use]
    pub fn new() -> Self {
        Self(SectionCore::new(None))
    }

    /// A section that can be found with [`Form::section_by_tag`].
    #[must_use]
    pub fn tagged(tag: impl Into<String>) -> Self {
        Self(SectionCore::new(Some(tag.into())))
    }

    #[must_use]
    pub fn with_header(self, header: impl Into<String>) -> Self {
        self.set_header(Some(header.into()));
        self
    }

    #[must_use]
    pub fn with_footer(self, footer: impl Into<String>) -> Self {
        self.set_footer(Some(footer.into()));
        self
    }

    #[must_use]
    pub fn with_hidden(self, condition: impl Into<Condition>) -> Self {
        self.set_hidden(Some(condition.into()));
        self
    }

    /// Append a row, builder style.
    ///
    /// # Panics
    ///
    /// Panics on the same configuration errors as [`append`](Self::append).
    #[must_use]
    #[track_caller]
    pub fn with_row(self, row: impl Into<BaseRow>) -> Self {
        self.append(row);
        self
    }

    /// Append several rows, builder style.
    ///
    /// # Panics
    ///
    /// Panics on the same configuration errors as [`append`](Self::append).
    #[must_use]
    #[track_caller]
    pub fn with_rows<I>(self, rows: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<BaseRow>,
    {
        self.append_all(rows);
        self
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.0.id
    }

    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.0.tag.as_deref()
    }

    #[must_use]
    pub fn header(&self) -> Option<String> {
        self.0.header.borrow().clone()
    }

    pub fn set_header(&self, header: Option<String>) {
        *self.0.header.borrow_mut() = header;
    }

    #[must_use]
    pub fn footer(&self) -> Option<String> {
        self.0.footer.borrow().clone()
    }

    pub fn set_footer(&self, footer: Option<String>) {
        *self.0.footer.borrow_mut() = footer;
    }

    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.0.hidden_cache.get()
    }

    #[must_use]
    pub fn hidden_condition(&self) -> Option<Condition> {
        self.0.hidden.borrow().as_ref().map(|c| (**c).clone())
    }

    /// Replace the hidden condition and re-evaluate it.
    ///
    /// # Panics
    ///
    /// Panics if called while the form is evaluating a condition.
    pub fn set_hidden(&self, condition: Option<Condition>) {
        let form = self.form();
        if let Some(form) = &form {
            form.assert_mutable();
            let old = self.0.hidden.borrow().clone();
            form.unregister(self.id(), old.as_deref(), ConditionKind::Hidden);
        }
        *self.0.hidden.borrow_mut() = condition.map(Rc::new);
        if let Some(form) = &form {
            self.register_condition(form);
        }
        self.0.evaluate_hidden();
    }

    #[must_use]
    pub fn form(&self) -> Option<Form> {
        self.0.form.borrow().upgrade().map(Form::from_core)
    }

    /// Position among the form's shown sections.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.form()?.section_position(self)
    }

    /// Number of shown rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.rows.borrow().shown().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shown row at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<BaseRow> {
        self.0.rows.borrow().shown().get(index).cloned()
    }

    /// Shown row at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is past the end of the shown rows.
    #[must_use]
    #[track_caller]
    pub fn row(&self, index: usize) -> BaseRow {
        let len = self.len();
        or_fatal(
            self.get(index)
                .ok_or(FormError::out_of_bounds("section", index, len)),
        )
    }

    /// Shown rows in display order.
    #[must_use]
    pub fn rows(&self) -> Vec<BaseRow> {
        self.0.rows.borrow().shown().to_vec()
    }

    /// Every declared row, hidden ones included, in declared order.
    #[must_use]
    pub fn all_rows(&self) -> Vec<BaseRow> {
        self.0.rows.borrow().all().to_vec()
    }

    #[must_use]
    pub fn base_row_by_tag(&self, tag: &str) -> Option<BaseRow> {
        self.0
            .rows
            .borrow()
            .all()
            .iter()
            .find(|row| row.tag() == Some(tag))
            .cloned()
    }

    /// Declared row tagged `tag` holding a `T`.
    #[must_use]
    pub fn row_by_tag<T: RowValue>(&self, tag: &str) -> Option<Row<T>> {
        self.base_row_by_tag(tag)?.downcast()
    }

    /// # Panics
    ///
    /// Panics on a configuration error; see [`try_append`](Self::try_append).
    #[track_caller]
    pub fn append(&self, row: impl Into<BaseRow>) {
        self.append_all([row]);
    }

    /// Append `row` after every declared row.
    ///
    /// # Errors
    ///
    /// [`FormError::AlreadyAttached`] if the row is in a section,
    /// [`FormError::DuplicateTag`] if its tag is taken in the form.
    pub fn try_append(&self, row: impl Into<BaseRow>) -> Result<()> {
        self.try_append_all([row])
    }

    /// # Panics
    ///
    /// Panics on a configuration error; see [`try_append_all`](Self::try_append_all).
    #[track_caller]
    pub fn append_all<I>(&self, rows: I)
    where
        I: IntoIterator,
        I::Item: Into<BaseRow>,
    {
        or_fatal(self.try_append_all(rows));
    }

    /// Append `rows` in one batch; visible ones are announced in a single
    /// `rows_added` notification.
    ///
    /// # Errors
    ///
    /// As [`try_append`](Self::try_append); nothing is appended on error.
    pub fn try_append_all<I>(&self, rows: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<BaseRow>,
    {
        let len = self.len();
        self.try_replace_range(len..len, rows).map(drop)
    }

    /// # Panics
    ///
    /// Panics on a configuration error; see [`try_insert`](Self::try_insert).
    #[track_caller]
    pub fn insert(&self, index: usize, row: impl Into<BaseRow>) {
        or_fatal(self.try_insert(index, row));
    }

    /// Insert `row` before the shown row at `index` (`index == len` appends).
    ///
    /// # Errors
    ///
    /// [`FormError::IndexOutOfBounds`] if `index > len`, plus the errors of
    /// [`try_append`](Self::try_append).
    pub fn try_insert(&self, index: usize, row: impl Into<BaseRow>) -> Result<()> {
        self.try_replace_range(index..index, [row]).map(drop)
    }

    /// # Panics
    ///
    /// Panics on a configuration error; see [`try_set`](Self::try_set).
    #[track_caller]
    pub fn set(&self, index: usize, row: impl Into<BaseRow>) -> BaseRow {
        or_fatal(self.try_set(index, row))
    }

    /// Replace the shown row at `index`, returning the old row.
    ///
    /// # Errors
    ///
    /// [`FormError::IndexOutOfBounds`] if `index >= len`, plus the errors of
    /// [`try_append`](Self::try_append).
    pub fn try_set(&self, index: usize, row: impl Into<BaseRow>) -> Result<BaseRow> {
        let len = self.len();
        if index >= len {
            return Err(FormError::out_of_bounds("section", index, len));
        }
        let mut removed = self.try_replace_range(index..index + 1, [row])?;
        Ok(removed.remove(0))
    }

    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[track_caller]
    pub fn remove(&self, index: usize) -> BaseRow {
        or_fatal(self.try_remove(index))
    }

    pub fn try_remove(&self, index: usize) -> Result<BaseRow> {
        let len = self.len();
        if index >= len {
            return Err(FormError::out_of_bounds("section", index, len));
        }
        let mut removed = self.try_replace_range(index..index + 1, Vec::<BaseRow>::new())?;
        Ok(removed.remove(0))
    }

    /// # Panics
    ///
    /// Panics if `range` is out of bounds.
    #[track_caller]
    pub fn remove_range(&self, range: Range<usize>) -> Vec<BaseRow> {
        or_fatal(self.try_replace_range(range, Vec::<BaseRow>::new()))
    }

    /// # Panics
    ///
    /// Panics on a configuration error; see
    /// [`try_replace_range`](Self::try_replace_range).
    #[track_caller]
    pub fn replace_range<I>(&self, range: Range<usize>, rows: I) -> Vec<BaseRow>
    where
        I: IntoIterator,
        I::Item: Into<BaseRow>,
    {
        or_fatal(self.try_replace_range(range, rows))
    }

    /// Replace the shown rows in `range` with `rows`, returning the removed
    /// rows.
    ///
    /// New rows take the declared slot of the first replaced row, or the slot
    /// right before the shown row at `range.end` when nothing is replaced.
    /// Emits one notification: `rows_replaced` when shown rows leave and
    /// visible rows arrive, otherwise `rows_added` or `rows_removed`.
    ///
    /// # Errors
    ///
    /// [`FormError::IndexOutOfBounds`] for a range outside the shown rows,
    /// [`FormError::AlreadyAttached`], [`FormError::DuplicateTag`], or
    /// [`FormError::ReentrantMutation`]. The section is unchanged on error.
    pub fn try_replace_range<I>(&self, range: Range<usize>, rows: I) -> Result<Vec<BaseRow>>
    where
        I: IntoIterator,
        I::Item: Into<BaseRow>,
    {
        let incoming: Vec<BaseRow> = rows.into_iter().map(Into::into).collect();
        let form = self.form();
        if let Some(form) = &form {
            form.check_mutable()?;
        }
        let len = self.len();
        if range.start > range.end || range.end > len {
            return Err(FormError::out_of_bounds(
                "section",
                range.start.max(range.end),
                len,
            ));
        }
        check_detached(&incoming)?;
        let leaving: Vec<BaseRow> = self.0.rows.borrow().shown()[range.clone()].to_vec();
        if let Some(form) = &form {
            form.check_tags(&incoming, &leaving)?;
            form.release_focus_among(&leaving);
            form.forget_rows(&leaving);
        }

        let anchor = self.0.rows.borrow().anchor(&range);
        self.0.rows.borrow_mut().remove_shown(range.clone());
        for row in &leaving {
            row.set_section(Weak::new());
        }

        self.adopt(&incoming, form.as_ref());
        let items = incoming.iter().map(|row| (row.clone(), !row.is_hidden())).collect();
        let positions = self.0.rows.borrow_mut().insert(anchor, items);
        let shown: Vec<BaseRow> = incoming.iter().filter(|row| !row.is_hidden()).cloned().collect();
        debug_assert!(self.0.rows.borrow().is_consistent());

        if let Some(form) = form {
            let tags = tags_of(leaving.iter().chain(&incoming));
            match (leaving.is_empty(), shown.is_empty()) {
                (true, true) => {}
                (true, false) => self.notify(&form, &positions, |paths| Change::RowsAdded {
                    rows: shown,
                    paths,
                }),
                (false, true) => {
                    let removed: Vec<usize> = range.collect();
                    self.notify(&form, &removed, |paths| Change::RowsRemoved {
                        rows: leaving.clone(),
                        paths,
                    });
                }
                (false, false) => self.notify(&form, &positions, |paths| Change::RowsReplaced {
                    old: leaving.clone(),
                    new: shown,
                    paths,
                }),
            }
            form.refresh_dependents(&tags);
        }
        Ok(leaving)
    }

    /// Remove every declared row, hidden ones included.
    ///
    /// # Panics
    ///
    /// Panics if called while the form is evaluating a condition.
    #[track_caller]
    pub fn remove_all(&self) -> Vec<BaseRow> {
        let form = self.form();
        let all = self.all_rows();
        if let Some(form) = &form {
            form.assert_mutable();
            form.release_focus_among(&all);
            form.forget_rows(&all);
        }
        let (all, shown) = self.0.rows.borrow_mut().clear();
        for row in &all {
            row.set_section(Weak::new());
        }
        if let Some(form) = form {
            let positions: Vec<usize> = (0..shown.len()).collect();
            if !shown.is_empty() {
                self.notify(&form, &positions, |paths| Change::RowsRemoved {
                    rows: shown.clone(),
                    paths,
                });
            }
            form.refresh_dependents(&tags_of(all.iter()));
        }
        all
    }

    /// Remove `row` wherever it is declared, shown or hidden. Returns `false`
    /// if the row is not in this section.
    ///
    /// # Panics
    ///
    /// Panics if called while the form is evaluating a condition.
    #[track_caller]
    pub fn remove_row(&self, row: &BaseRow) -> bool {
        if self.0.rows.borrow().declared_position(row).is_none() {
            return false;
        }
        let form = self.form();
        let single = std::slice::from_ref(row);
        if let Some(form) = &form {
            form.assert_mutable();
            form.release_focus_among(single);
            form.forget_rows(single);
        }
        let shown_at = self.0.rows.borrow_mut().remove(row).flatten();
        row.set_section(Weak::new());
        if let Some(form) = form {
            if let Some(position) = shown_at {
                self.notify(&form, &[position], |paths| Change::RowsRemoved {
                    rows: vec![row.clone()],
                    paths,
                });
            }
            form.refresh_dependents(&tags_of(single.iter()));
        }
        true
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn shown_position(&self, row: &BaseRow) -> Option<usize> {
        self.0.rows.borrow().shown_position(row)
    }

    pub(crate) fn hide_row(&self, row: &BaseRow) {
        if self.shown_position(row).is_none() {
            return;
        }
        let form = self.form();
        if let Some(form) = &form {
            form.release_focus_among(std::slice::from_ref(row));
        }
        let Some(position) = self.0.rows.borrow_mut().hide(row) else {
            return;
        };
        if let Some(form) = form {
            self.notify(&form, &[position], |paths| Change::RowsRemoved {
                rows: vec![row.clone()],
                paths,
            });
        }
    }

    pub(crate) fn show_row(&self, row: &BaseRow) {
        let Some(position) = self.0.rows.borrow_mut().show(row) else {
            return;
        };
        if let Some(form) = self.form() {
            self.notify(&form, &[position], |paths| Change::RowsAdded {
                rows: vec![row.clone()],
                paths,
            });
        }
    }

    /// Link rows to this section and compute their caches.
    fn adopt(&self, rows: &[BaseRow], form: Option<&Form>) {
        let this = Rc::downgrade(&self.0);
        for row in rows {
            row.set_section(this.clone());
        }
        match form {
            Some(form) => form.attach_rows(rows),
            None => rows.iter().for_each(|row| row.refresh_caches(None)),
        }
    }

    /// Deliver a row change if this section is shown in `form`.
    fn notify(&self, form: &Form, positions: &[usize], build: impl FnOnce(Vec<IndexPath>) -> Change) {
        let Some(section) = form.section_position(self) else {
            return;
        };
        let paths = positions.iter().map(|&row| IndexPath::new(section, row)).collect();
        form.notify(build(paths));
    }

    pub(crate) fn set_form(&self, form: Weak<FormCore>) {
        *self.0.form.borrow_mut() = form;
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.0.form.borrow().strong_count() > 0
    }

    pub(crate) fn register_condition(&self, form: &Form) {
        let condition = self.0.hidden.borrow().clone();
        if let Some(condition) = condition {
            let observer: Weak<SectionCore> = Rc::downgrade(&self.0);
            let observer: Weak<dyn Observer> = observer;
            form.register(self.id(), &condition, ConditionKind::Hidden, observer);
        }
    }

    /// Recompute the hidden cache and rebuild the shown rows from the rows'
    /// own caches. No notifications.
    pub(crate) fn refresh_silently(&self, form: Option<&Form>) {
        self.0.hidden_cache.set(self.0.compute_hidden(form));
        self.0.rows.borrow_mut().rebuild(|row| !row.is_hidden());
    }
}

fn check_detached(rows: &[BaseRow]) -> Result<()> {
    for (i, row) in rows.iter().enumerate() {
        if row.is_attached() || rows[..i].contains(row) {
            let name = row
                .tag()
                .map_or_else(|| format!("row #{}", row.id().get()), |tag| format!("row '{tag}'"));
            return Err(FormError::AlreadyAttached(name));
        }
    }
    Ok(())
}

pub(crate) fn tags_of<'a>(rows: impl Iterator<Item = &'a BaseRow>) -> Vec<String> {
    rows.filter_map(|row| row.tag().map(str::to_owned)).collect()
}

impl PartialEq for Section {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Section {}

impl fmt::Debug for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self.0.rows.borrow();
        f.debug_struct("Section")
            .field("id", &self.0.id)
            .field("tag", &self.0.tag)
            .field("hidden", &self.0.hidden_cache.get())
            .field("rows", &rows.all().len())
            .field("shown", &rows.shown().len())
            .finish()
    }
}
