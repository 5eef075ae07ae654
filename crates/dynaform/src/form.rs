#![forbid(unsafe_code)]

//! The form: root of the section/row tree.
//!
//! # Design
//!
//! [`Form`] is a cheap handle over shared, single-threaded state. Ownership
//! flows downward (form → sections → rows); sections and rows only hold weak
//! back-links. The form owns the tag index and the dependency registry, and
//! is the context every condition is evaluated against.
//!
//! # Invariants
//!
//! 1. Tags are unique among the rows attached to one form.
//! 2. The registry only references rows and sections attached to this form.
//! 3. Shown sections are an order-preserving subsequence of declared sections.
//! 4. No mutation happens while a condition is being evaluated; attempting
//!    one panics (or returns [`FormError::ReentrantMutation`] from `try_*`).
//! 5. Notifications reach the delegate in the order the changes happened.
//!
//! # Failure Modes
//!
//! - **Duplicate tag / index past the end**: configuration errors. Plain
//!   methods log and panic, `try_*` methods return the error and leave the
//!   form unchanged.
//! - **Condition closure panics**: the panic propagates to whoever changed the
//!   value; the evaluation lock is released on unwind.
//! - **Delegate dropped**: notifications are silently skipped.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::rc::{Rc, Weak};

use ahash::{AHashMap, AHashSet};
use dynaform_predicate::Value;

use crate::change::{Change, FormDelegate, IndexPath};
use crate::condition::{Condition, ConditionKind};
use crate::config::FormConfig;
use crate::error::{FormError, Result, or_fatal};
use crate::registry::{DependencyRegistry, NodeId, Observer};
use crate::row::{BaseRow, Row, RowCore, RowValue, run_change_hooks};
use crate::section::{Section, tags_of};
use crate::visibility::ShownList;

pub(crate) struct FormCore {
    config: Cell<FormConfig>,
    sections: RefCell<ShownList<Section>>,
    tags: RefCell<AHashMap<String, BaseRow>>,
    registry: RefCell<DependencyRegistry>,
    delegate: RefCell<Option<Weak<dyn FormDelegate>>>,
    focused: RefCell<Weak<RowCore>>,
    evaluating: Cell<bool>,
}

/// Releases the evaluation lock when dropped, also on unwind.
pub(crate) struct EvaluationGuard<'a> {
    flag: &'a Cell<bool>,
    previous: bool,
}

impl Drop for EvaluationGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}

/// Form handle. Clones share the same form.
#[derive(Clone)]
pub struct Form {
    core: Rc<FormCore>,
}

impl Default for Form {
    fn default() -> Self {
        Self::new()
    }
}

impl Form {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(FormConfig::default())
    }

    #[must_use]
    pub fn with_config(config: FormConfig) -> Self {
        Self {
            core: Rc::new(FormCore {
                config: Cell::new(config),
                sections: RefCell::new(ShownList::default()),
                tags: RefCell::new(AHashMap::new()),
                registry: RefCell::new(DependencyRegistry::default()),
                delegate: RefCell::new(None),
                focused: RefCell::new(Weak::new()),
                evaluating: Cell::new(false),
            }),
        }
    }

    pub(crate) fn from_core(core: Rc<FormCore>) -> Self {
        Self { core }
    }

    #[must_use]
    pub fn config(&self) -> FormConfig {
        self.core.config.get()
    }

    pub fn set_config(&self, config: FormConfig) {
        self.core.config.set(config);
    }

    /// Install the notification receiver. The form holds it weakly.
    pub fn set_delegate<D: FormDelegate + 'static>(&self, delegate: &Rc<D>) {
        let weak: Weak<D> = Rc::downgrade(delegate);
        let weak: Weak<dyn FormDelegate> = weak;
        *self.core.delegate.borrow_mut() = Some(weak);
    }

    pub fn clear_delegate(&self) {
        *self.core.delegate.borrow_mut() = None;
    }

    /// Append a section, builder style.
    ///
    /// # Panics
    ///
    /// Panics on the same configuration errors as [`append`](Self::append).
    #[must_use]
    #[track_caller]
    pub fn with_section(self, section: Section) -> Self {
        self.append(section);
        self
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }

    // ── Queries ───────────────────────────────────────────────────────────

    /// Number of shown sections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.core.sections.borrow().shown().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Section> {
        self.core.sections.borrow().shown().get(index).cloned()
    }

    /// Shown section at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is past the end of the shown sections.
    #[must_use]
    #[track_caller]
    pub fn section(&self, index: usize) -> Section {
        let len = self.len();
        or_fatal(self.get(index).ok_or(FormError::out_of_bounds("form", index, len)))
    }

    #[must_use]
    pub fn sections(&self) -> Vec<Section> {
        self.core.sections.borrow().shown().to_vec()
    }

    /// Every declared section, hidden ones included.
    #[must_use]
    pub fn all_sections(&self) -> Vec<Section> {
        self.core.sections.borrow().all().to_vec()
    }

    /// First declared section tagged `tag`.
    #[must_use]
    pub fn section_by_tag(&self, tag: &str) -> Option<Section> {
        self.core
            .sections
            .borrow()
            .all()
            .iter()
            .find(|section| section.tag() == Some(tag))
            .cloned()
    }

    /// Shown rows of shown sections, in display order.
    #[must_use]
    pub fn rows(&self) -> Vec<BaseRow> {
        self.sections().iter().flat_map(Section::rows).collect()
    }

    /// Every declared row of every declared section.
    #[must_use]
    pub fn all_rows(&self) -> Vec<BaseRow> {
        self.all_sections().iter().flat_map(Section::all_rows).collect()
    }

    #[must_use]
    pub fn base_row_by_tag(&self, tag: &str) -> Option<BaseRow> {
        self.core.tags.borrow().get(tag).cloned()
    }

    /// Row tagged `tag`, if it holds a `T`.
    #[must_use]
    pub fn row_by_tag<T: RowValue>(&self, tag: &str) -> Option<Row<T>> {
        self.base_row_by_tag(tag)?.downcast()
    }

    #[must_use]
    pub fn row_at(&self, path: IndexPath) -> Option<BaseRow> {
        self.get(path.section)?.get(path.row)
    }

    /// Current value of the row tagged `tag`; [`Value::Null`] if there is none.
    #[must_use]
    pub fn value_of(&self, tag: &str) -> Value {
        self.base_row_by_tag(tag)
            .map_or(Value::Null, |row| row.value())
    }

    /// Values of tagged rows. Unless `include_hidden`, only rows currently
    /// shown in a shown section are included.
    #[must_use]
    pub fn values(&self, include_hidden: bool) -> BTreeMap<String, Value> {
        if include_hidden {
            return self
                .core
                .tags
                .borrow()
                .iter()
                .map(|(tag, row)| (tag.clone(), row.value()))
                .collect();
        }
        self.rows()
            .iter()
            .filter_map(|row| Some((row.tag()?.to_owned(), row.value())))
            .collect()
    }

    /// [`values`](Self::values) as a JSON object.
    #[cfg(feature = "serde")]
    #[must_use]
    pub fn values_json(&self, include_hidden: bool) -> serde_json::Value {
        serde_json::Value::Object(
            self.values(include_hidden)
                .into_iter()
                .map(|(tag, value)| {
                    (
                        tag,
                        serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
                    )
                })
                .collect(),
        )
    }

    /// Observers registered under `tag` for `kind`.
    #[must_use]
    pub fn observer_count(&self, tag: &str, kind: ConditionKind) -> usize {
        self.core.registry.borrow().count(tag, kind)
    }

    /// Whether the registry holds `node` under `tag` for `kind`.
    #[must_use]
    pub fn is_observing(&self, tag: &str, kind: ConditionKind, node: NodeId) -> bool {
        self.core.registry.borrow().contains(tag, kind, node)
    }

    /// Whether any registry entry references `node`.
    #[must_use]
    pub fn observes(&self, node: NodeId) -> bool {
        self.core.registry.borrow().references(node)
    }

    /// Tags that at least one condition depends on, sorted.
    #[must_use]
    pub fn dependency_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .core
            .registry
            .borrow()
            .tags()
            .map(str::to_owned)
            .collect();
        tags.sort_unstable();
        tags
    }

    // ── Focus ─────────────────────────────────────────────────────────────

    /// Mark `row` as the active input target. Returns `false` if the row is
    /// not shown in this form.
    pub fn begin_editing(&self, row: &BaseRow) -> bool {
        if !row.form().is_some_and(|form| form.ptr_eq(self)) || row.index_path().is_none() {
            return false;
        }
        *self.core.focused.borrow_mut() = Rc::downgrade(&row.0);
        true
    }

    pub fn end_editing(&self, row: &BaseRow) {
        if self.focused_row().as_ref() == Some(row) {
            *self.core.focused.borrow_mut() = Weak::new();
        }
    }

    #[must_use]
    pub fn focused_row(&self) -> Option<BaseRow> {
        self.core.focused.borrow().upgrade().map(BaseRow)
    }

    // ── Mutation ──────────────────────────────────────────────────────────

    /// # Panics
    ///
    /// Panics on a configuration error; see [`try_append`](Self::try_append).
    #[track_caller]
    pub fn append(&self, section: Section) {
        self.append_all([section]);
    }

    /// Append a section after every declared section.
    ///
    /// # Errors
    ///
    /// [`FormError::AlreadyAttached`] if the section is in a form,
    /// [`FormError::DuplicateTag`] if one of its row tags is taken.
    pub fn try_append(&self, section: Section) -> Result<()> {
        self.try_append_all([section])
    }

    /// # Panics
    ///
    /// Panics on a configuration error; see [`try_append`](Self::try_append).
    #[track_caller]
    pub fn append_all(&self, sections: impl IntoIterator<Item = Section>) {
        or_fatal(self.try_append_all(sections));
    }

    /// Append several sections, announced in one `sections_added`.
    pub fn try_append_all(&self, sections: impl IntoIterator<Item = Section>) -> Result<()> {
        let len = self.len();
        self.try_replace_range(len..len, sections).map(drop)
    }

    /// # Panics
    ///
    /// Panics on a configuration error; see [`try_insert`](Self::try_insert).
    #[track_caller]
    pub fn insert(&self, index: usize, section: Section) {
        or_fatal(self.try_insert(index, section));
    }

    /// Insert before the shown section at `index` (`index == len` appends).
    pub fn try_insert(&self, index: usize, section: Section) -> Result<()> {
        self.try_replace_range(index..index, [section]).map(drop)
    }

    /// # Panics
    ///
    /// Panics on a configuration error; see [`try_set`](Self::try_set).
    #[track_caller]
    pub fn set(&self, index: usize, section: Section) -> Section {
        or_fatal(self.try_set(index, section))
    }

    /// Replace the shown section at `index`, returning the old one.
    pub fn try_set(&self, index: usize, section: Section) -> Result<Section> {
        let len = self.len();
        if index >= len {
            return Err(FormError::out_of_bounds("form", index, len));
        }
        let mut removed = self.try_replace_range(index..index + 1, [section])?;
        Ok(removed.remove(0))
    }

    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[track_caller]
    pub fn remove(&self, index: usize) -> Section {
        or_fatal(self.try_remove(index))
    }

    pub fn try_remove(&self, index: usize) -> Result<Section> {
        let len = self.len();
        if index >= len {
            return Err(FormError::out_of_bounds("form", index, len));
        }
        let mut removed = self.try_replace_range(index..index + 1, Vec::<Section>::new())?;
        Ok(removed.remove(0))
    }

    /// # Panics
    ///
    /// Panics if `range` is out of bounds.
    #[track_caller]
    pub fn remove_range(&self, range: Range<usize>) -> Vec<Section> {
        or_fatal(self.try_replace_range(range, Vec::<Section>::new()))
    }

    /// # Panics
    ///
    /// Panics on a configuration error; see
    /// [`try_replace_range`](Self::try_replace_range).
    #[track_caller]
    pub fn replace_range(
        &self,
        range: Range<usize>,
        sections: impl IntoIterator<Item = Section>,
    ) -> Vec<Section> {
        or_fatal(self.try_replace_range(range, sections))
    }

    /// Replace the shown sections in `range`, returning the removed ones.
    ///
    /// Same slotting and notification rules as
    /// [`Section::try_replace_range`].
    ///
    /// # Errors
    ///
    /// [`FormError::IndexOutOfBounds`], [`FormError::AlreadyAttached`],
    /// [`FormError::DuplicateTag`] or [`FormError::ReentrantMutation`]; the
    /// form is unchanged on error.
    pub fn try_replace_range(
        &self,
        range: Range<usize>,
        sections: impl IntoIterator<Item = Section>,
    ) -> Result<Vec<Section>> {
        let incoming: Vec<Section> = sections.into_iter().collect();
        self.check_mutable()?;
        let len = self.len();
        if range.start > range.end || range.end > len {
            return Err(FormError::out_of_bounds("form", range.start.max(range.end), len));
        }
        for (i, section) in incoming.iter().enumerate() {
            if section.is_attached() || incoming[..i].contains(section) {
                let name = section.tag().map_or_else(
                    || format!("section #{}", section.id().get()),
                    |tag| format!("section '{tag}'"),
                );
                return Err(FormError::AlreadyAttached(name));
            }
        }
        let leaving: Vec<Section> = self.core.sections.borrow().shown()[range.clone()].to_vec();
        let leaving_rows: Vec<BaseRow> = leaving.iter().flat_map(Section::all_rows).collect();
        let incoming_rows: Vec<BaseRow> = incoming.iter().flat_map(Section::all_rows).collect();
        self.check_tags(&incoming_rows, &leaving_rows)?;

        self.release_focus_among(&leaving_rows);
        for section in &leaving {
            self.forget_section(section);
        }
        let anchor = self.core.sections.borrow().anchor(&range);
        self.core.sections.borrow_mut().remove_shown(range.clone());

        self.adopt(&incoming, &incoming_rows);
        let items = incoming
            .iter()
            .map(|section| (section.clone(), !section.is_hidden()))
            .collect();
        let positions = self.core.sections.borrow_mut().insert(anchor, items);
        let shown: Vec<Section> = incoming.iter().filter(|s| !s.is_hidden()).cloned().collect();
        debug_assert!(self.core.sections.borrow().is_consistent());

        match (leaving.is_empty(), shown.is_empty()) {
            (true, true) => {}
            (true, false) => self.notify(Change::SectionsAdded {
                sections: shown,
                indices: positions,
            }),
            (false, true) => self.notify(Change::SectionsRemoved {
                sections: leaving.clone(),
                indices: range.collect(),
            }),
            (false, false) => self.notify(Change::SectionsReplaced {
                old: leaving.clone(),
                new: shown,
                indices: positions,
            }),
        }
        self.refresh_dependents(&tags_of(leaving_rows.iter().chain(&incoming_rows)));
        Ok(leaving)
    }

    /// Remove every declared section, hidden ones included.
    ///
    /// # Panics
    ///
    /// Panics if called while a condition is being evaluated.
    #[track_caller]
    pub fn remove_all(&self) -> Vec<Section> {
        self.assert_mutable();
        let rows = self.all_rows();
        self.release_focus_among(&rows);
        for section in self.all_sections() {
            self.forget_section(&section);
        }
        let (all, shown) = self.core.sections.borrow_mut().clear();
        if !shown.is_empty() {
            let indices = (0..shown.len()).collect();
            self.notify(Change::SectionsRemoved {
                sections: shown,
                indices,
            });
        }
        self.refresh_dependents(&tags_of(rows.iter()));
        all
    }

    /// Remove `section`, shown or hidden. Returns `false` if it is not part of
    /// this form.
    ///
    /// # Panics
    ///
    /// Panics if called while a condition is being evaluated.
    #[track_caller]
    pub fn remove_section(&self, section: &Section) -> bool {
        if self.core.sections.borrow().declared_position(section).is_none() {
            return false;
        }
        self.assert_mutable();
        let rows = section.all_rows();
        self.release_focus_among(&rows);
        self.forget_section(section);
        let shown_at = self.core.sections.borrow_mut().remove(section).flatten();
        if let Some(index) = shown_at {
            self.notify(Change::SectionsRemoved {
                sections: vec![section.clone()],
                indices: vec![index],
            });
        }
        self.refresh_dependents(&tags_of(rows.iter()));
        true
    }

    // ── Internals shared with sections and rows ───────────────────────────

    pub(crate) fn enter_evaluation(&self) -> EvaluationGuard<'_> {
        let flag = &self.core.evaluating;
        EvaluationGuard {
            flag,
            previous: flag.replace(true),
        }
    }

    pub(crate) fn check_mutable(&self) -> Result<()> {
        if self.core.evaluating.get() {
            return Err(FormError::ReentrantMutation);
        }
        Ok(())
    }

    #[track_caller]
    pub(crate) fn assert_mutable(&self) {
        or_fatal(self.check_mutable());
    }

    pub(crate) fn section_position(&self, section: &Section) -> Option<usize> {
        self.core.sections.borrow().shown_position(section)
    }

    /// Tags of `incoming` must be unique among themselves and not used by an
    /// attached row, rows in `leaving` excepted.
    pub(crate) fn check_tags(&self, incoming: &[BaseRow], leaving: &[BaseRow]) -> Result<()> {
        let index = self.core.tags.borrow();
        let mut seen = AHashSet::new();
        for tag in incoming.iter().filter_map(BaseRow::tag) {
            let taken = index.get(tag).is_some_and(|owner| !leaving.contains(owner));
            if taken || !seen.insert(tag) {
                return Err(FormError::DuplicateTag(tag.to_owned()));
            }
        }
        Ok(())
    }

    pub(crate) fn register(
        &self,
        node: NodeId,
        condition: &Condition,
        kind: ConditionKind,
        observer: Weak<dyn Observer>,
    ) {
        let mut registry = self.core.registry.borrow_mut();
        for tag in condition.referenced_tags() {
            registry.add(tag, kind, node, observer.clone());
        }
    }

    pub(crate) fn unregister(&self, node: NodeId, condition: Option<&Condition>, kind: ConditionKind) {
        let Some(condition) = condition else {
            return;
        };
        let mut registry = self.core.registry.borrow_mut();
        for tag in condition.referenced_tags() {
            registry.remove(tag, kind, node);
        }
    }

    /// Index rows by tag and register their conditions, without evaluating.
    fn index_rows(&self, rows: &[BaseRow]) {
        {
            let mut index = self.core.tags.borrow_mut();
            for row in rows {
                if let Some(tag) = row.tag() {
                    index.insert(tag.to_owned(), row.clone());
                }
            }
        }
        for row in rows {
            row.register_condition(self, ConditionKind::Hidden);
            row.register_condition(self, ConditionKind::Disabled);
        }
    }

    /// Attach rows that already link to one of this form's sections.
    pub(crate) fn attach_rows(&self, rows: &[BaseRow]) {
        self.index_rows(rows);
        for row in rows {
            row.refresh_caches(Some(self));
        }
    }

    /// Drop rows from the tag index and the registry.
    pub(crate) fn forget_rows(&self, rows: &[BaseRow]) {
        let mut registry = self.core.registry.borrow_mut();
        let mut index = self.core.tags.borrow_mut();
        for row in rows {
            registry.remove_observer(row.id());
            if let Some(tag) = row.tag()
                && index.get(tag).is_some_and(|owner| owner == row)
            {
                index.remove(tag);
            }
        }
    }

    fn forget_section(&self, section: &Section) {
        self.core.registry.borrow_mut().remove_observer(section.id());
        self.forget_rows(&section.all_rows());
        section.set_form(Weak::new());
    }

    /// Link sections to this form, attach their rows and compute every cache.
    fn adopt(&self, sections: &[Section], rows: &[BaseRow]) {
        for section in sections {
            section.set_form(Rc::downgrade(&self.core));
        }
        self.index_rows(rows);
        for section in sections {
            section.register_condition(self);
        }
        for row in rows {
            row.refresh_caches(Some(self));
        }
        for section in sections {
            section.refresh_silently(Some(self));
        }
    }

    pub(crate) fn hide_section(&self, section: &Section) {
        if self.section_position(section).is_none() {
            return;
        }
        self.release_focus_among(&section.rows());
        let Some(index) = self.core.sections.borrow_mut().hide(section) else {
            return;
        };
        self.notify(Change::SectionsRemoved {
            sections: vec![section.clone()],
            indices: vec![index],
        });
    }

    pub(crate) fn show_section(&self, section: &Section) {
        let Some(index) = self.core.sections.borrow_mut().show(section) else {
            return;
        };
        self.notify(Change::SectionsAdded {
            sections: vec![section.clone()],
            indices: vec![index],
        });
    }

    /// Clear focus if it is on one of `rows`, telling the delegate first.
    pub(crate) fn release_focus_among(&self, rows: &[BaseRow]) {
        let Some(focused) = self.focused_row() else {
            return;
        };
        if rows.contains(&focused) {
            self.notify(Change::FocusReleased {
                row: focused.clone(),
            });
            self.end_editing(&focused);
        }
    }

    /// Re-evaluate the observers of `tags` after rows joined or left.
    pub(crate) fn refresh_dependents(&self, tags: &[String]) {
        if !self.config().refresh_dependents_on_attach {
            return;
        }
        let mut seen = AHashSet::new();
        for tag in tags {
            if seen.insert(tag.as_str()) {
                self.cascade(tag);
            }
        }
    }

    /// Value-change cascade for `row`, which is attached to this form.
    pub(crate) fn value_changed(&self, row: &BaseRow, old: Value, new: Value) {
        let span = tracing::debug_span!("form.cascade", tag = row.tag().unwrap_or(""));
        let _entered = span.enter();
        self.notify(Change::ValueChanged {
            row: row.clone(),
            old,
            new,
        });
        run_change_hooks(row);
        if let Some(tag) = row.tag() {
            self.cascade(tag);
        }
    }

    /// Re-evaluate hidden observers of `tag`, then disabled observers.
    fn cascade(&self, tag: &str) {
        let hidden = self.core.registry.borrow().observers(tag, ConditionKind::Hidden);
        for observer in hidden.iter().filter_map(Weak::upgrade) {
            observer.evaluate_hidden();
        }
        let disabled = self
            .core
            .registry
            .borrow()
            .observers(tag, ConditionKind::Disabled);
        for observer in disabled.iter().filter_map(Weak::upgrade) {
            observer.evaluate_disabled();
        }
    }

    pub(crate) fn notify(&self, change: Change) {
        match &change {
            Change::ValueChanged { row, old, new } => tracing::debug!(
                message = change.name(),
                tag = row.tag().unwrap_or(""),
                old = %old,
                new = %new
            ),
            Change::FocusReleased { row } => {
                tracing::debug!(message = change.name(), tag = row.tag().unwrap_or(""));
            }
            _ => tracing::debug!(
                message = change.name(),
                positions = ?change.indices(),
                paths = ?change.paths()
            ),
        }
        let delegate = self.core.delegate.borrow().as_ref().and_then(Weak::upgrade);
        if let Some(delegate) = delegate {
            change.deliver(&*delegate);
        }
    }
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections = self.core.sections.borrow();
        f.debug_struct("Form")
            .field("sections", &sections.all().len())
            .field("shown", &sections.shown().len())
            .field("tags", &self.core.tags.borrow().len())
            .field("config", &self.core.config.get())
            .finish_non_exhaustive()
    }
}
