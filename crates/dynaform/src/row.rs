#![forbid(unsafe_code)]

//! Rows: typed value holders with hidden/disabled conditions.
//!
//! [`Row<T>`] is the typed handle used while building a form; [`BaseRow`] is
//! the type-erased handle stored in sections and passed to delegates. Both
//! are cheap reference-counted handles onto the same row: cloning a handle
//! never copies the row.
//!
//! # Invariants
//!
//! 1. A row belongs to at most one section at a time.
//! 2. The tag is fixed at construction.
//! 3. Assigning a value equal to the current one is a no-op: no
//!    notification, no callback, no cascade.
//! 4. Value changes on a row that is not in a form are stored but never
//!    cascade.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::rc::{Rc, Weak};

use dynaform_predicate::Value;

use crate::change::IndexPath;
use crate::condition::{Condition, ConditionKind};
use crate::form::Form;
use crate::registry::{NodeId, Observer};
use crate::section::{Section, SectionCore};

/// A type that can be stored in a [`Row`].
///
/// The dynamic [`Value`] view is what predicates, value maps and
/// `row_value_changed` notifications see.
pub trait RowValue: Clone + PartialEq + fmt::Debug + 'static {
    fn to_value(&self) -> Value;
}

macro_rules! row_value_via_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl RowValue for $ty {
                fn to_value(&self) -> Value {
                    Value::from(self.clone())
                }
            }
        )*
    };
}

row_value_via_from!(bool, i32, i64, u32, f32, f64, String);

impl RowValue for u64 {
    fn to_value(&self) -> Value {
        i64::try_from(*self).map_or(Value::Float(*self as f64), Value::Int)
    }
}

impl RowValue for usize {
    fn to_value(&self) -> Value {
        i64::try_from(*self).map_or(Value::Float(*self as f64), Value::Int)
    }
}

impl RowValue for char {
    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }
}

impl RowValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl<T: RowValue> RowValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(RowValue::to_value).collect())
    }
}

trait ErasedValue: fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn erased_value(&self) -> Value;
}

impl<T: RowValue> ErasedValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn erased_value(&self) -> Value {
        self.to_value()
    }
}

type RowCallback = Rc<dyn Fn(&BaseRow)>;
type DisplayFn = Rc<dyn Fn(&dyn Any) -> Option<String>>;

pub(crate) struct RowCore {
    this: Weak<RowCore>,
    id: NodeId,
    tag: Option<String>,
    type_id: TypeId,
    type_name: &'static str,
    title: RefCell<Option<String>>,
    value: RefCell<Option<Box<dyn ErasedValue>>>,
    hidden: RefCell<Option<Rc<Condition>>>,
    disabled: RefCell<Option<Rc<Condition>>>,
    hidden_cache: Cell<bool>,
    disabled_cache: Cell<bool>,
    focusable: Cell<bool>,
    section: RefCell<Weak<SectionCore>>,
    on_change: RefCell<Option<RowCallback>>,
    on_cell_update: RefCell<Option<RowCallback>>,
    display: RefCell<Option<DisplayFn>>,
}

impl RowCore {
    fn new<T: RowValue>(tag: Option<String>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            id: NodeId::next(),
            tag,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            title: RefCell::new(None),
            value: RefCell::new(None),
            hidden: RefCell::new(None),
            disabled: RefCell::new(None),
            hidden_cache: Cell::new(false),
            disabled_cache: Cell::new(false),
            focusable: Cell::new(true),
            section: RefCell::new(Weak::new()),
            on_change: RefCell::new(None),
            on_cell_update: RefCell::new(None),
            display: RefCell::new(None),
        })
    }

    fn handle(&self) -> Option<BaseRow> {
        self.this.upgrade().map(BaseRow)
    }

    fn condition(&self, kind: ConditionKind) -> Option<Rc<Condition>> {
        match kind {
            ConditionKind::Hidden => self.hidden.borrow().clone(),
            ConditionKind::Disabled => self.disabled.borrow().clone(),
        }
    }

    /// Evaluate the condition of `kind`; absent conditions are `false`.
    fn compute(&self, kind: ConditionKind, form: Option<&Form>) -> bool {
        let Some(condition) = self.condition(kind) else {
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
            kind = kind.as_str(),
            result
        );
        result
    }
}

impl Observer for RowCore {
    fn evaluate_hidden(&self) {
        let Some(row) = self.handle() else {
            return;
        };
        let section = row.section();
        let form = section.as_ref().and_then(Section::form);
        let hidden = self.compute(ConditionKind::Hidden, form.as_ref());
        self.hidden_cache.set(hidden);
        if let Some(section) = section {
            if hidden {
                section.hide_row(&row);
            } else {
                section.show_row(&row);
            }
        }
    }

    fn evaluate_disabled(&self) {
        let Some(row) = self.handle() else {
            return;
        };
        let form = row.form();
        let disabled = self.compute(ConditionKind::Disabled, form.as_ref());
        self.disabled_cache.set(disabled);
        row.update_cell();
    }
}

/// Type-erased row handle.
///
/// Equality is identity: two handles are equal iff they point at the same row.
#[derive(Clone)]
pub struct BaseRow(pub(crate) Rc<RowCore>);

impl BaseRow {
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.0.id
    }

    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.0.tag.as_deref()
    }

    #[must_use]
    pub fn title(&self) -> Option<String> {
        self.0.title.borrow().clone()
    }

    pub fn set_title(&self, title: impl Into<String>) {
        *self.0.title.borrow_mut() = Some(title.into());
    }

    /// Dynamic view of the current value, [`Value::Null`] if unset.
    #[must_use]
    pub fn value(&self) -> Value {
        self.0
            .value
            .borrow()
            .as_ref()
            .map_or(Value::Null, |v| v.erased_value())
    }

    #[must_use]
    pub fn has_value(&self) -> bool {
        self.0.value.borrow().is_some()
    }

    /// Name of the row's value type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.0.type_name
    }

    #[must_use]
    pub fn is<T: RowValue>(&self) -> bool {
        self.0.type_id == TypeId::of::<T>()
    }

    /// Typed handle, if the row holds `T`.
    #[must_use]
    pub fn downcast<T: RowValue>(&self) -> Option<Row<T>> {
        self.is::<T>().then(|| Row {
            base: self.clone(),
            _marker: PhantomData,
        })
    }

    /// Cached result of the hidden condition.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.0.hidden_cache.get()
    }

    /// Cached result of the disabled condition.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.0.disabled_cache.get()
    }

    #[must_use]
    pub fn hidden_condition(&self) -> Option<Condition> {
        self.0.condition(ConditionKind::Hidden).map(|c| (*c).clone())
    }

    #[must_use]
    pub fn disabled_condition(&self) -> Option<Condition> {
        self.0.condition(ConditionKind::Disabled).map(|c| (*c).clone())
    }

    /// Replace the hidden condition and re-evaluate it.
    ///
    /// # Panics
    ///
    /// Panics if called while the form is evaluating a condition.
    pub fn set_hidden(&self, condition: Option<Condition>) {
        self.replace_condition(ConditionKind::Hidden, condition);
        self.0.evaluate_hidden();
    }

    /// Replace the disabled condition and re-evaluate it.
    ///
    /// # Panics
    ///
    /// Panics if called while the form is evaluating a condition.
    pub fn set_disabled(&self, condition: Option<Condition>) {
        self.replace_condition(ConditionKind::Disabled, condition);
        self.0.evaluate_disabled();
    }

    fn replace_condition(&self, kind: ConditionKind, condition: Option<Condition>) {
        let form = self.form();
        if let Some(form) = &form {
            form.assert_mutable();
            form.unregister(self.id(), self.0.condition(kind).as_deref(), kind);
        }
        let condition = condition.map(Rc::new);
        match kind {
            ConditionKind::Hidden => *self.0.hidden.borrow_mut() = condition,
            ConditionKind::Disabled => *self.0.disabled.borrow_mut() = condition,
        }
        if let Some(form) = &form {
            self.register_condition(form, kind);
        }
    }

    #[must_use]
    pub fn is_focusable(&self) -> bool {
        self.0.focusable.get()
    }

    pub fn set_focusable(&self, focusable: bool) {
        self.0.focusable.set(focusable);
    }

    /// Owning section, if any.
    #[must_use]
    pub fn section(&self) -> Option<Section> {
        self.0.section.borrow().upgrade().map(Section)
    }

    /// Form the row is attached to, through its section.
    #[must_use]
    pub fn form(&self) -> Option<Form> {
        self.section().and_then(|section| section.form())
    }

    /// Position in the shown structure; `None` if the row or its section is
    /// hidden or not in a form.
    #[must_use]
    pub fn index_path(&self) -> Option<IndexPath> {
        let section = self.section()?;
        let row = section.shown_position(self)?;
        Some(IndexPath::new(section.index()?, row))
    }

    /// Ask the view layer to refresh this row's cell.
    pub fn update_cell(&self) {
        let callback = self.0.on_cell_update.borrow().clone();
        if let Some(callback) = callback {
            callback(self);
        }
    }

    /// Current value formatted for display.
    #[must_use]
    pub fn display_value(&self) -> Option<String> {
        let display = self.0.display.borrow().clone();
        let value = self.0.value.borrow();
        let value = value.as_ref()?;
        match display {
            Some(display) => display(value.as_any()),
            None => Some(value.erased_value().to_string()),
        }
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn set_section(&self, section: Weak<SectionCore>) {
        *self.0.section.borrow_mut() = section;
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.0.section.borrow().strong_count() > 0
    }

    pub(crate) fn register_condition(&self, form: &Form, kind: ConditionKind) {
        if let Some(condition) = self.0.condition(kind) {
            let observer: Weak<RowCore> = Rc::downgrade(&self.0);
            let observer: Weak<dyn Observer> = observer;
            form.register(self.id(), &condition, kind, observer);
        }
    }

    pub(crate) fn refresh_caches(&self, form: Option<&Form>) {
        self.0
            .hidden_cache
            .set(self.0.compute(ConditionKind::Hidden, form));
        self.0
            .disabled_cache
            .set(self.0.compute(ConditionKind::Disabled, form));
    }

    fn run_on_change(&self) {
        let callback = self.0.on_change.borrow().clone();
        if let Some(callback) = callback {
            callback(self);
        }
    }
}

impl PartialEq for BaseRow {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for BaseRow {}

impl fmt::Debug for BaseRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseRow")
            .field("id", &self.0.id)
            .field("tag", &self.0.tag)
            .field("type", &self.0.type_name)
            .field("value", &self.0.value.borrow())
            .field("hidden", &self.0.hidden_cache.get())
            .field("disabled", &self.0.disabled_cache.get())
            .finish()
    }
}

/// Typed row handle.
///
/// Dereferences to [`BaseRow`] for the type-independent API.
pub struct Row<T> {
    base: BaseRow,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Row<T> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: RowValue> Row<T> {
    /// Create a row identified by `tag`.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self::from_core(RowCore::new::<T>(Some(tag.into())))
    }

    /// Create a row without a tag. It cannot be referenced by conditions
    /// and does not appear in value maps.
    #[must_use]
    pub fn untagged() -> Self {
        Self::from_core(RowCore::new::<T>(None))
    }

    fn from_core(core: Rc<RowCore>) -> Self {
        Self {
            base: BaseRow(core),
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn with_value(self, value: T) -> Self {
        self.set_value(value);
        self
    }

    #[must_use]
    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.base.set_title(title);
        self
    }

    #[must_use]
    pub fn with_hidden(self, condition: impl Into<Condition>) -> Self {
        self.base.set_hidden(Some(condition.into()));
        self
    }

    #[must_use]
    pub fn with_disabled(self, condition: impl Into<Condition>) -> Self {
        self.base.set_disabled(Some(condition.into()));
        self
    }

    #[must_use]
    pub fn with_focusable(self, focusable: bool) -> Self {
        self.base.set_focusable(focusable);
        self
    }

    /// Called after each effective value change, once the delegate has been
    /// notified and before dependents are re-evaluated.
    #[must_use]
    pub fn on_change(self, callback: impl Fn(&Row<T>) + 'static) -> Self {
        *self.base.0.on_change.borrow_mut() = Some(Self::erase(callback));
        self
    }

    /// Render hook: called when the cell should be refreshed (value changed,
    /// disabled state re-evaluated, or [`BaseRow::update_cell`]).
    #[must_use]
    pub fn on_cell_update(self, callback: impl Fn(&Row<T>) + 'static) -> Self {
        *self.base.0.on_cell_update.borrow_mut() = Some(Self::erase(callback));
        self
    }

    /// Custom formatter for [`BaseRow::display_value`].
    #[must_use]
    pub fn with_display(self, format: impl Fn(&T) -> String + 'static) -> Self {
        let display: DisplayFn = Rc::new(move |value: &dyn Any| value.downcast_ref::<T>().map(&format));
        *self.base.0.display.borrow_mut() = Some(display);
        self
    }

    fn erase(callback: impl Fn(&Row<T>) + 'static) -> RowCallback {
        Rc::new(move |base: &BaseRow| {
            if let Some(row) = base.downcast::<T>() {
                callback(&row);
            }
        })
    }

    #[must_use]
    pub fn value(&self) -> Option<T> {
        self.base
            .0
            .value
            .borrow()
            .as_ref()
            .and_then(|v| v.as_any().downcast_ref::<T>())
            .cloned()
    }

    /// Assign a value. Returns `false` if it equals the current one.
    ///
    /// While the row is in a form an effective change notifies the delegate,
    /// runs the row's change callback and render hook, then re-evaluates the
    /// hidden and disabled conditions that reference this row's tag.
    ///
    /// # Panics
    ///
    /// Panics if called while the form is evaluating a condition.
    #[track_caller]
    pub fn set_value(&self, value: T) -> bool {
        self.assign(Some(value))
    }

    /// Unset the value, with the same notification rules as
    /// [`set_value`](Self::set_value).
    ///
    /// # Panics
    ///
    /// Panics if called while the form is evaluating a condition.
    #[track_caller]
    pub fn clear_value(&self) -> bool {
        self.assign(None)
    }

    #[track_caller]
    fn assign(&self, new: Option<T>) -> bool {
        let form = self.base.form();
        if let Some(form) = &form {
            form.assert_mutable();
        }
        let old = self.value();
        if old == new {
            return false;
        }
        let old_value = old.as_ref().map_or(Value::Null, RowValue::to_value);
        let new_value = new.as_ref().map_or(Value::Null, RowValue::to_value);
        *self.base.0.value.borrow_mut() = new.map(|v| Box::new(v) as Box<dyn ErasedValue>);
        if let Some(form) = form {
            form.value_changed(&self.base, old_value, new_value);
        }
        true
    }

    #[must_use]
    pub fn as_base(&self) -> &BaseRow {
        &self.base
    }

    /// Owned type-erased handle to the same row.
    #[must_use]
    pub fn base(&self) -> BaseRow {
        self.base.clone()
    }
}

impl<T> Deref for Row<T> {
    type Target = BaseRow;

    fn deref(&self) -> &BaseRow {
        &self.base
    }
}

impl<T> PartialEq for Row<T> {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
    }
}

impl<T> fmt::Debug for Row<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.base.fmt(f)
    }
}

impl<T> From<Row<T>> for BaseRow {
    fn from(row: Row<T>) -> Self {
        row.base
    }
}

impl<T> From<&Row<T>> for BaseRow {
    fn from(row: &Row<T>) -> Self {
        row.base.clone()
    }
}

/// Run the row's change callback, then its render hook.
pub(crate) fn run_change_hooks(row: &BaseRow) {
    row.run_on_change();
    row.update_cell();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_value_round_trips() {
        let row = Row::<i64>::new("age").with_value(42);
        assert_eq!(row.value(), Some(42));
        assert_eq!(row.as_base().value(), Value::Int(42));
        assert!(row.clear_value());
        assert!(!row.clear_value());
        assert_eq!(row.value(), None);
        assert_eq!(row.as_base().value(), Value::Null);
    }

    #[test]
    fn equal_assignment_is_a_no_op() {
        let row = Row::<String>::new("name").with_value("x".to_owned());
        assert!(!row.set_value("x".to_owned()));
        assert!(row.set_value("y".to_owned()));
    }

    #[test]
    fn detached_value_change_runs_no_callbacks() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let row = Row::<i32>::new("n").on_change(move |_| counter.set(counter.get() + 1));
        assert!(row.set_value(3));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn downcast_checks_type() {
        let base = Row::<bool>::new("flag").base();
        assert!(base.is::<bool>());
        assert!(base.downcast::<bool>().is_some());
        assert!(base.downcast::<i32>().is_none());
        assert_eq!(base.type_name(), "bool");
    }

    #[test]
    fn identity_equality() {
        let a = Row::<i32>::new("a");
        let b = Row::<i32>::new("a");
        assert_eq!(a.base(), a.base());
        assert_ne!(a.base(), b.base());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn detached_conditions_use_nil_lookup() {
        let row = Row::<i32>::new("r")
            .with_hidden(Condition::predicate("$other == nil"))
            .with_disabled(false);
        assert!(row.is_hidden());
        assert!(!row.is_disabled());
        row.set_hidden(None);
        assert!(!row.is_hidden());
    }

    #[test]
    fn display_value_uses_formatter() {
        let row = Row::<f64>::new("price").with_value(2.5);
        assert_eq!(row.display_value().as_deref(), Some("2.5"));
        let row = row.with_display(|v| format!("${v:.2}"));
        assert_eq!(row.display_value().as_deref(), Some("$2.50"));
        assert_eq!(Row::<f64>::untagged().display_value(), None);
    }

    #[test]
    fn update_cell_invokes_render_hook() {
        let rendered = Rc::new(Cell::new(0));
        let counter = Rc::clone(&rendered);
        let row = Row::<i32>::untagged().on_cell_update(move |_| counter.set(counter.get() + 1));
        row.update_cell();
        row.set_disabled(Some(Condition::Always(true)));
        assert_eq!(rendered.get(), 2);
        assert!(row.is_disabled());
    }

    #[test]
    fn row_values_convert() {
        assert_eq!(vec![1i32, 2].to_value(), Value::List(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!('x'.to_value(), Value::Text("x".into()));
        assert_eq!(u64::MAX.to_value(), Value::Float(u64::MAX as f64));
        assert_eq!(7usize.to_value(), Value::Int(7));
    }

    #[test]
    fn title_and_focusable() {
        let row = Row::<bool>::new("t").with_title("Accept").with_focusable(false);
        assert_eq!(row.title().as_deref(), Some("Accept"));
        assert!(!row.is_focusable());
    }
}
