//! Property-based invariant tests for shown/declared bookkeeping.
//!
//! Random sequences of row edits, section edits and value changes are
//! applied to a form whose rows and sections can be hidden by conditions on
//! a `key` row. After every step:
//!
//! 1. Each section's shown rows are exactly its declared rows that are not
//!    hidden, in declared order.
//! 2. The form's shown sections are exactly its declared sections that are
//!    not hidden.
//! 3. Replaying the delegate notifications onto a mirror reproduces the
//!    shown structure.
//! 4. Every shown row reports the index path of its shown slot.

use std::cell::RefCell;
use std::rc::Rc;

use dynaform::{BaseRow, Condition, Form, FormDelegate, IndexPath, Row, Section};
use proptest::prelude::*;

// ── Mirror delegate ───────────────────────────────────────────────────────

#[derive(Default)]
struct Mirror {
    sections: RefCell<Vec<Vec<BaseRow>>>,
}

impl FormDelegate for Mirror {
    fn sections_added(&self, sections: &[Section], indices: &[usize]) {
        let mut mirror = self.sections.borrow_mut();
        for (section, &index) in sections.iter().zip(indices) {
            mirror.insert(index, section.rows());
        }
    }

    fn sections_removed(&self, _sections: &[Section], indices: &[usize]) {
        let mut mirror = self.sections.borrow_mut();
        for &index in indices.iter().rev() {
            mirror.remove(index);
        }
    }

    fn sections_replaced(&self, old: &[Section], new: &[Section], indices: &[usize]) {
        let mut mirror = self.sections.borrow_mut();
        let start = indices[0];
        mirror.splice(start..start + old.len(), new.iter().map(Section::rows));
    }

    fn rows_added(&self, rows: &[BaseRow], paths: &[IndexPath]) {
        let mut mirror = self.sections.borrow_mut();
        for (row, path) in rows.iter().zip(paths) {
            mirror[path.section].insert(path.row, row.clone());
        }
    }

    fn rows_removed(&self, _rows: &[BaseRow], paths: &[IndexPath]) {
        let mut mirror = self.sections.borrow_mut();
        for path in paths.iter().rev() {
            mirror[path.section].remove(path.row);
        }
    }

    fn rows_replaced(&self, old: &[BaseRow], new: &[BaseRow], paths: &[IndexPath]) {
        let mut mirror = self.sections.borrow_mut();
        let IndexPath { section, row } = paths[0];
        mirror[section].splice(row..row + old.len(), new.iter().cloned());
    }
}

// ── Operations ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    SetKey(i64),
    Append { section: usize, hide_when: Option<i64> },
    Insert { section: usize, seed: usize, hide_when: Option<i64> },
    Remove { section: usize, seed: usize },
    Replace { section: usize, seed: usize, span: usize, count: usize },
    ForceHidden { section: usize, seed: usize, hidden: bool },
    AppendSection { hide_when: Option<i64> },
    InsertSection { seed: usize, hide_when: Option<i64> },
    RemoveSection { seed: usize },
    ReplaceSections { seed: usize, span: usize, count: usize },
}

fn hide_when_strategy() -> impl Strategy<Value = Option<i64>> {
    proptest::option::of(0i64..4)
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0i64..4).prop_map(Op::SetKey),
        (any::<usize>(), hide_when_strategy())
            .prop_map(|(section, hide_when)| Op::Append { section, hide_when }),
        (any::<usize>(), any::<usize>(), hide_when_strategy()).prop_map(
            |(section, seed, hide_when)| Op::Insert {
                section,
                seed,
                hide_when
            }
        ),
        (any::<usize>(), any::<usize>()).prop_map(|(section, seed)| Op::Remove { section, seed }),
        (any::<usize>(), any::<usize>(), 0usize..3, 0usize..3).prop_map(
            |(section, seed, span, count)| Op::Replace {
                section,
                seed,
                span,
                count
            }
        ),
        (any::<usize>(), any::<usize>(), any::<bool>()).prop_map(|(section, seed, hidden)| {
            Op::ForceHidden {
                section,
                seed,
                hidden,
            }
        }),
        hide_when_strategy().prop_map(|hide_when| Op::AppendSection { hide_when }),
        (any::<usize>(), hide_when_strategy())
            .prop_map(|(seed, hide_when)| Op::InsertSection { seed, hide_when }),
        any::<usize>().prop_map(|seed| Op::RemoveSection { seed }),
        (any::<usize>(), 0usize..3, 0usize..3).prop_map(|(seed, span, count)| {
            Op::ReplaceSections { seed, span, count }
        }),
    ]
}

fn new_row(hide_when: Option<i64>) -> BaseRow {
    let row = Row::<i32>::untagged();
    if let Some(value) = hide_when {
        row.set_hidden(Some(Condition::predicate(&format!("$key == {value}"))));
    }
    row.base()
}

fn new_section(hide_when: Option<i64>) -> Section {
    let section = Section::new().with_row(new_row(None));
    match hide_when {
        Some(value) => section.with_hidden(Condition::predicate(&format!("$key == {value}"))),
        None => section,
    }
}

struct Fixture {
    form: Form,
    key: Row<i64>,
    /// Holds `key`; never removed and never hidden.
    home: Section,
    mirror: Rc<Mirror>,
}

impl Fixture {
    /// A declared section of the form, chosen by `seed`.
    fn section(&self, seed: usize) -> Section {
        let all = self.form.all_sections();
        all[seed % all.len()].clone()
    }
}

fn fixture() -> Fixture {
    let key = Row::<i64>::new("key").with_value(0);
    let home = Section::new().with_row(&key);
    let form = Form::new()
        .with_section(home.clone())
        .with_section(Section::new().with_hidden(Condition::predicate("$key == 3")));
    let mirror = Rc::new(Mirror::default());
    *mirror.sections.borrow_mut() = form.sections().iter().map(Section::rows).collect();
    form.set_delegate(&mirror);
    Fixture {
        form,
        key,
        home,
        mirror,
    }
}

fn apply(fixture: &Fixture, op: &Op) {
    match *op {
        Op::SetKey(value) => {
            fixture.key.set_value(value);
        }
        Op::Append { section, hide_when } => {
            fixture.section(section).append(new_row(hide_when));
        }
        Op::Insert {
            section,
            seed,
            hide_when,
        } => {
            let section = fixture.section(section);
            section.insert(seed % (section.len() + 1), new_row(hide_when));
        }
        Op::Remove { section, seed } => {
            let section = fixture.section(section);
            let index = seed % section.len().max(1);
            if index < section.len() && !section.row(index).ptr_eq(&fixture.key) {
                section.remove(index);
            }
        }
        Op::Replace {
            section,
            seed,
            span,
            count,
        } => {
            let section = fixture.section(section);
            let start = seed % (section.len() + 1);
            let end = (start + span).min(section.len());
            if section.rows()[start..end]
                .iter()
                .any(|row| row.ptr_eq(&fixture.key))
            {
                return;
            }
            let rows: Vec<BaseRow> = (0..count).map(|_| new_row(None)).collect();
            section.replace_range(start..end, rows);
        }
        Op::ForceHidden {
            section,
            seed,
            hidden,
        } => {
            let all = fixture.section(section).all_rows();
            if all.is_empty() {
                return;
            }
            let row = &all[seed % all.len()];
            if !row.ptr_eq(&fixture.key) {
                row.set_hidden(Some(Condition::from(hidden)));
            }
        }
        Op::AppendSection { hide_when } => {
            fixture.form.append(new_section(hide_when));
        }
        Op::InsertSection { seed, hide_when } => {
            let index = seed % (fixture.form.len() + 1);
            fixture.form.insert(index, new_section(hide_when));
        }
        Op::RemoveSection { seed } => {
            let index = seed % fixture.form.len().max(1);
            if index < fixture.form.len() && fixture.form.section(index) != fixture.home {
                fixture.form.remove(index);
            }
        }
        Op::ReplaceSections { seed, span, count } => {
            let len = fixture.form.len();
            let start = seed % (len + 1);
            let end = (start + span).min(len);
            if fixture.form.sections()[start..end].contains(&fixture.home) {
                return;
            }
            let sections: Vec<Section> = (0..count).map(|i| new_section(Some(i as i64))).collect();
            fixture.form.replace_range(start..end, sections);
        }
    }
}

fn check(fixture: &Fixture) -> Result<(), TestCaseError> {
    for section in fixture.form.all_sections() {
        let expected: Vec<BaseRow> = section
            .all_rows()
            .into_iter()
            .filter(|row| !row.is_hidden())
            .collect();
        prop_assert_eq!(section.rows(), expected);
    }

    let expected: Vec<Section> = fixture
        .form
        .all_sections()
        .into_iter()
        .filter(|section| !section.is_hidden())
        .collect();
    prop_assert_eq!(fixture.form.sections(), expected);

    let actual: Vec<Vec<BaseRow>> = fixture.form.sections().iter().map(Section::rows).collect();
    prop_assert_eq!(&*fixture.mirror.sections.borrow(), &actual);

    for (s, rows) in actual.iter().enumerate() {
        for (r, row) in rows.iter().enumerate() {
            prop_assert_eq!(row.index_path(), Some(IndexPath::new(s, r)));
        }
    }
    Ok(())
}

// ═════════════════════════════════════════════════════════════════════════
// Invariants
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn shown_structure_tracks_declared_and_notifications(
        ops in proptest::collection::vec(op_strategy(), 1..40),
    ) {
        let fixture = fixture();
        check(&fixture)?;
        for op in &ops {
            apply(&fixture, op);
            check(&fixture)?;
        }
    }

    #[test]
    fn removing_everything_leaves_empty_surface(
        ops in proptest::collection::vec(op_strategy(), 0..20),
    ) {
        let fixture = fixture();
        for op in &ops {
            apply(&fixture, op);
        }
        for section in fixture.form.all_sections() {
            if section == fixture.home {
                continue;
            }
            let removed = section.remove_all();
            prop_assert!(removed.iter().all(|row| row.section().is_none()));
            prop_assert!(section.all_rows().is_empty());
        }
        check(&fixture)?;
    }
}
