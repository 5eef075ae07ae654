#![no_main]

use arbitrary::Arbitrary;
use dynaform::{BaseRow, Condition, Form, Row, Section};
use libfuzzer_sys::fuzz_target;

const TAGS: &[&str] = &["a", "b", "c", "d", "e", "f"];

#[derive(Arbitrary, Debug)]
struct RowSpec {
    tag: u8,
    hidden: Option<(u8, i8)>,
    disabled: Option<u8>,
}

impl RowSpec {
    fn build(&self) -> BaseRow {
        let tag = TAGS[usize::from(self.tag) % TAGS.len()];
        let row = Row::<i64>::new(tag);
        if let Some((watch, value)) = self.hidden {
            let watched = TAGS[usize::from(watch) % TAGS.len()];
            row.set_hidden(Some(Condition::predicate(&format!("${watched} == {value}"))));
        }
        if let Some(watch) = self.disabled {
            let watched = TAGS[usize::from(watch) % TAGS.len()];
            row.set_disabled(Some(Condition::predicate(&format!("${watched} > 0"))));
        }
        row.base()
    }
}

#[derive(Arbitrary, Debug)]
enum Op {
    AppendSection(Option<u8>),
    RemoveSection(u8),
    InsertRow { section: u8, index: u8, row: RowSpec },
    RemoveRow { section: u8, index: u8 },
    ReplaceRows { section: u8, start: u8, end: u8, rows: Vec<RowSpec> },
    SetValue { tag: u8, value: i8 },
    ClearValue { tag: u8 },
}

fuzz_target!(|ops: Vec<Op>| {
    let form = Form::new().with_section(Section::new());
    for op in ops.iter().take(128) {
        match op {
            Op::AppendSection(watch) => {
                let section = Section::new();
                if let Some(watch) = watch {
                    let watched = TAGS[usize::from(*watch) % TAGS.len()];
                    section.set_hidden(Some(Condition::predicate(&format!("${watched} < 0"))));
                }
                let _ = form.try_append(section);
            }
            Op::RemoveSection(index) => {
                let _ = form.try_remove(usize::from(*index));
            }
            Op::InsertRow {
                section,
                index,
                row,
            } => {
                if let Some(section) = form.all_sections().get(usize::from(*section)) {
                    let _ = section.try_insert(usize::from(*index), row.build());
                }
            }
            Op::RemoveRow { section, index } => {
                if let Some(section) = form.all_sections().get(usize::from(*section)) {
                    let _ = section.try_remove(usize::from(*index));
                }
            }
            Op::ReplaceRows {
                section,
                start,
                end,
                rows,
            } => {
                if let Some(section) = form.all_sections().get(usize::from(*section)) {
                    let rows: Vec<BaseRow> = rows.iter().take(8).map(RowSpec::build).collect();
                    let _ = section.try_replace_range(usize::from(*start)..usize::from(*end), rows);
                }
            }
            Op::SetValue { tag, value } => {
                let tag = TAGS[usize::from(*tag) % TAGS.len()];
                if let Some(row) = form.row_by_tag::<i64>(tag) {
                    row.set_value(i64::from(*value));
                }
            }
            Op::ClearValue { tag } => {
                let tag = TAGS[usize::from(*tag) % TAGS.len()];
                if let Some(row) = form.row_by_tag::<i64>(tag) {
                    row.clear_value();
                }
            }
        }

        for section in form.all_sections() {
            let expected: Vec<BaseRow> = section
                .all_rows()
                .into_iter()
                .filter(|row| !row.is_hidden())
                .collect();
            assert_eq!(section.rows(), expected);
        }
        let mut seen = std::collections::HashSet::new();
        for row in form.all_rows() {
            if let Some(tag) = row.tag() {
                assert!(seen.insert(tag.to_owned()), "duplicate tag {tag}");
            }
        }
    }
});
