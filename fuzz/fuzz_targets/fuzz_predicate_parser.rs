#![no_main]

use dynaform_predicate::{Predicate, Value};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(predicate) = Predicate::parse(source) {
        let _ = predicate.evaluate(|_| Value::Null);
        let _ = predicate.evaluate(|tag| Value::Text(tag.to_owned()));
    }
});
