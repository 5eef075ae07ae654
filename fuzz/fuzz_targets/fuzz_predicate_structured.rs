#![no_main]

use arbitrary::Arbitrary;
use dynaform_predicate::{Predicate, Value};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Token {
    Variable(u8),
    Int(i16),
    Text(u8),
    Word(u8),
    Operator(u8),
    Open,
    Close,
    OpenList,
    CloseList,
    Comma,
}

const WORDS: &[&str] = &["AND", "OR", "NOT", "TRUE", "FALSE", "nil", "IN", "&&", "||", "!"];
const OPERATORS: &[&str] = &[
    "==", "!=", "<", "<=", ">", ">=", "=", "<>", "CONTAINS", "BEGINSWITH", "ENDSWITH", "in",
];

impl Token {
    fn render(&self, out: &mut String) {
        match self {
            Token::Variable(n) => out.push_str(&format!("$t{}", n % 4)),
            Token::Int(i) => out.push_str(&i.to_string()),
            Token::Text(n) => out.push_str(&format!("'s{}'", n % 4)),
            Token::Word(n) => out.push_str(WORDS[usize::from(*n) % WORDS.len()]),
            Token::Operator(n) => out.push_str(OPERATORS[usize::from(*n) % OPERATORS.len()]),
            Token::Open => out.push('('),
            Token::Close => out.push(')'),
            Token::OpenList => out.push('{'),
            Token::CloseList => out.push('}'),
            Token::Comma => out.push(','),
        }
        out.push(' ');
    }
}

fuzz_target!(|input: (Vec<Token>, [i16; 4])| {
    let (tokens, bindings) = input;
    let mut source = String::new();
    for token in tokens.iter().take(256) {
        token.render(&mut source);
    }
    let Ok(predicate) = Predicate::parse(&source) else {
        return;
    };
    let lookup = |tag: &str| {
        tag.strip_prefix('t')
            .and_then(|n| n.parse::<usize>().ok())
            .and_then(|n| bindings.get(n))
            .map_or(Value::Null, |&v| Value::Int(i64::from(v)))
    };
    let first = predicate.evaluate(lookup);
    assert_eq!(first, predicate.evaluate(lookup), "evaluation is deterministic");
    assert!(predicate.variables().iter().all(|v| v.starts_with('t')));
});
