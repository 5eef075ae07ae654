#![forbid(unsafe_code)]

//! Recursive-descent parser producing an [`Expr`] tree.
//!
//! Grammar (keywords are case-insensitive):
//!
//! ```text
//! or         := and (("||" | "OR") and)*
//! and        := not (("&&" | "AND") not)*
//! not        := ("!" | "NOT") not | comparison
//! comparison := operand (cmp-op operand)?
//! cmp-op     := "==" | "=" | "!=" | "<>" | "<" | "<=" | ">" | ">="
//!             | "CONTAINS" | "IN" | "BEGINSWITH" | "ENDSWITH"
//! operand    := "$" tag | number | string | TRUE | YES | FALSE | NO | NIL | NULL
//!             | "(" or ")" | "{" (operand ("," operand)*)? "}"
//! ```
//!
//! `AND` / `OR` chains are kept flat ([`Expr::All`], [`Expr::Any`]) so long
//! conjunctions do not deepen the tree. Explicit nesting (parentheses,
//! negation, list literals) is capped at [`MAX_DEPTH`].

use std::collections::BTreeSet;

use crate::error::{PredicateError, Result};
use crate::lexer::{Span, Symbol, Token, TokenKind, tokenize};
use crate::value::Value;

/// Maximum nesting of parentheses, negations and list literals.
pub const MAX_DEPTH: usize = 64;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Text containment or list membership of the right operand.
    Contains,
    /// Left operand is contained in the right operand.
    In,
    BeginsWith,
    EndsWith,
}

/// Parsed predicate expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Variable(String),
    List(Vec<Expr>),
    Not(Box<Expr>),
    /// Conjunction of two or more terms.
    All(Vec<Expr>),
    /// Disjunction of two or more terms.
    Any(Vec<Expr>),
    Compare {
        op: CompareOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Collect every `$variable` referenced by this expression.
    pub fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Literal(_) => {}
            Self::Variable(name) => {
                out.insert(name.clone());
            }
            Self::List(items) | Self::All(items) | Self::Any(items) => {
                for item in items {
                    item.collect_variables(out);
                }
            }
            Self::Not(inner) => inner.collect_variables(out),
            Self::Compare { lhs, rhs, .. } => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
        }
    }
}

/// Parse a predicate source string into an expression tree.
///
/// # Errors
///
/// Returns [`PredicateError`] for empty input, unexpected tokens, unbalanced
/// delimiters, malformed numbers, unterminated strings or excessive nesting.
pub fn parse(input: &str) -> Result<Expr> {
    let mut parser = Parser {
        tokens: tokenize(input),
        pos: 0,
        depth: 0,
    };
    if parser.at_eof() {
        return Err(PredicateError::new("empty predicate", Span::new(0, 0)));
    }
    let expr = parser.parse_or()?;
    if !parser.at_eof() {
        return Err(parser.unexpected("end of predicate"));
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn parse_or(&mut self) -> Result<Expr> {
        let mut terms = vec![self.parse_and()?];
        while self.eat_symbol_or_word(Symbol::Or, "OR") {
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 {
            terms.pop().unwrap_or(Expr::Literal(Value::Null))
        } else {
            Expr::Any(terms)
        })
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut terms = vec![self.parse_not()?];
        while self.eat_symbol_or_word(Symbol::And, "AND") {
            terms.push(self.parse_not()?);
        }
        Ok(if terms.len() == 1 {
            terms.pop().unwrap_or(Expr::Literal(Value::Null))
        } else {
            Expr::All(terms)
        })
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat_symbol_or_word(Symbol::Not, "NOT") {
            self.enter()?;
            let inner = self.parse_not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let lhs = self.parse_operand()?;
        let Some(op) = self.compare_op() else {
            return Ok(lhs);
        };
        self.pos += 1;
        let rhs = self.parse_operand()?;
        Ok(Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_operand(&mut self) -> Result<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Variable(name) => {
                self.pos += 1;
                Ok(Expr::Variable(name.to_owned()))
            }
            TokenKind::Number(text) => {
                self.pos += 1;
                parse_number(text, token.span).map(Expr::Literal)
            }
            TokenKind::String(raw) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Text(unescape(raw))))
            }
            TokenKind::Word(word) => match literal_word(word) {
                Some(value) => {
                    self.pos += 1;
                    Ok(Expr::Literal(value))
                }
                None => Err(self.unexpected("operand")),
            },
            TokenKind::Symbol(Symbol::LParen) => {
                self.pos += 1;
                self.enter()?;
                let inner = self.parse_or()?;
                self.expect_symbol(Symbol::RParen, "')'")?;
                self.depth -= 1;
                Ok(inner)
            }
            TokenKind::Symbol(Symbol::LBrace) => {
                self.pos += 1;
                self.enter()?;
                let mut items = Vec::new();
                if !self.eat_symbol(Symbol::RBrace) {
                    loop {
                        items.push(self.parse_operand()?);
                        if self.eat_symbol(Symbol::Comma) {
                            continue;
                        }
                        self.expect_symbol(Symbol::RBrace, "'}'")?;
                        break;
                    }
                }
                self.depth -= 1;
                Ok(Expr::List(items))
            }
            TokenKind::Unterminated => Err(PredicateError::new(
                "unterminated string literal",
                token.span,
            )),
            _ => Err(self.unexpected("operand")),
        }
    }

    fn compare_op(&self) -> Option<CompareOp> {
        match &self.peek().kind {
            TokenKind::Symbol(Symbol::Eq) => Some(CompareOp::Eq),
            TokenKind::Symbol(Symbol::Ne) => Some(CompareOp::Ne),
            TokenKind::Symbol(Symbol::Lt) => Some(CompareOp::Lt),
            TokenKind::Symbol(Symbol::Le) => Some(CompareOp::Le),
            TokenKind::Symbol(Symbol::Gt) => Some(CompareOp::Gt),
            TokenKind::Symbol(Symbol::Ge) => Some(CompareOp::Ge),
            TokenKind::Word(word) => {
                let upper = word.to_ascii_uppercase();
                match upper.as_str() {
                    "CONTAINS" => Some(CompareOp::Contains),
                    "IN" => Some(CompareOp::In),
                    "BEGINSWITH" => Some(CompareOp::BeginsWith),
                    "ENDSWITH" => Some(CompareOp::EndsWith),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(PredicateError::new(
                format!("predicate nested deeper than {MAX_DEPTH} levels"),
                self.peek().span,
            ));
        }
        Ok(())
    }

    fn peek(&self) -> &Token<'a> {
        // The token stream always ends with Eof and `pos` never passes it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn eat_symbol(&mut self, symbol: Symbol) -> bool {
        if self.peek().kind == TokenKind::Symbol(symbol) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn eat_symbol_or_word(&mut self, symbol: Symbol, keyword: &str) -> bool {
        let hit = match &self.peek().kind {
            TokenKind::Symbol(s) => *s == symbol,
            TokenKind::Word(w) => w.eq_ignore_ascii_case(keyword),
            _ => false,
        };
        if hit {
            self.pos += 1;
        }
        hit
    }

    fn expect_symbol(&mut self, symbol: Symbol, label: &'static str) -> Result<()> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(self.unexpected(label))
        }
    }

    fn unexpected(&self, expected: &'static str) -> PredicateError {
        let token = self.peek();
        let found = match &token.kind {
            TokenKind::Variable(name) => format!("variable ${name}"),
            TokenKind::Word(word) => format!("'{word}'"),
            TokenKind::Number(text) => format!("number {text}"),
            TokenKind::String(_) => "string literal".to_owned(),
            TokenKind::Symbol(symbol) => format!("{symbol:?}"),
            TokenKind::Unknown(ch) => format!("unexpected character '{ch}'"),
            TokenKind::Unterminated => "unterminated string literal".to_owned(),
            TokenKind::Eof => "end of predicate".to_owned(),
        };
        PredicateError::new(format!("expected {expected}, found {found}"), token.span)
            .with_expected(vec![expected])
    }
}

fn literal_word(word: &str) -> Option<Value> {
    match word.to_ascii_uppercase().as_str() {
        "TRUE" | "YES" => Some(Value::Bool(true)),
        "FALSE" | "NO" => Some(Value::Bool(false)),
        "NIL" | "NULL" => Some(Value::Null),
        _ => None,
    }
}

fn parse_number(text: &str, span: Span) -> Result<Value> {
    if !text.contains('.')
        && let Ok(int) = text.parse::<i64>()
    {
        return Ok(Value::Int(int));
    }
    text.parse::<f64>()
        .map(Value::Float)
        .map_err(|_| PredicateError::new(format!("malformed number '{text}'"), span))
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Box<Expr> {
        Box::new(Expr::Variable(name.to_owned()))
    }

    fn lit(value: impl Into<Value>) -> Box<Expr> {
        Box::new(Expr::Literal(value.into()))
    }

    #[test]
    fn parse_simple_comparison() {
        assert_eq!(
            parse("$a == 0").unwrap(),
            Expr::Compare {
                op: CompareOp::Eq,
                lhs: var("a"),
                rhs: lit(0),
            }
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse("$a == 1 OR $b == 2 AND $c == 3").unwrap();
        let Expr::Any(terms) = expr else {
            panic!("expected disjunction");
        };
        assert_eq!(terms.len(), 2);
        assert!(matches!(&terms[1], Expr::All(inner) if inner.len() == 2));
    }

    #[test]
    fn long_chains_stay_flat() {
        let source = (0..500)
            .map(|i| format!("$t{i} == {i}"))
            .collect::<Vec<_>>()
            .join(" && ");
        let Expr::All(terms) = parse(&source).unwrap() else {
            panic!("expected conjunction");
        };
        assert_eq!(terms.len(), 500);
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert!(parse("not $a and $b or $c").is_ok());
        assert!(parse("$name beginswith 'Jo'").is_ok());
        assert_eq!(parse("yes").unwrap(), Expr::Literal(Value::Bool(true)));
        assert_eq!(parse("NULL").unwrap(), Expr::Literal(Value::Null));
    }

    #[test]
    fn list_literal() {
        assert_eq!(
            parse("$x IN {1, 'two'}").unwrap(),
            Expr::Compare {
                op: CompareOp::In,
                lhs: var("x"),
                rhs: Box::new(Expr::List(vec![
                    Expr::Literal(Value::Int(1)),
                    Expr::Literal(Value::from("two")),
                ])),
            }
        );
        assert_eq!(parse("{}").unwrap(), Expr::List(vec![]));
    }

    #[test]
    fn string_escapes_resolved() {
        assert_eq!(
            parse(r#""a\"b\n""#).unwrap(),
            Expr::Literal(Value::from("a\"b\n"))
        );
    }

    #[test]
    fn errors_carry_spans() {
        let err = parse("$a ==").unwrap_err();
        assert_eq!(err.span, Span::new(5, 5));
        assert!(err.message.contains("expected operand"));

        let err = parse("($a == 1").unwrap_err();
        assert_eq!(err.expected, Some(vec!["')'"]));

        let err = parse("$a == 1 $b").unwrap_err();
        assert!(err.message.contains("end of predicate"));

        assert!(parse("").is_err());
        assert!(parse("   ").is_err());
        assert!(parse("$a == 'x").is_err());
        assert!(parse("$a == bogus").is_err());
    }

    #[test]
    fn nesting_is_capped() {
        let deep = format!("{}$a{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert!(parse(&deep).is_err());
        let ok = format!("{}$a{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert!(parse(&ok).is_ok());
        assert!(parse(&"!".repeat(MAX_DEPTH + 1)).is_err());
    }

    #[test]
    fn big_integers_fall_back_to_float() {
        assert_eq!(
            parse("99999999999999999999").unwrap(),
            Expr::Literal(Value::Float(1e20))
        );
    }

    #[test]
    fn collect_variables_dedups() {
        let expr = parse("$a == 1 && ($b == $a || $c IN {$a})").unwrap();
        let mut vars = BTreeSet::new();
        expr.collect_variables(&mut vars);
        assert_eq!(
            vars.into_iter().collect::<Vec<_>>(),
            vec!["a".to_owned(), "b".to_owned(), "c".to_owned()]
        );
    }
}
