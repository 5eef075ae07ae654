#![forbid(unsafe_code)]

//! Predicate tokenizer.
//!
//! Byte-oriented, single pass, never fails: unexpected input becomes a
//! [`TokenKind::Unknown`] token and is reported by the parser with its span.

/// Byte range of a token in the source string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Comparison and logical operators written with symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind<'a> {
    /// `$name`, without the sigil.
    Variable(&'a str),
    /// Bare word: keyword or literal name (`AND`, `true`, `nil`, ...).
    Word(&'a str),
    Number(&'a str),
    /// Quoted string body, escapes not yet resolved.
    String(&'a str),
    Symbol(Symbol),
    Unknown(char),
    /// A quoted string that never closed.
    Unterminated,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

pub struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    idx: usize,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            idx: 0,
        }
    }

    /// Tokenize the whole input. The last token is always [`TokenKind::Eof`].
    #[must_use]
    pub fn tokenize(mut self) -> Vec<Token<'a>> {
        let mut out = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = matches!(token.kind, TokenKind::Eof);
            out.push(token);
            if is_eof {
                break;
            }
        }
        out
    }

    fn next_token(&mut self) -> Token<'a> {
        self.skip_spaces();
        let start = self.idx;
        let Some(b) = self.peek() else {
            return Token {
                kind: TokenKind::Eof,
                span: Span::new(start, start),
            };
        };
        if b == b'$' {
            return self.lex_variable(start);
        }
        if b == b'"' || b == b'\'' {
            return self.lex_string(start, b);
        }
        if b.is_ascii_digit()
            || (b == b'-' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit()))
        {
            return self.lex_number(start);
        }
        if is_word_start(b) {
            return self.lex_word(start);
        }
        if let Some((symbol, len)) = self.match_symbol() {
            self.idx += len;
            return Token {
                kind: TokenKind::Symbol(symbol),
                span: Span::new(start, self.idx),
            };
        }

        // Advance over a whole char so spans stay on UTF-8 boundaries.
        let ch = self.input[start..].chars().next().unwrap_or('\u{FFFD}');
        self.idx += ch.len_utf8().max(1);
        Token {
            kind: TokenKind::Unknown(ch),
            span: Span::new(start, self.idx),
        }
    }

    fn lex_variable(&mut self, start: usize) -> Token<'a> {
        self.idx += 1; // $
        let name_start = self.idx;
        while self.peek().is_some_and(is_tag_char) {
            self.idx += 1;
        }
        if name_start == self.idx {
            return Token {
                kind: TokenKind::Unknown('$'),
                span: Span::new(start, self.idx),
            };
        }
        Token {
            kind: TokenKind::Variable(&self.input[name_start..self.idx]),
            span: Span::new(start, self.idx),
        }
    }

    fn lex_string(&mut self, start: usize, quote: u8) -> Token<'a> {
        self.idx += 1;
        let content_start = self.idx;
        while let Some(b) = self.peek() {
            if b == quote {
                let content = &self.input[content_start..self.idx];
                self.idx += 1;
                return Token {
                    kind: TokenKind::String(content),
                    span: Span::new(start, self.idx),
                };
            }
            if b == b'\\' && self.peek_at(1).is_some() {
                self.idx += 1;
                // Skip the full escaped char.
                let ch = self.input[self.idx..].chars().next().unwrap_or('\\');
                self.idx += ch.len_utf8();
                continue;
            }
            self.idx += 1;
        }
        self.idx = self.bytes.len();
        Token {
            kind: TokenKind::Unterminated,
            span: Span::new(start, self.idx),
        }
    }

    fn lex_number(&mut self, start: usize) -> Token<'a> {
        if self.peek() == Some(b'-') {
            self.idx += 1;
        }
        let mut seen_dot = false;
        while let Some(b) = self.peek() {
            if b == b'.' && !seen_dot && self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) {
                seen_dot = true;
            } else if !b.is_ascii_digit() {
                break;
            }
            self.idx += 1;
        }
        Token {
            kind: TokenKind::Number(&self.input[start..self.idx]),
            span: Span::new(start, self.idx),
        }
    }

    fn lex_word(&mut self, start: usize) -> Token<'a> {
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.idx += 1;
        }
        Token {
            kind: TokenKind::Word(&self.input[start..self.idx]),
            span: Span::new(start, self.idx),
        }
    }

    fn match_symbol(&self) -> Option<(Symbol, usize)> {
        let first = self.peek()?;
        let second = self.peek_at(1);
        let two = match (first, second) {
            (b'=', Some(b'=')) => Some(Symbol::Eq),
            (b'!', Some(b'=')) => Some(Symbol::Ne),
            (b'<', Some(b'>')) => Some(Symbol::Ne),
            (b'<', Some(b'=')) => Some(Symbol::Le),
            (b'>', Some(b'=')) => Some(Symbol::Ge),
            (b'&', Some(b'&')) => Some(Symbol::And),
            (b'|', Some(b'|')) => Some(Symbol::Or),
            _ => None,
        };
        if let Some(symbol) = two {
            return Some((symbol, 2));
        }
        let one = match first {
            b'=' => Symbol::Eq,
            b'<' => Symbol::Lt,
            b'>' => Symbol::Gt,
            b'!' => Symbol::Not,
            b'(' => Symbol::LParen,
            b')' => Symbol::RParen,
            b'{' => Symbol::LBrace,
            b'}' => Symbol::RBrace,
            b',' => Symbol::Comma,
            _ => return None,
        };
        Some((one, 1))
    }

    fn skip_spaces(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.idx += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.idx).copied()
    }

    fn peek_at(&self, n: usize) -> Option<u8> {
        self.bytes.get(self.idx + n).copied()
    }
}

/// Tokenize a predicate source string.
#[must_use]
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    Lexer::new(input).tokenize()
}

/// Characters allowed in a `$tag` reference.
#[must_use]
pub fn is_tag_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.')
}

fn is_word_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}
