// Lexer for logical time literals (`10 msec`, `0`, `forever`).
//
// Time values appear in connection delays, safe-to-process offsets and the
// federation configuration. Uses the `logos` crate for DFA-based lexing.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters or unit names produce `LexError`;
//                lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

use crate::time::TimeUnit;

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(TimeToken, Span)>,
    pub errors: Vec<LexError>,
}

/// Tokens of a time literal.
///
/// Unit names are resolved during lexing so the parser only sees a known
/// `TimeUnit`; an unknown word is a lex error.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum TimeToken {
    #[token("forever")]
    Forever,

    /// Non-negative integer magnitude.
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<u64>().ok())]
    Int(u64),

    /// Unit suffix (`msec`, `ms`, `seconds`, ...).
    #[regex(r"[a-zA-Z]+", |lex| TimeUnit::from_suffix(lex.slice()))]
    Unit(TimeUnit),
}

impl fmt::Display for TimeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeToken::Forever => write!(f, "forever"),
            TimeToken::Int(n) => write!(f, "{}", n),
            TimeToken::Unit(u) => write!(f, "{}", u),
        }
    }
}

/// Lex a time literal into tokens.
pub fn lex(source: &str) -> LexResult {
    let mut lexer = TimeToken::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(tok) => tokens.push((tok, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unrecognized time token '{}'", lexer.slice()),
            }),
        }
    }

    LexResult { tokens, errors }
}
