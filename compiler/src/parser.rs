// Parser for logical time literals.
//
// Parses a token stream (from the lexer) into a `TimeValue`. Grammar:
//
//   time := "forever" | INT UNIT | "0"
//
// A nonzero magnitude must carry a unit. Uses chumsky combinators.
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns the value or every lex/parse error encountered.
// Failure modes: syntax errors produce `TimeParseError` entries.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::lexer::{Span, TimeToken};
use crate::time::TimeValue;

/// One error from lexing or parsing a time literal.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeParseError {
    pub span: Span,
    pub message: String,
}

/// Parse a time literal such as `250 msec`, `0` or `forever`.
pub fn parse_time(source: &str) -> Result<TimeValue, Vec<TimeParseError>> {
    let lex_result = crate::lexer::lex(source);
    let mut errors: Vec<TimeParseError> = lex_result
        .errors
        .into_iter()
        .map(|e| TimeParseError {
            span: e.span,
            message: e.message,
        })
        .collect();
    if !errors.is_empty() {
        return Err(errors);
    }

    let len = source.len();
    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    match time_parser().parse(stream).into_result() {
        Ok(value) => Ok(value),
        Err(parse_errors) => {
            errors.extend(parse_errors.into_iter().map(|e| {
                let span = *e.span();
                TimeParseError {
                    span: Span {
                        start: span.start,
                        end: span.end,
                    },
                    message: e.to_string(),
                }
            }));
            Err(errors)
        }
    }
}

fn time_parser<'tokens, I>(
) -> impl Parser<'tokens, I, TimeValue, extra::Err<Rich<'tokens, TimeToken, SimpleSpan>>>
where
    I: ValueInput<'tokens, Token = TimeToken, Span = SimpleSpan>,
{
    let forever = just(TimeToken::Forever).to(TimeValue::FOREVER);

    let magnitude = select! { TimeToken::Int(n) => n };
    let unit = select! { TimeToken::Unit(u) => u };

    let finite = magnitude
        .then(unit.or_not())
        .try_map(|(n, unit), span: SimpleSpan| match unit {
            Some(unit) => TimeValue::from_parts(n, unit).ok_or_else(|| {
                Rich::custom(span, format!("time value {} {} overflows", n, unit))
            }),
            None if n == 0 => Ok(TimeValue::ZERO),
            None => Err(Rich::custom(
                span,
                format!("missing time unit after nonzero magnitude {}", n),
            )),
        });

    choice((forever, finite)).then_ignore(end())
}
