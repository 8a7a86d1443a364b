pub mod error;
pub mod token;

use compact_str::CompactString;
use error::LexerError;
use nom::Parser;
use nom::branch::alt;
use nom::bytes::complete::{escaped_transform, tag};
use nom::character::complete::{
    alpha1, alphanumeric1, anychar, char, digit1, multispace0, none_of, one_of,
};
use nom::combinator::{cut, map, opt, recognize, value};
use nom::error::ErrorKind;
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::IResult;
use nom_locate::position;

use crate::range::{Range, Span};
use token::{Token, TokenKind};

/// Converts source text into a flat token stream, terminated by an `Eof`
/// token carrying the end-of-input position.
///
/// Whitespace is discarded. Anything that is not an identifier, a number or
/// a string is emitted as a single-character symbol token; the parser is
/// responsible for assembling multi-character operators.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexerError> {
    match tokens(Span::new(source)) {
        Ok((rest, mut out)) => {
            let (rest, _) = multispace0::<_, nom::error::Error<Span>>(rest)
                .unwrap_or((rest, Span::new("")));
            let eof: Range = rest.into();
            out.push(Token {
                range: eof,
                kind: TokenKind::Eof,
            });
            Ok(out)
        }
        Err(nom::Err::Failure(e)) => match e.code {
            ErrorKind::Digit => Err(LexerError::MalformedNumber(e.input.into())),
            _ => Err(LexerError::UnterminatedString(e.input.into())),
        },
        Err(_) => unreachable!(),
    }
}

fn tokens(input: Span) -> IResult<Span, Vec<Token>> {
    many0(delimited(multispace0, token, multispace0)).parse(input)
}

fn token(input: Span) -> IResult<Span, Token> {
    alt((number_literal, string_literal, ident, symbol)).parse(input)
}

fn ident(input: Span) -> IResult<Span, Token> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        |span: Span| Token {
            range: span.into(),
            kind: TokenKind::Ident(CompactString::new(span.fragment())),
        },
    )
    .parse(input)
}

/// Digits with optional fraction and exponent. A lone `.` or a dangling
/// exponent (`1e+`) is a hard failure, not a fallback to other token kinds.
fn number_literal(input: Span) -> IResult<Span, Token> {
    let (rest, text) = recognize((
        digit1,
        opt(preceded(char('.'), cut(digit1))),
        opt(preceded(one_of("eE"), cut(pair(opt(one_of("+-")), digit1)))),
    ))
    .parse(input)?;

    match text.fragment().parse::<f64>() {
        Ok(number) => Ok((
            rest,
            Token {
                range: text.into(),
                kind: TokenKind::NumberLit(number),
            },
        )),
        Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
            text,
            ErrorKind::Digit,
        ))),
    }
}

fn string_literal(input: Span) -> IResult<Span, Token> {
    let (after, start) = position(input)?;
    let (after, _) = char('"').parse(after)?;
    let (after, text) = cut(alt((
        map(char('"'), |_| String::new()),
        terminated(
            escaped_transform(
                none_of("\"\\"),
                '\\',
                alt((
                    value('\\', char('\\')),
                    value('\"', char('\"')),
                    value('\n', char('n')),
                    value('\t', char('t')),
                    value('\r', char('r')),
                )),
            ),
            char('"'),
        ),
    )))
    .parse(after)?;
    let (after, end) = position(after)?;

    Ok((
        after,
        Token {
            range: Range {
                start: start.into(),
                end: end.into(),
            },
            kind: TokenKind::StringLit(text),
        },
    ))
}

fn symbol(input: Span) -> IResult<Span, Token> {
    let (rest, start) = position(input)?;
    let (rest, c) = anychar(rest)?;
    let (rest, end) = position(rest)?;

    Ok((
        rest,
        Token {
            range: Range {
                start: start.into(),
                end: end.into(),
            },
            kind: TokenKind::Symbol(c),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::Position;
    use rstest::rstest;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[rstest]
    #[case("2 + 3", vec![
        TokenKind::NumberLit(2.0),
        TokenKind::Symbol('+'),
        TokenKind::NumberLit(3.0),
        TokenKind::Eof])]
    #[case("maxCol(c)", vec![
        TokenKind::Ident(CompactString::new("maxCol")),
        TokenKind::Symbol('('),
        TokenKind::Ident(CompactString::new("c")),
        TokenKind::Symbol(')'),
        TokenKind::Eof])]
    #[case("x <= 10", vec![
        TokenKind::Ident(CompactString::new("x")),
        TokenKind::Symbol('<'),
        TokenKind::Symbol('='),
        TokenKind::NumberLit(10.0),
        TokenKind::Eof])]
    #[case("1.5e3[m]", vec![
        TokenKind::NumberLit(1500.0),
        TokenKind::Symbol('['),
        TokenKind::Ident(CompactString::new("m")),
        TokenKind::Symbol(']'),
        TokenKind::Eof])]
    #[case("\"a b\"", vec![TokenKind::StringLit("a b".to_string()), TokenKind::Eof])]
    #[case("\"\"", vec![TokenKind::StringLit(String::new()), TokenKind::Eof])]
    #[case("\"a\\\"b\\n\"", vec![TokenKind::StringLit("a\"b\n".to_string()), TokenKind::Eof])]
    #[case("|x|(x*2)", vec![
        TokenKind::Symbol('|'),
        TokenKind::Ident(CompactString::new("x")),
        TokenKind::Symbol('|'),
        TokenKind::Symbol('('),
        TokenKind::Ident(CompactString::new("x")),
        TokenKind::Symbol('*'),
        TokenKind::NumberLit(2.0),
        TokenKind::Symbol(')'),
        TokenKind::Eof])]
    #[case("", vec![TokenKind::Eof])]
    #[case("   ", vec![TokenKind::Eof])]
    fn test_tokenize(#[case] source: &str, #[case] expected: Vec<TokenKind>) {
        assert_eq!(kinds(source), expected);
    }

    #[rstest]
    #[case("1e+")]
    #[case("2.")]
    #[case("1.e5")]
    fn test_malformed_number(#[case] source: &str) {
        assert!(matches!(
            tokenize(source),
            Err(LexerError::MalformedNumber(_))
        ));
    }

    #[rstest]
    #[case("\"abc")]
    #[case("\"abc\\\"")]
    fn test_unterminated_string(#[case] source: &str) {
        assert!(matches!(
            tokenize(source),
            Err(LexerError::UnterminatedString(_))
        ));
    }

    #[test]
    fn test_token_positions() {
        let tokens = tokenize("ab + 1").unwrap();
        assert_eq!(tokens[0].range.start, Position::new(1, 1));
        assert_eq!(tokens[0].range.end, Position::new(1, 3));
        assert_eq!(tokens[1].range.start, Position::new(1, 4));
        assert_eq!(tokens[2].range.start, Position::new(1, 6));
    }

    #[test]
    fn test_adjacent_symbols_keep_positions() {
        // `<=` arrives as two symbol tokens whose ranges touch.
        let tokens = tokenize("a<=b").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Symbol('<'));
        assert_eq!(tokens[2].kind, TokenKind::Symbol('='));
        assert_eq!(tokens[1].range.end, tokens[2].range.start);
    }
}
