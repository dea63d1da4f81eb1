//! Tokenizer
//!
//! Turns schema text into a flat token stream. Comments are kept as tokens so
//! the parser can attach them to declarations; whitespace is dropped.
//!
//! Each token is recognized by a `nom` combinator over the remaining input; a
//! [`Cursor`] turns consumed slices back into line/column positions.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_until, take_while, take_while1, take_while_m_n},
    character::complete::{char as pchar, digit1, one_of},
    combinator::{map, recognize},
    error::{ErrorKind, ParseError},
    multi::{fold_many0, many0_count},
    sequence::{pair, preceded, terminated, tuple},
    IResult,
};

use crate::ast::{Position, Span};
use crate::error::{RegistryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident,
    Int,
    Float,
    /// String literal; `text` holds the unescaped value
    Str,
    Symbol(char),
    LineComment,
    BlockComment,
}

impl TokenKind {
    pub(crate) fn is_comment(self) -> bool {
        matches!(self, TokenKind::LineComment | TokenKind::BlockComment)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

const SYMBOLS: &str = "=;{}[]()<>,.:-+/";

/// Tokenize `source`, returning the tokens and the end-of-input position
pub(crate) fn tokenize(source: &str) -> Result<(Vec<Token>, Position)> {
    let mut cursor = Cursor::new(source);
    let mut tokens = Vec::new();

    let mut rest = source.strip_prefix('\u{feff}').unwrap_or(source);
    cursor.advance_to(rest);

    loop {
        let start = cursor.position();
        let (after_space, _) = whitespace(rest).map_err(|e| lex_error(rest, start, e))?;
        cursor.advance_to(after_space);
        rest = after_space;
        if rest.is_empty() {
            break;
        }

        let start = cursor.position();
        let (after, (kind, text)) = token(rest).map_err(|e| lex_error(rest, start, e))?;
        cursor.advance_to(after);
        tokens.push(Token {
            kind,
            text,
            span: Span::new(start, cursor.position()),
        });
        rest = after;
    }

    Ok((tokens, cursor.position()))
}

// =============================================================================
// Positions and errors
// =============================================================================

/// Tracks the position of the start of the unconsumed input
struct Cursor<'a> {
    source: &'a str,
    offset: usize,
    line: u32,
    column: u32,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column, self.offset)
    }

    /// Move past everything before `rest`, which must be a suffix of the source
    fn advance_to(&mut self, rest: &'a str) {
        let end = self.source.len() - rest.len();
        for c in self.source[self.offset..end].chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.offset = end;
    }
}

/// A token that started but cannot be completed
#[derive(Debug, Clone, PartialEq)]
struct LexFail {
    message: String,
}

impl<'a> ParseError<&'a str> for LexFail {
    fn from_error_kind(_input: &'a str, kind: ErrorKind) -> Self {
        LexFail {
            message: format!("unexpected input ({})", kind.description()),
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

type LexResult<'a, T> = IResult<&'a str, T, LexFail>;

fn fail<'a, T>(message: impl Into<String>) -> LexResult<'a, T> {
    Err(nom::Err::Failure(LexFail {
        message: message.into(),
    }))
}

fn lex_error(rest: &str, at: Position, err: nom::Err<LexFail>) -> RegistryError {
    let message = match err {
        nom::Err::Failure(fail) => fail.message,
        nom::Err::Error(_) => match rest.chars().next() {
            Some(c) => format!("unexpected character {:?}", c),
            None => "unexpected end of input".to_string(),
        },
        nom::Err::Incomplete(_) => "unexpected end of input".to_string(),
    };
    RegistryError::syntax(message, at.line, at.column)
}

// =============================================================================
// Token grammar
// =============================================================================

fn whitespace(input: &str) -> LexResult<'_, &str> {
    take_while(char::is_whitespace)(input)
}

fn token(input: &str) -> LexResult<'_, (TokenKind, String)> {
    alt((
        line_comment,
        block_comment,
        string_literal,
        number,
        ident,
        map(one_of(SYMBOLS), |c| (TokenKind::Symbol(c), c.to_string())),
    ))(input)
}

fn line_comment(input: &str) -> LexResult<'_, (TokenKind, String)> {
    let (rest, body) = preceded(tag("//"), take_while(|c: char| c != '\n'))(input)?;
    let text = body.trim_end_matches('\r').to_string();
    Ok((rest, (TokenKind::LineComment, text)))
}

fn block_comment(input: &str) -> LexResult<'_, (TokenKind, String)> {
    let (rest, _) = tag("/*")(input)?;
    let closed: LexResult<'_, &str> = terminated(take_until("*/"), tag("*/"))(rest);
    match closed {
        Ok((rest, body)) => Ok((rest, (TokenKind::BlockComment, body.to_string()))),
        Err(_) => fail("unterminated block comment"),
    }
}

fn ident(input: &str) -> LexResult<'_, (TokenKind, String)> {
    let (rest, name) = recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)?;
    Ok((rest, (TokenKind::Ident, name.to_string())))
}

// =============================================================================
// Numbers
// =============================================================================

fn hex_run(input: &str) -> LexResult<'_, &str> {
    recognize(tuple((
        pchar('0'),
        one_of("xX"),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.'),
    )))(input)
}

/// Digits, letters, dots, and a sign only right after an exponent marker
fn decimal_run(input: &str) -> LexResult<'_, &str> {
    recognize(pair(
        alt((digit1, recognize(pair(pchar('.'), digit1)))),
        many0_count(alt((
            recognize(pair(one_of("eE"), one_of("+-"))),
            take_while1(|c: char| {
                (c.is_ascii_alphanumeric() && c != 'e' && c != 'E') || c == '.' || c == '_'
            }),
            recognize(one_of("eE")),
        ))),
    ))(input)
}

fn number(input: &str) -> LexResult<'_, (TokenKind, String)> {
    let (rest, text) = alt((hex_run, decimal_run))(input)?;

    let kind = if let Some(digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        let valid = !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit());
        valid.then_some(TokenKind::Int)
    } else if text.chars().all(|c| c.is_ascii_digit()) {
        Some(TokenKind::Int)
    } else if text.parse::<f64>().is_ok() {
        Some(TokenKind::Float)
    } else {
        None
    };

    match kind {
        Some(kind) => Ok((rest, (kind, text.to_string()))),
        None => fail(format!("invalid numeric literal '{}'", text)),
    }
}

// =============================================================================
// Strings
// =============================================================================

enum Fragment<'a> {
    Literal(&'a str),
    Escaped(char),
}

fn string_literal(input: &str) -> LexResult<'_, (TokenKind, String)> {
    let (rest, quote) = one_of("\"'")(input)?;
    let stop = if quote == '"' { "\"\\\n" } else { "'\\\n" };

    let (rest, value) = fold_many0(
        alt((
            map(is_not(stop), Fragment::Literal),
            map(preceded(pchar('\\'), escape), Fragment::Escaped),
        )),
        String::new,
        |mut value, fragment| {
            match fragment {
                Fragment::Literal(text) => value.push_str(text),
                Fragment::Escaped(c) => value.push(c),
            }
            value
        },
    )(rest)?;

    let closed: LexResult<'_, char> = pchar(quote)(rest);
    match closed {
        Ok((rest, _)) => Ok((rest, (TokenKind::Str, value))),
        Err(_) => fail("unterminated string literal"),
    }
}

/// The part of an escape sequence after the backslash
fn escape(input: &str) -> LexResult<'_, char> {
    let Some(c) = input.chars().next() else {
        return fail("unterminated string literal");
    };
    let rest = &input[c.len_utf8()..];
    let simple = |decoded: char| Ok((rest, decoded));

    match c {
        'n' => simple('\n'),
        't' => simple('\t'),
        'r' => simple('\r'),
        'a' => simple('\u{07}'),
        'b' => simple('\u{08}'),
        'f' => simple('\u{0c}'),
        'v' => simple('\u{0b}'),
        '\\' | '\'' | '"' | '?' => simple(c),
        '0'..='7' => {
            let (rest, digits) = take_while_m_n(1, 3, |d: char| d.is_digit(8))(input)?;
            let code = u32::from_str_radix(digits, 8).unwrap_or(0);
            Ok((rest, char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)))
        }
        'x' | 'X' => hex_escape(rest, 2),
        'u' => hex_escape(rest, 4),
        'U' => hex_escape(rest, 8),
        other => fail(format!("invalid escape sequence '\\{}'", other)),
    }
}

fn hex_escape(input: &str, max_digits: usize) -> LexResult<'_, char> {
    let (rest, digits) = take_while_m_n(0, max_digits, |d: char| d.is_ascii_hexdigit())(input)?;
    if digits.is_empty() {
        return fail("hex escape without digits");
    }
    match u32::from_str_radix(digits, 16).ok().and_then(char::from_u32) {
        Some(decoded) => Ok((rest, decoded)),
        None => fail("escape is not a valid code point"),
    }
}
