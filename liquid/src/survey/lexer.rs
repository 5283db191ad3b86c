use logos::Logos;
use std::fmt;

use crate::source::{BytePos, ByteRange, LineIndex, Position};
use crate::survey::NodeKind;

pub use crate::ui::lexer::{escape, unescape, Error};

#[derive(Clone, Debug, Logos)]
enum RawToken {
    #[token(">")]
    Start,
    #[token("?")]
    Question,
    #[token("!")]
    Message,
    #[token("<")]
    End,

    #[regex(r"\?!?[\p{L}_]([\p{L}0-9_\-]*[\p{L}0-9_])?")]
    #[regex(r"\?(=|!=|>|>=|<|<=|~)")]
    Query,

    #[token("*")]
    Required,
    #[token("->")]
    Arrow,
    #[token("---")]
    Separator,
    #[token("[")]
    OpenBracket,
    #[token("]")]
    CloseBracket,
    #[token("{")]
    OpenBrace,
    #[token("}")]
    CloseBrace,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token("=")]
    Equals,

    #[regex(r#""([^"\\]|\\(.|\n))*""#)]
    StringLiteral,
    #[regex(r#""([^"\\]|\\(.|\n))*\\?"#)]
    UnterminatedString,
    #[regex(r"-?[0-9]+(\.[0-9]+)?")]
    Number,
    #[regex(r"[\p{L}_]([\p{L}0-9_\-]*[\p{L}0-9_])?")]
    #[regex(r"[0-9]+[\p{L}_][\p{L}0-9_]*")]
    Word,

    #[error]
    #[regex(r"[ \t\r\n\x0C]+", logos::skip)]
    #[regex(r"//[^\n]*", logos::skip)]
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token<'source> {
    /// One of the node sigils `>`, `?`, `!` and `<`.
    Sigil(NodeKind),
    /// A `?` followed directly by an operator or a word. After a transition
    /// target this is a condition operator; at the start of a node it is a
    /// question with no space before its id.
    Query(&'source str),
    Required,
    Arrow,
    Separator,
    OpenBracket,
    CloseBracket,
    OpenBrace,
    CloseBrace,
    Colon,
    Comma,
    Equals,
    /// The raw contents of a string literal, still escaped.
    StringLiteral(&'source str),
    Number(&'source str),
    Bool(bool),
    Identifier(&'source str),
    Eof,
}

impl<'source> Token<'source> {
    pub fn description(&self) -> &'static str {
        match self {
            Token::Sigil(NodeKind::Start) => "start node",
            Token::Sigil(NodeKind::Question) => "question node",
            Token::Sigil(NodeKind::Message) => "message node",
            Token::Sigil(NodeKind::End) => "end node",
            Token::Query(_) => "condition",
            Token::Required => "*",
            Token::Arrow => "->",
            Token::Separator => "---",
            Token::OpenBracket => "[",
            Token::CloseBracket => "]",
            Token::OpenBrace => "{",
            Token::CloseBrace => "}",
            Token::Colon => ":",
            Token::Comma => ",",
            Token::Equals => "=",
            Token::StringLiteral(_) => "string literal",
            Token::Number(_) => "number",
            Token::Bool(_) => "boolean",
            Token::Identifier(_) => "identifier",
            Token::Eof => "end of file",
        }
    }
}

impl<'source> fmt::Display for Token<'source> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Sigil(kind) => write!(f, "{}", kind.sigil()),
            Token::Query(text) => write!(f, "?{text}"),
            Token::StringLiteral(text) => write!(f, "\"{text}\""),
            Token::Number(text) | Token::Identifier(text) => write!(f, "{text}"),
            Token::Bool(value) => write!(f, "{value}"),
            Token::Eof => write!(f, "<eof>"),
            token => write!(f, "{}", token.description()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Spanned<'source> {
    pub token: Token<'source>,
    pub range: ByteRange,
    pub position: Position,
}

pub fn tokens(source: &str) -> impl Iterator<Item = Result<Spanned<'_>, Error>> {
    assert!(
        source.len() <= crate::source::MAX_SOURCE_LEN,
        "`source` must be less than 4GiB in length"
    );

    let line_index = LineIndex::new(source);

    RawToken::lexer(source)
        .spanned()
        .map(move |(raw, span)| {
            let range = ByteRange::new(span.start as BytePos, span.end as BytePos);
            let slice = &source[span.clone()];
            let token = match raw {
                RawToken::Start => Token::Sigil(NodeKind::Start),
                RawToken::Question => Token::Sigil(NodeKind::Question),
                RawToken::Message => Token::Sigil(NodeKind::Message),
                RawToken::End => Token::Sigil(NodeKind::End),
                RawToken::Query => Token::Query(&slice[1..]),
                RawToken::Required => Token::Required,
                RawToken::Arrow => Token::Arrow,
                RawToken::Separator => Token::Separator,
                RawToken::OpenBracket => Token::OpenBracket,
                RawToken::CloseBracket => Token::CloseBracket,
                RawToken::OpenBrace => Token::OpenBrace,
                RawToken::CloseBrace => Token::CloseBrace,
                RawToken::Colon => Token::Colon,
                RawToken::Comma => Token::Comma,
                RawToken::Equals => Token::Equals,
                RawToken::StringLiteral => Token::StringLiteral(&slice[1..slice.len() - 1]),
                RawToken::UnterminatedString => return Err(Error::UnterminatedString { range }),
                RawToken::Number => Token::Number(slice),
                RawToken::Word => match slice {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    _ => Token::Identifier(slice),
                },
                RawToken::Error => {
                    let found = slice.chars().next().unwrap_or('\u{fffd}');
                    return Err(Error::UnexpectedCharacter { range, found });
                }
            };

            Ok(Spanned {
                token,
                range,
                position: line_index.position(source, span.start),
            })
        })
}

pub fn scan(source: &str) -> (Vec<Spanned<'_>>, Vec<Error>) {
    let mut spanned = Vec::new();
    let mut errors = Vec::new();

    for result in tokens(source) {
        match result {
            Ok(token) => spanned.push(token),
            Err(error) => errors.push(error),
        }
    }

    let end = source.len() as BytePos;
    spanned.push(Spanned {
        token: Token::Eof,
        range: ByteRange::new(end, end),
        position: LineIndex::new(source).position(source, source.len()),
    });

    (spanned, errors)
}

/// Whether `text` can be written without quotes and read back as the same
/// identifier.
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    let starts_well = matches!(chars.next(), Some(ch) if ch.is_alphabetic() || ch == '_');
    starts_well
        && text.chars().all(|ch| ch.is_alphanumeric() || ch == '_' || ch == '-')
        && !text.ends_with('-')
        && !matches!(text, "true" | "false")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token<'_>> {
        let (tokens, errors) = scan(source);
        assert!(errors.is_empty(), "{errors:?}");
        tokens.into_iter().map(|spanned| spanned.token).collect()
    }

    #[test]
    fn nodes() {
        assert_eq!(
            kinds("> start \"Welcome\" -> q1\n? q1 Rt* \"How was it?\""),
            vec![
                Token::Sigil(NodeKind::Start),
                Token::Identifier("start"),
                Token::StringLiteral("Welcome"),
                Token::Arrow,
                Token::Identifier("q1"),
                Token::Sigil(NodeKind::Question),
                Token::Identifier("q1"),
                Token::Identifier("Rt"),
                Token::Required,
                Token::StringLiteral("How was it?"),
                Token::Eof,
            ],
        );
    }

    #[test]
    fn conditions() {
        assert_eq!(
            kinds("-> a ?>= 4 -> b ?!in [x, y] -> c ?empty"),
            vec![
                Token::Arrow,
                Token::Identifier("a"),
                Token::Query(">="),
                Token::Number("4"),
                Token::Arrow,
                Token::Identifier("b"),
                Token::Query("!in"),
                Token::OpenBracket,
                Token::Identifier("x"),
                Token::Comma,
                Token::Identifier("y"),
                Token::CloseBracket,
                Token::Arrow,
                Token::Identifier("c"),
                Token::Query("empty"),
                Token::Eof,
            ],
        );
    }

    #[test]
    fn arrows_split_words() {
        assert_eq!(
            kinds("q1->q-2"),
            vec![
                Token::Identifier("q1"),
                Token::Arrow,
                Token::Identifier("q-2"),
                Token::Eof,
            ],
        );
    }

    #[test]
    fn headers_and_values() {
        assert_eq!(
            kinds("nps \"NPS\"\n---\n// comment\n{max: -2.5, on: true, 1_to_3: x}"),
            vec![
                Token::Identifier("nps"),
                Token::StringLiteral("NPS"),
                Token::Separator,
                Token::OpenBrace,
                Token::Identifier("max"),
                Token::Colon,
                Token::Number("-2.5"),
                Token::Comma,
                Token::Identifier("on"),
                Token::Colon,
                Token::Bool(true),
                Token::Comma,
                Token::Identifier("1_to_3"),
                Token::Colon,
                Token::Identifier("x"),
                Token::CloseBrace,
                Token::Eof,
            ],
        );
    }

    #[test]
    fn errors() {
        let (tokens, errors) = scan("> a & \"open");
        assert_eq!(tokens.len(), 3);
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[1], Error::UnterminatedString { .. }));
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("q1"));
        assert!(is_identifier("very-good"));
        assert!(!is_identifier("very good"));
        assert!(!is_identifier("true"));
        assert!(!is_identifier("1st"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a-"));
    }
}
