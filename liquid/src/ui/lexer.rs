use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};
use logos::Logos;
use std::fmt;

use crate::files::FileId;
use crate::source::{BytePos, ByteRange, LineIndex, Position};
use crate::ui::tables;

/// Tokens as recognised by the DFA. These are refined into [`Token`]s by
/// [`tokens`], which needs to look at the matched text to tell type indices
/// from numbers and type codes from identifiers.
///
/// Every modifier sigil starts a greedy scan that stops at whitespace, a
/// comma, a bracket or another sigil, so modifiers may be written with or
/// without spaces between them.
#[derive(Clone, Debug, Logos)]
enum RawToken {
    #[regex(r"[0-9]+")]
    Digits,
    #[regex(r"[0-9]+[\p{L}_][\p{L}0-9_]*")]
    DigitWord,
    #[regex(r"[\p{L}_][\p{L}0-9_\-]*")]
    Word,
    #[regex(r"-[0-9]+(\.[0-9]+)?")]
    NegativeNumber,
    #[regex(r#""([^"\\]|\\(.|\n))*""#)]
    StringLiteral,
    #[regex(r#""([^"\\]|\\(.|\n))*\\?"#)]
    UnterminatedString,

    #[regex(r":[\p{L}_][\p{L}0-9_.]*")]
    Field,
    #[regex(r":[\p{L}_][\p{L}0-9_.]*\?[^ \t\n,\[\]]*")]
    StateCondition,
    #[regex(r":\.[\p{L}0-9_]*")]
    Iterator,
    #[token(":#")]
    IndexRef,
    #[regex(r"=[^ \t\n,\[\]@><#!\^~$?]*")]
    Expression,

    #[regex(r"![\p{L}_][\p{L}0-9_]*")]
    #[regex(r"![0-9]?")]
    Priority,
    #[regex(r"\^[\p{L}_]*")]
    Flex,
    #[regex(r"\*[0-9]+")]
    #[regex(r"\*[\p{L}_]?")]
    Span,
    #[regex(r"#[\p{L}0-9_]*")]
    #[regex(r"#\?[^ \t\n\[\]]*")]
    Color,
    #[regex(r"%[\p{L}0-9_]*")]
    Size,
    #[regex(r"~[^ \t\n,\[\]@><#!\^*%~$?]*")]
    Stream,
    #[regex(r"\$[\p{L}0-9_]*")]
    Fidelity,

    #[regex(r"@[\p{L}0-9_]*")]
    SignalDeclare,
    #[regex(r">/[0-9]*")]
    #[regex(r">[\p{L}0-9_=]*")]
    SignalEmit,
    #[regex(r"<[\p{L}0-9_]*")]
    SignalReceive,
    #[regex(r"<>[\p{L}0-9_]*")]
    SignalBoth,
    #[regex(r"\?@[^ \t\n,\[\]]*")]
    #[token("?")]
    Condition,

    #[regex(r"/[0-9]+")]
    Layer,
    #[token("/<")]
    LayerClose,
    #[regex(r"//[^\n]*")]
    Comment,

    #[token("[")]
    OpenBracket,
    #[token("]")]
    CloseBracket,
    #[token("{")]
    OpenBrace,
    #[token("}")]
    CloseBrace,
    #[token(",")]
    Comma,
    #[token("\n")]
    Newline,

    #[error]
    #[regex(r"[ \t\r\x0C]+", logos::skip)]
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token<'source> {
    /// A lone digit selecting one of the ten indexed block types.
    TypeIndex(u8),
    TypeCode(&'source str),
    SurveyStart,
    Identifier(&'source str),
    Number(&'source str),
    /// The raw contents of a string literal, still escaped.
    StringLiteral(&'source str),

    Field(&'source str),
    Iterator(&'source str),
    IndexRef,
    StateCondition(&'source str, &'source str),
    Expression(&'source str),

    Priority(&'source str),
    Flex(&'source str),
    Span(&'source str),
    Color(&'source str),
    Size(&'source str),
    Stream(&'source str),
    Fidelity(&'source str),

    SignalDeclare(&'source str),
    SignalEmit(&'source str),
    SignalReceive(&'source str),
    SignalBoth(&'source str),
    Condition(&'source str),

    Layer(&'source str),
    LayerClose,

    OpenBracket,
    CloseBracket,
    OpenBrace,
    CloseBrace,
    Comma,
    Newline,
    Comment(&'source str),
    Eof,
}

impl<'source> Token<'source> {
    pub fn description(&self) -> &'static str {
        match self {
            Token::TypeIndex(_) => "type index",
            Token::TypeCode(_) => "type code",
            Token::SurveyStart => "Survey",
            Token::Identifier(_) => "identifier",
            Token::Number(_) => "number",
            Token::StringLiteral(_) => "string literal",
            Token::Field(_) => "field binding",
            Token::Iterator(_) => "iterator binding",
            Token::IndexRef => ":#",
            Token::StateCondition(_, _) => "state condition",
            Token::Expression(_) => "expression",
            Token::Priority(_) => "priority",
            Token::Flex(_) => "flex",
            Token::Span(_) => "span",
            Token::Color(_) => "color",
            Token::Size(_) => "size",
            Token::Stream(_) => "stream",
            Token::Fidelity(_) => "fidelity",
            Token::SignalDeclare(_) => "signal declaration",
            Token::SignalEmit(_) => "signal emit",
            Token::SignalReceive(_) => "signal receive",
            Token::SignalBoth(_) => "signal emit/receive",
            Token::Condition(_) => "condition",
            Token::Layer(_) => "layer",
            Token::LayerClose => "/<",
            Token::OpenBracket => "[",
            Token::CloseBracket => "]",
            Token::OpenBrace => "{",
            Token::CloseBrace => "}",
            Token::Comma => ",",
            Token::Newline => "newline",
            Token::Comment(_) => "comment",
            Token::Eof => "end of file",
        }
    }

    /// Tokens the parser never looks at.
    pub fn is_trivia(&self) -> bool {
        matches!(self, Token::Newline | Token::Comment(_))
    }
}

impl<'source> fmt::Display for Token<'source> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::TypeIndex(index) => write!(f, "{index}"),
            Token::TypeCode(text) | Token::Identifier(text) | Token::Number(text) => {
                write!(f, "{text}")
            }
            Token::SurveyStart => write!(f, "Survey"),
            Token::StringLiteral(text) => write!(f, "\"{text}\""),
            Token::Field(text) => write!(f, ":{text}"),
            Token::Iterator(text) => write!(f, ":.{text}"),
            Token::IndexRef => write!(f, ":#"),
            Token::StateCondition(state, expr) => write!(f, ":{state}?{expr}"),
            Token::Expression(text) => write!(f, "={text}"),
            Token::Priority(text) => write!(f, "!{text}"),
            Token::Flex(text) => write!(f, "^{text}"),
            Token::Span(text) => write!(f, "*{text}"),
            Token::Color(text) => write!(f, "#{text}"),
            Token::Size(text) => write!(f, "%{text}"),
            Token::Stream(text) => write!(f, "~{text}"),
            Token::Fidelity(text) => write!(f, "${text}"),
            Token::SignalDeclare(text) => write!(f, "@{text}"),
            Token::SignalEmit(text) => write!(f, ">{text}"),
            Token::SignalReceive(text) => write!(f, "<{text}"),
            Token::SignalBoth(text) => write!(f, "<>{text}"),
            Token::Condition(text) => write!(f, "?{text}"),
            Token::Layer(text) => write!(f, "/{text}"),
            Token::LayerClose => write!(f, "/<"),
            Token::OpenBracket => write!(f, "["),
            Token::CloseBracket => write!(f, "]"),
            Token::OpenBrace => write!(f, "{{"),
            Token::CloseBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Newline => write!(f, "\\n"),
            Token::Comment(text) => write!(f, "//{text}"),
            Token::Eof => write!(f, "<eof>"),
        }
    }
}

/// A token along with where it was found.
#[derive(Clone, Debug)]
pub struct Spanned<'source> {
    pub token: Token<'source>,
    pub range: ByteRange,
    pub position: Position,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    UnterminatedString { range: ByteRange },
    UnexpectedCharacter { range: ByteRange, found: char },
}

impl Error {
    pub fn range(&self) -> ByteRange {
        match self {
            Error::UnterminatedString { range } => *range,
            Error::UnexpectedCharacter { range, .. } => *range,
        }
    }

    /// Move the error to a source that contains this one at `offset`.
    pub fn shift(self, offset: BytePos) -> Error {
        match self {
            Error::UnterminatedString { range } => Error::UnterminatedString {
                range: range.shift(offset),
            },
            Error::UnexpectedCharacter { range, found } => Error::UnexpectedCharacter {
                range: range.shift(offset),
                found,
            },
        }
    }

    /// Unknown characters are skipped, so they only warrant a warning.
    pub fn severity(&self) -> Severity {
        match self {
            Error::UnterminatedString { .. } => Severity::Error,
            Error::UnexpectedCharacter { .. } => Severity::Warning,
        }
    }

    pub fn to_diagnostic(&self, file_id: FileId) -> Diagnostic<FileId> {
        match self {
            Error::UnterminatedString { range } => Diagnostic::error()
                .with_message("unterminated string literal")
                .with_labels(vec![Label::primary(file_id, *range)
                    .with_message("missing closing `\"`")]),
            Error::UnexpectedCharacter { range, found } => Diagnostic::warning()
                .with_message(format!("unexpected character `{found}`"))
                .with_labels(vec![Label::primary(file_id, *range)])
                .with_notes(vec!["the character was skipped".to_owned()]),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnterminatedString { .. } => write!(f, "unterminated string literal"),
            Error::UnexpectedCharacter { found, .. } => {
                write!(f, "unexpected character `{found}`")
            }
        }
    }
}

impl std::error::Error for Error {}

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
                RawToken::Digits => match slice.as_bytes() {
                    [digit] => Token::TypeIndex(digit - b'0'),
                    _ => Token::Number(slice),
                },
                RawToken::DigitWord => Token::Identifier(slice),
                RawToken::Word if slice == "Survey" => Token::SurveyStart,
                RawToken::Word if tables::is_known_code(slice) || tables::looks_like_code(slice) => {
                    Token::TypeCode(slice)
                }
                RawToken::Word => Token::Identifier(slice),
                RawToken::NegativeNumber => Token::Number(slice),
                RawToken::StringLiteral => Token::StringLiteral(&slice[1..slice.len() - 1]),
                RawToken::UnterminatedString => return Err(Error::UnterminatedString { range }),
                RawToken::Field => Token::Field(&slice[1..]),
                RawToken::StateCondition => match slice[1..].split_once('?') {
                    Some((state, expr)) => Token::StateCondition(state, expr),
                    None => Token::Field(&slice[1..]),
                },
                RawToken::Iterator => Token::Iterator(&slice[2..]),
                RawToken::IndexRef => Token::IndexRef,
                RawToken::Expression => Token::Expression(&slice[1..]),
                RawToken::Priority => Token::Priority(&slice[1..]),
                RawToken::Flex => Token::Flex(&slice[1..]),
                RawToken::Span => Token::Span(&slice[1..]),
                RawToken::Color => Token::Color(&slice[1..]),
                RawToken::Size => Token::Size(&slice[1..]),
                RawToken::Stream => Token::Stream(&slice[1..]),
                RawToken::Fidelity => Token::Fidelity(&slice[1..]),
                RawToken::SignalDeclare => Token::SignalDeclare(&slice[1..]),
                RawToken::SignalEmit => Token::SignalEmit(&slice[1..]),
                RawToken::SignalReceive => Token::SignalReceive(&slice[1..]),
                RawToken::SignalBoth => Token::SignalBoth(&slice[2..]),
                RawToken::Condition => Token::Condition(&slice[1..]),
                RawToken::Layer => Token::Layer(&slice[1..]),
                RawToken::LayerClose => Token::LayerClose,
                RawToken::Comment => Token::Comment(&slice[2..]),
                RawToken::OpenBracket => Token::OpenBracket,
                RawToken::CloseBracket => Token::CloseBracket,
                RawToken::OpenBrace => Token::OpenBrace,
                RawToken::CloseBrace => Token::CloseBrace,
                RawToken::Comma => Token::Comma,
                RawToken::Newline => Token::Newline,
                RawToken::Error => {
                    let found = slice.chars().next().unwrap_or('\u{fffd}');
                    return Err(Error::UnexpectedCharacter { range, found });
                }
            };
            let position = line_index.position(source, span.start);

            Ok(Spanned {
                token,
                range,
                position,
            })
        })
}

/// Scan the whole of `source`, returning the tokens terminated by
/// [`Token::Eof`] along with any errors encountered along the way.
pub fn scan(source: &str) -> (Vec<Spanned<'_>>, Vec<Error>) {
    let mut spanned = Vec::new();
    let mut errors = Vec::new();

    for result in tokens(source) {
        match result {
            Ok(token) => spanned.push(token),
            Err(error) => {
                tracing::trace!(?error, "skipping unscannable input");
                errors.push(error);
            }
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

/// Resolve the escapes in the raw contents of a string literal. Unknown
/// escapes stand for the escaped character.
pub fn unescape(raw: &str) -> String {
    let mut output = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some('n') => output.push('\n'),
                Some('t') => output.push('\t'),
                Some(ch) => output.push(ch),
                None => output.push('\\'),
            },
            ch => output.push(ch),
        }
    }

    output
}

/// Escape a string so that it can be written between quotes and read back
/// by [`unescape`].
pub fn escape(text: &str) -> String {
    let mut output = String::with_capacity(text.len() + 2);
    for ch in text.chars() {
        match ch {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\n' => output.push_str("\\n"),
            '\t' => output.push_str("\\t"),
            ch => output.push(ch),
        }
    }
    output
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
    fn kpi_with_modifiers() {
        assert_eq!(
            kinds("Kp:revenue#green!h"),
            vec![
                Token::TypeCode("Kp"),
                Token::Field("revenue"),
                Token::Color("green"),
                Token::Priority("h"),
                Token::Eof,
            ],
        );
        assert_eq!(kinds("Kp:revenue#green!h"), kinds("Kp :revenue #green !h"));
    }

    #[test]
    fn concatenated_modifiers() {
        let spaced = "Kp :x #y !z @a >b <c ~5s $lo %lg ^g *3";
        let packed = "Kp:x#y!z@a>b<c~5s$lo%lg^g*3";
        assert_eq!(kinds(spaced), kinds(packed));
        assert_eq!(kinds(packed).len(), 13);
    }

    #[test]
    fn digits() {
        assert_eq!(
            kinds("1 12 0123 1st"),
            vec![
                Token::TypeIndex(1),
                Token::Number("12"),
                Token::Number("0123"),
                Token::Identifier("1st"),
                Token::Eof,
            ],
        );
    }

    #[test]
    fn words() {
        assert_eq!(
            kinds("Survey Kp Zz Xyz hello-world Total"),
            vec![
                Token::SurveyStart,
                Token::TypeCode("Kp"),
                Token::TypeCode("Zz"),
                Token::TypeCode("Xyz"),
                Token::Identifier("hello-world"),
                Token::Identifier("Total"),
                Token::Eof,
            ],
        );
    }

    #[test]
    fn bindings() {
        assert_eq!(
            kinds(":user.name :. :.item :# =a*b :hover?bold"),
            vec![
                Token::Field("user.name"),
                Token::Iterator(""),
                Token::Iterator("item"),
                Token::IndexRef,
                Token::Expression("a*b"),
                Token::StateCondition("hover", "bold"),
                Token::Eof,
            ],
        );
    }

    #[test]
    fn signals_and_layers() {
        assert_eq!(
            kinds(">/1 >tab=2 <tab <>sel /2 /< ?@tab=1"),
            vec![
                Token::SignalEmit("/1"),
                Token::SignalEmit("tab=2"),
                Token::SignalReceive("tab"),
                Token::SignalBoth("sel"),
                Token::Layer("2"),
                Token::LayerClose,
                Token::Condition("@tab=1"),
                Token::Eof,
            ],
        );
    }

    #[test]
    fn conditional_colors_keep_commas() {
        assert_eq!(
            kinds("#?>=80:green,<80:red"),
            vec![Token::Color("?>=80:green,<80:red"), Token::Eof],
        );
    }

    #[test]
    fn streams_stop_at_sigils_but_not_colons() {
        assert_eq!(
            kinds("~ws://host/x#red"),
            vec![Token::Stream("ws://host/x"), Token::Color("red"), Token::Eof],
        );
    }

    #[test]
    fn strings_and_comments() {
        assert_eq!(
            kinds("Tx \"a \\\"b\\\"\" // trailing\n"),
            vec![
                Token::TypeCode("Tx"),
                Token::StringLiteral("a \\\"b\\\""),
                Token::Comment(" trailing"),
                Token::Newline,
                Token::Eof,
            ],
        );
        assert_eq!(unescape("a \\\"b\\\" \\n \\q"), "a \"b\" \n q");
        assert_eq!(unescape(&escape("say \"hi\"\\\n")), "say \"hi\"\\\n");
    }

    #[test]
    fn unterminated_string() {
        let (tokens, errors) = scan("Tx \"oops");
        assert_eq!(tokens.len(), 2);
        assert_eq!(
            errors,
            vec![Error::UnterminatedString {
                range: ByteRange::new(3, 8)
            }],
        );
    }

    #[test]
    fn unexpected_characters_are_skipped() {
        let (tokens, errors) = scan("Kp & :a");
        assert_eq!(tokens.len(), 3);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].severity(), Severity::Warning);
    }

    #[test]
    fn negative_numbers() {
        assert_eq!(
            kinds("Rg :temp -10 -2.5"),
            vec![
                Token::TypeCode("Rg"),
                Token::Field("temp"),
                Token::Number("-10"),
                Token::Number("-2.5"),
                Token::Eof,
            ],
        );
    }

    #[test]
    fn lone_sigil_characters_are_skipped() {
        let (tokens, errors) = scan("Rg - 3 : / :a");
        let tokens = tokens.into_iter().map(|spanned| spanned.token).collect::<Vec<_>>();
        assert_eq!(
            tokens,
            vec![Token::TypeCode("Rg"), Token::TypeIndex(3), Token::Field("a"), Token::Eof],
        );
        assert_eq!(
            errors,
            vec![
                Error::UnexpectedCharacter {
                    range: ByteRange::new(3, 4),
                    found: '-',
                },
                Error::UnexpectedCharacter {
                    range: ByteRange::new(7, 8),
                    found: ':',
                },
                Error::UnexpectedCharacter {
                    range: ByteRange::new(9, 10),
                    found: '/',
                },
            ],
        );
        assert!(errors.iter().all(|error| error.severity() == Severity::Warning));
    }

    #[test]
    fn positions() {
        let (tokens, _) = scan("Kp :a\n  Br");
        assert_eq!(tokens[2].token, Token::Newline);
        assert_eq!(tokens[3].position, Position { line: 2, column: 3 });
    }
}
