//! A recursive descent parser for the UI dialect.
//!
//! Every rule recovers from malformed input by recording a [`ParseMessage`]
//! and skipping ahead, so a best-effort [`Module`] is always produced.

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};
use std::fmt;
use std::ops::Range;

use crate::files::FileId;
use crate::source::{BytePos, ByteRange};
use crate::survey;
use crate::ui::lexer::{self, Spanned, Token};
use crate::ui::schema::{Span, Stream};
use crate::ui::{
    tables, Binding, Block, Guard, Layer, Modifier, Module, SignalDecl, TypeSyntax,
    CUSTOM_KEYWORD,
};

#[derive(Clone, Debug, PartialEq)]
pub enum ParseMessage {
    Lexer(lexer::Error),
    UnexpectedToken {
        range: ByteRange,
        found: &'static str,
        expected: &'static str,
    },
    UnknownTypeCode {
        range: ByteRange,
        code: String,
        suggestion: &'static str,
    },
    MissingComponentId {
        range: ByteRange,
    },
    InvalidModifier {
        range: ByteRange,
        kind: &'static str,
        text: String,
    },
    InvalidStream {
        range: ByteRange,
        text: String,
    },
    InvalidCondition {
        range: ByteRange,
        text: String,
    },
    DuplicateCondition {
        range: ByteRange,
    },
    InvalidLayer {
        range: ByteRange,
        text: String,
    },
    /// A layer reusing the id of an earlier layer, or `/0` alongside main
    /// blocks, which already make up layer 0.
    DuplicateLayer {
        range: ByteRange,
        id: u32,
        first: ByteRange,
    },
    ExpectedBlock {
        range: ByteRange,
        after: &'static str,
    },
    UnclosedChildren {
        range: ByteRange,
    },
    ExpectedSurveyBody {
        range: ByteRange,
    },
    UnclosedSurvey {
        range: ByteRange,
    },
    /// A message from a survey embedded in the document, with its range
    /// already moved into the outer source.
    Survey(survey::ParseMessage),
}

impl ParseMessage {
    pub fn range(&self) -> ByteRange {
        match self {
            ParseMessage::Lexer(error) => error.range(),
            ParseMessage::Survey(message) => message.range(),
            ParseMessage::UnexpectedToken { range, .. }
            | ParseMessage::UnknownTypeCode { range, .. }
            | ParseMessage::MissingComponentId { range }
            | ParseMessage::InvalidModifier { range, .. }
            | ParseMessage::InvalidStream { range, .. }
            | ParseMessage::InvalidCondition { range, .. }
            | ParseMessage::DuplicateCondition { range }
            | ParseMessage::InvalidLayer { range, .. }
            | ParseMessage::DuplicateLayer { range, .. }
            | ParseMessage::ExpectedBlock { range, .. }
            | ParseMessage::UnclosedChildren { range }
            | ParseMessage::ExpectedSurveyBody { range }
            | ParseMessage::UnclosedSurvey { range } => *range,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ParseMessage::Lexer(error) => error.severity(),
            ParseMessage::Survey(message) => message.severity(),
            ParseMessage::UnknownTypeCode { .. } | ParseMessage::DuplicateCondition { .. } => {
                Severity::Warning
            }
            _ => Severity::Error,
        }
    }

    /// Messages that leave the rest of the document unreadable.
    pub fn is_fatal(&self) -> bool {
        match self {
            ParseMessage::Lexer(lexer::Error::UnterminatedString { .. }) => true,
            ParseMessage::Survey(message) => message.is_fatal(),
            _ => false,
        }
    }

    pub fn to_diagnostic(&self, file_id: FileId) -> Diagnostic<FileId> {
        let primary = |range: &ByteRange| Label::primary(file_id, *range);

        match self {
            ParseMessage::Lexer(error) => error.to_diagnostic(file_id),
            ParseMessage::Survey(message) => message.to_diagnostic(file_id),
            ParseMessage::UnexpectedToken {
                range,
                found,
                expected,
            } => Diagnostic::error()
                .with_message(format!("unexpected {found}"))
                .with_labels(vec![primary(range).with_message(format!("expected {expected}"))]),
            ParseMessage::UnknownTypeCode {
                range,
                code,
                suggestion,
            } => Diagnostic::warning()
                .with_message(format!("unknown type code `{code}`"))
                .with_labels(vec![primary(range)])
                .with_notes(vec![format!("help: did you mean `{suggestion}`?")]),
            ParseMessage::MissingComponentId { range } => Diagnostic::error()
                .with_message("expected a component id")
                .with_labels(vec![primary(range)])
                .with_notes(vec![format!("custom blocks are written `{CUSTOM_KEYWORD} \"component-id\"`")]),
            ParseMessage::InvalidModifier { range, kind, text } => Diagnostic::error()
                .with_message(format!("invalid {kind} `{text}`"))
                .with_labels(vec![primary(range)]),
            ParseMessage::InvalidStream { range, text } => Diagnostic::error()
                .with_message(format!("invalid stream source `~{text}`"))
                .with_labels(vec![primary(range)])
                .with_notes(vec![
                    "expected an interval like `~5s`, a `~ws://` or `~sse://` url, or `~poll`"
                        .to_owned(),
                ]),
            ParseMessage::InvalidCondition { range, text } => Diagnostic::error()
                .with_message(format!("invalid condition `?{text}`"))
                .with_labels(vec![primary(range)])
                .with_notes(vec![
                    "conditions are written `?@signal` or `?@signal=value`".to_owned(),
                ]),
            ParseMessage::DuplicateCondition { range } => Diagnostic::warning()
                .with_message("block already has a condition")
                .with_labels(vec![primary(range).with_message("this condition is ignored")]),
            ParseMessage::InvalidLayer { range, text } => Diagnostic::error()
                .with_message(format!("invalid layer `/{text}`"))
                .with_labels(vec![primary(range)]),
            ParseMessage::DuplicateLayer { range, id, first } => Diagnostic::error()
                .with_message(format!("layer {id} is defined more than once"))
                .with_labels(vec![
                    primary(range).with_message("this layer is ignored"),
                    Label::secondary(file_id, *first).with_message(match id {
                        0 => "the main blocks make up layer 0",
                        _ => "first defined here",
                    }),
                ]),
            ParseMessage::ExpectedBlock { range, after } => Diagnostic::error()
                .with_message(format!("expected a block after this {after}"))
                .with_labels(vec![primary(range)]),
            ParseMessage::UnclosedChildren { range } => Diagnostic::error()
                .with_message("unclosed child list")
                .with_labels(vec![primary(range).with_message("missing a closing `]`")]),
            ParseMessage::ExpectedSurveyBody { range } => Diagnostic::error()
                .with_message("expected `{` after `Survey`")
                .with_labels(vec![primary(range)]),
            ParseMessage::UnclosedSurvey { range } => Diagnostic::error()
                .with_message("unclosed survey")
                .with_labels(vec![primary(range).with_message("missing a closing `}`")]),
        }
    }
}

impl fmt::Display for ParseMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseMessage::Lexer(error) => write!(f, "{error}"),
            ParseMessage::Survey(message) => write!(f, "{message}"),
            ParseMessage::UnexpectedToken {
                found, expected, ..
            } => write!(f, "unexpected {found}, expected {expected}"),
            ParseMessage::UnknownTypeCode {
                code, suggestion, ..
            } => write!(f, "unknown type code `{code}`, did you mean `{suggestion}`?"),
            ParseMessage::MissingComponentId { .. } => write!(f, "expected a component id"),
            ParseMessage::InvalidModifier { kind, text, .. } => write!(f, "invalid {kind} `{text}`"),
            ParseMessage::InvalidStream { text, .. } => write!(f, "invalid stream source `~{text}`"),
            ParseMessage::InvalidCondition { text, .. } => write!(f, "invalid condition `?{text}`"),
            ParseMessage::DuplicateCondition { .. } => write!(f, "block already has a condition"),
            ParseMessage::InvalidLayer { text, .. } => write!(f, "invalid layer `/{text}`"),
            ParseMessage::DuplicateLayer { id, .. } => write!(f, "layer {id} is defined more than once"),
            ParseMessage::ExpectedBlock { after, .. } => write!(f, "expected a block after {after}"),
            ParseMessage::UnclosedChildren { .. } => write!(f, "unclosed child list"),
            ParseMessage::ExpectedSurveyBody { .. } => write!(f, "expected `{{` after `Survey`"),
            ParseMessage::UnclosedSurvey { .. } => write!(f, "unclosed survey"),
        }
    }
}

pub fn parse(source: &str) -> (Module, Vec<ParseMessage>) {
    let (tokens, lexer_errors) = lexer::scan(source);
    let tokens = tokens
        .into_iter()
        .filter(|spanned| !spanned.token.is_trivia())
        .collect();

    let mut parser = Parser::new(source, tokens);
    let module = parser.module();

    // Survey bodies are scanned by the survey lexer, so errors the UI lexer
    // found inside them are meaningless.
    let mut messages = Vec::with_capacity(lexer_errors.len() + parser.messages.len());
    for error in lexer_errors {
        let start = error.range().start();
        if !parser.embedded.iter().any(|range| range.contains(&start)) {
            messages.push(ParseMessage::Lexer(error));
        }
    }
    messages.append(&mut parser.messages);
    messages.sort_by_key(|message| message.range().start());

    (module, messages)
}

struct Parser<'source> {
    source: &'source str,
    /// Non-trivia tokens, always terminated by [`Token::Eof`].
    tokens: Vec<Spanned<'source>>,
    position: usize,
    last_end: BytePos,
    messages: Vec<ParseMessage>,
    /// Byte ranges of embedded survey bodies.
    embedded: Vec<Range<BytePos>>,
}

impl<'source> Parser<'source> {
    fn new(source: &'source str, tokens: Vec<Spanned<'source>>) -> Parser<'source> {
        Parser {
            source,
            tokens,
            position: 0,
            last_end: 0,
            messages: Vec::new(),
            embedded: Vec::new(),
        }
    }

    fn peek(&self) -> &Spanned<'source> {
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    /// Consume the next token. The final `Eof` is never consumed.
    fn advance(&mut self) -> Spanned<'source> {
        let spanned = self.peek().clone();
        if spanned.token != Token::Eof {
            self.position += 1;
            self.last_end = spanned.range.end();
        }
        spanned
    }

    fn range_from(&self, start: ByteRange) -> ByteRange {
        ByteRange::new(start.start(), self.last_end.max(start.end()))
    }

    fn at_block_start(&self) -> bool {
        matches!(
            self.peek().token,
            Token::TypeIndex(_)
                | Token::TypeCode(_)
                | Token::Condition(_)
                | Token::Identifier(CUSTOM_KEYWORD)
        )
    }

    fn unexpected(&mut self, expected: &'static str) {
        let spanned = self.advance();
        self.messages.push(ParseMessage::UnexpectedToken {
            range: spanned.range,
            found: spanned.token.description(),
            expected,
        });

        // Skip the whole of a misplaced survey, not just its keyword
        if spanned.token == Token::SurveyStart && self.peek().token == Token::OpenBrace {
            let _ = self.survey_body(spanned.range);
        }
    }

    fn module(&mut self) -> Module {
        let mut module = Module::default();

        loop {
            let spanned = self.peek().clone();
            match spanned.token {
                Token::Eof => break,
                Token::Comma => {
                    self.advance();
                }
                Token::SignalDeclare(name) => {
                    self.advance();
                    match name {
                        "" => self.invalid_modifier(&spanned),
                        name => module.signals.push(SignalDecl {
                            range: spanned.range,
                            name: name.to_owned(),
                        }),
                    }
                }
                Token::Layer(_) => module.layers.extend(self.layer()),
                Token::SurveyStart => {
                    self.advance();
                    module.surveys.extend(self.survey_body(spanned.range));
                }
                _ if self.at_block_start() => module.blocks.extend(self.block_or_guard()),
                _ => self.unexpected("a block"),
            }
        }

        self.drop_duplicate_layers(&mut module);
        module
    }

    /// Keep the first layer with each id. Main blocks count as layer 0.
    fn drop_duplicate_layers(&mut self, module: &mut Module) {
        let mut defined = Vec::<(u32, ByteRange)>::with_capacity(module.layers.len() + 1);
        if let Some(first) = module.blocks.first() {
            defined.push((0, first.range));
        }

        let messages = &mut self.messages;
        module.layers.retain(|layer| {
            match defined.iter().find(|(id, _)| *id == layer.id) {
                Some(&(id, first)) => {
                    tracing::debug!(id, "dropping duplicate layer");
                    messages.push(ParseMessage::DuplicateLayer {
                        range: layer.range,
                        id,
                        first,
                    });
                    false
                }
                None => {
                    defined.push((layer.id, layer.range));
                    true
                }
            }
        });
    }

    fn layer(&mut self) -> Option<Layer> {
        let start = self.advance();
        let id = match start.token {
            Token::Layer(digits) => match digits.parse::<u32>() {
                Ok(id) => Some(id),
                Err(_) => {
                    self.messages.push(ParseMessage::InvalidLayer {
                        range: start.range,
                        text: digits.to_owned(),
                    });
                    None
                }
            },
            _ => None,
        };

        if !self.at_block_start() {
            self.messages.push(ParseMessage::ExpectedBlock {
                range: start.range,
                after: "layer",
            });
            return None;
        }

        let root = self.block_or_guard()?;
        Some(Layer {
            range: self.range_from(start.range),
            id: id?,
            root,
        })
    }

    /// A block, optionally preceded by a guard. A guard followed by a list of
    /// blocks applies to a container around them, unless there is only one.
    fn block_or_guard(&mut self) -> Option<Block> {
        let start = self.peek().clone();
        let text = match start.token {
            Token::Condition(text) => text,
            _ => return self.block(),
        };
        self.advance();
        let guard = self.guard(text, start.range);

        let mut block = match self.peek().token {
            Token::OpenBracket => {
                let mut children = self.children();
                match children.len() {
                    1 => children.pop()?,
                    _ => Block {
                        range: self.range_from(start.range),
                        ty: TypeSyntax::Index(0),
                        bindings: Vec::new(),
                        modifiers: Vec::new(),
                        guard: None,
                        children: Some(children),
                        survey: None,
                    },
                }
            }
            _ if self.at_block_start() => self.block_or_guard()?,
            _ => {
                self.messages.push(ParseMessage::ExpectedBlock {
                    range: start.range,
                    after: "condition",
                });
                return None;
            }
        };

        if let Some(guard) = guard {
            match block.guard {
                Some(_) => self.messages.push(ParseMessage::DuplicateCondition { range: start.range }),
                None => block.guard = Some(guard),
            }
        }
        block.range = block.range.merge(start.range);

        Some(block)
    }

    fn guard(&mut self, text: &str, range: ByteRange) -> Option<Guard> {
        let guard = text.strip_prefix('@').and_then(|rest| {
            let (signal, value) = match rest.split_once('=') {
                Some((signal, value)) => (signal, Some(value.to_owned())),
                None => (rest, None),
            };
            (!signal.is_empty()).then(|| Guard {
                signal: signal.to_owned(),
                value,
            })
        });

        if guard.is_none() {
            self.messages.push(ParseMessage::InvalidCondition {
                range,
                text: text.to_owned(),
            });
        }
        guard
    }

    fn block(&mut self) -> Option<Block> {
        let start = self.advance();
        let ty = match start.token {
            Token::TypeIndex(index) => TypeSyntax::Index(index),
            Token::TypeCode(code) => {
                if !tables::is_known_code(code) {
                    if let Some(suggestion) = tables::suggest_code(code) {
                        self.messages.push(ParseMessage::UnknownTypeCode {
                            range: start.range,
                            code: code.to_owned(),
                            suggestion,
                        });
                    }
                }
                TypeSyntax::Code(code.to_owned())
            }
            Token::Identifier(CUSTOM_KEYWORD) => match self.peek().token {
                Token::StringLiteral(raw) => {
                    self.advance();
                    TypeSyntax::Custom(lexer::unescape(raw))
                }
                _ => {
                    self.messages.push(ParseMessage::MissingComponentId { range: start.range });
                    TypeSyntax::Custom(String::new())
                }
            },
            ref token => {
                self.messages.push(ParseMessage::UnexpectedToken {
                    range: start.range,
                    found: token.description(),
                    expected: "a block",
                });
                return None;
            }
        };

        let mut bindings = Vec::new();
        let mut modifiers = Vec::new();

        loop {
            let spanned = self.peek().clone();
            match spanned.token {
                Token::OpenBracket
                | Token::CloseBracket
                | Token::Comma
                | Token::Layer(_)
                | Token::TypeIndex(_)
                | Token::TypeCode(_)
                | Token::Identifier(CUSTOM_KEYWORD)
                | Token::SurveyStart
                | Token::Condition(_)
                | Token::Eof => break,
                _ => {}
            }
            self.advance();

            match binding(&spanned.token) {
                Some(binding) => bindings.push(binding),
                None => modifiers.extend(self.modifier(&spanned)),
            }
        }

        let children = match self.peek().token {
            Token::OpenBracket => Some(self.children()),
            _ => None,
        };

        let survey = match self.peek().token {
            Token::SurveyStart => {
                let keyword = self.advance();
                self.survey_body(keyword.range)
            }
            _ => None,
        };

        Some(Block {
            range: self.range_from(start.range),
            ty,
            bindings,
            modifiers,
            guard: None,
            children,
            survey,
        })
    }

    fn modifier(&mut self, spanned: &Spanned<'source>) -> Option<Modifier> {
        let modifier = match spanned.token {
            Token::Priority(text) => priority(text),
            Token::Flex(text) => non_empty(text)
                .map(|flex| Modifier::Flex(expand_or_keep(tables::FLEX_VALUES, flex))),
            Token::Span(text) => span(text),
            Token::Color(text) => color(text),
            Token::Size(text) => non_empty(text).map(|size| Modifier::Size(size.to_owned())),
            Token::Stream(text) => {
                return match Stream::parse(text) {
                    Some(stream) => Some(Modifier::Stream(stream)),
                    None => {
                        self.messages.push(ParseMessage::InvalidStream {
                            range: spanned.range,
                            text: text.to_owned(),
                        });
                        None
                    }
                };
            }
            Token::Fidelity(text) => non_empty(text).map(|level| Modifier::Fidelity(level.to_owned())),
            Token::SignalDeclare(name) => non_empty(name).map(|name| Modifier::Declare(name.to_owned())),
            Token::SignalEmit(text) => emit(text),
            Token::SignalReceive(name) => non_empty(name).map(|name| Modifier::Receive(name.to_owned())),
            Token::SignalBoth(name) => non_empty(name).map(|name| Modifier::Both(name.to_owned())),
            Token::LayerClose => Some(Modifier::LayerTrigger(0)),
            Token::StateCondition(state, expr) => Some(Modifier::State(format!("{state}?{expr}"))),
            ref token => {
                self.messages.push(ParseMessage::UnexpectedToken {
                    range: spanned.range,
                    found: token.description(),
                    expected: "a binding or modifier",
                });
                return None;
            }
        };

        if modifier.is_none() {
            self.invalid_modifier(spanned);
        }
        modifier
    }

    fn invalid_modifier(&mut self, spanned: &Spanned<'source>) {
        self.messages.push(ParseMessage::InvalidModifier {
            range: spanned.range,
            kind: spanned.token.description(),
            text: spanned.token.to_string(),
        });
    }

    fn children(&mut self) -> Vec<Block> {
        let open = self.advance();
        let mut children = Vec::new();

        loop {
            match self.peek().token {
                Token::CloseBracket => {
                    self.advance();
                    break;
                }
                Token::Eof | Token::Layer(_) => {
                    self.messages.push(ParseMessage::UnclosedChildren { range: open.range });
                    break;
                }
                Token::Comma => {
                    self.advance();
                }
                _ if self.at_block_start() => children.extend(self.block_or_guard()),
                _ => self.unexpected("a block"),
            }
        }

        children
    }

    /// Parse the braced body following a `Survey` keyword with the survey
    /// parser. The body is found by matching braces in the source text, as
    /// the UI lexer has no idea what survey syntax looks like.
    fn survey_body(&mut self, keyword: ByteRange) -> Option<survey::Module> {
        let open = match self.peek().token {
            Token::OpenBrace => self.advance(),
            _ => {
                self.messages.push(ParseMessage::ExpectedSurveyBody { range: keyword });
                return None;
            }
        };

        let body_start = open.range.end();
        let body = &self.source[body_start as usize..];
        let (body_end, resume) = match closing_brace(body) {
            Some(len) => {
                let end = body_start + len as BytePos;
                (end, end + 1)
            }
            None => {
                self.messages.push(ParseMessage::UnclosedSurvey { range: open.range });
                let end = self.source.len() as BytePos;
                (end, end)
            }
        };

        while self.peek().token != Token::Eof && self.peek().range.start() < resume {
            self.advance();
        }
        self.last_end = self.last_end.max(resume);
        self.embedded.push(body_start..body_end);

        let text = &self.source[body_start as usize..body_end as usize];
        let (module, messages) = survey::Module::parse(text);
        self.messages.extend(
            (messages.into_iter())
                .map(|message| ParseMessage::Survey(message.shift(body_start))),
        );

        Some(module)
    }
}

/// The offset of the brace closing a body that starts just after an opening
/// brace. Braces in strings and line comments are not counted.
fn closing_brace(text: &str) -> Option<usize> {
    let mut depth = 0_usize;
    let mut chars = text.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        match ch {
            '"' => {
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '\\' => {
                            chars.next();
                        }
                        '"' => break,
                        _ => {}
                    }
                }
            }
            '/' if matches!(chars.peek(), Some((_, '/'))) => {
                while let Some((_, ch)) = chars.next() {
                    if ch == '\n' {
                        break;
                    }
                }
            }
            '{' => depth += 1,
            '}' if depth == 0 => return Some(offset),
            '}' => depth -= 1,
            _ => {}
        }
    }

    None
}

/// A single binding, modifier or guard.
#[derive(Clone, Debug, PartialEq)]
pub(super) enum Piece {
    Binding(Binding),
    Modifier(Modifier),
    Guard(Guard),
}

/// Read a single binding, modifier or guard back from its source text,
/// returning `None` if the text is anything else or would produce messages.
pub(super) fn piece(text: &str) -> Option<Piece> {
    let (tokens, errors) = lexer::scan(text);
    let spanned = match (&tokens[..], errors.is_empty()) {
        ([spanned, _], true) => spanned,
        _ => return None,
    };

    if let Some(binding) = binding(&spanned.token) {
        return Some(Piece::Binding(binding));
    }

    let mut parser = Parser::new(text, tokens.clone());
    let piece = match spanned.token {
        Token::Condition(condition) => parser.guard(condition, spanned.range).map(Piece::Guard),
        _ => parser.modifier(spanned).map(Piece::Modifier),
    };
    piece.filter(|_| parser.messages.is_empty())
}

fn binding(token: &Token<'_>) -> Option<Binding> {
    match *token {
        Token::Number(digits) if digits.bytes().all(|b| b.is_ascii_digit()) => {
            Some(Binding::Indexed(digits.to_owned()))
        }
        Token::Field(path) => Some(Binding::Field(path.to_owned())),
        Token::Iterator(name) => Some(Binding::Iterator(name.to_owned())),
        Token::IndexRef => Some(Binding::IndexRef),
        Token::Expression(expr) => Some(Binding::Computed(expr.to_owned())),
        Token::StringLiteral(raw) => Some(Binding::Literal(lexer::unescape(raw))),
        _ => None,
    }
}

fn non_empty(text: &str) -> Option<&str> {
    (!text.is_empty()).then_some(text)
}

fn expand_or_keep(table: &[(&str, &'static str)], text: &str) -> String {
    match tables::expand(table, text) {
        Some(full) => full.to_owned(),
        None => text.to_owned(),
    }
}

/// `!h`, `!p` and `!s` are named priorities and `!0` to `!9` are numeric
/// ones. Anything else names an action.
fn priority(text: &str) -> Option<Modifier> {
    if let Some(value) = tables::priority_for_name(text) {
        return Some(Modifier::Priority(value));
    }
    match text.as_bytes() {
        [] => None,
        [digit @ b'0'..=b'9'] => Some(Modifier::Priority(u32::from(digit - b'0'))),
        _ => Some(Modifier::Action(text.to_owned())),
    }
}

fn span(text: &str) -> Option<Modifier> {
    match text {
        "" => None,
        _ if text.bytes().all(|b| b.is_ascii_digit()) => {
            text.parse().ok().map(|columns| Modifier::Span(Span::Columns(columns)))
        }
        _ => Some(Modifier::Span(Span::Named(expand_or_keep(tables::SPAN_VALUES, text)))),
    }
}

fn color(text: &str) -> Option<Modifier> {
    match text.strip_prefix('?') {
        Some(condition) => non_empty(condition).map(|c| Modifier::ColorCondition(c.to_owned())),
        None => non_empty(text).map(|c| Modifier::Color(expand_or_keep(tables::COLOR_ALIASES, c))),
    }
}

fn emit(text: &str) -> Option<Modifier> {
    if let Some(digits) = text.strip_prefix('/') {
        return digits.parse().ok().map(Modifier::LayerTrigger);
    }
    let (name, value) = match text.split_once('=') {
        Some((name, value)) => (name, Some(value.to_owned())),
        None => (text, None),
    };
    non_empty(name).map(|name| Modifier::Emit {
        name: name.to_owned(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Module {
        let (module, messages) = parse(source);
        assert!(messages.is_empty(), "{messages:?}");
        module
    }

    #[test]
    fn kpi_with_modifiers() {
        let module = parse_ok("Kp :revenue #green !h");
        assert_eq!(module.blocks.len(), 1);

        let block = &module.blocks[0];
        assert_eq!(block.ty, TypeSyntax::Code("Kp".to_owned()));
        assert_eq!(block.bindings, vec![Binding::Field("revenue".to_owned())]);
        assert_eq!(
            block.modifiers,
            vec![Modifier::Color("green".to_owned()), Modifier::Priority(100)],
        );
    }

    #[test]
    fn signals_layers_and_children() {
        let source = "@tab\nCn [Bt \"One\" >tab=1, Bt \"More\" >/1]\n/1 Md \"Details\" [Tx :summary /<]";
        let module = parse_ok(source);

        assert_eq!(module.signals.len(), 1);
        assert_eq!(module.signals[0].name, "tab");
        assert_eq!(module.blocks.len(), 1);
        assert_eq!(module.layers.len(), 1);
        assert_eq!(module.layers[0].id, 1);

        let children = module.blocks[0].children.as_ref().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(
            children[0].modifiers,
            vec![Modifier::Emit {
                name: "tab".to_owned(),
                value: Some("1".to_owned()),
            }],
        );
        assert_eq!(children[1].modifiers, vec![Modifier::LayerTrigger(1)]);

        let modal = &module.layers[0].root;
        let text = &modal.children.as_ref().unwrap()[0];
        assert_eq!(text.modifiers, vec![Modifier::LayerTrigger(0)]);
        assert_eq!(module.block_count(), 5);
    }

    #[test]
    fn guards_apply_to_single_blocks() {
        let module = parse_ok("?@tab=1 Kp :a\n?@step [Fm [In :name]]");
        assert_eq!(module.blocks.len(), 2);
        assert_eq!(
            module.blocks[0].guard,
            Some(Guard {
                signal: "tab".to_owned(),
                value: Some("1".to_owned()),
            }),
        );
        assert_eq!(module.blocks[1].ty, TypeSyntax::Code("Fm".to_owned()));
        assert_eq!(module.blocks[1].guard.as_ref().unwrap().value, None);
    }

    #[test]
    fn guards_wrap_several_blocks() {
        let module = parse_ok("?@step=3 [Fm [In :email], Bt \"Submit\" !submit]");
        let wrapper = &module.blocks[0];
        assert_eq!(wrapper.ty, TypeSyntax::Index(0));
        assert!(wrapper.guard.is_some());
        assert_eq!(wrapper.children.as_ref().unwrap().len(), 2);

        let button = &wrapper.children.as_ref().unwrap()[1];
        assert_eq!(button.modifiers, vec![Modifier::Action("submit".to_owned())]);
    }

    #[test]
    fn bindings() {
        let module = parse_ok("Tb 0123 :rows :. :.name :# =a*b \"Label\"");
        assert_eq!(
            module.blocks[0].bindings,
            vec![
                Binding::Indexed("0123".to_owned()),
                Binding::Field("rows".to_owned()),
                Binding::Iterator(String::new()),
                Binding::Iterator("name".to_owned()),
                Binding::IndexRef,
                Binding::Computed("a*b".to_owned()),
                Binding::Literal("Label".to_owned()),
            ],
        );
    }

    #[test]
    fn layout_and_style_tables() {
        let module = parse_ok("Cd ^g *h #?>=80:green,<80:red %lg !3 *6 #r");
        assert_eq!(
            module.blocks[0].modifiers,
            vec![
                Modifier::Flex("grow".to_owned()),
                Modifier::Span(Span::Named("half".to_owned())),
                Modifier::ColorCondition(">=80:green,<80:red".to_owned()),
                Modifier::Size("lg".to_owned()),
                Modifier::Priority(3),
                Modifier::Span(Span::Columns(6)),
                Modifier::Color("red".to_owned()),
            ],
        );
    }

    #[test]
    fn custom_components() {
        let module = parse_ok("Custom \"map-view\" \"Location Map\" :locations");
        let block = &module.blocks[0];
        assert_eq!(block.ty, TypeSyntax::Custom("map-view".to_owned()));
        assert_eq!(block.ty.name(), "custom");
        assert_eq!(block.bindings.len(), 2);
    }

    #[test]
    fn embedded_surveys() {
        let source = "Cd \"Feedback\" Survey {\n  > start \"Hi\" -> q1\n  ? q1 Tx \"Name?\" -> end\n  < end \"Bye\"\n}\nBt \"Done\"";
        let module = parse_ok(source);
        assert_eq!(module.blocks.len(), 2);
        let survey = module.blocks[0].survey.as_ref().unwrap();
        assert_eq!(survey.nodes.len(), 3);
    }

    #[test]
    fn embedded_survey_messages_point_into_the_document() {
        let source = "Cd Survey { > start -> nowhere }";
        let (_, messages) = parse(source);
        assert!(!messages.is_empty());
        let range = Range::<usize>::from(messages[0].range());
        assert_eq!(&source[range], "nowhere");
    }

    #[test]
    fn unknown_codes_suggest_known_ones() {
        let (module, messages) = parse("Kq :revenue");
        assert_eq!(module.blocks[0].ty.name(), "kq");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].severity(), Severity::Warning);
    }

    #[test]
    fn recovers_from_stray_tokens() {
        let (module, messages) = parse("#red Kp :a ] Br :b");
        assert_eq!(module.blocks.len(), 2);
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.severity() == Severity::Error));
    }

    #[test]
    fn unclosed_children_are_kept() {
        let (module, messages) = parse("Cn [Kp :a, Kp :b");
        assert_eq!(module.blocks[0].children.as_ref().unwrap().len(), 2);
        assert!(matches!(messages[..], [ParseMessage::UnclosedChildren { .. }]));
    }

    #[test]
    fn invalid_modifiers() {
        let (module, messages) = parse("Bt ! ~bogus Kp ?@ Br");
        assert_eq!(module.blocks.len(), 3);
        assert_eq!(messages.len(), 3);
    }

    #[test]
    fn duplicate_layers_are_dropped() {
        let (module, messages) = parse("Kp :a\n/1 Md [Tx :a]\n/1 Md [Tx :b]");
        assert_eq!(module.layers.len(), 1);
        let text = &module.layers[0].root.children.as_ref().unwrap()[0];
        assert_eq!(text.bindings, vec![Binding::Field("a".to_owned())]);
        assert_eq!(
            messages,
            vec![ParseMessage::DuplicateLayer {
                range: ByteRange::new(20, 32),
                id: 1,
                first: ByteRange::new(6, 19),
            }],
        );
    }

    #[test]
    fn main_blocks_make_up_layer_zero() {
        let (module, messages) = parse("Kp :b\n/0 Br :c");
        assert_eq!(module.blocks.len(), 1);
        assert!(module.layers.is_empty());
        assert!(matches!(
            messages[..],
            [ParseMessage::DuplicateLayer { id: 0, first, .. }] if first == ByteRange::new(0, 5)
        ));

        let module = parse_ok("/0 Br :c\n/1 Md");
        assert_eq!(module.layers.len(), 2);
    }

    #[test]
    fn signed_numbers_are_reported() {
        let (module, messages) = parse("Rg :temp -10 #red");
        let block = &module.blocks[0];
        assert_eq!(block.bindings, vec![Binding::Field("temp".to_owned())]);
        assert_eq!(block.modifiers, vec![Modifier::Color("red".to_owned())]);
        assert_eq!(
            messages,
            vec![ParseMessage::UnexpectedToken {
                range: ByteRange::new(9, 12),
                found: "number",
                expected: "a binding or modifier",
            }],
        );
    }

    #[test]
    fn unterminated_strings_are_fatal() {
        let (_, messages) = parse("Tx \"oops");
        assert!(messages.iter().any(ParseMessage::is_fatal));
    }

    #[test]
    fn pieces() {
        assert_eq!(piece(":a.b"), Some(Piece::Binding(Binding::Field("a.b".to_owned()))));
        assert_eq!(piece("#g"), Some(Piece::Modifier(Modifier::Color("green".to_owned()))));
        assert_eq!(piece("!h"), Some(Piece::Modifier(Modifier::Priority(100))));
        assert_eq!(
            piece("?@tab=2"),
            Some(Piece::Guard(Guard {
                signal: "tab".to_owned(),
                value: Some("2".to_owned()),
            })),
        );
        assert_eq!(piece("!"), None);
        assert_eq!(piece(":a b"), None);
        assert_eq!(piece("7"), None);
    }

    #[test]
    fn closing_braces() {
        assert_eq!(closing_brace("a } b"), Some(2));
        assert_eq!(closing_brace("{x} \"}\" }"), Some(8));
        assert_eq!(closing_brace("// }\n}"), Some(5));
        assert_eq!(closing_brace("{"), None);
    }
}
