//! A recursive descent parser for the survey dialect.

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};
use fxhash::FxHashMap;
use serde_json::Value;
use std::fmt;

use crate::files::FileId;
use crate::source::{BytePos, ByteRange};
use crate::survey::lexer::{self, Spanned, Token};
use crate::survey::{option_value, tables, Choice, Condition, Header, Module, Node, NodeKind, Transition};

#[derive(Clone, Debug, PartialEq)]
pub enum ParseMessage {
    Lexer(lexer::Error),
    UnexpectedToken {
        range: ByteRange,
        found: &'static str,
        expected: &'static str,
    },
    MissingNodeId {
        range: ByteRange,
        kind: NodeKind,
    },
    MissingSeparator {
        range: ByteRange,
    },
    UnknownQuestionType {
        range: ByteRange,
        code: String,
        suggestion: Option<&'static str>,
    },
    ExpectedTarget {
        range: ByteRange,
    },
    InvalidOption {
        range: ByteRange,
    },
    ExpectedValue {
        range: ByteRange,
    },
    UnclosedDelimiter {
        range: ByteRange,
        delimiter: char,
    },
    DuplicateNode {
        range: ByteRange,
        id: String,
        first: ByteRange,
    },
    UnknownTarget {
        range: ByteRange,
        target: String,
        suggestion: Option<String>,
    },
    EndTransition {
        range: ByteRange,
    },
    DuplicateFallback {
        range: ByteRange,
    },
    MissingStart {
        range: ByteRange,
    },
}

impl ParseMessage {
    pub fn range(&self) -> ByteRange {
        match self {
            ParseMessage::Lexer(error) => error.range(),
            ParseMessage::UnexpectedToken { range, .. }
            | ParseMessage::MissingNodeId { range, .. }
            | ParseMessage::MissingSeparator { range }
            | ParseMessage::UnknownQuestionType { range, .. }
            | ParseMessage::ExpectedTarget { range }
            | ParseMessage::InvalidOption { range }
            | ParseMessage::ExpectedValue { range }
            | ParseMessage::UnclosedDelimiter { range, .. }
            | ParseMessage::DuplicateNode { range, .. }
            | ParseMessage::UnknownTarget { range, .. }
            | ParseMessage::EndTransition { range }
            | ParseMessage::DuplicateFallback { range }
            | ParseMessage::MissingStart { range } => *range,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ParseMessage::Lexer(error) => error.severity(),
            ParseMessage::UnknownQuestionType { .. }
            | ParseMessage::DuplicateFallback { .. }
            | ParseMessage::MissingStart { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ParseMessage::Lexer(lexer::Error::UnterminatedString { .. }))
    }

    /// Move the message into a document that embeds this survey at `offset`.
    pub fn shift(self, offset: BytePos) -> ParseMessage {
        let mut message = self;
        match &mut message {
            ParseMessage::Lexer(error) => *error = error.clone().shift(offset),
            ParseMessage::DuplicateNode { range, first, .. } => {
                *range = range.shift(offset);
                *first = first.shift(offset);
            }
            ParseMessage::UnexpectedToken { range, .. }
            | ParseMessage::MissingNodeId { range, .. }
            | ParseMessage::MissingSeparator { range }
            | ParseMessage::UnknownQuestionType { range, .. }
            | ParseMessage::ExpectedTarget { range }
            | ParseMessage::InvalidOption { range }
            | ParseMessage::ExpectedValue { range }
            | ParseMessage::UnclosedDelimiter { range, .. }
            | ParseMessage::UnknownTarget { range, .. }
            | ParseMessage::EndTransition { range }
            | ParseMessage::DuplicateFallback { range }
            | ParseMessage::MissingStart { range } => *range = range.shift(offset),
        }
        message
    }

    pub fn to_diagnostic(&self, file_id: FileId) -> Diagnostic<FileId> {
        let primary = |range: &ByteRange| Label::primary(file_id, *range);

        match self {
            ParseMessage::Lexer(error) => error.to_diagnostic(file_id),
            ParseMessage::UnexpectedToken {
                range,
                found,
                expected,
            } => Diagnostic::error()
                .with_message(format!("unexpected {found}"))
                .with_labels(vec![primary(range).with_message(format!("expected {expected}"))]),
            ParseMessage::MissingNodeId { range, kind } => Diagnostic::error()
                .with_message(format!("expected an id for this {kind} node"))
                .with_labels(vec![primary(range)]),
            ParseMessage::MissingSeparator { range } => Diagnostic::error()
                .with_message("expected `---` after the survey header")
                .with_labels(vec![primary(range)]),
            ParseMessage::UnknownQuestionType {
                range,
                code,
                suggestion,
            } => Diagnostic::warning()
                .with_message(format!("unknown question type `{code}`"))
                .with_labels(vec![primary(range)])
                .with_notes(match suggestion {
                    Some(suggestion) => vec![format!("help: did you mean `{suggestion}`?")],
                    None => Vec::new(),
                }),
            ParseMessage::ExpectedTarget { range } => Diagnostic::error()
                .with_message("expected a node id after `->`")
                .with_labels(vec![primary(range)]),
            ParseMessage::InvalidOption { range } => Diagnostic::error()
                .with_message("invalid option")
                .with_labels(vec![primary(range)])
                .with_notes(vec![
                    "options are written `\"label\"`, `value=\"label\"` or `id:\"label\"=value`"
                        .to_owned(),
                ]),
            ParseMessage::ExpectedValue { range } => Diagnostic::error()
                .with_message("expected a value")
                .with_labels(vec![primary(range)]),
            ParseMessage::UnclosedDelimiter { range, delimiter } => Diagnostic::error()
                .with_message(format!("unclosed `{delimiter}`"))
                .with_labels(vec![primary(range)]),
            ParseMessage::DuplicateNode { range, id, first } => Diagnostic::error()
                .with_message(format!("node `{id}` is defined more than once"))
                .with_labels(vec![
                    primary(range).with_message("this definition is ignored"),
                    Label::secondary(file_id, *first).with_message("first defined here"),
                ]),
            ParseMessage::UnknownTarget {
                range,
                target,
                suggestion,
            } => Diagnostic::error()
                .with_message(format!("transition to unknown node `{target}`"))
                .with_labels(vec![primary(range)])
                .with_notes(match suggestion {
                    Some(suggestion) => vec![format!("help: did you mean `{suggestion}`?")],
                    None => Vec::new(),
                }),
            ParseMessage::EndTransition { range } => Diagnostic::error()
                .with_message("end nodes cannot have transitions")
                .with_labels(vec![primary(range).with_message("this transition is ignored")]),
            ParseMessage::DuplicateFallback { range } => Diagnostic::warning()
                .with_message("node already has a transition without a condition")
                .with_labels(vec![primary(range).with_message("this transition is never taken")]),
            ParseMessage::MissingStart { range } => Diagnostic::warning()
                .with_message("survey has no start node")
                .with_labels(vec![primary(range)]),
        }
    }
}

impl fmt::Display for ParseMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseMessage::Lexer(error) => write!(f, "{error}"),
            ParseMessage::UnexpectedToken {
                found, expected, ..
            } => write!(f, "unexpected {found}, expected {expected}"),
            ParseMessage::MissingNodeId { kind, .. } => write!(f, "expected an id for this {kind} node"),
            ParseMessage::MissingSeparator { .. } => write!(f, "expected `---` after the survey header"),
            ParseMessage::UnknownQuestionType { code, .. } => write!(f, "unknown question type `{code}`"),
            ParseMessage::ExpectedTarget { .. } => write!(f, "expected a node id after `->`"),
            ParseMessage::InvalidOption { .. } => write!(f, "invalid option"),
            ParseMessage::ExpectedValue { .. } => write!(f, "expected a value"),
            ParseMessage::UnclosedDelimiter { delimiter, .. } => write!(f, "unclosed `{delimiter}`"),
            ParseMessage::DuplicateNode { id, .. } => write!(f, "node `{id}` is defined more than once"),
            ParseMessage::UnknownTarget { target, .. } => {
                write!(f, "transition to unknown node `{target}`")
            }
            ParseMessage::EndTransition { .. } => write!(f, "end nodes cannot have transitions"),
            ParseMessage::DuplicateFallback { .. } => {
                write!(f, "node already has a transition without a condition")
            }
            ParseMessage::MissingStart { .. } => write!(f, "survey has no start node"),
        }
    }
}

pub fn parse(source: &str) -> (Module, Vec<ParseMessage>) {
    let (tokens, lexer_errors) = lexer::scan(source);

    let mut parser = Parser::new(tokens);
    let module = parser.module();
    parser.check(&module);

    let mut messages: Vec<_> = lexer_errors.into_iter().map(ParseMessage::Lexer).collect();
    messages.append(&mut parser.messages);
    messages.sort_by_key(|message| message.range().start());

    (module, messages)
}

struct Parser<'source> {
    tokens: Vec<Spanned<'source>>,
    position: usize,
    last_end: BytePos,
    messages: Vec<ParseMessage>,
}

impl<'source> Parser<'source> {
    fn new(tokens: Vec<Spanned<'source>>) -> Parser<'source> {
        Parser {
            tokens,
            position: 0,
            last_end: 0,
            messages: Vec::new(),
        }
    }

    fn peek(&self) -> &Spanned<'source> {
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

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

    fn unexpected(&mut self, expected: &'static str) {
        let spanned = self.advance();
        self.messages.push(ParseMessage::UnexpectedToken {
            range: spanned.range,
            found: spanned.token.description(),
            expected,
        });
    }

    /// Whether the next token starts a node: a sigil, or a `?` written
    /// directly before a question id.
    fn at_node_start(&self) -> bool {
        match self.peek().token {
            Token::Sigil(_) => true,
            Token::Query(text) => lexer::is_identifier(text),
            _ => false,
        }
    }

    fn module(&mut self) -> Module {
        let mut module = Module {
            header: self.header(),
            nodes: Vec::new(),
        };

        loop {
            match self.peek().token {
                Token::Eof => break,
                _ if self.at_node_start() => module.nodes.extend(self.node()),
                _ => self.unexpected("a node"),
            }
        }

        module
    }

    fn header(&mut self) -> Option<Header> {
        let start = self.peek().clone();
        let id = match start.token {
            Token::Separator => {
                self.advance();
                return None;
            }
            Token::Identifier(id) => id.to_owned(),
            _ => return None,
        };
        self.advance();

        let mut texts = Vec::new();
        while let Token::StringLiteral(raw) = self.peek().token {
            self.advance();
            texts.push(lexer::unescape(raw));
        }
        if texts.len() > 2 {
            tracing::debug!(count = texts.len(), "ignoring extra header strings");
        }
        let range = self.range_from(start.range);

        match self.peek().token {
            Token::Separator => {
                self.advance();
            }
            _ => self.messages.push(ParseMessage::MissingSeparator { range }),
        }

        let mut texts = texts.into_iter();
        Some(Header {
            range,
            id,
            title: texts.next(),
            description: texts.next(),
        })
    }

    fn node(&mut self) -> Option<Node> {
        let start = self.advance();
        let (kind, id) = match start.token {
            Token::Sigil(kind) => match self.peek().token {
                Token::Identifier(id) => {
                    self.advance();
                    (kind, id.to_owned())
                }
                _ => {
                    self.messages.push(ParseMessage::MissingNodeId {
                        range: start.range,
                        kind,
                    });
                    self.skip_node();
                    return None;
                }
            },
            Token::Query(id) => (NodeKind::Question, id.to_owned()),
            _ => return None,
        };

        let mut node = Node::new(start.range, kind, id);
        let mut texts = Vec::new();

        loop {
            let spanned = self.peek().clone();
            match spanned.token {
                Token::Eof => break,
                _ if self.at_node_start() => break,
                Token::StringLiteral(raw) if texts.len() < 2 => {
                    self.advance();
                    texts.push(lexer::unescape(raw));
                }
                Token::Identifier(code)
                    if kind == NodeKind::Question && node.question_type.is_none() && texts.is_empty() =>
                {
                    self.advance();
                    self.question_type(code, spanned.range);
                    node.question_type = Some(code.to_owned());
                }
                Token::Required if kind == NodeKind::Question => {
                    self.advance();
                    node.required = true;
                }
                Token::OpenBracket if kind == NodeKind::Question => {
                    let options = self.options();
                    node.options.extend(options);
                }
                Token::OpenBrace if kind == NodeKind::Question => {
                    if let Value::Object(config) = self.value() {
                        node.config.extend(config);
                    }
                }
                Token::Arrow => {
                    if let Some(transition) = self.transition() {
                        match kind {
                            NodeKind::End => self.messages.push(ParseMessage::EndTransition {
                                range: transition.range,
                            }),
                            _ => node.transitions.push(transition),
                        }
                    }
                }
                _ => self.unexpected("node content"),
            }
        }

        let mut texts = texts.into_iter();
        match kind {
            NodeKind::Question => {
                node.question = texts.next();
                node.description = texts.next();
            }
            _ => {
                node.title = texts.next();
                node.message = texts.next();
            }
        }
        node.range = self.range_from(start.range);

        Some(node)
    }

    fn skip_node(&mut self) {
        while self.peek().token != Token::Eof && !self.at_node_start() {
            self.advance();
        }
    }

    fn question_type(&mut self, code: &str, range: ByteRange) {
        if tables::type_for_code(code).is_none() && tables::looks_like_code(code) {
            self.messages.push(ParseMessage::UnknownQuestionType {
                range,
                code: code.to_owned(),
                suggestion: tables::suggest_code(code),
            });
        }
    }

    fn transition(&mut self) -> Option<Transition> {
        let arrow = self.advance();
        let target = self.peek().clone();
        let target_name = match target.token {
            Token::Identifier(name) => name,
            _ => {
                self.messages.push(ParseMessage::ExpectedTarget { range: arrow.range });
                return None;
            }
        };
        self.advance();

        let condition = match self.peek().token {
            Token::Query(text) if !self.starts_question() => {
                self.advance();
                let value = match self.at_value_start() {
                    true => self.value(),
                    false => Value::Null,
                };
                Some(Condition {
                    operator: tables::operator_name(text).to_owned(),
                    value,
                })
            }
            _ => None,
        };

        Some(Transition {
            range: self.range_from(arrow.range),
            target: target_name.to_owned(),
            target_range: target.range,
            condition,
        })
    }

    /// A `?` written directly before a word at the start of a line begins a
    /// question rather than a condition, unless the word is an operator.
    fn starts_question(&self) -> bool {
        let spanned = self.peek();
        let previous_line = match self.position.checked_sub(1) {
            Some(previous) => self.tokens[previous].position.line,
            None => 0,
        };
        match spanned.token {
            Token::Query(text) => {
                spanned.position.line > previous_line
                    && lexer::is_identifier(text)
                    && !is_word_operator(text)
            }
            _ => false,
        }
    }

    fn at_value_start(&self) -> bool {
        matches!(
            self.peek().token,
            Token::StringLiteral(_)
                | Token::Number(_)
                | Token::Bool(_)
                | Token::Identifier(_)
                | Token::OpenBracket
                | Token::OpenBrace
        )
    }

    /// Strings, numbers, booleans, bare identifiers, lists and maps.
    fn value(&mut self) -> Value {
        let spanned = self.peek().clone();
        match spanned.token {
            Token::OpenBracket => {
                self.advance();
                let mut items = Vec::new();
                self.delimited(spanned.range, Token::CloseBracket, |parser| {
                    items.push(parser.value());
                });
                Value::Array(items)
            }
            Token::OpenBrace => {
                self.advance();
                let mut entries = serde_json::Map::new();
                self.delimited(spanned.range, Token::CloseBrace, |parser| {
                    let key = parser.advance();
                    let key = match atom(&key.token) {
                        Some(key) => key,
                        None => {
                            parser.messages.push(ParseMessage::UnexpectedToken {
                                range: key.range,
                                found: key.token.description(),
                                expected: "a key",
                            });
                            return;
                        }
                    };
                    match parser.peek().token {
                        Token::Colon => {
                            parser.advance();
                            let value = parser.value();
                            entries.insert(key, value);
                        }
                        _ => parser.unexpected("`:`"),
                    }
                });
                Value::Object(entries)
            }
            ref token => match scalar(token) {
                Some(value) => {
                    self.advance();
                    value
                }
                None => {
                    self.messages.push(ParseMessage::ExpectedValue {
                        range: spanned.range,
                    });
                    Value::Null
                }
            },
        }
    }

    /// Parse comma separated entries up to a closing delimiter. Stops at the
    /// start of the next node if the closing delimiter is missing.
    fn delimited(
        &mut self,
        open: ByteRange,
        close: Token<'static>,
        mut entry: impl FnMut(&mut Parser<'source>),
    ) {
        loop {
            let token = self.peek().token.clone();
            if token == close {
                self.advance();
                return;
            }
            match token {
                Token::Eof | Token::Arrow | Token::Sigil(_) => break,
                Token::Comma => {
                    self.advance();
                }
                _ => {
                    let position = self.position;
                    entry(self);
                    if self.position == position {
                        self.advance();
                    }
                }
            }
        }

        let delimiter = match close {
            Token::CloseBrace => '{',
            _ => '[',
        };
        self.messages.push(ParseMessage::UnclosedDelimiter {
            range: open,
            delimiter,
        });
    }

    fn options(&mut self) -> Vec<Choice> {
        let open = self.advance();
        let mut options = Vec::new();
        self.delimited(open.range, Token::CloseBracket, |parser| {
            let start = parser.peek().range;
            match parser.option() {
                Some(option) => options.push(option),
                None => {
                    let range = parser.range_from(start);
                    parser.messages.push(ParseMessage::InvalidOption { range });
                    while !matches!(
                        parser.peek().token,
                        Token::Comma | Token::CloseBracket | Token::Eof | Token::Arrow | Token::Sigil(_)
                    ) {
                        parser.advance();
                    }
                }
            }
        });
        options
    }

    /// `"label"`, `value="label"`, `id:"label"` or `id:"label"=value`.
    fn option(&mut self) -> Option<Choice> {
        let first = self.advance();
        let next = self.peek().token.clone();
        match (&first.token, &next) {
            (_, Token::Colon) => {
                let id = atom(&first.token)?;
                self.advance();
                let label = self.label()?;
                let value = match self.peek().token {
                    Token::Equals => {
                        self.advance();
                        let value = scalar(&self.peek().token)?;
                        self.advance();
                        value
                    }
                    _ => Value::String(option_value(&label)),
                };
                Some(Choice {
                    id: Some(id),
                    label,
                    value,
                })
            }
            (_, Token::Equals) => {
                let value = scalar(&first.token)?;
                self.advance();
                let label = self.label()?;
                Some(Choice {
                    id: None,
                    label,
                    value,
                })
            }
            (Token::StringLiteral(raw), _) => {
                let label = lexer::unescape(raw);
                Some(Choice {
                    id: None,
                    value: Value::String(option_value(&label)),
                    label,
                })
            }
            _ => None,
        }
    }

    fn label(&mut self) -> Option<String> {
        match self.peek().token {
            Token::StringLiteral(raw) => {
                self.advance();
                Some(lexer::unescape(raw))
            }
            _ => None,
        }
    }

    /// Check references between nodes once the whole survey is known.
    fn check(&mut self, module: &Module) {
        let mut ids = FxHashMap::default();
        for node in &module.nodes {
            if let Some(first) = ids.insert(node.id.as_str(), node.range) {
                self.messages.push(ParseMessage::DuplicateNode {
                    range: node.range,
                    id: node.id.clone(),
                    first,
                });
                ids.insert(node.id.as_str(), first);
            }
        }

        for node in &module.nodes {
            let mut fallback = false;
            for transition in &node.transitions {
                if !ids.contains_key(transition.target.as_str()) {
                    self.messages.push(ParseMessage::UnknownTarget {
                        range: transition.target_range,
                        target: transition.target.clone(),
                        suggestion: suggest_target(ids.keys().copied(), &transition.target),
                    });
                }
                if transition.condition.is_none() {
                    if fallback {
                        self.messages.push(ParseMessage::DuplicateFallback {
                            range: transition.range,
                        });
                    }
                    fallback = true;
                }
            }
        }

        match module.nodes.first() {
            Some(first) if !module.nodes.iter().any(|node| node.kind == NodeKind::Start) => {
                self.messages.push(ParseMessage::MissingStart { range: first.range });
            }
            _ => {}
        }
    }
}

/// `?in`, `?contains` and `?empty` look like question ids, but after a
/// transition target they are operators.
fn is_word_operator(text: &str) -> bool {
    tables::OPERATORS.iter().any(|(sigil, _)| *sigil == text)
}

/// Keys and option ids.
fn atom(token: &Token<'_>) -> Option<String> {
    match *token {
        Token::StringLiteral(raw) => Some(lexer::unescape(raw)),
        Token::Identifier(text) | Token::Number(text) => Some(text.to_owned()),
        Token::Bool(value) => Some(value.to_string()),
        _ => None,
    }
}

fn scalar(token: &Token<'_>) -> Option<Value> {
    match *token {
        Token::StringLiteral(raw) => Some(Value::String(lexer::unescape(raw))),
        Token::Identifier(text) => Some(Value::String(text.to_owned())),
        Token::Bool(value) => Some(Value::Bool(value)),
        Token::Number(text) => Some(number(text)),
        _ => None,
    }
}

/// Integers stay integers. Numbers too large for JSON are kept as text.
pub(super) fn number(text: &str) -> Value {
    if let Ok(integer) = text.parse::<i64>() {
        return Value::from(integer);
    }
    match text.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        Some(number) => Value::Number(number),
        None => Value::String(text.to_owned()),
    }
}

fn suggest_target<'a>(ids: impl Iterator<Item = &'a str>, target: &str) -> Option<String> {
    ids.map(|id| (levenshtein::levenshtein(id, target), id))
        .filter(|(distance, _)| *distance <= 2)
        .min()
        .map(|(_, id)| id.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::ops::Range;

    fn parse_ok(source: &str) -> Module {
        let (module, messages) = parse(source);
        assert!(messages.is_empty(), "{messages:?}");
        module
    }

    #[test]
    fn header_and_nodes() {
        let module = parse_ok(
            "nps \"NPS\" \"How likely?\"\n---\n\n> start \"Welcome\" \"Thanks for coming\" -> q1\n? q1 Np* \"Score?\" -> done\n< done",
        );
        let header = module.header.as_ref().unwrap();
        assert_eq!(header.id, "nps");
        assert_eq!(header.title.as_deref(), Some("NPS"));
        assert_eq!(header.description.as_deref(), Some("How likely?"));

        assert_eq!(module.nodes.len(), 3);
        let start = &module.nodes[0];
        assert_eq!(start.kind, NodeKind::Start);
        assert_eq!(start.title.as_deref(), Some("Welcome"));
        assert_eq!(start.message.as_deref(), Some("Thanks for coming"));

        let question = &module.nodes[1];
        assert_eq!(question.question_type.as_deref(), Some("Np"));
        assert!(question.required);
        assert_eq!(question.question.as_deref(), Some("Score?"));
        assert_eq!(question.transitions[0].target, "done");
    }

    #[test]
    fn transitions_keep_their_order() {
        let module = parse_ok(
            "> s -> q\n? q Rt \"Rate\"\n  -> good ?>= 4\n  -> bad ?< 2\n  -> meh\n< good\n< bad\n< meh",
        );
        let transitions = &module.nodes[1].transitions;
        let summary: Vec<_> = transitions
            .iter()
            .map(|t| (t.target.as_str(), t.condition.as_ref().map(|c| (c.operator.as_str(), c.value.clone()))))
            .collect();
        assert_eq!(
            summary,
            [
                ("good", Some(("greaterOrEqual", json!(4)))),
                ("bad", Some(("less", json!(2)))),
                ("meh", None),
            ],
        );
    }

    #[test]
    fn operators() {
        let module = parse_ok(
            "> s\n  -> a ?!in [x, \"y z\", 3]\n  -> a ?contains yes\n  -> a ?empty\n  -> a ?between [1, 5]\n< a",
        );
        let conditions: Vec<_> = (module.nodes[0].transitions.iter())
            .map(|t| t.condition.clone().unwrap())
            .collect();
        assert_eq!(conditions[0].operator, "notIn");
        assert_eq!(conditions[0].value, json!(["x", "y z", 3]));
        assert_eq!(conditions[1].value, json!("yes"));
        assert_eq!(conditions[2].operator, "isEmpty");
        assert_eq!(conditions[2].value, Value::Null);
        assert_eq!(conditions[3].operator, "between");
    }

    #[test]
    fn options() {
        let module = parse_ok(
            "> s -> q\n? q Ch \"Pick\" [\"Very Good\", ok=\"Fine\", bad:\"Not good\", x:\"Other\"=5] -> e\n< e",
        );
        let options = &module.nodes[1].options;
        assert_eq!(
            options,
            &[
                Choice {
                    id: None,
                    label: "Very Good".to_owned(),
                    value: json!("very-good"),
                },
                Choice {
                    id: None,
                    label: "Fine".to_owned(),
                    value: json!("ok"),
                },
                Choice {
                    id: Some("bad".to_owned()),
                    label: "Not good".to_owned(),
                    value: json!("not-good"),
                },
                Choice {
                    id: Some("x".to_owned()),
                    label: "Other".to_owned(),
                    value: json!(5),
                },
            ],
        );
    }

    #[test]
    fn config() {
        let module = parse_ok(
            "> s -> q\n? q Sl \"How much?\" {min: 0, max: 10.5, labels: [\"lo\", \"hi\"], style: {compact: true}, unit: kg} -> e\n< e",
        );
        assert_eq!(
            serde_json::Value::Object(module.nodes[1].config.clone()),
            json!({
                "min": 0,
                "max": 10.5,
                "labels": ["lo", "hi"],
                "style": {"compact": true},
                "unit": "kg",
            }),
        );
    }

    #[test]
    fn questions_without_spaces() {
        let module = parse_ok("> s -> q1\n?q1 Tx \"Name?\" -> e\n< e");
        assert_eq!(module.nodes[1].kind, NodeKind::Question);
        assert_eq!(module.nodes[1].id, "q1");
    }

    #[test]
    fn unknown_targets() {
        let source = "> start -> thanx\n< thanks";
        let (_, messages) = parse(source);
        assert_eq!(messages.len(), 1);
        assert_eq!(&source[Range::<usize>::from(messages[0].range())], "thanx");
        assert!(matches!(
            &messages[0],
            ParseMessage::UnknownTarget { suggestion: Some(s), .. } if s == "thanks"
        ));
    }

    #[test]
    fn structural_checks() {
        let (module, messages) = parse("> a -> b\n< b -> a\n< b\n? q -> b -> a");
        assert!(module.nodes[1].transitions.is_empty());
        let kinds: Vec<_> = messages.iter().map(|m| m.to_string()).collect();
        assert_eq!(
            kinds,
            [
                "end nodes cannot have transitions",
                "node `b` is defined more than once",
                "node already has a transition without a condition",
            ],
        );
    }

    #[test]
    fn recovery() {
        let (module, messages) = parse("> s , -> a\n? q Xy \"Q\" [oops, \"ok\"] {a 1} -> a\n<\n< a");
        assert_eq!(module.nodes.len(), 3);
        assert_eq!(module.nodes[1].options.len(), 1);
        assert!(messages.iter().any(|m| matches!(m, ParseMessage::InvalidOption { .. })));
        assert!(messages.iter().any(|m| matches!(m, ParseMessage::UnknownQuestionType { .. })));
        assert!(messages.iter().any(|m| matches!(m, ParseMessage::MissingNodeId { .. })));
        assert!(messages.iter().all(|m| !m.is_fatal()));
    }

    #[test]
    fn missing_start() {
        let (_, messages) = parse("? q Tx \"Q\"");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].severity(), Severity::Warning);
    }

    #[test]
    fn shifting() {
        let (_, messages) = parse("> s -> nowhere");
        let shifted = messages[0].clone().shift(10);
        assert_eq!(shifted.range(), ByteRange::new(17, 24));
    }
}
