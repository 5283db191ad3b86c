//! The survey dialect: branching question flows.
//!
//! ```text
//! feedback "Customer feedback"
//! ---
//!
//! > start "Welcome" -> rating
//!
//! ? rating Rt* "How did we do?" {max: 5}
//!   -> thanks ?>= 4
//!   -> followup
//!
//! ? followup Ta "What could we improve?" -> thanks
//!
//! < thanks "Thank you!"
//! ```
//!
//! Nodes start with a sigil giving their kind: `>` start, `?` question,
//! `!` message and `<` end. Transitions are tried in order, and the one
//! without a condition is taken when no other applies.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::source::ByteRange;
use crate::Comparison;

pub mod compare;
pub mod decode;
pub mod encode;
pub mod graph;
pub mod lexer;
mod parser;
pub mod pretty;
pub mod tables;

pub use self::encode::EncodeError;
pub use self::graph::{GraphNode, GraphSurvey, Next, TransitionCondition};
pub use self::parser::ParseMessage;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Start,
    Question,
    Message,
    End,
}

impl NodeKind {
    pub fn sigil(self) -> char {
        match self {
            NodeKind::Start => '>',
            NodeKind::Question => '?',
            NodeKind::Message => '!',
            NodeKind::End => '<',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Start => "start",
            NodeKind::Question => "question",
            NodeKind::Message => "message",
            NodeKind::End => "end",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed survey.
#[derive(Clone, Debug, Default)]
pub struct Module {
    pub header: Option<Header>,
    pub nodes: Vec<Node>,
}

/// `id "title" "description"`, followed by `---`.
#[derive(Clone, Debug)]
pub struct Header {
    pub range: ByteRange,
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Node {
    pub range: ByteRange,
    pub kind: NodeKind,
    pub id: String,
    pub title: Option<String>,
    pub message: Option<String>,
    pub question: Option<String>,
    pub description: Option<String>,
    /// The question type, as written.
    pub question_type: Option<String>,
    pub required: bool,
    pub options: Vec<Choice>,
    pub config: serde_json::Map<String, serde_json::Value>,
    pub transitions: Vec<Transition>,
}

impl Node {
    pub fn new(range: ByteRange, kind: NodeKind, id: String) -> Node {
        Node {
            range,
            kind,
            id,
            title: None,
            message: None,
            question: None,
            description: None,
            question_type: None,
            required: false,
            options: Vec::new(),
            config: serde_json::Map::new(),
            transitions: Vec::new(),
        }
    }
}

/// An option of a choice question.
#[derive(Clone, Debug, PartialEq)]
pub struct Choice {
    pub id: Option<String>,
    pub label: String,
    pub value: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub range: ByteRange,
    pub target: String,
    pub target_range: ByteRange,
    pub condition: Option<Condition>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    /// The operator name, like `greaterOrEqual`. Operators not in
    /// [`tables::OPERATORS`] are kept as written.
    pub operator: String,
    /// [`serde_json::Value::Null`] when no value was given.
    pub value: serde_json::Value,
}

impl Module {
    /// Parse a survey from source text, returning a best-effort module and
    /// any problems found along the way.
    pub fn parse(source: &str) -> (Module, Vec<ParseMessage>) {
        parser::parse(source)
    }
}

/// The value an option takes when none is given: the label in lower case,
/// with runs of whitespace replaced by `-`.
pub fn option_value(label: &str) -> String {
    static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

    WHITESPACE.replace_all(&label.to_lowercase(), "-").into_owned()
}

#[derive(Debug)]
pub struct Output {
    pub survey: GraphSurvey,
    pub messages: Vec<ParseMessage>,
}

/// Compile survey source text into a graph. Only unterminated strings are
/// fatal.
pub fn parse(source: &str) -> Result<Output, ParseMessage> {
    let source = crate::source::normalise(source);
    let (module, messages) = Module::parse(&source);

    if let Some(fatal) = messages.iter().find(|message| message.is_fatal()) {
        return Err(fatal.clone());
    }

    Ok(Output {
        survey: decode::module(&module),
        messages,
    })
}

/// Compile a graph into canonical survey source text.
pub fn encode(survey: &GraphSurvey) -> Result<String, EncodeError> {
    let module = encode::survey(survey)?;
    Ok(pretty::render(&module))
}

#[derive(Debug)]
pub struct Roundtrip {
    pub source: String,
    pub reconstructed: GraphSurvey,
    pub comparison: Comparison,
}

#[derive(Debug)]
pub enum RoundtripError {
    Encode(EncodeError),
    Parse(ParseMessage),
}

impl fmt::Display for RoundtripError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundtripError::Encode(error) => write!(f, "failed to encode survey: {error}"),
            RoundtripError::Parse(message) => write!(f, "failed to parse encoded survey: {message}"),
        }
    }
}

impl std::error::Error for RoundtripError {}

impl From<EncodeError> for RoundtripError {
    fn from(error: EncodeError) -> RoundtripError {
        RoundtripError::Encode(error)
    }
}

pub fn roundtrip(survey: &GraphSurvey) -> Result<Roundtrip, RoundtripError> {
    let source = encode(survey)?;
    let output = parse(&source).map_err(RoundtripError::Parse)?;
    let comparison = compare::compare(survey, &output.survey);

    Ok(Roundtrip {
        source,
        reconstructed: output.survey,
        comparison,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_values() {
        assert_eq!(option_value("Very  Good"), "very-good");
        assert_eq!(option_value("Yes"), "yes");
        assert_eq!(option_value(" padded "), "-padded-");
    }
}
