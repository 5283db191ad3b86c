//! Encoding graphs as parsed surveys, ready for printing.
//!
//! Nodes are written breadth first from the start node, followed by any
//! nodes that cannot be reached from it.

use fxhash::FxHashSet;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;

use crate::source::ByteRange;
use crate::survey::decode::value_text;
use crate::survey::graph::{GraphNode, GraphSurvey, DEFAULT_ID};
use crate::survey::lexer::{self, Token};
use crate::survey::{parser, tables, Choice, Condition, Header, Module, Node, NodeKind, Transition};

#[derive(Clone, Debug, PartialEq)]
pub enum EncodeError {
    InvalidId { id: String },
    DuplicateNode { id: String },
    /// The start node is not the first start node in the written order.
    InvalidStart { id: String },
    EndTransition { node: String },
    UnsupportedContent { node: String, key: String },
    InvalidContent { node: String, key: String },
    InvalidQuestionType { node: String, ty: String },
    Unrepresentable {
        node: String,
        what: &'static str,
        text: String,
    },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::InvalidId { id } => write!(f, "`{id}` cannot be used as an id"),
            EncodeError::DuplicateNode { id } => write!(f, "node `{id}` appears more than once"),
            EncodeError::InvalidStart { id } => {
                write!(f, "start node `{id}` is not the first start node of the survey")
            }
            EncodeError::EndTransition { node } => {
                write!(f, "end node `{node}` has transitions")
            }
            EncodeError::UnsupportedContent { node, key } => {
                write!(f, "node `{node}` has `{key}`, which cannot be written as source text")
            }
            EncodeError::InvalidContent { node, key } => {
                write!(f, "node `{node}` has an invalid `{key}`")
            }
            EncodeError::InvalidQuestionType { node, ty } => {
                write!(f, "question `{node}` has type `{ty}`, which has no type code")
            }
            EncodeError::Unrepresentable { node, what, text } => {
                write!(f, "the {what} `{text}` of node `{node}` cannot be written as source text")
            }
        }
    }
}

impl std::error::Error for EncodeError {}

const NO_RANGE: ByteRange = ByteRange::new(0, 0);

pub fn survey(graph: &GraphSurvey) -> Result<Module, EncodeError> {
    let header = match graph.id != DEFAULT_ID || !graph.title.is_empty() || !graph.description.is_empty() {
        true => Some(Header {
            range: NO_RANGE,
            id: identifier(&graph.id)?,
            title: Some(graph.title.clone()).filter(|title| !title.is_empty()),
            description: Some(graph.description.clone()).filter(|text| !text.is_empty()),
        }),
        false => None,
    };

    let mut seen = FxHashSet::default();
    for node in &graph.nodes {
        if !seen.insert(node.id.as_str()) {
            return Err(EncodeError::DuplicateNode {
                id: node.id.clone(),
            });
        }
    }

    let order = node_order(graph);
    let first_start = order.iter().find(|node| node.kind == NodeKind::Start);
    if first_start.map_or("", |node| node.id.as_str()) != graph.start_node_id {
        return Err(EncodeError::InvalidStart {
            id: graph.start_node_id.clone(),
        });
    }

    let nodes = order.into_iter().map(node).collect::<Result<_, _>>()?;
    Ok(Module { header, nodes })
}

fn node_order(graph: &GraphSurvey) -> Vec<&GraphNode> {
    let mut order = Vec::with_capacity(graph.nodes.len());
    let mut visited = FxHashSet::default();
    let mut queue = VecDeque::new();
    queue.push_back(graph.start_node_id.as_str());

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        if let Some(node) = graph.node(id) {
            order.push(node);
            queue.extend(node.next.iter().map(|next| next.node_id.as_str()));
        }
    }

    order.extend(graph.nodes.iter().filter(|node| !visited.contains(node.id.as_str())));
    order
}

fn identifier(id: &str) -> Result<String, EncodeError> {
    match lexer::is_identifier(id) {
        true => Ok(id.to_owned()),
        false => Err(EncodeError::InvalidId { id: id.to_owned() }),
    }
}

fn node(graph_node: &GraphNode) -> Result<Node, EncodeError> {
    let id = identifier(&graph_node.id)?;
    let mut node = Node::new(NO_RANGE, graph_node.kind, id.clone());

    let invalid = |key: &str| EncodeError::InvalidContent {
        node: id.clone(),
        key: key.to_owned(),
    };

    for (key, value) in &graph_node.content {
        match (graph_node.kind, key.as_str()) {
            (NodeKind::Question, "question") => node.question = Some(text(value).ok_or_else(|| invalid(key))?),
            (NodeKind::Question, "description") => node.description = Some(text(value).ok_or_else(|| invalid(key))?),
            (NodeKind::Question, "type") => {
                let ty = text(value).ok_or_else(|| invalid(key))?;
                node.question_type = Some(question_type(&id, ty)?);
            }
            (NodeKind::Question, "required") => node.required = value.as_bool().ok_or_else(|| invalid(key))?,
            (NodeKind::Question, "options") => {
                let options = value.as_array().ok_or_else(|| invalid(key))?;
                node.options = (options.iter())
                    .map(|option| choice(option).ok_or_else(|| invalid(key)))
                    .collect::<Result<_, _>>()?;
            }
            (NodeKind::Question, _) => {
                check_value(&id, "config value", value)?;
                node.config.insert(key.clone(), value.clone());
            }
            (_, "title") => node.title = Some(text(value).ok_or_else(|| invalid(key))?),
            (_, "message") => node.message = Some(text(value).ok_or_else(|| invalid(key))?),
            (_, _) => {
                return Err(EncodeError::UnsupportedContent {
                    node: id.clone(),
                    key: key.clone(),
                })
            }
        }
    }

    if graph_node.kind == NodeKind::End && !graph_node.next.is_empty() {
        return Err(EncodeError::EndTransition { node: id.clone() });
    }

    for next in &graph_node.next {
        let condition = match &next.condition {
            Some(condition) => {
                operator(&id, &condition.operator)?;
                if !condition.value.is_null() {
                    check_value(&id, "condition value", &condition.value)?;
                }
                Some(Condition {
                    operator: condition.operator.clone(),
                    value: condition.value.clone(),
                })
            }
            None => None,
        };
        node.transitions.push(Transition {
            range: NO_RANGE,
            target: identifier(&next.node_id)?,
            target_range: NO_RANGE,
            condition,
        });
    }

    Ok(node)
}

fn text(value: &Value) -> Option<String> {
    value.as_str().map(str::to_owned)
}

/// Known types are written as their codes, and other types as themselves,
/// as long as they read back the same way.
fn question_type(node: &str, ty: String) -> Result<String, EncodeError> {
    match tables::code_for_type(&ty) {
        Some(code) => Ok(code.to_owned()),
        None if lexer::is_identifier(&ty) && tables::type_for_code(&ty).is_none() => Ok(ty),
        None => Err(EncodeError::InvalidQuestionType {
            node: node.to_owned(),
            ty,
        }),
    }
}

/// An option is an object with a string label, a scalar value and
/// optionally a string id. The id is only kept when it differs from the
/// value.
fn choice(option: &Value) -> Option<Choice> {
    let entries = option.as_object()?;
    if entries.keys().any(|key| !matches!(key.as_str(), "id" | "label" | "value")) {
        return None;
    }

    let label = entries.get("label")?.as_str()?.to_owned();
    let value = entries.get("value")?.clone();
    if !matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_)) || !printable(&value) {
        return None;
    }
    let id = match entries.get("id") {
        Some(Value::String(id)) if *id != value_text(&value) => Some(id.clone()),
        Some(Value::String(_)) | None => None,
        Some(_) => return None,
    };

    Some(Choice { id, label, value })
}

/// Operators are written as their sigils, and unknown operators as
/// themselves, as long as they read back the same way.
fn operator(node: &str, name: &str) -> Result<(), EncodeError> {
    let text = tables::operator_text(name).unwrap_or(name);
    let word = text.strip_prefix('!').unwrap_or(text);
    let scans_alone = tables::operator_text(name).is_some() || lexer::is_identifier(word);

    match scans_alone && tables::operator_name(text) == name {
        true => Ok(()),
        false => Err(EncodeError::Unrepresentable {
            node: node.to_owned(),
            what: "operator",
            text: name.to_owned(),
        }),
    }
}

fn check_value(node: &str, what: &'static str, value: &Value) -> Result<(), EncodeError> {
    match printable(value) {
        true => Ok(()),
        false => Err(EncodeError::Unrepresentable {
            node: node.to_owned(),
            what,
            text: value.to_string(),
        }),
    }
}

/// Whether a value can be written as source text and read back. Nulls
/// cannot, and neither can numbers whose text is not a number literal.
fn printable(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(_) | Value::String(_) => true,
        Value::Number(number) => {
            let text = number.to_string();
            let (tokens, errors) = lexer::scan(&text);
            errors.is_empty()
                && matches!(&tokens[..], [spanned, _] if spanned.token == Token::Number(&text))
                && parser::number(&text) == *value
        }
        Value::Array(items) => items.iter().all(printable),
        Value::Object(entries) => entries.values().all(printable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::graph::{Next, TransitionCondition};
    use crate::survey::pretty;
    use serde_json::json;

    fn graph(value: Value) -> GraphSurvey {
        serde_json::from_value(value).unwrap()
    }

    fn encode(value: Value) -> Result<String, EncodeError> {
        survey(&graph(value)).map(|module| pretty::render(&module))
    }

    #[test]
    fn breadth_first_order() {
        let source = encode(json!({
            "startNodeId": "s",
            "nodes": {
                "done": {"type": "end", "content": {"message": "Bye"}},
                "orphan": {"type": "message", "content": {"title": "Unreachable"}},
                "q": {
                    "type": "question",
                    "content": {"question": "Score?", "type": "nps", "required": true},
                    "next": [
                        {"nodeId": "done", "condition": {"operator": "greaterOrEqual", "value": 9}},
                        {"nodeId": "why"},
                    ],
                },
                "why": {"type": "question", "content": {"question": "Why?", "type": "textarea"}, "next": [{"nodeId": "done"}]},
                "s": {"type": "start", "content": {"title": "Hi"}, "next": [{"nodeId": "q"}]},
            },
        }));

        assert_eq!(
            source.unwrap(),
            [
                "> s \"Hi\" -> q",
                "",
                "? q Np* \"Score?\"",
                "  -> done ?>= 9",
                "  -> why",
                "",
                "< done \"\" \"Bye\"",
                "",
                "? why Ta \"Why?\" -> done",
                "",
                "! orphan \"Unreachable\"",
            ]
            .join("\n"),
        );
    }

    #[test]
    fn headers() {
        let source = encode(json!({"id": "nps", "title": "NPS", "startNodeId": "s", "nodes": {"s": {"type": "start"}}}));
        assert_eq!(source.unwrap(), "nps \"NPS\"\n---\n\n> s");

        let source = encode(json!({"description": "About", "nodes": {}}));
        assert_eq!(source.unwrap(), "survey \"\" \"About\"\n---");
    }

    #[test]
    fn options_use_the_shortest_form() {
        let source = encode(json!({
            "startNodeId": "",
            "nodes": {"q": {"type": "question", "content": {
                "type": "choice",
                "options": [
                    {"id": "very-good", "label": "Very Good", "value": "very-good"},
                    {"label": "Fine", "value": "ok"},
                    {"id": "bad", "label": "Not good", "value": "not-good"},
                    {"id": "x", "label": "Other", "value": 5},
                    {"label": "Maybe so", "value": "a b"},
                ],
            }}},
        }));
        assert_eq!(
            source.unwrap(),
            "? q Ch [\"Very Good\", ok=\"Fine\", bad:\"Not good\", x:\"Other\"=5, \"a b\"=\"Maybe so\"]",
        );
    }

    #[test]
    fn config_follows_options() {
        let source = encode(json!({
            "nodes": {"q": {"type": "question", "content": {
                "min": 0,
                "question": "How many?",
                "type": "slider",
                "labels": ["none", "lots of them"],
                "style": {"compact": true},
            }}},
        }));
        assert_eq!(
            source.unwrap(),
            "? q Sl \"How many?\" {min: 0, labels: [none, \"lots of them\"], style: {compact: true}}",
        );
    }

    #[test]
    fn unknown_types_and_operators_are_kept() {
        let mut survey = GraphSurvey::default();
        let mut node = GraphNode::new("q", NodeKind::Question);
        node.content.insert("type".to_owned(), json!("stars"));
        node.next.push(Next {
            node_id: "q".to_owned(),
            condition: Some(TransitionCondition {
                operator: "between".to_owned(),
                value: json!([1, 3]),
            }),
        });
        survey.nodes.push(node);

        let module = self::survey(&survey).unwrap();
        assert_eq!(pretty::render(&module), "? q stars -> q ?between [1, 3]");
    }

    #[test]
    fn errors() {
        let error = |value| encode(value).unwrap_err();

        assert_eq!(
            error(json!({"id": "my survey", "nodes": {}})),
            EncodeError::InvalidId {
                id: "my survey".to_owned()
            },
        );
        assert_eq!(
            error(json!({"startNodeId": "q", "nodes": {"q": {"type": "question"}}})),
            EncodeError::InvalidStart { id: "q".to_owned() },
        );
        assert_eq!(
            error(json!({"nodes": {"e": {"type": "end", "next": [{"nodeId": "e"}]}}})),
            EncodeError::EndTransition { node: "e".to_owned() },
        );
        assert_eq!(
            error(json!({"nodes": {"m": {"type": "message", "content": {"image": "x.png"}}}})),
            EncodeError::UnsupportedContent {
                node: "m".to_owned(),
                key: "image".to_owned(),
            },
        );
        assert_eq!(
            error(json!({"nodes": {"q": {"type": "question", "content": {"type": "multiple choice"}}}})),
            EncodeError::InvalidQuestionType {
                node: "q".to_owned(),
                ty: "multiple choice".to_owned(),
            },
        );
        assert!(matches!(
            error(json!({"nodes": {"q": {"type": "question", "content": {"max": null}}}})),
            EncodeError::Unrepresentable { what: "config value", .. },
        ));
        assert!(matches!(
            error(json!({"nodes": {"q": {"type": "question", "content": {"max": 1e300}}}})),
            EncodeError::Unrepresentable { what: "config value", .. },
        ));
        assert!(matches!(
            error(json!({"nodes": {"q": {"type": "question", "next": [{"nodeId": "q", "condition": {"operator": "empty"}}]}}})),
            EncodeError::Unrepresentable { what: "operator", .. },
        ));
    }
}
