//! Surveys as graphs of nodes, the form consumed by flow engines.
//!
//! ```json
//! {
//!   "id": "feedback",
//!   "title": "Customer feedback",
//!   "description": "",
//!   "startNodeId": "start",
//!   "nodes": {
//!     "start": {"id": "start", "type": "start", "content": {"title": "Welcome"}, "next": [{"nodeId": "rating"}]},
//!     ...
//!   }
//! }
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::survey::NodeKind;

pub const DEFAULT_ID: &str = "survey";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSurvey {
    #[serde(default = "default_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub start_node_id: String,
    /// Nodes in order, serialized as a map from ids to nodes.
    #[serde(with = "node_map", default)]
    pub nodes: Vec<GraphNode>,
}

fn default_id() -> String {
    DEFAULT_ID.to_owned()
}

impl Default for GraphSurvey {
    fn default() -> GraphSurvey {
        GraphSurvey {
            id: default_id(),
            title: String::new(),
            description: String::new(),
            start_node_id: String::new(),
            nodes: Vec::new(),
        }
    }
}

impl GraphSurvey {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn start(&self) -> Option<&GraphNode> {
        self.node(&self.start_node_id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Taken from the key of the node map when missing.
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub content: Map<String, Value>,
    #[serde(default)]
    pub next: Vec<Next>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Next {
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<TransitionCondition>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionCondition {
    pub operator: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> GraphNode {
        GraphNode {
            id: id.into(),
            kind,
            content: Map::new(),
            next: Vec::new(),
        }
    }

    /// The transition taken for an answer: the first one whose condition
    /// holds, or failing that the first one without a condition.
    pub fn route(&self, answer: &Value) -> Option<&Next> {
        let mut conditional = self.next.iter().filter_map(|next| {
            let condition = next.condition.as_ref()?;
            Some((next, condition))
        });
        match conditional.find(|(_, condition)| condition.holds(answer)) {
            Some((next, _)) => Some(next),
            None => self.next.iter().find(|next| next.condition.is_none()),
        }
    }
}

impl TransitionCondition {
    /// Whether an answer satisfies the condition. Unknown operators never
    /// hold.
    pub fn holds(&self, answer: &Value) -> bool {
        let value = &self.value;
        match self.operator.as_str() {
            "equals" => loosely_equal(answer, value),
            "notEquals" => !loosely_equal(answer, value),
            "greater" => compare_numbers(answer, value, |a, b| a > b),
            "greaterOrEqual" => compare_numbers(answer, value, |a, b| a >= b),
            "less" => compare_numbers(answer, value, |a, b| a < b),
            "lessOrEqual" => compare_numbers(answer, value, |a, b| a <= b),
            "in" => is_in(answer, value),
            "notIn" => !is_in(answer, value),
            "contains" => contains(answer, value),
            "notContains" => !contains(answer, value),
            "isEmpty" => is_empty(answer),
            "isNotEmpty" => !is_empty(answer),
            "matches" => matches_pattern(answer, value),
            operator => {
                tracing::debug!(operator, "unknown operator");
                false
            }
        }
    }
}

/// Scalars are compared by their text, so that `"4"` equals `4`.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    a == b || matches!((scalar_text(a), scalar_text(b)), (Some(a), Some(b)) if a == b)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(value) => Some(value.to_string()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn compare_numbers(answer: &Value, value: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (as_number(answer), as_number(value)) {
        (Some(answer), Some(value)) => op(answer, value),
        _ => false,
    }
}

/// A single answer is in a list if it equals an item. Answers with several
/// selections are in a list if any of them are.
fn is_in(answer: &Value, value: &Value) -> bool {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        value => std::slice::from_ref(value),
    };
    match answer {
        Value::Array(selected) => selected
            .iter()
            .any(|answer| items.iter().any(|item| loosely_equal(answer, item))),
        answer => items.iter().any(|item| loosely_equal(answer, item)),
    }
}

fn contains(answer: &Value, value: &Value) -> bool {
    match (answer, value) {
        (Value::Array(items), value) => items.iter().any(|item| loosely_equal(item, value)),
        (Value::String(text), value) => match scalar_text(value) {
            Some(needle) => text.contains(&needle),
            None => false,
        },
        _ => false,
    }
}

fn is_empty(answer: &Value) -> bool {
    match answer {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(entries) => entries.is_empty(),
        _ => false,
    }
}

fn matches_pattern(answer: &Value, value: &Value) -> bool {
    let (Some(text), Some(pattern)) = (scalar_text(answer), value.as_str()) else {
        return false;
    };
    match Regex::new(pattern) {
        Ok(regex) => regex.is_match(&text),
        Err(error) => {
            tracing::debug!(pattern, %error, "invalid pattern");
            false
        }
    }
}

mod node_map {
    use serde::de::{MapAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    use super::GraphNode;

    pub fn serialize<S: Serializer>(nodes: &[GraphNode], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(nodes.iter().map(|node| (&node.id, node)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<GraphNode>, D::Error> {
        deserializer.deserialize_map(NodeMapVisitor)
    }

    struct NodeMapVisitor;

    impl<'de> Visitor<'de> for NodeMapVisitor {
        type Value = Vec<GraphNode>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of survey nodes by id")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Vec<GraphNode>, A::Error> {
            let mut nodes = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((id, mut node)) = map.next_entry::<String, GraphNode>()? {
                if node.id.is_empty() {
                    node.id = id;
                }
                nodes.push(node);
            }
            Ok(nodes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rating() -> GraphNode {
        let mut node = GraphNode::new("rating", NodeKind::Question);
        node.next = vec![
            Next {
                node_id: "fallback".to_owned(),
                condition: None,
            },
            Next {
                node_id: "promoter".to_owned(),
                condition: Some(TransitionCondition {
                    operator: "greaterOrEqual".to_owned(),
                    value: json!(9),
                }),
            },
            Next {
                node_id: "detractor".to_owned(),
                condition: Some(TransitionCondition {
                    operator: "lessOrEqual".to_owned(),
                    value: json!(6),
                }),
            },
        ];
        node
    }

    fn route(node: &GraphNode, answer: Value) -> Option<&str> {
        node.route(&answer).map(|next| next.node_id.as_str())
    }

    #[test]
    fn fallback_only_when_no_condition_holds() {
        let node = rating();
        assert_eq!(route(&node, json!(10)), Some("promoter"));
        assert_eq!(route(&node, json!("3")), Some("detractor"));
        assert_eq!(route(&node, json!(7)), Some("fallback"));
        assert_eq!(route(&node, Value::Null), Some("fallback"));
    }

    #[test]
    fn operators() {
        let holds = |operator: &str, value: Value, answer: Value| {
            TransitionCondition {
                operator: operator.to_owned(),
                value,
            }
            .holds(&answer)
        };

        assert!(holds("equals", json!("yes"), json!("yes")));
        assert!(holds("notEquals", json!("yes"), json!("no")));
        assert!(holds("in", json!(["a", "b"]), json!("b")));
        assert!(holds("in", json!(["a", "b"]), json!(["c", "a"])));
        assert!(holds("notIn", json!(["a", "b"]), json!("c")));
        assert!(holds("contains", json!("ok"), json!("looks ok to me")));
        assert!(holds("contains", json!("x"), json!(["x", "y"])));
        assert!(holds("isEmpty", Value::Null, json!("  ")));
        assert!(holds("isNotEmpty", Value::Null, json!([1])));
        assert!(holds("matches", json!("^[0-9]{3}$"), json!("123")));
        assert!(!holds("matches", json!("("), json!("(")));
        assert!(!holds("between", json!([1, 2]), json!(1)));
    }

    #[test]
    fn nodes_are_a_map_in_order() {
        let mut survey = GraphSurvey {
            start_node_id: "b".to_owned(),
            ..GraphSurvey::default()
        };
        survey.nodes.push(GraphNode::new("b", NodeKind::Start));
        survey.nodes.push(GraphNode::new("a", NodeKind::End));

        let value = serde_json::to_value(&survey).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "survey",
                "title": "",
                "description": "",
                "startNodeId": "b",
                "nodes": {
                    "b": {"id": "b", "type": "start", "content": {}, "next": []},
                    "a": {"id": "a", "type": "end", "content": {}, "next": []},
                },
            }),
        );

        let text = r#"{"nodes": {"b": {"type": "start"}, "a": {"type": "end"}}, "startNodeId": "b"}"#;
        let parsed: GraphSurvey = serde_json::from_str(text).unwrap();
        assert_eq!(parsed, survey);
    }
}
