//! Decoding parsed surveys into graphs.

use serde_json::{json, Map, Value};

use crate::survey::graph::{GraphNode, GraphSurvey, Next, TransitionCondition, DEFAULT_ID};
use crate::survey::{tables, Module, Node, NodeKind};

/// Decode a survey. The first start node is where the survey starts, and
/// only the first of several nodes sharing an id is kept.
pub fn module(module: &Module) -> GraphSurvey {
    let header = module.header.as_ref();
    let mut survey = GraphSurvey {
        id: header.map_or_else(|| DEFAULT_ID.to_owned(), |header| header.id.clone()),
        title: header.and_then(|header| header.title.clone()).unwrap_or_default(),
        description: header.and_then(|header| header.description.clone()).unwrap_or_default(),
        start_node_id: String::new(),
        nodes: Vec::with_capacity(module.nodes.len()),
    };

    for node in &module.nodes {
        if survey.node(&node.id).is_some() {
            tracing::debug!(id = %node.id, "skipping duplicate node");
            continue;
        }
        if node.kind == NodeKind::Start && survey.start_node_id.is_empty() {
            survey.start_node_id = node.id.clone();
        }
        survey.nodes.push(self::node(node));
    }

    survey
}

fn node(node: &Node) -> GraphNode {
    let mut output = GraphNode::new(node.id.clone(), node.kind);
    let content = &mut output.content;

    match node.kind {
        NodeKind::Question => {
            insert_text(content, "question", &node.question);
            if let Some(code) = &node.question_type {
                let ty = tables::type_for_code(code).unwrap_or(code.as_str());
                content.insert("type".to_owned(), json!(ty));
            }
            if node.required {
                content.insert("required".to_owned(), json!(true));
            }
            insert_text(content, "description", &node.description);
            if !node.options.is_empty() {
                let options = (node.options.iter())
                    .map(|option| {
                        let id = match &option.id {
                            Some(id) => id.clone(),
                            None => value_text(&option.value),
                        };
                        json!({"id": id, "label": option.label, "value": option.value})
                    })
                    .collect();
                content.insert("options".to_owned(), Value::Array(options));
            }
            content.extend(node.config.clone());
        }
        NodeKind::Start | NodeKind::Message | NodeKind::End => {
            insert_text(content, "title", &node.title);
            insert_text(content, "message", &node.message);
        }
    }

    output.next = (node.transitions.iter())
        .map(|transition| Next {
            node_id: transition.target.clone(),
            condition: transition.condition.as_ref().map(|condition| TransitionCondition {
                operator: condition.operator.clone(),
                value: condition.value.clone(),
            }),
        })
        .collect();

    output
}

/// Empty strings are left out.
fn insert_text(content: &mut Map<String, Value>, key: &str, text: &Option<String>) {
    if let Some(text) = text.as_ref().filter(|text| !text.is_empty()) {
        content.insert(key.to_owned(), json!(text));
    }
}

/// The text of a scalar, used where an option has no id of its own.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        value => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(source: &str) -> GraphSurvey {
        let (module, messages) = Module::parse(source);
        assert!(messages.is_empty(), "{messages:?}");
        self::module(&module)
    }

    #[test]
    fn header_defaults() {
        let survey = decode("> s");
        assert_eq!(survey.id, "survey");
        assert_eq!(survey.title, "");
        assert_eq!(survey.start_node_id, "s");

        let survey = decode("nps \"Net promoter\"\n---\n> s");
        assert_eq!(survey.id, "nps");
        assert_eq!(survey.title, "Net promoter");
        assert_eq!(survey.description, "");
    }

    #[test]
    fn content() {
        let survey = decode(
            "> s \"Hi\" -> q\n? q Ch* \"Pick one\" \"Be honest\" [\"Very Good\", x:\"Other\"=5] {layout: grid} -> e\n< e \"\" \"Bye\"",
        );

        assert_eq!(Value::Object(survey.nodes[0].content.clone()), json!({"title": "Hi"}));
        assert_eq!(
            Value::Object(survey.nodes[1].content.clone()),
            json!({
                "question": "Pick one",
                "type": "choice",
                "required": true,
                "description": "Be honest",
                "options": [
                    {"id": "very-good", "label": "Very Good", "value": "very-good"},
                    {"id": "x", "label": "Other", "value": 5},
                ],
                "layout": "grid",
            }),
        );
        assert_eq!(Value::Object(survey.nodes[2].content.clone()), json!({"message": "Bye"}));
    }

    #[test]
    fn transitions() {
        let survey = decode("> s -> q\n? q Rt\n  -> e ?>= 4\n  -> e\n< e");
        let next = &survey.nodes[1].next;
        assert_eq!(next.len(), 2);
        assert_eq!(
            next[0].condition,
            Some(TransitionCondition {
                operator: "greaterOrEqual".to_owned(),
                value: json!(4),
            }),
        );
        assert_eq!(next[1].condition, None);
    }

    #[test]
    fn unknown_types_are_kept() {
        let survey = decode("> s -> q\n? q stars \"Rate\" -> e\n< e");
        assert_eq!(survey.nodes[1].content["type"], json!("stars"));
    }

    #[test]
    fn first_start_wins() {
        let (module, _) = Module::parse("> a -> b\n> b -> a\n< a");
        let survey = self::module(&module);
        assert_eq!(survey.start_node_id, "a");
        assert_eq!(survey.nodes.len(), 2);
    }
}
