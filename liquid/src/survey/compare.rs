//! Semantic comparison of survey graphs.
//!
//! Nodes are matched by id. Content that source text leaves out when it is
//! empty is treated as absent, and options without ids take the text of
//! their values.

use serde_json::{Map, Value};

use crate::survey::decode::value_text;
use crate::survey::graph::{GraphNode, GraphSurvey};
use crate::ui::compare::Differences;
use crate::Comparison;

pub fn compare(original: &GraphSurvey, reconstructed: &GraphSurvey) -> Comparison {
    let mut differences = Differences::default();
    self::differences(&mut differences, "", original, reconstructed);
    Comparison::new(differences.0)
}

/// Record the differences between two surveys, with paths relative to
/// `path`.
pub(crate) fn differences(
    differences: &mut Differences,
    path: &str,
    original: &GraphSurvey,
    reconstructed: &GraphSurvey,
) {
    let field = |name: &str| match path {
        "" => name.to_owned(),
        path => format!("{path}.{name}"),
    };

    differences.field(&field("id"), &original.id, &reconstructed.id);
    differences.field(&field("title"), &original.title, &reconstructed.title);
    differences.field(&field("description"), &original.description, &reconstructed.description);
    differences.field(&field("startNodeId"), &original.start_node_id, &reconstructed.start_node_id);
    differences.count(&field("nodes"), original.nodes.len(), reconstructed.nodes.len());

    for node in &original.nodes {
        let path = field(&format!("nodes.{}", node.id));
        match reconstructed.node(&node.id) {
            Some(other) => self::node(differences, &path, node, other),
            None => differences.0.push(format!("{path} missing")),
        }
    }
    for node in &reconstructed.nodes {
        if original.node(&node.id).is_none() {
            differences.0.push(format!("{} unexpected", field(&format!("nodes.{}", node.id))));
        }
    }
}

fn node(differences: &mut Differences, path: &str, original: &GraphNode, reconstructed: &GraphNode) {
    differences.field(&format!("{path}.type"), &original.kind, &reconstructed.kind);

    let (content, other) = (normalised_content(original), normalised_content(reconstructed));
    let keys = content.keys().chain(other.keys().filter(|key| !content.contains_key(*key)));
    for key in keys {
        differences.field(&format!("{path}.content.{key}"), &content.get(key), &other.get(key));
    }

    differences.count(&format!("{path}.next"), original.next.len(), reconstructed.next.len());
    for (index, (next, other)) in original.next.iter().zip(&reconstructed.next).enumerate() {
        differences.field(&format!("{path}.next[{index}].nodeId"), &next.node_id, &other.node_id);
        differences.field(&format!("{path}.next[{index}].condition"), &next.condition, &other.condition);
    }
}

fn normalised_content(node: &GraphNode) -> Map<String, Value> {
    let mut content = node.content.clone();

    for key in ["title", "message", "question", "description"] {
        if content.get(key).and_then(Value::as_str) == Some("") {
            content.remove(key);
        }
    }
    if content.get("required") == Some(&Value::Bool(false)) {
        content.remove("required");
    }

    if content.get("options").and_then(Value::as_array).map_or(false, Vec::is_empty) {
        content.remove("options");
    }
    if let Some(Value::Array(options)) = content.get_mut("options") {
        for option in options.iter_mut().filter_map(Value::as_object_mut) {
            if !option.contains_key("id") {
                let id = option.get("value").map(value_text).unwrap_or_default();
                option.insert("id".to_owned(), Value::String(id));
            }
        }
    }

    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn survey(value: Value) -> GraphSurvey {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn empty_content_is_absent() {
        let original = survey(json!({
            "startNodeId": "s",
            "nodes": {
                "s": {"type": "start", "content": {"title": ""}, "next": [{"nodeId": "q"}]},
                "q": {"type": "question", "content": {
                    "question": "Pick",
                    "required": false,
                    "options": [{"label": "Yes", "value": "yes"}],
                }},
            },
        }));
        let reconstructed = survey(json!({
            "startNodeId": "s",
            "nodes": {
                "s": {"type": "start", "next": [{"nodeId": "q"}]},
                "q": {"type": "question", "content": {
                    "question": "Pick",
                    "options": [{"id": "yes", "label": "Yes", "value": "yes"}],
                }},
            },
        }));

        let comparison = compare(&original, &reconstructed);
        assert!(comparison.is_equivalent, "{:?}", comparison.differences);
    }

    #[test]
    fn nodes_are_matched_by_id() {
        let original = survey(json!({
            "nodes": {
                "a": {"type": "message", "content": {"title": "A"}, "next": [{"nodeId": "b"}]},
                "b": {"type": "end"},
            },
        }));
        let reconstructed = survey(json!({
            "nodes": {
                "b": {"type": "end"},
                "a": {"type": "message", "content": {"title": "A"}, "next": [{"nodeId": "b"}]},
            },
        }));
        assert!(compare(&original, &reconstructed).is_equivalent);
    }

    #[test]
    fn differences_have_paths() {
        let original = survey(json!({
            "title": "Feedback",
            "nodes": {
                "a": {"type": "message", "content": {"title": "A"}, "next": [
                    {"nodeId": "b", "condition": {"operator": "equals", "value": 1}},
                ]},
                "b": {"type": "end"},
            },
        }));
        let reconstructed = survey(json!({
            "title": "Feedback!",
            "nodes": {
                "a": {"type": "question", "content": {"title": "A"}, "next": [
                    {"nodeId": "b", "condition": {"operator": "equals", "value": "1"}},
                ]},
                "c": {"type": "end"},
            },
        }));

        let comparison = compare(&original, &reconstructed);
        assert_eq!(
            comparison.differences,
            [
                "title mismatch: \"Feedback\" vs \"Feedback!\"",
                "nodes.a.type mismatch: \"message\" vs \"question\"",
                "nodes.a.next[0].condition mismatch: {\"operator\":\"equals\",\"value\":1} vs {\"operator\":\"equals\",\"value\":\"1\"}",
                "nodes.b missing",
                "nodes.c unexpected",
            ],
        );
    }

    #[test]
    fn nested_paths() {
        let mut differences = Differences::default();
        let original = survey(json!({"id": "a"}));
        let reconstructed = survey(json!({"id": "b"}));
        self::differences(&mut differences, "surveys[0]", &original, &reconstructed);
        assert_eq!(differences.0, ["surveys[0].id mismatch: \"a\" vs \"b\""]);
    }
}
