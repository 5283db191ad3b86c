//! Printing surveys as source text.

use pretty::{DocAllocator, DocBuilder};
use scoped_arena::Scope;
use serde_json::{Map, Value};

use crate::pretty::Context;
use crate::survey::lexer::{escape, is_identifier};
use crate::survey::{option_value, tables, Choice, Header, Module, Node, NodeKind, Transition};

/// Render a survey as source text, without a trailing newline.
pub fn render(module: &Module) -> String {
    let scope = Scope::new();
    let context = Context::new(&scope);
    crate::pretty::render(context.survey(module))
}

impl<'arena> Context<'arena> {
    /// The header comes first, then each node separated by blank lines.
    pub fn survey(&'arena self, module: &Module) -> DocBuilder<'arena, Self> {
        let mut docs = Vec::with_capacity(module.nodes.len() + 1);
        if let Some(header) = &module.header {
            docs.push(self.survey_header(header));
        }
        docs.extend(module.nodes.iter().map(|node| self.survey_node(node)));

        self.intersperse(docs, self.hardline().append(self.hardline()))
    }

    fn survey_header(&'arena self, header: &Header) -> DocBuilder<'arena, Self> {
        let mut parts = vec![header.id.clone()];
        parts.extend(texts(&header.title, &header.description));

        self.lines([self.text(parts.join(" ")), self.text("---")])
    }

    /// One transition is written on the same line as its node, and several
    /// on their own lines below it.
    pub fn survey_node(&'arena self, node: &Node) -> DocBuilder<'arena, Self> {
        let mut parts = vec![self.text(node.kind.sigil().to_string()), self.text(node.id.clone())];

        match node.kind {
            NodeKind::Question => {
                match (&node.question_type, node.required) {
                    (Some(code), true) => parts.push(self.text(format!("{code}*"))),
                    (Some(code), false) => parts.push(self.text(code.clone())),
                    (None, true) => parts.push(self.text("*")),
                    (None, false) => {}
                }
                parts.extend(texts(&node.question, &node.description).map(|text| self.text(text)));
                if !node.options.is_empty() {
                    parts.push(self.list(node.options.iter().map(|choice| self.text(choice_text(choice)))));
                }
                if !node.config.is_empty() {
                    parts.push(self.text(map_text(&node.config)));
                }
            }
            NodeKind::Start | NodeKind::Message | NodeKind::End => {
                parts.extend(texts(&node.title, &node.message).map(|text| self.text(text)));
            }
        }

        let line = self.intersperse(parts, self.space());
        match node.transitions.as_slice() {
            [] => line,
            [transition] => line.append(self.space()).append(self.text(transition_text(transition))),
            transitions => line.append(self.concat(transitions.iter().map(|transition| {
                self.hardline()
                    .append(self.text(format!("  {}", transition_text(transition))))
            }))),
        }
    }
}

/// Up to two quoted strings. An empty first string is written when only
/// the second is present.
fn texts(first: &Option<String>, second: &Option<String>) -> impl Iterator<Item = String> {
    let texts = match (first, second) {
        (Some(first), Some(second)) => vec![quote(first), quote(second)],
        (Some(first), None) => vec![quote(first)],
        (None, Some(second)) => vec![quote(""), quote(second)],
        (None, None) => Vec::new(),
    };
    texts.into_iter()
}

fn quote(text: &str) -> String {
    format!("\"{}\"", escape(text))
}

/// Options are written in the shortest form that reads back the same.
fn choice_text(choice: &Choice) -> String {
    let label = quote(&choice.label);
    let derived = choice.value == Value::String(option_value(&choice.label));

    match (&choice.id, derived) {
        (None, true) => label,
        (None, false) => format!("{}={label}", value_source(&choice.value)),
        (Some(id), true) => format!("{}:{label}", key_text(id)),
        (Some(id), false) => format!("{}:{label}={}", key_text(id), value_source(&choice.value)),
    }
}

fn transition_text(transition: &Transition) -> String {
    let mut text = format!("-> {}", transition.target);
    if let Some(condition) = &transition.condition {
        let operator = tables::operator_text(&condition.operator).unwrap_or(&condition.operator);
        text.push_str(" ?");
        text.push_str(operator);
        if !condition.value.is_null() {
            text.push(' ');
            text.push_str(&value_source(&condition.value));
        }
    }
    text
}

fn key_text(key: &str) -> String {
    match is_identifier(key) {
        true => key.to_owned(),
        false => quote(key),
    }
}

/// Values as source text. Strings that read as identifiers are left bare.
fn value_source(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(value) => value.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => key_text(text),
        Value::Array(items) => {
            let items: Vec<_> = items.iter().map(value_source).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(entries) => map_text(entries),
    }
}

fn map_text(entries: &Map<String, Value>) -> String {
    let entries: Vec<_> = (entries.iter())
        .map(|(key, value)| format!("{}: {}", key_text(key), value_source(value)))
        .collect();
    format!("{{{}}}", entries.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reformat(source: &str) -> String {
        let (module, messages) = Module::parse(source);
        assert!(messages.is_empty(), "{messages:?}");
        render(&module)
    }

    #[test]
    fn canonical_layout() {
        assert_eq!(
            reformat("feedback \"Feedback\" ---   > start \"Hi\" -> q ? q Rt* \"Rate us\" -> done ?>= 4 -> q2\n?q2 Ta -> done < done \"\" \"Bye\""),
            [
                "feedback \"Feedback\"",
                "---",
                "",
                "> start \"Hi\" -> q",
                "",
                "? q Rt* \"Rate us\"",
                "  -> done ?>= 4",
                "  -> q2",
                "",
                "? q2 Ta -> done",
                "",
                "< done \"\" \"Bye\"",
            ]
            .join("\n"),
        );
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(
            reformat("> s \"Say \\\"hi\\\"\\nthen go\""),
            "> s \"Say \\\"hi\\\"\\nthen go\"",
        );
    }

    #[test]
    fn values() {
        assert_eq!(
            reformat("> s -> e\n? q * {\"min value\": -1.5, tags: [a, \"b c\", true], on: false} -> e\n< e"),
            "> s -> e\n\n? q * {\"min value\": -1.5, tags: [a, \"b c\", true], on: false} -> e\n\n< e",
        );
    }

    #[test]
    fn options() {
        assert_eq!(
            reformat("> s -> q\n? q Ch [\"Yes\", n=\"No\", 2:\"Two\"=2, \"x y\":\"Other\"] -> e\n< e"),
            "> s -> q\n\n? q Ch [\"Yes\", n=\"No\", \"2\":\"Two\"=2, \"x y\":\"Other\"] -> e\n\n< e",
        );
    }
}
