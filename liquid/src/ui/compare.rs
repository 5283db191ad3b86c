//! Semantic comparison of schemas, used to check that a schema survives
//! being written out as source text and read back in.
//!
//! Uids are ignored, as are differences that source text cannot express: a
//! label-only block is the same as one bound to that label, and a missing
//! label is the same as the label a binding implies.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::survey;
use crate::ui::schema::{self, Binding, Schema};
pub use crate::Comparison;

/// Compare two schemas, listing every difference by its path.
pub fn compare(original: &Schema, reconstructed: &Schema) -> Comparison {
    let mut differences = Differences::default();
    differences.schema(original, reconstructed);
    Comparison::new(differences.0)
}

/// The label implied by binding a block to a field: the last path segment,
/// split into words and title cased.
pub fn field_to_label(path: &str) -> String {
    static CAMEL_CASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z])([A-Z])").unwrap());

    let name = path.rsplit('.').next().unwrap_or(path).replace('_', " ");
    let spaced = CAMEL_CASE.replace_all(&name, "$1 $2");

    let mut label = String::with_capacity(spaced.len());
    let mut word_start = true;
    for ch in spaced.chars() {
        match word_start {
            true => label.extend(ch.to_uppercase()),
            false => label.push(ch),
        }
        word_start = ch.is_whitespace();
    }
    label
}

#[derive(Default)]
pub(crate) struct Differences(pub(crate) Vec<String>);

impl Differences {
    /// Record a difference if two values serialize differently.
    pub(crate) fn field<T: Serialize>(&mut self, path: &str, original: &T, reconstructed: &T) {
        let original = serde_json::to_value(original).unwrap_or_default();
        let reconstructed = serde_json::to_value(reconstructed).unwrap_or_default();
        if original != reconstructed {
            self.0.push(format!("{path} mismatch: {original} vs {reconstructed}"));
        }
    }

    pub(crate) fn count(&mut self, path: &str, original: usize, reconstructed: usize) {
        if original != reconstructed {
            self.0.push(format!("{path} count mismatch: {original} vs {reconstructed}"));
        }
    }

    fn schema(&mut self, original: &Schema, reconstructed: &Schema) {
        self.field("version", &original.version, &reconstructed.version);
        self.field("signals", &original.signals, &reconstructed.signals);
        self.count("layer", original.layers.len(), reconstructed.layers.len());

        for layer in &original.layers {
            let path = format!("layer{}", layer.id);
            match reconstructed.layer(layer.id) {
                None => self.0.push(format!("{path} missing")),
                Some(other) => {
                    self.field(&format!("{path}.visible"), &layer.visible, &other.visible);
                    self.block(&format!("{path}.root"), &layer.root, &other.root);
                }
            }
        }
        for layer in &reconstructed.layers {
            if original.layer(layer.id).is_none() {
                self.0.push(format!("layer{} unexpected", layer.id));
            }
        }

        self.count("survey", original.surveys.len(), reconstructed.surveys.len());
        for (index, (original, reconstructed)) in
            original.surveys.iter().zip(&reconstructed.surveys).enumerate()
        {
            survey::compare::differences(self, &format!("surveys[{index}]"), original, reconstructed);
        }
    }

    fn block(&mut self, path: &str, original: &schema::Block, reconstructed: &schema::Block) {
        let field = |name: &str| format!("{path}.{name}");

        self.field(&field("type"), &original.ty, &reconstructed.ty);
        self.field(&field("componentId"), &original.component_id, &reconstructed.component_id);
        self.field(&field("binding"), &effective_binding(original), &effective_binding(reconstructed));
        self.field(&field("label"), &effective_label(original), &effective_label(reconstructed));

        let (layout, other_layout) = (
            original.layout.clone().unwrap_or_default(),
            reconstructed.layout.clone().unwrap_or_default(),
        );
        self.field(&field("layout.priority"), &layout.priority, &other_layout.priority);
        self.field(&field("layout.flex"), &layout.flex, &other_layout.flex);
        self.field(&field("layout.span"), &layout.span, &other_layout.span);

        let (style, other_style) = (
            original.style.clone().unwrap_or_default(),
            reconstructed.style.clone().unwrap_or_default(),
        );
        self.field(&field("style.color"), &style.color, &other_style.color);
        self.field(&field("style.colorCondition"), &style.color_condition, &other_style.color_condition);
        self.field(&field("style.size"), &style.size, &other_style.size);

        let (signals, other_signals) = (
            original.signals.clone().unwrap_or_default(),
            reconstructed.signals.clone().unwrap_or_default(),
        );
        self.field(&field("signals.declare"), &signals.declare, &other_signals.declare);
        self.field(&field("signals.emit"), &signals.emit, &other_signals.emit);
        self.field(&field("signals.receive"), &signals.receive_names(), &other_signals.receive_names());
        self.field(&field("signals.both"), &signals.both, &other_signals.both);
        self.field(&field("signals.layer"), &signals.layer, &other_signals.layer);

        let (condition, other_condition) = (
            original.condition.clone().unwrap_or_default(),
            reconstructed.condition.clone().unwrap_or_default(),
        );
        self.field(&field("condition.signal"), &condition.signal, &other_condition.signal);
        self.field(&field("condition.value"), &condition.value, &other_condition.value);
        self.field(&field("condition.state"), &condition.state, &other_condition.state);

        self.field(&field("action"), &original.action, &reconstructed.action);
        self.field(&field("stream"), &original.stream, &reconstructed.stream);
        self.field(&field("fidelity"), &original.fidelity, &reconstructed.fidelity);
        self.field(
            &field("props"),
            &original.props.clone().unwrap_or_default(),
            &reconstructed.props.clone().unwrap_or_default(),
        );

        match (&original.survey, &reconstructed.survey) {
            (Some(survey), Some(other)) => survey::compare::differences(self, &field("survey"), survey, other),
            (None, None) => {}
            (survey, other) => self.0.push(format!(
                "{} mismatch: {} vs {}",
                field("survey"),
                presence(survey.is_some()),
                presence(other.is_some()),
            )),
        }

        let (children, other_children) = (original.children(), reconstructed.children());
        self.count(&field("children"), children.len(), other_children.len());
        for (index, (child, other)) in children.iter().zip(other_children).enumerate() {
            self.block(&format!("{path}.children[{index}]"), child, other);
        }
    }
}

fn presence(present: bool) -> &'static str {
    match present {
        true => "present",
        false => "absent",
    }
}

/// A label-only block is bound to its label.
fn effective_binding(block: &schema::Block) -> Option<Binding> {
    match (&block.binding, &block.label) {
        (Some(binding), _) => Some(binding.clone()),
        (None, Some(label)) => Some(Binding::Literal(label.clone())),
        (None, None) => None,
    }
}

fn effective_label(block: &schema::Block) -> Option<String> {
    match (&block.label, &block.binding) {
        (Some(label), _) => Some(label.clone()),
        (None, Some(Binding::Field(path))) => Some(field_to_label(path)),
        (None, Some(Binding::Literal(text))) => Some(text.clone()),
        (None, _) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::schema::{Layer, Style};

    fn schema(root: schema::Block) -> Schema {
        Schema {
            layers: vec![Layer {
                id: 0,
                visible: true,
                root,
            }],
            ..Schema::default()
        }
    }

    #[test]
    fn field_labels() {
        assert_eq!(field_to_label("totalRevenue"), "Total Revenue");
        assert_eq!(field_to_label("user.first_name"), "First Name");
        assert_eq!(field_to_label("orders"), "Orders");
        assert_eq!(field_to_label(""), "");
    }

    #[test]
    fn uids_are_ignored() {
        let comparison = compare(
            &schema(schema::Block::new("a", "kpi")),
            &schema(schema::Block::new("b", "kpi")),
        );
        assert!(comparison.is_equivalent, "{:?}", comparison.differences);
    }

    #[test]
    fn labels_are_normalised() {
        let mut labelled = schema::Block::new("b1", "button");
        labelled.label = Some("Save".to_owned());
        let mut bound = schema::Block::new("b1", "button");
        bound.binding = Some(Binding::Literal("Save".to_owned()));
        assert!(compare(&schema(labelled), &schema(bound)).is_equivalent);

        let mut implied = schema::Block::new("b1", "kpi");
        implied.binding = Some(Binding::Field("totalRevenue".to_owned()));
        let mut explicit = implied.clone();
        explicit.label = Some("Total Revenue".to_owned());
        assert!(compare(&schema(implied), &schema(explicit)).is_equivalent);
    }

    #[test]
    fn empty_objects_are_absent() {
        let mut styled = schema::Block::new("b1", "kpi");
        styled.style = Some(Style::default());
        assert!(compare(&schema(styled), &schema(schema::Block::new("b1", "kpi"))).is_equivalent);
    }

    #[test]
    fn differences_have_paths() {
        let mut original = schema::Block::new("root", "container");
        original.children = Some(vec![
            schema::Block::new("b1", "kpi"),
            schema::Block::new("b2", "bar"),
        ]);
        let mut reconstructed = original.clone();
        if let Some(children) = &mut reconstructed.children {
            children[1].ty = "line".to_owned();
            children[1].action = Some("drill".to_owned());
        }

        let comparison = compare(&schema(original), &schema(reconstructed));
        assert!(!comparison.is_equivalent);
        assert_eq!(
            comparison.differences,
            [
                "layer0.root.children[1].type mismatch: \"bar\" vs \"line\"",
                "layer0.root.children[1].action mismatch: null vs \"drill\"",
            ],
        );
    }

    #[test]
    fn layers_are_matched_by_id() {
        let mut original = schema(schema::Block::new("b1", "kpi"));
        original.layers.push(Layer {
            id: 1,
            visible: false,
            root: schema::Block::new("b2", "modal"),
        });
        let mut reconstructed = original.clone();
        reconstructed.layers.reverse();
        assert!(compare(&original, &reconstructed).is_equivalent);

        reconstructed.layers[0].visible = true;
        let comparison = compare(&original, &reconstructed);
        assert_eq!(comparison.differences, ["layer1.visible mismatch: false vs true"]);
    }
}
