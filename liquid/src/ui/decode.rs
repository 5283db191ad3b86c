//! Decoding parsed modules into schemas.

use crate::survey;
use crate::ui::schema::{self, Condition, Emit, Layout, Receive, Schema, Signal, Signals, Style};
use crate::ui::{Binding, Block, Modifier, Module, TypeSyntax};

/// The uid given to the container wrapping several main blocks.
pub const ROOT_UID: &str = "root";

/// Block uids, handed out in pre-order: `b1`, `b2`, ...
#[derive(Default)]
struct Uids {
    next: u32,
}

impl Uids {
    fn fresh(&mut self) -> String {
        self.next += 1;
        format!("b{}", self.next)
    }
}

pub fn module(module: &Module) -> Schema {
    let mut uids = Uids::default();
    let mut layers = Vec::with_capacity(module.layers.len() + 1);

    let main = (module.blocks.iter())
        .map(|block| self::block(block, &mut uids))
        .collect::<Vec<_>>();
    if let Some(root) = main_root(main) {
        layers.push(schema::Layer {
            id: 0,
            visible: true,
            root,
        });
    }

    for layer in &module.layers {
        if layers.iter().any(|decoded| decoded.id == layer.id) {
            tracing::debug!(id = layer.id, "skipping layer with a duplicate id");
            continue;
        }
        layers.push(schema::Layer {
            id: layer.id,
            visible: layer.id == 0,
            root: block(&layer.root, &mut uids),
        });
    }

    let mut signals = Vec::<Signal>::with_capacity(module.signals.len());
    for decl in &module.signals {
        if signals.iter().all(|signal| signal.name != decl.name) {
            signals.push(Signal {
                name: decl.name.clone(),
            });
        }
    }

    Schema {
        signals,
        layers,
        surveys: module.surveys.iter().map(survey::decode::module).collect(),
        ..Schema::default()
    }
}

/// The root of the main layer: a lone block stands for itself, and several
/// blocks are wrapped in a container.
pub fn main_root(mut blocks: Vec<schema::Block>) -> Option<schema::Block> {
    match blocks.len() {
        0 => None,
        1 => blocks.pop(),
        _ => Some(schema::Block {
            children: Some(blocks),
            ..schema::Block::new(ROOT_UID, "container")
        }),
    }
}

fn block(block: &Block, uids: &mut Uids) -> schema::Block {
    let mut output = schema::Block::new(uids.fresh(), block.ty.name());

    if let TypeSyntax::Custom(component_id) = &block.ty {
        output.component_id = Some(component_id.clone()).filter(|id| !id.is_empty());
    }

    let mut bindings = block.bindings.iter();
    output.binding = bindings.next().map(binding);
    output.label = bindings
        .find_map(|binding| match binding {
            Binding::Literal(text) => Some(text.clone()),
            _ => None,
        })
        .or_else(|| match &output.binding {
            Some(schema::Binding::Literal(text)) => Some(text.clone()),
            _ => None,
        });
    if block.bindings.len() > 2 {
        tracing::debug!(uid = %output.uid, count = block.bindings.len(), "ignoring extra bindings");
    }

    let mut layout = Layout::default();
    let mut style = Style::default();
    let mut signals = Signals::default();
    let mut receive = Vec::new();
    let mut condition = Condition::default();

    for modifier in &block.modifiers {
        match modifier {
            Modifier::Priority(priority) => layout.priority = Some(*priority),
            Modifier::Flex(flex) => layout.flex = Some(flex.clone()),
            Modifier::Span(span) => layout.span = Some(span.clone()),
            Modifier::Action(action) => output.action = Some(action.clone()),
            Modifier::Color(color) => style.color = Some(color.clone()),
            Modifier::ColorCondition(cond) => style.color_condition = Some(cond.clone()),
            Modifier::Size(size) => style.size = Some(size.clone()),
            Modifier::Declare(name) => signals.declare.push(name.clone()),
            Modifier::Emit { name, value } => {
                signals.emit = Some(Emit {
                    name: name.clone(),
                    value: value.clone(),
                });
            }
            Modifier::LayerTrigger(layer) => signals.layer = Some(*layer),
            Modifier::Receive(name) => receive.push(name.clone()),
            Modifier::Both(name) => signals.both = Some(name.clone()),
            Modifier::State(state) => condition.state = Some(state.clone()),
            Modifier::Stream(stream) => output.stream = Some(stream.clone()),
            Modifier::Fidelity(level) => output.fidelity = Some(level.clone()),
        }
    }

    if let Some(guard) = &block.guard {
        condition.signal = Some(guard.signal.clone());
        condition.value = guard.value.clone();
    }
    signals.receive = Receive::from_names(receive);

    output.layout = Some(layout).filter(|layout| !layout.is_empty());
    output.style = Some(style).filter(|style| !style.is_empty());
    output.signals = Some(signals).filter(|signals| !signals.is_empty());
    output.condition = Some(condition).filter(|condition| !condition.is_empty());

    output.children = match &block.children {
        Some(children) if !children.is_empty() => Some(
            (children.iter())
                .map(|child| self::block(child, uids))
                .collect(),
        ),
        _ => None,
    };
    output.survey = block.survey.as_ref().map(survey::decode::module);

    output
}

fn binding(binding: &Binding) -> schema::Binding {
    match binding {
        Binding::Indexed(digits) => {
            schema::Binding::Indexed(digits.bytes().map(|digit| digit - b'0').collect())
        }
        Binding::Field(path) => schema::Binding::Field(path.clone()),
        Binding::Iterator(name) => schema::Binding::Iterator(name.clone()),
        Binding::IndexRef => schema::Binding::IndexRef,
        Binding::Computed(expr) => schema::Binding::Computed(expr.clone()),
        Binding::Literal(text) => schema::Binding::Literal(text.clone()),
    }
}
