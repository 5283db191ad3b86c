//! Encoding schemas as parsed modules, ready for printing.
//!
//! Not every schema can be written as source text: a priority of 42 has no
//! sigil, and a colour named `g` would read back as `green`. Every binding,
//! modifier and guard is checked by reading its printed form back with the
//! parser, and anything that does not survive is reported as an
//! [`EncodeError`].

use std::collections::BTreeSet;
use std::fmt;

use crate::source::{self, ByteRange};
use crate::survey;
use crate::ui::compare::field_to_label;
use crate::ui::decode::ROOT_UID;
use crate::ui::parser::{self, Piece};
use crate::ui::pretty::{binding_text, guard_text, modifier_text};
use crate::ui::schema::{self, Schema};
use crate::ui::{
    tables, Binding, Block, Guard, Layer, Modifier, Module, SignalDecl, TypeSyntax, CUSTOM_TYPE,
};

#[derive(Clone, Debug, PartialEq)]
pub enum EncodeError {
    UnknownBlockType { uid: String, ty: String },
    MissingComponentId { uid: String },
    InvalidPriority { uid: String, priority: u32 },
    InvalidIndices { uid: String, indices: Vec<u8> },
    /// A binding, modifier or guard whose printed form reads back as
    /// something else.
    Unrepresentable {
        uid: String,
        what: &'static str,
        text: String,
    },
    InvalidSignal { name: String },
    ConditionWithoutSignal { uid: String },
    UnsupportedProps { uid: String },
    DuplicateLayer { id: u32 },
    Survey(survey::EncodeError),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::UnknownBlockType { uid, ty } => {
                write!(f, "block `{uid}` has type `{ty}`, which has no type code")
            }
            EncodeError::MissingComponentId { uid } => {
                write!(f, "custom block `{uid}` has no component id")
            }
            EncodeError::InvalidPriority { uid, priority } => write!(
                f,
                "block `{uid}` has priority {priority}, expected 0 to 9, 50, 75 or 100",
            ),
            EncodeError::InvalidIndices { uid, indices } => write!(
                f,
                "block `{uid}` binds to columns {indices:?}, expected at least two indices from 0 to 9",
            ),
            EncodeError::Unrepresentable { uid, what, text } => {
                write!(f, "the {what} of block `{uid}` cannot be written as `{text}`")
            }
            EncodeError::InvalidSignal { name } => write!(f, "invalid signal name `{name}`"),
            EncodeError::ConditionWithoutSignal { uid } => {
                write!(f, "block `{uid}` has a condition value but no signal")
            }
            EncodeError::UnsupportedProps { uid } => {
                write!(f, "block `{uid}` has props, which cannot be written as source text")
            }
            EncodeError::DuplicateLayer { id } => write!(f, "layer {id} appears more than once"),
            EncodeError::Survey(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for EncodeError {}

impl From<survey::EncodeError> for EncodeError {
    fn from(error: survey::EncodeError) -> EncodeError {
        EncodeError::Survey(error)
    }
}

/// Placeholder range for syntax that was not parsed from anywhere.
const NO_RANGE: ByteRange = ByteRange::new(0, 0);

pub fn module(schema: &Schema) -> Result<Module, EncodeError> {
    let mut module = Module::default();

    for signal in &schema.signals {
        if read_back(&format!("@{}", signal.name)) != Some(Piece::Modifier(Modifier::Declare(signal.name.clone()))) {
            return Err(EncodeError::InvalidSignal {
                name: signal.name.clone(),
            });
        }
        module.signals.push(SignalDecl {
            range: NO_RANGE,
            name: signal.name.clone(),
        });
    }

    for graph in &schema.surveys {
        module.surveys.push(survey::encode::survey(graph)?);
    }

    let mut seen = BTreeSet::new();
    for layer in &schema.layers {
        if !seen.insert(layer.id) {
            return Err(EncodeError::DuplicateLayer { id: layer.id });
        }

        if layer.id == 0 {
            module.blocks = (main_blocks(&layer.root).into_iter())
                .map(block)
                .collect::<Result<_, _>>()?;
        } else {
            module.layers.push(Layer {
                range: NO_RANGE,
                id: layer.id,
                root: block(&layer.root)?,
            });
        }
    }

    Ok(module)
}

/// The blocks to write on the main layer. A bare container made when
/// decoding several main blocks is unwrapped again.
fn main_blocks(root: &schema::Block) -> Vec<&schema::Block> {
    let synthetic = root.uid == ROOT_UID
        && root.ty == "container"
        && root.children().len() >= 2
        && root.component_id.is_none()
        && root.binding.is_none()
        && root.label.is_none()
        && root.layout.is_none()
        && root.style.is_none()
        && root.signals.is_none()
        && root.condition.is_none()
        && root.action.is_none()
        && root.stream.is_none()
        && root.fidelity.is_none()
        && root.props.is_none()
        && root.survey.is_none();

    match synthetic {
        true => root.children().iter().collect(),
        false => vec![root],
    }
}

fn read_back(text: &str) -> Option<Piece> {
    match source::normalise(text) == text {
        true => parser::piece(text),
        false => None,
    }
}

/// Check that a piece of syntax reads back as itself.
fn checked(uid: &str, what: &'static str, text: String, piece: Piece) -> Result<(), EncodeError> {
    match read_back(&text) {
        Some(read) if read == piece => Ok(()),
        _ => Err(EncodeError::Unrepresentable {
            uid: uid.to_owned(),
            what,
            text,
        }),
    }
}

fn block(block: &schema::Block) -> Result<Block, EncodeError> {
    let uid = block.uid.as_str();

    if block.props.as_ref().map_or(false, |props| !props.is_empty()) {
        return Err(EncodeError::UnsupportedProps { uid: uid.to_owned() });
    }

    let ty = type_syntax(block)?;
    let bindings = bindings(block)?;
    let mut modifiers = Vec::new();
    let mut push = |what: &'static str, modifier: Modifier| {
        checked(uid, what, modifier_text(&modifier), Piece::Modifier(modifier.clone()))?;
        modifiers.push(modifier);
        Ok::<_, EncodeError>(())
    };

    if let Some(layout) = &block.layout {
        if let Some(priority) = layout.priority {
            if priority > 9 && tables::name_for_priority(priority).is_none() {
                return Err(EncodeError::InvalidPriority {
                    uid: uid.to_owned(),
                    priority,
                });
            }
            push("priority", Modifier::Priority(priority))?;
        }
        if let Some(flex) = &layout.flex {
            push("flex", Modifier::Flex(flex.clone()))?;
        }
        if let Some(span) = &layout.span {
            push("span", Modifier::Span(span.clone()))?;
        }
    }

    if let Some(style) = &block.style {
        if let Some(color) = &style.color {
            push("color", Modifier::Color(color.clone()))?;
        }
        if let Some(condition) = &style.color_condition {
            push("color condition", Modifier::ColorCondition(condition.clone()))?;
        }
        if let Some(size) = &style.size {
            push("size", Modifier::Size(size.clone()))?;
        }
    }

    if let Some(signals) = &block.signals {
        for name in &signals.declare {
            push("signal declaration", Modifier::Declare(name.clone()))?;
        }
        if let Some(emit) = &signals.emit {
            let modifier = Modifier::Emit {
                name: emit.name.clone(),
                value: emit.value.clone(),
            };
            push("signal emit", modifier)?;
        }
        for name in signals.receive_names() {
            push("signal receive", Modifier::Receive(name.clone()))?;
        }
        if let Some(name) = &signals.both {
            push("signal emit/receive", Modifier::Both(name.clone()))?;
        }
        if let Some(layer) = signals.layer {
            push("layer trigger", Modifier::LayerTrigger(layer))?;
        }
    }

    let mut guard = None;
    if let Some(condition) = &block.condition {
        match (&condition.signal, &condition.value) {
            (Some(signal), value) => {
                let candidate = Guard {
                    signal: signal.clone(),
                    value: value.clone(),
                };
                checked(uid, "condition", guard_text(&candidate), Piece::Guard(candidate.clone()))?;
                guard = Some(candidate);
            }
            (None, Some(_)) => {
                return Err(EncodeError::ConditionWithoutSignal { uid: uid.to_owned() });
            }
            (None, None) => {}
        }
        if let Some(state) = &condition.state {
            push("state condition", Modifier::State(state.clone()))?;
        }
    }

    if let Some(action) = &block.action {
        push("action", Modifier::Action(action.clone()))?;
    }
    if let Some(stream) = &block.stream {
        push("stream", Modifier::Stream(stream.clone()))?;
    }
    if let Some(level) = &block.fidelity {
        push("fidelity", Modifier::Fidelity(level.clone()))?;
    }

    let children = match block.children() {
        [] => None,
        children => Some(children.iter().map(self::block).collect::<Result<_, _>>()?),
    };
    let survey = match &block.survey {
        Some(graph) => Some(survey::encode::survey(graph)?),
        None => None,
    };

    Ok(Block {
        range: NO_RANGE,
        ty,
        bindings,
        modifiers,
        guard,
        children,
        survey,
    })
}

fn type_syntax(block: &schema::Block) -> Result<TypeSyntax, EncodeError> {
    if block.ty == CUSTOM_TYPE {
        return match &block.component_id {
            Some(component_id) if !component_id.is_empty() => {
                Ok(TypeSyntax::Custom(component_id.clone()))
            }
            _ => Err(EncodeError::MissingComponentId {
                uid: block.uid.clone(),
            }),
        };
    }
    if let Some(index) = tables::index_for_type(&block.ty) {
        return Ok(TypeSyntax::Index(index));
    }
    if let Some(code) = tables::code_for_type(&block.ty) {
        return Ok(TypeSyntax::Code(code.to_owned()));
    }

    // Types without a code are written as their own capitalised name, which
    // only reads back if it looks like a code that is not already taken
    let mut chars = block.ty.chars();
    let code = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    if tables::looks_like_code(&code) && tables::type_for_code(&code) == block.ty {
        return Ok(TypeSyntax::Code(code));
    }

    Err(EncodeError::UnknownBlockType {
        uid: block.uid.clone(),
        ty: block.ty.clone(),
    })
}

/// The binding, followed by the label if it differs from the one the
/// binding implies.
fn bindings(block: &schema::Block) -> Result<Vec<Binding>, EncodeError> {
    let label = block.label.as_ref().map(|label| Binding::Literal(label.clone()));

    let binding = match &block.binding {
        None => return Ok(label.into_iter().collect()),
        Some(binding) => binding,
    };

    let (binding, implied_label) = match binding {
        schema::Binding::Indexed(indices) => {
            if indices.len() < 2 || indices.iter().any(|index| *index > 9) {
                return Err(EncodeError::InvalidIndices {
                    uid: block.uid.clone(),
                    indices: indices.clone(),
                });
            }
            let digits = indices.iter().map(|index| char::from(b'0' + index)).collect();
            (Binding::Indexed(digits), None)
        }
        schema::Binding::Field(path) => (Binding::Field(path.clone()), Some(field_to_label(path))),
        schema::Binding::Computed(expr) => (Binding::Computed(expr.clone()), None),
        schema::Binding::Literal(text) => (Binding::Literal(text.clone()), Some(text.clone())),
        schema::Binding::Iterator(name) => (Binding::Iterator(name.clone()), None),
        schema::Binding::IndexRef => (Binding::IndexRef, None),
    };
    checked(&block.uid, "binding", binding_text(&binding), Piece::Binding(binding.clone()))?;

    let mut bindings = vec![binding];
    if block.label.is_some() && block.label != implied_label {
        bindings.extend(label);
    }
    Ok(bindings)
}
