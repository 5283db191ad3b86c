//! The JSON schema produced by compiling UI source text.
//!
//! Field names are camel case and optional fields are left out when empty,
//! so schemas can be handed straight to a renderer.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::survey::GraphSurvey;

pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub version: String,
    #[serde(default)]
    pub signals: Vec<Signal>,
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub surveys: Vec<GraphSurvey>,
}

impl Default for Schema {
    fn default() -> Schema {
        Schema {
            version: SCHEMA_VERSION.to_owned(),
            signals: Vec::new(),
            layers: Vec::new(),
            surveys: Vec::new(),
        }
    }
}

impl Schema {
    /// The number of blocks across all layers, counting nested children.
    pub fn block_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.root.count()).sum()
    }

    pub fn layer(&self, id: u32) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.id == id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: u32,
    pub visible: bool,
    pub root: Block,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    #[serde(default)]
    pub uid: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Style>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signals: Option<Signals>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<Stream>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fidelity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Block>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub survey: Option<GraphSurvey>,
}

impl Block {
    pub fn new(uid: impl Into<String>, ty: impl Into<String>) -> Block {
        Block {
            uid: uid.into(),
            ty: ty.into(),
            ..Block::default()
        }
    }

    /// The number of blocks in this tree, including this one.
    pub fn count(&self) -> usize {
        1 + self.children().iter().map(Block::count).sum::<usize>()
    }

    pub fn children(&self) -> &[Block] {
        self.children.as_deref().unwrap_or(&[])
    }
}

/// Where a block gets its data from. Serialized as `{"kind": ..., "value": ...}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBinding", into = "RawBinding")]
pub enum Binding {
    /// Column indices, each from 0 to 9.
    Indexed(Vec<u8>),
    Field(String),
    Computed(String),
    Literal(String),
    Iterator(String),
    IndexRef,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
enum BindingKind {
    Indexed,
    Field,
    Computed,
    Literal,
    Iterator,
    IndexRef,
}

#[derive(Serialize, Deserialize)]
struct RawBinding {
    kind: BindingKind,
    #[serde(default)]
    value: serde_json::Value,
}

impl TryFrom<RawBinding> for Binding {
    type Error = String;

    fn try_from(raw: RawBinding) -> Result<Binding, String> {
        use serde_json::Value;

        let text = |value: Value| match value {
            Value::String(text) => Ok(text),
            Value::Null => Ok(String::new()),
            value => Err(format!("expected a string binding value, found `{value}`")),
        };

        match raw.kind {
            BindingKind::Indexed => match raw.value {
                Value::Array(items) => (items.iter())
                    .map(|item| match item.as_u64() {
                        Some(index @ 0..=9) => Ok(index as u8),
                        _ => Err(format!("expected a column index from 0 to 9, found `{item}`")),
                    })
                    .collect::<Result<_, _>>()
                    .map(Binding::Indexed),
                value => Err(format!("expected an array of column indices, found `{value}`")),
            },
            BindingKind::Field => text(raw.value).map(Binding::Field),
            BindingKind::Computed => text(raw.value).map(Binding::Computed),
            BindingKind::Literal => text(raw.value).map(Binding::Literal),
            BindingKind::Iterator => text(raw.value).map(Binding::Iterator),
            BindingKind::IndexRef => Ok(Binding::IndexRef),
        }
    }
}

impl From<Binding> for RawBinding {
    fn from(binding: Binding) -> RawBinding {
        use serde_json::Value;

        let (kind, value) = match binding {
            Binding::Indexed(indices) => (
                BindingKind::Indexed,
                Value::Array(indices.into_iter().map(Value::from).collect()),
            ),
            Binding::Field(path) => (BindingKind::Field, Value::String(path)),
            Binding::Computed(expr) => (BindingKind::Computed, Value::String(expr)),
            Binding::Literal(text) => (BindingKind::Literal, Value::String(text)),
            Binding::Iterator(name) => (BindingKind::Iterator, Value::String(name)),
            Binding::IndexRef => (BindingKind::IndexRef, Value::String("#".to_owned())),
        };
        RawBinding { kind, value }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl Layout {
    pub fn is_empty(&self) -> bool {
        *self == Layout::default()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Span {
    Columns(u32),
    Named(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Style {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl Style {
    pub fn is_empty(&self) -> bool {
        *self == Style::default()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signals {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub declare: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emit: Option<Emit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive: Option<Receive>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub both: Option<String>,
    /// The layer this block opens when activated. Zero closes the current one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<u32>,
}

impl Signals {
    pub fn is_empty(&self) -> bool {
        *self == Signals::default()
    }

    pub fn receive_names(&self) -> &[String] {
        match &self.receive {
            None => &[],
            Some(receive) => receive.names(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emit {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// One signal name, or several.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Receive {
    One(String),
    Many(Vec<String>),
}

impl Receive {
    pub fn from_names(mut names: Vec<String>) -> Option<Receive> {
        match names.len() {
            0 => None,
            1 => names.pop().map(Receive::One),
            _ => Some(Receive::Many(names)),
        }
    }

    pub fn names(&self) -> &[String] {
        match self {
            Receive::One(name) => std::slice::from_ref(name),
            Receive::Many(names) => names,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// A state expression such as `hover?bold`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl Condition {
    pub fn is_empty(&self) -> bool {
        *self == Condition::default()
    }
}

/// Where a block gets live updates from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Stream {
    /// Refresh every `interval` milliseconds.
    Interval { interval: u64 },
    Ws { url: String },
    Sse { url: String },
    Poll,
}

/// Sources like `sse://https://host` name two protocols; the outer one picks
/// the stream kind and the inner one belongs to the url.
static DOUBLE_PROTOCOL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(sse|ws)://(https?|wss?)://(.+)$").unwrap());

static INTERVAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([0-9]+)(ms|s|m|h)?$").unwrap());

const UNITS: &[(&str, u64)] = &[("h", 3_600_000), ("m", 60_000), ("s", 1_000), ("ms", 1)];

impl Stream {
    /// Parse the text following a `~` sigil. Bare numbers count seconds.
    pub fn parse(text: &str) -> Option<Stream> {
        let normalised = DOUBLE_PROTOCOL.replace(text, "$1:$2://$3");
        let text = normalised.as_ref();

        if text == "poll" {
            return Some(Stream::Poll);
        }
        if let Some(captures) = INTERVAL.captures(text) {
            let count = captures[1].parse::<u64>().ok()?;
            let unit = captures.get(2).map_or("s", |unit| unit.as_str());
            let scale = UNITS.iter().find(|(name, _)| *name == unit)?.1;
            return count.checked_mul(scale).map(|interval| Stream::Interval { interval });
        }
        if text.starts_with("wss://") || text.starts_with("ws://") {
            return Some(Stream::Ws { url: text.to_owned() });
        }
        if text.starts_with("sse://") {
            return Some(Stream::Sse { url: text.to_owned() });
        }
        if let Some(url) = text.strip_prefix("ws:") {
            return (!url.is_empty()).then(|| Stream::Ws { url: url.to_owned() });
        }
        if let Some(url) = text.strip_prefix("sse:") {
            return (!url.is_empty()).then(|| Stream::Sse { url: url.to_owned() });
        }
        None
    }

    /// The text to write after a `~` sigil.
    pub fn to_source(&self) -> String {
        match self {
            Stream::Poll => "poll".to_owned(),
            Stream::Interval { interval: 0 } => "0ms".to_owned(),
            Stream::Interval { interval } => {
                let (unit, scale) = UNITS
                    .iter()
                    .find(|(_, scale)| interval % scale == 0)
                    .unwrap_or(&("ms", 1));
                format!("{}{unit}", interval / scale)
            }
            Stream::Ws { url } if url.starts_with("ws://") || url.starts_with("wss://") => {
                url.clone()
            }
            Stream::Ws { url } => format!("ws:{url}"),
            Stream::Sse { url } if url.starts_with("sse://") => url.clone(),
            Stream::Sse { url } => format!("sse:{url}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn blocks_skip_empty_fields() {
        let mut block = Block::new("b1", "kpi");
        block.binding = Some(Binding::Field("revenue".to_owned()));

        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({
                "uid": "b1",
                "type": "kpi",
                "binding": { "kind": "field", "value": "revenue" },
            }),
        );
    }

    #[test]
    fn bindings_from_json() {
        let indexed: Binding = serde_json::from_value(json!({"kind": "indexed", "value": [0, 1, 2]})).unwrap();
        assert_eq!(indexed, Binding::Indexed(vec![0, 1, 2]));

        let index_ref: Binding = serde_json::from_value(json!({"kind": "indexRef"})).unwrap();
        assert_eq!(index_ref, Binding::IndexRef);

        let out_of_range = serde_json::from_value::<Binding>(json!({"kind": "indexed", "value": [12]}));
        assert!(out_of_range.is_err());
    }

    #[test]
    fn receive_one_or_many() {
        assert_eq!(serde_json::to_value(Receive::One("a".to_owned())).unwrap(), json!("a"));
        let many: Receive = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert_eq!(many.names(), ["a", "b"]);
        assert_eq!(Receive::from_names(Vec::new()), None);
    }

    #[test]
    fn streams_are_tagged() {
        assert_eq!(
            serde_json::to_value(Stream::Interval { interval: 5000 }).unwrap(),
            json!({"type": "interval", "interval": 5000}),
        );
        assert_eq!(serde_json::to_value(Stream::Poll).unwrap(), json!({"type": "poll"}));
    }

    #[test]
    fn stream_sources() {
        assert_eq!(Stream::parse("5s"), Some(Stream::Interval { interval: 5000 }));
        assert_eq!(Stream::parse("500ms"), Some(Stream::Interval { interval: 500 }));
        assert_eq!(Stream::parse("2m"), Some(Stream::Interval { interval: 120_000 }));
        assert_eq!(Stream::parse("1h"), Some(Stream::Interval { interval: 3_600_000 }));
        assert_eq!(Stream::parse("30"), Some(Stream::Interval { interval: 30_000 }));
        assert_eq!(Stream::parse("poll"), Some(Stream::Poll));
        assert_eq!(
            Stream::parse("wss://feed.example/prices"),
            Some(Stream::Ws { url: "wss://feed.example/prices".to_owned() }),
        );
        assert_eq!(
            Stream::parse("sse://https://api.example/events"),
            Some(Stream::Sse { url: "https://api.example/events".to_owned() }),
        );
        assert_eq!(Stream::parse("bogus"), None);
        assert_eq!(Stream::parse("ws:"), None);
    }

    #[test]
    fn stream_source_units() {
        assert_eq!(Stream::Interval { interval: 5000 }.to_source(), "5s");
        assert_eq!(Stream::Interval { interval: 1500 }.to_source(), "1500ms");
        assert_eq!(Stream::Interval { interval: 7_200_000 }.to_source(), "2h");
        assert_eq!(Stream::Interval { interval: 0 }.to_source(), "0ms");
        assert_eq!(
            Stream::Sse { url: "https://api.example/events".to_owned() }.to_source(),
            "sse:https://api.example/events",
        );
    }
}
