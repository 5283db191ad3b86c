//! The UI dialect: a compact, sigil-prefixed description of component trees.
//!
//! ```text
//! @tab
//! Kp :revenue #green !h
//! Cn [Bt "Overview" >tab=1, Bt "Details" >/1]
//!
//! /1 Md "Details" [Tx :summary]
//! ```
//!
//! Source text is [scanned](lexer) and [parsed](Module::parse) into a
//! [`Module`], [decoded](decode) into a [`Schema`], and schemas can be
//! [encoded](encode) back into canonical source text.

use std::fmt;

use crate::source::ByteRange;
use crate::survey;

pub mod compare;
pub mod decode;
pub mod encode;
pub mod lexer;
mod parser;
pub mod pretty;
pub mod schema;
pub mod stream;
pub mod tables;

pub use self::compare::{compare, field_to_label, Comparison};
pub use self::encode::EncodeError;
pub use self::parser::ParseMessage;
pub use self::schema::Schema;

/// A parsed UI document.
#[derive(Clone, Debug, Default)]
pub struct Module {
    /// Signals declared at the top level.
    pub signals: Vec<SignalDecl>,
    /// Surveys embedded at the top level.
    pub surveys: Vec<survey::Module>,
    /// Blocks of the main layer, in source order.
    pub blocks: Vec<Block>,
    /// Numbered overlay layers.
    pub layers: Vec<Layer>,
}

#[derive(Clone, Debug)]
pub struct SignalDecl {
    pub range: ByteRange,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct Layer {
    pub range: ByteRange,
    pub id: u32,
    pub root: Block,
}

#[derive(Clone, Debug)]
pub struct Block {
    pub range: ByteRange,
    pub ty: TypeSyntax,
    pub bindings: Vec<Binding>,
    pub modifiers: Vec<Modifier>,
    /// A guard of the form `?@signal=value` written before the block.
    pub guard: Option<Guard>,
    pub children: Option<Vec<Block>>,
    pub survey: Option<survey::Module>,
}

impl Block {
    /// The number of blocks in this tree, including this one.
    pub fn count(&self) -> usize {
        1 + self.children.iter().flatten().map(Block::count).sum::<usize>()
    }
}

/// How the type of a block was written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeSyntax {
    /// A lone digit, `0` to `9`.
    Index(u8),
    /// A type code like `Kp` or `Bt`.
    Code(String),
    /// `Custom "component-id"`.
    Custom(String),
}

impl TypeSyntax {
    /// The block type this syntax stands for.
    pub fn name(&self) -> String {
        match self {
            TypeSyntax::Index(index) => match tables::type_for_index(*index) {
                Some(ty) => ty.to_owned(),
                None => tables::TYPE_INDICES[0].to_owned(),
            },
            TypeSyntax::Code(code) => tables::type_for_code(code),
            TypeSyntax::Custom(_) => CUSTOM_TYPE.to_owned(),
        }
    }
}

pub const CUSTOM_KEYWORD: &str = "Custom";
pub const CUSTOM_TYPE: &str = "custom";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Binding {
    /// A run of column indices, like `0123`.
    Indexed(String),
    /// `:path.to.field`
    Field(String),
    /// `:.` or `:.field`
    Iterator(String),
    /// `:#`
    IndexRef,
    /// `=expression`
    Computed(String),
    /// `"text"`
    Literal(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Modifier {
    Priority(u32),
    Action(String),
    Flex(String),
    Span(schema::Span),
    Color(String),
    ColorCondition(String),
    Size(String),
    Declare(String),
    Emit { name: String, value: Option<String> },
    /// `>/N`, or `/<` for layer zero.
    LayerTrigger(u32),
    Receive(String),
    Both(String),
    /// `:state?expression`
    State(String),
    Stream(schema::Stream),
    Fidelity(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Guard {
    pub signal: String,
    pub value: Option<String>,
}

impl Module {
    /// Parse a module from source text. Parsing never fails outright: any
    /// problems are returned as messages alongside a best-effort module.
    pub fn parse(source: &str) -> (Module, Vec<ParseMessage>) {
        parser::parse(source)
    }

    /// The number of blocks in the module, counting nested children.
    pub fn block_count(&self) -> usize {
        let main = self.blocks.iter().map(Block::count).sum::<usize>();
        let layers = self.layers.iter().map(|layer| layer.root.count()).sum::<usize>();
        main + layers
    }

    /// The number of top-level blocks: main blocks plus layers.
    pub fn top_level_count(&self) -> usize {
        self.blocks.len() + self.layers.len()
    }
}

/// The result of compiling UI source text.
#[derive(Debug)]
pub struct Output {
    pub schema: Schema,
    pub messages: Vec<ParseMessage>,
}

/// Compile UI source text into a schema.
///
/// Unterminated string literals are fatal, as there is no way to tell where
/// the author meant the string to end. Everything else is recovered from and
/// reported in [`Output::messages`].
pub fn parse(source: &str) -> Result<Output, ParseMessage> {
    let source = crate::source::normalise(source);
    let (module, messages) = Module::parse(&source);

    if let Some(fatal) = messages.iter().find(|message| message.is_fatal()) {
        return Err(fatal.clone());
    }

    Ok(Output {
        schema: decode::module(&module),
        messages,
    })
}

/// Compile a schema into canonical UI source text.
pub fn encode(schema: &Schema) -> Result<String, EncodeError> {
    let module = encode::module(schema)?;
    Ok(pretty::render(&module))
}

/// A schema compiled to text, parsed back, and compared with the original.
#[derive(Debug)]
pub struct Roundtrip {
    pub source: String,
    pub reconstructed: Schema,
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
            RoundtripError::Encode(error) => write!(f, "failed to encode schema: {error}"),
            RoundtripError::Parse(message) => write!(f, "failed to parse encoded schema: {message}"),
        }
    }
}

impl std::error::Error for RoundtripError {}

impl From<EncodeError> for RoundtripError {
    fn from(error: EncodeError) -> RoundtripError {
        RoundtripError::Encode(error)
    }
}

pub fn roundtrip(schema: &Schema) -> Result<Roundtrip, RoundtripError> {
    let source = encode(schema)?;
    let output = parse(&source).map_err(RoundtripError::Parse)?;
    let comparison = compare(schema, &output.schema);

    Ok(Roundtrip {
        source,
        reconstructed: output.schema,
        comparison,
    })
}
