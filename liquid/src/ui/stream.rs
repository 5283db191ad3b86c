//! Incremental parsing of UI source text as it arrives in chunks, for
//! rendering documents while they are still being generated.
//!
//! The buffer is only reparsed up to its last *safe point*: a newline or
//! comma outside of any brackets, or a bracket that closes the outermost
//! list. Everything after the safe point is held back as pending text.

use codespan_reporting::diagnostic::Severity;

use crate::source;
use crate::ui::decode::{self, ROOT_UID};
use crate::ui::lexer::{self, Token};
use crate::ui::schema::{self, Schema};
use crate::ui::{Module, ParseMessage};

#[derive(Copy, Clone, Debug, Default)]
pub struct StreamOptions {
    /// Keep updating the schema after a structural error, instead of
    /// holding on to the last schema that parsed cleanly.
    pub lenient: bool,
}

#[derive(Clone, Debug)]
pub struct StreamingResult {
    pub schema: Schema,
    /// Whether every bracket, brace and string in the buffer was closed, with
    /// no text pending.
    pub complete: bool,
    /// Text after the last safe point, not yet reflected in the schema.
    pub pending: String,
    /// Messages from the most recent parse.
    pub errors: Vec<ParseMessage>,
    /// The byte offset of the last safe point.
    pub checkpoint: usize,
    pub block_count: usize,
}

type CheckpointFn = Box<dyn FnMut(&Schema, usize)>;

pub struct StreamingParser {
    options: StreamOptions,
    on_checkpoint: Option<CheckpointFn>,
    raw: String,
    /// The normalised contents of `raw`.
    text: String,
    parsed_end: usize,
    schema: Schema,
    errors: Vec<ParseMessage>,
    halted: bool,
    /// Top level blocks that have been reported to the checkpoint callback.
    completed: usize,
}

impl StreamingParser {
    pub fn new(options: StreamOptions) -> StreamingParser {
        StreamingParser {
            options,
            on_checkpoint: None,
            raw: String::new(),
            text: String::new(),
            parsed_end: 0,
            schema: Schema::default(),
            errors: Vec::new(),
            halted: false,
            completed: 0,
        }
    }

    /// Call `callback` each time a top level block is completed, with the
    /// schema and the number of top level blocks completed so far.
    pub fn on_checkpoint(&mut self, callback: impl FnMut(&Schema, usize) + 'static) {
        self.on_checkpoint = Some(Box::new(callback));
    }

    /// The text received so far.
    pub fn buffer(&self) -> &str {
        &self.text
    }

    pub fn feed(&mut self, chunk: &str) -> StreamingResult {
        self.raw.push_str(chunk);
        self.text = source::normalise(&self.raw);

        let scan = Scan::new(&self.text);
        if scan.safe_end > self.parsed_end {
            self.parsed_end = scan.safe_end;
            let (module, messages) = Module::parse(&self.text[..scan.safe_end]);
            self.advance(&module, messages);
        }

        self.result(&scan)
    }

    /// Parse everything received so far, closing any open strings, lists and
    /// surveys. The schema always has at least one layer.
    pub fn best_effort(&self) -> StreamingResult {
        let scan = Scan::new(&self.text);
        // Open strings are dropped entirely
        let text = match scan.open_string {
            Some(start) => &self.text[..start],
            None => &self.text,
        };
        let open = Scan::new(text).open;
        let (module, errors) = Module::parse(&format!("{text}{}", closers(&open)));

        let mut schema = decode::module(&module);
        if schema.layers.is_empty() {
            schema.layers.push(schema::Layer {
                id: 0,
                visible: true,
                root: schema::Block::new(ROOT_UID, "container"),
            });
        }

        StreamingResult {
            block_count: schema.block_count(),
            schema,
            errors,
            ..self.result(&scan)
        }
    }

    /// Parse the whole buffer, closing any open strings, lists and surveys.
    pub fn finalize(&mut self) -> StreamingResult {
        let scan = Scan::new(&self.text);
        let complete = scan.is_balanced();

        let mut patched = self.text.clone();
        if scan.open_string.is_some() {
            // A trailing backslash would escape the closing quote
            let backslashes = patched.chars().rev().take_while(|&ch| ch == '\\').count();
            if backslashes % 2 == 1 {
                patched.pop();
            }
            patched.push('"');
        }
        let open = Scan::new(&patched).open;
        patched.push_str(&closers(&open));

        let (module, messages) = Module::parse(&patched);
        self.errors = messages;
        self.schema = decode::module(&module);
        self.parsed_end = self.text.len();
        self.report_checkpoints(module.top_level_count());

        StreamingResult {
            schema: self.schema.clone(),
            complete,
            pending: String::new(),
            errors: self.errors.clone(),
            checkpoint: self.text.len(),
            block_count: self.schema.block_count(),
        }
    }

    pub fn reset(&mut self) {
        self.raw.clear();
        self.text.clear();
        self.parsed_end = 0;
        self.schema = Schema::default();
        self.errors.clear();
        self.halted = false;
        self.completed = 0;
    }

    fn advance(&mut self, module: &Module, messages: Vec<ParseMessage>) {
        let structural = messages.iter().any(|m| m.severity() >= Severity::Error);
        self.errors = messages;

        if self.halted {
            return;
        }
        if structural && !self.options.lenient {
            tracing::debug!(offset = self.parsed_end, "holding schema after a structural error");
            self.halted = true;
            return;
        }

        self.schema = decode::module(module);
        self.report_checkpoints(module.top_level_count());
    }

    fn report_checkpoints(&mut self, top_level_count: usize) {
        while self.completed < top_level_count {
            self.completed += 1;
            tracing::trace!(blocks = self.completed, "checkpoint");
            if let Some(callback) = &mut self.on_checkpoint {
                callback(&self.schema, self.completed);
            }
        }
    }

    fn result(&self, scan: &Scan) -> StreamingResult {
        let pending = &self.text[scan.safe_end..];
        StreamingResult {
            schema: self.schema.clone(),
            complete: scan.is_balanced() && pending.trim().is_empty(),
            pending: pending.to_owned(),
            errors: self.errors.clone(),
            checkpoint: scan.safe_end,
            block_count: self.schema.block_count(),
        }
    }
}

/// Where the buffer can be safely cut, and what is still open at its end.
struct Scan {
    safe_end: usize,
    /// The closing delimiters of open lists and surveys, innermost last.
    open: Vec<char>,
    /// The start of an unterminated string literal.
    open_string: Option<usize>,
}

impl Scan {
    fn new(text: &str) -> Scan {
        let mut scan = Scan {
            safe_end: 0,
            open: Vec::new(),
            open_string: None,
        };

        for result in lexer::tokens(text) {
            match result {
                Ok(spanned) => {
                    let end = spanned.range.end() as usize;
                    match spanned.token {
                        Token::OpenBracket => scan.open.push(']'),
                        Token::OpenBrace => scan.open.push('}'),
                        Token::CloseBracket | Token::CloseBrace => {
                            if scan.open.pop().is_some() && scan.open.is_empty() {
                                scan.safe_end = end;
                            }
                        }
                        Token::Comma | Token::Newline if scan.open.is_empty() => {
                            scan.safe_end = end;
                        }
                        _ => {}
                    }
                }
                Err(lexer::Error::UnterminatedString { range }) => {
                    scan.open_string = Some(range.start() as usize);
                }
                Err(lexer::Error::UnexpectedCharacter { .. }) => {}
            }
        }

        scan
    }

    fn is_balanced(&self) -> bool {
        self.open.is_empty() && self.open_string.is_none()
    }
}

fn closers(open: &[char]) -> String {
    open.iter().rev().collect()
}

/// Stream a whole document through a parser in one go.
pub fn parse_streaming(source: &str) -> StreamingResult {
    let mut parser = StreamingParser::new(StreamOptions::default());
    parser.feed(source);
    parser.finalize()
}

/// Feed a document to a parser in chunks of `chunk_size` bytes, returning
/// the result after each chunk followed by the result of finalizing.
pub fn simulate_streaming(source: &str, chunk_size: usize) -> Vec<StreamingResult> {
    let mut parser = StreamingParser::new(StreamOptions::default());
    let mut results = Vec::new();

    for chunk in chunks(source, chunk_size) {
        results.push(parser.feed(chunk));
    }
    results.push(parser.finalize());

    results
}

/// Split text into chunks of about `chunk_size` bytes, without splitting
/// characters.
pub fn chunks(source: &str, chunk_size: usize) -> impl Iterator<Item = &str> {
    let chunk_size = chunk_size.max(1);
    let mut start = 0;

    std::iter::from_fn(move || {
        if start >= source.len() {
            return None;
        }
        let mut end = (start + chunk_size).min(source.len());
        while !source.is_char_boundary(end) {
            end += 1;
        }
        let chunk = &source[start..end];
        start = end;
        Some(chunk)
    })
}
