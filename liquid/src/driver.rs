use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};
use codespan_reporting::term::termcolor::{BufferedStandardStream, ColorChoice, WriteColor};
use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;
use std::rc::Rc;

use crate::files::{FileId, Files};
use crate::reporting::Message;
use crate::source::{BytePos, ByteRange, LineIndex};
use crate::ui::stream::{self, StreamOptions, StreamingParser};
use crate::{survey, ui, Comparison, Dialect};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    pub fn exit_code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Error => 1,
        }
    }
}

pub struct Driver {
    files: Files,

    allow_errors: bool,
    seen_errors: RefCell<bool>,
    codespan_config: codespan_reporting::term::Config,
    diagnostic_writer: RefCell<Box<dyn WriteColor>>,

    emit_width: usize,
    emit_writer: RefCell<Box<dyn WriteColor>>,
}

impl Default for Driver {
    fn default() -> Driver {
        Driver::new()
    }
}

fn color_choice(stream: atty::Stream) -> ColorChoice {
    match atty::is(stream) {
        true => ColorChoice::Auto,
        false => ColorChoice::Never,
    }
}

impl Driver {
    pub fn new() -> Driver {
        Driver {
            files: Files::new(),

            allow_errors: false,
            seen_errors: RefCell::new(false),
            codespan_config: codespan_reporting::term::Config::default(),
            diagnostic_writer: RefCell::new(Box::new(BufferedStandardStream::stderr(
                color_choice(atty::Stream::Stderr),
            ))),

            emit_width: usize::MAX,
            emit_writer: RefCell::new(Box::new(BufferedStandardStream::stdout(
                color_choice(atty::Stream::Stdout),
            ))),
        }
    }

    /// Setup a global panic hook
    pub fn install_panic_hook(&self) {
        let term_config = self.codespan_config.clone();
        let default_hook = std::panic::take_hook();

        std::panic::set_hook(Box::new(move |info| {
            let message = if let Some(message) = info.payload().downcast_ref::<String>() {
                message.as_str()
            } else if let Some(message) = info.payload().downcast_ref::<&str>() {
                message
            } else {
                "unknown panic type"
            };

            let diagnostic = Diagnostic::bug()
                .with_message(format!("compiler panicked at '{message}'"))
                .with_notes(vec![match info.location() {
                    Some(location) => format!("panicked at: {location}"),
                    None => "panicked at: unknown location".to_owned(),
                }]);

            let mut writer = BufferedStandardStream::stderr(color_choice(atty::Stream::Stderr));
            let no_files = Files::new();

            default_hook(info);
            eprintln!();
            // Nothing more can be done if this fails
            let _ = codespan_reporting::term::emit(&mut writer, &term_config, &no_files, &diagnostic);
        }));
    }

    /// Set to true if we should attempt to continue after encountering errors
    pub fn set_allow_errors(&mut self, allow_errors: bool) {
        self.allow_errors = allow_errors;
    }

    /// Set the writer to use when rendering diagnostics
    pub fn set_diagnostic_writer(&mut self, stream: impl 'static + WriteColor) {
        self.diagnostic_writer = RefCell::new(Box::new(stream) as Box<dyn WriteColor>);
    }

    /// Set the width of summary lines
    pub fn set_emit_width(&mut self, emit_width: usize) {
        self.emit_width = emit_width;
    }

    /// Set the writer to use when emitting source text and schemas
    pub fn set_emit_writer(&mut self, stream: impl 'static + WriteColor) {
        self.emit_writer = RefCell::new(Box::new(stream) as Box<dyn WriteColor>);
    }

    /// Load a source string into the file database, normalising its line
    /// endings so that diagnostics line up with what gets parsed.
    pub fn load_source_string(&mut self, name: String, source: String) -> FileId {
        self.files.add(name, crate::source::normalise(&source))
    }

    /// Load a source file into the file database using a reader.
    pub fn load_source(&mut self, name: String, mut reader: impl Read) -> Option<FileId> {
        let mut source = String::new();
        match reader.read_to_string(&mut source) {
            Ok(_) => Some(self.load_source_string(name, source)),
            Err(error) => {
                self.emit_read_diagnostic(name, error);
                None
            }
        }
    }

    /// Load a source file into the file database from the given path.
    pub fn load_source_path(&mut self, path: &Path) -> Option<FileId> {
        match std::fs::File::open(path) {
            Ok(file) => self.load_source(path.display().to_string(), file),
            Err(error) => {
                self.emit_read_diagnostic(path.display(), error);
                None
            }
        }
    }

    /// The dialect of a source file, unless one was asked for.
    pub fn dialect(&self, file_id: FileId, dialect: Option<Dialect>) -> Dialect {
        dialect.unwrap_or_else(|| {
            let dialect = Dialect::detect(self.source(file_id));
            tracing::debug!(dialect = dialect.name(), "detected dialect");
            dialect
        })
    }

    pub fn emit_tokens(&mut self, file_id: FileId, dialect: Option<Dialect>) -> Status {
        let source = self.source(file_id);
        let line = |position: &dyn fmt::Display, description: &str, token: &dyn fmt::Display| {
            format!("{:<8} {description:<20} {token}", position.to_string())
        };

        let (lines, errors) = match self.dialect(file_id, dialect) {
            Dialect::Ui => {
                let (tokens, errors) = ui::lexer::scan(source);
                let lines = (tokens.iter())
                    .filter(|spanned| spanned.token != ui::lexer::Token::Eof)
                    .map(|spanned| line(&spanned.position, spanned.token.description(), &spanned.token))
                    .join("\n");
                (lines, errors)
            }
            Dialect::Survey => {
                let (tokens, errors) = survey::lexer::scan(source);
                let lines = (tokens.iter())
                    .filter(|spanned| spanned.token != survey::lexer::Token::Eof)
                    .map(|spanned| line(&spanned.position, spanned.token.description(), &spanned.token))
                    .join("\n");
                (lines, errors)
            }
        };

        self.emit_diagnostics(errors.iter().map(|error| error.to_diagnostic(file_id)));
        self.emit_text(&lines);

        self.status()
    }

    /// Compile source text, emitting the schema as JSON.
    pub fn parse_and_emit_schema(&mut self, file_id: FileId, dialect: Option<Dialect>) -> Status {
        match self.dialect(file_id, dialect) {
            Dialect::Ui => {
                let Some(module) = self.parse_ui(file_id) else {
                    return Status::Error;
                };
                if self.should_stop() {
                    return Status::Error;
                }
                self.emit_json(&ui::decode::module(&module));
            }
            Dialect::Survey => {
                let Some(module) = self.parse_survey(file_id) else {
                    return Status::Error;
                };
                if self.should_stop() {
                    return Status::Error;
                }
                self.emit_json(&survey::decode::module(&module));
            }
        }

        Status::Ok
    }

    /// Reprint source text in canonical form.
    pub fn format_and_emit_source(&mut self, file_id: FileId, dialect: Option<Dialect>) -> Status {
        let source = match self.dialect(file_id, dialect) {
            Dialect::Ui => self.parse_ui(file_id).map(|module| ui::pretty::render(&module)),
            Dialect::Survey => self.parse_survey(file_id).map(|module| survey::pretty::render(&module)),
        };

        match source {
            Some(source) if !self.should_stop() => {
                self.emit_text(&source);
                Status::Ok
            }
            _ => Status::Error,
        }
    }

    /// Compile a JSON schema into source text.
    pub fn compile_and_emit_source(&mut self, file_id: FileId, dialect: Option<Dialect>) -> Status {
        let Some((value, dialect)) = self.read_schema(file_id, dialect) else {
            return Status::Error;
        };

        let source = match dialect {
            Dialect::Ui => self
                .deserialize::<ui::Schema>(file_id, value)
                .and_then(|schema| self.encoded(dialect, ui::encode(&schema))),
            Dialect::Survey => self
                .deserialize::<survey::GraphSurvey>(file_id, value)
                .and_then(|survey| self.encoded(dialect, survey::encode(&survey))),
        };

        match source {
            Some(source) => {
                self.emit_text(&source);
                Status::Ok
            }
            None => Status::Error,
        }
    }

    /// Compile a JSON schema into source text, read it back in, and compare
    /// the result with the original.
    pub fn roundtrip_and_emit(&mut self, file_id: FileId, dialect: Option<Dialect>) -> Status {
        let Some((value, dialect)) = self.read_schema(file_id, dialect) else {
            return Status::Error;
        };

        let roundtrip = match dialect {
            Dialect::Ui => self.deserialize::<ui::Schema>(file_id, value).map(|schema| {
                ui::roundtrip(&schema)
                    .map(|roundtrip| (roundtrip.source, roundtrip.comparison))
                    .map_err(|error| error.to_string())
            }),
            Dialect::Survey => self.deserialize::<survey::GraphSurvey>(file_id, value).map(|survey| {
                survey::roundtrip(&survey)
                    .map(|roundtrip| (roundtrip.source, roundtrip.comparison))
                    .map_err(|error| error.to_string())
            }),
        };

        let (source, comparison) = match roundtrip {
            None => return Status::Error,
            Some(Err(error)) => {
                self.emit_diagnostic(Diagnostic::error().with_message(error));
                return Status::Error;
            }
            Some(Ok(roundtrip)) => roundtrip,
        };

        self.emit_text(&source);
        self.emit_json(&comparison);
        self.emit_comparison(&comparison);

        match comparison.is_equivalent {
            true => Status::Ok,
            false => Status::Error,
        }
    }

    /// Report problems in source text, followed by a one line summary.
    pub fn check(&mut self, file_id: FileId, dialect: Option<Dialect>) -> Status {
        let dialect = self.dialect(file_id, dialect);
        let source = self.source(file_id);

        let (messages, size) = match dialect {
            Dialect::Ui => {
                let (module, messages) = ui::Module::parse(source);
                let messages: Vec<_> = messages.into_iter().map(Message::from).collect();
                (messages, plural(module.block_count(), "block"))
            }
            Dialect::Survey => {
                let (module, messages) = survey::Module::parse(source);
                let messages: Vec<_> = messages.into_iter().map(Message::from).collect();
                (messages, plural(module.nodes.len(), "node"))
            }
        };

        let count = |severity: Severity| messages.iter().filter(|m| m.severity() == severity).count();
        let (errors, warnings) = (count(Severity::Error), count(Severity::Warning));
        self.emit_messages(file_id, messages.iter());

        let name = self.files.get(file_id).map_or("<unknown>", |file| file.name());
        self.emit_text(&format!(
            "{name}: {} dialect, {size}, {}, {}",
            dialect.name(),
            plural(errors, "error"),
            plural(warnings, "warning"),
        ));

        self.status()
    }

    /// Feed UI source text to a streaming parser in chunks, emitting a line
    /// for each chunk and each checkpoint, then the final schema.
    pub fn stream_and_emit(
        &mut self,
        file_id: FileId,
        dialect: Option<Dialect>,
        chunk_size: usize,
        lenient: bool,
    ) -> Status {
        if self.dialect(file_id, dialect) == Dialect::Survey {
            self.emit_diagnostic(
                Diagnostic::error().with_message("only UI documents can be streamed"),
            );
            return Status::Error;
        }

        let source = self.source(file_id).to_owned();
        let checkpoints = Rc::new(RefCell::new(Vec::new()));
        let mut parser = StreamingParser::new(StreamOptions { lenient });
        parser.on_checkpoint({
            let checkpoints = checkpoints.clone();
            move |_, count| checkpoints.borrow_mut().push(count)
        });

        for (index, chunk) in stream::chunks(&source, chunk_size).enumerate() {
            let result = parser.feed(chunk);
            let summary = format!(
                "chunk {index}: {} bytes parsed, {} blocks, {} pending",
                result.checkpoint,
                result.block_count,
                plural(result.pending.len(), "byte"),
            );
            self.emit_text(&self.truncate(summary));
            self.emit_checkpoints(&checkpoints);
        }

        let result = parser.finalize();
        self.emit_checkpoints(&checkpoints);
        self.emit_messages(file_id, result.errors.iter().cloned().map(Message::from).collect_vec().iter());
        if self.should_stop() {
            return Status::Error;
        }

        self.emit_json(&result.schema);
        Status::Ok
    }

    fn emit_checkpoints(&self, checkpoints: &RefCell<Vec<usize>>) {
        for count in checkpoints.borrow_mut().drain(..) {
            self.emit_text(&format!("checkpoint: {count} top level {} complete", plural_word(count, "block")));
        }
    }

    fn source(&self, file_id: FileId) -> &str {
        self.files.get(file_id).map_or("", |file| file.source())
    }

    fn should_stop(&self) -> bool {
        *self.seen_errors.borrow() && !self.allow_errors
    }

    fn status(&self) -> Status {
        match self.should_stop() {
            true => Status::Error,
            false => Status::Ok,
        }
    }

    /// Parse a UI document, returning nothing if it cannot be read at all.
    fn parse_ui(&self, file_id: FileId) -> Option<ui::Module> {
        let (module, messages) = ui::Module::parse(self.source(file_id));
        let fatal = messages.iter().any(ui::ParseMessage::is_fatal);
        self.emit_messages(file_id, messages.into_iter().map(Message::from).collect_vec().iter());

        (!fatal).then_some(module)
    }

    fn parse_survey(&self, file_id: FileId) -> Option<survey::Module> {
        let (module, messages) = survey::Module::parse(self.source(file_id));
        let fatal = messages.iter().any(survey::ParseMessage::is_fatal);
        self.emit_messages(file_id, messages.into_iter().map(Message::from).collect_vec().iter());

        (!fatal).then_some(module)
    }

    /// Read a JSON schema, working out its dialect from its shape unless one
    /// was asked for: surveys have `nodes`.
    fn read_schema(&self, file_id: FileId, dialect: Option<Dialect>) -> Option<(Value, Dialect)> {
        let source = self.source(file_id);
        match serde_json::from_str::<Value>(source) {
            Ok(value) => {
                let dialect = dialect.unwrap_or(match value.get("nodes") {
                    Some(_) => Dialect::Survey,
                    None => Dialect::Ui,
                });
                Some((value, dialect))
            }
            Err(error) => {
                let offset = json_offset(source, error.line(), error.column());
                let range = ByteRange::new(offset, offset);
                self.emit_diagnostic(
                    Diagnostic::error()
                        .with_message("invalid JSON")
                        .with_labels(vec![Label::primary(file_id, range).with_message(error.to_string())]),
                );
                None
            }
        }
    }

    fn deserialize<T: DeserializeOwned>(&self, file_id: FileId, value: Value) -> Option<T> {
        match serde_json::from_value(value) {
            Ok(value) => Some(value),
            Err(error) => {
                let name = self.files.get(file_id).map_or("<unknown>", |file| file.name());
                self.emit_diagnostic(
                    Diagnostic::error().with_message(format!("`{name}` is not a valid schema: {error}")),
                );
                None
            }
        }
    }

    fn encoded<E: fmt::Display>(&self, dialect: Dialect, result: Result<String, E>) -> Option<String> {
        match result {
            Ok(source) => Some(source),
            Err(error) => {
                self.emit_diagnostic(Diagnostic::error().with_message(format!(
                    "cannot write {} schema as source text: {error}",
                    dialect.name(),
                )));
                None
            }
        }
    }

    fn emit_comparison(&self, comparison: &Comparison) {
        if !comparison.is_equivalent {
            self.emit_diagnostic(
                Diagnostic::error()
                    .with_message("schema changed when read back from source text")
                    .with_notes(comparison.differences.clone()),
            );
        }
    }

    fn truncate(&self, mut line: String) -> String {
        if line.chars().count() > self.emit_width {
            let end = line.char_indices().nth(self.emit_width.saturating_sub(3)).map_or(line.len(), |(i, _)| i);
            line.truncate(end);
            line.push_str("...");
        }
        line
    }

    fn emit_text(&self, text: &str) {
        let mut emit_writer = self.emit_writer.borrow_mut();
        if let Err(error) = writeln!(emit_writer, "{text}").and_then(|()| emit_writer.flush()) {
            tracing::warn!(%error, "failed to write output");
        }
    }

    fn emit_json(&self, value: &impl Serialize) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => self.emit_text(&text),
            Err(error) => self.emit_diagnostic(
                Diagnostic::bug().with_message(format!("failed to serialize output: {error}")),
            ),
        }
    }

    fn emit_messages<'a>(&self, file_id: FileId, messages: impl Iterator<Item = &'a Message>) {
        self.emit_diagnostics(messages.map(|message| message.to_diagnostic(file_id)));
    }

    fn emit_diagnostic(&self, diagnostic: Diagnostic<FileId>) {
        let mut writer = self.diagnostic_writer.borrow_mut();
        let config = &self.codespan_config;

        let result = codespan_reporting::term::emit(&mut *writer, config, &self.files, &diagnostic);
        if let Err(error) = result.map_err(|error| error.to_string()).and_then(|()| {
            writer.flush().map_err(|error| error.to_string())
        }) {
            tracing::warn!(%error, "failed to write diagnostic");
        }

        if diagnostic.severity >= Severity::Error {
            *self.seen_errors.borrow_mut() = true;
        }
    }

    fn emit_diagnostics(&self, diagnostics: impl Iterator<Item = Diagnostic<FileId>>) {
        for diagnostic in diagnostics {
            self.emit_diagnostic(diagnostic);
        }
    }

    fn emit_read_diagnostic(&self, name: impl fmt::Display, error: std::io::Error) {
        let diagnostic =
            Diagnostic::error().with_message(format!("couldn't read `{name}`: {error}"));
        self.emit_diagnostic(diagnostic);
    }
}

/// The byte offset of a one-based line and column reported by `serde_json`.
fn json_offset(source: &str, line: usize, column: usize) -> BytePos {
    let line_index = LineIndex::new(source);
    let start = (line_index.line_range(source, line.saturating_sub(1)))
        .map_or(source.len(), |range| range.start);
    let offset = (start + column.saturating_sub(1)).min(source.len());
    BytePos::try_from(offset).unwrap_or(BytePos::MAX)
}

fn plural(count: usize, word: &str) -> String {
    format!("{count} {}", plural_word(count, word))
}

fn plural_word(count: usize, word: &str) -> String {
    match count {
        1 => word.to_owned(),
        _ => format!("{word}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codespan_reporting::term::termcolor::{Buffer, NoColor};
    use std::sync::{Arc, Mutex};

    /// A writer whose contents can be read after the driver is done with it.
    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Shared {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn driver() -> (Driver, Shared, Shared) {
        let (output, diagnostics) = (Shared::default(), Shared::default());
        let mut driver = Driver::new();
        driver.set_emit_writer(NoColor::new(output.clone()));
        driver.set_diagnostic_writer(NoColor::new(diagnostics.clone()));
        (driver, output, diagnostics)
    }

    #[test]
    fn parse_ui() {
        let (mut driver, output, diagnostics) = driver();
        let file_id = driver.load_source_string("a.liquid".to_owned(), "Kp :revenue #green !h".to_owned());

        assert_eq!(driver.parse_and_emit_schema(file_id, None), Status::Ok);
        let schema: Value = serde_json::from_str(&output.contents()).unwrap();
        assert_eq!(schema["layers"][0]["root"]["type"], "kpi");
        assert_eq!(diagnostics.contents(), "");
    }

    #[test]
    fn format_survey() {
        let (mut driver, output, _) = driver();
        let file_id = driver.load_source_string("a.survey".to_owned(), "> s \"Hi\" -> e\r\n< e".to_owned());

        assert_eq!(driver.format_and_emit_source(file_id, None), Status::Ok);
        assert_eq!(output.contents(), "> s \"Hi\" -> e\n\n< e\n");
    }

    #[test]
    fn errors_stop_output() {
        let (mut driver, output, diagnostics) = driver();
        let file_id = driver.load_source_string("a.survey".to_owned(), "> s -> nowhere".to_owned());

        assert_eq!(driver.parse_and_emit_schema(file_id, None), Status::Error);
        assert_eq!(output.contents(), "");
        assert!(diagnostics.contents().contains("transition to unknown node `nowhere`"));

        driver.set_allow_errors(true);
        assert_eq!(driver.parse_and_emit_schema(file_id, None), Status::Ok);
        assert!(output.contents().contains("\"startNodeId\": \"s\""));
    }

    #[test]
    fn compile_detects_surveys() {
        let (mut driver, output, _) = driver();
        let json = r#"{"startNodeId": "s", "nodes": {"s": {"type": "start", "next": [{"nodeId": "e"}]}, "e": {"type": "end"}}}"#;
        let file_id = driver.load_source_string("a.json".to_owned(), json.to_owned());

        assert_eq!(driver.compile_and_emit_source(file_id, None), Status::Ok);
        assert_eq!(output.contents(), "> s -> e\n\n< e\n");
    }

    #[test]
    fn invalid_json() {
        let (mut driver, _, diagnostics) = driver();
        let file_id = driver.load_source_string("a.json".to_owned(), "{\n  \"layers\": [,]\n}".to_owned());

        assert_eq!(driver.compile_and_emit_source(file_id, None), Status::Error);
        assert!(diagnostics.contents().contains("invalid JSON"));
        assert!(diagnostics.contents().contains("a.json:2:"));
    }

    #[test]
    fn checks() {
        let (mut driver, output, _) = driver();
        let file_id = driver.load_source_string("a.survey".to_owned(), "> s -> e\n< e".to_owned());

        assert_eq!(driver.check(file_id, None), Status::Ok);
        assert_eq!(output.contents(), "a.survey: survey dialect, 2 nodes, 0 errors, 0 warnings\n");
    }

    #[test]
    fn json_offsets() {
        assert_eq!(json_offset("{\n  ]", 2, 3), 4);
        assert_eq!(json_offset("{", 9, 9), 1);
    }

    #[test]
    fn buffers_are_writers() {
        let mut driver = Driver::new();
        driver.set_emit_writer(Buffer::no_color());
        let file_id = driver.load_source_string("a.liquid".to_owned(), "Kp".to_owned());
        assert_eq!(driver.emit_tokens(file_id, Some(Dialect::Ui)), Status::Ok);
    }
}
