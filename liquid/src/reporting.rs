//! Messages from either dialect, for presenting to users.
//!
//! The driver turns these into [`Diagnostic`]s. Callers without a file
//! database can resolve them against their source with
//! [`Message::position`] or [`reports`] instead.

use codespan_reporting::diagnostic::{Diagnostic, Severity};
use serde::Serialize;
use std::fmt;

use crate::files::FileId;
use crate::source::{ByteRange, LineIndex, Position};
use crate::{survey, ui};

#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Ui(ui::ParseMessage),
    Survey(survey::ParseMessage),
}

impl From<ui::ParseMessage> for Message {
    fn from(message: ui::ParseMessage) -> Message {
        Message::Ui(message)
    }
}

impl From<survey::ParseMessage> for Message {
    fn from(message: survey::ParseMessage) -> Message {
        Message::Survey(message)
    }
}

impl Message {
    pub fn range(&self) -> ByteRange {
        match self {
            Message::Ui(message) => message.range(),
            Message::Survey(message) => message.range(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Message::Ui(message) => message.severity(),
            Message::Survey(message) => message.severity(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        match self {
            Message::Ui(message) => message.is_fatal(),
            Message::Survey(message) => message.is_fatal(),
        }
    }

    /// Where the message starts in `source`.
    pub fn position(&self, source: &str) -> Position {
        LineIndex::new(source).position(source, self.range().start() as usize)
    }

    pub fn to_diagnostic(&self, file_id: FileId) -> Diagnostic<FileId> {
        match self {
            Message::Ui(message) => message.to_diagnostic(file_id),
            Message::Survey(message) => message.to_diagnostic(file_id),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Ui(message) => message.fmt(f),
            Message::Survey(message) => message.fmt(f),
        }
    }
}

/// A message resolved against its source text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Report {
    pub severity: &'static str,
    pub message: String,
    pub line: u32,
    pub column: u32,
}

pub fn reports<'a>(source: &str, messages: impl IntoIterator<Item = &'a Message>) -> Vec<Report> {
    let line_index = LineIndex::new(source);
    (messages.into_iter())
        .map(|message| {
            let position = line_index.position(source, message.range().start() as usize);
            Report {
                severity: severity_name(message.severity()),
                message: message.to_string(),
                line: position.line,
                column: position.column,
            }
        })
        .collect()
}

fn severity_name(severity: Severity) -> &'static str {
    match severity {
        Severity::Bug => "bug",
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Note => "note",
        Severity::Help => "help",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions() {
        let source = "Kp :a\nBr :b \"oops";
        let (_, messages) = ui::Module::parse(source);
        let fatal: Vec<_> = (messages.into_iter())
            .map(Message::from)
            .filter(Message::is_fatal)
            .collect();

        let reports = reports(source, &fatal);
        assert_eq!(
            reports,
            [Report {
                severity: "error",
                message: "unterminated string literal".to_owned(),
                line: 2,
                column: 7,
            }],
        );
    }

    #[test]
    fn survey_messages() {
        let source = "> start\n  -> nowhere";
        let (_, messages) = survey::Module::parse(source);
        let message = Message::from(messages[0].clone());

        assert_eq!(message.severity(), Severity::Error);
        assert_eq!(message.position(source), Position { line: 2, column: 6 });
        assert_eq!(message.to_string(), "transition to unknown node `nowhere`");
    }
}
