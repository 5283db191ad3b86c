//! Compilers for LiquidCode, a pair of compact description languages:
//!
//! - the [UI dialect](ui), describing dashboards and forms as trees of
//!   blocks, compiled to and from [`ui::Schema`]s
//! - the [survey dialect](survey), describing branching question flows,
//!   compiled to and from [`survey::GraphSurvey`]s
//!
//! Both compilers work in both directions, and schemas survive being
//! written out as source text and read back in.

use serde::Serialize;

pub mod driver;
pub mod files;
mod pretty;
pub mod reporting;
pub mod source;
pub mod survey;
pub mod ui;

pub use driver::{Driver, Status};

/// The result of comparing a schema with its reconstruction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub is_equivalent: bool,
    pub differences: Vec<String>,
}

impl Comparison {
    pub fn new(differences: Vec<String>) -> Comparison {
        Comparison {
            is_equivalent: differences.is_empty(),
            differences,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Dialect {
    Ui,
    Survey,
}

impl Dialect {
    /// Guess the dialect of some source text. Surveys start with a node
    /// sigil, or have a `---` line separating their header before any `{`.
    /// A leading `?@` is a guarded UI block.
    pub fn detect(source: &str) -> Dialect {
        let lines = source.lines().map(str::trim);
        let first = lines.clone().find(|line| !line.is_empty() && !line.starts_with("//"));
        let separated = lines.take_while(|line| !line.contains('{')).any(|line| line == "---");

        match first {
            Some(line) if line.starts_with(['>', '?', '!', '<']) && !line.starts_with("?@") => {
                Dialect::Survey
            }
            _ if separated => Dialect::Survey,
            _ => Dialect::Ui,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dialect::Ui => "ui",
            Dialect::Survey => "survey",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialects() {
        assert_eq!(Dialect::detect("Kp :revenue #green !h"), Dialect::Ui);
        assert_eq!(Dialect::detect("@tab\nCn [Bt >tab=1]"), Dialect::Ui);
        assert_eq!(Dialect::detect("?@tab=1 Kp :revenue"), Dialect::Ui);
        assert_eq!(Dialect::detect("\n// welcome\n> start -> end\n< end"), Dialect::Survey);
        assert_eq!(Dialect::detect("nps \"NPS\"\n---\n> s"), Dialect::Survey);
        assert_eq!(Dialect::detect("Cd Survey {\n  nps\n  ---\n  > s\n}"), Dialect::Ui);
        assert_eq!(Dialect::detect(""), Dialect::Ui);
    }

    #[test]
    fn comparisons() {
        assert!(Comparison::new(Vec::new()).is_equivalent);
        let comparison = Comparison::new(vec!["id mismatch: \"a\" vs \"b\"".to_owned()]);
        assert_eq!(
            serde_json::to_value(&comparison).unwrap(),
            serde_json::json!({
                "isEquivalent": false,
                "differences": ["id mismatch: \"a\" vs \"b\""],
            }),
        );
    }
}
