//! Types related to source text: byte offsets, ranges and line/column
//! positions.

use std::fmt;
use std::ops::Range;

/// Byte offsets into source text.
pub type BytePos = u32;

/// The largest source text we can address with a [`BytePos`].
pub const MAX_SOURCE_LEN: usize = u32::MAX as usize;

/// Byte ranges in source text.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct ByteRange {
    start: BytePos,
    end: BytePos,
}

impl fmt::Debug for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteRange({}..{})", self.start, self.end)
    }
}

impl ByteRange {
    pub const fn new(start: BytePos, end: BytePos) -> ByteRange {
        ByteRange { start, end }
    }

    pub const fn start(&self) -> BytePos {
        self.start
    }

    pub const fn end(&self) -> BytePos {
        self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn merge(self, other: ByteRange) -> ByteRange {
        ByteRange::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Move the range forwards by `offset` bytes. Used when a sub-document is
    /// compiled separately and its messages need to point into the outer
    /// source.
    pub fn shift(self, offset: BytePos) -> ByteRange {
        ByteRange::new(self.start + offset, self.end + offset)
    }
}

impl From<ByteRange> for Range<usize> {
    fn from(range: ByteRange) -> Range<usize> {
        (range.start as usize)..(range.end as usize)
    }
}

/// A one-based line and column in source text. Columns count characters,
/// not bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The starting offsets of each line in some source text.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> LineIndex {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(index, _)| index + 1))
            .collect();
        LineIndex { line_starts }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// The zero-based line containing `byte_index`.
    pub fn line_index(&self, byte_index: usize) -> usize {
        match self.line_starts.binary_search(&byte_index) {
            Ok(line) => line,
            Err(next_line) => next_line - 1,
        }
    }

    /// The byte range of the zero-based line `line_index`, including its
    /// trailing newline. Returns `None` past the end of the source.
    pub fn line_range(&self, source: &str, line_index: usize) -> Option<Range<usize>> {
        let start = *self.line_starts.get(line_index)?;
        let end = match self.line_starts.get(line_index + 1) {
            Some(next_start) => *next_start,
            None => source.len(),
        };
        Some(start..end)
    }

    pub fn position(&self, source: &str, byte_index: usize) -> Position {
        let byte_index = byte_index.min(source.len());
        let line = self.line_index(byte_index);
        let line_start = self.line_starts[line];
        let column = source
            .get(line_start..byte_index)
            .map_or(byte_index - line_start, |prefix| prefix.chars().count());

        Position {
            line: line as u32 + 1,
            column: column as u32 + 1,
        }
    }
}

/// Clean up source text before scanning:
///
/// - a leading byte order mark is removed
/// - `\r\n` and lone `\r` line endings become `\n`
/// - control characters other than `\n` and `\t` are removed
pub fn normalise(source: &str) -> String {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let mut output = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                output.push('\n');
            }
            '\n' | '\t' => output.push(ch),
            ch if ch.is_control() => {}
            ch => output.push(ch),
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// `ByteRange` is stored on every token. Ensure it doesn't grow accidentally.
    fn byte_range_size() {
        assert_eq!(std::mem::size_of::<ByteRange>(), 8);
    }

    #[test]
    fn positions_are_one_based() {
        let source = "Kp :a\n  Br :b\n";
        let index = LineIndex::new(source);

        assert_eq!(index.line_count(), 3);
        assert_eq!(index.position(source, 0), Position { line: 1, column: 1 });
        assert_eq!(index.position(source, 3), Position { line: 1, column: 4 });
        assert_eq!(index.position(source, 8), Position { line: 2, column: 3 });
        assert_eq!(index.position(source, 14), Position { line: 3, column: 1 });
    }

    #[test]
    fn positions_count_characters() {
        let source = "Tx \"héllo\" #red";
        let index = LineIndex::new(source);
        let offset = source.find('#').unwrap();

        assert_eq!(index.position(source, offset), Position { line: 1, column: 12 });
    }

    #[test]
    fn line_ranges() {
        let source = "a\nbc\n";
        let index = LineIndex::new(source);

        assert_eq!(index.line_range(source, 0), Some(0..2));
        assert_eq!(index.line_range(source, 1), Some(2..5));
        assert_eq!(index.line_range(source, 2), Some(5..5));
        assert_eq!(index.line_range(source, 3), None);
    }

    #[test]
    fn normalise_line_endings_and_controls() {
        assert_eq!(normalise("\u{feff}Kp\r\nBr\rLn"), "Kp\nBr\nLn");
        assert_eq!(normalise("Tx\u{0}\t\"a\u{7}\""), "Tx\t\"a\"");
    }
}
