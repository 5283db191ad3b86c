//! A file database for diagnostics, keyed by [`FileId`] rather than `usize`.

use std::fmt;
use std::num::NonZeroU32;
use std::ops::Range;

use codespan_reporting::files::Error;

use crate::source::LineIndex;

/// File id.
// `NonZeroU32` keeps `Option<FileId>` the same size as `FileId`
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FileId(NonZeroU32);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<u32> for FileId {
    type Error = <NonZeroU32 as TryFrom<u32>>::Error;

    fn try_from(value: u32) -> Result<FileId, Self::Error> {
        Ok(FileId(NonZeroU32::try_from(value)?))
    }
}

impl From<FileId> for usize {
    fn from(value: FileId) -> usize {
        value.0.get() as usize
    }
}

/// A named source file, with its line starts precomputed.
pub struct File {
    name: String,
    source: String,
    line_index: LineIndex,
}

impl File {
    pub fn new(name: String, source: String) -> File {
        let line_index = LineIndex::new(&source);
        File {
            name,
            source,
            line_index,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn line_index(&self) -> &LineIndex {
        &self.line_index
    }
}

#[derive(Default)]
pub struct Files {
    files: Vec<File>,
}

impl Files {
    pub fn new() -> Files {
        Files { files: Vec::new() }
    }

    /// Add a file to the database, returning the handle that can be used to
    /// refer to it again.
    pub fn add(&mut self, name: String, source: String) -> FileId {
        self.files.push(File::new(name, source));
        let len = u32::try_from(self.files.len()).unwrap_or(u32::MAX);
        match FileId::try_from(len) {
            Ok(file_id) => file_id,
            // `len` is at least one after the push above
            Err(_) => unreachable!("file ids start at one"),
        }
    }

    /// Get the file corresponding to the given id.
    pub fn get(&self, file_id: FileId) -> Result<&File, Error> {
        let index = usize::from(file_id) - 1;
        self.files.get(index).ok_or(Error::FileMissing)
    }
}

impl<'a> codespan_reporting::files::Files<'a> for Files {
    type FileId = FileId;
    type Name = &'a str;
    type Source = &'a str;

    fn name(&'a self, file_id: FileId) -> Result<&'a str, Error> {
        Ok(self.get(file_id)?.name())
    }

    fn source(&'a self, file_id: FileId) -> Result<&'a str, Error> {
        Ok(self.get(file_id)?.source())
    }

    fn line_index(&'a self, file_id: FileId, byte_index: usize) -> Result<usize, Error> {
        Ok(self.get(file_id)?.line_index().line_index(byte_index))
    }

    fn line_range(&'a self, file_id: FileId, line_index: usize) -> Result<Range<usize>, Error> {
        let file = self.get(file_id)?;
        let max = file.line_index().line_count().saturating_sub(1);
        file.line_index()
            .line_range(file.source(), line_index)
            .ok_or(Error::LineTooLarge {
                given: line_index,
                max,
            })
    }
}

#[cfg(test)]
mod tests {
    use codespan_reporting::files::Files as _;

    use super::*;

    #[test]
    fn file_ids_start_at_one() {
        let mut files = Files::new();
        let first = files.add("a.liquid".to_owned(), "Kp :a".to_owned());
        let second = files.add("b.survey".to_owned(), "> start".to_owned());

        assert_eq!(usize::from(first), 1);
        assert_eq!(usize::from(second), 2);
        assert_eq!(files.name(second).unwrap(), "b.survey");
        assert_eq!(files.source(first).unwrap(), "Kp :a");
    }

    #[test]
    fn line_lookups() {
        let mut files = Files::new();
        let file_id = files.add("a.liquid".to_owned(), "Kp :a\nBr :b".to_owned());

        assert_eq!(files.line_index(file_id, 7).unwrap(), 1);
        assert_eq!(files.line_range(file_id, 1).unwrap(), 6..11);
        assert!(files.line_range(file_id, 5).is_err());
    }
}
