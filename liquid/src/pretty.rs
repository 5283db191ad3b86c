//! A document allocator shared by the pretty printers of both dialects.
//!
//! The printers themselves live in [`crate::ui::pretty`] and
//! [`crate::survey::pretty`] as inherent methods on [`Context`].

use pretty::{Doc, DocAllocator, DocBuilder, DocPtr, RefDoc};
use scoped_arena::Scope;

pub struct Context<'arena> {
    scope: &'arena Scope<'arena>,
}

impl<'arena> Context<'arena> {
    pub fn new(scope: &'arena Scope<'arena>) -> Context<'arena> {
        Context { scope }
    }

    /// Documents separated by hard line breaks.
    pub fn lines(
        &'arena self,
        docs: impl IntoIterator<Item = DocBuilder<'arena, Self>>,
    ) -> DocBuilder<'arena, Self> {
        self.intersperse(docs, self.hardline())
    }

    /// Lines of preformatted text, indented by `indent` spaces. Blank lines
    /// stay blank.
    pub fn indented_text(&'arena self, text: &str, indent: usize) -> DocBuilder<'arena, Self> {
        self.lines(text.lines().map(|line| match line {
            "" => self.nil(),
            line => self.text(format!("{:indent$}{line}", "")),
        }))
    }

    /// A comma separated list between brackets, kept on one line.
    pub fn list(
        &'arena self,
        docs: impl IntoIterator<Item = DocBuilder<'arena, Self>>,
    ) -> DocBuilder<'arena, Self> {
        self.concat([
            self.text("["),
            self.intersperse(docs, self.text(", ")),
            self.text("]"),
        ])
    }
}

const WIDTH: usize = 80;

/// Render a document. Both dialects only use hard line breaks, so the width
/// has no effect on the output.
pub fn render<'arena>(doc: DocBuilder<'arena, Context<'arena>>) -> String {
    doc.into_doc().pretty(WIDTH).to_string()
}

impl<'arena, A: 'arena> DocAllocator<'arena, A> for Context<'arena> {
    type Doc = RefDoc<'arena, A>;

    #[inline]
    fn alloc(&'arena self, doc: Doc<'arena, Self::Doc, A>) -> Self::Doc {
        RefDoc(match doc {
            // Common documents are given static references
            Doc::Nil => &Doc::Nil,
            Doc::Hardline => &Doc::Hardline,
            Doc::Fail => &Doc::Fail,
            Doc::BorrowedText(" ") => &Doc::BorrowedText(" "),

            Doc::BorrowedText("[") => &Doc::BorrowedText("["),
            Doc::BorrowedText("]") => &Doc::BorrowedText("]"),
            Doc::BorrowedText("{") => &Doc::BorrowedText("{"),
            Doc::BorrowedText("}") => &Doc::BorrowedText("}"),
            Doc::BorrowedText(", ") => &Doc::BorrowedText(", "),
            Doc::BorrowedText(": ") => &Doc::BorrowedText(": "),
            Doc::BorrowedText("->") => &Doc::BorrowedText("->"),
            Doc::BorrowedText("*") => &Doc::BorrowedText("*"),
            Doc::BorrowedText("---") => &Doc::BorrowedText("---"),
            Doc::BorrowedText("Survey") => &Doc::BorrowedText("Survey"),

            _ => self.scope.to_scope(doc),
        })
    }

    fn alloc_column_fn(
        &'arena self,
        f: impl 'arena + Fn(usize) -> Self::Doc,
    ) -> <Self::Doc as DocPtr<'arena, A>>::ColumnFn {
        self.scope.to_scope(f)
    }

    fn alloc_width_fn(
        &'arena self,
        f: impl 'arena + Fn(isize) -> Self::Doc,
    ) -> <Self::Doc as DocPtr<'arena, A>>::WidthFn {
        self.scope.to_scope(f)
    }
}
