//! Document text access for parsing and predicate evaluation
//!
//! The highlighter never owns document text. It reads it through
//! [`TextSource`], which the edit buffer implements.

use std::borrow::Cow;
use std::ops::Range;

use ropey::Rope;
use tree_sitter::{Node, TextProvider};

/// Upper bound on the number of bytes handed to the parser per read call
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Random-access, read-only view of a document's bytes
pub trait TextSource {
    /// Total document length in bytes
    fn len_bytes(&self) -> usize;

    /// Raw bytes in `range`. Out-of-bounds ranges are clamped.
    fn read_byte_range(&self, range: Range<usize>) -> Cow<'_, [u8]>;

    /// Decoded text of `range`, with invalid UTF-8 sequences replaced
    fn text_for_range(&self, range: Range<usize>) -> Cow<'_, str> {
        match self.read_byte_range(range) {
            Cow::Borrowed(bytes) => String::from_utf8_lossy(bytes),
            Cow::Owned(bytes) => Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()),
        }
    }

    /// Bytes starting at `offset`, at most [`READ_CHUNK_SIZE`] long.
    /// Empty once `offset` reaches the end of the document.
    fn read_chunk(&self, offset: usize) -> Cow<'_, [u8]> {
        let len = self.len_bytes();
        if offset >= len {
            return Cow::Borrowed(&[]);
        }
        self.read_byte_range(offset..len.min(offset + READ_CHUNK_SIZE))
    }
}

fn clamp(range: Range<usize>, len: usize) -> Range<usize> {
    let end = range.end.min(len);
    range.start.min(end)..end
}

impl TextSource for [u8] {
    fn len_bytes(&self) -> usize {
        self.len()
    }

    fn read_byte_range(&self, range: Range<usize>) -> Cow<'_, [u8]> {
        Cow::Borrowed(&self[clamp(range, self.len())])
    }
}

impl TextSource for str {
    fn len_bytes(&self) -> usize {
        self.len()
    }

    fn read_byte_range(&self, range: Range<usize>) -> Cow<'_, [u8]> {
        self.as_bytes().read_byte_range(range)
    }
}

impl TextSource for String {
    fn len_bytes(&self) -> usize {
        self.len()
    }

    fn read_byte_range(&self, range: Range<usize>) -> Cow<'_, [u8]> {
        self.as_bytes().read_byte_range(range)
    }
}

impl TextSource for Rope {
    fn len_bytes(&self) -> usize {
        self.len_bytes()
    }

    fn read_byte_range(&self, range: Range<usize>) -> Cow<'_, [u8]> {
        let range = clamp(range, Rope::len_bytes(self));
        if range.is_empty() {
            return Cow::Borrowed(&[]);
        }

        // Serve from a single chunk when the range doesn't cross a chunk boundary
        let (chunk, chunk_start, _, _) = self.chunk_at_byte(range.start);
        let local = range.start - chunk_start..range.end - chunk_start;
        if local.end <= chunk.len() {
            return Cow::Borrowed(&chunk.as_bytes()[local]);
        }

        let mut bytes = Vec::with_capacity(range.len());
        let mut offset = range.start;
        while offset < range.end {
            let (chunk, chunk_start, _, _) = self.chunk_at_byte(offset);
            let take = (range.end - chunk_start).min(chunk.len());
            bytes.extend_from_slice(&chunk.as_bytes()[offset - chunk_start..take]);
            offset = chunk_start + take;
        }
        Cow::Owned(bytes)
    }

    fn read_chunk(&self, offset: usize) -> Cow<'_, [u8]> {
        if offset >= Rope::len_bytes(self) {
            return Cow::Borrowed(&[]);
        }
        let (chunk, chunk_start, _, _) = self.chunk_at_byte(offset);
        let bytes = &chunk.as_bytes()[offset - chunk_start..];
        Cow::Borrowed(&bytes[..bytes.len().min(READ_CHUNK_SIZE)])
    }
}

impl<T: TextSource + ?Sized> TextSource for &T {
    fn len_bytes(&self) -> usize {
        (**self).len_bytes()
    }

    fn read_byte_range(&self, range: Range<usize>) -> Cow<'_, [u8]> {
        (**self).read_byte_range(range)
    }

    fn text_for_range(&self, range: Range<usize>) -> Cow<'_, str> {
        (**self).text_for_range(range)
    }

    fn read_chunk(&self, offset: usize) -> Cow<'_, [u8]> {
        (**self).read_chunk(offset)
    }
}

/// Adapts a [`TextSource`] to tree-sitter's text provider so the query cursor
/// can evaluate its built-in text predicates
pub(crate) struct NodeText<'a, S: ?Sized>(pub &'a S);

impl<'a, S: TextSource + ?Sized> TextProvider<Cow<'a, [u8]>> for NodeText<'a, S> {
    type I = std::iter::Once<Cow<'a, [u8]>>;

    fn text(&mut self, node: Node) -> Self::I {
        std::iter::once(self.0.read_byte_range(node.byte_range()))
    }
}
