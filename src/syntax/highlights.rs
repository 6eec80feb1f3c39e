//! Syntax highlighting data structures
//!
//! Defines the boundary events produced by the streaming highlighter, the
//! span list produced by the batch collector, and the per-line tokens a
//! renderer draws from.

use std::collections::HashMap;
use std::ops::Range;

use super::theme_table::Highlight;

/// One highlight boundary. `highlight` is `None` for the end of the most
/// recently opened highlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HighlightEvent {
    pub offset: usize,
    pub highlight: Option<Highlight>,
}

impl HighlightEvent {
    pub const fn start(offset: usize, highlight: Highlight) -> Self {
        Self {
            offset,
            highlight: Some(highlight),
        }
    }

    pub const fn end(offset: usize) -> Self {
        Self {
            offset,
            highlight: None,
        }
    }

    pub fn is_start(&self) -> bool {
        self.highlight.is_some()
    }
}

/// A highlighted byte range from the batch collector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightSpan {
    pub range: Range<usize>,
    pub highlight: Highlight,
    /// Language-qualified capture name, e.g. `javascript.string`
    pub capture_name: String,
    /// Injection depth of the layer that produced the span
    pub depth: usize,
}

/// A single highlighted span within a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightToken {
    /// Start column (0-indexed, inclusive)
    pub start_col: usize,
    /// End column (exclusive)
    pub end_col: usize,
    pub highlight: Highlight,
}

/// Highlight information for a single line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineHighlights {
    /// Non-overlapping tokens sorted by start_col
    pub tokens: Vec<HighlightToken>,
}

impl LineHighlights {
    /// Get the highlight for a given column, if any
    pub fn highlight_at(&self, col: usize) -> Option<Highlight> {
        for token in &self.tokens {
            if col >= token.start_col && col < token.end_col {
                return Some(token.highlight);
            }
            if token.start_col > col {
                break; // tokens are sorted, no need to continue
            }
        }
        None
    }
}

/// Complete highlight state for a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyntaxHighlights {
    /// Root language of the document
    pub language: String,
    /// Document revision this corresponds to
    pub revision: u64,
    /// Spans in the order their start events were emitted. Spans are well
    /// nested, so an enclosing span always precedes the spans inside it.
    pub spans: Vec<HighlightSpan>,
}

impl SyntaxHighlights {
    /// Create new empty highlights for a language
    pub fn new(language: impl Into<String>, revision: u64) -> Self {
        Self {
            language: language.into(),
            revision,
            spans: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Innermost highlight covering `offset`
    pub fn highlight_at(&self, offset: usize) -> Option<Highlight> {
        self.spans
            .iter()
            .take_while(|span| span.range.start <= offset)
            .filter(|span| span.range.contains(&offset))
            .last()
            .map(|span| span.highlight)
    }

    /// Flatten nested spans into disjoint byte segments, innermost highlight
    /// winning
    pub fn segments(&self) -> Vec<(Range<usize>, Highlight)> {
        fn push(out: &mut Vec<(Range<usize>, Highlight)>, range: Range<usize>, highlight: Highlight) {
            if range.start < range.end {
                out.push((range, highlight));
            }
        }

        let mut segments = Vec::new();
        let mut open: Vec<(usize, Highlight)> = Vec::new();
        let mut position = 0;

        for span in &self.spans {
            while let Some(&(end, highlight)) = open.last() {
                if end > span.range.start {
                    break;
                }
                push(&mut segments, position..end, highlight);
                position = position.max(end);
                open.pop();
            }
            if let Some(&(_, highlight)) = open.last() {
                push(&mut segments, position..span.range.start, highlight);
            }
            position = position.max(span.range.start);
            open.push((span.range.end, span.highlight));
        }
        while let Some((end, highlight)) = open.pop() {
            push(&mut segments, position..end, highlight);
            position = position.max(end);
        }

        segments
    }

    /// Per-line character-column tokens for `text`, keyed by 0-indexed line.
    /// Lines without highlights are absent.
    pub fn line_highlights(&self, text: &str) -> HashMap<usize, LineHighlights> {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, byte)| *byte == b'\n')
                .map(|(i, _)| i + 1),
        );

        let mut lines: HashMap<usize, LineHighlights> = HashMap::new();
        for (range, highlight) in self.segments() {
            let end = range.end.min(text.len());
            if range.start >= end {
                continue;
            }
            let first_row = line_starts.partition_point(|&start| start <= range.start) - 1;
            let last_row = line_starts.partition_point(|&start| start < end) - 1;

            for row in first_row..=last_row {
                let line_start = line_starts[row];
                let line_end = line_starts
                    .get(row + 1)
                    .map(|next| next - 1)
                    .unwrap_or(text.len());
                let line = text.get(line_start..line_end).unwrap_or_default();
                let start_byte = range.start.saturating_sub(line_start);
                let end_byte = (end - line_start).min(line.len());
                let start_col = byte_to_char_col(line, start_byte);
                let end_col = byte_to_char_col(line, end_byte);

                if start_col < end_col {
                    lines.entry(row).or_default().tokens.push(HighlightToken {
                        start_col,
                        end_col,
                        highlight,
                    });
                }
            }
        }

        lines
    }
}

/// Convert a byte column to a character column on a given line
fn byte_to_char_col(line: &str, byte_col: usize) -> usize {
    // Clamp to line length
    let byte_col = byte_col.min(line.len());
    // Find the nearest valid char boundary at or before byte_col
    let mut valid_byte = byte_col;
    while valid_byte > 0 && !line.is_char_boundary(valid_byte) {
        valid_byte -= 1;
    }
    line[..valid_byte].chars().count()
}
