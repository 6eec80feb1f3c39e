//! Merging layers into one highlight stream
//!
//! [`Highlighter::highlight`] builds the layer forest for a document and
//! returns a [`HighlightIter`] that repeatedly advances whichever layer has
//! the smallest sort key, so events from independently advancing layers come
//! out in position order and well nested. [`Highlighter::collect`] drains the
//! same stream into a [`SyntaxHighlights`].

use tree_sitter::{Parser, QueryCursor, Range};

use super::cancel::CancellationToken;
use super::highlights::{HighlightEvent, HighlightSpan, SyntaxHighlights};
use super::language_config::LanguageConfiguration;
use super::layer::{full_range, intersect_ranges, process_layers, LayerContext, LayerIterator};
use super::text::TextSource;
use super::theme_table::Highlight;
use crate::error::HighlightError;

/// Captures processed between two cancellation checks
pub const CANCELLATION_CHECK_INTERVAL: usize = 100;

/// Reusable parser and query cursors for highlight passes
pub struct Highlighter {
    parser: Parser,
    cursors: Vec<QueryCursor>,
    cancellation_check_interval: usize,
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Highlighter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Highlighter")
            .field("cursors", &self.cursors.len())
            .field(
                "cancellation_check_interval",
                &self.cancellation_check_interval,
            )
            .finish()
    }
}

impl Highlighter {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            cursors: Vec::new(),
            cancellation_check_interval: CANCELLATION_CHECK_INTERVAL,
        }
    }

    pub fn with_cancellation_check_interval(mut self, interval: usize) -> Self {
        self.cancellation_check_interval = interval.max(1);
        self
    }

    /// Stream highlight events for the whole of `source`
    pub fn highlight<'h, 'c, S, F>(
        &'h mut self,
        config: &'c LanguageConfiguration,
        source: &'h S,
        cancel: &'h CancellationToken,
        resolve: F,
    ) -> Result<HighlightIter<'h, 'c, S, F>, HighlightError>
    where
        S: TextSource + ?Sized,
        F: Fn(&str) -> Option<&'c LanguageConfiguration>,
    {
        self.highlight_ranges(config, source, vec![full_range()], cancel, resolve)
    }

    /// Stream highlight events for `source` restricted to `ranges`, which
    /// must be sorted and non-overlapping
    pub fn highlight_ranges<'h, 'c, S, F>(
        &'h mut self,
        config: &'c LanguageConfiguration,
        source: &'h S,
        ranges: Vec<Range>,
        cancel: &'h CancellationToken,
        resolve: F,
    ) -> Result<HighlightIter<'h, 'c, S, F>, HighlightError>
    where
        S: TextSource + ?Sized,
        F: Fn(&str) -> Option<&'c LanguageConfiguration>,
    {
        if ranges.is_empty() {
            return Err(HighlightError::InvalidRanges {
                language: config.name.clone(),
            });
        }

        let check_interval = self.cancellation_check_interval;
        let layers = {
            let mut context = LayerContext {
                parser: &mut self.parser,
                cursors: &mut self.cursors,
                source,
                cancel,
                check_interval,
            };
            process_layers(ranges, config, None, 0, &mut context, &resolve)?
        };
        if cancel.is_cancelled() {
            return Err(HighlightError::Cancelled);
        }

        tracing::debug!(
            "Highlighting {} ({} bytes) with {} initial layers",
            config.name,
            source.len_bytes(),
            layers.len()
        );

        let mut iter = HighlightIter {
            highlighter: self,
            source,
            cancel,
            resolve,
            layers: Vec::with_capacity(layers.len()),
            iter_count: 0,
            check_interval,
            last_highlight_range: None,
            done: false,
        };
        for layer in layers {
            iter.insert_layer(layer);
        }
        iter.sort_layers();
        Ok(iter)
    }

    /// Highlight the whole of `source` into a span list
    pub fn collect<'c, S, F>(
        &mut self,
        config: &'c LanguageConfiguration,
        source: &S,
        cancel: &CancellationToken,
        resolve: F,
        revision: u64,
    ) -> Result<SyntaxHighlights, HighlightError>
    where
        S: TextSource + ?Sized,
        F: Fn(&str) -> Option<&'c LanguageConfiguration>,
    {
        let mut highlights = SyntaxHighlights::new(config.name.clone(), revision);
        let mut iter = self.highlight(config, source, cancel, resolve)?;
        let mut open: Vec<usize> = Vec::new();

        while let Some(boundary) = iter.next_boundary() {
            match boundary? {
                Boundary::Start {
                    offset,
                    highlight,
                    language,
                    capture_name,
                    depth,
                } => {
                    open.push(highlights.spans.len());
                    highlights.spans.push(HighlightSpan {
                        range: offset..offset,
                        highlight,
                        capture_name: format!("{}.{}", language, capture_name),
                        depth,
                    });
                }
                Boundary::End { offset } => {
                    if let Some(index) = open.pop() {
                        highlights.spans[index].range.end = offset;
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(HighlightError::Cancelled);
        }
        Ok(highlights)
    }
}

/// An emitted boundary with the detail the batch collector records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Boundary<'a> {
    Start {
        offset: usize,
        highlight: Highlight,
        language: &'a str,
        capture_name: &'a str,
        depth: usize,
    },
    End {
        offset: usize,
    },
}

/// Pull-based stream of [`HighlightEvent`]s.
///
/// Yields `Err(HighlightError::Cancelled)` once if the token is cancelled
/// mid-stream, then ends.
pub struct HighlightIter<'h, 'c, S: ?Sized, F> {
    highlighter: &'h mut Highlighter,
    source: &'h S,
    cancel: &'h CancellationToken,
    resolve: F,
    /// Sorted by sort key, smallest first
    layers: Vec<LayerIterator<'c>>,
    iter_count: usize,
    check_interval: usize,
    last_highlight_range: Option<(usize, usize, usize)>,
    done: bool,
}

impl<'h, 'c, S, F> HighlightIter<'h, 'c, S, F>
where
    S: TextSource + ?Sized,
    F: Fn(&str) -> Option<&'c LanguageConfiguration>,
{
    /// Move the first layer to its place among the (already sorted) rest,
    /// dropping exhausted layers
    fn sort_layers(&mut self) {
        while !self.layers.is_empty() {
            if let Some(sort_key) = self.layers[0].sort_key() {
                let mut i = 0;
                while i + 1 < self.layers.len() {
                    if let Some(next_key) = self.layers[i + 1].sort_key() {
                        if next_key < sort_key {
                            i += 1;
                            continue;
                        }
                    }
                    break;
                }
                if i > 0 {
                    self.layers[0..=i].rotate_left(1);
                }
                break;
            }
            let layer = self.layers.remove(0);
            tracing::trace!("Finished {} layer at depth {}", layer.config.name, layer.depth);
        }
    }

    /// Insert a new layer after the first one, keeping the rest sorted
    fn insert_layer(&mut self, mut layer: LayerIterator<'c>) {
        let Some(sort_key) = layer.sort_key() else {
            return;
        };
        let mut i = 1;
        while i < self.layers.len() {
            match self.layers[i].sort_key() {
                Some(key) if key > sort_key => {
                    self.layers.insert(i, layer);
                    return;
                }
                Some(_) => i += 1,
                None => {
                    self.layers.remove(i);
                }
            }
        }
        self.layers.push(layer);
    }

    fn cancelled(&mut self) -> Option<Result<Boundary<'c>, HighlightError>> {
        self.done = true;
        self.layers.clear();
        Some(Err(HighlightError::Cancelled))
    }

    fn emit_end(&mut self, offset: usize) -> Option<Result<Boundary<'c>, HighlightError>> {
        self.sort_layers();
        Some(Ok(Boundary::End { offset }))
    }

    pub(crate) fn next_boundary(&mut self) -> Option<Result<Boundary<'c>, HighlightError>> {
        if self.done {
            return None;
        }

        'main: loop {
            self.iter_count += 1;
            if self.iter_count >= self.check_interval {
                self.iter_count = 0;
                if self.cancel.is_cancelled() {
                    return self.cancelled();
                }
            }

            let Some(layer) = self.layers.first_mut() else {
                self.done = true;
                return None;
            };

            let Some(first) = layer.peek_capture() else {
                // Only highlight ends remain on this layer
                match layer.highlight_end_stack.pop() {
                    Some(end) => return self.emit_end(end),
                    None => {
                        self.layers.remove(0);
                        continue;
                    }
                }
            };

            let start = first.node.range.start_byte;
            if let Some(&end) = layer.highlight_end_stack.last() {
                if end <= start {
                    layer.highlight_end_stack.pop();
                    return self.emit_end(end);
                }
            }
            layer.next_capture();

            let config = layer.config;

            if config.is_injection_pattern(first.pattern_index) {
                let injection = layer.injection_for_match(first.slot, self.source);
                layer.remove_match(first.slot);
                let depth = layer.depth;
                let ranges = match injection.language.as_deref() {
                    Some(language) if !language.is_empty() && !injection.nodes.is_empty() => {
                        match (self.resolve)(language) {
                            Some(child) => Some((
                                child,
                                intersect_ranges(
                                    &layer.ranges,
                                    &injection.nodes,
                                    injection.include_children,
                                ),
                            )),
                            None => {
                                tracing::debug!(
                                    "No language configuration for injection {:?}",
                                    language
                                );
                                None
                            }
                        }
                    }
                    _ => None,
                };

                if let Some((child_config, ranges)) = ranges {
                    if !ranges.is_empty() {
                        let new_layers = {
                            let mut context = LayerContext {
                                parser: &mut self.highlighter.parser,
                                cursors: &mut self.highlighter.cursors,
                                source: self.source,
                                cancel: self.cancel,
                                check_interval: self.check_interval,
                            };
                            process_layers(
                                ranges,
                                child_config,
                                Some(config),
                                depth + 1,
                                &mut context,
                                &self.resolve,
                            )
                        };
                        match new_layers {
                            Ok(new_layers) => {
                                for new_layer in new_layers {
                                    self.insert_layer(new_layer);
                                }
                            }
                            Err(e) => {
                                tracing::error!("Skipping {} injection: {}", child_config.name, e);
                            }
                        }
                        if self.cancel.is_cancelled() {
                            return self.cancelled();
                        }
                    }
                }

                self.sort_layers();
                continue 'main;
            }

            let range = first.node.byte_range();
            layer.scope_stack.pop_finished(range.start);

            let mut capture = first;
            let mut reference_highlight = None;
            let mut definition = None;
            while capture.pattern_index < config.highlights_pattern_index {
                if Some(capture.index) == config.local_scope_capture_index {
                    definition = None;
                    let inherits = match config
                        .query
                        .property_value(capture.pattern_index, "local.scope-inherits")
                    {
                        Some(Some(value)) => value == "true",
                        _ => true,
                    };
                    layer.scope_stack.push_scope(range.clone(), inherits);
                } else if Some(capture.index) == config.local_def_capture_index {
                    reference_highlight = None;
                    let name = self.source.text_for_range(range.clone());
                    let value_range = layer
                        .capture_in_match(capture.slot, config.local_def_value_capture_index)
                        .map(|node| node.byte_range())
                        .unwrap_or(0..0);
                    definition = Some(layer.scope_stack.define(name, value_range));
                } else if Some(capture.index) == config.local_ref_capture_index
                    && definition.is_none()
                {
                    let name = self.source.text_for_range(range.clone());
                    reference_highlight = layer.scope_stack.resolve_reference(&name, range.start);
                }

                match layer.next_capture_on_node(&capture) {
                    Some(next) => capture = next,
                    None => {
                        self.sort_layers();
                        continue 'main;
                    }
                }
            }

            // Highlight patterns marked `(#is-not? local)` don't apply to locals
            let is_local = definition.is_some() || reference_highlight.is_some();
            let mut has_highlight = true;
            while is_local && config.is_non_local_variable_pattern(capture.pattern_index) {
                has_highlight = false;
                if let Some(next) = layer.next_capture_on_node(&capture) {
                    capture = next;
                    has_highlight = true;
                    continue;
                }
                break;
            }

            if has_highlight {
                // The first highlight pattern for a node wins
                while layer.next_capture_on_node(&capture).is_some() {}

                let current_highlight = config.highlight_for_capture(capture.index);
                if let Some(definition) = definition {
                    layer
                        .scope_stack
                        .resolve_definition(definition, current_highlight);
                }

                if let Some(highlight) = reference_highlight.or(current_highlight) {
                    if let Some((last_start, last_end, last_depth)) = self.last_highlight_range {
                        if range.start == last_start
                            && range.end == last_end
                            && layer.depth < last_depth
                        {
                            self.sort_layers();
                            continue 'main;
                        }
                    }
                    self.last_highlight_range = Some((range.start, range.end, layer.depth));

                    let depth = layer.depth;
                    let mut end = range.end;
                    if let Some(&open_end) = layer.highlight_end_stack.last() {
                        end = end.min(open_end);
                    }
                    // A node of a combined layer may span the gap between two
                    // of its ranges
                    if let Some(layer_range) = layer.ranges.iter().find(|layer_range| {
                        layer_range.start_byte <= range.start && range.start < layer_range.end_byte
                    }) {
                        end = end.min(layer_range.end_byte);
                    }
                    // Highlights open on other layers started at or before this one
                    if let Some(open_end) = self.layers[1..]
                        .iter()
                        .filter_map(|other| other.highlight_end_stack.last().copied())
                        .filter(|&open_end| open_end > range.start)
                        .min()
                    {
                        end = end.min(open_end);
                    }
                    self.layers[0].highlight_end_stack.push(end);

                    let boundary = Boundary::Start {
                        offset: range.start,
                        highlight,
                        language: config.name.as_str(),
                        capture_name: config.capture_name(capture.index),
                        depth,
                    };
                    self.sort_layers();
                    return Some(Ok(boundary));
                }
            }

            self.sort_layers();
        }
    }
}

impl<'c, S, F> Iterator for HighlightIter<'_, 'c, S, F>
where
    S: TextSource + ?Sized,
    F: Fn(&str) -> Option<&'c LanguageConfiguration>,
{
    type Item = Result<HighlightEvent, HighlightError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_boundary().map(|boundary| {
            boundary.map(|boundary| match boundary {
                Boundary::Start {
                    offset, highlight, ..
                } => HighlightEvent::start(offset, highlight),
                Boundary::End { offset } => HighlightEvent::end(offset),
            })
        })
    }
}

impl<S: ?Sized, F> std::fmt::Debug for HighlightIter<'_, '_, S, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HighlightIter")
            .field("layers", &self.layers)
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::theme_table::HighlightThemeTable;

    fn javascript(injections: &str, locals: &str, highlights: &str) -> LanguageConfiguration {
        LanguageConfiguration::new(
            tree_sitter_javascript::LANGUAGE.into(),
            "javascript",
            injections,
            locals,
            highlights,
        )
        .unwrap()
    }

    fn events(
        config: &LanguageConfiguration,
        source: &str,
    ) -> Result<Vec<HighlightEvent>, HighlightError> {
        let mut highlighter = Highlighter::new();
        let cancel = CancellationToken::new();
        highlighter
            .highlight(config, source, &cancel, |_| None)?
            .collect()
    }

    #[test]
    fn test_single_identifier() {
        let config = javascript("", "", "(identifier) @variable");
        config.set_highlight_configuration(&HighlightThemeTable::from_names([
            "comment", "keyword", "string", "variable",
        ]));

        assert_eq!(
            events(&config, "abcd").unwrap(),
            vec![HighlightEvent::start(0, Highlight(3)), HighlightEvent::end(4)]
        );
    }

    #[test]
    fn test_unthemed_captures_emit_nothing() {
        let config = javascript("", "", "(identifier) @variable");
        assert!(events(&config, "abcd").unwrap().is_empty());
    }

    #[test]
    fn test_first_pattern_wins_for_a_node() {
        let config = javascript("", "", "(identifier) @function\n(identifier) @variable");
        config.set_highlight_configuration(&HighlightThemeTable::from_names([
            "variable", "function",
        ]));

        assert_eq!(
            events(&config, "abcd").unwrap(),
            vec![HighlightEvent::start(0, Highlight(1)), HighlightEvent::end(4)]
        );
    }

    #[test]
    fn test_events_are_nested() {
        let config = javascript("", "", "(call_expression) @function.call\n(identifier) @variable\n(number) @number");
        config.set_highlight_configuration(&HighlightThemeTable::from_names([
            "function", "variable", "number",
        ]));

        let events = events(&config, "f(1)").unwrap();
        assert_eq!(
            events,
            vec![
                HighlightEvent::start(0, Highlight(0)),
                HighlightEvent::start(0, Highlight(1)),
                HighlightEvent::end(1),
                HighlightEvent::start(2, Highlight(2)),
                HighlightEvent::end(3),
                HighlightEvent::end(4),
            ]
        );
    }

    #[test]
    fn test_injected_layer_interleaves_with_parent() {
        let a = javascript(
            r#"((string_fragment) @injection.content (#set! injection.language "b"))"#,
            "",
            "(string) @string",
        );
        a.set_highlight_configuration(&HighlightThemeTable::from_names([
            "comment", "keyword", "number", "string",
        ]));
        let b = javascript("", "", "(identifier) @keyword");
        b.set_highlight_configuration(&HighlightThemeTable::from_names([
            "a", "b", "c", "d", "e", "f", "g", "keyword",
        ]));

        let mut highlighter = Highlighter::new();
        let cancel = CancellationToken::new();
        let events: Vec<_> = highlighter
            .highlight(&a, "\"ab\"", &cancel, |name| (name == "b").then_some(&b))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(
            events,
            vec![
                HighlightEvent::start(0, Highlight(3)),
                HighlightEvent::start(1, Highlight(7)),
                HighlightEvent::end(3),
                HighlightEvent::end(4),
            ]
        );
    }

    #[test]
    fn test_unresolved_injection_is_skipped() {
        let a = javascript(
            r#"((string_fragment) @injection.content (#set! injection.language "nope"))"#,
            "",
            "(string) @string",
        );
        a.set_highlight_configuration(&HighlightThemeTable::from_names(["string"]));

        assert_eq!(
            events(&a, "\"ab\"").unwrap(),
            vec![HighlightEvent::start(0, Highlight(0)), HighlightEvent::end(4)]
        );
    }

    #[test]
    fn test_locals_reference_takes_definition_highlight() {
        let config = javascript(
            "",
            "(formal_parameters (identifier) @local.definition)\n(identifier) @local.reference\n(statement_block) @local.scope",
            "(formal_parameters (identifier) @variable.parameter)\n(identifier) @variable",
        );
        config.set_highlight_configuration(&HighlightThemeTable::from_names([
            "variable",
            "variable.parameter",
        ]));

        let source = "function f(a) { a; b; }";
        let events = events(&config, source).unwrap();
        let starts: Vec<_> = events
            .iter()
            .filter_map(|event| event.highlight.map(|h| (event.offset, h)))
            .collect();

        let a_param = source.find('a').unwrap();
        let a_ref = source.rfind("a;").unwrap();
        let b_ref = source.find("b;").unwrap();
        assert!(starts.contains(&(a_param, Highlight(1))));
        assert!(starts.contains(&(a_ref, Highlight(1))));
        assert!(starts.contains(&(b_ref, Highlight(0))));
    }

    #[test]
    fn test_cancelled_before_start() {
        let config = javascript("", "", "(identifier) @variable");
        let mut highlighter = Highlighter::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = highlighter.highlight(&config, "abcd", &cancel, |_| None);
        assert!(matches!(result, Err(HighlightError::Cancelled)));
    }

    #[test]
    fn test_cancelled_mid_stream_stops_with_error() {
        let config = javascript("", "", "(identifier) @variable");
        config.set_highlight_configuration(&HighlightThemeTable::from_names(["variable"]));
        let source = "a; ".repeat(500);

        let mut highlighter = Highlighter::new().with_cancellation_check_interval(1);
        let cancel = CancellationToken::new();
        let mut iter = highlighter
            .highlight(&config, source.as_str(), &cancel, |_| None)
            .unwrap();

        assert!(matches!(iter.next(), Some(Ok(_))));
        cancel.cancel();
        assert!(matches!(iter.next(), Some(Err(HighlightError::Cancelled))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_empty_ranges_are_invalid() {
        let config = javascript("", "", "(identifier) @variable");
        let mut highlighter = Highlighter::new();
        let cancel = CancellationToken::new();
        let result = highlighter.highlight_ranges(&config, "abcd", Vec::new(), &cancel, |_| None);
        assert!(matches!(result, Err(HighlightError::InvalidRanges { .. })));
    }

    #[test]
    fn test_collect_builds_qualified_spans() {
        let config = javascript("", "", "(identifier) @variable\n(number) @number");
        config.set_highlight_configuration(&HighlightThemeTable::from_names([
            "variable", "number",
        ]));

        let mut highlighter = Highlighter::new();
        let cancel = CancellationToken::new();
        let highlights = highlighter
            .collect(&config, "x = 12", &cancel, |_| None, 7)
            .unwrap();

        assert_eq!(highlights.revision, 7);
        assert_eq!(highlights.language, "javascript");
        let spans: Vec<_> = highlights
            .spans
            .iter()
            .map(|span| (span.range.clone(), span.capture_name.as_str(), span.depth))
            .collect();
        assert_eq!(
            spans,
            vec![
                (0..1, "javascript.variable", 0),
                (4..6, "javascript.number", 0),
            ]
        );
    }

    #[test]
    fn test_highlighter_is_reusable() {
        let config = javascript("", "", "(identifier) @variable");
        config.set_highlight_configuration(&HighlightThemeTable::from_names(["variable"]));
        let mut highlighter = Highlighter::new();
        let cancel = CancellationToken::new();

        let first = highlighter.collect(&config, "abc", &cancel, |_| None, 1).unwrap();
        let second = highlighter.collect(&config, "abc", &cancel, |_| None, 1).unwrap();
        assert_eq!(first, second);
    }

    /// Highlighter and token are locals; only the configs outlive the call
    fn spans_for<'c>(
        config: &'c LanguageConfiguration,
        child: &'c LanguageConfiguration,
        source: &str,
    ) -> SyntaxHighlights {
        let mut highlighter = Highlighter::new();
        let cancel = CancellationToken::new();
        highlighter
            .collect(config, source, &cancel, |name| (name == "b").then_some(child), 0)
            .unwrap()
    }

    #[test]
    fn test_collect_borrows_only_configs() {
        let config = javascript(
            "((string_fragment) @injection.content (#set! injection.language \"b\"))",
            "",
            "(string) @string",
        );
        let child = LanguageConfiguration::new(
            tree_sitter_javascript::LANGUAGE.into(),
            "b",
            "",
            "",
            "(identifier) @variable",
        )
        .unwrap();
        let table = HighlightThemeTable::from_names(["string", "variable"]);
        config.set_highlight_configuration(&table);
        child.set_highlight_configuration(&table);

        let highlights = spans_for(&config, &child, "\"ab\"");
        let spans: Vec<_> = highlights
            .spans
            .iter()
            .map(|span| (span.range.clone(), span.capture_name.as_str()))
            .collect();
        assert_eq!(spans, vec![(0..4, "javascript.string"), (1..3, "b.variable")]);
    }
}
