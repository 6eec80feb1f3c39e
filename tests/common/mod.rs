//! Shared test helpers for integration tests
//!
//! Note: Functions may appear unused because each test file compiles separately.

#![allow(dead_code)]

use token_syntax::syntax::{
    CancellationToken, Highlight, HighlightEvent, HighlightSpan, HighlightThemeTable, Highlighter,
    LanguageConfiguration, LanguageRegistry, SyntaxHighlights,
};
use token_syntax::theme::Theme;

/// JavaScript configuration from inline query sources
pub fn javascript(injections: &str, locals: &str, highlights: &str) -> LanguageConfiguration {
    LanguageConfiguration::new(
        tree_sitter_javascript::LANGUAGE.into(),
        "javascript",
        injections,
        locals,
        highlights,
    )
    .unwrap()
}

/// Named JavaScript configuration, for languages that are only told apart by name
pub fn javascript_named(
    name: &str,
    injections: &str,
    locals: &str,
    highlights: &str,
) -> LanguageConfiguration {
    LanguageConfiguration::new(
        tree_sitter_javascript::LANGUAGE.into(),
        name,
        injections,
        locals,
        highlights,
    )
    .unwrap()
}

pub fn table(names: &[&str]) -> HighlightThemeTable {
    HighlightThemeTable::from_names(names.iter().copied())
}

/// Builtin languages themed with the default dark theme
pub fn themed_registry() -> LanguageRegistry {
    let registry = LanguageRegistry::with_builtin_languages();
    registry.set_theme(&Theme::default_dark().highlight_table());
    registry
}

/// Every event for `source`, resolving injections with `resolve`
pub fn events_with<'a, F>(
    config: &'a LanguageConfiguration,
    source: &'a str,
    resolve: F,
) -> Vec<HighlightEvent>
where
    F: Fn(&str) -> Option<&'a LanguageConfiguration>,
{
    let mut highlighter = Highlighter::new();
    let cancel = CancellationToken::new();
    highlighter
        .highlight(config, source, &cancel, resolve)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

pub fn events(config: &LanguageConfiguration, source: &str) -> Vec<HighlightEvent> {
    events_with(config, source, |_| None)
}

pub fn collect_with<'a, F>(
    config: &'a LanguageConfiguration,
    source: &'a str,
    resolve: F,
) -> SyntaxHighlights
where
    F: Fn(&str) -> Option<&'a LanguageConfiguration>,
{
    let mut highlighter = Highlighter::new();
    let cancel = CancellationToken::new();
    highlighter
        .collect(config, source, &cancel, resolve, 1)
        .unwrap()
}

/// `(offset, highlight)` of every start event
pub fn starts(events: &[HighlightEvent]) -> Vec<(usize, Highlight)> {
    events
        .iter()
        .filter_map(|event| event.highlight.map(|highlight| (event.offset, highlight)))
        .collect()
}

/// Offsets never decrease, every end closes an open start, an end is never
/// before its start, and nothing is left open
pub fn assert_well_formed(events: &[HighlightEvent]) {
    let mut open: Vec<usize> = Vec::new();
    let mut position = 0;
    for (i, event) in events.iter().enumerate() {
        assert!(
            event.offset >= position,
            "event {} at {} goes back from {}",
            i,
            event.offset,
            position
        );
        position = event.offset;
        if event.is_start() {
            open.push(event.offset);
        } else {
            let start = open
                .pop()
                .unwrap_or_else(|| panic!("event {} ends nothing", i));
            assert!(event.offset >= start);
        }
    }
    assert!(open.is_empty(), "{} highlights left open", open.len());
}

/// Any two spans are either disjoint or one contains the other
pub fn assert_spans_nest(spans: &[HighlightSpan]) {
    for (i, a) in spans.iter().enumerate() {
        for b in &spans[i + 1..] {
            let disjoint = a.range.end <= b.range.start || b.range.end <= a.range.start;
            let a_in_b = b.range.start <= a.range.start && a.range.end <= b.range.end;
            let b_in_a = a.range.start <= b.range.start && b.range.end <= a.range.end;
            assert!(
                disjoint || a_in_b || b_in_a,
                "{:?} and {:?} overlap",
                a.range,
                b.range
            );
        }
    }
}
