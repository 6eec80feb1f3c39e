//! Language injections: child layers, depth, combined regions

mod common;

use common::{collect_with, events_with, javascript, javascript_named, starts, table, themed_registry};
use token_syntax::syntax::{CancellationToken, Highlight, HighlightEvent, Highlighter};

const STRING_INJECTION: &str =
    "((string_fragment) @injection.content (#set! injection.language \"b\"))";

#[test]
fn test_injected_string_interleaves_with_parent() {
    let names = ["a", "b", "c", "string", "d", "e", "f", "variable"];
    let parent = javascript(STRING_INJECTION, "", "(string) @string");
    let child = javascript_named("b", "", "", "(identifier) @variable");
    parent.set_highlight_configuration(&table(&names));
    child.set_highlight_configuration(&table(&names));

    let events = events_with(&parent, "\"ab\"", |name| (name == "b").then_some(&child));
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
fn test_injection_language_from_capture() {
    let parent = javascript(
        "(call_expression function: (identifier) @injection.language \
         arguments: (arguments (string (string_fragment) @injection.content)))",
        "",
        "",
    );
    let child = javascript_named("sql", "", "", "(identifier) @keyword");
    parent.set_highlight_configuration(&table(&["keyword"]));
    child.set_highlight_configuration(&table(&["keyword"]));

    let events = events_with(&parent, "sql(\"cd\")", |name| (name == "sql").then_some(&child));
    assert_eq!(starts(&events), vec![(5, Highlight(0))]);
    common::assert_well_formed(&events);
}

#[test]
fn test_unknown_injection_language_is_skipped() {
    let parent = javascript(STRING_INJECTION, "", "(string) @string");
    parent.set_highlight_configuration(&table(&["string"]));

    let events = events_with(&parent, "\"ab\"", |_| None);
    assert_eq!(
        events,
        vec![HighlightEvent::start(0, Highlight(0)), HighlightEvent::end(4)]
    );
}

#[test]
fn test_combined_injection_parses_regions_as_one_document() {
    let parent = javascript(
        "((string_fragment) @injection.content \
         (#set! injection.language \"b\") \
         (#set! injection.combined))",
        "",
        "(identifier) @variable",
    );
    let child = javascript_named("b", "", "", "(identifier) @keyword");
    let names = table(&["keyword", "variable"]);
    parent.set_highlight_configuration(&names);
    child.set_highlight_configuration(&names);

    let source = "f(\"a;\");\ng(\"b;\");\n";
    let highlights = collect_with(&parent, source, |name| (name == "b").then_some(&child));
    let spans: Vec<_> = highlights
        .spans
        .iter()
        .map(|span| (span.range.clone(), span.capture_name.as_str(), span.depth))
        .collect();

    assert_eq!(
        spans,
        vec![
            (0..1, "javascript.variable", 0),
            (3..4, "b.keyword", 1),
            (9..10, "javascript.variable", 0),
            (12..13, "b.keyword", 1),
        ]
    );
}

#[test]
fn test_combined_node_spanning_gap_stays_nested() {
    let parent = javascript(
        "((string_fragment) @injection.content \
         (#set! injection.language \"b\") \
         (#set! injection.combined))",
        "",
        "(call_expression) @function",
    );
    let child = javascript_named("b", "", "", "(call_expression) @keyword");
    let names = table(&["function", "keyword"]);
    parent.set_highlight_configuration(&names);
    child.set_highlight_configuration(&names);

    // The child parses `a(` and `)` as one call across the gap
    let source = "f(\"a(\");\ng(\")\");\n";
    let events = events_with(&parent, source, |name| (name == "b").then_some(&child));
    common::assert_well_formed(&events);

    let highlights = collect_with(&parent, source, |name| (name == "b").then_some(&child));
    let spans: Vec<_> = highlights
        .spans
        .iter()
        .map(|span| (span.range.clone(), span.capture_name.as_str(), span.depth))
        .collect();
    assert_eq!(
        spans,
        vec![
            (0..7, "javascript.function", 0),
            (3..5, "b.keyword", 1),
            (9..15, "javascript.function", 0),
        ]
    );
    common::assert_spans_nest(&highlights.spans);
}

#[test]
fn test_html_embeds_javascript_and_css() {
    let registry = themed_registry();
    let html = registry.resolve("html").unwrap();
    let source = "<style>p { color: red; }</style>\n<script>let a = 1;</script>\n";
    let style = 7..24;
    let script = source.find("let").unwrap()..source.find("</script>").unwrap();

    let mut highlighter = Highlighter::new();
    let cancel = CancellationToken::new();
    let highlights = highlighter
        .collect(html, source, &cancel, |name| registry.resolve(name), 3)
        .unwrap();
    assert_eq!(highlights.revision, 3);

    let js: Vec<_> = highlights
        .spans
        .iter()
        .filter(|span| span.capture_name.starts_with("javascript."))
        .collect();
    let css: Vec<_> = highlights
        .spans
        .iter()
        .filter(|span| span.capture_name.starts_with("css."))
        .collect();

    assert!(!js.is_empty());
    assert!(!css.is_empty());
    for span in &js {
        assert_eq!(span.depth, 1);
        assert!(script.start <= span.range.start && span.range.end <= script.end);
    }
    for span in &css {
        assert_eq!(span.depth, 1);
        assert!(style.start <= span.range.start && span.range.end <= style.end);
    }
    let keyword = script.start..script.start + 3;
    assert!(js
        .iter()
        .any(|span| span.capture_name == "javascript.keyword" && span.range == keyword));
    assert!(highlights
        .spans
        .iter()
        .any(|span| span.capture_name.starts_with("html.") && span.depth == 0));
}

#[test]
fn test_injection_events_stay_ordered() {
    let registry = themed_registry();
    let html = registry.resolve("html").unwrap();
    let source = "<div><script>if (x) { y(\"z\"); }</script><p class=\"q\">t</p></div>";

    let events = events_with(html, source, |name| registry.resolve(name));
    common::assert_well_formed(&events);
}
