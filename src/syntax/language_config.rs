//! Per-language highlighting configuration
//!
//! A [`LanguageConfiguration`] bundles a grammar with one query compiled from
//! its injections, locals and highlights sources concatenated in that order.
//! Pattern indices below `locals_pattern_index` are injection patterns, those
//! below `highlights_pattern_index` are locals patterns and the rest are
//! highlight patterns.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tree_sitter::Language;

use super::query::{PropertyKind, Query};
use super::theme_table::{Highlight, HighlightThemeTable};
use crate::error::QueryCompileError;

/// Immutable once built, apart from the capture → highlight table which is
/// swapped whenever a new theme is assigned.
pub struct LanguageConfiguration {
    pub name: String,
    pub language: Language,
    pub query: Query,
    /// Injection patterns carrying `injection.combined`, run once per layer
    pub combined_injections_query: Option<Query>,
    pub locals_pattern_index: usize,
    pub highlights_pattern_index: usize,
    highlight_indices: ArcSwap<Vec<Option<Highlight>>>,
    non_local_variable_patterns: Vec<bool>,
    pub injection_content_capture_index: Option<u32>,
    pub injection_language_capture_index: Option<u32>,
    pub local_scope_capture_index: Option<u32>,
    pub local_def_capture_index: Option<u32>,
    pub local_def_value_capture_index: Option<u32>,
    pub local_ref_capture_index: Option<u32>,
}

impl std::fmt::Debug for LanguageConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageConfiguration")
            .field("name", &self.name)
            .field("patterns", &self.query.pattern_count())
            .field("locals_pattern_index", &self.locals_pattern_index)
            .field("highlights_pattern_index", &self.highlights_pattern_index)
            .field("combined", &self.combined_injections_query.is_some())
            .finish()
    }
}

impl LanguageConfiguration {
    pub fn new(
        language: Language,
        name: impl Into<String>,
        injections_query: &str,
        locals_query: &str,
        highlights_query: &str,
    ) -> Result<Self, QueryCompileError> {
        let name = name.into();

        let mut query_source = String::with_capacity(
            injections_query.len() + locals_query.len() + highlights_query.len() + 2,
        );
        query_source.push_str(injections_query);
        query_source.push('\n');
        let locals_query_offset = query_source.len();
        query_source.push_str(locals_query);
        query_source.push('\n');
        let highlights_query_offset = query_source.len();
        query_source.push_str(highlights_query);

        let mut query = Query::new(&language, &query_source, &name)?;

        let mut locals_pattern_index = 0;
        let mut highlights_pattern_index = 0;
        for pattern_index in 0..query.pattern_count() {
            let offset = query.start_byte_for_pattern(pattern_index);
            if offset < locals_query_offset {
                locals_pattern_index += 1;
            }
            if offset < highlights_query_offset {
                highlights_pattern_index += 1;
            }
        }

        // Combined injection patterns live only in the injections-only query
        let mut combined_injections_query = Query::new(&language, injections_query, &name)?;
        let mut has_combined_patterns = false;
        for pattern_index in 0..locals_pattern_index {
            if query.has_property(pattern_index, "injection.combined") {
                has_combined_patterns = true;
                query.disable_pattern(pattern_index);
            } else {
                combined_injections_query.disable_pattern(pattern_index);
            }
        }
        let combined_injections_query = has_combined_patterns.then_some(combined_injections_query);

        let non_local_variable_patterns = (0..query.pattern_count())
            .map(|pattern_index| {
                query
                    .properties(pattern_index, PropertyKind::IsNot)
                    .any(|property| &*property.key == "local")
            })
            .collect();

        let config = Self {
            highlight_indices: ArcSwap::from_pointee(vec![None; query.capture_names().len()]),
            injection_content_capture_index: query.capture_index_for_name("injection.content"),
            injection_language_capture_index: query.capture_index_for_name("injection.language"),
            local_scope_capture_index: query.capture_index_for_name("local.scope"),
            local_def_capture_index: query.capture_index_for_name("local.definition"),
            local_def_value_capture_index: query
                .capture_index_for_name("local.definition-value"),
            local_ref_capture_index: query.capture_index_for_name("local.reference"),
            name,
            language,
            query,
            combined_injections_query,
            locals_pattern_index,
            highlights_pattern_index,
            non_local_variable_patterns,
        };

        tracing::debug!(
            "Compiled {} queries: {} patterns ({} injection, {} locals)",
            config.name,
            config.query.pattern_count(),
            config.locals_pattern_index,
            config.highlights_pattern_index - config.locals_pattern_index
        );
        Ok(config)
    }

    /// Resolve every capture name against `table`
    pub fn set_highlight_configuration(&self, table: &HighlightThemeTable) {
        let highlight_indices = self
            .query
            .capture_names()
            .iter()
            .map(|capture_name| {
                let highlight = table.lookup(capture_name);
                if highlight.is_none() && is_highlight_capture(capture_name) {
                    tracing::info!(
                        "No theme entry for @{} in {} highlights",
                        capture_name,
                        self.name
                    );
                }
                highlight
            })
            .collect();
        self.highlight_indices.store(Arc::new(highlight_indices));
    }

    pub fn highlight_for_capture(&self, capture_index: u32) -> Option<Highlight> {
        self.highlight_indices
            .load()
            .get(capture_index as usize)
            .copied()
            .flatten()
    }

    /// Pattern carries `(#is-not? local)`
    pub fn is_non_local_variable_pattern(&self, pattern_index: usize) -> bool {
        self.non_local_variable_patterns
            .get(pattern_index)
            .copied()
            .unwrap_or(false)
    }

    pub fn capture_name(&self, capture_index: u32) -> &str {
        self.query
            .capture_names()
            .get(capture_index as usize)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_injection_pattern(&self, pattern_index: usize) -> bool {
        pattern_index < self.locals_pattern_index
    }
}

/// Captures that exist for bookkeeping rather than styling
fn is_highlight_capture(name: &str) -> bool {
    !(name.starts_with("injection.") || name.starts_with("local.") || name.starts_with('_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn javascript() -> Language {
        tree_sitter_javascript::LANGUAGE.into()
    }

    #[test]
    fn test_section_boundaries() {
        let config = LanguageConfiguration::new(
            javascript(),
            "javascript",
            r#"((regex_pattern) @injection.content (#set! injection.language "regex"))"#,
            "(statement_block) @local.scope\n(variable_declarator name: (identifier) @local.definition)",
            "(identifier) @variable\n(number) @number\n(string) @string",
        )
        .unwrap();

        assert_eq!(config.locals_pattern_index, 1);
        assert_eq!(config.highlights_pattern_index, 3);
        assert_eq!(config.query.pattern_count(), 6);
        assert!(config.is_injection_pattern(0));
        assert!(!config.is_injection_pattern(1));
        assert!(config.combined_injections_query.is_none());
        assert!(config.injection_content_capture_index.is_some());
        assert!(config.local_ref_capture_index.is_none());
    }

    #[test]
    fn test_empty_sections() {
        let config =
            LanguageConfiguration::new(javascript(), "javascript", "", "", "(identifier) @variable")
                .unwrap();
        assert_eq!(config.locals_pattern_index, 0);
        assert_eq!(config.highlights_pattern_index, 0);
    }

    #[test]
    fn test_combined_injection_patterns_are_split() {
        let injections = r#"
            ((comment) @injection.content
              (#set! injection.language "jsdoc")
              (#set! injection.combined))
            ((regex_pattern) @injection.content (#set! injection.language "regex"))
        "#;
        let config = LanguageConfiguration::new(
            javascript(),
            "javascript",
            injections,
            "",
            "(identifier) @variable",
        )
        .unwrap();

        assert_eq!(config.locals_pattern_index, 2);
        let combined = config.combined_injections_query.as_ref().unwrap();
        assert_eq!(combined.pattern_count(), 2);
        assert!(combined.has_property(0, "injection.combined"));
    }

    #[test]
    fn test_highlight_configuration_uses_longest_prefix() {
        let config = LanguageConfiguration::new(
            javascript(),
            "javascript",
            "",
            "",
            "(identifier) @variable.parameter\n(number) @number\n(string) @string.special",
        )
        .unwrap();
        let table = HighlightThemeTable::from_names(["string", "variable", "number"]);
        config.set_highlight_configuration(&table);

        let variable = config.query.capture_index_for_name("variable.parameter").unwrap();
        let number = config.query.capture_index_for_name("number").unwrap();
        let string = config.query.capture_index_for_name("string.special").unwrap();
        assert_eq!(config.highlight_for_capture(variable), Some(Highlight(1)));
        assert_eq!(config.highlight_for_capture(number), Some(Highlight(2)));
        assert_eq!(config.highlight_for_capture(string), Some(Highlight(0)));

        config.set_highlight_configuration(&HighlightThemeTable::from_names(["number"]));
        assert_eq!(config.highlight_for_capture(variable), None);
        assert_eq!(config.highlight_for_capture(number), Some(Highlight(0)));
    }

    #[test]
    fn test_non_local_variable_patterns() {
        let config = LanguageConfiguration::new(
            javascript(),
            "javascript",
            "",
            "",
            "((identifier) @constant (#is-not? local) (#match? @constant \"^[A-Z]\"))\n(identifier) @variable",
        )
        .unwrap();
        assert!(config.is_non_local_variable_pattern(0));
        assert!(!config.is_non_local_variable_pattern(1));
    }

    #[test]
    fn test_invalid_query_is_an_error() {
        let err = LanguageConfiguration::new(javascript(), "javascript", "", "", "(not_a_node) @x")
            .unwrap_err();
        assert_eq!(err.language, "javascript");
    }
}
