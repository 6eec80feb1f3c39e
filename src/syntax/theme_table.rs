//! Capture name → highlight resolution
//!
//! A [`HighlightThemeTable`] is the ordered list of highlight names a theme
//! styles. Capture names are resolved against it by longest dotted prefix, so
//! `keyword.operator.new` falls back to `keyword.operator`, then `keyword`.

use std::collections::HashMap;

use crate::theme::Color;

/// Index of an entry in a [`HighlightThemeTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Highlight(pub usize);

/// How a theme draws one highlight name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HighlightStyle {
    pub color: Option<Color>,
    pub bold: bool,
    pub italic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeEntry {
    pub name: String,
    pub style: HighlightStyle,
}

#[derive(Debug, Clone, Default)]
struct TrieNode {
    entry: Option<usize>,
    children: HashMap<Box<str>, TrieNode>,
}

#[derive(Debug, Clone, Default)]
pub struct HighlightThemeTable {
    entries: Vec<ThemeEntry>,
    root: TrieNode,
}

impl HighlightThemeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unstyled table whose highlight ids follow the order of `names`
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for name in names {
            table.insert(name, HighlightStyle::default());
        }
        table
    }

    /// Add or restyle `name`, returning its highlight id
    pub fn insert(&mut self, name: impl Into<String>, style: HighlightStyle) -> Highlight {
        let name = name.into();

        let mut node = &mut self.root;
        for segment in name.split('.') {
            node = node.children.entry(segment.into()).or_default();
        }

        match node.entry {
            Some(index) => {
                self.entries[index].style = style;
                Highlight(index)
            }
            None => {
                let index = self.entries.len();
                node.entry = Some(index);
                self.entries.push(ThemeEntry { name, style });
                Highlight(index)
            }
        }
    }

    /// Longest-prefix match of a dotted capture name
    pub fn lookup(&self, capture_name: &str) -> Option<Highlight> {
        let mut node = &self.root;
        let mut best = None;
        for segment in capture_name.split('.') {
            let Some(child) = node.children.get(segment) else {
                break;
            };
            node = child;
            if let Some(index) = node.entry {
                best = Some(Highlight(index));
            }
        }
        best
    }

    pub fn get(&self, highlight: Highlight) -> Option<&ThemeEntry> {
        self.entries.get(highlight.0)
    }

    pub fn name(&self, highlight: Highlight) -> Option<&str> {
        self.get(highlight).map(|entry| entry.name.as_str())
    }

    pub fn style(&self, highlight: Highlight) -> HighlightStyle {
        self.get(highlight)
            .map(|entry| entry.style)
            .unwrap_or_default()
    }

    pub fn entries(&self) -> &[ThemeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_follow_insertion_order() {
        let table = HighlightThemeTable::from_names(["comment", "keyword", "string", "variable"]);
        assert_eq!(table.lookup("variable"), Some(Highlight(3)));
        assert_eq!(table.lookup("comment"), Some(Highlight(0)));
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_longest_prefix_match() {
        let table = HighlightThemeTable::from_names(["keyword", "keyword.operator", "function"]);
        assert_eq!(table.lookup("keyword.operator.new"), Some(Highlight(1)));
        assert_eq!(table.lookup("keyword.control"), Some(Highlight(0)));
        assert_eq!(table.lookup("function.method.call"), Some(Highlight(2)));
        assert_eq!(table.lookup("variable"), None);
        assert_eq!(table.lookup("keywords"), None);
    }

    #[test]
    fn test_prefix_without_entry_is_skipped() {
        let table = HighlightThemeTable::from_names(["punctuation.bracket"]);
        assert_eq!(table.lookup("punctuation"), None);
        assert_eq!(table.lookup("punctuation.bracket.round"), Some(Highlight(0)));
    }

    #[test]
    fn test_insert_existing_name_restyles() {
        let mut table = HighlightThemeTable::from_names(["string"]);
        let bold = HighlightStyle {
            bold: true,
            ..Default::default()
        };
        assert_eq!(table.insert("string", bold), Highlight(0));
        assert_eq!(table.len(), 1);
        assert!(table.style(Highlight(0)).bold);
    }
}
