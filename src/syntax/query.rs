//! Compiled tree-sitter queries with predicate evaluation
//!
//! tree-sitter keeps text predicates private to its query cursor, so those are
//! recovered here by scanning the pattern's source text. Properties (`#set!`,
//! `#is?`, `#is-not?`) come straight from the compiled query. The result is a
//! closed [`Predicate`] enum per pattern that the layer iterator evaluates
//! against snapshotted matches.

use std::ops::Range;

use regex::Regex;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Language, Node, QueryCursor, QueryMatch, QueryProperty};

use super::text::{NodeText, TextSource};
use crate::error::QueryCompileError;

/// Which of the property predicate operators produced a [`Property`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// `#set!`
    Set,
    /// `#is?`
    Is,
    /// `#is-not?`
    IsNot,
}

/// A `{key, value, capture}` triple from `#set!`, `#is?` or `#is-not?`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub key: Box<str>,
    pub value: Option<Box<str>>,
    pub capture: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum Predicate {
    /// `#eq?` / `#not-eq?` / `#any-eq?` / `#any-not-eq?` between two captures
    CaptureEq {
        left: u32,
        right: u32,
        negated: bool,
        any: bool,
    },
    /// The same operators with a string literal on the right
    LiteralEq {
        capture: u32,
        literal: Box<str>,
        negated: bool,
        any: bool,
    },
    /// `#any-of?` / `#not-any-of?`
    AnyOf {
        capture: u32,
        values: Vec<Box<str>>,
        negated: bool,
    },
    /// `#match?` / `#not-match?` / `#any-match?` / `#any-not-match?`
    Match {
        capture: u32,
        regex: Regex,
        negated: bool,
        any: bool,
    },
    Property {
        kind: PropertyKind,
        property: Property,
    },
}

/// Read access to the captures of one match, live or snapshotted
pub trait CaptureLookup {
    fn pattern_index(&self) -> usize;

    /// Byte ranges of every node captured under `capture_index`
    fn ranges_for_capture(&self, capture_index: u32) -> Vec<Range<usize>>;
}

impl CaptureLookup for QueryMatch<'_, '_> {
    fn pattern_index(&self) -> usize {
        self.pattern_index
    }

    fn ranges_for_capture(&self, capture_index: u32) -> Vec<Range<usize>> {
        self.captures
            .iter()
            .filter(|capture| capture.index == capture_index)
            .map(|capture| capture.node.byte_range())
            .collect()
    }
}

/// A tree-sitter query plus the predicates of each of its patterns
pub struct Query {
    query: tree_sitter::Query,
    predicates: Vec<Vec<Predicate>>,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("patterns", &self.query.pattern_count())
            .field("captures", &self.query.capture_names())
            .finish()
    }
}

impl Query {
    /// Compile `source` against `language`. `language_name` only labels errors.
    pub fn new(
        language: &Language,
        source: &str,
        language_name: &str,
    ) -> Result<Self, QueryCompileError> {
        let query = tree_sitter::Query::new(language, source)
            .map_err(|e| QueryCompileError::new(language_name, e))?;

        let pattern_count = query.pattern_count();
        let mut predicates = Vec::with_capacity(pattern_count);
        for pattern_index in 0..pattern_count {
            let start = query.start_byte_for_pattern(pattern_index);
            let end = if pattern_index + 1 < pattern_count {
                query.start_byte_for_pattern(pattern_index + 1)
            } else {
                source.len()
            };
            let pattern_source = source.get(start..end).unwrap_or_default();
            predicates.push(compile_predicates(
                &query,
                pattern_index,
                pattern_source,
                language_name,
            ));
        }

        Ok(Self { query, predicates })
    }

    pub fn inner(&self) -> &tree_sitter::Query {
        &self.query
    }

    pub fn pattern_count(&self) -> usize {
        self.query.pattern_count()
    }

    pub fn start_byte_for_pattern(&self, pattern_index: usize) -> usize {
        self.query.start_byte_for_pattern(pattern_index)
    }

    pub fn capture_names(&self) -> &[&str] {
        self.query.capture_names()
    }

    pub fn capture_index_for_name(&self, name: &str) -> Option<u32> {
        self.query.capture_index_for_name(name)
    }

    /// Permanently stop `pattern_index` from matching
    pub fn disable_pattern(&mut self, pattern_index: usize) {
        self.query.disable_pattern(pattern_index);
    }

    pub fn predicates(&self, pattern_index: usize) -> &[Predicate] {
        self.predicates
            .get(pattern_index)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Property triples of `kind` attached to `pattern_index`
    pub fn properties(
        &self,
        pattern_index: usize,
        kind: PropertyKind,
    ) -> impl Iterator<Item = &Property> + '_ {
        self.predicates(pattern_index)
            .iter()
            .filter_map(move |predicate| match predicate {
                Predicate::Property { kind: k, property } if *k == kind => Some(property),
                _ => None,
            })
    }

    /// Value of the first `#set!` property named `key`, if any.
    /// `Some(None)` when the key is set without a value.
    pub fn property_value(&self, pattern_index: usize, key: &str) -> Option<Option<&str>> {
        self.properties(pattern_index, PropertyKind::Set)
            .find(|property| &*property.key == key)
            .map(|property| property.value.as_deref())
    }

    pub fn has_property(&self, pattern_index: usize, key: &str) -> bool {
        self.property_value(pattern_index, key).is_some()
    }

    /// Every predicate of the match's pattern holds
    pub fn satisfies_predicates<M, S>(&self, m: &M, text: &S) -> bool
    where
        M: CaptureLookup + ?Sized,
        S: TextSource + ?Sized,
    {
        self.predicates(m.pattern_index())
            .iter()
            .all(|predicate| self.evaluate(predicate, m, text))
    }

    /// Run the query over `node`, passing each match whose predicates hold to
    /// `callback` until it returns false
    pub fn pattern_matches<S, F>(
        &self,
        cursor: &mut QueryCursor,
        node: Node<'_>,
        text: &S,
        mut callback: F,
    ) where
        S: TextSource + ?Sized,
        F: FnMut(&QueryMatch<'_, '_>) -> bool,
    {
        let mut matches = cursor.matches(&self.query, node, NodeText(text));
        while let Some(m) = matches.next() {
            if !self.satisfies_predicates(m, text) {
                continue;
            }
            if !callback(m) {
                break;
            }
        }
    }

    fn evaluate<M, S>(&self, predicate: &Predicate, m: &M, text: &S) -> bool
    where
        M: CaptureLookup + ?Sized,
        S: TextSource + ?Sized,
    {
        match predicate {
            Predicate::CaptureEq {
                left,
                right,
                negated,
                any,
            } => {
                let lefts = m.ranges_for_capture(*left);
                let rights = m.ranges_for_capture(*right);
                if lefts.is_empty() || rights.is_empty() {
                    self.log_missing_capture(m.pattern_index(), *left.min(right));
                    return false;
                }
                let mut pairs = lefts.into_iter().zip(rights).map(|(l, r)| {
                    (text.text_for_range(l) == text.text_for_range(r)) != *negated
                });
                if *any {
                    pairs.any(|ok| ok)
                } else {
                    pairs.all(|ok| ok)
                }
            }
            Predicate::LiteralEq {
                capture,
                literal,
                negated,
                any,
            } => self.test_nodes(m, *capture, text, *any, |node_text| {
                (node_text == &**literal) != *negated
            }),
            Predicate::AnyOf {
                capture,
                values,
                negated,
            } => self.test_nodes(m, *capture, text, false, |node_text| {
                values.iter().any(|value| &**value == node_text) != *negated
            }),
            Predicate::Match {
                capture,
                regex,
                negated,
                any,
            } => self.test_nodes(m, *capture, text, *any, |node_text| {
                regex.is_match(node_text) != *negated
            }),
            Predicate::Property { .. } => true,
        }
    }

    fn test_nodes<M, S>(
        &self,
        m: &M,
        capture: u32,
        text: &S,
        any: bool,
        test: impl Fn(&str) -> bool,
    ) -> bool
    where
        M: CaptureLookup + ?Sized,
        S: TextSource + ?Sized,
    {
        let ranges = m.ranges_for_capture(capture);
        if ranges.is_empty() {
            self.log_missing_capture(m.pattern_index(), capture);
            return false;
        }
        let mut results = ranges
            .into_iter()
            .map(|range| test(&text.text_for_range(range)));
        if any {
            results.any(|ok| ok)
        } else {
            results.all(|ok| ok)
        }
    }

    fn log_missing_capture(&self, pattern_index: usize, capture: u32) {
        let name = self
            .query
            .capture_names()
            .get(capture as usize)
            .copied()
            .unwrap_or("?");
        tracing::error!(
            "Predicate on pattern {} references capture @{} absent from the match",
            pattern_index,
            name
        );
    }
}

/// One argument of a scanned predicate
#[derive(Debug, Clone, PartialEq, Eq)]
enum PredicateArg {
    Capture(String),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RawPredicate {
    operator: String,
    args: Vec<PredicateArg>,
}

fn compile_predicates(
    query: &tree_sitter::Query,
    pattern_index: usize,
    pattern_source: &str,
    language_name: &str,
) -> Vec<Predicate> {
    let mut predicates: Vec<Predicate> = scan_predicates(pattern_source)
        .into_iter()
        .filter(|raw| !is_property_operator(&raw.operator))
        .filter_map(|raw| {
            match compile_predicate(query, &raw) {
                Ok(Some(predicate)) => Some(predicate),
                Ok(None) => {
                    tracing::debug!(
                        "Ignoring #{} on {} pattern {}",
                        raw.operator,
                        language_name,
                        pattern_index
                    );
                    None
                }
                Err(message) => {
                    tracing::error!(
                        "Dropping #{} on {} pattern {}: {}",
                        raw.operator,
                        language_name,
                        pattern_index,
                        message
                    );
                    None
                }
            }
        })
        .collect();

    predicates.extend(
        query
            .property_settings(pattern_index)
            .iter()
            .map(|property| Predicate::Property {
                kind: PropertyKind::Set,
                property: Property::from(property),
            }),
    );
    predicates.extend(query.property_predicates(pattern_index).iter().map(
        |(property, is_positive)| Predicate::Property {
            kind: if *is_positive {
                PropertyKind::Is
            } else {
                PropertyKind::IsNot
            },
            property: Property::from(property),
        },
    ));
    predicates
}

/// Operators tree-sitter parses into properties itself
fn is_property_operator(operator: &str) -> bool {
    matches!(operator, "set!" | "is?" | "is-not?")
}

impl From<&QueryProperty> for Property {
    fn from(property: &QueryProperty) -> Self {
        Self {
            key: property.key.clone(),
            value: property.value.clone(),
            capture: property.capture_id.map(|index| index as u32),
        }
    }
}

/// `Ok(None)` for operators the highlighter doesn't interpret
fn compile_predicate(
    query: &tree_sitter::Query,
    raw: &RawPredicate,
) -> Result<Option<Predicate>, String> {
    let capture = |arg: &PredicateArg| -> Result<u32, String> {
        match arg {
            PredicateArg::Capture(name) => query
                .capture_index_for_name(name)
                .ok_or_else(|| format!("unknown capture @{}", name)),
            PredicateArg::String(value) => {
                Err(format!("expected a capture, found \"{}\"", value))
            }
        }
    };
    let arity = |min: usize, max: usize| -> Result<(), String> {
        if raw.args.len() < min || raw.args.len() > max {
            Err(format!(
                "expected {}..={} arguments, found {}",
                min,
                max,
                raw.args.len()
            ))
        } else {
            Ok(())
        }
    };

    let predicate = match raw.operator.as_str() {
        "eq?" | "not-eq?" | "any-eq?" | "any-not-eq?" => {
            arity(2, 2)?;
            let negated = raw.operator.contains("not-");
            let any = raw.operator.starts_with("any-");
            let left = capture(&raw.args[0])?;
            match &raw.args[1] {
                PredicateArg::Capture(_) => Predicate::CaptureEq {
                    left,
                    right: capture(&raw.args[1])?,
                    negated,
                    any,
                },
                PredicateArg::String(literal) => Predicate::LiteralEq {
                    capture: left,
                    literal: literal.as_str().into(),
                    negated,
                    any,
                },
            }
        }
        "match?" | "not-match?" | "any-match?" | "any-not-match?" => {
            arity(2, 2)?;
            let PredicateArg::String(pattern) = &raw.args[1] else {
                return Err("expected a regex string as second argument".to_string());
            };
            let regex = Regex::new(pattern).map_err(|e| format!("invalid regex: {}", e))?;
            Predicate::Match {
                capture: capture(&raw.args[0])?,
                regex,
                negated: raw.operator.contains("not-"),
                any: raw.operator.starts_with("any-"),
            }
        }
        "any-of?" | "not-any-of?" => {
            if raw.args.len() < 2 {
                return Err("expected a capture and at least one value".to_string());
            }
            let values = raw.args[1..]
                .iter()
                .map(|arg| match arg {
                    PredicateArg::String(value) => Ok(value.as_str().into()),
                    PredicateArg::Capture(name) => {
                        Err(format!("expected a string, found @{}", name))
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            Predicate::AnyOf {
                capture: capture(&raw.args[0])?,
                values,
                negated: raw.operator == "not-any-of?",
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(predicate))
}

/// Extract every `(#operator args...)` form from a pattern's source text
fn scan_predicates(source: &str) -> Vec<RawPredicate> {
    let mut scanner = Scanner {
        chars: source.chars().peekable(),
    };
    let mut predicates = Vec::new();

    while let Some(c) = scanner.chars.next() {
        match c {
            ';' => scanner.skip_line(),
            '"' => {
                scanner.read_string();
            }
            '(' => {
                scanner.skip_trivia();
                if scanner.chars.peek() == Some(&'#') {
                    scanner.chars.next();
                    if let Some(predicate) = scanner.read_predicate() {
                        predicates.push(predicate);
                    }
                }
            }
            _ => {}
        }
    }

    predicates
}

struct Scanner<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl Scanner<'_> {
    fn skip_line(&mut self) {
        for c in self.chars.by_ref() {
            if c == '\n' {
                break;
            }
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
            } else if c == ';' {
                self.skip_line();
            } else {
                break;
            }
        }
    }

    /// Read the remainder of a string literal whose opening quote was consumed
    fn read_string(&mut self) -> String {
        let mut value = String::new();
        while let Some(c) = self.chars.next() {
            match c {
                '"' => break,
                '\\' => match self.chars.next() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('0') => value.push('\0'),
                    Some(other) => value.push(other),
                    None => break,
                },
                _ => value.push(c),
            }
        }
        value
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || c == '(' || c == ')' || c == '"' || c == ';' {
                break;
            }
            word.push(c);
            self.chars.next();
        }
        word
    }

    fn read_predicate(&mut self) -> Option<RawPredicate> {
        let operator = self.read_word();
        if operator.is_empty() {
            return None;
        }

        let mut args = Vec::new();
        loop {
            self.skip_trivia();
            match self.chars.peek().copied() {
                None => return None,
                Some(')') => {
                    self.chars.next();
                    break;
                }
                Some('"') => {
                    self.chars.next();
                    args.push(PredicateArg::String(self.read_string()));
                }
                Some('@') => {
                    self.chars.next();
                    args.push(PredicateArg::Capture(self.read_word()));
                }
                Some('(') => {
                    // Not valid inside a predicate; leave it to the outer scan
                    return None;
                }
                Some(_) => args.push(PredicateArg::String(self.read_word())),
            }
        }

        Some(RawPredicate { operator, args })
    }
}
