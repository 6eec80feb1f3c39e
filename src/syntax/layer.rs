//! Highlight layers and injection discovery
//!
//! A layer is one language parsed over one set of byte ranges at a given
//! injection depth. Building a layer parses the ranges, runs the language's
//! query over the tree and snapshots every capture, so the layer owns plain
//! data and no borrowed tree nodes. The merge loop in
//! [`super::highlighter`] then drains the snapshot one capture at a time.

use std::collections::{HashMap, VecDeque};

use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, ParseOptions, Parser, Point, QueryCursor, Range};

use super::cancel::CancellationToken;
use super::language_config::LanguageConfiguration;
use super::locals::ScopeStack;
use super::query::{CaptureLookup, PropertyKind, Query};
use super::text::{NodeText, TextSource};
use crate::error::HighlightError;

/// Identity and extent of a captured node, detached from its tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CapturedNode {
    pub id: usize,
    pub range: Range,
}

impl CapturedNode {
    fn new(node: Node<'_>) -> Self {
        Self {
            id: node.id(),
            range: node.range(),
        }
    }

    pub fn byte_range(&self) -> std::ops::Range<usize> {
        self.range.start_byte..self.range.end_byte
    }
}

/// One capture of one match, in cursor order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Capture {
    /// Index of the owning match in the layer's snapshot
    pub slot: usize,
    pub pattern_index: usize,
    /// Capture index within the query
    pub index: u32,
    pub node: CapturedNode,
}

#[derive(Debug, Clone)]
struct MatchSnapshot {
    pattern_index: usize,
    captures: Vec<(u32, CapturedNode)>,
    removed: bool,
}

impl CaptureLookup for MatchSnapshot {
    fn pattern_index(&self) -> usize {
        self.pattern_index
    }

    fn ranges_for_capture(&self, capture_index: u32) -> Vec<std::ops::Range<usize>> {
        self.captures
            .iter()
            .filter(|(index, _)| *index == capture_index)
            .map(|(_, node)| node.byte_range())
            .collect()
    }
}

/// A node whose text belongs to an injected language
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InjectionNode {
    pub range: Range,
    /// Ranges of the node's direct children
    pub children: Vec<Range>,
}

impl InjectionNode {
    fn from_node(node: Node<'_>) -> Self {
        let mut walker = node.walk();
        Self {
            range: node.range(),
            children: node.children(&mut walker).map(|child| child.range()).collect(),
        }
    }
}

/// Language, content and options extracted from one injection match
#[derive(Debug, Clone, Default)]
pub(crate) struct Injection {
    pub language: Option<String>,
    pub nodes: Vec<InjectionNode>,
    pub include_children: bool,
}

/// Apply the `#set!` properties of an injection pattern
fn apply_injection_properties(
    injection: &mut Injection,
    query: &Query,
    pattern_index: usize,
    self_name: &str,
    parent_name: Option<&str>,
) {
    for property in query.properties(pattern_index, PropertyKind::Set) {
        match &*property.key {
            "injection.language" => {
                if injection.language.is_none() {
                    injection.language = property.value.as_deref().map(str::to_string);
                }
            }
            "injection.self" => {
                if injection.language.is_none() {
                    injection.language = Some(self_name.to_string());
                }
            }
            "injection.parent" => {
                if injection.language.is_none() {
                    injection.language = parent_name.map(str::to_string);
                }
            }
            "injection.include-children" => injection.include_children = true,
            _ => {}
        }
    }
}

/// Captures of one layer plus its local scope and open highlight state
pub(crate) struct LayerIterator<'a> {
    pub config: &'a LanguageConfiguration,
    pub parent: Option<&'a LanguageConfiguration>,
    /// Sorted, non-overlapping ranges the layer is confined to
    pub ranges: Vec<Range>,
    pub depth: usize,
    matches: Vec<MatchSnapshot>,
    pending: VecDeque<Capture>,
    peeked: Option<Capture>,
    injection_children: HashMap<usize, Vec<Range>>,
    pub scope_stack: ScopeStack,
    /// Ends of the highlights this layer has opened, innermost last
    pub highlight_end_stack: Vec<usize>,
}

impl std::fmt::Debug for LayerIterator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerIterator")
            .field("language", &self.config.name)
            .field("depth", &self.depth)
            .field("ranges", &self.ranges.len())
            .field("pending", &self.pending.len())
            .field("open", &self.highlight_end_stack)
            .finish()
    }
}

impl<'a> LayerIterator<'a> {
    /// Next live capture without consuming it
    pub fn peek_capture(&mut self) -> Option<Capture> {
        while self.peeked.is_none() {
            let capture = self.pending.pop_front()?;
            if !self.matches[capture.slot].removed {
                self.peeked = Some(capture);
            }
        }
        self.peeked
    }

    pub fn next_capture(&mut self) -> Option<Capture> {
        self.peek_capture();
        self.peeked.take()
    }

    /// Consume the next capture if it targets the same node as `capture`
    pub fn next_capture_on_node(&mut self, capture: &Capture) -> Option<Capture> {
        match self.peek_capture() {
            Some(next) if next.node.id == capture.node.id => self.next_capture(),
            _ => None,
        }
    }

    /// Hide the remaining captures of the match in `slot`
    pub fn remove_match(&mut self, slot: usize) {
        if let Some(snapshot) = self.matches.get_mut(slot) {
            snapshot.removed = true;
        }
        if self.peeked.is_some_and(|capture| capture.slot == slot) {
            self.peeked = None;
        }
    }

    /// First node captured as `capture_index` in the match in `slot`
    pub fn capture_in_match(&self, slot: usize, capture_index: Option<u32>) -> Option<CapturedNode> {
        let capture_index = capture_index?;
        self.matches.get(slot)?.captures.iter().find_map(|(index, node)| {
            (*index == capture_index).then_some(*node)
        })
    }

    /// `(position, is_start, -depth)` of the layer's next event; the smallest
    /// key is processed first. `None` once the layer is exhausted.
    pub fn sort_key(&mut self) -> Option<(usize, bool, isize)> {
        let depth = -(self.depth as isize);
        let next_start = self
            .peek_capture()
            .map(|capture| capture.node.range.start_byte);
        let next_end = self.highlight_end_stack.last().copied();
        match (next_start, next_end) {
            (Some(start), Some(end)) if start < end => Some((start, true, depth)),
            (Some(_), Some(end)) | (None, Some(end)) => Some((end, false, depth)),
            (Some(start), None) => Some((start, true, depth)),
            (None, None) => None,
        }
    }

    /// Language and content of the injection match in `slot`
    pub fn injection_for_match<S>(&self, slot: usize, source: &S) -> Injection
    where
        S: TextSource + ?Sized,
    {
        let mut injection = Injection::default();
        let Some(snapshot) = self.matches.get(slot) else {
            return injection;
        };

        for (index, node) in &snapshot.captures {
            if Some(*index) == self.config.injection_language_capture_index {
                injection.language = Some(source.text_for_range(node.byte_range()).into_owned());
            } else if Some(*index) == self.config.injection_content_capture_index {
                injection.nodes.push(InjectionNode {
                    range: node.range,
                    children: self
                        .injection_children
                        .get(&node.id)
                        .cloned()
                        .unwrap_or_default(),
                });
            }
        }

        apply_injection_properties(
            &mut injection,
            &self.config.query,
            snapshot.pattern_index,
            &self.config.name,
            self.parent.map(|parent| parent.name.as_str()),
        );
        injection
    }
}

/// Range covering the whole document
pub(crate) fn full_range() -> Range {
    Range {
        start_byte: 0,
        end_byte: usize::MAX,
        start_point: Point::new(0, 0),
        end_point: Point::new(usize::MAX, usize::MAX),
    }
}

/// Reusable parsing state shared by every layer of a highlight pass
pub(crate) struct LayerContext<'c, S: ?Sized> {
    pub parser: &'c mut Parser,
    pub cursors: &'c mut Vec<QueryCursor>,
    pub source: &'c S,
    pub cancel: &'c CancellationToken,
    pub check_interval: usize,
}

struct WorkItem<'a> {
    ranges: Vec<Range>,
    config: &'a LanguageConfiguration,
    parent: Option<&'a LanguageConfiguration>,
    depth: usize,
}

/// Parse `ranges` as `config`'s language, discover combined injections and
/// build a layer for each language found, breadth first.
///
/// Returns the layers built so far if the job is cancelled. A root layer
/// that cannot be parsed is an error; failing injected layers are skipped.
pub(crate) fn process_layers<'a, S, F>(
    ranges: Vec<Range>,
    config: &'a LanguageConfiguration,
    parent: Option<&'a LanguageConfiguration>,
    depth: usize,
    context: &mut LayerContext<'_, S>,
    resolve: &F,
) -> Result<Vec<LayerIterator<'a>>, HighlightError>
where
    S: TextSource + ?Sized,
    F: Fn(&str) -> Option<&'a LanguageConfiguration>,
{
    let root_depth = depth;
    let mut layers = Vec::new();
    let mut queue = VecDeque::from([WorkItem {
        ranges,
        config,
        parent,
        depth,
    }]);

    while let Some(item) = queue.pop_front() {
        if context.cancel.is_cancelled() {
            return Ok(layers);
        }

        let tree = match parse_ranges(context, item.config, &item.ranges) {
            Ok(Some(tree)) => tree,
            Ok(None) => return Ok(layers),
            Err(e) if item.depth == root_depth => return Err(e),
            Err(e) => {
                tracing::error!("Skipping injected {} layer: {}", item.config.name, e);
                continue;
            }
        };

        let mut cursor = context.cursors.pop().unwrap_or_else(QueryCursor::new);

        if let Some(combined_query) = &item.config.combined_injections_query {
            let mut injections: Vec<Injection> =
                vec![Injection::default(); combined_query.pattern_count()];
            let language_index = combined_query.capture_index_for_name("injection.language");
            let content_index = combined_query.capture_index_for_name("injection.content");

            combined_query.pattern_matches(&mut cursor, tree.root_node(), context.source, |m| {
                let entry = &mut injections[m.pattern_index];
                let mut found = Injection::default();
                for capture in m.captures {
                    if Some(capture.index) == language_index {
                        found.language = Some(
                            context
                                .source
                                .text_for_range(capture.node.byte_range())
                                .into_owned(),
                        );
                    } else if Some(capture.index) == content_index {
                        entry.nodes.push(InjectionNode::from_node(capture.node));
                    }
                }
                apply_injection_properties(
                    &mut found,
                    combined_query,
                    m.pattern_index,
                    &item.config.name,
                    item.parent.map(|parent| parent.name.as_str()),
                );
                if found.language.is_some() {
                    entry.language = found.language;
                }
                entry.include_children = found.include_children;
                true
            });

            for injection in injections {
                let Some(language) = injection.language.as_deref() else {
                    continue;
                };
                if language.is_empty() || injection.nodes.is_empty() {
                    continue;
                }
                let Some(child_config) = resolve(language) else {
                    tracing::debug!("No language configuration for injection {:?}", language);
                    continue;
                };
                let ranges =
                    intersect_ranges(&item.ranges, &injection.nodes, injection.include_children);
                if !ranges.is_empty() {
                    queue.push_back(WorkItem {
                        ranges,
                        config: child_config,
                        parent: Some(item.config),
                        depth: item.depth + 1,
                    });
                }
            }
        }

        let snapshot = snapshot_captures(&mut cursor, &tree, item.config, context);
        context.cursors.push(cursor);
        let Some((matches, pending, injection_children)) = snapshot else {
            return Ok(layers);
        };

        tracing::trace!(
            "Built {} layer at depth {} with {} captures",
            item.config.name,
            item.depth,
            pending.len()
        );

        layers.push(LayerIterator {
            config: item.config,
            parent: item.parent,
            ranges: item.ranges,
            depth: item.depth,
            matches,
            pending,
            peeked: None,
            injection_children,
            scope_stack: ScopeStack::new(),
            highlight_end_stack: Vec::new(),
        });
    }

    Ok(layers)
}

/// `Ok(None)` when parsing was abandoned because the job was cancelled
fn parse_ranges<S>(
    context: &mut LayerContext<'_, S>,
    config: &LanguageConfiguration,
    ranges: &[Range],
) -> Result<Option<tree_sitter::Tree>, HighlightError>
where
    S: TextSource + ?Sized,
{
    let parser = &mut *context.parser;
    parser.reset();
    parser
        .set_language(&config.language)
        .map_err(|_| HighlightError::InvalidLanguage {
            language: config.name.clone(),
        })?;
    parser
        .set_included_ranges(ranges)
        .map_err(|_| HighlightError::InvalidRanges {
            language: config.name.clone(),
        })?;

    let source = context.source;
    let cancel = context.cancel;
    let mut read = |offset: usize, _: Point| source.read_chunk(offset);
    let mut progress = |_: &tree_sitter::ParseState| cancel.is_cancelled();
    let options = ParseOptions::new().progress_callback(&mut progress);
    let tree = parser.parse_with_options(&mut read, None, Some(options));

    match tree {
        Some(tree) => Ok(Some(tree)),
        None if cancel.is_cancelled() => Ok(None),
        None => {
            tracing::error!("Failed to parse {} source", config.name);
            Err(HighlightError::ParseFailed {
                language: config.name.clone(),
            })
        }
    }
}

type Snapshot = (Vec<MatchSnapshot>, VecDeque<Capture>, HashMap<usize, Vec<Range>>);

/// Drain the query's captures over `tree`. `None` if cancelled midway.
fn snapshot_captures<S>(
    cursor: &mut QueryCursor,
    tree: &tree_sitter::Tree,
    config: &LanguageConfiguration,
    context: &LayerContext<'_, S>,
) -> Option<Snapshot>
where
    S: TextSource + ?Sized,
{
    let mut slots: HashMap<u32, usize> = HashMap::new();
    let mut matches: Vec<MatchSnapshot> = Vec::new();
    let mut pending = VecDeque::new();
    let mut injection_children = HashMap::new();
    let check_interval = context.check_interval.max(1);

    let mut captures = cursor.captures(
        config.query.inner(),
        tree.root_node(),
        NodeText(context.source),
    );
    let mut count = 0usize;
    while let Some((m, capture_position)) = captures.next() {
        count += 1;
        if count % check_interval == 0 && context.cancel.is_cancelled() {
            return None;
        }

        let slot = *slots.entry(m.id()).or_insert_with(|| {
            matches.push(MatchSnapshot {
                pattern_index: m.pattern_index,
                captures: Vec::new(),
                removed: false,
            });
            matches.len() - 1
        });
        let snapshot = &mut matches[slot];
        if m.captures.len() > snapshot.captures.len() {
            snapshot.captures = m
                .captures
                .iter()
                .map(|capture| (capture.index, CapturedNode::new(capture.node)))
                .collect();
        }

        let capture = m.captures[*capture_position];
        if Some(capture.index) == config.injection_content_capture_index {
            injection_children
                .entry(capture.node.id())
                .or_insert_with(|| InjectionNode::from_node(capture.node).children);
        }
        pending.push_back(Capture {
            slot,
            pattern_index: m.pattern_index,
            index: capture.index,
            node: CapturedNode::new(capture.node),
        });
    }

    for snapshot in &mut matches {
        if !config.query.satisfies_predicates(&*snapshot, context.source) {
            snapshot.removed = true;
        }
    }

    Some((matches, pending, injection_children))
}

/// Ranges of `nodes`, minus their children unless `include_children`,
/// clipped to `parent_ranges`
pub(crate) fn intersect_ranges(
    parent_ranges: &[Range],
    nodes: &[InjectionNode],
    include_children: bool,
) -> Vec<Range> {
    let mut result = Vec::new();
    let mut parent_range_iter = parent_ranges.iter();
    let Some(mut parent_range) = parent_range_iter.next() else {
        return result;
    };

    for node in nodes {
        let mut preceding_range = Range {
            start_byte: 0,
            start_point: Point::new(0, 0),
            end_byte: node.range.start_byte,
            end_point: node.range.start_point,
        };
        let following_range = Range {
            start_byte: node.range.end_byte,
            start_point: node.range.end_point,
            end_byte: usize::MAX,
            end_point: Point::new(usize::MAX, usize::MAX),
        };

        let children: &[Range] = if include_children {
            &[]
        } else {
            &node.children
        };
        for excluded_range in children.iter().copied().chain(std::iter::once(following_range)) {
            let mut range = Range {
                start_byte: preceding_range.end_byte,
                start_point: preceding_range.end_point,
                end_byte: excluded_range.start_byte,
                end_point: excluded_range.start_point,
            };
            preceding_range = excluded_range;

            if range.end_byte < range.start_byte {
                continue;
            }

            while parent_range.start_byte <= range.end_byte {
                if parent_range.end_byte > range.start_byte {
                    if range.start_byte < parent_range.start_byte {
                        range.start_byte = parent_range.start_byte;
                        range.start_point = parent_range.start_point;
                    }

                    if parent_range.end_byte < range.end_byte {
                        if range.start_byte < parent_range.end_byte {
                            result.push(Range {
                                start_byte: range.start_byte,
                                start_point: range.start_point,
                                end_byte: parent_range.end_byte,
                                end_point: parent_range.end_point,
                            });
                        }
                        range.start_byte = parent_range.end_byte;
                        range.start_point = parent_range.end_point;
                    } else {
                        if range.start_byte < range.end_byte {
                            result.push(range);
                        }
                        break;
                    }
                }

                match parent_range_iter.next() {
                    Some(next) => parent_range = next,
                    None => return result,
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: usize, end: usize) -> Range {
        Range {
            start_byte: start,
            end_byte: end,
            start_point: Point::new(0, start),
            end_point: Point::new(0, end),
        }
    }

    fn node(start: usize, end: usize, children: &[(usize, usize)]) -> InjectionNode {
        InjectionNode {
            range: range(start, end),
            children: children.iter().map(|&(s, e)| range(s, e)).collect(),
        }
    }

    fn bytes(ranges: &[Range]) -> Vec<(usize, usize)> {
        ranges.iter().map(|r| (r.start_byte, r.end_byte)).collect()
    }

    #[test]
    fn test_intersect_whole_document_parent() {
        let result = intersect_ranges(&[full_range()], &[node(4, 10, &[])], false);
        assert_eq!(bytes(&result), vec![(4, 10)]);
    }

    #[test]
    fn test_intersect_excludes_children() {
        let nodes = [node(0, 20, &[(5, 8), (12, 15)])];
        let result = intersect_ranges(&[full_range()], &nodes, false);
        assert_eq!(bytes(&result), vec![(0, 5), (8, 12), (15, 20)]);
    }

    #[test]
    fn test_intersect_include_children_keeps_node_whole() {
        let nodes = [node(0, 20, &[(5, 8), (12, 15)])];
        let result = intersect_ranges(&[full_range()], &nodes, true);
        assert_eq!(bytes(&result), vec![(0, 20)]);
    }

    #[test]
    fn test_intersect_clips_to_parent_ranges() {
        let parents = [range(2, 6), range(9, 30)];
        let nodes = [node(0, 12, &[]), node(20, 40, &[])];
        let result = intersect_ranges(&parents, &nodes, false);
        assert_eq!(bytes(&result), vec![(2, 6), (9, 12), (20, 30)]);
    }

    #[test]
    fn test_intersect_outside_parent_is_empty() {
        let result = intersect_ranges(&[range(0, 5)], &[node(10, 20, &[])], false);
        assert!(result.is_empty());
    }

    #[test]
    fn test_intersect_empty_parent_ranges() {
        assert!(intersect_ranges(&[], &[node(0, 5, &[])], false).is_empty());
    }

    #[test]
    fn test_intersect_combined_nodes_stay_sorted() {
        let nodes = [node(0, 3, &[]), node(10, 13, &[]), node(20, 23, &[])];
        let result = intersect_ranges(&[full_range()], &nodes, false);
        assert_eq!(bytes(&result), vec![(0, 3), (10, 13), (20, 23)]);
    }
}
