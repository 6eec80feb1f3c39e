//! Syntax highlighting module
//!
//! Tree-sitter based highlighting of documents that embed other languages:
//! - Per-language queries split into injection, locals and highlight sections
//! - A forest of layers, one per injected language region
//! - A merged, position-ordered stream of highlight start/end events
//!
//! ## Architecture
//!
//! ```text
//! LanguageRegistry ─ resolve(name) ─┐
//!                                   ▼
//! TextSource → Highlighter → [LayerIterator, ...] → HighlightIter → HighlightEvent
//!                                                        │
//!                                                        └→ collect() → SyntaxHighlights
//! ```
//!
//! Layers are discovered lazily: injection captures found while merging spawn
//! new layers that are inserted into the sorted layer list.

mod cancel;
mod highlighter;
mod highlights;
mod language_config;
mod languages;
mod layer;
mod locals;
mod query;
mod text;
mod theme_table;

pub use cancel::CancellationToken;
pub use highlighter::{HighlightIter, Highlighter, CANCELLATION_CHECK_INTERVAL};
pub use highlights::{
    HighlightEvent, HighlightSpan, HighlightToken, LineHighlights, SyntaxHighlights,
};
pub use language_config::LanguageConfiguration;
pub use languages::LanguageRegistry;
pub use query::{CaptureLookup, Predicate, Property, PropertyKind, Query};
pub use text::{TextSource, READ_CHUNK_SIZE};
pub use theme_table::{Highlight, HighlightStyle, HighlightThemeTable, ThemeEntry};
