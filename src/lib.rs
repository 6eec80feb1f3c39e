//! token-syntax - layered tree-sitter syntax highlighting
//!
//! Highlights documents that embed other languages (scripts in HTML, SQL in
//! string literals, ...) by parsing each embedded region as its own layer
//! and merging every layer's captures into one ordered stream of highlight
//! events.

pub mod cli;
pub mod config;
pub mod config_paths;
pub mod error;
pub mod syntax;
pub mod theme;
pub mod tracing;
pub mod worker;

// Re-export commonly used types
pub use config::HighlighterConfig;
pub use error::{HighlightError, QueryCompileError};
pub use syntax::{
    CancellationToken, Highlight, HighlightEvent, HighlightThemeTable, Highlighter,
    LanguageConfiguration, LanguageRegistry, SyntaxHighlights, TextSource,
};
pub use theme::Theme;
pub use worker::{DocumentId, HighlightRequest, HighlightResult, HighlightWorker};
