//! Error types for the highlighting engine

use thiserror::Error;

/// Reasons a highlight job produced no result
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HighlightError {
    /// The job's cancellation token was set. Not a failure.
    #[error("highlighting was cancelled")]
    Cancelled,

    #[error("parser rejected the grammar for {language}")]
    InvalidLanguage { language: String },

    #[error("invalid included ranges for {language}")]
    InvalidRanges { language: String },

    #[error("failed to parse {language} source")]
    ParseFailed { language: String },

    #[error("unknown language {language}")]
    UnknownLanguage { language: String },

    #[error("query error in {language}: {message}")]
    Query { language: String, message: String },
}

impl HighlightError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, HighlightError::Cancelled)
    }
}

/// A query source that failed to compile
#[derive(Debug, Error)]
#[error("{language} query error at {row}:{column}: {message}")]
pub struct QueryCompileError {
    pub language: String,
    /// 1-based row within the concatenated query source
    pub row: usize,
    /// 1-based column
    pub column: usize,
    pub message: String,
    #[source]
    pub source: tree_sitter::QueryError,
}

impl QueryCompileError {
    pub fn new(language: &str, source: tree_sitter::QueryError) -> Self {
        Self {
            language: language.to_string(),
            row: source.row + 1,
            column: source.column + 1,
            message: source.message.clone(),
            source,
        }
    }
}

impl From<QueryCompileError> for HighlightError {
    fn from(err: QueryCompileError) -> Self {
        HighlightError::Query {
            language: err.language.clone(),
            message: err.to_string(),
        }
    }
}
