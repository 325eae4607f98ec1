//! Error types for docdex-index.

use std::path::PathBuf;

/// Errors that can occur while splitting, indexing or retrieving documents.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading documents or store files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedding or classifier error.
    #[error("LLM error: {0}")]
    Llm(#[from] docdex_llm::LlmError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File watcher error.
    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// A changed path does not live under the documentation root.
    #[error("path {} is outside the documentation root", .0.display())]
    OutsideRoot(PathBuf),

    /// Generic catch-all error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
