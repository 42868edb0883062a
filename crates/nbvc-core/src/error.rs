//! Error types for the notebook document model.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for notebook document operations.
pub type NotebookResult<T> = Result<T, NotebookError>;

/// Errors that can occur while reading, upgrading or building a notebook.
#[derive(Debug, Error)]
pub enum NotebookError {
    /// The document's `nbformat` version is outside what can be read or upgraded.
    #[error("unsupported notebook version: {0}.{1}")]
    UnsupportedVersion(i64, i64),

    /// The document is not valid JSON, or does not have the shape of a notebook.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document parsed but breaks a notebook invariant.
    #[error("invalid notebook: {0}")]
    Validation(String),

    /// Failed to read a notebook file.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}
