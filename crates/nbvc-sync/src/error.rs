//! Error types for the sync engine.

use std::path::PathBuf;

use nbvc_core::NotebookError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Failed to parse the YAML text.
    #[error("Parse error{}: {message}", position_suffix(*line, *column))]
    ParseError {
        message: String,
        line: Option<usize>,
        column: Option<usize>,
    },

    /// The parsed YAML is not shaped like a notebook.
    #[error("Invalid notebook document: {0}")]
    InvalidDocument(String),

    /// An externalized output referenced by the document does not exist.
    #[error("Missing output file {}{}", path.display(), location_suffix(*cell, *output))]
    MissingOutputFile {
        path: PathBuf,
        mime: String,
        cell: Option<usize>,
        output: Option<usize>,
    },

    /// An output payload could not be decoded or encoded.
    #[error("Invalid {mime} payload{}: {message}", location_suffix(*cell, *output))]
    InvalidPayload {
        mime: String,
        message: String,
        cell: Option<usize>,
        output: Option<usize>,
    },

    /// The notebook's format version is below what the upgrade path handles.
    #[error("Unsupported notebook version: {major}.{minor}")]
    UnsupportedVersion { major: i64, minor: i64 },

    /// Failed to read a file or directory.
    #[error("Failed to read file {}: {message}", path.display())]
    ReadError { path: PathBuf, message: String },

    /// Failed to write a file or directory.
    #[error("Failed to write file {}: {message}", path.display())]
    WriteError { path: PathBuf, message: String },

    /// The notebook builder rejected the document.
    #[error("Notebook error: {0}")]
    Notebook(NotebookError),

    /// Failed to serialize/deserialize JSON.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The sync configuration is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Attach the position of the output being processed to payload errors.
    pub fn at_output(self, cell_index: usize, output_index: usize) -> Self {
        match self {
            SyncError::MissingOutputFile { path, mime, .. } => SyncError::MissingOutputFile {
                path,
                mime,
                cell: Some(cell_index),
                output: Some(output_index),
            },
            SyncError::InvalidPayload { mime, message, .. } => SyncError::InvalidPayload {
                mime,
                message,
                cell: Some(cell_index),
                output: Some(output_index),
            },
            other => other,
        }
    }
}

impl From<NotebookError> for SyncError {
    fn from(err: NotebookError) -> Self {
        match err {
            NotebookError::UnsupportedVersion(major, minor) => {
                SyncError::UnsupportedVersion { major, minor }
            }
            NotebookError::Read { path, source } => SyncError::ReadError {
                path,
                message: source.to_string(),
            },
            other => SyncError::Notebook(other),
        }
    }
}

impl From<serde_yaml::Error> for SyncError {
    fn from(err: serde_yaml::Error) -> Self {
        let location = err.location();
        SyncError::ParseError {
            message: err.to_string(),
            line: location.as_ref().map(|l| l.line()),
            column: location.as_ref().map(|l| l.column()),
        }
    }
}

fn position_suffix(line: Option<usize>, column: Option<usize>) -> String {
    match (line, column) {
        (Some(line), Some(column)) => format!(" at line {line}, column {column}"),
        _ => String::new(),
    }
}

fn location_suffix(cell: Option<usize>, output: Option<usize>) -> String {
    match (cell, output) {
        (Some(cell), Some(output)) => format!(" (cell {cell}, output {output})"),
        _ => String::new(),
    }
}
