//! Notebook document model for nbvc.
//!
//! Reads `.ipynb` documents in nbformat 3 or 4, upgrades them to nbformat 4,
//! rebuilds validated notebooks from generic JSON trees, and writes the
//! canonical `.ipynb` JSON layout (one-space indent, sorted keys, multiline
//! strings stored as line lists, trailing newline).
//!
//! ```text
//! .ipynb ──► parse_notebook ──► Notebook::{V3, V4} ──► upgrade_notebook ──► v4::Notebook
//!                                                                               │
//! generic tree ──► build_notebook ─────────────────────────────────────────────┤
//!                                                                               ▼
//!                                                                      serialize_notebook
//! ```

mod error;
pub mod v3;
pub mod v4;

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Serialize as _;
use serde_json::Value;

pub use error::{NotebookError, NotebookResult};
pub use v4::is_json_mime;

/// The lowest nbformat major version the codec works with.
pub const MIN_NBFORMAT: i64 = 4;

/// Minor version assigned to notebooks upgraded from nbformat 3. Minor 5
/// requires cell ids, which an upgrade has no stable source for.
pub const UPGRADED_NBFORMAT_MINOR: i64 = 4;

/// A notebook as read from disk, before any upgrade.
#[derive(Debug, Clone)]
pub enum Notebook {
    V4(v4::Notebook),
    V3(v3::Notebook),
}

impl Notebook {
    /// The `(nbformat, nbformat_minor)` pair of the document.
    pub fn version(&self) -> (i64, i64) {
        match self {
            Notebook::V4(nb) => (nb.nbformat, nb.nbformat_minor),
            Notebook::V3(nb) => (nb.nbformat, nb.nbformat_minor),
        }
    }
}

impl From<v4::Notebook> for Notebook {
    fn from(notebook: v4::Notebook) -> Self {
        Notebook::V4(notebook)
    }
}

fn version_of(tree: &Value) -> (i64, i64) {
    let major = tree.get("nbformat").and_then(Value::as_i64).unwrap_or(0);
    let minor = tree.get("nbformat_minor").and_then(Value::as_i64).unwrap_or(0);
    (major, minor)
}

/// Parse `.ipynb` JSON in any supported version.
pub fn parse_notebook(json: &str) -> NotebookResult<Notebook> {
    let tree: Value = serde_json::from_str(json)?;
    match version_of(&tree) {
        (4, _) => Ok(Notebook::V4(build_notebook(tree)?)),
        (3, _) => Ok(Notebook::V3(serde_json::from_value(tree)?)),
        (major, minor) => Err(NotebookError::UnsupportedVersion(major, minor)),
    }
}

/// Read and parse an `.ipynb` file.
pub fn read_notebook(path: impl AsRef<Path>) -> NotebookResult<Notebook> {
    let path = path.as_ref();
    let json = fs::read_to_string(path).map_err(|source| NotebookError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_notebook(&json)
}

/// Build a validated nbformat 4 notebook from a generic JSON tree.
///
/// This is the one place notebooks get constructed from untyped data, so every
/// importer produces exactly what [`parse_notebook`] would for the same JSON.
///
/// # Errors
/// Fails when the tree is not nbformat 4, misses fields the format requires,
/// or carries malformed or duplicate cell ids.
pub fn build_notebook(tree: Value) -> NotebookResult<v4::Notebook> {
    let (major, minor) = version_of(&tree);
    if major != MIN_NBFORMAT {
        return Err(NotebookError::UnsupportedVersion(major, minor));
    }

    let notebook: v4::Notebook = serde_json::from_value(tree)?;
    validate(&notebook)?;
    Ok(notebook)
}

fn validate(notebook: &v4::Notebook) -> NotebookResult<()> {
    let mut seen_ids = HashSet::new();
    for (index, cell) in notebook.cells.iter().enumerate() {
        let Some(id) = cell.id() else { continue };

        let well_formed = (1..=64).contains(&id.len())
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !well_formed {
            return Err(NotebookError::Validation(format!(
                "cell {index} has malformed id {id:?}"
            )));
        }
        if !seen_ids.insert(id) {
            return Err(NotebookError::Validation(format!(
                "duplicate cell id {id:?} at cell {index}"
            )));
        }
    }
    Ok(())
}

/// Upgrade a notebook to nbformat 4.
///
/// One-way and idempotent: an nbformat 4 notebook comes back unchanged.
pub fn upgrade_notebook(notebook: Notebook) -> NotebookResult<v4::Notebook> {
    match notebook {
        Notebook::V4(nb) if nb.nbformat == MIN_NBFORMAT => Ok(nb),
        Notebook::V4(nb) => Err(NotebookError::UnsupportedVersion(
            nb.nbformat,
            nb.nbformat_minor,
        )),
        Notebook::V3(nb) => Ok(upgrade_v3_notebook(nb)),
    }
}

/// Upgrade an nbformat 3 notebook: worksheets are flattened, heading cells
/// become markdown, and rich outputs move their media into MIME bundles.
/// The source version is kept as `orig_nbformat` / `orig_nbformat_minor` in
/// the notebook metadata.
pub fn upgrade_v3_notebook(v3_notebook: v3::Notebook) -> v4::Notebook {
    let cells: Vec<v4::Cell> = v3_notebook
        .worksheets
        .into_iter()
        .flat_map(|worksheet| worksheet.cells)
        .map(upgrade_v3_cell)
        .collect();

    let mut metadata = v3_notebook.metadata;
    metadata.remove("name");
    metadata.remove("signature");
    metadata.insert("orig_nbformat".to_string(), v3_notebook.nbformat.into());
    metadata.insert(
        "orig_nbformat_minor".to_string(),
        v3_notebook.nbformat_minor.into(),
    );

    tracing::debug!("Upgraded nbformat 3 notebook ({} cells)", cells.len());

    v4::Notebook {
        metadata,
        nbformat: MIN_NBFORMAT,
        nbformat_minor: UPGRADED_NBFORMAT_MINOR,
        cells,
    }
}

fn upgrade_v3_cell(cell: v3::Cell) -> v4::Cell {
    match cell {
        v3::Cell::Heading {
            level,
            metadata,
            source,
        } => {
            let single_line = source.lines().collect::<Vec<_>>().join(" ");
            v4::Cell::Markdown {
                id: None,
                metadata,
                source: format!("{} {}", "#".repeat(level), single_line),
                attachments: None,
            }
        }
        v3::Cell::Markdown { metadata, source } => v4::Cell::Markdown {
            id: None,
            metadata,
            source,
            attachments: None,
        },
        v3::Cell::Code {
            mut metadata,
            input,
            prompt_number,
            collapsed,
            outputs,
        } => {
            if let Some(collapsed) = collapsed {
                metadata.insert("collapsed".to_string(), Value::Bool(collapsed));
            }
            v4::Cell::Code {
                id: None,
                metadata,
                source: input,
                outputs: outputs.into_iter().map(upgrade_v3_output).collect(),
                execution_count: prompt_number,
            }
        }
        v3::Cell::Raw { metadata, source } => v4::Cell::Raw {
            id: None,
            metadata,
            source,
            attachments: None,
        },
    }
}

fn upgrade_v3_output(output: v3::Output) -> v4::Output {
    match output {
        v3::Output::Stream { stream, text } => v4::Output::Stream {
            name: stream.unwrap_or_else(|| "stdout".to_string()),
            text,
        },
        v3::Output::Pyout {
            prompt_number,
            metadata,
            media,
        } => v4::Output::ExecuteResult {
            execution_count: prompt_number,
            data: upgrade_v3_media(media),
            metadata: upgrade_v3_media_metadata(metadata),
        },
        v3::Output::DisplayData { metadata, media } => v4::Output::DisplayData {
            data: upgrade_v3_media(media),
            metadata: upgrade_v3_media_metadata(metadata),
        },
        v3::Output::Pyerr {
            ename,
            evalue,
            traceback,
        } => v4::Output::Error {
            ename,
            evalue,
            traceback,
        },
    }
}

fn upgrade_v3_media(media: serde_json::Map<String, Value>) -> v4::MimeBundle {
    media
        .into_iter()
        .map(|(key, value)| {
            let mime = v3::mime_for_key(&key).to_string();
            let value = if is_json_mime(&mime) {
                // v3 stored JSON payloads as encoded strings.
                match value {
                    Value::String(encoded) => {
                        serde_json::from_str(&encoded).unwrap_or(Value::String(encoded))
                    }
                    other => other,
                }
            } else {
                v4::join_lines(&value).map(Value::String).unwrap_or(value)
            };
            (mime, value)
        })
        .collect()
}

fn upgrade_v3_media_metadata(metadata: v4::Metadata) -> v4::Metadata {
    metadata
        .into_iter()
        .map(|(key, value)| (v3::mime_for_key(&key).to_string(), value))
        .collect()
}

/// Serialize a notebook to canonical `.ipynb` JSON.
pub fn serialize_notebook(notebook: &v4::Notebook) -> NotebookResult<String> {
    let mut value = serde_json::to_value(notebook)?;
    split_multiline_fields(&mut value);

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    buf.push(b'\n');

    String::from_utf8(buf).map_err(|e| NotebookError::Validation(e.to_string()))
}

/// Store `source`, stream `text` and textual MIME payloads as line lists.
fn split_multiline_fields(notebook: &mut Value) {
    let Some(cells) = notebook.get_mut("cells").and_then(Value::as_array_mut) else {
        return;
    };

    for cell in cells.iter_mut().filter_map(Value::as_object_mut) {
        if let Some(Value::String(source)) = cell.get("source") {
            let lines = v4::split_lines(source);
            cell.insert("source".to_string(), lines);
        }

        let Some(outputs) = cell.get_mut("outputs").and_then(Value::as_array_mut) else {
            continue;
        };
        for output in outputs.iter_mut().filter_map(Value::as_object_mut) {
            if let Some(Value::String(text)) = output.get("text") {
                let lines = v4::split_lines(text);
                output.insert("text".to_string(), lines);
            }
            if let Some(data) = output.get_mut("data").and_then(Value::as_object_mut) {
                for (mime, payload) in data.iter_mut() {
                    if is_json_mime(mime) {
                        continue;
                    }
                    if let Value::String(text) = payload {
                        *payload = v4::split_lines(text);
                    }
                }
            }
        }
    }
}
