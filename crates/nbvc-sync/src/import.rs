//! `.ipynb.yaml` → notebook import.

use std::fs;
use std::path::Path;

use nbvc_core::v4;
use serde_json::{Map, Value};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::store::OutputStore;

/// Importer from the `.ipynb.yaml` text format back to notebooks.
#[derive(Debug, Clone, Default)]
pub struct Importer {
    config: SyncConfig,
}

impl Importer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SyncConfig) -> Self {
        Self { config }
    }

    /// Rebuild a notebook from YAML text.
    ///
    /// Fields the exporter omits are restored: an empty `metadata` on every
    /// cell and on every output except streams, and an empty `outputs` list on
    /// code cells. Externalized payloads are read back relative to `root_dir`.
    ///
    /// # Errors
    /// Returns [`SyncError::ParseError`] for malformed YAML,
    /// [`SyncError::InvalidDocument`] when the document is not notebook shaped,
    /// and [`SyncError::MissingOutputFile`] when a referenced file is gone.
    pub fn from_text(&self, text: &str, root_dir: impl AsRef<Path>) -> SyncResult<v4::Notebook> {
        self.config.validate()?;
        let store = OutputStore::new(root_dir, &self.config);

        let mut document: Value = serde_yaml::from_str(text)?;
        let Some(root) = document.as_object_mut() else {
            return Err(SyncError::InvalidDocument(
                "document root is not a mapping".to_string(),
            ));
        };

        match root.get_mut("cells") {
            Some(Value::Array(cells)) => {
                for (cell_index, cell) in cells.iter_mut().enumerate() {
                    restore_cell(&store, cell_index, cell)?;
                }
            }
            Some(_) => {
                return Err(SyncError::InvalidDocument(
                    "`cells` is not a sequence".to_string(),
                ));
            }
            None => {
                return Err(SyncError::InvalidDocument("missing `cells`".to_string()));
            }
        }

        Ok(nbvc_core::build_notebook(document)?)
    }

    /// Read and import an `.ipynb.yaml` file. References resolve against the
    /// file's directory.
    pub fn import_file(&self, yaml_path: impl AsRef<Path>) -> SyncResult<v4::Notebook> {
        let yaml_path = yaml_path.as_ref();
        let text = fs::read_to_string(yaml_path).map_err(|e| SyncError::ReadError {
            path: yaml_path.to_path_buf(),
            message: e.to_string(),
        })?;
        let root_dir = yaml_path.parent().unwrap_or(Path::new(""));
        self.from_text(&text, root_dir)
    }
}

fn restore_cell(store: &OutputStore, cell_index: usize, cell: &mut Value) -> SyncResult<()> {
    let Some(cell) = cell.as_object_mut() else {
        return Err(SyncError::InvalidDocument(format!(
            "cell {cell_index} is not a mapping"
        )));
    };

    backfill_metadata(cell);

    let is_code = cell.get("cell_type").and_then(Value::as_str) == Some("code");
    match cell.get_mut("outputs") {
        Some(Value::Array(outputs)) => {
            for (output_index, output) in outputs.iter_mut().enumerate() {
                restore_output(store, output)
                    .map_err(|e| e.at_output(cell_index, output_index))?;
            }
        }
        Some(_) => {
            return Err(SyncError::InvalidDocument(format!(
                "outputs of cell {cell_index} are not a sequence"
            )));
        }
        None if is_code => {
            cell.insert("outputs".to_string(), Value::Array(Vec::new()));
        }
        None => {}
    }

    Ok(())
}

fn restore_output(store: &OutputStore, output: &mut Value) -> SyncResult<()> {
    let Some(output) = output.as_object_mut() else {
        return Err(SyncError::InvalidDocument(
            "output is not a mapping".to_string(),
        ));
    };

    if output.get("output_type").and_then(Value::as_str) != Some("stream") {
        backfill_metadata(output);
    }

    if let Some(Value::Object(data)) = output.get_mut("data") {
        for (mime, payload) in data.iter_mut() {
            *payload = store.load(mime, payload)?;
        }
    }

    Ok(())
}

fn backfill_metadata(node: &mut Map<String, Value>) {
    node.entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
}
