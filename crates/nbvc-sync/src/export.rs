//! Notebook → `.ipynb.yaml` export.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use nbvc_core::v4::Cell;
use nbvc_core::{Notebook, upgrade_notebook};
use serde_json::{Map, Value};

use crate::config::{OutputTypes, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::order::{CELL_ORDER, DATA_ORDER, KeyOrder, OUTPUT_ORDER, prune_empty_metadata, reorder_keys};
use crate::store::{OutputStore, ensure_new_directory};
use crate::yaml::{self, Node};

/// Where an export writes its externalized outputs, and what it wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resources {
    /// Directory the text document lives in. References are relative to it.
    pub root_dir: PathBuf,

    /// Directory receiving externalized outputs, relative to `root_dir`.
    pub output_files_dir: PathBuf,

    /// References written by the export, sorted.
    pub outputs: Vec<String>,
}

impl Resources {
    pub fn new(root_dir: impl AsRef<Path>, output_files_dir: impl AsRef<Path>) -> Self {
        Self {
            root_dir: root_dir.as_ref().to_path_buf(),
            output_files_dir: output_files_dir.as_ref().to_path_buf(),
            outputs: Vec::new(),
        }
    }

    /// The output directory as a path usable from the current directory.
    pub fn output_dir(&self) -> PathBuf {
        self.root_dir.join(&self.output_files_dir)
    }
}

/// What a mapping in the emitted tree stands for.
#[derive(Debug, Clone)]
enum Record {
    Cell {
        fields: Map<String, Value>,
        outputs: Option<Vec<Record>>,
    },
    Output {
        fields: Map<String, Value>,
    },
    Node(Value),
}

impl Record {
    fn into_node(self, types: &OutputTypes) -> Node {
        match self {
            Record::Cell {
                mut fields,
                outputs,
            } => {
                prune_empty_metadata(&mut fields);
                let mut entries: Vec<(String, Node)> = fields
                    .iter()
                    .map(|(key, value)| {
                        let node = if key == "source" {
                            Node::literal_from_json(value)
                        } else {
                            Node::from_json(value)
                        };
                        (key.clone(), node)
                    })
                    .collect();

                if let Some(outputs) = outputs.filter(|outputs| !outputs.is_empty()) {
                    let outputs = outputs.into_iter().map(|o| o.into_node(types)).collect();
                    entries.push(("outputs".to_string(), Node::Seq(outputs)));
                }

                ordered(entries, &CELL_ORDER)
            }
            Record::Output { mut fields } => {
                prune_empty_metadata(&mut fields);
                let output_type = fields
                    .get("output_type")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();

                let entries = fields
                    .iter()
                    .map(|(key, value)| {
                        let node = match (output_type.as_str(), key.as_str()) {
                            ("stream", "text") => Node::literal_from_json(value),
                            ("display_data" | "execute_result", "data") => data_node(value, types),
                            _ => Node::from_json(value),
                        };
                        (key.clone(), node)
                    })
                    .collect();

                ordered(entries, &OUTPUT_ORDER)
            }
            Record::Node(value) => Node::from_json(&value),
        }
    }
}

/// MIME bundle with `text/plain` first and inline payloads as literal blocks.
fn data_node(data: &Value, types: &OutputTypes) -> Node {
    let Value::Object(bundle) = data else {
        return Node::from_json(data);
    };
    let entries = bundle
        .iter()
        .map(|(mime, payload)| {
            let node = if types.is_inline(mime) {
                Node::literal_from_json(payload)
            } else {
                Node::from_json(payload)
            };
            (mime.clone(), node)
        })
        .collect();
    ordered(entries, &DATA_ORDER)
}

/// Sort entries by key, then move the priority keys of `order` to the front.
fn ordered(mut entries: Vec<(String, Node)>, order: &KeyOrder) -> Node {
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    reorder_keys(&mut entries, order);
    Node::Map(entries)
}

/// Exporter from notebooks to the `.ipynb.yaml` text format.
#[derive(Debug, Clone, Default)]
pub struct Exporter {
    config: SyncConfig,
}

impl Exporter {
    /// Create an exporter with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SyncConfig) -> Self {
        Self { config }
    }

    /// Export a notebook to YAML text.
    ///
    /// The notebook is upgraded to nbformat 4 first. The output directory
    /// named by `resources` is emptied (or created) and receives every payload
    /// that is not kept inline. Returns the text and the resources, listing
    /// the references that were written.
    ///
    /// # Errors
    /// Fails on notebooks that cannot be upgraded, on undecodable payloads,
    /// and on filesystem errors. Nothing is returned on failure, though files
    /// already written to the output directory stay there.
    pub fn from_notebook(
        &self,
        notebook: impl Into<Notebook>,
        resources: &Resources,
    ) -> SyncResult<(String, Resources)> {
        self.config.validate()?;
        let notebook = upgrade_notebook(notebook.into())?;

        ensure_new_directory(&resources.output_dir())?;
        let store = OutputStore::new(&resources.root_dir, &self.config);

        let mut written = BTreeSet::new();
        let mut cells = Vec::with_capacity(notebook.cells.len());
        for (cell_index, cell) in notebook.cells.iter().enumerate() {
            let record = cell_record(
                &store,
                &resources.output_files_dir,
                cell_index,
                cell,
                &mut written,
            )?;
            cells.push(record.into_node(store.types()));
        }

        let document = Node::Map(vec![
            ("cells".to_string(), Node::Seq(cells)),
            (
                "metadata".to_string(),
                Record::Node(Value::Object(notebook.metadata)).into_node(store.types()),
            ),
            (
                "nbformat".to_string(),
                Record::Node(notebook.nbformat.into()).into_node(store.types()),
            ),
            (
                "nbformat_minor".to_string(),
                Record::Node(notebook.nbformat_minor.into()).into_node(store.types()),
            ),
        ]);

        tracing::debug!(
            "Exported {} cells, {} externalized outputs",
            notebook.cells.len(),
            written.len()
        );

        let resources = Resources {
            outputs: written.into_iter().collect(),
            ..resources.clone()
        };
        Ok((yaml::to_string(&document), resources))
    }

    /// Read an `.ipynb` file, export it, and write the text to `yaml_path`.
    ///
    /// Outputs go to `<notebook name>_files` next to `yaml_path`.
    pub fn export_file(
        &self,
        ipynb_path: impl AsRef<Path>,
        yaml_path: impl AsRef<Path>,
    ) -> SyncResult<Resources> {
        let ipynb_path = ipynb_path.as_ref();
        let yaml_path = yaml_path.as_ref();

        let notebook = nbvc_core::read_notebook(ipynb_path)?;
        let root_dir = yaml_path.parent().unwrap_or(Path::new(""));
        let resources = Resources::new(root_dir, crate::default_output_files_dir(ipynb_path));

        let (text, resources) = self.from_notebook(notebook, &resources)?;
        fs::write(yaml_path, text).map_err(|e| SyncError::WriteError {
            path: yaml_path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(resources)
    }
}

fn cell_record(
    store: &OutputStore,
    output_files_dir: &Path,
    cell_index: usize,
    cell: &Cell,
    written: &mut BTreeSet<String>,
) -> SyncResult<Record> {
    let Value::Object(mut fields) = serde_json::to_value(cell)? else {
        return Err(SyncError::InvalidDocument(format!(
            "cell {cell_index} did not serialize to a mapping"
        )));
    };

    let outputs = match fields.remove("outputs") {
        Some(Value::Array(outputs)) => {
            let mut records = Vec::with_capacity(outputs.len());
            for (output_index, output) in outputs.into_iter().enumerate() {
                let record = output_record(store, output_files_dir, output, written)
                    .map_err(|e| e.at_output(cell_index, output_index))?;
                records.push(record);
            }
            Some(records)
        }
        Some(other) => {
            fields.insert("outputs".to_string(), other);
            None
        }
        None => None,
    };

    Ok(Record::Cell { fields, outputs })
}

/// Route every non-inline payload of a rich output through the store.
fn output_record(
    store: &OutputStore,
    output_files_dir: &Path,
    output: Value,
    written: &mut BTreeSet<String>,
) -> SyncResult<Record> {
    let Value::Object(mut fields) = output else {
        return Ok(Record::Node(output));
    };

    let rich = matches!(
        fields.get("output_type").and_then(Value::as_str),
        Some("display_data" | "execute_result")
    );
    if rich {
        if let Some(Value::Object(data)) = fields.get_mut("data") {
            for (mime, payload) in data.iter_mut() {
                if store.types().is_inline(mime) {
                    continue;
                }
                let reference = store.save(output_files_dir, mime, payload)?;
                written.insert(reference.clone());
                *payload = Value::String(reference);
            }
        }
    }

    Ok(Record::Output { fields })
}
