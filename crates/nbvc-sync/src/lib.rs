//! Sync engine for nbvc.
//!
//! Converts `.ipynb` notebooks to a diff-friendly `.ipynb.yaml` text format
//! and back. Large or binary outputs are moved out of the text into
//! content-addressed files so that the document stays readable under version
//! control.
//!
//! # Architecture
//!
//! ```text
//! notebook.ipynb ──► Exporter ──► Record tree ──► yaml emitter ──► notebook.ipynb.yaml
//!                       │                                                  │
//!                       ▼                                                  │
//!                  OutputStore ◄──────────────── Importer ◄────────────────┘
//!               (notebook_files/)                    │
//!                                                    ▼
//!                                        nbvc_core::build_notebook
//! ```

mod config;
mod error;
mod export;
mod import;
mod order;
mod store;
mod yaml;

pub use config::{DEFAULT_DIGEST_LEN, OutputTypes, StoreConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use export::{Exporter, Resources};
pub use import::Importer;
pub use order::{CELL_ORDER, DATA_ORDER, KeyOrder, OUTPUT_ORDER, prune_empty_metadata, reorder_keys};
pub use store::{OutputStore, ensure_new_directory};

use std::fs;
use std::path::{Path, PathBuf};

use nbvc_core::v4;

const YAML_SUFFIX: &str = ".yaml";
const IPYNB_SUFFIX: &str = ".ipynb";

/// Export an `.ipynb` file to `.ipynb.yaml`.
///
/// Externalized outputs are written to `<notebook name>_files/` next to the
/// YAML file; anything previously in that directory is removed.
pub fn export_file(
    ipynb_path: impl AsRef<Path>,
    yaml_path: impl AsRef<Path>,
) -> SyncResult<Resources> {
    let ipynb_path = ipynb_path.as_ref();
    let yaml_path = yaml_path.as_ref();

    let resources = Exporter::new().export_file(ipynb_path, yaml_path)?;

    tracing::info!(
        "Exported {} → {} ({} output files)",
        ipynb_path.display(),
        yaml_path.display(),
        resources.outputs.len()
    );

    Ok(resources)
}

/// Import an `.ipynb.yaml` file into a notebook.
pub fn import_file(yaml_path: impl AsRef<Path>) -> SyncResult<v4::Notebook> {
    Importer::new().import_file(yaml_path)
}

/// Import an `.ipynb.yaml` file and write the notebook as `.ipynb` JSON.
pub fn import_file_to(
    yaml_path: impl AsRef<Path>,
    ipynb_path: impl AsRef<Path>,
) -> SyncResult<()> {
    let yaml_path = yaml_path.as_ref();
    let ipynb_path = ipynb_path.as_ref();

    let notebook = import_file(yaml_path)?;
    let json = nbvc_core::serialize_notebook(&notebook)?;
    fs::write(ipynb_path, json).map_err(|e| SyncError::WriteError {
        path: ipynb_path.to_path_buf(),
        message: e.to_string(),
    })?;

    tracing::info!(
        "Imported {} → {} ({} cells)",
        yaml_path.display(),
        ipynb_path.display(),
        notebook.cells.len()
    );

    Ok(())
}

/// Get the default `.ipynb.yaml` path for an `.ipynb` notebook.
pub fn default_yaml_path(ipynb_path: impl AsRef<Path>) -> PathBuf {
    let mut path = ipynb_path.as_ref().as_os_str().to_owned();
    path.push(YAML_SUFFIX);
    PathBuf::from(path)
}

/// Get the default `.ipynb` path for an `.ipynb.yaml` document.
pub fn default_ipynb_path(yaml_path: impl AsRef<Path>) -> PathBuf {
    let yaml_path = yaml_path.as_ref();
    match yaml_path.to_str().and_then(|p| p.strip_suffix(YAML_SUFFIX)) {
        Some(stripped) if stripped.ends_with(IPYNB_SUFFIX) => PathBuf::from(stripped),
        _ => yaml_path.with_extension("ipynb"),
    }
}

/// Name of the directory holding a notebook's externalized outputs,
/// relative to the directory of the YAML document.
pub fn default_output_files_dir(notebook_path: impl AsRef<Path>) -> PathBuf {
    let file_name = notebook_path
        .as_ref()
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("notebook");
    let stem = file_name.strip_suffix(YAML_SUFFIX).unwrap_or(file_name);
    let stem = stem.strip_suffix(IPYNB_SUFFIX).unwrap_or(stem);
    PathBuf::from(format!("{stem}_files"))
}
