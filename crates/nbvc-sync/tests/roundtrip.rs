//! Integration tests for nbvc notebook synchronization.
//!
//! Tests the full pipeline: .ipynb → .ipynb.yaml export, import back, and
//! roundtrip verification.

use std::fs;
use std::path::Path;

use nbvc_core::{parse_notebook, upgrade_notebook, v4};
use nbvc_sync::{
    Exporter, Importer, Resources, SyncConfig, SyncError, default_ipynb_path, default_yaml_path,
    export_file, import_file, import_file_to,
};
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

/// Create a temporary directory for test artifacts.
fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// One PNG signature, base64 encoded.
const PNG: &str = "iVBORw0KGgo=";

/// File name the PNG payload is stored under with the default configuration.
const PNG_FILE: &str = "4c4b6a3be1314ab8.png";

/// A notebook covering every cell and output type.
fn create_full_notebook() -> &'static str {
    r##"{
 "cells": [
  {
   "cell_type": "markdown",
   "id": "intro",
   "metadata": {},
   "source": ["# Analysis\n", "\n", "Some *notes*: 你好 🚀"]
  },
  {
   "cell_type": "code",
   "execution_count": 1,
   "id": "print",
   "metadata": {},
   "outputs": [
    {"name": "stdout", "output_type": "stream", "text": ["1\n"]}
   ],
   "source": ["print(1)"]
  },
  {
   "cell_type": "code",
   "execution_count": 2,
   "id": "plot",
   "metadata": {"tags": ["figure"]},
   "outputs": [
    {
     "data": {
      "image/png": "iVBORw0KGgo=",
      "text/plain": ["<Figure size 640x480 with 1 Axes>"]
     },
     "metadata": {"needs_background": "light"},
     "output_type": "display_data"
    }
   ],
   "source": "plot()"
  },
  {
   "cell_type": "code",
   "execution_count": 3,
   "id": "table",
   "metadata": {},
   "outputs": [
    {
     "data": {
      "application/json": {"a": [1, 2], "b": null},
      "text/html": ["<table>\n", "  <tr><td>1</td></tr>\n", "</table>"],
      "text/plain": ["   a\n", "0  1"]
     },
     "execution_count": 3,
     "metadata": {},
     "output_type": "execute_result"
    }
   ],
   "source": "df"
  },
  {
   "cell_type": "code",
   "execution_count": 4,
   "id": "fail",
   "metadata": {},
   "outputs": [
    {
     "ename": "ZeroDivisionError",
     "evalue": "division by zero",
     "output_type": "error",
     "traceback": ["\u001b[0;31mTraceback\u001b[0m", "ZeroDivisionError: division by zero"]
    }
   ],
   "source": "1/0"
  },
  {
   "cell_type": "code",
   "execution_count": null,
   "id": "empty",
   "metadata": {},
   "outputs": [],
   "source": ""
  },
  {
   "cell_type": "raw",
   "id": "raw",
   "metadata": {"format": "text/restructuredtext"},
   "source": "  indented raw text\n\n"
  },
  {
   "cell_type": "code",
   "execution_count": 5,
   "id": "tabs",
   "metadata": {},
   "outputs": [
    {"name": "stdout", "output_type": "stream", "text": ["\t0\n", "\t1\n"]},
    {"name": "stderr", "output_type": "stream", "text": "odd \ufffe byte\n"}
   ],
   "source": "\tx = 1\ny\n"
  }
 ],
 "metadata": {
  "kernelspec": {"display_name": "Python 3", "language": "python", "name": "python3"},
  "language_info": {"name": "python", "version": "3.11.4"}
 },
 "nbformat": 4,
 "nbformat_minor": 5
}
"##
}

/// A code cell printing `1`, as an nbformat 4.4 notebook.
fn create_print_notebook() -> &'static str {
    r#"{
 "cells": [
  {
   "cell_type": "code",
   "execution_count": 1,
   "metadata": {},
   "outputs": [{"name": "stdout", "output_type": "stream", "text": "1\n"}],
   "source": "print(1)"
  }
 ],
 "metadata": {},
 "nbformat": 4,
 "nbformat_minor": 4
}
"#
}

/// An nbformat 3 notebook with worksheets and a heading cell.
fn create_v3_notebook() -> &'static str {
    r#"{
 "metadata": {"name": "old", "signature": "sha256:0000"},
 "nbformat": 3,
 "nbformat_minor": 0,
 "worksheets": [
  {
   "cells": [
    {"cell_type": "heading", "level": 2, "metadata": {}, "source": ["Results\n"]},
    {
     "cell_type": "code",
     "collapsed": false,
     "input": ["print(1)"],
     "language": "python",
     "metadata": {},
     "outputs": [
      {"output_type": "stream", "stream": "stdout", "text": ["1\n"]},
      {"output_type": "pyout", "prompt_number": 1, "metadata": {}, "text": ["1"], "png": "iVBORw0KGgo="}
     ],
     "prompt_number": 1
    }
   ]
  }
 ]
}
"#
}

/// Parse and upgrade a JSON fixture.
fn upgraded(json: &str) -> v4::Notebook {
    upgrade_notebook(parse_notebook(json).expect("Failed to parse fixture"))
        .expect("Failed to upgrade fixture")
}

/// Export a notebook into `dir` with the default configuration.
fn export_into(dir: &Path, notebook: v4::Notebook) -> (String, Resources) {
    Exporter::new()
        .from_notebook(notebook, &Resources::new(dir, "nb_files"))
        .expect("Failed to export notebook")
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("Failed to read output directory")
        .map(|entry| {
            entry
                .expect("Failed to read directory entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

// =============================================================================
// Export Layout Tests
// =============================================================================

#[test]
fn test_stream_output_layout() {
    let temp = temp_dir();
    let (yaml, resources) = export_into(temp.path(), upgraded(create_print_notebook()));

    let expected = "\
cells:
- cell_type: code
  source: |-
    print(1)
  outputs:
  - output_type: stream
    name: stdout
    text: |
      1
  execution_count: 1
metadata: {}
nbformat: 4
nbformat_minor: 4
";
    assert_eq!(yaml, expected);
    assert!(resources.outputs.is_empty());
}

#[test]
fn test_image_output_is_externalized() {
    let temp = temp_dir();
    let (yaml, resources) = export_into(temp.path(), upgraded(create_full_notebook()));

    let reference = format!("nb_files/{PNG_FILE}");
    let expected = format!(
        "\
  outputs:
  - output_type: display_data
    data:
      text/plain: |-
        <Figure size 640x480 with 1 Axes>
      image/png: {reference}
    metadata:
      needs_background: light
"
    );
    assert!(yaml.contains(&expected), "unexpected layout:\n{yaml}");
    assert!(!yaml.contains(PNG));

    let bytes = fs::read(temp.path().join(&reference)).expect("Failed to read png");
    assert_eq!(bytes, b"\x89PNG\r\n\x1a\n");
    assert!(resources.outputs.contains(&reference));
}

#[test]
fn test_externalized_file_contents() {
    let temp = temp_dir();
    let (yaml, resources) = export_into(temp.path(), upgraded(create_full_notebook()));

    // png, html and json
    assert_eq!(resources.outputs.len(), 3);
    assert_eq!(file_names(&resources.output_dir()).len(), 3);

    let html = resources
        .outputs
        .iter()
        .find(|r| r.ends_with(".html"))
        .expect("No html output");
    let json = resources
        .outputs
        .iter()
        .find(|r| r.ends_with(".json"))
        .expect("No json output");

    let html_text = fs::read_to_string(temp.path().join(html)).expect("Failed to read html");
    assert_eq!(html_text, "<table>\n  <tr><td>1</td></tr>\n</table>");

    let json_value: serde_json::Value =
        serde_json::from_slice(&fs::read(temp.path().join(json)).expect("Failed to read json"))
            .expect("Stored json is not valid");
    assert_eq!(json_value, serde_json::json!({"a": [1, 2], "b": null}));

    assert!(yaml.contains("      text/plain: |2-\n           a\n        0  1\n"));
}

#[test]
fn test_empty_fields_are_omitted() {
    let temp = temp_dir();
    let (yaml, _) = export_into(temp.path(), upgraded(create_full_notebook()));

    // Only the notebook's own metadata and non-empty ones remain.
    assert!(!yaml.contains("metadata: {}"));
    assert!(!yaml.contains("outputs: []"));
    assert!(yaml.contains("  source: \"\"\n  execution_count: null\n  id: empty\n"));
}

#[test]
fn test_export_is_deterministic() {
    let first_temp = temp_dir();
    let second_temp = temp_dir();
    let notebook = upgraded(create_full_notebook());

    let (first, first_resources) = export_into(first_temp.path(), notebook.clone());
    let (second, second_resources) = export_into(second_temp.path(), notebook);

    assert_eq!(first.as_bytes(), second.as_bytes());
    assert_eq!(first_resources.outputs, second_resources.outputs);
    assert_eq!(
        file_names(&first_resources.output_dir()),
        file_names(&second_resources.output_dir())
    );
    for reference in &first_resources.outputs {
        assert_eq!(
            fs::read(first_temp.path().join(reference)).expect("Failed to read output"),
            fs::read(second_temp.path().join(reference)).expect("Failed to read output")
        );
    }
}

#[test]
fn test_reexport_into_same_directory_is_stable() {
    let temp = temp_dir();
    let notebook = upgraded(create_full_notebook());

    let (first, first_resources) = export_into(temp.path(), notebook.clone());
    let first_files = file_names(&first_resources.output_dir());
    let (second, second_resources) = export_into(temp.path(), notebook);

    assert_eq!(first, second);
    assert_eq!(first_resources, second_resources);
    assert_eq!(first_files, file_names(&second_resources.output_dir()));
}

#[test]
fn test_tab_indented_and_unprintable_text() {
    let temp = temp_dir();
    let notebook = upgraded(create_full_notebook());
    let (yaml, _) = export_into(temp.path(), notebook.clone());

    assert!(yaml.contains("  source: |2\n    \tx = 1\n    y\n"), "{yaml}");
    assert!(yaml.contains("    text: |2\n      \t0\n      \t1\n"), "{yaml}");
    assert!(yaml.contains("    text: \"odd \\ufffe byte\\n\"\n"), "{yaml}");
    assert!(!yaml.contains('\u{fffe}'));

    let imported = Importer::new()
        .from_text(&yaml, temp.path())
        .expect("Failed to import notebook");
    assert_eq!(imported.cells.last(), notebook.cells.last());
}

#[test]
fn test_identical_payloads_share_a_file() {
    let temp = temp_dir();
    let mut notebook = upgraded(create_full_notebook());
    let plot = notebook.cells[2].clone();
    notebook.cells.push(plot);
    if let Some(v4::Cell::Code { id, .. }) = notebook.cells.last_mut() {
        *id = Some("plot-again".to_string());
    }

    let (yaml, resources) = export_into(temp.path(), notebook);

    let reference = format!("image/png: nb_files/{PNG_FILE}");
    assert_eq!(yaml.matches(&reference).count(), 2);
    assert_eq!(resources.outputs.len(), 3);
}

#[test]
fn test_stale_output_files_are_removed() {
    let temp = temp_dir();
    let output_dir = temp.path().join("nb_files");
    fs::create_dir_all(output_dir.join("nested")).expect("Failed to create stale dir");
    fs::write(output_dir.join("stale.png"), b"old").expect("Failed to write stale file");

    export_into(temp.path(), upgraded(create_print_notebook()));

    assert!(output_dir.is_dir());
    assert!(file_names(&output_dir).is_empty());
}

#[test]
fn test_full_digest_config() {
    let temp = temp_dir();
    let exporter = Exporter::with_config(SyncConfig::full_digest());
    let (_, resources) = exporter
        .from_notebook(
            upgraded(create_full_notebook()),
            &Resources::new(temp.path(), "nb_files"),
        )
        .expect("Failed to export notebook");

    for reference in &resources.outputs {
        let name = reference.strip_prefix("nb_files/").expect("Bad reference");
        let (digest, _) = name.split_once('.').expect("No extension");
        assert_eq!(digest.len(), 64);
    }
}

// =============================================================================
// Roundtrip Verification Tests
// =============================================================================

#[test]
fn test_roundtrip_reproduces_notebook() {
    let temp = temp_dir();
    let notebook = upgraded(create_full_notebook());

    let (yaml, _) = export_into(temp.path(), notebook.clone());
    let imported = Importer::new()
        .from_text(&yaml, temp.path())
        .expect("Failed to import notebook");

    assert_eq!(imported, notebook);
}

#[test]
fn test_reexport_is_byte_identical() {
    let temp = temp_dir();
    let (yaml, _) = export_into(temp.path(), upgraded(create_full_notebook()));

    let imported = Importer::new()
        .from_text(&yaml, temp.path())
        .expect("Failed to import notebook");
    let (again, _) = export_into(temp.path(), imported);

    assert_eq!(yaml, again);
}

#[test]
fn test_v3_notebook_is_upgraded() {
    let temp = temp_dir();
    let v3 = parse_notebook(create_v3_notebook()).expect("Failed to parse v3 fixture");

    let (yaml, resources) = Exporter::new()
        .from_notebook(v3, &Resources::new(temp.path(), "nb_files"))
        .expect("Failed to export v3 notebook");

    assert!(yaml.ends_with("nbformat: 4\nnbformat_minor: 4\n"));
    assert!(yaml.contains("- cell_type: markdown\n  source: |-\n    ## Results\n"));
    assert!(yaml.contains("  metadata:\n    collapsed: false\n"));
    assert!(!yaml.contains("signature"));
    assert!(yaml.contains("metadata:\n  orig_nbformat: 3\n  orig_nbformat_minor: 0\n"));
    assert_eq!(resources.outputs, vec![format!("nb_files/{PNG_FILE}")]);

    let imported = Importer::new()
        .from_text(&yaml, temp.path())
        .expect("Failed to import notebook");
    assert_eq!(imported, upgraded(create_v3_notebook()));
}

#[test]
fn test_missing_output_file() {
    let temp = temp_dir();
    let (yaml, _) = export_into(temp.path(), upgraded(create_full_notebook()));
    fs::remove_file(temp.path().join("nb_files").join(PNG_FILE)).expect("Failed to remove png");

    let err = Importer::new()
        .from_text(&yaml, temp.path())
        .expect_err("Import should fail");

    match err {
        SyncError::MissingOutputFile {
            mime, cell, output, ..
        } => {
            assert_eq!(mime, "image/png");
            assert_eq!(cell, Some(2));
            assert_eq!(output, Some(0));
        }
        other => panic!("Expected MissingOutputFile, got {other:?}"),
    }
}

// =============================================================================
// File Conversion Tests
// =============================================================================

#[test]
fn test_file_roundtrip() {
    let temp = temp_dir();
    let ipynb_path = temp.path().join("analysis.ipynb");
    fs::write(&ipynb_path, create_full_notebook()).expect("Failed to write notebook");

    let yaml_path = default_yaml_path(&ipynb_path);
    let resources = export_file(&ipynb_path, &yaml_path).expect("Failed to export file");
    assert!(yaml_path.exists());
    assert_eq!(resources.output_dir(), temp.path().join("analysis_files"));
    assert_eq!(file_names(&resources.output_dir()).len(), 3);

    let restored_path = temp.path().join("restored.ipynb");
    import_file_to(&yaml_path, &restored_path).expect("Failed to import file");

    let restored = fs::read_to_string(&restored_path).expect("Failed to read restored notebook");
    assert_eq!(
        upgrade_notebook(parse_notebook(&restored).expect("Restored notebook is invalid"))
            .expect("Failed to upgrade restored notebook"),
        upgraded(create_full_notebook())
    );
    assert!(restored.ends_with("}\n"));
    assert_eq!(default_ipynb_path(&yaml_path), ipynb_path);
}

#[test]
fn test_import_file_resolves_relative_to_document() {
    let temp = temp_dir();
    let ipynb_path = temp.path().join("nb.ipynb");
    fs::write(&ipynb_path, create_full_notebook()).expect("Failed to write notebook");

    let nested = temp.path().join("docs");
    fs::create_dir_all(&nested).expect("Failed to create docs dir");
    let yaml_path = nested.join("nb.ipynb.yaml");
    export_file(&ipynb_path, &yaml_path).expect("Failed to export file");
    assert!(nested.join("nb_files").join(PNG_FILE).is_file());

    let notebook = import_file(&yaml_path).expect("Failed to import file");
    assert_eq!(notebook, upgraded(create_full_notebook()));
}

#[test]
fn test_export_rejects_old_formats() {
    let temp = temp_dir();
    let ipynb_path = temp.path().join("ancient.ipynb");
    fs::write(
        &ipynb_path,
        r#"{"nbformat": 2, "nbformat_minor": 0, "worksheets": []}"#,
    )
    .expect("Failed to write notebook");

    let err = export_file(&ipynb_path, temp.path().join("ancient.ipynb.yaml"))
        .expect_err("Export should fail");
    assert!(matches!(
        err,
        SyncError::UnsupportedVersion { major: 2, minor: 0 }
    ));
}

#[test]
fn test_import_missing_file() {
    let temp = temp_dir();
    let err = import_file(temp.path().join("absent.ipynb.yaml")).expect_err("Import should fail");
    assert!(matches!(err, SyncError::ReadError { .. }));
}
