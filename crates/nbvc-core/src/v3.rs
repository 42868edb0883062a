//! The nbformat 3 document model, kept only as an input to the v4 upgrade.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::v4::{Metadata, deserialize_multiline};

#[derive(Debug, Clone, Deserialize)]
pub struct Notebook {
    #[serde(default)]
    pub metadata: Metadata,
    pub nbformat: i64,
    #[serde(default)]
    pub nbformat_minor: i64,
    #[serde(default)]
    pub worksheets: Vec<Worksheet>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Worksheet {
    #[serde(default)]
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cell_type", rename_all = "lowercase")]
pub enum Cell {
    Heading {
        #[serde(default = "default_heading_level")]
        level: usize,
        #[serde(default)]
        metadata: Metadata,
        #[serde(default, deserialize_with = "deserialize_multiline")]
        source: String,
    },
    Markdown {
        #[serde(default)]
        metadata: Metadata,
        #[serde(default, deserialize_with = "deserialize_multiline")]
        source: String,
    },
    Code {
        #[serde(default)]
        metadata: Metadata,
        #[serde(default, deserialize_with = "deserialize_multiline")]
        input: String,
        #[serde(default)]
        prompt_number: Option<i64>,
        #[serde(default)]
        collapsed: Option<bool>,
        #[serde(default)]
        outputs: Vec<Output>,
    },
    Raw {
        #[serde(default)]
        metadata: Metadata,
        #[serde(default, deserialize_with = "deserialize_multiline")]
        source: String,
    },
}

fn default_heading_level() -> usize {
    1
}

/// A v3 output. Rich outputs store their media under short top-level keys
/// (`text`, `png`, ...) instead of a nested `data` bundle.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum Output {
    Stream {
        #[serde(default)]
        stream: Option<String>,
        #[serde(default, deserialize_with = "deserialize_multiline")]
        text: String,
    },
    Pyout {
        #[serde(default)]
        prompt_number: Option<i64>,
        #[serde(default)]
        metadata: Metadata,
        #[serde(flatten)]
        media: Map<String, Value>,
    },
    DisplayData {
        #[serde(default)]
        metadata: Metadata,
        #[serde(flatten)]
        media: Map<String, Value>,
    },
    Pyerr {
        #[serde(default)]
        ename: String,
        #[serde(default)]
        evalue: String,
        #[serde(default)]
        traceback: Vec<String>,
    },
}

/// Map a v3 short media key to its MIME type. Unknown keys pass through.
pub fn mime_for_key(key: &str) -> &str {
    match key {
        "text" => "text/plain",
        "html" => "text/html",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpeg" => "image/jpeg",
        "latex" => "text/latex",
        "json" => "application/json",
        "javascript" => "application/javascript",
        other => other,
    }
}
