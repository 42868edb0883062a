//! The nbformat 4 document model.
//!
//! In memory every multiline field (`source`, stream `text`, textual MIME
//! payloads) is a single joined string. On disk the same fields may be either a
//! string or a list of lines; [`crate::serialize_notebook`] always writes lists.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Free-form metadata attached to a notebook, cell or output.
pub type Metadata = Map<String, Value>;

/// MIME type -> payload. Payloads are strings, except for JSON MIME types.
pub type MimeBundle = Map<String, Value>;

/// A notebook in nbformat 4.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    pub metadata: Metadata,
    pub nbformat: i64,
    pub nbformat_minor: i64,
    pub cells: Vec<Cell>,
}

impl Notebook {
    /// Create a new empty notebook.
    pub fn new() -> Self {
        Self {
            metadata: Metadata::new(),
            nbformat: 4,
            nbformat_minor: 5,
            cells: Vec::new(),
        }
    }
}

impl Default for Notebook {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cell_type", rename_all = "lowercase")]
pub enum Cell {
    Markdown {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        metadata: Metadata,
        #[serde(deserialize_with = "deserialize_multiline")]
        source: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attachments: Option<Value>,
    },
    Code {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        metadata: Metadata,
        #[serde(deserialize_with = "deserialize_multiline")]
        source: String,
        outputs: Vec<Output>,
        execution_count: Option<i64>,
    },
    Raw {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        metadata: Metadata,
        #[serde(deserialize_with = "deserialize_multiline")]
        source: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attachments: Option<Value>,
    },
}

impl Cell {
    pub fn id(&self) -> Option<&str> {
        match self {
            Cell::Markdown { id, .. } | Cell::Code { id, .. } | Cell::Raw { id, .. } => {
                id.as_deref()
            }
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Cell::Markdown { source, .. } | Cell::Code { source, .. } | Cell::Raw { source, .. } => {
                source
            }
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Cell::Markdown { metadata, .. }
            | Cell::Code { metadata, .. }
            | Cell::Raw { metadata, .. } => metadata,
        }
    }

    /// The cell's outputs; `None` for markdown and raw cells.
    pub fn outputs(&self) -> Option<&[Output]> {
        match self {
            Cell::Code { outputs, .. } => Some(outputs),
            _ => None,
        }
    }

    pub fn cell_type(&self) -> &'static str {
        match self {
            Cell::Markdown { .. } => "markdown",
            Cell::Code { .. } => "code",
            Cell::Raw { .. } => "raw",
        }
    }
}

/// One execution result attached to a code cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum Output {
    Stream {
        name: String,
        #[serde(deserialize_with = "deserialize_multiline")]
        text: String,
    },
    DisplayData {
        #[serde(deserialize_with = "deserialize_mime_bundle")]
        data: MimeBundle,
        metadata: Metadata,
    },
    ExecuteResult {
        execution_count: Option<i64>,
        #[serde(deserialize_with = "deserialize_mime_bundle")]
        data: MimeBundle,
        metadata: Metadata,
    },
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
}

impl Output {
    pub fn output_type(&self) -> &'static str {
        match self {
            Output::Stream { .. } => "stream",
            Output::DisplayData { .. } => "display_data",
            Output::ExecuteResult { .. } => "execute_result",
            Output::Error { .. } => "error",
        }
    }

    /// The MIME bundle of a rich output, if any.
    pub fn data(&self) -> Option<&MimeBundle> {
        match self {
            Output::DisplayData { data, .. } | Output::ExecuteResult { data, .. } => Some(data),
            _ => None,
        }
    }
}

/// Whether payloads of this MIME type are JSON values rather than strings.
pub fn is_json_mime(mime: &str) -> bool {
    mime == "application/json" || mime.ends_with("+json")
}

/// Deserialize a field that can be either a string or an array of strings,
/// joining the array into a single string.
pub fn deserialize_multiline<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct MultilineVisitor;

    impl<'de> serde::de::Visitor<'de> for MultilineVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or an array of strings")
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }

        fn visit_string<E: serde::de::Error>(self, v: String) -> Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_seq<A: serde::de::SeqAccess<'de>>(
            self,
            mut seq: A,
        ) -> Result<Self::Value, A::Error> {
            let mut joined = String::new();
            while let Some(line) = seq.next_element::<String>()? {
                joined.push_str(&line);
            }
            Ok(joined)
        }
    }

    deserializer.deserialize_any(MultilineVisitor)
}

/// Deserialize a MIME bundle, joining line lists of non-JSON payloads.
pub fn deserialize_mime_bundle<'de, D>(deserializer: D) -> Result<MimeBundle, D::Error>
where
    D: Deserializer<'de>,
{
    let mut bundle = MimeBundle::deserialize(deserializer)?;
    for (mime, value) in bundle.iter_mut() {
        if !is_json_mime(mime) {
            if let Some(joined) = join_lines(value) {
                *value = Value::String(joined);
            }
        }
    }
    Ok(bundle)
}

/// Join an array of strings; `None` for anything else.
pub(crate) fn join_lines(value: &Value) -> Option<String> {
    let lines = value.as_array()?;
    let mut joined = String::new();
    for line in lines {
        joined.push_str(line.as_str()?);
    }
    Some(joined)
}

/// Split a string into lines, keeping the line endings, the way multiline
/// fields are stored on disk.
pub(crate) fn split_lines(text: &str) -> Value {
    Value::Array(
        text.split_inclusive('\n')
            .map(|line| Value::String(line.to_string()))
            .collect(),
    )
}
