//! Content-addressed store for externalized outputs.
//!
//! Payloads that are not kept inline are written to `<digest>.<ext>` files,
//! where the digest is a truncated SHA-256 of the decoded bytes. The document
//! keeps only the file's path, relative to the document's own directory.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::{OutputTypes, SyncConfig};
use crate::error::{SyncError, SyncResult};

/// Preferred extensions for MIME types common in notebooks.
const PREFERRED_EXTENSIONS: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/svg+xml", "svg"),
    ("text/html", "html"),
    ("text/latex", "ltx"),
    ("text/markdown", "md"),
    ("application/json", "json"),
    ("application/javascript", "js"),
    ("application/pdf", "pdf"),
];

/// Extension for types nothing else knows about.
const FALLBACK_EXTENSION: &str = "bin";

/// Store for externalized output payloads, rooted at a document's directory.
#[derive(Debug, Clone)]
pub struct OutputStore {
    /// Directory references are resolved against.
    root_dir: PathBuf,

    types: OutputTypes,
    digest_len: usize,
    extensions: Vec<(String, String)>,
}

impl OutputStore {
    /// Create a store rooted at `root_dir`.
    pub fn new(root_dir: impl AsRef<Path>, config: &SyncConfig) -> Self {
        Self {
            root_dir: root_dir.as_ref().to_path_buf(),
            types: config.output_types.clone(),
            digest_len: config.store.digest_len,
            extensions: config
                .store
                .extensions
                .iter()
                .map(|(mime, ext)| (mime.clone(), ext.clone()))
                .collect(),
        }
    }

    pub fn types(&self) -> &OutputTypes {
        &self.types
    }

    /// Write `content` into `output_dir` (relative to the root) and return the
    /// reference to store in the document in its place.
    ///
    /// Identical content for the same MIME type always lands on the same path.
    /// The bytes are written to a temporary file in the target directory and
    /// renamed into place, so readers never see a partial file.
    pub fn save(&self, output_dir: &Path, mime: &str, content: &Value) -> SyncResult<String> {
        let bytes = self.encode_content(mime, content)?;
        let file_name = format!("{}.{}", self.digest(&bytes), self.extension_for(mime));

        let dir = self.root_dir.join(output_dir);
        let path = dir.join(&file_name);

        let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| SyncError::WriteError {
            path: dir.clone(),
            message: e.to_string(),
        })?;
        temp.write_all(&bytes).map_err(|e| SyncError::WriteError {
            path: temp.path().to_path_buf(),
            message: e.to_string(),
        })?;
        temp.persist(&path).map_err(|e| SyncError::WriteError {
            path: path.clone(),
            message: e.error.to_string(),
        })?;

        let reference = reference_for(output_dir, &file_name);
        tracing::debug!("Externalized {} ({} bytes) → {}", mime, bytes.len(), reference);
        Ok(reference)
    }

    /// Resolve a payload as stored in the document back to its in-memory form.
    ///
    /// Inline types are returned unchanged. Everything else is read from the
    /// referenced file.
    pub fn load(&self, mime: &str, reference: &Value) -> SyncResult<Value> {
        if self.types.is_inline(mime) {
            return Ok(reference.clone());
        }

        let Some(reference) = reference.as_str() else {
            return Err(invalid_payload(mime, "expected a file reference"));
        };
        let path = self.root_dir.join(reference);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                SyncError::MissingOutputFile {
                    path: path.clone(),
                    mime: mime.to_string(),
                    cell: None,
                    output: None,
                }
            } else {
                SyncError::ReadError {
                    path: path.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        self.decode_content(mime, bytes)
    }

    /// File extension (without the dot) for a MIME type.
    pub fn extension_for(&self, mime: &str) -> String {
        if let Some((_, ext)) = self.extensions.iter().find(|(m, _)| m == mime) {
            return ext.clone();
        }
        if let Some((_, ext)) = PREFERRED_EXTENSIONS.iter().find(|(m, _)| *m == mime) {
            return (*ext).to_string();
        }
        mime_guess::get_mime_extensions_str(mime)
            .and_then(|exts| exts.first())
            .map(|ext| (*ext).to_string())
            .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
    }

    fn digest(&self, bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let mut digest = hex::encode(hasher.finalize());
        digest.truncate(self.digest_len);
        digest
    }

    /// In-memory payload -> bytes on disk.
    fn encode_content(&self, mime: &str, content: &Value) -> SyncResult<Vec<u8>> {
        if self.types.is_json(mime) {
            let mut text = serde_json::to_string_pretty(content)?;
            text.push('\n');
            return Ok(text.into_bytes());
        }

        let Some(text) = content.as_str() else {
            return Err(invalid_payload(mime, "expected a string payload"));
        };
        if self.types.is_binary(mime) {
            let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            STANDARD
                .decode(compact)
                .map_err(|e| invalid_payload(mime, &e.to_string()))
        } else {
            Ok(text.as_bytes().to_vec())
        }
    }

    /// Bytes on disk -> in-memory payload.
    fn decode_content(&self, mime: &str, bytes: Vec<u8>) -> SyncResult<Value> {
        if self.types.is_json(mime) {
            return serde_json::from_slice(&bytes).map_err(|e| invalid_payload(mime, &e.to_string()));
        }
        if self.types.is_binary(mime) {
            return Ok(Value::String(STANDARD.encode(bytes)));
        }
        String::from_utf8(bytes)
            .map(Value::String)
            .map_err(|e| invalid_payload(mime, &e.to_string()))
    }
}

/// Make sure `path` exists and is empty, removing whatever was there before.
pub fn ensure_new_directory(path: &Path) -> SyncResult<()> {
    if path.is_dir() {
        fs::remove_dir_all(path).map_err(|e| SyncError::WriteError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        tracing::debug!("Cleared output directory {}", path.display());
    }
    fs::create_dir_all(path).map_err(|e| SyncError::WriteError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Join a directory and file name with `/`, whatever the platform.
fn reference_for(output_dir: &Path, file_name: &str) -> String {
    let mut parts: Vec<String> = output_dir
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    parts.push(file_name.to_string());
    let joined = parts.join("/");
    // A root component renders as "/", which would double up.
    if joined.starts_with("//") {
        joined[1..].to_string()
    } else {
        joined
    }
}

fn invalid_payload(mime: &str, message: &str) -> SyncError {
    SyncError::InvalidPayload {
        mime: mime.to_string(),
        message: message.to_string(),
        cell: None,
        output: None,
    }
}
