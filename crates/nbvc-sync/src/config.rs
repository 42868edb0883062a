//! Configuration for the sync engine.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Number of hex digits kept from the content hash by default.
pub const DEFAULT_DIGEST_LEN: usize = 16;

/// Configuration for exporting and importing notebooks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How output payloads are classified.
    pub output_types: OutputTypes,

    /// How externalized payloads are named.
    pub store: StoreConfig,
}

impl SyncConfig {
    /// Config with the full 64-digit content hash in file names.
    pub fn full_digest() -> Self {
        Self {
            store: StoreConfig {
                digest_len: 64,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Check that the configuration can be used.
    pub fn validate(&self) -> SyncResult<()> {
        if !(8..=64).contains(&self.store.digest_len) {
            return Err(SyncError::InvalidConfig(format!(
                "digest_len must be between 8 and 64, got {}",
                self.store.digest_len
            )));
        }
        if let Some(mime) = self.output_types.inline.intersection(&self.output_types.binary).next() {
            return Err(SyncError::InvalidConfig(format!(
                "{mime} cannot be both inline and binary"
            )));
        }
        Ok(())
    }
}

/// Classification of output MIME types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputTypes {
    /// Types kept as literal text inside the document.
    pub inline: BTreeSet<String>,

    /// Types whose in-document text is base64 for raw bytes.
    pub binary: BTreeSet<String>,
}

impl Default for OutputTypes {
    fn default() -> Self {
        Self {
            inline: ["text/plain"].into_iter().map(String::from).collect(),
            binary: ["image/png", "image/jpeg", "image/gif", "application/pdf"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl OutputTypes {
    pub fn is_inline(&self, mime: &str) -> bool {
        self.inline.contains(mime)
    }

    pub fn is_binary(&self, mime: &str) -> bool {
        self.binary.contains(mime)
    }

    pub fn is_json(&self, mime: &str) -> bool {
        nbvc_core::is_json_mime(mime)
    }
}

/// Naming of externalized payload files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Hex digits of the SHA-256 digest used as the file stem.
    ///
    /// Truncation trades collision resistance for short names; two different
    /// payloads sharing a prefix overwrite each other silently.
    pub digest_len: usize,

    /// Extra MIME type -> file extension mappings, checked first.
    pub extensions: BTreeMap<String, String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            digest_len: DEFAULT_DIGEST_LEN,
            extensions: BTreeMap::new(),
        }
    }
}
