//! Canonical key ordering and metadata pruning.
//!
//! Keeping keys in a fixed order means a change to one field of a cell shows
//! up as a change to the same lines on every revision.

use std::sync::OnceLock;

use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

/// Key order for cells.
pub static CELL_ORDER: KeyOrder = KeyOrder::new(&[
    "cell_type",
    "source",
    "outputs",
    "metadata",
    "execution_count",
]);

/// Key order for outputs.
pub static OUTPUT_ORDER: KeyOrder =
    KeyOrder::new(&["output_type", "data", "metadata", "execution_count"]);

/// Key order inside an output's MIME bundle.
pub static DATA_ORDER: KeyOrder = KeyOrder::new(&["text/plain"]);

/// A fixed priority order of keys.
///
/// The key -> rank table is built on first use and never changes afterwards.
pub struct KeyOrder {
    keys: &'static [&'static str],
    ranks: OnceLock<FxHashMap<&'static str, usize>>,
}

impl KeyOrder {
    pub const fn new(keys: &'static [&'static str]) -> Self {
        Self {
            keys,
            ranks: OnceLock::new(),
        }
    }

    pub fn keys(&self) -> &'static [&'static str] {
        self.keys
    }

    /// Position of `key` in the order; unlisted keys all rank last.
    pub fn rank(&self, key: &str) -> usize {
        let ranks = self.ranks.get_or_init(|| {
            self.keys
                .iter()
                .enumerate()
                .map(|(rank, key)| (*key, rank))
                .collect()
        });
        ranks.get(key).copied().unwrap_or(self.keys.len())
    }
}

/// Stably reorder map entries so the keys of `order` come first, in that
/// order, and every other key keeps its relative position after them.
pub fn reorder_keys<V>(entries: &mut [(String, V)], order: &KeyOrder) {
    entries.sort_by_key(|(key, _)| order.rank(key));
}

/// Remove `metadata` when it is an empty mapping.
pub fn prune_empty_metadata(node: &mut Map<String, Value>) {
    let empty = node
        .get("metadata")
        .and_then(Value::as_object)
        .is_some_and(Map::is_empty);
    if empty {
        node.remove("metadata");
    }
}
