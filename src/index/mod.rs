//! Local Index
//!
//! Every overlay node stores the payloads it owns in an ordered local index:
//! a B+ tree from normalized key to the list of values inserted under that
//! key. The tree keeps leaves chained for in-order scans, which the
//! overlays use when redistributing keys on join and leave.
//!
//! All calls are serial per node; the owning peer guards its index with a
//! mutex.

pub mod btree;

use btree::BPlusTree;
use serde_json::Value;

/// Ordered index of a single node's payloads.
#[derive(Debug)]
pub struct LocalIndex {
    tree: BPlusTree<Value>,
}

impl LocalIndex {
    /// `branching` is the B+ tree branching factor (maximum children per
    /// internal node).
    pub fn new(branching: usize) -> Self {
        Self {
            tree: BPlusTree::new(branching),
        }
    }

    /// Appends `value` under `key`, creating the key if absent.
    pub fn insert(&mut self, key: &str, value: Value) {
        self.tree.insert(key, value);
    }

    /// All values stored under `key`, in insertion order.
    pub fn lookup(&self, key: &str) -> Option<&[Value]> {
        self.tree.get(key)
    }

    /// Removes the key and every value under it. Returns whether anything
    /// was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.tree.remove(key).is_some()
    }

    /// Replaces the value list with `[value]` iff the key exists.
    pub fn update(&mut self, key: &str, value: Value) -> bool {
        self.tree.replace(key, value)
    }

    /// In-order iterator over `(key, values)`.
    pub fn scan(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.tree.iter()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Removes and returns every entry, leaving the index empty.
    pub fn drain(&mut self) -> Vec<(String, Vec<Value>)> {
        let keys: Vec<String> = self.tree.iter().map(|(k, _)| k.to_string()).collect();
        keys.into_iter()
            .filter_map(|k| self.tree.remove(&k).map(|vs| (k, vs)))
            .collect()
    }

    /// Removes and returns the entries whose key matches `pred`.
    pub fn extract<F>(&mut self, pred: F) -> Vec<(String, Vec<Value>)>
    where
        F: Fn(&str) -> bool,
    {
        let keys: Vec<String> = self
            .tree
            .iter()
            .filter(|(k, _)| pred(k))
            .map(|(k, _)| k.to_string())
            .collect();
        keys.into_iter()
            .filter_map(|k| self.tree.remove(&k).map(|vs| (k, vs)))
            .collect()
    }

    /// Appends transferred entries, preserving value order per key.
    pub fn absorb(&mut self, items: Vec<(String, Vec<Value>)>) {
        for (key, values) in items {
            for value in values {
                self.tree.insert(&key, value);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        self.tree.assert_invariants();
    }
}
