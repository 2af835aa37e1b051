//! Store id -> slice mapping.

use crate::value::Immutable;
use indexmap::IndexMap;
use parking_lot::RwLock;

/// Mutable mapping from store id to its current slice.
///
/// Kept in registration order so full evaluations and snapshots list stores
/// the way they were registered.
pub struct StateTable {
    slices: RwLock<IndexMap<String, Immutable>>,
}

impl StateTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            slices: RwLock::new(IndexMap::new()),
        }
    }

    /// Current slice of a store.
    pub fn get(&self, id: &str) -> Option<Immutable> {
        self.slices.read().get(id).cloned()
    }

    /// Replace a slice in a single assignment. Returns the previous slice.
    pub fn set(&self, id: &str, value: Immutable) -> Option<Immutable> {
        self.slices.write().insert(id.to_string(), value)
    }

    /// Drop a slice, returning it.
    pub fn remove(&self, id: &str) -> Option<Immutable> {
        self.slices.write().shift_remove(id)
    }

    /// Whether a slice exists for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.slices.read().contains_key(id)
    }

    /// Shallow copy of the whole table.
    pub fn entries(&self) -> IndexMap<String, Immutable> {
        self.slices.read().clone()
    }

    /// Store ids, in insertion order.
    pub fn ids(&self) -> Vec<String> {
        self.slices.read().keys().cloned().collect()
    }

    /// Number of slices.
    pub fn len(&self) -> usize {
        self.slices.read().len()
    }

    /// True if the table holds no slices.
    pub fn is_empty(&self) -> bool {
        self.slices.read().is_empty()
    }

    /// Drop every slice.
    pub fn clear(&self) {
        self.slices.write().clear();
    }
}

impl Default for StateTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_replaces_whole_slice() {
        let table = StateTable::new();
        assert!(table.set("a", Immutable::new(json!({"x": 1}))).is_none());

        let previous = table.set("a", Immutable::new(json!({"y": 2}))).unwrap();
        assert_eq!(previous, json!({"x": 1}));
        assert_eq!(table.get("a").unwrap(), json!({"y": 2}));
    }

    #[test]
    fn test_entries_keep_registration_order() {
        let table = StateTable::new();
        table.set("zeta", Immutable::default());
        table.set("alpha", Immutable::default());

        assert_eq!(table.ids(), vec!["zeta".to_string(), "alpha".to_string()]);

        let copy = table.entries();
        table.clear();
        assert_eq!(copy.len(), 2);
        assert!(table.is_empty());
    }
}
