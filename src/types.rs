//! Core types shared across the dispatcher, stores, getters and facade.

use crate::value::Immutable;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A typed message broadcast to every live store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Looked up against each store's handler table.
    #[serde(rename = "type")]
    pub action_type: String,

    /// Payload handed to the transition function.
    #[serde(default)]
    pub data: Value,
}

impl Action {
    /// Create an action with a payload.
    pub fn new(action_type: impl Into<String>, data: Value) -> Self {
        Self {
            action_type: action_type.into(),
            data,
        }
    }

    /// Create an action without a payload.
    pub fn bare(action_type: impl Into<String>) -> Self {
        Self::new(action_type, Value::Null)
    }
}

/// Identifies a callback registered with the dispatcher.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatchToken(pub u64);

impl fmt::Debug for DispatchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DispatchToken({})", self.0)
    }
}

impl fmt::Display for DispatchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID_{}", self.0)
    }
}

/// Kind of node in the dependency graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Store,
    Getter,
}

/// A store or getter, addressed by kind and id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    pub kind: NodeKind,
    pub id: String,
}

impl NodeKey {
    /// Key of a store node.
    pub fn store(id: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Store,
            id: id.into(),
        }
    }

    /// Key of a getter node.
    pub fn getter(id: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Getter,
            id: id.into(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            NodeKind::Store => write!(f, "store:{}", self.id),
            NodeKind::Getter => write!(f, "getter:{}", self.id),
        }
    }
}

/// The persisted snapshot record: `{"data": {storeId: plainValue}}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub data: Map<String, Value>,
}

impl SnapshotRecord {
    /// Ids of the stores captured in this record.
    pub fn store_ids(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }
}

/// Result of [`Application::evaluate`](crate::Application::evaluate).
#[derive(Clone, Debug, PartialEq)]
pub enum Evaluation {
    /// Shallow copy of the whole state table, in registration order.
    All(IndexMap<String, Immutable>),
    /// A single requested slice.
    One(Option<Immutable>),
    /// Several requested slices, in request order.
    Many(Vec<Option<Immutable>>),
}

impl Evaluation {
    /// The whole table, if every slice was requested.
    pub fn into_all(self) -> Option<IndexMap<String, Immutable>> {
        match self {
            Evaluation::All(table) => Some(table),
            _ => None,
        }
    }

    /// The single slice, if exactly one id was requested and it exists.
    pub fn into_one(self) -> Option<Immutable> {
        match self {
            Evaluation::One(slice) => slice,
            _ => None,
        }
    }

    /// The ordered slices, if several ids were requested.
    pub fn into_many(self) -> Option<Vec<Option<Immutable>>> {
        match self {
            Evaluation::Many(slices) => Some(slices),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_wire_shape() {
        let action = Action::new("addPerson", json!({"name": "X"}));
        let encoded = serde_json::to_value(&action).unwrap();
        assert_eq!(encoded, json!({"type": "addPerson", "data": {"name": "X"}}));

        let decoded: Action = serde_json::from_value(json!({"type": "ping"})).unwrap();
        assert_eq!(decoded, Action::bare("ping"));
    }

    #[test]
    fn test_token_display() {
        assert_eq!(DispatchToken(7).to_string(), "ID_7");
    }

    #[test]
    fn test_snapshot_record_shape() {
        let record: SnapshotRecord =
            serde_json::from_str(r#"{"data":{"TestStore":{"x":1,"y":2}}}"#).unwrap();
        assert_eq!(record.store_ids(), vec!["TestStore".to_string()]);
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"data": {"TestStore": {"x": 1, "y": 2}}})
        );
    }

    #[test]
    fn test_node_key_display() {
        assert_eq!(NodeKey::store("Person").to_string(), "store:Person");
        assert_eq!(NodeKey::getter("count").to_string(), "getter:count");
    }
}
