//! Snapshot capture and the change-detecting bulk-set plan.

use super::table::StateTable;
use crate::error::{FluxError, Result};
use crate::types::SnapshotRecord;
use serde_json::{Map, Value};

/// Project the named slices (or every slice, when `ids` is empty) to plain data.
pub fn capture(table: &StateTable, ids: &[&str]) -> Result<SnapshotRecord> {
    let mut data = Map::new();

    if ids.is_empty() {
        for (id, slice) in table.entries() {
            data.insert(id, slice.to_plain());
        }
    } else {
        for id in ids {
            let slice = table
                .get(id)
                .ok_or_else(|| FluxError::StoreNotFound(id.to_string()))?;
            data.insert(id.to_string(), slice.to_plain());
        }
    }

    Ok(SnapshotRecord { data })
}

/// Serialize a record for the storage backend.
pub fn encode_snapshot(record: &SnapshotRecord) -> Result<String> {
    Ok(serde_json::to_string(record)?)
}

/// Parse a persisted record.
///
/// A record without a `data` object (or with `data: null`) counts as no
/// snapshot at all.
pub fn decode_snapshot(raw: &str) -> Result<SnapshotRecord> {
    let parsed: Value = serde_json::from_str(raw)?;

    match parsed.get("data") {
        None | Some(Value::Null) => Err(FluxError::NoSnapshot),
        Some(Value::Object(data)) => Ok(SnapshotRecord { data: data.clone() }),
        Some(other) => Err(FluxError::InvalidFormat(format!(
            "snapshot data must be an object, got {}",
            other
        ))),
    }
}

/// Entries of `desired` whose plain value differs from the current slice,
/// compared by deep value equality. Keys missing from the table are included.
pub fn diff_against(table: &StateTable, desired: &Map<String, Value>) -> Vec<(String, Value)> {
    desired
        .iter()
        .filter(|(id, value)| match table.get(id) {
            Some(current) => current != **value,
            None => true,
        })
        .map(|(id, value)| (id.clone(), value.clone()))
        .collect()
}
