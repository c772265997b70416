//! Snapshots are the unit of persistence.
//!
//! Each collection is persisted whole, one snapshot per collection, so a
//! single-record change rewrites the collection. Records keep their order.

use crate::{
    error::Result, Collection, CollectionSpec, Envelope, Error, Record, Timestamp,
};
use serde::{Deserialize, Serialize};

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time copy of one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Application-level store version; a mismatch discards the snapshot
    pub store_version: u32,
    /// Declaration at the time of the snapshot
    pub spec: CollectionSpec,
    /// Records in collection order
    pub records: Vec<Record>,
    /// Envelope captured by the last pull, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope: Option<Envelope>,
    pub saved_at: Timestamp,
}

impl CollectionSnapshot {
    /// Capture a collection.
    pub fn capture(collection: &Collection, store_version: u32, saved_at: Timestamp) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            store_version,
            spec: collection.spec().clone(),
            records: collection.records().to_vec(),
            envelope: collection.envelope().cloned(),
            saved_at,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn queued_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_queued()).count()
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        Ok(snapshot)
    }
}

/// Metadata about a snapshot (without the records).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub name: String,
    pub format_version: u32,
    pub store_version: u32,
    pub record_count: usize,
    pub queued_count: usize,
    pub saved_at: Timestamp,
}

impl From<&CollectionSnapshot> for SnapshotMetadata {
    fn from(snapshot: &CollectionSnapshot) -> Self {
        Self {
            name: snapshot.name().to_string(),
            format_version: snapshot.format_version,
            store_version: snapshot.store_version,
            record_count: snapshot.records.len(),
            queued_count: snapshot.queued_count(),
            saved_at: snapshot.saved_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CollectionDecl;
    use serde_json::json;

    fn collection() -> Collection {
        let spec = CollectionDecl::new("todos", "id", "timestamp", "r", "c")
            .with_read_wrapper("data")
            .validate()
            .unwrap();
        let mut collection = Collection::new(spec);
        let items = collection.accept_payload(json!({"data": [{"id": "1"}], "page": 1}));
        collection.merge_pulled(items, Timestamp::epoch());
        collection.stage_local(json!({"id": "2"}), Timestamp::epoch());
        collection
    }

    #[test]
    fn capture_keeps_order_and_envelope() {
        let snapshot = CollectionSnapshot::capture(&collection(), 3, Timestamp::epoch());
        assert_eq!(snapshot.name(), "todos");
        assert_eq!(snapshot.store_version, 3);
        assert_eq!(snapshot.records[0].value["id"], "1");
        assert_eq!(snapshot.records[1].value["id"], "2");
        assert_eq!(snapshot.queued_count(), 1);
        assert_eq!(snapshot.envelope.as_ref().unwrap().shell["page"], 1);
    }

    #[test]
    fn json_roundtrip() {
        let snapshot = CollectionSnapshot::capture(&collection(), 1, Timestamp::epoch());
        let parsed = CollectionSnapshot::from_json(&snapshot.to_json_pretty().unwrap()).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn rejects_future_format_version() {
        let mut snapshot = CollectionSnapshot::capture(&collection(), 1, Timestamp::epoch());
        snapshot.format_version = SNAPSHOT_FORMAT_VERSION + 1;
        let json = snapshot.to_json().unwrap();
        assert!(matches!(
            CollectionSnapshot::from_json(&json),
            Err(Error::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(CollectionSnapshot::from_json("not json").is_err());
    }

    #[test]
    fn metadata_from_snapshot() {
        let snapshot = CollectionSnapshot::capture(&collection(), 1, Timestamp::epoch());
        let meta = SnapshotMetadata::from(&snapshot);
        assert_eq!(meta.record_count, 2);
        assert_eq!(meta.queued_count, 1);
    }
}
