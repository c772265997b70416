//! In-memory record tables, one per collection.

use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use tether_engine::{FieldPath, Timestamp};

/// A stored row: the record as last written plus the stamp used for ordering.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub key: String,
    pub stamped_at: Timestamp,
    pub payload: Value,
}

/// Every collection the server has seen, keyed by name and then primary key.
///
/// Collections come into existence on first write.
#[derive(Debug)]
pub struct RecordTable {
    primary_key: FieldPath,
    timestamp: FieldPath,
    collections: DashMap<String, HashMap<String, StoredRecord>>,
}

impl RecordTable {
    pub fn new(primary_key: FieldPath, timestamp: FieldPath) -> Self {
        Self {
            primary_key,
            timestamp,
            collections: DashMap::new(),
        }
    }

    /// Insert or replace `payload` in `collection`, stamping it with `now`.
    ///
    /// A payload without a usable primary key gets a fresh UUID. Returns the
    /// record as stored.
    pub fn upsert(&self, collection: &str, mut payload: Value, now: Timestamp) -> StoredRecord {
        let key = match self.key_of(&payload) {
            Some(key) => key,
            None => {
                let key = uuid::Uuid::new_v4().to_string();
                self.primary_key.set(&mut payload, Value::String(key.clone()));
                key
            }
        };
        self.timestamp.set(&mut payload, now.to_value());

        let stored = StoredRecord {
            key: key.clone(),
            stamped_at: now,
            payload,
        };
        let replaced = self
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(key, stored.clone())
            .is_some();

        tracing::debug!(collection, key = %stored.key, replaced, "stored record");
        stored
    }

    /// Records stamped strictly after `after` (everything when `None`), oldest first.
    pub fn changed_since(&self, collection: &str, after: Option<Timestamp>) -> Vec<Value> {
        let Some(table) = self.collections.get(collection) else {
            return Vec::new();
        };
        let mut rows: Vec<&StoredRecord> = table
            .values()
            .filter(|row| after.map_or(true, |after| row.stamped_at > after))
            .collect();
        rows.sort_by(|a, b| a.stamped_at.cmp(&b.stamped_at).then_with(|| a.key.cmp(&b.key)));
        rows.into_iter().map(|row| row.payload.clone()).collect()
    }

    pub fn get(&self, collection: &str, key: &str) -> Option<StoredRecord> {
        self.collections.get(collection)?.get(key).cloned()
    }

    /// Number of records in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, |table| table.len())
    }

    /// Number of collections that have received at least one write.
    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    fn key_of(&self, payload: &Value) -> Option<String> {
        match self.primary_key.get(payload)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
