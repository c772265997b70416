//! Collections: declarations, the in-memory record list, and pull merging.

use crate::{
    error::Result, record::key_of, CollectionName, Error, FieldPath, PrimaryKey, Record,
    SyncState, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A collection declaration as supplied by the caller.
///
/// Every field is optional here so that missing ones can be reported
/// together; [`CollectionDecl::validate`] turns it into a [`CollectionSpec`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDecl {
    pub name: Option<String>,
    pub primary_key_field: Option<String>,
    pub timestamp_field: Option<String>,
    pub read_endpoint: Option<String>,
    pub create_endpoint: Option<String>,
    pub update_endpoint: Option<String>,
    pub read_wrapper_path: Option<String>,
    pub write_wrapper_path: Option<String>,
}

impl CollectionDecl {
    /// A declaration with all required fields set.
    pub fn new(
        name: impl Into<String>,
        primary_key_field: impl Into<String>,
        timestamp_field: impl Into<String>,
        read_endpoint: impl Into<String>,
        create_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            primary_key_field: Some(primary_key_field.into()),
            timestamp_field: Some(timestamp_field.into()),
            read_endpoint: Some(read_endpoint.into()),
            create_endpoint: Some(create_endpoint.into()),
            ..Self::default()
        }
    }

    pub fn with_update_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.update_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_read_wrapper(mut self, path: impl Into<String>) -> Self {
        self.read_wrapper_path = Some(path.into());
        self
    }

    pub fn with_write_wrapper(mut self, path: impl Into<String>) -> Self {
        self.write_wrapper_path = Some(path.into());
        self
    }

    /// Check required fields and parse paths.
    pub fn validate(self) -> Result<CollectionSpec> {
        fn present(value: &Option<String>) -> bool {
            value.as_deref().is_some_and(|v| !v.trim().is_empty())
        }

        let missing: Vec<&str> = [
            ("name", &self.name),
            ("primaryKeyField", &self.primary_key_field),
            ("timestampField", &self.timestamp_field),
            ("readEndpoint", &self.read_endpoint),
            ("createEndpoint", &self.create_endpoint),
        ]
        .into_iter()
        .filter(|(_, value)| !present(value))
        .map(|(field, _)| field)
        .collect();
        if !missing.is_empty() {
            return Err(Error::InvalidCollection(missing.join(", ")));
        }

        let optional_path = |raw: Option<String>| -> Result<Option<FieldPath>> {
            raw.filter(|p| !p.is_empty())
                .map(|p| FieldPath::parse(&p))
                .transpose()
        };

        let create_endpoint = self.create_endpoint.unwrap_or_default();
        Ok(CollectionSpec {
            name: self.name.unwrap_or_default(),
            primary_key_field: FieldPath::parse(
                self.primary_key_field.as_deref().unwrap_or_default(),
            )?,
            timestamp_field: FieldPath::parse(self.timestamp_field.as_deref().unwrap_or_default())?,
            read_endpoint: self.read_endpoint.unwrap_or_default(),
            update_endpoint: self
                .update_endpoint
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| create_endpoint.clone()),
            create_endpoint,
            read_wrapper_path: optional_path(self.read_wrapper_path)?,
            write_wrapper_path: optional_path(self.write_wrapper_path)?,
        })
    }
}

/// A validated collection declaration. Carries no records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSpec {
    pub name: CollectionName,
    pub primary_key_field: FieldPath,
    pub timestamp_field: FieldPath,
    pub read_endpoint: String,
    pub create_endpoint: String,
    pub update_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_wrapper_path: Option<FieldPath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_wrapper_path: Option<FieldPath>,
}

impl CollectionSpec {
    /// Endpoint a queued record of the given state is submitted to.
    pub fn endpoint_for(&self, state: SyncState) -> &str {
        match state {
            SyncState::PendingUpdate => &self.update_endpoint,
            _ => &self.create_endpoint,
        }
    }

    /// The first record of a pulled response, without taking it apart.
    pub fn first_pulled<'a>(&self, payload: &'a Value) -> Option<&'a Value> {
        let items = match &self.read_wrapper_path {
            Some(path) => path.get(payload)?,
            None => payload,
        };
        match items {
            Value::Array(items) => items.first(),
            Value::Null => None,
            single => Some(single),
        }
    }

    /// The request body for one record, wrapped if the remote expects it.
    pub fn submission_body(&self, record: &Record) -> Value {
        match &self.write_wrapper_path {
            Some(path) => path.wrap(record.value.clone()),
            None => record.value.clone(),
        }
    }
}

/// The outer shape of a pulled response whose records sit at a nested path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub path: FieldPath,
    /// The response with the record array replaced by `[]`.
    pub shell: Value,
}

impl Envelope {
    /// Split a response into its shell and the records at `path`.
    pub fn unwrap(path: &FieldPath, mut payload: Value) -> (Self, Vec<Value>) {
        let items = path.detach(&mut payload).map(into_items).unwrap_or_default();
        let envelope = Self {
            path: path.clone(),
            shell: payload,
        };
        (envelope, items)
    }

    /// Put `items` back where they came from.
    pub fn rewrap(&self, items: Vec<Value>) -> Value {
        let mut full = self.shell.clone();
        self.path.set(&mut full, Value::Array(items));
        full
    }
}

fn into_items(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    }
}

/// What a merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStats {
    pub created: usize,
    pub updated: usize,
    /// Pulled values without a usable primary key.
    pub skipped: usize,
}

/// A declared collection and its records, in stable insertion order.
#[derive(Debug, Clone)]
pub struct Collection {
    spec: CollectionSpec,
    records: Vec<Record>,
    envelope: Option<Envelope>,
}

impl Collection {
    pub fn new(spec: CollectionSpec) -> Self {
        Self {
            spec,
            records: Vec::new(),
            envelope: None,
        }
    }

    pub fn spec(&self) -> &CollectionSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn envelope(&self) -> Option<&Envelope> {
        self.envelope.as_ref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn key_of(&self, record: &Record) -> Option<PrimaryKey> {
        record.primary_key(&self.spec.primary_key_field)
    }

    pub fn timestamp_of(&self, record: &Record) -> Option<Timestamp> {
        record.timestamp(&self.spec.timestamp_field)
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        let field = &self.spec.primary_key_field;
        self.records
            .iter()
            .position(|r| key_of(&r.value, field).as_deref() == Some(key))
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.position(key).map(|i| &self.records[i])
    }

    /// Overwrite the record with the same key in place, or append.
    ///
    /// Returns `None` (and stores nothing) when the record has no key.
    pub fn upsert(&mut self, record: Record) -> Option<MergeKind> {
        let key = self.key_of(&record)?;
        match self.position(&key) {
            Some(index) => {
                self.records[index] = record;
                Some(MergeKind::Updated)
            }
            None => {
                self.records.push(record);
                Some(MergeKind::Created)
            }
        }
    }

    /// Take a raw pulled response apart into record values, capturing the
    /// envelope when the collection declares a read wrapper.
    pub fn accept_payload(&mut self, payload: Value) -> Vec<Value> {
        match &self.spec.read_wrapper_path {
            Some(path) => {
                let (envelope, items) = Envelope::unwrap(path, payload);
                self.envelope = Some(envelope);
                items
            }
            None => into_items(payload),
        }
    }

    /// Merge pulled values. The remote is authoritative: every value lands
    /// as `Synced`, replacing any local record with the same key whole.
    pub fn merge_pulled(&mut self, values: Vec<Value>, now: Timestamp) -> MergeStats {
        let mut stats = MergeStats::default();
        for value in values {
            let mut record = Record::synced(value);
            // Only a missing stamp is filled in; whatever the remote sent is kept.
            if !self.has_timestamp_field(&record) {
                record.set_timestamp(&self.spec.timestamp_field, now);
            }
            match self.upsert(record) {
                Some(MergeKind::Created) => stats.created += 1,
                Some(MergeKind::Updated) => stats.updated += 1,
                None => {
                    tracing::warn!(
                        collection = %self.spec.name,
                        "pulled record has no primary key; skipping"
                    );
                    stats.skipped += 1;
                }
            }
        }
        stats
    }

    /// Apply a caller's write: stamp it, give it a key if it has none, and
    /// put it in the queue. Returns the stored record.
    pub fn stage_local(&mut self, value: Value, now: Timestamp) -> Record {
        let spec = &self.spec;
        let existing = key_of(&value, &spec.primary_key_field).and_then(|k| self.position(&k));

        match existing {
            Some(index) => {
                let current = &self.records[index];
                let sync_state = match current.sync_state {
                    SyncState::Synced => SyncState::PendingUpdate,
                    pending => pending,
                };
                let mut record = Record {
                    sync_state,
                    sync_attempts: current.sync_attempts,
                    ..Record::pending_create(value)
                };
                record.set_timestamp(&self.spec.timestamp_field, now);
                self.records[index] = record.clone();
                record
            }
            None => {
                let mut record = Record::pending_create(value);
                if self.key_of(&record).is_none() {
                    let key = uuid::Uuid::new_v4().to_string();
                    record.set_primary_key(&self.spec.primary_key_field, &key);
                }
                record.set_timestamp(&self.spec.timestamp_field, now);
                self.records.push(record.clone());
                record
            }
        }
    }

    /// Clones of the records in one queue state, in collection order.
    pub fn queued(&self, state: SyncState) -> Vec<Record> {
        self.records
            .iter()
            .filter(|r| r.sync_state == state)
            .cloned()
            .collect()
    }

    /// Whether any record carries a timestamp later than `since`.
    pub fn has_records_newer_than(&self, since: Timestamp) -> bool {
        self.records
            .iter()
            .any(|r| self.timestamp_of(r).is_some_and(|t| t > since))
    }

    /// Whether any record lacks a timestamp field altogether.
    pub fn has_untimed_records(&self) -> bool {
        self.records.iter().any(|r| !self.has_timestamp_field(r))
    }

    fn has_timestamp_field(&self, record: &Record) -> bool {
        self.spec
            .timestamp_field
            .get(&record.value)
            .is_some_and(|v| !v.is_null())
    }

    /// What callers see: record values, inside the captured envelope if any.
    pub fn read_view(&self) -> Value {
        let items: Vec<Value> = self.records.iter().map(|r| r.value.clone()).collect();
        match &self.envelope {
            Some(envelope) => envelope.rewrap(items),
            None => Value::Array(items),
        }
    }

    /// Replace records and envelope with persisted ones.
    pub fn restore(&mut self, records: Vec<Record>, envelope: Option<Envelope>) {
        self.records = records;
        self.envelope = envelope;
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.envelope = None;
    }
}

/// How an upsert landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeKind {
    Created,
    Updated,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decl() -> CollectionDecl {
        CollectionDecl::new(
            "todos",
            "id",
            "timestamp",
            "http://remote/api/todos?after=",
            "http://remote/api/todos",
        )
    }

    fn todos() -> Collection {
        Collection::new(decl().validate().unwrap())
    }

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    #[test]
    fn update_endpoint_defaults_to_create() {
        let spec = decl().validate().unwrap();
        assert_eq!(spec.update_endpoint, spec.create_endpoint);

        let spec = decl()
            .with_update_endpoint("http://remote/api/todos/update")
            .validate()
            .unwrap();
        assert_eq!(spec.update_endpoint, "http://remote/api/todos/update");
        assert_eq!(spec.endpoint_for(SyncState::PendingUpdate), "http://remote/api/todos/update");
        assert_eq!(spec.endpoint_for(SyncState::PendingCreate), "http://remote/api/todos");
    }

    #[test]
    fn validate_reports_every_missing_field() {
        let decl = CollectionDecl {
            name: Some("todos".into()),
            read_endpoint: Some("  ".into()),
            ..CollectionDecl::default()
        };
        assert_eq!(
            decl.validate(),
            Err(Error::InvalidCollection(
                "primaryKeyField, timestampField, readEndpoint, createEndpoint".into()
            ))
        );
    }

    #[test]
    fn validate_rejects_bad_paths() {
        let mut bad = decl();
        bad.primary_key_field = Some("a..b".into());
        assert!(matches!(bad.validate(), Err(Error::InvalidFieldPath(_))));
    }

    #[test]
    fn merge_is_keyed_by_primary_key() {
        let mut collection = todos();
        let now = ts("2024-01-01T00:00:00Z");
        let pulled = vec![json!({
            "id": "1",
            "title": "a",
            "timestamp": "2024-01-01T00:00:00.000Z"
        })];

        let first = collection.merge_pulled(pulled.clone(), now);
        let second = collection.merge_pulled(pulled, now);

        assert_eq!(first, MergeStats { created: 1, updated: 0, skipped: 0 });
        assert_eq!(second, MergeStats { created: 0, updated: 1, skipped: 0 });
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn merge_replaces_whole_record() {
        let mut collection = todos();
        let now = ts("2024-01-01T00:00:00Z");
        collection.merge_pulled(vec![json!({"id": "1", "title": "a", "done": true})], now);
        collection.merge_pulled(vec![json!({"id": "1", "title": "b"})], now);

        let record = collection.get("1").unwrap();
        assert_eq!(record.value["title"], "b");
        assert!(record.value.get("done").is_none());
    }

    #[test]
    fn merge_forces_synced_and_stamps_missing_timestamps() {
        let mut collection = todos();
        let now = ts("2024-03-03T00:00:00Z");
        collection.merge_pulled(vec![json!({"id": "1", "syncState": 0})], now);

        let record = collection.get("1").unwrap();
        assert_eq!(record.sync_state, SyncState::Synced);
        assert_eq!(collection.timestamp_of(record), Some(now));
    }

    #[test]
    fn merge_keeps_zoneless_remote_timestamps() {
        let mut collection = todos();
        let now = ts("2030-01-01T00:00:00Z");
        collection.merge_pulled(vec![json!({"id": "1", "timestamp": "2024-05-01T10:00:00"})], now);

        let record = collection.get("1").unwrap();
        assert_eq!(record.value["timestamp"], "2024-05-01T10:00:00");
        assert_eq!(collection.timestamp_of(record), Some(ts("2024-05-01T10:00:00Z")));
    }

    #[test]
    fn merge_never_restamps_a_present_timestamp() {
        let mut collection = todos();
        let now = ts("2030-01-01T00:00:00Z");
        collection.merge_pulled(
            vec![
                json!({"id": "odd", "timestamp": "last tuesday"}),
                json!({"id": "null", "timestamp": null}),
            ],
            now,
        );

        assert_eq!(collection.get("odd").unwrap().value["timestamp"], "last tuesday");
        assert_eq!(collection.timestamp_of(collection.get("null").unwrap()), Some(now));
        assert!(!collection.has_untimed_records());
    }

    #[test]
    fn merge_skips_keyless_values() {
        let mut collection = todos();
        let stats = collection.merge_pulled(vec![json!({"title": "orphan"})], Timestamp::epoch());
        assert_eq!(stats.skipped, 1);
        assert!(collection.is_empty());
    }

    #[test]
    fn stage_local_generates_key_for_new_records() {
        let mut collection = todos();
        let now = ts("2024-01-01T00:00:00Z");
        let record = collection.stage_local(json!({"title": "new"}), now);

        let key = collection.key_of(&record).unwrap();
        assert_eq!(key.len(), 36);
        assert_eq!(record.sync_state, SyncState::PendingCreate);
        assert_eq!(collection.timestamp_of(&record), Some(now));
        assert_eq!(collection.get(&key), Some(&record));
    }

    #[test]
    fn stage_local_escalates_synced_to_pending_update() {
        let mut collection = todos();
        let now = ts("2024-01-01T00:00:00Z");
        collection.merge_pulled(vec![json!({"id": "1", "title": "a"})], now);

        let record = collection.stage_local(json!({"id": "1", "title": "b"}), now);
        assert_eq!(record.sync_state, SyncState::PendingUpdate);
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn stage_local_keeps_pending_states() {
        let mut collection = todos();
        let now = ts("2024-01-01T00:00:00Z");
        let created = collection.stage_local(json!({"id": "1", "title": "a"}), now);
        assert_eq!(created.sync_state, SyncState::PendingCreate);

        let again = collection.stage_local(json!({"id": "1", "title": "b"}), now);
        assert_eq!(again.sync_state, SyncState::PendingCreate);
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.get("1").unwrap().value["title"], "b");
    }

    #[test]
    fn envelope_unwrap_and_rewrap() {
        let spec = decl().with_read_wrapper("data.todos").validate().unwrap();
        let mut collection = Collection::new(spec);

        let payload = json!({"data": {"todos": [{"id": "1"}]}, "status": "ok"});
        let items = collection.accept_payload(payload);
        assert_eq!(items, vec![json!({"id": "1"})]);

        collection.merge_pulled(items, ts("2024-01-01T00:00:00Z"));
        let view = collection.read_view();
        assert_eq!(view["status"], "ok");
        assert_eq!(view["data"]["todos"][0]["id"], "1");
    }

    #[test]
    fn single_object_payload_is_one_item() {
        let mut collection = todos();
        assert_eq!(collection.accept_payload(json!({"id": "1"})).len(), 1);
        assert!(collection.accept_payload(Value::Null).is_empty());
    }

    #[test]
    fn first_pulled_looks_through_the_wrapper() {
        let wrapped = decl().with_read_wrapper("data").validate().unwrap();
        let payload = json!({"data": [{"id": "1"}, {"id": "2"}]});
        assert_eq!(wrapped.first_pulled(&payload), Some(&json!({"id": "1"})));

        let bare = decl().validate().unwrap();
        assert_eq!(bare.first_pulled(&json!([])), None);
        assert_eq!(bare.first_pulled(&json!({"id": "9"})), Some(&json!({"id": "9"})));
    }

    #[test]
    fn submission_body_honours_write_wrapper() {
        let spec = decl().with_write_wrapper("todo").validate().unwrap();
        let record = Record::pending_create(json!({"id": "1"}));
        assert_eq!(spec.submission_body(&record), json!({"todo": {"id": "1"}}));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_repeated_pulls_never_duplicate(
                keys in proptest::collection::vec(0u8..20, 0..60),
                repeats in 1usize..4,
            ) {
                let mut collection = todos();
                let values: Vec<Value> =
                    keys.iter().map(|k| json!({"id": k.to_string()})).collect();
                for _ in 0..repeats {
                    collection.merge_pulled(values.clone(), Timestamp::epoch());
                }

                let mut distinct = keys.clone();
                distinct.sort_unstable();
                distinct.dedup();
                prop_assert_eq!(collection.len(), distinct.len());
            }
        }
    }
}
