//! Record types and the field paths used to address values inside them.

use crate::{error::Result, Error, PrimaryKey, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Keys the engine owns. Stripped from values coming from callers or the
/// remote so they never leak into payloads.
pub const ENGINE_FIELDS: [&str; 2] = ["syncState", "syncAttempts"];

/// Where a record stands relative to the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SyncState {
    /// Created locally, never confirmed by the remote.
    PendingCreate = 0,
    /// Matches the remote as far as the engine knows.
    Synced = 1,
    /// Confirmed once, then edited locally.
    PendingUpdate = 2,
}

impl SyncState {
    /// Whether a record in this state sits in the outbound queue.
    pub fn is_queued(self) -> bool {
        !matches!(self, SyncState::Synced)
    }
}

impl From<SyncState> for u8 {
    fn from(state: SyncState) -> Self {
        state as u8
    }
}

impl TryFrom<u8> for SyncState {
    type Error = Error;

    fn try_from(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(SyncState::PendingCreate),
            1 => Ok(SyncState::Synced),
            2 => Ok(SyncState::PendingUpdate),
            other => Err(Error::InvalidSyncState(other)),
        }
    }
}

/// A dot-separated path into a JSON object, e.g. `meta.updatedAt`.
///
/// Validated once when parsed; lookups afterwards are infallible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self> {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if path.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(Error::InvalidFieldPath(path.to_string()));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn get<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(value, |cursor, segment| cursor.as_object()?.get(segment))
    }

    pub fn get_mut<'a>(&self, value: &'a mut Value) -> Option<&'a mut Value> {
        self.segments
            .iter()
            .try_fold(value, |cursor, segment| cursor.as_object_mut()?.get_mut(segment))
    }

    /// Write `new` at this path, creating intermediate objects as needed.
    /// Non-object values standing in the way are replaced.
    pub fn set(&self, target: &mut Value, new: Value) {
        let Some((last, parents)) = self.segments.split_last() else {
            return;
        };
        let mut cursor = target;
        for segment in parents {
            cursor = ensure_object(cursor)
                .entry(segment.clone())
                .or_insert(Value::Null);
        }
        ensure_object(cursor).insert(last.clone(), new);
    }

    /// Detach the value at this path, leaving an empty array in its place.
    pub fn detach(&self, target: &mut Value) -> Option<Value> {
        self.get_mut(target)
            .map(|slot| std::mem::replace(slot, Value::Array(Vec::new())))
    }

    /// Nest `value` under this path in a fresh object.
    pub fn wrap(&self, value: Value) -> Value {
        let mut shell = Value::Object(Map::new());
        self.set(&mut shell, value);
        shell
    }
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for FieldPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

impl TryFrom<String> for FieldPath {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

/// A record in a collection: the caller's value plus engine bookkeeping.
///
/// The primary key and timestamp live inside `value` at the paths the
/// collection declares; sync state and attempt count live beside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub value: Value,
    pub sync_state: SyncState,
    /// Failed-but-retryable submissions so far. Absent until the first retry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_attempts: Option<u32>,
}

impl Record {
    /// A record as handed over by the remote.
    pub fn synced(value: Value) -> Self {
        Self {
            value: strip_engine_fields(value),
            sync_state: SyncState::Synced,
            sync_attempts: None,
        }
    }

    /// A record created locally and not yet submitted.
    pub fn pending_create(value: Value) -> Self {
        Self {
            value: strip_engine_fields(value),
            sync_state: SyncState::PendingCreate,
            sync_attempts: None,
        }
    }

    pub fn is_queued(&self) -> bool {
        self.sync_state.is_queued()
    }

    /// The primary key rendered as a string. Numbers are accepted as keys.
    pub fn primary_key(&self, field: &FieldPath) -> Option<PrimaryKey> {
        key_of(&self.value, field)
    }

    pub fn set_primary_key(&mut self, field: &FieldPath, key: &str) {
        field.set(&mut self.value, Value::String(key.to_string()));
    }

    pub fn timestamp(&self, field: &FieldPath) -> Option<Timestamp> {
        field.get(&self.value).and_then(Timestamp::from_value)
    }

    pub fn set_timestamp(&mut self, field: &FieldPath, timestamp: Timestamp) {
        field.set(&mut self.value, timestamp.to_value());
    }

    /// Count one more retryable failure and return the new total.
    pub fn record_retry(&mut self) -> u32 {
        let attempts = self.sync_attempts.map_or(1, |n| n.saturating_add(1));
        self.sync_attempts = Some(attempts);
        attempts
    }

    /// The remote accepted this record.
    pub fn mark_synced(&mut self, field: &FieldPath, now: Timestamp) {
        self.set_timestamp(field, now);
        self.sync_state = SyncState::Synced;
        self.sync_attempts = None;
    }

    /// Hand this record back to the remote's authority: its timestamp drops
    /// to the replace sentinel and it leaves the outbound queue, so the next
    /// pulled version with the same key overwrites it.
    pub fn mark_replaced(&mut self, field: &FieldPath) {
        self.set_timestamp(field, Timestamp::replaced());
        self.sync_state = SyncState::Synced;
        self.sync_attempts = None;
    }
}

pub(crate) fn key_of(value: &Value, field: &FieldPath) -> Option<PrimaryKey> {
    match field.get(value)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Remove engine-owned keys from the top level of an object.
pub fn strip_engine_fields(mut value: Value) -> Value {
    if let Some(map) = value.as_object_mut() {
        for field in ENGINE_FIELDS {
            map.remove(field);
        }
    }
    value
}
