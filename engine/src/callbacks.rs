//! Per-mutation completion callbacks.
//!
//! Callbacks live only in memory, in a side table keyed by collection and
//! primary key. They are never persisted: after a restart a queued record
//! still syncs, it just has nobody waiting on it.

use crate::{CollectionName, MutationError, PrimaryKey, Record};
use std::collections::HashMap;
use std::fmt;

type RecordCallback = Box<dyn FnOnce(&Record) + Send>;
type ErrorCallback = Box<dyn FnOnce(&MutationError) + Send>;

/// Hooks a caller can attach to one `mutate` call.
///
/// - `on_accepted` fires once the record is stored locally.
/// - `on_synced` fires when a later drain gets it accepted by the remote.
/// - `on_error` fires if the collection is unknown or the record is replaced.
#[derive(Default)]
pub struct MutationCallbacks {
    on_accepted: Option<RecordCallback>,
    on_synced: Option<RecordCallback>,
    on_error: Option<ErrorCallback>,
}

impl MutationCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_accepted(mut self, f: impl FnOnce(&Record) + Send + 'static) -> Self {
        self.on_accepted = Some(Box::new(f));
        self
    }

    pub fn on_synced(mut self, f: impl FnOnce(&Record) + Send + 'static) -> Self {
        self.on_synced = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(&MutationError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Split off the acceptance hook; the rest waits for the remote.
    pub(crate) fn split(self) -> (Option<RecordCallback>, Option<PendingCallbacks>) {
        let pending = (self.on_synced.is_some() || self.on_error.is_some()).then(|| {
            PendingCallbacks {
                on_synced: self.on_synced,
                on_error: self.on_error,
            }
        });
        (self.on_accepted, pending)
    }

    /// The mutation never got stored.
    pub(crate) fn fail(self, error: &MutationError) {
        if let Some(f) = self.on_error {
            f(error);
        }
    }
}

impl fmt::Debug for MutationCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationCallbacks")
            .field("on_accepted", &self.on_accepted.is_some())
            .field("on_synced", &self.on_synced.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// The part of [`MutationCallbacks`] still waiting on a drain.
pub(crate) struct PendingCallbacks {
    on_synced: Option<RecordCallback>,
    on_error: Option<ErrorCallback>,
}

impl PendingCallbacks {
    pub(crate) fn synced(self, record: &Record) {
        if let Some(f) = self.on_synced {
            f(record);
        }
    }

    pub(crate) fn failed(self, error: &MutationError) {
        if let Some(f) = self.on_error {
            f(error);
        }
    }
}

/// Pending callbacks by record. A record mutated twice before it syncs has
/// two entries, fired together.
#[derive(Default)]
pub(crate) struct CallbackTable {
    pending: HashMap<(CollectionName, PrimaryKey), Vec<PendingCallbacks>>,
}

impl CallbackTable {
    pub(crate) fn register(
        &mut self,
        collection: &str,
        key: PrimaryKey,
        callbacks: PendingCallbacks,
    ) {
        self.pending
            .entry((collection.to_string(), key))
            .or_default()
            .push(callbacks);
    }

    pub(crate) fn take(&mut self, collection: &str, key: &str) -> Vec<PendingCallbacks> {
        self.pending
            .remove(&(collection.to_string(), key.to_string()))
            .unwrap_or_default()
    }

    /// Drop entries in `collection` whose key fails `keep`.
    pub(crate) fn retain(&mut self, collection: &str, mut keep: impl FnMut(&str) -> bool) {
        self.pending
            .retain(|(name, key), _| name != collection || keep(key));
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }
}
