//! Observer registry.

use crate::SyncNotice;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObserverId(u64);

pub type Observer = Arc<dyn Fn(&SyncNotice) + Send + Sync>;

/// Registered observers in subscription order.
///
/// Notification runs on a copy of the list with the lock released, so an
/// observer may subscribe or unsubscribe from inside its own call.
#[derive(Default)]
pub struct ObserverRegistry {
    inner: Mutex<Registered>,
}

#[derive(Default)]
struct Registered {
    next_id: u64,
    observers: Vec<(ObserverId, Observer)>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Observer) -> ObserverId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = ObserverId(inner.next_id);
        inner.observers.push((id, observer));
        id
    }

    /// Returns whether the observer was registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.observers.len();
        inner.observers.retain(|(registered, _)| *registered != id);
        inner.observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner.lock().observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, notice: &SyncNotice) {
        let observers: Vec<Observer> = self
            .inner
            .lock()
            .observers
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer(notice);
        }
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}
