//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use serde_json::Value;
use std::sync::{Arc, Mutex};
use tether_engine::{
    CollectionDecl, EngineConfig, LocalStore, ManualClock, MemoryStore, MockTransport,
    MutationCallbacks, MutationError, Record, SyncEngine, SyncNotice, Timestamp,
};

pub const TODOS_READ: &str = "http://remote/api/todos?after=";
pub const TODOS_CREATE: &str = "http://remote/api/todos";
pub const TODOS_UPDATE: &str = "http://remote/api/todos/update";
pub const NOTES_READ: &str = "http://remote/api/notes?after=";
pub const NOTES_CREATE: &str = "http://remote/api/notes";

pub const START: &str = "2024-01-01T00:00:00Z";

pub fn ts(s: &str) -> Timestamp {
    Timestamp::parse(s).unwrap()
}

pub fn todos() -> CollectionDecl {
    CollectionDecl::new("todos", "id", "timestamp", TODOS_READ, TODOS_CREATE)
        .with_update_endpoint(TODOS_UPDATE)
}

pub fn notes() -> CollectionDecl {
    CollectionDecl::new("notes", "id", "timestamp", NOTES_READ, NOTES_CREATE)
}

/// Defaults minus the background push, so every cycle is driven by the test.
pub fn quiet() -> EngineConfig {
    EngineConfig::default().with_push_sync(false)
}

pub struct Harness {
    pub engine: SyncEngine,
    pub transport: Arc<MockTransport>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    /// An engine with `todos` declared, not yet started.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: EngineConfig, store: Arc<MemoryStore>) -> Self {
        let harness = Self::bare(config, store);
        harness.engine.declare_collection(todos()).unwrap();
        harness
    }

    /// An engine with nothing declared.
    pub fn bare(config: EngineConfig, store: Arc<MemoryStore>) -> Self {
        let transport = Arc::new(MockTransport::new());
        let clock = Arc::new(ManualClock::new(ts(START)));
        let engine = SyncEngine::with_clock(
            config,
            transport.clone(),
            store.clone() as Arc<dyn LocalStore>,
            clock.clone(),
        )
        .unwrap();
        Self {
            engine,
            transport,
            store,
            clock,
        }
    }

    /// Run the first cycle so caller operations apply immediately.
    pub async fn started(config: EngineConfig) -> Self {
        let harness = Self::new(config);
        harness.engine.sync().await.unwrap();
        harness
    }

    pub fn records(&self) -> Vec<Record> {
        self.engine.records("todos").unwrap()
    }

    pub fn only_record(&self) -> Record {
        let records = self.records();
        assert_eq!(records.len(), 1, "expected exactly one record: {records:?}");
        records.into_iter().next().unwrap()
    }
}

/// What a mutation's callbacks reported.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Accepted(Record),
    Synced(Record),
    Failed(MutationError),
}

#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<Event>>>);

impl Events {
    pub fn callbacks(&self) -> MutationCallbacks {
        let (accepted, synced, failed) = (self.0.clone(), self.0.clone(), self.0.clone());
        MutationCallbacks::new()
            .on_accepted(move |r| accepted.lock().unwrap().push(Event::Accepted(r.clone())))
            .on_synced(move |r| synced.lock().unwrap().push(Event::Synced(r.clone())))
            .on_error(move |e| failed.lock().unwrap().push(Event::Failed(e.clone())))
    }

    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// Every notice an engine sends, in order.
#[derive(Clone, Default)]
pub struct Notices(Arc<Mutex<Vec<SyncNotice>>>);

impl Notices {
    pub fn attach(engine: &SyncEngine) -> Self {
        let notices = Self::default();
        let sink = notices.0.clone();
        engine.subscribe(move |notice| sink.lock().unwrap().push(notice.clone()));
        notices
    }

    pub fn take(&self) -> Vec<SyncNotice> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

pub fn key_of(record: &Record) -> String {
    record.value["id"].as_str().unwrap().to_string()
}

pub fn title(record: &Record) -> &Value {
    &record.value["title"]
}
