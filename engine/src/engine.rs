//! The sync orchestrator.
//!
//! # Cycle
//!
//! 1. Restore: on a cold start, load persisted snapshots
//! 2. Pull: fetch each collection since the watermark and merge it
//! 3. Advance the watermark if every pull succeeded
//! 4. Drain: submit each collection's queue and settle the responses
//! 5. Finish: mark the engine ready, replay deferred operations, notify
//!
//! # Exclusion
//!
//! Collection state has a single writer at a time: either a cycle or one
//! caller operation. A cycle requested while a writer is active is dropped.
//! A caller operation that arrives while a writer is active, or before the
//! first cycle finished, is deferred and replayed by the writer before it
//! lets go. The state lock itself is never held across an await.

use crate::{
    callbacks::{CallbackTable, PendingCallbacks},
    deferred::{DeferredOp, DeferredQueue},
    error::Result,
    reconcile::{settle, submit_queue},
    schema::has_drifted,
    watermark::restore_candidate,
    Clock, Collection, CollectionDecl, CollectionName, CollectionPull, CollectionSnapshot,
    CollectionSpec, DrainStats, EngineConfig, Error, LocalStore, MergeStats, MutationCallbacks,
    MutationError, ObserverId, ObserverRegistry, Record, SyncNotice, SyncReport, SyncState,
    SystemClock, Timestamp, Transport, Watermark,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SetupState {
    Uninitialized,
    /// The first cycle is running.
    Initializing,
    /// At least one cycle has finished.
    Ready,
}

/// Current step of the running cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncPhase {
    Idle,
    Restoring,
    Pulling,
    Draining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PersistenceMode {
    Enabled,
    /// Turned off by configuration.
    Disabled,
    /// The store failed; running memory-only for the rest of the session.
    Degraded,
}

/// What happened to a caller operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Ran immediately.
    Applied,
    /// Queued behind the current writer; runs when it finishes.
    Deferred,
    /// Ran immediately and was refused, e.g. an unknown collection. The
    /// operation's own callback has been told why.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Writer {
    Cycle,
    Local,
}

struct EngineState {
    collections: Vec<Collection>,
    watermark: Watermark,
    setup: SetupState,
    phase: SyncPhase,
    writer: Option<Writer>,
    deferred: DeferredQueue,
    callbacks: CallbackTable,
    persistence: PersistenceMode,
}

impl EngineState {
    fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.name() == name)
    }

    /// Caller operations must wait.
    fn busy(&self) -> bool {
        self.setup != SetupState::Ready || self.writer.is_some()
    }
}

fn find_mut<'a>(collections: &'a mut [Collection], name: &str) -> Option<&'a mut Collection> {
    collections.iter_mut().find(|c| c.name() == name)
}

struct Inner {
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    store: Arc<dyn LocalStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<EngineState>,
    observers: ObserverRegistry,
    cycles: AtomicU64,
    started: AtomicBool,
}

/// Result of running one operation.
struct Applied {
    dispatch: Dispatch,
    wants_sync: bool,
}

#[derive(Default)]
struct Replay {
    replayed: usize,
    wants_sync: bool,
}

/// An offline-first sync engine over a set of collections.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn LocalStore>,
    ) -> Result<Self> {
        Self::with_clock(config, transport, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn LocalStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let persistence = if config.allow_persistence {
            PersistenceMode::Enabled
        } else {
            PersistenceMode::Disabled
        };
        let state = EngineState {
            collections: Vec::new(),
            watermark: Watermark::new(),
            setup: SetupState::Uninitialized,
            phase: SyncPhase::Idle,
            writer: None,
            deferred: DeferredQueue::default(),
            callbacks: CallbackTable::default(),
            persistence,
        };
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                transport,
                store,
                clock,
                state: Mutex::new(state),
                observers: ObserverRegistry::new(),
                cycles: AtomicU64::new(0),
                started: AtomicBool::new(false),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // ----- declarations -----

    /// Declare a collection. Nothing changes if the declaration is invalid
    /// or the name is taken.
    pub fn declare_collection(&self, decl: CollectionDecl) -> Result<()> {
        let spec = decl.validate()?;
        let mut state = self.inner.state.lock();
        if state.collection(&spec.name).is_some() {
            return Err(Error::DuplicateCollection(spec.name));
        }
        tracing::debug!(collection = %spec.name, "collection declared");
        state.collections.push(Collection::new(spec));
        Ok(())
    }

    /// Declarations in order, without records.
    pub fn collection_specs(&self) -> Vec<CollectionSpec> {
        let state = self.inner.state.lock();
        state.collections.iter().map(|c| c.spec().clone()).collect()
    }

    // ----- observers -----

    pub fn subscribe(&self, observer: impl Fn(&SyncNotice) + Send + Sync + 'static) -> ObserverId {
        self.inner.observers.subscribe(Arc::new(observer))
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.inner.observers.unsubscribe(id)
    }

    // ----- caller operations -----

    /// Write a record locally and queue it for the remote.
    ///
    /// Deferred while a cycle runs or before the first one has finished.
    /// An unknown collection is reported through `on_error`.
    pub async fn mutate(
        &self,
        collection: &str,
        value: Value,
        callbacks: MutationCallbacks,
    ) -> Dispatch {
        self.run_exclusive(DeferredOp::Mutate {
            collection: collection.to_string(),
            value,
            callbacks,
        })
        .await
    }

    /// Hand the collection's current contents to `callback`, rewrapped in
    /// the envelope of the last pull if there was one.
    pub fn read_collection(
        &self,
        collection: &str,
        callback: impl FnOnce(Result<Value>) + Send + 'static,
    ) -> Dispatch {
        let view = {
            let mut state = self.inner.state.lock();
            if state.busy() {
                state.deferred.push(DeferredOp::Read {
                    collection: collection.to_string(),
                    callback: Box::new(callback),
                });
                return Dispatch::Deferred;
            }
            read_view(&state, collection)
        };
        let dispatch = if view.is_ok() {
            Dispatch::Applied
        } else {
            Dispatch::Rejected
        };
        callback(view);
        dispatch
    }

    /// Clear every collection, the watermark and the local store.
    /// Declarations survive.
    pub async fn wipe(&self) -> Dispatch {
        self.wipe_with(|_| {}).await
    }

    /// Like [`SyncEngine::wipe`], calling `done` once the store is cleared.
    pub async fn wipe_with(&self, done: impl FnOnce(Result<()>) + Send + 'static) -> Dispatch {
        self.run_exclusive(DeferredOp::Wipe {
            done: Box::new(done),
        })
        .await
    }

    // ----- cycles -----

    /// Run the first cycle, then start the periodic loop if one is
    /// configured. Only the first call does anything.
    pub async fn start(&self) -> Option<JoinHandle<()>> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("engine already started");
            return None;
        }
        self.sync().await;
        self.spawn_auto_sync()
    }

    fn spawn_auto_sync(&self) -> Option<JoinHandle<()>> {
        let period = self.inner.config.auto_sync_interval()?;
        let engine = self.clone();
        tracing::info!(period_ms = self.inner.config.auto_sync_ms, "auto sync enabled");
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the first cycle already ran.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                engine.sync().await;
            }
        }))
    }

    fn spawn_sync(&self) {
        let engine = self.clone();
        tokio::spawn(async move {
            engine.sync().await;
        });
    }

    /// Run one sync cycle.
    ///
    /// Returns `None` without doing anything if another writer holds the
    /// engine. If deferred mutations replayed at the end of the cycle ask
    /// for a push, another cycle follows before this returns, and its
    /// report is the one returned.
    pub async fn sync(&self) -> Option<SyncReport> {
        if !self.acquire(Writer::Cycle) {
            tracing::debug!("sync requested while the engine is busy; dropping request");
            return None;
        }
        loop {
            let mut report = self.run_cycle().await;
            let replay = self.replay_deferred().await;
            report.deferred_replayed = replay.replayed;
            self.inner
                .observers
                .notify(&SyncNotice::Completed(report.clone()));

            let follow_up = replay.wants_sync && self.inner.config.push_sync;
            if !follow_up || !self.acquire(Writer::Cycle) {
                return Some(report);
            }
            tracing::debug!(cycle = report.cycle, "replayed mutations requested another cycle");
        }
    }

    async fn run_cycle(&self) -> SyncReport {
        let cycle = self.inner.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = self.inner.clock.now();
        {
            let mut state = self.inner.state.lock();
            if state.setup == SetupState::Uninitialized {
                state.setup = SetupState::Initializing;
            }
        }
        tracing::info!(cycle, "sync cycle started");

        let restored = self.restore_if_cold().await;
        let (pulls, watermark_advanced) = self.pull_all().await;
        let drains = self.drain_all().await;

        let watermark = {
            let mut state = self.inner.state.lock();
            state.setup = SetupState::Ready;
            state.phase = SyncPhase::Idle;
            state.watermark.get()
        };
        let finished_at = self.inner.clock.now();
        tracing::info!(
            cycle,
            watermark = %watermark,
            advanced = watermark_advanced,
            "sync cycle finished"
        );

        SyncReport {
            cycle,
            restored,
            started_at,
            finished_at,
            watermark,
            watermark_advanced,
            pulls,
            drains,
            deferred_replayed: 0,
        }
    }

    // ----- restore -----

    async fn restore_if_cold(&self) -> bool {
        let cold = {
            let mut state = self.inner.state.lock();
            state.phase = SyncPhase::Restoring;
            let since = state.watermark.get();
            state.persistence == PersistenceMode::Enabled
                && state.collections.iter().all(Collection::is_empty)
                && !state
                    .collections
                    .iter()
                    .any(|c| c.has_records_newer_than(since))
        };
        if !cold {
            return false;
        }

        let snapshots = match self.inner.store.load_all().await {
            Ok(snapshots) => snapshots,
            Err(error) => {
                self.degrade(&error);
                return false;
            }
        };
        if snapshots.is_empty() {
            return false;
        }

        let expected = self.inner.config.store_version;
        let stale = snapshots
            .iter()
            .map(|s| s.store_version)
            .find(|&version| version != expected);
        if let Some(found) = stale {
            tracing::info!(found, expected, "store version changed; discarding persisted data");
            if let Err(error) = self.inner.store.delete_all().await {
                self.degrade(&error);
            }
            return false;
        }

        let (collections, records, watermark) = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let (mut collections, mut records) = (0, 0);
            for snapshot in snapshots {
                let Some(collection) = find_mut(&mut state.collections, snapshot.name()) else {
                    tracing::debug!(
                        collection = snapshot.name(),
                        "ignoring snapshot of undeclared collection"
                    );
                    continue;
                };
                collection.restore(snapshot.records, snapshot.envelope);
                if collection.has_untimed_records() {
                    tracing::warn!(
                        collection = collection.name(),
                        "persisted records lack timestamps; dropping collection"
                    );
                    collection.clear();
                    continue;
                }
                collections += 1;
                records += collection.len();
                if let Some(candidate) = restore_candidate(collection) {
                    state.watermark.raise(candidate);
                }
            }
            (collections, records, state.watermark.get())
        };

        if collections == 0 {
            return false;
        }
        tracing::info!(collections, records, watermark = %watermark, "restored local data");
        if self.inner.config.early_data_return {
            self.inner
                .observers
                .notify(&SyncNotice::Restored { collections, records });
        }
        true
    }

    // ----- pull -----

    async fn pull_all(&self) -> (Vec<CollectionPull>, bool) {
        let (specs, since) = {
            let mut state = self.inner.state.lock();
            state.phase = SyncPhase::Pulling;
            let specs: Vec<CollectionSpec> =
                state.collections.iter().map(|c| c.spec().clone()).collect();
            (specs, state.watermark.get())
        };
        if !self.inner.config.allow_remote || specs.is_empty() {
            return (Vec::new(), false);
        }

        let mut pulls = Vec::with_capacity(specs.len());
        for spec in &specs {
            pulls.push(self.pull_collection(spec, since).await);
        }

        if !pulls.iter().all(CollectionPull::succeeded) {
            tracing::debug!(since = %since, "pull incomplete; watermark stays");
            return (pulls, false);
        }
        let now = self.inner.clock.now();
        let advanced = self.inner.state.lock().watermark.raise(now);
        (pulls, advanced)
    }

    async fn pull_collection(&self, spec: &CollectionSpec, since: Timestamp) -> CollectionPull {
        let transport = &self.inner.transport;
        let mut response = transport.fetch(&spec.read_endpoint, since).await;
        if !response.is_success() {
            tracing::warn!(
                collection = %spec.name,
                status = response.status,
                "pull failed; keeping local data"
            );
            return CollectionPull::failed(&spec.name, response.status, false);
        }

        let mut drift_reset = false;
        if self.inner.config.reset_on_schema_drift && self.drifted(spec, &response.data) {
            tracing::warn!(collection = %spec.name, "remote schema changed; resetting collection");
            drift_reset = true;
            let cleared = {
                let mut guard = self.inner.state.lock();
                let state = &mut *guard;
                state.callbacks.retain(&spec.name, |_| false);
                find_mut(&mut state.collections, &spec.name).map(|collection| {
                    collection.clear();
                    self.capture(collection)
                })
            };

            response = transport.fetch(&spec.read_endpoint, Timestamp::epoch()).await;
            if !response.is_success() {
                tracing::warn!(
                    collection = %spec.name,
                    status = response.status,
                    "pull after reset failed"
                );
                if let Some(snapshot) = cleared {
                    self.persist(&snapshot).await;
                }
                return CollectionPull::failed(&spec.name, response.status, drift_reset);
            }
        }

        let merged = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            match find_mut(&mut state.collections, &spec.name) {
                Some(collection) => {
                    let items = collection.accept_payload(response.data);
                    let stats = collection.merge_pulled(items, self.inner.clock.now());
                    // A pulled version overwrites a queued one; its callbacks
                    // will never fire.
                    state
                        .callbacks
                        .retain(&spec.name, |key| {
                            collection.get(key).is_some_and(Record::is_queued)
                        });
                    let changed = drift_reset || stats.created + stats.updated > 0;
                    Some((stats, changed.then(|| self.capture(collection))))
                }
                None => None,
            }
        };
        let Some((stats, snapshot)) = merged else {
            return CollectionPull::merged(&spec.name, MergeStats::default(), drift_reset);
        };

        if let Some(snapshot) = snapshot {
            self.persist(&snapshot).await;
        }
        tracing::debug!(
            collection = %spec.name,
            created = stats.created,
            updated = stats.updated,
            skipped = stats.skipped,
            "pulled"
        );
        CollectionPull::merged(&spec.name, stats, drift_reset)
    }

    fn drifted(&self, spec: &CollectionSpec, payload: &Value) -> bool {
        let state = self.inner.state.lock();
        let stored = state
            .collection(&spec.name)
            .and_then(|c| c.records().first());
        has_drifted(spec, stored, spec.first_pulled(payload))
    }

    // ----- drain -----

    async fn drain_all(&self) -> Vec<DrainStats> {
        let names: Vec<CollectionName> = {
            let mut state = self.inner.state.lock();
            state.phase = SyncPhase::Draining;
            state
                .collections
                .iter()
                .map(|c| c.name().to_string())
                .collect()
        };
        if !self.inner.config.allow_remote {
            return Vec::new();
        }

        let mut drains = Vec::new();
        for name in names {
            if let Some(stats) = self.drain_collection(&name).await {
                drains.push(stats);
            }
        }
        drains
    }

    /// Submit one collection's queue, creates first, and write the settled
    /// records back. `None` when there was nothing queued.
    async fn drain_collection(&self, name: &str) -> Option<DrainStats> {
        let (spec, queue) = {
            let state = self.inner.state.lock();
            let collection = state.collection(name)?;
            let mut queue = collection.queued(SyncState::PendingCreate);
            queue.extend(collection.queued(SyncState::PendingUpdate));
            (collection.spec().clone(), queue)
        };
        if queue.is_empty() {
            return None;
        }
        tracing::debug!(collection = name, queued = queue.len(), "draining queue");

        let submissions = submit_queue(self.inner.transport.as_ref(), &spec, queue).await;
        let outcome = settle(
            &self.inner.config.responses,
            &spec,
            submissions,
            self.inner.clock.now(),
        );
        let stats = DrainStats::new(name, &outcome);

        let mut synced: Vec<(Record, Vec<PendingCallbacks>)> = Vec::new();
        let mut failed: Vec<(MutationError, Vec<PendingCallbacks>)> = Vec::new();
        let snapshot = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let collection = find_mut(&mut state.collections, name)?;
            for record in outcome.changed() {
                collection.upsert(record.clone());
            }
            for record in &outcome.popped {
                if let Some(key) = collection.key_of(record) {
                    synced.push((record.clone(), state.callbacks.take(name, &key)));
                }
            }
            for replaced in &outcome.replaced {
                if let Some(key) = collection.key_of(&replaced.record) {
                    failed.push((replaced.reason.clone(), state.callbacks.take(name, &key)));
                }
            }
            outcome
                .changed()
                .next()
                .is_some()
                .then(|| self.capture(collection))
        };

        if let Some(snapshot) = snapshot {
            self.persist(&snapshot).await;
        }
        if !outcome.replaced.is_empty() {
            tracing::info!(
                collection = name,
                replaced = outcome.replaced.len(),
                "records handed back to the remote"
            );
        }
        for (record, callbacks) in synced {
            for callback in callbacks {
                callback.synced(&record);
            }
        }
        for (reason, callbacks) in failed {
            for callback in callbacks {
                callback.failed(&reason);
            }
        }
        Some(stats)
    }

    // ----- exclusion and replay -----

    fn acquire(&self, writer: Writer) -> bool {
        let mut state = self.inner.state.lock();
        if state.writer.is_some() {
            return false;
        }
        state.writer = Some(writer);
        true
    }

    /// Run `op` now as the local writer, or defer it.
    async fn run_exclusive(&self, op: DeferredOp) -> Dispatch {
        let admitted = {
            let mut state = self.inner.state.lock();
            if state.busy() {
                state.deferred.push(op);
                None
            } else {
                state.writer = Some(Writer::Local);
                Some(op)
            }
        };
        let Some(op) = admitted else {
            return Dispatch::Deferred;
        };

        let applied = self.apply(op).await;
        let replay = self.replay_deferred().await;
        if (applied.wants_sync || replay.wants_sync) && self.inner.config.push_sync {
            self.spawn_sync();
        }
        applied.dispatch
    }

    /// Run deferred operations in arrival order, then release the writer.
    /// The release happens under the same lock that finds the queue empty,
    /// so nothing can be deferred without being replayed.
    async fn replay_deferred(&self) -> Replay {
        let mut replay = Replay::default();
        loop {
            let next = {
                let mut state = self.inner.state.lock();
                let next = state.deferred.pop();
                if next.is_none() {
                    state.writer = None;
                }
                next
            };
            let Some(op) = next else {
                return replay;
            };
            tracing::debug!(op = op.kind(), "replaying deferred operation");
            replay.replayed += 1;
            replay.wants_sync |= self.apply(op).await.wants_sync;
        }
    }

    async fn apply(&self, op: DeferredOp) -> Applied {
        match op {
            DeferredOp::Mutate {
                collection,
                value,
                callbacks,
            } => self.apply_mutation(&collection, value, callbacks).await,
            DeferredOp::Read {
                collection,
                callback,
            } => {
                let view = read_view(&self.inner.state.lock(), &collection);
                let dispatch = if view.is_ok() {
                    Dispatch::Applied
                } else {
                    Dispatch::Rejected
                };
                callback(view);
                Applied {
                    dispatch,
                    wants_sync: false,
                }
            }
            DeferredOp::Wipe { done } => {
                done(self.apply_wipe().await);
                Applied {
                    dispatch: Dispatch::Applied,
                    wants_sync: false,
                }
            }
        }
    }

    async fn apply_mutation(
        &self,
        name: &str,
        value: Value,
        callbacks: MutationCallbacks,
    ) -> Applied {
        if !value.is_object() {
            let kind = json_kind(&value);
            tracing::warn!(collection = name, kind, "mutation value is not an object");
            callbacks.fail(&MutationError::NotAnObject(kind));
            return Applied {
                dispatch: Dispatch::Rejected,
                wants_sync: false,
            };
        }
        let now = self.inner.clock.now();
        let staged = {
            let mut state = self.inner.state.lock();
            find_mut(&mut state.collections, name).map(|collection| {
                let record = collection.stage_local(value, now);
                let key = collection.key_of(&record);
                (record, key, self.capture(collection))
            })
        };
        let Some((record, key, snapshot)) = staged else {
            tracing::warn!(collection = name, "mutation for unknown collection");
            callbacks.fail(&MutationError::UnknownCollection(name.to_string()));
            return Applied {
                dispatch: Dispatch::Rejected,
                wants_sync: false,
            };
        };

        self.persist(&snapshot).await;

        let (on_accepted, pending) = callbacks.split();
        if let (Some(pending), Some(key)) = (pending, key) {
            self.inner.state.lock().callbacks.register(name, key, pending);
        }
        if let Some(on_accepted) = on_accepted {
            on_accepted(&record);
        }
        Applied {
            dispatch: Dispatch::Applied,
            wants_sync: true,
        }
    }

    async fn apply_wipe(&self) -> Result<()> {
        let persist = {
            let mut state = self.inner.state.lock();
            for collection in state.collections.iter_mut() {
                collection.clear();
            }
            state.watermark.reset();
            state.callbacks.clear();
            state.persistence == PersistenceMode::Enabled
        };
        tracing::info!("local data wiped");

        if persist {
            if let Err(error) = self.inner.store.delete_all().await {
                self.degrade(&error);
                return Err(error);
            }
        }
        Ok(())
    }

    // ----- persistence -----

    fn capture(&self, collection: &Collection) -> CollectionSnapshot {
        CollectionSnapshot::capture(
            collection,
            self.inner.config.store_version,
            self.inner.clock.now(),
        )
    }

    async fn persist(&self, snapshot: &CollectionSnapshot) {
        if self.persistence_mode() != PersistenceMode::Enabled {
            return;
        }
        if let Err(error) = self
            .inner
            .store
            .replace_collection(snapshot.name(), snapshot)
            .await
        {
            self.degrade(&error);
        }
    }

    fn degrade(&self, error: &Error) {
        let mut state = self.inner.state.lock();
        if state.persistence == PersistenceMode::Enabled {
            state.persistence = PersistenceMode::Degraded;
            tracing::warn!(error = %error, "local store failed; continuing in memory only");
        }
    }

    // ----- diagnostics -----

    /// A collection's records including sync bookkeeping.
    pub fn records(&self, collection: &str) -> Result<Vec<Record>> {
        let state = self.inner.state.lock();
        state
            .collection(collection)
            .map(|c| c.records().to_vec())
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))
    }

    pub fn last_checked(&self) -> Timestamp {
        self.inner.state.lock().watermark.get()
    }

    pub fn setup_state(&self) -> SetupState {
        self.inner.state.lock().setup
    }

    pub fn phase(&self) -> SyncPhase {
        self.inner.state.lock().phase
    }

    pub fn is_syncing(&self) -> bool {
        self.phase() != SyncPhase::Idle
    }

    pub fn deferred_len(&self) -> usize {
        self.inner.state.lock().deferred.len()
    }

    pub fn persistence_mode(&self) -> PersistenceMode {
        self.inner.state.lock().persistence
    }

    /// Mutations still waiting for `on_synced` or `on_error`.
    pub fn pending_callbacks(&self) -> usize {
        self.inner.state.lock().callbacks.len()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn read_view(state: &EngineState, collection: &str) -> Result<Value> {
    state
        .collection(collection)
        .map(Collection::read_view)
        .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("SyncEngine")
            .field("collections", &state.collections.len())
            .field("setup", &state.setup)
            .field("phase", &state.phase)
            .field("watermark", &state.watermark.get())
            .field("deferred", &state.deferred.len())
            .field("persistence", &state.persistence)
            .finish()
    }
}
