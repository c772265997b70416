//! # Tether Engine
//!
//! An offline-first sync engine.
//!
//! The engine keeps a local mirror of named record collections, lets callers
//! write while disconnected, and reconciles with a remote source of truth
//! through incremental pulls and a durable outbound queue with bounded
//! retry.
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] is an arbitrary JSON object plus engine bookkeeping:
//! - a primary key and a timestamp, stored inside the object at the paths
//!   its collection declares
//! - a [`SyncState`]: `PendingCreate`, `Synced` or `PendingUpdate`
//! - a retry counter, absent until the first retryable failure
//!
//! ### Collections
//!
//! A [`CollectionDecl`] names the key and timestamp fields, the endpoints,
//! and optional envelope paths for nested payloads. Declarations are
//! validated once and live for the life of the engine.
//!
//! ### Sync cycle
//!
//! [`SyncEngine::sync`] restores persisted data on a cold start, pulls every
//! collection since the watermark, merges by primary key, drains each
//! collection's queue one record at a time, then replays whatever callers
//! did in the meantime and notifies observers with a [`SyncReport`].
//!
//! ### Reconciliation
//!
//! Every submission status is classified by the [`ResponsePolicy`]:
//! - success pops the record out of the queue
//! - no connection leaves it alone
//! - retry codes (and unknown codes) count an attempt
//! - replace codes, or too many attempts, hand the record back to the remote
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use tether_engine::{
//!     CollectionDecl, EngineConfig, MemoryStore, MockTransport, MutationCallbacks, SyncEngine,
//!     SyncState,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> tether_engine::error::Result<()> {
//! let engine = SyncEngine::new(
//!     EngineConfig::default().with_push_sync(false),
//!     Arc::new(MockTransport::new()),
//!     Arc::new(MemoryStore::new()),
//! )?;
//!
//! // 1. Declare a collection
//! engine.declare_collection(CollectionDecl::new(
//!     "todos",
//!     "id",
//!     "updatedAt",
//!     "https://example.com/api/todos?after=",
//!     "https://example.com/api/todos",
//! ))?;
//!
//! // 2. Run the first cycle
//! engine.start().await;
//!
//! // 3. Write while "offline"
//! engine
//!     .mutate("todos", json!({"title": "write docs"}), MutationCallbacks::new())
//!     .await;
//! assert_eq!(engine.records("todos")?[0].sync_state, SyncState::PendingCreate);
//!
//! // 4. The next cycle pushes it
//! engine.sync().await;
//! assert_eq!(engine.records("todos")?[0].sync_state, SyncState::Synced);
//! # Ok(())
//! # }
//! ```
//!
//! ## Adapters
//!
//! Persistence and networking sit behind the [`LocalStore`] and
//! [`Transport`] traits. [`FileStore`] and [`HttpTransport`] are the real
//! implementations; [`MemoryStore`] and [`MockTransport`] exist for tests.

pub mod callbacks;
pub mod clock;
pub mod collection;
pub mod config;
pub mod deferred;
pub mod engine;
pub mod error;
pub mod observer;
pub mod reconcile;
pub mod record;
pub mod report;
pub mod schema;
pub mod snapshot;
pub mod store;
pub mod transport;
pub mod watermark;

// Re-export main types at crate root
pub use callbacks::MutationCallbacks;
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use collection::{Collection, CollectionDecl, CollectionSpec, Envelope, MergeKind, MergeStats};
pub use config::EngineConfig;
pub use engine::{Dispatch, PersistenceMode, SetupState, SyncEngine, SyncPhase};
pub use error::{Error, MutationError};
pub use observer::{Observer, ObserverId, ObserverRegistry};
pub use reconcile::{Disposition, DrainOutcome, DrainStats, ResponsePolicy};
pub use record::{FieldPath, Record, SyncState};
pub use report::{CollectionPull, PullOutcome, SyncNotice, SyncReport};
pub use snapshot::{CollectionSnapshot, SnapshotMetadata, SNAPSHOT_FORMAT_VERSION};
pub use store::{FileStore, LocalStore, MemoryStore};
pub use transport::{FetchResponse, HttpTransport, MockTransport, Transport, NO_CONNECTION};
pub use watermark::Watermark;

/// Type aliases for clarity
pub type CollectionName = String;
pub type PrimaryKey = String;
