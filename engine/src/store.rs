//! Local persistence adapters.
//!
//! The engine stores one opaque [`CollectionSnapshot`] per collection name and
//! always replaces it whole. Anything that can do that durably can back the
//! engine.

use crate::{error::Result, CollectionName, CollectionSnapshot, Error};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Durable mapping from collection name to its latest snapshot.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Every persisted snapshot.
    async fn load_all(&self) -> Result<Vec<CollectionSnapshot>>;

    /// Replace the snapshot stored under `name`.
    async fn replace_collection(&self, name: &str, snapshot: &CollectionSnapshot) -> Result<()>;

    /// Remove everything.
    async fn delete_all(&self) -> Result<()>;
}

/// An in-process store. Survives engine restarts within one process, which
/// is enough to exercise cold-start restore in tests.
#[derive(Debug)]
pub struct MemoryStore {
    snapshots: Mutex<BTreeMap<CollectionName, CollectionSnapshot>>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            snapshots: Mutex::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// While unavailable every call fails with [`Error::Persistence`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Seed a snapshot directly, bypassing availability.
    pub fn insert(&self, snapshot: CollectionSnapshot) {
        self.snapshots
            .lock()
            .insert(snapshot.name().to_string(), snapshot);
    }

    pub fn get(&self, name: &str) -> Option<CollectionSnapshot> {
        self.snapshots.lock().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.lock().is_empty()
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Persistence("memory store is unavailable".into()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<CollectionSnapshot>> {
        self.check_available()?;
        Ok(self.snapshots.lock().values().cloned().collect())
    }

    async fn replace_collection(&self, name: &str, snapshot: &CollectionSnapshot) -> Result<()> {
        self.check_available()?;
        self.snapshots
            .lock()
            .insert(name.to_string(), snapshot.clone());
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        self.check_available()?;
        self.snapshots.lock().clear();
        Ok(())
    }
}

/// One JSON file per collection under a directory.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

const SNAPSHOT_EXTENSION: &str = "json";

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path for a collection. Names are escaped so any string is safe.
    pub fn path_for(&self, name: &str) -> PathBuf {
        let mut file = String::with_capacity(name.len() + 5);
        for byte in name.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                file.push(byte as char);
            } else {
                file.push_str(&format!("%{byte:02X}"));
            }
        }
        file.push('.');
        file.push_str(SNAPSHOT_EXTENSION);
        self.root.join(file)
    }

    async fn snapshot_files(&self) -> Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.root, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.root, e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == SNAPSHOT_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn io_error(path: &Path, err: std::io::Error) -> Error {
    Error::Persistence(format!("{}: {}", path.display(), err))
}

#[async_trait]
impl LocalStore for FileStore {
    async fn load_all(&self) -> Result<Vec<CollectionSnapshot>> {
        let mut snapshots = Vec::new();
        for path in self.snapshot_files().await? {
            let json = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| io_error(&path, e))?;
            match CollectionSnapshot::from_json(&json) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable snapshot"
                    );
                }
            }
        }
        Ok(snapshots)
    }

    async fn replace_collection(&self, name: &str, snapshot: &CollectionSnapshot) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| io_error(&self.root, e))?;

        let path = self.path_for(name);
        let tmp = path.with_extension("json.tmp");
        let json = snapshot.to_json()?;
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(&path, e))
    }

    async fn delete_all(&self) -> Result<()> {
        for path in self.snapshot_files().await? {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| io_error(&path, e))?;
        }
        Ok(())
    }
}
