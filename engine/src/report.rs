//! What a sync cycle did.

use crate::{DrainStats, MergeStats, Timestamp};
use serde::{Deserialize, Serialize};

/// Summary handed to observers after every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Cycles run by this engine so far, this one included
    pub cycle: u64,
    /// Whether this cycle loaded the persisted snapshot
    pub restored: bool,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    /// `lastChecked` after the cycle
    pub watermark: Timestamp,
    pub watermark_advanced: bool,
    pub pulls: Vec<CollectionPull>,
    pub drains: Vec<DrainStats>,
    /// Deferred operations run after the cycle finished
    pub deferred_replayed: usize,
}

impl SyncReport {
    /// Whether every collection pulled without a transport failure.
    pub fn pulled_cleanly(&self) -> bool {
        self.pulls.iter().all(CollectionPull::succeeded)
    }

    pub fn pull(&self, collection: &str) -> Option<&CollectionPull> {
        self.pulls.iter().find(|p| p.collection == collection)
    }

    pub fn drain(&self, collection: &str) -> Option<&DrainStats> {
        self.drains.iter().find(|d| d.collection == collection)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPull {
    pub collection: String,
    pub outcome: PullOutcome,
    /// Local data was dropped because the remote shape changed
    pub drift_reset: bool,
}

impl CollectionPull {
    pub fn merged(collection: impl Into<String>, stats: MergeStats, drift_reset: bool) -> Self {
        Self {
            collection: collection.into(),
            outcome: PullOutcome::Merged(stats),
            drift_reset,
        }
    }

    pub fn failed(collection: impl Into<String>, status: u16, drift_reset: bool) -> Self {
        Self {
            collection: collection.into(),
            outcome: PullOutcome::Failed { status },
            drift_reset,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, PullOutcome::Merged(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PullOutcome {
    Merged(MergeStats),
    /// The fetch did not succeed; the collection was left as it was.
    Failed { status: u16 },
}

/// Delivered to observers.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncNotice {
    /// Persisted data was loaded on a cold start. Only sent when early data
    /// return is enabled, before the remote is contacted.
    Restored { collections: usize, records: usize },
    Completed(SyncReport),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> SyncReport {
        SyncReport {
            cycle: 1,
            restored: false,
            started_at: Timestamp::epoch(),
            finished_at: Timestamp::epoch(),
            watermark: Timestamp::epoch(),
            watermark_advanced: false,
            pulls: vec![
                CollectionPull::merged("todos", MergeStats::default(), false),
                CollectionPull::failed("notes", 500, false),
            ],
            drains: Vec::new(),
            deferred_replayed: 0,
        }
    }

    #[test]
    fn lookup_by_collection() {
        let report = report();
        assert!(report.pull("todos").unwrap().succeeded());
        assert_eq!(
            report.pull("notes").unwrap().outcome,
            PullOutcome::Failed { status: 500 }
        );
        assert!(report.pull("missing").is_none());
        assert!(!report.pulled_cleanly());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(report()).unwrap();
        assert_eq!(json["watermarkAdvanced"], false);
        assert_eq!(json["pulls"][1]["outcome"]["failed"]["status"], 500);
        assert_eq!(json["startedAt"], "1970-01-01T00:00:00.000Z");
    }
}
