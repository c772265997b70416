//! Queue reconciliation: pushing queued records to the remote.
//!
//! # Algorithm
//!
//! 1. Split a collection's queue into pending creates and pending updates
//! 2. Submit creates, then updates, one record at a time, each waiting for
//!    its response before the next goes out
//! 3. Classify every response against the [`ResponsePolicy`]
//! 4. Settle: accepted records become `Synced`, retryable ones count an
//!    attempt, rejected or exhausted ones are replaced
//! 5. The caller writes the settled records back and persists once
//!
//! Replacing is the only conflict rule. The local record is never pushed
//! over the remote's objection; it is handed back to whatever the remote
//! sends next for that key.

use crate::{
    transport::{is_success, NO_CONNECTION},
    CollectionSpec, MutationError, Record, Timestamp, Transport,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which response codes mean what.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponsePolicy {
    /// Keep the record queued and count an attempt
    pub retry_codes: BTreeSet<u16>,
    /// Give the record back to the remote immediately
    pub replace_codes: BTreeSet<u16>,
    /// Attempts allowed before a retryable record is replaced
    pub max_retry: u32,
}

impl Default for ResponsePolicy {
    fn default() -> Self {
        Self {
            retry_codes: [401, 500, 502].into_iter().collect(),
            replace_codes: [400, 403, 404].into_iter().collect(),
            max_retry: 3,
        }
    }
}

impl ResponsePolicy {
    /// Classify one submission status.
    ///
    /// Codes in neither set are retried: an unknown code must not drop data.
    pub fn classify(&self, status: u16) -> Disposition {
        if status == NO_CONNECTION {
            Disposition::NoChange
        } else if is_success(status) {
            Disposition::Pop
        } else if self.replace_codes.contains(&status) {
            Disposition::Replace
        } else {
            Disposition::Retry
        }
    }
}

/// What to do with a submitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Accepted by the remote; leave the queue.
    Pop,
    /// Remote unreachable; try again next cycle at no cost.
    NoChange,
    /// Transient failure; count an attempt.
    Retry,
    /// Rejected; hand the record back to the remote.
    Replace,
}

/// One record and the status its submission got.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub record: Record,
    pub status: u16,
}

/// Submit records strictly one after another.
pub async fn submit_queue(
    transport: &dyn Transport,
    spec: &CollectionSpec,
    queue: Vec<Record>,
) -> Vec<Submission> {
    let mut submissions = Vec::with_capacity(queue.len());
    for record in queue {
        let endpoint = spec.endpoint_for(record.sync_state);
        let status = transport.submit(endpoint, &spec.submission_body(&record)).await;
        tracing::debug!(collection = %spec.name, endpoint, status, "submitted queued record");
        submissions.push(Submission { record, status });
    }
    submissions
}

/// A record handed back to the remote and why.
#[derive(Debug, Clone, PartialEq)]
pub struct Replaced {
    pub record: Record,
    pub reason: MutationError,
}

/// Settled submissions for one collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainOutcome {
    pub popped: Vec<Record>,
    pub retried: Vec<Record>,
    pub replaced: Vec<Replaced>,
    pub unchanged: Vec<Record>,
}

impl DrainOutcome {
    /// Records whose stored copy changed and must be written back.
    pub fn changed(&self) -> impl Iterator<Item = &Record> {
        self.popped
            .iter()
            .chain(self.retried.iter())
            .chain(self.replaced.iter().map(|r| &r.record))
    }

    pub fn is_empty(&self) -> bool {
        self.popped.is_empty()
            && self.retried.is_empty()
            && self.replaced.is_empty()
            && self.unchanged.is_empty()
    }
}

/// Apply the policy to a batch of submissions.
pub fn settle(
    policy: &ResponsePolicy,
    spec: &CollectionSpec,
    submissions: Vec<Submission>,
    now: Timestamp,
) -> DrainOutcome {
    let mut outcome = DrainOutcome::default();

    for Submission { mut record, status } in submissions {
        match policy.classify(status) {
            Disposition::Pop => {
                record.mark_synced(&spec.timestamp_field, now);
                outcome.popped.push(record);
            }
            Disposition::NoChange => outcome.unchanged.push(record),
            Disposition::Retry => {
                let attempts = record.record_retry();
                if attempts > policy.max_retry {
                    tracing::debug!(
                        collection = %spec.name,
                        status,
                        attempts,
                        "retries exhausted; replacing record"
                    );
                    record.mark_replaced(&spec.timestamp_field);
                    outcome.replaced.push(Replaced {
                        record,
                        reason: MutationError::RetriesExhausted(attempts),
                    });
                } else {
                    outcome.retried.push(record);
                }
            }
            Disposition::Replace => {
                tracing::debug!(
                    collection = %spec.name,
                    status,
                    "remote rejected record; replacing"
                );
                record.mark_replaced(&spec.timestamp_field);
                outcome.replaced.push(Replaced {
                    record,
                    reason: MutationError::Rejected(status),
                });
            }
        }
    }

    outcome
}

/// Per-collection counts from one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainStats {
    pub collection: String,
    pub popped: usize,
    pub retried: usize,
    pub replaced: usize,
    pub unchanged: usize,
}

impl DrainStats {
    pub fn new(collection: impl Into<String>, outcome: &DrainOutcome) -> Self {
        Self {
            collection: collection.into(),
            popped: outcome.popped.len(),
            retried: outcome.retried.len(),
            replaced: outcome.replaced.len(),
            unchanged: outcome.unchanged.len(),
        }
    }
}
