//! Operations postponed while the engine is busy.
//!
//! A caller's write, read or wipe that arrives before the first cycle has
//! finished, or while another writer holds the engine, is parked here and
//! replayed in arrival order by whoever holds the engine when it lets go.

use crate::{error::Result, MutationCallbacks};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;

pub type ReadCallback = Box<dyn FnOnce(Result<Value>) + Send>;
pub type WipeCallback = Box<dyn FnOnce(Result<()>) + Send>;

pub(crate) enum DeferredOp {
    Mutate {
        collection: String,
        value: Value,
        callbacks: MutationCallbacks,
    },
    Read {
        collection: String,
        callback: ReadCallback,
    },
    Wipe {
        done: WipeCallback,
    },
}

impl DeferredOp {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            DeferredOp::Mutate { .. } => "mutate",
            DeferredOp::Read { .. } => "read",
            DeferredOp::Wipe { .. } => "wipe",
        }
    }
}

impl fmt::Debug for DeferredOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeferredOp::Mutate { collection, .. } | DeferredOp::Read { collection, .. } => {
                write!(f, "{}({collection})", self.kind())
            }
            DeferredOp::Wipe { .. } => f.write_str(self.kind()),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct DeferredQueue {
    ops: VecDeque<DeferredOp>,
}

impl DeferredQueue {
    pub(crate) fn push(&mut self, op: DeferredOp) {
        tracing::debug!(op = ?op, queued = self.ops.len() + 1, "deferring operation");
        self.ops.push_back(op);
    }

    pub(crate) fn pop(&mut self) -> Option<DeferredOp> {
        self.ops.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.ops.len()
    }
}
