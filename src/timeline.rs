//! Per-callback execution intervals
//!
//! An invocation is a `callback_start` paired with the next `callback_end`
//! of the same handle. Invocations of one handle never overlap (the executor
//! runs a callback single-threaded), so pairing is strict FIFO:
//!
//! - a start while another start is still open: the earlier start lost its
//!   end (capture gap), it is discarded
//! - an end with no open start: skipped
//! - a start still open when the log ends: incomplete, discarded
//!
//! Timelines are computed lazily per handle and memoized. The memo is
//! populate-once: concurrent first requests may both compute the timeline,
//! the first insert wins and later ones are dropped.

use crate::event::{EventLog, EventPayload, Handle};
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// One complete execution of a callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub start: u64,
    pub end: u64,
    /// Whether the executor took the message from the intra-process buffer
    pub is_intra_process: bool,
}

/// Pair start/end events of one callback handle
pub fn pair_invocations(log: &EventLog, callback: Handle) -> Vec<Invocation> {
    let mut invocations = Vec::new();
    let mut open: Option<(u64, bool)> = None;

    for event in log {
        match event.payload {
            EventPayload::CallbackStart {
                callback: handle,
                is_intra_process,
            } if handle == callback => {
                if let Some((lost, _)) = open {
                    warn!(
                        callback = format!("{:#x}", callback),
                        start = lost,
                        "callback start without end; invocation discarded"
                    );
                }
                open = Some((event.timestamp, is_intra_process));
            }
            EventPayload::CallbackEnd { callback: handle } if handle == callback => {
                match open.take() {
                    Some((start, is_intra_process)) => invocations.push(Invocation {
                        start,
                        end: event.timestamp,
                        is_intra_process,
                    }),
                    None => warn!(
                        callback = format!("{:#x}", callback),
                        end = event.timestamp,
                        "callback end without start; skipped"
                    ),
                }
            }
            _ => {}
        }
    }

    if let Some((start, _)) = open {
        debug!(
            callback = format!("{:#x}", callback),
            start, "trailing invocation still running at end of log"
        );
    }

    invocations
}

/// Lazily built, shareable index of callback invocations
#[derive(Debug, Default)]
pub struct CallbackTimelineIndex {
    memo: RwLock<FnvHashMap<Handle, Arc<[Invocation]>>>,
}

impl CallbackTimelineIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invocations of `callback`, in start order
    pub fn invocations(&self, log: &EventLog, callback: Handle) -> Arc<[Invocation]> {
        if let Some(cached) = self
            .memo
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&callback)
        {
            return Arc::clone(cached);
        }

        // Computed outside the lock; a racing writer may get there first
        let computed: Arc<[Invocation]> = pair_invocations(log, callback).into();
        let mut memo = self.memo.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(memo.entry(callback).or_insert(computed))
    }

    /// Number of handles whose timeline has been built
    pub fn cached_len(&self) -> usize {
        self.memo
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
