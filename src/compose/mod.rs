//! Record composers
//!
//! Each composer specializes the [`CommunicationMatcher`] for one delivery
//! path:
//!
//! | composer         | producers                      | consumers                | rule           |
//! |------------------|--------------------------------|--------------------------|----------------|
//! | callback         | -                              | callback invocations     | -              |
//! | inter-process    | publish chains (per publisher) | non-intra invocations    | configured     |
//! | intra-process    | intra publishes (same pid)     | intra invocations        | buffer address |
//! | variable passing | writer invocation ends         | reader invocation starts | latest before  |
//!
//! Composers only read the log, the catalog and the timeline memo, so any
//! number of them may run concurrently over one session.
//!
//! [`CommunicationMatcher`]: crate::matcher::CommunicationMatcher

pub(crate) mod callback;
pub(crate) mod inter_process;
pub(crate) mod intra_process;
pub(crate) mod variable_passing;

use crate::catalog::EntityCatalog;
use crate::config::AnalysisConfig;
use crate::event::{EventLog, Handle};
use crate::timeline::{CallbackTimelineIndex, Invocation};
use std::sync::Arc;

/// Read-only view of a session handed to every composer
#[derive(Clone, Copy)]
pub(crate) struct ComposeContext<'a> {
    pub log: &'a EventLog,
    pub catalog: &'a EntityCatalog,
    pub timelines: &'a CallbackTimelineIndex,
    pub config: &'a AnalysisConfig,
}

impl ComposeContext<'_> {
    pub fn invocations(&self, callback: Handle) -> Arc<[Invocation]> {
        self.timelines.invocations(self.log, callback)
    }
}

/// Attach each dispatch event to the next invocation starting after it
///
/// `dispatches` are `(timestamp, identity)` pairs in time order. When several
/// dispatches precede one invocation, the latest wins; the earlier ones were
/// taken by invocations lost from the capture.
pub(crate) fn attach_dispatches<'a>(
    invocations: impl IntoIterator<Item = &'a Invocation>,
    dispatches: &[(u64, u64)],
) -> Vec<(u64, Option<u64>)> {
    let mut next = 0;
    invocations
        .into_iter()
        .map(|invocation| {
            let mut pending = None;
            while let Some(&(ts, identity)) = dispatches.get(next) {
                if ts > invocation.start {
                    break;
                }
                pending = Some(identity);
                next += 1;
            }
            (invocation.start, pending)
        })
        .collect()
}
