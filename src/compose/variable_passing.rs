//! State hand-off between two callbacks of one node
//!
//! A reader takes whatever the writer stored last. Each read is paired with
//! the latest write that ended before it started, provided no earlier read
//! already took that write. Writes superseded before any read happened were
//! overwritten and produce no record.

use super::ComposeContext;
use crate::catalog::CallbackAttr;
use crate::matcher::{ChannelEvent, CommunicationMatcher, MatchStrategy};
use crate::records::{remove_dropped, VariablePassingRecord};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
struct WriteEnd(u64);

impl ChannelEvent for WriteEnd {
    fn timestamp(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
struct ReadStart(u64);

impl ChannelEvent for ReadStart {
    fn timestamp(&self) -> u64 {
        self.0
    }
}

pub(crate) fn compose<W, R>(
    ctx: ComposeContext<'_>,
    write: &W,
    read: &R,
    drop_incomplete: bool,
) -> Vec<VariablePassingRecord>
where
    W: CallbackAttr + ?Sized,
    R: CallbackAttr + ?Sized,
{
    let write_key = write.callback_key();
    let read_key = read.callback_key();
    if write_key.node_name != read_key.node_name {
        warn!(
            write = %write_key,
            read = %read_key,
            "variable passing needs both callbacks on one node"
        );
        return Vec::new();
    }

    let (Some(write_handle), Some(read_handle)) = (
        ctx.catalog.resolve_callback(write),
        ctx.catalog.resolve_callback(read),
    ) else {
        debug!(write = %write_key, read = %read_key, "callback not in catalog");
        return Vec::new();
    };

    let writes: Vec<WriteEnd> = ctx
        .invocations(write_handle)
        .iter()
        .map(|inv| WriteEnd(inv.end))
        .collect();
    let reads: Vec<ReadStart> = ctx
        .invocations(read_handle)
        .iter()
        .map(|inv| ReadStart(inv.start))
        .collect();

    let records: Vec<VariablePassingRecord> = CommunicationMatcher::new(MatchStrategy::LatestBefore)
        .correlate(&writes, &reads)
        .into_iter()
        .map(|m| VariablePassingRecord {
            write_callback_end_timestamp: m.producer.map(|w| w.0),
            read_callback_start_timestamp: m.consumer.0,
        })
        .collect();

    debug!(
        write = %write_key,
        read = %read_key,
        writes = writes.len(),
        records = records.len(),
        "variable passing records composed"
    );

    if drop_incomplete {
        remove_dropped(records)
    } else {
        records
    }
}
