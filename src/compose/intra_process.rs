//! Same-process zero-copy delivery
//!
//! The publisher enqueues a buffer address (`rclcpp_intra_publish`), the
//! executor dequeues it for the subscription
//! (`dispatch_intra_process_subscription_callback`) and runs the callback
//! with `is_intra_process` set. The buffer address is the message identity.
//!
//! When a buffer has to be copied on the way (more than one owning
//! subscriber), `message_construct` reports the copy. With address tracking
//! on, a dequeued copy is resolved back to the address that was published.

use super::{attach_dispatches, ComposeContext};
use crate::catalog::{CallbackAttr, SubscriptionCallback};
use crate::event::{EventLog, EventPayload, Handle};
use crate::filter::Filter;
use crate::matcher::{ChannelEvent, CommunicationMatcher, MatchStrategy};
use crate::records::IntraProcessRecord;
use fnv::{FnvHashMap, FnvHashSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IntraPublish {
    pub timestamp: u64,
    pub publisher_handle: Handle,
    pub message: Handle,
}

impl ChannelEvent for IntraPublish {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn identity(&self) -> Option<u64> {
        Some(self.message)
    }

    fn lane(&self) -> u64 {
        self.publisher_handle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IntraDelivery {
    pub callback_start: u64,
    pub message: Option<Handle>,
}

impl ChannelEvent for IntraDelivery {
    fn timestamp(&self) -> u64 {
        self.callback_start
    }

    fn identity(&self) -> Option<u64> {
        self.message
    }
}

/// Copies of published buffers, resolved to their published address
#[derive(Debug, Default)]
pub(crate) struct AddressAliases {
    origin: FnvHashMap<Handle, Handle>,
}

impl AddressAliases {
    pub fn resolve(&self, addr: Handle) -> Handle {
        self.origin.get(&addr).copied().unwrap_or(addr)
    }

    pub fn record_copy(&mut self, original: Handle, constructed: Handle) {
        let root = self.resolve(original);
        if root != constructed {
            self.origin.insert(constructed, root);
        }
    }

    /// A published address is its own origin from now on
    pub fn published(&mut self, addr: Handle) {
        self.origin.remove(&addr);
    }
}

/// Intra publishes of `publishers` and dequeues for `callback`, in time order
///
/// Dequeues are `(timestamp, address)` pairs, the address already resolved
/// when `track_addresses` is set.
pub(crate) fn intra_events(
    log: &EventLog,
    publishers: &FnvHashSet<Handle>,
    callback: Handle,
    track_addresses: bool,
) -> (Vec<IntraPublish>, Vec<(u64, u64)>) {
    let mut aliases = AddressAliases::default();
    let mut publishes = Vec::new();
    let mut dispatches = Vec::new();

    for event in log {
        match event.payload {
            EventPayload::RclcppIntraPublish {
                publisher_handle,
                message,
            } => {
                aliases.published(message);
                if publishers.contains(&publisher_handle) {
                    publishes.push(IntraPublish {
                        timestamp: event.timestamp,
                        publisher_handle,
                        message,
                    });
                }
            }
            EventPayload::MessageConstruct {
                original_message,
                constructed_message,
            } if track_addresses => aliases.record_copy(original_message, constructed_message),
            EventPayload::DispatchIntraProcessSubscriptionCallback {
                message,
                callback: handle,
            } if handle == callback => {
                let addr = if track_addresses {
                    aliases.resolve(message)
                } else {
                    message
                };
                dispatches.push((event.timestamp, addr));
            }
            _ => {}
        }
    }

    (publishes, dispatches)
}

pub(crate) fn compose(ctx: ComposeContext<'_>, subscription: &SubscriptionCallback) -> Vec<IntraProcessRecord> {
    let key = subscription.callback_key();
    let Some(callback) = ctx.catalog.resolve_callback(subscription) else {
        debug!(callback = %key, "subscription not in catalog");
        return Vec::new();
    };
    let Some(pid) = ctx.catalog.callback_node(callback).map(|n| n.pid) else {
        return Vec::new();
    };

    let topic = subscription.topic_name.as_str();
    let publishers: FnvHashSet<Handle> = ctx
        .catalog
        .get_publishers(Filter::Any, Filter::Only(topic))
        .into_iter()
        .filter(|p| ctx.catalog.node_by_handle(p.node_handle).is_some_and(|n| n.pid == pid))
        .map(|p| p.publisher_handle)
        .collect();
    if publishers.is_empty() {
        debug!(callback = %key, topic, pid, "no publisher shares the subscriber's process");
        return Vec::new();
    }

    let (publishes, dispatches) = intra_events(ctx.log, &publishers, callback, ctx.config.address_tracking);
    let invocations = ctx.invocations(callback);
    let takes: Vec<IntraDelivery> = attach_dispatches(
        invocations.iter().filter(|inv| inv.is_intra_process),
        &dispatches,
    )
    .into_iter()
    .map(|(callback_start, message)| IntraDelivery {
        callback_start,
        message,
    })
    .collect();

    let records: Vec<IntraProcessRecord> = CommunicationMatcher::new(MatchStrategy::Identity)
        .correlate(&publishes, &takes)
        .into_iter()
        .map(|m| {
            IntraProcessRecord::new(
                m.producer.map(|p| p.timestamp),
                m.consumer.callback_start,
                m.consumer.message,
            )
        })
        .collect();

    debug!(
        callback = %key,
        topic,
        publishes = publishes.len(),
        records = records.len(),
        "intra-process records composed"
    );

    records
}
