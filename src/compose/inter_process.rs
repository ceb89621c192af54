//! Process-to-process delivery
//!
//! A publish walks down the middleware stack, and every layer reports the
//! message address it handles:
//!
//! ```text
//! rclcpp_publish(pub, msg) -> rcl_publish(pub, msg) -> dds_write(msg)
//!     -> dds_bind_addr_to_stamp(msg, source_stamp)
//! ```
//!
//! Chains are keyed by the open message address and closed when the source
//! stamp is bound, or when any other publisher reuses the address. A layer missing from the capture leaves its timestamp
//! empty. On the subscriber side the take (`dispatch_subscription_callback`)
//! carries the same source stamp and precedes the callback start.

use super::{attach_dispatches, ComposeContext};
use crate::catalog::{CallbackAttr, Publisher, SubscriptionCallback};
use crate::event::{EventLog, EventPayload, Handle};
use crate::filter::Filter;
use crate::matcher::{ChannelEvent, CommunicationMatcher};
use crate::records::{remove_dropped, InterProcessRecord};
use fnv::{FnvHashMap, FnvHashSet};
use tracing::debug;

/// Producer side of one published message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PublishChain {
    pub publisher_handle: Handle,
    pub rclcpp_publish: Option<u64>,
    pub rcl_publish: Option<u64>,
    pub dds_write: Option<u64>,
    pub source_stamp: Option<u64>,
}

impl ChannelEvent for PublishChain {
    fn timestamp(&self) -> u64 {
        self.rclcpp_publish
            .or(self.rcl_publish)
            .or(self.dds_write)
            .unwrap_or_default()
    }

    fn identity(&self) -> Option<u64> {
        self.source_stamp
    }

    fn lane(&self) -> u64 {
        self.publisher_handle
    }
}

/// Consumer side: a callback start and the source stamp of its take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Delivery {
    pub callback_start: u64,
    pub source_stamp: Option<u64>,
}

impl ChannelEvent for Delivery {
    fn timestamp(&self) -> u64 {
        self.callback_start
    }

    fn identity(&self) -> Option<u64> {
        self.source_stamp
    }
}

/// Assemble publish chains of the given publishers, in time order
pub(crate) fn publish_chains(log: &EventLog, publishers: &FnvHashSet<Handle>) -> Vec<PublishChain> {
    let mut chains: Vec<PublishChain> = Vec::new();
    let mut open: FnvHashMap<Handle, usize> = FnvHashMap::default();

    for event in log {
        match event.payload {
            EventPayload::RclcppPublish {
                publisher_handle,
                message,
            } if publishers.contains(&publisher_handle) => {
                open.insert(message, chains.len());
                chains.push(PublishChain {
                    publisher_handle,
                    rclcpp_publish: Some(event.timestamp),
                    ..PublishChain::default()
                });
            }
            EventPayload::RclPublish {
                publisher_handle,
                message,
            } if publishers.contains(&publisher_handle) => {
                let continues = open.get(&message).is_some_and(|&idx| {
                    let chain = &chains[idx];
                    chain.publisher_handle == publisher_handle && chain.rcl_publish.is_none()
                });
                if continues {
                    chains[open[&message]].rcl_publish = Some(event.timestamp);
                } else {
                    // The application-level publish was not captured
                    open.insert(message, chains.len());
                    chains.push(PublishChain {
                        publisher_handle,
                        rcl_publish: Some(event.timestamp),
                        ..PublishChain::default()
                    });
                }
            }
            // Another publisher took over the buffer; its layers are not ours
            EventPayload::RclcppPublish { message, .. } | EventPayload::RclPublish { message, .. } => {
                open.remove(&message);
            }
            EventPayload::DdsWrite { message } => {
                if let Some(&idx) = open.get(&message) {
                    let chain = &mut chains[idx];
                    if chain.dds_write.is_none() {
                        chain.dds_write = Some(event.timestamp);
                    }
                }
            }
            EventPayload::DdsBindAddrToStamp { addr, source_stamp } => {
                if let Some(idx) = open.remove(&addr) {
                    chains[idx].source_stamp = Some(source_stamp);
                }
            }
            _ => {}
        }
    }

    chains
}

/// Non-intra invocations of `callback` with the stamp of their take
pub(crate) fn deliveries(ctx: ComposeContext<'_>, callback: Handle) -> Vec<Delivery> {
    let dispatches: Vec<(u64, u64)> = ctx
        .log
        .iter()
        .filter_map(|event| match event.payload {
            EventPayload::DispatchSubscriptionCallback {
                callback: handle,
                source_stamp,
                ..
            } if handle == callback => Some((event.timestamp, source_stamp)),
            _ => None,
        })
        .collect();

    let invocations = ctx.invocations(callback);
    attach_dispatches(
        invocations.iter().filter(|inv| !inv.is_intra_process),
        &dispatches,
    )
    .into_iter()
    .map(|(callback_start, source_stamp)| Delivery {
        callback_start,
        source_stamp,
    })
    .collect()
}

pub(crate) fn compose(
    ctx: ComposeContext<'_>,
    subscription: &SubscriptionCallback,
    publisher: Option<&Publisher>,
    drop_incomplete: bool,
) -> Vec<InterProcessRecord> {
    let key = subscription.callback_key();
    let Some(callback) = ctx.catalog.resolve_callback(subscription) else {
        debug!(callback = %key, "subscription not in catalog");
        return Vec::new();
    };

    let topic = subscription.topic_name.as_str();
    let publishers: FnvHashSet<Handle> = ctx
        .catalog
        .get_publishers(Filter::Any, Filter::Only(topic))
        .into_iter()
        .filter(|p| match publisher {
            Some(only) => only.publisher_handle == p.publisher_handle,
            None => true,
        })
        .map(|p| p.publisher_handle)
        .collect();
    if let Some(only) = publisher {
        if only.topic_name != topic || publishers.is_empty() {
            debug!(
                callback = %key,
                topic,
                publisher = format!("{:#x}", only.publisher_handle),
                "publisher is not on the subscription's topic"
            );
            return Vec::new();
        }
    }

    let chains = publish_chains(ctx.log, &publishers);
    let takes = deliveries(ctx, callback);
    let matcher = CommunicationMatcher::new(ctx.config.inter_process_matching.strategy());

    let records: Vec<InterProcessRecord> = matcher
        .correlate(&chains, &takes)
        .into_iter()
        .map(|m| match m.producer {
            Some(chain) => InterProcessRecord::new(
                chain.rclcpp_publish,
                chain.rcl_publish,
                chain.dds_write,
                m.consumer.callback_start,
                m.consumer.source_stamp.or(chain.source_stamp),
            ),
            None => InterProcessRecord::new(
                None,
                None,
                None,
                m.consumer.callback_start,
                m.consumer.source_stamp,
            ),
        })
        .collect();

    debug!(
        callback = %key,
        topic,
        publishers = publishers.len(),
        publishes = chains.len(),
        records = records.len(),
        "inter-process records composed"
    );

    if drop_incomplete {
        remove_dropped(records)
    } else {
        records
    }
}
