//! Entity catalog built from definition events
//!
//! The catalog is built once per trace by scanning the definition events
//! (node, publisher, subscription and timer creation) and following their
//! handle back-references:
//!
//! ```text
//! rcl_node_init ◄── rcl_publisher_init
//!               ◄── rcl_subscription_init ◄── rclcpp_subscription_init
//!                                              ◄── rclcpp_subscription_callback_added
//!               ◄── rclcpp_timer_link_node ──► rcl_timer_init
//!                                              ◄── rclcpp_timer_callback_added
//! rclcpp_callback_register (symbol per callback)
//! ```
//!
//! Handles are only meaningful inside one trace. The catalog maps them to
//! logical keys (node name, callback kind, per-node ordinal) so that query
//! and composition results are deterministic. A handle defined twice with
//! conflicting metadata makes the whole catalog untrustworthy and is fatal;
//! dangling back-references are logged and the entity is skipped.

mod entities;

pub use entities::{
    CallbackAttr, CallbackKey, CallbackKind, Node, Publisher, SubscriptionCallback, TimerCallback,
};

use crate::error::{Result, TraceError};
use crate::event::{EventLog, EventPayload, Handle};
use crate::filter::Filter;
use fnv::FnvHashMap;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use tracing::{debug, info, warn};

/// Handle-keyed definitions, remembering first-definition order
#[derive(Debug)]
struct Definitions<V> {
    what: &'static str,
    entries: FnvHashMap<Handle, V>,
    order: Vec<Handle>,
}

impl<V: PartialEq + Debug> Definitions<V> {
    fn new(what: &'static str) -> Self {
        Self {
            what,
            entries: FnvHashMap::default(),
            order: Vec::new(),
        }
    }

    /// Identical redefinitions are tolerated, conflicting ones are not
    fn define(&mut self, handle: Handle, value: V) -> Result<()> {
        match self.entries.get(&handle) {
            Some(existing) if *existing != value => Err(TraceError::AmbiguousIdentity {
                handle,
                first: format!("{} {:?}", self.what, existing),
                second: format!("{} {:?}", self.what, value),
            }),
            Some(_) => {
                debug!(handle = format!("{:#x}", handle), what = self.what, "duplicate definition");
                Ok(())
            }
            None => {
                self.entries.insert(handle, value);
                self.order.push(handle);
                Ok(())
            }
        }
    }

    fn get(&self, handle: Handle) -> Option<&V> {
        self.entries.get(&handle)
    }

    fn ordered(&self) -> impl Iterator<Item = (Handle, &V)> {
        self.order
            .iter()
            .filter_map(move |handle| self.entries.get(handle).map(|v| (*handle, v)))
    }
}

#[derive(Debug, PartialEq)]
struct NodeDef {
    name: String,
    pid: u32,
}

#[derive(Debug, PartialEq)]
struct TopicEndpointDef {
    node_handle: Handle,
    topic_name: String,
    queue_depth: u64,
}

/// All definition events of one trace, before back-references are resolved
struct DefinitionTables {
    nodes: Definitions<NodeDef>,
    publishers: Definitions<TopicEndpointDef>,
    subscriptions: Definitions<TopicEndpointDef>,
    /// rclcpp subscription object -> rcl subscription handle
    rclcpp_subscriptions: Definitions<Handle>,
    /// callback -> rclcpp subscription object
    subscription_callbacks: Definitions<Handle>,
    timer_periods: Definitions<u64>,
    /// callback -> timer handle
    timer_callbacks: Definitions<Handle>,
    /// timer handle -> node handle
    timer_nodes: Definitions<Handle>,
    symbols: Definitions<String>,
}

impl DefinitionTables {
    fn scan(log: &EventLog) -> Result<Self> {
        let mut tables = Self {
            nodes: Definitions::new("node"),
            publishers: Definitions::new("publisher"),
            subscriptions: Definitions::new("subscription"),
            rclcpp_subscriptions: Definitions::new("rclcpp subscription"),
            subscription_callbacks: Definitions::new("subscription callback"),
            timer_periods: Definitions::new("timer"),
            timer_callbacks: Definitions::new("timer callback"),
            timer_nodes: Definitions::new("timer node link"),
            symbols: Definitions::new("callback symbol"),
        };

        for event in log.iter().filter(|e| e.payload.is_definition()) {
            match &event.payload {
                EventPayload::RclNodeInit {
                    node_handle,
                    node_name,
                    namespace,
                    ..
                } => tables.nodes.define(
                    *node_handle,
                    NodeDef {
                        name: full_node_name(namespace, node_name),
                        pid: event.context.pid,
                    },
                )?,
                EventPayload::RclPublisherInit {
                    publisher_handle,
                    node_handle,
                    topic_name,
                    queue_depth,
                    ..
                } => tables.publishers.define(
                    *publisher_handle,
                    TopicEndpointDef {
                        node_handle: *node_handle,
                        topic_name: topic_name.clone(),
                        queue_depth: *queue_depth,
                    },
                )?,
                EventPayload::RclSubscriptionInit {
                    subscription_handle,
                    node_handle,
                    topic_name,
                    queue_depth,
                    ..
                } => tables.subscriptions.define(
                    *subscription_handle,
                    TopicEndpointDef {
                        node_handle: *node_handle,
                        topic_name: topic_name.clone(),
                        queue_depth: *queue_depth,
                    },
                )?,
                EventPayload::RclcppSubscriptionInit {
                    subscription_handle,
                    subscription,
                } => tables
                    .rclcpp_subscriptions
                    .define(*subscription, *subscription_handle)?,
                EventPayload::RclcppSubscriptionCallbackAdded {
                    subscription,
                    callback,
                } => tables
                    .subscription_callbacks
                    .define(*callback, *subscription)?,
                EventPayload::RclTimerInit {
                    timer_handle,
                    period,
                } => tables.timer_periods.define(*timer_handle, *period)?,
                EventPayload::RclcppTimerCallbackAdded {
                    timer_handle,
                    callback,
                } => tables.timer_callbacks.define(*callback, *timer_handle)?,
                EventPayload::RclcppTimerLinkNode {
                    timer_handle,
                    node_handle,
                } => tables.timer_nodes.define(*timer_handle, *node_handle)?,
                EventPayload::RclcppCallbackRegister { callback, symbol } => {
                    tables.symbols.define(*callback, symbol.clone())?
                }
                _ => {}
            }
        }

        // A callback handle belongs to exactly one callback kind
        if let Some((callback, subscription)) = tables
            .subscription_callbacks
            .ordered()
            .find(|(callback, _)| tables.timer_callbacks.get(*callback).is_some())
        {
            let timer = tables.timer_callbacks.get(callback).copied().unwrap_or_default();
            return Err(TraceError::AmbiguousIdentity {
                handle: callback,
                first: format!("subscription callback of {:#x}", subscription),
                second: format!("timer callback of {:#x}", timer),
            });
        }

        Ok(tables)
    }
}

fn full_node_name(namespace: &str, name: &str) -> String {
    if namespace.ends_with('/') {
        format!("{}{}", namespace, name)
    } else {
        format!("{}/{}", namespace, name)
    }
}

#[derive(Debug, Clone)]
struct ResolvedCallback {
    key: CallbackKey,
    node_handle: Handle,
    topic_name: Option<String>,
}

/// Queryable set of nodes, publishers and callbacks of one trace
#[derive(Debug, Default)]
pub struct EntityCatalog {
    nodes: Vec<Node>,
    publishers: Vec<Publisher>,
    subscriptions: Vec<SubscriptionCallback>,
    timers: Vec<TimerCallback>,
    /// Logical key -> handle, first registration wins
    callbacks: HashMap<CallbackKey, Handle>,
    resolved: FnvHashMap<Handle, ResolvedCallback>,
}

impl EntityCatalog {
    /// Build the catalog from the definition events of `log`
    ///
    /// # Errors
    /// Returns [`TraceError::AmbiguousIdentity`] when two definition events
    /// claim the same handle with different metadata.
    pub fn build(log: &EventLog) -> Result<Self> {
        let tables = DefinitionTables::scan(log)?;
        let mut catalog = Self::default();

        for (handle, def) in tables.nodes.ordered() {
            catalog.nodes.push(Node {
                name: def.name.clone(),
                handle,
                pid: def.pid,
            });
        }

        for (handle, def) in tables.publishers.ordered() {
            let Some(node) = tables.nodes.get(def.node_handle) else {
                warn!(
                    publisher = format!("{:#x}", handle),
                    topic = %def.topic_name,
                    "publisher references an unknown node; skipped"
                );
                continue;
            };
            catalog.publishers.push(Publisher {
                node_name: node.name.clone(),
                topic_name: def.topic_name.clone(),
                queue_depth: def.queue_depth,
                node_handle: def.node_handle,
                publisher_handle: handle,
            });
        }

        let mut next_index: FnvHashMap<(Handle, CallbackKind), usize> = FnvHashMap::default();

        for (callback, subscription) in tables.subscription_callbacks.ordered() {
            let resolved = tables
                .rclcpp_subscriptions
                .get(*subscription)
                .and_then(|rcl_handle| tables.subscriptions.get(*rcl_handle))
                .and_then(|def| tables.nodes.get(def.node_handle).map(|node| (def, node)));
            let Some((def, node)) = resolved else {
                warn!(
                    callback = format!("{:#x}", callback),
                    "subscription callback cannot be linked to a node; skipped"
                );
                continue;
            };

            let index = next_index
                .entry((def.node_handle, CallbackKind::Subscription))
                .or_insert(0);
            let entity = SubscriptionCallback {
                node_name: node.name.clone(),
                topic_name: def.topic_name.clone(),
                callback_index: *index,
                symbol: tables.symbols.get(callback).cloned().unwrap_or_default(),
                callback_handle: Some(callback),
            };
            *index += 1;

            catalog.register(
                callback,
                ResolvedCallback {
                    key: entity.callback_key(),
                    node_handle: def.node_handle,
                    topic_name: Some(entity.topic_name.clone()),
                },
            );
            catalog.subscriptions.push(entity);
        }

        for (callback, timer) in tables.timer_callbacks.ordered() {
            let resolved = tables.timer_periods.get(*timer).and_then(|period| {
                let node_handle = tables.timer_nodes.get(*timer)?;
                let node = tables.nodes.get(*node_handle)?;
                Some((*period, *node_handle, node))
            });
            let Some((period, node_handle, node)) = resolved else {
                warn!(
                    callback = format!("{:#x}", callback),
                    timer = format!("{:#x}", timer),
                    "timer callback cannot be linked to a node; skipped"
                );
                continue;
            };

            let index = next_index
                .entry((node_handle, CallbackKind::Timer))
                .or_insert(0);
            let entity = TimerCallback {
                node_name: node.name.clone(),
                period_ns: period,
                callback_index: *index,
                symbol: tables.symbols.get(callback).cloned().unwrap_or_default(),
                callback_handle: Some(callback),
            };
            *index += 1;

            catalog.register(
                callback,
                ResolvedCallback {
                    key: entity.callback_key(),
                    node_handle,
                    topic_name: None,
                },
            );
            catalog.timers.push(entity);
        }

        info!(
            nodes = catalog.nodes.len(),
            publishers = catalog.publishers.len(),
            subscriptions = catalog.subscriptions.len(),
            timers = catalog.timers.len(),
            "entity catalog built"
        );

        Ok(catalog)
    }

    fn register(&mut self, handle: Handle, callback: ResolvedCallback) {
        let first = *self.callbacks.entry(callback.key.clone()).or_insert(handle);
        if first != handle {
            warn!(
                callback = %callback.key,
                first = format!("{:#x}", first),
                second = format!("{:#x}", handle),
                "same-named nodes; lookups by name resolve to the first, use the catalog entity for the other"
            );
        }
        self.resolved.insert(handle, callback);
    }

    pub fn get_node_names(&self) -> BTreeSet<String> {
        self.nodes.iter().map(|node| node.name.clone()).collect()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// First node with the given name
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name == name)
    }

    pub fn node_by_handle(&self, handle: Handle) -> Option<&Node> {
        self.nodes.iter().find(|node| node.handle == handle)
    }

    /// Node owning a registered callback handle
    pub fn callback_node(&self, callback: Handle) -> Option<&Node> {
        let resolved = self.resolved.get(&callback)?;
        self.node_by_handle(resolved.node_handle)
    }

    /// Publishers in construction order
    pub fn get_publishers(&self, node_name: Filter<&str>, topic_name: Filter<&str>) -> Vec<&Publisher> {
        self.publishers
            .iter()
            .filter(|p| node_name.matches(&p.node_name.as_str()))
            .filter(|p| topic_name.matches(&p.topic_name.as_str()))
            .collect()
    }

    /// Subscription callbacks in construction order
    pub fn get_subscription_callbacks(
        &self,
        node_name: Filter<&str>,
        topic_name: Filter<&str>,
    ) -> Vec<&SubscriptionCallback> {
        self.subscriptions
            .iter()
            .filter(|s| node_name.matches(&s.node_name.as_str()))
            .filter(|s| topic_name.matches(&s.topic_name.as_str()))
            .collect()
    }

    /// Timer callbacks in construction order
    pub fn get_timer_callbacks(&self, node_name: Filter<&str>, period_ns: Filter<u64>) -> Vec<&TimerCallback> {
        self.timers
            .iter()
            .filter(|t| node_name.matches(&t.node_name.as_str()))
            .filter(|t| period_ns.matches(&t.period_ns))
            .collect()
    }

    /// Runtime handle of the callback an attribute describes
    ///
    /// An attribute taken from the catalog carries its handle and resolves to
    /// exactly that callback. Caller-built attributes resolve through the
    /// logical key. Either way the attribute must agree with the catalog on
    /// node, kind, index and (for subscriptions) topic.
    pub fn resolve_callback<A: CallbackAttr + ?Sized>(&self, attr: &A) -> Option<Handle> {
        let key = attr.callback_key();
        let handle = match attr.callback_handle() {
            Some(handle) => handle,
            None => *self.callbacks.get(&key)?,
        };
        let Some(resolved) = self.resolved.get(&handle) else {
            debug!(callback = %key, handle = format!("{:#x}", handle), "handle not in catalog");
            return None;
        };
        if resolved.key != key {
            debug!(
                callback = %key,
                cataloged = %resolved.key,
                "attribute disagrees with its handle; callback not resolved"
            );
            return None;
        }
        match (attr.topic_name(), resolved.topic_name.as_deref()) {
            (Some(wanted), Some(actual)) if wanted != actual => {
                debug!(callback = %key, wanted, actual, "topic mismatch; callback not resolved");
                None
            }
            _ => Some(handle),
        }
    }

    /// Whether any catalog callback owns this handle
    pub fn is_registered_callback(&self, handle: Handle) -> bool {
        self.resolved.contains_key(&handle)
    }
}
