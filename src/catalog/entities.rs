use crate::event::Handle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A node, identified by its fully qualified name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub handle: Handle,
    /// Process the node was created in
    pub pid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Publisher {
    pub node_name: String,
    pub topic_name: String,
    pub queue_depth: u64,
    pub node_handle: Handle,
    pub publisher_handle: Handle,
}

/// Kind of executor callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackKind {
    Subscription,
    Timer,
}

impl CallbackKind {
    fn prefix(self) -> &'static str {
        match self {
            CallbackKind::Subscription => "subscription_callback",
            CallbackKind::Timer => "timer_callback",
        }
    }
}

/// Stable logical identity of a callback: node name, kind and per-node ordinal
///
/// Runtime handles differ between runs; these keys do not, which keeps
/// composition results comparable across traces of the same application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallbackKey {
    pub node_name: String,
    pub kind: CallbackKind,
    pub index: usize,
}

impl CallbackKey {
    pub fn new(node_name: impl Into<String>, kind: CallbackKind, index: usize) -> Self {
        Self {
            node_name: node_name.into(),
            kind,
            index,
        }
    }

    /// Parse a display name such as `subscription_callback_1`
    pub fn parse(node_name: &str, callback_name: &str) -> Option<Self> {
        [CallbackKind::Subscription, CallbackKind::Timer]
            .into_iter()
            .find_map(|kind| {
                let index = callback_name
                    .strip_prefix(kind.prefix())?
                    .strip_prefix('_')?
                    .parse()
                    .ok()?;
                Some(Self::new(node_name, kind, index))
            })
    }

    /// Display name, e.g. `timer_callback_0`
    pub fn callback_name(&self) -> String {
        format!("{}_{}", self.kind.prefix(), self.index)
    }
}

impl fmt::Display for CallbackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node_name, self.callback_name())
    }
}

/// Anything that identifies a callback to compose records for
pub trait CallbackAttr {
    fn callback_key(&self) -> CallbackKey;

    /// Subscribed topic, checked against the catalog when present
    fn topic_name(&self) -> Option<&str> {
        None
    }

    /// Runtime handle, known for entities handed out by the catalog
    fn callback_handle(&self) -> Option<Handle> {
        None
    }
}

impl CallbackAttr for CallbackKey {
    fn callback_key(&self) -> CallbackKey {
        self.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionCallback {
    pub node_name: String,
    pub topic_name: String,
    pub callback_index: usize,
    /// Demangled callback symbol, for display only
    pub symbol: String,
    /// Runtime handle; `None` for attributes built by the caller
    pub callback_handle: Option<Handle>,
}

impl SubscriptionCallback {
    /// Describe a subscription callback without knowing its runtime handle
    pub fn new(
        node_name: impl Into<String>,
        callback_index: usize,
        symbol: impl Into<String>,
        topic_name: impl Into<String>,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            topic_name: topic_name.into(),
            callback_index,
            symbol: symbol.into(),
            callback_handle: None,
        }
    }

    pub fn callback_name(&self) -> String {
        self.callback_key().callback_name()
    }
}

impl CallbackAttr for SubscriptionCallback {
    fn callback_key(&self) -> CallbackKey {
        CallbackKey::new(
            self.node_name.clone(),
            CallbackKind::Subscription,
            self.callback_index,
        )
    }

    fn topic_name(&self) -> Option<&str> {
        Some(&self.topic_name)
    }

    fn callback_handle(&self) -> Option<Handle> {
        self.callback_handle
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerCallback {
    pub node_name: String,
    pub period_ns: u64,
    pub callback_index: usize,
    pub symbol: String,
    pub callback_handle: Option<Handle>,
}

impl TimerCallback {
    pub fn new(
        node_name: impl Into<String>,
        callback_index: usize,
        symbol: impl Into<String>,
        period_ns: u64,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            period_ns,
            callback_index,
            symbol: symbol.into(),
            callback_handle: None,
        }
    }

    pub fn callback_name(&self) -> String {
        self.callback_key().callback_name()
    }
}

impl CallbackAttr for TimerCallback {
    fn callback_key(&self) -> CallbackKey {
        CallbackKey::new(self.node_name.clone(), CallbackKind::Timer, self.callback_index)
    }

    fn callback_handle(&self) -> Option<Handle> {
        self.callback_handle
    }
}
