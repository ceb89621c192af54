//! Composed records
//!
//! One record per consumer-side event. Communication records carry optional
//! producer-side timestamps: a `None` is a layer of the message's journey that
//! was not observed (dropped, overwritten or lost in a capture gap). Internal
//! matching keys stay private and are never serialized.

use crate::catalog::CallbackKey;
use serde::{Deserialize, Serialize};

/// One observed callback execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackRecord {
    pub callback: CallbackKey,
    pub callback_start_timestamp: u64,
    pub callback_end_timestamp: u64,
}

impl CallbackRecord {
    pub fn columns(&self) -> Vec<(&'static str, Option<u64>)> {
        vec![
            ("callback_start_timestamp", Some(self.callback_start_timestamp)),
            ("callback_end_timestamp", Some(self.callback_end_timestamp)),
        ]
    }

    pub fn latency(&self) -> u64 {
        self.callback_end_timestamp
            .saturating_sub(self.callback_start_timestamp)
    }
}

/// Shared behaviour of the producer/consumer records
pub trait CommunicationRecord: Clone {
    /// All producer-side layers observed
    fn is_complete(&self) -> bool;

    /// Ordered `(name, value)` pairs, producer side first
    fn columns(&self) -> Vec<(&'static str, Option<u64>)>;

    /// Fill unobserved producer-side layers from a later record
    fn bind_from(&mut self, later: &Self);

    /// Producer-to-consumer latency, if the first layer was observed
    fn latency(&self) -> Option<u64> {
        let columns = self.columns();
        let first = columns.first()?.1?;
        let last = columns.last()?.1?;
        Some(last.saturating_sub(first))
    }
}

fn fill(slot: &mut Option<u64>, later: Option<u64>) {
    if slot.is_none() {
        *slot = later;
    }
}

/// One message across a process boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterProcessRecord {
    pub rclcpp_publish_timestamp: Option<u64>,
    pub rcl_publish_timestamp: Option<u64>,
    pub dds_write_timestamp: Option<u64>,
    pub callback_start_timestamp: u64,
    // Matching key: part of record identity, never serialized
    #[allow(dead_code)]
    #[serde(skip)]
    source_stamp: Option<u64>,
}

impl InterProcessRecord {
    pub(crate) fn new(
        rclcpp_publish_timestamp: Option<u64>,
        rcl_publish_timestamp: Option<u64>,
        dds_write_timestamp: Option<u64>,
        callback_start_timestamp: u64,
        source_stamp: Option<u64>,
    ) -> Self {
        Self {
            rclcpp_publish_timestamp,
            rcl_publish_timestamp,
            dds_write_timestamp,
            callback_start_timestamp,
            source_stamp,
        }
    }
}

impl CommunicationRecord for InterProcessRecord {
    fn is_complete(&self) -> bool {
        self.rclcpp_publish_timestamp.is_some()
            && self.rcl_publish_timestamp.is_some()
            && self.dds_write_timestamp.is_some()
    }

    fn columns(&self) -> Vec<(&'static str, Option<u64>)> {
        vec![
            ("rclcpp_publish_timestamp", self.rclcpp_publish_timestamp),
            ("rcl_publish_timestamp", self.rcl_publish_timestamp),
            ("dds_write_timestamp", self.dds_write_timestamp),
            ("callback_start_timestamp", Some(self.callback_start_timestamp)),
        ]
    }

    fn bind_from(&mut self, later: &Self) {
        fill(&mut self.rclcpp_publish_timestamp, later.rclcpp_publish_timestamp);
        fill(&mut self.rcl_publish_timestamp, later.rcl_publish_timestamp);
        fill(&mut self.dds_write_timestamp, later.dds_write_timestamp);
    }
}

/// One zero-copy delivery inside a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntraProcessRecord {
    pub intra_publish_timestamp: Option<u64>,
    pub callback_start_timestamp: u64,
    #[allow(dead_code)]
    #[serde(skip)]
    message_addr: Option<u64>,
}

impl IntraProcessRecord {
    pub(crate) fn new(
        intra_publish_timestamp: Option<u64>,
        callback_start_timestamp: u64,
        message_addr: Option<u64>,
    ) -> Self {
        Self {
            intra_publish_timestamp,
            callback_start_timestamp,
            message_addr,
        }
    }
}

impl CommunicationRecord for IntraProcessRecord {
    fn is_complete(&self) -> bool {
        self.intra_publish_timestamp.is_some()
    }

    fn columns(&self) -> Vec<(&'static str, Option<u64>)> {
        vec![
            ("intra_publish_timestamp", self.intra_publish_timestamp),
            ("callback_start_timestamp", Some(self.callback_start_timestamp)),
        ]
    }

    fn bind_from(&mut self, later: &Self) {
        fill(&mut self.intra_publish_timestamp, later.intra_publish_timestamp);
    }
}

/// State handed from a writer callback to a reader callback of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariablePassingRecord {
    pub write_callback_end_timestamp: Option<u64>,
    pub read_callback_start_timestamp: u64,
}

impl CommunicationRecord for VariablePassingRecord {
    fn is_complete(&self) -> bool {
        self.write_callback_end_timestamp.is_some()
    }

    fn columns(&self) -> Vec<(&'static str, Option<u64>)> {
        vec![
            ("write_callback_end_timestamp", self.write_callback_end_timestamp),
            (
                "read_callback_start_timestamp",
                Some(self.read_callback_start_timestamp),
            ),
        ]
    }

    fn bind_from(&mut self, later: &Self) {
        fill(
            &mut self.write_callback_end_timestamp,
            later.write_callback_end_timestamp,
        );
    }
}

/// Keep only records whose producer chain was fully observed
pub fn remove_dropped<R: CommunicationRecord>(records: Vec<R>) -> Vec<R> {
    records.into_iter().filter(R::is_complete).collect()
}

/// Treat a dropped message as delayed until the next delivery
///
/// Every unobserved producer layer takes the value of the next later record
/// that has it. Trailing records with nothing after them stay incomplete.
pub fn bind_drop_as_delay<R: CommunicationRecord>(records: &mut [R]) {
    for i in (0..records.len().saturating_sub(1)).rev() {
        let (head, tail) = records.split_at_mut(i + 1);
        head[i].bind_from(&tail[0]);
    }
}

/// Any composed record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    Callback(CallbackRecord),
    InterProcess(InterProcessRecord),
    IntraProcess(IntraProcessRecord),
    VariablePassing(VariablePassingRecord),
}

impl Record {
    pub fn columns(&self) -> Vec<(&'static str, Option<u64>)> {
        match self {
            Record::Callback(r) => r.columns(),
            Record::InterProcess(r) => r.columns(),
            Record::IntraProcess(r) => r.columns(),
            Record::VariablePassing(r) => r.columns(),
        }
    }

    pub fn is_complete(&self) -> bool {
        match self {
            Record::Callback(_) => true,
            Record::InterProcess(r) => r.is_complete(),
            Record::IntraProcess(r) => r.is_complete(),
            Record::VariablePassing(r) => r.is_complete(),
        }
    }
}

impl From<CallbackRecord> for Record {
    fn from(record: CallbackRecord) -> Self {
        Record::Callback(record)
    }
}

impl From<InterProcessRecord> for Record {
    fn from(record: InterProcessRecord) -> Self {
        Record::InterProcess(record)
    }
}

impl From<IntraProcessRecord> for Record {
    fn from(record: IntraProcessRecord) -> Self {
        Record::IntraProcess(record)
    }
}

impl From<VariablePassingRecord> for Record {
    fn from(record: VariablePassingRecord) -> Self {
        Record::VariablePassing(record)
    }
}
