//! Decoded trace events and the time-ordered event log
//!
//! The log is the only input of the analysis. It is produced by an external
//! decoder (the on-disk capture format is not handled here) and handed over as
//! an ordered sequence of typed events. Two already-decoded dump formats are
//! accepted for convenience:
//!
//! - JSON lines: one [`TraceEvent`] object per line (`#` comments allowed)
//! - MessagePack: a single array of [`TraceEvent`] maps
//!
//! # Event vocabulary
//!
//! ```text
//! definitions   rcl_node_init, rcl_publisher_init, rcl_subscription_init,
//!               rclcpp_subscription_init, rclcpp_subscription_callback_added,
//!               rcl_timer_init, rclcpp_timer_callback_added,
//!               rclcpp_timer_link_node, rclcpp_callback_register
//! execution     callback_start, callback_end
//! inter-process rclcpp_publish -> rcl_publish -> dds_write -> dds_bind_addr_to_stamp
//!               dispatch_subscription_callback
//! intra-process rclcpp_intra_publish, dispatch_intra_process_subscription_callback,
//!               message_construct
//! ```

use crate::error::{Result, TraceError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Runtime handle (an address in the traced process)
pub type Handle = u64;

/// Process/thread context attached to every event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EventContext {
    pub pid: u32,
    pub tid: u32,
}

/// A single decoded trace event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Nanoseconds since the capture clock origin
    pub timestamp: u64,

    #[serde(default)]
    pub context: EventContext,

    pub payload: EventPayload,
}

impl TraceEvent {
    pub fn new(timestamp: u64, context: EventContext, payload: EventPayload) -> Self {
        Self {
            timestamp,
            context,
            payload,
        }
    }
}

/// Kind-specific event arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    RclNodeInit {
        node_handle: Handle,
        rmw_handle: Handle,
        node_name: String,
        namespace: String,
    },
    RclPublisherInit {
        publisher_handle: Handle,
        node_handle: Handle,
        rmw_publisher_handle: Handle,
        topic_name: String,
        queue_depth: u64,
    },
    RclSubscriptionInit {
        subscription_handle: Handle,
        node_handle: Handle,
        rmw_subscription_handle: Handle,
        topic_name: String,
        queue_depth: u64,
    },
    /// Links the rclcpp subscription object to its rcl handle
    RclcppSubscriptionInit {
        subscription_handle: Handle,
        subscription: Handle,
    },
    RclcppSubscriptionCallbackAdded {
        subscription: Handle,
        callback: Handle,
    },
    RclTimerInit {
        timer_handle: Handle,
        period: u64,
    },
    RclcppTimerCallbackAdded {
        timer_handle: Handle,
        callback: Handle,
    },
    RclcppTimerLinkNode {
        timer_handle: Handle,
        node_handle: Handle,
    },
    RclcppCallbackRegister {
        callback: Handle,
        symbol: String,
    },
    CallbackStart {
        callback: Handle,
        is_intra_process: bool,
    },
    CallbackEnd {
        callback: Handle,
    },
    RclcppPublish {
        publisher_handle: Handle,
        message: Handle,
    },
    RclPublish {
        publisher_handle: Handle,
        message: Handle,
    },
    DdsWrite {
        message: Handle,
    },
    DdsBindAddrToStamp {
        addr: Handle,
        source_stamp: u64,
    },
    DispatchSubscriptionCallback {
        message: Handle,
        callback: Handle,
        source_stamp: u64,
        message_timestamp: u64,
    },
    RclcppIntraPublish {
        publisher_handle: Handle,
        message: Handle,
    },
    DispatchIntraProcessSubscriptionCallback {
        message: Handle,
        callback: Handle,
    },
    /// A message buffer copied into a new buffer
    MessageConstruct {
        original_message: Handle,
        constructed_message: Handle,
    },
}

impl EventPayload {
    /// Whether this event defines an entity rather than recording execution
    pub fn is_definition(&self) -> bool {
        matches!(
            self,
            EventPayload::RclNodeInit { .. }
                | EventPayload::RclPublisherInit { .. }
                | EventPayload::RclSubscriptionInit { .. }
                | EventPayload::RclcppSubscriptionInit { .. }
                | EventPayload::RclcppSubscriptionCallbackAdded { .. }
                | EventPayload::RclTimerInit { .. }
                | EventPayload::RclcppTimerCallbackAdded { .. }
                | EventPayload::RclcppTimerLinkNode { .. }
                | EventPayload::RclcppCallbackRegister { .. }
        )
    }
}

/// Immutable, timestamp-ordered sequence of trace events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<TraceEvent>,
}

impl EventLog {
    /// Build a log from decoded events
    ///
    /// Events are expected in timestamp order. Out-of-order input is stably
    /// sorted, so events sharing a timestamp keep their decoder order.
    pub fn new(mut events: Vec<TraceEvent>) -> Self {
        let ordered = events
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp);
        if !ordered {
            debug!(
                events = events.len(),
                "decoder delivered events out of timestamp order; sorting"
            );
            events.sort_by_key(|event| event.timestamp);
        }
        Self { events }
    }

    /// Load a JSON-lines dump
    pub fn from_json_lines<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse_json_lines(&content)
    }

    /// Parse JSON-lines content. Blank lines and `#` comments are skipped.
    pub fn parse_json_lines(content: &str) -> Result<Self> {
        let mut events = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let event: TraceEvent =
                serde_json::from_str(line).map_err(|e| TraceError::Decode {
                    index: line_no + 1,
                    message: e.to_string(),
                })?;
            events.push(event);
        }
        Ok(Self::new(events))
    }

    /// Load a MessagePack dump (an array of events encoded as maps)
    pub fn from_msgpack<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        let events: Vec<TraceEvent> =
            rmp_serde::from_slice(&bytes).map_err(|e| TraceError::Decode {
                index: 0,
                message: e.to_string(),
            })?;
        Ok(Self::new(events))
    }

    /// Load a dump, choosing the decoder from the file extension
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("msgpack") | Some("mpk") => Self::from_msgpack(path),
            _ => Self::from_json_lines(path),
        }
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TraceEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// First and last timestamps, if the log has events
    pub fn time_range(&self) -> Option<(u64, u64)> {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }
}

impl FromIterator<TraceEvent> for EventLog {
    fn from_iter<I: IntoIterator<Item = TraceEvent>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a TraceEvent;
    type IntoIter = std::slice::Iter<'a, TraceEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn start(ts: u64, callback: Handle) -> TraceEvent {
        TraceEvent::new(
            ts,
            EventContext { pid: 1, tid: 1 },
            EventPayload::CallbackStart {
                callback,
                is_intra_process: false,
            },
        )
    }

    #[test]
    fn test_new_keeps_ordered_input() {
        let log = EventLog::new(vec![start(1, 10), start(2, 11), start(3, 12)]);
        let stamps: Vec<u64> = log.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![1, 2, 3]);
    }

    #[test]
    fn test_new_sorts_stably() {
        let log = EventLog::new(vec![start(5, 1), start(2, 2), start(5, 3), start(1, 4)]);
        let order: Vec<u64> = log
            .iter()
            .map(|e| match e.payload {
                EventPayload::CallbackStart { callback, .. } => callback,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(order, vec![4, 2, 1, 3]);
    }

    #[test]
    fn test_time_range() {
        assert_eq!(EventLog::default().time_range(), None);
        let log = EventLog::new(vec![start(7, 1), start(42, 1)]);
        assert_eq!(log.time_range(), Some((7, 42)));
    }

    #[test]
    fn test_parse_json_lines() {
        let content = r#"
# talker node
{"timestamp": 10, "context": {"pid": 100, "tid": 100}, "payload": {"kind": "rcl_node_init", "node_handle": 1, "rmw_handle": 2, "node_name": "talker", "namespace": "/"}}

{"timestamp": 20, "payload": {"kind": "callback_end", "callback": 9}}
"#;
        let log = EventLog::parse_json_lines(content).unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.events()[0].payload.is_definition());
        assert_eq!(log.events()[1].context, EventContext::default());
        assert_eq!(
            log.events()[1].payload,
            EventPayload::CallbackEnd { callback: 9 }
        );
    }

    #[test]
    fn test_parse_json_lines_reports_line() {
        let content = "{\"timestamp\": 1, \"payload\": {\"kind\": \"callback_end\", \"callback\": 1}}\nnot json\n";
        let err = EventLog::parse_json_lines(content).unwrap_err();
        match err {
            TraceError::Decode { index, .. } => assert_eq!(index, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let content = r#"{"timestamp": 1, "payload": {"kind": "sched_switch"}}"#;
        assert!(EventLog::parse_json_lines(content).is_err());
    }

    #[test]
    fn test_open_json_lines_file() {
        let mut file = tempfile::Builder::new().suffix(".jsonl").tempfile().unwrap();
        let event = start(3, 77);
        writeln!(file, "{}", serde_json::to_string(&event).unwrap()).unwrap();
        let log = EventLog::open(file.path()).unwrap();
        assert_eq!(log.events(), &[event]);
    }

    #[test]
    fn test_open_msgpack_file() {
        let events = vec![
            start(1, 5),
            TraceEvent::new(
                2,
                EventContext { pid: 3, tid: 4 },
                EventPayload::DdsBindAddrToStamp {
                    addr: 0xbeef,
                    source_stamp: 99,
                },
            ),
        ];
        let file = tempfile::Builder::new()
            .suffix(".msgpack")
            .tempfile()
            .unwrap();
        fs::write(file.path(), rmp_serde::to_vec_named(&events).unwrap()).unwrap();
        let log = EventLog::open(file.path()).unwrap();
        assert_eq!(log.events(), events.as_slice());
    }

    #[test]
    fn test_open_missing_file_is_io_error() {
        let err = EventLog::open("/nonexistent/trace.jsonl").unwrap_err();
        assert!(matches!(err, TraceError::Io(_)));
    }
}
