// Synthetic trace builder and fixture traces shared by the integration tests
//
// Every builder call appends events with a strictly increasing clock, so the
// resulting log is already in timestamp order.

#![allow(dead_code)]

use rclflow::event::{EventContext, EventLog, EventPayload, Handle, TraceEvent};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

pub const TICK_NS: u64 = 1_000;

#[derive(Debug, Default)]
pub struct TraceBuilder {
    events: Vec<TraceEvent>,
    clock: u64,
    next_handle: Handle,
    node_pids: HashMap<Handle, u32>,
    callback_pids: HashMap<Handle, u32>,
    publisher_pids: HashMap<Handle, u32>,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self {
            next_handle: 0x1000,
            ..Self::default()
        }
    }

    fn handle(&mut self) -> Handle {
        self.next_handle += 0x10;
        self.next_handle
    }

    fn push(&mut self, pid: u32, payload: EventPayload) -> u64 {
        self.clock += TICK_NS;
        self.events.push(TraceEvent::new(
            self.clock,
            EventContext { pid, tid: pid },
            payload,
        ));
        self.clock
    }

    /// Let time pass without events
    pub fn idle(&mut self, ns: u64) {
        self.clock += ns;
    }

    pub fn now(&self) -> u64 {
        self.clock
    }

    /// Node from its full name, e.g. `/talker` or `/ns/talker`
    pub fn node(&mut self, full_name: &str, pid: u32) -> Handle {
        let (namespace, name) = match full_name.rsplit_once('/') {
            Some(("", name)) => ("/", name),
            Some((namespace, name)) => (namespace, name),
            None => ("/", full_name),
        };
        let node_handle = self.handle();
        let rmw_handle = self.handle();
        self.node_pids.insert(node_handle, pid);
        self.push(
            pid,
            EventPayload::RclNodeInit {
                node_handle,
                rmw_handle,
                node_name: name.to_string(),
                namespace: namespace.to_string(),
            },
        );
        node_handle
    }

    fn pid_of(&self, node: Handle) -> u32 {
        self.node_pids.get(&node).copied().unwrap_or_default()
    }

    pub fn publisher(&mut self, node: Handle, topic: &str) -> Handle {
        let publisher_handle = self.handle();
        let rmw_publisher_handle = self.handle();
        let pid = self.pid_of(node);
        self.publisher_pids.insert(publisher_handle, pid);
        self.push(
            pid,
            EventPayload::RclPublisherInit {
                publisher_handle,
                node_handle: node,
                rmw_publisher_handle,
                topic_name: topic.to_string(),
                queue_depth: 10,
            },
        );
        publisher_handle
    }

    /// Subscription with its callback; returns the callback handle
    pub fn subscription(&mut self, node: Handle, topic: &str) -> Handle {
        let subscription_handle = self.handle();
        let rmw_subscription_handle = self.handle();
        let subscription = self.handle();
        let callback = self.handle();
        let pid = self.pid_of(node);
        self.callback_pids.insert(callback, pid);
        self.push(
            pid,
            EventPayload::RclSubscriptionInit {
                subscription_handle,
                node_handle: node,
                rmw_subscription_handle,
                topic_name: topic.to_string(),
                queue_depth: 10,
            },
        );
        self.push(
            pid,
            EventPayload::RclcppSubscriptionInit {
                subscription_handle,
                subscription,
            },
        );
        self.push(
            pid,
            EventPayload::RclcppSubscriptionCallbackAdded {
                subscription,
                callback,
            },
        );
        self.push(
            pid,
            EventPayload::RclcppCallbackRegister {
                callback,
                symbol: format!("void (*)(std::shared_ptr<msg>) {}", topic),
            },
        );
        callback
    }

    /// Timer with its callback; returns the callback handle
    pub fn timer(&mut self, node: Handle, period_ns: u64) -> Handle {
        let timer_handle = self.handle();
        let callback = self.handle();
        let pid = self.pid_of(node);
        self.callback_pids.insert(callback, pid);
        self.push(
            pid,
            EventPayload::RclTimerInit {
                timer_handle,
                period: period_ns,
            },
        );
        self.push(
            pid,
            EventPayload::RclcppTimerCallbackAdded {
                timer_handle,
                callback,
            },
        );
        self.push(
            pid,
            EventPayload::RclcppTimerLinkNode {
                timer_handle,
                node_handle: node,
            },
        );
        self.push(
            pid,
            EventPayload::RclcppCallbackRegister {
                callback,
                symbol: "void (*)()".to_string(),
            },
        );
        callback
    }

    pub fn start(&mut self, callback: Handle, is_intra_process: bool) -> u64 {
        let pid = self.callback_pids.get(&callback).copied().unwrap_or_default();
        self.push(
            pid,
            EventPayload::CallbackStart {
                callback,
                is_intra_process,
            },
        )
    }

    pub fn end(&mut self, callback: Handle) -> u64 {
        let pid = self.callback_pids.get(&callback).copied().unwrap_or_default();
        self.push(pid, EventPayload::CallbackEnd { callback })
    }

    /// A complete invocation with nothing inside
    pub fn run(&mut self, callback: Handle) -> (u64, u64) {
        let start = self.start(callback, false);
        let end = self.end(callback);
        (start, end)
    }

    /// Full publish chain; returns the rclcpp_publish timestamp
    pub fn publish(&mut self, publisher: Handle, message: Handle, source_stamp: u64) -> u64 {
        let pid = self.publisher_pids.get(&publisher).copied().unwrap_or_default();
        let first = self.push(
            pid,
            EventPayload::RclcppPublish {
                publisher_handle: publisher,
                message,
            },
        );
        self.push(
            pid,
            EventPayload::RclPublish {
                publisher_handle: publisher,
                message,
            },
        );
        self.push(pid, EventPayload::DdsWrite { message });
        self.push(
            pid,
            EventPayload::DdsBindAddrToStamp {
                addr: message,
                source_stamp,
            },
        );
        first
    }

    /// Publish chain whose rcl layer was lost from the capture
    pub fn publish_without_rcl(&mut self, publisher: Handle, message: Handle, source_stamp: u64) -> u64 {
        let pid = self.publisher_pids.get(&publisher).copied().unwrap_or_default();
        let first = self.push(
            pid,
            EventPayload::RclcppPublish {
                publisher_handle: publisher,
                message,
            },
        );
        self.push(pid, EventPayload::DdsWrite { message });
        self.push(
            pid,
            EventPayload::DdsBindAddrToStamp {
                addr: message,
                source_stamp,
            },
        );
        first
    }

    /// Take of an inter-process message by the subscription's executor
    pub fn dispatch(&mut self, callback: Handle, message: Handle, source_stamp: u64) {
        let pid = self.callback_pids.get(&callback).copied().unwrap_or_default();
        self.push(
            pid,
            EventPayload::DispatchSubscriptionCallback {
                message,
                callback,
                source_stamp,
                message_timestamp: source_stamp,
            },
        );
    }

    /// Take plus invocation; returns the callback start timestamp
    pub fn deliver(&mut self, callback: Handle, message: Handle, source_stamp: u64) -> u64 {
        self.dispatch(callback, message, source_stamp);
        let start = self.start(callback, false);
        self.end(callback);
        start
    }

    pub fn intra_publish(&mut self, publisher: Handle, message: Handle) -> u64 {
        let pid = self.publisher_pids.get(&publisher).copied().unwrap_or_default();
        self.push(
            pid,
            EventPayload::RclcppIntraPublish {
                publisher_handle: publisher,
                message,
            },
        )
    }

    pub fn intra_dispatch(&mut self, callback: Handle, message: Handle) {
        let pid = self.callback_pids.get(&callback).copied().unwrap_or_default();
        self.push(
            pid,
            EventPayload::DispatchIntraProcessSubscriptionCallback { message, callback },
        );
    }

    pub fn message_construct(&mut self, original_message: Handle, constructed_message: Handle) {
        self.push(
            0,
            EventPayload::MessageConstruct {
                original_message,
                constructed_message,
            },
        );
    }

    pub fn build(self) -> EventLog {
        EventLog::new(self.events)
    }
}

/// Write a log as a JSON-lines dump
pub fn write_json_lines(log: &EventLog, path: &Path) {
    let mut file = std::fs::File::create(path).expect("create trace dump");
    for event in log {
        writeln!(file, "{}", serde_json::to_string(event).expect("encode event")).expect("write event");
    }
}

/// /talker publishes three messages on /chatter to /listener in another process
pub fn talker_listener() -> EventLog {
    let mut b = TraceBuilder::new();

    let talker = b.node("/talker", 100);
    b.publisher(talker, "/parameter_events");
    b.publisher(talker, "/rosout");
    let chatter = b.publisher(talker, "/chatter");
    b.subscription(talker, "/parameter_events");
    let tick = b.timer(talker, 1_000_000_000);

    let listener = b.node("/listener", 200);
    b.publisher(listener, "/parameter_events");
    b.publisher(listener, "/rosout");
    let on_chatter = b.subscription(listener, "/chatter");
    b.subscription(listener, "/parameter_events");

    for i in 0..3u64 {
        b.idle(1_000_000_000);
        let message = 0xa000 + i * 0x100;
        let stamp = 5_000 + i;
        b.start(tick, false);
        b.publish(chatter, message, stamp);
        b.end(tick);
        b.deliver(on_chatter, message, stamp);
    }

    b.build()
}

/// /pipe1 and /pipe2 pass messages to each other in one process, zero-copy
///
/// pipe1 receives on /topic1 and publishes /topic2, pipe2 the reverse. The
/// third /topic2 message is copied before pipe2 takes it.
pub fn cyclic_pipeline_intra_process() -> EventLog {
    let mut b = TraceBuilder::new();

    let pipe1 = b.node("/pipe1", 300);
    b.publisher(pipe1, "/parameter_events");
    b.publisher(pipe1, "/rosout");
    let pipe1_out = b.publisher(pipe1, "/topic2");
    let pipe1_in = b.subscription(pipe1, "/topic1");
    b.subscription(pipe1, "/parameter_events");

    let pipe2 = b.node("/pipe2", 300);
    b.publisher(pipe2, "/parameter_events");
    b.publisher(pipe2, "/rosout");
    let pipe2_out = b.publisher(pipe2, "/topic1");
    let pipe2_in = b.subscription(pipe2, "/topic2");
    b.subscription(pipe2, "/parameter_events");

    // Initial message injected into the cycle
    let mut to_pipe1: Handle = 0xb000;
    b.intra_publish(pipe2_out, to_pipe1);

    for i in 0..5u64 {
        b.intra_dispatch(pipe1_in, to_pipe1);
        b.start(pipe1_in, true);
        let to_pipe2 = 0xc000 + i * 0x100;
        b.intra_publish(pipe1_out, to_pipe2);
        b.end(pipe1_in);

        let taken = if i == 2 {
            let copy = to_pipe2 + 0x80;
            b.message_construct(to_pipe2, copy);
            copy
        } else {
            to_pipe2
        };
        b.intra_dispatch(pipe2_in, taken);
        b.start(pipe2_in, true);
        to_pipe1 = 0xb000 + (i + 1) * 0x100;
        b.intra_publish(pipe2_out, to_pipe1);
        b.end(pipe2_in);
    }

    b.build()
}

/// Callback handles of the end-to-end sample
pub struct EndToEnd {
    pub log: EventLog,
    pub filter_input: Handle,
    pub message_driven_topic2: Handle,
    pub message_driven_drive: Handle,
}

/// Six-node sensor pipeline across six processes
///
/// /filter_node on /topic1 sees 205 deliveries:
/// - even iterations up to 202: full publish chain, take with stamp (102)
/// - iterations with i % 4 == 1: publish chain without the rcl layer
/// - iterations with i % 4 == 3, and 204: take event missing
///
/// /message_driven_node writes state from /topic2 (8 deliveries, two of them
/// back to back at iteration 150) and reads it from /drive on every odd
/// iteration below 190 (95 reads, 7 of them fresh).
pub fn end_to_end_sample() -> EndToEnd {
    let mut b = TraceBuilder::new();

    let sensor = b.node("/sensor_dummy_node", 1);
    let sensor_timer = b.timer(sensor, 50_000_000);
    let topic1 = b.publisher(sensor, "/topic1");

    let filter = b.node("/filter_node", 2);
    let filter_input = b.subscription(filter, "/topic1");
    let topic2 = b.publisher(filter, "/topic2");

    let message_driven = b.node("/message_driven_node", 3);
    let message_driven_topic2 = b.subscription(message_driven, "/topic2");
    let message_driven_drive = b.subscription(message_driven, "/drive");
    let topic3 = b.publisher(message_driven, "/topic3");

    let timer_driven = b.node("/timer_driven_node", 4);
    let timer_driven_timer = b.timer(timer_driven, 100_000_000);
    let timer_driven_input = b.subscription(timer_driven, "/topic3");
    let topic4 = b.publisher(timer_driven, "/topic4");

    let actuator = b.node("/actuator_dummy_node", 5);
    let actuator_input = b.subscription(actuator, "/topic4");

    let drive = b.node("/drive_node", 6);
    let drive_timer = b.timer(drive, 200_000_000);
    let drive_topic = b.publisher(drive, "/drive");

    let mut stamp = 1_000_000u64;
    let mut next_stamp = || {
        stamp += 7;
        stamp
    };

    for i in 0..205u64 {
        b.idle(50_000_000);

        // sensor -> filter
        let message = 0x10_0000 + (i % 8) * 0x40;
        let s = next_stamp();
        b.start(sensor_timer, false);
        if i % 4 == 1 {
            b.publish_without_rcl(topic1, message, s);
        } else {
            b.publish(topic1, message, s);
        }
        if i % 50 == 0 {
            // Never delivered: queue overflow on the subscriber side
            b.publish(topic1, message + 0x8, next_stamp());
        }
        b.end(sensor_timer);

        if i % 4 == 3 || i == 204 {
            b.start(filter_input, false);
        } else {
            b.dispatch(filter_input, message, s);
            b.start(filter_input, false);
        }
        let forwarded = 0x20_0000 + (i % 8) * 0x40;
        let s2 = next_stamp();
        b.publish(topic2, forwarded, s2);
        b.end(filter_input);

        // filter -> message_driven (state write)
        if i % 30 == 0 {
            b.deliver(message_driven_topic2, forwarded, s2);
            if i == 150 {
                b.deliver(message_driven_topic2, forwarded, s2);
            }
            let s3 = next_stamp();
            b.publish(topic3, 0x30_0000, s3);
            b.deliver(timer_driven_input, 0x30_0000, s3);
        }

        // drive -> message_driven (state read)
        if i % 2 == 1 && i < 190 {
            let s4 = next_stamp();
            b.start(drive_timer, false);
            b.publish(drive_topic, 0x40_0000, s4);
            b.end(drive_timer);
            b.deliver(message_driven_drive, 0x40_0000, s4);
        }

        if i % 10 == 0 {
            let s5 = next_stamp();
            b.start(timer_driven_timer, false);
            b.publish(topic4, 0x50_0000, s5);
            b.end(timer_driven_timer);
            b.deliver(actuator_input, 0x50_0000, s5);
        }
    }

    EndToEnd {
        log: b.build(),
        filter_input,
        message_driven_topic2,
        message_driven_drive,
    }
}
