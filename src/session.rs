//! Trace session: the query and composition surface
//!
//! A session owns one event log, the catalog built from it and the timeline
//! memo. After construction nothing but the memo is ever written, so a
//! session can be shared by reference across threads.
//!
//! # Example
//!
//! ```
//! use rclflow::event::EventLog;
//! use rclflow::filter::Filter;
//! use rclflow::session::TraceSession;
//!
//! let session = TraceSession::new(EventLog::default()).unwrap();
//! assert!(session.get_node_names().is_empty());
//! assert!(session.get_publishers(Filter::Any, Filter::Only("/chatter")).is_empty());
//! ```

use crate::catalog::{
    CallbackAttr, CallbackKey, EntityCatalog, Publisher, SubscriptionCallback, TimerCallback,
};
use crate::compose::{self, ComposeContext};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::event::{EventLog, EventPayload};
use crate::filter::Filter;
use crate::records::{CallbackRecord, InterProcessRecord, IntraProcessRecord, VariablePassingRecord};
use crate::timeline::CallbackTimelineIndex;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, warn};

pub struct TraceSession {
    log: EventLog,
    catalog: EntityCatalog,
    timelines: CallbackTimelineIndex,
    config: AnalysisConfig,
}

impl TraceSession {
    /// Build a session with the default configuration
    pub fn new(log: EventLog) -> Result<Self> {
        Self::with_config(log, AnalysisConfig::default())
    }

    /// # Errors
    /// Fails on an invalid configuration or an ambiguous catalog.
    pub fn with_config(log: EventLog, config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let catalog = EntityCatalog::build(&log)?;

        let unregistered = log
            .iter()
            .filter(|event| match event.payload {
                EventPayload::CallbackStart { callback, .. } => {
                    !catalog.is_registered_callback(callback)
                }
                _ => false,
            })
            .count();
        if unregistered > 0 {
            warn!(
                starts = unregistered,
                "callback starts for handles missing from the catalog; ignored"
            );
        }

        if let Some((first, last)) = log.time_range() {
            info!(events = log.len(), first, last, "trace session ready");
        }

        Ok(Self {
            log,
            catalog,
            timelines: CallbackTimelineIndex::new(),
            config,
        })
    }

    /// Load a decoded dump (JSON lines, or MessagePack by extension)
    pub fn open<P: AsRef<Path>>(path: P, config: AnalysisConfig) -> Result<Self> {
        Self::with_config(EventLog::open(path)?, config)
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn catalog(&self) -> &EntityCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    fn context(&self) -> ComposeContext<'_> {
        ComposeContext {
            log: &self.log,
            catalog: &self.catalog,
            timelines: &self.timelines,
            config: &self.config,
        }
    }

    pub fn get_node_names(&self) -> BTreeSet<String> {
        self.catalog.get_node_names()
    }

    pub fn get_publishers(&self, node_name: Filter<&str>, topic_name: Filter<&str>) -> Vec<&Publisher> {
        self.catalog.get_publishers(node_name, topic_name)
    }

    pub fn get_subscription_callbacks(
        &self,
        node_name: Filter<&str>,
        topic_name: Filter<&str>,
    ) -> Vec<&SubscriptionCallback> {
        self.catalog.get_subscription_callbacks(node_name, topic_name)
    }

    pub fn get_timer_callbacks(&self, node_name: Filter<&str>, period_ns: Filter<u64>) -> Vec<&TimerCallback> {
        self.catalog.get_timer_callbacks(node_name, period_ns)
    }

    /// One record per complete invocation; unknown callbacks yield nothing
    pub fn compose_callback_records<A: CallbackAttr + ?Sized>(&self, attr: &A) -> Vec<CallbackRecord> {
        compose::callback::compose(self.context(), attr)
    }

    /// Compose callback records for many callbacks on worker threads
    ///
    /// Results come back in the order of `keys`.
    pub fn compose_callback_records_batch(&self, keys: &[CallbackKey]) -> Vec<Vec<CallbackRecord>> {
        if keys.is_empty() {
            return Vec::new();
        }
        let workers = self.config.batch_threads.max(1);
        let chunk_size = keys.len().div_ceil(workers);

        let outcome = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = keys
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move |_| {
                        chunk
                            .iter()
                            .map(|key| self.compose_callback_records(key))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            let mut results = Vec::with_capacity(keys.len());
            for handle in handles {
                match handle.join() {
                    Ok(chunk) => results.extend(chunk),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            results
        });

        match outcome {
            Ok(results) => results,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Messages from publishers of the subscription's topic to its callback
    ///
    /// `publisher` narrows the channel to that one publisher; a publisher on
    /// another topic yields nothing. With `remove_dropped`, only records whose
    /// publish chain was fully observed are kept.
    pub fn compose_inter_process_communication_records(
        &self,
        subscription: &SubscriptionCallback,
        publisher: Option<&Publisher>,
        remove_dropped: bool,
    ) -> Vec<InterProcessRecord> {
        compose::inter_process::compose(self.context(), subscription, publisher, remove_dropped)
    }

    /// Zero-copy deliveries from same-process publishers; empty when there are none
    pub fn compose_intra_process_communication_records(
        &self,
        subscription: &SubscriptionCallback,
    ) -> Vec<IntraProcessRecord> {
        compose::intra_process::compose(self.context(), subscription)
    }

    pub fn compose_variable_passing_records<W, R>(
        &self,
        write: &W,
        read: &R,
        remove_dropped: bool,
    ) -> Vec<VariablePassingRecord>
    where
        W: CallbackAttr + ?Sized,
        R: CallbackAttr + ?Sized,
    {
        compose::variable_passing::compose(self.context(), write, read, remove_dropped)
    }
}
