//! Ordered producer/consumer correlation for one channel
//!
//! The matcher pairs consumer events (callback starts) with producer events
//! (publishes, buffer enqueues, callback ends) of a single channel. Producers
//! are partitioned into lanes (one per publisher) and every lane keeps its own
//! cursor, so interleaved publishers on a topic never cross-pair and a
//! producer is consumed at most once.
//!
//! ```text
//! lane 0x10:  P0 ─── P1 ─── P2 ────────── P3
//!                     │             │
//! consumers:     C0 ──┘  C1(none)   C2 ── C3 ...
//! ```
//!
//! Consumers without an eligible producer come back with `producer: None`
//! (an incomplete record). Producers never matched produce nothing; they are
//! only visible in the debug counts.

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use tracing::debug;

/// An event on one side of a channel
pub trait ChannelEvent {
    fn timestamp(&self) -> u64;

    /// Message identity used for exact matching (stamp, address)
    fn identity(&self) -> Option<u64> {
        None
    }

    /// Producer lane the event belongs to
    fn lane(&self) -> u64 {
        0
    }
}

/// How a consumer picks its producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Earliest unconsumed producer with the consumer's identity
    Identity,
    /// Earliest unconsumed producer at most `tolerance_ns` before the consumer
    Proximity { tolerance_ns: u64 },
    /// Identity when the consumer carries one, proximity otherwise
    IdentityOrProximity { tolerance_ns: u64 },
    /// Most recent producer strictly before the consumer, if still unconsumed
    LatestBefore,
}

/// Outcome for one consumer event
#[derive(Debug)]
pub struct Matched<'a, P, C> {
    pub producer: Option<&'a P>,
    pub consumer: &'a C,
}

impl<P, C> Matched<'_, P, C> {
    pub fn is_complete(&self) -> bool {
        self.producer.is_some()
    }
}

struct Lane<'a, P> {
    events: Vec<&'a P>,
    cursor: usize,
}

impl<'a, P: ChannelEvent> Lane<'a, P> {
    fn candidate(&self, strategy: MatchStrategy, consumer: &impl ChannelEvent) -> Option<usize> {
        let ts = consumer.timestamp();
        let pending = &self.events[self.cursor..];

        let first_from_cursor = |pred: &dyn Fn(&P) -> bool| {
            pending
                .iter()
                .take_while(|p| p.timestamp() <= ts)
                .position(|p| pred(*p))
                .map(|offset| self.cursor + offset)
        };

        match strategy {
            MatchStrategy::Identity => {
                let id = consumer.identity()?;
                first_from_cursor(&|p: &P| p.identity() == Some(id))
            }
            MatchStrategy::Proximity { tolerance_ns } => {
                first_from_cursor(&|p: &P| ts - p.timestamp() <= tolerance_ns)
            }
            MatchStrategy::IdentityOrProximity { tolerance_ns } => match consumer.identity() {
                Some(id) => first_from_cursor(&|p: &P| p.identity() == Some(id)),
                None => first_from_cursor(&|p: &P| ts - p.timestamp() <= tolerance_ns),
            },
            MatchStrategy::LatestBefore => {
                let before = self.events.partition_point(|p| p.timestamp() < ts);
                // The latest write already went to an earlier read
                (before > self.cursor).then(|| before - 1)
            }
        }
    }
}

/// Generic channel correlator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommunicationMatcher {
    strategy: MatchStrategy,
}

impl CommunicationMatcher {
    pub fn new(strategy: MatchStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    /// Pair every consumer with at most one producer
    ///
    /// Both sequences are expected in timestamp order. Output has one entry
    /// per consumer, in consumer order.
    pub fn correlate<'a, P, C>(&self, producers: &'a [P], consumers: &'a [C]) -> Vec<Matched<'a, P, C>>
    where
        P: ChannelEvent,
        C: ChannelEvent,
    {
        let mut lanes: Vec<Lane<'a, P>> = Vec::new();
        let mut lane_of: FnvHashMap<u64, usize> = FnvHashMap::default();
        for producer in producers {
            let slot = *lane_of.entry(producer.lane()).or_insert_with(|| {
                lanes.push(Lane {
                    events: Vec::new(),
                    cursor: 0,
                });
                lanes.len() - 1
            });
            lanes[slot].events.push(producer);
        }
        for lane in &mut lanes {
            lane.events.sort_by_key(|p| p.timestamp());
        }

        let mut matched = Vec::with_capacity(consumers.len());
        let mut complete = 0usize;

        for consumer in consumers {
            let candidates = lanes.iter().enumerate().filter_map(|(slot, lane)| {
                lane.candidate(self.strategy, consumer)
                    .map(|index| (slot, index, lane.events[index].timestamp()))
            });
            // Ties go to the lane seen first
            let best = match self.strategy {
                MatchStrategy::LatestBefore => {
                    candidates.max_by_key(|&(slot, _, ts)| (ts, Reverse(slot)))
                }
                _ => candidates.min_by_key(|&(slot, _, ts)| (ts, slot)),
            };

            let producer = best.map(|(slot, index, _)| {
                let lane = &mut lanes[slot];
                lane.cursor = index + 1;
                lane.events[index]
            });
            if producer.is_some() {
                complete += 1;
            }
            matched.push(Matched { producer, consumer });
        }

        debug!(
            strategy = ?self.strategy,
            lanes = lanes.len(),
            consumers = consumers.len(),
            matched = complete,
            unmatched = consumers.len() - complete,
            undelivered = producers.len() - complete,
            "channel correlated"
        );

        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Ev {
        ts: u64,
        id: Option<u64>,
        lane: u64,
    }

    impl ChannelEvent for Ev {
        fn timestamp(&self) -> u64 {
            self.ts
        }
        fn identity(&self) -> Option<u64> {
            self.id
        }
        fn lane(&self) -> u64 {
            self.lane
        }
    }

    fn ev(ts: u64, id: u64) -> Ev {
        Ev {
            ts,
            id: Some(id),
            lane: 0,
        }
    }

    fn anon(ts: u64) -> Ev {
        Ev {
            ts,
            id: None,
            lane: 0,
        }
    }

    fn producer_stamps(matched: &[Matched<'_, Ev, Ev>]) -> Vec<Option<u64>> {
        matched.iter().map(|m| m.producer.map(|p| p.ts)).collect()
    }

    #[test]
    fn test_identity_pairs_fifo() {
        let producers = [ev(10, 1), ev(20, 2), ev(30, 3)];
        let consumers = [ev(15, 1), ev(25, 2), ev(35, 3)];
        let matched = CommunicationMatcher::new(MatchStrategy::Identity).correlate(&producers, &consumers);
        assert_eq!(producer_stamps(&matched), vec![Some(10), Some(20), Some(30)]);
    }

    #[test]
    fn test_identity_skips_undelivered_producers() {
        let producers = [ev(10, 1), ev(20, 2), ev(30, 3)];
        let consumers = [ev(35, 3)];
        let matched = CommunicationMatcher::new(MatchStrategy::Identity).correlate(&producers, &consumers);
        assert_eq!(producer_stamps(&matched), vec![Some(30)]);
    }

    #[test]
    fn test_identity_unknown_consumer_is_incomplete() {
        let producers = [ev(10, 1)];
        let consumers = [ev(15, 9), anon(16), ev(17, 1)];
        let matched = CommunicationMatcher::new(MatchStrategy::Identity).correlate(&producers, &consumers);
        assert_eq!(producer_stamps(&matched), vec![None, None, Some(10)]);
        assert!(!matched[0].is_complete());
    }

    #[test]
    fn test_producer_after_consumer_never_matches() {
        let producers = [ev(50, 1)];
        let consumers = [ev(40, 1)];
        let matched = CommunicationMatcher::new(MatchStrategy::Identity).correlate(&producers, &consumers);
        assert_eq!(producer_stamps(&matched), vec![None]);
    }

    #[test]
    fn test_producer_is_consumed_once() {
        let producers = [ev(10, 1)];
        let consumers = [ev(15, 1), ev(16, 1)];
        let matched = CommunicationMatcher::new(MatchStrategy::Identity).correlate(&producers, &consumers);
        assert_eq!(producer_stamps(&matched), vec![Some(10), None]);
    }

    #[test]
    fn test_lanes_do_not_cross_pair() {
        let producers = [
            Ev { ts: 10, id: None, lane: 1 },
            Ev { ts: 12, id: None, lane: 2 },
            Ev { ts: 20, id: None, lane: 1 },
        ];
        let consumers = [anon(14), anon(15), anon(25)];
        let matched = CommunicationMatcher::new(MatchStrategy::Proximity { tolerance_ns: 100 })
            .correlate(&producers, &consumers);
        let lanes: Vec<Option<u64>> = matched.iter().map(|m| m.producer.map(|p| p.lane)).collect();
        assert_eq!(lanes, vec![Some(1), Some(2), Some(1)]);
        assert_eq!(producer_stamps(&matched), vec![Some(10), Some(12), Some(20)]);
    }

    #[test]
    fn test_proximity_tolerance() {
        let producers = [anon(100), anon(200)];
        let consumers = [anon(150), anon(400)];
        let matched = CommunicationMatcher::new(MatchStrategy::Proximity { tolerance_ns: 60 })
            .correlate(&producers, &consumers);
        assert_eq!(producer_stamps(&matched), vec![Some(100), None]);
    }

    #[test]
    fn test_identity_or_proximity_falls_back() {
        let producers = [ev(100, 1), ev(200, 2)];
        let consumers = [ev(150, 1), anon(210)];
        let matched = CommunicationMatcher::new(MatchStrategy::IdentityOrProximity { tolerance_ns: 20 })
            .correlate(&producers, &consumers);
        assert_eq!(producer_stamps(&matched), vec![Some(100), Some(200)]);
    }

    #[test]
    fn test_latest_before_consumes_once() {
        let writes = [anon(10), anon(20), anon(40)];
        let reads = [anon(30), anon(35), anon(50)];
        let matched = CommunicationMatcher::new(MatchStrategy::LatestBefore).correlate(&writes, &reads);
        // Write at 10 is overwritten by 20; the read at 35 finds no fresh write
        assert_eq!(producer_stamps(&matched), vec![Some(20), None, Some(40)]);
    }

    #[test]
    fn test_latest_before_is_strict() {
        let writes = [anon(10)];
        let reads = [anon(10), anon(11)];
        let matched = CommunicationMatcher::new(MatchStrategy::LatestBefore).correlate(&writes, &reads);
        assert_eq!(producer_stamps(&matched), vec![None, Some(10)]);
    }

    #[test]
    fn test_empty_inputs() {
        let none: [Ev; 0] = [];
        let matcher = CommunicationMatcher::new(MatchStrategy::Identity);
        assert!(matcher.correlate(&[ev(1, 1)], &none).is_empty());
        let reads = [ev(1, 1)];
        let matched = matcher.correlate(&none, &reads);
        assert_eq!(producer_stamps(&matched), vec![None]);
    }
}
