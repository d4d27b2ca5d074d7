//! Per-symbol, per-interval replay queues.

use std::collections::{BTreeMap, VecDeque};

use cadence_types::{Bar, Interval};
use chrono::{DateTime, Utc};

/// A bar drained from its queue, with the queue it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Drained {
    /// Owning symbol.
    pub symbol: String,
    /// Interval of the queue.
    pub interval: Interval,
    /// The bar.
    pub bar: Bar,
}

/// FIFO queues of bars not yet applied to the session.
///
/// Each queue is consumed strictly in order. The merged stream is produced
/// by repeatedly draining every queue whose head holds the earliest
/// timestamp.
#[derive(Debug, Default)]
pub struct ReplayQueues {
    queues: BTreeMap<(String, Interval), VecDeque<Bar>>,
}

impl ReplayQueues {
    /// Creates an empty set of queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a backlog, sorted by timestamp, behind anything already queued.
    ///
    /// Returns the number of bars enqueued.
    pub fn push_backlog(&mut self, symbol: &str, interval: Interval, mut bars: Vec<Bar>) -> usize {
        bars.sort_by_key(|bar| bar.timestamp);
        let queue = self.queues.entry((symbol.to_string(), interval)).or_default();
        let tail = queue.back().map(|bar| bar.timestamp);
        let before = queue.len();
        queue.extend(
            bars.into_iter()
                .filter(|bar| tail.is_none_or(|tail| bar.timestamp > tail)),
        );
        queue.len() - before
    }

    /// Enqueues a single live bar.
    ///
    /// Returns false if the bar does not come after the queue's tail.
    pub fn push(&mut self, symbol: &str, interval: Interval, bar: Bar) -> bool {
        self.push_backlog(symbol, interval, vec![bar]) == 1
    }

    /// Returns the earliest head timestamp across non-empty queues.
    #[must_use]
    pub fn min_head(&self) -> Option<DateTime<Utc>> {
        self.queues
            .values()
            .filter_map(|queue| queue.front())
            .map(|bar| bar.timestamp)
            .min()
    }

    /// Pops the head of every queue whose head is at `timestamp`.
    pub fn drain_at(&mut self, timestamp: DateTime<Utc>) -> Vec<Drained> {
        let mut drained = Vec::new();
        for ((symbol, interval), queue) in &mut self.queues {
            while queue.front().is_some_and(|bar| bar.timestamp == timestamp) {
                if let Some(bar) = queue.pop_front() {
                    drained.push(Drained {
                        symbol: symbol.clone(),
                        interval: *interval,
                        bar,
                    });
                }
            }
        }
        drained
    }

    /// Drops every queue of `symbol`, returning the number of bars discarded.
    pub fn remove_symbol(&mut self, symbol: &str) -> usize {
        let mut discarded = 0;
        self.queues.retain(|(owner, _), queue| {
            if owner == symbol {
                discarded += queue.len();
                false
            } else {
                true
            }
        });
        discarded
    }

    /// Returns true if `symbol` owns any queue.
    #[must_use]
    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.queues.keys().any(|(owner, _)| owner == symbol)
    }

    /// Returns the number of bars waiting across all queues.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    /// Returns the number of queues, empty ones included.
    #[must_use]
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Returns true if no bar is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queues.values().all(VecDeque::is_empty)
    }

    /// Drops every queue.
    pub fn clear(&mut self) {
        self.queues.clear();
    }
}
