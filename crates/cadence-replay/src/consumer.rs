//! Consumer threads and the synchronous hand-off protocol.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cadence_session::SessionStore;
use cadence_types::Interval;
use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{ConsumerConfig, CoordinatorStats, ReplayError};

/// Kind of data a notification announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// New bars in a series.
    Bars,
    /// A new quote.
    Quote,
    /// Quality or gap metadata changed.
    Quality,
}

/// Announcement that a symbol's data changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Drain batch sequence number.
    pub seq: u64,
    /// Symbol whose data changed.
    pub symbol: String,
    /// Interval affected.
    pub interval: Interval,
    /// What changed.
    pub data_type: DataType,
    /// Timestamp of the data.
    pub timestamp: DateTime<Utc>,
}

/// The notifications a consumer receives.
///
/// An unset filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interest {
    data_types: Option<BTreeSet<DataType>>,
    symbols: Option<BTreeSet<String>>,
}

impl Interest {
    /// Matches every notification.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to the given data types.
    #[must_use]
    pub fn data_types(mut self, data_types: impl IntoIterator<Item = DataType>) -> Self {
        self.data_types = Some(data_types.into_iter().collect());
        self
    }

    /// Restricts to the given symbols.
    #[must_use]
    pub fn symbols<S: Into<String>>(mut self, symbols: impl IntoIterator<Item = S>) -> Self {
        self.symbols = Some(symbols.into_iter().map(Into::into).collect());
        self
    }

    /// Returns true if `notification` passes every filter.
    #[must_use]
    pub fn matches(&self, notification: &Notification) -> bool {
        self.data_types
            .as_ref()
            .is_none_or(|types| types.contains(&notification.data_type))
            && self
                .symbols
                .as_ref()
                .is_none_or(|symbols| symbols.contains(&notification.symbol))
    }
}

/// A downstream consumer running on its own thread.
///
/// Consumers read through the [`SessionStore`] API and keep their own state.
/// Only notifications matching the consumer's [`Interest`] are posted to it,
/// and only batches with at least one such notification wait on its ready
/// signal, which is sent once the batch has been handled.
pub trait Consumer: Send + 'static {
    /// Name used in logs and overrun counters.
    fn name(&self) -> &str;

    /// Notifications to receive. Read once, when the consumer is registered.
    fn interest(&self) -> Interest {
        Interest::all()
    }

    /// Handles one notification.
    fn on_notification(&mut self, notification: &Notification, store: &SessionStore);

    /// Called once before the thread exits.
    fn on_shutdown(&mut self) {}
}

enum Message {
    Batch {
        seq: u64,
        notifications: Vec<Notification>,
    },
    Stop,
}

#[derive(Debug, Default)]
struct ConsumerState {
    ready_seq: u64,
    done: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<ConsumerState>,
    changed: Condvar,
}

impl Shared {
    fn signal_ready(&self, seq: u64) {
        let mut state = self.state.lock();
        state.ready_seq = state.ready_seq.max(seq);
        self.changed.notify_all();
    }

    fn mark_done(&self) {
        self.state.lock().done = true;
        self.changed.notify_all();
    }

    /// Waits until `seq` is acknowledged or the consumer exits.
    fn wait_ready(&self, seq: u64, deadline: Instant) -> bool {
        let mut state = self.state.lock();
        while state.ready_seq < seq && !state.done {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.ready_seq >= seq
    }

    fn wait_done(&self, deadline: Instant) -> bool {
        let mut state = self.state.lock();
        while !state.done {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.done
    }
}

struct Slot {
    name: String,
    interest: Interest,
    sender: SyncSender<Message>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    last_posted: u64,
    consecutive_overruns: u32,
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("name", &self.name)
            .field("interest", &self.interest)
            .field("consecutive_overruns", &self.consecutive_overruns)
            .finish_non_exhaustive()
    }
}

/// The registered consumers and their notification queues.
#[derive(Debug)]
pub struct ConsumerPool {
    slots: Vec<Slot>,
    store: Arc<SessionStore>,
    config: ConsumerConfig,
}

impl ConsumerPool {
    /// Creates an empty pool.
    #[must_use]
    pub const fn new(store: Arc<SessionStore>, config: ConsumerConfig) -> Self {
        Self {
            slots: Vec::new(),
            store,
            config,
        }
    }

    /// Starts `consumer` on its own thread.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Spawn`] if the thread cannot be started.
    pub fn register(&mut self, mut consumer: Box<dyn Consumer>) -> Result<(), ReplayError> {
        let name = consumer.name().to_string();
        let interest = consumer.interest();
        let (sender, receiver) = mpsc::sync_channel(self.config.queue_capacity.max(1));
        let shared = Arc::new(Shared::default());
        let store = Arc::clone(&self.store);
        let thread_shared = Arc::clone(&shared);

        let handle = thread::Builder::new()
            .name(format!("consumer-{name}"))
            .spawn(move || run_consumer(consumer.as_mut(), &receiver, &store, &thread_shared))?;

        debug!(consumer = %name, ?interest, "Started consumer");
        self.slots.push(Slot {
            name,
            interest,
            sender,
            shared,
            handle: Some(handle),
            last_posted: 0,
            consecutive_overruns: 0,
        });
        Ok(())
    }

    /// Returns the number of consumers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no consumer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Posts the matching part of a drain batch to each interested consumer
    /// and waits for their ready signals.
    ///
    /// Consumers with nothing to see in the batch are skipped. A full queue
    /// counts as backpressure: the pool waits for the consumer's previous
    /// batch and retries once. A batch that still cannot be posted, or whose
    /// ready signal misses the timeout, counts as an overrun.
    pub fn dispatch(
        &mut self,
        seq: u64,
        notifications: Vec<Notification>,
        stats: &mut CoordinatorStats,
    ) {
        if self.slots.is_empty() || notifications.is_empty() {
            return;
        }
        let timeout = self.config.ready_timeout();
        let escalate_after = self.config.escalate_after.max(1);

        let mut posted = Vec::with_capacity(self.slots.len());
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let wanted: Vec<Notification> = notifications
                .iter()
                .filter(|notification| slot.interest.matches(notification))
                .cloned()
                .collect();
            if wanted.is_empty() {
                continue;
            }
            let message = Message::Batch {
                seq,
                notifications: wanted,
            };
            match slot.sender.try_send(message) {
                Ok(()) => {
                    slot.last_posted = seq;
                    posted.push(index);
                }
                Err(TrySendError::Full(message)) => {
                    stats.backpressure_events += 1;
                    warn!(consumer = %slot.name, seq, "Consumer queue full");
                    slot.shared
                        .wait_ready(slot.last_posted, Instant::now() + timeout);
                    if slot.sender.try_send(message).is_ok() {
                        slot.last_posted = seq;
                        posted.push(index);
                    } else {
                        overrun(slot, seq, escalate_after, stats);
                    }
                }
                Err(TrySendError::Disconnected(_)) => overrun(slot, seq, escalate_after, stats),
            }
        }

        let deadline = Instant::now() + timeout;
        for index in posted {
            let slot = &mut self.slots[index];
            if slot.shared.wait_ready(seq, deadline) {
                slot.consecutive_overruns = 0;
            } else {
                overrun(slot, seq, escalate_after, stats);
            }
        }
    }

    /// Stops every consumer after it handles the batches already queued,
    /// then joins the threads.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::ShutdownTimeout`] naming the consumers that did
    /// not exit within `timeout`.
    pub fn shutdown(&mut self, timeout: Duration) -> Result<(), ReplayError> {
        let deadline = Instant::now() + timeout;
        let mut stuck = Vec::new();

        for slot in &mut self.slots {
            let mut message = Message::Stop;
            loop {
                match slot.sender.try_send(message) {
                    Ok(()) | Err(TrySendError::Disconnected(_)) => break,
                    Err(TrySendError::Full(returned)) => {
                        if Instant::now() >= deadline {
                            break;
                        }
                        message = returned;
                        let ready = slot.shared.state.lock().ready_seq;
                        slot.shared.wait_ready(ready + 1, deadline);
                    }
                }
            }
        }

        for slot in &mut self.slots {
            if slot.shared.wait_done(deadline) {
                if let Some(handle) = slot.handle.take() {
                    if handle.join().is_err() {
                        warn!(consumer = %slot.name, "Consumer thread panicked");
                    }
                }
            } else {
                stuck.push(slot.name.clone());
            }
        }
        self.slots.retain(|slot| slot.handle.is_some());

        if stuck.is_empty() {
            Ok(())
        } else {
            Err(ReplayError::ShutdownTimeout {
                consumer: stuck.join(", "),
            })
        }
    }
}

fn overrun(slot: &mut Slot, seq: u64, escalate_after: u32, stats: &mut CoordinatorStats) {
    slot.consecutive_overruns += 1;
    *stats.overruns.entry(slot.name.clone()).or_default() += 1;
    if slot.consecutive_overruns % escalate_after == 0 {
        warn!(
            consumer = %slot.name,
            seq,
            consecutive = slot.consecutive_overruns,
            "Consumer keeps missing its ready deadline"
        );
    } else {
        debug!(consumer = %slot.name, seq, "Consumer overrun");
    }
}

fn run_consumer(
    consumer: &mut dyn Consumer,
    receiver: &Receiver<Message>,
    store: &SessionStore,
    shared: &Shared,
) {
    for message in receiver {
        match message {
            Message::Batch { seq, notifications } => {
                for notification in &notifications {
                    consumer.on_notification(notification, store);
                }
                shared.signal_ready(seq);
            }
            Message::Stop => break,
        }
    }
    consumer.on_shutdown();
    shared.mark_done();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct Recorder {
        seen: Arc<Mutex<Vec<Notification>>>,
        delay: Duration,
    }

    impl Consumer for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn interest(&self) -> Interest {
            Interest::all().data_types([DataType::Bars])
        }

        fn on_notification(&mut self, notification: &Notification, _store: &SessionStore) {
            thread::sleep(self.delay);
            self.seen.lock().push(notification.clone());
        }
    }

    fn notification(seq: u64, data_type: DataType) -> Notification {
        Notification {
            seq,
            symbol: "AAPL".to_string(),
            interval: Interval::ONE_MINUTE,
            data_type,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap(),
        }
    }

    fn pool(ready_timeout_ms: u64) -> ConsumerPool {
        ConsumerPool::new(
            Arc::new(SessionStore::new()),
            ConsumerConfig {
                queue_capacity: 1,
                ready_timeout_ms,
                escalate_after: 2,
                shutdown_timeout_ms: 1_000,
            },
        )
    }

    #[test]
    fn test_dispatch_waits_for_ready() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut pool = pool(1_000);
        pool.register(Box::new(Recorder {
            seen: Arc::clone(&seen),
            delay: Duration::ZERO,
        }))
        .unwrap();

        let mut stats = CoordinatorStats::default();
        let batch = vec![notification(1, DataType::Bars), notification(1, DataType::Quote)];
        pool.dispatch(1, batch, &mut stats);
        pool.dispatch(2, vec![notification(2, DataType::Bars)], &mut stats);

        // Both batches were handled before dispatch returned
        let seqs: Vec<u64> = seen.lock().iter().map(|n| n.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert!(stats.overruns.is_empty());

        pool.shutdown(Duration::from_secs(1)).unwrap();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_slow_consumer_overruns() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut pool = pool(10);
        pool.register(Box::new(Recorder {
            seen: Arc::clone(&seen),
            delay: Duration::from_millis(200),
        }))
        .unwrap();

        let mut stats = CoordinatorStats::default();
        pool.dispatch(1, vec![notification(1, DataType::Bars)], &mut stats);
        assert_eq!(stats.overruns.get("recorder"), Some(&1));

        // Queued batches are still handled before the thread exits
        pool.shutdown(Duration::from_secs(5)).unwrap();
        assert_eq!(seen.lock().len(), 1);
    }

    struct QuoteWatcher {
        seen: Arc<Mutex<Vec<Notification>>>,
    }

    impl Consumer for QuoteWatcher {
        fn name(&self) -> &str {
            "quotes"
        }

        fn interest(&self) -> Interest {
            Interest::all().data_types([DataType::Quote]).symbols(["AAPL"])
        }

        fn on_notification(&mut self, notification: &Notification, _store: &SessionStore) {
            thread::sleep(Duration::from_millis(200));
            self.seen.lock().push(notification.clone());
        }
    }

    #[test]
    fn test_uninterested_consumer_is_skipped() {
        let bars_seen = Arc::new(Mutex::new(Vec::new()));
        let quotes_seen = Arc::new(Mutex::new(Vec::new()));
        let mut pool = pool(50);
        pool.register(Box::new(Recorder {
            seen: Arc::clone(&bars_seen),
            delay: Duration::ZERO,
        }))
        .unwrap();
        pool.register(Box::new(QuoteWatcher {
            seen: Arc::clone(&quotes_seen),
        }))
        .unwrap();

        // The quote consumer misses its deadline while handling seq 1
        let mut stats = CoordinatorStats::default();
        pool.dispatch(1, vec![notification(1, DataType::Quote)], &mut stats);
        assert_eq!(stats.overruns.get("quotes"), Some(&1));

        // Bar-only batches neither reach nor wait on the busy quote consumer
        for seq in 2..=4 {
            pool.dispatch(seq, vec![notification(seq, DataType::Bars)], &mut stats);
        }
        assert_eq!(stats.overruns.get("quotes"), Some(&1));
        assert_eq!(stats.overruns.get("recorder"), None);
        assert_eq!(stats.backpressure_events, 0);
        assert_eq!(bars_seen.lock().len(), 3);

        pool.shutdown(Duration::from_secs(2)).unwrap();
        let quotes: Vec<u64> = quotes_seen.lock().iter().map(|n| n.seq).collect();
        assert_eq!(quotes, vec![1]);
    }

    #[test]
    fn test_interest_filters() {
        let quote = notification(1, DataType::Quote);
        let mut other = notification(1, DataType::Quote);
        other.symbol = "MSFT".to_string();

        assert!(Interest::all().matches(&quote));
        let interest = Interest::all().data_types([DataType::Quote]).symbols(["AAPL"]);
        assert!(interest.matches(&quote));
        assert!(!interest.matches(&other));
        assert!(!interest.matches(&notification(1, DataType::Quality)));
    }
}
