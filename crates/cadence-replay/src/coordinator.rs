//! The replay coordinator.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use cadence_aggregate::{AggregationRequest, BarAggregator, StreamEvent, StreamingAggregator};
use cadence_calendar::{Clock, SessionBounds, TradingCalendar, WallClock};
use cadence_determine::{HistoricalLoader, QuoteSource, SessionMode, StreamDeterminer, StreamPlan};
use cadence_quality::{GapEngine, GapRecord, QualityError};
use cadence_session::{IntervalSeries, Registration, SessionError, SessionStore, SymbolSession};
use cadence_storage::BarStore;
use cadence_types::{Bar, DateRange, Interval, Quote};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    ConfigError, Consumer, ConsumerPool, CoordinatorStats, DataType, Drained, LagMonitor,
    Notification, RegistrationReport, ReplayError, ReplayQueues, SessionConfig, SessionPhase,
    SymbolConfig,
};

/// An event from a live market data feed.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// A bar of the symbol's base interval.
    Bar(Bar),
    /// A quote.
    Quote(Quote),
}

/// A non-blocking source of live events.
pub trait LiveFeed: Send {
    /// Returns the next pending event, or `None` if nothing is waiting.
    fn poll(&mut self) -> Option<LiveEvent>;
}

impl LiveFeed for Receiver<LiveEvent> {
    fn poll(&mut self) -> Option<LiveEvent> {
        self.try_recv().ok()
    }
}

/// Result of one coordinator step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Every queue head at `timestamp` was applied.
    Drained {
        /// Timestamp of the drained bars.
        timestamp: DateTime<Utc>,
        /// Number of bars drained.
        bars: usize,
    },
    /// No bar is queued.
    Idle,
    /// The coordinator is paused.
    Paused,
    /// A stop was requested.
    Stopped,
}

#[derive(Debug)]
enum Command {
    AddSymbol(SymbolConfig),
    RemoveSymbol(String),
    AutoProvision(String, Interval),
}

#[derive(Debug, Default)]
struct HandleState {
    paused: AtomicBool,
    stopping: AtomicBool,
    phase: Mutex<SessionPhase>,
    stats: Mutex<CoordinatorStats>,
}

/// Controls a running [`ReplayCoordinator`] from other threads.
///
/// Symbol changes are queued and applied by the coordinator at the start of
/// its next step.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    commands: Sender<Command>,
    state: Arc<HandleState>,
}

impl CoordinatorHandle {
    /// Requests a symbol mid-session.
    ///
    /// Returns false if the coordinator is gone.
    pub fn add_symbol(&self, request: SymbolConfig) -> bool {
        self.commands.send(Command::AddSymbol(request)).is_ok()
    }

    /// Removes a symbol and its queues.
    ///
    /// Returns false if the coordinator is gone.
    pub fn remove_symbol(&self, symbol: impl Into<String>) -> bool {
        self.commands.send(Command::RemoveSymbol(symbol.into())).is_ok()
    }

    /// Provisions a minimal single-interval symbol.
    ///
    /// Returns false if the coordinator is gone.
    pub fn auto_provision(&self, symbol: impl Into<String>, interval: Interval) -> bool {
        self.commands
            .send(Command::AutoProvision(symbol.into(), interval))
            .is_ok()
    }

    /// Pauses replay after the current step.
    pub fn pause(&self) {
        self.state.paused.store(true, Ordering::Release);
    }

    /// Resumes a paused replay.
    pub fn resume(&self) {
        self.state.paused.store(false, Ordering::Release);
    }

    /// Returns true if replay is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::Acquire)
    }

    /// Stops replay and shuts the consumers down.
    pub fn stop(&self) {
        self.state.stopping.store(true, Ordering::Release);
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        *self.state.phase.lock()
    }

    /// Returns the counters as of the last step.
    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        self.state.stats.lock().clone()
    }
}

#[derive(Debug, Clone, Copy)]
struct TradingDay {
    date: NaiveDate,
    bounds: SessionBounds,
}

#[derive(Debug)]
struct SymbolRuntime {
    plan: StreamPlan,
    aggregators: Vec<StreamingAggregator>,
    last_base: Option<DateTime<Utc>>,
    last_derived: BTreeMap<Interval, DateTime<Utc>>,
}

#[derive(Debug)]
struct SeriesUpdate {
    interval: Interval,
    bars: Vec<Bar>,
    gaps: Vec<GapRecord>,
}

impl SeriesUpdate {
    const fn new(interval: Interval) -> Self {
        Self {
            interval,
            bars: Vec::new(),
            gaps: Vec::new(),
        }
    }
}

/// Replays stored bars for every registered symbol in timestamp order.
///
/// The coordinator is the only writer to bar and gap data. Each trading day
/// runs through teardown, initialize, activate, streaming and deactivate.
/// Every step drains the queue heads holding the earliest timestamp, applies
/// them to the [`SessionStore`], feeds the derived aggregators, and hands the
/// resulting notifications to the consumers, waiting for their ready signals
/// before the next step.
pub struct ReplayCoordinator {
    config: SessionConfig,
    requests: Vec<SymbolConfig>,
    bars: Arc<dyn BarStore>,
    calendar: Arc<dyn TradingCalendar>,
    clock: Arc<dyn Clock>,
    loader: HistoricalLoader,
    engine: GapEngine,
    determiner: StreamDeterminer,
    store: Arc<SessionStore>,
    queues: ReplayQueues,
    runtimes: BTreeMap<String, SymbolRuntime>,
    pool: ConsumerPool,
    lag: LagMonitor,
    live_feed: Option<Box<dyn LiveFeed>>,
    commands: Receiver<Command>,
    sender: Sender<Command>,
    state: Arc<HandleState>,
    stats: CoordinatorStats,
    day: Option<TradingDay>,
    now: Option<DateTime<Utc>>,
    seq: u64,
    started: bool,
}

impl fmt::Debug for ReplayCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayCoordinator")
            .field("mode", &self.config.mode)
            .field("symbols", &self.runtimes.keys().collect::<Vec<_>>())
            .field("pending", &self.queues.pending())
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl ReplayCoordinator {
    /// Creates a coordinator reading bars from `bars`.
    ///
    /// The calendar comes from the configuration and the clock is the wall
    /// clock; both can be replaced before the session starts.
    #[must_use]
    pub fn new(config: SessionConfig, bars: Arc<dyn BarStore>) -> Self {
        let calendar: Arc<dyn TradingCalendar> = Arc::new(config.calendar.clone());
        let store = Arc::new(SessionStore::new());
        let (sender, commands) = mpsc::channel();
        Self {
            requests: config.symbols.clone(),
            loader: HistoricalLoader::new(Arc::clone(&bars), Arc::clone(&calendar)),
            engine: GapEngine::new(Arc::clone(&calendar)),
            determiner: StreamDeterminer::new(),
            pool: ConsumerPool::new(Arc::clone(&store), config.consumers),
            lag: LagMonitor::new(&config.lag),
            queues: ReplayQueues::new(),
            runtimes: BTreeMap::new(),
            clock: Arc::new(WallClock),
            live_feed: None,
            commands,
            sender,
            state: Arc::new(HandleState::default()),
            stats: CoordinatorStats::default(),
            day: None,
            now: None,
            seq: 0,
            started: false,
            bars,
            calendar,
            store,
            config,
        }
    }

    /// Replaces the calendar.
    #[must_use]
    pub fn with_calendar(mut self, calendar: Arc<dyn TradingCalendar>) -> Self {
        self.loader = HistoricalLoader::new(Arc::clone(&self.bars), Arc::clone(&calendar));
        self.engine = GapEngine::new(Arc::clone(&calendar));
        self.calendar = calendar;
        self
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attaches a live feed polled at every step.
    #[must_use]
    pub fn with_live_feed(mut self, feed: impl LiveFeed + 'static) -> Self {
        self.live_feed = Some(Box::new(feed));
        self
    }

    /// Registers a consumer.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Config`] once the session has started, or
    /// [`ReplayError::Spawn`] if the consumer thread cannot be started.
    pub fn add_consumer(&mut self, consumer: Box<dyn Consumer>) -> Result<(), ReplayError> {
        if self.started {
            return Err(ConfigError::Invalid(
                "consumers must be added before the session starts".to_string(),
            )
            .into());
        }
        self.pool.register(consumer)
    }

    /// Returns a handle for controlling the coordinator from other threads.
    #[must_use]
    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            commands: self.sender.clone(),
            state: Arc::clone(&self.state),
        }
    }

    /// Returns the session store.
    #[must_use]
    pub const fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the counters.
    #[must_use]
    pub const fn stats(&self) -> &CoordinatorStats {
        &self.stats
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        *self.state.phase.lock()
    }

    /// Returns the session clock as of the last drain.
    #[must_use]
    pub const fn now(&self) -> Option<DateTime<Utc>> {
        self.now
    }

    /// Replays every trading day, then stops the consumers.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a collaborator
    /// fails, or a consumer does not shut down in time.
    pub fn run(&mut self) -> Result<CoordinatorStats, ReplayError> {
        self.run_with(|_, _| {})
    }

    /// Like [`run`](Self::run), calling `on_day` after each trading day.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn run_with(
        &mut self,
        mut on_day: impl FnMut(NaiveDate, &RegistrationReport),
    ) -> Result<CoordinatorStats, ReplayError> {
        let days = self.session_days()?;
        info!(
            mode = %self.config.mode,
            days = days.len(),
            symbols = self.requests.len(),
            "Starting replay"
        );

        for date in days {
            if self.is_stopping() {
                break;
            }
            let report = self.begin_day(date)?;
            self.stream_day()?;
            self.finish_day()?;
            on_day(date, &report);
        }

        self.shutdown()?;
        Ok(self.stats.clone())
    }

    /// Returns the trading days this session replays.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the calendar fails.
    pub fn session_days(&mut self) -> Result<Vec<NaiveDate>, ReplayError> {
        self.ensure_started()?;
        match self.config.mode {
            SessionMode::Backtest => {
                let Some(range) = self.config.dates else {
                    let reason = "backtests need a date range".to_string();
                    return Err(ConfigError::Invalid(reason).into());
                };
                Ok(self.calendar.trading_days(range)?)
            }
            SessionMode::Live => {
                let today = self.calendar.trading_date(self.clock.now());
                Ok(if self.calendar.is_trading_day(today)? {
                    vec![today]
                } else {
                    Vec::new()
                })
            }
        }
    }

    /// Tears down the previous day, registers every requested symbol for
    /// `date`, builds the replay queues and activates the store.
    ///
    /// A symbol that fails to register is reported and the rest proceed.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the calendar fails.
    pub fn begin_day(&mut self, date: NaiveDate) -> Result<RegistrationReport, ReplayError> {
        self.ensure_started()?;

        self.set_phase(SessionPhase::Teardown);
        self.store.clear(Some(date));
        self.queues.clear();
        self.runtimes.clear();
        self.lag = LagMonitor::new(&self.config.lag);
        self.now = None;
        self.stats.trading_days += 1;

        self.set_phase(SessionPhase::Initialize);
        let mut report = RegistrationReport::default();
        self.day = self
            .calendar
            .session_bounds(date)?
            .map(|bounds| TradingDay { date, bounds });
        if self.day.is_some() {
            for request in self.requests.clone() {
                self.register(&request, &mut report);
            }
        } else {
            warn!(%date, "No regular session on this date");
        }
        info!(
            %date,
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            queued = self.queues.pending(),
            "Initialized trading day"
        );

        self.set_phase(SessionPhase::Activate);
        self.store.set_active(true);
        self.set_phase(SessionPhase::Streaming);
        self.publish();
        Ok(report)
    }

    /// Applies queued commands, polls the live feed, and drains the earliest
    /// queue heads.
    ///
    /// # Errors
    ///
    /// Returns an error if a calendar, aggregation, or gap computation fails.
    pub fn step(&mut self) -> Result<StepOutcome, ReplayError> {
        self.process_commands();
        if self.is_stopping() {
            return Ok(StepOutcome::Stopped);
        }
        if self.state.paused.load(Ordering::Acquire) {
            return Ok(StepOutcome::Paused);
        }

        self.seq += 1;
        let seq = self.seq;
        let mut notifications = Vec::new();
        self.poll_live(seq, &mut notifications);

        let Some(head) = self.queues.min_head() else {
            self.dispatch(seq, notifications);
            self.publish();
            return Ok(StepOutcome::Idle);
        };

        let now = self.advance_clock(head);
        let drained = self.queues.drain_at(head);
        let count = drained.len();
        for item in drained {
            self.apply_bar(item, now, seq, &mut notifications)?;
        }
        self.dispatch(seq, notifications);
        self.publish();
        Ok(StepOutcome::Drained {
            timestamp: head,
            bars: count,
        })
    }

    /// Flushes the derived aggregators, records the gaps left before the
    /// session close, and fills open gaps from smaller stored intervals.
    ///
    /// The store keeps the day's data and stays readable until the next
    /// teardown.
    ///
    /// # Errors
    ///
    /// Returns an error if an aggregation or gap computation fails.
    pub fn finish_day(&mut self) -> Result<(), ReplayError> {
        self.set_phase(SessionPhase::Deactivate);
        let Some(day) = self.day.take() else {
            return Ok(());
        };

        self.seq += 1;
        let seq = self.seq;
        let mut notifications = Vec::new();
        let symbols: Vec<String> = self.runtimes.keys().cloned().collect();
        for symbol in symbols {
            self.close_symbol(&symbol, day.bounds.close, seq, &mut notifications)?;
            self.fill_open_gaps(&symbol, seq, &mut notifications)?;
        }
        self.dispatch(seq, notifications);
        self.publish();
        info!(
            date = %day.date,
            drained = self.stats.drained_bars,
            dropped = self.stats.out_of_hours_drops,
            filled = self.stats.filled_gaps,
            "Finished trading day"
        );
        Ok(())
    }

    /// Registers a symbol mid-session, loading its history and enqueuing its
    /// backlog. Outside a session the request is kept for the next day.
    pub fn add_symbol(&mut self, request: SymbolConfig) -> RegistrationReport {
        let mut report = RegistrationReport::default();
        if self.day.is_some() {
            self.register(&request, &mut report);
            if report.all_accepted() {
                self.requests.push(request);
            }
        } else if self.requests.iter().any(|held| held.symbol == request.symbol) {
            let reason = SessionError::DuplicateSymbol(request.symbol.clone()).to_string();
            report.rejected.push((request.symbol, reason));
        } else {
            report.accepted.push(request.symbol.clone());
            self.requests.push(request);
        }
        report
    }

    /// Removes a symbol's session, queues and aggregators.
    ///
    /// Returns false if the symbol was not registered.
    pub fn remove_symbol(&mut self, symbol: &str) -> bool {
        let discarded = self.queues.remove_symbol(symbol);
        let runtime = self.runtimes.remove(symbol);
        let session = self.store.remove_symbol(symbol);
        self.requests.retain(|request| request.symbol != symbol);

        let removed = runtime.is_some() || session.is_some();
        if removed {
            info!(symbol, discarded, "Removed symbol");
        }
        removed
    }

    /// Provisions a minimal single-interval symbol with no history.
    ///
    /// Returns false if the symbol is already registered.
    pub fn auto_provision(&self, symbol: &str, interval: Interval) -> bool {
        self.store.auto_provision(symbol, interval)
    }

    /// Stops the consumers after they handle any queued notifications.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::ShutdownTimeout`] if a consumer does not exit
    /// within the configured timeout.
    pub fn shutdown(&mut self) -> Result<(), ReplayError> {
        let result = self.pool.shutdown(self.config.consumers.shutdown_timeout());
        self.set_phase(SessionPhase::Finished);
        self.publish();
        info!(
            drained = self.stats.drained_bars,
            notifications = self.stats.notifications,
            "Replay finished"
        );
        result
    }

    fn ensure_started(&mut self) -> Result<(), ReplayError> {
        if !self.started {
            self.config.validate()?;
            self.started = true;
        }
        Ok(())
    }

    fn is_stopping(&self) -> bool {
        self.state.stopping.load(Ordering::Acquire)
    }

    fn set_phase(&self, phase: SessionPhase) {
        *self.state.phase.lock() = phase;
        debug!(%phase, "Entered phase");
    }

    fn publish(&self) {
        *self.state.stats.lock() = self.stats.clone();
    }

    fn stream_day(&mut self) -> Result<(), ReplayError> {
        let poll = self.config.poll_interval();
        loop {
            match self.step()? {
                StepOutcome::Drained { .. } => {}
                StepOutcome::Stopped => return Ok(()),
                StepOutcome::Paused => thread::sleep(poll),
                StepOutcome::Idle => {
                    if self.day_complete() {
                        return Ok(());
                    }
                    thread::sleep(poll);
                }
            }
        }
    }

    fn day_complete(&self) -> bool {
        if !self.queues.is_empty() {
            return false;
        }
        match (self.config.mode, self.day) {
            (SessionMode::Live, Some(day)) => self.clock.now() >= day.bounds.close,
            _ => true,
        }
    }

    fn history_range(&self, date: NaiveDate) -> Result<Option<DateRange>, ReplayError> {
        if self.config.history_days == 0 {
            return Ok(None);
        }
        let count = usize::try_from(self.config.history_days).unwrap_or(usize::MAX);
        let days = self.calendar.trailing_trading_days(date, count)?;
        match (days.first(), days.last()) {
            (Some(first), Some(last)) => Ok(Some(DateRange::new(*first, *last)?)),
            _ => Ok(None),
        }
    }

    fn register(&mut self, request: &SymbolConfig, report: &mut RegistrationReport) {
        match self.try_register(request, report) {
            Ok(()) => report.accepted.push(request.symbol.clone()),
            Err(err) => {
                warn!(symbol = %request.symbol, error = %err, "Rejected symbol");
                report.rejected.push((request.symbol.clone(), err.to_string()));
            }
        }
    }

    fn try_register(
        &mut self,
        request: &SymbolConfig,
        report: &mut RegistrationReport,
    ) -> Result<(), ReplayError> {
        let Some(day) = self.day else {
            return Err(ConfigError::Invalid("no trading session in progress".to_string()).into());
        };
        let symbol = request.symbol.as_str();
        if self.store.contains(symbol) {
            return Err(SessionError::DuplicateSymbol(symbol.to_string()).into());
        }

        let history = self.history_range(day.date)?;
        let probe_range = match history {
            Some(range) => DateRange::new(range.start, day.date)?,
            None => DateRange::single_day(day.date),
        };
        let availability = self.loader.probe().probe(symbol, probe_range, &[])?;
        let plan = self.determiner.plan_stream(
            &request.intervals,
            &availability,
            self.config.mode,
            request.quotes,
        )?;
        report
            .unavailable
            .extend(plan.unavailable.iter().map(|interval| (symbol.to_string(), *interval)));

        let mut session = SymbolSession::new(symbol, plan.base, Registration::Full);
        for interval in &plan.derived {
            session.add_derived(*interval);
        }
        if let Some(range) = history {
            for interval in plan.intervals() {
                match self.loader.load(symbol, interval, range) {
                    Ok(load) => {
                        let mut series =
                            IntervalSeries::from_bars(interval, load.derived_from(), load.bars);
                        series.set_quality(load.quality);
                        series.set_gaps(load.gaps);
                        session.set_history(series);
                    }
                    Err(err) => {
                        warn!(symbol, %interval, error = %err, "No history loaded");
                        report.history_missing.push((symbol.to_string(), interval));
                    }
                }
            }
        }

        let aggregators = plan
            .derived
            .iter()
            .map(|target| {
                StreamingAggregator::new(
                    BarAggregator::with_calendar(Arc::clone(&self.calendar)),
                    AggregationRequest::new(symbol, plan.base, *target),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut backlog = self
            .loader
            .fetch(symbol, plan.base, DateRange::single_day(day.date))?;
        if self.config.mode == SessionMode::Live {
            let now = self.clock.now();
            backlog.retain(|bar| bar.timestamp <= now);
        }

        self.store.register(session)?;
        let queued = self.queues.push_backlog(symbol, plan.base, backlog);
        let last_base = plan
            .base
            .is_intraday()
            .then(|| day.bounds.open - plan.base.duration());
        let last_derived = plan
            .derived
            .iter()
            .filter(|interval| interval.is_intraday())
            .map(|interval| (*interval, day.bounds.open - interval.duration()))
            .collect();
        info!(
            symbol,
            base = %plan.base,
            derived = plan.derived.len(),
            quotes = ?plan.quotes,
            queued,
            "Registered symbol"
        );
        self.runtimes.insert(
            symbol.to_string(),
            SymbolRuntime {
                plan,
                aggregators,
                last_base,
                last_derived,
            },
        );
        Ok(())
    }

    fn process_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::AddSymbol(request) => {
                    let symbol = request.symbol.clone();
                    let report = self.add_symbol(request);
                    debug!(
                        symbol = %symbol,
                        accepted = report.all_accepted(),
                        "Applied add command"
                    );
                }
                Command::RemoveSymbol(symbol) => {
                    self.remove_symbol(&symbol);
                }
                Command::AutoProvision(symbol, interval) => {
                    self.auto_provision(&symbol, interval);
                }
            }
        }
    }

    fn poll_live(&mut self, seq: u64, notifications: &mut Vec<Notification>) {
        let Some(feed) = self.live_feed.as_mut() else {
            return;
        };
        let events: Vec<LiveEvent> = std::iter::from_fn(|| feed.poll()).collect();
        for event in events {
            match event {
                LiveEvent::Bar(bar) => self.accept_live_bar(bar, seq, notifications),
                LiveEvent::Quote(quote) => self.accept_live_quote(quote, seq, notifications),
            }
        }
    }

    fn accept_live_bar(&mut self, bar: Bar, seq: u64, notifications: &mut Vec<Notification>) {
        let symbol = bar.symbol.clone();
        if let Some(runtime) = self.runtimes.get(&symbol) {
            let base = runtime.plan.base;
            if !self.queues.push(&symbol, base, bar) {
                debug!(symbol = %symbol, "Dropped stale live bar");
            }
            return;
        }

        // Auto-provisioned symbols have no queue and take bars as they come.
        let timestamp = bar.timestamp;
        let recorded = self
            .store
            .internal_write(&symbol, |session| {
                let interval = session.base_interval();
                session.record_base_bar(bar).then_some(interval)
            })
            .flatten();
        match recorded {
            Some(interval) => notifications.push(Notification {
                seq,
                symbol,
                interval,
                data_type: DataType::Bars,
                timestamp,
            }),
            None => debug!(symbol = %symbol, "Ignored live bar for unregistered symbol"),
        }
    }

    fn accept_live_quote(&self, quote: Quote, seq: u64, notifications: &mut Vec<Notification>) {
        let Some(runtime) = self.runtimes.get(&quote.symbol) else {
            debug!(symbol = %quote.symbol, "Ignored quote for unregistered symbol");
            return;
        };
        if runtime.plan.quotes != QuoteSource::Streamed {
            return;
        }
        let symbol = quote.symbol.clone();
        notifications.push(Notification {
            seq,
            symbol: symbol.clone(),
            interval: runtime.plan.base,
            data_type: DataType::Quote,
            timestamp: quote.timestamp,
        });
        self.store
            .internal_write(&symbol, |session| session.set_quote(quote));
    }

    fn advance_clock(&mut self, head: DateTime<Utc>) -> DateTime<Utc> {
        let now = match self.config.mode {
            SessionMode::Backtest => self.now.map_or(head, |now| now.max(head)),
            SessionMode::Live => self.clock.now(),
        };
        self.now = Some(now);
        now
    }

    fn apply_bar(
        &mut self,
        item: Drained,
        now: DateTime<Utc>,
        seq: u64,
        notifications: &mut Vec<Notification>,
    ) -> Result<(), ReplayError> {
        let Drained {
            symbol,
            interval,
            bar,
        } = item;
        let timestamp = bar.timestamp;
        if interval.is_intraday() && !self.calendar.is_regular_hours(timestamp)? {
            self.stats.out_of_hours_drops += 1;
            debug!(symbol = %symbol, %timestamp, "Dropped bar outside regular hours");
            return Ok(());
        }

        self.stats.drained_bars += 1;
        if let Some(active) = self.lag.observe(now, timestamp) {
            self.apply_lag(active, now - timestamp);
        }

        let Some(runtime) = self.runtimes.get_mut(&symbol) else {
            return Ok(());
        };
        let SymbolRuntime {
            plan,
            aggregators,
            last_base,
            last_derived,
        } = runtime;

        let mut updates = Vec::with_capacity(1 + aggregators.len());
        let mut base = SeriesUpdate::new(interval);
        if let Some(last) = *last_base {
            base.gaps
                .extend(self.engine.gap_between(interval, last, timestamp)?);
        }
        *last_base = Some(timestamp);

        for aggregator in aggregators.iter_mut() {
            let mut update = SeriesUpdate::new(aggregator.target());
            let events = aggregator.push(bar.clone())?;
            absorb(&self.engine, last_derived, &mut update, events)?;
            updates.push(update);
        }

        let quote = (plan.quotes == QuoteSource::Synthesized).then(|| Quote::from_bar(&bar));
        base.bars.push(bar);
        updates.insert(0, base);
        self.commit(&symbol, interval, updates, quote, seq, notifications);
        Ok(())
    }

    fn close_symbol(
        &mut self,
        symbol: &str,
        close: DateTime<Utc>,
        seq: u64,
        notifications: &mut Vec<Notification>,
    ) -> Result<(), ReplayError> {
        let Some(runtime) = self.runtimes.get_mut(symbol) else {
            return Ok(());
        };
        let SymbolRuntime {
            plan,
            aggregators,
            last_base,
            last_derived,
        } = runtime;
        let base_interval = plan.base;

        let mut updates = Vec::with_capacity(1 + aggregators.len());
        let mut base = SeriesUpdate::new(base_interval);
        if let Some(last) = *last_base {
            base.gaps
                .extend(self.engine.gap_between(base_interval, last, close)?);
        }
        updates.push(base);

        for aggregator in aggregators.iter_mut() {
            let mut update = SeriesUpdate::new(aggregator.target());
            absorb(&self.engine, last_derived, &mut update, aggregator.finish()?)?;
            if let Some(last) = last_derived.get(&update.interval) {
                update
                    .gaps
                    .extend(self.engine.gap_between(update.interval, *last, close)?);
            }
            updates.push(update);
        }

        self.commit(symbol, base_interval, updates, None, seq, notifications);
        Ok(())
    }

    fn fill_open_gaps(
        &mut self,
        symbol: &str,
        seq: u64,
        notifications: &mut Vec<Notification>,
    ) -> Result<(), ReplayError> {
        let open: Vec<(Interval, GapRecord)> = self
            .store
            .internal_read(symbol, |session| {
                session
                    .all_series()
                    .flat_map(|series| series.open_gaps().map(move |gap| (series.interval(), *gap)))
                    .collect()
            })
            .unwrap_or_default();

        for (interval, gap) in open {
            let Some((record, bars)) = self.loader.fill_open_gap(symbol, interval, &gap)? else {
                continue;
            };
            let inserted = self
                .store
                .internal_write(symbol, |session| {
                    let inserted = session.apply_fill(interval, record, bars);
                    if let Some(series) = session.series_mut(interval) {
                        refresh_quality(series);
                    }
                    inserted
                })
                .unwrap_or(0);
            self.stats.filled_gaps += 1;
            debug!(symbol, %interval, start = %gap.start(), inserted, "Filled session gap");
            notifications.push(Notification {
                seq,
                symbol: symbol.to_string(),
                interval,
                data_type: DataType::Quality,
                timestamp: gap.start(),
            });
        }
        Ok(())
    }

    fn commit(
        &self,
        symbol: &str,
        base_interval: Interval,
        updates: Vec<SeriesUpdate>,
        quote: Option<Quote>,
        seq: u64,
        notifications: &mut Vec<Notification>,
    ) {
        let notify =
            |interval: Interval, data_type: DataType, timestamp: DateTime<Utc>| Notification {
                seq,
                symbol: symbol.to_string(),
                interval,
                data_type,
                timestamp,
            };
        for update in &updates {
            notifications.extend(
                update
                    .bars
                    .iter()
                    .map(|bar| notify(update.interval, DataType::Bars, bar.timestamp)),
            );
            if let Some(gap) = update.gaps.last() {
                notifications.push(notify(update.interval, DataType::Quality, gap.start()));
            }
        }
        if let Some(quote) = &quote {
            notifications.push(notify(base_interval, DataType::Quote, quote.timestamp));
        }

        self.store.internal_write(symbol, move |session| {
            for update in updates {
                apply_update(session, update);
            }
            if let Some(quote) = quote {
                session.set_quote(quote);
            }
        });
    }

    fn apply_lag(&mut self, active: bool, lag: TimeDelta) {
        let was_active = self.store.set_active(active);
        match (was_active, active) {
            (true, false) => {
                self.stats.deactivations += 1;
                info!(lag_secs = lag.num_seconds(), "Replay lagging, store deactivated");
            }
            (false, true) => {
                self.stats.activations += 1;
                info!(lag_secs = lag.num_seconds(), "Replay caught up, store activated");
            }
            _ => {}
        }
    }

    fn dispatch(&mut self, seq: u64, notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }
        self.stats.notifications += notifications.len() as u64;
        self.pool.dispatch(seq, notifications, &mut self.stats);
    }
}

/// Turns streaming aggregator output into bars and gaps for one series.
///
/// A slot that closed short is one missing bar; slots with no source bar at
/// all are found from the distance to the previous slot.
fn absorb(
    engine: &GapEngine,
    last_slots: &mut BTreeMap<Interval, DateTime<Utc>>,
    update: &mut SeriesUpdate,
    events: Vec<StreamEvent>,
) -> Result<(), QualityError> {
    let interval = update.interval;
    for event in events {
        let (start, bar) = match event {
            StreamEvent::Bar(bar) => (bar.timestamp, Some(bar)),
            StreamEvent::Skipped {
                start,
                received,
                expected,
            } => {
                debug!(%interval, %start, received, expected, "Derived slot closed incomplete");
                (start, None)
            }
        };
        if let Some(last) = last_slots.get(&interval) {
            update
                .gaps
                .extend(engine.gap_between(interval, *last, start)?);
        }
        if interval.is_intraday() {
            last_slots.insert(interval, start);
        }
        match bar {
            Some(bar) => update.bars.push(bar),
            None => update
                .gaps
                .push(GapRecord::new(start, start + interval.duration(), 1)),
        }
    }
    Ok(())
}

fn apply_update(session: &mut SymbolSession, update: SeriesUpdate) {
    let SeriesUpdate {
        interval,
        bars,
        gaps,
    } = update;
    let is_base = interval == session.base_interval();
    for bar in bars {
        if is_base {
            session.record_base_bar(bar);
        } else {
            session.record_derived_bar(interval, bar);
        }
    }
    if let Some(series) = session.series_mut(interval) {
        for gap in gaps {
            series.record_gap(gap);
        }
        refresh_quality(series);
    }
}

/// Quality of a streamed series: held bars over held plus open missing bars.
fn refresh_quality(series: &mut IntervalSeries) {
    let missing: u64 = series.open_gaps().map(GapRecord::missing).sum();
    let present = series.len() as u64;
    let total = present + missing;
    let quality = if total == 0 {
        100.0
    } else {
        100.0 * present as f64 / total as f64
    };
    series.set_quality(quality);
}
