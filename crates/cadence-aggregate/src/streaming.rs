//! Incremental aggregation for live and replayed streams.

use cadence_types::{Bar, Interval};
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::slot::{Slot, SlotResolver};
use crate::{AggregateError, AggregationRequest, BarAggregator, GroupingMode, OhlcvItem};

/// Output of a [`StreamingAggregator`].
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A derived bar was completed.
    Bar(Bar),
    /// A target slot closed without enough source bars to build a bar.
    Skipped {
        /// Start of the skipped slot.
        start: DateTime<Utc>,
        /// Source bars received for the slot.
        received: usize,
        /// Source bars a full slot holds.
        expected: u64,
    },
}

/// Streaming base-bar aggregator.
///
/// Buffers the source bars of the current target slot and runs the batch
/// [`BarAggregator`] over the slot when it closes, so streamed and batch
/// output are identical. A fixed-chunk slot closes as soon as its last source
/// bar arrives; a calendar period closes when a bar of a later period
/// arrives or on [`finish`](Self::finish).
#[derive(Debug)]
pub struct StreamingAggregator {
    aggregator: BarAggregator,
    request: AggregationRequest,
    resolver: SlotResolver,
    slot: Option<Slot>,
    buffer: Vec<Bar>,
    last: Option<DateTime<Utc>>,
}

impl StreamingAggregator {
    /// Creates a streaming aggregator for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::Incompatible`] if the request is invalid.
    pub fn new(
        aggregator: BarAggregator,
        request: AggregationRequest,
    ) -> Result<Self, AggregateError> {
        request.validate()?;
        let resolver = aggregator.resolver(&request);
        Ok(Self {
            aggregator,
            request,
            resolver,
            slot: None,
            buffer: Vec::new(),
            last: None,
        })
    }

    /// Returns the aggregation request.
    #[must_use]
    pub const fn request(&self) -> &AggregationRequest {
        &self.request
    }

    /// Returns the target interval.
    #[must_use]
    pub const fn target(&self) -> Interval {
        self.request.target
    }

    /// Returns the number of buffered source bars.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds the next source bar.
    ///
    /// # Errors
    ///
    /// Returns an error if a calendar lookup fails.
    pub fn push(&mut self, bar: Bar) -> Result<Vec<StreamEvent>, AggregateError> {
        if let Err(err) = bar.check() {
            warn!(
                symbol = %bar.symbol,
                timestamp = %bar.timestamp,
                error = %err,
                "Skipping malformed bar"
            );
            return Ok(Vec::new());
        }
        if self.last.is_some_and(|last| bar.timestamp <= last) {
            warn!(symbol = %bar.symbol, timestamp = %bar.timestamp, "Skipping out-of-order bar");
            return Ok(Vec::new());
        }
        self.last = Some(bar.timestamp);

        let slot = self.resolver.resolve(bar.timestamp)?;
        let mut events = Vec::new();
        if self.slot.is_some_and(|open| open.key != slot.key) {
            events.extend(self.flush()?);
        }
        self.slot = Some(slot);
        self.buffer.push(bar);

        let full = self.request.mode == GroupingMode::FixedChunk
            && self
                .request
                .chunk_size()
                .is_some_and(|size| self.buffer.len() as u64 == size);
        if full {
            events.extend(self.flush()?);
        }
        Ok(events)
    }

    /// Closes the open slot, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if a calendar lookup fails.
    pub fn finish(&mut self) -> Result<Vec<StreamEvent>, AggregateError> {
        self.flush()
    }

    fn flush(&mut self) -> Result<Vec<StreamEvent>, AggregateError> {
        let Some(slot) = self.slot.take() else {
            return Ok(Vec::new());
        };
        let buffer = std::mem::take(&mut self.buffer);
        if buffer.is_empty() {
            return Ok(Vec::new());
        }

        let mut bars = self.aggregator.aggregate(&buffer, &self.request)?;
        if bars.is_empty() {
            return Ok(vec![StreamEvent::Skipped {
                start: slot.start,
                received: buffer.len(),
                expected: self.request.chunk_size().unwrap_or(0),
            }]);
        }
        if let [bar] = bars.as_mut_slice() {
            bar.timestamp = slot.start;
        }
        Ok(bars.into_iter().map(StreamEvent::Bar).collect())
    }
}
