// =============================================================================
// Candle Aggregator — tick-to-OHLCV bucketing
// =============================================================================
//
// Each tick lands in the bucket `epoch - epoch % interval`.  When a tick opens
// a later bucket, the active bucket is finalized into a Candle and appended to
// the history; silent intervals in between produce no candle.  The
// `new_candle_ready` flag is raised on every finalization and consumed exactly
// once by the analysis loop.
// =============================================================================

use anyhow::Result;
use tracing::{debug, warn};

use crate::market_data::{Candle, CandleHistory};
use crate::types::Tick;

pub struct CandleAggregator {
    interval_seconds: i64,
    active_interval: Option<i64>,
    pending: Vec<f64>,
    history: CandleHistory,
    new_candle_ready: bool,
}

impl CandleAggregator {
    pub fn new(interval_seconds: i64, capacity: usize) -> Self {
        Self {
            interval_seconds,
            active_interval: None,
            pending: Vec::new(),
            history: CandleHistory::new(capacity),
            new_candle_ready: false,
        }
    }

    /// Bucket start for an epoch.
    pub fn bucket_of(&self, epoch_seconds: i64) -> i64 {
        epoch_seconds - epoch_seconds.rem_euclid(self.interval_seconds)
    }

    /// Fold one tick into the aggregator.
    ///
    /// Returns `true` when the tick closed the previous bucket.
    pub fn on_tick(&mut self, tick: Tick) -> Result<bool> {
        if !tick.price.is_finite() {
            warn!(price = tick.price, epoch = tick.epoch_seconds, "dropping non-finite tick");
            return Ok(false);
        }

        let bucket = self.bucket_of(tick.epoch_seconds);
        let mut finalized = false;

        match self.active_interval {
            None => self.active_interval = Some(bucket),
            Some(active) if bucket > active => {
                finalized = self.finalize()?;
                self.active_interval = Some(bucket);
            }
            Some(active) if bucket < active => {
                warn!(
                    epoch = tick.epoch_seconds,
                    active_interval = active,
                    "dropping tick older than the active interval"
                );
                return Ok(false);
            }
            Some(_) => {}
        }

        self.pending.push(tick.price);
        Ok(finalized)
    }

    /// Close the active bucket into a candle. An empty bucket is a no-op.
    fn finalize(&mut self) -> Result<bool> {
        let Some(start) = self.active_interval else {
            return Ok(false);
        };
        let Some(candle) = Candle::from_prices(start, &self.pending) else {
            return Ok(false);
        };
        self.pending.clear();

        debug!(
            interval_start = candle.interval_start,
            open = candle.open,
            close = candle.close,
            ticks = candle.tick_count,
            "candle finalized"
        );
        self.history.push(candle)?;
        self.new_candle_ready = true;
        Ok(true)
    }

    /// Consume the edge-triggered "new candle" flag.
    pub fn take_new_candle(&mut self) -> bool {
        std::mem::take(&mut self.new_candle_ready)
    }

    /// Drop the unfinished bucket; finalized history is kept.
    pub fn discard_pending(&mut self) {
        if !self.pending.is_empty() {
            debug!(ticks = self.pending.len(), "discarding unfinished interval");
        }
        self.pending.clear();
    }

    pub fn history(&self) -> &CandleHistory {
        &self.history
    }

    #[cfg(test)]
    pub fn pending_ticks(&self) -> usize {
        self.pending.len()
    }
}
