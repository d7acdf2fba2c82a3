use std::collections::VecDeque;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A finalized OHLCV candle built from feed ticks.
///
/// Volume is the tick count: the feed reports prices only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start in epoch seconds; a multiple of the interval length.
    pub interval_start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub tick_count: u64,
    /// Open-to-close move in percent.
    pub price_change_pct: f64,
}

impl Candle {
    /// Build a candle from the prices of one bucket, in arrival order.
    ///
    /// Returns `None` for an empty bucket.
    pub fn from_prices(interval_start: i64, prices: &[f64]) -> Option<Self> {
        let (&open, &close) = (prices.first()?, prices.last()?);
        let high = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let low = prices.iter().copied().fold(f64::INFINITY, f64::min);
        let price_change_pct = if open != 0.0 {
            (close - open) / open * 100.0
        } else {
            0.0
        };

        Some(Self {
            interval_start,
            open,
            high,
            low,
            close,
            tick_count: prices.len() as u64,
            price_change_pct,
        })
    }

    pub fn volume(&self) -> f64 {
        self.tick_count as f64
    }
}

// ---------------------------------------------------------------------------
// CandleHistory -- bounded ring of finalized candles
// ---------------------------------------------------------------------------

/// Fixed-capacity, oldest-first sequence of finalized candles.
///
/// `interval_start` is strictly increasing across the ring; an append that
/// would break the ordering is rejected.
#[derive(Debug, Clone)]
pub struct CandleHistory {
    ring: VecDeque<Candle>,
    capacity: usize,
}

impl CandleHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a finalized candle, evicting the oldest beyond capacity.
    pub fn push(&mut self, candle: Candle) -> Result<()> {
        if let Some(last) = self.ring.back() {
            if candle.interval_start <= last.interval_start {
                bail!(
                    "out-of-order candle: {} does not follow {}",
                    candle.interval_start,
                    last.interval_start
                );
            }
        }
        self.ring.push_back(candle);
        // Trim oldest to stay within budget.
        while self.ring.len() > self.capacity {
            self.ring.pop_front();
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.ring.back()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.ring.iter()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.ring.iter().map(|c| c.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.ring.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.ring.iter().map(|c| c.low).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.ring.iter().map(Candle::volume).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
