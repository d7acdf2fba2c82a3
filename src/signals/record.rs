// =============================================================================
// Signal Record & History
// =============================================================================
//
// A `SignalRecord` freezes the indicator readings at the moment a signal
// fired.  `SignalHistory` is the append-only log of every record emitted
// during the process lifetime.
// =============================================================================

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::SignalDirection;

/// Snapshot of one emitted signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    /// Unique identifier (UUID v4).
    pub id: Uuid,
    pub direction: SignalDirection,
    /// Close of the triggering candle.
    pub price: f64,
    pub atr: f64,
    pub rsi: f64,
    pub stoch_k: f64,
    pub stoch_d: f64,
    pub macd: f64,
    pub roc: f64,
    pub adx: f64,
    pub volume_ratio: f64,
    pub price_change_pct: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Start of the candle that triggered the signal.
    pub interval_start: i64,
    /// Evaluation time in epoch seconds (close of the triggering candle).
    pub timestamp: i64,
}

impl SignalRecord {
    /// Timestamp rendered as `YYYY-MM-DD HH:MM:SS` UTC.
    pub fn timestamp_utc(&self) -> String {
        chrono::DateTime::from_timestamp(self.timestamp, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| self.timestamp.to_string())
    }
}

/// Append-only log of emitted signals, oldest first.
#[derive(Debug, Clone, Default)]
pub struct SignalHistory {
    records: Vec<SignalRecord>,
}

impl SignalHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: SignalRecord) {
        self.records.push(record);
    }

    pub fn last(&self) -> Option<&SignalRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

}

#[cfg(test)]
pub(crate) fn sample_record(direction: SignalDirection, timestamp: i64) -> SignalRecord {
    SignalRecord {
        id: Uuid::new_v4(),
        direction,
        price: 100.0,
        atr: 0.4,
        rsi: 62.0,
        stoch_k: 70.0,
        stoch_d: 60.0,
        macd: 0.2,
        roc: 1.5,
        adx: 30.0,
        volume_ratio: 1.6,
        price_change_pct: 0.8,
        stop_loss: 99.0,
        take_profit: 101.4,
        interval_start: timestamp - 60,
        timestamp,
    }
}
