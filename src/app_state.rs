// =============================================================================
// Status Board — read-only view of the scanner for external collaborators
// =============================================================================
//
// The analysis loop is the only writer; health endpoints, notifiers and the
// heartbeat log read consistent snapshots through `snapshot()`.
//
// Thread safety:
//   - Atomic counters for lock-free candle/signal totals.
//   - parking_lot::RwLock for the recent-signal ring.
//   - Connection state is read live from the manager's handle.
// =============================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::feed::ConnectionHandle;
use crate::market_data::Candle;
use crate::signals::SignalRecord;
use crate::types::ConnectionState;

/// Maximum number of recent signals carried in a snapshot.
const MAX_RECENT_SIGNALS: usize = 10;

/// Serialisable point-in-time view.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub connected: bool,
    pub connection_state: ConnectionState,
    pub candle_count: usize,
    pub last_close: Option<f64>,
    pub last_signal: Option<SignalRecord>,
    pub total_signals: u64,
    /// Newest last.
    pub recent_signals: Vec<SignalRecord>,
    pub seconds_until_scheduled_reconnect: Option<i64>,
    pub state_version: u64,
    /// ISO 8601.
    pub generated_at: String,
}

pub struct StatusBoard {
    /// Bumped on every mutation so readers can skip unchanged snapshots.
    state_version: AtomicU64,
    connection: ConnectionHandle,
    candle_count: AtomicUsize,
    last_candle: RwLock<Option<Candle>>,
    total_signals: AtomicU64,
    recent_signals: RwLock<VecDeque<SignalRecord>>,
}

impl StatusBoard {
    pub fn new(connection: ConnectionHandle) -> Self {
        Self {
            state_version: AtomicU64::new(1),
            connection,
            candle_count: AtomicUsize::new(0),
            last_candle: RwLock::new(None),
            total_signals: AtomicU64::new(0),
            recent_signals: RwLock::new(VecDeque::with_capacity(MAX_RECENT_SIGNALS)),
        }
    }

    fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    /// Called after every finalized candle.
    pub fn record_candle(&self, candle_count: usize, last: Option<&Candle>) {
        self.candle_count.store(candle_count, Ordering::SeqCst);
        *self.last_candle.write() = last.cloned();
        self.increment_version();
    }

    pub fn record_signal(&self, record: &SignalRecord) {
        {
            let mut recent = self.recent_signals.write();
            recent.push_back(record.clone());
            while recent.len() > MAX_RECENT_SIGNALS {
                recent.pop_front();
            }
        }
        self.total_signals.fetch_add(1, Ordering::SeqCst);
        self.increment_version();
    }

    pub fn candle_count(&self) -> usize {
        self.candle_count.load(Ordering::SeqCst)
    }

    pub fn total_signals(&self) -> u64 {
        self.total_signals.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let recent_signals: Vec<SignalRecord> = self.recent_signals.read().iter().cloned().collect();
        let connection_state = self.connection.state();

        StatusSnapshot {
            connected: connection_state.is_live(),
            connection_state,
            candle_count: self.candle_count(),
            last_close: self.last_candle.read().as_ref().map(|c| c.close),
            last_signal: recent_signals.last().cloned(),
            total_signals: self.total_signals(),
            recent_signals,
            seconds_until_scheduled_reconnect: self.connection.seconds_until_scheduled_reconnect(),
            state_version: self.current_state_version(),
            generated_at: Utc::now().to_rfc3339(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
