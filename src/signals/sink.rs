// =============================================================================
// Signal Sinks — where emitted records go
// =============================================================================
//
// Delivery never blocks the analysis loop: the log sink writes through
// tracing, the channel sink uses `try_send` and drops on a full queue.
// =============================================================================

use tokio::sync::mpsc;
use tracing::{info, warn};

use super::record::SignalRecord;

/// Receives every signal the evaluator fires.
pub trait SignalSink: Send {
    fn deliver(&self, record: &SignalRecord);
}

/// Prints a banner for each signal.
#[derive(Debug, Clone)]
pub struct LogSink {
    symbol: String,
}

impl LogSink {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }
}

impl SignalSink for LogSink {
    fn deliver(&self, r: &SignalRecord) {
        info!("════════════════════════════════════════════════════════");
        info!(
            "  {} SIGNAL on {} @ {:.5}  ({} UTC)",
            r.direction,
            self.symbol,
            r.price,
            r.timestamp_utc()
        );
        info!(
            "  SL {:.5} | TP {:.5} | ATR {:.5}",
            r.stop_loss, r.take_profit, r.atr
        );
        info!(
            "  RSI {:.2} | Stoch {:.2}/{:.2} | MACD {:.5} | ROC {:.2}% | ADX {:.2}",
            r.rsi, r.stoch_k, r.stoch_d, r.macd, r.roc, r.adx
        );
        info!(
            "  volume x{:.2} | candle move {:+.3}% | id {}",
            r.volume_ratio, r.price_change_pct, r.id
        );
        info!("════════════════════════════════════════════════════════");
    }
}

/// Forwards records to an external consumer over a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<SignalRecord>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<SignalRecord>) -> Self {
        Self { tx }
    }
}

impl SignalSink for ChannelSink {
    fn deliver(&self, record: &SignalRecord) {
        match self.tx.try_send(record.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(r)) => {
                warn!(id = %r.id, "signal queue full, record dropped");
            }
            Err(mpsc::error::TrySendError::Closed(r)) => {
                warn!(id = %r.id, "signal consumer gone, record dropped");
            }
        }
    }
}

/// Delivers to several sinks in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn SignalSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl SignalSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sinks.len()
    }
}

impl SignalSink for FanoutSink {
    fn deliver(&self, record: &SignalRecord) {
        for sink in &self.sinks {
            sink.deliver(record);
        }
    }
}
