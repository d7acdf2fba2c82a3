// =============================================================================
// Analysis Loop — the single owner of candle, indicator and signal state
// =============================================================================
//
// Feed events arrive over one mpsc channel.  Ticks are folded into the
// aggregator; each finalized candle triggers exactly one synchronous
// indicator + evaluation cycle, so emission is strictly ordered with candle
// finalization.  A failed cycle is logged and abandoned, the loop carries on
// with the next candle.
// =============================================================================

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::app_state::StatusBoard;
use crate::feed::FeedEvent;
use crate::indicators::IndicatorEngine;
use crate::market_data::CandleAggregator;
use crate::runtime_config::RuntimeConfig;
use crate::signals::{Evaluation, SignalEvaluator, SignalSink};
use crate::types::Tick;

pub struct Analyzer {
    aggregator: CandleAggregator,
    engine: IndicatorEngine,
    evaluator: SignalEvaluator,
    sink: Box<dyn SignalSink>,
    status: Arc<StatusBoard>,
    min_candles: usize,
}

impl Analyzer {
    pub fn new(config: &RuntimeConfig, sink: Box<dyn SignalSink>, status: Arc<StatusBoard>) -> Self {
        let candles = &config.candles;
        Self {
            aggregator: CandleAggregator::new(candles.interval_seconds, candles.history_capacity),
            engine: IndicatorEngine::new(config.indicators.clone()),
            evaluator: SignalEvaluator::new(
                config.signals.clone(),
                candles.interval_seconds,
                config.indicators.ema_trend,
            ),
            sink,
            status,
            min_candles: candles.min_candles,
        }
    }

    pub fn evaluator(&self) -> &SignalEvaluator {
        &self.evaluator
    }

    pub fn aggregator(&self) -> &CandleAggregator {
        &self.aggregator
    }

    /// Consume feed events until the channel closes or shutdown is signalled.
    pub async fn run(mut self, mut events: mpsc::Receiver<FeedEvent>, mut shutdown: watch::Receiver<bool>) {
        info!(min_candles = self.min_candles, "analysis loop started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Some(event) => {
                        self.on_event(event);
                    }
                    None => {
                        info!("feed event channel closed");
                        break;
                    }
                },
            }
        }

        self.stop();
        info!(
            candles = self.aggregator.history().len(),
            signals = self.evaluator.history().len(),
            "analysis loop stopped"
        );
    }

    /// Drop the unfinished interval. Finalized candles are kept.
    pub fn stop(&mut self) {
        self.aggregator.discard_pending();
    }

    pub fn on_event(&mut self, event: FeedEvent) -> Option<Evaluation> {
        match event {
            FeedEvent::Tick(tick) => return self.on_tick(tick),
            FeedEvent::StateChanged(state) => debug!(state = %state, "feed state changed"),
            FeedEvent::Reconnecting { attempt, delay } => {
                info!(attempt, delay_secs = delay.as_secs(), "feed reconnecting");
            }
            FeedEvent::Fatal { attempts } => {
                error!(attempts, "feed gave up reconnecting; no further ticks will arrive");
            }
        }
        None
    }

    /// Fold one tick; run a cycle if it finalized a candle.
    pub fn on_tick(&mut self, tick: Tick) -> Option<Evaluation> {
        if let Err(e) = self.aggregator.on_tick(tick) {
            warn!(error = %e, "failed to fold tick");
            return None;
        }
        if !self.aggregator.take_new_candle() {
            return None;
        }

        let history = self.aggregator.history();
        self.status.record_candle(history.len(), history.last());

        if history.len() < self.min_candles {
            debug!(
                candles = history.len(),
                required = self.min_candles,
                "collecting candles"
            );
            return None;
        }

        let snapshot = match self.engine.compute(history) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "indicator cycle abandoned");
                return None;
            }
        };

        let evaluation = self.evaluator.evaluate(history, &snapshot);
        match &evaluation {
            Evaluation::Fired(record) => {
                self.sink.deliver(record);
                self.status.record_signal(record);
            }
            Evaluation::Blocked { gate, reason } => debug!(gate = *gate, %reason, "signal blocked"),
            Evaluation::Skipped { reason } => debug!(%reason, "evaluation skipped"),
        }
        Some(evaluation)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock;
    use crate::feed::{ConnectionManager, TungsteniteConnector};
    use crate::runtime_config::{CandleParams, FeedConfig, IndicatorParams, SignalParams};
    use crate::signals::{ChannelSink, SignalRecord};
    use crate::types::{ConnectionState, SignalDirection};

    fn status() -> Arc<StatusBoard> {
        let (tx, _rx) = mpsc::channel(8);
        let manager = ConnectionManager::new(
            FeedConfig::default(),
            Arc::new(TungsteniteConnector),
            clock::system(),
            tx,
        );
        Arc::new(StatusBoard::new(manager.handle()))
    }

    /// Uptrend config with the RSI ceiling lifted: a clean staircase never
    /// prints a down candle, so RSI sits at 100.
    fn config() -> RuntimeConfig {
        RuntimeConfig {
            signals: SignalParams {
                rsi_lower: 0.0,
                rsi_upper: 101.0,
                ..SignalParams::default()
            },
            ..RuntimeConfig::default()
        }
    }

    fn analyzer(status: Arc<StatusBoard>) -> (Analyzer, mpsc::Receiver<SignalRecord>) {
        let (tx, rx) = mpsc::channel(16);
        let analyzer = Analyzer::new(&config(), Box::new(ChannelSink::new(tx)), status);
        (analyzer, rx)
    }

    /// Four ticks per 60s candle: open, +2, -2, back to open.  The base
    /// climbs 0.1 per candle.
    fn staircase(candles: i64) -> Vec<Tick> {
        (0..candles)
            .flat_map(|i| {
                let base = 100.0 + 0.1 * i as f64;
                [base, base + 2.0, base - 2.0, base]
                    .into_iter()
                    .enumerate()
                    .map(move |(j, price)| Tick::new(price, i * 60 + j as i64 * 10))
            })
            .collect()
    }

    /// A 30-tick candle at index 60 rising 2% from open to close, plus the
    /// tick that finalizes it.
    fn spike() -> Vec<Tick> {
        let open = 106.0;
        let mut ticks: Vec<Tick> = (0..30)
            .map(|k| Tick::new(open + 2.12 * k as f64 / 29.0, 3_600 + k))
            .collect();
        ticks.push(Tick::new(108.12, 3_660));
        ticks
    }

    // ---- on_tick ----

    #[test]
    fn no_evaluation_before_min_candles() {
        let status = status();
        let (mut analyzer, _rx) = analyzer(status.clone());
        // 49 candles finalized by the first tick of the 50th
        let ticks = staircase(50);
        let results: Vec<_> = ticks[..ticks.len() - 3]
            .iter()
            .filter_map(|&t| analyzer.on_tick(t))
            .collect();
        assert!(results.is_empty());
        assert_eq!(status.candle_count(), 49);
    }

    #[test]
    fn one_cycle_per_finalized_candle() {
        let (mut analyzer, _rx) = analyzer(status());
        let evaluations = staircase(61)
            .into_iter()
            .filter_map(|t| analyzer.on_tick(t))
            .count();
        // candles 50..=60 in history -> 11 cycles
        assert_eq!(evaluations, 11);
    }

    #[test]
    fn quiet_staircase_never_fires() {
        let (mut analyzer, mut rx) = analyzer(status());
        for tick in staircase(61) {
            if let Some(eval) = analyzer.on_tick(tick) {
                assert!(eval.fired().is_none(), "unexpected signal: {eval:?}");
            }
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn spike_candle_fires_buy() {
        let status = status();
        let (mut analyzer, mut rx) = analyzer(status.clone());
        let fired: Vec<SignalRecord> = staircase(60)
            .into_iter()
            .chain(spike())
            .filter_map(|t| analyzer.on_tick(t))
            .filter_map(|e| e.fired().cloned())
            .collect();

        assert_eq!(fired.len(), 1);
        let record = &fired[0];
        assert_eq!(record.direction, SignalDirection::Buy);
        assert_eq!(record.interval_start, 3_600);
        assert_eq!(record.timestamp, 3_660);
        assert!((record.price - 108.12).abs() < 1e-9);
        assert!(record.stop_loss < record.price && record.take_profit > record.price);

        let delivered = rx.try_recv().unwrap();
        assert_eq!(delivered.id, record.id);

        let snap = status.snapshot();
        assert_eq!(snap.candle_count, 61);
        assert_eq!(snap.total_signals, 1);
        assert_eq!(snap.last_signal.map(|r| r.id), Some(record.id));
        assert_eq!(analyzer.evaluator().consecutive_count(), 1);
    }

    #[test]
    fn bad_tick_does_not_stop_the_loop() {
        let (mut analyzer, _rx) = analyzer(status());
        assert!(analyzer.on_tick(Tick::new(f64::NAN, 0)).is_none());
        assert!(analyzer.on_tick(Tick::new(100.0, 0)).is_none());
        assert!(analyzer.on_tick(Tick::new(101.0, 60)).is_none());
        assert_eq!(analyzer.aggregator().history().len(), 1);
    }

    #[test]
    fn non_tick_events_yield_nothing() {
        let (mut analyzer, _rx) = analyzer(status());
        assert!(analyzer
            .on_event(FeedEvent::StateChanged(ConnectionState::Subscribed))
            .is_none());
        assert!(analyzer
            .on_event(FeedEvent::Reconnecting {
                attempt: 1,
                delay: Duration::from_secs(2)
            })
            .is_none());
        assert!(analyzer.on_event(FeedEvent::Fatal { attempts: 10 }).is_none());
    }

    #[test]
    fn stop_discards_unfinished_interval() {
        let (mut analyzer, _rx) = analyzer(status());
        analyzer.on_tick(Tick::new(100.0, 0));
        analyzer.on_tick(Tick::new(101.0, 60));
        analyzer.on_tick(Tick::new(102.0, 70));
        assert_eq!(analyzer.aggregator().pending_ticks(), 2);

        analyzer.stop();
        assert_eq!(analyzer.aggregator().pending_ticks(), 0);
        assert_eq!(analyzer.aggregator().history().len(), 1);
    }

    /// Short periods and a ten-candle window, so one corrupt candle ages out
    /// quickly.
    fn short_window_config() -> RuntimeConfig {
        let mut config = config();
        config.candles = CandleParams {
            history_capacity: 10,
            min_candles: 10,
            ..CandleParams::default()
        };
        config.indicators = IndicatorParams {
            ema_fast: 2,
            ema_slow: 3,
            ema_trend: 5,
            macd_fast: 3,
            macd_slow: 5,
            macd_signal: 2,
            rsi: 3,
            stoch_k: 3,
            stoch_d: 2,
            stoch_slow: 2,
            atr: 3,
            volume_ma: 3,
            roc: 3,
            adx: 3,
        };
        config
    }

    #[test]
    fn failed_cycle_is_abandoned_and_the_loop_carries_on() {
        let config = short_window_config();
        config.validate().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let status = status();
        let mut analyzer = Analyzer::new(&config, Box::new(ChannelSink::new(tx)), status.clone());

        let ticks = staircase(22);
        let (head, tail) = ticks.split_at(10 * 4);

        // Candles 0..=8 collect; the first tick of candle 10 finalizes candle 9.
        for &tick in head {
            let _ = analyzer.on_tick(tick);
        }
        assert!(analyzer.on_tick(Tick::new(100.0, 600)).is_some());

        // Candle 10 spans the whole float range: its true range overflows.
        assert!(analyzer.on_tick(Tick::new(f64::MAX, 610)).is_none());
        assert!(analyzer.on_tick(Tick::new(-f64::MAX, 620)).is_none());
        assert!(analyzer.on_tick(Tick::new(101.0, 630)).is_none());
        assert!(analyzer.on_tick(Tick::new(101.1, 660)).is_none(), "corrupt candle evaluated");
        assert!(rx.try_recv().is_err());
        assert_eq!(status.snapshot().last_close, Some(101.0));

        // Keep folding until the first tick of candle 21 finalizes candle 20,
        // by which point the corrupt candle has left the window.
        let outcomes: Vec<Option<Evaluation>> = tail[4..tail.len() - 3]
            .iter()
            .map(|&t| analyzer.on_tick(t))
            .collect();
        let finalized = status.snapshot().last_close;
        assert_eq!(finalized.map(|c| (c * 10.0).round()), Some(1020.0));
        assert!(outcomes.last().is_some_and(Option::is_some), "loop did not recover");
        assert!(rx.try_recv().is_err());
    }

    // ---- run ----

    #[tokio::test]
    async fn run_drains_channel_then_exits() {
        let status = status();
        let (analyzer, _rx) = analyzer(status.clone());
        let (tx, events) = mpsc::channel(64);
        let (_shutdown_tx, shutdown) = watch::channel(false);

        for tick in staircase(3) {
            tx.send(FeedEvent::Tick(tick)).await.unwrap();
        }
        drop(tx);

        analyzer.run(events, shutdown).await;
        assert_eq!(status.candle_count(), 2);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (analyzer, _rx) = analyzer(status());
        let (_tx, events) = mpsc::channel::<FeedEvent>(8);
        let (shutdown_tx, shutdown) = watch::channel(false);

        let task = tokio::spawn(analyzer.run(events, shutdown));
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("analysis loop did not stop")
            .unwrap();
    }
}
