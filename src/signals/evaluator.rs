// =============================================================================
// Signal Evaluator — multi-indicator spike gate
// =============================================================================
//
// Runs once per finalized candle.  A BUY fires only when every gate passes:
//
//   1. cooldown     last signal at least `cooldown_intervals` candles ago
//   2. trend        EMA fast > slow > trend, close > trend EMA
//   3. momentum     MACD > signal and histogram > 0, or ROC > min_roc
//   4. oscillators  RSI inside the open band, %K > %D and %K > stoch_min
//   5. strength     ADX > adx_min (passes while ADX is undefined)
//   6. volume       volume > volume MA * min_volume_ratio
//   7. spike        open-to-close change > min_price_change, or ROC > min_roc
//
// SELL is the mirror image: price comparisons flip sign and bounded
// oscillators are reflected around 50.  Afterwards the streak cap limits how
// many same-direction signals may fire back to back.
//
// Undefined indicator values always fail the gate that reads them.
// =============================================================================

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::record::{SignalHistory, SignalRecord};
use crate::indicators::{IndicatorSnapshot, LatestIndicators};
use crate::market_data::{Candle, CandleHistory};
use crate::runtime_config::SignalParams;
use crate::types::SignalDirection;

/// Outcome of one evaluation cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Evaluation {
    Fired(SignalRecord),
    /// A gate rejected the candle.
    Blocked { gate: &'static str, reason: String },
    /// Not enough defined data to evaluate at all.
    Skipped { reason: String },
}

#[cfg(test)]
impl Evaluation {
    pub fn fired(&self) -> Option<&SignalRecord> {
        match self {
            Self::Fired(record) => Some(record),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct GateFailure {
    gate: &'static str,
    reason: String,
}

impl GateFailure {
    fn new(gate: &'static str, reason: impl Into<String>) -> Self {
        Self {
            gate,
            reason: reason.into(),
        }
    }
}

fn require(value: Option<f64>, gate: &'static str, name: &str) -> Result<f64, GateFailure> {
    value.ok_or_else(|| GateFailure::new(gate, format!("{name} undefined")))
}

/// Everything the gates read for the newest candle.
struct GateInputs<'a> {
    candle: &'a Candle,
    latest: LatestIndicators,
    avg_volume: f64,
}

impl GateInputs<'_> {
    fn volume_ratio(&self) -> f64 {
        if self.avg_volume > 0.0 {
            self.candle.volume() / self.avg_volume
        } else {
            1.0
        }
    }
}

// =============================================================================
// SignalEvaluator
// =============================================================================

pub struct SignalEvaluator {
    params: SignalParams,
    interval_seconds: i64,
    /// History shorter than the trend EMA is never evaluated.
    trend_period: usize,
    history: SignalHistory,
    last_signal_time: Option<i64>,
    consecutive: u32,
}

impl SignalEvaluator {
    pub fn new(params: SignalParams, interval_seconds: i64, trend_period: usize) -> Self {
        Self {
            params,
            interval_seconds,
            trend_period,
            history: SignalHistory::new(),
            last_signal_time: None,
            consecutive: 0,
        }
    }

    pub fn history(&self) -> &SignalHistory {
        &self.history
    }

    /// Same-direction signals fired in a row so far.
    #[cfg(test)]
    pub fn consecutive_count(&self) -> u32 {
        self.consecutive
    }

    /// Evaluate the newest candle of `candles` against `snapshot`.
    ///
    /// The evaluation time is the close of that candle, so replaying the
    /// same candles always yields the same decisions.
    pub fn evaluate(&mut self, candles: &CandleHistory, snapshot: &IndicatorSnapshot) -> Evaluation {
        let Some(candle) = candles.last() else {
            return Evaluation::Skipped {
                reason: "no candles".into(),
            };
        };
        let latest = snapshot.latest();

        if candles.len() < self.trend_period {
            return Evaluation::Skipped {
                reason: format!("{} candles < trend period {}", candles.len(), self.trend_period),
            };
        }
        let core = [
            ("ema_fast", latest.ema_fast),
            ("ema_slow", latest.ema_slow),
            ("rsi", latest.rsi),
            ("atr", latest.atr),
        ];
        if let Some((name, _)) = core.iter().find(|(_, v)| v.is_none()) {
            return Evaluation::Skipped {
                reason: format!("{name} undefined"),
            };
        }

        let now = candle.interval_start + self.interval_seconds;

        if let Some(last) = self.last_signal_time {
            let cooldown = self.params.cooldown_intervals * self.interval_seconds;
            if now - last < cooldown {
                return Evaluation::Blocked {
                    gate: "cooldown",
                    reason: format!("{}s since last signal < {cooldown}s", now - last),
                };
            }
        }

        let avg_volume = match latest.volume_ma {
            Some(ma) if ma > 0.0 => ma,
            _ => candle.volume(),
        };
        let inputs = GateInputs {
            candle,
            latest,
            avg_volume,
        };

        let direction = match self.check(SignalDirection::Buy, &inputs) {
            Ok(()) => SignalDirection::Buy,
            Err(buy) if !self.params.allow_sell => {
                return Evaluation::Blocked {
                    gate: buy.gate,
                    reason: buy.reason,
                }
            }
            Err(buy) => match self.check(SignalDirection::Sell, &inputs) {
                Ok(()) => SignalDirection::Sell,
                Err(sell) => {
                    return Evaluation::Blocked {
                        gate: buy.gate,
                        reason: format!("buy: {}; sell[{}]: {}", buy.reason, sell.gate, sell.reason),
                    }
                }
            },
        };

        let streak = self.streak_before(direction, now);
        if streak >= self.params.max_consecutive {
            return Evaluation::Blocked {
                gate: "streak",
                reason: format!("{streak} consecutive {direction} signals already emitted"),
            };
        }

        let record = self.build_record(direction, &inputs, now);
        self.consecutive = streak + 1;
        self.last_signal_time = Some(now);
        self.history.push(record.clone());
        debug!(
            direction = %direction,
            consecutive = self.consecutive,
            price = record.price,
            "signal fired"
        );
        Evaluation::Fired(record)
    }

    /// Same-direction signals already in the current streak.
    fn streak_before(&self, direction: SignalDirection, now: i64) -> u32 {
        match self.history.last() {
            Some(last)
                if last.direction == direction
                    && now - last.timestamp
                        <= self.params.streak_gap_intervals * self.interval_seconds =>
            {
                self.consecutive
            }
            _ => 0,
        }
    }

    // -------------------------------------------------------------------------
    // Gates
    // -------------------------------------------------------------------------

    fn check(&self, direction: SignalDirection, inputs: &GateInputs<'_>) -> Result<(), GateFailure> {
        let p = &self.params;
        let l = &inputs.latest;
        // Price-like values are compared after multiplying by `sign`;
        // bounded oscillators are reflected around 50 for SELL.
        let sign = match direction {
            SignalDirection::Buy => 1.0,
            SignalDirection::Sell => -1.0,
        };
        let reflect = |v: f64| match direction {
            SignalDirection::Buy => v,
            SignalDirection::Sell => 100.0 - v,
        };
        let close = inputs.candle.close;

        // Trend
        let fast = require(l.ema_fast, "trend", "ema_fast")?;
        let slow = require(l.ema_slow, "trend", "ema_slow")?;
        let trend = require(l.ema_trend, "trend", "ema_trend")?;
        if !(sign * fast > sign * slow && sign * slow > sign * trend && sign * close > sign * trend) {
            return Err(GateFailure::new(
                "trend",
                format!("ema {fast:.5}/{slow:.5}/{trend:.5} close {close:.5} not stacked"),
            ));
        }

        // Momentum
        let strong_roc = l.roc.is_some_and(|roc| sign * roc > p.min_roc_pct);
        let macd_aligned = match (l.macd, l.macd_signal, l.macd_hist) {
            (Some(m), Some(s), Some(h)) => sign * m > sign * s && sign * h > 0.0,
            _ => false,
        };
        if !(macd_aligned || strong_roc) {
            return Err(GateFailure::new("momentum", "macd not aligned and roc below threshold"));
        }

        // Oscillators
        let rsi = reflect(require(l.rsi, "oscillator", "rsi")?);
        if !(rsi > p.rsi_lower && rsi < p.rsi_upper) {
            return Err(GateFailure::new(
                "oscillator",
                format!("rsi {:.2} outside band", l.rsi.unwrap_or_default()),
            ));
        }
        let k = reflect(require(l.stoch_k, "oscillator", "stoch_k")?);
        let d = reflect(require(l.stoch_d, "oscillator", "stoch_d")?);
        if !(k > d && k > p.stoch_min) {
            return Err(GateFailure::new("oscillator", "stochastic not confirming"));
        }

        // Strength
        if let Some(adx) = l.adx {
            if adx <= p.adx_min {
                return Err(GateFailure::new("strength", format!("adx {adx:.2} <= {}", p.adx_min)));
            }
        }

        // Volume
        let volume = inputs.candle.volume();
        if volume <= inputs.avg_volume * p.min_volume_ratio {
            return Err(GateFailure::new(
                "volume",
                format!("volume ratio {:.2} <= {}", inputs.volume_ratio(), p.min_volume_ratio),
            ));
        }

        // Spike
        let change = inputs.candle.price_change_pct;
        if !(sign * change > p.min_price_change_pct || strong_roc) {
            return Err(GateFailure::new("spike", format!("price change {change:.3}% too small")));
        }

        Ok(())
    }

    fn build_record(&self, direction: SignalDirection, inputs: &GateInputs<'_>, now: i64) -> SignalRecord {
        let l = &inputs.latest;
        let price = inputs.candle.close;
        let atr = l.atr.unwrap_or_default();
        let (stop_loss, take_profit) = match direction {
            SignalDirection::Buy => (
                price - atr * self.params.sl_atr_multiplier,
                price + atr * self.params.tp_atr_multiplier,
            ),
            SignalDirection::Sell => (
                price + atr * self.params.sl_atr_multiplier,
                price - atr * self.params.tp_atr_multiplier,
            ),
        };

        SignalRecord {
            id: Uuid::new_v4(),
            direction,
            price,
            atr,
            rsi: l.rsi.unwrap_or(50.0),
            stoch_k: l.stoch_k.unwrap_or(50.0),
            stoch_d: l.stoch_d.unwrap_or(50.0),
            macd: l.macd.unwrap_or(0.0),
            roc: l.roc.unwrap_or(0.0),
            adx: l.adx.unwrap_or(0.0),
            volume_ratio: inputs.volume_ratio(),
            price_change_pct: inputs.candle.price_change_pct,
            stop_loss,
            take_profit,
            interval_start: inputs.candle.interval_start,
            timestamp: now,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: i64 = 60;
    const WARMUP: usize = 60;

    fn bullish() -> LatestIndicators {
        LatestIndicators {
            ema_fast: Some(100.8),
            ema_slow: Some(100.4),
            ema_trend: Some(100.0),
            macd: Some(0.3),
            macd_signal: Some(0.1),
            macd_hist: Some(0.2),
            rsi: Some(62.0),
            stoch_k: Some(70.0),
            stoch_d: Some(60.0),
            atr: Some(0.4),
            volume_ma: Some(10.0),
            roc: Some(0.4),
            adx: Some(30.0),
        }
    }

    fn bearish() -> LatestIndicators {
        LatestIndicators {
            ema_fast: Some(99.2),
            ema_slow: Some(99.6),
            ema_trend: Some(100.0),
            macd: Some(-0.3),
            macd_signal: Some(-0.1),
            macd_hist: Some(-0.2),
            rsi: Some(38.0),
            stoch_k: Some(30.0),
            stoch_d: Some(40.0),
            atr: Some(0.4),
            volume_ma: Some(10.0),
            roc: Some(-0.4),
            adx: Some(30.0),
        }
    }

    /// Snapshot whose every series is flat at the given latest values.
    fn snapshot_of(latest: LatestIndicators, len: usize) -> IndicatorSnapshot {
        IndicatorSnapshot {
            ema_fast: vec![latest.ema_fast; len],
            ema_slow: vec![latest.ema_slow; len],
            ema_trend: vec![latest.ema_trend; len],
            macd: vec![latest.macd; len],
            macd_signal: vec![latest.macd_signal; len],
            macd_hist: vec![latest.macd_hist; len],
            rsi: vec![latest.rsi; len],
            stoch_k: vec![latest.stoch_k; len],
            stoch_d: vec![latest.stoch_d; len],
            atr: vec![latest.atr; len],
            volume_ma: vec![latest.volume_ma; len],
            roc: vec![latest.roc; len],
            adx: vec![latest.adx; len],
        }
    }

    fn candle(start: i64, open: f64, close: f64, ticks: u64) -> Candle {
        Candle {
            interval_start: start,
            open,
            high: open.max(close) + 0.1,
            low: open.min(close) - 0.1,
            close,
            tick_count: ticks,
            price_change_pct: (close - open) / open * 100.0,
        }
    }

    /// Warm-up history whose newest candle is `last`.
    fn history_ending_with(last: Candle) -> CandleHistory {
        let mut history = CandleHistory::new(500);
        let first = last.interval_start - WARMUP as i64 * INTERVAL;
        for i in 0..WARMUP as i64 {
            history.push(candle(first + i * INTERVAL, 100.0, 100.0, 10)).unwrap();
        }
        history.push(last).unwrap();
        history
    }

    fn evaluator() -> SignalEvaluator {
        SignalEvaluator::new(SignalParams::default(), INTERVAL, 50)
    }

    fn spike_up(start: i64) -> Candle {
        candle(start, 100.0, 101.0, 20)
    }

    fn spike_down(start: i64) -> Candle {
        candle(start, 100.0, 99.0, 20)
    }

    fn run(ev: &mut SignalEvaluator, last: Candle, latest: LatestIndicators) -> Evaluation {
        let history = history_ending_with(last);
        let snapshot = snapshot_of(latest, history.len());
        ev.evaluate(&history, &snapshot)
    }

    // ---- firing -------------------------------------------------------------

    #[test]
    fn bullish_spike_fires_buy_with_levels() {
        let mut ev = evaluator();
        let eval = run(&mut ev, spike_up(6000), bullish());
        let record = eval.fired().expect("buy should fire").clone();
        assert_eq!(record.direction, SignalDirection::Buy);
        assert_eq!(record.price, 101.0);
        assert_eq!(record.timestamp, 6060);
        assert_eq!(record.interval_start, 6000);
        assert!((record.stop_loss - (101.0 - 0.4 * 2.5)).abs() < 1e-10);
        assert!((record.take_profit - (101.0 + 0.4 * 3.5)).abs() < 1e-10);
        assert!((record.volume_ratio - 2.0).abs() < 1e-10);
        assert_eq!(ev.history().len(), 1);
        assert_eq!(ev.consecutive_count(), 1);
    }

    #[test]
    fn bearish_spike_fires_sell_with_mirrored_levels() {
        let mut ev = evaluator();
        let eval = run(&mut ev, spike_down(6000), bearish());
        let record = eval.fired().expect("sell should fire").clone();
        assert_eq!(record.direction, SignalDirection::Sell);
        assert!(record.stop_loss > record.price);
        assert!(record.take_profit < record.price);
    }

    #[test]
    fn sell_disabled_blocks_bearish_spike() {
        let params = SignalParams {
            allow_sell: false,
            ..SignalParams::default()
        };
        let mut ev = SignalEvaluator::new(params, INTERVAL, 50);
        assert!(matches!(
            run(&mut ev, spike_down(6000), bearish()),
            Evaluation::Blocked { gate: "trend", .. }
        ));
    }

    // ---- gates --------------------------------------------------------------

    #[test]
    fn undefined_trend_ema_fails_gate() {
        let mut ev = evaluator();
        let latest = LatestIndicators {
            ema_trend: None,
            ..bullish()
        };
        assert!(matches!(
            run(&mut ev, spike_up(6000), latest),
            Evaluation::Blocked { gate: "trend", .. }
        ));
    }

    #[test]
    fn undefined_core_value_skips() {
        let mut ev = evaluator();
        let latest = LatestIndicators {
            atr: None,
            ..bullish()
        };
        assert!(matches!(run(&mut ev, spike_up(6000), latest), Evaluation::Skipped { .. }));
    }

    #[test]
    fn short_history_skips() {
        let mut ev = SignalEvaluator::new(SignalParams::default(), INTERVAL, 100);
        assert!(matches!(run(&mut ev, spike_up(6000), bullish()), Evaluation::Skipped { .. }));
    }

    #[test]
    fn undefined_adx_does_not_block() {
        let mut ev = evaluator();
        let latest = LatestIndicators {
            adx: None,
            ..bullish()
        };
        assert!(run(&mut ev, spike_up(6000), latest).fired().is_some());
    }

    #[test]
    fn weak_adx_blocks() {
        let mut ev = evaluator();
        let latest = LatestIndicators {
            adx: Some(18.0),
            ..bullish()
        };
        assert!(matches!(
            run(&mut ev, spike_up(6000), latest),
            Evaluation::Blocked { gate: "strength", .. }
        ));
    }

    #[test]
    fn rsi_outside_band_blocks() {
        let mut ev = evaluator();
        let latest = LatestIndicators {
            rsi: Some(80.0),
            ..bullish()
        };
        assert!(matches!(
            run(&mut ev, spike_up(6000), latest),
            Evaluation::Blocked { gate: "oscillator", .. }
        ));
    }

    #[test]
    fn thin_volume_blocks() {
        let mut ev = evaluator();
        assert!(matches!(
            run(&mut ev, candle(6000, 100.0, 101.0, 11), bullish()),
            Evaluation::Blocked { gate: "volume", .. }
        ));
    }

    #[test]
    fn undefined_volume_ma_falls_back_to_current_volume() {
        // Ratio becomes exactly 1.0, which never clears 1.2.
        let mut ev = evaluator();
        let latest = LatestIndicators {
            volume_ma: None,
            ..bullish()
        };
        assert!(matches!(
            run(&mut ev, spike_up(6000), latest),
            Evaluation::Blocked { gate: "volume", .. }
        ));
    }

    #[test]
    fn small_move_without_roc_blocks() {
        let mut ev = evaluator();
        assert!(matches!(
            run(&mut ev, candle(6000, 100.0, 100.2, 20), bullish()),
            Evaluation::Blocked { gate: "spike", .. }
        ));
    }

    #[test]
    fn strong_roc_substitutes_for_spike_and_macd() {
        let mut ev = evaluator();
        let latest = LatestIndicators {
            macd: Some(0.1),
            macd_signal: Some(0.3),
            macd_hist: Some(-0.2),
            roc: Some(1.5),
            ..bullish()
        };
        assert!(run(&mut ev, candle(6000, 100.0, 100.2, 20), latest).fired().is_some());
    }

    // ---- rate limiting ------------------------------------------------------

    #[test]
    fn cooldown_spaces_signals() {
        let mut ev = evaluator();
        let mut history = history_ending_with(spike_up(6000));
        let mut fired = Vec::new();
        for n in 0..4 {
            if n > 0 {
                history.push(spike_up(6000 + n * INTERVAL)).unwrap();
            }
            let snapshot = snapshot_of(bullish(), history.len());
            if let Some(r) = ev.evaluate(&history, &snapshot).fired() {
                fired.push(r.timestamp);
            }
        }
        // Candles close at 6060, 6120, 6180, 6240; cooldown is 120s.
        assert_eq!(fired, vec![6060, 6180]);
        for pair in fired.windows(2) {
            assert!(pair[1] - pair[0] >= 2 * INTERVAL);
        }
    }

    #[test]
    fn fourth_same_direction_signal_is_suppressed() {
        let mut ev = evaluator();
        let mut history = history_ending_with(spike_up(6000));
        let mut outcomes = Vec::new();
        for n in 0..4 {
            if n > 0 {
                // Two intervals apart so the cooldown never interferes.
                history.push(candle(6000 + (2 * n - 1) * INTERVAL, 100.0, 100.0, 10)).unwrap();
                history.push(spike_up(6000 + 2 * n * INTERVAL)).unwrap();
            }
            let snapshot = snapshot_of(bullish(), history.len());
            outcomes.push(ev.evaluate(&history, &snapshot));
        }
        let fired = outcomes.iter().filter(|e| e.fired().is_some()).count();
        assert_eq!(fired, 3);
        assert!(matches!(outcomes[3], Evaluation::Blocked { gate: "streak", .. }));
        assert_eq!(ev.consecutive_count(), 3);
    }

    #[test]
    fn opposite_direction_resets_streak() {
        let mut ev = SignalEvaluator::new(
            SignalParams {
                max_consecutive: 1,
                ..SignalParams::default()
            },
            INTERVAL,
            50,
        );
        let mut history = history_ending_with(spike_up(6000));
        let snap = |h: &CandleHistory, l| snapshot_of(l, h.len());
        assert!(ev.evaluate(&history, &snap(&history, bullish())).fired().is_some());

        history.push(spike_up(6060)).unwrap();
        history.push(spike_up(6120)).unwrap();
        assert!(matches!(
            ev.evaluate(&history, &snap(&history, bullish())),
            Evaluation::Blocked { gate: "streak", .. }
        ));

        history.push(spike_down(6180)).unwrap();
        let sell = ev.evaluate(&history, &snap(&history, bearish()));
        assert_eq!(sell.fired().map(|r| r.direction), Some(SignalDirection::Sell));
        assert_eq!(ev.consecutive_count(), 1);
    }

    #[test]
    fn long_gap_resets_streak() {
        let mut ev = SignalEvaluator::new(
            SignalParams {
                max_consecutive: 1,
                ..SignalParams::default()
            },
            INTERVAL,
            50,
        );
        assert!(run(&mut ev, spike_up(6000), bullish()).fired().is_some());
        // Eleven intervals later the streak has lapsed.
        let later = 6000 + 11 * INTERVAL;
        assert!(run(&mut ev, spike_up(later), bullish()).fired().is_some());
        assert_eq!(ev.history().len(), 2);
    }
}
