// =============================================================================
// Indicator Engine — one snapshot per finalized candle
// =============================================================================
//
// Recomputes every indicator from the full candle history.  Nothing is
// carried between calls: the snapshot is a pure function of the history and
// the configured periods, so two calls over the same history are identical.
// =============================================================================

use anyhow::{bail, Result};
use serde::Serialize;

use super::adx::calculate_adx;
use super::atr::calculate_atr;
use super::ema::calculate_ema;
use super::last_value;
use super::macd::calculate_macd;
use super::roc::calculate_roc;
use super::rsi::calculate_rsi;
use super::sma::calculate_sma;
use super::stochastic::calculate_stochastic;
use super::Series;
use crate::market_data::CandleHistory;
use crate::runtime_config::IndicatorParams;

/// Every indicator series, aligned with the history it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSnapshot {
    pub ema_fast: Series,
    pub ema_slow: Series,
    pub ema_trend: Series,
    pub macd: Series,
    pub macd_signal: Series,
    pub macd_hist: Series,
    pub rsi: Series,
    pub stoch_k: Series,
    pub stoch_d: Series,
    pub atr: Series,
    pub volume_ma: Series,
    pub roc: Series,
    pub adx: Series,
}

/// Values at the newest candle.  `None` means not enough history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatestIndicators {
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub ema_trend: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_hist: Option<f64>,
    pub rsi: Option<f64>,
    pub stoch_k: Option<f64>,
    pub stoch_d: Option<f64>,
    pub atr: Option<f64>,
    pub volume_ma: Option<f64>,
    pub roc: Option<f64>,
    pub adx: Option<f64>,
}

impl LatestIndicators {
    fn named(&self) -> [(&'static str, Option<f64>); 13] {
        [
            ("ema_fast", self.ema_fast),
            ("ema_slow", self.ema_slow),
            ("ema_trend", self.ema_trend),
            ("macd", self.macd),
            ("macd_signal", self.macd_signal),
            ("macd_hist", self.macd_hist),
            ("rsi", self.rsi),
            ("stoch_k", self.stoch_k),
            ("stoch_d", self.stoch_d),
            ("atr", self.atr),
            ("volume_ma", self.volume_ma),
            ("roc", self.roc),
            ("adx", self.adx),
        ]
    }
}

impl IndicatorSnapshot {
    pub fn latest(&self) -> LatestIndicators {
        LatestIndicators {
            ema_fast: last_value(&self.ema_fast),
            ema_slow: last_value(&self.ema_slow),
            ema_trend: last_value(&self.ema_trend),
            macd: last_value(&self.macd),
            macd_signal: last_value(&self.macd_signal),
            macd_hist: last_value(&self.macd_hist),
            rsi: last_value(&self.rsi),
            stoch_k: last_value(&self.stoch_k),
            stoch_d: last_value(&self.stoch_d),
            atr: last_value(&self.atr),
            volume_ma: last_value(&self.volume_ma),
            roc: last_value(&self.roc),
            adx: last_value(&self.adx),
        }
    }
}

// =============================================================================
// IndicatorEngine
// =============================================================================

#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    params: IndicatorParams,
}

impl IndicatorEngine {
    pub fn new(params: IndicatorParams) -> Self {
        Self { params }
    }

    /// Recompute the full snapshot from `history`.
    ///
    /// Fails only when the newest value of some indicator is not finite,
    /// which points at corrupt input rather than short history.
    pub fn compute(&self, history: &CandleHistory) -> Result<IndicatorSnapshot> {
        let p = &self.params;
        let closes = history.closes();
        let highs = history.highs();
        let lows = history.lows();
        let volumes = history.volumes();

        let macd = calculate_macd(&closes, p.macd_fast, p.macd_slow, p.macd_signal);
        let stoch = calculate_stochastic(&highs, &lows, &closes, p.stoch_k, p.stoch_d, p.stoch_slow);

        let snapshot = IndicatorSnapshot {
            ema_fast: calculate_ema(&closes, p.ema_fast),
            ema_slow: calculate_ema(&closes, p.ema_slow),
            ema_trend: calculate_ema(&closes, p.ema_trend),
            macd: macd.macd,
            macd_signal: macd.signal,
            macd_hist: macd.histogram,
            rsi: calculate_rsi(&closes, p.rsi),
            stoch_k: stoch.k,
            stoch_d: stoch.d,
            atr: calculate_atr(&highs, &lows, &closes, p.atr),
            volume_ma: calculate_sma(&volumes, p.volume_ma),
            roc: calculate_roc(&closes, p.roc),
            adx: calculate_adx(&highs, &lows, p.adx),
        };

        for (name, value) in snapshot.latest().named() {
            if let Some(v) = value {
                if !v.is_finite() {
                    bail!("indicator {name} produced a non-finite value ({v})");
                }
            }
        }

        Ok(snapshot)
    }
}
