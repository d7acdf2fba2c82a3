// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators used by the signal
// evaluator.  Every series is aligned index-for-index with the candle history
// it was computed from; indices without enough history hold `None`, which the
// evaluator treats as "condition fails", never as zero.

pub mod adx;
pub mod atr;
pub mod ema;
pub mod engine;
pub mod macd;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod stochastic;

pub use engine::{IndicatorEngine, IndicatorSnapshot, LatestIndicators};

/// An indicator series aligned with the candle history.
pub type Series = Vec<Option<f64>>;

/// Most recent value of a series, if defined.
pub fn last_value(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten()
}
