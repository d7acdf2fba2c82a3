// =============================================================================
// Moving Average Convergence / Divergence (MACD)
// =============================================================================
//
//   macd      = EMA(fast) - EMA(slow)
//   signal    = EMA(macd, signal_period)
//   histogram = macd - signal
//
// Every index below `slow + signal_period - 1` is undefined, at any history
// length, so a series computed over a prefix matches the full series.
// =============================================================================

use super::ema::{calculate_ema, ema_of_series};
use super::Series;

/// The three aligned MACD series.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub macd: Series,
    pub signal: Series,
    pub histogram: Series,
}

impl MacdSeries {
    fn undefined(len: usize) -> Self {
        Self {
            macd: vec![None; len],
            signal: vec![None; len],
            histogram: vec![None; len],
        }
    }
}

pub fn calculate_macd(
    closes: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> MacdSeries {
    let len = closes.len();
    if fast_period == 0 || slow_period == 0 || signal_period == 0 {
        return MacdSeries::undefined(len);
    }
    let first_defined = slow_period + signal_period - 1;
    if len <= first_defined {
        return MacdSeries::undefined(len);
    }

    let fast = calculate_ema(closes, fast_period);
    let slow = calculate_ema(closes, slow_period);

    let mut macd: Series = fast
        .iter()
        .zip(&slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let mut signal = ema_of_series(&macd, signal_period);
    let mut histogram: Series = macd
        .iter()
        .zip(&signal)
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect();

    for series in [&mut macd, &mut signal, &mut histogram] {
        series[..first_defined].fill(None);
    }

    MacdSeries {
        macd,
        signal,
        histogram,
    }
}
