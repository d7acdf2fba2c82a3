// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The value at index `period - 1` is seeded with the SMA of the first
// `period` values; earlier indices are undefined.
// =============================================================================

use super::Series;

/// Compute the EMA series for `values` and look-back `period`.
///
/// The output has the same length as the input.
///
/// # Edge cases
/// - `period == 0` => every index undefined
/// - `values.len() < period` => every index undefined
pub fn calculate_ema(values: &[f64], period: usize) -> Series {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let multiplier = 2.0 / (period + 1) as f64;

    // Seed: SMA of the first `period` values.
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(seed);

    let mut prev_ema = seed;
    for (i, &value) in values.iter().enumerate().skip(period) {
        let ema = value * multiplier + prev_ema * (1.0 - multiplier);
        out[i] = Some(ema);
        prev_ema = ema;
    }

    out
}

/// EMA over the defined run of an already-aligned series.
///
/// Leading undefined entries are skipped; the EMA is seeded from the first
/// `period` defined values.  A hole after the defined run starts ends the
/// output there.
pub fn ema_of_series(series: &[Option<f64>], period: usize) -> Series {
    let mut out = vec![None; series.len()];
    let Some(start) = series.iter().position(Option::is_some) else {
        return out;
    };

    let defined: Vec<f64> = series[start..].iter().map_while(|v| *v).collect();
    for (offset, value) in calculate_ema(&defined, period).into_iter().enumerate() {
        out[start + offset] = value;
    }
    out
}
