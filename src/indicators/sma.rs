// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================

use super::Series;

/// Trailing mean over `period` values, aligned with the input.
///
/// Indices before `period - 1` are undefined.
pub fn calculate_sma(values: &[f64], period: usize) -> Series {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        out[i] = Some(window.iter().sum::<f64>() / period as f64);
    }
    out
}

/// Trailing mean over an aligned series. An index is defined only when the
/// whole window is defined.
pub fn sma_of_series(series: &[Option<f64>], period: usize) -> Series {
    let mut out = vec![None; series.len()];
    if period == 0 || series.len() < period {
        return out;
    }
    for i in (period - 1)..series.len() {
        let window = &series[i + 1 - period..=i];
        let sum: Option<f64> = window.iter().copied().sum();
        out[i] = sum.map(|s| s / period as f64);
    }
    out
}
