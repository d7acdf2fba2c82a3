// =============================================================================
// Rate of Change (ROC) — Momentum Indicator
// =============================================================================
//
// ROC measures the percentage change in price over a look-back period:
//   ROC = ((close - close_n) / close_n) * 100
//
// Positive ROC indicates upward momentum; negative indicates downward.

use super::Series;

/// Calculate ROC aligned with `closes`; undefined below index `period` and
/// wherever the base close is zero.
pub fn calculate_roc(closes: &[f64], period: usize) -> Series {
    let mut out = vec![None; closes.len()];
    if period == 0 {
        return out;
    }
    for i in period..closes.len() {
        let prev = closes[i - period];
        if prev != 0.0 {
            out[i] = Some((closes[i] - prev) / prev * 100.0);
        }
    }
    out
}
