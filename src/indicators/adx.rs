// =============================================================================
// Average Directional Index (ADX) — simplified
// =============================================================================
//
// ADX quantifies trend **strength** regardless of direction.
//
// Calculation pipeline:
//   1. up = H[t] - H[t-1], down = L[t-1] - L[t]
//      +DM = up   when up > down and up > 0, else 0
//      -DM = down when down > up and down > 0, else 0
//   2. +DI = SMA(+DM, period), -DI = SMA(-DM, period)
//   3. DX  = 100 * |+DI - -DI| / (+DI + -DI), 0 when the sum is 0
//   4. ADX = SMA(DX, period)
//
// No true-range normalisation is applied to the DI legs.
//
// Interpretation:
//   ADX > 25  => trending market
//   ADX < 20  => ranging / choppy market
// =============================================================================

use super::sma::sma_of_series;
use super::Series;

/// Directional movement per bar; index 0 has no predecessor.
pub fn directional_movement(highs: &[f64], lows: &[f64]) -> (Series, Series) {
    let len = highs.len().min(lows.len());
    let mut plus = vec![None; len];
    let mut minus = vec![None; len];
    for i in 1..len {
        let up = highs[i] - highs[i - 1];
        let down = lows[i - 1] - lows[i];
        plus[i] = Some(if up > down && up > 0.0 { up } else { 0.0 });
        minus[i] = Some(if down > up && down > 0.0 { down } else { 0.0 });
    }
    (plus, minus)
}

/// Compute the ADX series, aligned with the input.
///
/// Defined from index `2 * period - 1`; undefined everywhere when fewer
/// than `2 * period` bars exist.
pub fn calculate_adx(highs: &[f64], lows: &[f64], period: usize) -> Series {
    let len = highs.len().min(lows.len());
    if period == 0 || len < 2 * period {
        return vec![None; len];
    }

    let (plus_dm, minus_dm) = directional_movement(highs, lows);
    let plus_di = sma_of_series(&plus_dm, period);
    let minus_di = sma_of_series(&minus_dm, period);

    let dx: Series = plus_di
        .iter()
        .zip(&minus_di)
        .map(|(p, m)| {
            let (p, m) = ((*p)?, (*m)?);
            let sum = p + m;
            Some(if sum > 0.0 { 100.0 * (p - m).abs() / sum } else { 0.0 })
        })
        .collect();

    sma_of_series(&dx, period)
}
