// =============================================================================
// Average True Range (ATR) — Wilder's Smoothing Method
// =============================================================================
//
// True Range (TR) for each bar after the first:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
//   ATR[period] = mean(TR[1..=period])
//   ATR[t]      = (ATR[t-1] * (period - 1) + TR[t]) / period
// =============================================================================

use super::Series;

/// True range per bar; index 0 has no previous close and is undefined.
pub fn true_range(highs: &[f64], lows: &[f64], closes: &[f64]) -> Series {
    let len = closes.len().min(highs.len()).min(lows.len());
    let mut out = vec![None; len];
    for i in 1..len {
        let hl = highs[i] - lows[i];
        let hc = (highs[i] - closes[i - 1]).abs();
        let lc = (lows[i] - closes[i - 1]).abs();
        out[i] = Some(hl.max(hc).max(lc));
    }
    out
}

/// Compute the ATR series, aligned with the input.
///
/// Undefined for indices below `period`, and everywhere when fewer than
/// `period + 1` bars exist.
pub fn calculate_atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Series {
    let tr = true_range(highs, lows, closes);
    let mut out = vec![None; tr.len()];
    if period == 0 || tr.len() < period + 1 {
        return out;
    }

    let tr: Vec<f64> = tr.iter().map(|v| v.unwrap_or(0.0)).collect();
    let period_f = period as f64;

    let mut atr = tr[1..=period].iter().sum::<f64>() / period_f;
    out[period] = Some(atr);
    for i in (period + 1)..tr.len() {
        atr = (atr * (period_f - 1.0) + tr[i]) / period_f;
        out[i] = Some(atr);
    }
    out
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn split(bars: &[(f64, f64, f64)]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        (
            bars.iter().map(|b| b.0).collect(),
            bars.iter().map(|b| b.1).collect(),
            bars.iter().map(|b| b.2).collect(),
        )
    }

    #[test]
    fn atr_period_zero() {
        let (h, l, c) = split(&[(105.0, 95.0, 102.0); 20]);
        assert!(calculate_atr(&h, &l, &c, 0).iter().all(Option::is_none));
    }

    #[test]
    fn atr_insufficient_data() {
        let (h, l, c) = split(&[(105.0, 95.0, 102.0); 14]);
        assert!(calculate_atr(&h, &l, &c, 14).iter().all(Option::is_none));
    }

    #[test]
    fn atr_exact_minimum_data() {
        // period=3 needs 4 bars.
        let (h, l, c) = split(&[
            (102.0, 98.0, 101.0),
            (104.0, 99.0, 103.0),
            (106.0, 100.0, 105.0),
            (108.0, 102.0, 107.0),
        ]);
        let atr = calculate_atr(&h, &l, &c, 3);
        assert!(atr[2].is_none());
        // TR = 5, 6, 6
        assert!((atr[3].unwrap() - 17.0 / 3.0).abs() < 1e-10);
    }

    #[test]
    fn atr_true_range_uses_prev_close() {
        // Gap: |115 - 95| = 20 > 115 - 108 = 7
        let (h, l, c) = split(&[(105.0, 95.0, 95.0), (115.0, 108.0, 112.0)]);
        let tr = true_range(&h, &l, &c);
        assert!(tr[0].is_none());
        assert!((tr[1].unwrap() - 20.0).abs() < 1e-10);
    }

    #[test]
    fn atr_matches_wilder_recurrence() {
        let bars: Vec<(f64, f64, f64)> = (0..40)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.5).sin() * 10.0;
                (base + 2.0, base - 2.0, base + 0.5)
            })
            .collect();
        let (h, l, c) = split(&bars);
        let period = 14;
        let atr = calculate_atr(&h, &l, &c, period);
        let tr: Vec<f64> = true_range(&h, &l, &c).iter().map(|v| v.unwrap_or(0.0)).collect();

        let mut expected = tr[1..=period].iter().sum::<f64>() / 14.0;
        assert!((atr[period].unwrap() - expected).abs() < 1e-10);
        for i in (period + 1)..40 {
            expected = (expected * 13.0 + tr[i]) / 14.0;
            assert!((atr[i].unwrap() - expected).abs() < 1e-10, "index {i}");
        }
    }

    #[test]
    fn atr_constant_range_converges() {
        let bars: Vec<(f64, f64, f64)> = (0..30)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.1;
                (base + 5.0, base - 5.0, base)
            })
            .collect();
        let (h, l, c) = split(&bars);
        let atr = calculate_atr(&h, &l, &c, 14);
        let last = atr.last().unwrap().unwrap();
        assert!((last - 10.0).abs() < 1.0, "expected ATR near 10.0, got {last}");
    }
}
