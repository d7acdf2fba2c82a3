// =============================================================================
// Stochastic Oscillator (slow %K / %D)
// =============================================================================
//
//   raw %K  = 100 * (close - lowest_low) / (highest_high - lowest_low)
//             over the trailing `k_period` candles; 50 when the range is flat
//   slow %K = SMA(raw %K, slow_period)
//   %D      = SMA(slow %K, d_period)
// =============================================================================

use super::sma::sma_of_series;
use super::Series;

#[derive(Debug, Clone, PartialEq)]
pub struct StochasticSeries {
    pub k: Series,
    pub d: Series,
}

pub fn calculate_stochastic(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    k_period: usize,
    d_period: usize,
    slow_period: usize,
) -> StochasticSeries {
    let len = closes.len().min(highs.len()).min(lows.len());
    let mut raw_k: Series = vec![None; len];

    if k_period > 0 && len >= k_period {
        for i in (k_period - 1)..len {
            let window = (i + 1 - k_period)..=i;
            let highest = highs[window.clone()]
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max);
            let lowest = lows[window].iter().copied().fold(f64::INFINITY, f64::min);

            raw_k[i] = Some(if highest == lowest {
                50.0
            } else {
                100.0 * (closes[i] - lowest) / (highest - lowest)
            });
        }
    }

    let k = sma_of_series(&raw_k, slow_period);
    let d = sma_of_series(&k, d_period);
    StochasticSeries { k, d }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_range_defaults_to_fifty() {
        let flat = vec![100.0; 20];
        let s = calculate_stochastic(&flat, &flat, &flat, 10, 3, 3);
        let k: Vec<f64> = s.k.iter().flatten().copied().collect();
        let d: Vec<f64> = s.d.iter().flatten().copied().collect();
        assert!(!k.is_empty() && !d.is_empty());
        assert!(k.iter().chain(&d).all(|v| (v - 50.0).abs() < 1e-12));
    }

    #[test]
    fn alignment_of_smoothed_lines() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let highs: Vec<f64> = closes.iter().map(|c| c + 1.0).collect();
        let lows: Vec<f64> = closes.iter().map(|c| c - 1.0).collect();
        let s = calculate_stochastic(&highs, &lows, &closes, 10, 3, 3);
        assert_eq!(s.k.len(), 30);
        // raw from 9, slow %K from 11, %D from 13.
        assert!(s.k[10].is_none() && s.k[11].is_some());
        assert!(s.d[12].is_none() && s.d[13].is_some());
    }

    #[test]
    fn values_stay_in_range() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + (i as f64 * 0.5).sin() * 4.0).collect();
        let highs: Vec<f64> = closes.iter().map(|c| c + 0.8).collect();
        let lows: Vec<f64> = closes.iter().map(|c| c - 0.8).collect();
        let s = calculate_stochastic(&highs, &lows, &closes, 10, 3, 3);
        for v in s.k.iter().chain(&s.d).flatten() {
            assert!((0.0..=100.0).contains(v), "stochastic {v} out of range");
        }
    }

    #[test]
    fn close_at_high_reads_hundred() {
        let closes: Vec<f64> = (0..20).map(|i| 10.0 + i as f64).collect();
        let highs = closes.clone();
        let lows: Vec<f64> = closes.iter().map(|c| c - 2.0).collect();
        let s = calculate_stochastic(&highs, &lows, &closes, 5, 3, 1);
        assert!((s.k[19].unwrap() - 100.0).abs() < 1e-10);
    }
}
