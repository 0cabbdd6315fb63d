//! Breakout detection
//!
//! A band hits when the last candle closes above the prior local high by
//! `breakout_threshold`, trades more than `volume_spike_ratio` times the prior
//! average volume, and clears the absolute dollar-volume floor. All three must
//! hold at once.

use crate::error::ScanError;
use crate::types::{BandConfig, BandHit, BandStats, Candle};

/// Minimum candles for a meaningful test: at least two prior plus the last.
pub const MIN_WINDOW: usize = 3;

/// Evaluate one band over `window`.
///
/// Returns `(false, None)` for windows shorter than [`MIN_WINDOW`]; otherwise
/// stats are always returned, hit or not.
pub fn evaluate(
    window: &[Candle],
    breakout_threshold: f64,
    volume_spike_ratio: f64,
    usd_floor: f64,
) -> (bool, Option<BandStats>) {
    if window.len() < MIN_WINDOW {
        return (false, None);
    }

    let (prior, last) = window.split_at(window.len() - 1);
    let last = last[0];

    let max_high = prior.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let avg_vol = prior.iter().map(|c| c.volume).sum::<f64>() / prior.len() as f64;
    let last_close = last.close;
    let last_vol = last.volume;
    let usd_per_min = last_vol * last_close;

    let pct_over = if max_high > 0.0 { (last_close / max_high - 1.0) * 100.0 } else { 0.0 };
    let vol_ratio = if avg_vol > 0.0 { last_vol / avg_vol } else { 0.0 };

    // A non-positive prior high or average volume cannot be broken out of.
    let price_break = max_high > 0.0 && last_close > max_high * (1.0 + breakout_threshold);
    let volume_spike = avg_vol > 0.0 && last_vol > avg_vol * volume_spike_ratio;
    let liquid = usd_per_min >= usd_floor;

    let stats = BandStats {
        over_max_pct: pct_over,
        vol: last_vol,
        avg_vol,
        vol_mult: vol_ratio,
        dollars_per_min: usd_per_min,
        window: window.len(),
    };

    (price_break && volume_spike && liquid, Some(stats))
}

/// Run `band` against the tail of `window`.
///
/// A window shorter than the band's size is skipped rather than evaluated on
/// fewer candles.
pub fn evaluate_band(window: &[Candle], band: &BandConfig, usd_floor: f64) -> Option<BandHit> {
    if window.len() < band.window_size {
        return None;
    }
    let tail = &window[window.len() - band.window_size..];
    match evaluate(tail, band.breakout_threshold, band.volume_spike_ratio, usd_floor) {
        (true, Some(stats)) => Some(BandHit { band: band.name, stats }),
        _ => None,
    }
}

/// Percent change from the first close to the last close of the full window.
pub fn percent_change(window: &[Candle]) -> Result<f64, ScanError> {
    let (first, last) = match (window.first(), window.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return Ok(0.0),
    };
    if first.close <= 0.0 {
        return Err(ScanError::InvalidPrice { field: "start close", price: first.close });
    }
    Ok((last.close - first.close) / first.close * 100.0)
}

/// `(max(high) - min(low)) / last_close * 100` over the full window.
///
/// Always computed over the whole lookback, independent of which band hit.
pub fn band_width(window: &[Candle]) -> Result<f64, ScanError> {
    let last = match window.last() {
        Some(c) => c,
        None => return Ok(0.0),
    };
    if last.close <= 0.0 {
        return Err(ScanError::InvalidPrice { field: "last close", price: last.close });
    }
    let high = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let low = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    Ok((high - low) / last.close * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BandName;

    fn candle(high: f64, close: f64, volume: f64) -> Candle {
        Candle::new(0, close.min(high) - 1.0, high, close, close, volume)
    }

    /// Five flat candles followed by a breakout candle.
    fn breakout_window() -> Vec<Candle> {
        let mut w = vec![candle(100.0, 100.0, 10.0); 5];
        w.push(candle(100.0, 103.0, 20.0));
        w
    }

    #[test]
    fn test_short_window_never_hits() {
        for len in 0..MIN_WINDOW {
            let w = vec![candle(100.0, 200.0, 1000.0); len];
            for (thr, ratio) in [(0.0, 0.0), (0.013, 1.3), (-1.0, -1.0)] {
                assert_eq!(evaluate(&w, thr, ratio, 0.0), (false, None));
            }
        }
    }

    #[test]
    fn test_scenario_hit_without_floor() {
        let (hit, stats) = evaluate(&breakout_window(), 0.013, 1.3, 0.0);
        assert!(hit);
        let stats = stats.unwrap();
        assert!((stats.over_max_pct - 3.0).abs() < 1e-9);
        assert_eq!(stats.vol, 20.0);
        assert_eq!(stats.avg_vol, 10.0);
        assert!((stats.vol_mult - 2.0).abs() < 1e-9);
        assert!((stats.dollars_per_min - 2060.0).abs() < 1e-9);
        assert_eq!(stats.window, 6);
    }

    #[test]
    fn test_scenario_floor_blocks_hit() {
        let (hit, stats) = evaluate(&breakout_window(), 0.013, 1.3, 3000.0);
        assert!(!hit);
        // Stats still produced on a miss.
        assert!((stats.unwrap().dollars_per_min - 2060.0).abs() < 1e-9);
    }

    #[test]
    fn test_close_at_prior_high_is_not_breakout() {
        let mut w = vec![candle(100.0, 100.0, 10.0); 5];
        w.push(candle(100.0, 100.0, 50.0));
        for thr in [0.0, 0.001, 0.5] {
            let (hit, stats) = evaluate(&w, thr, 1.0, 0.0);
            assert!(!hit);
            assert_eq!(stats.unwrap().over_max_pct, 0.0);
        }
    }

    #[test]
    fn test_zero_average_volume() {
        let mut w = vec![candle(100.0, 100.0, 0.0); 5];
        w.push(candle(100.0, 110.0, 50.0));
        for ratio in [0.1, 1.0, 3.0] {
            let (hit, stats) = evaluate(&w, 0.01, ratio, 0.0);
            assert!(!hit);
            assert_eq!(stats.unwrap().vol_mult, 0.0);
        }
    }

    #[test]
    fn test_non_positive_prior_high() {
        let mut w = vec![Candle::new(0, 0.0, 0.0, 0.0, 0.0, 10.0); 5];
        w.push(candle(1.0, 1.0, 50.0));
        let (hit, stats) = evaluate(&w, 0.0, 1.0, 0.0);
        assert!(!hit);
        assert_eq!(stats.unwrap().over_max_pct, 0.0);
    }

    #[test]
    fn test_each_condition_is_required() {
        // Price fails: 101 is below 100 * 1.013.
        let mut w = vec![candle(100.0, 100.0, 10.0); 5];
        w.push(candle(101.0, 101.0, 20.0));
        assert!(!evaluate(&w, 0.013, 1.3, 0.0).0);

        // Volume fails: 12 is below 10 * 1.3.
        let mut w = vec![candle(100.0, 100.0, 10.0); 5];
        w.push(candle(103.0, 103.0, 12.0));
        assert!(!evaluate(&w, 0.013, 1.3, 0.0).0);

        // Floor boundary is inclusive: 103 * 20 == 2060.
        assert!(evaluate(&breakout_window(), 0.013, 1.3, 2060.0).0);
        assert!(!evaluate(&breakout_window(), 0.013, 1.3, 2060.01).0);
    }

    #[test]
    fn test_price_and_volume_comparisons_are_strict() {
        // Price at exactly 100 * (1 + 0.5) is not above the threshold.
        let mut w = vec![candle(100.0, 100.0, 10.0); 5];
        w.push(candle(150.0, 150.0, 20.0));
        assert!(!evaluate(&w, 0.5, 1.3, 0.0).0);
        w[5] = candle(150.5, 150.5, 20.0);
        assert!(evaluate(&w, 0.5, 1.3, 0.0).0);

        // Volume 20 against avg 10: ratio 2.0 is equality, 1.99 clears it.
        assert!(!evaluate(&breakout_window(), 0.013, 2.0, 0.0).0);
        assert!(evaluate(&breakout_window(), 0.013, 1.99, 0.0).0);
    }

    #[test]
    fn test_last_candle_excluded_from_prior_stats() {
        // A huge last high must not raise max_high.
        let mut w = vec![candle(100.0, 100.0, 10.0); 4];
        w.push(candle(500.0, 103.0, 1000.0));
        let (_, stats) = evaluate(&w, 0.0, 1.0, 0.0);
        let stats = stats.unwrap();
        assert_eq!(stats.avg_vol, 10.0);
        assert!((stats.over_max_pct - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_evaluate_band_uses_tail_and_skips_short_windows() {
        let band = BandConfig {
            name: BandName::Medium,
            window_size: 6,
            breakout_threshold: 0.013,
            volume_spike_ratio: 1.3,
        };
        // An old spike at the front falls outside the 6-candle tail.
        let mut w = vec![candle(500.0, 500.0, 10.0)];
        w.extend(breakout_window());
        let hit = evaluate_band(&w, &band, 0.0).unwrap();
        assert_eq!(hit.band, BandName::Medium);
        assert_eq!(hit.stats.window, 6);

        let slow = BandConfig { window_size: 20, ..band };
        assert!(evaluate_band(&breakout_window(), &slow, 0.0).is_none());
    }

    #[test]
    fn test_window_metrics() {
        let w = vec![
            Candle::new(0, 95.0, 101.0, 100.0, 100.0, 1.0),
            Candle::new(60, 98.0, 106.0, 100.0, 105.0, 1.0),
        ];
        assert!((percent_change(&w).unwrap() - 5.0).abs() < 1e-9);
        // (106 - 95) / 105 * 100
        assert!((band_width(&w).unwrap() - 11.0 / 105.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_metrics_reject_zero_price() {
        let w = vec![Candle::new(0, 0.0, 1.0, 0.0, 0.0, 1.0), Candle::new(60, 0.0, 1.0, 0.0, 1.0, 1.0)];
        assert!(percent_change(&w).is_err());
        let w = vec![Candle::new(0, 0.0, 1.0, 1.0, 1.0, 1.0), Candle::new(60, 0.0, 1.0, 0.0, 0.0, 1.0)];
        assert!(band_width(&w).is_err());
    }
}
