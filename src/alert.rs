//! Alert message rendering.
//!
//! Pure and deterministic: the caller supplies the timestamp.

use chrono::{DateTime, Utc};

use crate::types::{AlertMode, BandHit, ScanResult};

const HEADER: &str = "🚨 **BREAKOUT DETECTED** 🚨";

/// Render one alert for a symbol with at least one band hit.
pub fn compose(result: &ScanResult, mode: AlertMode, candle_interval_secs: u64, at: DateTime<Utc>) -> String {
    match mode {
        AlertMode::Simple => compose_simple(result, at),
        AlertMode::Detailed => compose_detailed(result, candle_interval_secs, at),
    }
}

fn compose_simple(result: &ScanResult, at: DateTime<Utc>) -> String {
    let bands = if result.hits.is_empty() {
        "—".to_string()
    } else {
        result.band_names().join(", ")
    };
    [
        HEADER.to_string(),
        format!("**Pair**: `{}`", result.symbol),
        format!("**Δ**: `{:.2}%` | **W**: `{:.2}%`", result.percent_change, result.band_width),
        format!("**Bands**: {}", bands),
        time_line(at),
    ]
    .join("\n")
}

fn compose_detailed(result: &ScanResult, candle_interval_secs: u64, at: DateTime<Utc>) -> String {
    let mut lines = vec![
        HEADER.to_string(),
        format!("**Pair**: `{}`", result.symbol),
        format!("**Price**: `${:.8}`", result.price),
        format!("**Δ**: `{:.2}%`  |  **W**: `{:.2}%`", result.percent_change, result.band_width),
        format!("**Candle**: `{}s`", candle_interval_secs),
    ];
    lines.extend(result.hits.iter().map(band_line));
    lines.push(time_line(at));
    lines.join("\n")
}

fn band_line(hit: &BandHit) -> String {
    let s = &hit.stats;
    format!(
        "• **{}** (n={}): over max by `{:.2}%`, vol `{:.0}` vs avg `{:.0}` (x`{:.2}`), `${}/min`",
        hit.band, s.window, s.over_max_pct, s.vol, s.avg_vol, s.vol_mult, thousands(s.dollars_per_min)
    )
}

fn time_line(at: DateTime<Utc>) -> String {
    format!("**Time**: {}", at.format("%H:%M:%S UTC"))
}

/// Round to whole units and group digits with commas: 1234567.8 -> "1,234,568".
fn thousands(value: f64) -> String {
    let rounded = format!("{:.0}", value);
    let (sign, digits) = match rounded.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", rounded.as_str()),
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    format!("{}{}", sign, out)
}
