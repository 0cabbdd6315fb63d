// Shared types for the breakout scanner

use serde::{Deserialize, Serialize};
use std::fmt;

/// One OHLCV bucket as returned by the market data source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub timestamp: i64, // bucket open, unix seconds
    pub low: f64,
    pub high: f64,
    pub open: f64,
    pub close: f64,
    pub volume: f64, // base units
}

impl Candle {
    pub fn new(timestamp: i64, low: f64, high: f64, open: f64, close: f64, volume: f64) -> Self {
        Self { timestamp, low, high, open, close, volume }
    }
}

/// Candles for one symbol, ascending by timestamp.
pub type CandleWindow = Vec<Candle>;

/// The three sensitivity bands, fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BandName {
    Fast,
    Medium,
    Slow,
}

impl BandName {
    pub const ALL: [BandName; 3] = [BandName::Fast, BandName::Medium, BandName::Slow];

    pub fn as_str(&self) -> &'static str {
        match self {
            BandName::Fast => "FAST",
            BandName::Medium => "MEDIUM",
            BandName::Slow => "SLOW",
        }
    }
}

impl fmt::Display for BandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for a single band evaluation, resolved for one scan cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandConfig {
    pub name: BandName,
    pub window_size: usize,
    pub breakout_threshold: f64, // fraction, 0.013 = 1.3% over prior high
    pub volume_spike_ratio: f64,
}

/// Diagnostics from one band evaluation. Built once, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandStats {
    pub over_max_pct: f64,
    pub vol: f64,
    pub avg_vol: f64,
    pub vol_mult: f64,
    pub dollars_per_min: f64,
    pub window: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandHit {
    pub band: BandName,
    pub stats: BandStats,
}

/// Outcome of scanning one symbol in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    pub symbol: String,
    pub price: f64,
    pub percent_change: f64,
    pub band_width: f64,
    pub hits: Vec<BandHit>,
}

impl ScanResult {
    pub fn is_breakout(&self) -> bool {
        !self.hits.is_empty()
    }

    pub fn band_names(&self) -> Vec<&'static str> {
        self.hits.iter().map(|h| h.band.as_str()).collect()
    }
}

/// Alert rendering strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertMode {
    Simple,
    Detailed,
}

impl AlertMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "simple" => Some(AlertMode::Simple),
            "detailed" | "pro" => Some(AlertMode::Detailed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertMode::Simple => "simple",
            AlertMode::Detailed => "detailed",
        }
    }
}

/// Scan loop state as seen by the control interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScannerState {
    Running,
    Paused,
}

impl ScannerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScannerState::Running => "running",
            ScannerState::Paused => "paused",
        }
    }
}
