use anyhow::{bail, Context, Result};
use serde_json::{json, Map, Value};
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::dispatch::DEFAULT_TELEGRAM_URL;
use crate::market_data::DEFAULT_BASE_URL;
use crate::settings::{BandWindows, RuntimeSettings};

/// Default universe when neither `SYMBOLS` nor `SYMBOLS_FILE` is set.
const DEFAULT_SYMBOLS: &[&str] = &[
    "BTC-USD", "ETH-USD", "SOL-USD", "XRP-USD", "ADA-USD", "AVAX-USD", "DOGE-USD", "DOT-USD",
    "LINK-USD", "LTC-USD", "BCH-USD", "NEAR-USD", "ATOM-USD", "UNI-USD", "AAVE-USD", "ARB-USD",
    "OP-USD", "SUI-USD", "APT-USD", "INJ-USD", "FET-USD", "RENDER-USD", "TIA-USD", "SEI-USD",
    "PEPE-USD", "SHIB-USD", "BONK-USD", "WIF-USD", "HBAR-USD", "XLM-USD", "FIL-USD", "ICP-USD",
];

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: String,
    pub port: u16,
    pub symbols: Vec<String>,
    pub market_data_url: String,
    pub telegram_url: String,
    pub candle_interval_secs: u64,
    pub windows: BandWindows,
    pub lookback: usize,
    pub http_timeout: Duration,
    pub stats_interval: Duration,
    pub pause_poll: Duration,
    /// Starting point for the runtime-tunable settings.
    pub initial_settings: RuntimeSettings,
}

fn env_str(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env_opt(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{name}: cannot parse {raw:?}")),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let windows = BandWindows {
            fast: env_parse("CANDLE_COUNT_FAST", 10)?,
            medium: env_parse("CANDLE_COUNT_MEDIUM", 15)?,
            slow: env_parse("CANDLE_COUNT_SLOW", 20)?,
        };
        let lookback = env_parse("LOOKBACK_CANDLES", windows.largest())?;

        let symbols = match env_opt("SYMBOLS_FILE") {
            Some(path) => load_symbols_file(Path::new(&path))?,
            None => match env_opt("SYMBOLS") {
                Some(list) => list.split(',').map(str::to_string).collect(),
                None => DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            },
        };

        let cfg = Self {
            bind: env_str("BIND", "0.0.0.0"),
            port: env_parse("PORT", 5000)?,
            symbols: normalize_symbols(symbols),
            market_data_url: env_str("MARKET_DATA_URL", DEFAULT_BASE_URL),
            telegram_url: env_str("TELEGRAM_API_URL", DEFAULT_TELEGRAM_URL),
            candle_interval_secs: env_parse("CANDLE_INTERVAL", 60)?,
            windows,
            lookback,
            http_timeout: Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 10)?),
            stats_interval: Duration::from_secs(env_parse("STATS_INTERVAL_SECS", 5)?),
            pause_poll: Duration::from_millis(env_parse("PAUSE_POLL_MS", 1000)?),
            initial_settings: initial_settings_from_env()?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let w = &self.windows;
        if w.fast < 3 {
            bail!("band windows must be at least 3 candles (fast={})", w.fast);
        }
        if !(w.fast < w.medium && w.medium < w.slow) {
            bail!("band windows must strictly increase: fast={} medium={} slow={}", w.fast, w.medium, w.slow);
        }
        if self.lookback < w.largest() {
            bail!("LOOKBACK_CANDLES={} is shorter than the slow band ({})", self.lookback, w.largest());
        }
        if self.candle_interval_secs == 0 {
            bail!("CANDLE_INTERVAL must be positive");
        }
        if self.symbols.is_empty() {
            bail!("symbol universe is empty");
        }
        Ok(())
    }
}

/// Build the starting settings by running env values through the same
/// validator used for runtime updates.
fn initial_settings_from_env() -> Result<RuntimeSettings> {
    let mut patch = Map::new();
    let keys = [
        ("SCAN_INTERVAL", "scan_interval"),
        ("ABS_VOL_MIN_USD", "volume_floor"),
        ("ALERT_MODE", "alert_mode"),
        ("FAST_THRESHOLD", "fast_threshold"),
        ("MEDIUM_THRESHOLD", "medium_threshold"),
        ("SLOW_THRESHOLD", "slow_threshold"),
        ("FAST_RATIO", "fast_ratio"),
        ("MEDIUM_RATIO", "medium_ratio"),
        ("SLOW_RATIO", "slow_ratio"),
        ("DISCORD_WEBHOOK", "discord_webhook"),
        ("TELEGRAM_BOT_TOKEN", "telegram_token"),
        ("TELEGRAM_CHAT_ID", "telegram_chat_id"),
    ];
    for (var, key) in keys {
        if let Some(raw) = env_opt(var) {
            patch.insert(key.to_string(), Value::String(raw));
        }
    }
    // Legacy switch: SIMPLE_MODE=0 selects the detailed rendering.
    if !patch.contains_key("alert_mode") {
        if let Some(flag) = env_opt("SIMPLE_MODE") {
            let mode = if flag == "0" { "detailed" } else { "simple" };
            patch.insert("alert_mode".to_string(), json!(mode));
        }
    }
    RuntimeSettings::default()
        .with_updates(&patch)
        .context("invalid initial scanner settings in environment")
}

/// Symbols file: a JSON array of product ids.
fn load_symbols_file(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let symbols: Vec<String> =
        serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON array of symbols", path.display()))?;
    Ok(symbols)
}

/// Trim, uppercase, drop blanks and later duplicates; keeps first-seen order.
pub fn normalize_symbols(raw: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for s in raw {
        let s = s.trim().to_ascii_uppercase();
        if !s.is_empty() && !out.contains(&s) {
            out.push(s);
        }
    }
    out
}
