//! Runtime-reconfigurable scanner settings.
//!
//! The live settings are an immutable [`RuntimeSettings`] behind an `Arc`.
//! Readers clone the `Arc` and keep a consistent snapshot for as long as they
//! need it; writers validate a full replacement and swap it in under the
//! write lock, so an update is either applied completely or not at all.

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::error::SettingsError;
use crate::types::{AlertMode, BandConfig, BandName};

/// One complete settings snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeSettings {
    pub scan_interval: u64, // seconds between cycles
    pub volume_floor: f64,  // USD per candle
    pub alert_mode: AlertMode,
    pub fast_threshold: f64,
    pub medium_threshold: f64,
    pub slow_threshold: f64,
    pub fast_ratio: f64,
    pub medium_ratio: f64,
    pub slow_ratio: f64,
    pub discord_webhook: String,
    pub telegram_token: String,
    pub telegram_chat_id: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            scan_interval: 2,
            volume_floor: 2000.0,
            alert_mode: AlertMode::Simple,
            fast_threshold: 0.013,
            medium_threshold: 0.018,
            slow_threshold: 0.024,
            fast_ratio: 1.3,
            medium_ratio: 1.7,
            slow_ratio: 2.2,
            discord_webhook: String::new(),
            telegram_token: String::new(),
            telegram_chat_id: String::new(),
        }
    }
}

impl RuntimeSettings {
    /// `(breakout_threshold, volume_spike_ratio)` for a band.
    pub fn band_params(&self, band: BandName) -> (f64, f64) {
        match band {
            BandName::Fast => (self.fast_threshold, self.fast_ratio),
            BandName::Medium => (self.medium_threshold, self.medium_ratio),
            BandName::Slow => (self.slow_threshold, self.slow_ratio),
        }
    }

    /// Resolve the three bands for one cycle from fixed window sizes.
    pub fn band_configs(&self, windows: &BandWindows) -> [BandConfig; 3] {
        BandName::ALL.map(|name| {
            let (breakout_threshold, volume_spike_ratio) = self.band_params(name);
            BandConfig {
                name,
                window_size: windows.size(name),
                breakout_threshold,
                volume_spike_ratio,
            }
        })
    }

    pub fn webhook_enabled(&self) -> bool {
        !self.discord_webhook.is_empty()
    }

    pub fn telegram_enabled(&self) -> bool {
        !self.telegram_token.is_empty() && !self.telegram_chat_id.is_empty()
    }

    /// Flat key/value view, as served to the dashboard.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Apply a partial update to a copy of `self`, validating every field.
    ///
    /// Returns the new snapshot, or the first validation failure. `self` is
    /// never touched.
    pub fn with_updates(&self, patch: &Map<String, Value>) -> Result<Self, SettingsError> {
        let mut next = self.clone();
        for (key, value) in patch {
            match key.as_str() {
                "scan_interval" => {
                    let secs = as_u64(key, value)?;
                    if secs == 0 {
                        return Err(out_of_range(key, "must be at least 1 second"));
                    }
                    next.scan_interval = secs;
                }
                "volume_floor" => next.volume_floor = non_negative(key, value)?,
                "alert_mode" => {
                    let raw = as_str(key, value)?;
                    next.alert_mode = AlertMode::parse(raw).ok_or_else(|| SettingsError::InvalidType {
                        key: key.clone(),
                        expected: "one of simple|detailed",
                    })?;
                }
                "fast_threshold" => next.fast_threshold = non_negative(key, value)?,
                "medium_threshold" => next.medium_threshold = non_negative(key, value)?,
                "slow_threshold" => next.slow_threshold = non_negative(key, value)?,
                "fast_ratio" => next.fast_ratio = non_negative(key, value)?,
                "medium_ratio" => next.medium_ratio = non_negative(key, value)?,
                "slow_ratio" => next.slow_ratio = non_negative(key, value)?,
                "discord_webhook" => {
                    let raw = as_str(key, value)?.trim();
                    if !raw.is_empty() {
                        validate_url(key, raw)?;
                    }
                    next.discord_webhook = raw.to_string();
                }
                "telegram_token" => next.telegram_token = as_str(key, value)?.trim().to_string(),
                "telegram_chat_id" => next.telegram_chat_id = as_chat_id(key, value)?,
                _ => return Err(SettingsError::UnknownKey(key.clone())),
            }
        }
        Ok(next)
    }
}

/// Fixed per-band window sizes (startup configuration, not runtime-tunable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandWindows {
    pub fast: usize,
    pub medium: usize,
    pub slow: usize,
}

impl Default for BandWindows {
    fn default() -> Self {
        Self { fast: 10, medium: 15, slow: 20 }
    }
}

impl BandWindows {
    pub fn size(&self, band: BandName) -> usize {
        match band {
            BandName::Fast => self.fast,
            BandName::Medium => self.medium,
            BandName::Slow => self.slow,
        }
    }

    pub fn largest(&self) -> usize {
        self.fast.max(self.medium).max(self.slow)
    }
}

/// Shared holder of the current settings snapshot.
pub struct SettingsStore {
    current: RwLock<Arc<RuntimeSettings>>,
}

impl SettingsStore {
    pub fn new(initial: RuntimeSettings) -> Self {
        Self { current: RwLock::new(Arc::new(initial)) }
    }

    /// The snapshot in force right now.
    pub fn snapshot(&self) -> Arc<RuntimeSettings> {
        self.current.read().clone()
    }

    /// Validate and publish a partial update. On error nothing changes.
    pub fn update(&self, patch: &Map<String, Value>) -> Result<Arc<RuntimeSettings>, SettingsError> {
        // Hold the write lock across read-modify-write so concurrent updates
        // cannot overwrite each other's fields.
        let mut guard = self.current.write();
        let next = Arc::new(guard.with_updates(patch)?);
        *guard = Arc::clone(&next);
        drop(guard);

        let keys: Vec<&str> = patch.keys().map(String::as_str).collect();
        info!(keys = ?keys, "Settings updated");
        Ok(next)
    }
}

fn out_of_range(key: &str, reason: &str) -> SettingsError {
    SettingsError::OutOfRange { key: key.to_string(), reason: reason.to_string() }
}

fn as_str<'a>(key: &str, value: &'a Value) -> Result<&'a str, SettingsError> {
    value.as_str().ok_or_else(|| SettingsError::InvalidType { key: key.to_string(), expected: "a string" })
}

// Dashboard forms post numbers as strings; accept both.
fn as_f64(key: &str, value: &Value) -> Result<f64, SettingsError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(SettingsError::InvalidType { key: key.to_string(), expected: "a finite number" }),
    }
}

fn as_u64(key: &str, value: &Value) -> Result<u64, SettingsError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| SettingsError::InvalidType { key: key.to_string(), expected: "a non-negative integer" })
}

fn non_negative(key: &str, value: &Value) -> Result<f64, SettingsError> {
    let v = as_f64(key, value)?;
    if v < 0.0 {
        return Err(out_of_range(key, "must be >= 0"));
    }
    Ok(v)
}

// Telegram chat ids are often negative integers (channels); keep them as text.
fn as_chat_id(key: &str, value: &Value) -> Result<String, SettingsError> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        _ => Err(SettingsError::InvalidType { key: key.to_string(), expected: "a string or integer" }),
    }
}

fn validate_url(key: &str, raw: &str) -> Result<(), SettingsError> {
    let url = Url::parse(raw).map_err(|e| SettingsError::InvalidUrl { key: key.to_string(), reason: e.to_string() })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(SettingsError::InvalidUrl {
            key: key.to_string(),
            reason: format!("unsupported scheme {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    fn patch(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("patch must be an object"),
        }
    }

    #[test]
    fn test_partial_update_applies_typed_values() {
        let store = SettingsStore::new(RuntimeSettings::default());
        let next = store
            .update(&patch(json!({
                "scan_interval": "5",
                "volume_floor": 1500,
                "alert_mode": "detailed",
                "fast_ratio": "1.9",
                "telegram_chat_id": -100123,
            })))
            .unwrap();

        assert_eq!(next.scan_interval, 5);
        assert_eq!(next.volume_floor, 1500.0);
        assert_eq!(next.alert_mode, AlertMode::Detailed);
        assert_eq!(next.fast_ratio, 1.9);
        assert_eq!(next.telegram_chat_id, "-100123");
        // Untouched fields keep their previous values.
        assert_eq!(next.slow_threshold, 0.024);
        assert_eq!(*store.snapshot(), *next);
    }

    #[test]
    fn test_rejected_update_leaves_everything_unchanged() {
        let store = SettingsStore::new(RuntimeSettings::default());
        let before = store.snapshot();

        let cases = [
            json!({ "fast_threshold": 0.02, "scan_interval": 0 }),
            json!({ "volume_floor": -1.0 }),
            json!({ "scan_interval": 2.5 }),
            json!({ "alert_mode": "loud" }),
            json!({ "medium_ratio": "abc" }),
            json!({ "discord_webhook": "not a url" }),
            json!({ "discord_webhook": "ftp://example.com/hook" }),
            json!({ "fast_ratio": 2.0, "shiny_new_knob": 1 }),
            json!({ "telegram_token": 42 }),
        ];
        for case in cases {
            assert!(store.update(&patch(case.clone())).is_err(), "accepted {case}");
            assert_eq!(*store.snapshot(), *before);
        }
    }

    #[test]
    fn test_error_names_offending_key() {
        let store = SettingsStore::new(RuntimeSettings::default());
        let err = store.update(&patch(json!({ "slow_ratio": -2 }))).unwrap_err();
        assert_eq!(
            err,
            SettingsError::OutOfRange { key: "slow_ratio".to_string(), reason: "must be >= 0".to_string() }
        );
    }

    #[test]
    fn test_band_configs_follow_snapshot() {
        let settings = RuntimeSettings { medium_threshold: 0.05, ..Default::default() };
        let bands = settings.band_configs(&BandWindows::default());
        assert_eq!(bands[0].name, BandName::Fast);
        assert_eq!(bands[0].window_size, 10);
        assert_eq!(bands[1].breakout_threshold, 0.05);
        assert_eq!(bands[2].volume_spike_ratio, 2.2);
        assert_eq!(BandWindows::default().largest(), 20);
    }

    #[test]
    fn test_channel_enablement() {
        let mut s = RuntimeSettings::default();
        assert!(!s.webhook_enabled());
        assert!(!s.telegram_enabled());
        s.telegram_token = "abc".into();
        assert!(!s.telegram_enabled());
        s.telegram_chat_id = "1".into();
        assert!(s.telegram_enabled());
    }

    #[test]
    fn test_map_view_has_recognised_keys() {
        let map = RuntimeSettings::default().to_map();
        for key in [
            "scan_interval",
            "volume_floor",
            "alert_mode",
            "fast_threshold",
            "medium_threshold",
            "slow_threshold",
            "fast_ratio",
            "medium_ratio",
            "slow_ratio",
            "discord_webhook",
            "telegram_token",
            "telegram_chat_id",
        ] {
            assert!(map.contains_key(key), "missing {key}");
        }
        assert_eq!(map["alert_mode"], json!("simple"));
    }

    #[test]
    fn test_concurrent_readers_never_see_a_mix() {
        // Writers flip between two self-consistent snapshots; every field of a
        // snapshot must come from the same one.
        let store = Arc::new(SettingsStore::new(RuntimeSettings::default()));
        let a = patch(json!({ "scan_interval": 3, "fast_threshold": 0.03, "slow_ratio": 3.0 }));
        let b = patch(json!({ "scan_interval": 7, "fast_threshold": 0.07, "slow_ratio": 7.0 }));
        store.update(&a).unwrap();

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..2000 {
                    store.update(if i % 2 == 0 { &b } else { &a }).unwrap();
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..2000 {
                        let s = store.snapshot();
                        let k = s.scan_interval as f64;
                        assert_eq!(s.fast_threshold, k / 100.0);
                        assert_eq!(s.slow_ratio, k);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}
