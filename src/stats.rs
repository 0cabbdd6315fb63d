//! Aggregate scan statistics.
//!
//! The scan task is the only writer of counters and observations; the stats
//! task only recomputes derived fields from them. Counters are atomics, the
//! derived block and per-cycle observations sit behind short-lived mutexes.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy)]
struct Observation {
    percent_change: f64,
    usd_volume: f64,
}

#[derive(Debug, Clone)]
struct Derived {
    scan_rate: f64,
    avg_volume: f64,
    top_gainer: String,
}

impl Default for Derived {
    fn default() -> Self {
        Self { scan_rate: 0.0, avg_volume: 0.0, top_gainer: "--".to_string() }
    }
}

#[derive(Default)]
struct Observations {
    // Filled during the cycle in progress.
    current: Vec<(String, Observation)>,
    // Last fully completed cycle; what the stats task reads.
    completed: Vec<(String, Observation)>,
}

pub struct StatsCollector {
    start_time: DateTime<Utc>,
    total_scanned: AtomicU64,
    total_skipped: AtomicU64,
    total_errors: AtomicU64,
    total_alerts: AtomicU64,
    breakouts_today: AtomicU64,
    cycles_completed: AtomicU64,
    observations: Mutex<Observations>,
    derived: Mutex<Derived>,
}

/// Point-in-time copy for the stats query.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total_scanned: u64,
    pub total_skipped: u64,
    pub total_errors: u64,
    pub total_alerts: u64,
    pub breakouts_today: u64,
    pub cycles_completed: u64,
    pub start_time: DateTime<Utc>,
    pub scan_rate: f64,
    pub avg_volume: f64,
    pub top_gainer: String,
    pub uptime: String,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::started_at(Utc::now())
    }

    pub fn started_at(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            total_scanned: AtomicU64::new(0),
            total_skipped: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            total_alerts: AtomicU64::new(0),
            breakouts_today: AtomicU64::new(0),
            cycles_completed: AtomicU64::new(0),
            observations: Mutex::new(Observations::default()),
            derived: Mutex::new(Derived::default()),
        }
    }

    // ── Scan task writers ───────────────────────────────────────────

    /// A symbol produced a window and was evaluated.
    pub fn record_scan(&self, symbol: &str, percent_change: f64, usd_volume: f64) {
        self.total_scanned.fetch_add(1, Ordering::Relaxed);
        self.observations
            .lock()
            .current
            .push((symbol.to_string(), Observation { percent_change, usd_volume }));
    }

    pub fn record_skip(&self) {
        self.total_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert(&self) {
        self.total_alerts.fetch_add(1, Ordering::Relaxed);
        self.breakouts_today.fetch_add(1, Ordering::Relaxed);
    }

    /// Close the cycle: its observations become the input for derived stats.
    pub fn record_cycle(&self) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        let mut obs = self.observations.lock();
        let finished = std::mem::take(&mut obs.current);
        obs.completed = finished;
    }

    /// Drop observations from a cycle that was cut short.
    pub fn discard_cycle(&self) {
        self.observations.lock().current.clear();
    }

    // ── Stats task ──────────────────────────────────────────────────

    /// Recompute derived fields as of `now`.
    pub fn refresh_at(&self, now: DateTime<Utc>) {
        let elapsed = (now - self.start_time).num_seconds().max(1) as f64;
        let scanned = self.total_scanned.load(Ordering::Relaxed) as f64;

        let (avg_volume, top_gainer) = {
            let obs = self.observations.lock();
            let completed = &obs.completed;
            let avg = if completed.is_empty() {
                0.0
            } else {
                completed.iter().map(|(_, o)| o.usd_volume).sum::<f64>() / completed.len() as f64
            };
            let top = completed
                .iter()
                .filter(|(_, o)| o.percent_change.is_finite())
                .max_by(|(_, a), (_, b)| a.percent_change.total_cmp(&b.percent_change))
                .map(|(sym, o)| format!("{} {:+.2}%", sym, o.percent_change))
                .unwrap_or_else(|| "--".to_string());
            (avg, top)
        };

        let mut derived = self.derived.lock();
        derived.scan_rate = scanned / elapsed;
        derived.avg_volume = avg_volume;
        derived.top_gainer = top_gainer;
    }

    pub fn refresh(&self) {
        self.refresh_at(Utc::now());
    }

    // ── Readers ─────────────────────────────────────────────────────

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> StatsSnapshot {
        let derived = self.derived.lock().clone();
        StatsSnapshot {
            total_scanned: self.total_scanned.load(Ordering::Relaxed),
            total_skipped: self.total_skipped.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            total_alerts: self.total_alerts.load(Ordering::Relaxed),
            breakouts_today: self.breakouts_today.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            start_time: self.start_time,
            scan_rate: derived.scan_rate,
            avg_volume: derived.avg_volume,
            top_gainer: derived.top_gainer,
            uptime: format_uptime((now - self.start_time).num_seconds()),
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.snapshot_at(Utc::now())
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// `H:MM:SS`, prefixed with `N day(s), ` once past a day.
pub fn format_uptime(total_secs: i64) -> String {
    let secs = total_secs.max(0);
    let days = secs / 86_400;
    let rem = secs % 86_400;
    let hms = format!("{}:{:02}:{:02}", rem / 3600, (rem % 3600) / 60, rem % 60);
    match days {
        0 => hms,
        1 => format!("1 day, {hms}"),
        n => format!("{n} days, {hms}"),
    }
}
