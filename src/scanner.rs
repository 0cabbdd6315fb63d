//! Scan loop: fetch → evaluate bands → compose → dispatch, for every symbol,
//! every cycle.
//!
//! One long-lived task runs cycles back to back; cycles never overlap. The
//! RUNNING/PAUSED toggle and shutdown are checked before each symbol and
//! before sleeping, never in the middle of a symbol.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::alert;
use crate::breakout;
use crate::dispatch::{AlertSink, DispatchReport};
use crate::error::ScanError;
use crate::market_data::CandleSource;
use crate::settings::{BandWindows, RuntimeSettings, SettingsStore};
use crate::stats::StatsCollector;
use crate::types::{BandHit, ScanResult, ScannerState};

/// Run/pause switch shared with the control interface.
pub struct ScannerControl {
    running: AtomicBool,
}

impl ScannerControl {
    pub fn new() -> Self {
        Self { running: AtomicBool::new(true) }
    }

    pub fn state(&self) -> ScannerState {
        if self.running.load(Ordering::SeqCst) {
            ScannerState::Running
        } else {
            ScannerState::Paused
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == ScannerState::Running
    }

    /// Flip RUNNING/PAUSED and return the new state.
    pub fn toggle(&self) -> ScannerState {
        let was_running = self.running.fetch_xor(true, Ordering::SeqCst);
        let state = if was_running { ScannerState::Paused } else { ScannerState::Running };
        info!(state = state.as_str(), "Scanner toggled");
        state
    }
}

impl Default for ScannerControl {
    fn default() -> Self {
        Self::new()
    }
}

/// What happened to one symbol in one cycle.
#[derive(Debug)]
pub enum SymbolOutcome {
    Selected { result: ScanResult, report: DispatchReport },
    Quiet(ScanResult),
    Skipped,
    Failed(ScanError),
}

#[derive(Debug, Default)]
pub struct CycleReport {
    pub outcomes: Vec<(String, SymbolOutcome)>,
    /// Pause or shutdown was observed before the pass finished.
    pub interrupted: bool,
}

impl CycleReport {
    fn count(&self, pred: impl Fn(&SymbolOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }

    pub fn selected(&self) -> usize {
        self.count(|o| matches!(o, SymbolOutcome::Selected { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, SymbolOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, SymbolOutcome::Failed(_)))
    }

    /// Selected symbols whose alert reached no channel.
    pub fn undelivered(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|(symbol, o)| match o {
                SymbolOutcome::Selected { report, .. } if !report.delivered_any() => Some(symbol.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|(symbol, o)| match o {
                SymbolOutcome::Failed(e) => Some(format!("{symbol}: {e}")),
                _ => None,
            })
            .collect()
    }

    /// Largest absolute move among evaluated symbols.
    pub fn top_mover(&self) -> Option<&ScanResult> {
        self.outcomes
            .iter()
            .filter_map(|(_, o)| match o {
                SymbolOutcome::Selected { result, .. } | SymbolOutcome::Quiet(result) => Some(result),
                _ => None,
            })
            .max_by(|a, b| a.percent_change.abs().total_cmp(&b.percent_change.abs()))
    }
}

/// Fixed scanner parameters, set at startup.
#[derive(Debug, Clone)]
pub struct ScanParams {
    pub symbols: Vec<String>,
    pub windows: BandWindows,
    pub candle_interval_secs: u64,
    pub lookback: usize,
    pub pause_poll: Duration,
}

pub struct Scanner<S, A> {
    source: S,
    sink: A,
    settings: Arc<SettingsStore>,
    stats: Arc<StatsCollector>,
    control: Arc<ScannerControl>,
    params: ScanParams,
}

impl<S: CandleSource, A: AlertSink> Scanner<S, A> {
    pub fn new(
        source: S,
        sink: A,
        settings: Arc<SettingsStore>,
        stats: Arc<StatsCollector>,
        control: Arc<ScannerControl>,
        params: ScanParams,
    ) -> Self {
        Self { source, sink, settings, stats, control, params }
    }

    /// Run cycles until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(symbols = self.params.symbols.len(), "--- Breakout Scanner Activated ---");
        loop {
            if *shutdown.borrow() {
                break;
            }
            if !self.control.is_running() {
                if sleep_or_shutdown(self.params.pause_poll, &mut shutdown).await {
                    break;
                }
                continue;
            }

            let settings = self.settings.snapshot();
            let report = self.run_cycle(&settings, &shutdown).await;
            info!(
                scanned = report.outcomes.len(),
                selected = report.selected(),
                skipped = report.skipped(),
                failed = report.failed(),
                interrupted = report.interrupted,
                "Cycle complete"
            );
            if let Some(top) = report.top_mover() {
                debug!("Top mover {} {:+.2}%", top.symbol, top.percent_change);
            }
            let undelivered = report.undelivered();
            if !undelivered.is_empty() {
                warn!(symbols = ?undelivered, "Alerts not delivered this cycle");
            }
            let errors = report.errors();
            if !errors.is_empty() {
                warn!(errors = ?errors, "Symbols failed this cycle");
            }
            if report.interrupted {
                continue;
            }

            debug!("Sleeping {} seconds...", settings.scan_interval);
            if sleep_or_shutdown(Duration::from_secs(settings.scan_interval), &mut shutdown).await {
                break;
            }
        }
        info!("Scanner stopped");
    }

    /// One pass over the symbol universe with a fixed settings snapshot.
    pub async fn run_cycle(&self, settings: &RuntimeSettings, shutdown: &watch::Receiver<bool>) -> CycleReport {
        let mut report = CycleReport::default();
        for symbol in &self.params.symbols {
            if *shutdown.borrow() || !self.control.is_running() {
                report.interrupted = true;
                break;
            }
            let outcome = match self.scan_symbol(symbol, settings).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Error processing symbol");
                    self.stats.record_error();
                    SymbolOutcome::Failed(e)
                }
            };
            report.outcomes.push((symbol.clone(), outcome));
        }
        if report.interrupted {
            self.stats.discard_cycle();
        } else {
            self.stats.record_cycle();
        }
        report
    }

    /// Fetch, evaluate all bands, and alert on any hit.
    pub async fn scan_symbol(&self, symbol: &str, settings: &RuntimeSettings) -> Result<SymbolOutcome, ScanError> {
        let candles = self
            .source
            .fetch(symbol, self.params.candle_interval_secs, self.params.lookback)
            .await;
        let last = match candles.last() {
            Some(c) => *c,
            None => {
                info!("[SKIPPED] {}", symbol);
                self.stats.record_skip();
                return Ok(SymbolOutcome::Skipped);
            }
        };

        let percent_change = breakout::percent_change(&candles)?;
        let band_width = breakout::band_width(&candles)?;
        self.stats.record_scan(symbol, percent_change, last.volume * last.close);

        let hits: Vec<BandHit> = settings
            .band_configs(&self.params.windows)
            .iter()
            .filter_map(|band| breakout::evaluate_band(&candles, band, settings.volume_floor))
            .collect();

        let result = ScanResult {
            symbol: symbol.to_string(),
            price: last.close,
            percent_change,
            band_width,
            hits,
        };

        if !result.is_breakout() {
            debug!("{} | Δ: {:.2}% | W: {:.2}%", symbol, percent_change, band_width);
            return Ok(SymbolOutcome::Quiet(result));
        }

        info!(
            "[SELECTED] {} | Δ: {:.2}% | W: {:.2}% | Hits: {:?}",
            symbol,
            percent_change,
            band_width,
            result.band_names()
        );
        let message = alert::compose(&result, settings.alert_mode, self.params.candle_interval_secs, Utc::now());
        let report = self.sink.deliver(&message, settings).await;
        if !report.delivered_any() {
            warn!(symbol, "[DISPATCH] alert reached no channel");
        }
        self.stats.record_alert();
        Ok(SymbolOutcome::Selected { result, report })
    }
}

/// Sleep for `dur`, waking early on shutdown. Returns true if shutting down.
async fn sleep_or_shutdown(dur: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(dur) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
