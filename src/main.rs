mod alert;
mod api;
mod breakout;
mod config;
mod dispatch;
mod error;
mod market_data;
mod scanner;
mod settings;
mod stats;
mod types;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use api::AppState;
use config::AppConfig;
use dispatch::AlertDispatcher;
use market_data::MarketDataClient;
use scanner::{ScanParams, Scanner, ScannerControl};
use settings::SettingsStore;
use stats::StatsCollector;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = AppConfig::from_env()?;
    tracing::info!(
        symbols = cfg.symbols.len(),
        candle_interval = cfg.candle_interval_secs,
        lookback = cfg.lookback,
        volume_floor = cfg.initial_settings.volume_floor,
        alert_mode = cfg.initial_settings.alert_mode.as_str(),
        "Starting Breakout Scanner"
    );

    let settings = Arc::new(SettingsStore::new(cfg.initial_settings.clone()));
    let stats = Arc::new(StatsCollector::new());
    let control = Arc::new(ScannerControl::new());
    let dispatcher = Arc::new(
        AlertDispatcher::new(&cfg.telegram_url, cfg.http_timeout).context("building alert HTTP client")?,
    );
    let source =
        MarketDataClient::new(&cfg.market_data_url, cfg.http_timeout).context("building market data client")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received, stopping at next checkpoint"),
            Err(e) => tracing::error!("Failed to listen for Ctrl+C: {e}"),
        }
        let _ = shutdown_tx.send(true);
    });

    // Scan task
    let scanner = Scanner::new(
        source,
        Arc::clone(&dispatcher),
        Arc::clone(&settings),
        Arc::clone(&stats),
        Arc::clone(&control),
        ScanParams {
            symbols: cfg.symbols.clone(),
            windows: cfg.windows,
            candle_interval_secs: cfg.candle_interval_secs,
            lookback: cfg.lookback,
            pause_poll: cfg.pause_poll,
        },
    );
    let scan_shutdown = shutdown_rx.clone();
    let scan_task = tokio::spawn(async move {
        scanner.run(scan_shutdown).await;
    });

    // Stats task: derived fields only, on its own cadence
    let stats_refresher = Arc::clone(&stats);
    let stats_every = cfg.stats_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(stats_every);
        loop {
            interval.tick().await;
            stats_refresher.refresh();
            let snap = stats_refresher.snapshot();
            tracing::debug!(
                scanned = snap.total_scanned,
                alerts = snap.total_alerts,
                scan_rate = snap.scan_rate,
                "[STATS] refreshed"
            );
        }
    });

    // Control API
    let state = Arc::new(AppState { settings, stats, control, dispatcher });
    let app = api::router(state);
    let addr: SocketAddr = format!("{}:{}", cfg.bind, cfg.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", cfg.bind, cfg.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("Control API listening on http://{addr}");

    let mut api_shutdown = shutdown_rx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = api_shutdown.changed().await;
        })
        .await
        .context("control API server")?;

    // The server only returns once shutdown was signalled; wait for the
    // scan loop to reach its next checkpoint.
    scan_task.await.context("scan task panicked")?;
    tracing::info!("Shutdown complete");
    Ok(())
}
