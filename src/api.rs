//! HTTP control surface used by the dashboard: settings read/write, stats,
//! run/pause toggle, and channel test alerts.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::dispatch::{AlertDispatcher, Channel};
use crate::error::{DispatchError, SettingsError};
use crate::scanner::ScannerControl;
use crate::types::ScannerState;
use crate::settings::SettingsStore;
use crate::stats::{StatsCollector, StatsSnapshot};

/// Shared state handed to every handler.
pub struct AppState {
    pub settings: Arc<SettingsStore>,
    pub stats: Arc<StatsCollector>,
    pub control: Arc<ScannerControl>,
    pub dispatcher: Arc<AlertDispatcher>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Rejected(#[from] SettingsError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Dispatch(#[from] DispatchError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Rejected(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Dispatch(DispatchError::NotConfigured) => StatusCode::BAD_REQUEST,
            ApiError::Dispatch(_) => StatusCode::BAD_GATEWAY,
        };
        let body = json!({ "status": "error", "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/settings", get(get_settings).post(post_settings))
        .route("/api/stats", get(get_stats))
        .route("/api/scanner/toggle", post(toggle_scanner))
        .route("/api/test-alert", post(test_alert))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /api/settings: current snapshot as flat key/value pairs.
async fn get_settings(State(state): State<Arc<AppState>>) -> Json<Map<String, Value>> {
    Json(state.settings.snapshot().to_map())
}

/// POST /api/settings: partial update, applied all-or-nothing.
async fn post_settings(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(patch) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let next = state.settings.update(&patch).map_err(|e| {
        tracing::warn!(error = %e, "Settings update rejected");
        e
    })?;
    Ok(Json(json!({
        "status": "success",
        "message": "Settings updated",
        "settings": next.to_map(),
    })))
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}

async fn toggle_scanner(State(state): State<Arc<AppState>>) -> Json<Value> {
    let next = state.control.toggle();
    Json(json!({ "status": next.as_str(), "running": next == ScannerState::Running }))
}

#[derive(Deserialize)]
struct TestAlertBody {
    #[serde(rename = "type", default = "default_channel")]
    channel: String,
}

fn default_channel() -> String {
    "discord".to_string()
}

/// POST /api/test-alert: send the fixed test message through one channel.
async fn test_alert(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TestAlertBody>,
) -> Result<Json<Value>, ApiError> {
    let channel = Channel::parse(&body.channel)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown alert channel: {}", body.channel)))?;
    let settings = state.settings.snapshot();
    state.dispatcher.send_test(channel, &settings).await?;
    Ok(Json(json!({
        "status": "success",
        "message": format!("{} test alert sent", channel.name()),
    })))
}
