//! Alert delivery to the configured notification channels.
//!
//! Each channel is enabled by its credentials in the settings snapshot and
//! fails on its own: an error on one is logged and the other still runs.
//! No retries, no queueing.

use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::DispatchError;
use crate::settings::RuntimeSettings;

pub const DEFAULT_TELEGRAM_URL: &str = "https://api.telegram.org";

pub const TEST_MESSAGE: &str =
    "🧪 **TEST ALERT** 🧪\n**System**: Breakout Scanner\n**Status**: Alert system working correctly";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Webhook,
    Telegram,
}

impl Channel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "discord" | "webhook" => Some(Channel::Webhook),
            "telegram" => Some(Channel::Telegram),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Channel::Webhook => "webhook",
            Channel::Telegram => "telegram",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "error", rename_all = "lowercase")]
pub enum ChannelOutcome {
    Disabled,
    Delivered,
    Failed(String),
}

impl ChannelOutcome {
    fn from_result(channel: Channel, result: Result<(), DispatchError>) -> Self {
        match result {
            Ok(()) => {
                info!(channel = channel.name(), "[DISPATCH] delivered");
                ChannelOutcome::Delivered
            }
            Err(e) => {
                warn!(channel = channel.name(), error = %e, "[DISPATCH] failed");
                ChannelOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Per-channel result of one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReport {
    pub webhook: ChannelOutcome,
    pub telegram: ChannelOutcome,
}

impl DispatchReport {
    pub fn delivered_any(&self) -> bool {
        self.webhook == ChannelOutcome::Delivered || self.telegram == ChannelOutcome::Delivered
    }
}

/// Destination for composed alerts.
pub trait AlertSink: Send + Sync {
    fn deliver(&self, message: &str, settings: &RuntimeSettings) -> impl Future<Output = DispatchReport> + Send;
}

impl<T: AlertSink> AlertSink for Arc<T> {
    fn deliver(&self, message: &str, settings: &RuntimeSettings) -> impl Future<Output = DispatchReport> + Send {
        (**self).deliver(message, settings)
    }
}

pub struct AlertDispatcher {
    http: reqwest::Client,
    telegram_url: String,
}

impl AlertDispatcher {
    /// `timeout` bounds each channel call separately.
    pub fn new(telegram_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, telegram_url: telegram_url.trim_end_matches('/').to_string() })
    }

    /// Fan `message` out to every enabled channel.
    pub async fn dispatch(&self, message: &str, settings: &RuntimeSettings) -> DispatchReport {
        let webhook = async {
            if !settings.webhook_enabled() {
                return ChannelOutcome::Disabled;
            }
            ChannelOutcome::from_result(Channel::Webhook, self.send_webhook(&settings.discord_webhook, message).await)
        };
        let telegram = async {
            if !settings.telegram_enabled() {
                return ChannelOutcome::Disabled;
            }
            let result = self
                .send_telegram(&settings.telegram_token, &settings.telegram_chat_id, message)
                .await;
            ChannelOutcome::from_result(Channel::Telegram, result)
        };
        let (webhook, telegram) = tokio::join!(webhook, telegram);
        DispatchReport { webhook, telegram }
    }

    /// Send the fixed test message through one channel.
    pub async fn send_test(&self, channel: Channel, settings: &RuntimeSettings) -> Result<(), DispatchError> {
        match channel {
            Channel::Webhook if settings.webhook_enabled() => {
                self.send_webhook(&settings.discord_webhook, TEST_MESSAGE).await
            }
            Channel::Telegram if settings.telegram_enabled() => {
                self.send_telegram(&settings.telegram_token, &settings.telegram_chat_id, TEST_MESSAGE)
                    .await
            }
            _ => Err(DispatchError::NotConfigured),
        }
    }

    async fn send_webhook(&self, url: &str, message: &str) -> Result<(), DispatchError> {
        let response = self.http.post(url).json(&json!({ "content": message })).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DispatchError::Status { status, body })
    }

    async fn send_telegram(&self, token: &str, chat_id: &str, message: &str) -> Result<(), DispatchError> {
        let url = format!("{}/bot{}/sendMessage", self.telegram_url, token);
        let body = json!({
            "chat_id": chat_id,
            "text": message,
            "parse_mode": "Markdown",
            "disable_web_page_preview": true,
        });
        // The bot token is part of the URL; keep it out of error messages.
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DispatchError::Http(e.without_url()))?;
        let status = response.status();
        if status == reqwest::StatusCode::OK {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DispatchError::Status { status, body })
    }
}

impl AlertSink for AlertDispatcher {
    async fn deliver(&self, message: &str, settings: &RuntimeSettings) -> DispatchReport {
        self.dispatch(message, settings).await
    }
}
