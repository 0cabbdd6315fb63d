//! Error taxonomy for the detection path.
//!
//! None of these are fatal: fetch errors collapse to an empty window, a
//! rejected settings update keeps the previous snapshot, a dispatch error is
//! logged per channel, and a scan error skips one symbol for one cycle.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("empty payload")]
    Empty,
}

/// An incoming settings update failed validation. Nothing was applied.
#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("unknown setting: {0}")]
    UnknownKey(String),
    #[error("{key}: expected {expected}")]
    InvalidType { key: String, expected: &'static str },
    #[error("{key}: {reason}")]
    OutOfRange { key: String, reason: String },
    #[error("{key}: invalid URL ({reason})")]
    InvalidUrl { key: String, reason: String },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rejected with status {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },
    #[error("channel not configured")]
    NotConfigured,
}

#[derive(Debug, Error, PartialEq)]
pub enum ScanError {
    #[error("non-positive reference price {price} at {field}")]
    InvalidPrice { field: &'static str, price: f64 },
}
