use thiserror::Error;

use crate::models::StreamKind;

/// Errors surfaced by the telemetry client.
///
/// Only `MissingCredential` is ever returned from `connect()`. Transport and
/// decode failures are absorbed by the stream managers and show up as state
/// (connected flag, failure count, dropped frame counter); the variants exist
/// so those paths can log a typed value.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("no session credential available; log in before connecting")]
    MissingCredential,

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed {stream} frame: {reason}")]
    Decode { stream: StreamKind, reason: String },

    #[error("API request failed: {0}")]
    Api(String),

    #[error("API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl TelemetryError {
    pub(crate) fn invalid_url(url: impl Into<String>, reason: impl ToString) -> Self {
        TelemetryError::InvalidUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}
