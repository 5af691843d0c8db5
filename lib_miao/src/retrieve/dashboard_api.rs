//! # Dashboard API Client
//!
//! Thin typed client for the dashboard's REST endpoints. Transient failures
//! (connect errors, 5xx, 429) are retried by `reqwest-retry` with exponential
//! backoff before an error surfaces. The bearer token is looked up on every
//! request, like the stream managers do on every `connect()`.

use reqwest::header::AUTHORIZATION;
use reqwest::Url;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::credentials::CredentialSource;
use crate::error::TelemetryError;
use crate::models::LogEntry;

const MAX_RETRIES: u32 = 3;

/// Body of `GET <api>/status`. Unknown fields are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
}

pub struct DashboardApi {
    inner: ClientWithMiddleware,
    base_url: Url,
    credentials: Arc<dyn CredentialSource>,
}

impl DashboardApi {
    /// `base_url` must be an absolute http(s) URL. A missing trailing slash is
    /// added so relative paths join under it.
    pub fn new(
        base_url: &str,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, TelemetryError> {
        let mut url = Url::parse(base_url).map_err(|e| TelemetryError::invalid_url(base_url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TelemetryError::invalid_url(
                base_url,
                "expected an http:// or https:// URL",
            ));
        }
        if !url.path().ends_with('/') {
            let with_slash = format!("{}/", url.path());
            url.set_path(&with_slash);
        }

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
            credentials,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Whether the proxy core is currently running.
    pub async fn status(&self) -> Result<ServiceStatus, TelemetryError> {
        self.get_json("status").await
    }

    /// Recent log lines, newest first.
    pub async fn recent_logs(&self) -> Result<Vec<LogEntry>, TelemetryError> {
        self.get_json("logs").await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TelemetryError> {
        let token = self
            .credentials
            .token()
            .ok_or(TelemetryError::MissingCredential)?;
        let full_url = self
            .base_url
            .join(path)
            .map_err(|e| TelemetryError::invalid_url(path, e))?;

        let response = self
            .inner
            .get(full_url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| TelemetryError::Api(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelemetryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| TelemetryError::Api(format!("GET {}: {}", path, e)))
    }
}
