//! # Telemetry Client
//!
//! Composition root for the live telemetry layer. It builds one store and
//! one stream manager per stream, and starts the traffic gate. It is created
//! once at startup and torn down with `shutdown()`. Dropping it without
//! `shutdown()` still stops the gate and both streams; it just does not wait
//! for the gate task to finish.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::credentials::CredentialSource;
use crate::error::TelemetryError;
use crate::models::{LogEntry, TrafficSample};
use crate::telemetry::backoff::{Backoff, BASE_DELAY, MAX_DELAY};
use crate::telemetry::store::TelemetryStore;
use crate::telemetry::stream_manager::{Dialer, StreamManager, WsDialer};
use crate::telemetry::traffic_gate::{TrafficGate, LIVENESS_INTERVAL};

/// Endpoints and timings for the telemetry streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TelemetryConfig {
    /// WebSocket base, e.g. `ws://127.0.0.1:8080/`.
    pub server_url: String,
    /// Traffic stream path relative to `server_url`.
    pub traffic_path: String,
    /// Log stream path relative to `server_url`.
    pub logs_path: String,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub liveness_interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8080/".to_string(),
            traffic_path: "ws/traffic".to_string(),
            logs_path: "ws/logs".to_string(),
            reconnect_base_delay_ms: BASE_DELAY.as_millis() as u64,
            reconnect_max_delay_ms: MAX_DELAY.as_millis() as u64,
            liveness_interval_ms: LIVENESS_INTERVAL.as_millis() as u64,
        }
    }
}

impl TelemetryConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::from_millis(self.reconnect_base_delay_ms, self.reconnect_max_delay_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms.max(1))
    }

    pub fn traffic_url(&self) -> Result<Url, TelemetryError> {
        stream_endpoint(&self.server_url, &self.traffic_path)
    }

    pub fn logs_url(&self) -> Result<Url, TelemetryError> {
        stream_endpoint(&self.server_url, &self.logs_path)
    }
}

fn stream_endpoint(base: &str, path: &str) -> Result<Url, TelemetryError> {
    let mut base_url = Url::parse(base).map_err(|e| TelemetryError::invalid_url(base, e))?;
    if !matches!(base_url.scheme(), "ws" | "wss") {
        return Err(TelemetryError::invalid_url(base, "expected a ws:// or wss:// URL"));
    }
    if !base_url.path().ends_with('/') {
        let with_slash = format!("{}/", base_url.path());
        base_url.set_path(&with_slash);
    }
    base_url
        .join(path.trim_start_matches('/'))
        .map_err(|e| TelemetryError::invalid_url(path, e))
}

pub struct TelemetryClient {
    store: Arc<TelemetryStore>,
    traffic: StreamManager<TrafficSample>,
    logs: StreamManager<LogEntry>,
    liveness_interval: Duration,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl TelemetryClient {
    pub fn new(
        config: &TelemetryConfig,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, TelemetryError> {
        Self::with_dialer(config, credentials, Arc::new(WsDialer))
    }

    pub fn with_dialer(
        config: &TelemetryConfig,
        credentials: Arc<dyn CredentialSource>,
        dialer: Arc<dyn Dialer>,
    ) -> Result<Self, TelemetryError> {
        let store = Arc::new(TelemetryStore::new());
        let backoff = config.backoff();
        let traffic = StreamManager::new(
            config.traffic_url()?,
            Arc::clone(&credentials),
            Arc::clone(&store),
            backoff,
            Arc::clone(&dialer),
        );
        let logs = StreamManager::new(
            config.logs_url()?,
            credentials,
            Arc::clone(&store),
            backoff,
            dialer,
        );
        Ok(Self {
            store,
            traffic,
            logs,
            liveness_interval: config.liveness_interval(),
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    pub fn store(&self) -> &Arc<TelemetryStore> {
        &self.store
    }

    pub fn traffic(&self) -> &StreamManager<TrafficSample> {
        &self.traffic
    }

    pub fn logs(&self) -> &StreamManager<LogEntry> {
        &self.logs
    }

    /// Connects the log stream and hands the traffic stream to a gate driven
    /// by `running`. Fails only when no credential is available.
    pub fn start(&mut self, running: watch::Receiver<bool>) -> Result<(), TelemetryError> {
        self.logs.connect()?;
        let gate = TrafficGate::new(self.traffic.clone(), running, self.liveness_interval);
        self.tasks.push(tokio::spawn(gate.run(self.shutdown.child_token())));
        Ok(())
    }

    /// User-initiated "clear logs".
    pub fn clear_logs(&self) -> bool {
        self.store.clear_logs()
    }

    pub fn export_logs(&self) -> String {
        self.store.export_logs()
    }

    /// Bulk-loads the service's recent log lines. Entries later pushed over the
    /// stream are deduplicated against them.
    #[cfg(feature = "retrieve")]
    pub async fn load_recent_logs(
        &self,
        api: &crate::retrieve::DashboardApi,
    ) -> Result<usize, TelemetryError> {
        let entries = api.recent_logs().await?;
        Ok(self.store.replace_logs(entries))
    }

    /// Stops the gate, waits for it, and disconnects both streams.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                log::warn!("telemetry task ended abnormally: {}", e);
            }
        }
        self.stop_streams();
        log::info!("telemetry client shut down");
    }

    fn stop_streams(&self) {
        self.shutdown.cancel();
        self.traffic.disconnect();
        self.logs.disconnect();
    }
}

impl Drop for TelemetryClient {
    fn drop(&mut self) {
        // Sessions and reconnect timers hold their own manager handles.
        self.stop_streams();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_onto_base() {
        let config = TelemetryConfig {
            server_url: "wss://dash.example.com/miao".to_string(),
            ..TelemetryConfig::default()
        };
        assert_eq!(
            config.traffic_url().unwrap().as_str(),
            "wss://dash.example.com/miao/ws/traffic"
        );
        assert_eq!(
            config.logs_url().unwrap().as_str(),
            "wss://dash.example.com/miao/ws/logs"
        );
    }

    #[test]
    fn http_base_is_rejected() {
        let config = TelemetryConfig {
            server_url: "http://127.0.0.1:8080/".to_string(),
            ..TelemetryConfig::default()
        };
        assert!(matches!(config.traffic_url(), Err(TelemetryError::InvalidUrl { .. })));
    }

    #[test]
    fn defaults_match_backoff_policy() {
        let config = TelemetryConfig::default();
        assert_eq!(config.backoff(), Backoff::default());
        assert_eq!(config.liveness_interval(), Duration::from_secs(5));
    }

    #[test]
    fn partial_json_config_keeps_defaults() {
        let config: TelemetryConfig =
            serde_json::from_str(r#"{"serverUrl":"ws://10.0.0.2:9090/","logsPath":"api/logs/ws"}"#)
                .unwrap();
        assert_eq!(config.server_url, "ws://10.0.0.2:9090/");
        assert_eq!(config.logs_path, "api/logs/ws");
        assert_eq!(config.traffic_path, "ws/traffic");
    }
}
