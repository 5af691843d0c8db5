use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use lib_miao::{CredentialSource, SessionToken, TelemetryConfig, TokenFile};

const DEFAULT_CONFIG_FILE: &str = "miao_monitor.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Terminal monitor for the Miao dashboard's live traffic and logs", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "MIAO_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "MIAO_SERVER_URL", help = "WebSocket base URL of the dashboard (ws:// or wss://).")]
    pub server_url: Option<String>,

    #[clap(long, env = "MIAO_API_URL", help = "REST base URL of the dashboard API (http:// or https://).")]
    pub api_url: Option<String>,

    #[clap(long, env = "MIAO_TOKEN", hide_env_values = true, help = "Session bearer token.")]
    #[serde(skip_serializing)]
    pub token: Option<String>,

    #[clap(long, env = "MIAO_TOKEN_FILE", help = "File holding the session token, re-read on every connect.")]
    pub token_file: Option<PathBuf>,

    #[clap(long, env = "MIAO_TRAFFIC_PATH", help = "Traffic stream path relative to the server URL.")]
    pub traffic_path: Option<String>,

    #[clap(long, env = "MIAO_LOGS_PATH", help = "Log stream path relative to the server URL.")]
    pub logs_path: Option<String>,

    #[clap(long, env = "MIAO_RECONNECT_BASE_DELAY_MS", help = "Base delay in milliseconds for stream reconnect attempts.")]
    pub reconnect_base_delay_ms: Option<u64>,

    #[clap(long, env = "MIAO_RECONNECT_MAX_DELAY_MS", help = "Maximum delay in milliseconds for stream reconnect attempts.")]
    pub reconnect_max_delay_ms: Option<u64>,

    #[clap(long, env = "MIAO_LIVENESS_INTERVAL_SECONDS", help = "Seconds between traffic stream liveness checks.")]
    pub liveness_interval_seconds: Option<u64>,

    #[clap(long, env = "MIAO_STATUS_POLL_INTERVAL_SECONDS", help = "Seconds between service status polls.")]
    pub status_poll_interval_seconds: Option<u64>,

    #[clap(long, env = "MIAO_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "MIAO_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "MIAO_EXPORT_PATH", help = "Write the log buffer to this file on shutdown.")]
    pub export_path: Option<PathBuf>,
}

impl Config {
    // 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            server_url: other.server_url.or(self.server_url),
            api_url: other.api_url.or(self.api_url),
            token: other.token.or(self.token),
            token_file: other.token_file.or(self.token_file),
            traffic_path: other.traffic_path.or(self.traffic_path),
            logs_path: other.logs_path.or(self.logs_path),
            reconnect_base_delay_ms: other.reconnect_base_delay_ms.or(self.reconnect_base_delay_ms),
            reconnect_max_delay_ms: other.reconnect_max_delay_ms.or(self.reconnect_max_delay_ms),
            liveness_interval_seconds: other.liveness_interval_seconds.or(self.liveness_interval_seconds),
            status_poll_interval_seconds: other.status_poll_interval_seconds.or(self.status_poll_interval_seconds),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            export_path: other.export_path.or(self.export_path),
        }
    }

    fn defaults() -> Config {
        let telemetry = TelemetryConfig::default();
        Config {
            server_url: Some(telemetry.server_url),
            api_url: Some("http://127.0.0.1:8080/api".to_string()),
            traffic_path: Some(telemetry.traffic_path),
            logs_path: Some(telemetry.logs_path),
            reconnect_base_delay_ms: Some(telemetry.reconnect_base_delay_ms),
            reconnect_max_delay_ms: Some(telemetry.reconnect_max_delay_ms),
            liveness_interval_seconds: Some(5),
            status_poll_interval_seconds: Some(5),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            ..Default::default()
        }
    }

    /// Stream settings for `TelemetryClient`. Unset fields keep the library defaults.
    pub fn telemetry_config(&self) -> TelemetryConfig {
        let defaults = TelemetryConfig::default();
        TelemetryConfig {
            server_url: self.server_url.clone().unwrap_or(defaults.server_url),
            traffic_path: self.traffic_path.clone().unwrap_or(defaults.traffic_path),
            logs_path: self.logs_path.clone().unwrap_or(defaults.logs_path),
            reconnect_base_delay_ms: self
                .reconnect_base_delay_ms
                .unwrap_or(defaults.reconnect_base_delay_ms),
            reconnect_max_delay_ms: self
                .reconnect_max_delay_ms
                .unwrap_or(defaults.reconnect_max_delay_ms),
            liveness_interval_ms: self
                .liveness_interval_seconds
                .map_or(defaults.liveness_interval_ms, |s| s.saturating_mul(1000)),
        }
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_interval_seconds.unwrap_or(5).max(1))
    }

    /// An explicit token wins over a token file.
    pub fn credentials(&self) -> Arc<dyn CredentialSource> {
        match (&self.token, &self.token_file) {
            (Some(token), _) => Arc::new(SessionToken::new(Some(token.clone()))),
            (None, Some(path)) => Arc::new(TokenFile::new(path.clone())),
            (None, None) => Arc::new(SessionToken::new(None)),
        }
    }
}

pub fn load_config() -> Config {
    resolve(Config::parse())
}

/// Defaults, then the config file, then env/CLI.
pub fn resolve(cli_args: Config) -> Config {
    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();

    if config_file_path.exists() {
        match fs::read_to_string(&config_file_path) {
            Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
                Ok(file_config) => current_config = current_config.merge(file_config),
                Err(e) => log::warn!(
                    "Failed to parse config file {}: {}. Falling back to other sources.",
                    config_file_path.display(),
                    e
                ),
            },
            Err(e) => log::warn!(
                "Failed to read config file {}: {}. Falling back to other sources.",
                config_file_path.display(),
                e
            ),
        }
    } else {
        log::info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            config_file_path.display()
        );
    }

    current_config.merge(cli_args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(args: &[&str]) -> Config {
        let mut argv = vec!["miao_monitor"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).expect("valid arguments")
    }

    #[test]
    fn defaults_apply_without_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("absent.conf");
        let config = resolve(Config {
            config_path: Some(missing),
            ..Default::default()
        });
        assert_eq!(config.server_url.as_deref(), Some("ws://127.0.0.1:8080/"));
        assert_eq!(config.log_level.as_deref(), Some("info"));
        assert_eq!(config.telemetry_config(), TelemetryConfig::default());
    }

    #[test]
    fn file_overrides_defaults_and_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"serverUrl":"wss://dash.example.com/","logLevel":"debug","statusPollIntervalSeconds":2}}"#
        )
        .expect("write config");

        let path = file.path().to_str().expect("utf-8 path");
        let config = resolve(cli(&["--config-path", path, "--log-level", "warn"]));

        assert_eq!(config.server_url.as_deref(), Some("wss://dash.example.com/"));
        assert_eq!(config.log_level.as_deref(), Some("warn"));
        assert_eq!(config.status_poll_interval(), Duration::from_secs(2));
        assert_eq!(config.traffic_path.as_deref(), Some("ws/traffic"));
    }

    #[test]
    fn unparsable_file_is_ignored() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "not json").expect("write config");
        let config = resolve(Config {
            config_path: Some(file.path().to_path_buf()),
            ..Default::default()
        });
        assert_eq!(config.api_url.as_deref(), Some("http://127.0.0.1:8080/api"));
    }

    #[test]
    fn liveness_seconds_become_milliseconds() {
        let config = Config {
            liveness_interval_seconds: Some(12),
            reconnect_base_delay_ms: Some(250),
            ..Default::default()
        };
        let telemetry = config.telemetry_config();
        assert_eq!(telemetry.liveness_interval_ms, 12_000);
        assert_eq!(telemetry.reconnect_base_delay_ms, 250);
    }

    #[test]
    fn explicit_token_wins_over_token_file() {
        let config = Config {
            token: Some("abc".to_string()),
            token_file: Some(PathBuf::from("/nonexistent/token")),
            ..Default::default()
        };
        assert_eq!(config.credentials().token().as_deref(), Some("abc"));

        let file_only = Config {
            token_file: Some(PathBuf::from("/nonexistent/token")),
            ..Default::default()
        };
        assert_eq!(file_only.credentials().token(), None);
    }

    #[test]
    fn token_is_never_serialized() {
        let config = Config {
            token: Some("abc".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).expect("serialize");
        assert!(!json.contains("abc"));
    }
}
