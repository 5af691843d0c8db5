use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use lib_miao::{CredentialSource, DashboardApi, StatusPoller, TelemetryClient};

mod monitor_logic;
use monitor_logic::{config, logger, render};

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = config::load_config();
    let log_dir = config.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"));
    logger::setup_logging(&log_dir, config.log_level.as_deref().unwrap_or("info"))?;

    let credentials = config.credentials();
    if credentials.token().is_none() {
        anyhow::bail!("no session token; pass --token / MIAO_TOKEN or --token-file / MIAO_TOKEN_FILE");
    }

    let api_url = config.api_url.as_deref().unwrap_or("http://127.0.0.1:8080/api");
    let api = Arc::new(DashboardApi::new(api_url, Arc::clone(&credentials))?);
    let mut client = TelemetryClient::new(&config.telemetry_config(), credentials)?;

    let shutdown = CancellationToken::new();
    let render_handle = tokio::spawn(render::run(client.store().subscribe(), shutdown.child_token()));

    match client.load_recent_logs(&api).await {
        Ok(count) => log::info!("Loaded {} recent log lines.", count),
        Err(e) => log::warn!("Could not load recent logs: {}", e),
    }

    let (poller, running) = StatusPoller::new(api, config.status_poll_interval());
    let poller_handle = tokio::spawn(poller.run(shutdown.child_token()));
    client.start(running)?;

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    shutdown.cancel();

    if let Some(path) = &config.export_path {
        fs::write(path, client.export_logs())
            .with_context(|| format!("writing log export to {}", path.display()))?;
        log::info!("Exported {} log lines to {}.", client.store().log_count(), path.display());
    }

    client.shutdown().await;
    let _ = tokio::try_join!(poller_handle, render_handle);

    log::info!("Shutdown complete.");
    Ok(())
}
