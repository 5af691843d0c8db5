//! # Status Poller
//!
//! Polls `GET <api>/status` on a fixed interval and publishes the service's
//! running flag on a `watch` channel. Receivers only wake on an actual change.
//! A failed poll is logged and leaves the last published value in place.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::TelemetryError;
use crate::retrieve::dashboard_api::DashboardApi;

pub const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct StatusPoller {
    api: Arc<DashboardApi>,
    interval: Duration,
    running: watch::Sender<bool>,
}

impl StatusPoller {
    /// The flag starts out `false` until the first successful poll.
    pub fn new(api: Arc<DashboardApi>, interval: Duration) -> (Self, watch::Receiver<bool>) {
        let (running, rx) = watch::channel(false);
        let poller = Self {
            api,
            interval: interval.max(Duration::from_millis(1)),
            running,
        };
        (poller, rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.running.subscribe()
    }

    /// One poll. Returns the reported flag and whether it changed.
    pub async fn poll_once(&self) -> Result<(bool, bool), TelemetryError> {
        let status = self.api.status().await?;
        let changed = self.running.send_if_modified(|current| {
            if *current == status.running {
                return false;
            }
            *current = status.running;
            true
        });
        if changed {
            log::info!("service running: {}", status.running);
        }
        Ok((status.running, changed))
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        log::warn!("status poll failed: {}", e);
                    }
                }
            }
        }
        log::debug!("status poller stopped");
    }
}
