//! # Traffic Gate
//!
//! The traffic stream only makes sense while the proxy core is running. The
//! gate watches the externally reported "service running" flag and:
//!
//! - connects the traffic stream when the flag turns true,
//! - disconnects it and zeroes the exposed sample when the flag turns false,
//! - re-invokes `connect()` on a fixed liveness interval while the flag is
//!   true but no socket is open or dialing, as a safety net for a missed
//!   reconnection.
//!
//! `connect()` is idempotent, so the liveness tick and a pending backoff
//! timer can never produce two sockets.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::models::TrafficSample;
use crate::telemetry::stream_manager::StreamManager;

/// Default liveness check period.
pub const LIVENESS_INTERVAL: Duration = Duration::from_secs(5);

pub struct TrafficGate {
    manager: StreamManager<TrafficSample>,
    running: watch::Receiver<bool>,
    liveness_interval: Duration,
}

impl TrafficGate {
    pub fn new(
        manager: StreamManager<TrafficSample>,
        running: watch::Receiver<bool>,
        liveness_interval: Duration,
    ) -> Self {
        Self {
            manager,
            running,
            liveness_interval,
        }
    }

    /// Runs until `shutdown` fires or the running-flag sender goes away, then
    /// leaves the traffic stream disconnected.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut liveness = tokio::time::interval(self.liveness_interval);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let initial = *self.running.borrow_and_update();
        self.apply(initial);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = self.running.changed() => {
                    if changed.is_err() {
                        log::warn!("service status source closed; stopping traffic gate");
                        break;
                    }
                    let running = *self.running.borrow_and_update();
                    self.apply(running);
                }
                _ = liveness.tick() => self.check_liveness(),
            }
        }

        self.manager.disconnect();
        self.manager.store().reset_traffic();
    }

    fn apply(&self, running: bool) {
        if running {
            log::info!("service running; connecting traffic stream");
            if let Err(e) = self.manager.connect() {
                log::error!("cannot connect traffic stream: {}", e);
            }
        } else {
            log::info!("service stopped; disconnecting traffic stream");
            self.manager.disconnect();
            self.manager.store().reset_traffic();
        }
    }

    fn check_liveness(&self) {
        if !*self.running.borrow() || self.manager.state().is_active() {
            return;
        }
        log::debug!(
            "liveness check: traffic stream is {}, reconnecting",
            self.manager.state()
        );
        if let Err(e) = self.manager.connect() {
            log::error!("liveness reconnect failed: {}", e);
        }
    }
}
