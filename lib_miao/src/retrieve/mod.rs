//! # Dashboard REST Retrieval
//!
//! Request/response access to the dashboard API, complementing the push
//! streams:
//!
//! - **`dashboard_api`**: `DashboardApi`, a `reqwest` client with retry
//!   middleware and bearer auth, exposing the service status and the recent
//!   log lines.
//! - **`status_poller`**: `StatusPoller`, which turns the status endpoint
//!   into the `watch` channel that drives the traffic gate.

pub mod dashboard_api;
pub mod status_poller;

pub use dashboard_api::{DashboardApi, ServiceStatus};
pub use status_poller::{StatusPoller, STATUS_POLL_INTERVAL};
