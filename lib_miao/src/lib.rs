//! # lib_miao
//!
//! Client-side telemetry library for the Miao dashboard. It keeps a local view
//! of the remote service's live state (traffic counters and log lines) in sync
//! over two long-lived WebSocket streams, recovering from disconnects without
//! duplicating or losing log entries.
//!
//! ## Modules:
//! - **`models`**: wire types for traffic samples and log entries.
//! - **`error`**: the crate-wide `TelemetryError`.
//! - **`telemetry`** (feature `telemetry`): backoff policy, frame decoder, log
//!   buffer, connection state machine, telemetry store, stream managers and
//!   the traffic gate.
//! - **`credentials`** (feature `telemetry`): bearer token sources.
//! - **`client`** (feature `telemetry`): the composition root wiring it all up.
//! - **`retrieve`** (feature `retrieve`): REST client and status poller.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod error;
pub mod models;

#[cfg(feature = "telemetry")]
pub mod client;
#[cfg(feature = "telemetry")]
pub mod credentials;
#[cfg(feature = "telemetry")]
pub mod telemetry;

#[cfg(feature = "retrieve")]
pub mod retrieve;

// --- Public API Re-exports ---
pub use error::TelemetryError;
pub use models::{LogEntry, LogKey, LogLevel, StreamKind, TrafficSample};

#[cfg(feature = "telemetry")]
pub use client::{TelemetryClient, TelemetryConfig};
#[cfg(feature = "telemetry")]
pub use credentials::{CredentialSource, SessionToken, TokenFile};
#[cfg(feature = "telemetry")]
pub use url::Url;

#[cfg(feature = "retrieve")]
pub use retrieve::{DashboardApi, ServiceStatus, StatusPoller};
