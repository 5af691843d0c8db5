//! # Telemetry Engine Module
//!
//! Everything needed to keep the dashboard's live view in sync with the
//! service over two long-lived WebSocket streams.
//!
//! ## Components:
//!
//! - **`backoff`**: the deterministic reconnection delay policy.
//! - **`decoder`**: turns text frames into validated `TrafficSample` /
//!   `LogEntry` values, dropping anything malformed.
//! - **`log_buffer`**: the newest-first, 500-entry, deduplicating log buffer.
//! - **`connection`**: the per-stream lifecycle state machine.
//! - **`store`**: the application state the view layer reads and subscribes to.
//! - **`stream_manager`**: owns one socket per stream and drives reconnection.
//! - **`traffic_gate`**: connects the traffic stream only while the service runs.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Exponential reconnection delay.
pub mod backoff;
/// Per-stream connection lifecycle.
pub mod connection;
/// Frame decoding with drop-on-error semantics.
pub mod decoder;
/// Bounded, deduplicating log buffer.
pub mod log_buffer;
/// Shared telemetry state with change subscriptions.
pub mod store;
/// Socket ownership and reconnection.
pub mod stream_manager;
/// Running-flag driven connection of the traffic stream.
pub mod traffic_gate;

// --- Public API Re-exports ---
pub use backoff::Backoff;
pub use connection::{ConnectionState, StreamEvent};
pub use decoder::{Frame, StreamDecoder};
pub use log_buffer::{LogBuffer, LOG_BUFFER_CAPACITY};
pub use store::{StoreEvent, TelemetryStore};
pub use stream_manager::{Dialer, StreamFrame, StreamGuard, StreamManager, WsDialer};
pub use traffic_gate::TrafficGate;
