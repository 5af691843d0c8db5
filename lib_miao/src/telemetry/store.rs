//! # Telemetry Store
//!
//! The application state the rendering layer reads: the latest traffic
//! sample, a connected flag per stream and the log buffer. It is the only
//! owner of the `LogBuffer`; every mutation goes through the methods below.
//!
//! ## Change notification
//!
//! Each subscriber gets its own unbounded channel, so a slow view can never
//! cause an update to be lost. Every discrete change produces exactly one
//! `StoreEvent` per subscriber, sent while the state lock is still held so
//! that events arrive in mutation order. Subscribers whose receiver was
//! dropped are pruned on the next send.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use crate::models::{LogEntry, StreamKind, TrafficSample};
use crate::telemetry::log_buffer::LogBuffer;

/// One discrete change to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Traffic(TrafficSample),
    Connection { stream: StreamKind, connected: bool },
    LogAppended(LogEntry),
    LogsReplaced { count: usize },
    LogsCleared,
}

#[derive(Debug, Default)]
struct StoreState {
    traffic: TrafficSample,
    traffic_connected: bool,
    logs_connected: bool,
    logs: LogBuffer,
}

impl StoreState {
    fn connected_flag(&mut self, stream: StreamKind) -> &mut bool {
        match stream {
            StreamKind::Traffic => &mut self.traffic_connected,
            StreamKind::Logs => &mut self.logs_connected,
        }
    }
}

/// Shared, internally synchronized telemetry state.
#[derive(Debug, Default)]
pub struct TelemetryStore {
    state: Mutex<StoreState>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<StoreEvent>>>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new observer. Only changes made after this call are delivered.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StoreEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.subscribers).push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    // --- Accessors ---

    /// Latest sample, or zero while the traffic stream is down.
    pub fn traffic(&self) -> TrafficSample {
        lock(&self.state).traffic
    }

    pub fn is_connected(&self, stream: StreamKind) -> bool {
        *lock(&self.state).connected_flag(stream)
    }

    /// Newest first.
    pub fn logs(&self) -> Vec<LogEntry> {
        lock(&self.state).logs.snapshot()
    }

    pub fn log_count(&self) -> usize {
        lock(&self.state).logs.len()
    }

    /// `time [LEVEL] message` per line, newest first.
    pub fn export_logs(&self) -> String {
        lock(&self.state).logs.export_text()
    }

    // --- Mutators ---

    /// Replaces the current sample. Returns `false` if it was unchanged.
    pub fn set_traffic(&self, sample: TrafficSample) -> bool {
        let mut state = lock(&self.state);
        if state.traffic == sample {
            return false;
        }
        state.traffic = sample;
        self.notify(StoreEvent::Traffic(sample));
        true
    }

    pub fn reset_traffic(&self) -> bool {
        self.set_traffic(TrafficSample::default())
    }

    /// Updates a stream's connected flag. The traffic sample falls back to
    /// zero whenever the traffic stream goes down.
    pub fn set_connected(&self, stream: StreamKind, connected: bool) -> bool {
        let mut state = lock(&self.state);
        let flag = state.connected_flag(stream);
        if *flag == connected {
            return false;
        }
        *flag = connected;
        self.notify(StoreEvent::Connection { stream, connected });

        if stream == StreamKind::Traffic && !connected && !state.traffic.is_zero() {
            state.traffic = TrafficSample::default();
            self.notify(StoreEvent::Traffic(state.traffic));
        }
        true
    }

    /// Dedup insert; returns `false` for an entry already in the buffer.
    pub fn insert_log(&self, entry: LogEntry) -> bool {
        let mut state = lock(&self.state);
        if !state.logs.insert(entry.clone()) {
            return false;
        }
        self.notify(StoreEvent::LogAppended(entry));
        true
    }

    /// Bulk load, newest first. Returns the number of entries kept.
    pub fn replace_logs(&self, entries: Vec<LogEntry>) -> usize {
        let mut state = lock(&self.state);
        state.logs.replace_all(entries);
        let count = state.logs.len();
        self.notify(StoreEvent::LogsReplaced { count });
        count
    }

    /// Empties the buffer. Returns `false` if it was already empty.
    pub fn clear_logs(&self) -> bool {
        let mut state = lock(&self.state);
        if state.logs.is_empty() {
            return false;
        }
        state.logs.clear();
        self.notify(StoreEvent::LogsCleared);
        true
    }

    fn notify(&self, event: StoreEvent) {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
