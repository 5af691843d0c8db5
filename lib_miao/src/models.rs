//! Wire types shared by the stream decoders, the log buffer and the REST client.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two push channels the dashboard keeps open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Traffic,
    Logs,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Traffic => "traffic",
            StreamKind::Logs => "logs",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current throughput in bytes per second. The default value doubles as the
/// "disconnected" sentinel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrafficSample {
    pub up: u64,
    pub down: u64,
}

impl TrafficSample {
    pub fn new(up: u64, down: u64) -> Self {
        Self { up, down }
    }

    pub fn is_zero(&self) -> bool {
        self.up == 0 && self.down == 0
    }
}

/// Severity of a log line as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_upper(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_upper())
    }
}

/// One line from the service log stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO-8601 timestamp, kept verbatim so the identity key matches the wire.
    pub time: String,
    pub level: LogLevel,
    pub message: String,
}

/// Identity of a log entry. Two entries with the same key are duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogKey {
    time: String,
    level: LogLevel,
    message: String,
}

impl LogEntry {
    pub fn new(time: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            time: time.into(),
            level,
            message: message.into(),
        }
    }

    pub fn key(&self) -> LogKey {
        LogKey {
            time: self.time.clone(),
            level: self.level,
            message: self.message.clone(),
        }
    }
}

/// Export format: `time [LEVEL] message`.
impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.time, self.level, self.message)
    }
}
