//! # Stream Decoder
//!
//! Parses text frames into the typed frame of a stream. A frame that is not
//! JSON, has the wrong shape, or fails validation is dropped: the failure is
//! logged and counted, and nothing propagates to the caller.

use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::TelemetryError;
use crate::models::{LogEntry, StreamKind, TrafficSample};

/// A typed frame carried by one of the streams.
pub trait Frame: DeserializeOwned + Send + 'static {
    const STREAM: StreamKind;

    /// Semantic checks beyond what the schema enforces.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl Frame for TrafficSample {
    const STREAM: StreamKind = StreamKind::Traffic;
}

impl Frame for LogEntry {
    const STREAM: StreamKind = StreamKind::Logs;

    fn validate(&self) -> Result<(), String> {
        if self.time.trim().is_empty() {
            return Err("empty timestamp".to_string());
        }
        Ok(())
    }
}

/// Strict decode of one text payload.
pub fn decode<F: Frame>(text: &str) -> Result<F, TelemetryError> {
    let frame: F = serde_json::from_str(text).map_err(|e| TelemetryError::Decode {
        stream: F::STREAM,
        reason: e.to_string(),
    })?;
    frame.validate().map_err(|reason| TelemetryError::Decode {
        stream: F::STREAM,
        reason,
    })?;
    Ok(frame)
}

/// Per-stream decoder that swallows failures and keeps a dropped-frame count
/// for diagnostics.
#[derive(Debug)]
pub struct StreamDecoder<F> {
    dropped: AtomicU64,
    _frame: PhantomData<fn() -> F>,
}

impl<F: Frame> Default for StreamDecoder<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Frame> StreamDecoder<F> {
    pub fn new() -> Self {
        Self {
            dropped: AtomicU64::new(0),
            _frame: PhantomData,
        }
    }

    /// Decodes a text frame, or records the failure and returns `None`.
    pub fn feed(&self, text: &str) -> Option<F> {
        match decode::<F>(text) {
            Ok(frame) => Some(frame),
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("[{}] dropping frame: {}", F::STREAM, e);
                None
            }
        }
    }

    /// Binary payloads are not part of either stream's protocol.
    pub fn reject_binary(&self, len: usize) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        log::warn!("[{}] dropping unexpected binary frame ({} bytes)", F::STREAM, len);
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
