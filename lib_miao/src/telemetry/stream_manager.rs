//! # Stream Manager
//!
//! Owns exactly one socket per logical stream and supervises its lifecycle:
//!
//! - `connect()` is idempotent while a dial is in flight or the socket is open,
//!   and fails fast with `MissingCredential` when no token is available.
//! - An unsolicited close (or a failed dial) schedules a reconnection after
//!   `Backoff::delay(failure_count)` and then bumps the failure count.
//! - `disconnect()` cancels a pending reconnection under the same lock the
//!   timer checks before dialing, so a cancelled timer never connects.
//!
//! Every socket gets a session id. Events from a session that is no longer
//! current (superseded by `disconnect()` or a newer `connect()`) are ignored,
//! and frames are only applied to the store while their session is open.

use futures_util::future::BoxFuture;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::credentials::CredentialSource;
use crate::error::TelemetryError;
use crate::models::{LogEntry, StreamKind, TrafficSample};
use crate::telemetry::backoff::Backoff;
use crate::telemetry::connection::{ConnectionState, StreamEvent};
use crate::telemetry::decoder::{Frame, StreamDecoder};
use crate::telemetry::store::TelemetryStore;

/// A decoded frame that knows how to land in the store.
pub trait StreamFrame: Frame {
    fn apply(self, store: &TelemetryStore);
}

impl StreamFrame for TrafficSample {
    fn apply(self, store: &TelemetryStore) {
        store.set_traffic(self);
    }
}

impl StreamFrame for LogEntry {
    fn apply(self, store: &TelemetryStore) {
        store.insert_log(self);
    }
}

/// A full-duplex WebSocket as seen by the manager.
pub trait Socket:
    Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + Unpin
{
}

impl<T> Socket for T where
    T: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + Unpin
{
}

pub type BoxSocket = Box<dyn Socket>;

/// Opens sockets. The production implementation is `WsDialer`; tests swap in
/// dialers that fail or hang on demand.
pub trait Dialer: Send + Sync + 'static {
    fn dial(&self, url: Url) -> BoxFuture<'static, Result<BoxSocket, TelemetryError>>;
}

/// Dials with `tokio_tungstenite::connect_async`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsDialer;

impl Dialer for WsDialer {
    fn dial(&self, url: Url) -> BoxFuture<'static, Result<BoxSocket, TelemetryError>> {
        Box::pin(async move {
            let (ws_stream, _) = connect_async(url.as_str())
                .await
                .map_err(|e| TelemetryError::Transport(e.to_string()))?;
            Ok(Box::new(ws_stream) as BoxSocket)
        })
    }
}

/// Appends the bearer token as the `token` query parameter.
pub fn stream_url(endpoint: &Url, token: &str) -> Url {
    let mut url = endpoint.clone();
    url.query_pairs_mut().append_pair("token", token);
    url
}

struct Session {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Inner {
    state: ConnectionState,
    failure_count: u32,
    next_session_id: u64,
    session: Option<Session>,
    /// Session whose close handshake is running after `disconnect()`.
    closing: Option<u64>,
    reconnect: Option<CancellationToken>,
}

impl Inner {
    fn is_current(&self, id: u64) -> bool {
        self.session.as_ref().is_some_and(|s| s.id == id)
    }
}

struct Shared<F> {
    endpoint: Url,
    credentials: Arc<dyn CredentialSource>,
    dialer: Arc<dyn Dialer>,
    backoff: Backoff,
    store: Arc<TelemetryStore>,
    decoder: StreamDecoder<F>,
    dial_attempts: AtomicU64,
    inner: Mutex<Inner>,
}

/// Handle to one stream's connection. Cloning is cheap; all clones drive the
/// same socket.
pub struct StreamManager<F> {
    shared: Arc<Shared<F>>,
}

impl<F> Clone for StreamManager<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F: StreamFrame> StreamManager<F> {
    pub fn new(
        endpoint: Url,
        credentials: Arc<dyn CredentialSource>,
        store: Arc<TelemetryStore>,
        backoff: Backoff,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                endpoint,
                credentials,
                dialer,
                backoff,
                store,
                decoder: StreamDecoder::new(),
                dial_attempts: AtomicU64::new(0),
                inner: Mutex::new(Inner::default()),
            }),
        }
    }

    /// Manager that dials real WebSockets.
    pub fn websocket(
        endpoint: Url,
        credentials: Arc<dyn CredentialSource>,
        store: Arc<TelemetryStore>,
        backoff: Backoff,
    ) -> Self {
        Self::new(endpoint, credentials, store, backoff, Arc::new(WsDialer))
    }

    pub fn stream(&self) -> StreamKind {
        F::STREAM
    }

    pub fn endpoint(&self) -> &Url {
        &self.shared.endpoint
    }

    pub fn store(&self) -> &Arc<TelemetryStore> {
        &self.shared.store
    }

    pub fn state(&self) -> ConnectionState {
        self.lock_inner().state
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    pub fn failure_count(&self) -> u32 {
        self.lock_inner().failure_count
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.lock_inner().reconnect.is_some()
    }

    /// Frames dropped by the decoder since creation.
    pub fn dropped_frames(&self) -> u64 {
        self.shared.decoder.dropped()
    }

    /// Dials started since creation, including reconnections.
    pub fn dial_attempts(&self) -> u64 {
        self.shared.dial_attempts.load(Ordering::Relaxed)
    }

    /// Starts a connection unless one is already open or in flight.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) -> Result<(), TelemetryError> {
        let mut inner = self.lock_inner();
        self.connect_locked(&mut inner)
    }

    /// Closes the socket, cancels any pending reconnection and resets the
    /// failure count. No automatic reconnection follows.
    pub fn disconnect(&self) {
        let mut inner = self.lock_inner();
        if let Some(timer) = inner.reconnect.take() {
            timer.cancel();
        }
        inner.failure_count = 0;

        let previous = inner.state;
        inner.state = previous.on_event(StreamEvent::UserDisconnect);
        if let Some(session) = inner.session.take() {
            session.cancel.cancel();
            if inner.state == ConnectionState::Closing {
                inner.closing = Some(session.id);
            }
        }
        if previous != inner.state {
            log::info!("[{}] disconnected ({} -> {})", F::STREAM, previous, inner.state);
        }
        self.shared.store.set_connected(F::STREAM, false);
    }

    /// Ties the stream's lifetime to the returned guard: dropping it calls
    /// `disconnect()` once.
    pub fn bind(&self) -> StreamGuard<F> {
        StreamGuard {
            manager: Some(self.clone()),
        }
    }

    fn connect_locked(&self, inner: &mut Inner) -> Result<(), TelemetryError> {
        if inner.state.is_active() {
            log::trace!("[{}] connect ignored, already {}", F::STREAM, inner.state);
            return Ok(());
        }
        let token = self
            .shared
            .credentials
            .token()
            .ok_or(TelemetryError::MissingCredential)?;

        // A manual connect supersedes a scheduled one.
        if let Some(timer) = inner.reconnect.take() {
            timer.cancel();
        }

        inner.next_session_id += 1;
        let id = inner.next_session_id;
        let cancel = CancellationToken::new();
        inner.session = Some(Session {
            id,
            cancel: cancel.clone(),
        });
        inner.state = inner.state.on_event(StreamEvent::Connect);

        let url = stream_url(&self.shared.endpoint, &token);
        let manager = self.clone();
        tokio::spawn(async move { manager.run_session(id, url, cancel).await });
        Ok(())
    }

    async fn run_session(self, id: u64, url: Url, cancel: CancellationToken) {
        self.shared.dial_attempts.fetch_add(1, Ordering::Relaxed);
        log::info!("[{}] connecting to {}", F::STREAM, self.shared.endpoint);

        let dialed = tokio::select! {
            _ = cancel.cancelled() => return,
            dialed = self.shared.dialer.dial(url) => dialed,
        };

        let mut socket = match dialed {
            Ok(socket) => socket,
            Err(e) => {
                log::warn!("[{}] connection failed: {}", F::STREAM, e);
                self.on_closed(id);
                return;
            }
        };

        if !self.on_opened(id) {
            if let Err(e) = socket.close().await {
                log::debug!("[{}] close of superseded socket failed: {}", F::STREAM, e);
            }
            return;
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    if let Err(e) = socket.close().await {
                        log::debug!("[{}] close handshake failed: {}", F::STREAM, e);
                    }
                    self.on_user_closed(id);
                    return;
                }
                msg = socket.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(frame) = self.shared.decoder.feed(text.as_str()) {
                            self.deliver(id, frame);
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        self.shared.decoder.reject_binary(bytes.len());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        log::info!("[{}] server closed the stream: {:?}", F::STREAM, frame);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        // tungstenite treats read errors as terminal; the
                        // close that follows drives the reconnection.
                        log::error!("[{}] read error: {}", F::STREAM, e);
                        break;
                    }
                    None => {
                        log::warn!("[{}] stream ended by remote host", F::STREAM);
                        break;
                    }
                }
            }
        }
        self.on_closed(id);
    }

    fn on_opened(&self, id: u64) -> bool {
        let mut inner = self.lock_inner();
        if !inner.is_current(id) || inner.state != ConnectionState::Connecting {
            return false;
        }
        inner.state = inner.state.on_event(StreamEvent::Opened);
        inner.failure_count = 0;
        log::info!("[{}] stream open", F::STREAM);
        self.shared.store.set_connected(F::STREAM, true);
        true
    }

    fn deliver(&self, id: u64, frame: F) {
        let inner = self.lock_inner();
        if inner.is_current(id) && inner.state == ConnectionState::Open {
            frame.apply(&self.shared.store);
        }
    }

    /// Unsolicited close or failed dial.
    fn on_closed(&self, id: u64) {
        let mut inner = self.lock_inner();
        if !inner.is_current(id) {
            // The socket may die on its own right after disconnect() took it.
            Self::finish_user_close(&mut inner, id);
            return;
        }
        inner.session = None;
        inner.state = inner.state.on_event(StreamEvent::Closed);
        self.shared.store.set_connected(F::STREAM, false);

        let delay = self.shared.backoff.delay(inner.failure_count);
        inner.failure_count = inner.failure_count.saturating_add(1);
        log::info!(
            "[{}] reconnecting in {:?} (failure #{})",
            F::STREAM,
            delay,
            inner.failure_count
        );
        self.schedule_reconnect(&mut inner, delay);
    }

    fn on_user_closed(&self, id: u64) {
        let mut inner = self.lock_inner();
        Self::finish_user_close(&mut inner, id);
    }

    fn finish_user_close(inner: &mut Inner, id: u64) {
        if inner.closing == Some(id) {
            inner.closing = None;
            if inner.state == ConnectionState::Closing {
                inner.state = inner.state.on_event(StreamEvent::Closed);
            }
        }
    }

    fn schedule_reconnect(&self, inner: &mut Inner, delay: Duration) {
        let timer = CancellationToken::new();
        if let Some(previous) = inner.reconnect.replace(timer.clone()) {
            previous.cancel();
        }
        let manager = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(delay) => manager.reconnect_due(&timer),
            }
        });
    }

    fn reconnect_due(&self, timer: &CancellationToken) {
        let mut inner = self.lock_inner();
        // disconnect() cancels under this lock, so this check is final.
        if timer.is_cancelled() {
            return;
        }
        inner.reconnect = None;
        if let Err(e) = self.connect_locked(&mut inner) {
            log::error!("[{}] reconnection abandoned: {}", F::STREAM, e);
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// View binding guard: disconnects its stream exactly once when dropped.
pub struct StreamGuard<F: StreamFrame> {
    manager: Option<StreamManager<F>>,
}

impl<F: StreamFrame> StreamGuard<F> {
    pub fn manager(&self) -> Option<&StreamManager<F>> {
        self.manager.as_ref()
    }
}

impl<F: StreamFrame> Drop for StreamGuard<F> {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.take() {
            manager.disconnect();
        }
    }
}
