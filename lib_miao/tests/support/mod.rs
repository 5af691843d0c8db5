//! In-process dashboard server for the integration tests: the two WebSocket
//! streams plus the REST endpoints, all behind the same bearer token.

#![allow(dead_code)]

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lib_miao::{LogEntry, SessionToken, TelemetryConfig};

pub const TOKEN: &str = "secret";

/// What the server does on one accepted stream connection.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub frames: Vec<Message>,
    /// Close from the server side once the frames are sent.
    pub close_after: bool,
}

impl Script {
    pub fn text<I, S>(frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            frames: frames
                .into_iter()
                .map(|f| Message::Text(Into::<String>::into(f).into()))
                .collect(),
            close_after: false,
        }
    }

    pub fn then_close(mut self) -> Self {
        self.close_after = true;
        self
    }
}

/// One WebSocket route: a queue of scripts, one popped per connection.
#[derive(Clone, Default)]
pub struct Endpoint {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    accepted: Arc<AtomicUsize>,
    ended: Arc<AtomicUsize>,
}

impl Endpoint {
    pub fn push(&self, script: Script) {
        self.scripts.lock().expect("scripts lock").push_back(script);
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Connections that have finished on the server side.
    pub fn ended(&self) -> usize {
        self.ended.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> Script {
        self.scripts
            .lock()
            .expect("scripts lock")
            .pop_front()
            .unwrap_or_default()
    }
}

#[derive(Clone, Default)]
pub struct Rest {
    pub running: Arc<Mutex<bool>>,
    pub logs: Arc<Mutex<Vec<LogEntry>>>,
    pub status_calls: Arc<AtomicUsize>,
}

impl Rest {
    pub fn set_running(&self, running: bool) {
        *self.running.lock().expect("running lock") = running;
    }

    pub fn set_logs(&self, logs: Vec<LogEntry>) {
        *self.logs.lock().expect("logs lock") = logs;
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub traffic: Endpoint,
    pub logs: Endpoint,
    pub rest: Rest,
}

impl TestServer {
    pub async fn start() -> Self {
        let traffic = Endpoint::default();
        let logs = Endpoint::default();
        let rest = Rest::default();

        let app = Router::new()
            .route("/ws/traffic", get(ws_handler).with_state(traffic.clone()))
            .route("/ws/logs", get(ws_handler).with_state(logs.clone()))
            .route("/api/status", get(status_handler).with_state(rest.clone()))
            .route("/api/logs", get(logs_handler).with_state(rest.clone()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test server");
        });

        Self {
            addr,
            traffic,
            logs,
            rest,
        }
    }

    pub fn ws_base(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    pub fn api_base(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Client config pointing at this server with fast reconnection.
    pub fn config(&self) -> TelemetryConfig {
        TelemetryConfig {
            server_url: self.ws_base(),
            reconnect_base_delay_ms: 10,
            reconnect_max_delay_ms: 100,
            ..TelemetryConfig::default()
        }
    }
}

pub fn session() -> Arc<SessionToken> {
    Arc::new(SessionToken::new(Some(TOKEN.to_string())))
}

async fn ws_handler(
    State(endpoint): State<Endpoint>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    if params.get("token").map(String::as_str) != Some(TOKEN) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    endpoint.accepted.fetch_add(1, Ordering::SeqCst);
    let script = endpoint.next_script();
    ws.on_upgrade(move |socket| async move {
        serve_script(socket, script).await;
        endpoint.ended.fetch_add(1, Ordering::SeqCst);
    })
}

async fn serve_script(mut socket: WebSocket, script: Script) {
    for frame in script.frames {
        if socket.send(frame).await.is_err() {
            return;
        }
    }
    if script.close_after {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }
    while let Some(Ok(msg)) = socket.recv().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", TOKEN))
}

async fn status_handler(State(rest): State<Rest>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "bad token").into_response();
    }
    rest.status_calls.fetch_add(1, Ordering::SeqCst);
    let running = *rest.running.lock().expect("running lock");
    Json(serde_json::json!({ "running": running, "version": "test" })).into_response()
}

async fn logs_handler(State(rest): State<Rest>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "bad token").into_response();
    }
    let logs = rest.logs.lock().expect("logs lock").clone();
    Json(logs).into_response()
}

/// Polls `cond` every 10ms for up to five seconds.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
