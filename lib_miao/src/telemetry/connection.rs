/// Lifecycle of one stream's socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Never connected.
    #[default]
    Idle,
    /// A dial is in flight.
    Connecting,
    /// The socket is open and frames are being applied.
    Open,
    /// `disconnect()` was called on an open socket; the close handshake is running.
    Closing,
    /// No socket. A reconnection may be pending if the close was unsolicited.
    Closed,
}

/// Inputs driving `ConnectionState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamEvent {
    /// `connect()` started a dial.
    Connect,
    /// The handshake completed.
    Opened,
    /// A frame arrived.
    Message,
    /// A transport or decode error was reported.
    Error,
    /// The socket closed, or the dial failed.
    Closed,
    /// `disconnect()` was called.
    UserDisconnect,
}

impl ConnectionState {
    /// Pure transition function. Events that make no sense in the current
    /// state leave it unchanged.
    pub fn on_event(self, event: StreamEvent) -> ConnectionState {
        use ConnectionState::*;

        match (self, event) {
            (Idle | Closing | Closed, StreamEvent::Connect) => Connecting,
            (Connecting, StreamEvent::Opened) => Open,
            (Connecting | Open | Closing, StreamEvent::Closed) => Closed,
            // Nothing to close yet: the pending dial is simply abandoned.
            (Connecting, StreamEvent::UserDisconnect) => Closed,
            (Open, StreamEvent::UserDisconnect) => Closing,
            // Messages and errors never move the state; close drives recovery.
            (state, _) => state,
        }
    }

    /// `connect()` is a no-op while this holds.
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }

    pub fn is_open(self) -> bool {
        self == ConnectionState::Open
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
