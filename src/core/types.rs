use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Convenience result alias for real-time channel operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Canonical error surface shared across the real-time channel.
///
/// Transport-level failures are recovered locally (retried or dropped) and reach the
/// application as [`ConnectionEvent`]s; only misuse such as sending to an unknown address
/// is returned from calls.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("No connection record for {address}")]
    NoConnection { address: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Transport error ({context}): {error}")]
    TransportError {
        context: &'static str,
        error: String,
    },

    #[error("Parse failed: {0}")]
    ParseFailed(String),

    #[error("Actor error: {0}")]
    ActorError(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Lifecycle of one logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    /// Retry budget exhausted; only a manual `connect` leaves this state.
    Failed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
            ConnectionState::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications for cross-cutting observers (logging, toasts, banners).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected {
        address: String,
    },
    Disconnected {
        address: String,
        reason: String,
    },
    Error {
        address: String,
        error: String,
    },
    Reconnecting {
        address: String,
        attempt: u32,
        delay: Duration,
    },
    ReconnectFailed {
        address: String,
        attempts: u32,
    },
}

impl ConnectionEvent {
    pub fn address(&self) -> &str {
        match self {
            ConnectionEvent::Connected { address }
            | ConnectionEvent::Disconnected { address, .. }
            | ConnectionEvent::Error { address, .. }
            | ConnectionEvent::Reconnecting { address, .. }
            | ConnectionEvent::ReconnectFailed { address, .. } => address,
        }
    }

    /// Stable event name, matching the listener keys UI code registers against.
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionEvent::Connected { .. } => "connected",
            ConnectionEvent::Disconnected { .. } => "disconnected",
            ConnectionEvent::Error { .. } => "error",
            ConnectionEvent::Reconnecting { .. } => "reconnecting",
            ConnectionEvent::ReconnectFailed { .. } => "reconnect_failed",
        }
    }
}

/// Why a live or pending socket went away.
#[derive(Debug, Clone)]
pub enum DisconnectCause {
    RemoteClosed,
    ReadFailure { error: String },
    WriteFailure { error: String },
    HandshakeFailed { message: String },
    StaleData,
}

impl DisconnectCause {
    /// Transport-level failures are also surfaced as `error` notifications.
    pub fn transport_error(&self) -> Option<&str> {
        match self {
            DisconnectCause::ReadFailure { error } | DisconnectCause::WriteFailure { error } => {
                Some(error)
            }
            DisconnectCause::HandshakeFailed { message } => Some(message),
            DisconnectCause::RemoteClosed | DisconnectCause::StaleData => None,
        }
    }
}

/// Result of a `connect` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A handshake was started (fresh record or restart of a failed one).
    Started,
    /// The address is already connecting, connected, or waiting on a scheduled retry.
    AlreadyActive,
    /// Configuration refused the address; nothing was created.
    Declined(DeclineReason),
}

/// Configuration checks that make `connect` silently decline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclineReason {
    EmptyAddress,
    Disabled,
    InvalidAddress(String),
    BlockedHost(String),
}

impl fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclineReason::EmptyAddress => f.write_str("empty address"),
            DeclineReason::Disabled => f.write_str("real-time connections disabled"),
            DeclineReason::InvalidAddress(detail) => write!(f, "invalid address: {detail}"),
            DeclineReason::BlockedHost(host) => write!(f, "host {host} is blocked"),
        }
    }
}

/// Result of handing a message to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Written,
    Queued,
    /// Queue at capacity; the message was discarded.
    Dropped,
}

/// Transport-independent buffer sizing parameters used for websocket configuration.
#[derive(Clone, Copy, Debug)]
pub struct WebSocketBufferConfig {
    pub write_buffer_bytes: usize,
    pub max_write_buffer_bytes: usize,
    pub max_message_bytes: usize,
    pub max_frame_bytes: usize,
}

impl Default for WebSocketBufferConfig {
    fn default() -> Self {
        Self {
            write_buffer_bytes: 128 << 10,
            max_write_buffer_bytes: 256 << 10,
            max_message_bytes: 4 << 20,
            max_frame_bytes: 4 << 20,
        }
    }
}

/// Connection statistics snapshot.
#[derive(Clone, Debug)]
pub struct ConnectionStats {
    pub state: ConnectionState,
    pub uptime: Duration,
    pub messages_in: u64,
    pub messages_out: u64,
    pub dropped_frames: u64,
    pub errors: u64,
    pub reconnects: u64,
    pub queued: usize,
    pub last_activity_age: Duration,
    pub p50_rtt_us: u64,
    pub p99_rtt_us: u64,
    pub rtt_samples: u64,
}
