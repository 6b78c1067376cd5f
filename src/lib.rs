//! Consolidated real-time channel for live odds, injury, line-movement, news and prediction
//! feeds.
//!
//! A [`ConnectionManager`] owns one kameo actor per websocket address. Each connection queues
//! outbound frames while it is not open, reconnects with exponential backoff, keeps the socket
//! alive with a heartbeat, and routes decoded inbound messages through a shared, typed
//! [`Dispatcher`].

pub mod client;
pub mod core;
pub mod manager;
pub mod testing;
pub mod tls;
pub mod transport;
pub mod ws;

pub use crate::core::{
    ConnectOptions, ConnectOutcome, ConnectionEvent, ConnectionState, ConnectionStats,
    DeclineReason, Dispatcher, ExponentialBackoff, Handler, HeartbeatMode, InboundMessage,
    OutboundMessage, RealtimeConfig, RealtimeError, RealtimeResult, ReconnectStrategy,
    SendOutcome, Subscription, Topic,
};
pub use manager::ConnectionManager;
pub use transport::{TungsteniteTransport, WsTransport};
