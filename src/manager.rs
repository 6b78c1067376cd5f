//! Application-facing entry point: one record per address, one shared dispatcher.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use kameo::error::SendError;
use kameo::prelude::{Actor, ActorRef};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::core::{
    ConnectOptions, ConnectOutcome, ConnectionEvent, ConnectionState, ConnectionStats, Dispatcher,
    ExponentialBackoff, Handler, InboundMessage, OutboundMessage, RealtimeConfig, RealtimeError,
    RealtimeResult, SendOutcome, Subscription, Topic,
};
use crate::transport::{TungsteniteTransport, WsTransport};
use crate::ws::{
    Connect, ConnectionActor, ConnectionActorArgs, Disconnect, GetConnectionStats, SendFrame,
};

struct ConnectionRecord<T: WsTransport> {
    actor: ActorRef<ConnectionActor<T>>,
    state: watch::Receiver<ConnectionState>,
}

/// Owns every connection of the process.
///
/// Construct one at startup and pass it by reference. The address registry is only mutated
/// through `&mut self`; per-connection work happens inside each connection's actor.
pub struct ConnectionManager<T: WsTransport = TungsteniteTransport> {
    config: Arc<RealtimeConfig>,
    transport: T,
    dispatcher: Dispatcher,
    events: broadcast::Sender<ConnectionEvent>,
    connections: HashMap<String, ConnectionRecord<T>>,
}

impl ConnectionManager<TungsteniteTransport> {
    pub fn new(config: RealtimeConfig) -> RealtimeResult<Self> {
        Self::with_transport(config, TungsteniteTransport::default())
    }
}

impl<T: WsTransport> ConnectionManager<T> {
    pub fn with_transport(config: RealtimeConfig, transport: T) -> RealtimeResult<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);
        Ok(Self {
            config: Arc::new(config),
            transport,
            dispatcher: Dispatcher::new(),
            events,
            connections: HashMap::new(),
        })
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    /// Open (or keep) a connection to `address`.
    ///
    /// `options` apply whenever a handshake is started, including the restart of a failed or
    /// idle record. A connection that is already active keeps its current options.
    ///
    /// Declined addresses are reported as [`ConnectOutcome::Declined`] and leave no record.
    pub async fn connect(
        &mut self,
        address: &str,
        options: ConnectOptions,
    ) -> RealtimeResult<ConnectOutcome> {
        let address = address.trim();
        if let Err(reason) = self.config.check_address(address) {
            info!(address = %address, reason = %reason, "connect declined");
            return Ok(ConnectOutcome::Declined(reason));
        }

        if let Some(record) = self.connections.get(address) {
            return record
                .actor
                .ask(Connect { options })
                .await
                .map_err(actor_error);
        }

        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let actor = ConnectionActor::spawn(ConnectionActorArgs {
            address: address.to_string(),
            options: options.clone(),
            config: Arc::clone(&self.config),
            transport: self.transport.clone(),
            reconnect: ExponentialBackoff::from_config(&self.config),
            dispatcher: self.dispatcher.clone(),
            events: self.events.clone(),
            state: state_tx,
        });
        self.connections.insert(
            address.to_string(),
            ConnectionRecord {
                actor: actor.clone(),
                state: state_rx,
            },
        );
        debug!(address = %address, "connection record created");
        actor.ask(Connect { options }).await.map_err(actor_error)
    }

    /// Close and forget `address`. Unknown addresses are a no-op.
    pub async fn disconnect(&mut self, address: &str) {
        let Some(record) = self.connections.remove(address.trim()) else {
            return;
        };
        if let Err(err) = record.actor.ask(Disconnect).await {
            warn!(address = %address, error = %err, "disconnect request failed");
        }
        let _ = record.actor.stop_gracefully().await;
        record.actor.wait_for_shutdown().await;
    }

    pub fn state(&self, address: &str) -> Option<ConnectionState> {
        self.connections
            .get(address.trim())
            .map(|record| *record.state.borrow())
    }

    pub fn is_connected(&self, address: &str) -> bool {
        self.state(address) == Some(ConnectionState::Connected)
    }

    /// Write `message` now or queue it until the connection opens.
    ///
    /// Only an unknown address is an error; a full queue drops the message and reports it as
    /// [`SendOutcome::Dropped`] plus an `Error` event.
    pub async fn send(
        &self,
        address: &str,
        message: &OutboundMessage,
    ) -> RealtimeResult<SendOutcome> {
        let record = self.record(address)?;
        let frame = message.encode()?;
        record
            .actor
            .ask(SendFrame { frame })
            .await
            .map_err(actor_error)
    }

    pub fn subscribe(&self, topic: Topic, handler: Handler) -> Subscription {
        self.dispatcher.subscribe(topic, handler)
    }

    pub fn subscribe_fn<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe_fn(topic, handler)
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// Receiver for lifecycle notifications of every connection.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub async fn stats(&self, address: &str) -> RealtimeResult<ConnectionStats> {
        self.record(address)?
            .actor
            .ask(GetConnectionStats)
            .await
            .map_err(actor_error)
    }

    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.connections.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Disconnect everything.
    pub async fn shutdown(&mut self) {
        let addresses: Vec<String> = self.connections.keys().cloned().collect();
        for address in addresses {
            self.disconnect(&address).await;
        }
        info!("connection manager shut down");
    }

    fn record(&self, address: &str) -> RealtimeResult<&ConnectionRecord<T>> {
        let address = address.trim();
        self.connections
            .get(address)
            .ok_or_else(|| RealtimeError::NoConnection {
                address: address.to_string(),
            })
    }
}

fn actor_error<M, E: fmt::Display>(err: SendError<M, E>) -> RealtimeError {
    RealtimeError::ActorError(err.to_string())
}
