//! Per-address connection actor.
//!
//! The socket read loop runs in a plain tokio task and forwards decoded events into the
//! mailbox; the actor owns lifecycle state, the outbound queue, the reconnect policy and the
//! heartbeat. Every handshake, reader and timer carries the epoch it was started under so
//! results from a superseded socket are dropped on arrival.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use kameo::error::{ActorStopReason, SendError};
use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage, PanicError, WeakActorRef};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use super::writer::{FrameWriter, WriterClose, WriterWrite, WriterWriteBatch};
use crate::core::{
    CLOSE_NORMAL, ConnectOptions, ConnectOutcome, ConnectionEvent, ConnectionState,
    ConnectionStats, DisconnectCause, Dispatcher, ExponentialBackoff, HealthMonitor, Heartbeat,
    HeartbeatSignal, Inbound, InboundMessage, RealtimeConfig, RealtimeError, RealtimeResult,
    ReconnectStrategy, SendOutcome, WsFrame, decode_inbound,
};
use crate::transport::WsTransport;

/// Everything a connection needs at spawn time.
pub struct ConnectionActorArgs<T, R = ExponentialBackoff>
where
    T: WsTransport,
    R: ReconnectStrategy,
{
    pub address: String,
    pub options: ConnectOptions,
    pub config: Arc<RealtimeConfig>,
    pub transport: T,
    pub reconnect: R,
    pub dispatcher: Dispatcher,
    pub events: broadcast::Sender<ConnectionEvent>,
    pub state: watch::Sender<ConnectionState>,
}

pub struct ConnectionActor<T, R = ExponentialBackoff>
where
    T: WsTransport,
    R: ReconnectStrategy,
{
    address: String,
    label: String,
    options: ConnectOptions,
    config: Arc<RealtimeConfig>,
    transport: T,
    reconnect: R,
    dispatcher: Dispatcher,
    events: broadcast::Sender<ConnectionEvent>,
    state: watch::Sender<ConnectionState>,
    self_ref: WeakActorRef<Self>,
    epoch: u64,
    writer: Option<ActorRef<FrameWriter<T::Writer>>>,
    connect_task: Option<JoinHandle<()>>,
    reader_task: Option<JoinHandle<()>>,
    tick_task: Option<JoinHandle<()>>,
    reconnect_task: Option<JoinHandle<()>>,
    pending: VecDeque<WsFrame>,
    health: HealthMonitor,
    heartbeat: Heartbeat,
    /// Set once `ReconnectFailed` went out; cleared only by a successful open.
    failure_reported: bool,
}

impl<T, R> Actor for ConnectionActor<T, R>
where
    T: WsTransport,
    R: ReconnectStrategy,
{
    type Args = ConnectionActorArgs<T, R>;
    type Error = RealtimeError;

    fn name() -> &'static str {
        "ConnectionActor"
    }

    async fn on_start(args: Self::Args, ctx: ActorRef<Self>) -> Result<Self, Self::Error> {
        let ConnectionActorArgs {
            address,
            options,
            config,
            transport,
            reconnect,
            dispatcher,
            events,
            state,
        } = args;

        let label = options.label.clone().unwrap_or_else(|| address.clone());
        let heartbeat = Heartbeat::new(config.heartbeat_mode, config.heartbeat_interval);
        let pending = VecDeque::with_capacity(config.max_queued.min(64));
        state.send_replace(ConnectionState::Disconnected);

        Ok(Self {
            address,
            label,
            options,
            config,
            transport,
            reconnect,
            dispatcher,
            events,
            state,
            self_ref: ctx.downgrade(),
            epoch: 0,
            writer: None,
            connect_task: None,
            reader_task: None,
            tick_task: None,
            reconnect_task: None,
            pending,
            health: HealthMonitor::new(),
            heartbeat,
            failure_reported: false,
        })
    }

    async fn on_stop(
        &mut self,
        _ctx: WeakActorRef<Self>,
        _reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        self.abort_tasks();
        if let Some(writer) = self.writer.take() {
            let _ = writer.stop_gracefully().await;
        }
        Ok(())
    }

    fn on_panic(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        err: PanicError,
    ) -> impl std::future::Future<Output = Result<ControlFlow<ActorStopReason>, Self::Error>> + Send
    {
        let label = self.label.clone();
        async move {
            error!(connection = %label, error = ?err, "ConnectionActor panicked");
            Ok(ControlFlow::Break(ActorStopReason::Panicked(err)))
        }
    }
}

/// Start a handshake unless one is already live or scheduled.
///
/// A (re)start adopts `options`; an active connection keeps the ones it started with.
#[derive(Debug)]
pub struct Connect {
    pub options: ConnectOptions,
}

/// Close the socket (if any), cancel timers and drop queued frames.
#[derive(Debug)]
pub struct Disconnect;

/// Write an encoded frame now or queue it until the next open.
#[derive(Debug)]
pub struct SendFrame {
    pub frame: WsFrame,
}

#[derive(Debug)]
pub struct GetConnectionStats;

pub(crate) struct ConnectionEstablished<T: WsTransport> {
    epoch: u64,
    reader: T::Reader,
    writer: T::Writer,
}

pub(crate) struct ConnectionFailed {
    epoch: u64,
    error: String,
}

pub(crate) struct FromReader {
    epoch: u64,
    event: ReaderEvent,
}

pub(crate) struct HeartbeatTick {
    epoch: u64,
}

pub(crate) struct ReconnectDue {
    epoch: u64,
}

#[derive(Debug)]
pub(crate) enum ReaderEvent {
    Message(InboundMessage),
    HeartbeatAck,
    Control(WsFrame),
    Malformed,
    Closed {
        reason: String,
        cause: DisconnectCause,
    },
}

impl<T, R> KameoMessage<Connect> for ConnectionActor<T, R>
where
    T: WsTransport,
    R: ReconnectStrategy,
{
    type Reply = RealtimeResult<ConnectOutcome>;

    async fn handle(&mut self, msg: Connect, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        match self.current_state() {
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Closing => {
                return Ok(ConnectOutcome::AlreadyActive);
            }
            ConnectionState::Disconnected if self.reconnect_task.is_some() => {
                return Ok(ConnectOutcome::AlreadyActive);
            }
            ConnectionState::Disconnected | ConnectionState::Failed => {}
        }

        if self.reconnect.attempt() > 0 {
            info!(
                connection = %self.label,
                attempts = self.reconnect.attempt(),
                "manual connect resets reconnect attempts"
            );
        }
        self.label = msg
            .options
            .label
            .clone()
            .unwrap_or_else(|| self.address.clone());
        self.options = msg.options;
        self.reconnect.reset();
        self.begin_connect();
        Ok(ConnectOutcome::Started)
    }
}

impl<T, R> KameoMessage<Disconnect> for ConnectionActor<T, R>
where
    T: WsTransport,
    R: ReconnectStrategy,
{
    type Reply = ();

    async fn handle(&mut self, _msg: Disconnect, _ctx: &mut Context<Self, Self::Reply>) {
        let was_open = self.current_state() == ConnectionState::Connected;
        self.set_state(ConnectionState::Closing);
        self.teardown_socket(Some(WsFrame::close(CLOSE_NORMAL, "client disconnect")))
            .await;

        if !self.pending.is_empty() {
            debug!(
                connection = %self.label,
                dropped = self.pending.len(),
                "discarding queued frames on disconnect"
            );
            self.pending.clear();
        }
        self.set_state(ConnectionState::Disconnected);
        if was_open {
            self.emit(ConnectionEvent::Disconnected {
                address: self.address.clone(),
                reason: "client disconnect".to_string(),
            });
        }
        info!(connection = %self.label, "disconnected");
    }
}

impl<T, R> KameoMessage<SendFrame> for ConnectionActor<T, R>
where
    T: WsTransport,
    R: ReconnectStrategy,
{
    type Reply = RealtimeResult<SendOutcome>;

    async fn handle(&mut self, msg: SendFrame, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if self.current_state() == ConnectionState::Connected
            && let Some(writer) = self.writer.clone()
        {
            return match writer.ask(WriterWrite { frame: msg.frame.clone() }).await {
                Ok(()) => {
                    self.health.record_outbound(1);
                    Ok(SendOutcome::Written)
                }
                Err(err) => {
                    // Keep the frame for the next socket; the failed write never reached the wire.
                    self.pending.push_back(msg.frame);
                    let error = err.to_string();
                    self.handle_closed(
                        format!("write error: {error}"),
                        DisconnectCause::WriteFailure { error },
                    )
                    .await;
                    Ok(SendOutcome::Queued)
                }
            };
        }

        Ok(self.enqueue(msg.frame))
    }
}

impl<T, R> KameoMessage<GetConnectionStats> for ConnectionActor<T, R>
where
    T: WsTransport,
    R: ReconnectStrategy,
{
    type Reply = RealtimeResult<ConnectionStats>;

    async fn handle(
        &mut self,
        _msg: GetConnectionStats,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.health.snapshot(self.current_state(), self.pending.len()))
    }
}

impl<T, R> KameoMessage<ConnectionEstablished<T>> for ConnectionActor<T, R>
where
    T: WsTransport,
    R: ReconnectStrategy,
{
    type Reply = ();

    async fn handle(
        &mut self,
        msg: ConnectionEstablished<T>,
        _ctx: &mut Context<Self, Self::Reply>,
    ) {
        if msg.epoch != self.epoch || self.current_state() != ConnectionState::Connecting {
            debug!(
                connection = %self.label,
                epoch = msg.epoch,
                current = self.epoch,
                "discarding stale handshake"
            );
            return;
        }
        self.connect_task = None;
        self.on_open(msg.reader, msg.writer).await;
    }
}

impl<T, R> KameoMessage<ConnectionFailed> for ConnectionActor<T, R>
where
    T: WsTransport,
    R: ReconnectStrategy,
{
    type Reply = ();

    async fn handle(&mut self, msg: ConnectionFailed, _ctx: &mut Context<Self, Self::Reply>) {
        if msg.epoch != self.epoch || self.current_state() != ConnectionState::Connecting {
            return;
        }
        self.connect_task = None;
        self.handle_closed(
            format!("handshake failed: {}", msg.error),
            DisconnectCause::HandshakeFailed { message: msg.error },
        )
        .await;
    }
}

impl<T, R> KameoMessage<FromReader> for ConnectionActor<T, R>
where
    T: WsTransport,
    R: ReconnectStrategy,
{
    type Reply = ();

    async fn handle(&mut self, msg: FromReader, _ctx: &mut Context<Self, Self::Reply>) {
        if msg.epoch != self.epoch {
            return;
        }
        match msg.event {
            ReaderEvent::Message(message) => {
                self.health.record_inbound();
                let delivered = self.dispatcher.dispatch(&message);
                trace!(
                    connection = %self.label,
                    kind = message.kind(),
                    delivered,
                    "inbound message dispatched"
                );
            }
            ReaderEvent::HeartbeatAck => {
                self.health.touch();
                if let Some(rtt) = self.heartbeat.on_ack() {
                    self.health.record_rtt(rtt);
                }
            }
            ReaderEvent::Control(frame) => {
                self.health.touch();
                match self.heartbeat.handle_control(&frame) {
                    HeartbeatSignal::Ack(Some(rtt)) => self.health.record_rtt(rtt),
                    HeartbeatSignal::Ack(None) | HeartbeatSignal::NotHeartbeat => {}
                    HeartbeatSignal::Reply(reply) => {
                        self.write_control(reply, "pong").await;
                    }
                }
            }
            ReaderEvent::Malformed => {
                self.health.touch();
                self.health.record_dropped();
            }
            ReaderEvent::Closed { reason, cause } => {
                self.reader_task = None;
                self.handle_closed(reason, cause).await;
            }
        }
    }
}

impl<T, R> KameoMessage<HeartbeatTick> for ConnectionActor<T, R>
where
    T: WsTransport,
    R: ReconnectStrategy,
{
    type Reply = ();

    async fn handle(&mut self, msg: HeartbeatTick, _ctx: &mut Context<Self, Self::Reply>) {
        if msg.epoch != self.epoch || self.current_state() != ConnectionState::Connected {
            return;
        }

        if let Some(threshold) = self.config.stale_threshold
            && self.health.is_stale(threshold)
        {
            warn!(
                connection = %self.label,
                silent_ms = self.health.last_activity_age().as_millis() as u64,
                threshold_ms = threshold.as_millis() as u64,
                "no inbound activity, recycling socket"
            );
            self.handle_closed(
                format!("no inbound activity for {threshold:?}"),
                DisconnectCause::StaleData,
            )
            .await;
            return;
        }
        if !self.options.heartbeat {
            return;
        }

        let ping = self.heartbeat.create_ping();
        debug!(
            connection = %self.label,
            mode = ?self.heartbeat.mode(),
            unanswered = self.heartbeat.unanswered(),
            "sending heartbeat"
        );
        self.write_control(ping, "heartbeat").await;
    }
}

impl<T, R> KameoMessage<ReconnectDue> for ConnectionActor<T, R>
where
    T: WsTransport,
    R: ReconnectStrategy,
{
    type Reply = ();

    async fn handle(&mut self, msg: ReconnectDue, _ctx: &mut Context<Self, Self::Reply>) {
        if msg.epoch != self.epoch || self.current_state() != ConnectionState::Disconnected {
            return;
        }
        self.reconnect_task = None;
        self.begin_connect();
    }
}

impl<T, R> ConnectionActor<T, R>
where
    T: WsTransport,
    R: ReconnectStrategy,
{
    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(connection = %self.label, from = %prev, to = %next, "state change");
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn abort_tasks(&mut self) {
        for task in [
            self.connect_task.take(),
            self.reader_task.take(),
            self.tick_task.take(),
            self.reconnect_task.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
    }

    /// Cancel every task of the current socket and retire its writer. The epoch moves on, so
    /// anything the old socket already put in the mailbox is ignored.
    async fn teardown_socket(&mut self, close_frame: Option<WsFrame>) {
        self.abort_tasks();
        self.epoch = self.epoch.wrapping_add(1);
        self.heartbeat.reset();

        if let Some(writer) = self.writer.take() {
            if close_frame.is_some()
                && let Err(err) = writer.ask(WriterClose { frame: close_frame }).await
            {
                debug!(connection = %self.label, error = %err, "close frame not delivered");
            }
            let _ = writer.stop_gracefully().await;
            writer.wait_for_shutdown().await;
        }
        self.health.on_close();
    }

    fn begin_connect(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        let epoch = self.epoch;
        self.set_state(ConnectionState::Connecting);
        info!(
            connection = %self.label,
            address = %self.address,
            attempt = self.reconnect.attempt(),
            "connecting"
        );

        let transport = self.transport.clone();
        let url = self.address.clone();
        let buffers = self.config.buffers;
        let actor = self.self_ref.clone();
        self.connect_task = Some(tokio::spawn(async move {
            let result = transport.connect(url, buffers).await;
            let Some(actor) = actor.upgrade() else {
                return;
            };
            match result {
                Ok((reader, writer)) => {
                    let _ = actor
                        .tell(ConnectionEstablished::<T> {
                            epoch,
                            reader,
                            writer,
                        })
                        .send()
                        .await;
                }
                Err(err) => {
                    let _ = actor
                        .tell(ConnectionFailed {
                            epoch,
                            error: err.to_string(),
                        })
                        .send()
                        .await;
                }
            }
        }));
    }

    async fn on_open(&mut self, reader: T::Reader, writer: T::Writer) {
        let writer = FrameWriter::spawn(FrameWriter::new(writer, self.label.clone()));
        self.writer = Some(writer.clone());
        self.health.on_open();
        self.heartbeat.reset();
        self.reconnect.reset();
        self.failure_reported = false;

        self.set_state(ConnectionState::Connected);
        info!(connection = %self.label, address = %self.address, "connection established");
        self.emit(ConnectionEvent::Connected {
            address: self.address.clone(),
        });

        self.start_reader(reader);

        if !self.pending.is_empty() {
            // Frames leave the queue only once the writer confirms them.
            let frames: Vec<WsFrame> = self.pending.iter().cloned().collect();
            let count = frames.len();
            match writer.ask(WriterWriteBatch { frames }).await {
                Ok(()) => {
                    self.pending.clear();
                    self.health.record_outbound(count as u64);
                    debug!(connection = %self.label, frames = count, "queued frames flushed");
                }
                Err(err) => {
                    let written = match &err {
                        SendError::HandlerError(batch) => batch.written.min(self.pending.len()),
                        _ => 0,
                    };
                    self.pending.drain(..written);
                    self.health.record_outbound(written as u64);
                    let error = err.to_string();
                    warn!(
                        connection = %self.label,
                        written,
                        kept = self.pending.len(),
                        error = %error,
                        "queue flush failed"
                    );
                    self.handle_closed(
                        format!("queue flush failed: {error}"),
                        DisconnectCause::WriteFailure { error },
                    )
                    .await;
                    return;
                }
            }
        }

        if self.options.heartbeat || self.config.stale_threshold.is_some() {
            self.start_ticker();
        }
    }

    fn start_reader(&mut self, mut reader: T::Reader) {
        let epoch = self.epoch;
        let actor = self.self_ref.clone();
        let label = self.label.clone();

        self.reader_task = Some(tokio::spawn(async move {
            loop {
                let (event, last) = match reader.next().await {
                    Some(Ok(frame)) => read_frame(frame, &label),
                    Some(Err(err)) => {
                        let error = err.to_string();
                        (
                            ReaderEvent::Closed {
                                reason: format!("read error: {error}"),
                                cause: DisconnectCause::ReadFailure { error },
                            },
                            true,
                        )
                    }
                    None => (
                        ReaderEvent::Closed {
                            reason: "stream ended".to_string(),
                            cause: DisconnectCause::RemoteClosed,
                        },
                        true,
                    ),
                };

                let Some(actor) = actor.upgrade() else {
                    break;
                };
                if actor.tell(FromReader { epoch, event }).send().await.is_err() || last {
                    break;
                }
            }
        }));
    }

    /// Periodic tick for heartbeats and the staleness check. Without heartbeats the tick only
    /// checks staleness, once per `stale_threshold`.
    fn start_ticker(&mut self) {
        let epoch = self.epoch;
        let period = match self.config.stale_threshold {
            Some(threshold) if !self.options.heartbeat => threshold,
            _ => self.heartbeat.interval(),
        };
        let actor = self.self_ref.clone();

        self.tick_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(actor) = actor.upgrade() else {
                    break;
                };
                if actor.tell(HeartbeatTick { epoch }).send().await.is_err() {
                    break;
                }
            }
        }));
    }

    fn enqueue(&mut self, frame: WsFrame) -> SendOutcome {
        if self.pending.len() >= self.config.max_queued {
            self.health.record_dropped();
            warn!(
                connection = %self.label,
                queued = self.pending.len(),
                max_queued = self.config.max_queued,
                "outbound queue full, dropping frame"
            );
            self.emit(ConnectionEvent::Error {
                address: self.address.clone(),
                error: format!("outbound queue full ({}), frame dropped", self.config.max_queued),
            });
            return SendOutcome::Dropped;
        }
        self.pending.push_back(frame);
        SendOutcome::Queued
    }

    /// Heartbeat pings and pong replies bypass the queue.
    async fn write_control(&mut self, frame: WsFrame, what: &'static str) {
        let Some(writer) = self.writer.clone() else {
            return;
        };
        if let Err(err) = writer.ask(WriterWrite { frame }).await {
            let error = err.to_string();
            warn!(connection = %self.label, error = %error, frame = what, "control write failed");
            self.handle_closed(
                format!("write error: {error}"),
                DisconnectCause::WriteFailure { error },
            )
            .await;
        }
    }

    /// The socket (or handshake) is gone without the application asking for it.
    async fn handle_closed(&mut self, reason: String, cause: DisconnectCause) {
        if let Some(error) = cause.transport_error() {
            self.health.record_error(cause_context(&cause), error);
            warn!(connection = %self.label, error = %error, "transport error");
            self.emit(ConnectionEvent::Error {
                address: self.address.clone(),
                error: error.to_string(),
            });
        }

        let was_open = self.current_state() == ConnectionState::Connected;
        self.teardown_socket(None).await;
        self.set_state(ConnectionState::Disconnected);
        info!(connection = %self.label, reason = %reason, was_open, "connection closed");
        self.emit(ConnectionEvent::Disconnected {
            address: self.address.clone(),
            reason,
        });

        if self.options.auto_reconnect {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        if !self.reconnect.should_retry() {
            self.set_state(ConnectionState::Failed);
            let attempts = self.reconnect.attempt();
            if self.failure_reported {
                debug!(connection = %self.label, attempts, "retries exhausted again");
                return;
            }
            self.failure_reported = true;
            warn!(
                connection = %self.label,
                attempts,
                "max reconnection attempts exceeded"
            );
            self.emit(ConnectionEvent::ReconnectFailed {
                address: self.address.clone(),
                attempts,
            });
            return;
        }

        let delay = self.reconnect.next_delay();
        let attempt = self.reconnect.attempt();
        self.health.record_reconnect();
        info!(
            connection = %self.label,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
        self.emit(ConnectionEvent::Reconnecting {
            address: self.address.clone(),
            attempt,
            delay,
        });

        let epoch = self.epoch;
        let actor = self.self_ref.clone();
        self.reconnect_task = Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Some(actor) = actor.upgrade() {
                let _ = actor.tell(ReconnectDue { epoch }).send().await;
            }
        }));
    }
}

/// Classify one inbound frame. The flag is true when the reader should stop afterwards.
fn read_frame(frame: WsFrame, label: &str) -> (ReaderEvent, bool) {
    match frame {
        WsFrame::Text(bytes) | WsFrame::Binary(bytes) => (decode_event(&bytes, label), false),
        WsFrame::Ping(_) | WsFrame::Pong(_) => (ReaderEvent::Control(frame), false),
        WsFrame::Close(close) => {
            let reason = close
                .map(|f| {
                    format!(
                        "code={} reason={}",
                        f.code,
                        String::from_utf8_lossy(f.reason.as_ref())
                    )
                })
                .unwrap_or_else(|| "remote closed".to_string());
            (
                ReaderEvent::Closed {
                    reason,
                    cause: DisconnectCause::RemoteClosed,
                },
                true,
            )
        }
    }
}

fn decode_event(bytes: &Bytes, label: &str) -> ReaderEvent {
    match decode_inbound(bytes) {
        Ok(Inbound::Message(message)) => ReaderEvent::Message(message),
        Ok(Inbound::HeartbeatAck) => ReaderEvent::HeartbeatAck,
        Err(err) => {
            debug!(
                connection = %label,
                error = %err,
                len = bytes.len(),
                "dropping malformed frame"
            );
            ReaderEvent::Malformed
        }
    }
}

fn cause_context(cause: &DisconnectCause) -> &'static str {
    match cause {
        DisconnectCause::ReadFailure { .. } => "read",
        DisconnectCause::WriteFailure { .. } => "write",
        DisconnectCause::HandshakeFailed { .. } => "connect",
        DisconnectCause::RemoteClosed | DisconnectCause::StaleData => "close",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_frames_end_the_reader_with_their_reason() {
        let (event, last) = read_frame(WsFrame::close(4001, "maintenance"), "t");
        assert!(last);
        match event {
            ReaderEvent::Closed {
                reason,
                cause: DisconnectCause::RemoteClosed,
            } => assert_eq!(reason, "code=4001 reason=maintenance"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn data_frames_are_decoded_or_marked_malformed() {
        let (event, last) = read_frame(WsFrame::text_static(r#"{"type":"pong"}"#), "t");
        assert!(!last);
        assert!(matches!(event, ReaderEvent::HeartbeatAck));

        let (event, _) = read_frame(WsFrame::text_static("{oops"), "t");
        assert!(matches!(event, ReaderEvent::Malformed));

        let (event, _) = read_frame(
            WsFrame::text_static(
                r#"{"type":"injury_update","data":{"playerId":"p","playerName":"n","team":"t","status":"out"}}"#,
            ),
            "t",
        );
        assert!(matches!(event, ReaderEvent::Message(InboundMessage::InjuryUpdate(_))));
    }

    #[test]
    fn control_frames_pass_through() {
        let (event, last) = read_frame(WsFrame::Ping(Bytes::from_static(b"x")), "t");
        assert!(!last);
        assert!(matches!(event, ReaderEvent::Control(WsFrame::Ping(_))));
    }
}
