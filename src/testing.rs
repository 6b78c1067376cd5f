//! In-memory transport for driving connections deterministically.
//!
//! [`MockTransport::new`] returns the transport handed to a
//! [`ConnectionManager`](crate::ConnectionManager) plus a [`MockServer`] that accepts each
//! successful handshake as a [`MockSession`]. Sessions see every frame the client writes and
//! can push frames, inject read errors, or drop the socket.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{Sink, Stream};
use sonic_rs::Value;
use tokio::sync::{Semaphore, mpsc};

use crate::core::{RealtimeError, WebSocketBufferConfig, WsFrame};
use crate::transport::{WsConnectFuture, WsTransport};

struct MockState {
    sessions: mpsc::UnboundedSender<MockSession>,
    gate: Option<Arc<Semaphore>>,
    attempts: AtomicUsize,
    fail_next: AtomicUsize,
    fail_all: AtomicBool,
    /// Write budget for the next socket's sink; `usize::MAX` when unset.
    broken_sink: AtomicUsize,
}

/// Transport whose handshakes succeed, fail, or wait on a gate as the test scripts them.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    /// Handshakes complete as soon as they start.
    pub fn new() -> (Self, MockServer) {
        Self::build(None)
    }

    /// Every handshake waits for [`MockServer::release_connect`] (or [`MockServer::open_gate`]).
    pub fn gated() -> (Self, MockServer) {
        Self::build(Some(Arc::new(Semaphore::new(0))))
    }

    fn build(gate: Option<Arc<Semaphore>>) -> (Self, MockServer) {
        let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();
        let transport = Self {
            state: Arc::new(MockState {
                sessions: sessions_tx,
                gate: gate.clone(),
                attempts: AtomicUsize::new(0),
                fail_next: AtomicUsize::new(0),
                fail_all: AtomicBool::new(false),
                broken_sink: AtomicUsize::new(usize::MAX),
            }),
        };
        let server = MockServer {
            sessions: sessions_rx,
            gate,
        };
        (transport, server)
    }

    /// Refuse the next `count` handshakes.
    pub fn fail_next(&self, count: usize) {
        self.state.fail_next.store(count, Ordering::SeqCst);
    }

    /// Refuse every handshake until switched off again.
    pub fn fail_all(&self, fail: bool) {
        self.state.fail_all.store(fail, Ordering::SeqCst);
    }

    /// The next socket's sink accepts `accepted` frames, then fails every write.
    pub fn break_next_sink(&self, accepted: usize) {
        self.state.broken_sink.store(accepted, Ordering::SeqCst);
    }

    /// Handshakes started so far, including refused and abandoned ones.
    pub fn connect_attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        if self.state.fail_all.load(Ordering::SeqCst) {
            return true;
        }
        self.state
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl WsTransport for MockTransport {
    type Reader = MockReader;
    type Writer = MockWriter;

    fn connect(
        &self,
        url: String,
        _buffers: WebSocketBufferConfig,
    ) -> WsConnectFuture<Self::Reader, Self::Writer> {
        let transport = self.clone();
        transport.state.attempts.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if let Some(gate) = transport.state.gate.as_ref() {
                // A closed gate lets everything through.
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }

            if transport.should_fail() {
                return Err(RealtimeError::ConnectionFailed(format!(
                    "mock handshake refused for {url}"
                )));
            }

            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            let session = MockSession {
                url,
                outbound: outbound_rx,
                inbound: Some(inbound_tx),
            };
            transport
                .state
                .sessions
                .send(session)
                .map_err(|_| RealtimeError::ConnectionFailed("mock server dropped".to_string()))?;

            let budget = transport.state.broken_sink.swap(usize::MAX, Ordering::SeqCst);
            Ok((
                MockReader { rx: inbound_rx },
                MockWriter {
                    tx: outbound_tx,
                    budget: (budget != usize::MAX).then_some(budget),
                },
            ))
        })
    }
}

/// Accepts the sessions created by a [`MockTransport`].
pub struct MockServer {
    sessions: mpsc::UnboundedReceiver<MockSession>,
    gate: Option<Arc<Semaphore>>,
}

impl MockServer {
    pub async fn accept(&mut self) -> Option<MockSession> {
        self.sessions.recv().await
    }

    pub async fn accept_timeout(&mut self, timeout: Duration) -> Option<MockSession> {
        tokio::time::timeout(timeout, self.sessions.recv())
            .await
            .unwrap_or_default()
    }

    /// Let one pending (or future) gated handshake proceed.
    pub fn release_connect(&self) {
        if let Some(gate) = self.gate.as_ref() {
            gate.add_permits(1);
        }
    }

    /// Stop gating handshakes altogether.
    pub fn open_gate(&self) {
        if let Some(gate) = self.gate.as_ref() {
            gate.close();
        }
    }
}

/// Server end of one mock socket.
pub struct MockSession {
    url: String,
    outbound: mpsc::UnboundedReceiver<WsFrame>,
    inbound: Option<mpsc::UnboundedSender<Result<WsFrame, RealtimeError>>>,
}

impl MockSession {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Next frame the client wrote; `None` once the client side is gone.
    pub async fn recv(&mut self) -> Option<WsFrame> {
        self.outbound.recv().await
    }

    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<WsFrame> {
        tokio::time::timeout(timeout, self.outbound.recv())
            .await
            .unwrap_or_default()
    }

    /// Next client frame parsed as JSON. Non-JSON frames yield `None`.
    pub async fn recv_json(&mut self) -> Option<Value> {
        let frame = self.recv().await?;
        sonic_rs::from_slice(frame.payload()?).ok()
    }

    /// Frames already written by the client, without waiting.
    pub fn drain(&mut self) -> Vec<WsFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }

    pub fn send_frame(&self, frame: WsFrame) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(frame)).is_ok())
    }

    pub fn send_text(&self, text: &str) -> bool {
        self.send_frame(WsFrame::Text(text.to_owned().into()))
    }

    /// Make the client's next read fail with `error`.
    pub fn send_error(&self, error: &str) -> bool {
        let err = RealtimeError::TransportError {
            context: "read",
            error: error.to_string(),
        };
        self.inbound.as_ref().is_some_and(|tx| tx.send(Err(err)).is_ok())
    }

    pub fn close(&self, code: u16, reason: &'static str) -> bool {
        self.send_frame(WsFrame::close(code, reason))
    }

    /// End the client's read stream without a close frame.
    pub fn drop_socket(&mut self) {
        self.inbound = None;
    }
}

pub struct MockReader {
    rx: mpsc::UnboundedReceiver<Result<WsFrame, RealtimeError>>,
}

impl Stream for MockReader {
    type Item = Result<WsFrame, RealtimeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

pub struct MockWriter {
    tx: mpsc::UnboundedSender<WsFrame>,
    budget: Option<usize>,
}

impl Sink<WsFrame> for MockWriter {
    type Error = RealtimeError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(mut self: Pin<&mut Self>, item: WsFrame) -> Result<(), Self::Error> {
        match self.budget {
            Some(0) => {
                return Err(RealtimeError::TransportError {
                    context: "write",
                    error: "mock sink broken".to_string(),
                });
            }
            Some(left) => self.budget = Some(left - 1),
            None => {}
        }
        self.tx
            .send(item)
            .map_err(|_| RealtimeError::TransportError {
                context: "write",
                error: "mock socket closed".to_string(),
            })
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}
