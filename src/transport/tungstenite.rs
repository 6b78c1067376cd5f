use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Sink, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    Connector, MaybeTlsStream, WebSocketStream,
    connect_async_tls_with_config as tungstenite_connect,
    tungstenite::{
        Message as TungsteniteMessage, Utf8Bytes,
        protocol::{CloseFrame as TungCloseFrame, WebSocketConfig},
    },
};
use tracing::debug;

use crate::core::{RealtimeError, WebSocketBufferConfig, WsCloseFrame, WsFrame};
use crate::tls::install_rustls_crypto_provider;
use crate::transport::{WsConnectFuture, WsTransport};

pub(crate) fn map_ws_error(context: &'static str, err: impl ToString) -> RealtimeError {
    RealtimeError::TransportError {
        context,
        error: err.to_string(),
    }
}

fn close_to_core(frame: Option<TungCloseFrame>) -> Option<WsCloseFrame> {
    frame.map(|f| WsCloseFrame {
        code: u16::from(f.code),
        reason: Bytes::from(f.reason),
    })
}

fn core_to_close(frame: WsCloseFrame) -> TungCloseFrame {
    TungCloseFrame {
        code: frame.code.into(),
        reason: Utf8Bytes::try_from(frame.reason).unwrap_or_else(|_| Utf8Bytes::from_static("")),
    }
}

pub(crate) fn msg_to_frame(msg: TungsteniteMessage) -> WsFrame {
    match msg {
        TungsteniteMessage::Text(text) => WsFrame::Text(Bytes::from(text)),
        TungsteniteMessage::Binary(bytes) => WsFrame::Binary(bytes),
        TungsteniteMessage::Ping(bytes) => WsFrame::Ping(bytes),
        TungsteniteMessage::Pong(bytes) => WsFrame::Pong(bytes),
        TungsteniteMessage::Close(frame) => WsFrame::Close(close_to_core(frame)),
        TungsteniteMessage::Frame(_) => WsFrame::Binary(Bytes::new()),
    }
}

pub(crate) fn frame_to_msg(frame: WsFrame) -> TungsteniteMessage {
    match frame {
        // Text frames that are not UTF-8 go out as binary rather than failing the write.
        WsFrame::Text(bytes) => match Utf8Bytes::try_from(bytes.clone()) {
            Ok(text) => TungsteniteMessage::Text(text),
            Err(_) => TungsteniteMessage::Binary(bytes),
        },
        WsFrame::Binary(bytes) => TungsteniteMessage::Binary(bytes),
        WsFrame::Ping(bytes) => TungsteniteMessage::Ping(bytes),
        WsFrame::Pong(bytes) => TungsteniteMessage::Pong(bytes),
        WsFrame::Close(frame) => TungsteniteMessage::Close(frame.map(core_to_close)),
    }
}

pub(crate) fn websocket_config(buffers: WebSocketBufferConfig) -> WebSocketConfig {
    WebSocketConfig::default()
        .max_message_size(Some(buffers.max_message_bytes))
        .max_frame_size(Some(buffers.max_frame_bytes))
        .write_buffer_size(buffers.write_buffer_bytes)
        .max_write_buffer_size(buffers.max_write_buffer_bytes)
}

/// `tokio-tungstenite` client transport. `ws://` and `wss://` are both supported; TLS uses
/// rustls with webpki roots unless a custom client config is supplied.
#[derive(Clone)]
pub struct TungsteniteTransport {
    connector: Option<Connector>,
    disable_nagle: bool,
}

impl Default for TungsteniteTransport {
    fn default() -> Self {
        Self {
            connector: None,
            disable_nagle: true,
        }
    }
}

impl TungsteniteTransport {
    pub fn rustls(config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            connector: Some(Connector::Rustls(config)),
            ..Self::default()
        }
    }

    pub fn with_nagle(mut self) -> Self {
        self.disable_nagle = false;
        self
    }
}

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TungsteniteReader {
    inner: futures_util::stream::SplitStream<ClientStream>,
}

impl Stream for TungsteniteReader {
    type Item = Result<WsFrame, RealtimeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(msg))) => Poll::Ready(Some(Ok(msg_to_frame(msg)))),
            Poll::Ready(Some(Err(err))) => Poll::Ready(Some(Err(map_ws_error("read", err)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

pub struct TungsteniteWriter {
    inner: futures_util::stream::SplitSink<ClientStream, TungsteniteMessage>,
}

impl Sink<WsFrame> for TungsteniteWriter {
    type Error = RealtimeError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner)
            .poll_ready(cx)
            .map_err(|e| map_ws_error("write", e))
    }

    fn start_send(mut self: Pin<&mut Self>, item: WsFrame) -> Result<(), Self::Error> {
        Pin::new(&mut self.inner)
            .start_send(frame_to_msg(item))
            .map_err(|e| map_ws_error("write", e))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner)
            .poll_flush(cx)
            .map_err(|e| map_ws_error("write", e))
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner)
            .poll_close(cx)
            .map_err(|e| map_ws_error("write", e))
    }
}

impl WsTransport for TungsteniteTransport {
    type Reader = TungsteniteReader;
    type Writer = TungsteniteWriter;

    fn connect(
        &self,
        url: String,
        buffers: WebSocketBufferConfig,
    ) -> WsConnectFuture<Self::Reader, Self::Writer> {
        let connector = self.connector.clone();
        let disable_nagle = self.disable_nagle;
        Box::pin(async move {
            install_rustls_crypto_provider();

            let (stream, response) = tungstenite_connect(
                url.as_str(),
                Some(websocket_config(buffers)),
                disable_nagle,
                connector,
            )
            .await
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;
            debug!(url = %url, status = %response.status(), "websocket handshake complete");

            let (write, read) = stream.split();
            Ok((
                TungsteniteReader { inner: read },
                TungsteniteWriter { inner: write },
            ))
        })
    }
}
