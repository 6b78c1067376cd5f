//! Server side of a feed socket, used by the loopback tests and the demo feed.

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::{WebSocketStream, accept_async_with_config};

use crate::core::{RealtimeError, RealtimeResult, WebSocketBufferConfig, WsFrame};
use crate::transport::tungstenite::{frame_to_msg, map_ws_error, msg_to_frame, websocket_config};

/// One accepted websocket, speaking [`WsFrame`]s.
pub struct FeedSocket {
    inner: WebSocketStream<TcpStream>,
}

/// Complete the websocket handshake on an accepted TCP stream.
pub async fn accept(stream: TcpStream) -> RealtimeResult<FeedSocket> {
    let config = websocket_config(WebSocketBufferConfig::default());
    let inner = accept_async_with_config(stream, Some(config))
        .await
        .map_err(|err| RealtimeError::ConnectionFailed(err.to_string()))?;
    Ok(FeedSocket { inner })
}

impl FeedSocket {
    pub async fn send(&mut self, frame: WsFrame) -> RealtimeResult<()> {
        self.inner
            .send(frame_to_msg(frame))
            .await
            .map_err(|e| map_ws_error("write", e))
    }

    /// Serialize `value` as a JSON text frame.
    pub async fn send_json<V: Serialize>(&mut self, value: &V) -> RealtimeResult<()> {
        let bytes =
            sonic_rs::to_vec(value).map_err(|err| RealtimeError::ParseFailed(err.to_string()))?;
        self.send(WsFrame::Text(bytes.into())).await
    }

    pub async fn next(&mut self) -> Option<RealtimeResult<WsFrame>> {
        self.inner
            .next()
            .await
            .map(|res| res.map(msg_to_frame).map_err(|e| map_ws_error("read", e)))
    }

    pub async fn close(mut self) -> RealtimeResult<()> {
        self.inner
            .close(None)
            .await
            .map_err(|e| map_ws_error("close", e))
    }
}
