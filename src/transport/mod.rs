use std::future::Future;
use std::pin::Pin;

use futures_util::{Sink, Stream};

use crate::core::{RealtimeError, RealtimeResult, WebSocketBufferConfig, WsFrame};

pub mod tungstenite;

pub use tungstenite::TungsteniteTransport;

/// Boxed handshake future returned by [`WsTransport::connect`].
pub type WsConnectFuture<R, W> = Pin<Box<dyn Future<Output = RealtimeResult<(R, W)>> + Send>>;

/// Transport boundary for websocket IO.
///
/// The read half is driven by a plain tokio task and the write half by the writer actor; the
/// connection actor only ever sees [`WsFrame`]s.
pub trait WsTransport: Clone + Send + Sync + 'static {
    type Reader: Stream<Item = Result<WsFrame, RealtimeError>> + Send + Unpin + 'static;
    type Writer: Sink<WsFrame, Error = RealtimeError> + Send + Unpin + 'static;

    fn connect(
        &self,
        url: String,
        buffers: WebSocketBufferConfig,
    ) -> WsConnectFuture<Self::Reader, Self::Writer>;
}
