use bytes::Bytes;

/// Transport-neutral websocket frame.
///
/// Transports convert their native message type into/from `WsFrame`; everything above the
/// transport only ever sees this type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WsFrame {
    Text(Bytes),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<WsCloseFrame>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WsCloseFrame {
    pub code: u16,
    pub reason: Bytes,
}

/// RFC 6455 normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

impl WsFrame {
    #[inline]
    pub fn text_static(s: &'static str) -> Self {
        Self::Text(Bytes::from_static(s.as_bytes()))
    }

    #[inline]
    pub fn close(code: u16, reason: &'static str) -> Self {
        Self::Close(Some(WsCloseFrame {
            code,
            reason: Bytes::from_static(reason.as_bytes()),
        }))
    }

    /// Payload bytes for data and control frames; `None` for close.
    #[inline]
    pub fn payload(&self) -> Option<&[u8]> {
        frame_bytes(self)
    }

    #[inline]
    pub fn is_data(&self) -> bool {
        matches!(self, WsFrame::Text(_) | WsFrame::Binary(_))
    }
}

/// Borrow the underlying bytes from frames without allocation.
#[inline]
pub fn frame_bytes(frame: &WsFrame) -> Option<&[u8]> {
    match frame {
        WsFrame::Text(bytes)
        | WsFrame::Binary(bytes)
        | WsFrame::Ping(bytes)
        | WsFrame::Pong(bytes) => Some(bytes.as_ref()),
        WsFrame::Close(_) => None,
    }
}

/// Wrap owned bytes as a frame, choosing text when the bytes are valid UTF-8.
#[inline]
pub fn into_ws_frame<B>(bytes: B) -> WsFrame
where
    B: Into<Bytes>,
{
    let payload = bytes.into();
    if std::str::from_utf8(payload.as_ref()).is_ok() {
        WsFrame::Text(payload)
    } else {
        WsFrame::Binary(payload)
    }
}
