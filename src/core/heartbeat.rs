use bytes::Bytes;
use std::time::Duration;
use tokio::time::Instant;

use super::config::HeartbeatMode;
use super::frame::WsFrame;

const APPLICATION_PING: &str = r#"{"type":"ping","data":{}}"#;

/// Outcome of offering an inbound control frame to the heartbeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatSignal {
    NotHeartbeat,
    /// A pong arrived; carries the round trip when a ping was outstanding.
    Ack(Option<Duration>),
    /// The peer pinged us and expects this frame back.
    Reply(WsFrame),
}

/// Keepalive bookkeeping for one open socket.
///
/// The timer itself lives in the connection actor; this type only builds ping frames and
/// matches acknowledgements against the most recent ping.
#[derive(Debug)]
pub struct Heartbeat {
    mode: HeartbeatMode,
    interval: Duration,
    last_ping: Option<Instant>,
    last_ack: Option<Instant>,
    unanswered: u32,
}

impl Heartbeat {
    pub fn new(mode: HeartbeatMode, interval: Duration) -> Self {
        Self {
            mode,
            interval,
            last_ping: None,
            last_ack: None,
            unanswered: 0,
        }
    }

    pub fn mode(&self) -> HeartbeatMode {
        self.mode
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn create_ping(&mut self) -> WsFrame {
        self.last_ping = Some(Instant::now());
        self.unanswered = self.unanswered.saturating_add(1);
        match self.mode {
            HeartbeatMode::Application => WsFrame::text_static(APPLICATION_PING),
            HeartbeatMode::Protocol => WsFrame::Ping(Bytes::new()),
        }
    }

    /// Record an acknowledgement (JSON `pong` or protocol pong) and return the round trip.
    pub fn on_ack(&mut self) -> Option<Duration> {
        let now = Instant::now();
        let rtt = match (self.last_ping, self.last_ack) {
            (Some(sent), Some(acked)) if acked >= sent => None,
            (Some(sent), _) => Some(now.saturating_duration_since(sent)),
            (None, _) => None,
        };
        self.last_ack = Some(now);
        self.unanswered = 0;
        rtt
    }

    pub fn handle_control(&mut self, frame: &WsFrame) -> HeartbeatSignal {
        match frame {
            WsFrame::Pong(_) => HeartbeatSignal::Ack(self.on_ack()),
            WsFrame::Ping(payload) => HeartbeatSignal::Reply(WsFrame::Pong(payload.clone())),
            _ => HeartbeatSignal::NotHeartbeat,
        }
    }

    /// Pings written since the last acknowledgement.
    pub fn unanswered(&self) -> u32 {
        self.unanswered
    }

    pub fn reset(&mut self) {
        self.last_ping = None;
        self.last_ack = None;
        self.unanswered = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_mode_writes_json_ping() {
        let mut heartbeat = Heartbeat::new(HeartbeatMode::Application, Duration::from_secs(30));
        assert_eq!(
            heartbeat.create_ping(),
            WsFrame::Text(Bytes::from_static(APPLICATION_PING.as_bytes()))
        );
        assert_eq!(heartbeat.unanswered(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn protocol_mode_reports_rtt_once_per_ping() {
        let mut heartbeat = Heartbeat::new(HeartbeatMode::Protocol, Duration::from_secs(5));
        assert!(matches!(heartbeat.create_ping(), WsFrame::Ping(_)));

        tokio::time::advance(Duration::from_millis(40)).await;
        assert_eq!(
            heartbeat.handle_control(&WsFrame::Pong(Bytes::new())),
            HeartbeatSignal::Ack(Some(Duration::from_millis(40)))
        );
        // Duplicate pong for the same ping carries no sample.
        assert_eq!(heartbeat.on_ack(), None);
        assert_eq!(heartbeat.unanswered(), 0);
    }

    #[test]
    fn inbound_ping_is_echoed() {
        let mut heartbeat = Heartbeat::new(HeartbeatMode::Application, Duration::from_secs(30));
        match heartbeat.handle_control(&WsFrame::Ping(Bytes::from_static(b"payload"))) {
            HeartbeatSignal::Reply(WsFrame::Pong(p)) => assert_eq!(p.as_ref(), b"payload"),
            other => panic!("expected pong reply, got {other:?}"),
        }
        assert_eq!(
            heartbeat.handle_control(&WsFrame::text_static("{}")),
            HeartbeatSignal::NotHeartbeat
        );
    }

    #[test]
    fn ack_without_ping_has_no_rtt_and_reset_clears() {
        let mut heartbeat = Heartbeat::new(HeartbeatMode::Protocol, Duration::from_secs(5));
        assert_eq!(heartbeat.on_ack(), None);
        heartbeat.create_ping();
        heartbeat.create_ping();
        assert_eq!(heartbeat.unanswered(), 2);
        heartbeat.reset();
        assert_eq!(heartbeat.unanswered(), 0);
    }
}
