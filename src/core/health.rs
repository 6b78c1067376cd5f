use hdrhistogram::Histogram;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use super::circular_buffer::CircularBuffer;
use super::types::{ConnectionState, ConnectionStats};

const MAX_RECENT_ERRORS: usize = 32;
const MAX_ERROR_TEXT_BYTES: usize = 512;
const RTT_HIGHEST_US: u64 = 60_000_000;

#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub at: Instant,
    pub context: &'static str,
    pub error: String,
}

fn truncate_string(s: &str) -> String {
    if s.len() <= MAX_ERROR_TEXT_BYTES {
        return s.to_string();
    }

    let mut end = MAX_ERROR_TEXT_BYTES;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Per-connection counters and liveness tracking, owned by the connection actor.
#[derive(Debug)]
pub struct HealthMonitor {
    opened_at: Option<Instant>,
    last_activity: Instant,
    messages_in: u64,
    messages_out: u64,
    dropped_frames: u64,
    error_count: u64,
    reconnect_count: u64,
    recent_errors: CircularBuffer<ErrorRecord>,
    rtt: Option<Histogram<u64>>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    pub fn new() -> Self {
        let rtt = match Histogram::new_with_bounds(1, RTT_HIGHEST_US, 3) {
            Ok(histogram) => Some(histogram),
            Err(err) => {
                warn!(error = %err, "rtt histogram unavailable");
                None
            }
        };
        Self {
            opened_at: None,
            last_activity: Instant::now(),
            messages_in: 0,
            messages_out: 0,
            dropped_frames: 0,
            error_count: 0,
            reconnect_count: 0,
            recent_errors: CircularBuffer::new(MAX_RECENT_ERRORS),
            rtt,
        }
    }

    /// A socket opened; uptime and the staleness clock restart here.
    pub fn on_open(&mut self) {
        let now = Instant::now();
        self.opened_at = Some(now);
        self.last_activity = now;
    }

    pub fn on_close(&mut self) {
        self.opened_at = None;
    }

    /// Any inbound frame, including control frames and rejected payloads.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn record_inbound(&mut self) {
        self.touch();
        self.messages_in = self.messages_in.saturating_add(1);
    }

    pub fn record_outbound(&mut self, frames: u64) {
        self.messages_out = self.messages_out.saturating_add(frames);
    }

    pub fn record_dropped(&mut self) {
        self.dropped_frames = self.dropped_frames.saturating_add(1);
    }

    pub fn record_error(&mut self, context: &'static str, error: &str) {
        self.error_count = self.error_count.saturating_add(1);
        self.recent_errors.push(ErrorRecord {
            at: Instant::now(),
            context,
            error: truncate_string(error),
        });
    }

    pub fn record_reconnect(&mut self) {
        self.reconnect_count = self.reconnect_count.saturating_add(1);
    }

    pub fn record_rtt(&mut self, rtt: Duration) {
        let Some(histogram) = self.rtt.as_mut() else {
            return;
        };
        let micros = (rtt.as_micros().min(RTT_HIGHEST_US as u128) as u64).max(1);
        let _ = histogram.record(micros);
    }

    pub fn recent_errors(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.recent_errors.iter()
    }

    pub fn last_activity_age(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// True when an open socket has been silent for longer than `threshold`.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.opened_at.is_some() && self.last_activity.elapsed() > threshold
    }

    pub fn snapshot(&self, state: ConnectionState, queued: usize) -> ConnectionStats {
        let (p50, p99, samples) = match &self.rtt {
            Some(h) if !h.is_empty() => (
                h.value_at_percentile(50.0),
                h.value_at_percentile(99.0),
                h.len(),
            ),
            _ => (0, 0, 0),
        };

        ConnectionStats {
            state,
            uptime: self.opened_at.map(|t| t.elapsed()).unwrap_or_default(),
            messages_in: self.messages_in,
            messages_out: self.messages_out,
            dropped_frames: self.dropped_frames,
            errors: self.error_count,
            reconnects: self.reconnect_count,
            queued,
            last_activity_age: self.last_activity.elapsed(),
            p50_rtt_us: p50,
            p99_rtt_us: p99,
            rtt_samples: samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_rtt_percentiles() {
        let mut monitor = HealthMonitor::new();
        monitor.record_rtt(Duration::from_micros(100));
        monitor.record_rtt(Duration::from_micros(200));
        monitor.record_rtt(Duration::from_micros(300));

        let stats = monitor.snapshot(ConnectionState::Connected, 0);
        assert_eq!(stats.rtt_samples, 3);
        assert_eq!(stats.p50_rtt_us, 200);
        assert_eq!(stats.p99_rtt_us, 300);
    }

    #[test]
    fn error_history_is_bounded_and_truncated() {
        let mut monitor = HealthMonitor::new();
        for i in 0..40 {
            monitor.record_error("read", &format!("error-{i}"));
        }
        let recent: Vec<_> = monitor.recent_errors().collect();
        assert_eq!(recent.len(), MAX_RECENT_ERRORS);
        assert_eq!(recent[0].error, "error-8");
        assert_eq!(monitor.snapshot(ConnectionState::Failed, 0).errors, 40);

        monitor.record_error("write", &"x".repeat(MAX_ERROR_TEXT_BYTES + 10));
        let last = monitor.recent_errors().last().map(|r| r.error.len());
        assert_eq!(last, Some(MAX_ERROR_TEXT_BYTES));
    }

    #[tokio::test(start_paused = true)]
    async fn staleness_only_applies_to_open_sockets() {
        let mut monitor = HealthMonitor::new();
        let threshold = Duration::from_secs(10);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!monitor.is_stale(threshold));

        monitor.on_open();
        tokio::time::advance(Duration::from_secs(5)).await;
        monitor.record_inbound();
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!monitor.is_stale(threshold));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(monitor.is_stale(threshold));

        let stats = monitor.snapshot(ConnectionState::Connected, 2);
        assert_eq!(stats.uptime, Duration::from_secs(16));
        assert_eq!(stats.messages_in, 1);
        assert_eq!(stats.queued, 2);

        monitor.on_close();
        assert!(!monitor.is_stale(threshold));
    }
}
