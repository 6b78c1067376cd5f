use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::SmallRng};

use super::config::RealtimeConfig;

/// Reconnect schedule consulted by a connection after every unexpected closure.
pub trait ReconnectStrategy: Send + Sync + 'static {
    /// Consume one attempt and return the delay to wait before it.
    fn next_delay(&mut self) -> Duration;
    /// Forget consumed attempts (successful open or manual reconnect).
    fn reset(&mut self);
    fn should_retry(&self) -> bool;
    /// Attempts consumed since the last reset.
    fn attempt(&self) -> u32;
}

/// Doubling backoff with a bounded number of attempts.
///
/// Attempt `n` (1-indexed) waits `base * 2^(n-1)`. The product saturates instead of
/// overflowing and is clamped to `max` when one is configured.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Option<Duration>,
    max_retries: u32,
    jitter: bool,
    attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max_retries: u32) -> Self {
        Self {
            base,
            max: None,
            max_retries,
            jitter: false,
            attempts: 0,
        }
    }

    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self {
            base: config.base_delay,
            max: config.max_delay,
            max_retries: config.max_retries,
            jitter: config.jitter,
            attempts: 0,
        }
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = Some(max);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Un-jittered delay for a 1-indexed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let base = self.base.as_nanos();
        let delay = match 1u128.checked_shl(exponent).and_then(|f| base.checked_mul(f)) {
            Some(nanos) => duration_from_nanos(nanos),
            None if base == 0 => Duration::ZERO,
            None => Duration::MAX,
        };
        match self.max {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl ReconnectStrategy for ExponentialBackoff {
    fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        let delay = self.delay_for(self.attempts);
        if self.jitter {
            jitter_delay(delay)
        } else {
            delay
        }
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }

    fn should_retry(&self) -> bool {
        self.attempts < self.max_retries
    }

    fn attempt(&self) -> u32 {
        self.attempts
    }
}

fn duration_from_nanos(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    match u64::try_from(nanos / NANOS_PER_SEC) {
        Ok(secs) => Duration::new(secs, (nanos % NANOS_PER_SEC) as u32),
        Err(_) => Duration::MAX,
    }
}

/// Scale `base` by a random factor in `[0.5, 1.0]`.
pub fn jitter_delay(base: Duration) -> Duration {
    if base.is_zero() {
        return base;
    }

    let mut rng = SmallRng::from_entropy();
    let factor: f64 = rng.gen_range(0.5..=1.0);
    let nanos = (base.as_nanos() as f64 * factor) as u128;
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}
