//! Bounded exponential backoff for dial attempts.
//!
//! Each failed attempt asks the policy for the next delay. Delays start at
//! `initial_delay`, grow by `multiplier`, are capped at `max_delay` and get
//! up to `jitter_factor` of random spread. Once `max_retries` delays have
//! been handed out the policy returns `None` and the caller gives up.

use std::time::Duration;

use rand::Rng;

use crate::constants::DEFAULT_MAX_RECONNECT_ATTEMPTS;

/// Tuning knobs for [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay (before jitter).
    pub max_delay: Duration,
    /// Growth factor applied after every retry.
    pub multiplier: f64,
    /// Random spread as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Retries allowed after the first failed attempt. `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_retries: Some(DEFAULT_MAX_RECONNECT_ATTEMPTS),
        }
    }
}

/// Stateful backoff sequence for one reconnect cycle.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: BackoffConfig,
    next: Duration,
    retries: u32,
}

impl ReconnectPolicy {
    /// Start a fresh sequence.
    pub fn new(config: BackoffConfig) -> Self {
        let next = config.initial_delay;
        Self {
            config,
            next,
            retries: 0,
        }
    }

    /// Delay to wait before the next attempt, or `None` once the retry
    /// budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self
            .config
            .max_retries
            .is_some_and(|max| self.retries >= max)
        {
            return None;
        }
        self.retries += 1;

        let delay = self.jittered(self.next);
        self.next = scale(self.next, self.config.multiplier.max(1.0)).min(self.config.max_delay);
        Some(delay)
    }

    fn jittered(&self, base: Duration) -> Duration {
        let factor = self.config.jitter_factor;
        if !(factor.is_finite() && factor > 0.0) || base.is_zero() {
            return base;
        }
        let spread: f64 = rand::rng().random_range(-factor..=factor);
        scale(base, (1.0 + spread).max(0.0))
    }
}

/// `base * factor`, saturating instead of panicking on overflow.
fn scale(base: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(base.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}
