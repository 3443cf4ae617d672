use std::time::Duration;

// ============================================================================
// Exponential Backoff
// ============================================================================
//
// `Backoff` is driven by a long-running loop (the broker session) that decides
// itself when an attempt failed or succeeded. Delays grow by `multiplier` up to
// `max_delay`; `max_attempts` consecutive failures exhaust the budget.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Consecutive failures tolerated, including the first one
    pub max_attempts: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl RetryConfig {
    /// Broker session recovery: many attempts, long cap
    pub fn session() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        let next = Duration::from_millis((delay.as_millis() as f64 * self.multiplier) as u64);
        next.min(self.max_delay)
    }
}

/// Consecutive-failure tracker for long-running loops. `on_failure` hands back
/// the delay to wait, or `None` once `max_attempts` consecutive failures have
/// been seen.
#[derive(Debug)]
pub struct Backoff {
    config: RetryConfig,
    failures: u32,
    delay: Duration,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        let delay = config.initial_delay;
        Self { config, failures: 0, delay }
    }

    pub fn on_failure(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures >= self.config.max_attempts {
            return None;
        }

        let delay = self.delay;
        self.delay = self.config.next_delay(delay);
        Some(delay)
    }

    pub fn on_success(&mut self) {
        if self.failures > 0 {
            tracing::info!(failures = self.failures, "Recovered after consecutive failures");
        }
        self.failures = 0;
        self.delay = self.config.initial_delay;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
