//! Retry policy for transactions that lost an optimistic commit.
//!
//! A conflicting operation is re-run from a fresh transaction after an
//! exponential, jittered delay. Only retryable errors are retried.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base
    Constant,
}

/// Jitter strategy, so that colliding writers do not collide again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter.
    None,
    /// Random from 0 to delay.
    #[default]
    Full,
    /// Half fixed, half random.
    Equal,
    /// min(max, random(base, prev * 3))
    Decorrelated,
}

fn default_max_attempts() -> usize {
    8
}

fn default_base_delay_ms() -> u64 {
    2
}

fn default_max_delay_ms() -> u64 {
    250
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Base delay between attempts in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Backoff strategy.
    #[serde(default)]
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_strategy: BackoffStrategy::default(),
            jitter_strategy: JitterStrategy::default(),
        }
    }
}

impl RetryConfig {
    /// Creates a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A config that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }
}

/// Attempt counter for one operation.
#[derive(Debug, Default)]
pub struct RetryState {
    /// Attempts made so far.
    pub attempt: usize,
    previous_delays: HashMap<String, u64>,
}

impl RetryState {
    /// Creates a fresh state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an attempt.
    pub fn record_attempt(&mut self) {
        self.attempt += 1;
    }

    /// Returns true once `max_attempts` attempts have been made.
    #[must_use]
    pub fn is_exhausted(&self, config: &RetryConfig) -> bool {
        self.attempt >= config.max_attempts
    }

    /// Calculates the delay before the next attempt.
    #[must_use]
    pub fn calculate_delay(&mut self, key: &str, config: &RetryConfig) -> Duration {
        let base = config.base_delay_ms;
        let max = config.max_delay_ms;
        let exponent = u32::try_from(self.attempt.saturating_sub(1)).unwrap_or(u32::MAX);

        let delay = match config.backoff_strategy {
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(exponent)).min(max),
            BackoffStrategy::Linear => base.saturating_mul(u64::from(exponent) + 1).min(max),
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = match config.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
            JitterStrategy::Decorrelated => {
                let prev = self.previous_delays.get(key).copied().unwrap_or(base);
                let upper = prev.saturating_mul(3).min(max);
                let next = if upper <= base {
                    base
                } else {
                    rand::thread_rng().gen_range(base..=upper)
                };
                self.previous_delays.insert(key.to_string(), next);
                next
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the delay.
    Retry(Duration),
    /// Attempts exhausted.
    GiveUp,
    /// The error is not retryable.
    NotRetryable,
}

/// Decides what to do after a failed attempt. Call after
/// [`RetryState::record_attempt`].
#[must_use]
pub fn should_retry(
    state: &mut RetryState,
    config: &RetryConfig,
    key: &str,
    retryable: bool,
) -> RetryDecision {
    if !retryable {
        return RetryDecision::NotRetryable;
    }
    if state.is_exhausted(config) {
        return RetryDecision::GiveUp;
    }
    RetryDecision::Retry(state.calculate_delay(key, config))
}

/// Runs `operation` until it succeeds, fails with an error `is_retryable`
/// rejects, or runs out of attempts.
pub async fn with_retry<T, E, F, Fut, P>(
    config: &RetryConfig,
    key: &str,
    is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut state = RetryState::new();

    loop {
        state.record_attempt();
        let err = match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => err,
        };

        match should_retry(&mut state, config, key, is_retryable(&err)) {
            RetryDecision::Retry(delay) => {
                tracing::debug!(
                    operation = key,
                    attempt = state.attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Retrying after error"
                );
                tokio::time::sleep(delay).await;
            }
            RetryDecision::GiveUp => {
                tracing::warn!(operation = key, attempts = state.attempt, error = %err, "Retries exhausted");
                return Err(err);
            }
            RetryDecision::NotRetryable => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 8);
        assert_eq!(config.backoff_strategy, BackoffStrategy::Exponential);
        assert_eq!(config.jitter_strategy, JitterStrategy::Full);
    }

    #[test]
    fn test_retry_config_from_partial_json() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"max_attempts": 3, "jitter_strategy": "none"}"#).unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.jitter_strategy, JitterStrategy::None);
        assert_eq!(config.base_delay_ms, 2);
    }

    #[test]
    fn test_exponential_delays_without_jitter() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_max_delay_ms(350)
            .with_jitter(JitterStrategy::None);
        let mut state = RetryState::new();

        let delays: Vec<u128> = (0..4)
            .map(|_| {
                state.record_attempt();
                state.calculate_delay("op", &config).as_millis()
            })
            .collect();
        assert_eq!(delays, vec![100, 200, 350, 350]);
    }

    #[test]
    fn test_linear_and_constant_delays() {
        let linear = RetryConfig::new()
            .with_base_delay_ms(10)
            .with_backoff(BackoffStrategy::Linear)
            .with_jitter(JitterStrategy::None);
        let constant = linear.clone().with_backoff(BackoffStrategy::Constant);
        let mut state = RetryState::new();
        state.attempt = 3;

        assert_eq!(state.calculate_delay("op", &linear), Duration::from_millis(30));
        assert_eq!(state.calculate_delay("op", &constant), Duration::from_millis(10));
    }

    #[test]
    fn test_full_jitter_stays_below_delay() {
        let config = RetryConfig::new()
            .with_base_delay_ms(50)
            .with_backoff(BackoffStrategy::Constant);
        let mut state = RetryState::new();
        state.attempt = 1;

        for _ in 0..20 {
            assert!(state.calculate_delay("op", &config) <= Duration::from_millis(50));
        }
    }

    #[test]
    fn test_should_retry_decisions() {
        let config = RetryConfig::new().with_max_attempts(2);
        let mut state = RetryState::new();

        state.record_attempt();
        assert_eq!(should_retry(&mut state, &config, "op", false), RetryDecision::NotRetryable);
        assert!(matches!(should_retry(&mut state, &config, "op", true), RetryDecision::Retry(_)));

        state.record_attempt();
        assert_eq!(should_retry(&mut state, &config, "op", true), RetryDecision::GiveUp);
    }

    #[tokio::test]
    async fn test_with_retry_recovers() {
        let config = RetryConfig::new().with_base_delay_ms(1);
        let calls = AtomicUsize::new(0);

        let result: Result<u32, String> = with_retry(&config, "op", |_| true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(format!("conflict {n}"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_stops_on_permanent_error() {
        let config = RetryConfig::new().with_base_delay_ms(1);
        let calls = AtomicUsize::new(0);

        let result: Result<u32, String> = with_retry(
            &config,
            "op",
            |e: &String| e.starts_with("conflict"),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("forbidden".to_string()) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up() {
        let config = RetryConfig::new().with_max_attempts(3).with_base_delay_ms(1);
        let calls = AtomicUsize::new(0);

        let result: Result<u32, String> = with_retry(&config, "op", |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("conflict".to_string()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
