//! Retry policy: exponential backoff with jitter.
//!
//! `delay_n = min(base_delay * exponential_base^n, max_delay)`, plus up to
//! +25% random jitter. A `Retry-After` value from the server replaces the
//! computed delay entirely (handled by the transport).

use std::time::Duration;

use crate::error::classify_http_status;

/// Retry behavior knobs.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first (i.e. `max_retries + 1`).
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Config allowing `max_retries` retries after the initial attempt.
    #[must_use]
    pub fn with_max_retries(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_retries + 1,
            base_delay,
            ..Self::default()
        }
    }

}

/// Backoff delay before retry number `attempt` (zero-based).
#[must_use]
pub fn calculate_retry_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let exp = config.base_delay.as_secs_f64() * config.exponential_base.powi(attempt as i32);
    let capped = exp.min(config.max_delay.as_secs_f64());
    let final_delay = if config.jitter {
        capped * (1.0 + rand::random::<f64>() * 0.25)
    } else {
        capped
    };
    Duration::from_secs_f64(final_delay)
}

/// Whether an HTTP status is worth retrying at the transport level.
#[must_use]
pub const fn is_retryable_status(status: u16) -> bool {
    classify_http_status(status).should_retry
}

/// Notified before each backoff sleep: `(attempt_index, delay)`.
pub type OnRetry<'a> = &'a (dyn Fn(u32, Duration) + Send + Sync);

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(base_secs: u64) -> RetryConfig {
        RetryConfig {
            base_delay: Duration::from_secs(base_secs),
            jitter: false,
            ..RetryConfig::default()
        }
    }

    #[test]
    fn defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert!(config.jitter);
    }

    #[test]
    fn exponential_growth() {
        let config = no_jitter(1);
        assert_eq!(calculate_retry_delay(0, &config), Duration::from_secs(1));
        assert_eq!(calculate_retry_delay(1, &config), Duration::from_secs(2));
        assert_eq!(calculate_retry_delay(2, &config), Duration::from_secs(4));
        assert_eq!(calculate_retry_delay(3, &config), Duration::from_secs(8));
    }

    #[test]
    fn capped_at_max_delay() {
        let config = no_jitter(1);
        assert_eq!(calculate_retry_delay(10, &config), Duration::from_secs(60));
    }

    #[test]
    fn jitter_stays_within_25_percent() {
        let config = RetryConfig {
            base_delay: Duration::from_secs(10),
            ..RetryConfig::default()
        };
        for _ in 0..50 {
            let delay = calculate_retry_delay(0, &config).as_secs_f64();
            assert!((10.0..12.5).contains(&delay), "delay was {delay}");
        }
    }

    #[test]
    fn with_max_retries_counts_initial_attempt() {
        let config = RetryConfig::with_max_retries(3, Duration::from_secs(1));
        assert_eq!(config.max_attempts, 4);
    }

    #[test]
    fn retryable_statuses_match_taxonomy() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status), "status {status}");
        }
        for status in [400, 401, 403, 404, 418] {
            assert!(!is_retryable_status(status), "status {status}");
        }
    }
}
