// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Exponential backoff for transient provider failures.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::ProviderError;

/// Retry policy. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: f64,
    /// Growth factor applied to each following delay.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub max_backoff: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: 1.0,
            multiplier: 2.0,
            max_backoff: 30.0,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// The sequence of delays between attempts: `min(max, prev * multiplier)`.
    ///
    /// Values that [`validate`](Self::validate) rejects are coerced: NaN and
    /// negative delays become zero, a multiplier below one becomes one.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let max = finite_or(self.max_backoff, 0.0).max(0.0);
        let multiplier = finite_or(self.multiplier, 1.0).max(1.0);
        let first = finite_or(self.initial_backoff, 0.0).clamp(0.0, max);
        std::iter::successors(Some(first), move |prev| Some((prev * multiplier).min(max)))
            .take(self.max_retries as usize)
            .map(saturating_duration)
    }

    /// Reject delays that are negative or not finite, and a multiplier
    /// below one.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("initialBackoff", self.initial_backoff),
            ("maxBackoff", self.max_backoff),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{name} must be a non-negative number of seconds"));
            }
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err("multiplier must be at least 1".to_string());
        }
        Ok(())
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Seconds as a [`Duration`]: NaN and negatives are zero, values too large
/// to represent are [`Duration::MAX`].
pub fn saturating_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// retries run out.
///
/// Exhaustion returns [`ProviderError::RetriesExhausted`] wrapping the last
/// error. Dropping the returned future abandons any pending attempt or sleep.
pub async fn with_backoff<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut delays = config.delays();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => err,
        };

        match delays.next() {
            Some(delay) => {
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "Transient LLM error, retrying");
                tokio::time::sleep(delay).await;
            }
            None => {
                return Err(ProviderError::RetriesExhausted {
                    retries: config.max_retries,
                    last: Box::new(err),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff: 0.001,
            multiplier: 2.0,
            max_backoff: 0.004,
        }
    }

    #[test]
    fn test_bad_values_never_panic() {
        let config = RetryConfig {
            max_retries: 3,
            initial_backoff: f64::NAN,
            multiplier: -2.0,
            max_backoff: 1e20,
        };
        let delays: Vec<Duration> = config.delays().collect();
        assert_eq!(delays, vec![Duration::ZERO; 3]);

        let huge = RetryConfig {
            max_retries: 1,
            initial_backoff: 1e20,
            multiplier: 2.0,
            max_backoff: f64::INFINITY,
        };
        assert_eq!(huge.delays().collect::<Vec<_>>(), vec![Duration::ZERO]);

        assert_eq!(saturating_duration(-1.0), Duration::ZERO);
        assert_eq!(saturating_duration(1e20), Duration::MAX);
        assert_eq!(saturating_duration(1.5), Duration::from_millis(1500));
    }

    #[test]
    fn test_validate() {
        assert!(RetryConfig::default().validate().is_ok());
        let negative = RetryConfig {
            multiplier: -2.0,
            ..RetryConfig::default()
        };
        assert_eq!(negative.validate().unwrap_err(), "multiplier must be at least 1");
        let nan = RetryConfig {
            initial_backoff: f64::NAN,
            ..RetryConfig::default()
        };
        assert!(nan.validate().unwrap_err().starts_with("initialBackoff"));
    }

    #[tokio::test]
    async fn test_negative_multiplier_retries_without_panic() {
        let config = RetryConfig {
            max_retries: 2,
            initial_backoff: 0.001,
            multiplier: -2.0,
            max_backoff: 0.004,
        };
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result: Result<(), ProviderError> = with_backoff(&config, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::RateLimited("slow down".to_string()))
            }
        })
        .await;
        assert!(matches!(result, Err(ProviderError::RetriesExhausted { retries: 2, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_delays_grow_and_cap() {
        let config = RetryConfig {
            max_retries: 5,
            initial_backoff: 1.0,
            multiplier: 3.0,
            max_backoff: 10.0,
        };
        let delays: Vec<f64> = config.delays().map(|d| d.as_secs_f64()).collect();
        assert_eq!(delays, vec![1.0, 3.0, 9.0, 10.0, 10.0]);
    }

    #[test]
    fn test_no_delays_without_retries() {
        assert_eq!(RetryConfig::none().delays().count(), 0);
    }

    #[test]
    fn test_config_deserializes_camel_case() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"maxRetries": 5, "initialBackoff": 0.5}"#).unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_backoff, 0.5);
        assert_eq!(config.multiplier, 2.0);
    }

    #[tokio::test]
    async fn test_success_on_later_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = with_backoff(&fast(3), || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(ProviderError::NetworkError("reset".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_wraps_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = with_backoff(&fast(2), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::api("unavailable", 503)) }
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, ProviderError::RetriesExhausted { retries: 2, .. }));
        assert!(err.to_string().starts_with("failed after 2 retries"));
        assert_eq!(err.category(), crate::error::ErrorCategory::Transient);
    }

    #[tokio::test]
    async fn test_non_transient_short_circuits() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = with_backoff(&fast(5), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::AuthError("bad key".into())) }
        })
        .await;
        assert!(matches!(result.unwrap_err(), ProviderError::AuthError(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = with_backoff(&RetryConfig::none(), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Timeout(10)) }
        })
        .await;
        assert!(matches!(result.unwrap_err(), ProviderError::RetriesExhausted { retries: 0, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
