//! Retry policy for sync and send.

use std::time::Duration;

use rand::Rng;

use crate::ClientError;

/// Retry decision result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after a delay.
    RetryAfter(Duration),
    /// Do not retry.
    DoNotRetry,
}

/// Exponential backoff with jitter.
///
/// A `Retry-After` delay sent by the server replaces the computed backoff,
/// bounded by `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Maximum jitter to add to delays.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        crate::RetryConfig::default().policy()
    }
}

impl RetryPolicy {
    /// Decide whether to retry after `attempt` failed with `error`.
    #[must_use]
    pub fn decide(&self, error: &ClientError, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts || !error.is_retryable() {
            return RetryDecision::DoNotRetry;
        }

        if let Some(retry_after) = error.retry_after() {
            return RetryDecision::RetryAfter(retry_after.min(self.max_delay));
        }

        RetryDecision::RetryAfter(self.backoff(attempt) + self.jitter())
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let exp = 2_u64.saturating_pow(attempt.saturating_sub(1));
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(exp).min(max_ms))
    }

    fn jitter(&self) -> Duration {
        let jitter_max = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_max))
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;
    use crate::ApiError;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
            max_jitter: Duration::ZERO,
        }
    }

    fn api_error(status: StatusCode, retry_after: Option<Duration>) -> ClientError {
        ClientError::Api(ApiError::from_response(status, b"", retry_after))
    }

    #[test]
    fn test_backoff_doubles_up_to_max_delay() {
        let policy = policy();
        let err = api_error(StatusCode::SERVICE_UNAVAILABLE, None);

        assert_eq!(
            policy.decide(&err, 1),
            RetryDecision::RetryAfter(Duration::from_millis(100))
        );
        assert_eq!(
            policy.decide(&err, 2),
            RetryDecision::RetryAfter(Duration::from_millis(200))
        );
        assert_eq!(
            policy.decide(&err, 3),
            RetryDecision::RetryAfter(Duration::from_millis(250))
        );
        assert_eq!(policy.decide(&err, 4), RetryDecision::DoNotRetry);
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        let policy = policy();
        assert_eq!(
            policy.decide(&api_error(StatusCode::BAD_REQUEST, None), 1),
            RetryDecision::DoNotRetry
        );
        assert_eq!(
            policy.decide(&ClientError::Token("expired".into()), 1),
            RetryDecision::DoNotRetry
        );
    }

    #[test]
    fn test_retry_after_is_honoured_within_max_delay() {
        let policy = policy();

        let err = api_error(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_millis(120)));
        assert_eq!(
            policy.decide(&err, 3),
            RetryDecision::RetryAfter(Duration::from_millis(120))
        );

        let err = api_error(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(60)));
        assert_eq!(
            policy.decide(&err, 1),
            RetryDecision::RetryAfter(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_jitter_is_bounded() {
        let policy = RetryPolicy {
            max_jitter: Duration::from_millis(50),
            ..policy()
        };
        let err = api_error(StatusCode::BAD_GATEWAY, None);

        for _ in 0..32 {
            let RetryDecision::RetryAfter(delay) = policy.decide(&err, 1) else {
                panic!("expected a retry");
            };
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }
}
