// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;
use std::time::Duration;

/// Exponential backoff applied to retryable delivery failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff_factor: Duration,
    pub backoff_max: Duration,
    /// Upper bound on send attempts for one batch, the first one included.
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Delay to wait after the failed attempt with 0-based index `attempt`:
    /// `min(backoff_factor * 2^attempt, backoff_max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        1u32.checked_shl(attempt)
            .and_then(|multiplier| self.backoff_factor.checked_mul(multiplier))
            .map_or(self.backoff_max, |delay| delay.min(self.backoff_max))
    }

    /// At least one attempt is always made.
    pub(crate) fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Longest a single batch can spend being sent and retried when every
    /// attempt runs into `send_timeout`. Does not cover 413 splits.
    pub fn delivery_budget(&self, send_timeout: Duration) -> Duration {
        let attempts = self.max_attempts();
        (0..attempts - 1)
            .map(|n| self.delay_for(n))
            .fold(send_timeout.saturating_mul(attempts), Duration::saturating_add)
    }
}

/// What to do with a batch after one send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Transient failure; resend the same records after a backoff delay.
    Retryable(String),
    /// 413; split the batch and send each half on its own.
    TooLarge,
    /// The ingest API will never accept this payload.
    Fatal(StatusCode),
}

pub fn classify(status: StatusCode) -> Outcome {
    match status {
        s if s.is_success() => Outcome::Success,
        StatusCode::PAYLOAD_TOO_LARGE => Outcome::TooLarge,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            Outcome::Retryable(format!("ingest API responded with {status}"))
        }
        s if s.is_server_error() => {
            Outcome::Retryable(format!("ingest API responded with {status}"))
        }
        s => Outcome::Fatal(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            backoff_factor: Duration::from_secs(5),
            backoff_max: Duration::from_secs(80),
            max_retries: 8,
        }
    }

    #[test]
    fn test_delay_doubles_until_capped() {
        let policy = policy();
        let delays: Vec<u64> = (0..7).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 80, 80, 80]);
    }

    #[test]
    fn test_delay_saturates_on_overflow() {
        let policy = policy();
        assert_eq!(policy.delay_for(31), Duration::from_secs(80));
        assert_eq!(policy.delay_for(32), Duration::from_secs(80));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(80));
    }

    #[test]
    fn test_max_attempts_is_at_least_one() {
        let policy = RetryPolicy {
            max_retries: 0,
            ..policy()
        };
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_delivery_budget_covers_every_attempt_and_delay() {
        // 8 * 30s of requests plus 5 + 10 + 20 + 40 + 80 + 80 + 80 of backoff
        assert_eq!(
            policy().delivery_budget(Duration::from_secs(30)),
            Duration::from_secs(555)
        );

        let single = RetryPolicy {
            max_retries: 1,
            ..policy()
        };
        assert_eq!(
            single.delivery_budget(Duration::from_secs(30)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_classify_success() {
        assert_eq!(classify(StatusCode::OK), Outcome::Success);
        assert_eq!(classify(StatusCode::ACCEPTED), Outcome::Success);
    }

    #[test]
    fn test_classify_retryable() {
        for status in [
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert!(
                matches!(classify(status), Outcome::Retryable(_)),
                "{status} should be retryable"
            );
        }
    }

    #[test]
    fn test_classify_too_large() {
        assert_eq!(classify(StatusCode::PAYLOAD_TOO_LARGE), Outcome::TooLarge);
    }

    #[test]
    fn test_classify_fatal() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::UNAUTHORIZED,
            StatusCode::FORBIDDEN,
            StatusCode::NOT_FOUND,
        ] {
            assert_eq!(classify(status), Outcome::Fatal(status));
        }
    }
}
