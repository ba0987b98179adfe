//! Rate limit gate placed in front of generative-text calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::ratelimit::{AdmissionControl, RateLimitInfo};

/// A request was refused because one of the session's windows is full.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Rate limit exceeded for session {session_id}: {remaining}")]
pub struct RateLimitExceeded {
    /// The session that was refused
    pub session_id: String,
    /// Requests left in each window when the request was refused
    pub remaining: RateLimitInfo,
    /// How long until the session would be admitted again
    pub retry_after: Option<Duration>,
}

impl RateLimitExceeded {
    /// Whole seconds to wait before retrying, rounded up.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after
            .map(|d| d.as_secs() + u64::from(d.subsec_nanos() > 0))
    }
}

/// Failure of a gated operation.
#[derive(Debug, Error)]
pub enum GateError<E> {
    /// The gate refused the request; the operation was never started
    #[error(transparent)]
    Limited(#[from] RateLimitExceeded),

    /// The operation ran and failed
    #[error("Gated operation failed: {0}")]
    Operation(E),
}

/// Admission gate that callers consult before each gated call.
pub struct RateLimitGate<R: AdmissionControl> {
    /// The rate limiter instance
    rate_limiter: Arc<R>,
}

impl<R: AdmissionControl> Clone for RateLimitGate<R> {
    fn clone(&self) -> Self {
        Self {
            rate_limiter: self.rate_limiter.clone(),
        }
    }
}

impl<R: AdmissionControl> RateLimitGate<R> {
    /// Create a new gate with the given rate limiter.
    pub fn new(rate_limiter: Arc<R>) -> Self {
        Self { rate_limiter }
    }

    /// Admit one request for `session_id` or explain why it was refused.
    #[instrument(skip(self))]
    pub fn check(&self, session_id: &str) -> Result<(), RateLimitExceeded> {
        if session_id.is_empty() {
            warn!("Rate limit check with empty session id");
        }

        if self.rate_limiter.check_rate_limit(session_id) {
            debug!(session_id = %session_id, "Request admitted");
            return Ok(());
        }

        let remaining = self.rate_limiter.rate_limit_info(session_id);
        let retry_after = self.rate_limiter.retry_after(session_id);

        info!(
            session_id = %session_id,
            minute_remaining = remaining.minute_remaining,
            hour_remaining = remaining.hour_remaining,
            day_remaining = remaining.day_remaining,
            retry_after_ms = retry_after.map(|d| d.as_millis() as u64),
            "Request refused by rate limit"
        );

        Err(RateLimitExceeded {
            session_id: session_id.to_string(),
            remaining,
            retry_after,
        })
    }

    /// Remaining requests for display, without counting a request.
    pub fn remaining(&self, session_id: &str) -> RateLimitInfo {
        self.rate_limiter.rate_limit_info(session_id)
    }

    /// Run `op` only if `session_id` is admitted.
    pub async fn run<F, Fut, T, E>(&self, session_id: &str, op: F) -> Result<T, GateError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.check(session_id)?;
        op().await.map_err(GateError::Operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{RateLimiter, WindowLimits};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    fn gate_with_minute_limit(per_minute: u64) -> RateLimitGate<RateLimiter> {
        let limiter = RateLimiter::with_limits(WindowLimits::new(per_minute, 250, 500));
        RateLimitGate::new(Arc::new(limiter))
    }

    #[test]
    fn test_check_admits_within_limit() {
        let gate = gate_with_minute_limit(15);
        assert_ok!(gate.check("S1"));
        assert_eq!(gate.remaining("S1").minute_remaining, 14);
    }

    #[test]
    fn test_check_reports_remaining_on_refusal() {
        let gate = gate_with_minute_limit(15);
        for _ in 0..15 {
            assert_ok!(gate.check("S1"));
        }

        let err = assert_err!(gate.check("S1"));
        assert_eq!(err.session_id, "S1");
        assert_eq!(
            err.remaining,
            RateLimitInfo {
                minute_remaining: 0,
                hour_remaining: 235,
                day_remaining: 485,
            }
        );

        let wait = err.retry_after_secs().unwrap();
        assert!((1..=61).contains(&wait), "unexpected retry hint {}", wait);
        assert!(err.to_string().starts_with("Rate limit exceeded for session S1"));
    }

    #[tokio::test]
    async fn test_run_executes_admitted_operation() {
        let gate = gate_with_minute_limit(1);

        let result: Result<&str, GateError<std::io::Error>> =
            gate.run("S1", || async { Ok("generated question") }).await;
        assert_eq!(result.unwrap(), "generated question");
    }

    #[tokio::test]
    async fn test_run_skips_operation_when_refused() {
        let gate = gate_with_minute_limit(1);
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let _ = gate
                .run("S1", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, std::io::Error>(())
                })
                .await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let result = gate
            .run("S1", || async { Ok::<_, std::io::Error>(()) })
            .await;
        assert!(matches!(result, Err(GateError::Limited(_))));
    }

    #[tokio::test]
    async fn test_run_maps_operation_error() {
        let gate = gate_with_minute_limit(5);

        let result: Result<(), GateError<String>> = gate
            .run("S1", || async { Err("backend unavailable".to_string()) })
            .await;

        match result {
            Err(GateError::Operation(msg)) => assert_eq!(msg, "backend unavailable"),
            other => panic!("unexpected result: {:?}", other),
        }
        // The failed operation still counted as an admitted request
        assert_eq!(gate.remaining("S1").minute_remaining, 4);
    }

    #[test]
    fn test_retry_after_secs_rounds_up() {
        let err = RateLimitExceeded {
            session_id: "S1".to_string(),
            remaining: RateLimitInfo {
                minute_remaining: 0,
                hour_remaining: 10,
                day_remaining: 10,
            },
            retry_after: Some(Duration::from_millis(15_001)),
        };
        assert_eq!(err.retry_after_secs(), Some(16));
    }
}
