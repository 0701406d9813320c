//! Retry-with-backoff as an explicit state machine.
//!
//! A [`RetryPolicy`] decides, after each failed attempt, whether to wait and
//! try again or give up. The transition is pure so it can be reasoned about
//! (and tested) without a runtime; [`run`] drives it with `tokio::time::sleep`.
//!
//! ```text
//! Attempting(n) --ok--------------------------> Succeeded
//! Attempting(n) --transient, n < max---------> Waiting(n, delay) --sleep--> Attempting(n+1)
//! Attempting(n) --permanent or n == max------> Exhausted
//! ```

use crate::error::{Error, Result};
use rand::{Rng, rng};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, warn};

/// Delay schedule between attempts. `attempt` is 1-based and names the
/// attempt that just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * attempt + rand(0..=jitter)`
    Linear { base: Duration, jitter: Duration },
    /// `base * attempt²`
    Quadratic { base: Duration },
    /// `min(base * 2^(attempt-1), max) + rand(0..=jitter)`
    Exponential {
        base: Duration,
        max: Duration,
        jitter: Duration,
    },
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Linear { base, jitter } => base.saturating_mul(attempt) + random_jitter(jitter),
            Backoff::Quadratic { base } => base.saturating_mul(attempt.saturating_mul(attempt)),
            Backoff::Exponential { base, max, jitter } => {
                let shift = attempt.saturating_sub(1).min(31);
                base.saturating_mul(1u32 << shift).min(max) + random_jitter(jitter)
            }
        }
    }
}

fn random_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng().random_range(0..=max_ms))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting { attempt: u32 },
    Waiting { attempt: u32, delay: Duration },
    Succeeded,
    Exhausted,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn start(&self) -> RetryState {
        RetryState::Attempting { attempt: 1 }
    }

    /// Transition out of a failed `attempt`.
    pub fn after_failure(&self, attempt: u32, transient: bool) -> RetryState {
        if transient && attempt < self.max_attempts {
            RetryState::Waiting {
                attempt,
                delay: self.backoff.delay(attempt),
            }
        } else {
            RetryState::Exhausted
        }
    }
}

/// Drive `op` under `policy`. `op` receives the 1-based attempt number.
///
/// Returns the first success, or the last error once the policy is exhausted.
/// Errors are classified with [`Error::is_transient`].
pub async fn run<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let t0 = Instant::now();
    let mut state = policy.start();
    let mut outcome: Option<Result<T>> = None;

    loop {
        state = match state {
            RetryState::Attempting { attempt } => match op(attempt).await {
                Ok(value) => {
                    outcome = Some(Ok(value));
                    RetryState::Succeeded
                }
                Err(e) => {
                    let next = policy.after_failure(attempt, e.is_transient());
                    if let RetryState::Waiting { delay, .. } = next {
                        warn!(
                            label,
                            attempt,
                            max = policy.max_attempts,
                            ?delay,
                            error = %e,
                            "attempt failed; backing off"
                        );
                    } else {
                        error!(
                            label,
                            attempt,
                            max = policy.max_attempts,
                            elapsed_ms_total = t0.elapsed().as_millis() as u64,
                            error = %e,
                            "giving up"
                        );
                    }
                    outcome = Some(Err(e));
                    next
                }
            },
            RetryState::Waiting { attempt, delay } => {
                sleep(delay).await;
                RetryState::Attempting {
                    attempt: attempt + 1,
                }
            }
            RetryState::Succeeded | RetryState::Exhausted => break,
        };
    }

    // The machine starts in Attempting, so at least one outcome is recorded.
    outcome.unwrap_or_else(|| Err(Error::Config(format!("{label}: no attempt was made"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn status(code: u16) -> Error {
        Error::from_fetch(FetchError::HttpStatus {
            url: "https://example.com".to_string(),
            status: StatusCode::from_u16(code).unwrap(),
            body: String::new(),
        })
    }

    fn quick() -> RetryPolicy {
        RetryPolicy::new(
            3,
            Backoff::Linear {
                base: Duration::from_millis(1),
                jitter: Duration::ZERO,
            },
        )
    }

    #[test]
    fn test_linear_backoff_without_jitter() {
        let b = Backoff::Linear {
            base: Duration::from_millis(600),
            jitter: Duration::ZERO,
        };
        assert_eq!(b.delay(1), Duration::from_millis(600));
        assert_eq!(b.delay(2), Duration::from_millis(1200));
    }

    #[test]
    fn test_linear_backoff_jitter_is_bounded() {
        let b = Backoff::Linear {
            base: Duration::from_millis(600),
            jitter: Duration::from_millis(200),
        };
        for _ in 0..50 {
            let d = b.delay(1);
            assert!(d >= Duration::from_millis(600) && d <= Duration::from_millis(800));
        }
    }

    #[test]
    fn test_quadratic_backoff() {
        let b = Backoff::Quadratic {
            base: Duration::from_millis(500),
        };
        assert_eq!(b.delay(1), Duration::from_millis(500));
        assert_eq!(b.delay(2), Duration::from_millis(2000));
        assert_eq!(b.delay(3), Duration::from_millis(4500));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let b = Backoff::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
            jitter: Duration::ZERO,
        };
        assert_eq!(b.delay(1), Duration::from_secs(1));
        assert_eq!(b.delay(4), Duration::from_secs(8));
        assert_eq!(b.delay(10), Duration::from_secs(30));
    }

    #[test]
    fn test_transitions() {
        let p = quick();
        assert_eq!(p.start(), RetryState::Attempting { attempt: 1 });
        assert!(matches!(
            p.after_failure(1, true),
            RetryState::Waiting { attempt: 1, .. }
        ));
        assert_eq!(p.after_failure(3, true), RetryState::Exhausted);
        assert_eq!(p.after_failure(1, false), RetryState::Exhausted);
    }

    #[tokio::test]
    async fn test_run_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let out = run(&quick(), "test", |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { if n < 3 { Err(status(503)) } else { Ok(n) } }
        })
        .await
        .unwrap();
        assert_eq!(out, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_stops_on_permanent() {
        let calls = AtomicU32::new(0);
        let out: Result<()> = run(&quick(), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(status(404)) }
        })
        .await;
        assert!(matches!(out, Err(Error::PermanentNetwork(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_returns_last_error_when_exhausted() {
        let calls = AtomicU32::new(0);
        let out: Result<()> = run(&quick(), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(status(500)) }
        })
        .await;
        assert!(matches!(out, Err(Error::TransientNetwork(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
