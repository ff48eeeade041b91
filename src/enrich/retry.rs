use std::future::Future;
use std::time::Duration;

/// Bounded attempts with linear backoff: after failed attempt `n` the next
/// attempt starts `n × backoff_unit` later.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_unit,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_unit * attempt
    }
}

#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { last_error: E, attempts: u32 },
}

/// Runs `op` until it succeeds or the policy runs out of attempts.
/// `on_retry(attempt, &error, delay)` fires before each backoff sleep.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: RetryPolicy,
    mut op: F,
    mut on_retry: R,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(u32, &E, Duration),
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => {
                return RetryOutcome::Succeeded {
                    value,
                    attempts: attempt,
                };
            }
            Err(err) if attempt >= policy.max_attempts => {
                return RetryOutcome::Exhausted {
                    last_error: err,
                    attempts: attempt,
                };
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                on_retry(attempt, &err, delay);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_grows_linearly() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2));
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let calls = AtomicU32::new(0);
        let outcome = retry_with_backoff(
            RetryPolicy::new(5, Duration::ZERO),
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { if attempt == 2 { Ok("ok") } else { Err("boom") } }
            },
            |_, _, _| {},
        )
        .await;
        assert!(matches!(outcome, RetryOutcome::Succeeded { value: "ok", attempts: 2 }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let mut retries = Vec::new();
        let outcome: RetryOutcome<(), String> = retry_with_backoff(
            RetryPolicy::new(3, Duration::ZERO),
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("fail {attempt}")) }
            },
            |attempt, _, _| retries.push(attempt),
        )
        .await;
        match outcome {
            RetryOutcome::Exhausted { last_error, attempts } => {
                assert_eq!(last_error, "fail 3");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_between_attempts() {
        let started = tokio::time::Instant::now();
        let _: RetryOutcome<(), ()> = retry_with_backoff(
            RetryPolicy::new(3, Duration::from_secs(2)),
            |_| async { Err(()) },
            |_, _, _| {},
        )
        .await;
        assert!(started.elapsed() >= Duration::from_secs(6));
    }
}
