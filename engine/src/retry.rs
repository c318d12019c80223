use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Fixed-delay bounded retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T> {
    /// The predicate accepted a value.
    Settled { value: T, attempts: u32 },
    /// Attempts ran out; carries the last value the operation produced.
    Exhausted { last: T, attempts: u32 },
    /// `still_wanted` turned false; whatever was in flight is dropped.
    Abandoned { attempts: u32 },
}

/// Run `op` until `needs_retry` returns false for its value or the attempt
/// budget is spent, sleeping `policy.delay` between attempts.
///
/// `needs_retry` sees every value produced while the caller still wanted it,
/// along with whether another attempt remains. `still_wanted` is checked before
/// every attempt, after every delay and after every response. The delay is cut
/// short when the future returned by `superseded` resolves. An error is only
/// returned when the final attempt failed and no earlier attempt produced a
/// value.
pub async fn retry_bounded<T, E, Op, Fut, Retry, Alive, Wake, WakeFut>(
    policy: RetryPolicy,
    mut op: Op,
    mut needs_retry: Retry,
    still_wanted: Alive,
    superseded: Wake,
) -> Result<RetryOutcome<T>, E>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Retry: FnMut(&T, bool) -> bool,
    Alive: Fn() -> bool,
    Wake: Fn() -> WakeFut,
    WakeFut: Future<Output = ()>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_value: Option<T> = None;

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            let woken = superseded();
            if still_wanted() {
                tokio::select! {
                    () = tokio::time::sleep(policy.delay) => {}
                    () = woken => {}
                }
            }
        }
        if !still_wanted() {
            return Ok(RetryOutcome::Abandoned {
                attempts: attempt - 1,
            });
        }

        match op(attempt).await {
            Ok(value) => {
                if !still_wanted() {
                    return Ok(RetryOutcome::Abandoned { attempts: attempt });
                }
                if !needs_retry(&value, attempt < max_attempts) {
                    return Ok(RetryOutcome::Settled {
                        value,
                        attempts: attempt,
                    });
                }
                last_value = Some(value);
            }
            Err(e) => {
                if !still_wanted() {
                    return Ok(RetryOutcome::Abandoned { attempts: attempt });
                }
                if attempt == max_attempts && last_value.is_none() {
                    return Err(e);
                }
                debug!(attempt, max_attempts, error = %e, "attempt failed, retrying");
            }
        }
    }

    match last_value {
        Some(last) => Ok(RetryOutcome::Exhausted {
            last,
            attempts: max_attempts,
        }),
        // Unreachable in practice: the last failed attempt returns early above.
        None => Ok(RetryOutcome::Abandoned {
            attempts: max_attempts,
        }),
    }
}
