//! Exponential backoff against a shared [`Throttle`].
//!
//! Every failed attempt also pushes the limiter's next grant out by the current
//! backoff, so a struggling service slows down all traffic through that limiter,
//! not only the request being retried.

use crate::throttle::Throttle;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Continuation signal returned by batch callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

impl Flow {
    pub fn is_continue(self) -> bool { self == Flow::Continue }
}

impl From<bool> for Flow {
    fn from(keep_going: bool) -> Self {
        if keep_going { Flow::Continue } else { Flow::Stop }
    }
}

/// Backoff schedule: `base_delay`, then multiplied by `multiplier` per failure. A failure
/// whose delay would take the cumulative backoff past `max_total_backoff` is surfaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_total_backoff: Duration,
}

impl RetryPolicy {
    pub const fn new(base_delay: Duration, multiplier: u32, max_total_backoff: Duration) -> Self {
        Self { base_delay, multiplier, max_total_backoff }
    }

    /// Single batched lookups: gives up after roughly two seconds of backoff. Failures one
    /// to four are retried (125/250/500/1000ms, 1875ms in total); the fifth is surfaced.
    pub const fn by_ids() -> Self {
        Self::new(Duration::from_millis(125), 2, Duration::from_millis(2000))
    }

    /// Paged thread scans: more patient, roughly eight seconds of backoff.
    pub const fn paged() -> Self {
        Self::new(Duration::from_millis(125), 2, Duration::from_millis(8000))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self { Self::by_ids() }
}

/// Backoff bookkeeping for one logical request.
#[derive(Clone, Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    current: Duration,
    total: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, current: Duration::ZERO, total: Duration::ZERO, failures: 0 }
    }

    /// Records a failure and returns the delay before the next attempt,
    /// or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures += 1;
        let next = if self.current.is_zero() {
            self.policy.base_delay
        } else {
            self.current.saturating_mul(self.policy.multiplier.max(1))
        };
        if self.total + next > self.policy.max_total_backoff {
            return None;
        }
        self.current = next;
        self.total += next;
        Some(next)
    }

    pub fn total(&self) -> Duration { self.total }
    pub fn failures(&self) -> u32 { self.failures }
}

/// Result of a retry loop. Only the boundary turns `Exhausted` into an error.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Success(T),
    Exhausted { error: E, failures: u32, total_backoff: Duration },
    /// The failure observer asked to stop.
    Stopped,
}

/// Runs `op` until it succeeds, the policy gives up, or `on_failure` returns `Flow::Stop`.
/// A token is acquired from `throttle` before every attempt.
pub async fn retry_with_backoff<T, E, Op, Fut, OnFail>(
    throttle: &dyn Throttle,
    policy: RetryPolicy,
    label: &str,
    mut op: Op,
    mut on_failure: OnFail,
) -> RetryOutcome<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    OnFail: FnMut(&E) -> Flow,
    E: Display,
{
    let mut backoff = Backoff::new(policy);
    loop {
        throttle.acquire().await;
        let error = match op().await {
            Ok(v) => return RetryOutcome::Success(v),
            Err(e) => e,
        };

        let Some(delay) = backoff.next_delay() else {
            return RetryOutcome::Exhausted {
                error,
                failures: backoff.failures(),
                total_backoff: backoff.total(),
            };
        };
        throttle.cooldown(delay);
        if on_failure(&error) == Flow::Stop {
            return RetryOutcome::Stopped;
        }
        tracing::warn!("{} failed ({}); delay: {}ms", label, error, delay.as_millis());
    }
}
