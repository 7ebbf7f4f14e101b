//! Lazy-refill token bucket used to pace archive requests.
//!
//! No background timer: tokens are credited on demand when a caller arrives after the
//! refill deadline. All bookkeeping happens under one short `parking_lot` lock and the
//! lock is never held across an `.await`, so concurrent fetch sessions sharing a bucket
//! always see a consistent count (ordering between them is not FIFO).

use crate::error::{Error, Result};
use crate::throttle::Throttle;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Fill level. A refill deadline only exists while the bucket is below capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Fill {
    Full,
    Depleting { tokens: u32, next_refill: Instant },
}

#[derive(Debug)]
struct State {
    fill: Fill,
    /// Latest deadline handed to a sleeping acquirer. Credits up to it are already spoken for.
    reserved_until: Option<Instant>,
}

pub struct TokenBucket {
    interval: Duration,
    capacity: u32,
    state: Mutex<State>,
}

impl TokenBucket {
    /// One token is credited every `interval`, storing up to `capacity` tokens.
    /// The bucket starts full.
    pub fn new(interval: Duration, capacity: u32) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::InvalidArgument("refill interval must be > 0".into()));
        }
        if capacity == 0 {
            return Err(Error::InvalidArgument("capacity must be > 0".into()));
        }
        Ok(Self { interval, capacity, state: Mutex::new(State { fill: Fill::Full, reserved_until: None }) })
    }

    pub fn interval(&self) -> Duration { self.interval }
    pub fn capacity(&self) -> u32 { self.capacity }

    /// Tokens available right now (after crediting any elapsed refills).
    pub fn available(&self) -> u32 {
        let mut state = self.state.lock();
        self.refill(&mut state.fill, Instant::now());
        match state.fill {
            Fill::Full => self.capacity,
            Fill::Depleting { tokens, .. } => tokens,
        }
    }

    /// Removes one token, waiting for it to refill if none are available.
    pub async fn acquire(&self) {
        if let Some(wake_at) = self.reserve(Instant::now()) {
            tokio::time::sleep_until(wake_at).await;
        }
    }

    /// Empties the bucket; the next token arrives `delay` from now, after which the
    /// normal refill rate resumes. Tokens already promised to sleeping acquirers stay
    /// theirs, so the next free token is never earlier than the current schedule allows.
    pub fn force_delay(&self, delay: Duration) {
        let now = Instant::now();
        let mut state = self.state.lock();
        let mut next_refill = now + delay;
        if let (Some(until), Fill::Depleting { next_refill: scheduled, .. }) = (state.reserved_until, state.fill) {
            if until >= now {
                next_refill = next_refill.max(scheduled);
            }
        }
        state.fill = Fill::Depleting { tokens: 0, next_refill };
    }

    /// Claims a token under the lock. Returns the instant the caller must sleep until
    /// when the claimed token is the one credited at the current deadline.
    fn reserve(&self, now: Instant) -> Option<Instant> {
        let mut state = self.state.lock();
        self.refill(&mut state.fill, now);
        let fill = state.fill;
        match fill {
            Fill::Full => {
                state.fill = Fill::Depleting { tokens: self.capacity - 1, next_refill: now + self.interval };
                None
            }
            Fill::Depleting { tokens, next_refill } if tokens > 0 => {
                state.fill = Fill::Depleting { tokens: tokens - 1, next_refill };
                None
            }
            Fill::Depleting { next_refill, .. } => {
                state.fill = Fill::Depleting { tokens: 0, next_refill: next_refill + self.interval };
                state.reserved_until = Some(next_refill);
                Some(next_refill)
            }
        }
    }

    fn refill(&self, fill: &mut Fill, now: Instant) {
        let Fill::Depleting { tokens, next_refill } = *fill else { return };
        if now < next_refill {
            return;
        }
        let elapsed = now.duration_since(next_refill);
        let credited = (elapsed.as_nanos() / self.interval.as_nanos()) as u64 + 1;
        let total = tokens as u64 + credited;
        *fill = if total >= self.capacity as u64 {
            Fill::Full
        } else {
            // total < capacity, so `credited` fits in u32
            Fill::Depleting { tokens: total as u32, next_refill: next_refill + self.interval * credited as u32 }
        };
    }
}

#[async_trait]
impl Throttle for TokenBucket {
    async fn acquire(&self) {
        TokenBucket::acquire(self).await
    }
    fn cooldown(&self, delay: Duration) {
        self.force_delay(delay)
    }
}
