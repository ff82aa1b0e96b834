//! Permit-based limiter for calls against the catalog source.
//!
//! Every external call holds a [`RateLimitToken`] for its whole duration. The
//! permit goes back to the pool when the token is released or dropped, which
//! covers error and cancellation paths without any caller bookkeeping. Waiters
//! are queued FIFO by the underlying semaphore, so nobody starves.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::types::Cancelled;

pub struct RateLimiter {
    permits: Arc<Semaphore>,
    max_permits: usize,
    min_interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(max_permits: usize) -> Self {
        let max_permits = max_permits.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_permits)),
            max_permits,
            min_interval: Duration::ZERO,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Minimum spacing between two consecutive grants.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn max_permits(&self) -> usize {
        self.max_permits
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Waits for a permit. Only fails when `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<RateLimitToken, Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled),
            permit = self.permits.clone().acquire_owned() => permit.map_err(|_| Cancelled)?,
        };

        if !self.min_interval.is_zero() {
            let slot = {
                let mut next = self.next_slot.lock().await;
                let slot = (*next).max(Instant::now());
                *next = slot + self.min_interval;
                slot
            };
            tokio::select! {
                biased;
                // permit is dropped here and returns to the pool
                _ = cancel.cancelled() => return Err(Cancelled),
                _ = tokio::time::sleep_until(slot) => {}
            }
        }

        Ok(RateLimitToken {
            permit: Some(permit),
            acquired_at: Instant::now(),
        })
    }

    /// Grants a token only if one is free right now.
    pub fn try_acquire(&self) -> Option<RateLimitToken> {
        let permit = self.permits.clone().try_acquire_owned().ok()?;
        Some(RateLimitToken {
            permit: Some(permit),
            acquired_at: Instant::now(),
        })
    }
}

/// Permission for one in-flight external call.
#[derive(Debug)]
pub struct RateLimitToken {
    permit: Option<OwnedSemaphorePermit>,
    acquired_at: Instant,
}

impl RateLimitToken {
    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }

    pub fn is_held(&self) -> bool {
        self.permit.is_some()
    }

    /// Returns the permit to the pool. Returns `false` if it was already released.
    pub fn release(&mut self) -> bool {
        self.permit.take().is_some()
    }
}

impl Drop for RateLimitToken {
    fn drop(&mut self) {
        self.release();
    }
}
