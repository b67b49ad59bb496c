//! Rate-limited token pool.
//!
//! A counted semaphore whose level is restored to capacity on a fixed
//! cadence. Callers consume permits and never return them, which makes the
//! pool a token bucket with bucket size equal to the refill amount: at most
//! `capacity` control-plane calls are admitted per refill interval.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Longest refill cadence the pool accepts.
pub const MAX_REFILL_INTERVAL: Duration = Duration::from_secs(30);

/// Waiting for a permit outlasted the caller's deadline.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no request token available within {0:?}")]
pub struct AcquireTimeout(pub Duration);

/// A counted semaphore with periodic replenishment.
pub struct TokenPool {
    permits: Arc<Semaphore>,
    capacity: usize,
    refill: JoinHandle<()>,
}

impl TokenPool {
    /// Creates a pool with `capacity` permits, refilled back to `capacity`
    /// every `interval` (clamped to [`MAX_REFILL_INTERVAL`]).
    ///
    /// Must be called from within a tokio runtime; the refill task is
    /// spawned immediately and stops when the pool is dropped.
    #[must_use]
    pub fn new(capacity: usize, interval: Duration) -> Self {
        let interval = interval.clamp(Duration::from_millis(1), MAX_REFILL_INTERVAL);
        let permits = Arc::new(Semaphore::new(capacity));

        let refill = tokio::spawn({
            let permits = Arc::clone(&permits);
            async move {
                let mut tick = tokio::time::interval(interval);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                // First tick completes immediately; skip it.
                tick.tick().await;
                loop {
                    tick.tick().await;
                    let level = permits.available_permits();
                    if level < capacity {
                        permits.add_permits(capacity - level);
                    }
                }
            }
        });

        Self { permits, capacity, refill }
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits available right now.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Consumes one permit, waiting up to `timeout` for one to appear.
    ///
    /// A timed-out acquire holds no permit. Permits are not returned by
    /// callers; the refill task restores the level.
    pub async fn acquire(&self, timeout: Duration) -> Result<(), AcquireTimeout> {
        match tokio::time::timeout(timeout, self.permits.acquire()).await {
            Ok(Ok(permit)) => {
                permit.forget();
                Ok(())
            }
            // The semaphore is never closed while the pool is alive.
            Ok(Err(_)) | Err(_) => Err(AcquireTimeout(timeout)),
        }
    }
}

impl Drop for TokenPool {
    fn drop(&mut self) {
        self.refill.abort();
    }
}

impl std::fmt::Debug for TokenPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPool")
            .field("capacity", &self.capacity)
            .field("available", &self.permits.available_permits())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drains_to_zero_then_times_out() {
        let pool = TokenPool::new(3, Duration::from_secs(30));
        for _ in 0..3 {
            pool.acquire(Duration::from_millis(10)).await.unwrap();
        }
        assert_eq!(pool.available(), 0);

        let err = pool.acquire(Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(err, AcquireTimeout(Duration::from_millis(20)));
        // A failed acquire holds nothing.
        assert_eq!(pool.available(), 0);
    }

    #[tokio::test]
    async fn refill_restores_level_to_capacity() {
        let pool = TokenPool::new(2, Duration::from_millis(20));
        pool.acquire(Duration::from_millis(10)).await.unwrap();
        pool.acquire(Duration::from_millis(10)).await.unwrap();
        assert_eq!(pool.available(), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn level_never_exceeds_capacity() {
        let pool = TokenPool::new(4, Duration::from_millis(10));
        // Let several refill ticks pass with no demand.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(pool.available(), 4);
    }

    #[tokio::test]
    async fn blocked_acquire_wakes_on_refill() {
        let pool = TokenPool::new(1, Duration::from_millis(20));
        pool.acquire(Duration::from_millis(10)).await.unwrap();

        // Next acquire must wait for the refill tick.
        pool.acquire(Duration::from_millis(500)).await.unwrap();
    }

    #[tokio::test]
    async fn contended_acquires_all_complete() {
        let pool = Arc::new(TokenPool::new(4, Duration::from_millis(10)));

        let mut joins = Vec::new();
        for _ in 0..20 {
            let pool = Arc::clone(&pool);
            joins.push(tokio::spawn(async move {
                pool.acquire(Duration::from_secs(5)).await
            }));
        }
        for join in joins {
            join.await.unwrap().unwrap();
        }

        assert!(pool.available() <= pool.capacity());
    }
}
