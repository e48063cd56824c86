//! # Slot Limiter
//!
//! Admission control for the transcription path. A fixed pool of slots caps how
//! many external transcriber processes may run at the same time.
//!
//! ## How it works:
//! - The pool is a `tokio::sync::Semaphore` created full with `capacity` permits
//! - `acquire()` waits for a free slot, but never longer than `wait_timeout`
//! - A successful acquire hands back a [`SlotPermit`]; dropping it returns the slot
//! - A timed-out acquire consumes nothing
//!
//! ## Ordering:
//! Waiters are not promised any particular order. Callers must not rely on
//! first-come-first-served admission.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Smallest allowed pool size.
pub const MIN_CAPACITY: usize = 1;

/// Largest allowed pool size.
pub const MAX_CAPACITY: usize = 100;

/// Errors produced by the slot limiter.
#[derive(Debug, thiserror::Error)]
pub enum LimiterError {
    /// Pool size outside `[MIN_CAPACITY, MAX_CAPACITY]`. Only raised at construction.
    #[error("slot capacity must be in [{MIN_CAPACITY}, {MAX_CAPACITY}], got {0}")]
    InvalidCapacity(usize),

    /// No slot became free within the wait timeout.
    #[error("no free slot after waiting {0:?}")]
    AcquireTimeout(Duration),

    /// The underlying semaphore was closed. The pool is never closed, so this
    /// is not raised in practice.
    #[error("slot pool is closed")]
    Closed,
}

/// Counting limiter with a bounded wait.
///
/// Cloning is cheap and every clone shares the same pool.
#[derive(Debug, Clone)]
pub struct SlotLimiter {
    slots: Arc<Semaphore>,
    capacity: usize,
    wait_timeout: Duration,
}

/// A held slot. The slot goes back to the pool when this value is dropped.
///
/// The permit is moved, never copied, so a slot can only be given back once.
#[derive(Debug)]
pub struct SlotPermit {
    _permit: OwnedSemaphorePermit,
}

impl SlotLimiter {
    /// Create a limiter with `capacity` slots, all initially free.
    pub fn new(capacity: usize, wait_timeout: Duration) -> Result<Self, LimiterError> {
        if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity) {
            return Err(LimiterError::InvalidCapacity(capacity));
        }

        Ok(Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            wait_timeout,
        })
    }

    /// Wait for a free slot.
    ///
    /// Returns [`LimiterError::AcquireTimeout`] if none frees up within the
    /// configured wait. A zero wait still succeeds when a slot is free right away.
    pub async fn acquire(&self) -> Result<SlotPermit, LimiterError> {
        match tokio::time::timeout(self.wait_timeout, self.slots.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(SlotPermit { _permit: permit }),
            Ok(Err(_)) => Err(LimiterError::Closed),
            Err(_) => Err(LimiterError::AcquireTimeout(self.wait_timeout)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots free right now.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Number of slots currently held.
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_new_accepts_bounds() {
        assert!(SlotLimiter::new(1, Duration::from_secs(1)).is_ok());
        assert!(SlotLimiter::new(100, Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_new_rejects_out_of_range_capacity() {
        assert!(matches!(
            SlotLimiter::new(0, Duration::from_secs(1)),
            Err(LimiterError::InvalidCapacity(0))
        ));
        assert!(matches!(
            SlotLimiter::new(101, Duration::from_secs(1)),
            Err(LimiterError::InvalidCapacity(101))
        ));
    }

    #[tokio::test]
    async fn test_release_restores_slot() {
        let limiter = SlotLimiter::new(1, Duration::from_secs(1)).unwrap();

        let permit = limiter.acquire().await.unwrap();
        assert_eq!(limiter.available(), 0);
        assert_eq!(limiter.in_use(), 1);

        drop(permit);
        assert_eq!(limiter.available(), 1);

        let again = tokio::time::timeout(Duration::from_millis(50), limiter.acquire())
            .await
            .expect("acquire after release should not wait");
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_acquire_times_out_without_consuming_slot() {
        let limiter = SlotLimiter::new(1, Duration::from_millis(1)).unwrap();

        let held = limiter.acquire().await.unwrap();
        let err = limiter.acquire().await.unwrap_err();
        assert!(matches!(err, LimiterError::AcquireTimeout(_)));
        assert_eq!(limiter.available(), 0);

        drop(held);
        assert_eq!(limiter.available(), 1);
        let permit = limiter.acquire().await;
        assert!(permit.is_ok());
    }

    #[tokio::test]
    async fn test_zero_wait_succeeds_when_slot_free() {
        let limiter = SlotLimiter::new(2, Duration::ZERO).unwrap();
        let _a = limiter.acquire().await.unwrap();
        let _b = limiter.acquire().await.unwrap();
        assert!(limiter.acquire().await.is_err());
    }

    #[tokio::test]
    async fn test_waiter_gets_slot_released_during_wait() {
        let limiter = SlotLimiter::new(1, Duration::from_secs(5)).unwrap();
        let held = limiter.acquire().await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_never_more_than_capacity_holders() {
        let capacity = 3;
        let limiter = SlotLimiter::new(capacity, Duration::from_secs(5)).unwrap();
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..12 {
            let limiter = limiter.clone();
            let current = current.clone();
            let peak = peak.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await.unwrap();
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= capacity);
        assert_eq!(limiter.available(), capacity);
    }
}
