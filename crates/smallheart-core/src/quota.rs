//! Race-safe daily credit counter.
//!
//! One [`QuotaCounter`] is created per account per day and shared by all of
//! that account's channel sessions. Sessions race to claim single-use tokens;
//! the orchestrator waits on [`QuotaCounter::exhausted`] to learn that the
//! day's target is reached and the remaining sessions can be cancelled.

use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::watch;

/// Fixed-capacity pool of single-use quota tokens.
///
/// Claims are first-come-first-served and never block; total successful
/// claims over the counter's lifetime never exceed its capacity.
#[derive(Debug)]
pub struct QuotaCounter {
    capacity: u32,
    claimed: AtomicU32,
    exhausted_tx: watch::Sender<bool>,
}

impl QuotaCounter {
    /// Create a counter with `capacity` claimable tokens, fully available.
    pub fn new(capacity: u32) -> Self {
        let (exhausted_tx, _) = watch::channel(capacity == 0);
        Self {
            capacity,
            claimed: AtomicU32::new(0),
            exhausted_tx,
        }
    }

    /// Atomically remove one token if any remain.
    ///
    /// Returns the 1-based ordinal of the claim, or `None` once the counter
    /// is empty. Empty is not an error: it is the normal termination signal
    /// for a claiming session.
    pub fn try_claim(&self) -> Option<u32> {
        let mut current = self.claimed.load(Ordering::Acquire);
        loop {
            if current >= self.capacity {
                return None;
            }
            match self.claimed.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    let ordinal = current + 1;
                    if ordinal == self.capacity {
                        let _ = self.exhausted_tx.send(true);
                    }
                    return Some(ordinal);
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Resolve once every token has been claimed.
    ///
    /// Resolves immediately if the counter is already empty (including a
    /// zero-capacity counter).
    pub async fn exhausted(&self) {
        let mut rx = self.exhausted_tx.subscribe();
        while !*rx.borrow_and_update() {
            // The sender lives in `self`, so `changed` cannot fail while
            // we are borrowed from it.
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Total capacity of the counter.
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of tokens claimed so far.
    pub fn claimed(&self) -> u32 {
        self.claimed.load(Ordering::Acquire).min(self.capacity)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn claims_are_ordinal_and_bounded() {
        let quota = QuotaCounter::new(3);
        assert_eq!(quota.try_claim(), Some(1));
        assert_eq!(quota.try_claim(), Some(2));
        assert_eq!(quota.try_claim(), Some(3));
        assert_eq!(quota.try_claim(), None);
        assert_eq!(quota.try_claim(), None);
        assert_eq!(quota.claimed(), 3);
    }

    #[tokio::test]
    async fn exhausted_resolves_on_final_claim() {
        let quota = Arc::new(QuotaCounter::new(2));
        let waiter = {
            let quota = Arc::clone(&quota);
            tokio::spawn(async move { quota.exhausted().await })
        };

        quota.try_claim();
        // Not yet exhausted; the waiter must still be pending.
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        quota.try_claim();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn exhausted_resolves_immediately_when_already_empty() {
        let quota = QuotaCounter::new(0);
        tokio::time::timeout(Duration::from_millis(100), quota.exhausted())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn exhausted_supports_multiple_waiters() {
        let quota = Arc::new(QuotaCounter::new(1));
        let a = {
            let q = Arc::clone(&quota);
            tokio::spawn(async move { q.exhausted().await })
        };
        let b = {
            let q = Arc::clone(&quota);
            tokio::spawn(async move { q.exhausted().await })
        };

        quota.try_claim();
        tokio::time::timeout(Duration::from_secs(1), async {
            a.await.unwrap();
            b.await.unwrap();
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_never_exceed_capacity() {
        const CAPACITY: u32 = 24;
        const CLAIMANTS: usize = 64;

        let quota = Arc::new(QuotaCounter::new(CAPACITY));
        let mut handles = Vec::new();
        for _ in 0..CLAIMANTS {
            let quota = Arc::clone(&quota);
            handles.push(tokio::spawn(async move {
                let mut won = Vec::new();
                while let Some(n) = quota.try_claim() {
                    won.push(n);
                    tokio::task::yield_now().await;
                }
                won
            }));
        }

        let mut all: Vec<u32> = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }
        all.sort_unstable();
        let expected: Vec<u32> = (1..=CAPACITY).collect();
        assert_eq!(all, expected, "each ordinal claimed exactly once");

        quota.exhausted().await;
        assert_eq!(quota.try_claim(), None);
    }
}
