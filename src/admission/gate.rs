//! Counting admission gate.
//!
//! # Responsibilities
//! - Bound the number of concurrent holders of a logical resource slot
//! - Race slot availability against cancellation and a hesitation timeout
//!
//! # Design Decisions
//! - Built on `tokio::sync::Semaphore`; a permit is the slot
//! - Capacity 0 means unbounded: acquisition never waits
//! - Cancellation wins ties: an already fired signal refuses even when a slot is free

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::error::Refusal;
use super::signal::Cancel;

/// Bounded-concurrency admission primitive.
#[derive(Debug, Clone)]
pub struct Gate {
    /// `None` when the gate is unbounded.
    slots: Option<Arc<Semaphore>>,
    capacity: usize,
}

impl Gate {
    /// Create a gate admitting at most `capacity` holders. 0 disables gating.
    pub fn new(capacity: usize) -> Self {
        if capacity == 0 {
            return Self::unbounded();
        }
        let capacity = capacity.min(Semaphore::MAX_PERMITS);
        Self {
            slots: Some(Arc::new(Semaphore::new(capacity))),
            capacity,
        }
    }

    /// A gate that admits everyone immediately.
    pub fn unbounded() -> Self {
        Self {
            slots: None,
            capacity: 0,
        }
    }

    /// Configured capacity (0 when unbounded).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_bounded(&self) -> bool {
        self.slots.is_some()
    }

    /// Number of slots currently held.
    pub fn held(&self) -> usize {
        match &self.slots {
            Some(slots) => self.capacity - slots.available_permits(),
            None => 0,
        }
    }

    /// Acquire a slot.
    ///
    /// Resolves with the first of: a free slot, a fired cancel signal, or the
    /// hesitation window elapsing. A zero `hesitation` waits indefinitely for a
    /// slot or cancellation.
    pub async fn acquire(&self, cancel: Cancel<'_>, hesitation: Duration) -> Result<GatePermit, Refusal> {
        let Some(slots) = &self.slots else {
            return Ok(GatePermit::unbounded());
        };

        let timeout = async {
            if hesitation.is_zero() {
                pending::<()>().await
            } else {
                tokio::time::sleep(hesitation).await
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Refusal::Cancelled),
            permit = Arc::clone(slots).acquire_owned() => match permit {
                Ok(permit) => Ok(GatePermit { permit: Some(permit) }),
                // The semaphore is never closed; treat it as a shutdown if it ever is.
                Err(_) => Err(Refusal::Cancelled),
            },
            _ = timeout => Err(Refusal::TimedOut),
        }
    }
}

/// A held gate slot. Released on [`GatePermit::release`] or drop.
#[derive(Debug)]
#[must_use = "dropping the permit releases the slot immediately"]
pub struct GatePermit {
    permit: Option<OwnedSemaphorePermit>,
}

impl GatePermit {
    fn unbounded() -> Self {
        Self { permit: None }
    }

    /// Release the slot. Calling this more than once has no further effect.
    pub fn release(&mut self) {
        self.permit.take();
    }

    /// Whether this permit still holds a bounded slot.
    pub fn is_held(&self) -> bool {
        self.permit.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::signal::DoneSignal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    #[tokio::test]
    async fn unbounded_never_blocks() {
        let gate = Gate::new(0);
        let mut permits = Vec::new();
        for _ in 0..1000 {
            permits.push(gate.acquire(Cancel::never(), Duration::ZERO).await.unwrap());
        }
        assert_eq!(gate.held(), 0);
        assert!(!permits[0].is_held());
    }

    #[tokio::test]
    async fn held_tracks_permits() {
        let gate = Gate::new(2);
        let mut a = gate.acquire(Cancel::never(), Duration::ZERO).await.unwrap();
        let b = gate.acquire(Cancel::never(), Duration::ZERO).await.unwrap();
        assert_eq!(gate.held(), 2);

        a.release();
        assert_eq!(gate.held(), 1);
        a.release();
        assert_eq!(gate.held(), 1, "second release must not free another slot");

        drop(b);
        assert_eq!(gate.held(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hesitation_times_out_busy() {
        let gate = Gate::new(1);
        let _held = gate.acquire(Cancel::never(), Duration::ZERO).await.unwrap();

        let start = Instant::now();
        let res = gate.acquire(Cancel::never(), Duration::from_millis(50)).await;
        let waited = start.elapsed();

        assert_eq!(res.unwrap_err(), Refusal::TimedOut);
        assert!(waited >= Duration::from_millis(50));
        assert!(waited < Duration::from_millis(60));
    }

    #[tokio::test]
    async fn cancel_releases_all_waiters() {
        let gate = Gate::new(1);
        let _held = gate.acquire(Cancel::never(), Duration::ZERO).await.unwrap();
        let cancel = DoneSignal::new();

        let mut waiters = Vec::new();
        for _ in 0..5 {
            let gate = gate.clone();
            let cancel = cancel.clone();
            waiters.push(tokio::spawn(async move {
                gate.acquire(Cancel::on(&cancel), Duration::ZERO).await.map(|_| ())
            }));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.fire();

        for w in waiters {
            let res = tokio::time::timeout(Duration::from_secs(1), w)
                .await
                .expect("waiter should resolve promptly")
                .unwrap();
            assert_eq!(res, Err(Refusal::Cancelled));
        }
    }

    #[tokio::test]
    async fn fired_cancel_wins_over_free_slot() {
        let gate = Gate::new(4);
        let cancel = DoneSignal::new();
        cancel.fire();
        let res = gate.acquire(Cancel::on(&cancel), Duration::ZERO).await;
        assert_eq!(res.unwrap_err(), Refusal::Cancelled);
        assert_eq!(gate.held(), 0);
    }

    #[tokio::test]
    async fn released_slot_admits_waiter() {
        let gate = Gate::new(1);
        let held = gate.acquire(Cancel::never(), Duration::ZERO).await.unwrap();

        let g = gate.clone();
        let waiter = tokio::spawn(async move { g.acquire(Cancel::never(), Duration::ZERO).await.map(|p| p.is_held()) });
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(held);

        assert_eq!(waiter.await.unwrap(), Ok(true));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_capacity() {
        let gate = Gate::new(3);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let gate = gate.clone();
            let active = active.clone();
            let peak = peak.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = gate.acquire(Cancel::never(), Duration::ZERO).await.unwrap();
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(gate.held(), 0);
    }
}
